//! Convenient re-exports of commonly used types from mockset.
//!
//! ```ignore
//! use mockset::prelude::*;
//! ```
//!
//! This provides access to:
//! - Query sets, their builder and projection options
//! - Models, items, records and descriptors
//! - Condition trees, lookups and expressions
//! - Events, pagination and error types
//! - Manager patching and save emulation

pub use mockset_core::{
    descriptor::{Descriptor, DescriptorBuilder, Field},
    error::{MockError, MockResult},
    event::{Event, EventRegistry},
    expr::{Aggregate, AggregateFn, Case, Expr, When},
    lookups,
    model::{Item, Model, Related, RelatedSet},
    page::{Page, PageRequest},
    query::{Comparison, Connector, DatePart, Q, Query, QueryVisitor},
    record,
    record::Record,
    value::{FromValue, Value, ValueMap},
};
pub use mockset_memory::{Aggregates, ListOptions, MockSet, MockSetBuilder};
pub use mockset_macros::Model;

pub use crate::{
    manager::{Managed, PatchGuard, objects, patch_manager},
    mocker::ModelMocker,
};
