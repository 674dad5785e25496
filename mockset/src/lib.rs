//! In-memory emulation of an ORM query set, for tests.
//!
//! This crate is the entry point of the mockset workspace. It re-exports the
//! core types and the in-memory engine, and adds the glue that lets code
//! under test find a model's set through its manager.
//!
//! # Features
//!
//! - **Chainable query sets** - `filter`, `exclude`, `order_by`, `distinct`, `annotate` and friends
//! - **Lookup keywords** - `field__relation__comparison` paths with every common comparison
//! - **Condition trees** - `Q` objects combined with `&`, `|` and `!`
//! - **Mutation with events** - `create`, `update`, `delete` and lifecycle handlers
//! - **Typed models** - `#[derive(Model)]` for plain structs, or stand-in [`Record`](record::Record)s
//! - **Manager patching** - Scoped, self-restoring manager patches and save emulation
//!
//! # Quick Start
//!
//! ```ignore
//! use mockset::prelude::*;
//!
//! #[derive(Debug, Default, Model)]
//! #[model(label = "Car")]
//! pub struct Car {
//!     pub id: i64,
//!     pub speed: i64,
//! }
//!
//! fn fast_cars() -> MockResult<usize> {
//!     Ok(Car::objects()?.filter(lookups! { "speed__gte" => 100 })?.count())
//! }
//!
//! let (_guard, cars) = Car::patch_objects([
//!     Car { id: 1, speed: 90 },
//!     Car { id: 2, speed: 140 },
//! ]);
//!
//! assert_eq!(fast_cars().unwrap(), 1);
//! cars.delete(lookups! { "speed__lt" => 100 }).unwrap();
//! ```
//!
//! # Stand-in records
//!
//! When a typed model is more than a test needs, [`Record`](record::Record)
//! holds arbitrary named fields and can be bound to a
//! [`Descriptor`](descriptor::Descriptor) for field validation:
//!
//! ```ignore
//! use mockset::prelude::*;
//!
//! let cars = MockSet::new_collection(
//!     Some(Descriptor::new("Car", ["id", "speed"])),
//!     [record! { "id" => 1, "speed" => 90 }],
//! );
//!
//! assert!(cars.filter(lookups! { "colour" => "red" }).is_err());
//! ```

#[allow(unused_extern_crates)]
extern crate self as mockset;

pub mod manager;
pub mod mocker;
pub mod prelude;

pub use mockset_core::{descriptor, error, event, expr, lookups, model, page, query, record, value};
pub use mockset_macros::Model;

/// The in-memory engine: query sets and their evaluation.
pub mod memory {
    pub use mockset_memory::{
        Aggregates, Combinator, Deleted, ListOptions, MockSet, MockSetBuilder, Mode, Resolved,
        combinator, matcher, resolve, resolve_value, resolver,
    };
}

pub use mockset_memory::{MockSet, MockSetBuilder};

// Re-export value conversion crates for convenience
pub use bson;
pub use chrono;
pub use serde_json;
pub use uuid;
