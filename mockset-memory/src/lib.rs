//! In-memory query set engine for mockset.
//!
//! This crate evaluates the query types of `mockset-core` against items held
//! in memory. Everything is single-threaded and synchronous.
//!
//! # Features
//!
//! - **Path resolution** - Walks `field__relation__field` paths, fanning out over related sets
//! - **Predicate matching** - Every comparison keyword, date parts included
//! - **Condition trees** - AND/OR/NOT trees evaluated as index sets over the candidates
//! - **Chainable sets** - Filter, order, distinct, annotate, aggregate and project
//! - **Mutation with events** - Add, create, update and delete, with delete reaching every related set
//!
//! # Quick Start
//!
//! ```ignore
//! use mockset_core::{descriptor::Descriptor, lookups, record};
//! use mockset_memory::MockSet;
//!
//! let cars = MockSet::new_collection(
//!     Some(Descriptor::new("Car", ["id", "speed"])),
//!     [record! { "id" => 1, "speed" => 90 }, record! { "id" => 2, "speed" => 140 }],
//! );
//!
//! let fast = cars.filter(lookups! { "speed__gt" => 100 })?;
//! fast.delete(lookups! {})?;
//!
//! assert_eq!(cars.count(), 1);
//! ```

#[allow(unused_extern_crates)]
extern crate self as mockset_memory;

pub mod combinator;
pub mod matcher;
pub mod mutate;
pub mod project;
pub mod resolver;
pub mod set;

pub use combinator::Combinator;
pub use mutate::Deleted;
pub use project::{Aggregates, ListOptions};
pub use resolver::{Mode, Resolved, resolve, resolve_value};
pub use set::{MockSet, MockSetBuilder};
