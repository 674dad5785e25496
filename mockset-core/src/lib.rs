//! Core types for emulating an ORM query set in memory.
//!
//! This crate holds the data model shared by the evaluation engine and the
//! facade, with no evaluation logic of its own:
//!
//! - **Values** ([`value`]) - The dynamic [`Value`](value::Value) every field and lookup target is
//! - **Models** ([`model`]) - The [`Model`](model::Model) trait and shared [`Item`](model::Item) handles
//! - **Records** ([`record`]) - The stand-in record and the [`record!`] macro
//! - **Descriptors** ([`descriptor`]) - Minimal field metadata for introspection
//! - **Queries** ([`query`]) - Condition trees, lookup keywords and the [`lookups!`] macro
//! - **Expressions** ([`expr`]) - Annotation and aggregate expressions
//! - **Events** ([`event`]) - Lifecycle events and handler registries
//! - **Pagination** ([`page`]) - Page-number pagination
//! - **Error handling** ([`error`]) - The shared error and result types
//!
//! # Example
//!
//! ```ignore
//! use mockset_core::{record, descriptor::Descriptor, query::Q};
//!
//! let descriptor = Descriptor::new("Car", ["id", "make", "speed"]);
//! let car = record! { "id" => 1, "speed" => 120 }.describe(descriptor);
//! let fast = Q::new("speed__gte", 100) & !Q::new("make", "Lada");
//! ```

#[allow(unused_extern_crates)]
extern crate self as mockset_core;

pub mod descriptor;
pub mod error;
pub mod event;
pub mod expr;
pub mod model;
pub mod page;
pub mod query;
pub mod record;
pub mod value;
