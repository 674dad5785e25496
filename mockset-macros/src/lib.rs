//! Procedural macros for mockset.
//!
//! Provides `#[derive(Model)]`, which turns a plain struct with named fields
//! into a model the query engine can introspect, read and write by name.

#[allow(unused_extern_crates)]
extern crate self as mockset_macros;

mod model;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `mockset::model::Model` for a struct with named fields.
///
/// The struct must implement `Debug` and `Default`; `Default` is the
/// constructor `create` uses. Field types must convert into and out of
/// `mockset::value::Value` (`Into<Value>`, `FromValue` and `Clone`).
///
/// Also implements `mockset::manager::Managed`, whose `model_descriptor()`
/// returns the per-thread descriptor of the model, and `From<Struct> for
/// Item`.
///
/// # Container Attributes
///
/// | Attribute | Description |
/// |-----------|-------------|
/// | `label = "..."` | Model label used in errors and delete counts (default: struct name) |
/// | `pk = "..."` | Identity field (default: `id`) |
/// | `get_latest_by = "..."` | Default field for `latest`/`earliest` |
///
/// # Field Attributes
///
/// | Attribute | Description |
/// |-----------|-------------|
/// | `skip` | Hide the field from the engine |
/// | `rename = "..."` | Expose the field under another name |
///
/// # Example
///
/// ```ignore
/// use mockset::prelude::*;
///
/// #[derive(Debug, Default, Model)]
/// #[model(label = "Car", get_latest_by = "year")]
/// pub struct Car {
///     pub id: i64,
///     pub year: i64,
///     pub make: Option<Item>,
///     #[model(skip)]
///     pub notes: Vec<String>,
/// }
/// ```
#[proc_macro_derive(Model, attributes(model))]
pub fn model_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::model_derive_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
