//! Error types and result types for mock query set operations.
//!
//! Every fallible operation in the workspace returns [`MockResult<T>`]. The
//! message text of each variant mirrors the wording of the query API being
//! emulated, because test suites assert on it.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Label used in messages when no model is bound to a set.
pub const GENERIC_MODEL_LABEL: &str = "Object";

/// Represents all possible errors raised by the query emulation engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MockError {
    /// A lookup path names a field the model does not have, or an update
    /// targets a relation path.
    #[error("{0}")]
    FieldError(String),
    /// A positional filter argument is not a condition tree.
    #[error("Only condition trees are supported as positional filter arguments")]
    ArgumentNotSupported,
    /// The operation needs a bound model/descriptor and the set has none.
    #[error("A model must be specified on the mock set for this operation")]
    ModelNotSpecified,
    /// `get`, `latest` or `earliest` found nothing.
    #[error("{} matching query does not exist.", .model.as_deref().unwrap_or(GENERIC_MODEL_LABEL))]
    DoesNotExist {
        /// Label of the bound model, `None` for an unbound set.
        model: Option<String>,
    },
    /// `get` and friends found more than one match.
    #[error("get() returned more than one {} -- it returned {count}!", .model.as_deref().unwrap_or(GENERIC_MODEL_LABEL))]
    MultipleObjectsReturned {
        /// Label of the bound model, `None` for an unbound set.
        model: Option<String>,
        /// Number of matching items.
        count: usize,
    },
    /// An argument has a value outside what the operation accepts.
    #[error("{0}")]
    InvalidValue(String),
    /// The emulation deliberately does not implement this call shape.
    #[error("{0}")]
    NotImplemented(String),
    /// A real backend was reached while the connection is disabled.
    #[error("{0}")]
    NotSupported(String),
    /// Conversion to or from JSON/BSON failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MockError {
    /// Builds the field resolution error for `name`, listing `choices` in
    /// sorted order.
    pub fn unknown_field<I, S>(name: &str, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut choices = choices
            .into_iter()
            .map(|choice| choice.as_ref().to_string())
            .collect::<Vec<_>>();
        choices.sort();
        choices.dedup();

        MockError::FieldError(format!(
            "Cannot resolve keyword '{}' into field. Choices are {}.",
            name,
            choices
                .iter()
                .map(|choice| format!("'{choice}'"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Builds the error raised when `update` is handed a relation path.
    pub fn not_updatable(name: &str) -> Self {
        MockError::FieldError(format!(
            "Cannot update model field '{name}' (only non-relations and foreign keys permitted)."
        ))
    }

    /// Returns `true` for any does-not-exist error, whatever model raised it.
    pub fn is_does_not_exist(&self) -> bool {
        matches!(self, MockError::DoesNotExist { .. })
    }

    /// Returns `true` only for the does-not-exist error of the model labelled
    /// `label`. This is the equivalent of catching a model's own exception
    /// type instead of the shared base one.
    pub fn is_does_not_exist_for(&self, label: &str) -> bool {
        matches!(self, MockError::DoesNotExist { model: Some(model) } if model == label)
    }

    /// Returns `true` for a multiple-objects-returned error.
    pub fn is_multiple_objects_returned(&self) -> bool {
        matches!(self, MockError::MultipleObjectsReturned { .. })
    }
}

/// A specialized `Result` type for mock query set operations.
pub type MockResult<T> = Result<T, MockError>;

impl From<BsonError> for MockError {
    fn from(err: BsonError) -> Self {
        MockError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for MockError {
    fn from(err: SerdeJsonError) -> Self {
        MockError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_field_lists_sorted_choices() {
        let err = MockError::unknown_field("baz", ["foo", "bar", "foo"]);

        assert_eq!(
            err.to_string(),
            "Cannot resolve keyword 'baz' into field. Choices are 'bar', 'foo'."
        );
    }

    #[test]
    fn does_not_exist_uses_model_label_when_bound() {
        let bound = MockError::DoesNotExist { model: Some("Car".into()) };
        let unbound = MockError::DoesNotExist { model: None };

        assert_eq!(bound.to_string(), "Car matching query does not exist.");
        assert_eq!(unbound.to_string(), "Object matching query does not exist.");
        assert!(bound.is_does_not_exist_for("Car"));
        assert!(!unbound.is_does_not_exist_for("Car"));
        assert!(unbound.is_does_not_exist());
    }

    #[test]
    fn not_updatable_names_the_path() {
        assert_eq!(
            MockError::not_updatable("make__name").to_string(),
            "Cannot update model field 'make__name' (only non-relations and foreign keys permitted)."
        );
    }
}
