//! Minimal model metadata for introspection.
//!
//! A [`Descriptor`] gives stand-in records just enough schema for the engine
//! to validate lookup paths, backfill fields on `create`, project all fields
//! in `values()` and pick a default ordering for `latest()`.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::Rc,
};

use crate::{model::Model, record::Record};

/// Default identity field name.
pub const DEFAULT_PK: &str = "id";

/// Constructor used by `create` to instantiate a model.
pub type Constructor = Rc<dyn Fn() -> Box<dyn Model>>;

/// A described field. Only the name carries meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field {
    name: String,
}

impl Field {
    /// Creates a field called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute name; identical to the name for described fields.
    pub fn attname(&self) -> &str {
        &self.name
    }
}

struct DescriptorInner {
    label: String,
    fields: Vec<Field>,
    pk: String,
    get_latest_by: RefCell<Option<String>>,
    constructor: Option<Constructor>,
}

/// Model metadata shared by every record and set bound to the same model.
///
/// Cloning is cheap; clones share the settable `get_latest_by`.
#[derive(Clone)]
pub struct Descriptor(Rc<DescriptorInner>);

impl Descriptor {
    /// Creates a descriptor labelled `label` over `fields`.
    pub fn new<I, S>(label: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder()
            .label(label)
            .fields(fields)
            .build()
    }

    /// Creates an anonymous descriptor over `fields`, for ad hoc records.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(crate::record::RECORD_LABEL, fields)
    }

    /// Creates a new [`DescriptorBuilder`].
    pub fn builder() -> DescriptorBuilder {
        DescriptorBuilder::default()
    }

    /// The model label.
    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// The concrete fields, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.0.fields
    }

    /// The concrete fields, in declaration order.
    pub fn concrete_fields(&self) -> &[Field] {
        self.fields()
    }

    /// The concrete field names, in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.0
            .fields
            .iter()
            .map(|field| field.name.clone())
            .collect()
    }

    /// Map from field name to field.
    pub fn forward_fields(&self) -> BTreeMap<&str, &Field> {
        self.0
            .fields
            .iter()
            .map(|field| (field.name(), field))
            .collect()
    }

    /// Parent models. Always empty: descriptors have no inheritance.
    pub fn parents(&self) -> BTreeMap<String, Descriptor> {
        BTreeMap::new()
    }

    /// Looks up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.0.fields.iter().find(|field| field.name == name)
    }

    /// Returns `true` if a field called `name` is described.
    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// Name of the identity field.
    pub fn pk_name(&self) -> &str {
        &self.0.pk
    }

    /// The default ordering field for `latest`/`earliest`.
    pub fn get_latest_by(&self) -> Option<String> {
        self.0.get_latest_by.borrow().clone()
    }

    /// Sets the default ordering field for `latest`/`earliest`.
    pub fn set_get_latest_by(&self, field: Option<&str>) {
        *self.0.get_latest_by.borrow_mut() = field.map(str::to_string);
    }

    /// Returns `true` if a constructor was provided.
    pub fn has_constructor(&self) -> bool {
        self.0.constructor.is_some()
    }

    /// Builds a new, empty instance: through the constructor when there is
    /// one, otherwise as a [`Record`] with every field null.
    pub fn instantiate(&self) -> Box<dyn Model> {
        match &self.0.constructor {
            Some(constructor) => constructor(),
            None => Box::new(Record::with_descriptor(self.clone())),
        }
    }

    /// Returns `true` if both handles share the same metadata.
    pub fn ptr_eq(&self, other: &Descriptor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.label == other.0.label
                && self.0.fields == other.0.fields
                && self.0.pk == other.0.pk)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("label", &self.0.label)
            .field("fields", &self.field_names())
            .field("pk", &self.0.pk)
            .field("get_latest_by", &self.get_latest_by())
            .finish()
    }
}

/// Builder for creating [`Descriptor`] instances.
#[derive(Default)]
pub struct DescriptorBuilder {
    label: Option<String>,
    fields: Vec<Field>,
    pk: Option<String>,
    get_latest_by: Option<String>,
    constructor: Option<Constructor>,
}

impl DescriptorBuilder {
    /// Sets the model label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        let field = Field::new(name);
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
        self
    }

    /// Appends several fields.
    pub fn fields<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(self, |builder, name| builder.field(name))
    }

    /// Sets the identity field name (default `id`).
    pub fn pk(mut self, name: impl Into<String>) -> Self {
        self.pk = Some(name.into());
        self
    }

    /// Sets the default ordering field for `latest`/`earliest`.
    pub fn get_latest_by(mut self, name: impl Into<String>) -> Self {
        self.get_latest_by = Some(name.into());
        self
    }

    /// Sets the constructor `create` uses to instantiate the model.
    pub fn constructor<F, M>(mut self, constructor: F) -> Self
    where
        F: Fn() -> M + 'static,
        M: Model,
    {
        self.constructor = Some(Rc::new(move || Box::new(constructor()) as Box<dyn Model>));
        self
    }

    /// Builds the [`Descriptor`].
    pub fn build(self) -> Descriptor {
        Descriptor(Rc::new(DescriptorInner {
            label: self.label.unwrap_or_else(|| crate::record::RECORD_LABEL.to_string()),
            fields: self.fields,
            pk: self.pk.unwrap_or_else(|| DEFAULT_PK.to_string()),
            get_latest_by: RefCell::new(self.get_latest_by),
            constructor: self.constructor,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn builder_defaults_identity_to_id() {
        let descriptor = Descriptor::new("Car", ["id", "speed", "speed"]);

        assert_eq!(descriptor.pk_name(), "id");
        assert_eq!(descriptor.field_names(), vec!["id", "speed"]);
        assert!(descriptor.parents().is_empty());
        assert!(descriptor.forward_fields().contains_key("speed"));
    }

    #[test]
    fn get_latest_by_is_shared_between_clones() {
        let descriptor = Descriptor::from_fields(["created"]);
        let clone = descriptor.clone();
        clone.set_get_latest_by(Some("created"));

        assert_eq!(descriptor.get_latest_by(), Some("created".to_string()));
    }

    #[test]
    fn instantiate_without_constructor_yields_null_record() {
        let descriptor = Descriptor::new("Car", ["model", "speed"]);
        let model = descriptor.instantiate();

        assert_eq!(model.field("model"), Some(Value::Null));
        assert_eq!(model.field_names(), vec!["model", "speed"]);
        assert!(model.downcast_ref::<Record>().is_some());
    }
}
