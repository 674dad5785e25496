//! Model instances and the shared handles the engine stores.
//!
//! Anything a [`MockSet`](../../mockset_memory/set/struct.MockSet.html) holds
//! implements [`Model`]: the stand-in [`Record`](crate::record::Record), or a
//! plain struct using `#[derive(Model)]`. Sets store [`Item`] handles so the
//! same instance is visible from every derived set and from relations.

use std::{
    any::Any,
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

use crate::{
    descriptor::Descriptor,
    error::MockResult,
    value::Value,
};

/// Name of the identity alias accepted in every lookup path.
pub const PK: &str = "pk";

/// Core trait for model instances held by a mock set.
///
/// Field access is dynamic: the engine reads fields by name while resolving
/// lookup paths and writes them during `update`/`create`.
///
/// # Example
///
/// ```ignore
/// use mockset::prelude::*;
///
/// #[derive(Debug, Default, Model)]
/// #[model(label = "Car")]
/// pub struct Car {
///     pub id: i64,
///     pub speed: i64,
/// }
/// ```
pub trait Model: Any + fmt::Debug {
    /// Returns the model label used in error messages and delete counts.
    ///
    /// Defaults to the unqualified runtime type name.
    fn model_name(&self) -> String {
        let name = std::any::type_name::<Self>();
        name.rsplit("::").next().unwrap_or(name).to_string()
    }

    /// Returns the introspection descriptor, if the model has one.
    fn descriptor(&self) -> Option<Descriptor> {
        None
    }

    /// Reads the field called `name`, or `None` if the model has no such
    /// attribute.
    fn field(&self, name: &str) -> Option<Value>;

    /// Assigns `value` to the field called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the field does not exist or the value has the
    /// wrong type.
    fn set_field(&mut self, name: &str, value: Value) -> MockResult<()>;

    /// Names of the attributes this instance currently exposes, in order.
    fn field_names(&self) -> Vec<String>;

    /// Returns a reference to the model as a generic `Any` type.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference to the model as a generic `Any` type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Model {
    /// Attempts to downcast a reference to a specific model type.
    pub fn downcast_ref<M: Model>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    /// Attempts to downcast a mutable reference to a specific model type.
    pub fn downcast_mut<M: Model>(&mut self) -> Option<&mut M> {
        self.as_any_mut().downcast_mut::<M>()
    }
}

struct ItemCell {
    model: RefCell<Box<dyn Model>>,
    annotations: RefCell<Vec<(String, Value)>>,
}

/// A shared handle to one model instance.
///
/// Cloning an `Item` clones the handle, not the instance. Annotations
/// computed by `annotate` live next to the instance and shadow its fields.
#[derive(Clone)]
pub struct Item(Rc<ItemCell>);

impl Item {
    /// Wraps a model instance in a new handle.
    pub fn new<M: Model>(model: M) -> Self {
        Self::from_boxed(Box::new(model))
    }

    /// Wraps an already boxed model instance in a new handle.
    pub fn from_boxed(model: Box<dyn Model>) -> Self {
        Self(Rc::new(ItemCell {
            model: RefCell::new(model),
            annotations: RefCell::new(Vec::new()),
        }))
    }

    /// Returns `true` if both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Item) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Reads an annotation or field called `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        let annotated = self
            .0
            .annotations
            .borrow()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone());

        annotated.or_else(|| self.0.model.borrow().field(name))
    }

    /// Reads `name`, falling back to `default` when it is missing.
    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.get(name).unwrap_or(default)
    }

    /// Assigns a field on the underlying model.
    ///
    /// # Errors
    ///
    /// Propagates the model's rejection of the field or value.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> MockResult<()> {
        self.0.model.borrow_mut().set_field(name, value.into())
    }

    /// Stores an annotation on this item, replacing an earlier one with the
    /// same name.
    pub fn annotate(&self, name: &str, value: Value) {
        let mut annotations = self.0.annotations.borrow_mut();

        match annotations.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => annotations.push((name.to_string(), value)),
        }
    }

    /// Names of the annotations stored on this item.
    pub fn annotation_names(&self) -> Vec<String> {
        self.0
            .annotations
            .borrow()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// The model label: the descriptor label when there is one, the model's
    /// own name otherwise.
    pub fn label(&self) -> String {
        let model = self.0.model.borrow();

        model
            .descriptor()
            .map(|descriptor| descriptor.label().to_string())
            .unwrap_or_else(|| model.model_name())
    }

    /// The descriptor of the underlying model, if any.
    pub fn descriptor(&self) -> Option<Descriptor> {
        self.0.model.borrow().descriptor()
    }

    /// Attribute names exposed by the underlying model.
    pub fn field_names(&self) -> Vec<String> {
        self.0.model.borrow().field_names()
    }

    /// Names a lookup path may use on this item, or `None` when the item
    /// cannot be introspected.
    ///
    /// Only items carrying a descriptor are introspectable. Their known
    /// names are the descriptor fields, the instance attributes and the
    /// annotations.
    pub fn known_names(&self) -> Option<Vec<String>> {
        let model = self.0.model.borrow();
        let descriptor = model.descriptor()?;

        let mut names = descriptor.field_names();
        names.extend(model.field_names());
        names.extend(self.annotation_names());
        names.sort();
        names.dedup();

        Some(names)
    }

    /// Returns the identity value: an explicit `pk` attribute, else the
    /// descriptor's identity field, else `id`.
    pub fn pk(&self) -> Value {
        if let Some(value) = self.get(PK) {
            return value;
        }

        let pk_name = self
            .descriptor()
            .map(|descriptor| descriptor.pk_name().to_string())
            .unwrap_or_else(|| "id".to_string());

        self.get(&pk_name).unwrap_or_default()
    }

    /// Name of the identity field used by [`Item::pk`].
    pub fn pk_name(&self) -> String {
        if self.0.model.borrow().field(PK).is_some() {
            return PK.to_string();
        }

        self.descriptor()
            .map(|descriptor| descriptor.pk_name().to_string())
            .unwrap_or_else(|| "id".to_string())
    }

    /// Borrows the underlying model.
    pub fn model(&self) -> Ref<'_, dyn Model> {
        Ref::map(self.0.model.borrow(), |model| &**model)
    }

    /// Borrows the underlying model as `M`, if it is one.
    pub fn downcast_ref<M: Model>(&self) -> Option<Ref<'_, M>> {
        Ref::filter_map(self.0.model.borrow(), |model| (**model).downcast_ref::<M>()).ok()
    }

    /// Mutably borrows the underlying model as `M`, if it is one.
    pub fn downcast_mut<M: Model>(&self) -> Option<RefMut<'_, M>> {
        RefMut::filter_map(self.0.model.borrow_mut(), |model| (**model).downcast_mut::<M>()).ok()
    }

    /// Returns `true` if the underlying model is an `M`.
    pub fn is<M: Model>(&self) -> bool {
        self.0.model.borrow().as_any().is::<M>()
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }

        if self.label() != other.label() {
            return false;
        }

        let mut names = self.field_names();
        let mut other_names = other.field_names();
        names.sort_unstable();
        other_names.sort_unstable();

        names == other_names && names.iter().all(|name| self.get(name) == other.get(name))
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.model.try_borrow() {
            Ok(model) => write!(f, "{:?}", &*model),
            Err(_) => write!(f, "Item(<borrowed>)"),
        }
    }
}

/// A collection reachable from a field, such as a reverse relation.
///
/// Implemented by the engine's set type so that sets can be stored inside
/// records and traversed by lookup paths.
pub trait Related: Any {
    /// Snapshot of the items currently in the collection.
    fn related_items(&self) -> Vec<Item>;

    /// Returns a reference to the collection as a generic `Any` type.
    fn as_any(&self) -> &dyn Any;
}

/// A shared handle to a [`Related`] collection.
#[derive(Clone)]
pub struct RelatedSet(Rc<dyn Related>);

impl RelatedSet {
    /// Wraps a collection.
    pub fn new<R: Related>(related: R) -> Self {
        Self(Rc::new(related))
    }

    /// Snapshot of the items currently in the collection.
    pub fn items(&self) -> Vec<Item> {
        self.0.related_items()
    }

    /// Identity values of the items in the collection.
    pub fn pks(&self) -> Vec<Value> {
        self.items().iter().map(Item::pk).collect()
    }

    /// Returns `true` if both handles wrap the same collection.
    pub fn ptr_eq(&self, other: &RelatedSet) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns `true` if both collections hold the same instances, in the
    /// same order.
    pub fn same_items(&self, other: &RelatedSet) -> bool {
        if self.ptr_eq(other) {
            return true;
        }

        let (ours, theirs) = (self.items(), other.items());
        ours.len() == theirs.len() && ours.iter().zip(&theirs).all(|(a, b)| a.ptr_eq(b))
    }

    /// Returns the wrapped collection as `R`, if it is one.
    pub fn downcast_ref<R: Related>(&self) -> Option<&R> {
        self.0.as_any().downcast_ref::<R>()
    }
}

impl fmt::Debug for RelatedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelatedSet({} items)", self.items().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{descriptor::Descriptor, record::Record};

    #[derive(Debug, Default)]
    struct Engine {
        id: i64,
        power: i64,
    }

    impl Model for Engine {
        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "id" => Some(self.id.into()),
                "power" => Some(self.power.into()),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> MockResult<()> {
            use crate::value::FromValue;

            match name {
                "id" => self.id = i64::from_value(value)?,
                "power" => self.power = i64::from_value(value)?,
                _ => return Err(crate::error::MockError::unknown_field(name, ["id", "power"])),
            }
            Ok(())
        }

        fn field_names(&self) -> Vec<String> {
            vec!["id".into(), "power".into()]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn model_name_defaults_to_type_name() {
        let item = Item::new(Engine::default());

        assert_eq!(item.label(), "Engine");
    }

    #[test]
    fn annotations_shadow_fields() {
        let item = Item::new(Engine { id: 1, power: 90 });
        item.annotate("power", Value::Int(120));

        assert_eq!(item.get("power"), Some(Value::Int(120)));
        assert_eq!(item.downcast_ref::<Engine>().map(|engine| engine.power), Some(90));
    }

    #[test]
    fn set_writes_through_to_the_model() {
        let item = Item::new(Engine::default());
        item.set("power", 75).unwrap();

        assert_eq!(item.downcast_ref::<Engine>().unwrap().power, 75);
        assert!(item.set("power", "fast").is_err());
    }

    #[test]
    fn items_with_the_same_values_are_equal_in_any_field_order() {
        let mut first = Record::new();
        first.set("a", 1);
        first.set("b", 2);
        let mut second = Record::new();
        second.set("b", 2);
        second.set("a", 1);

        assert_eq!(first, second);
        assert_eq!(Item::new(first), Item::new(second.clone()));

        second.set("b", 3);
        let mut third = Record::new();
        third.set("a", 1);
        third.set("b", 2);
        assert_ne!(Item::new(third), Item::new(second));
    }

    #[test]
    fn pk_falls_back_to_descriptor_identity_field() {
        let descriptor = Descriptor::builder()
            .label("Part")
            .fields(["code", "name"])
            .pk("code")
            .build();
        let mut record = Record::with_descriptor(descriptor);
        record.set("code", "X1");

        assert_eq!(Item::new(record).pk(), Value::from("X1"));
    }

    #[test]
    fn equality_is_identity_or_field_values() {
        let a = Item::new(Engine { id: 1, power: 2 });
        let b = Item::new(Engine { id: 1, power: 2 });
        let c = Item::new(Engine { id: 2, power: 2 });

        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn only_described_items_are_introspectable() {
        let plain = Item::new(Record::new());
        let described = Item::new(Record::with_descriptor(Descriptor::new("Car", ["speed"])));

        assert_eq!(plain.known_names(), None);
        assert_eq!(described.known_names(), Some(vec!["speed".to_string()]));
    }
}
