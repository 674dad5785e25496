//! Save emulation for models backed by a patched set.

use tracing::debug;

use mockset_core::{
    descriptor::Descriptor,
    error::MockResult,
    event::Event,
    model::Item,
    query::Q,
    record::Record,
    value::Value,
};
use mockset_memory::MockSet;

use crate::manager::{Managed, PatchGuard, patch_manager};

/// Routes a model's manager to a fresh set and emulates saving into it.
///
/// Inserts assign `pk = max(existing pks) + 1`; updates write the non-null
/// fields of the row with the given pk. The manager patch is undone when the
/// mocker is dropped.
///
/// # Example
///
/// ```ignore
/// let mocker = ModelMocker::for_model::<Car>();
/// let car = mocker.save(Car { speed: 90, ..Default::default() })?;
///
/// assert_eq!(car.pk(), Value::Int(1));
/// assert_eq!(Car::objects()?.count(), 1);
/// ```
#[derive(Debug)]
pub struct ModelMocker {
    set: MockSet,
    _guard: PatchGuard,
}

impl ModelMocker {
    /// Patches the manager of the model described by `descriptor`.
    pub fn new(descriptor: Descriptor) -> Self {
        let label = descriptor.label().to_string();
        let set = MockSet::builder().model(descriptor).build();
        let guard = patch_manager(label, set.clone());

        Self { set, _guard: guard }
    }

    /// Patches the manager of `M`.
    pub fn for_model<M: Managed>() -> Self {
        Self::new(M::model_descriptor())
    }

    /// The set standing in for the model's table.
    pub fn objects(&self) -> MockSet {
        self.set.clone()
    }

    /// Saves `item`: an item whose pk matches a stored row updates that row,
    /// anything else is inserted.
    ///
    /// # Errors
    ///
    /// Returns any error from assigning fields.
    pub fn save(&self, item: impl Into<Item>) -> MockResult<Item> {
        let item = item.into();
        let pk = item.pk();

        if !pk.is_null() {
            let values = item
                .field_names()
                .into_iter()
                .filter(|name| *name != item.pk_name())
                .filter_map(|name| item.get(&name).map(|value| (name, value)))
                .collect::<Record>();

            if self.update(&pk, &values)? {
                return self.set.get(Q::new("pk", pk));
            }
        }

        self.insert(item.clone())?;
        Ok(item)
    }

    /// Assigns the next pk to `item` and adds it, returning the pk.
    ///
    /// # Errors
    ///
    /// Returns any error from assigning the pk.
    pub fn insert(&self, item: impl Into<Item>) -> MockResult<Value> {
        let item = item.into();

        let next = self
            .set
            .iter()
            .filter_map(|existing| existing.pk().as_i64())
            .max()
            .unwrap_or(0)
            + 1;

        item.set(&item.pk_name(), next)?;
        self.set.add([item]);

        debug!(pk = next, "inserted row");
        Ok(Value::Int(next))
    }

    /// Writes the non-null `values` onto the row with `pk`.
    ///
    /// Returns `false` when no row has that pk.
    ///
    /// # Errors
    ///
    /// Returns any error from matching or assigning fields.
    pub fn update(&self, pk: &Value, values: &Record) -> MockResult<bool> {
        let matched = self.set.filter(Q::new("pk", pk.clone()))?;
        let Some(row) = matched.first() else {
            return Ok(false);
        };

        for (name, value) in values.iter().filter(|(_, value)| !value.is_null()) {
            row.set(name, value.clone())?;
        }
        self.set.fire(&row, &[Event::Updated, Event::Saved]);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::objects;
    use mockset_core::record;

    fn mocker() -> ModelMocker {
        ModelMocker::new(Descriptor::new("Car", ["id", "speed", "make"]))
    }

    #[test]
    fn inserts_number_rows_from_one() {
        let mocker = mocker();

        let first = mocker.insert(record! { "speed" => 10 }).unwrap();
        let second = mocker.insert(record! { "speed" => 20 }).unwrap();

        assert_eq!((first, second), (Value::Int(1), Value::Int(2)));
        assert_eq!(objects("Car").unwrap().count(), 2);
    }

    #[test]
    fn updates_skip_null_values() {
        let mocker = mocker();
        mocker.insert(record! { "speed" => 10, "make" => "Ford" }).unwrap();

        let updated = mocker
            .update(&Value::Int(1), &record! { "speed" => 30, "make" => Value::Null })
            .unwrap();

        let row = mocker.objects().first().unwrap();
        assert!(updated);
        assert_eq!(row.get("speed"), Some(Value::Int(30)));
        assert_eq!(row.get("make"), Some(Value::from("Ford")));
        assert!(!mocker.update(&Value::Int(9), &record! {}).unwrap());
    }

    #[test]
    fn save_inserts_new_and_updates_existing_rows() {
        let mocker = mocker();

        let car = mocker.save(record! { "speed" => 10 }).unwrap();
        assert_eq!(car.pk(), Value::Int(1));

        let changed = mocker.save(record! { "id" => 1, "speed" => 99 }).unwrap();
        assert!(changed.ptr_eq(&car));
        assert_eq!(car.get("speed"), Some(Value::Int(99)));
        assert_eq!(mocker.objects().count(), 1);
    }

    #[test]
    fn dropping_the_mocker_restores_the_manager() {
        drop(mocker());

        assert!(objects("Car").is_err());
    }
}
