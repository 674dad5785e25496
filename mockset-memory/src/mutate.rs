//! Mutating operations: add, create, update, delete and their combinations.
//!
//! Mutations change the set in place and fire lifecycle events on the set's
//! own registry once its internal borrow has been released.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use mockset_core::{
    descriptor::Descriptor,
    error::{MockError, MockResult},
    event::Event,
    model::{Item, PK},
    query::{LOOKUP_SEP, Query},
    record::Record,
    value::Value,
};

use crate::set::MockSet;

/// Outcome of a delete: the total removed and a count per model label.
pub type Deleted = (usize, BTreeMap<String, usize>);

impl MockSet {
    /// Appends `items`, firing `added` then `saved` for each.
    ///
    /// When the set is bound to a descriptor, stand-in records gain the
    /// descriptor and a null value for every described field they lack.
    pub fn add<I, T>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<Item>,
    {
        let descriptor = self.descriptor();

        for item in items {
            let item = item.into();

            if let Some(descriptor) = &descriptor {
                if let Some(mut record) = item.downcast_mut::<Record>() {
                    record.bind(descriptor.clone());
                }
            }

            self.0.borrow_mut().items.push(item.clone());
            trace!(label = %item.label(), "added item");

            self.fire(&item, &[Event::Added, Event::Saved]);
        }
    }

    /// Instantiates the bound model with `attrs` and adds it.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::ModelNotSpecified`] on an unbound set and a
    /// field error for an attribute the model does not have.
    pub fn create(&self, attrs: Record) -> MockResult<Item> {
        let descriptor = self.descriptor().ok_or(MockError::ModelNotSpecified)?;

        for key in attrs.keys() {
            if !is_known_field(&descriptor, key) {
                return Err(MockError::unknown_field(key, descriptor.field_names()));
            }
        }

        let mut model = descriptor.instantiate();
        for (key, value) in attrs.iter() {
            let name = if key == PK { descriptor.pk_name() } else { key };
            model.set_field(name, value.clone())?;
        }

        let item = Item::from_boxed(model);
        self.add([item.clone()]);

        debug!(label = descriptor.label(), "created item");
        Ok(item)
    }

    /// Sets `attrs` on every item, firing `updated` then `saved` for each.
    ///
    /// Returns the number of items updated. A value a model rejects leaves
    /// every item as it was and fires nothing.
    ///
    /// # Errors
    ///
    /// Returns a field error for a relation path such as `make__name`, or
    /// for a field the bound model does not have, and any error a model
    /// raises while assigning a value.
    pub fn update(&self, attrs: Record) -> MockResult<usize> {
        self.check_updatable(&attrs)?;

        let items = self.items();
        assign_all(&items, &attrs)?;
        for item in &items {
            self.fire(item, &[Event::Updated, Event::Saved]);
        }

        debug!(count = items.len(), "updated items");
        Ok(items.len())
    }

    fn check_updatable(&self, attrs: &Record) -> MockResult<()> {
        let descriptor = self.descriptor();

        for key in attrs.keys() {
            if key.contains(LOOKUP_SEP) {
                return Err(MockError::not_updatable(key));
            }

            if let Some(descriptor) = &descriptor {
                if !is_known_field(descriptor, key) {
                    return Err(MockError::unknown_field(key, descriptor.field_names()));
                }
            }
        }

        Ok(())
    }


    /// Returns the single item matching `lookups`, creating it from
    /// `lookups` and `defaults` when nothing matches.
    ///
    /// The flag is `true` when the item was created.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::ModelNotSpecified`] for `defaults` on an unbound
    /// set, [`MockError::MultipleObjectsReturned`] when several items match,
    /// and any error from [`MockSet::create`].
    pub fn get_or_create(&self, lookups: Record, defaults: Option<Record>) -> MockResult<(Item, bool)> {
        match self.find_one(&lookups, defaults.as_ref())? {
            Some(item) => Ok((item, false)),
            None => Ok((self.create(creation_attrs(&lookups, defaults.as_ref()))?, true)),
        }
    }

    /// Like [`MockSet::get_or_create`], but an existing match is updated
    /// with `defaults`, firing `updated` then `saved` even when there are
    /// no defaults to write.
    ///
    /// # Errors
    ///
    /// Same as [`MockSet::get_or_create`], plus the update field checks.
    pub fn update_or_create(&self, lookups: Record, defaults: Option<Record>) -> MockResult<(Item, bool)> {
        match self.find_one(&lookups, defaults.as_ref())? {
            Some(item) => {
                let defaults = defaults.unwrap_or_default();
                self.check_updatable(&defaults)?;
                assign_all(std::slice::from_ref(&item), &defaults)?;

                self.fire(&item, &[Event::Updated, Event::Saved]);
                Ok((item, false))
            }
            None => Ok((self.create(creation_attrs(&lookups, defaults.as_ref()))?, true)),
        }
    }

    fn find_one(&self, lookups: &Record, defaults: Option<&Record>) -> MockResult<Option<Item>> {
        if defaults.is_some() && self.descriptor().is_none() {
            return Err(MockError::ModelNotSpecified);
        }

        let mut results = self.matching(&Query::from(lookups.clone()))?;

        match results.len() {
            0 => Ok(None),
            1 => Ok(Some(results.remove(0))),
            count => Err(self.multiple_objects_returned(count)),
        }
    }

    /// Removes the items matching `query` (all items for an empty query).
    ///
    /// Removal reaches the whole lineage: the set itself, every set it was
    /// derived from and every derived set still alive, each once. Each set
    /// fires `deleted` on its own handlers for the items it lost.
    ///
    /// # Errors
    ///
    /// Returns any error raised while matching `query`.
    pub fn delete(&self, query: impl Into<Query>) -> MockResult<Deleted> {
        let doomed = self.matching(&query.into())?;

        let mut per_label = BTreeMap::new();
        for item in &doomed {
            *per_label.entry(item.label()).or_insert(0) += 1;
        }

        for set in self.lineage() {
            let (removed, events) = {
                let mut state = set.0.borrow_mut();
                let (removed, kept) = std::mem::take(&mut state.items)
                    .into_iter()
                    .partition::<Vec<_>, _>(|item| doomed.iter().any(|other| other.ptr_eq(item)));
                state.items = kept;
                (removed, state.events.clone())
            };

            trace!(removed = removed.len(), remaining = set.count(), "removed from set");
            for item in &removed {
                events.fire(item, &[Event::Deleted]);
            }
        }

        debug!(removed = doomed.len(), "deleted items");
        Ok((doomed.len(), per_label))
    }

    /// Removes every item. Same as `delete` with an empty query.
    ///
    /// # Errors
    ///
    /// Same as [`MockSet::delete`].
    pub fn clear(&self) -> MockResult<Deleted> {
        self.delete(Query::new())
    }

    /// Alias of [`MockSet::delete`].
    ///
    /// # Errors
    ///
    /// Same as [`MockSet::delete`].
    pub fn remove(&self, query: impl Into<Query>) -> MockResult<Deleted> {
        self.delete(query)
    }

    /// Replaces the items matching `query` with `items`.
    ///
    /// # Errors
    ///
    /// Same as [`MockSet::delete`].
    pub fn set<I, T>(&self, items: I, query: impl Into<Query>) -> MockResult<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<Item>,
    {
        self.delete(query)?;
        self.add(items);
        Ok(())
    }

    /// The root of this set's derivation chain and every live set derived
    /// from it, each once.
    fn lineage(&self) -> Vec<MockSet> {
        let mut root = self.clone();
        while let Some(parent) = root.parent() {
            root = parent;
        }

        let mut visited: Vec<MockSet> = Vec::new();
        let mut pending = vec![root];

        while let Some(set) = pending.pop() {
            if visited.iter().any(|seen| seen.ptr_eq(&set)) {
                continue;
            }

            let children = set
                .0
                .borrow()
                .children
                .iter()
                .filter_map(|child| child.upgrade())
                .map(MockSet)
                .collect::<Vec<_>>();

            pending.extend(children);
            visited.push(set);
        }

        visited
    }
}

/// Writes `attrs` onto every item, or onto none of them.
fn assign_all(items: &[Item], attrs: &Record) -> MockResult<()> {
    let mut written = Vec::with_capacity(items.len());

    for item in items {
        let mut previous = Vec::new();
        let outcome = attrs.iter().try_for_each(|(key, value)| {
            let name = if key == PK { item.pk_name() } else { key.to_string() };
            let old = item.model().field(&name);

            previous.push((name.clone(), old));
            item.set(&name, value.clone())
        });
        written.push((item, previous));

        if let Err(err) = outcome {
            restore(&written);
            return Err(err);
        }
    }

    Ok(())
}

fn restore(written: &[(&Item, Vec<(String, Option<Value>)>)]) {
    for (item, previous) in written.iter().rev() {
        for (name, old) in previous.iter().rev() {
            match old {
                Some(value) => {
                    if let Err(err) = item.set(name, value.clone()) {
                        warn!(field = %name, error = %err, "could not restore field");
                    }
                }
                None => {
                    if let Some(mut record) = item.downcast_mut::<Record>() {
                        record.remove(name);
                    }
                }
            }
        }
    }
}

fn is_known_field(descriptor: &Descriptor, name: &str) -> bool {
    name == PK || descriptor.has_field(name)
}

/// Plain lookups (no `__` path) overlaid with `defaults`.
fn creation_attrs(lookups: &Record, defaults: Option<&Record>) -> Record {
    let mut attrs = Record::new();

    for (key, value) in lookups.iter() {
        if !key.contains(LOOKUP_SEP) {
            attrs.set(key, value.clone());
        }
    }

    if let Some(defaults) = defaults {
        for (key, value) in defaults.iter() {
            attrs.set(key, value.clone());
        }
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockset_core::{lookups, record, value::Value};
    use std::{cell::RefCell, rc::Rc};

    fn car_descriptor() -> Descriptor {
        Descriptor::new("Car", ["id", "make", "speed"])
    }

    fn cars() -> MockSet {
        MockSet::new_collection(
            Some(car_descriptor()),
            [
                record! { "id" => 1, "speed" => 90 },
                record! { "id" => 2, "speed" => 140 },
                record! { "id" => 3, "speed" => 200 },
            ],
        )
    }

    fn recorder(set: &MockSet) -> Rc<RefCell<Vec<(Event, Value)>>> {
        let calls = Rc::new(RefCell::new(Vec::new()));

        for event in [Event::Added, Event::Updated, Event::Saved, Event::Deleted] {
            let calls = calls.clone();
            set.on(event, move |event, item| calls.borrow_mut().push((event, item.pk())));
        }

        calls
    }

    #[test]
    fn add_backfills_described_fields() {
        let set = cars();
        let first = set.first().unwrap();

        assert_eq!(first.get("make"), Some(Value::Null));
        assert_eq!(first.label(), "Car");
    }

    #[test]
    fn add_fires_added_then_saved_once() {
        let set = MockSet::new();
        let calls = recorder(&set);

        set.add([record! { "id" => 5 }]);

        assert_eq!(
            *calls.borrow(),
            vec![(Event::Added, Value::Int(5)), (Event::Saved, Value::Int(5))]
        );
    }

    #[test]
    fn create_needs_a_model() {
        assert_eq!(
            MockSet::new().create(record! { "id" => 1 }).unwrap_err(),
            MockError::ModelNotSpecified
        );
    }

    #[test]
    fn create_rejects_unknown_fields() {
        let err = cars().create(record! { "colour" => "red" }).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Cannot resolve keyword 'colour' into field. Choices are 'id', 'make', 'speed'."
        );
    }

    #[test]
    fn created_items_are_found_by_get() {
        let set = cars();

        let created = set.create(record! { "id" => 4, "speed" => 50 }).unwrap();
        let found = set.get(lookups! { "speed" => 50 }).unwrap();

        assert!(created.ptr_eq(&found));
        assert_eq!(found.get("make"), Some(Value::Null));
        assert_eq!(set.count(), 4);
    }

    #[test]
    fn update_sets_fields_and_fires_events() {
        let set = cars();
        let fast = set.filter(lookups! { "speed__gt" => 100 }).unwrap();
        let calls = recorder(&fast);

        let updated = fast.update(record! { "make" => "Ford" }).unwrap();

        assert_eq!(updated, 2);
        assert_eq!(set.get_index(2).and_then(|item| item.get("make")), Some(Value::from("Ford")));
        assert_eq!(set.get_index(0).and_then(|item| item.get("make")), Some(Value::Null));
        assert_eq!(calls.borrow().len(), 4);
    }

    #[test]
    fn update_rejects_relation_paths() {
        let err = cars().update(record! { "make__name" => "Ford" }).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Cannot update model field 'make__name' (only non-relations and foreign keys permitted)."
        );
    }

    #[test]
    fn get_or_create_merges_plain_lookups_with_defaults() {
        let set = cars();

        let (item, created) = set
            .get_or_create(record! { "id" => 9, "speed__gt" => 0 }, Some(record! { "make" => "Saab" }))
            .unwrap();

        assert!(created);
        assert_eq!(item.get("id"), Some(Value::Int(9)));
        assert_eq!(item.get("make"), Some(Value::from("Saab")));
        assert_eq!(item.get("speed"), Some(Value::Null));

        let (again, created) = set.get_or_create(record! { "id" => 9 }, None).unwrap();
        assert!(!created);
        assert!(again.ptr_eq(&item));
    }

    #[test]
    fn defaults_need_a_model() {
        let set = MockSet::with_items([record! { "id" => 1 }]);

        assert_eq!(
            set.get_or_create(record! { "id" => 1 }, Some(record! { "speed" => 1 }))
                .unwrap_err(),
            MockError::ModelNotSpecified
        );
    }

    #[test]
    fn update_or_create_updates_an_existing_match() {
        let set = cars();
        let calls = recorder(&set);

        let (item, created) = set
            .update_or_create(record! { "id" => 2 }, Some(record! { "speed" => 10 }))
            .unwrap();

        assert!(!created);
        assert_eq!(item.get("speed"), Some(Value::Int(10)));
        assert_eq!(
            *calls.borrow(),
            vec![(Event::Updated, Value::Int(2)), (Event::Saved, Value::Int(2))]
        );
    }

    #[test]
    fn update_or_create_without_defaults_still_saves_the_match() {
        let set = cars();
        let calls = recorder(&set);

        let (item, created) = set.update_or_create(record! { "id" => 3 }, None).unwrap();

        assert!(!created);
        assert_eq!(item.get("speed"), Some(Value::Int(200)));
        assert_eq!(
            *calls.borrow(),
            vec![(Event::Updated, Value::Int(3)), (Event::Saved, Value::Int(3))]
        );
    }

    #[test]
    fn root_handlers_see_each_deletion_once() {
        let set = cars();
        let fast = set.filter(lookups! { "speed__gt" => 100 }).unwrap();
        let fastest = fast.filter(lookups! { "speed__gt" => 150 }).unwrap();
        let calls = recorder(&set);

        fastest.delete(lookups! { "id" => 3 }).unwrap();
        fast.delete(lookups! { "id" => 2 }).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![(Event::Deleted, Value::Int(3)), (Event::Deleted, Value::Int(2))]
        );
        assert_eq!(set.count(), 1);
        assert!(fast.is_empty());
        assert!(fastest.is_empty());
    }

    #[test]
    fn multiple_matches_fail_get_or_create() {
        let err = cars()
            .get_or_create(record! { "speed__gt" => 100 }, None)
            .unwrap_err();

        assert!(err.is_multiple_objects_returned());
    }

    #[test]
    fn delete_from_derived_set_reaches_the_source() {
        let set = cars();
        let fast = set.filter(lookups! { "speed__gt" => 100 }).unwrap();

        let (count, per_label) = fast.delete(lookups! { "id" => 3 }).unwrap();

        assert_eq!(count, 1);
        assert_eq!(per_label.get("Car"), Some(&1));
        assert_eq!(fast.count(), 1);
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn delete_from_source_reaches_derived_sets() {
        let set = cars();
        let fast = set.filter(lookups! { "speed__gt" => 100 }).unwrap();
        let calls = recorder(&fast);

        set.delete(lookups! { "speed" => 200 }).unwrap();

        assert_eq!(fast.count(), 1);
        assert_eq!(*calls.borrow(), vec![(Event::Deleted, Value::Int(3))]);
    }

    #[test]
    fn clear_removes_everything() {
        let set = cars();
        let (count, _) = set.clear().unwrap();

        assert_eq!(count, 3);
        assert!(set.is_empty());
    }

    #[test]
    fn set_replaces_matching_items() {
        let set = cars();

        set.set([record! { "id" => 7, "speed" => 1 }], lookups! { "speed__gte" => 140 })
            .unwrap();

        let ids = set.iter().map(|item| item.pk()).collect::<Vec<_>>();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(7)]);
    }
}
