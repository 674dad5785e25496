//! The in-memory query set.
//!
//! [`MockSet`] holds an ordered list of [`Item`] handles and exposes the
//! chainable query surface. Derived sets (filter, exclude, order_by, ...)
//! share item handles with the set they came from and remember it as their
//! parent, so deleting through any of them removes the items everywhere.

use std::{
    any::Any,
    cell::RefCell,
    fmt,
    ops::Range,
    rc::{Rc, Weak},
};

use rand::seq::SliceRandom;
use tracing::{debug, trace};

use mockset_core::{
    descriptor::Descriptor,
    error::{MockError, MockResult},
    event::{Event, EventRegistry},
    model::{Item, Related, RelatedSet},
    page::{Page, PageRequest},
    query::Query,
    value::{FromValue, Value},
};

use crate::{
    combinator::Combinator,
    matcher::is_match,
    resolver::{Mode, resolve, resolve_value},
};

pub(crate) struct SetState {
    pub(crate) items: Vec<Item>,
    pub(crate) descriptor: Option<Descriptor>,
    pub(crate) parent: Option<MockSet>,
    pub(crate) children: Vec<Weak<RefCell<SetState>>>,
    pub(crate) events: EventRegistry,
    pub(crate) annotations: Vec<String>,
    pub(crate) ordered: bool,
}

/// An in-memory, chainable emulation of a query set.
///
/// `MockSet` is a cheap handle: clones refer to the same set and compare
/// equal. It is single-threaded (`!Send`); event handlers run synchronously
/// after the set has released its internal borrow, and a handler that
/// mutates the set firing it is out of contract.
///
/// # Example
///
/// ```ignore
/// use mockset::prelude::*;
///
/// let cars = MockSet::with_items([
///     record! { "id" => 1, "speed" => 90 },
///     record! { "id" => 2, "speed" => 140 },
/// ]);
///
/// let fast = cars.filter(lookups! { "speed__gt" => 100 })?;
/// assert_eq!(fast.count(), 1);
/// ```
#[derive(Clone)]
pub struct MockSet(pub(crate) Rc<RefCell<SetState>>);

impl MockSet {
    /// Creates an empty, unbound set.
    pub fn new() -> Self {
        Self::from_state(SetState {
            items: Vec::new(),
            descriptor: None,
            parent: None,
            children: Vec::new(),
            events: EventRegistry::new(),
            annotations: Vec::new(),
            ordered: false,
        })
    }

    /// Creates an unbound set seeded with `items`.
    pub fn with_items<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Item>,
    {
        let set = Self::new();
        set.add(items);
        set
    }

    /// Creates a new [`MockSetBuilder`].
    pub fn builder() -> MockSetBuilder {
        MockSetBuilder::default()
    }

    /// Creates a set bound to `descriptor`, then seeds it with `items`
    /// through [`MockSet::add`].
    pub fn new_collection<I, T>(descriptor: Option<Descriptor>, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Item>,
    {
        let builder = Self::builder().items(items);
        match descriptor {
            Some(descriptor) => builder.model(descriptor).build(),
            None => builder.build(),
        }
    }

    fn from_state(state: SetState) -> Self {
        Self(Rc::new(RefCell::new(state)))
    }

    /// Creates a set derived from this one: same descriptor and tracked
    /// annotations, this set as parent, no event handlers.
    pub(crate) fn derive(&self, items: Vec<Item>) -> MockSet {
        let (descriptor, annotations) = {
            let state = self.0.borrow();
            (state.descriptor.clone(), state.annotations.clone())
        };

        let child = Self::from_state(SetState {
            items,
            descriptor,
            parent: Some(self.clone()),
            children: Vec::new(),
            events: EventRegistry::new(),
            annotations,
            ordered: false,
        });

        let mut state = self.0.borrow_mut();
        state.children.retain(|child| child.strong_count() > 0);
        state.children.push(Rc::downgrade(&child.0));
        drop(state);

        trace!(count = child.len(), "derived set");
        child
    }

    /// Returns `true` if both handles refer to the same set.
    pub fn ptr_eq(&self, other: &MockSet) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The bound descriptor, if any.
    pub fn descriptor(&self) -> Option<Descriptor> {
        self.0.borrow().descriptor.clone()
    }

    /// Label of the bound model, used in error messages.
    pub fn model_label(&self) -> Option<String> {
        self.descriptor()
            .map(|descriptor| descriptor.label().to_string())
    }

    /// The set this one was derived from.
    pub fn parent(&self) -> Option<MockSet> {
        self.0.borrow().parent.clone()
    }

    /// Snapshot of the items, in order.
    pub fn items(&self) -> Vec<Item> {
        self.0.borrow().items.clone()
    }

    /// Iterates over a snapshot of the items.
    pub fn iter(&self) -> std::vec::IntoIter<Item> {
        self.items().into_iter()
    }

    /// Number of items.
    pub fn count(&self) -> usize {
        self.0.borrow().items.len()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.count()
    }

    /// Returns `true` when the set has no items.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns `true` when the set has items.
    pub fn exists(&self) -> bool {
        self.count() > 0
    }

    /// Returns `true` if the set was produced by `order_by`.
    pub fn ordered(&self) -> bool {
        self.0.borrow().ordered
    }

    /// Names of the annotations computed on this set's lineage.
    pub fn annotation_names(&self) -> Vec<String> {
        self.0.borrow().annotations.clone()
    }

    /// Registers an event handler on this set.
    pub fn on<F>(&self, event: Event, handler: F)
    where
        F: Fn(Event, &Item) + 'static,
    {
        self.0.borrow_mut().events.on(event, handler);
    }

    /// Fires `events` for `item` on this set's handlers.
    pub fn fire(&self, item: &Item, events: &[Event]) {
        let registry = self.0.borrow().events.clone();
        registry.fire(item, events);
    }

    /// Items matching `query`, in set order.
    ///
    /// Positional trees are applied first, each narrowing the candidates,
    /// then keyword lookups narrow further.
    pub(crate) fn matching(&self, query: &Query) -> MockResult<Vec<Item>> {
        let trees = query.trees()?;
        let mut results = self.items();

        for tree in trees {
            results = Combinator::filter_items(&results, tree)?;
        }

        for (path, target) in query.lookups() {
            let mut kept = Vec::with_capacity(results.len());
            for item in results {
                let (resolved, marker) = resolve(&item, path, Value::Null, Mode::Singular)?;
                if is_match(&resolved, target, marker)? {
                    kept.push(item);
                }
            }
            results = kept;
        }

        Ok(results)
    }

    /// Items matching `query`, as a derived set.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::ArgumentNotSupported`] for a positional
    /// expression argument, and any lookup resolution or comparison error.
    pub fn filter(&self, query: impl Into<Query>) -> MockResult<MockSet> {
        let query = query.into();
        let results = self.matching(&query)?;

        debug!(count = results.len(), total = self.count(), "filtered set");
        Ok(self.derive(results))
    }

    /// Items not matching `query`, as a derived set.
    ///
    /// # Errors
    ///
    /// Same as [`MockSet::filter`].
    pub fn exclude(&self, query: impl Into<Query>) -> MockResult<MockSet> {
        let query = query.into();
        let matched = self.matching(&query)?;
        let results = self
            .items()
            .into_iter()
            .filter(|item| !matched.iter().any(|other| other.ptr_eq(item)))
            .collect::<Vec<_>>();

        debug!(count = results.len(), total = self.count(), "excluded from set");
        Ok(self.derive(results))
    }

    /// Sorts by `fields`; `-field` sorts descending and `?` shuffles.
    ///
    /// Keys are applied from last to first with a stable sort, so earlier
    /// fields take precedence.
    ///
    /// # Errors
    ///
    /// Returns a field error if a field cannot be resolved.
    pub fn order_by(&self, fields: &[&str]) -> MockResult<MockSet> {
        let mut items = self.items();

        for field in fields.iter().rev() {
            if *field == "?" {
                items.shuffle(&mut rand::thread_rng());
                continue;
            }

            let (descending, name) = match field.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, *field),
            };

            let mut keyed = items
                .into_iter()
                .map(|item| Ok((resolve_value(&item, name, Mode::Singular)?, item)))
                .collect::<MockResult<Vec<_>>>()?;

            keyed.sort_by(|(a, _), (b, _)| {
                let ordering = a.sort_cmp(b);
                if descending { ordering.reverse() } else { ordering }
            });

            items = keyed.into_iter().map(|(_, item)| item).collect();
        }

        let sorted = self.derive(items);
        sorted.0.borrow_mut().ordered = true;
        Ok(sorted)
    }

    /// Drops items whose values over `fields` repeat an earlier item's.
    ///
    /// With no fields, all concrete fields are compared.
    ///
    /// # Errors
    ///
    /// Returns a field error if a field cannot be resolved.
    pub fn distinct(&self, fields: &[&str]) -> MockResult<MockSet> {
        let mut seen: Vec<Vec<Value>> = Vec::new();
        let mut results = Vec::new();

        for item in self.items() {
            let names = match fields {
                [] => self.concrete_field_names(&item),
                fields => fields.iter().map(|field| field.to_string()).collect(),
            };

            let key = names
                .iter()
                .map(|name| resolve_value(&item, name, Mode::Singular))
                .collect::<MockResult<Vec<_>>>()?;

            if !seen.contains(&key) {
                seen.push(key);
                results.push(item);
            }
        }

        Ok(self.derive(results))
    }

    /// Concrete field names of `item`: the descriptor's fields when bound,
    /// the item's own attributes otherwise.
    pub(crate) fn concrete_field_names(&self, item: &Item) -> Vec<String> {
        match self.descriptor().or_else(|| item.descriptor()) {
            Some(descriptor) => descriptor.field_names(),
            None => item.field_names(),
        }
    }

    /// The single item matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::DoesNotExist`] when nothing matches and
    /// [`MockError::MultipleObjectsReturned`] when several items do.
    pub fn get(&self, query: impl Into<Query>) -> MockResult<Item> {
        let mut results = self.matching(&query.into())?;

        match results.len() {
            0 => Err(self.does_not_exist()),
            1 => Ok(results.remove(0)),
            count => Err(self.multiple_objects_returned(count)),
        }
    }

    pub(crate) fn does_not_exist(&self) -> MockError {
        MockError::DoesNotExist {
            model: self.model_label(),
        }
    }

    pub(crate) fn multiple_objects_returned(&self, count: usize) -> MockError {
        MockError::MultipleObjectsReturned {
            model: self.model_label(),
            count,
        }
    }

    /// The first item, if any.
    pub fn first(&self) -> Option<Item> {
        self.0.borrow().items.first().cloned()
    }

    /// The last item, if any.
    pub fn last(&self) -> Option<Item> {
        self.0.borrow().items.last().cloned()
    }

    /// The item at `index`, if any.
    pub fn get_index(&self, index: usize) -> Option<Item> {
        self.0.borrow().items.get(index).cloned()
    }

    /// The items in `range`, clamped to the set, as a derived set.
    pub fn slice(&self, range: Range<usize>) -> MockSet {
        let items = self.items();
        let end = range.end.min(items.len());
        let start = range.start.min(end);

        self.derive(items[start..end].to_vec())
    }

    /// An empty derived set.
    pub fn none(&self) -> MockSet {
        self.derive(Vec::new())
    }

    /// The items in reverse order, as a derived set.
    pub fn reverse(&self) -> MockSet {
        let mut items = self.items();
        items.reverse();
        self.derive(items)
    }

    /// The latest item by `fields`, or by the descriptor's `get_latest_by`
    /// when no fields are given.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::DoesNotExist`] for an empty set and
    /// [`MockError::InvalidValue`] when there is no field to order by.
    pub fn latest(&self, fields: &[&str]) -> MockResult<Item> {
        let fields = self.latest_fields(fields)?;
        let reversed = fields
            .iter()
            .map(|field| match field.strip_prefix('-') {
                Some(name) => name.to_string(),
                None => format!("-{field}"),
            })
            .collect::<Vec<_>>();

        self.first_by(&reversed)
    }

    /// The earliest item by `fields`, or by the descriptor's `get_latest_by`
    /// when no fields are given.
    ///
    /// # Errors
    ///
    /// Same as [`MockSet::latest`].
    pub fn earliest(&self, fields: &[&str]) -> MockResult<Item> {
        let fields = self.latest_fields(fields)?;
        self.first_by(&fields)
    }

    fn latest_fields(&self, fields: &[&str]) -> MockResult<Vec<String>> {
        if !fields.is_empty() {
            return Ok(fields.iter().map(|field| field.to_string()).collect());
        }

        self.descriptor()
            .and_then(|descriptor| descriptor.get_latest_by())
            .map(|field| vec![field])
            .ok_or_else(|| {
                MockError::InvalidValue(
                    "earliest() and latest() require either fields as positional arguments or 'get_latest_by' in the model's Meta."
                        .into(),
                )
            })
    }

    fn first_by(&self, fields: &[String]) -> MockResult<Item> {
        let fields = fields.iter().map(String::as_str).collect::<Vec<_>>();

        self.order_by(&fields)?
            .first()
            .ok_or_else(|| self.does_not_exist())
    }

    /// Cuts one page out of the set.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::InvalidValue`] for a page out of range.
    pub fn paginate(&self, request: &PageRequest) -> MockResult<Page<Item>> {
        request.paginate(self.items())
    }

    /// Returns this set unchanged.
    pub fn all(&self) -> MockSet {
        self.clone()
    }

    /// Returns this set unchanged; field deferral has no meaning in memory.
    pub fn only(&self, _fields: &[&str]) -> MockSet {
        self.clone()
    }

    /// Returns this set unchanged; field deferral has no meaning in memory.
    pub fn defer(&self, _fields: &[&str]) -> MockSet {
        self.clone()
    }

    /// Returns this set unchanged; there is only one database.
    pub fn using(&self, _alias: &str) -> MockSet {
        self.clone()
    }

    /// Returns this set unchanged; relations are always loaded.
    pub fn select_related(&self, _fields: &[&str]) -> MockSet {
        self.clone()
    }

    /// Returns this set unchanged; relations are always loaded.
    pub fn prefetch_related(&self, _lookups: &[&str]) -> MockSet {
        self.clone()
    }

    /// Returns this set unchanged; there are no row locks.
    pub fn select_for_update(&self) -> MockSet {
        self.clone()
    }

    /// Returns this set unchanged.
    pub fn iterator(&self) -> MockSet {
        self.clone()
    }
}

impl Default for MockSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MockSet {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for MockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Items are left out: relations make them cyclic.
        match self.0.try_borrow() {
            Ok(state) => f
                .debug_struct("MockSet")
                .field("model", &state.descriptor.as_ref().map(|descriptor| descriptor.label()))
                .field("count", &state.items.len())
                .field("ordered", &state.ordered)
                .finish(),
            Err(_) => write!(f, "MockSet(<borrowed>)"),
        }
    }
}

impl IntoIterator for &MockSet {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Related for MockSet {
    fn related_items(&self) -> Vec<Item> {
        self.items()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<MockSet> for Value {
    fn from(set: MockSet) -> Self {
        Value::Set(RelatedSet::new(set))
    }
}

impl From<&MockSet> for Value {
    fn from(set: &MockSet) -> Self {
        Value::Set(RelatedSet::new(set.clone()))
    }
}

impl FromValue for MockSet {
    fn from_value(value: Value) -> MockResult<Self> {
        match &value {
            Value::Set(related) => related
                .downcast_ref::<MockSet>()
                .cloned()
                .ok_or_else(|| MockError::InvalidValue("expected a mock set value".into())),
            Value::Null => Ok(MockSet::new()),
            other => Err(MockError::InvalidValue(format!(
                "expected set value, got {} ({other})",
                other.type_name()
            ))),
        }
    }
}

/// Builder for creating [`MockSet`] instances.
///
/// Items are added after the model and handlers are in place, so seeding
/// backfills described fields and fires `added`/`saved`.
#[derive(Default)]
pub struct MockSetBuilder {
    descriptor: Option<Descriptor>,
    items: Vec<Item>,
    events: EventRegistry,
}

impl MockSetBuilder {
    /// Binds the set to a model descriptor.
    pub fn model(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Adds seed items.
    pub fn items<I, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Item>,
    {
        self.items.extend(items.into_iter().map(Into::into));
        self
    }

    /// Registers an event handler before seeding.
    pub fn on<F>(mut self, event: Event, handler: F) -> Self
    where
        F: Fn(Event, &Item) + 'static,
    {
        self.events.on(event, handler);
        self
    }

    /// Uses `events` as the set's handler registry.
    pub fn events(mut self, events: EventRegistry) -> Self {
        self.events = events;
        self
    }

    /// Builds the set and seeds it.
    pub fn build(self) -> MockSet {
        let set = MockSet::from_state(SetState {
            items: Vec::new(),
            descriptor: self.descriptor,
            parent: None,
            children: Vec::new(),
            events: self.events,
            annotations: Vec::new(),
            ordered: false,
        });

        set.add(self.items);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockset_core::{lookups, query::Q, record};

    fn foo_bar() -> MockSet {
        MockSet::with_items([
            record! { "foo" => 1, "bar" => "a" },
            record! { "foo" => 1, "bar" => "c" },
            record! { "foo" => 2, "bar" => "b" },
        ])
    }

    fn bars(set: &MockSet) -> Vec<Value> {
        set.iter()
            .map(|item| item.get("bar").unwrap_or_default())
            .collect()
    }

    #[test]
    fn handles_compare_by_identity() {
        let set = MockSet::new();

        assert_eq!(set, set.clone());
        assert_ne!(set, MockSet::new());
    }

    #[test]
    fn filter_keeps_set_order() {
        let set = foo_bar();
        let result = set.filter(Q::new("bar", "b") | Q::new("bar", "a")).unwrap();

        assert_eq!(bars(&result), vec![Value::from("a"), Value::from("b")]);
        assert_eq!(result.parent(), Some(set));
    }

    #[test]
    fn lookups_narrow_after_trees() {
        let result = foo_bar()
            .filter(Query::builder().q(Q::new("foo", 1)).lookup("bar__in", vec!["c", "b"]).build())
            .unwrap();

        assert_eq!(bars(&result), vec![Value::from("c")]);
    }

    #[test]
    fn empty_query_matches_everything() {
        assert_eq!(foo_bar().filter(Query::new()).unwrap().count(), 3);
    }

    #[test]
    fn exclude_is_the_complement() {
        let result = foo_bar().exclude(lookups! { "foo" => 1 }).unwrap();

        assert_eq!(bars(&result), vec![Value::from("b")]);
    }

    #[test]
    fn order_by_applies_keys_right_to_left() {
        let set = foo_bar();

        let ascending = set.order_by(&["foo", "bar"]).unwrap();
        let mixed = set.order_by(&["-foo", "-bar"]).unwrap();

        assert_eq!(bars(&ascending), vec![Value::from("a"), Value::from("c"), Value::from("b")]);
        assert_eq!(bars(&mixed), vec![Value::from("b"), Value::from("c"), Value::from("a")]);
        assert!(ascending.ordered());
        assert!(!set.ordered());
    }

    #[test]
    fn shuffle_keeps_every_item() {
        assert_eq!(foo_bar().order_by(&["?"]).unwrap().count(), 3);
    }

    #[test]
    fn distinct_keeps_first_seen() {
        let result = foo_bar().distinct(&["foo"]).unwrap();

        assert_eq!(bars(&result), vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn get_reports_missing_and_duplicate_matches() {
        let set = foo_bar();

        assert_eq!(set.get(lookups! { "bar" => "c" }).unwrap().get("foo"), Some(Value::Int(1)));
        assert_eq!(set.get(lookups! { "foo" => 9 }).unwrap_err(), MockError::DoesNotExist { model: None });
        assert_eq!(
            set.get(lookups! { "foo" => 1 }).unwrap_err(),
            MockError::MultipleObjectsReturned { model: None, count: 2 }
        );
    }

    #[test]
    fn latest_and_earliest_use_get_latest_by() {
        let descriptor = Descriptor::builder()
            .label("Car")
            .fields(["foo", "bar"])
            .get_latest_by("bar")
            .build();
        let set = MockSet::new_collection(Some(descriptor), foo_bar().items());

        assert_eq!(set.latest(&[]).unwrap().get("bar"), Some(Value::from("c")));
        assert_eq!(set.earliest(&["-foo"]).unwrap().get("bar"), Some(Value::from("b")));
        assert!(matches!(MockSet::new().latest(&[]), Err(MockError::InvalidValue(_))));
        assert_eq!(
            set.none().latest(&[]).unwrap_err().to_string(),
            "Car matching query does not exist."
        );
    }

    #[test]
    fn slicing_and_reversal_derive_new_sets() {
        let set = foo_bar();

        assert_eq!(bars(&set.slice(1..10)), vec![Value::from("c"), Value::from("b")]);
        assert_eq!(bars(&set.reverse()), vec![Value::from("b"), Value::from("c"), Value::from("a")]);
        assert!(set.none().is_empty());
        assert_eq!(set.get_index(2).and_then(|item| item.get("foo")), Some(Value::Int(2)));
    }

    #[test]
    fn chain_methods_return_the_same_set() {
        let set = foo_bar();

        assert_eq!(set.all(), set);
        assert_eq!(set.only(&["foo"]).select_related(&["make"]).using("default"), set);
        assert_eq!(set.prefetch_related(&[]).defer(&["bar"]).select_for_update().iterator(), set);
    }

    #[test]
    fn sets_round_trip_through_values() {
        let set = foo_bar();
        let value = Value::from(&set);

        assert_eq!(MockSet::from_value(value).unwrap(), set);
    }
}
