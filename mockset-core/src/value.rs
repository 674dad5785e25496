//! Dynamic values held by records and compared by lookups.
//!
//! [`Value`] is the single currency of the engine: record fields, lookup
//! targets, projection cells and aggregate results are all values. Numbers
//! compare across integer and float representations.

use bson::Bson;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer, ser::SerializeMap, ser::SerializeSeq};
use std::{cmp::Ordering, fmt};
use uuid::Uuid;

use crate::{
    error::{MockError, MockResult},
    model::{Item, RelatedSet},
    record::Record,
};

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value (`None` / SQL `NULL`).
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
    /// UUID identity value.
    Uuid(Uuid),
    /// Ordered list of values (tuples and array fields).
    List(Vec<Value>),
    /// A related model instance (forward relation).
    Object(Item),
    /// A related collection (reverse relation or nested set).
    Set(RelatedSet),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness as the emulated API sees it: null, `false`, zero, empty
    /// text and empty collections are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Text(value) => !value.is_empty(),
            Value::List(values) => !values.is_empty(),
            Value::Set(set) => !set.items().is_empty(),
            Value::Date(_) | Value::DateTime(_) | Value::Uuid(_) | Value::Object(_) => true,
        }
    }

    /// Returns the text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the numeric content widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the list elements, if this is a list value.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the related item, if this is an object value.
    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Value::Object(item) => Some(item),
            _ => None,
        }
    }

    /// Returns the related collection, if this is a set value.
    pub fn as_set(&self) -> Option<&RelatedSet> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    /// Returns `true` for values that behave as element containers in
    /// `contains`, `in` and `overlap` lookups.
    pub fn is_list_like(&self) -> bool {
        matches!(self, Value::List(_) | Value::Set(_))
    }

    /// Returns the elements of a list or set value, or `None` for scalars.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(values) => Some(values.clone()),
            Value::Set(set) => Some(
                set.items()
                    .into_iter()
                    .map(Value::Object)
                    .collect()
            ),
            _ => None,
        }
    }

    /// Name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Uuid(_) => "uuid",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Set(_) => "set",
        }
    }

    /// Total ordering used by `order_by`, `latest`, `dates` and the
    /// `max`/`min` aggregates.
    ///
    /// Values of different kinds order by kind: null, bool, number, text,
    /// date, datetime, uuid, list, object, set. Ints and floats share a
    /// rank; NaN sorts after every other number.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let (a, b) = (self.as_f64().unwrap_or(f64::NAN), other.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a
                .iter()
                .zip(b)
                .map(|(a, b)| a.sort_cmp(b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Value::Object(a), Value::Object(b)) => a.pk().sort_cmp(&b.pk()),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Date(_) => 4,
            Value::DateTime(_) => 5,
            Value::Uuid(_) => 6,
            Value::List(_) => 7,
            Value::Object(_) => 8,
            Value::Set(_) => 9,
        }
    }

    /// Returns `true` if `needle` equals any element of `self`.
    pub fn contains_element(&self, needle: &Value) -> bool {
        self.elements()
            .map(|elements| elements.iter().any(|element| element == needle))
            .unwrap_or(false)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a.same_items(b),
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            (Value::Uuid(a), Value::Uuid(b)) => a.partial_cmp(b),
            (Value::List(a), Value::List(b)) => a.partial_cmp(b),
            (Value::Object(a), Value::Object(b)) => a.pk().partial_cmp(&b.pk()),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(value) => write!(f, "{value:?}"),
            Value::Int(value) => write!(f, "{value:?}"),
            Value::Float(value) => write!(f, "{value:?}"),
            Value::Text(value) => write!(f, "{value:?}"),
            Value::Date(value) => write!(f, "{value:?}"),
            Value::DateTime(value) => write!(f, "{value:?}"),
            Value::Uuid(value) => write!(f, "{value:?}"),
            Value::List(values) => f.debug_list().entries(values).finish(),
            Value::Object(item) => write!(f, "{item:?}"),
            Value::Set(set) => write!(f, "{set:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value}"),
            Value::Date(value) => write!(f, "{value}"),
            Value::DateTime(value) => write!(f, "{value}"),
            Value::Uuid(value) => write!(f, "{value}"),
            Value::List(values) => write!(
                f,
                "[{}]",
                values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Object(item) => write!(f, "{} object ({})", item.label(), item.pk()),
            Value::Set(set) => write!(f, "<set of {}>", set.items().len()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Int(value) => serializer.serialize_i64(*value),
            Value::Float(value) => serializer.serialize_f64(*value),
            Value::Text(value) => serializer.serialize_str(value),
            Value::Date(value) => serializer.collect_str(value),
            Value::DateTime(value) => serializer.collect_str(&value.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Uuid(value) => serializer.collect_str(value),
            Value::List(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            // Identity when there is one, fields otherwise.
            Value::Object(item) => match item.pk() {
                Value::Null => {
                    let names = item.field_names();
                    let mut map = serializer.serialize_map(Some(names.len()))?;
                    for name in names {
                        map.serialize_entry(&name, &item.get(&name).unwrap_or_default())?;
                    }
                    map.end()
                }
                pk => pk.serialize(serializer),
            },
            Value::Set(set) => {
                let items = set.items();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Value::Object(item))?;
                }
                seq.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Int(value as i64)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32, usize);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value.naive_utc())
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<Item> for Value {
    fn from(value: Item) -> Self {
        Value::Object(value)
    }
}

impl From<&Item> for Value {
    fn from(value: &Item) -> Self {
        Value::Object(value.clone())
    }
}

impl From<RelatedSet> for Value {
    fn from(value: RelatedSet) -> Self {
        Value::Set(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Object(Item::new(value))
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(values: [T; N]) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((a, b): (A, B)) -> Self {
        Value::List(vec![a.into(), b.into()])
    }
}

impl From<Bson> for Value {
    fn from(bson: Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(value) => Value::Bool(value),
            Bson::Int32(value) => Value::Int(value as i64),
            Bson::Int64(value) => Value::Int(value),
            Bson::Double(value) => Value::Float(value),
            Bson::String(value) => Value::Text(value),
            Bson::DateTime(value) => Value::DateTime(value.to_chrono().naive_utc()),
            Bson::Array(values) => Value::List(values.into_iter().map(Value::from).collect()),
            Bson::Document(doc) => Value::from(Record::from_bson(doc)),
            _ => Value::Null, // Other types have no counterpart
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => Value::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(value) => Value::Text(value),
            serde_json::Value::Array(values) => {
                Value::List(values.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::from(Record::from_json_map(map)),
        }
    }
}

/// Conversion from a [`Value`] back into a concrete Rust type.
///
/// Implemented for every type `Value` converts from, so derived models can
/// accept assignments coming from `update` and `create`.
pub trait FromValue: Sized {
    /// Converts `value`, failing with [`MockError::InvalidValue`] on a type
    /// mismatch.
    fn from_value(value: Value) -> MockResult<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> MockResult<T> {
    Err(MockError::InvalidValue(format!(
        "expected {expected} value, got {} ({value})",
        value.type_name()
    )))
}

impl FromValue for Value {
    fn from_value(value: Value) -> MockResult<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Bool(value) => Ok(value),
            other => mismatch("bool", &other),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> MockResult<Self> {
                    match value {
                        Value::Int(number) => <$ty>::try_from(number).or_else(|_| {
                            mismatch(stringify!($ty), &Value::Int(number))
                        }),
                        other => mismatch(stringify!($ty), &other),
                    }
                }
            }
        )*
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> MockResult<Self> {
        match value.as_f64() {
            Some(number) => Ok(number),
            None => mismatch("float", &value),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> MockResult<Self> {
        f64::from_value(value).map(|number| number as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Text(text) => Ok(text),
            other => mismatch("text", &other),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Date(date) => Ok(date),
            other => mismatch("date", &other),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::DateTime(datetime) => Ok(datetime),
            other => mismatch("datetime", &other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Uuid(uuid) => Ok(uuid),
            other => mismatch("uuid", &other),
        }
    }
}

impl FromValue for Item {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Object(item) => Ok(item),
            other => mismatch("object", &other),
        }
    }
}

impl FromValue for RelatedSet {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Set(set) => Ok(set),
            other => mismatch("set", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::List(values) => values.into_iter().map(T::from_value).collect(),
            other => mismatch("list", &other),
        }
    }
}

/// A small insertion-ordered map keyed by [`Value`].
///
/// Values are not hashable (floats, related objects), so lookups are linear;
/// the sets this engine handles are sized by test fixtures.
#[derive(Clone, Debug)]
pub struct ValueMap<V> {
    entries: Vec<(Value, V)>,
}

impl<V> ValueMap<V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Inserts or replaces the entry for `key`, keeping the original
    /// position of a replaced key.
    pub fn insert(&mut self, key: Value, value: V) -> Option<V> {
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &Value) -> Option<&V> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &V)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(key, _)| key)
    }
}

impl<V> Default for ValueMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert!(Value::Int(2) < Value::Float(2.5));
        assert_eq!(Value::Int(3).partial_cmp(&Value::Text("3".into())), None);
    }

    #[test]
    fn nulls_sort_first() {
        let mut values = vec![Value::Int(2), Value::Null, Value::Int(1)];
        values.sort_by(Value::sort_cmp);

        assert_eq!(values, vec![Value::Null, Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn mixed_kinds_sort_by_kind() {
        let mut forward = vec![
            Value::from("b"),
            Value::Int(2),
            Value::Null,
            Value::Bool(true),
            Value::Float(1.5),
            Value::from("a"),
        ];
        let mut backward = forward.iter().rev().cloned().collect::<Vec<_>>();

        forward.sort_by(Value::sort_cmp);
        backward.sort_by(Value::sort_cmp);

        let expected = vec![
            Value::Null,
            Value::Bool(true),
            Value::Float(1.5),
            Value::Int(2),
            Value::from("a"),
            Value::from("b"),
        ];
        assert_eq!(forward, expected);
        assert_eq!(backward, expected);
        assert_eq!(Value::Int(3).sort_cmp(&Value::from("3")), Ordering::Less);
    }

    #[test]
    fn truthiness_follows_host_conventions() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }

    #[test]
    fn from_value_rejects_mismatched_types() {
        assert_eq!(i32::from_value(Value::Int(7)), Ok(7));
        assert_eq!(Option::<String>::from_value(Value::Null), Ok(None));
        assert!(String::from_value(Value::Int(7)).is_err());
        assert!(u8::from_value(Value::Int(300)).is_err());
    }

    #[test]
    fn bson_documents_become_records() {
        let value = Value::from(Bson::Document(bson::doc! { "name": "Alice", "age": 30 }));
        let item = value.as_item().cloned().unwrap();

        assert_eq!(item.get("name"), Some(Value::from("Alice")));
        assert_eq!(item.get("age"), Some(Value::Int(30)));
    }

    #[test]
    fn json_numbers_keep_integers() {
        assert_eq!(Value::from(serde_json::json!(4)), Value::Int(4));
        assert_eq!(Value::from(serde_json::json!(4.5)), Value::Float(4.5));
    }

    #[test]
    fn value_map_replaces_in_place() {
        let mut map = ValueMap::new();
        map.insert(Value::Int(1), "a");
        map.insert(Value::Int(2), "b");
        map.insert(Value::Float(1.0), "c");

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&Value::Int(1)), Some(&"c"));
        assert_eq!(map.keys().cloned().collect::<Vec<_>>(), vec![Value::Int(1), Value::Int(2)]);
    }
}
