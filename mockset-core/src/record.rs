//! The stand-in record: an ordered field map that behaves like a model
//! instance.

use bson::{Bson, Document as BsonDocument};
use serde::{Serialize, Serializer, ser::SerializeMap};
use std::{any::Any, fmt};

use crate::{
    descriptor::Descriptor,
    error::{MockError, MockResult},
    model::{Item, Model},
    value::Value,
};

/// Model label used for records without a descriptor.
pub const RECORD_LABEL: &str = "Record";

/// An ordered field-name to value mapping usable wherever a model is.
///
/// Access is explicit: [`Record::get`] returns `None` for a missing field,
/// [`Record::get_or`] substitutes a default and [`Record::set`] inserts or
/// replaces. Two records are equal when they hold the same fields with equal
/// values, in any order.
///
/// # Example
///
/// ```ignore
/// use mockset::record;
///
/// let car = record! { "id" => 1, "speed" => 120 };
/// assert_eq!(car.get_or("model", Value::Null), Value::Null);
/// ```
#[derive(Clone, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
    descriptor: Option<Descriptor>,
}

impl Record {
    /// Creates an empty record with no descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record bound to `descriptor`, with every described field set
    /// to null.
    pub fn with_descriptor(descriptor: Descriptor) -> Self {
        let fields = descriptor
            .field_names()
            .into_iter()
            .map(|name| (name, Value::Null))
            .collect();

        Self {
            fields,
            descriptor: Some(descriptor),
        }
    }

    /// Creates a record from `(name, value)` pairs, keeping their order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut record = Self::new();
        for (key, value) in pairs {
            record.set(key, value);
        }
        record
    }

    /// Attaches a descriptor, backfilling described fields missing from the
    /// record with null.
    pub fn describe(mut self, descriptor: Descriptor) -> Self {
        self.bind(descriptor);
        self
    }

    /// In-place [`Record::describe`]. A record that already has a
    /// descriptor keeps it; missing fields are still backfilled.
    pub fn bind(&mut self, descriptor: Descriptor) {
        for name in descriptor.field_names() {
            if !self.contains_key(&name) {
                self.fields.push((name, Value::Null));
            }
        }
        self.descriptor.get_or_insert(descriptor);
    }

    /// Returns the value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Returns the value of `key`, or `default` if the record lacks it.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Inserts or replaces `key`. A replaced field keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        match self.fields.iter_mut().find(|(name, _)| *name == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(name, _)| name == key)?;
        Some(self.fields.remove(index).1)
    }

    /// Returns `true` if the record has a field called `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Field values in order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    /// `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` when the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a record from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::Serialization`] if `json` is not an object.
    pub fn from_json(json: serde_json::Value) -> MockResult<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_json_map(map)),
            other => Err(MockError::Serialization(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Builds a record from the entries of a JSON object.
    pub fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::from_pairs(
            map.into_iter()
                .map(|(key, value)| (key, Value::from(value)))
        )
    }

    /// Converts the record to a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in JSON.
    pub fn to_json(&self) -> MockResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Builds a record from a BSON document.
    pub fn from_bson(doc: BsonDocument) -> Self {
        Self::from_pairs(
            doc.into_iter()
                .map(|(key, value): (String, Bson)| (key, Value::from(value)))
        )
    }
}

impl From<Record> for Item {
    fn from(record: Record) -> Self {
        Item::new(record)
    }
}

impl Model for Record {
    fn model_name(&self) -> String {
        RECORD_LABEL.to_string()
    }

    fn descriptor(&self) -> Option<Descriptor> {
        self.descriptor.clone()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: Value) -> MockResult<()> {
        self.set(name, value);
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.keys().map(str::to_string).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in self.iter() {
            map.entry(&key, value);
        }
        map.finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// Builds a [`Record`] from `key => value` pairs.
///
/// ```ignore
/// let record = record! { "foo" => 1, "bar" => "a" };
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::record::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::record::Record::new();
        $(record.set($key, $value);)+
        record
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_or_substitutes_default_for_missing_fields() {
        let record = record! { "foo" => 1 };

        assert_eq!(record.get("foo"), Some(&Value::Int(1)));
        assert_eq!(record.get("bar"), None);
        assert_eq!(record.get_or("bar", Value::from("x")), Value::from("x"));
    }

    #[test]
    fn set_keeps_position_of_replaced_field() {
        let mut record = record! { "a" => 1, "b" => 2 };
        record.set("a", 3);

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn equality_ignores_field_order() {
        let a = record! { "a" => 1, "b" => 2 };
        let b = record! { "b" => 2, "a" => 1 };
        let c = record! { "a" => 1 };

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn descriptor_backfills_nulls() {
        let record = record! { "speed" => 10 }.describe(Descriptor::new("Car", ["model", "speed"]));

        assert_eq!(record.get("model"), Some(&Value::Null));
        assert_eq!(record.get("speed"), Some(&Value::Int(10)));
        assert_eq!(Model::descriptor(&record).map(|d| d.label().to_string()), Some("Car".into()));
    }

    #[test]
    fn json_round_trip_keeps_fields() {
        let record = Record::from_json(json!({ "name": "Alice", "age": 30, "tags": ["a"] })).unwrap();

        assert_eq!(record.get("age"), Some(&Value::Int(30)));
        assert_eq!(record.to_json().unwrap(), json!({ "name": "Alice", "age": 30, "tags": ["a"] }));
    }

    #[test]
    fn from_json_rejects_non_objects() {
        assert!(matches!(Record::from_json(json!([1, 2])), Err(MockError::Serialization(_))));
    }
}
