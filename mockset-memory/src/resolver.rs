//! Lookup path resolution.
//!
//! A path such as `make__cars__speed__gte` is walked segment by segment from
//! an item. Relations are followed through [`Value::Object`] fields; a
//! related collection reached before the path ends fans the rest of the path
//! out over each of its items.

use mockset_core::{
    error::{MockError, MockResult},
    model::{Item, PK},
    query::{Comparison, DatePart, LOOKUP_SEP, Marker},
    value::Value,
};

/// Suffix of reverse relation accessors.
pub const REVERSE_SUFFIX: &str = "_set";

/// How relation names are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Segments must name an attribute exactly.
    Strict,
    /// A segment `car` also finds a reverse relation stored as `car_set`.
    #[default]
    Singular,
}

/// The outcome of resolving a path against one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The path reached a single value.
    Value(Value),
    /// The path crossed a collection; one result per related item.
    Many(Vec<Resolved>),
}

impl Resolved {
    /// Every leaf value, in traversal order.
    pub fn values(&self) -> Vec<Value> {
        match self {
            Resolved::Value(value) => vec![value.clone()],
            Resolved::Many(results) => results.iter().flat_map(Resolved::values).collect(),
        }
    }

    /// Collapses the result into one value: fan-out results become a list
    /// of their leaf values.
    pub fn into_value(self) -> Value {
        match self {
            Resolved::Value(value) => value,
            many => Value::List(many.values()),
        }
    }
}

/// Splits a lookup path into its segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(LOOKUP_SEP).collect()
}

/// Resolves `path` against `root`.
///
/// Returns the resolved value (or `default` when traversal hits null or
/// ends on null) together with the comparison marker found in the path.
///
/// # Errors
///
/// Returns [`MockError::FieldError`] when a segment names a field that an
/// introspectable item does not have.
pub fn resolve(
    root: &Item,
    path: &str,
    default: Value,
    mode: Mode,
) -> MockResult<(Resolved, Option<Marker>)> {
    walk(Value::Object(root.clone()), &split_path(path), &default, mode)
}

/// Resolves `path` and collapses the result with [`Resolved::into_value`],
/// ignoring any marker.
pub fn resolve_value(root: &Item, path: &str, mode: Mode) -> MockResult<Value> {
    resolve(root, path, Value::Null, mode).map(|(resolved, _)| resolved.into_value())
}

fn walk(
    mut current: Value,
    segments: &[&str],
    default: &Value,
    mode: Mode,
) -> MockResult<(Resolved, Option<Marker>)> {
    for (index, segment) in segments.iter().enumerate() {
        if let Some(comparison) = Comparison::parse(segment) {
            return Ok((finish(current, default), Some(Marker::Compare(comparison))));
        }

        let part = DatePart::parse(segment)
            .filter(|_| matches!(current, Value::Date(_) | Value::DateTime(_)));
        if let Some(part) = part {
            let trailing = segments
                .get(index + 1)
                .and_then(|next| Comparison::parse(next))
                .unwrap_or(Comparison::Exact);

            return Ok((Resolved::Value(current), Some(Marker::DatePart(part, trailing))));
        }

        match current {
            Value::Null => return Ok((Resolved::Value(default.clone()), None)),
            Value::Set(_) | Value::List(_) => {
                return fan_out(current, &segments[index..], default, mode);
            }
            _ => current = access(&current, segment, mode)?,
        }
    }

    Ok((finish(current, default), None))
}

fn fan_out(
    collection: Value,
    segments: &[&str],
    default: &Value,
    mode: Mode,
) -> MockResult<(Resolved, Option<Marker>)> {
    let elements = collection.elements().unwrap_or_default();

    let mut results = Vec::with_capacity(elements.len());
    let mut marker = None;
    for element in elements {
        let (resolved, found) = walk(element, segments, default, mode)?;
        marker = marker.or(found);
        results.push(resolved);
    }

    // An empty collection still reports the comparison it was asked for.
    if marker.is_none() {
        marker = segments
            .iter()
            .find_map(|segment| Comparison::parse(segment))
            .map(Marker::Compare);
    }

    Ok((Resolved::Many(results), marker))
}

fn access(current: &Value, segment: &str, mode: Mode) -> MockResult<Value> {
    let Value::Object(item) = current else {
        return Ok(Value::Null);
    };

    if segment == PK {
        return Ok(item.pk());
    }
    if let Some(value) = item.get(segment) {
        return Ok(value);
    }
    if mode == Mode::Singular {
        if let Some(value) = item.get(&format!("{segment}{REVERSE_SUFFIX}")) {
            return Ok(value);
        }
    }

    match item.known_names() {
        Some(names) => Err(MockError::unknown_field(segment, names)),
        None => Ok(Value::Null),
    }
}

fn finish(value: Value, default: &Value) -> Resolved {
    match value {
        Value::Null => Resolved::Value(default.clone()),
        value => Resolved::Value(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::MockSet;
    use mockset_core::{descriptor::Descriptor, record};

    fn car(speed: i64) -> Item {
        Item::new(record! { "speed" => speed })
    }

    #[test]
    fn comparison_suffix_becomes_marker() {
        let item = car(10);

        let (resolved, marker) = resolve(&item, "speed__gte", Value::Null, Mode::Strict).unwrap();

        assert_eq!(resolved, Resolved::Value(Value::Int(10)));
        assert_eq!(marker, Some(Marker::Compare(Comparison::Gte)));
    }

    #[test]
    fn null_before_the_end_yields_default() {
        let item = Item::new(record! { "make" => Value::Null });

        let (resolved, marker) = resolve(&item, "make__name", Value::from("n/a"), Mode::Strict).unwrap();

        assert_eq!(resolved, Resolved::Value(Value::from("n/a")));
        assert_eq!(marker, None);
    }

    #[test]
    fn unknown_field_on_described_item_lists_choices() {
        let item = Item::new(record! { "speed" => 1 }.describe(Descriptor::new("Car", ["id", "speed"])));

        let err = resolve(&item, "colour", Value::Null, Mode::Strict).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Cannot resolve keyword 'colour' into field. Choices are 'id', 'speed'."
        );
    }

    #[test]
    fn pk_is_always_accepted() {
        let item = Item::new(record! { "id" => 7 }.describe(Descriptor::new("Car", ["id"])));

        assert_eq!(resolve_value(&item, "pk", Mode::Strict).unwrap(), Value::Int(7));
    }

    #[test]
    fn date_part_keeps_the_date_and_trailing_comparison() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let item = Item::new(record! { "made" => date });

        let (resolved, marker) = resolve(&item, "made__month__gt", Value::Null, Mode::Strict).unwrap();

        assert_eq!(resolved, Resolved::Value(Value::Date(date)));
        assert_eq!(marker, Some(Marker::DatePart(DatePart::Month, Comparison::Gt)));
    }

    #[test]
    fn related_sets_fan_out() {
        let cars = MockSet::with_items([car(1), car(2)]);
        let make = Item::new(record! { "name" => "Ford", "car_set" => cars });

        let (resolved, marker) = resolve(&make, "car__speed__in", Value::Null, Mode::Singular).unwrap();

        assert_eq!(resolved.values(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(marker, Some(Marker::Compare(Comparison::In)));
    }

    #[test]
    fn strict_mode_does_not_strip_reverse_suffix() {
        let make = Item::new(record! { "car_set" => MockSet::new() });

        let (resolved, _) = resolve(&make, "car", Value::Null, Mode::Strict).unwrap();

        assert_eq!(resolved, Resolved::Value(Value::Null));
    }

    #[test]
    fn empty_fan_out_reports_marker() {
        let make = Item::new(record! { "car_set" => MockSet::new() });

        let (resolved, marker) = resolve(&make, "car__speed__isnull", Value::Null, Mode::Singular).unwrap();

        assert_eq!(resolved, Resolved::Many(vec![]));
        assert_eq!(marker, Some(Marker::Compare(Comparison::IsNull)));
    }
}
