//! Single-lookup evaluation.
//!
//! [`is_match`] decides whether a resolved value satisfies one comparison
//! against a target. Type mismatches never raise: a string predicate over a
//! number is simply `false`.

use std::cmp::Ordering;

use chrono::{Datelike, Timelike, Weekday};
use regex::RegexBuilder;

use mockset_core::{
    error::{MockError, MockResult},
    query::{Comparison, DatePart, Marker},
    value::Value,
};

use crate::resolver::Resolved;

/// Evaluates `marker` between `resolved` and `target`.
///
/// Fan-out results match when any of their values does; an empty fan-out is
/// compared as null.
///
/// # Errors
///
/// Returns [`MockError::InvalidValue`] for an out-of-range date part target
/// or an invalid regular expression.
pub fn is_match(resolved: &Resolved, target: &Value, marker: Option<Marker>) -> MockResult<bool> {
    match resolved {
        Resolved::Value(value) => matches_value(value, target, marker),
        Resolved::Many(_) => any_matches(resolved.values(), target, marker),
    }
}

fn any_matches(values: Vec<Value>, target: &Value, marker: Option<Marker>) -> MockResult<bool> {
    if values.is_empty() {
        return matches_value(&Value::Null, target, marker);
    }

    for value in values {
        if matches_value(&value, target, marker)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn matches_value(value: &Value, target: &Value, marker: Option<Marker>) -> MockResult<bool> {
    if let Value::Set(set) = value {
        let members = set
            .items()
            .into_iter()
            .map(Value::Object)
            .collect();

        return any_matches(members, target, marker);
    }

    let target = identity_target(value, target);

    match marker {
        None => Ok(same(value, &target)),
        Some(Marker::Compare(comparison)) => compare(comparison, value, &target),
        Some(Marker::DatePart(part, comparison)) => {
            check_bounds(part, &target)?;
            match extract(value, part) {
                Some(extracted) => compare(comparison, &extracted, &target),
                None => Ok(false),
            }
        }
    }
}

/// Replaces a related target by its identity when the value is a scalar, so
/// that `make=ford` and `make__in=ford.car_set` compare identities.
fn identity_target(value: &Value, target: &Value) -> Value {
    let scalar = !matches!(value, Value::Object(_) | Value::Set(_) | Value::List(_));

    match target {
        Value::Set(set) if scalar => Value::List(set.pks()),
        Value::Object(item) if scalar => item.pk(),
        target => target.clone(),
    }
}

/// Equality that treats a related object and its identity as equal.
fn same(value: &Value, target: &Value) -> bool {
    match (value, target) {
        (Value::Object(item), Value::Object(other)) => item == other,
        (Value::Object(item), other) | (other, Value::Object(item))
            if !other.is_null() && !other.is_list_like() =>
        {
            item.pk() == *other
        }
        _ => value == target,
    }
}

fn compare(comparison: Comparison, value: &Value, target: &Value) -> MockResult<bool> {
    Ok(match comparison {
        Comparison::Exact => same(value, target),
        Comparison::IExact => text_pair(value, target)
            .map(|(value, target)| value.to_lowercase() == target.to_lowercase())
            .unwrap_or(false),
        Comparison::Contains => contains(value, target),
        Comparison::IContains => text_pair(value, target)
            .map(|(value, target)| value.to_lowercase().contains(&target.to_lowercase()))
            .unwrap_or(false),
        Comparison::Gt => ordering(value, target).is_some_and(|ord| ord == Ordering::Greater),
        Comparison::Gte => ordering(value, target).is_some_and(|ord| ord != Ordering::Less),
        Comparison::Lt => ordering(value, target).is_some_and(|ord| ord == Ordering::Less),
        Comparison::Lte => ordering(value, target).is_some_and(|ord| ord != Ordering::Greater),
        Comparison::In => within(value, target),
        Comparison::IsNull => value.is_null() == target.is_truthy(),
        Comparison::StartsWith => text_pair(value, target)
            .map(|(value, target)| value.starts_with(target))
            .unwrap_or(false),
        Comparison::IStartsWith => text_pair(value, target)
            .map(|(value, target)| value.to_lowercase().starts_with(&target.to_lowercase()))
            .unwrap_or(false),
        Comparison::EndsWith => text_pair(value, target)
            .map(|(value, target)| value.ends_with(target))
            .unwrap_or(false),
        Comparison::IEndsWith => text_pair(value, target)
            .map(|(value, target)| value.to_lowercase().ends_with(&target.to_lowercase()))
            .unwrap_or(false),
        Comparison::Regex => search(value, target, false)?,
        Comparison::IRegex => search(value, target, true)?,
        Comparison::Range => range(value, target),
        Comparison::Overlap => overlap(value, target),
    })
}

fn text_pair<'a>(value: &'a Value, target: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((value.as_str()?, target.as_str()?))
}

fn ordering(value: &Value, target: &Value) -> Option<Ordering> {
    if value.is_null() {
        return None;
    }
    match (value, target) {
        (Value::Object(item), other) | (other, Value::Object(item)) if !other.is_null() => {
            let pk = item.pk();
            if matches!(value, Value::Object(_)) {
                pk.partial_cmp(other)
            } else {
                other.partial_cmp(&pk)
            }
        }
        _ => value.partial_cmp(target),
    }
}

fn contains(value: &Value, target: &Value) -> bool {
    match value {
        Value::List(_) | Value::Set(_) => match target.elements() {
            Some(needles) => needles.iter().all(|needle| value.contains_element(needle)),
            None => value.contains_element(target),
        },
        Value::Text(text) => target.as_str().is_some_and(|needle| text.contains(needle)),
        _ => false,
    }
}

fn within(value: &Value, target: &Value) -> bool {
    let Some(candidates) = target.elements() else {
        return false;
    };

    match value {
        Value::Null => false,
        Value::List(values) => values
            .iter()
            .any(|value| candidates.iter().any(|candidate| same(value, candidate))),
        value => candidates.iter().any(|candidate| same(value, candidate)),
    }
}

fn range(value: &Value, target: &Value) -> bool {
    match target.as_list() {
        Some([low, high]) => {
            ordering(value, low).is_some_and(|ord| ord != Ordering::Less)
                && ordering(value, high).is_some_and(|ord| ord != Ordering::Greater)
        }
        _ => false,
    }
}

fn overlap(value: &Value, target: &Value) -> bool {
    match (value.elements(), target.elements()) {
        (Some(values), Some(targets)) => values.iter().any(|value| targets.contains(value)),
        _ => false,
    }
}

fn search(value: &Value, target: &Value, case_insensitive: bool) -> MockResult<bool> {
    let Some((text, pattern)) = text_pair(value, target) else {
        return Ok(false);
    };

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| MockError::InvalidValue(format!("Invalid regular expression {pattern:?}: {err}")))?;

    Ok(regex.is_match(text))
}

fn check_bounds(part: DatePart, target: &Value) -> MockResult<()> {
    let Some((low, high)) = part.bounds() else {
        return Ok(());
    };

    let candidates = target.elements().unwrap_or_else(|| vec![target.clone()]);
    for candidate in candidates {
        if let Value::Int(number) = candidate {
            if number < low || number > high {
                return Err(MockError::InvalidValue(format!(
                    "{number} is incorrect value for {part}"
                )));
            }
        }
    }

    Ok(())
}

/// Day of week on a 1 (Sunday) to 7 (Saturday) scale.
pub fn week_day(weekday: Weekday) -> i64 {
    (weekday.num_days_from_monday() as i64 + 1) % 7 + 1
}

/// Extracts `part` from a date or datetime value.
pub fn extract(value: &Value, part: DatePart) -> Option<Value> {
    match (value, part) {
        (Value::Date(date), DatePart::Year) => Some(Value::Int(date.year() as i64)),
        (Value::Date(date), DatePart::Month) => Some(Value::Int(date.month() as i64)),
        (Value::Date(date), DatePart::Day) => Some(Value::Int(date.day() as i64)),
        (Value::Date(date), DatePart::WeekDay) => Some(Value::Int(week_day(date.weekday()))),
        (Value::Date(date), DatePart::Date) => Some(Value::Date(*date)),
        (Value::Date(_), _) => None,
        (Value::DateTime(datetime), DatePart::Hour) => Some(Value::Int(datetime.hour() as i64)),
        (Value::DateTime(datetime), DatePart::Minute) => Some(Value::Int(datetime.minute() as i64)),
        (Value::DateTime(datetime), DatePart::Second) => Some(Value::Int(datetime.second() as i64)),
        (Value::DateTime(datetime), part) => extract(&Value::Date(datetime.date()), part),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::MockSet;
    use chrono::NaiveDate;
    use mockset_core::{model::Item, record};

    fn check(value: impl Into<Value>, target: impl Into<Value>, comparison: Comparison) -> bool {
        is_match(
            &Resolved::Value(value.into()),
            &target.into(),
            Some(Marker::Compare(comparison)),
        )
        .unwrap()
    }

    #[test]
    fn no_marker_is_equality() {
        assert!(is_match(&Resolved::Value(Value::Int(1)), &Value::Float(1.0), None).unwrap());
        assert!(!is_match(&Resolved::Value(Value::Int(1)), &Value::from("1"), None).unwrap());
    }

    #[test]
    fn string_predicates() {
        assert!(check("Hello", "hello", Comparison::IExact));
        assert!(check("Hello", "ell", Comparison::Contains));
        assert!(!check("Hello", "ELL", Comparison::Contains));
        assert!(check("Hello", "ELL", Comparison::IContains));
        assert!(check("Hello", "He", Comparison::StartsWith));
        assert!(check("Hello", "LO", Comparison::IEndsWith));
        assert!(!check(5, "5", Comparison::StartsWith));
    }

    #[test]
    fn ordering_with_null_is_false() {
        assert!(check(3, 2, Comparison::Gt));
        assert!(check(2, 2, Comparison::Gte));
        assert!(!check(Value::Null, 2, Comparison::Lt));
        assert!(!check(Value::Null, 2, Comparison::Lte));
    }

    #[test]
    fn list_predicates() {
        assert!(check(vec![1, 2, 3], vec![1, 3], Comparison::Contains));
        assert!(!check(vec![1, 2], vec![1, 4], Comparison::Contains));
        assert!(check(2, vec![1, 2], Comparison::In));
        assert!(check(vec![5, 2], vec![1, 2], Comparison::In));
        assert!(!check(Value::Null, vec![1, 2], Comparison::In));
        assert!(check(vec![1, 9], vec![9, 10], Comparison::Overlap));
        assert!(check(5, vec![1, 5], Comparison::Range));
        assert!(!check(6, vec![1, 5], Comparison::Range));
    }

    #[test]
    fn isnull_compares_nullness_to_truthiness() {
        assert!(check(Value::Null, true, Comparison::IsNull));
        assert!(check(1, false, Comparison::IsNull));
        assert!(!check(1, true, Comparison::IsNull));
    }

    #[test]
    fn regex_is_a_search() {
        assert!(check("abc123", r"\d+", Comparison::Regex));
        assert!(check("ABC", "b", Comparison::IRegex));
        assert!(!check("ABC", "b", Comparison::Regex));
        assert!(is_match(
            &Resolved::Value(Value::from("x")),
            &Value::from("("),
            Some(Marker::Compare(Comparison::Regex))
        )
        .is_err());
    }

    #[test]
    fn date_parts_extract_before_comparing() {
        // 2024-05-05 was a Sunday.
        let sunday = Value::Date(NaiveDate::from_ymd_opt(2024, 5, 5).unwrap());
        let resolved = Resolved::Value(sunday);

        let week_day = Some(Marker::DatePart(DatePart::WeekDay, Comparison::Exact));
        let month = Some(Marker::DatePart(DatePart::Month, Comparison::Gte));

        assert!(is_match(&resolved, &Value::Int(1), week_day).unwrap());
        assert!(is_match(&resolved, &Value::Int(5), month).unwrap());
    }

    #[test]
    fn date_part_targets_are_bounds_checked() {
        let resolved = Resolved::Value(Value::Date(NaiveDate::from_ymd_opt(2024, 5, 5).unwrap()));
        let err = is_match(&resolved, &Value::Int(13), Some(Marker::DatePart(DatePart::Month, Comparison::Exact)))
            .unwrap_err();

        assert_eq!(err, MockError::InvalidValue("13 is incorrect value for month".into()));
    }

    #[test]
    fn week_day_starts_on_sunday() {
        assert_eq!(week_day(Weekday::Sun), 1);
        assert_eq!(week_day(Weekday::Mon), 2);
        assert_eq!(week_day(Weekday::Sat), 7);
    }

    #[test]
    fn fan_out_matches_existentially() {
        let many = Resolved::Many(vec![Resolved::Value(Value::Int(1)), Resolved::Value(Value::Int(5))]);

        assert!(is_match(&many, &Value::Int(5), None).unwrap());
        assert!(!is_match(&many, &Value::Int(7), None).unwrap());
        assert!(is_match(&Resolved::Many(vec![]), &Value::Bool(true), Some(Marker::Compare(Comparison::IsNull))).unwrap());
    }

    #[test]
    fn scalar_against_related_set_compares_identities() {
        let cars = MockSet::with_items([
            Item::new(record! { "id" => 1 }),
            Item::new(record! { "id" => 2 }),
        ]);

        assert!(check(2, cars.clone(), Comparison::In));
        assert!(!check(3, cars, Comparison::In));
    }

    #[test]
    fn related_object_equals_its_identity() {
        let make = Item::new(record! { "id" => 4, "name" => "Ford" });

        assert!(is_match(&Resolved::Value(Value::Object(make)), &Value::Int(4), None).unwrap());
    }
}
