//! Computed and projected views of a set: annotations, aggregates, value
//! rows, date lists and bulk lookups.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use tracing::debug;

use mockset_core::{
    error::{MockError, MockResult},
    expr::{Aggregate, AggregateFn, Expr},
    model::Item,
    record::Record,
    value::{Value, ValueMap},
};

use crate::{
    combinator::Combinator,
    resolver::{Mode, Resolved, resolve, resolve_value},
    set::MockSet,
};

/// Aggregate results keyed by output alias.
pub type Aggregates = BTreeMap<String, Value>;

/// Row shape of [`MockSet::values_list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Return the single projected value instead of a one-element tuple.
    pub flat: bool,
    /// Return rows as records keyed by field name.
    pub named: bool,
}

impl ListOptions {
    pub fn flat() -> Self {
        Self {
            flat: true,
            named: false,
        }
    }

    pub fn named() -> Self {
        Self {
            flat: false,
            named: true,
        }
    }
}

/// Truncation granularity of `dates` and `datetimes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Granularity {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "year" => Some(Granularity::Year),
            "month" => Some(Granularity::Month),
            "day" => Some(Granularity::Day),
            "hour" => Some(Granularity::Hour),
            "minute" => Some(Granularity::Minute),
            "second" => Some(Granularity::Second),
            _ => None,
        }
    }

    fn truncate_date(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
            Granularity::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
            _ => Some(date),
        }
    }

    fn truncate_datetime(self, datetime: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = self.truncate_date(datetime.date())?;
        let time = datetime.time();

        match self {
            Granularity::Year | Granularity::Month | Granularity::Day => date.and_hms_opt(0, 0, 0),
            Granularity::Hour => date.and_hms_opt(time.hour(), 0, 0),
            Granularity::Minute => date.and_hms_opt(time.hour(), time.minute(), 0),
            Granularity::Second => date.and_hms_opt(time.hour(), time.minute(), time.second()),
        }
    }
}

fn parse_order(order: &str) -> MockResult<bool> {
    match order {
        "ASC" => Ok(false),
        "DESC" => Ok(true),
        _ => Err(MockError::InvalidValue(
            "'order' must be either 'ASC' or 'DESC'.".into(),
        )),
    }
}

impl MockSet {
    /// Computes each named expression per item and stores the result as an
    /// annotation on the item.
    ///
    /// Annotation names are tracked on the derived set so `values` and
    /// `values_list` project them.
    ///
    /// # Errors
    ///
    /// Returns any error raised while resolving field paths or evaluating
    /// case conditions.
    pub fn annotate<I, S>(&self, exprs: I) -> MockResult<MockSet>
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        let items = self.items();
        let mut names = Vec::new();

        for (name, expr) in exprs {
            let name = name.into();
            for item in &items {
                let value = evaluate(item, &expr)?;
                item.annotate(&name, value);
            }
            names.push(name);
        }

        let annotated = self.derive(items);
        {
            let mut state = annotated.0.borrow_mut();
            for name in names {
                if !state.annotations.contains(&name) {
                    state.annotations.push(name);
                }
            }
        }

        Ok(annotated)
    }

    /// Computes aggregates across all items.
    ///
    /// Unnamed aggregates are keyed by [`Aggregate::default_alias`]. Null
    /// values are skipped; with nothing left `count` yields `0` and every
    /// other function yields null.
    ///
    /// # Errors
    ///
    /// Returns a field error for an unknown path and
    /// [`MockError::InvalidValue`] when summing or averaging non-numbers.
    pub fn aggregate(&self, unnamed: &[Aggregate], named: &[(&str, Aggregate)]) -> MockResult<Aggregates> {
        let aliased = unnamed
            .iter()
            .map(|aggregate| (aggregate.default_alias(), aggregate))
            .chain(named.iter().map(|(name, aggregate)| (name.to_string(), aggregate)));

        let mut results = Aggregates::new();
        for (alias, aggregate) in aliased {
            let value = self.compute(aggregate)?;
            results.insert(alias, value);
        }

        debug!(count = results.len(), "computed aggregates");
        Ok(results)
    }

    fn compute(&self, aggregate: &Aggregate) -> MockResult<Value> {
        let mut values = Vec::new();
        for item in self.items() {
            let (resolved, _) = resolve(&item, &aggregate.field, Value::Null, Mode::Singular)?;
            values.extend(resolved.values().into_iter().filter(|value| !value.is_null()));
        }

        if values.is_empty() {
            return Ok(match aggregate.function {
                AggregateFn::Count => Value::Int(0),
                _ => Value::Null,
            });
        }

        match aggregate.function {
            AggregateFn::Count => Ok(Value::Int(values.len() as i64)),
            AggregateFn::Sum => sum(&values),
            AggregateFn::Avg => {
                let total = sum(&values)?.as_f64().unwrap_or_default();
                Ok(Value::Float(total / values.len() as f64))
            }
            AggregateFn::Max => Ok(values
                .into_iter()
                .reduce(|best, value| if value.sort_cmp(&best).is_gt() { value } else { best })
                .unwrap_or_default()),
            AggregateFn::Min => Ok(values
                .into_iter()
                .reduce(|best, value| if value.sort_cmp(&best).is_lt() { value } else { best })
                .unwrap_or_default()),
            AggregateFn::Array => Ok(Value::List(values)),
        }
    }

    /// Projects every item to a record over `fields`, as a derived set.
    ///
    /// With no fields, the concrete fields and tracked annotations are used.
    /// A field that fans out over a relation produces one row per related
    /// value; shorter columns repeat their last value.
    ///
    /// # Errors
    ///
    /// Returns a field error for an unknown path.
    pub fn values(&self, fields: &[&str]) -> MockResult<MockSet> {
        let rows = self
            .project_rows(fields)?
            .into_iter()
            .map(Item::new)
            .collect();

        Ok(self.derive(rows))
    }

    /// Projects every item over `fields` as tuples (`Value::List`), named
    /// rows (`Value::Object` records) or flat scalars.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::InvalidValue`] for `flat` combined with `named`
    /// or with several fields, [`MockError::NotImplemented`] when no field
    /// is given, and a field error for an unknown path.
    pub fn values_list(&self, fields: &[&str], options: ListOptions) -> MockResult<Vec<Value>> {
        if options.flat && options.named {
            return Err(MockError::InvalidValue(
                "'flat' and 'named' can't be used together.".into(),
            ));
        }
        if options.flat && fields.len() > 1 {
            return Err(MockError::InvalidValue(
                "'flat' is not valid when values_list is called with more than one field.".into(),
            ));
        }
        if fields.is_empty() {
            return Err(MockError::NotImplemented(
                "values_list() with no arguments is not implemented".into(),
            ));
        }

        let rows = self.project_rows(fields)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                if options.flat {
                    row.values().next().cloned().unwrap_or_default()
                } else if options.named {
                    Value::Object(Item::new(row))
                } else {
                    Value::List(row.values().cloned().collect())
                }
            })
            .collect())
    }

    fn project_rows(&self, fields: &[&str]) -> MockResult<Vec<Record>> {
        let annotations = self.annotation_names();
        let mut rows = Vec::new();

        for item in self.items() {
            let names = match fields {
                [] => {
                    let mut names = self.concrete_field_names(&item);
                    let extra = annotations
                        .iter()
                        .filter(|name| !names_contain(&names, name))
                        .cloned()
                        .collect::<Vec<_>>();
                    names.extend(extra);
                    names
                }
                fields => fields.iter().map(|field| field.to_string()).collect(),
            };

            let mut columns = Vec::with_capacity(names.len());
            for name in &names {
                let (resolved, _) = resolve(&item, name, Value::Null, Mode::Singular)?;
                columns.push(column(resolved));
            }

            let height = columns.iter().map(Vec::len).max().unwrap_or(1);
            for index in 0..height {
                let row = names
                    .iter()
                    .zip(&columns)
                    .map(|(name, column)| {
                        let value = column
                            .get(index)
                            .or_else(|| column.last())
                            .cloned()
                            .unwrap_or_default();
                        (name.clone(), value)
                    })
                    .collect::<Record>();
                rows.push(row);
            }
        }

        Ok(rows)
    }

    /// Distinct dates of `field`, truncated to `kind` (`year`, `month` or
    /// `day`) and sorted by `order` (`ASC` or `DESC`).
    ///
    /// # Errors
    ///
    /// Returns [`MockError::InvalidValue`] for an unknown kind or order and
    /// a field error for an unknown path.
    pub fn dates(&self, field: &str, kind: &str, order: &str) -> MockResult<Vec<Value>> {
        let granularity = Granularity::parse(kind)
            .filter(|granularity| {
                matches!(granularity, Granularity::Year | Granularity::Month | Granularity::Day)
            })
            .ok_or_else(|| {
                MockError::InvalidValue("'kind' must be one of 'year', 'month' or 'day'.".into())
            })?;

        self.truncated(field, order, |value| match value {
            Value::Date(date) => granularity.truncate_date(*date).map(Value::Date),
            Value::DateTime(datetime) => granularity.truncate_date(datetime.date()).map(Value::Date),
            _ => None,
        })
    }

    /// Distinct datetimes of `field`, truncated to `kind` (`year` through
    /// `second`) and sorted by `order` (`ASC` or `DESC`).
    ///
    /// # Errors
    ///
    /// Same as [`MockSet::dates`].
    pub fn datetimes(&self, field: &str, kind: &str, order: &str) -> MockResult<Vec<Value>> {
        let granularity = Granularity::parse(kind).ok_or_else(|| {
            MockError::InvalidValue(
                "'kind' must be one of 'year', 'month', 'day', 'hour', 'minute' or 'second'.".into(),
            )
        })?;

        self.truncated(field, order, |value| match value {
            Value::DateTime(datetime) => granularity.truncate_datetime(*datetime).map(Value::DateTime),
            Value::Date(date) => date
                .and_hms_opt(0, 0, 0)
                .and_then(|datetime| granularity.truncate_datetime(datetime))
                .map(Value::DateTime),
            _ => None,
        })
    }

    fn truncated<F>(&self, field: &str, order: &str, truncate: F) -> MockResult<Vec<Value>>
    where
        F: Fn(&Value) -> Option<Value>,
    {
        let descending = parse_order(order)?;

        let mut results: Vec<Value> = Vec::new();
        for item in self.items() {
            let value = resolve_value(&item, field, Mode::Singular)?;
            if let Some(value) = truncate(&value) {
                if !results.contains(&value) {
                    results.push(value);
                }
            }
        }

        results.sort_by(|a, b| if descending { b.sort_cmp(a) } else { a.sort_cmp(b) });
        Ok(results)
    }

    /// Maps `field_name` values to items, optionally only for `ids`.
    ///
    /// # Errors
    ///
    /// Returns a field error for an unknown field.
    pub fn in_bulk(&self, ids: Option<&[Value]>, field_name: &str) -> MockResult<ValueMap<Item>> {
        let mut results = ValueMap::new();

        for item in self.items() {
            let key = resolve_value(&item, field_name, Mode::Singular)?;
            let wanted = ids.is_none_or(|ids| ids.contains(&key));

            if wanted {
                results.insert(key, item);
            }
        }

        Ok(results)
    }
}

fn names_contain(names: &[String], name: &str) -> bool {
    names.iter().any(|existing| existing == name)
}

/// The values one projected field contributes to an item's rows.
fn column(resolved: Resolved) -> Vec<Value> {
    let values = match resolved {
        Resolved::Value(Value::Set(related)) => related.pks(),
        Resolved::Value(Value::Object(item)) => vec![item.pk()],
        Resolved::Value(value) => vec![value],
        many => many
            .values()
            .into_iter()
            .map(|value| match value {
                Value::Object(item) => item.pk(),
                value => value,
            })
            .collect(),
    };

    if values.is_empty() { vec![Value::Null] } else { values }
}

fn evaluate(item: &Item, expr: &Expr) -> MockResult<Value> {
    match expr {
        Expr::Value(value) => Ok(value.clone()),
        Expr::F(path) => resolve_value(item, path, Mode::Singular),
        Expr::Case(case) => {
            for when in &case.whens {
                if Combinator::matches(item, &when.condition)? {
                    return evaluate(item, &when.then);
                }
            }
            evaluate(item, &case.default)
        }
        Expr::Coalesce(paths) => {
            for path in paths {
                let value = resolve_value(item, path, Mode::Singular)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
    }
}

fn sum(values: &[Value]) -> MockResult<Value> {
    let mut int_total = Some(0_i64);
    let mut float_total: f64 = 0.0;
    let mut is_float = false;

    for value in values {
        match value {
            Value::Int(number) => {
                int_total = int_total.and_then(|total| total.checked_add(*number));
                float_total += *number as f64;
            }
            Value::Float(number) => {
                is_float = true;
                float_total += number;
            }
            other => {
                return Err(MockError::InvalidValue(format!(
                    "unsupported operand type for sum: {}",
                    other.type_name()
                )));
            }
        }
    }

    if is_float {
        return Ok(Value::Float(float_total));
    }

    int_total
        .map(Value::Int)
        .ok_or_else(|| MockError::InvalidValue("integer overflow in sum".to_string()))
}
