//! Expressions for `annotate` and `aggregate`.

use std::fmt;

use crate::{query::Q, value::Value};

/// A per-item expression computed by `annotate`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Value(Value),
    /// A reference to a field path (`F("make__name")`).
    F(String),
    /// A conditional expression.
    Case(Case),
    /// The first non-null value among several field paths.
    Coalesce(Vec<String>),
}

impl Expr {
    /// A literal value expression.
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    /// A field reference expression.
    pub fn field(path: impl Into<String>) -> Self {
        Expr::F(path.into())
    }

    /// A conditional expression over `whens`, falling back to `default`.
    pub fn case(whens: impl IntoIterator<Item = When>, default: impl Into<Expr>) -> Self {
        Expr::Case(Case {
            whens: whens.into_iter().collect(),
            default: Box::new(default.into()),
        })
    }

    /// A first-non-null expression over `paths`.
    pub fn coalesce<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::Coalesce(paths.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

/// One branch of a [`Case`].
#[derive(Debug, Clone, PartialEq)]
pub struct When {
    /// Condition an item must satisfy.
    pub condition: Q,
    /// Result for items satisfying the condition.
    pub then: Expr,
}

impl When {
    /// Creates a branch yielding `then` for items matching `condition`.
    pub fn new(condition: Q, then: impl Into<Expr>) -> Self {
        Self {
            condition,
            then: then.into(),
        }
    }
}

/// A conditional expression: the first matching branch wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// Branches, tried in order.
    pub whens: Vec<When>,
    /// Result when no branch matches.
    pub default: Box<Expr>,
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Sum,
    Count,
    Max,
    Min,
    Avg,
    Array,
}

impl AggregateFn {
    /// The function name as it appears in derived aliases.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "sum",
            AggregateFn::Count => "count",
            AggregateFn::Max => "max",
            AggregateFn::Min => "min",
            AggregateFn::Avg => "avg",
            AggregateFn::Array => "array_agg",
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An aggregate over one field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aggregate {
    /// The function to apply.
    pub function: AggregateFn,
    /// The field path to collect values from.
    pub field: String,
}

impl Aggregate {
    /// Creates an aggregate of `function` over `field`.
    pub fn new(function: AggregateFn, field: impl Into<String>) -> Self {
        Self {
            function,
            field: field.into(),
        }
    }

    pub fn sum(field: impl Into<String>) -> Self {
        Self::new(AggregateFn::Sum, field)
    }

    pub fn count(field: impl Into<String>) -> Self {
        Self::new(AggregateFn::Count, field)
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self::new(AggregateFn::Max, field)
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self::new(AggregateFn::Min, field)
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Self::new(AggregateFn::Avg, field)
    }

    pub fn array_agg(field: impl Into<String>) -> Self {
        Self::new(AggregateFn::Array, field)
    }

    /// The output key used when the aggregate is passed without a name:
    /// `field__function`, lowercased.
    pub fn default_alias(&self) -> String {
        format!("{}__{}", self.field, self.function).to_lowercase()
    }
}
