//! Lookup conditions and the visitor used to evaluate them.
//!
//! Conditions follow the `field__subfield__comparison` convention of the
//! query API being emulated. A lookup path is split on `__`; the last
//! segment may name a [`Comparison`] or a [`DatePart`].
//!
//! # Condition trees
//!
//! [`Q`] trees combine lookups with `&`, `|` and `!`:
//!
//! ```ignore
//! use mockset::prelude::*;
//!
//! let fast_or_red = Q::new("speed__gte", 200) | Q::new("color", "red");
//! let query = Query::builder()
//!     .q(fast_or_red)
//!     .lookup("make__name", "Ford")
//!     .build();
//! ```
//!
//! Keyword lookups alone can be written with the [`lookups!`](crate::lookups)
//! macro: `lookups! { "speed__gte" => 200, "color" => "red" }`.

use std::{
    fmt,
    ops::{BitAnd, BitOr, Not},
};

use crate::{error::MockError, expr::Expr, record::Record, value::Value};

/// Separator between lookup path segments.
pub const LOOKUP_SEP: &str = "__";

/// Comparison operators accepted as the last segment of a lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// Equality.
    Exact,
    /// Case-insensitive equality.
    IExact,
    /// Substring or subset test.
    Contains,
    /// Case-insensitive substring test.
    IContains,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Membership in the target list.
    In,
    /// Null test against a boolean target.
    IsNull,
    /// Prefix test.
    StartsWith,
    /// Case-insensitive prefix test.
    IStartsWith,
    /// Suffix test.
    EndsWith,
    /// Case-insensitive suffix test.
    IEndsWith,
    /// Regular expression search.
    Regex,
    /// Case-insensitive regular expression search.
    IRegex,
    /// Inclusive range test against a two element target.
    Range,
    /// Non-empty intersection of two lists.
    Overlap,
}

impl Comparison {
    /// Every comparison, in keyword order.
    pub const ALL: [Comparison; 18] = [
        Comparison::Exact,
        Comparison::IExact,
        Comparison::Contains,
        Comparison::IContains,
        Comparison::Gt,
        Comparison::Gte,
        Comparison::Lt,
        Comparison::Lte,
        Comparison::In,
        Comparison::IsNull,
        Comparison::StartsWith,
        Comparison::IStartsWith,
        Comparison::EndsWith,
        Comparison::IEndsWith,
        Comparison::Regex,
        Comparison::IRegex,
        Comparison::Range,
        Comparison::Overlap,
    ];

    /// The lookup keyword for this comparison.
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Exact => "exact",
            Comparison::IExact => "iexact",
            Comparison::Contains => "contains",
            Comparison::IContains => "icontains",
            Comparison::Gt => "gt",
            Comparison::Gte => "gte",
            Comparison::Lt => "lt",
            Comparison::Lte => "lte",
            Comparison::In => "in",
            Comparison::IsNull => "isnull",
            Comparison::StartsWith => "startswith",
            Comparison::IStartsWith => "istartswith",
            Comparison::EndsWith => "endswith",
            Comparison::IEndsWith => "iendswith",
            Comparison::Regex => "regex",
            Comparison::IRegex => "iregex",
            Comparison::Range => "range",
            Comparison::Overlap => "overlap",
        }
    }

    /// Parses a lookup keyword.
    pub fn parse(keyword: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|comparison| comparison.as_str() == keyword)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Date and time parts extractable in a lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    /// Calendar year.
    Year,
    /// Month, 1 to 12.
    Month,
    /// Day of month, 1 to 31.
    Day,
    /// Day of week, 1 (Sunday) to 7 (Saturday).
    WeekDay,
    /// Hour, 0 to 23.
    Hour,
    /// Minute, 0 to 59.
    Minute,
    /// Second, 0 to 59.
    Second,
    /// The date of a datetime.
    Date,
}

impl DatePart {
    /// Every date part, in keyword order.
    pub const ALL: [DatePart; 8] = [
        DatePart::Year,
        DatePart::Month,
        DatePart::Day,
        DatePart::WeekDay,
        DatePart::Hour,
        DatePart::Minute,
        DatePart::Second,
        DatePart::Date,
    ];

    /// The lookup keyword for this part.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
            DatePart::WeekDay => "week_day",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
            DatePart::Date => "date",
        }
    }

    /// Parses a lookup keyword.
    pub fn parse(keyword: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|part| part.as_str() == keyword)
    }

    /// Inclusive bounds a target value must respect, if any.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        match self {
            DatePart::Month => Some((1, 12)),
            DatePart::Day => Some((1, 31)),
            DatePart::WeekDay => Some((1, 7)),
            DatePart::Hour => Some((0, 23)),
            DatePart::Minute | DatePart::Second => Some((0, 59)),
            DatePart::Year | DatePart::Date => None,
        }
    }
}

impl fmt::Display for DatePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the trailing segments of a lookup path ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// A plain comparison.
    Compare(Comparison),
    /// Extract a date part, then compare it.
    DatePart(DatePart, Comparison),
}

/// How the children of a [`Q`] tree combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connector {
    /// Every child must match.
    #[default]
    And,
    /// Any child may match.
    Or,
}

/// A child of a [`Q`] tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A `(path, value)` lookup.
    Lookup(String, Value),
    /// A nested tree.
    Tree(Q),
}

/// A condition tree.
///
/// Combining trees squashes operands that already use the requested
/// connector, so `a & b & c` is one AND group of three children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Q {
    connector: Connector,
    negated: bool,
    children: Vec<Node>,
}

impl Q {
    /// Creates a tree with the single lookup `path = value`.
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            connector: Connector::And,
            negated: false,
            children: vec![Node::Lookup(path.into(), value.into())],
        }
    }

    /// Creates an empty AND group.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an AND group over several lookups.
    pub fn all<I, K, V>(lookups: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        lookups
            .into_iter()
            .fold(Self::empty(), |tree, (path, value)| tree.with(path, value))
    }

    /// Creates a group from explicit parts.
    pub fn from_parts(connector: Connector, negated: bool, children: Vec<Node>) -> Self {
        Self {
            connector,
            negated,
            children,
        }
    }

    /// Appends a lookup child to this group.
    pub fn with(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.children.push(Node::Lookup(path.into(), value.into()));
        self
    }

    /// The connector of this group.
    pub fn connector(&self) -> Connector {
        self.connector
    }

    /// Returns `true` if this group is negated.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// The children of this group.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Returns `true` if this group has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Combines with `other` using AND.
    pub fn and(self, other: Q) -> Q {
        self.combine(other, Connector::And)
    }

    /// Combines with `other` using OR.
    pub fn or(self, other: Q) -> Q {
        self.combine(other, Connector::Or)
    }

    /// Negates this tree.
    ///
    /// A single-child group flips its own flag; a wider group is wrapped in
    /// a negated AND group so that the negation covers it as a whole.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Q {
        if self.children.len() <= 1 {
            return Q {
                negated: !self.negated,
                ..self
            };
        }

        Q {
            connector: Connector::And,
            negated: true,
            children: vec![Node::Tree(self)],
        }
    }

    fn combine(self, other: Q, connector: Connector) -> Q {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }

        let mut combined = Q {
            connector,
            negated: false,
            children: Vec::new(),
        };
        combined.absorb(self);
        combined.absorb(other);
        combined
    }

    fn absorb(&mut self, tree: Q) {
        let squashable = !tree.negated
            && (tree.connector == self.connector || tree.children.len() == 1);

        if squashable {
            self.children.extend(tree.children);
        } else {
            self.children.push(Node::Tree(tree));
        }
    }
}

impl BitAnd for Q {
    type Output = Q;

    fn bitand(self, other: Q) -> Q {
        self.and(other)
    }
}

impl BitOr for Q {
    type Output = Q;

    fn bitor(self, other: Q) -> Q {
        self.or(other)
    }
}

impl Not for Q {
    type Output = Q;

    fn not(self) -> Q {
        Q::not(self)
    }
}

/// A positional argument to `filter`, `exclude` or `get`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A condition tree.
    Tree(Q),
    /// A bare expression; never accepted as a filter argument.
    Expression(Expr),
}

impl From<Q> for Condition {
    fn from(tree: Q) -> Self {
        Condition::Tree(tree)
    }
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Condition::Expression(expr)
    }
}

/// The arguments of a filtering call: positional conditions and keyword
/// lookups.
///
/// Use [`QueryBuilder`] or the [`lookups!`](crate::lookups) macro to build
/// one; a lone [`Q`] converts directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<Condition>,
    lookups: Vec<(String, Value)>,
}

impl Query {
    /// Creates an empty query, which matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new [`QueryBuilder`].
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Positional conditions, in order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Keyword lookups, in order.
    pub fn lookups(&self) -> &[(String, Value)] {
        &self.lookups
    }

    /// Returns `true` if the query has neither conditions nor lookups.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.lookups.is_empty()
    }

    /// Checks that every positional condition is a tree.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::ArgumentNotSupported`] for an expression
    /// argument.
    pub fn trees(&self) -> Result<Vec<&Q>, MockError> {
        self.conditions
            .iter()
            .map(|condition| match condition {
                Condition::Tree(tree) => Ok(tree),
                Condition::Expression(_) => Err(MockError::ArgumentNotSupported),
            })
            .collect()
    }
}

impl From<Q> for Query {
    fn from(tree: Q) -> Self {
        Query::builder().q(tree).build()
    }
}

impl From<Expr> for Query {
    fn from(expr: Expr) -> Self {
        Query::builder().q(expr).build()
    }
}

impl From<Record> for Query {
    fn from(record: Record) -> Self {
        record.iter().map(|(path, value)| (path, value.clone())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Query::builder(), |builder, (path, value)| builder.lookup(path, value))
            .build()
    }
}

/// Builder for creating [`Query`] instances.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a positional condition.
    ///
    /// # Arguments
    ///
    /// * `condition` - A [`Q`] tree, or an expression (rejected when the
    ///   query is evaluated)
    pub fn q(mut self, condition: impl Into<Condition>) -> Self {
        self.query.conditions.push(condition.into());
        self
    }

    /// Adds a keyword lookup.
    ///
    /// # Arguments
    ///
    /// * `path` - The lookup path, e.g. `make__name__iexact`
    /// * `value` - The target value
    pub fn lookup(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.lookups.push((path.into(), value.into()));
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// Builds a [`Query`] from keyword lookups.
///
/// ```ignore
/// let query = lookups! { "speed__gte" => 100, "make__name" => "Ford" };
/// ```
#[macro_export]
macro_rules! lookups {
    () => {
        $crate::query::Query::new()
    };
    ($($path:expr => $value:expr),+ $(,)?) => {
        $crate::query::Query::builder()
            $(.lookup($path, $value))+
            .build()
    };
}

/// Visitor over condition trees.
///
/// The evaluating backend decides what `Output` is; the default
/// [`visit_node`](QueryVisitor::visit_node) dispatches each child to the
/// matching method.
pub trait QueryVisitor {
    type Output;
    type Error: Into<MockError>;

    fn visit_tree(&mut self, tree: &Q) -> Result<Self::Output, Self::Error>;
    fn visit_lookup(
        &mut self,
        path: &str,
        value: &Value,
        negated: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_subtree(&mut self, tree: &Q, negated: bool) -> Result<Self::Output, Self::Error>;

    fn visit_node(&mut self, node: &Node, negated: bool) -> Result<Self::Output, Self::Error> {
        match node {
            Node::Lookup(path, value) => self.visit_lookup(path, value, negated),
            Node::Tree(tree) => self.visit_subtree(tree, negated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(path: &str, value: impl Into<Value>) -> Node {
        Node::Lookup(path.to_string(), value.into())
    }

    #[test]
    fn keywords_round_trip() {
        for comparison in Comparison::ALL {
            assert_eq!(Comparison::parse(comparison.as_str()), Some(comparison));
        }
        assert_eq!(DatePart::parse("week_day"), Some(DatePart::WeekDay));
        assert_eq!(Comparison::parse("speed"), None);
    }

    #[test]
    fn same_connector_operands_are_squashed() {
        let tree = Q::new("a", 1) & Q::new("b", 2) & Q::new("c", 3);

        assert_eq!(tree.connector(), Connector::And);
        assert_eq!(tree.children(), &[lookup("a", 1), lookup("b", 2), lookup("c", 3)]);
    }

    #[test]
    fn mixed_connectors_nest() {
        let tree = (Q::new("a", 1) & Q::new("b", 2)) | Q::new("c", 3);

        assert_eq!(tree.connector(), Connector::Or);
        assert_eq!(tree.children().len(), 2);
        assert!(matches!(&tree.children()[0], Node::Tree(inner) if inner.connector() == Connector::And));
    }

    #[test]
    fn empty_operands_are_dropped() {
        assert_eq!(Q::empty() & Q::new("a", 1), Q::new("a", 1));
        assert_eq!(Q::new("a", 1) | Q::empty(), Q::new("a", 1));
    }

    #[test]
    fn negation_flips_single_lookups_and_wraps_groups() {
        let single = !Q::new("a", 1);
        assert!(single.is_negated());
        assert_eq!(single.children(), &[lookup("a", 1)]);

        let group = !(Q::new("a", 1) | Q::new("b", 2));
        assert!(group.is_negated());
        assert!(matches!(&group.children()[0], Node::Tree(inner) if inner.connector() == Connector::Or));

        let negated = !Q::new("a", 1) & Q::new("b", 2);
        assert_eq!(negated.children().len(), 2);
        assert!(matches!(&negated.children()[0], Node::Tree(inner) if inner.is_negated()));
    }

    #[test]
    fn lookups_macro_keeps_order() {
        let query = lookups! { "foo" => 1, "bar__gt" => 2.5 };

        assert_eq!(
            query.lookups(),
            &[("foo".to_string(), Value::Int(1)), ("bar__gt".to_string(), Value::Float(2.5))]
        );
        assert!(lookups! {}.is_empty());
    }

    #[test]
    fn expression_arguments_are_rejected() {
        let query = Query::builder()
            .q(Q::new("a", 1))
            .q(Expr::field("a"))
            .build();

        assert_eq!(query.trees(), Err(MockError::ArgumentNotSupported));
    }
}
