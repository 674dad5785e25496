//! Evaluation of condition trees over a list of candidates.

use std::collections::BTreeSet;

use mockset_core::{
    error::{MockError, MockResult},
    model::Item,
    query::{Connector, Q, QueryVisitor},
    value::Value,
};

use crate::{
    matcher::is_match,
    resolver::{Mode, resolve},
};

/// Evaluates [`Q`] trees against a candidate slice.
///
/// Results are candidate indices, so matches always come back in candidate
/// order no matter how the tree combined them.
pub struct Combinator<'a> {
    candidates: &'a [Item],
}

impl<'a> Combinator<'a> {
    pub fn new(candidates: &'a [Item]) -> Self {
        Self { candidates }
    }

    /// Indices of the candidates matching `tree`.
    pub fn evaluate(&mut self, tree: &Q) -> MockResult<BTreeSet<usize>> {
        self.visit_tree(tree)
    }

    /// The candidates matching `tree`, in candidate order.
    pub fn filter_items(candidates: &[Item], tree: &Q) -> MockResult<Vec<Item>> {
        let matched = Combinator::new(candidates).evaluate(tree)?;

        Ok(matched
            .into_iter()
            .map(|index| candidates[index].clone())
            .collect())
    }

    /// Returns `true` if `item` alone matches `tree`.
    pub fn matches(item: &Item, tree: &Q) -> MockResult<bool> {
        let candidates = std::slice::from_ref(item);
        Ok(!Combinator::new(candidates).evaluate(tree)?.is_empty())
    }

    fn everything(&self) -> BTreeSet<usize> {
        (0..self.candidates.len()).collect()
    }
}

impl<'a> QueryVisitor for Combinator<'a> {
    type Output = BTreeSet<usize>;
    type Error = MockError;

    fn visit_tree(&mut self, tree: &Q) -> Result<Self::Output, Self::Error> {
        let mut results: Option<BTreeSet<usize>> = None;

        for child in tree.children() {
            let matched = self.visit_node(child, tree.is_negated())?;

            if matched.is_empty() {
                if tree.connector() == Connector::And {
                    return Ok(BTreeSet::new());
                }
                continue;
            }

            results = Some(match (results, tree.connector()) {
                (None, _) => matched,
                (Some(acc), Connector::Or) => acc.union(&matched).copied().collect(),
                (Some(acc), Connector::And) => acc.intersection(&matched).copied().collect(),
            });
        }

        // No children at all leaves nothing matched, AND groups included.
        Ok(results.unwrap_or_default())
    }

    fn visit_lookup(
        &mut self,
        path: &str,
        value: &Value,
        negated: bool,
    ) -> Result<Self::Output, Self::Error> {
        let mut kept = BTreeSet::new();

        for (index, item) in self.candidates.iter().enumerate() {
            let (resolved, marker) = resolve(item, path, Value::Null, Mode::Singular)?;
            let matched = is_match(&resolved, value, marker)?;
            let disqualified = (matched && negated) || (!matched && !negated);

            if !disqualified {
                kept.insert(index);
            }
        }

        Ok(kept)
    }

    fn visit_subtree(&mut self, tree: &Q, negated: bool) -> Result<Self::Output, Self::Error> {
        let matched = self.visit_tree(tree)?;

        if negated {
            Ok(self.everything().difference(&matched).copied().collect())
        } else {
            Ok(matched)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockset_core::record;

    fn items() -> Vec<Item> {
        vec![
            Item::new(record! { "foo" => 1, "bar" => "a" }),
            Item::new(record! { "foo" => 1, "bar" => "b" }),
            Item::new(record! { "foo" => 3, "bar" => "b" }),
        ]
    }

    fn indices(tree: Q) -> Vec<usize> {
        Combinator::new(&items())
            .evaluate(&tree)
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn or_unions_children() {
        assert_eq!(indices(Q::new("foo", 3) | Q::new("bar", "a")), vec![0, 2]);
    }

    #[test]
    fn and_intersects_children() {
        assert_eq!(indices(Q::new("foo", 1) & Q::new("bar", "b")), vec![1]);
    }

    #[test]
    fn and_with_an_empty_child_is_empty() {
        assert_eq!(indices(Q::new("foo", 9) & Q::new("bar", "b")), Vec::<usize>::new());
    }

    #[test]
    fn or_skips_empty_children() {
        assert_eq!(indices(Q::new("foo", 9) | Q::new("bar", "b")), vec![1, 2]);
    }

    #[test]
    fn negated_leaf_disqualifies_matches() {
        assert_eq!(indices(!Q::new("foo", 1)), vec![2]);
    }

    #[test]
    fn negated_group_is_complemented() {
        assert_eq!(indices(!(Q::new("foo", 1) & Q::new("bar", "b"))), vec![0, 2]);
        assert_eq!(indices(!(Q::new("foo", 3) | Q::new("bar", "a"))), vec![1]);
    }

    #[test]
    fn empty_and_group_matches_nothing() {
        assert_eq!(indices(Q::empty()), Vec::<usize>::new());
    }
}
