//! Range filtering: keep only children inside the query's bounds.

use std::cmp::Ordering;

use canopy_core::{ChildKey, Index, NamedNode, Node, Path};

use crate::change::ChildChangeAccumulator;
use crate::error::Result;
use crate::filter::indexed::IndexedFilter;
use crate::filter::source::CompleteChildSource;
use crate::filter::RangeBound;

/// Drops children whose indexed projection falls outside `[start, end]`.
///
/// An absent bound is open on that side. Filtered views never carry a
/// priority on the top-level node.
#[derive(Clone, Debug)]
pub struct RangedFilter {
    indexed: IndexedFilter,
    start: Option<RangeBound>,
    end: Option<RangeBound>,
}

impl RangedFilter {
    pub fn new(index: Index, start: Option<RangeBound>, end: Option<RangeBound>) -> Self {
        Self {
            indexed: IndexedFilter::new(index),
            start,
            end,
        }
    }

    pub fn index(&self) -> &Index {
        self.indexed.index()
    }

    pub fn indexed_filter(&self) -> &IndexedFilter {
        &self.indexed
    }

    /// Whether `child` is at or past the start bound.
    pub fn matches_start(&self, child: &NamedNode) -> bool {
        let Some(bound) = &self.start else {
            return true;
        };
        match self.index().cmp_values(&bound.node, &child.node) {
            Ordering::Less => true,
            Ordering::Greater => false,
            // A bound without a key starts before every key at that value.
            Ordering::Equal => match &bound.key {
                None => true,
                Some(key) => key <= &child.name,
            },
        }
    }

    /// Whether `child` is at or before the end bound.
    pub fn matches_end(&self, child: &NamedNode) -> bool {
        let Some(bound) = &self.end else {
            return true;
        };
        match self.index().cmp_values(&child.node, &bound.node) {
            Ordering::Less => true,
            Ordering::Greater => false,
            // A bound without a key ends after every key at that value.
            Ordering::Equal => match &bound.key {
                None => true,
                Some(key) => &child.name <= key,
            },
        }
    }

    /// Whether `child` is inside the bounds.
    pub fn matches(&self, child: &NamedNode) -> bool {
        self.matches_start(child) && self.matches_end(child)
    }

    pub fn update_child(
        &self,
        snap: &Node,
        key: &ChildKey,
        new_child: &Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> Result<Node> {
        let new_child = if self.matches(&NamedNode::new(key.clone(), new_child.clone())) {
            new_child.clone()
        } else {
            Node::Empty
        };
        self.indexed
            .update_child(snap, key, &new_child, affected_path, source, accumulator)
    }

    pub fn update_full_node(
        &self,
        old_snap: &Node,
        new_snap: &Node,
        accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> Result<Node> {
        let filtered = self.filter_full_node(new_snap);
        self.indexed.update_full_node(old_snap, &filtered, accumulator)
    }

    /// Filtered views keep whatever priority they already have; priority
    /// updates do not flow through queries.
    pub fn update_priority(&self, old_snap: &Node, _new_priority: &Node) -> Node {
        old_snap.clone()
    }

    fn filter_full_node(&self, new_snap: &Node) -> Node {
        if new_snap.is_leaf() {
            // A leaf has no children to match the bounds.
            return Node::Empty;
        }
        let mut filtered = new_snap.update_priority(None);
        new_snap.for_each_child(self.index(), |key, child| {
            if !self.matches(&NamedNode::new(key.clone(), child.clone())) {
                filtered = filtered.update_immediate_child(key, Node::Empty);
            }
        });
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::source::NoCompleteChildSource;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_json(&value)
    }

    fn value_range(start: i64, end: i64) -> RangedFilter {
        RangedFilter::new(
            Index::Value,
            Some(RangeBound::value(node(json!(start)))),
            Some(RangeBound::value(node(json!(end)))),
        )
    }

    #[test]
    fn test_update_full_node_drops_out_of_range() {
        let filter = value_range(2, 3);
        let snap = node(json!({"a": 1, "b": 2, "c": 3, "d": 4}));
        let result = filter.update_full_node(&Node::Empty, &snap, None).unwrap();
        assert_eq!(result, node(json!({"b": 2, "c": 3})));
    }

    #[test]
    fn test_update_child_clamps_to_empty() {
        let filter = value_range(2, 3);
        let snap = node(json!({"b": 2}));
        let result = filter
            .update_child(
                &snap,
                &ChildKey::new("x"),
                &node(json!(9)),
                &Path::root(),
                &NoCompleteChildSource,
                None,
            )
            .unwrap();
        assert_eq!(result, snap);
    }

    #[test]
    fn test_key_bound_breaks_value_ties() {
        let filter = RangedFilter::new(
            Index::Value,
            Some(RangeBound::new(node(json!(1)), Some(ChildKey::new("m")))),
            None,
        );
        assert!(!filter.matches(&NamedNode::new(ChildKey::new("a"), node(json!(1)))));
        assert!(filter.matches(&NamedNode::new(ChildKey::new("m"), node(json!(1)))));
        assert!(filter.matches(&NamedNode::new(ChildKey::new("z"), node(json!(1)))));
        assert!(filter.matches(&NamedNode::new(ChildKey::new("a"), node(json!(2)))));
    }

    #[test]
    fn test_leaf_full_node_filters_to_empty() {
        let filter = value_range(0, 10);
        assert!(filter
            .update_full_node(&Node::Empty, &node(json!(5)), None)
            .unwrap()
            .is_empty());
    }
}
