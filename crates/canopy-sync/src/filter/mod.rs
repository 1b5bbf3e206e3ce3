//! Query filters.
//!
//! A [`QuerySpec`] describes what a listener wants to see: an ordering
//! criterion, optional range bounds, and an optional window limit. Its
//! [`NodeFilter`] applies that policy to snapshots, one child update or one
//! full replacement at a time, tracking the resulting child changes.
//!
//! # Key Types
//! - [`QuerySpec`]: declarative query parameters.
//! - [`NodeFilter`]: the closed family of filtering strategies.
//! - [`CompleteChildSource`]: supplies children a filter cannot see.

mod indexed;
mod limited;
mod ranged;
mod source;

pub use indexed::IndexedFilter;
pub use limited::LimitedFilter;
pub use ranged::RangedFilter;
pub use source::{CompleteChildSource, NoCompleteChildSource, WriteTreeCompleteChildSource};

use canopy_core::{ChildKey, Index, Node, Path};

use crate::change::ChildChangeAccumulator;
use crate::error::Result;

/// One side of a query range.
///
/// The node is the indexed projection to compare against; the key, when
/// present, breaks ties between children with equal projections. A missing
/// key makes the bound inclusive of every key at that value.
#[derive(Clone, Debug)]
pub struct RangeBound {
    pub node: Node,
    pub key: Option<ChildKey>,
}

impl RangeBound {
    pub fn new(node: Node, key: Option<ChildKey>) -> Self {
        Self { node, key }
    }

    /// A bound on the indexed value alone.
    pub fn value(node: Node) -> Self {
        Self { node, key: None }
    }
}

/// Which end of the range a window limit anchors to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitAnchor {
    /// Keep the first N children.
    First,
    /// Keep the last N children.
    Last,
}

/// The declarative parameters of one query listener.
#[derive(Clone, Debug)]
pub struct QuerySpec {
    pub index: Index,
    pub start: Option<RangeBound>,
    pub end: Option<RangeBound>,
    pub limit: Option<(usize, LimitAnchor)>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            index: Index::Priority,
            start: None,
            end: None,
            limit: None,
        }
    }
}

impl QuerySpec {
    /// The default query: everything at the path, in priority order.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_index(index: Index) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn start_at(mut self, bound: RangeBound) -> Self {
        self.start = Some(bound);
        self
    }

    pub fn end_at(mut self, bound: RangeBound) -> Self {
        self.end = Some(bound);
        self
    }

    pub fn limit_to_first(mut self, count: usize) -> Self {
        self.limit = Some((count, LimitAnchor::First));
        self
    }

    pub fn limit_to_last(mut self, count: usize) -> Self {
        self.limit = Some((count, LimitAnchor::Last));
        self
    }

    /// Whether this query sees all data at its path (no bounds, no limit).
    pub fn loads_all_data(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.limit.is_none()
    }

    /// Build the filter implementing this query.
    pub fn node_filter(&self) -> NodeFilter {
        if self.loads_all_data() {
            return NodeFilter::Indexed(IndexedFilter::new(self.index.clone()));
        }
        let ranged = RangedFilter::new(self.index.clone(), self.start.clone(), self.end.clone());
        match self.limit {
            None => NodeFilter::Ranged(ranged),
            Some((count, anchor)) => NodeFilter::Limited(LimitedFilter::new(
                ranged,
                count,
                anchor == LimitAnchor::Last,
            )),
        }
    }
}

/// The closed family of snapshot filters.
///
/// Every filter orders children by its index; ranged and limited filters
/// additionally drop children, which is what `filters_nodes` reports.
#[derive(Clone, Debug)]
pub enum NodeFilter {
    Indexed(IndexedFilter),
    Ranged(RangedFilter),
    Limited(LimitedFilter),
}

impl NodeFilter {
    pub fn index(&self) -> &Index {
        match self {
            NodeFilter::Indexed(filter) => filter.index(),
            NodeFilter::Ranged(filter) => filter.index(),
            NodeFilter::Limited(filter) => filter.index(),
        }
    }

    /// Whether this filter can drop children from the view.
    pub fn filters_nodes(&self) -> bool {
        !matches!(self, NodeFilter::Indexed(_))
    }

    /// The ordering-only filter with the same index. Used to maintain
    /// unfiltered server caches beneath a filtering view.
    pub fn indexed_filter(&self) -> NodeFilter {
        NodeFilter::Indexed(IndexedFilter::new(self.index().clone()))
    }

    /// Update one child of `snap`, returning the new filtered snapshot.
    pub fn update_child(
        &self,
        snap: &Node,
        key: &ChildKey,
        new_child: &Node,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> Result<Node> {
        match self {
            NodeFilter::Indexed(filter) => {
                filter.update_child(snap, key, new_child, affected_path, source, accumulator)
            }
            NodeFilter::Ranged(filter) => {
                filter.update_child(snap, key, new_child, affected_path, source, accumulator)
            }
            NodeFilter::Limited(filter) => {
                filter.update_child(snap, key, new_child, affected_path, source, accumulator)
            }
        }
    }

    /// Replace the whole snapshot, returning the new filtered snapshot.
    pub fn update_full_node(
        &self,
        old_snap: &Node,
        new_snap: &Node,
        accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> Result<Node> {
        match self {
            NodeFilter::Indexed(filter) => filter.update_full_node(old_snap, new_snap, accumulator),
            NodeFilter::Ranged(filter) => filter.update_full_node(old_snap, new_snap, accumulator),
            NodeFilter::Limited(filter) => filter.update_full_node(old_snap, new_snap, accumulator),
        }
    }

    /// Update the snapshot's priority, if this filter lets priorities
    /// through.
    pub fn update_priority(&self, old_snap: &Node, new_priority: &Node) -> Node {
        match self {
            NodeFilter::Indexed(filter) => filter.update_priority(old_snap, new_priority),
            NodeFilter::Ranged(filter) => filter.update_priority(old_snap, new_priority),
            NodeFilter::Limited(filter) => filter.update_priority(old_snap, new_priority),
        }
    }
}
