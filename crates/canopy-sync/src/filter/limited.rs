//! Limit filtering: keep a window of at most N children inside the range.

use std::cmp::Ordering;

use canopy_core::{ChildKey, Index, NamedNode, Node, Path};

use crate::change::{Change, ChildChangeAccumulator};
use crate::error::{Result, ViewError};
use crate::filter::indexed::IndexedFilter;
use crate::filter::ranged::RangedFilter;
use crate::filter::source::CompleteChildSource;

/// Keeps at most `limit` children, anchored to the start of the range
/// (or to the end, when `reverse`).
///
/// When the window is full and its boundary moves, the next candidate child
/// is pulled from the [`CompleteChildSource`]; if none is determinable, the
/// window shrinks until fresh data arrives.
#[derive(Clone, Debug)]
pub struct LimitedFilter {
    ranged: RangedFilter,
    limit: usize,
    reverse: bool,
}

impl LimitedFilter {
    pub fn new(ranged: RangedFilter, limit: usize, reverse: bool) -> Self {
        Self {
            ranged,
            limit,
            reverse,
        }
    }

    pub fn index(&self) -> &Index {
        self.ranged.index()
    }

    pub fn indexed_filter(&self) -> &IndexedFilter {
        self.ranged.indexed_filter()
    }

    fn cmp(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        if self.reverse {
            self.index().cmp(b, a)
        } else {
            self.index().cmp(a, b)
        }
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
        let new_child = if self
            .ranged
            .matches(&NamedNode::new(key.clone(), new_child.clone()))
        {
            new_child.clone()
        } else {
            Node::Empty
        };
        if snap.immediate_child(key) == new_child {
            Ok(snap.clone())
        } else if snap.num_children() < self.limit {
            self.indexed_filter()
                .update_child(snap, key, &new_child, affected_path, source, accumulator)
        } else {
            self.full_limit_update_child(snap, key, &new_child, source, accumulator)
        }
    }

    /// The window is full: updating a child may evict it, promote the next
    /// candidate, or displace the current boundary.
    fn full_limit_update_child(
        &self,
        snap: &Node,
        key: &ChildKey,
        new_child: &Node,
        source: &dyn CompleteChildSource,
        mut accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> Result<Node> {
        let new_named = NamedNode::new(key.clone(), new_child.clone());
        let window_boundary = if self.reverse {
            snap.first_child(self.index())
        } else {
            snap.last_child(self.index())
        }
        .ok_or_else(|| ViewError::invariant("full limit window has no boundary child"))?;
        let in_range = self.ranged.matches(&new_named);

        if snap.has_child(key) {
            let old_child = snap.immediate_child(key);
            // Find the first complete child past the boundary that is not
            // already in the window (and is not the child being updated).
            let mut next_child = source.child_after_child(self.index(), &window_boundary, self.reverse);
            while let Some(candidate) = &next_child {
                if candidate.name != *key && !snap.has_child(&candidate.name) {
                    break;
                }
                next_child = source.child_after_child(self.index(), candidate, self.reverse);
            }
            let compare_next = match &next_child {
                None => Ordering::Greater,
                Some(candidate) => self.cmp(candidate, &new_named),
            };
            let remains_in_window =
                in_range && !new_child.is_empty() && compare_next != Ordering::Less;
            if remains_in_window {
                if let Some(accumulator) = accumulator {
                    accumulator.track(Change::child_changed(
                        key.clone(),
                        new_child.clone(),
                        old_child,
                    ))?;
                }
                Ok(snap.update_immediate_child(key, new_child.clone()))
            } else {
                if let Some(accumulator) = accumulator.as_deref_mut() {
                    accumulator.track(Change::child_removed(key.clone(), old_child))?;
                }
                let new_snap = snap.update_immediate_child(key, Node::Empty);
                match next_child {
                    Some(candidate) if self.ranged.matches(&candidate) => {
                        if let Some(accumulator) = accumulator {
                            accumulator.track(Change::child_added(
                                candidate.name.clone(),
                                candidate.node.clone(),
                            ))?;
                        }
                        Ok(new_snap.update_immediate_child(&candidate.name, candidate.node))
                    }
                    _ => Ok(new_snap),
                }
            }
        } else if new_child.is_empty() {
            // Deleting a child that was never in the window.
            Ok(snap.clone())
        } else if in_range {
            if self.cmp(&window_boundary, &new_named) != Ordering::Less {
                if let Some(accumulator) = accumulator {
                    accumulator.track(Change::child_removed(
                        window_boundary.name.clone(),
                        window_boundary.node.clone(),
                    ))?;
                    accumulator.track(Change::child_added(key.clone(), new_child.clone()))?;
                }
                Ok(snap
                    .update_immediate_child(key, new_child.clone())
                    .update_immediate_child(&window_boundary.name, Node::Empty))
            } else {
                Ok(snap.clone())
            }
        } else {
            Ok(snap.clone())
        }
    }

    pub fn update_full_node(
        &self,
        old_snap: &Node,
        new_snap: &Node,
        accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> Result<Node> {
        let filtered = if new_snap.is_leaf() || new_snap.is_empty() {
            Node::Empty
        } else {
            let mut filtered = new_snap.update_priority(None);
            let mut ordered = new_snap.children_in_index_order(self.index());
            if self.reverse {
                ordered.reverse();
            }
            let mut found_anchor = false;
            let mut count = 0usize;
            for named in &ordered {
                let anchor_side = if self.reverse {
                    self.ranged.matches_end(named)
                } else {
                    self.ranged.matches_start(named)
                };
                if !found_anchor && anchor_side {
                    found_anchor = true;
                }
                let far_side = if self.reverse {
                    self.ranged.matches_start(named)
                } else {
                    self.ranged.matches_end(named)
                };
                if found_anchor && count < self.limit && far_side {
                    count += 1;
                } else {
                    filtered = filtered.update_immediate_child(&named.name, Node::Empty);
                }
            }
            filtered
        };
        self.indexed_filter()
            .update_full_node(old_snap, &filtered, accumulator)
    }

    /// See [`RangedFilter::update_priority`].
    pub fn update_priority(&self, old_snap: &Node, _new_priority: &Node) -> Node {
        old_snap.clone()
    }
}
