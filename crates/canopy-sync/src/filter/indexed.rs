//! The pass-through filter: orders children, never drops any.

use canopy_core::{ChildKey, Index, Node, Path};

use crate::change::{Change, ChildChangeAccumulator};
use crate::error::{invariant, Result};
use crate::filter::source::CompleteChildSource;

/// Applies an ordering criterion without restricting membership.
///
/// This is the terminal filter every other filter delegates to; it is the
/// only one that tracks changes into the accumulator.
#[derive(Clone, Debug)]
pub struct IndexedFilter {
    index: Index,
}

impl IndexedFilter {
    pub fn new(index: Index) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn update_child(
        &self,
        snap: &Node,
        key: &ChildKey,
        new_child: &Node,
        affected_path: &Path,
        _source: &dyn CompleteChildSource,
        accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> Result<Node> {
        let old_child = snap.immediate_child(key);
        if old_child.child(affected_path) == new_child.child(affected_path)
            && old_child.is_empty() == new_child.is_empty()
        {
            // Nothing observable changed at the affected path. The extra
            // emptiness check catches a child entering or leaving the view
            // when both snapshots are empty below the affected path.
            return Ok(snap.clone());
        }
        if let Some(accumulator) = accumulator {
            if new_child.is_empty() {
                if snap.has_child(key) {
                    accumulator.track(Change::child_removed(key.clone(), old_child))?;
                } else {
                    invariant!(
                        snap.is_leaf(),
                        "removing a child that was never present only makes sense on a leaf"
                    );
                }
            } else if old_child.is_empty() {
                accumulator.track(Change::child_added(key.clone(), new_child.clone()))?;
            } else {
                accumulator.track(Change::child_changed(
                    key.clone(),
                    new_child.clone(),
                    old_child,
                ))?;
            }
        }
        if snap.is_leaf() && new_child.is_empty() {
            Ok(snap.clone())
        } else {
            Ok(snap.update_immediate_child(key, new_child.clone()))
        }
    }

    pub fn update_full_node(
        &self,
        old_snap: &Node,
        new_snap: &Node,
        accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> Result<Node> {
        if let Some(accumulator) = accumulator {
            let mut result = Ok(());
            if !old_snap.is_leaf() {
                old_snap.for_each_child(&self.index, |key, old_child| {
                    if result.is_ok() && !new_snap.has_child(key) {
                        result = accumulator.track(Change::child_removed(
                            key.clone(),
                            old_child.clone(),
                        ));
                    }
                });
            }
            result?;
            let mut result = Ok(());
            if !new_snap.is_leaf() {
                new_snap.for_each_child(&self.index, |key, new_child| {
                    if result.is_err() {
                        return;
                    }
                    if old_snap.has_child(key) {
                        let old_child = old_snap.immediate_child(key);
                        if old_child != *new_child {
                            result = accumulator.track(Change::child_changed(
                                key.clone(),
                                new_child.clone(),
                                old_child,
                            ));
                        }
                    } else {
                        result = accumulator
                            .track(Change::child_added(key.clone(), new_child.clone()));
                    }
                });
            }
            result?;
        }
        Ok(new_snap.clone())
    }

    pub fn update_priority(&self, old_snap: &Node, new_priority: &Node) -> Node {
        if old_snap.is_empty() {
            Node::Empty
        } else {
            old_snap.update_priority(new_priority.as_priority())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeType;
    use crate::filter::source::NoCompleteChildSource;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_json(&value)
    }

    #[test]
    fn test_update_child_tracks_add_change_remove() {
        let filter = IndexedFilter::new(Index::Key);
        let key = ChildKey::new("a");
        let mut acc = ChildChangeAccumulator::new();
        let snap = filter
            .update_child(
                &Node::Empty,
                &key,
                &node(json!(1)),
                &Path::root(),
                &NoCompleteChildSource,
                Some(&mut acc),
            )
            .unwrap();
        assert_eq!(snap, node(json!({"a": 1})));
        let changes = acc.into_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeType::ChildAdded);

        let mut acc = ChildChangeAccumulator::new();
        let snap = filter
            .update_child(
                &snap,
                &key,
                &Node::Empty,
                &Path::root(),
                &NoCompleteChildSource,
                Some(&mut acc),
            )
            .unwrap();
        assert!(snap.is_empty());
        assert_eq!(acc.into_changes()[0].kind, ChangeType::ChildRemoved);
    }

    #[test]
    fn test_update_child_unchanged_is_noop() {
        let filter = IndexedFilter::new(Index::Key);
        let snap = node(json!({"a": 1}));
        let mut acc = ChildChangeAccumulator::new();
        let result = filter
            .update_child(
                &snap,
                &ChildKey::new("a"),
                &node(json!(1)),
                &Path::root(),
                &NoCompleteChildSource,
                Some(&mut acc),
            )
            .unwrap();
        assert_eq!(result, snap);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_update_full_node_diffs_children() {
        let filter = IndexedFilter::new(Index::Key);
        let old = node(json!({"a": 1, "b": 2}));
        let new = node(json!({"b": 3, "c": 4}));
        let mut acc = ChildChangeAccumulator::new();
        let result = filter.update_full_node(&old, &new, Some(&mut acc)).unwrap();
        assert_eq!(result, new);
        let kinds: Vec<ChangeType> = acc.into_changes().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeType::ChildRemoved,
                ChangeType::ChildChanged,
                ChangeType::ChildAdded,
            ]
        );
    }
}
