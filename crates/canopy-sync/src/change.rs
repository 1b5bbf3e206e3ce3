//! Outbound change events and the per-call accumulator.

use canopy_core::{ChildKey, Node};

use crate::error::{invariant, Result};

/// The kind of a change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeType {
    ChildAdded,
    ChildRemoved,
    ChildChanged,
    /// Produced by the listener-dispatch layer when a child's position under
    /// the active index changes; never emitted by this core.
    ChildMoved,
    /// Whole-value notification carrying the complete event snapshot.
    Value,
}

/// One change event to dispatch to an application listener.
///
/// Changes are ordered, append-only within one reconciliation call, and
/// consumed once by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeType,
    /// The affected child key; `None` for whole-value changes.
    pub child_key: Option<ChildKey>,
    /// The new node; for removals, the node that was removed.
    pub node: Node,
    /// The previous node, for `ChildChanged`.
    pub old_node: Option<Node>,
}

impl Change {
    pub fn child_added(key: ChildKey, node: Node) -> Self {
        Self {
            kind: ChangeType::ChildAdded,
            child_key: Some(key),
            node,
            old_node: None,
        }
    }

    pub fn child_removed(key: ChildKey, old_node: Node) -> Self {
        Self {
            kind: ChangeType::ChildRemoved,
            child_key: Some(key),
            node: old_node,
            old_node: None,
        }
    }

    pub fn child_changed(key: ChildKey, node: Node, old_node: Node) -> Self {
        Self {
            kind: ChangeType::ChildChanged,
            child_key: Some(key),
            node,
            old_node: Some(old_node),
        }
    }

    pub fn value(node: Node) -> Self {
        Self {
            kind: ChangeType::Value,
            child_key: None,
            node,
            old_node: None,
        }
    }
}

/// Collects per-child changes during one reconciliation call, merging
/// repeated changes to the same child into their net effect.
///
/// Changes emit in the order their child was first tracked. Filters visit
/// children in index order, so the emitted sequence follows the view's
/// active index rather than raw key order.
#[derive(Debug, Default)]
pub struct ChildChangeAccumulator {
    changes: Vec<Change>,
}

impl ChildChangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track one child change, merging with any earlier change to the same
    /// child. Only added/removed/changed may be tracked, and never for the
    /// `.priority` pseudo-child.
    pub fn track(&mut self, change: Change) -> Result<()> {
        invariant!(
            matches!(
                change.kind,
                ChangeType::ChildAdded | ChangeType::ChildRemoved | ChangeType::ChildChanged
            ),
            "only child changes can be accumulated"
        );
        let Some(key) = change.child_key.clone() else {
            return Err(crate::error::ViewError::invariant(
                "child change without a child key",
            ));
        };
        invariant!(!key.is_priority(), "cannot accumulate a .priority change");

        let position = self
            .changes
            .iter()
            .position(|existing| existing.child_key.as_ref() == Some(&key));
        let Some(idx) = position else {
            self.changes.push(change);
            return Ok(());
        };
        let old = self.changes[idx].clone();
        let merged = match (change.kind, old.kind) {
            (ChangeType::ChildAdded, ChangeType::ChildRemoved) => {
                // Removed then re-added: net effect is a change back.
                Some(Change::child_changed(key, change.node, old.node))
            }
            (ChangeType::ChildRemoved, ChangeType::ChildAdded) => None,
            (ChangeType::ChildRemoved, ChangeType::ChildChanged) => {
                let old_node = old.old_node.unwrap_or(old.node);
                Some(Change::child_removed(key, old_node))
            }
            (ChangeType::ChildChanged, ChangeType::ChildAdded) => {
                Some(Change::child_added(key, change.node))
            }
            (ChangeType::ChildChanged, ChangeType::ChildChanged) => {
                let old_node = old.old_node.unwrap_or(old.node);
                Some(Change::child_changed(key, change.node, old_node))
            }
            _ => {
                return Err(crate::error::ViewError::invariant(format!(
                    "illegal combination of changes: {:?} after {:?}",
                    change.kind, old.kind
                )))
            }
        };
        // The merged change keeps the slot of the first tracking.
        match merged {
            Some(merged) => self.changes[idx] = merged,
            None => {
                self.changes.remove(idx);
            }
        }
        Ok(())
    }

    /// Whether any change has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Drain the accumulated changes in the order their child was first
    /// tracked.
    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::Node;

    fn key(name: &str) -> ChildKey {
        ChildKey::new(name)
    }

    #[test]
    fn test_changes_emit_in_tracking_order() {
        let mut acc = ChildChangeAccumulator::new();
        acc.track(Change::child_added(key("b"), Node::leaf(1i64)))
            .unwrap();
        acc.track(Change::child_added(key("a"), Node::leaf(2i64)))
            .unwrap();
        // Merging keeps the slot of the first tracking.
        acc.track(Change::child_changed(
            key("b"),
            Node::leaf(3i64),
            Node::leaf(1i64),
        ))
        .unwrap();
        let keys: Vec<ChildKey> = acc
            .into_changes()
            .into_iter()
            .filter_map(|change| change.child_key)
            .collect();
        assert_eq!(keys, vec![key("b"), key("a")]);
    }

    #[test]
    fn test_added_then_removed_cancels() {
        let mut acc = ChildChangeAccumulator::new();
        acc.track(Change::child_added(key("a"), Node::leaf(1i64)))
            .unwrap();
        acc.track(Change::child_removed(key("a"), Node::leaf(1i64)))
            .unwrap();
        assert!(acc.into_changes().is_empty());
    }

    #[test]
    fn test_removed_then_added_becomes_changed() {
        let mut acc = ChildChangeAccumulator::new();
        acc.track(Change::child_removed(key("a"), Node::leaf(1i64)))
            .unwrap();
        acc.track(Change::child_added(key("a"), Node::leaf(2i64)))
            .unwrap();
        let changes = acc.into_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeType::ChildChanged);
        assert_eq!(changes[0].node, Node::leaf(2i64));
        assert_eq!(changes[0].old_node, Some(Node::leaf(1i64)));
    }

    #[test]
    fn test_changed_then_removed_keeps_original_old_node() {
        let mut acc = ChildChangeAccumulator::new();
        acc.track(Change::child_changed(
            key("a"),
            Node::leaf(2i64),
            Node::leaf(1i64),
        ))
        .unwrap();
        acc.track(Change::child_removed(key("a"), Node::leaf(2i64)))
            .unwrap();
        let changes = acc.into_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeType::ChildRemoved);
        assert_eq!(changes[0].node, Node::leaf(1i64));
    }

    #[test]
    fn test_added_then_changed_stays_added() {
        let mut acc = ChildChangeAccumulator::new();
        acc.track(Change::child_added(key("a"), Node::leaf(1i64)))
            .unwrap();
        acc.track(Change::child_changed(
            key("a"),
            Node::leaf(2i64),
            Node::leaf(1i64),
        ))
        .unwrap();
        let changes = acc.into_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeType::ChildAdded);
        assert_eq!(changes[0].node, Node::leaf(2i64));
    }

    #[test]
    fn test_added_after_added_is_illegal() {
        let mut acc = ChildChangeAccumulator::new();
        acc.track(Change::child_added(key("a"), Node::leaf(1i64)))
            .unwrap();
        assert!(acc
            .track(Change::child_added(key("a"), Node::leaf(2i64)))
            .is_err());
    }

    #[test]
    fn test_value_change_cannot_be_accumulated() {
        let mut acc = ChildChangeAccumulator::new();
        assert!(acc.track(Change::value(Node::leaf(1i64))).is_err());
    }
}
