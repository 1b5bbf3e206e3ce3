//! Ordering criteria for children of a node.
//!
//! An [`Index`] decides how siblings order inside a (possibly filtered)
//! view. The set of criteria is closed: by key, by priority, or by value.
//! Children live in one canonical key-ordered map, so every node is indexed
//! by every criterion; non-key orderings are produced on demand.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::node::Node;
use crate::path::ChildKey;
use crate::scalar::Scalar;

/// A child together with its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedNode {
    pub name: ChildKey,
    pub node: Node,
}

impl NamedNode {
    pub fn new(name: ChildKey, node: Node) -> Self {
        Self { name, node }
    }
}

/// The active ordering criterion of a view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Index {
    /// Order by child key alone.
    Key,
    /// Order by priority, then key. Children without a priority come first.
    Priority,
    /// Order by value, then key.
    Value,
}

impl Index {
    /// Compare two named children under this criterion. Key order always
    /// breaks ties, so the result is only `Equal` for the same key.
    pub fn cmp(&self, a: &NamedNode, b: &NamedNode) -> Ordering {
        self.cmp_values(&a.node, &b.node)
            .then_with(|| a.name.cmp(&b.name))
    }

    /// Compare only the indexed projection of two nodes, ignoring keys.
    pub fn cmp_values(&self, a: &Node, b: &Node) -> Ordering {
        match self {
            Index::Key => Ordering::Equal,
            Index::Priority => cmp_priorities(a.priority(), b.priority()),
            Index::Value => cmp_nodes(a, b),
        }
    }
}

fn cmp_priorities(a: Option<&Scalar>, b: Option<&Scalar>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Whole-node ordering for the value criterion: empty nodes first, then
/// leaves in scalar order, then children nodes (which compare equal among
/// themselves; keys break the tie).
fn cmp_nodes(a: &Node, b: &Node) -> Ordering {
    fn rank(node: &Node) -> u8 {
        match node {
            Node::Empty => 0,
            Node::Leaf(_) => 1,
            Node::Children(_) => 2,
        }
    }
    match (a.value(), b.value()) {
        (Some(a), Some(b)) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str, value: serde_json::Value) -> NamedNode {
        NamedNode::new(ChildKey::new(name), Node::from_json(&value))
    }

    #[test]
    fn test_key_index_compares_keys_only() {
        let a = named("1", json!("zzz"));
        let b = named("b", json!("aaa"));
        assert_eq!(Index::Key.cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_priority_index_orders_unprioritized_first() {
        let plain = named("z", json!(1));
        let prioritized = named("a", json!({".value": 1, ".priority": 5}));
        assert_eq!(Index::Priority.cmp(&plain, &prioritized), Ordering::Less);
    }

    #[test]
    fn test_priority_ties_break_by_key() {
        let a = named("a", json!({".value": 1, ".priority": 5}));
        let b = named("b", json!({".value": 2, ".priority": 5}));
        assert_eq!(Index::Priority.cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_value_index_orders_scalars_then_children() {
        let boolean = named("c", json!(true));
        let number = named("b", json!(0));
        let object = named("a", json!({"x": 1}));
        assert_eq!(Index::Value.cmp(&boolean, &number), Ordering::Less);
        assert_eq!(Index::Value.cmp(&number, &object), Ordering::Less);
    }
}
