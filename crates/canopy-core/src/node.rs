//! Immutable snapshot nodes.
//!
//! A [`Node`] is a point-in-time value in the hierarchical store: either a
//! scalar leaf, an ordered collection of named children, or the distinguished
//! empty node. Every node may carry a priority. Nodes are persistent: all
//! update operations return a new node and share unchanged children with the
//! original.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::index::{Index, NamedNode};
use crate::path::{ChildKey, Path};
use crate::scalar::Scalar;

/// A scalar leaf with an optional priority.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct LeafNode {
    value: Scalar,
    priority: Option<Scalar>,
}

/// An ordered collection of named children with an optional priority.
///
/// Children are stored in key order behind an [`Arc`], so cloning a node is
/// cheap and updating one child rebuilds only the map spine.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ChildrenNode {
    children: Arc<BTreeMap<ChildKey, Node>>,
    priority: Option<Scalar>,
}

/// An immutable snapshot value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Empty,
    Leaf(LeafNode),
    Children(ChildrenNode),
}

impl Node {
    /// The empty node.
    pub fn empty() -> Self {
        Node::Empty
    }

    /// A leaf node without priority.
    pub fn leaf(value: impl Into<Scalar>) -> Self {
        Node::Leaf(LeafNode {
            value: value.into(),
            priority: None,
        })
    }

    /// A leaf node with a priority.
    pub fn leaf_with_priority(value: impl Into<Scalar>, priority: impl Into<Scalar>) -> Self {
        Node::Leaf(LeafNode {
            value: value.into(),
            priority: Some(priority.into()),
        })
    }

    /// A children node from an iterator of (key, node) pairs. Empty children
    /// are skipped; an empty result collapses to [`Node::Empty`].
    pub fn children_from(pairs: impl IntoIterator<Item = (ChildKey, Node)>) -> Self {
        let map: BTreeMap<ChildKey, Node> = pairs
            .into_iter()
            .filter(|(_, node)| !node.is_empty())
            .collect();
        if map.is_empty() {
            Node::Empty
        } else {
            Node::Children(ChildrenNode {
                children: Arc::new(map),
                priority: None,
            })
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// The scalar value, if this is a leaf.
    pub fn value(&self) -> Option<&Scalar> {
        match self {
            Node::Leaf(leaf) => Some(&leaf.value),
            _ => None,
        }
    }

    /// The priority, if any. The empty node never has one.
    pub fn priority(&self) -> Option<&Scalar> {
        match self {
            Node::Empty => None,
            Node::Leaf(leaf) => leaf.priority.as_ref(),
            Node::Children(children) => children.priority.as_ref(),
        }
    }

    /// The priority represented as a node: a priority-less leaf, or empty.
    pub fn priority_node(&self) -> Node {
        match self.priority() {
            Some(priority) => Node::leaf(priority.clone()),
            None => Node::Empty,
        }
    }

    /// Interpret this node as a priority value (it must be empty or a leaf).
    pub fn as_priority(&self) -> Option<Scalar> {
        self.value().cloned()
    }

    /// Number of real children.
    pub fn num_children(&self) -> usize {
        match self {
            Node::Children(children) => children.children.len(),
            _ => 0,
        }
    }

    /// Whether `key` names a real child (the `.priority` pseudo-child does
    /// not count).
    pub fn has_child(&self, key: &ChildKey) -> bool {
        match self {
            Node::Children(children) => children.children.contains_key(key),
            _ => false,
        }
    }

    /// The named child, or the priority-as-node for the `.priority`
    /// pseudo-key. Missing children are the empty node.
    pub fn immediate_child(&self, key: &ChildKey) -> Node {
        if key.is_priority() {
            return self.priority_node();
        }
        match self {
            Node::Children(children) => children
                .children
                .get(key)
                .cloned()
                .unwrap_or(Node::Empty),
            _ => Node::Empty,
        }
    }

    /// The node at `path` below this node.
    pub fn child(&self, path: &Path) -> Node {
        match path.front() {
            None => self.clone(),
            Some(front) => self.immediate_child(front).child(&path.pop_front()),
        }
    }

    /// Replace this node's priority.
    pub fn update_priority(&self, priority: Option<Scalar>) -> Node {
        match self {
            Node::Empty => Node::Empty,
            Node::Leaf(leaf) => Node::Leaf(LeafNode {
                value: leaf.value.clone(),
                priority,
            }),
            Node::Children(children) => Node::Children(ChildrenNode {
                children: Arc::clone(&children.children),
                priority,
            }),
        }
    }

    /// Replace one immediate child, returning the new node.
    ///
    /// Setting a real child on a leaf promotes the leaf to a children node:
    /// the leaf value is discarded, the priority is kept. Removing the last
    /// child collapses to the empty node.
    pub fn update_immediate_child(&self, key: &ChildKey, new_child: Node) -> Node {
        if key.is_priority() {
            return self.update_priority(new_child.as_priority());
        }
        match self {
            Node::Empty => {
                if new_child.is_empty() {
                    Node::Empty
                } else {
                    Node::children_from([(key.clone(), new_child)])
                }
            }
            Node::Leaf(leaf) => {
                if new_child.is_empty() {
                    self.clone()
                } else {
                    Node::children_from([(key.clone(), new_child)])
                        .update_priority(leaf.priority.clone())
                }
            }
            Node::Children(children) => {
                let mut map = (*children.children).clone();
                if new_child.is_empty() {
                    map.remove(key);
                } else {
                    map.insert(key.clone(), new_child);
                }
                if map.is_empty() {
                    Node::Empty
                } else {
                    Node::Children(ChildrenNode {
                        children: Arc::new(map),
                        priority: children.priority.clone(),
                    })
                }
            }
        }
    }

    /// Replace the node at `path` below this node, returning the new node.
    ///
    /// A trailing `.priority` segment updates the priority at its parent.
    pub fn update_child(&self, path: &Path, new_node: Node) -> Node {
        let Some(front) = path.front() else {
            return new_node;
        };
        if front.is_priority() {
            debug_assert!(path.len() == 1, "priority path must have a single segment");
            return self.update_priority(new_node.as_priority());
        }
        let child_path = path.pop_front();
        let new_child = self.immediate_child(front).update_child(&child_path, new_node);
        self.update_immediate_child(front, new_child)
    }

    /// The children as named nodes in `index` order.
    pub fn children_in_index_order(&self, index: &Index) -> Vec<NamedNode> {
        let Node::Children(children) = self else {
            return Vec::new();
        };
        let mut named: Vec<NamedNode> = children
            .children
            .iter()
            .map(|(key, node)| NamedNode::new(key.clone(), node.clone()))
            .collect();
        if *index != Index::Key {
            named.sort_by(|a, b| index.cmp(a, b));
        }
        named
    }

    /// Visit each child in `index` order.
    pub fn for_each_child(&self, index: &Index, mut f: impl FnMut(&ChildKey, &Node)) {
        for named in self.children_in_index_order(index) {
            f(&named.name, &named.node);
        }
    }

    /// The first child in `index` order, if any.
    pub fn first_child(&self, index: &Index) -> Option<NamedNode> {
        self.children_in_index_order(index).into_iter().next()
    }

    /// The last child in `index` order, if any.
    pub fn last_child(&self, index: &Index) -> Option<NamedNode> {
        self.children_in_index_order(index).into_iter().last()
    }

    /// Build a node from a JSON value.
    ///
    /// Objects may carry a `.priority` entry and leaves may be wrapped as
    /// `{".value": v, ".priority": p}`. Arrays become children keyed
    /// `"0"`, `"1"`, ….
    pub fn from_json(value: &Value) -> Node {
        match value {
            Value::Null => Node::Empty,
            Value::Bool(b) => Node::leaf(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Node::leaf(f),
                None => Node::Empty,
            },
            Value::String(s) => Node::leaf(s.as_str()),
            Value::Array(items) => Node::children_from(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (ChildKey::new(i.to_string()), Node::from_json(item))),
            ),
            Value::Object(map) => {
                let priority = map.get(".priority").and_then(json_scalar);
                if let Some(value) = map.get(".value") {
                    return Node::from_json(value).update_priority(priority);
                }
                let node = Node::children_from(map.iter().filter_map(|(key, child)| {
                    if key.starts_with('.') {
                        None
                    } else {
                        Some((ChildKey::new(key.as_str()), Node::from_json(child)))
                    }
                }));
                node.update_priority(priority)
            }
        }
    }

    /// Export this node as a JSON value, wrapping leaves and annotating
    /// children when a priority is present.
    pub fn to_json(&self) -> Value {
        match self {
            Node::Empty => Value::Null,
            Node::Leaf(leaf) => {
                let value = scalar_json(&leaf.value);
                match &leaf.priority {
                    None => value,
                    Some(priority) => serde_json::json!({
                        ".value": value,
                        ".priority": scalar_json(priority),
                    }),
                }
            }
            Node::Children(children) => {
                let mut map = serde_json::Map::new();
                if let Some(priority) = &children.priority {
                    map.insert(".priority".to_string(), scalar_json(priority));
                }
                for (key, child) in children.children.iter() {
                    map.insert(key.as_str().to_string(), child.to_json());
                }
                Value::Object(map)
            }
        }
    }
}

fn json_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => n.as_f64().map(Scalar::Number),
        Value::String(s) => Some(Scalar::String(s.clone())),
        _ => None,
    }
}

fn scalar_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Scalar::String(s) => Value::String(s.clone()),
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.to_json())
    }
}
