//! The merged overlay of pending writes.
//!
//! A [`CompoundWrite`] collapses a set of path-addressed overwrites into one
//! queryable structure: at any path it can answer "is there a write that
//! fully determines this subtree", produce the children it completely
//! knows, and apply itself on top of server data.

use canopy_core::{ImmutableTree, Index, NamedNode, Node, Path};

/// An immutable overlay of writes, keyed by path.
///
/// A write at a path covers the whole subtree beneath it; a deeper write
/// overrides the covered region of a shallower one only when added later
/// (adding merges into the existing covering node).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompoundWrite {
    writes: ImmutableTree<Node>,
}

impl CompoundWrite {
    /// The empty overlay.
    pub fn empty() -> Self {
        Self {
            writes: ImmutableTree::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Overlay `node` at `path`. If an ancestor write already covers
    /// `path`, the node is merged into that covering write instead of
    /// shadowing it.
    pub fn add_write(&self, path: &Path, node: Node) -> CompoundWrite {
        if path.is_empty() {
            return CompoundWrite {
                writes: ImmutableTree::new(node),
            };
        }
        match self.writes.find_root_most_value_and_path(path) {
            Some((root_most_path, value)) => {
                let relative = root_most_path
                    .relative(path)
                    .unwrap_or_else(Path::root);
                let updated = value.update_child(&relative, node);
                CompoundWrite {
                    writes: self.writes.set(&root_most_path, updated),
                }
            }
            None => CompoundWrite {
                writes: self.writes.set_tree(path, ImmutableTree::new(node)),
            },
        }
    }

    /// Overlay several children below `path`.
    pub fn add_writes(&self, path: &Path, children: &ImmutableTree<Node>) -> CompoundWrite {
        children.fold(self.clone(), |acc, relative_path, node| {
            acc.add_write(&path.child_path(relative_path), node.clone())
        })
    }

    /// Remove the write at exactly `path` (and everything beneath it).
    pub fn remove_write(&self, path: &Path) -> CompoundWrite {
        if path.is_empty() {
            CompoundWrite::empty()
        } else {
            CompoundWrite {
                writes: self.writes.set_tree(path, ImmutableTree::empty()),
            }
        }
    }

    /// Whether a write completely determines the value at `path`.
    pub fn has_complete_write(&self, path: &Path) -> bool {
        self.get_complete_node(path).is_some()
    }

    /// The fully-determined value at `path`, if a write at `path` or an
    /// ancestor covers it.
    pub fn get_complete_node(&self, path: &Path) -> Option<Node> {
        let (root_most_path, value) = self.writes.find_root_most_value_and_path(path)?;
        let relative = root_most_path.relative(path)?;
        Some(value.child(&relative))
    }

    /// All immediate children this overlay completely determines, in key
    /// order.
    pub fn get_complete_children(&self) -> Vec<NamedNode> {
        let mut children = Vec::new();
        if let Some(node) = self.writes.value() {
            node.for_each_child(&Index::Key, |key, child| {
                children.push(NamedNode::new(key.clone(), child.clone()));
            });
        } else {
            for (key, child_tree) in self.writes.children() {
                if let Some(node) = child_tree.value() {
                    children.push(NamedNode::new(key.clone(), node.clone()));
                }
            }
        }
        children
    }

    /// The overlay scoped to `path`.
    pub fn child_compound_write(&self, path: &Path) -> CompoundWrite {
        if path.is_empty() {
            return self.clone();
        }
        match self.get_complete_node(path) {
            Some(shadowing) => CompoundWrite {
                writes: ImmutableTree::new(shadowing),
            },
            None => CompoundWrite {
                writes: self.writes.subtree(path),
            },
        }
    }

    /// Apply this overlay on top of `node`, most specific write winning.
    /// A pending `.priority` write only lands on a non-empty result node.
    pub fn apply(&self, node: &Node) -> Node {
        apply_subtree_write(&Path::root(), &self.writes, node.clone())
    }
}

fn apply_subtree_write(relative_path: &Path, writes: &ImmutableTree<Node>, node: Node) -> Node {
    if let Some(value) = writes.value() {
        // A write at this path covers the whole subtree.
        return node.update_child(relative_path, value.clone());
    }
    let mut node = node;
    let mut priority_write: Option<Node> = None;
    for (key, child_tree) in writes.children() {
        if key.is_priority() {
            priority_write = child_tree.value().cloned();
        } else {
            node = apply_subtree_write(&relative_path.child(key.clone()), child_tree, node);
        }
    }
    if let Some(priority) = priority_write {
        if !node.child(relative_path).is_empty() {
            node = node.update_child(
                &relative_path.child(canopy_core::ChildKey::priority()),
                priority,
            );
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::Node;
    use serde_json::json;

    fn node(value: serde_json::Value) -> Node {
        Node::from_json(&value)
    }

    #[test]
    fn test_add_write_merges_into_covering_ancestor() {
        let overlay = CompoundWrite::empty()
            .add_write(&Path::parse("a"), node(json!({"x": 1})))
            .add_write(&Path::parse("a/y"), node(json!(2)));
        assert_eq!(
            overlay.get_complete_node(&Path::parse("a")),
            Some(node(json!({"x": 1, "y": 2})))
        );
    }

    #[test]
    fn test_ancestor_write_covers_descendants() {
        let overlay = CompoundWrite::empty().add_write(&Path::parse("a"), node(json!({"x": 1})));
        assert!(overlay.has_complete_write(&Path::parse("a/x")));
        assert!(overlay.has_complete_write(&Path::parse("a/missing")));
        assert_eq!(
            overlay.get_complete_node(&Path::parse("a/missing")),
            Some(Node::Empty)
        );
        assert!(!overlay.has_complete_write(&Path::parse("b")));
        // A deep write does not make the root complete.
        assert!(!overlay.has_complete_write(&Path::root()));
    }

    #[test]
    fn test_apply_overlays_server_data() {
        let overlay = CompoundWrite::empty()
            .add_write(&Path::parse("a/b"), node(json!(1)))
            .add_write(&Path::parse("c"), node(json!(3)));
        let server = node(json!({"a": {"b": 0, "keep": true}, "d": 4}));
        let result = overlay.apply(&server);
        assert_eq!(result, node(json!({"a": {"b": 1, "keep": true}, "c": 3, "d": 4})));
    }

    #[test]
    fn test_apply_priority_only_on_nonempty_node() {
        let overlay =
            CompoundWrite::empty().add_write(&Path::parse("a/.priority"), node(json!(5)));
        // Nothing at "a": the priority write is dropped.
        assert_eq!(overlay.apply(&Node::Empty), Node::Empty);
        // With data at "a" it lands.
        let applied = overlay.apply(&node(json!({"a": 1})));
        assert_eq!(
            applied.child(&Path::parse("a")).priority(),
            Some(&canopy_core::Scalar::from(5i64))
        );
    }

    #[test]
    fn test_child_compound_write_scopes() {
        let overlay = CompoundWrite::empty()
            .add_write(&Path::parse("a/b"), node(json!(1)))
            .add_write(&Path::parse("z"), node(json!(9)));
        let scoped = overlay.child_compound_write(&Path::parse("a"));
        assert_eq!(
            scoped.get_complete_node(&Path::parse("b")),
            Some(node(json!(1)))
        );
        assert!(!scoped.has_complete_write(&Path::parse("z")));
    }

    #[test]
    fn test_remove_write() {
        let overlay = CompoundWrite::empty()
            .add_write(&Path::parse("a"), node(json!(1)))
            .remove_write(&Path::parse("a"));
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_complete_children_from_root_write() {
        let overlay = CompoundWrite::empty().add_write(&Path::root(), node(json!({"a": 1, "b": 2})));
        let children = overlay.get_complete_children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name.as_str(), "a");
    }

    #[test]
    fn test_complete_children_from_child_writes() {
        let overlay = CompoundWrite::empty()
            .add_write(&Path::parse("a"), node(json!(1)))
            .add_write(&Path::parse("b/deep"), node(json!(2)));
        let children = overlay.get_complete_children();
        // Only "a" is completely known; "b" has just a deep write.
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name.as_str(), "a");
    }
}
