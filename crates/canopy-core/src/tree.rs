//! A persistent path-keyed tree.
//!
//! [`ImmutableTree`] maps [`Path`]s to values, covering arbitrary subtrees:
//! a value at a path implicitly covers every descendant path unless a deeper
//! value overrides it. All mutators return a new tree.

use std::collections::BTreeMap;

use crate::path::{ChildKey, Path};

/// A persistent mapping from paths to values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImmutableTree<V> {
    value: Option<V>,
    children: BTreeMap<ChildKey, ImmutableTree<V>>,
}

impl<V: Clone> Default for ImmutableTree<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V: Clone> ImmutableTree<V> {
    /// The empty tree.
    pub fn empty() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }

    /// A tree holding one value at the root.
    pub fn new(value: V) -> Self {
        Self {
            value: Some(value),
            children: BTreeMap::new(),
        }
    }

    /// Whether the tree holds no values at all.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// The value at the root of this tree, if any.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// The immediate child subtrees, in key order.
    pub fn children(&self) -> impl Iterator<Item = (&ChildKey, &ImmutableTree<V>)> {
        self.children.iter()
    }

    /// The child subtree under `key`, if present.
    pub fn child(&self, key: &ChildKey) -> Option<&ImmutableTree<V>> {
        self.children.get(key)
    }

    /// The value exactly at `path`, if any.
    pub fn get(&self, path: &Path) -> Option<&V> {
        match path.front() {
            None => self.value.as_ref(),
            Some(front) => self.children.get(front)?.get(&path.pop_front()),
        }
    }

    /// The subtree rooted at `path` (empty if nothing is stored there).
    pub fn subtree(&self, path: &Path) -> ImmutableTree<V> {
        match path.front() {
            None => self.clone(),
            Some(front) => match self.children.get(front) {
                Some(child) => child.subtree(&path.pop_front()),
                None => ImmutableTree::empty(),
            },
        }
    }

    /// The shallowest value on the way to `path`, with the path it is
    /// stored at. A value at an ancestor covers everything below it.
    pub fn find_root_most_value_and_path(&self, path: &Path) -> Option<(Path, &V)> {
        self.find_root_most_from(path, &Path::root())
    }

    fn find_root_most_from<'a>(
        &'a self,
        relative: &Path,
        path_so_far: &Path,
    ) -> Option<(Path, &'a V)> {
        if let Some(value) = &self.value {
            return Some((path_so_far.clone(), value));
        }
        let front = relative.front()?;
        let child = self.children.get(front)?;
        child.find_root_most_from(&relative.pop_front(), &path_so_far.child(front.clone()))
    }

    /// Set the value at `path`, returning the new tree.
    pub fn set(&self, path: &Path, value: V) -> Self {
        match path.front() {
            None => Self {
                value: Some(value),
                children: self.children.clone(),
            },
            Some(front) => {
                let child = self
                    .children
                    .get(front)
                    .cloned()
                    .unwrap_or_else(ImmutableTree::empty);
                let new_child = child.set(&path.pop_front(), value);
                let mut children = self.children.clone();
                children.insert(front.clone(), new_child);
                Self {
                    value: self.value.clone(),
                    children,
                }
            }
        }
    }

    /// Replace the whole subtree at `path`, returning the new tree. Setting
    /// an empty subtree prunes the branch.
    pub fn set_tree(&self, path: &Path, subtree: ImmutableTree<V>) -> Self {
        match path.front() {
            None => subtree,
            Some(front) => {
                let child = self
                    .children
                    .get(front)
                    .cloned()
                    .unwrap_or_else(ImmutableTree::empty);
                let new_child = child.set_tree(&path.pop_front(), subtree);
                let mut children = self.children.clone();
                if new_child.is_empty() {
                    children.remove(front);
                } else {
                    children.insert(front.clone(), new_child);
                }
                Self {
                    value: self.value.clone(),
                    children,
                }
            }
        }
    }

    /// Remove the value at `path`, pruning empty branches.
    pub fn remove(&self, path: &Path) -> Self {
        match path.front() {
            None => Self {
                value: None,
                children: self.children.clone(),
            },
            Some(front) => match self.children.get(front) {
                None => self.clone(),
                Some(child) => {
                    let new_child = child.remove(&path.pop_front());
                    let mut children = self.children.clone();
                    if new_child.is_empty() {
                        children.remove(front);
                    } else {
                        children.insert(front.clone(), new_child);
                    }
                    Self {
                        value: self.value.clone(),
                        children,
                    }
                }
            },
        }
    }

    /// Visit every value in key order, with the path it is stored at
    /// relative to this tree's root.
    pub fn for_each(&self, mut f: impl FnMut(&Path, &V)) {
        self.for_each_from(&Path::root(), &mut f);
    }

    fn for_each_from(&self, path_so_far: &Path, f: &mut impl FnMut(&Path, &V)) {
        if let Some(value) = &self.value {
            f(path_so_far, value);
        }
        for (key, child) in &self.children {
            child.for_each_from(&path_so_far.child(key.clone()), f);
        }
    }

    /// Fold every value in key order.
    pub fn fold<A>(&self, init: A, mut f: impl FnMut(A, &Path, &V) -> A) -> A {
        self.fold_from(&Path::root(), init, &mut f)
    }

    fn fold_from<A>(
        &self,
        path_so_far: &Path,
        init: A,
        f: &mut impl FnMut(A, &Path, &V) -> A,
    ) -> A {
        let mut acc = init;
        if let Some(value) = &self.value {
            acc = f(acc, path_so_far, value);
        }
        for (key, child) in &self.children {
            acc = child.fold_from(&path_so_far.child(key.clone()), acc, f);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        let tree: ImmutableTree<u32> = ImmutableTree::default();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let tree = ImmutableTree::empty()
            .set(&Path::parse("a/b"), 1)
            .set(&Path::parse("a/c"), 2);
        assert_eq!(tree.get(&Path::parse("a/b")), Some(&1));
        assert_eq!(tree.get(&Path::parse("a/c")), Some(&2));
        assert_eq!(tree.get(&Path::parse("a")), None);
    }

    #[test]
    fn test_set_is_persistent() {
        let tree = ImmutableTree::empty().set(&Path::parse("a/b"), 1);
        let updated = tree.set(&Path::parse("a/b"), 2);
        assert_eq!(tree.get(&Path::parse("a/b")), Some(&1));
        assert_eq!(updated.get(&Path::parse("a/b")), Some(&2));
    }

    #[test]
    fn test_root_most_value_covers_descendants() {
        let tree = ImmutableTree::empty().set(&Path::parse("a"), 1);
        let (path, value) = tree
            .find_root_most_value_and_path(&Path::parse("a/b/c"))
            .unwrap();
        assert_eq!(path, Path::parse("a"));
        assert_eq!(value, &1);
        assert!(tree
            .find_root_most_value_and_path(&Path::parse("x"))
            .is_none());
    }

    #[test]
    fn test_set_tree_prunes_empty_branches() {
        let tree = ImmutableTree::empty().set(&Path::parse("a/b"), 1);
        let cleared = tree.set_tree(&Path::parse("a"), ImmutableTree::empty());
        assert!(cleared.is_empty());
    }

    #[test]
    fn test_for_each_visits_relative_paths_in_key_order() {
        let tree = ImmutableTree::empty()
            .set(&Path::parse("b"), 2)
            .set(&Path::parse("a/x"), 1)
            .set(&Path::root(), 0);
        let mut seen = Vec::new();
        tree.for_each(|path, value| seen.push((path.to_string(), *value)));
        assert_eq!(
            seen,
            vec![
                ("/".to_string(), 0),
                ("/a/x".to_string(), 1),
                ("/b".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_subtree() {
        let tree = ImmutableTree::empty().set(&Path::parse("a/b/c"), 7);
        let sub = tree.subtree(&Path::parse("a"));
        assert_eq!(sub.get(&Path::parse("b/c")), Some(&7));
        assert!(tree.subtree(&Path::parse("z")).is_empty());
    }
}
