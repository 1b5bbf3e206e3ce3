//! Sources of complete children for filters.
//!
//! When a limit window's boundary moves, the filter may need a child it has
//! never seen (the next one past the window). A [`CompleteChildSource`]
//! answers those lookups from whatever complete data exists; filters stay
//! pure over the nodes they are handed.

use canopy_core::{ChildKey, Index, NamedNode, Node};

use crate::view_cache::{CacheNode, ViewCache};
use crate::write_tree::WriteTreeRef;

/// Supplies children outside the node a filter is updating.
pub trait CompleteChildSource {
    /// The complete value of `key`, if determinable.
    fn complete_child(&self, key: &ChildKey) -> Option<Node>;

    /// The next child past `child` in `index` order (previous when
    /// `reverse`), if determinable.
    fn child_after_child(
        &self,
        index: &Index,
        child: &NamedNode,
        reverse: bool,
    ) -> Option<NamedNode>;
}

/// A source that knows nothing. Used when extra children must not be
/// conjured, e.g. while processing raw server overwrites.
pub struct NoCompleteChildSource;

impl CompleteChildSource for NoCompleteChildSource {
    fn complete_child(&self, _key: &ChildKey) -> Option<Node> {
        None
    }

    fn child_after_child(
        &self,
        _index: &Index,
        _child: &NamedNode,
        _reverse: bool,
    ) -> Option<NamedNode> {
        None
    }
}

/// A source backed by the pending-write overlay and the view's caches,
/// optionally pinned to a known-complete server snapshot.
pub struct WriteTreeCompleteChildSource<'a> {
    writes: &'a WriteTreeRef<'a>,
    view_cache: &'a ViewCache,
    complete_server_cache: Option<&'a Node>,
}

impl<'a> WriteTreeCompleteChildSource<'a> {
    pub fn new(
        writes: &'a WriteTreeRef<'a>,
        view_cache: &'a ViewCache,
        complete_server_cache: Option<&'a Node>,
    ) -> Self {
        Self {
            writes,
            view_cache,
            complete_server_cache,
        }
    }
}

impl CompleteChildSource for WriteTreeCompleteChildSource<'_> {
    fn complete_child(&self, key: &ChildKey) -> Option<Node> {
        let event_cache = self.view_cache.event_cache();
        if event_cache.is_complete_for_child(key) {
            return Some(event_cache.node().immediate_child(key));
        }
        match self.complete_server_cache {
            Some(server) => {
                let server_node = CacheNode::new(server.clone(), true, false);
                self.writes.calc_complete_child(key, &server_node)
            }
            None => self
                .writes
                .calc_complete_child(key, self.view_cache.server_cache()),
        }
    }

    fn child_after_child(
        &self,
        index: &Index,
        child: &NamedNode,
        reverse: bool,
    ) -> Option<NamedNode> {
        let complete_server_data = self
            .complete_server_cache
            .or_else(|| self.view_cache.complete_server_snap());
        self.writes
            .calc_next_node_after_post(complete_server_data, child, reverse, index)
    }
}
