//! Per-listener cache state.

use canopy_core::{ChildKey, Node, Path};

/// A snapshot node together with what we know about it.
///
/// `fully_initialized` means the node is known in its entirety rather than a
/// partial, best-effort view. `filtered` means the node already reflects
/// query-filtering policy and must not be treated as complete raw server
/// data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheNode {
    node: Node,
    fully_initialized: bool,
    filtered: bool,
}

impl CacheNode {
    pub fn new(node: Node, fully_initialized: bool, filtered: bool) -> Self {
        Self {
            node,
            fully_initialized,
            filtered,
        }
    }

    /// An empty, uninitialized, unfiltered cache node.
    pub fn empty() -> Self {
        Self::new(Node::Empty, false, false)
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn is_fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    /// Whether the data at `path` is known completely: either the whole
    /// node is complete and unfiltered, or the first step lands on a child
    /// we hold (a held child is always complete in its entirety).
    pub fn is_complete_for_path(&self, path: &Path) -> bool {
        match path.front() {
            None => self.fully_initialized && !self.filtered,
            Some(front) => self.is_complete_for_child(front),
        }
    }

    /// Whether the named child is known completely.
    pub fn is_complete_for_child(&self, key: &ChildKey) -> bool {
        (self.fully_initialized && !self.filtered) || self.node.has_child(key)
    }
}

/// The per-listener pairing of what the app should see (*event cache*) and
/// what the server has told us (*server cache*). Immutable: every mutator
/// returns a new `ViewCache`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewCache {
    event_cache: CacheNode,
    server_cache: CacheNode,
}

impl ViewCache {
    pub fn new(event_cache: CacheNode, server_cache: CacheNode) -> Self {
        Self {
            event_cache,
            server_cache,
        }
    }

    /// Both caches empty and uninitialized.
    pub fn empty() -> Self {
        Self::new(CacheNode::empty(), CacheNode::empty())
    }

    pub fn event_cache(&self) -> &CacheNode {
        &self.event_cache
    }

    pub fn server_cache(&self) -> &CacheNode {
        &self.server_cache
    }

    /// The event snapshot, if fully known.
    pub fn complete_event_snap(&self) -> Option<&Node> {
        if self.event_cache.is_fully_initialized() {
            Some(self.event_cache.node())
        } else {
            None
        }
    }

    /// The server snapshot, if fully known.
    pub fn complete_server_snap(&self) -> Option<&Node> {
        if self.server_cache.is_fully_initialized() {
            Some(self.server_cache.node())
        } else {
            None
        }
    }

    /// Replace the event cache.
    pub fn update_event_snap(
        &self,
        node: Node,
        fully_initialized: bool,
        filtered: bool,
    ) -> ViewCache {
        ViewCache::new(
            CacheNode::new(node, fully_initialized, filtered),
            self.server_cache.clone(),
        )
    }

    /// Replace the server cache.
    pub fn update_server_snap(
        &self,
        node: Node,
        fully_initialized: bool,
        filtered: bool,
    ) -> ViewCache {
        ViewCache::new(
            self.event_cache.clone(),
            CacheNode::new(node, fully_initialized, filtered),
        )
    }
}
