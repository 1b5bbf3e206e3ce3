//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use canopy_core::{ImmutableTree, Node, Path};
use canopy_sync::{
    Change, Operation, QuerySpec, Result, Source, ViewCache, ViewError, ViewProcessor, WriteId,
    WriteKind, WriteTree,
};

/// A root-scoped listener with its own pending-write log.
///
/// Drives a [`ViewProcessor`] the way a session would: user writes are
/// logged before their operation applies, acks remove the log entry before
/// the ack operation applies, and every call returns the changes the
/// dispatcher would deliver.
pub struct ViewHarness {
    writes: WriteTree,
    cache: ViewCache,
    processor: ViewProcessor,
    next_write_id: WriteId,
}

impl ViewHarness {
    /// A listener with the default (unfiltered) query.
    pub fn new() -> Self {
        Self::with_query(QuerySpec::unbounded())
    }

    /// A listener narrowed by `query`.
    pub fn with_query(query: QuerySpec) -> Self {
        Self {
            writes: WriteTree::new(),
            cache: ViewCache::empty(),
            processor: ViewProcessor::new(query.node_filter()),
            next_write_id: 1,
        }
    }

    /// The snapshot the application currently sees.
    pub fn event_snap(&self) -> &Node {
        self.cache.event_cache().node()
    }

    /// Whether the application snapshot is complete.
    pub fn event_is_complete(&self) -> bool {
        self.cache.event_cache().is_fully_initialized()
    }

    /// The last confirmed server snapshot.
    pub fn server_snap(&self) -> &Node {
        self.cache.server_cache().node()
    }

    pub fn view_cache(&self) -> &ViewCache {
        &self.cache
    }

    pub fn write_tree(&self) -> &WriteTree {
        &self.writes
    }

    fn apply(&mut self, operation: Operation) -> Result<Vec<Change>> {
        let scoped = self.writes.child_writes(Path::root());
        let (cache, changes) =
            self.processor
                .apply_operation(&self.cache, &operation, &scoped, None)?;
        self.cache = cache;
        Ok(changes)
    }

    /// Apply a server push replacing `path`.
    pub fn server_overwrite(
        &mut self,
        path: impl Into<Path>,
        value: serde_json::Value,
    ) -> Result<Vec<Change>> {
        self.apply(Operation::Overwrite {
            source: Source::server(),
            path: path.into(),
            snapshot: Node::from_json(&value),
        })
    }

    /// Apply a query-scoped server push replacing `path`.
    pub fn tagged_server_overwrite(
        &mut self,
        path: impl Into<Path>,
        value: serde_json::Value,
    ) -> Result<Vec<Change>> {
        self.apply(Operation::Overwrite {
            source: Source::tagged_server(),
            path: path.into(),
            snapshot: Node::from_json(&value),
        })
    }

    /// Apply a server patch of several relative paths below `path`.
    pub fn server_merge(
        &mut self,
        path: impl Into<Path>,
        children: &[(&str, serde_json::Value)],
    ) -> Result<Vec<Change>> {
        self.apply(Operation::Merge {
            source: Source::server(),
            path: path.into(),
            children: merge_tree(children),
        })
    }

    /// Apply the server's listen-complete marker at `path`.
    pub fn listen_complete(&mut self, path: impl Into<Path>) -> Result<Vec<Change>> {
        self.apply(Operation::ListenComplete { path: path.into() })
    }

    /// Issue a local overwrite, logging it as pending. Returns the write id
    /// and the changes delivered immediately.
    pub fn user_set(
        &mut self,
        path: impl Into<Path>,
        value: serde_json::Value,
    ) -> Result<(WriteId, Vec<Change>)> {
        let path = path.into();
        let snapshot = Node::from_json(&value);
        let write_id = self.next_write_id;
        self.next_write_id += 1;
        self.writes
            .add_overwrite(path.clone(), snapshot.clone(), write_id, true)?;
        let changes = self.apply(Operation::Overwrite {
            source: Source::User,
            path,
            snapshot,
        })?;
        Ok((write_id, changes))
    }

    /// Issue a local merge, logging it as pending.
    pub fn user_update(
        &mut self,
        path: impl Into<Path>,
        children: &[(&str, serde_json::Value)],
    ) -> Result<(WriteId, Vec<Change>)> {
        let path = path.into();
        let children = merge_tree(children);
        let write_id = self.next_write_id;
        self.next_write_id += 1;
        self.writes
            .add_merge(path.clone(), children.clone(), write_id)?;
        let changes = self.apply(Operation::Merge {
            source: Source::User,
            path,
            children,
        })?;
        Ok((write_id, changes))
    }

    /// The server confirmed `write_id`.
    pub fn ack(&mut self, write_id: WriteId) -> Result<Vec<Change>> {
        self.resolve_write(write_id, false)
    }

    /// The server rejected `write_id`; undo its local effect.
    pub fn revert(&mut self, write_id: WriteId) -> Result<Vec<Change>> {
        self.resolve_write(write_id, true)
    }

    fn resolve_write(&mut self, write_id: WriteId, revert: bool) -> Result<Vec<Change>> {
        let record = self
            .writes
            .get_write(write_id)
            .ok_or_else(|| ViewError::invariant(format!("unknown write id {write_id}")))?;
        let path = record.path.clone();
        let affected_tree = match &record.kind {
            WriteKind::Overwrite(_) => ImmutableTree::new(true),
            WriteKind::Merge(children) => children.fold(
                ImmutableTree::empty(),
                |acc: ImmutableTree<bool>, relative_path, _| acc.set(relative_path, true),
            ),
        };
        self.writes.remove_write(write_id)?;
        self.apply(Operation::AckUserWrite {
            path,
            affected_tree,
            revert,
        })
    }
}

impl Default for ViewHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the merge payload for an update of `(relative path, value)` pairs.
pub fn merge_tree(children: &[(&str, serde_json::Value)]) -> ImmutableTree<Node> {
    let mut tree = ImmutableTree::empty();
    for (path, value) in children {
        tree = tree.set(&Path::parse(path), Node::from_json(value));
    }
    tree
}
