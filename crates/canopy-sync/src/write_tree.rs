//! The ordered log of pending local writes.
//!
//! A [`WriteTree`] tracks every locally issued, not-yet-acknowledged write
//! and maintains a merged overlay of the visible ones. Views never touch the
//! tree directly: they read through a [`WriteTreeRef`], which scopes every
//! query to the view's listen path.
//!
//! Write ids are assigned by the session collaborator and must be strictly
//! increasing; when writes overlap, the later id wins for the overlapping
//! region.

use canopy_core::{ChildKey, ImmutableTree, Index, NamedNode, Node, Path};

use crate::compound_write::CompoundWrite;
use crate::error::{invariant, Result, ViewError};
use crate::view_cache::CacheNode;

/// Identifier of a pending write, monotonic per session.
pub type WriteId = u64;

/// The payload of a pending write.
#[derive(Clone, Debug)]
pub enum WriteKind {
    /// Full replacement of the subtree at the write path.
    Overwrite(Node),
    /// Patch of the named relative paths only; unnamed siblings keep
    /// earlier writes or server data.
    Merge(ImmutableTree<Node>),
}

/// One pending local write.
#[derive(Clone, Debug)]
pub struct WriteRecord {
    pub write_id: WriteId,
    pub path: Path,
    pub kind: WriteKind,
    /// Invisible writes are kept in the log but excluded from event caches
    /// (e.g. held back until the transport resumes).
    pub visible: bool,
}

impl WriteRecord {
    /// Whether this write completely determines the value at `path`.
    fn contains_path(&self, path: &Path) -> bool {
        match &self.kind {
            WriteKind::Overwrite(_) => self.path.contains(path),
            WriteKind::Merge(children) => match self.path.relative(path) {
                Some(relative) => children.find_root_most_value_and_path(&relative).is_some(),
                None => false,
            },
        }
    }
}

/// The write log shared by every listener, plus the cached overlay of
/// currently visible writes.
#[derive(Debug, Default)]
pub struct WriteTree {
    all_writes: Vec<WriteRecord>,
    visible_writes: CompoundWrite,
    last_write_id: Option<WriteId>,
}

impl WriteTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending overwrite.
    pub fn add_overwrite(
        &mut self,
        path: Path,
        snapshot: Node,
        write_id: WriteId,
        visible: bool,
    ) -> Result<()> {
        self.check_monotonic(write_id)?;
        if visible {
            self.visible_writes = self.visible_writes.add_write(&path, snapshot.clone());
        }
        self.all_writes.push(WriteRecord {
            write_id,
            path,
            kind: WriteKind::Overwrite(snapshot),
            visible,
        });
        self.last_write_id = Some(write_id);
        Ok(())
    }

    /// Record a pending merge. Merges are always visible.
    pub fn add_merge(
        &mut self,
        path: Path,
        children: ImmutableTree<Node>,
        write_id: WriteId,
    ) -> Result<()> {
        self.check_monotonic(write_id)?;
        self.visible_writes = self.visible_writes.add_writes(&path, &children);
        self.all_writes.push(WriteRecord {
            write_id,
            path,
            kind: WriteKind::Merge(children),
            visible: true,
        });
        self.last_write_id = Some(write_id);
        Ok(())
    }

    fn check_monotonic(&self, write_id: WriteId) -> Result<()> {
        invariant!(
            self.last_write_id.map_or(true, |last| write_id > last),
            format!("write id {write_id} is not after the last id")
        );
        Ok(())
    }

    /// Look up a pending write by id.
    pub fn get_write(&self, write_id: WriteId) -> Option<&WriteRecord> {
        self.all_writes
            .iter()
            .find(|record| record.write_id == write_id)
    }

    /// All pending writes, oldest first.
    pub fn writes(&self) -> &[WriteRecord] {
        &self.all_writes
    }

    /// Change a write's visibility, recomputing the overlay if it flips.
    pub fn mark_visible(&mut self, write_id: WriteId, visible: bool) -> Result<()> {
        let record = self
            .all_writes
            .iter_mut()
            .find(|record| record.write_id == write_id)
            .ok_or_else(|| {
                ViewError::invariant(format!("mark_visible called with unknown write id {write_id}"))
            })?;
        if record.visible != visible {
            record.visible = visible;
            self.reset_visible_writes();
        }
        Ok(())
    }

    /// Remove a write on ack or revert.
    ///
    /// Returns whether the removed write may have been visible anywhere, in
    /// which case callers must reprocess the affected views. The overlay is
    /// recomputed from scratch only when the removed write overlapped
    /// earlier visible writes.
    pub fn remove_write(&mut self, write_id: WriteId) -> Result<bool> {
        let idx = self
            .all_writes
            .iter()
            .position(|record| record.write_id == write_id)
            .ok_or_else(|| {
                ViewError::invariant(format!("remove_write called with unknown write id {write_id}"))
            })?;
        let removed = self.all_writes.remove(idx);

        let mut removed_write_was_visible = removed.visible;
        let mut removed_write_overlaps = false;
        let mut i = self.all_writes.len();
        while removed_write_was_visible && i > 0 {
            i -= 1;
            let current = &self.all_writes[i];
            if !current.visible {
                continue;
            }
            if i >= idx && current.contains_path(&removed.path) {
                // A later write shadows the removed one entirely.
                removed_write_was_visible = false;
            } else if removed.path.contains(&current.path) {
                removed_write_overlaps = true;
            }
        }

        if !removed_write_was_visible {
            return Ok(false);
        }
        if removed_write_overlaps {
            self.reset_visible_writes();
        } else {
            match &removed.kind {
                WriteKind::Overwrite(_) => {
                    self.visible_writes = self.visible_writes.remove_write(&removed.path);
                }
                WriteKind::Merge(children) => {
                    let mut visible = self.visible_writes.clone();
                    children.for_each(|relative_path, _| {
                        visible = visible.remove_write(&removed.path.child_path(relative_path));
                    });
                    self.visible_writes = visible;
                }
            }
        }
        Ok(true)
    }

    fn reset_visible_writes(&mut self) {
        self.visible_writes =
            layer_tree(&self.all_writes, &Path::root(), |record| record.visible);
    }

    /// Scope a view of this log to `path`.
    pub fn child_writes(&self, path: Path) -> WriteTreeRef<'_> {
        WriteTreeRef {
            tree_path: path,
            write_tree: self,
        }
    }

    /// The id of a pending write fully determining `path`, if any.
    pub fn shadowing_write(&self, path: &Path) -> Option<WriteId> {
        self.all_writes
            .iter()
            .rev()
            .find(|record| record.visible && record.contains_path(path))
            .map(|record| record.write_id)
    }

    /// The value the application should see at `tree_path`, composing the
    /// server snapshot (if known) with all applicable pending writes.
    /// `None` means the writes alone cannot determine a complete value.
    pub fn calc_complete_event_cache(
        &self,
        tree_path: &Path,
        complete_server_cache: Option<&Node>,
        write_ids_to_exclude: &[WriteId],
        include_hidden_writes: bool,
    ) -> Option<Node> {
        if write_ids_to_exclude.is_empty() && !include_hidden_writes {
            if let Some(shadowing) = self.visible_writes.get_complete_node(tree_path) {
                return Some(shadowing);
            }
            let sub_merge = self.visible_writes.child_compound_write(tree_path);
            if sub_merge.is_empty() {
                return complete_server_cache.cloned();
            }
            if complete_server_cache.is_none() && !sub_merge.has_complete_write(&Path::root()) {
                return None;
            }
            let layered = complete_server_cache.cloned().unwrap_or(Node::Empty);
            Some(sub_merge.apply(&layered))
        } else {
            let merge = self.visible_writes.child_compound_write(tree_path);
            if !include_hidden_writes && merge.is_empty() {
                return complete_server_cache.cloned();
            }
            if !include_hidden_writes
                && complete_server_cache.is_none()
                && !merge.has_complete_write(&Path::root())
            {
                return None;
            }
            let merge_at_path = layer_tree(&self.all_writes, tree_path, |record| {
                (record.visible || include_hidden_writes)
                    && !write_ids_to_exclude.contains(&record.write_id)
                    && (record.path.contains(tree_path) || tree_path.contains(&record.path))
            });
            let layered = complete_server_cache.cloned().unwrap_or(Node::Empty);
            Some(merge_at_path.apply(&layered))
        }
    }

    /// The children the application should see at `tree_path` when the
    /// server node is only known as a (possibly filtered) children node.
    pub fn calc_complete_event_children(
        &self,
        tree_path: &Path,
        complete_server_children: &Node,
    ) -> Node {
        let mut complete_children = Node::Empty;
        if let Some(top_level_set) = self.visible_writes.get_complete_node(tree_path) {
            // A write covers this whole location; its children are the
            // complete children (a leaf has none).
            top_level_set.for_each_child(&Index::Key, |key, child| {
                complete_children = complete_children.update_immediate_child(key, child.clone());
            });
            return complete_children;
        }
        let merge = self.visible_writes.child_compound_write(tree_path);
        complete_server_children.for_each_child(&Index::Key, |key, child| {
            let overlaid = merge
                .child_compound_write(&Path::root().child(key.clone()))
                .apply(child);
            complete_children = complete_children.update_immediate_child(key, overlaid);
        });
        for named in merge.get_complete_children() {
            complete_children = complete_children.update_immediate_child(&named.name, named.node);
        }
        complete_children
    }

    /// Incremental recomputation of one event subtree after a server push
    /// at `tree_path`/`change_path`. `None` means a shadowing write makes
    /// the change irrelevant.
    pub fn calc_event_cache_after_server_overwrite(
        &self,
        tree_path: &Path,
        change_path: &Path,
        existing_event: Option<&Node>,
        existing_server: Option<&Node>,
    ) -> Result<Option<Node>> {
        invariant!(
            existing_event.is_some() || existing_server.is_some(),
            "either the event snapshot or the server snapshot must exist"
        );
        let path = tree_path.child_path(change_path);
        if self.visible_writes.has_complete_write(&path) {
            return Ok(None);
        }
        let child_merge = self.visible_writes.child_compound_write(&path);
        let Some(server) = existing_server else {
            return Err(ViewError::invariant(
                "server snapshot required when no shadowing write exists",
            ));
        };
        let server_at_path = server.child(change_path);
        if child_merge.is_empty() {
            Ok(Some(server_at_path))
        } else {
            Ok(Some(child_merge.apply(&server_at_path)))
        }
    }

    /// A best-effort complete value for one child, combining writes with
    /// whatever server data is available.
    pub fn calc_complete_child(
        &self,
        tree_path: &Path,
        child_key: &ChildKey,
        existing_server_cache: &CacheNode,
    ) -> Option<Node> {
        let path = tree_path.child(child_key.clone());
        if let Some(shadowing) = self.visible_writes.get_complete_node(&path) {
            return Some(shadowing);
        }
        if existing_server_cache.is_complete_for_child(child_key) {
            let child_merge = self.visible_writes.child_compound_write(&path);
            Some(child_merge.apply(&existing_server_cache.node().immediate_child(child_key)))
        } else {
            None
        }
    }

    /// The next child past `post` in `index` order (or before it, when
    /// `reverse`), as seen through the writes overlaid on
    /// `complete_server_data`. Used when a limit window's boundary moves.
    pub fn calc_next_node_after_post(
        &self,
        tree_path: &Path,
        complete_server_data: Option<&Node>,
        post: &NamedNode,
        reverse: bool,
        index: &Index,
    ) -> Option<NamedNode> {
        let merge = self.visible_writes.child_compound_write(tree_path);
        let to_iterate = match merge.get_complete_node(&Path::root()) {
            Some(shadowing) => shadowing,
            None => match complete_server_data {
                Some(server) => merge.apply(server),
                None => return None,
            },
        };
        let ordered = to_iterate.children_in_index_order(index);
        if reverse {
            ordered
                .into_iter()
                .rev()
                .find(|named| index.cmp(named, post) == std::cmp::Ordering::Less)
        } else {
            ordered
                .into_iter()
                .find(|named| index.cmp(named, post) == std::cmp::Ordering::Greater)
        }
    }
}

/// Build the overlay of every record passing `filter`, scoped to
/// `tree_path`.
fn layer_tree(
    writes: &[WriteRecord],
    tree_path: &Path,
    filter: impl Fn(&WriteRecord) -> bool,
) -> CompoundWrite {
    let mut compound = CompoundWrite::empty();
    for record in writes {
        if !filter(record) {
            continue;
        }
        match &record.kind {
            WriteKind::Overwrite(snapshot) => {
                if let Some(relative) = tree_path.relative(&record.path) {
                    compound = compound.add_write(&relative, snapshot.clone());
                } else if let Some(relative) = record.path.relative(tree_path) {
                    compound = compound.add_write(&Path::root(), snapshot.child(&relative));
                }
            }
            WriteKind::Merge(children) => {
                if let Some(relative) = tree_path.relative(&record.path) {
                    compound = compound.add_writes(&relative, children);
                } else if let Some(relative) = record.path.relative(tree_path) {
                    if relative.is_empty() {
                        compound = compound.add_writes(&Path::root(), children);
                    } else if let Some((found_path, value)) =
                        children.find_root_most_value_and_path(&relative)
                    {
                        if let Some(deeper) = found_path.relative(&relative) {
                            compound =
                                compound.add_write(&Path::root(), value.child(&deeper));
                        }
                    } else {
                        // Writes strictly below the scope path.
                        compound =
                            compound.add_writes(&Path::root(), &children.subtree(&relative));
                    }
                }
            }
        }
    }
    compound
}

/// A view of the write log scoped to one listen path.
///
/// All answers are relative to the scope path; the underlying log is shared
/// across every listener.
#[derive(Clone, Debug)]
pub struct WriteTreeRef<'a> {
    tree_path: Path,
    write_tree: &'a WriteTree,
}

impl<'a> WriteTreeRef<'a> {
    pub fn new(tree_path: Path, write_tree: &'a WriteTree) -> Self {
        Self {
            tree_path,
            write_tree,
        }
    }

    /// See [`WriteTree::shadowing_write`]; `path` is relative to the scope.
    pub fn shadowing_write(&self, path: &Path) -> Option<WriteId> {
        self.write_tree
            .shadowing_write(&self.tree_path.child_path(path))
    }

    /// See [`WriteTree::calc_complete_event_cache`].
    pub fn calc_complete_event_cache(&self, complete_server_cache: Option<&Node>) -> Option<Node> {
        self.write_tree
            .calc_complete_event_cache(&self.tree_path, complete_server_cache, &[], false)
    }

    /// See [`WriteTree::calc_complete_event_cache`], excluding specific
    /// writes and optionally including hidden ones.
    pub fn calc_complete_event_cache_excluding(
        &self,
        complete_server_cache: Option<&Node>,
        write_ids_to_exclude: &[WriteId],
        include_hidden_writes: bool,
    ) -> Option<Node> {
        self.write_tree.calc_complete_event_cache(
            &self.tree_path,
            complete_server_cache,
            write_ids_to_exclude,
            include_hidden_writes,
        )
    }

    /// See [`WriteTree::calc_complete_event_children`].
    pub fn calc_complete_event_children(&self, complete_server_children: &Node) -> Node {
        self.write_tree
            .calc_complete_event_children(&self.tree_path, complete_server_children)
    }

    /// See [`WriteTree::calc_event_cache_after_server_overwrite`].
    pub fn calc_event_cache_after_server_overwrite(
        &self,
        change_path: &Path,
        existing_event: Option<&Node>,
        existing_server: Option<&Node>,
    ) -> Result<Option<Node>> {
        self.write_tree.calc_event_cache_after_server_overwrite(
            &self.tree_path,
            change_path,
            existing_event,
            existing_server,
        )
    }

    /// See [`WriteTree::calc_complete_child`].
    pub fn calc_complete_child(
        &self,
        child_key: &ChildKey,
        existing_server_cache: &CacheNode,
    ) -> Option<Node> {
        self.write_tree
            .calc_complete_child(&self.tree_path, child_key, existing_server_cache)
    }

    /// See [`WriteTree::calc_next_node_after_post`].
    pub fn calc_next_node_after_post(
        &self,
        complete_server_data: Option<&Node>,
        post: &NamedNode,
        reverse: bool,
        index: &Index,
    ) -> Option<NamedNode> {
        self.write_tree.calc_next_node_after_post(
            &self.tree_path,
            complete_server_data,
            post,
            reverse,
            index,
        )
    }
}
