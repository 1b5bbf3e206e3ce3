//! The view reconciliation state machine.
//!
//! # Overview
//!
//! A [`ViewProcessor`] owns the filter of one listener and, given the
//! listener's current [`ViewCache`] and one inbound [`Operation`], produces
//! the next cache plus the child/value changes to dispatch. It never talks
//! to the network and never mutates shared state: the pending-write overlay
//! is consulted through a read-only [`WriteTreeRef`].
//!
//! Server data only reaches the event cache after composing with every
//! visible pending write; user data reaches the event cache immediately and
//! the server cache never.

use tracing::debug;

use canopy_core::{ImmutableTree, Index, Node, Path};

use crate::change::{Change, ChildChangeAccumulator};
use crate::error::{invariant, Result};
use crate::filter::{
    CompleteChildSource, NoCompleteChildSource, NodeFilter, WriteTreeCompleteChildSource,
};
use crate::operation::Operation;
use crate::view_cache::ViewCache;
use crate::write_tree::WriteTreeRef;

/// Applies operations to one listener's caches.
pub struct ViewProcessor {
    filter: NodeFilter,
}

impl ViewProcessor {
    pub fn new(filter: NodeFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &NodeFilter {
        &self.filter
    }

    /// Apply one operation, returning the new cache and the changes to
    /// dispatch. `complete_cache` is the complete server value at this
    /// location if the caller knows one from outside the view.
    pub fn apply_operation(
        &self,
        old_view_cache: &ViewCache,
        operation: &Operation,
        writes_cache: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
    ) -> Result<(ViewCache, Vec<Change>)> {
        let mut accumulator = ChildChangeAccumulator::new();
        let new_view_cache = match operation {
            Operation::Overwrite {
                source,
                path,
                snapshot,
            } => {
                if source.is_from_user() {
                    self.apply_user_overwrite(
                        old_view_cache,
                        path,
                        snapshot,
                        writes_cache,
                        complete_cache,
                        &mut accumulator,
                    )?
                } else {
                    // Tagged data is already query-scoped; otherwise filter
                    // only if the cache was filtered and the change is not a
                    // full replacement.
                    let filter_server_node = source.is_tagged()
                        || (old_view_cache.server_cache().is_filtered() && !path.is_empty());
                    self.apply_server_overwrite(
                        old_view_cache,
                        path,
                        snapshot,
                        writes_cache,
                        complete_cache,
                        filter_server_node,
                        &mut accumulator,
                    )?
                }
            }
            Operation::Merge {
                source,
                path,
                children,
            } => {
                if source.is_from_user() {
                    self.apply_user_merge(
                        old_view_cache,
                        path,
                        children,
                        writes_cache,
                        complete_cache,
                        &mut accumulator,
                    )?
                } else {
                    let filter_server_node =
                        source.is_tagged() || old_view_cache.server_cache().is_filtered();
                    self.apply_server_merge(
                        old_view_cache,
                        path,
                        children,
                        writes_cache,
                        complete_cache,
                        filter_server_node,
                        &mut accumulator,
                    )?
                }
            }
            Operation::AckUserWrite {
                path,
                affected_tree,
                revert,
            } => {
                if *revert {
                    self.revert_user_write(
                        old_view_cache,
                        path,
                        writes_cache,
                        complete_cache,
                        &mut accumulator,
                    )?
                } else {
                    self.ack_user_write(
                        old_view_cache,
                        path,
                        affected_tree,
                        writes_cache,
                        complete_cache,
                        &mut accumulator,
                    )?
                }
            }
            Operation::ListenComplete { path } => {
                self.listen_complete(old_view_cache, path, writes_cache, &mut accumulator)?
            }
        };
        let mut changes = accumulator.into_changes();
        self.maybe_add_value_event(old_view_cache, &new_view_cache, &mut changes);
        Ok((new_view_cache, changes))
    }

    /// Append the trailing value event if the event cache is complete and
    /// something observable changed.
    fn maybe_add_value_event(
        &self,
        old_view_cache: &ViewCache,
        new_view_cache: &ViewCache,
        changes: &mut Vec<Change>,
    ) {
        let event_snap = new_view_cache.event_cache();
        if !event_snap.is_fully_initialized() {
            return;
        }
        let node = event_snap.node();
        let is_leaf_or_empty = node.is_leaf() || node.is_empty();
        let old_complete = old_view_cache.complete_event_snap();
        let changed = !changes.is_empty()
            || !old_view_cache.event_cache().is_fully_initialized()
            || (is_leaf_or_empty && old_complete != Some(node))
            || old_complete.map_or(true, |old| old.priority() != node.priority());
        if changed {
            changes.push(Change::value(node.clone()));
        }
    }

    /// Recompute the event cache after the server cache changed beneath
    /// `change_path`.
    fn generate_event_cache_after_server_event(
        &self,
        view_cache: &ViewCache,
        change_path: &Path,
        writes_cache: &WriteTreeRef<'_>,
        source: &dyn CompleteChildSource,
        accumulator: &mut ChildChangeAccumulator,
    ) -> Result<ViewCache> {
        let old_event_snap = view_cache.event_cache();
        if writes_cache.shadowing_write(change_path).is_some() {
            // A pending write fully determines this path; the event cache
            // cannot change until it resolves.
            return Ok(view_cache.clone());
        }
        let new_event_cache;
        if let Some(child_key) = change_path.front().cloned() {
            if child_key.is_priority() {
                invariant!(
                    change_path.len() == 1,
                    "a priority change cannot have further path segments"
                );
                let old_event_node = old_event_snap.node();
                let server_node = view_cache.server_cache().node();
                let updated_priority = writes_cache.calc_event_cache_after_server_overwrite(
                    change_path,
                    Some(old_event_node),
                    Some(server_node),
                )?;
                new_event_cache = match updated_priority {
                    Some(priority) => self.filter.update_priority(old_event_node, &priority),
                    None => old_event_node.clone(),
                };
            } else {
                let child_change_path = change_path.pop_front();
                let new_event_child;
                if old_event_snap.is_complete_for_child(&child_key) {
                    let server_node = view_cache.server_cache().node();
                    let event_child_update = writes_cache
                        .calc_event_cache_after_server_overwrite(
                            change_path,
                            Some(old_event_snap.node()),
                            Some(server_node),
                        )?;
                    new_event_child = match event_child_update {
                        Some(update) => Some(
                            old_event_snap
                                .node()
                                .immediate_child(&child_key)
                                .update_child(&child_change_path, update),
                        ),
                        None => Some(old_event_snap.node().immediate_child(&child_key)),
                    };
                } else {
                    new_event_child = writes_cache
                        .calc_complete_child(&child_key, view_cache.server_cache());
                }
                new_event_cache = match new_event_child {
                    Some(new_child) => self.filter.update_child(
                        old_event_snap.node(),
                        &child_key,
                        &new_child,
                        &child_change_path,
                        source,
                        Some(accumulator),
                    )?,
                    None => old_event_snap.node().clone(),
                };
            }
        } else {
            invariant!(
                view_cache.server_cache().is_fully_initialized(),
                "root server changes require complete server data"
            );
            if view_cache.server_cache().is_filtered() {
                // The server cache is filtered, so it only tells us about
                // individual children; rebuild the event children from it
                // plus the writes.
                let server_node = view_cache.server_cache().node().clone();
                let complete_children = if server_node.is_leaf() {
                    Node::Empty
                } else {
                    server_node
                };
                let complete_event_children =
                    writes_cache.calc_complete_event_children(&complete_children);
                new_event_cache = self.filter.update_full_node(
                    old_event_snap.node(),
                    &complete_event_children,
                    Some(accumulator),
                )?;
            } else {
                let complete_node = writes_cache
                    .calc_complete_event_cache(view_cache.complete_server_snap())
                    .unwrap_or(Node::Empty);
                new_event_cache = self.filter.update_full_node(
                    old_event_snap.node(),
                    &complete_node,
                    Some(accumulator),
                )?;
            }
        }
        Ok(view_cache.update_event_snap(
            new_event_cache,
            old_event_snap.is_fully_initialized() || change_path.is_empty(),
            self.filter.filters_nodes(),
        ))
    }

    fn apply_server_overwrite(
        &self,
        old_view_cache: &ViewCache,
        change_path: &Path,
        changed_snap: &Node,
        writes_cache: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        filter_server_node: bool,
        accumulator: &mut ChildChangeAccumulator,
    ) -> Result<ViewCache> {
        let old_server_snap = old_view_cache.server_cache();
        let server_filter = if filter_server_node {
            self.filter.clone()
        } else {
            self.filter.indexed_filter()
        };
        let new_server_cache = match change_path.front().cloned() {
            None => server_filter.update_full_node(old_server_snap.node(), changed_snap, None)?,
            Some(_) if server_filter.filters_nodes() && !old_server_snap.is_filtered() => {
                // The cache is unfiltered but must become filtered; simulate
                // a full update so the filter sees everything.
                let new_server_node = old_server_snap
                    .node()
                    .update_child(change_path, changed_snap.clone());
                server_filter.update_full_node(old_server_snap.node(), &new_server_node, None)?
            }
            Some(child_key) => {
                if !old_server_snap.is_complete_for_path(change_path) && change_path.len() > 1 {
                    // A deep update intended for another listener; we cannot
                    // apply it to an incomplete node.
                    debug!(path = %change_path, "dropping deep server overwrite for incomplete cache");
                    return Ok(old_view_cache.clone());
                }
                let child_change_path = change_path.pop_front();
                let child_node = old_server_snap.node().immediate_child(&child_key);
                let new_child_node =
                    child_node.update_child(&child_change_path, changed_snap.clone());
                if child_key.is_priority() {
                    server_filter.update_priority(old_server_snap.node(), &new_child_node)
                } else {
                    server_filter.update_child(
                        old_server_snap.node(),
                        &child_key,
                        &new_child_node,
                        &child_change_path,
                        &NoCompleteChildSource,
                        None,
                    )?
                }
            }
        };
        let new_view_cache = old_view_cache.update_server_snap(
            new_server_cache,
            old_server_snap.is_fully_initialized() || change_path.is_empty(),
            server_filter.filters_nodes(),
        );
        let source =
            WriteTreeCompleteChildSource::new(writes_cache, &new_view_cache, complete_cache);
        self.generate_event_cache_after_server_event(
            &new_view_cache,
            change_path,
            writes_cache,
            &source,
            accumulator,
        )
    }

    fn apply_user_overwrite(
        &self,
        old_view_cache: &ViewCache,
        change_path: &Path,
        changed_snap: &Node,
        writes_cache: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> Result<ViewCache> {
        let old_event_snap = old_view_cache.event_cache();
        let source =
            WriteTreeCompleteChildSource::new(writes_cache, old_view_cache, complete_cache);
        if change_path.is_empty() {
            let new_event_cache = self.filter.update_full_node(
                old_event_snap.node(),
                changed_snap,
                Some(accumulator),
            )?;
            return Ok(old_view_cache.update_event_snap(
                new_event_cache,
                true,
                self.filter.filters_nodes(),
            ));
        }
        let child_key = match change_path.front().cloned() {
            Some(child_key) => child_key,
            None => {
                return Err(crate::error::ViewError::invariant(
                    "non-root overwrite without a front segment",
                ))
            }
        };
        if child_key.is_priority() {
            let new_event_cache = self.filter.update_priority(old_event_snap.node(), changed_snap);
            return Ok(old_view_cache.update_event_snap(
                new_event_cache,
                old_event_snap.is_fully_initialized(),
                old_event_snap.is_filtered(),
            ));
        }
        let child_change_path = change_path.pop_front();
        let old_child = old_event_snap.node().immediate_child(&child_key);
        let new_child;
        if child_change_path.is_empty() {
            new_child = changed_snap.clone();
        } else {
            match source.complete_child(&child_key) {
                Some(child_node) => {
                    let ends_in_priority = child_change_path
                        .back()
                        .map_or(false, |back| back.is_priority());
                    if ends_in_priority
                        && child_node
                            .child(&child_change_path.parent().unwrap_or_else(Path::root))
                            .is_empty()
                    {
                        // A priority write beneath a node we do not have. If
                        // the node exists server-side the priority arrives
                        // with the next server update.
                        new_child = child_node;
                    } else {
                        new_child =
                            child_node.update_child(&child_change_path, changed_snap.clone());
                    }
                }
                None => new_child = Node::Empty,
            }
        }
        if old_child == new_child {
            Ok(old_view_cache.clone())
        } else {
            let new_event_snap = self.filter.update_child(
                old_event_snap.node(),
                &child_key,
                &new_child,
                &child_change_path,
                &source,
                Some(accumulator),
            )?;
            Ok(old_view_cache.update_event_snap(
                new_event_snap,
                old_event_snap.is_fully_initialized(),
                self.filter.filters_nodes(),
            ))
        }
    }

    fn apply_user_merge(
        &self,
        old_view_cache: &ViewCache,
        path: &Path,
        changed_children: &ImmutableTree<Node>,
        writes_cache: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> Result<ViewCache> {
        // Children already in the view update first, so limit windows see
        // membership changes in a stable order.
        let mut cur_view_cache = old_view_cache.clone();
        let mut result = Ok(());
        changed_children.for_each(|relative_path, child_node| {
            if result.is_err() {
                return;
            }
            let write_path = path.child_path(relative_path);
            if self.cache_has_child(old_view_cache, &write_path) {
                result = self
                    .apply_user_overwrite(
                        &cur_view_cache,
                        &write_path,
                        child_node,
                        writes_cache,
                        complete_cache,
                        accumulator,
                    )
                    .map(|next| cur_view_cache = next);
            }
        });
        result?;
        let mut result = Ok(());
        changed_children.for_each(|relative_path, child_node| {
            if result.is_err() {
                return;
            }
            let write_path = path.child_path(relative_path);
            if !self.cache_has_child(old_view_cache, &write_path) {
                result = self
                    .apply_user_overwrite(
                        &cur_view_cache,
                        &write_path,
                        child_node,
                        writes_cache,
                        complete_cache,
                        accumulator,
                    )
                    .map(|next| cur_view_cache = next);
            }
        });
        result?;
        Ok(cur_view_cache)
    }

    fn cache_has_child(&self, view_cache: &ViewCache, write_path: &Path) -> bool {
        match write_path.front() {
            Some(front) => view_cache.event_cache().is_complete_for_child(front),
            None => false,
        }
    }

    fn apply_merge_to(&self, node: Node, merge: &ImmutableTree<Node>) -> Node {
        merge.fold(node, |acc, relative_path, child_node| {
            acc.update_child(relative_path, child_node.clone())
        })
    }

    fn apply_server_merge(
        &self,
        old_view_cache: &ViewCache,
        path: &Path,
        changed_children: &ImmutableTree<Node>,
        writes_cache: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        filter_server_node: bool,
        accumulator: &mut ChildChangeAccumulator,
    ) -> Result<ViewCache> {
        if old_view_cache.server_cache().node().is_empty()
            && !old_view_cache.server_cache().is_fully_initialized()
        {
            // No cache yet; this merge was meant for an earlier listen at
            // the same location. The complete data is on its way.
            debug!(path = %path, "dropping server merge for uninitialized cache");
            return Ok(old_view_cache.clone());
        }
        let view_merge_tree = if path.is_empty() {
            changed_children.clone()
        } else {
            ImmutableTree::empty().set_tree(path, changed_children.clone())
        };
        let server_node = old_view_cache.server_cache().node().clone();
        let mut cur_view_cache = old_view_cache.clone();
        for (child_key, child_tree) in view_merge_tree.children() {
            if server_node.has_child(child_key) {
                let server_child = old_view_cache
                    .server_cache()
                    .node()
                    .immediate_child(child_key);
                let new_child = self.apply_merge_to(server_child, child_tree);
                cur_view_cache = self.apply_server_overwrite(
                    &cur_view_cache,
                    &Path::root().child(child_key.clone()),
                    &new_child,
                    writes_cache,
                    complete_cache,
                    filter_server_node,
                    accumulator,
                )?;
            }
        }
        for (child_key, child_tree) in view_merge_tree.children() {
            // A deep merge into a child we know nothing about cannot be
            // applied; anything else starts from the empty child.
            let is_unknown_deep_merge = !old_view_cache
                .server_cache()
                .is_complete_for_child(child_key)
                && child_tree.value().is_none();
            if !server_node.has_child(child_key) && !is_unknown_deep_merge {
                let server_child = old_view_cache
                    .server_cache()
                    .node()
                    .immediate_child(child_key);
                let new_child = self.apply_merge_to(server_child, child_tree);
                cur_view_cache = self.apply_server_overwrite(
                    &cur_view_cache,
                    &Path::root().child(child_key.clone()),
                    &new_child,
                    writes_cache,
                    complete_cache,
                    filter_server_node,
                    accumulator,
                )?;
            }
        }
        Ok(cur_view_cache)
    }

    fn ack_user_write(
        &self,
        old_view_cache: &ViewCache,
        ack_path: &Path,
        affected_tree: &ImmutableTree<bool>,
        writes_cache: &WriteTreeRef<'_>,
        complete_cache: Option<&Node>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> Result<ViewCache> {
        if writes_cache.shadowing_write(ack_path).is_some() {
            return Ok(old_view_cache.clone());
        }
        let filter_server_node = old_view_cache.server_cache().is_filtered();
        let server_cache = old_view_cache.server_cache();
        if affected_tree.value().is_some() {
            // The ack covers the whole subtree at ack_path.
            if (ack_path.is_empty() && server_cache.is_fully_initialized())
                || server_cache.is_complete_for_path(ack_path)
            {
                let snapshot = server_cache.node().child(ack_path);
                return self.apply_server_overwrite(
                    old_view_cache,
                    ack_path,
                    &snapshot,
                    writes_cache,
                    complete_cache,
                    filter_server_node,
                    accumulator,
                );
            }
            if ack_path.is_empty() {
                // Acking the root without complete server data: re-apply
                // whatever children we do have as a merge.
                let mut changed_children: ImmutableTree<Node> = ImmutableTree::empty();
                server_cache
                    .node()
                    .for_each_child(&Index::Key, |key, child| {
                        changed_children = changed_children
                            .set(&Path::root().child(key.clone()), child.clone());
                    });
                return self.apply_server_merge(
                    old_view_cache,
                    ack_path,
                    &changed_children,
                    writes_cache,
                    complete_cache,
                    filter_server_node,
                    accumulator,
                );
            }
            return Ok(old_view_cache.clone());
        }
        // A merge ack: re-apply each acknowledged child we have complete
        // server data for.
        let mut changed_children: ImmutableTree<Node> = ImmutableTree::empty();
        affected_tree.for_each(|merge_path, _| {
            let server_cache_path = ack_path.child_path(merge_path);
            if server_cache.is_complete_for_path(&server_cache_path) {
                changed_children =
                    changed_children.set(merge_path, server_cache.node().child(&server_cache_path));
            }
        });
        self.apply_server_merge(
            old_view_cache,
            ack_path,
            &changed_children,
            writes_cache,
            complete_cache,
            filter_server_node,
            accumulator,
        )
    }

    fn listen_complete(
        &self,
        old_view_cache: &ViewCache,
        path: &Path,
        writes_cache: &WriteTreeRef<'_>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> Result<ViewCache> {
        let old_server_node = old_view_cache.server_cache();
        let new_view_cache = old_view_cache.update_server_snap(
            old_server_node.node().clone(),
            old_server_node.is_fully_initialized() || path.is_empty(),
            old_server_node.is_filtered(),
        );
        self.generate_event_cache_after_server_event(
            &new_view_cache,
            path,
            writes_cache,
            &NoCompleteChildSource,
            accumulator,
        )
    }

    fn revert_user_write(
        &self,
        old_view_cache: &ViewCache,
        path: &Path,
        writes_cache: &WriteTreeRef<'_>,
        complete_server_cache: Option<&Node>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> Result<ViewCache> {
        if writes_cache.shadowing_write(path).is_some() {
            return Ok(old_view_cache.clone());
        }
        let source =
            WriteTreeCompleteChildSource::new(writes_cache, old_view_cache, complete_server_cache);
        let old_event_cache = old_view_cache.event_cache().node().clone();
        let mut new_event_cache;
        let non_priority_child = match path.front() {
            Some(front) if !front.is_priority() => Some(front.clone()),
            _ => None,
        };
        if let Some(child_key) = non_priority_child {
            let mut new_child =
                writes_cache.calc_complete_child(&child_key, old_view_cache.server_cache());
            if new_child.is_none()
                && old_view_cache
                    .server_cache()
                    .is_complete_for_child(&child_key)
            {
                new_child = Some(old_event_cache.immediate_child(&child_key));
            }
            if let Some(new_child) = new_child {
                new_event_cache = self.filter.update_child(
                    &old_event_cache,
                    &child_key,
                    &new_child,
                    &path.pop_front(),
                    &source,
                    Some(accumulator),
                )?;
            } else if old_event_cache.has_child(&child_key) {
                // No complete replacement exists; drop the stale child.
                new_event_cache = self.filter.update_child(
                    &old_event_cache,
                    &child_key,
                    &Node::Empty,
                    &path.pop_front(),
                    &source,
                    Some(accumulator),
                )?;
            } else {
                new_event_cache = old_event_cache;
            }
            if new_event_cache.is_empty()
                && old_view_cache.server_cache().is_fully_initialized()
            {
                // Reverting may have dropped every child write; the
                // complete value might be a leaf again.
                let complete = writes_cache
                    .calc_complete_event_cache(old_view_cache.complete_server_snap())
                    .unwrap_or(Node::Empty);
                if complete.is_leaf() {
                    new_event_cache = self.filter.update_full_node(
                        &new_event_cache,
                        &complete,
                        Some(accumulator),
                    )?;
                }
            }
        } else {
            // Reverting at the root or a priority write: rebuild the whole
            // event cache from the server data plus remaining writes.
            let new_node = if old_view_cache.server_cache().is_fully_initialized() {
                writes_cache
                    .calc_complete_event_cache(old_view_cache.complete_server_snap())
                    .unwrap_or(Node::Empty)
            } else {
                let server_children = old_view_cache.server_cache().node();
                invariant!(
                    !server_children.is_leaf(),
                    "a leaf server cache is always complete"
                );
                writes_cache.calc_complete_event_children(server_children)
            };
            new_event_cache =
                self.filter
                    .update_full_node(&old_event_cache, &new_node, Some(accumulator))?;
        }
        let complete = old_view_cache.server_cache().is_fully_initialized()
            || writes_cache.shadowing_write(&Path::root()).is_some();
        Ok(old_view_cache.update_event_snap(
            new_event_cache,
            complete,
            self.filter.filters_nodes(),
        ))
    }
}
