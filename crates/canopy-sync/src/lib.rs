//! # Canopy Sync
//!
//! Client-side view reconciliation for the Canopy hierarchical store.
//!
//! ## Overview
//!
//! Each listener watches a path, optionally narrowed by a query, and holds a
//! [`ViewCache`]: the snapshot the application currently sees (*event
//! cache*) paired with the last confirmed server state (*server cache*). A
//! [`ViewProcessor`] folds inbound [`Operation`]s into that cache and emits
//! the ordered [`Change`]s a dispatcher hands to the application.
//!
//! Local writes land in a shared [`WriteTree`] until the server
//! acknowledges them; every event cache is the server data with the visible
//! pending writes overlaid, so the application always sees its own writes
//! immediately.
//!
//! ## Key Properties
//!
//! - **Deterministic**: one operation in, one cache plus change list out.
//! - **Write-wins locally**: pending writes shadow server data until acked
//!   or reverted.
//! - **Query-aware**: range and limit filters maintain their windows
//!   incrementally.
//! - **Pure**: no I/O; transports and persistence live elsewhere.
//!
//! ## Usage
//!
//! ```rust
//! use canopy_core::{Node, Path};
//! use canopy_sync::{Operation, QuerySpec, Source, ViewCache, ViewProcessor, WriteTree};
//!
//! let writes = WriteTree::new();
//! let processor = ViewProcessor::new(QuerySpec::unbounded().node_filter());
//! let op = Operation::Overwrite {
//!     source: Source::server(),
//!     path: Path::root(),
//!     snapshot: Node::from_json(&serde_json::json!({"greeting": "hello"})),
//! };
//! let scoped = writes.child_writes(Path::root());
//! let (cache, changes) = processor
//!     .apply_operation(&ViewCache::empty(), &op, &scoped, None)
//!     .unwrap();
//! assert!(cache.event_cache().is_fully_initialized());
//! assert!(!changes.is_empty());
//! ```

pub mod change;
pub mod compound_write;
pub mod error;
pub mod filter;
pub mod operation;
pub mod processor;
pub mod view_cache;
pub mod write_tree;

pub use change::{Change, ChangeType, ChildChangeAccumulator};
pub use compound_write::CompoundWrite;
pub use error::{Result, ViewError};
pub use filter::{
    CompleteChildSource, IndexedFilter, LimitAnchor, LimitedFilter, NodeFilter,
    NoCompleteChildSource, QuerySpec, RangeBound, RangedFilter, WriteTreeCompleteChildSource,
};
pub use operation::{Operation, Source};
pub use processor::ViewProcessor;
pub use view_cache::{CacheNode, ViewCache};
pub use write_tree::{WriteId, WriteKind, WriteRecord, WriteTree, WriteTreeRef};
