//! # Canopy Core
//!
//! Pure data structures for the Canopy view-reconciliation engine: paths,
//! snapshot nodes, ordering criteria, and persistent path-keyed trees.
//!
//! This crate contains no I/O, no networking, and no mutation: every value
//! is persistent, and every update returns a new value sharing structure
//! with the original.
//!
//! ## Key Types
//!
//! - [`Path`] / [`ChildKey`] - location in the tree, with the store's
//!   numeric-aware sibling ordering
//! - [`Scalar`] - leaf and priority values
//! - [`Node`] - an immutable snapshot: scalar leaf, ordered children, or
//!   empty
//! - [`Index`] - the closed set of sibling-ordering criteria
//! - [`ImmutableTree`] - a persistent mapping from paths to values

pub mod index;
pub mod node;
pub mod path;
pub mod scalar;
pub mod tree;

pub use index::{Index, NamedNode};
pub use node::Node;
pub use path::{ChildKey, Path, PRIORITY_KEY};
pub use scalar::Scalar;
pub use tree::ImmutableTree;
