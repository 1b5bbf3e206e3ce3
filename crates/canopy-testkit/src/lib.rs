//! # Canopy Testkit
//!
//! Testing utilities for the Canopy sync engine.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a [`ViewHarness`] that drives a listener end to end,
//!   managing the pending-write log the way a session would.
//! - **Generators**: proptest strategies for snapshots, paths, and queries.
//!
//! ## Test Fixtures
//!
//! ```rust
//! use canopy_core::Node;
//! use canopy_testkit::fixtures::ViewHarness;
//! use serde_json::json;
//!
//! let mut view = ViewHarness::new();
//! view.server_overwrite("", json!({"a": 1})).unwrap();
//! let (write_id, _) = view.user_set("a", json!(2)).unwrap();
//! view.ack(write_id).unwrap();
//! assert_eq!(view.event_snap(), &Node::from_json(&json!({"a": 1})));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use canopy_testkit::generators;
//!
//! proptest! {
//!     #[test]
//!     fn filter_keeps_subset(snapshot in generators::flat_children(8)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{merge_tree, ViewHarness};
