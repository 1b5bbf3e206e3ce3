//! Inbound operations consumed by the view processor.
//!
//! An [`Operation`] describes one already-decoded event: a server push, a
//! locally issued write, an acknowledgement, or a listen-complete marker.
//! The processor consumes operations strictly in the order the transport
//! observed them.

use serde::{Deserialize, Serialize};

use canopy_core::{ImmutableTree, Node, Path};

/// Where an operation originated.
///
/// Server data may be *tagged*: scoped to one specific query listener
/// rather than the default (unfiltered) listener at a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    /// Synthesized from a local user write.
    User,
    /// Pushed by the server.
    Server { tagged: bool },
}

impl Source {
    pub fn server() -> Self {
        Source::Server { tagged: false }
    }

    pub fn tagged_server() -> Self {
        Source::Server { tagged: true }
    }

    pub fn is_from_user(&self) -> bool {
        matches!(self, Source::User)
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, Source::Server { tagged: true })
    }
}

/// One inbound event description.
#[derive(Clone, Debug)]
pub enum Operation {
    /// Full replacement of the node at `path`.
    Overwrite {
        source: Source,
        path: Path,
        snapshot: Node,
    },
    /// Patch of multiple children below `path`. Each value in `children`
    /// overwrites the node at its relative path; siblings not named are
    /// untouched.
    Merge {
        source: Source,
        path: Path,
        children: ImmutableTree<Node>,
    },
    /// The server confirmed a pending write (or, with `revert`, the write
    /// must be undone). `affected_tree` holds `true` at each relative path
    /// the write covered: the root for an overwrite, one entry per child
    /// for a merge.
    AckUserWrite {
        path: Path,
        affected_tree: ImmutableTree<bool>,
        revert: bool,
    },
    /// The server asserts data at `path` is complete: no data means empty,
    /// not unknown.
    ListenComplete { path: Path },
}

impl Operation {
    /// The path this operation applies to.
    pub fn path(&self) -> &Path {
        match self {
            Operation::Overwrite { path, .. }
            | Operation::Merge { path, .. }
            | Operation::AckUserWrite { path, .. }
            | Operation::ListenComplete { path } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_predicates() {
        assert!(Source::User.is_from_user());
        assert!(!Source::server().is_from_user());
        assert!(Source::tagged_server().is_tagged());
        assert!(!Source::server().is_tagged());
    }
}
