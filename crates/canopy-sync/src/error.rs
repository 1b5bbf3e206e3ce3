//! Error types for the Canopy sync engine.

use thiserror::Error;

/// Errors raised by the reconciliation engine.
///
/// These are programmer-error invariant failures, not runtime conditions:
/// inputs are assumed pre-validated by the transport layer. A failure aborts
/// the current reconciliation call only; the caller decides whether to drop
/// or resync the affected listener.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl ViewError {
    /// Build an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        ViewError::InvariantViolation(message.into())
    }
}

/// Result alias for sync operations.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Check a reconciliation invariant, failing the current call if it does
/// not hold.
macro_rules! invariant {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err(crate::error::ViewError::invariant($msg));
        }
    };
}

pub(crate) use invariant;
