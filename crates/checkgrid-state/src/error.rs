//! Error types for the cluster store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The node has no state record.
    #[error("node not found: {0:?}")]
    NotFound(String),

    /// The name belongs to the unassigned pool, not a worker node.
    #[error("node name {0:?} is reserved")]
    ReservedName(String),

    /// A structural invariant between the mappings does not hold.
    #[error("store invariant violated: {0}")]
    Inconsistent(String),

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StateError {
    /// Faults signal a programming defect rather than a runtime condition.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Inconsistent(_) | Self::LockPoisoned)
    }
}
