//! Dispatcher error types.

use checkgrid_state::StateError;
use thiserror::Error;

/// Errors that can occur during dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StateError,
    },

    #[error("config {0:?} is not a cluster check")]
    NotClusterCheck(String),
}

impl DispatchError {
    /// The node has no state yet. Callers treat this as "no assignment".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Store {
                source: StateError::NotFound(_),
                ..
            }
        )
    }

    /// A store invariant or lock failure.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_fault())
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Annotate a store result with the dispatcher operation that produced it.
pub(crate) trait OpContext<T> {
    fn op(self, op: &'static str) -> DispatchResult<T>;
}

impl<T> OpContext<T> for Result<T, StateError> {
    fn op(self, op: &'static str) -> DispatchResult<T> {
        self.map_err(|source| DispatchError::Store { op, source })
    }
}
