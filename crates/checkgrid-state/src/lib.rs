//! checkgrid-state — the single source of truth for cluster check dispatch.
//!
//! Holds three mappings behind one `RwLock`:
//!
//! ```text
//! ClusterStore
//!   ├── digest → CheckConfig
//!   ├── digest → node name ("" = unassigned pool)
//!   └── node name → NodeStore (real nodes only)
//! ```
//!
//! Every public operation takes the lock for its whole duration through a
//! scoped guard. Compound operations are built from lock-free helpers on
//! the guarded inner state, never by calling another public operation.
//!
//! The `ClusterStore` is `Clone` + `Send` + `Sync` (backed by `Arc`) and is
//! shared by handle between the dispatcher, the API and the sweep task.

pub mod clock;
pub mod error;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StateError, StateResult};
pub use store::ClusterStore;
pub use types::*;
