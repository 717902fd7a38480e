//! checkgrid-dispatch — the scheduling policy layer for cluster checks.
//!
//! The `Dispatcher` is stateless orchestration over a shared
//! `ClusterStore`. It:
//!
//! - Schedules cluster-scoped configs onto the least busy node
//! - Processes node heartbeats and tells nodes when to re-pull
//! - Expires silent nodes and returns their configs to the unassigned pool
//! - Re-places unassigned configs once nodes are available
//!
//! # Architecture
//!
//! ```text
//! config source ──► Dispatcher::apply_changes ─┐
//! worker nodes  ──► process_node_status        ├──► ClusterStore (one lock)
//!               ──► get_node_configs           │
//! sweep task    ──► Dispatcher::run ───────────┘
//!                     ├── expire_nodes
//!                     └── reschedule_unassigned
//! ```

pub mod dispatcher;
pub mod error;
pub mod placement;
pub mod sweeper;

pub use dispatcher::{ConfigChanges, Dispatcher};
pub use error::{DispatchError, DispatchResult};
pub use placement::least_busy;
pub use sweeper::SweepReport;
