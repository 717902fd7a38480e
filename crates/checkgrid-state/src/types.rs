//! Node records held by the cluster store.

use std::collections::BTreeSet;

use serde::Serialize;

use checkgrid_core::{Digest, NodeStatus};

/// Name of the dummy node that holds unassigned configs.
///
/// It is never registered as a real node: it has no `NodeStore`, never
/// takes part in load balancing and is never expired.
pub const UNASSIGNED_NODE: &str = "";

/// Per-node state: liveness, last reported status and assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeStore {
    /// Unix seconds of the last heartbeat. `None` until the node reports.
    ///
    /// A node that has never reported counts as infinitely stale, so a
    /// node registered only through an assignment is reclaimed by the
    /// next expiration sweep.
    pub last_ping: Option<i64>,
    /// Payload of the last heartbeat.
    pub last_status: NodeStatus,
    /// Unix seconds of the last change to `digests`.
    pub last_config_change: i64,
    /// Digests of the configs assigned to this node.
    pub digests: BTreeSet<Digest>,
}

impl NodeStore {
    /// Assignment timestamp the node claims to have synced to.
    pub fn reported_change(&self) -> i64 {
        self.last_status.last_change
    }

    /// Whether the node has synced past its last assignment change.
    pub fn is_up_to_date(&self) -> bool {
        self.reported_change() >= self.last_config_change
    }

    /// Whether the last heartbeat is older than `cutoff`.
    pub fn is_expired(&self, cutoff: i64) -> bool {
        match self.last_ping {
            Some(ping) => ping < cutoff,
            None => true,
        }
    }

    pub fn config_count(&self) -> usize {
        self.digests.len()
    }

    pub(crate) fn add_digest(&mut self, digest: Digest, now: i64) {
        self.digests.insert(digest);
        self.last_config_change = now;
    }

    pub(crate) fn remove_digest(&mut self, digest: &str, now: i64) {
        self.digests.remove(digest);
        self.last_config_change = now;
    }
}

/// Load of a registered node, as seen by placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeLoad {
    pub name: String,
    pub config_count: usize,
    pub last_ping: Option<i64>,
}
