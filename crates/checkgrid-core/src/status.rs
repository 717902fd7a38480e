//! Heartbeat payload reported by worker nodes.

use serde::{Deserialize, Serialize};

/// Status a worker node sends with every heartbeat.
///
/// Only `last_change` is interpreted by the dispatcher: it is the
/// assignment timestamp (unix seconds) the node claims to have synced to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub last_change: i64,
}

impl NodeStatus {
    pub fn new(last_change: i64) -> Self {
        Self { last_change }
    }
}
