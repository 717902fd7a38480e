//! Dispatcher — places cluster checks on worker nodes.
//!
//! The `Dispatcher` holds no state of its own. Every decision that reads
//! and then writes the store (schedule, expiry, re-placement) runs as one
//! store operation, so concurrent callers cannot place a config twice.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use checkgrid_core::{CheckConfig, DispatcherConfig, NodeStatus};
use checkgrid_state::{ClusterStore, NodeLoad};

use crate::error::{DispatchError, DispatchResult, OpContext};
use crate::placement::least_busy;

/// Default heartbeat silence after which a node is expired.
const DEFAULT_NODE_EXPIRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// A batch pushed by the config source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigChanges {
    #[serde(default)]
    pub schedule: Vec<CheckConfig>,
    #[serde(default)]
    pub unschedule: Vec<CheckConfig>,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty() && self.unschedule.is_empty()
    }
}

/// Scheduling policy over a shared `ClusterStore`.
#[derive(Clone)]
pub struct Dispatcher {
    store: ClusterStore,
    node_expiration_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher over `store` with a 30s expiration timeout.
    pub fn new(store: ClusterStore) -> Self {
        Self {
            store,
            node_expiration_timeout: DEFAULT_NODE_EXPIRATION_TIMEOUT,
        }
    }

    /// Create a dispatcher using the `[dispatcher]` config section.
    pub fn from_config(store: ClusterStore, config: &DispatcherConfig) -> Self {
        Self::new(store).with_node_expiration_timeout(config.node_expiration_timeout())
    }

    /// Set the heartbeat silence after which a node is expired.
    pub fn with_node_expiration_timeout(mut self, timeout: Duration) -> Self {
        self.node_expiration_timeout = timeout;
        self
    }

    pub fn node_expiration_timeout(&self) -> Duration {
        self.node_expiration_timeout
    }

    /// The underlying store.
    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    // ── Config source ──────────────────────────────────────────────

    /// Place every new cluster check on the least busy node.
    ///
    /// Non-cluster configs are dropped. Configs whose digest is already
    /// stored stay where they are.
    pub fn schedule(&self, configs: &[CheckConfig]) -> DispatchResult<()> {
        for config in configs.iter().filter(|c| c.is_cluster_check()) {
            let placed = self
                .store
                .place_config(config.clone(), least_busy)
                .op("schedule")?;
            match placed {
                Some(node) if node.is_empty() => {
                    info!(check = %config.name, "no node available, config left unassigned");
                }
                Some(node) => info!(check = %config.name, %node, "config scheduled"),
                None => debug!(check = %config.name, "config already scheduled"),
            }
        }
        Ok(())
    }

    /// Remove cluster checks from the store. Non-cluster configs are ignored.
    pub fn unschedule(&self, configs: &[CheckConfig]) -> DispatchResult<()> {
        for config in configs.iter().filter(|c| c.is_cluster_check()) {
            if self.store.remove_config(&config.digest()).op("unschedule")? {
                info!(check = %config.name, "config unscheduled");
            }
        }
        Ok(())
    }

    /// Apply a batch from the config source, removals first.
    pub fn apply_changes(&self, changes: &ConfigChanges) -> DispatchResult<()> {
        self.unschedule(&changes.unschedule)?;
        self.schedule(&changes.schedule)
    }

    /// Assign `config` to `node`, moving it off its current node.
    pub fn add_config(&self, config: CheckConfig, node: &str) -> DispatchResult<()> {
        if !config.is_cluster_check() {
            return Err(DispatchError::NotClusterCheck(config.name));
        }
        let name = config.name.clone();
        self.store.add_config(config, node).op("add_config")?;
        info!(check = %name, %node, "config assigned");
        Ok(())
    }

    // ── Worker nodes ───────────────────────────────────────────────

    /// Handle a heartbeat from `node`.
    ///
    /// Registers unknown nodes, refreshes the last ping and returns whether
    /// the node already synced past its last assignment change.
    pub fn process_node_status(&self, node: &str, status: NodeStatus) -> DispatchResult<bool> {
        let up_to_date = self
            .store
            .record_status(node, status)
            .op("process_node_status")?;
        debug!(%node, last_change = status.last_change, up_to_date, "heartbeat received");
        Ok(up_to_date)
    }

    /// Configs assigned to `node` and the time they last changed.
    pub fn get_node_configs(&self, node: &str) -> DispatchResult<(Vec<CheckConfig>, i64)> {
        self.store.get_node_configs(node).op("get_node_configs")
    }

    /// Every scheduled config, assigned or not.
    pub fn get_all_configs(&self) -> DispatchResult<Vec<CheckConfig>> {
        self.store.get_all_configs().op("get_all_configs")
    }

    /// Registered nodes and their loads, ordered by name.
    pub fn node_loads(&self) -> DispatchResult<Vec<NodeLoad>> {
        self.store.node_loads().op("node_loads")
    }

    /// Name of the registered node with the fewest configs, or `""` when
    /// no node is registered.
    pub fn least_busy_node(&self) -> DispatchResult<String> {
        let loads = self.node_loads()?;
        Ok(least_busy(&loads))
    }

    // ── Failure recovery ───────────────────────────────────────────

    /// Expire nodes silent for longer than the expiration timeout.
    ///
    /// Their configs stay scheduled but move to the unassigned pool.
    /// Returns the configs freed by this call.
    pub fn expire_nodes(&self) -> DispatchResult<Vec<CheckConfig>> {
        let timeout = i64::try_from(self.node_expiration_timeout.as_secs()).unwrap_or(i64::MAX);
        let cutoff = self.store.now().saturating_sub(timeout);
        let (expired, freed) = self.store.expire_nodes(cutoff).op("expire_nodes")?;
        for node in &expired {
            warn!(%node, "node expired");
        }
        if !freed.is_empty() {
            info!(nodes = expired.len(), configs = freed.len(), "configs freed by node expiry");
        }
        Ok(freed)
    }

    /// Move unassigned configs onto the least busy nodes.
    ///
    /// Returns how many configs were placed; zero when no node is registered.
    pub fn reschedule_unassigned(&self) -> DispatchResult<usize> {
        let moved = self
            .store
            .assign_unassigned(least_busy)
            .op("reschedule_unassigned")?;
        if moved > 0 {
            info!(configs = moved, "unassigned configs rescheduled");
        }
        Ok(moved)
    }
}
