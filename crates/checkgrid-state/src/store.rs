//! ClusterStore — in-memory state for cluster check dispatch.
//!
//! All state sits in one `StoreInner` behind a `std::sync::RwLock`. Public
//! methods acquire the lock once through a scoped guard and delegate to
//! `StoreInner` helpers, which never lock. Mutating helpers validate
//! before they write so a failed operation leaves no partial change.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use tracing::{debug, error};

use checkgrid_core::{CheckConfig, Digest, NodeStatus};

use crate::clock::{Clock, SystemClock};
use crate::error::{StateError, StateResult};
use crate::types::{NodeLoad, NodeStore, UNASSIGNED_NODE};

/// Thread-safe store of config assignments and node records.
#[derive(Clone)]
pub struct ClusterStore {
    inner: Arc<RwLock<StoreInner>>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct StoreInner {
    digest_to_config: HashMap<Digest, CheckConfig>,
    digest_to_node: HashMap<Digest, String>,
    /// Real nodes only, ordered by name.
    nodes: BTreeMap<String, NodeStore>,
}

impl Default for ClusterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            clock,
        }
    }

    /// Current time on the store clock, in unix seconds.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    fn read(&self) -> StateResult<RwLockReadGuard<'_, StoreInner>> {
        self.inner.read().map_err(|_| {
            error!("cluster store lock poisoned");
            StateError::LockPoisoned
        })
    }

    fn write(&self) -> StateResult<RwLockWriteGuard<'_, StoreInner>> {
        self.inner.write().map_err(|_| {
            error!("cluster store lock poisoned");
            StateError::LockPoisoned
        })
    }

    /// Whether another caller currently holds the lock.
    pub fn is_locked(&self) -> bool {
        matches!(self.inner.try_write(), Err(TryLockError::WouldBlock))
    }

    // ── Configs ────────────────────────────────────────────────────

    /// Store `config` and assign it to `node`, moving it off any previous node.
    pub fn add_config(&self, config: CheckConfig, node: &str) -> StateResult<()> {
        let now = self.now();
        let mut inner = self.write()?;
        inner.add_config(config, node, now)
    }

    /// Delete a config and its assignment. Returns false if it was unknown.
    pub fn remove_config(&self, digest: &str) -> StateResult<bool> {
        let now = self.now();
        let mut inner = self.write()?;
        inner.remove_config(digest, now)
    }

    /// Store `config` on the node picked by `select`, unless its digest is
    /// already present.
    ///
    /// `select` sees the load of every registered node and runs under the
    /// write lock, so it must not call back into the store. Returns the
    /// chosen node, or `None` if the config was already placed.
    pub fn place_config<F>(&self, config: CheckConfig, select: F) -> StateResult<Option<String>>
    where
        F: FnOnce(&[NodeLoad]) -> String,
    {
        let now = self.now();
        let mut inner = self.write()?;
        if inner.digest_to_config.contains_key(&config.digest()) {
            return Ok(None);
        }
        let node = select(&inner.node_loads());
        inner.add_config(config, &node, now)?;
        Ok(Some(node))
    }

    /// Move configs from the unassigned pool onto nodes picked by `select`.
    ///
    /// Configs are taken in digest order and loads are recomputed after
    /// every move. Stops as soon as `select` returns the unassigned node.
    /// Returns the number of configs moved.
    pub fn assign_unassigned<F>(&self, mut select: F) -> StateResult<usize>
    where
        F: FnMut(&[NodeLoad]) -> String,
    {
        let now = self.now();
        let mut inner = self.write()?;
        let mut pending: Vec<Digest> = inner
            .digest_to_node
            .iter()
            .filter(|(_, node)| node.as_str() == UNASSIGNED_NODE)
            .map(|(digest, _)| digest.clone())
            .collect();
        pending.sort();

        let mut moved = 0;
        for digest in pending {
            let node = select(&inner.node_loads());
            if node == UNASSIGNED_NODE {
                break;
            }
            let config = inner
                .digest_to_config
                .get(&digest)
                .cloned()
                .ok_or_else(|| missing_config(&digest))?;
            inner.add_config(config, &node, now)?;
            debug!(%digest, %node, "unassigned config placed");
            moved += 1;
        }
        Ok(moved)
    }

    /// Every stored config, in no particular order.
    pub fn get_all_configs(&self) -> StateResult<Vec<CheckConfig>> {
        let inner = self.read()?;
        Ok(inner.digest_to_config.values().cloned().collect())
    }

    /// Configs held by the unassigned pool.
    pub fn unassigned_configs(&self) -> StateResult<Vec<CheckConfig>> {
        let inner = self.read()?;
        inner
            .digest_to_node
            .iter()
            .filter(|(_, node)| node.as_str() == UNASSIGNED_NODE)
            .map(|(digest, _)| inner.config(digest))
            .collect()
    }

    /// Node a digest is assigned to, if stored.
    pub fn node_of(&self, digest: &str) -> StateResult<Option<String>> {
        let inner = self.read()?;
        Ok(inner.digest_to_node.get(digest).cloned())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Configs assigned to `node` and the node's last assignment change.
    pub fn get_node_configs(&self, node: &str) -> StateResult<(Vec<CheckConfig>, i64)> {
        let inner = self.read()?;
        let store = inner
            .nodes
            .get(node)
            .ok_or_else(|| StateError::NotFound(node.to_string()))?;
        let configs = store
            .digests
            .iter()
            .map(|digest| inner.config(digest))
            .collect::<StateResult<Vec<_>>>()?;
        Ok((configs, store.last_config_change))
    }

    /// Snapshot of a node's record. `None` if the node is not registered.
    pub fn get_node_store(&self, node: &str) -> StateResult<Option<NodeStore>> {
        let inner = self.read()?;
        Ok(inner.nodes.get(node).cloned())
    }

    /// Load of every registered node, ordered by name.
    pub fn node_loads(&self) -> StateResult<Vec<NodeLoad>> {
        let inner = self.read()?;
        Ok(inner.node_loads())
    }

    /// Record a heartbeat: register the node if needed, stamp `last_ping`
    /// and keep `status`. Returns whether the node is up to date.
    pub fn record_status(&self, node: &str, status: NodeStatus) -> StateResult<bool> {
        if node == UNASSIGNED_NODE {
            return Err(StateError::ReservedName(node.to_string()));
        }
        let now = self.now();
        let mut inner = self.write()?;
        let store = inner.nodes.entry(node.to_string()).or_insert_with(|| {
            debug!(%node, "node registered");
            NodeStore::default()
        });
        store.last_ping = Some(now);
        store.last_status = status;
        Ok(store.is_up_to_date())
    }

    /// Forget every node whose last heartbeat is older than `cutoff` and
    /// move its configs to the unassigned pool.
    ///
    /// Returns the expired node names and the configs they held.
    pub fn expire_nodes(&self, cutoff: i64) -> StateResult<(Vec<String>, Vec<CheckConfig>)> {
        let mut inner = self.write()?;
        let expired: Vec<String> = inner
            .nodes
            .iter()
            .filter(|(_, store)| store.is_expired(cutoff))
            .map(|(name, _)| name.clone())
            .collect();

        let mut freed = Vec::new();
        for name in &expired {
            for digest in &inner.nodes[name].digests {
                freed.push(inner.config(digest)?);
            }
        }

        for name in &expired {
            if let Some(store) = inner.nodes.remove(name) {
                for digest in store.digests {
                    inner
                        .digest_to_node
                        .insert(digest, UNASSIGNED_NODE.to_string());
                }
            }
        }
        Ok((expired, freed))
    }

    /// Check that the three mappings agree with each other.
    pub fn verify(&self) -> StateResult<()> {
        let inner = self.read()?;
        inner.verify()
    }
}

fn missing_config(digest: &str) -> StateError {
    let err = StateError::Inconsistent(format!("digest {digest} assigned but has no config"));
    error!(error = %err, "cluster store fault");
    err
}

impl StoreInner {
    fn config(&self, digest: &str) -> StateResult<CheckConfig> {
        self.digest_to_config
            .get(digest)
            .cloned()
            .ok_or_else(|| missing_config(digest))
    }

    fn node_loads(&self) -> Vec<NodeLoad> {
        self.nodes
            .iter()
            .map(|(name, store)| NodeLoad {
                name: name.clone(),
                config_count: store.config_count(),
                last_ping: store.last_ping,
            })
            .collect()
    }

    fn add_config(&mut self, config: CheckConfig, node: &str, now: i64) -> StateResult<()> {
        let digest = config.digest();
        let previous = self.digest_to_node.get(&digest).cloned();

        if let Some(prev) = previous.as_deref() {
            if prev != node && prev != UNASSIGNED_NODE && !self.nodes.contains_key(prev) {
                let err = StateError::Inconsistent(format!(
                    "digest {digest} assigned to unregistered node {prev:?}"
                ));
                error!(error = %err, "cluster store fault");
                return Err(err);
            }
        }

        if let Some(prev) = previous.as_deref() {
            if prev != node {
                if let Some(store) = self.nodes.get_mut(prev) {
                    store.remove_digest(&digest, now);
                }
            }
        }

        self.digest_to_config.insert(digest.clone(), config);
        self.digest_to_node.insert(digest.clone(), node.to_string());
        if node != UNASSIGNED_NODE {
            self.nodes
                .entry(node.to_string())
                .or_default()
                .add_digest(digest.clone(), now);
        }
        debug!(%digest, %node, previous = ?previous, "config assigned");
        Ok(())
    }

    fn remove_config(&mut self, digest: &str, now: i64) -> StateResult<bool> {
        let Some(node) = self.digest_to_node.get(digest).cloned() else {
            if self.digest_to_config.contains_key(digest) {
                let err = StateError::Inconsistent(format!("digest {digest} stored but unassigned"));
                error!(error = %err, "cluster store fault");
                return Err(err);
            }
            return Ok(false);
        };
        if !self.digest_to_config.contains_key(digest) {
            return Err(missing_config(digest));
        }

        if node != UNASSIGNED_NODE {
            match self.nodes.get_mut(&node) {
                Some(store) => store.remove_digest(digest, now),
                None => {
                    let err = StateError::Inconsistent(format!(
                        "digest {digest} assigned to unregistered node {node:?}"
                    ));
                    error!(error = %err, "cluster store fault");
                    return Err(err);
                }
            }
        }

        self.digest_to_config.remove(digest);
        self.digest_to_node.remove(digest);
        debug!(%digest, %node, "config removed");
        Ok(true)
    }

    fn verify(&self) -> StateResult<()> {
        if self.digest_to_config.len() != self.digest_to_node.len() {
            return Err(StateError::Inconsistent(format!(
                "{} configs but {} assignments",
                self.digest_to_config.len(),
                self.digest_to_node.len()
            )));
        }
        for (digest, node) in &self.digest_to_node {
            if !self.digest_to_config.contains_key(digest) {
                return Err(missing_config(digest));
            }
            if node == UNASSIGNED_NODE {
                continue;
            }
            let held = self
                .nodes
                .get(node)
                .is_some_and(|store| store.digests.contains(digest));
            if !held {
                return Err(StateError::Inconsistent(format!(
                    "digest {digest} mapped to {node:?} but missing from its set"
                )));
            }
        }
        for (name, store) in &self.nodes {
            for digest in &store.digests {
                if self.digest_to_node.get(digest) != Some(name) {
                    return Err(StateError::Inconsistent(format!(
                        "node {name:?} holds {digest} assigned elsewhere"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;

    fn check(name: &str) -> CheckConfig {
        CheckConfig::cluster_check(name)
    }

    fn test_store() -> (ClusterStore, ManualClock) {
        let clock = ManualClock::new(1_000);
        (ClusterStore::with_clock(Arc::new(clock.clone())), clock)
    }

    fn names(configs: &[CheckConfig]) -> Vec<String> {
        let mut names: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn add_config_registers_node_lazily() {
        let (store, _) = test_store();
        assert!(store.get_node_store("node1").unwrap().is_none());

        store.add_config(check("A"), "node1").unwrap();

        let node = store.get_node_store("node1").unwrap().unwrap();
        assert_eq!(node.config_count(), 1);
        assert_eq!(node.last_config_change, 1_000);
        assert_eq!(node.last_ping, None);
        assert!(!store.is_locked());
        store.verify().unwrap();
    }

    #[test]
    fn add_config_to_unassigned_pool_creates_no_node() {
        let (store, _) = test_store();
        let config = check("A");
        store.add_config(config.clone(), UNASSIGNED_NODE).unwrap();

        assert_eq!(store.node_of(&config.digest()).unwrap().as_deref(), Some(""));
        assert!(store.node_loads().unwrap().is_empty());
        assert!(store.get_node_store(UNASSIGNED_NODE).unwrap().is_none());
        assert_eq!(store.unassigned_configs().unwrap(), vec![config]);
        store.verify().unwrap();
    }

    #[test]
    fn reassignment_moves_config_and_bumps_both_nodes() {
        let (store, clock) = test_store();
        let config = check("A");
        store.add_config(config.clone(), "node1").unwrap();

        clock.advance(10);
        store.add_config(config.clone(), "node2").unwrap();

        let (on1, changed1) = store.get_node_configs("node1").unwrap();
        let (on2, changed2) = store.get_node_configs("node2").unwrap();
        assert!(on1.is_empty());
        assert_eq!(on2, vec![config]);
        assert_eq!(changed1, 1_010);
        assert_eq!(changed2, 1_010);
        assert_eq!(store.get_all_configs().unwrap().len(), 1);
        store.verify().unwrap();
    }

    #[test]
    fn remove_config_updates_owner() {
        let (store, clock) = test_store();
        let config = check("A");
        store.add_config(config.clone(), "node1").unwrap();

        clock.advance(5);
        assert!(store.remove_config(&config.digest()).unwrap());

        let (configs, changed) = store.get_node_configs("node1").unwrap();
        assert!(configs.is_empty());
        assert_eq!(changed, 1_005);
        assert!(store.get_all_configs().unwrap().is_empty());
        assert!(store.node_of(&config.digest()).unwrap().is_none());
        store.verify().unwrap();
    }

    #[test]
    fn remove_unknown_digest_is_noop() {
        let (store, _) = test_store();
        assert!(!store.remove_config("deadbeef").unwrap());
        assert!(!store.is_locked());
    }

    #[test]
    fn get_node_configs_unknown_node_is_not_found() {
        let (store, _) = test_store();
        let err = store.get_node_configs("ghost").unwrap_err();
        assert_eq!(err, StateError::NotFound("ghost".to_string()));
        assert!(!err.is_fault());
        assert!(!store.is_locked());
    }

    #[test]
    fn place_config_skips_present_digest() {
        let (store, _) = test_store();
        let placed = store.place_config(check("A"), |_| "node1".to_string()).unwrap();
        assert_eq!(placed.as_deref(), Some("node1"));

        let placed = store
            .place_config(check("A"), |_| panic!("selector must not run"))
            .unwrap();
        assert_eq!(placed, None);
        assert_eq!(store.get_node_configs("node1").unwrap().0.len(), 1);
    }

    #[test]
    fn place_config_selector_sees_loads_in_name_order() {
        let (store, _) = test_store();
        store.add_config(check("A"), "node-b").unwrap();
        store.add_config(check("B"), "node-a").unwrap();
        store.add_config(check("C"), "node-a").unwrap();

        store
            .place_config(check("D"), |loads| {
                let seen: Vec<(&str, usize)> =
                    loads.iter().map(|l| (l.name.as_str(), l.config_count)).collect();
                assert_eq!(seen, vec![("node-a", 2), ("node-b", 1)]);
                "node-b".to_string()
            })
            .unwrap();
    }

    #[test]
    fn record_status_registers_and_stamps_ping() {
        let (store, clock) = test_store();
        let up_to_date = store.record_status("node1", NodeStatus::new(0)).unwrap();
        assert!(up_to_date);

        let node = store.get_node_store("node1").unwrap().unwrap();
        assert_eq!(node.last_ping, Some(1_000));
        assert_eq!(node.last_status, NodeStatus::new(0));

        clock.advance(3);
        store.add_config(check("A"), "node1").unwrap();
        assert!(!store.record_status("node1", NodeStatus::new(1_001)).unwrap());
        assert!(store.record_status("node1", NodeStatus::new(1_003)).unwrap());
        assert_eq!(store.get_node_store("node1").unwrap().unwrap().last_ping, Some(1_003));
    }

    #[test]
    fn record_status_rejects_unassigned_name() {
        let (store, _) = test_store();
        let err = store.record_status(UNASSIGNED_NODE, NodeStatus::default()).unwrap_err();
        assert!(matches!(err, StateError::ReservedName(_)));
        assert!(store.node_loads().unwrap().is_empty());
    }

    #[test]
    fn expire_nodes_moves_configs_to_unassigned_pool() {
        let (store, clock) = test_store();
        store.record_status("node1", NodeStatus::default()).unwrap();
        store.record_status("node2", NodeStatus::default()).unwrap();
        store.add_config(check("A"), "node1").unwrap();
        store.add_config(check("B"), "node2").unwrap();
        store.add_config(check("C"), "node2").unwrap();

        clock.advance(20);
        store.record_status("node1", NodeStatus::default()).unwrap();

        let (expired, freed) = store.expire_nodes(1_010).unwrap();
        assert_eq!(expired, vec!["node2".to_string()]);
        assert_eq!(names(&freed), vec!["B", "C"]);

        assert!(store.get_node_store("node2").unwrap().is_none());
        assert_eq!(names(&store.unassigned_configs().unwrap()), vec!["B", "C"]);
        assert_eq!(store.get_all_configs().unwrap().len(), 3);
        store.verify().unwrap();
    }

    #[test]
    fn expire_nodes_empty_registry() {
        let (store, _) = test_store();
        let (expired, freed) = store.expire_nodes(i64::MAX).unwrap();
        assert!(expired.is_empty());
        assert!(freed.is_empty());
    }

    #[test]
    fn assign_unassigned_spreads_by_load() {
        let (store, _) = test_store();
        for name in ["A", "B", "C", "D"] {
            store.add_config(check(name), UNASSIGNED_NODE).unwrap();
        }
        store.record_status("node1", NodeStatus::default()).unwrap();
        store.record_status("node2", NodeStatus::default()).unwrap();

        let moved = store
            .assign_unassigned(|loads| {
                loads
                    .iter()
                    .min_by_key(|l| l.config_count)
                    .map(|l| l.name.clone())
                    .unwrap_or_default()
            })
            .unwrap();

        assert_eq!(moved, 4);
        assert!(store.unassigned_configs().unwrap().is_empty());
        assert_eq!(store.get_node_configs("node1").unwrap().0.len(), 2);
        assert_eq!(store.get_node_configs("node2").unwrap().0.len(), 2);
        store.verify().unwrap();
    }

    #[test]
    fn assign_unassigned_stops_without_nodes() {
        let (store, _) = test_store();
        store.add_config(check("A"), UNASSIGNED_NODE).unwrap();
        let moved = store.assign_unassigned(|_| String::new()).unwrap();
        assert_eq!(moved, 0);
        assert_eq!(store.unassigned_configs().unwrap().len(), 1);
    }

    #[test]
    fn verify_detects_broken_mapping() {
        let (store, _) = test_store();
        store.add_config(check("A"), "node1").unwrap();
        {
            let mut inner = store.inner.write().unwrap();
            inner.digest_to_config.clear();
        }
        let err = store.verify().unwrap_err();
        assert!(err.is_fault());
        let err = store.get_node_configs("node1").unwrap_err();
        assert!(matches!(err, StateError::Inconsistent(_)));
        assert!(!store.is_locked());
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let (store, _) = test_store();
        let poisoner = store.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("poison the store lock");
        })
        .join();

        assert_eq!(store.get_all_configs().unwrap_err(), StateError::LockPoisoned);
        assert!(store.add_config(check("A"), "node1").unwrap_err().is_fault());
    }

    #[test]
    fn lock_is_released_after_every_operation() {
        let (store, _) = test_store();
        store.add_config(check("A"), "node1").unwrap();
        let _ = store.get_node_configs("missing");
        let _ = store.remove_config("missing");
        let _ = store.record_status(UNASSIGNED_NODE, NodeStatus::default());

        let other = store.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = other.add_config(CheckConfig::cluster_check("B"), "node2");
            let _ = tx.send(result);
        });
        let result = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("store operation blocked");
        assert!(result.is_ok());
        assert!(!store.is_locked());
    }
}
