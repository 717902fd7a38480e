//! Least-busy node selection.

use checkgrid_state::{NodeLoad, UNASSIGNED_NODE};

/// Pick the node with the fewest assigned configs.
///
/// Ties go to the first minimum in `loads` order; the store hands loads
/// out sorted by node name. With no registered node the unassigned pool
/// is returned.
pub fn least_busy(loads: &[NodeLoad]) -> String {
    loads
        .iter()
        .min_by_key(|load| load.config_count)
        .map(|load| load.name.clone())
        .unwrap_or_else(|| UNASSIGNED_NODE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(name: &str, config_count: usize) -> NodeLoad {
        NodeLoad {
            name: name.to_string(),
            config_count,
            last_ping: None,
        }
    }

    #[test]
    fn empty_registry_picks_unassigned_pool() {
        assert_eq!(least_busy(&[]), UNASSIGNED_NODE);
    }

    #[test]
    fn picks_fewest_configs() {
        let loads = [load("node1", 3), load("node2", 2), load("node3", 5)];
        assert_eq!(least_busy(&loads), "node2");
    }

    #[test]
    fn ties_go_to_first_in_order() {
        let loads = [load("a", 1), load("b", 1), load("c", 4)];
        assert_eq!(least_busy(&loads), "a");
    }

    #[test]
    fn empty_node_beats_loaded_nodes() {
        let loads = [load("node1", 3), load("node2", 2), load("node3", 0)];
        assert_eq!(least_busy(&loads), "node3");
    }
}
