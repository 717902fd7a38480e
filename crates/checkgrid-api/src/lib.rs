//! checkgrid-api — REST API for cluster check dispatch.
//!
//! Thin transport over the `Dispatcher`: worker nodes report status and
//! pull their assignments, the config source pushes change batches.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/clusterchecks/status/{node}` | Heartbeat, returns `is_up_to_date` |
//! | GET | `/api/v1/clusterchecks/configs/{node}` | Configs assigned to a node |
//! | GET | `/api/v1/clusterchecks/configs` | All scheduled configs |
//! | GET | `/api/v1/clusterchecks/nodes` | Registered nodes and their loads |
//! | POST | `/api/v1/clusterchecks/changes` | Schedule / unschedule a batch |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use checkgrid_dispatch::Dispatcher;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Dispatcher,
}

/// Build the API router.
pub fn build_router(dispatcher: Dispatcher) -> Router {
    let api_state = ApiState { dispatcher };

    let routes = Router::new()
        .route("/status/{node}", post(handlers::report_status))
        .route("/configs", get(handlers::get_all_configs))
        .route("/configs/{node}", get(handlers::get_node_configs))
        .route("/nodes", get(handlers::list_nodes))
        .route("/changes", post(handlers::apply_changes))
        .with_state(api_state);

    Router::new().nest("/api/v1/clusterchecks", routes)
}
