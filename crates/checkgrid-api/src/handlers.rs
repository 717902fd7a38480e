//! REST API handlers.
//!
//! Each handler calls the `Dispatcher` and returns a JSON envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use checkgrid_core::{CheckConfig, NodeStatus};
use checkgrid_dispatch::{ConfigChanges, DispatchError};
use checkgrid_state::StateError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Map a dispatcher error to an HTTP response.
fn dispatch_error(e: DispatchError) -> axum::response::Response {
    let status = match &e {
        _ if e.is_not_found() => StatusCode::NOT_FOUND,
        DispatchError::Store {
            source: StateError::ReservedName(_),
            ..
        }
        | DispatchError::NotClusterCheck(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if e.is_fault() {
        error!(error = %e, "dispatcher fault");
    }
    error_response(&e.to_string(), status).into_response()
}

/// Heartbeat response body.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub is_up_to_date: bool,
}

/// Assigned configs response body.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigsResponse {
    pub last_change: i64,
    pub configs: Vec<CheckConfig>,
}

// ── Worker nodes ───────────────────────────────────────────────

/// POST /api/v1/clusterchecks/status/{node}
pub async fn report_status(
    State(state): State<ApiState>,
    Path(node): Path<String>,
    Json(status): Json<NodeStatus>,
) -> impl IntoResponse {
    match state.dispatcher.process_node_status(&node, status) {
        Ok(is_up_to_date) => ApiResponse::ok(StatusResponse { is_up_to_date }).into_response(),
        Err(e) => dispatch_error(e),
    }
}

/// GET /api/v1/clusterchecks/configs/{node}
pub async fn get_node_configs(
    State(state): State<ApiState>,
    Path(node): Path<String>,
) -> impl IntoResponse {
    match state.dispatcher.get_node_configs(&node) {
        Ok((configs, last_change)) => ApiResponse::ok(ConfigsResponse {
            last_change,
            configs,
        })
        .into_response(),
        Err(e) => {
            if e.is_not_found() {
                warn!(%node, "config pull from unknown node");
            }
            dispatch_error(e)
        }
    }
}

// ── Administration ─────────────────────────────────────────────

/// GET /api/v1/clusterchecks/configs
pub async fn get_all_configs(State(state): State<ApiState>) -> impl IntoResponse {
    match state.dispatcher.get_all_configs() {
        Ok(configs) => ApiResponse::ok(configs).into_response(),
        Err(e) => dispatch_error(e),
    }
}

/// GET /api/v1/clusterchecks/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> impl IntoResponse {
    match state.dispatcher.node_loads() {
        Ok(nodes) => ApiResponse::ok(nodes).into_response(),
        Err(e) => dispatch_error(e),
    }
}

// ── Config source ──────────────────────────────────────────────

/// POST /api/v1/clusterchecks/changes
pub async fn apply_changes(
    State(state): State<ApiState>,
    Json(changes): Json<ConfigChanges>,
) -> impl IntoResponse {
    match state.dispatcher.apply_changes(&changes) {
        Ok(()) => ApiResponse::ok("applied").into_response(),
        Err(e) => dispatch_error(e),
    }
}
