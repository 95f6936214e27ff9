//! Node registration endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    middleware,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::ApiError;
use super::{ApiState, auth::require_api_key};
use crate::Error;
use crate::microservice::PatternId;
use crate::node::{Device, DeviceRegistration, NodeMode};

/// Node record as returned to callers; the token never leaves the agent
#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub node_id: String,
    pub org: String,
    pub pattern: Option<PatternId>,
    pub mode: NodeMode,
    pub registered_at: DateTime<Utc>,
}

impl From<Device> for NodeResponse {
    fn from(device: Device) -> Self {
        Self {
            node_id: device.node_id,
            org: device.org,
            pattern: device.pattern,
            mode: device.mode,
            registered_at: device.registered_at,
        }
    }
}

/// Get the node registration
async fn get_node(State(state): State<Arc<ApiState>>) -> Result<Json<NodeResponse>, ApiError> {
    let device = state.devices.get()?.ok_or(Error::NotRegistered)?;
    Ok(Json(device.into()))
}

/// Record the node registration
async fn register_node(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<NodeResponse>), ApiError> {
    let registration: DeviceRegistration = serde_json::from_slice(&body).map_err(|e| {
        Error::user_input(
            "node",
            format!("body couldn't be deserialized to a node registration: {e}"),
        )
    })?;

    if registration.node_id.is_empty() || registration.org.is_empty() {
        return Err(Error::user_input("node", "node_id and org must not be empty").into());
    }

    let device = state.devices.register(registration)?;
    Ok((StatusCode::CREATED, Json(device.into())))
}

/// Node routes, nested under `/api/node`
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(get_node).post(register_node))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}
