//! Microservice configuration endpoints
//!
//! Every route requires a registered node; the node mode is read once per
//! request and passed to the aggregator.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use serde::Deserialize;

use super::error::ApiError;
use super::{ApiState, auth::require_api_key};
use crate::Error;
use crate::microservice::{ConfigListing, MicroserviceListing, PolicyListing, Registration};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct RegisterParams {
    /// Replace an existing record for the same identity
    #[serde(default)]
    pub force: bool,
}

/// List configured microservices
async fn list_microservices(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<MicroserviceListing>> {
    let mode = state.modes.current_mode()?;
    Ok(Json(state.output.list_microservices(mode)?))
}

/// List microservice configuration
async fn list_configs(State(state): State<Arc<ApiState>>) -> ApiResult<Json<ConfigListing>> {
    let mode = state.modes.current_mode()?;
    Ok(Json(state.output.list_configs(mode)?))
}

/// List synthesized policies keyed by identity
async fn list_policies(State(state): State<Arc<ApiState>>) -> ApiResult<Json<PolicyListing>> {
    let mode = state.modes.current_mode()?;
    Ok(Json(state.output.list_policies(mode)?))
}

/// Configure a microservice or pattern
async fn register(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<RegisterParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    // Unregistered nodes cannot configure anything
    let mode = state.modes.current_mode()?;
    tracing::debug!(mode = %mode, force = params.force, "registration request");

    let registration = state.pipeline.register(&body, params.force).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// Single-microservice retrieval is not offered
async fn get_one(State(state): State<Arc<ApiState>>, Path(id): Path<String>) -> ApiResult<()> {
    state.modes.current_mode()?;
    Err(Error::user_input(
        "microservice",
        format!(
            "retrieval of a single microservice ({id}) is not supported, list them instead"
        ),
    )
    .into())
}

/// Methods offered on every microservice route
const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

/// Advertise the allowed methods on `OPTIONS` responses
///
/// Wraps the CORS layer, which answers every `OPTIONS` request itself.
pub async fn advertise_methods(request: Request, next: Next) -> Response {
    let advertise = request.method() == Method::OPTIONS
        && request.uri().path().starts_with("/api/microservice");

    let mut response = next.run(request).await;
    if advertise {
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    }
    response
}

/// Microservice routes, nested under `/api/microservice`
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_microservices))
        .route("/config", get(list_configs).post(register))
        .route("/policy", get(list_policies))
        .route("/{id}", get(get_one))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}
