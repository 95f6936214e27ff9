//! HTTP API server for the edge agent

mod auth;
pub mod error;
pub mod health;
pub mod microservice;
pub mod node;

use std::sync::Arc;

use axum::{Router, middleware};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::db::{DbPool, DeviceRepo};
use crate::microservice::{OutputAggregator, RegistrationPipeline};
use crate::node::NodeModeProvider;

pub use error::ApiError;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub api_key: Option<String>,
    pub devices: DeviceRepo,
    pub modes: Arc<dyn NodeModeProvider>,
    pub pipeline: Arc<RegistrationPipeline>,
    pub output: OutputAggregator,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    db: DbPool,
    port: u16,
    api_key: Option<String>,
    modes: Option<Arc<dyn NodeModeProvider>>,
    pipeline: Arc<RegistrationPipeline>,
    output: OutputAggregator,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(
        db: DbPool,
        port: u16,
        pipeline: Arc<RegistrationPipeline>,
        output: OutputAggregator,
    ) -> Self {
        Self {
            db,
            port,
            api_key: None,
            modes: None,
            pipeline,
            output,
        }
    }

    /// Set the API key required on management routes
    #[must_use]
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Override where the node mode is read from (defaults to the device record)
    #[must_use]
    pub fn modes(mut self, modes: Arc<dyn NodeModeProvider>) -> Self {
        self.modes = Some(modes);
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let devices = DeviceRepo::new(self.db.clone());
        let modes = self
            .modes
            .unwrap_or_else(|| Arc::new(devices.clone()) as Arc<dyn NodeModeProvider>);

        let state = Arc::new(ApiState {
            db: self.db,
            api_key: self.api_key,
            devices,
            modes,
            pipeline: self.pipeline,
            output: self.output,
        });

        ApiServer {
            state,
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let router = Router::new()
            .nest("/api/microservice", microservice::router(self.state.clone()))
            .nest("/api/node", node::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        // CORS layer for cross-origin requests from node tooling
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router
            .layer(cors)
            .layer(middleware::from_fn(microservice::advertise_methods))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.api_key.is_none() {
            tracing::warn!("no API key configured, management API is unauthenticated");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
