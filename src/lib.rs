//! Edge Agent - microservice configuration for edge nodes
//!
//! This library provides the node-side management API for configuring
//! microservices:
//! - Attribute validation against catalog definitions
//! - Transitive dependency resolution
//! - Deterministic policy synthesis
//! - Mode-aware read views over the configuration store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Management API                     │
//! │   /api/microservice   │   /api/node   │   /health   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │       RegistrationPipeline  │  OutputAggregator     │
//! │  validate → synthesize → commit → notify            │
//! └──────┬───────────────┬──────────────────┬───────────┘
//!        │               │                  │
//! ┌──────▼──────┐ ┌──────▼───────┐ ┌────────▼────────┐
//! │   Catalog   │ │ ConfigStore  │ │    EventSink    │
//! │  (exchange) │ │   (SQLite)   │ │ (channel/hook)  │
//! └─────────────┘ └──────────────┘ └─────────────────┘
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod events;
pub mod microservice;
pub mod node;

pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result, ValidationError};
pub use microservice::{
    ConfigStore, ConfiguredMicroservice, MicroserviceDefinition, MicroserviceId,
    OutputAggregator, PolicyDocument, RegistrationPipeline,
};
pub use node::{NodeMode, NodeModeProvider};
