//! Daemon - the edge agent service
//!
//! Wires the database, catalog, event dispatch and registration pipeline
//! together and serves the management API until interrupted.

use std::sync::Arc;

use crate::api::ApiServerBuilder;
use crate::catalog::{CatalogClient, ExchangeClient, LocalCatalog};
use crate::db::{self, DbPool, DeviceRepo, MicroserviceRepo};
use crate::events::{self, ChannelSink, WebhookPublisher};
use crate::microservice::{ConfigStore, OutputAggregator, RegistrationPipeline};
use crate::{Config, Result};

/// The edge agent daemon
pub struct Daemon {
    config: Config,
    db: DbPool,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn new(config: Config) -> Result<Self> {
        let db_path = config.db_path();
        let db = db::init(&db_path)?;

        tracing::info!(path = %db_path.display(), "database initialized");

        Ok(Self { config, db })
    }

    /// Build the catalog client: exchange URL, then local file, then empty
    ///
    /// # Errors
    ///
    /// Returns error if the configured catalog cannot be set up
    pub fn catalog(&self) -> Result<Arc<dyn CatalogClient>> {
        if let Some(url) = &self.config.catalog.url {
            let client = ExchangeClient::new(url, self.config.catalog.timeout)?
                .with_credentials_from(DeviceRepo::new(self.db.clone()));
            tracing::info!(url = %url, "using exchange catalog");
            return Ok(Arc::new(client));
        }

        if let Some(path) = &self.config.catalog.file {
            return Ok(Arc::new(LocalCatalog::load(path)?));
        }

        tracing::warn!("no catalog configured, every registration will fail catalog lookup");
        Ok(Arc::new(LocalCatalog::new()))
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the daemon encounters a fatal error
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            port = self.config.api_server.port,
            data_dir = %self.config.data_dir.display(),
            "daemon running"
        );

        let catalog = self.catalog()?;

        // Policy change events: bounded channel drained by a background task
        let (sink, rx) = ChannelSink::channel(self.config.events.channel_capacity);
        let webhook = self
            .config
            .events
            .webhook_url
            .as_ref()
            .map(|url| {
                tracing::info!(url = %url, "forwarding policy events to webhook");
                WebhookPublisher::new(url.as_str(), events::DEFAULT_WEBHOOK_TIMEOUT)
            })
            .transpose()?;
        let dispatcher = tokio::spawn(events::dispatch(rx, webhook));

        let store: Arc<dyn ConfigStore> = Arc::new(MicroserviceRepo::new(self.db.clone()));
        let pipeline = Arc::new(RegistrationPipeline::new(
            catalog,
            Arc::clone(&store),
            Arc::new(sink),
            self.config.catalog.timeout,
        ));
        let output = OutputAggregator::new(store);

        let server = ApiServerBuilder::new(
            self.db.clone(),
            self.config.api_server.port,
            pipeline,
            output,
        )
        .api_key(self.config.api_server.api_key.clone())
        .build();

        tokio::select! {
            result = server.run() => result?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
            }
        }

        // The server owned the last sink; the dispatcher drains and exits
        if let Err(e) = dispatcher.await {
            tracing::warn!(error = %e, "event dispatcher ended abnormally");
        }

        tracing::info!("daemon stopped");
        Ok(())
    }

    /// Database pool
    #[must_use]
    pub const fn db(&self) -> &DbPool {
        &self.db
    }
}
