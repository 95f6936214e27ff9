//! Exchange catalog client over HTTP
//!
//! Definitions live under the owning organization:
//! `GET {base}/orgs/{org}/microservices/{name}/{version}/{arch}` and
//! `GET {base}/orgs/{org}/patterns/{name}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use url::Url;

use super::{CatalogClient, CatalogError, CatalogResult};
use crate::db::DeviceRepo;
use crate::microservice::{MicroserviceDefinition, MicroserviceId, PatternDefinition, PatternId};
use crate::{Error, Result};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP client for the exchange catalog
#[derive(Clone)]
pub struct ExchangeClient {
    /// HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Source of node credentials, read per request
    devices: Option<DeviceRepo>,
}

impl ExchangeClient {
    /// Create a new exchange client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build catalog client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            devices: None,
        })
    }

    /// Authenticate as the registered node
    #[must_use]
    pub fn with_credentials_from(mut self, devices: DeviceRepo) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Fetch and decode one catalog resource
    async fn fetch<T: DeserializeOwned>(&self, path: &str, what: &str) -> CatalogResult<T> {
        let url = format!("{}/{path}", self.base_url);
        let mut req = self.client.get(&url);

        if let Some(devices) = &self.devices {
            match devices.credentials() {
                Ok(Some((user, token))) => {
                    req = req.basic_auth(user, Some(token.expose_secret()));
                }
                Ok(None) => {}
                Err(e) => return Err(CatalogError::Unavailable(format!("node credentials: {e}"))),
            }
        }

        tracing::debug!(url = %url, "fetching catalog resource");

        let response = req
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(what.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(CatalogError::Unavailable(format!(
                    "catalog API error: {status} - {body}"
                )))
            }
            _ => response
                .json()
                .await
                .map_err(|e| CatalogError::Unavailable(format!("invalid {what} response: {e}"))),
        }
    }
}

#[async_trait]
impl CatalogClient for ExchangeClient {
    async fn get_microservice(&self, id: &MicroserviceId) -> CatalogResult<MicroserviceDefinition> {
        let path = format!(
            "orgs/{}/microservices/{}/{}/{}",
            id.org, id.name, id.version, id.arch
        );
        let definition: MicroserviceDefinition = self.fetch(&path, &id.to_string()).await?;

        if definition.id != *id {
            return Err(CatalogError::Unavailable(format!(
                "catalog returned {} for {id}",
                definition.id
            )));
        }
        Ok(definition)
    }

    async fn get_pattern(&self, id: &PatternId) -> CatalogResult<PatternDefinition> {
        let path = format!("orgs/{}/patterns/{}", id.org, id.name);
        self.fetch(&path, &id.to_string()).await
    }
}
