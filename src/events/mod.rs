//! Policy change notifications
//!
//! The registration pipeline hands events to an injected [`EventSink`].
//! Publishing is best-effort: a failed publish is logged by the caller and
//! never undoes a committed registration. Consumers that miss an event
//! reconcile by re-reading the configuration store.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::microservice::{ConfiguredMicroservice, MicroserviceId};
use crate::{Error, Result};

/// Default capacity of the in-process event channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default bound on one webhook delivery
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyChange {
    /// First registration of the microservice
    Created,
    /// Forced re-registration replaced an existing record
    Replaced,
}

/// Notification that a microservice policy was committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChangeEvent {
    /// Unique event ID (UUID v4)
    pub id: String,
    pub change: PolicyChange,
    pub microservice: MicroserviceId,
    /// Digest of the committed policy document
    pub policy_digest: String,
    /// Source service identifier
    pub source: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl PolicyChangeEvent {
    /// Build an event for a committed record
    #[must_use]
    pub fn new(change: PolicyChange, record: &ConfiguredMicroservice) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            change,
            microservice: record.microservice.clone(),
            policy_digest: record.policy.digest(),
            source: "edge-agent".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Destination for policy change events
///
/// `publish` must not block
pub trait EventSink: Send + Sync {
    /// Hand off an event
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventPublish`] if the event could not be accepted
    fn publish(&self, event: PolicyChangeEvent) -> Result<()>;
}

/// Sink feeding a bounded in-process channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<PolicyChangeEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PolicyChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: PolicyChangeEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => Error::EventPublish("event channel full".to_string()),
            TrySendError::Closed(_) => Error::EventPublish("event channel closed".to_string()),
        })
    }
}

/// Forwards events to an HTTP webhook
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
}

impl WebhookPublisher {
    /// Create a publisher for the given URL
    ///
    /// A delivery that takes longer than `timeout` fails, so a stalled
    /// webhook cannot hold up the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build webhook client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// POST one event
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the webhook rejects it
    pub async fn send(&self, event: &PolicyChangeEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Drain the event channel until every sink is dropped
///
/// Each event is logged and, when a webhook is configured, forwarded to it.
/// Webhook failures are logged and dropped.
pub async fn dispatch(
    mut rx: mpsc::Receiver<PolicyChangeEvent>,
    webhook: Option<WebhookPublisher>,
) {
    while let Some(event) = rx.recv().await {
        tracing::info!(
            microservice = %event.microservice,
            change = ?event.change,
            digest = %event.policy_digest,
            "policy changed"
        );

        if let Some(webhook) = &webhook
            && let Err(e) = webhook.send(&event).await
        {
            tracing::warn!(
                microservice = %event.microservice,
                error = %e,
                "failed to forward policy event"
            );
        }
    }

    tracing::debug!("event channel closed");
}
