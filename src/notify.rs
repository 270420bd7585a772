//! Reminder delivery
//!
//! The `Notifier` trait is the seam between the scheduler and whatever chat
//! surface shows reminders to the user.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::composer::ReminderMessage;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery failed: {0}")]
    Transient(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Delivers composed reminders to a user
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &ReminderMessage) -> Result<(), DeliveryError>;
}

/// Writes reminders to the log; used when no chat surface is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &ReminderMessage) -> Result<(), DeliveryError> {
        info!(
            "reminder for user {} (task {}): {}",
            message.user, message.task, message.text
        );
        Ok(())
    }
}

/// Publishes reminders on an in-process broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ReminderMessage>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReminderMessage> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn send(&self, message: &ReminderMessage) -> Result<(), DeliveryError> {
        // Having no subscribers is not a delivery failure
        let receivers = self.sender.send(message.clone()).unwrap_or(0);
        debug!("broadcast reminder to {} subscribers", receivers);
        Ok(())
    }
}

/// Sends every reminder to all inner notifiers
#[derive(Clone)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    /// Tries every target; returns the first error seen, if any
    async fn send(&self, message: &ReminderMessage) -> Result<(), DeliveryError> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(e) = target.send(message).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// POSTs each reminder as JSON to a chat bridge
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &ReminderMessage) -> Result<(), DeliveryError> {
        let response = self.http_client.post(&self.url).json(message).send().await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Transient(format!(
                "webhook answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}
