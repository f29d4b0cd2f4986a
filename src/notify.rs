//! Outbound notifications.
//!
//! Handlers never call a notifier inline; they schedule it on the
//! background runner so the response is not held up by delivery.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `event` to `recipient` with structured `data`.
    async fn send(
        &self,
        recipient: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Notifier that writes every notification to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipient: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(recipient, event, data = %data, "Notification sent");
        Ok(())
    }
}
