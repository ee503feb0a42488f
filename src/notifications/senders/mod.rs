use async_trait::async_trait;
use thiserror::Error;

use super::models::{OutgoingMessage, WebhookConfig};

pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Delivers one rendered message to a channel endpoint.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        config: &WebhookConfig,
        message: &OutgoingMessage,
    ) -> Result<(), SenderError>;
}
