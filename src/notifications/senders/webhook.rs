use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::Duration;
use tera::{Context, Tera};

use super::{NotificationSender, SenderError};
use crate::notifications::models::{OutgoingMessage, WebhookConfig};

/// Pushes messages to an HTTP gateway.
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    /// Every request, connect through body, is abandoned after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        config: &WebhookConfig,
        message: &OutgoingMessage,
    ) -> Result<(), SenderError> {
        let http_method = match config.method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "GET" => Method::GET,
            _ => {
                return Err(SenderError::InvalidConfiguration(format!(
                    "Unsupported HTTP method: {}",
                    config.method
                )));
            }
        };

        let mut request_builder = self.client.request(http_method.clone(), &config.url);

        if let Some(h) = &config.headers {
            let mut header_map = header::HeaderMap::new();
            for (key, value) in h {
                let header_name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header name: {e}"))
                })?;
                let header_value = header::HeaderValue::from_str(value).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header value: {e}"))
                })?;
                header_map.insert(header_name, header_value);
            }
            request_builder = request_builder.headers(header_map);
        }

        if http_method == Method::POST {
            request_builder = match &config.body_template {
                Some(template) => {
                    let mut tera_context = Context::new();
                    tera_context.insert("channel", &message.channel.to_string());
                    tera_context.insert("recipient", &message.recipient);
                    tera_context.insert("subject", &message.subject);
                    tera_context.insert("body", &message.body);
                    let rendered_body = Tera::one_off(template, &tera_context, true)
                        .map_err(|e| SenderError::TemplatingError(e.to_string()))?;
                    request_builder
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(rendered_body)
                }
                None => request_builder.json(message),
            };
        } else {
            request_builder = request_builder.query(&[
                ("to", message.recipient.as_str()),
                ("text", message.body.as_str()),
            ]);
        }

        let response = request_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}
