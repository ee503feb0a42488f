use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::enums::NotificationChannel;

fn default_method() -> String {
    "POST".to_string()
}

/// Delivery endpoint for one channel: a mail relay, WhatsApp/SMS gateway or
/// push service reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String, // "GET" or "POST"
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Tera template for the POST body. Without one, the message is sent as JSON.
    #[serde(default)]
    pub body_template: Option<String>,
}

impl WebhookConfig {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: None,
            body_template: None,
        }
    }
}

/// A rendered message addressed to one recipient on one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
}

/// Addressing and endpoints used by `NotificationService`.
#[derive(Debug, Clone, Default)]
pub struct NotifierSettings {
    /// Recipient of critical alerts and fallback for sites without a contact.
    pub alert_email: String,
    /// Recipient of escalations.
    pub ops_email: String,
    /// Fallback phone number for WhatsApp/SMS when a site has no contact phone.
    pub alert_phone: Option<String>,
    pub dashboard_url: String,
    pub endpoints: HashMap<NotificationChannel, WebhookConfig>,
}
