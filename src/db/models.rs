//! Domain records shared by the monitoring core.
//!
//! Persisted rows are the SeaORM entity models themselves; this module names
//! them for the rest of the crate and adds the request/intent types that have
//! no table of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::{alert, health_check, notification, site};
use super::enums::{AlertType, HealthStatus, NotificationChannel, Severity, SiteType};

pub type Site = site::Model;
pub type CheckResult = health_check::Model;
pub type Alert = alert::Model;
pub type Notification = notification::Model;

impl site::Model {
    /// Soft-deleted sites are invisible to scheduling and summaries.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Active and not soft-deleted.
    pub fn is_schedulable(&self) -> bool {
        self.is_active && !self.is_deleted()
    }
}

impl health_check::Model {
    /// A bare result carrying only the status; metrics are filled in by the prober.
    pub fn new(site_id: Uuid, status: HealthStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id,
            status,
            http_code: None,
            response_time_ms: None,
            error_rate: None,
            database_status: None,
            cache_status: None,
            ssl_status: None,
            error_message: None,
            checked_at,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == HealthStatus::Online
    }
}

impl alert::Model {
    /// Builds a fresh OPEN alert: nothing sent, no attempts, no retry scheduled.
    pub fn new_open(
        site_id: Uuid,
        alert_type: AlertType,
        severity: Severity,
        title: String,
        message: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id,
            alert_type,
            severity,
            title,
            message,
            resolved: false,
            created_at,
            resolved_at: None,
            resolved_by: None,
            email_sent: false,
            whatsapp_sent: false,
            sms_sent: false,
            push_sent: false,
            notification_attempts: 0,
            next_retry_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.resolved
    }

    pub fn channel_sent(&self, channel: NotificationChannel) -> bool {
        match channel {
            NotificationChannel::Email => self.email_sent,
            NotificationChannel::Whatsapp => self.whatsapp_sent,
            NotificationChannel::Sms => self.sms_sent,
            NotificationChannel::Push => self.push_sent,
        }
    }

    pub fn set_channel_sent(&mut self, channel: NotificationChannel, sent: bool) {
        match channel {
            NotificationChannel::Email => self.email_sent = sent,
            NotificationChannel::Whatsapp => self.whatsapp_sent = sent,
            NotificationChannel::Sms => self.sms_sent = sent,
            NotificationChannel::Push => self.push_sent = sent,
        }
    }

    /// Minutes between creation and resolution, if resolved.
    pub fn resolution_minutes(&self) -> Option<f64> {
        self.resolved_at
            .map(|resolved_at| (resolved_at - self.created_at).num_seconds() as f64 / 60.0)
    }
}

/// Decision emitted by the status transition detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertIntent {
    Open {
        alert_type: AlertType,
        severity: Severity,
        title: String,
        message: String,
    },
    Close {
        alert_type: AlertType,
    },
}

impl AlertIntent {
    pub fn alert_type(&self) -> AlertType {
        match self {
            AlertIntent::Open { alert_type, .. } | AlertIntent::Close { alert_type } => *alert_type,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_check_interval() -> i32 {
    300
}

fn default_timeout() -> i32 {
    30
}

fn default_threshold_response_ms() -> i32 {
    5000
}

fn default_threshold_error_rate() -> f64 {
    5.0
}

fn default_threshold_uptime() -> f64 {
    95.0
}

/// Registration payload for a new monitored site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSite {
    pub name: String,
    pub url: String,
    pub site_type: SiteType,
    #[serde(default)]
    pub description: Option<String>,
    pub endpoint_health: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: i32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: i32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default = "default_threshold_response_ms")]
    pub threshold_response_ms: i32,
    #[serde(default = "default_threshold_error_rate")]
    pub threshold_error_rate: f64,
    #[serde(default = "default_threshold_uptime")]
    pub threshold_uptime: f64,
}

impl NewSite {
    pub fn into_site(self, now: DateTime<Utc>) -> Site {
        Site {
            id: Uuid::new_v4(),
            name: self.name,
            url: self.url,
            site_type: self.site_type,
            description: self.description,
            is_active: self.is_active,
            check_interval_secs: self.check_interval_secs,
            timeout_secs: self.timeout_secs,
            endpoint_health: self.endpoint_health,
            api_key: self.api_key,
            contact_email: self.contact_email,
            contact_phone: self.contact_phone,
            threshold_response_ms: self.threshold_response_ms,
            threshold_error_rate: self.threshold_error_rate,
            threshold_uptime: self.threshold_uptime,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Partial edit of a registered site. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub site_type: Option<SiteType>,
    pub description: Option<String>,
    pub endpoint_health: Option<String>,
    pub is_active: Option<bool>,
    pub check_interval_secs: Option<i32>,
    pub timeout_secs: Option<i32>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub threshold_response_ms: Option<i32>,
    pub threshold_error_rate: Option<f64>,
    pub threshold_uptime: Option<f64>,
}

impl SiteUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.site_type.is_none()
            && self.description.is_none()
            && self.endpoint_health.is_none()
            && self.is_active.is_none()
            && self.check_interval_secs.is_none()
            && self.timeout_secs.is_none()
            && self.contact_email.is_none()
            && self.contact_phone.is_none()
            && self.threshold_response_ms.is_none()
            && self.threshold_error_rate.is_none()
            && self.threshold_uptime.is_none()
    }

    pub fn apply(self, site: &mut Site, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            site.name = name;
        }
        if let Some(url) = self.url {
            site.url = url;
        }
        if let Some(site_type) = self.site_type {
            site.site_type = site_type;
        }
        if self.description.is_some() {
            site.description = self.description;
        }
        if let Some(endpoint_health) = self.endpoint_health {
            site.endpoint_health = endpoint_health;
        }
        if let Some(is_active) = self.is_active {
            site.is_active = is_active;
        }
        if let Some(secs) = self.check_interval_secs {
            site.check_interval_secs = secs;
        }
        if let Some(secs) = self.timeout_secs {
            site.timeout_secs = secs;
        }
        if self.contact_email.is_some() {
            site.contact_email = self.contact_email;
        }
        if self.contact_phone.is_some() {
            site.contact_phone = self.contact_phone;
        }
        if let Some(ms) = self.threshold_response_ms {
            site.threshold_response_ms = ms;
        }
        if let Some(rate) = self.threshold_error_rate {
            site.threshold_error_rate = rate;
        }
        if let Some(uptime) = self.threshold_uptime {
            site.threshold_uptime = uptime;
        }
        site.updated_at = now;
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// An active brokerage site with default thresholds.
    pub fn site(name: &str, endpoint_health: &str) -> Site {
        NewSite {
            name: name.to_string(),
            url: format!("https://{}.example", name.to_lowercase().replace(' ', "-")),
            site_type: SiteType::Brokerage,
            description: None,
            endpoint_health: endpoint_health.to_string(),
            is_active: true,
            check_interval_secs: default_check_interval(),
            timeout_secs: default_timeout(),
            api_key: None,
            contact_email: None,
            contact_phone: None,
            threshold_response_ms: default_threshold_response_ms(),
            threshold_error_rate: default_threshold_error_rate(),
            threshold_uptime: default_threshold_uptime(),
        }
        .into_site(Utc::now())
    }
}
