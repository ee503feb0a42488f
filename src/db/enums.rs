use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "site_type_enum")]
#[serde(rename_all = "snake_case")]
pub enum SiteType {
    #[sea_orm(string_value = "brokerage")]
    Brokerage,
    #[sea_orm(string_value = "consortium")]
    Consortium,
    #[sea_orm(string_value = "insurance")]
    Insurance,
    #[sea_orm(string_value = "holding")]
    Holding,
    #[sea_orm(string_value = "community")]
    Community,
    #[sea_orm(string_value = "other")]
    Other,
}

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "health_status_enum")]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "offline")]
    Offline,
    #[sea_orm(string_value = "timeout")]
    Timeout,
    #[sea_orm(string_value = "error")]
    Error,
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

impl HealthStatus {
    /// `error` and `timeout` count as degraded in the status summary.
    pub fn is_degraded(self) -> bool {
        matches!(self, HealthStatus::Error | HealthStatus::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "component_status_enum")]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    #[sea_orm(string_value = "connected")]
    Connected,
    #[sea_orm(string_value = "disconnected")]
    Disconnected,
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

impl ComponentStatus {
    pub fn from_reported(value: Option<&str>) -> Self {
        match value {
            Some("connected") => ComponentStatus::Connected,
            Some("disconnected") => ComponentStatus::Disconnected,
            _ => ComponentStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "ssl_status_enum")]
#[serde(rename_all = "snake_case")]
pub enum SslStatus {
    #[sea_orm(string_value = "valid")]
    Valid,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "invalid")]
    Invalid,
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

impl SslStatus {
    pub fn from_reported(value: Option<&str>) -> Self {
        match value {
            Some("valid") => SslStatus::Valid,
            Some("expired") => SslStatus::Expired,
            Some("invalid") => SslStatus::Invalid,
            _ => SslStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "alert_type_enum")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    #[sea_orm(string_value = "offline")]
    Offline,
    #[sea_orm(string_value = "high_latency")]
    HighLatency,
    #[sea_orm(string_value = "high_error_rate")]
    HighErrorRate,
    #[sea_orm(string_value = "ssl")]
    Ssl,
    #[sea_orm(string_value = "quota")]
    Quota,
    #[sea_orm(string_value = "db_error")]
    DbError,
    #[sea_orm(string_value = "cache_error")]
    CacheError,
    #[sea_orm(string_value = "custom")]
    Custom,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

/// Alert severity. Variant order is the severity order, `Critical` highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "severity_enum")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "critical")]
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "notification_channel_enum")]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    #[sea_orm(string_value = "email")]
    Email,
    #[sea_orm(string_value = "whatsapp")]
    Whatsapp,
    #[sea_orm(string_value = "sms")]
    Sms,
    #[sea_orm(string_value = "push")]
    Push,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "notification_status_enum")]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "bounced")]
    Bounced,
    #[sea_orm(string_value = "read")]
    Read,
}
