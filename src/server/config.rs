use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::alerting::lifecycle::{LifecycleSettings, PendingAction};
use crate::db::enums::{AlertType, NotificationChannel};
use crate::db::models::NewSite;
use crate::notifications::models::{NotifierSettings, WebhookConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub database_url: Option<String>,
    pub listen_addr: String,
    pub log_dir: String,

    pub probe_interval_secs: u64,
    pub pending_interval_secs: u64,
    pub escalation_interval_secs: u64,
    pub retention_interval_secs: u64,

    pub escalation_threshold_mins: i64,
    pub retry_delay_mins: i64,
    pub probe_concurrency: usize,
    pub shutdown_grace_secs: u64,
    pub notification_timeout_secs: u64,
    pub check_retention_days: i64,

    pub alert_email: String,
    pub ops_email: String,
    pub alert_phone: Option<String>,
    pub dashboard_url: String,
    pub pending_policy: HashMap<AlertType, PendingAction>,

    pub email_endpoint: Option<String>,
    pub whatsapp_endpoint: Option<String>,
    pub sms_endpoint: Option<String>,
    pub push_endpoint: Option<String>,

    /// Sites registered at startup, skipping any already known.
    pub sites: Vec<NewSite>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialMonitorConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    probe_interval_secs: Option<u64>,
    pending_interval_secs: Option<u64>,
    escalation_interval_secs: Option<u64>,
    retention_interval_secs: Option<u64>,
    escalation_threshold_mins: Option<i64>,
    retry_delay_mins: Option<i64>,
    probe_concurrency: Option<usize>,
    shutdown_grace_secs: Option<u64>,
    notification_timeout_secs: Option<u64>,
    check_retention_days: Option<i64>,
    alert_email: Option<String>,
    ops_email: Option<String>,
    alert_phone: Option<String>,
    dashboard_url: Option<String>,
    /// `alert_type=action` pairs separated by commas, e.g. `high_latency=recheck`.
    pending_policy: Option<String>,
    email_endpoint: Option<String>,
    whatsapp_endpoint: Option<String>,
    sms_endpoint: Option<String>,
    push_endpoint: Option<String>,
    sites: Option<Vec<NewSite>>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_alert_email() -> String {
    "alerts@localhost".to_string()
}

fn default_dashboard_url() -> String {
    "http://localhost:3000".to_string()
}

fn parse_pending_policy(raw: &str) -> Result<HashMap<AlertType, PendingAction>, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        key: "pending_policy",
        message,
    };
    let mut policy = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (alert_type, action) = entry
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected alert_type=action, got '{entry}'")))?;
        let alert_type: AlertType =
            serde_json::from_value(serde_json::Value::String(alert_type.trim().to_string()))
                .map_err(|_| invalid(format!("unknown alert type '{}'", alert_type.trim())))?;
        let action: PendingAction =
            serde_json::from_value(serde_json::Value::String(action.trim().to_string()))
                .map_err(|_| invalid(format!("unknown action '{}'", action.trim())))?;
        policy.insert(alert_type, action);
    }
    Ok(policy)
}

fn positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

impl PartialMonitorConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl MonitorConfig {
    /// Optional TOML file, then environment (after `.env`), environment
    /// winning. `database_url` may be absent only for a dry run.
    pub fn load(config_path: Option<&str>, dry_run: bool) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path.map(Path::new) {
            Some(path) if path.exists() => PartialMonitorConfig::from_toml_file(path)?,
            _ => PartialMonitorConfig::default(),
        };

        // 2. Load from environment variables
        let env_config = envy::from_env::<PartialMonitorConfig>()?;

        // 3. Merge: environment overrides file
        Self::merge(env_config, file_config, dry_run)
    }

    pub fn merge(
        env: PartialMonitorConfig,
        file: PartialMonitorConfig,
        dry_run: bool,
    ) -> Result<Self, ConfigError> {
        let database_url = env.database_url.or(file.database_url);
        if database_url.is_none() && !dry_run {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        let alert_email = env
            .alert_email
            .or(file.alert_email)
            .unwrap_or_else(default_alert_email);
        let pending_policy = match env.pending_policy.or(file.pending_policy) {
            Some(raw) => parse_pending_policy(&raw)?,
            None => HashMap::new(),
        };

        Ok(MonitorConfig {
            database_url,
            listen_addr: env
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            probe_interval_secs: positive(
                "probe_interval_secs",
                env.probe_interval_secs.or(file.probe_interval_secs).unwrap_or(300),
            )?,
            pending_interval_secs: positive(
                "pending_interval_secs",
                env.pending_interval_secs.or(file.pending_interval_secs).unwrap_or(60),
            )?,
            escalation_interval_secs: positive(
                "escalation_interval_secs",
                env.escalation_interval_secs
                    .or(file.escalation_interval_secs)
                    .unwrap_or(1800),
            )?,
            retention_interval_secs: positive(
                "retention_interval_secs",
                env.retention_interval_secs
                    .or(file.retention_interval_secs)
                    .unwrap_or(86_400),
            )?,
            escalation_threshold_mins: env
                .escalation_threshold_mins
                .or(file.escalation_threshold_mins)
                .unwrap_or(30),
            retry_delay_mins: env.retry_delay_mins.or(file.retry_delay_mins).unwrap_or(5),
            probe_concurrency: env
                .probe_concurrency
                .or(file.probe_concurrency)
                .unwrap_or(16)
                .max(1),
            shutdown_grace_secs: env
                .shutdown_grace_secs
                .or(file.shutdown_grace_secs)
                .unwrap_or(30),
            notification_timeout_secs: positive(
                "notification_timeout_secs",
                env.notification_timeout_secs
                    .or(file.notification_timeout_secs)
                    .unwrap_or(10),
            )?,
            check_retention_days: env
                .check_retention_days
                .or(file.check_retention_days)
                .unwrap_or(30),
            ops_email: env
                .ops_email
                .or(file.ops_email)
                .unwrap_or_else(|| alert_email.clone()),
            alert_email,
            alert_phone: env.alert_phone.or(file.alert_phone),
            dashboard_url: env
                .dashboard_url
                .or(file.dashboard_url)
                .unwrap_or_else(default_dashboard_url),
            pending_policy,
            email_endpoint: env.email_endpoint.or(file.email_endpoint),
            whatsapp_endpoint: env.whatsapp_endpoint.or(file.whatsapp_endpoint),
            sms_endpoint: env.sms_endpoint.or(file.sms_endpoint),
            push_endpoint: env.push_endpoint.or(file.push_endpoint),
            sites: file.sites.unwrap_or_default(),
        })
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            escalation_threshold: ChronoDuration::minutes(self.escalation_threshold_mins),
            retry_delay: ChronoDuration::minutes(self.retry_delay_mins),
            pending_policy: self.pending_policy.clone(),
        }
    }

    pub fn notifier_settings(&self) -> NotifierSettings {
        let endpoints = [
            (NotificationChannel::Email, &self.email_endpoint),
            (NotificationChannel::Whatsapp, &self.whatsapp_endpoint),
            (NotificationChannel::Sms, &self.sms_endpoint),
            (NotificationChannel::Push, &self.push_endpoint),
        ]
        .into_iter()
        .filter_map(|(channel, url)| url.as_ref().map(|url| (channel, WebhookConfig::post(url))))
        .collect();

        NotifierSettings {
            alert_email: self.alert_email.clone(),
            ops_email: self.ops_email.clone(),
            alert_phone: self.alert_phone.clone(),
            dashboard_url: self.dashboard_url.clone(),
            endpoints,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Upper bound on one notification delivery request.
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn partial(toml_src: &str) -> PartialMonitorConfig {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = MonitorConfig::merge(
            PartialMonitorConfig::default(),
            PartialMonitorConfig::default(),
            true,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.probe_interval_secs, 300);
        assert_eq!(config.pending_interval_secs, 60);
        assert_eq!(config.escalation_interval_secs, 1800);
        assert_eq!(config.retention_interval_secs, 86_400);
        assert_eq!(config.escalation_threshold_mins, 30);
        assert_eq!(config.retry_delay_mins, 5);
        assert_eq!(config.probe_concurrency, 16);
        assert_eq!(config.check_retention_days, 30);
        assert_eq!(config.notification_timeout(), Duration::from_secs(10));
        assert_eq!(config.alert_email, "alerts@localhost");
        assert_eq!(config.ops_email, "alerts@localhost");
        assert!(config.pending_policy.is_empty());
        assert!(config.notifier_settings().endpoints.is_empty());
    }

    #[test]
    fn database_url_is_required_outside_dry_run() {
        let err = MonitorConfig::merge(
            PartialMonitorConfig::default(),
            PartialMonitorConfig::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn environment_overrides_file() {
        let file = partial(
            r#"
            database_url = "postgres://file/db"
            probe_interval_secs = 120
            alert_email = "file@example.com"
            "#,
        );
        let env = partial(
            r#"
            probe_interval_secs = 60
            "#,
        );

        let config = MonitorConfig::merge(env, file, false).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://file/db"));
        assert_eq!(config.probe_interval_secs, 60);
        assert_eq!(config.alert_email, "file@example.com");
        assert_eq!(config.ops_email, "file@example.com");
    }

    #[test]
    fn pending_policy_and_endpoints_are_parsed() {
        let file = partial(
            r#"
            pending_policy = "high_latency=recheck, custom=hold"
            email_endpoint = "http://relay.internal/mail"
            push_endpoint = "http://push.internal/send"
            "#,
        );
        let config = MonitorConfig::merge(PartialMonitorConfig::default(), file, true).unwrap();

        assert_eq!(
            config.pending_policy.get(&AlertType::HighLatency),
            Some(&PendingAction::Recheck)
        );
        assert_eq!(config.pending_policy.get(&AlertType::Custom), Some(&PendingAction::Hold));

        let settings = config.notifier_settings();
        assert_eq!(settings.endpoints.len(), 2);
        assert_eq!(
            settings.endpoints[&NotificationChannel::Email].url,
            "http://relay.internal/mail"
        );

        let lifecycle = config.lifecycle_settings();
        assert_eq!(lifecycle.escalation_threshold, ChronoDuration::minutes(30));
        assert_eq!(lifecycle.pending_policy.len(), 2);
    }

    #[test]
    fn bad_values_are_rejected() {
        let bad_policy = partial(r#"pending_policy = "offline=panic""#);
        assert!(matches!(
            MonitorConfig::merge(PartialMonitorConfig::default(), bad_policy, true),
            Err(ConfigError::Invalid { key: "pending_policy", .. })
        ));

        let zero_interval = partial("probe_interval_secs = 0");
        assert!(matches!(
            MonitorConfig::merge(PartialMonitorConfig::default(), zero_interval, true),
            Err(ConfigError::Invalid { key: "probe_interval_secs", .. })
        ));

        let zero_timeout = partial("notification_timeout_secs = 0");
        assert!(matches!(
            MonitorConfig::merge(PartialMonitorConfig::default(), zero_timeout, true),
            Err(ConfigError::Invalid { key: "notification_timeout_secs", .. })
        ));
    }

    #[test]
    fn toml_file_is_read_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr = \"127.0.0.1:9000\"").unwrap();

        let partial = PartialMonitorConfig::from_toml_file(file.path()).unwrap();
        let config = MonitorConfig::merge(PartialMonitorConfig::default(), partial, true).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
    }

    #[test]
    fn seed_sites_come_from_the_file() {
        let file = partial(
            r#"
            [[sites]]
            name = "Broker"
            url = "https://broker.example"
            site_type = "brokerage"
            endpoint_health = "https://broker.example/health"
            timeout_secs = 10
            "#,
        );
        let config = MonitorConfig::merge(PartialMonitorConfig::default(), file, true).unwrap();

        assert_eq!(config.sites.len(), 1);
        assert_eq!(config.sites[0].timeout_secs, 10);
        assert_eq!(config.sites[0].threshold_response_ms, 5000);
    }
}
