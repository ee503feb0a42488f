//! Wiring: repositories, services and the recurring sweeps.

pub mod config;
pub mod core_services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::alerting::lifecycle::AlertLifecycleManager;
use crate::db::memory::{
    MemoryAlertRepository, MemoryCheckRepository, MemoryNotificationLog, MemorySiteRepository,
};
use crate::db::models::NewSite;
use crate::db::repository::{AlertRepository, CheckRepository, NotificationLog, SiteRepository};
use crate::db::services::{PgAlertRepository, PgCheckRepository, PgNotificationLog, PgSiteRepository};
use crate::error::CoreError;
use crate::monitoring::pipeline::MonitoringPipeline;
use crate::monitoring::prober::Prober;
use crate::monitoring::recorder::CheckRecorder;
use crate::notifications::senders::webhook::WebhookSender;
use crate::notifications::templates::NotificationTemplates;
use crate::notifications::{NotificationService, Notifier};
use crate::scheduler::Scheduler;
use crate::scheduler::clock::Clock;
use config::MonitorConfig;
use core_services::MonitorService;

pub const PROBE_TASK: &str = "probe";
pub const PENDING_TASK: &str = "pending";
pub const ESCALATION_TASK: &str = "escalation";
pub const RETENTION_TASK: &str = "retention";

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Failed to compile notification templates: {0}")]
    Templates(#[from] tera::Error),
}

#[derive(Clone)]
pub struct Repositories {
    pub sites: Arc<dyn SiteRepository>,
    pub checks: Arc<dyn CheckRepository>,
    pub alerts: Arc<dyn AlertRepository>,
    pub notifications: Arc<dyn NotificationLog>,
}

impl Repositories {
    pub fn postgres(db: DatabaseConnection) -> Self {
        Self {
            sites: Arc::new(PgSiteRepository::new(db.clone())),
            checks: Arc::new(PgCheckRepository::new(db.clone())),
            alerts: Arc::new(PgAlertRepository::new(db.clone())),
            notifications: Arc::new(PgNotificationLog::new(db)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            sites: Arc::new(MemorySiteRepository::new()),
            checks: Arc::new(MemoryCheckRepository::new()),
            alerts: Arc::new(MemoryAlertRepository::new()),
            notifications: Arc::new(MemoryNotificationLog::new()),
        }
    }
}

pub struct MonitorRuntime {
    pub monitor: Arc<MonitorService>,
    pub pipeline: Arc<MonitoringPipeline>,
    pub lifecycle: Arc<AlertLifecycleManager>,
    pub clock: Arc<dyn Clock>,
    check_retention_days: i64,
}

impl MonitorRuntime {
    /// Builds the runtime with webhook delivery for the configured channels.
    pub fn build(
        config: &MonitorConfig,
        repos: Repositories,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StartupError> {
        let templates =
            NotificationTemplates::new(config.dashboard_url.clone(), config.escalation_threshold_mins)?;
        let notifier = Arc::new(NotificationService::new(
            config.notifier_settings(),
            templates,
            Arc::new(WebhookSender::new(config.notification_timeout())?),
            repos.notifications.clone(),
            clock.clone(),
        ));
        Self::with_notifier(config, repos, notifier, clock)
    }

    pub fn with_notifier(
        config: &MonitorConfig,
        repos: Repositories,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StartupError> {
        let recorder = CheckRecorder::new(repos.checks.clone(), clock.clone());
        let lifecycle = Arc::new(AlertLifecycleManager::new(
            repos.alerts.clone(),
            repos.sites.clone(),
            repos.checks.clone(),
            notifier,
            clock.clone(),
            config.lifecycle_settings(),
        ));
        let pipeline = Arc::new(MonitoringPipeline::new(
            repos.sites.clone(),
            repos.alerts.clone(),
            recorder.clone(),
            Prober::new(clock.clone())?,
            lifecycle.clone(),
            config.probe_concurrency,
        ));
        let monitor = Arc::new(MonitorService::new(
            repos.sites,
            repos.alerts,
            recorder,
            pipeline.clone(),
            lifecycle.clone(),
            clock.clone(),
        ));
        Ok(Self {
            monitor,
            pipeline,
            lifecycle,
            clock,
            check_retention_days: config.check_retention_days,
        })
    }

    /// Registers the configured sites, leaving already known ones alone.
    pub async fn seed_sites(&self, sites: Vec<NewSite>) -> Result<usize, CoreError> {
        let mut added = 0;
        for site in sites {
            let name = site.name.clone();
            match self.monitor.register_site(site).await {
                Ok(_) => added += 1,
                Err(CoreError::DuplicateConfiguration(_)) => {
                    info!(name = %name, "Configured site already registered.");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// The four recurring sweeps. Errors are logged; the next tick retries.
    pub fn scheduler(&self, config: &MonitorConfig) -> Scheduler {
        let mut scheduler = Scheduler::new();

        let pipeline = self.pipeline.clone();
        scheduler.every(PROBE_TASK, Duration::from_secs(config.probe_interval_secs), move || {
            let pipeline = pipeline.clone();
            async move {
                match pipeline.run_sweep().await {
                    Ok(summary) => debug!(
                        sites = summary.sites,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        "Probe task done."
                    ),
                    Err(e) => error!(error = %e, "Probe sweep failed."),
                }
            }
        });

        let lifecycle = self.lifecycle.clone();
        let clock = self.clock.clone();
        scheduler.every(PENDING_TASK, Duration::from_secs(config.pending_interval_secs), move || {
            let (lifecycle, clock) = (lifecycle.clone(), clock.clone());
            async move {
                match lifecycle.process_pending(clock.now()).await {
                    Ok(summary) => debug!(
                        critical_dispatched = summary.critical_dispatched,
                        notified = summary.notified,
                        auto_resolved = summary.auto_resolved,
                        held = summary.held,
                        failed = summary.failed,
                        "Pending task done."
                    ),
                    Err(e) => error!(error = %e, "Pending sweep failed."),
                }
            }
        });

        let lifecycle = self.lifecycle.clone();
        let clock = self.clock.clone();
        scheduler.every(
            ESCALATION_TASK,
            Duration::from_secs(config.escalation_interval_secs),
            move || {
                let (lifecycle, clock) = (lifecycle.clone(), clock.clone());
                async move {
                    match lifecycle.escalate(clock.now()).await {
                        Ok(escalated) => debug!(escalated, "Escalation task done."),
                        Err(e) => error!(error = %e, "Escalation sweep failed."),
                    }
                }
            },
        );

        let monitor = self.monitor.clone();
        let retention_days = self.check_retention_days;
        scheduler.every(
            RETENTION_TASK,
            Duration::from_secs(config.retention_interval_secs),
            move || {
                let monitor = monitor.clone();
                async move {
                    if retention_days <= 0 {
                        warn!(retention_days, "Check retention disabled, nothing purged.");
                        return;
                    }
                    if let Err(e) = monitor.purge_expired_checks(retention_days).await {
                        error!(error = %e, "Retention sweep failed.");
                    }
                }
            },
        );

        scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AlertType, HealthStatus, Severity};
    use crate::db::models::{Alert, CheckResult};
    use crate::notifications::testing::{RecordingNotifier, Sent};
    use crate::scheduler::clock::ManualClock;
    use chrono::Utc;
    use config::PartialMonitorConfig;

    fn dry_run_config() -> MonitorConfig {
        MonitorConfig::merge(
            PartialMonitorConfig::default(),
            PartialMonitorConfig::default(),
            true,
        )
        .unwrap()
    }

    fn seed(name: &str, endpoint: &str) -> NewSite {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "url": format!("https://{}.example", name.to_lowercase()),
            "site_type": "holding",
            "endpoint_health": endpoint,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn seeding_skips_known_sites() {
        let config = dry_run_config();
        let runtime = MonitorRuntime::build(
            &config,
            Repositories::in_memory(),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .unwrap();

        let first = runtime
            .seed_sites(vec![seed("Alpha", "http://127.0.0.1:1/health"), seed("Beta", "http://127.0.0.1:1/health")])
            .await
            .unwrap();
        assert_eq!(first, 2);

        let again = runtime
            .seed_sites(vec![seed("Alpha", "http://127.0.0.1:1/health")])
            .await
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(runtime.monitor.list_sites().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn scheduled_sweeps_drive_the_alert_lifecycle() {
        let config = dry_run_config();
        let repos = Repositories::in_memory();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let notifier = Arc::new(RecordingNotifier::new());
        let runtime =
            MonitorRuntime::with_notifier(&config, repos.clone(), notifier.clone(), clock.clone())
                .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}/health", listener.local_addr().unwrap());
        drop(listener);
        runtime.seed_sites(vec![seed("Gamma", &dead)]).await.unwrap();
        let site = runtime.monitor.list_sites().await.unwrap().remove(0);
        repos
            .checks
            .insert(&CheckResult::new(site.id, HealthStatus::Online, clock.now()))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(5));

        let handle = runtime.scheduler(&config).without_initial_run().start(Duration::from_secs(5));
        assert!(handle.run_now(PROBE_TASK).await.unwrap());

        let open: Vec<Alert> = runtime.monitor.get_active_alerts(Some(site.id)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].alert_type, AlertType::Offline);
        assert_eq!(open[0].severity, Severity::Critical);
        assert_eq!(notifier.count(Sent::Critical), 1);

        clock.advance(chrono::Duration::minutes(45));
        assert!(handle.run_now(ESCALATION_TASK).await.unwrap());
        assert_eq!(notifier.count(Sent::Escalation), 1);

        assert!(handle.run_now(RETENTION_TASK).await.unwrap());
        handle.shutdown().await;
    }
}
