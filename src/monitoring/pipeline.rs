//! Probe sweep: check → record → detect → apply, per site.
//!
//! Probes for different sites run concurrently up to a fixed limit. The
//! read-then-write sequence for one site runs under that site's lock so two
//! overlapping checks cannot both open the same alert.

use dashmap::DashMap;
use futures::{StreamExt, stream};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::detector::detect;
use super::prober::Prober;
use super::recorder::CheckRecorder;
use crate::alerting::lifecycle::AlertLifecycleManager;
use crate::db::enums::AlertType;
use crate::db::models::{AlertIntent, CheckResult, Site};
use crate::db::repository::{AlertRepository, RepoResult, SiteRepository};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub sites: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct MonitoringPipeline {
    sites: Arc<dyn SiteRepository>,
    alerts: Arc<dyn AlertRepository>,
    recorder: CheckRecorder,
    prober: Prober,
    lifecycle: Arc<AlertLifecycleManager>,
    site_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    concurrency: usize,
}

impl MonitoringPipeline {
    pub fn new(
        sites: Arc<dyn SiteRepository>,
        alerts: Arc<dyn AlertRepository>,
        recorder: CheckRecorder,
        prober: Prober,
        lifecycle: Arc<AlertLifecycleManager>,
        concurrency: usize,
    ) -> Self {
        Self {
            sites,
            alerts,
            recorder,
            prober,
            lifecycle,
            site_locks: DashMap::new(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    fn lock_for(&self, site_id: Uuid) -> Arc<Mutex<()>> {
        self.site_locks
            .entry(site_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs the full pipeline for one site and returns the recorded check.
    pub async fn check_site(&self, site: &Site) -> RepoResult<CheckResult> {
        let lock = self.lock_for(site.id);
        let _guard = lock.lock().await;

        let previous = self.recorder.latest(site.id).await?;
        let current = self.prober.probe(site).await;
        self.recorder.record(&current).await?;

        let open_types: HashSet<AlertType> = self
            .alerts
            .list_open(Some(site.id))
            .await?
            .into_iter()
            .map(|a| a.alert_type)
            .collect();

        for intent in detect(site, previous.as_ref(), &current, &open_types) {
            debug!(site_id = %site.id, intent = ?intent, "Applying alert intent.");
            match intent {
                AlertIntent::Open {
                    alert_type,
                    severity,
                    title,
                    message,
                } => {
                    self.lifecycle
                        .open(site, alert_type, severity, title, message)
                        .await?;
                }
                AlertIntent::Close { alert_type } => {
                    self.lifecycle.close(site, alert_type).await?;
                }
            }
        }
        Ok(current)
    }

    /// Probes every active site. A failing site is logged and does not stop
    /// the others; the sweep returns once all of them are done.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> RepoResult<SweepSummary> {
        let sites = self.sites.list_active().await?;
        info!(sites = sites.len(), "Starting probe sweep.");

        let outcomes: Vec<bool> = stream::iter(sites.iter())
            .map(|site| async move {
                match self.check_site(site).await {
                    Ok(check) => {
                        debug!(site_id = %site.id, status = ?check.status, "Site checked.");
                        true
                    }
                    Err(e) => {
                        error!(site_id = %site.id, error = %e, "Site check failed.");
                        false
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .boxed()
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let summary = SweepSummary {
            sites: sites.len(),
            succeeded,
            failed: sites.len() - succeeded,
        };
        info!(
            sites = summary.sites,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Probe sweep finished."
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::lifecycle::LifecycleSettings;
    use crate::db::enums::{HealthStatus, Severity};
    use crate::db::memory::{MemoryAlertRepository, MemoryCheckRepository, MemorySiteRepository};
    use crate::db::models::fixtures;
    use crate::db::repository::CheckRepository;
    use crate::notifications::testing::{RecordingNotifier, Sent};
    use crate::scheduler::clock::{Clock, ManualClock};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicU16, Ordering};

    /// A health endpoint whose HTTP status the test can flip.
    async fn spawn_switchable() -> (String, Arc<AtomicU16>) {
        let status = Arc::new(AtomicU16::new(200));
        let shared = status.clone();
        let app = Router::new().route(
            "/health",
            get(move || {
                let shared = shared.clone();
                async move {
                    let code = StatusCode::from_u16(shared.load(Ordering::SeqCst))
                        .unwrap_or(StatusCode::OK);
                    (code, Json(json!({ "status": "ok" })))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/health"), status)
    }

    struct Harness {
        pipeline: MonitoringPipeline,
        sites: Arc<MemorySiteRepository>,
        alerts: Arc<MemoryAlertRepository>,
        checks: Arc<MemoryCheckRepository>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sites = Arc::new(MemorySiteRepository::new());
        let alerts = Arc::new(MemoryAlertRepository::new());
        let checks = Arc::new(MemoryCheckRepository::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let lifecycle = Arc::new(AlertLifecycleManager::new(
            alerts.clone(),
            sites.clone(),
            checks.clone(),
            notifier.clone(),
            clock.clone(),
            LifecycleSettings::default(),
        ));
        let pipeline = MonitoringPipeline::new(
            sites.clone(),
            alerts.clone(),
            CheckRecorder::new(checks.clone(), clock.clone()),
            Prober::new(clock.clone()).unwrap(),
            lifecycle,
            4,
        );
        Harness {
            pipeline,
            sites,
            alerts,
            checks,
            notifier,
            clock,
        }
    }

    async fn seed_check(h: &Harness, site: &Site, status: HealthStatus) {
        let check = CheckResult::new(site.id, status, h.clock.now() - Duration::minutes(5));
        h.checks.insert(&check).await.unwrap();
    }

    #[tokio::test]
    async fn online_to_offline_opens_one_critical_alert() {
        let h = harness();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}/health", listener.local_addr().unwrap());
        drop(listener);
        let site = fixtures::site("Broker", &dead);
        h.sites.put(site.clone()).await;
        seed_check(&h, &site, HealthStatus::Online).await;

        let check = h.pipeline.check_site(&site).await.unwrap();
        assert_eq!(check.status, HealthStatus::Offline);

        let alerts = h.alerts.all().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Offline);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(alerts[0].email_sent);
        assert_eq!(h.notifier.count(Sent::Critical), 1);

        // Offline again: previous is offline now, nothing new opens.
        h.pipeline.check_site(&site).await.unwrap();
        assert_eq!(h.alerts.all().await.len(), 1);
    }

    #[tokio::test]
    async fn recovery_resolves_open_offline_alert() {
        let h = harness();
        let (url, _) = spawn_switchable().await;
        let site = fixtures::site("Broker", &url);
        h.sites.put(site.clone()).await;
        seed_check(&h, &site, HealthStatus::Offline).await;
        let open = h
            .alerts
            .insert(crate::db::models::Alert::new_open(
                site.id,
                AlertType::Offline,
                Severity::Critical,
                "down".into(),
                "down".into(),
                h.clock.now() - Duration::minutes(10),
            ))
            .await
            .unwrap();

        let check = h.pipeline.check_site(&site).await.unwrap();
        assert_eq!(check.status, HealthStatus::Online);

        let alerts = h.alerts.all().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, open.id);
        assert!(alerts[0].resolved);
        assert!(alerts[0].resolved_at.is_some());
        assert_eq!(h.notifier.count(Sent::Recovery), 1);
    }

    #[tokio::test]
    async fn recovery_through_an_error_check_still_resolves_offline_alert() {
        let h = harness();
        let (url, status) = spawn_switchable().await;
        let site = fixtures::site("Broker", &url);
        h.sites.put(site.clone()).await;
        seed_check(&h, &site, HealthStatus::Offline).await;
        let open = h
            .alerts
            .insert(crate::db::models::Alert::new_open(
                site.id,
                AlertType::Offline,
                Severity::Critical,
                "down".into(),
                "down".into(),
                h.clock.now() - Duration::minutes(10),
            ))
            .await
            .unwrap();

        status.store(500, Ordering::SeqCst);
        let check = h.pipeline.check_site(&site).await.unwrap();
        assert_eq!(check.status, HealthStatus::Error);
        assert!(!h.alerts.get_by_id(open.id).await.unwrap().unwrap().resolved);

        status.store(200, Ordering::SeqCst);
        h.clock.advance(Duration::minutes(5));
        let check = h.pipeline.check_site(&site).await.unwrap();
        assert_eq!(check.status, HealthStatus::Online);

        let resolved = h.alerts.get_by_id(open.id).await.unwrap().unwrap();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(h.notifier.count(Sent::Recovery), 1);
    }

    #[tokio::test]
    async fn concurrent_checks_of_one_site_open_a_single_alert() {
        let h = harness();
        let (url, _) = spawn_switchable().await;
        let mut site = fixtures::site("Broker", &url);
        site.threshold_response_ms = -1;
        h.sites.put(site.clone()).await;

        let (a, b) = tokio::join!(h.pipeline.check_site(&site), h.pipeline.check_site(&site));
        a.unwrap();
        b.unwrap();

        let latency: Vec<_> = h
            .alerts
            .all()
            .await
            .into_iter()
            .filter(|a| a.alert_type == AlertType::HighLatency)
            .collect();
        assert_eq!(latency.len(), 1);
        assert_eq!(h.checks.len().await, 2);
    }

    #[tokio::test]
    async fn sweep_probes_every_active_site() {
        let h = harness();
        let (url, status) = spawn_switchable().await;
        let healthy = fixtures::site("Healthy", &url);
        let second = fixtures::site("Second", &url);
        let mut inactive = fixtures::site("Inactive", &url);
        inactive.is_active = false;
        for site in [&healthy, &second, &inactive] {
            h.sites.put(site.clone()).await;
        }

        let summary = h.pipeline.run_sweep().await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                sites: 2,
                succeeded: 2,
                failed: 0
            }
        );
        assert_eq!(h.checks.len().await, 2);

        status.store(500, Ordering::SeqCst);
        h.clock.advance(Duration::minutes(5));
        h.pipeline.run_sweep().await.unwrap();
        let latest = h.checks.latest(healthy.id).await.unwrap().unwrap();
        assert_eq!(latest.status, HealthStatus::Error);
        assert_eq!(latest.http_code, Some(500));
    }

    /// Check store that refuses writes for one site.
    struct RefusingChecks {
        inner: MemoryCheckRepository,
        refused: Uuid,
    }

    #[async_trait::async_trait]
    impl CheckRepository for RefusingChecks {
        async fn insert(&self, check: &CheckResult) -> RepoResult<()> {
            if check.site_id == self.refused {
                return Err(crate::error::RepositoryError::Unavailable("disk full".into()));
            }
            self.inner.insert(check).await
        }

        async fn latest(&self, site_id: Uuid) -> RepoResult<Option<CheckResult>> {
            self.inner.latest(site_id).await
        }

        async fn history(
            &self,
            site_id: Uuid,
            since: chrono::DateTime<Utc>,
            limit: Option<u64>,
        ) -> RepoResult<Vec<CheckResult>> {
            self.inner.history(site_id, since, limit).await
        }

        async fn purge_older_than(&self, cutoff: chrono::DateTime<Utc>) -> RepoResult<u64> {
            self.inner.purge_older_than(cutoff).await
        }
    }

    #[tokio::test]
    async fn sweep_isolates_a_failing_site() {
        let (url, _) = spawn_switchable().await;
        let good = fixtures::site("Good", &url);
        let bad = fixtures::site("Bad", &url);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sites = Arc::new(MemorySiteRepository::new());
        sites.put(good.clone()).await;
        sites.put(bad.clone()).await;
        let alerts = Arc::new(MemoryAlertRepository::new());
        let checks = Arc::new(RefusingChecks {
            inner: MemoryCheckRepository::new(),
            refused: bad.id,
        });
        let lifecycle = Arc::new(AlertLifecycleManager::new(
            alerts.clone(),
            sites.clone(),
            checks.clone(),
            Arc::new(RecordingNotifier::new()),
            clock.clone(),
            LifecycleSettings::default(),
        ));
        let pipeline = MonitoringPipeline::new(
            sites,
            alerts,
            CheckRecorder::new(checks.clone(), clock.clone()),
            Prober::new(clock).unwrap(),
            lifecycle,
            2,
        );

        let summary = pipeline.run_sweep().await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(checks.latest(good.id).await.unwrap().is_some());
        assert!(checks.latest(bad.id).await.unwrap().is_none());
    }
}
