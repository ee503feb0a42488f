//! Operations exposed to the admin API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::alerting::lifecycle::AlertLifecycleManager;
use crate::alerting::report::{AlertReport, ReportPeriod};
use crate::db::enums::HealthStatus;
use crate::db::models::{Alert, CheckResult, NewSite, Site, SiteUpdate};
use crate::db::repository::{AlertRepository, SiteRepository};
use crate::error::{CoreError, RepositoryError};
use crate::monitoring::pipeline::MonitoringPipeline;
use crate::monitoring::recorder::{CheckRecorder, SiteMetrics};
use crate::scheduler::clock::Clock;

/// Current state of one site, from its latest check.
#[derive(Debug, Clone, Serialize)]
pub struct SiteStatus {
    pub site_id: Uuid,
    pub name: String,
    pub url: String,
    pub status: HealthStatus,
    pub response_time_ms: Option<i32>,
    pub error_rate: Option<f64>,
    pub uptime_24h: f64,
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteStatusSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub degraded: usize,
    pub sites: Vec<SiteStatus>,
}

impl SiteStatusSummary {
    fn from_statuses(sites: Vec<SiteStatus>) -> Self {
        let count = |pred: fn(HealthStatus) -> bool| sites.iter().filter(|s| pred(s.status)).count();
        Self {
            total: sites.len(),
            online: count(|s| s == HealthStatus::Online),
            offline: count(|s| s == HealthStatus::Offline),
            degraded: count(HealthStatus::is_degraded),
            sites,
        }
    }
}

/// Unique-constraint collisions on the sites table surface as duplicates.
fn duplicate_on_conflict(err: RepositoryError) -> CoreError {
    match err {
        RepositoryError::Conflict(detail) => CoreError::DuplicateConfiguration(format!(
            "a site with this name or URL is already registered ({detail})"
        )),
        other => other.into(),
    }
}

#[derive(Clone)]
pub struct MonitorService {
    sites: Arc<dyn SiteRepository>,
    alerts: Arc<dyn AlertRepository>,
    recorder: CheckRecorder,
    pipeline: Arc<MonitoringPipeline>,
    lifecycle: Arc<AlertLifecycleManager>,
    clock: Arc<dyn Clock>,
}

impl MonitorService {
    pub fn new(
        sites: Arc<dyn SiteRepository>,
        alerts: Arc<dyn AlertRepository>,
        recorder: CheckRecorder,
        pipeline: Arc<MonitoringPipeline>,
        lifecycle: Arc<AlertLifecycleManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sites,
            alerts,
            recorder,
            pipeline,
            lifecycle,
            clock,
        }
    }

    pub async fn resolve_alert(&self, alert_id: Uuid, resolver: Option<String>) -> Result<(), CoreError> {
        self.lifecycle.resolve(alert_id, resolver).await
    }

    pub async fn get_active_alerts(&self, site_id: Option<Uuid>) -> Result<Vec<Alert>, CoreError> {
        Ok(self.alerts.list_open(site_id).await?)
    }

    pub async fn get_alert(&self, alert_id: Uuid) -> Result<Alert, CoreError> {
        self.alerts
            .get_by_id(alert_id)
            .await?
            .ok_or_else(|| CoreError::alert_not_found(alert_id))
    }

    pub async fn get_alert_history(
        &self,
        site_id: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Alert>, CoreError> {
        Ok(self.alerts.list_recent(site_id, limit).await?)
    }

    pub async fn get_report(&self, period: ReportPeriod) -> Result<AlertReport, CoreError> {
        Ok(self.lifecycle.report(period).await?)
    }

    /// Sites with no check yet are reported as `unknown`.
    pub async fn get_site_status_summary(&self) -> Result<SiteStatusSummary, CoreError> {
        let sites = self.sites.list_all().await?;
        let mut statuses = Vec::with_capacity(sites.len());
        for site in sites {
            let latest = self.recorder.latest(site.id).await?;
            let uptime_24h = self.recorder.uptime_percent(site.id, 24).await?;
            statuses.push(SiteStatus {
                site_id: site.id,
                name: site.name,
                url: site.url,
                status: latest.as_ref().map_or(HealthStatus::Unknown, |c| c.status),
                response_time_ms: latest.as_ref().and_then(|c| c.response_time_ms),
                error_rate: latest.as_ref().and_then(|c| c.error_rate),
                uptime_24h,
                checked_at: latest.map(|c| c.checked_at),
            });
        }
        Ok(SiteStatusSummary::from_statuses(statuses))
    }

    /// Probes the site right away. The result is returned, not recorded.
    pub async fn test_site_now(&self, site_id: Uuid) -> Result<CheckResult, CoreError> {
        let site = self.get_site(site_id).await?;
        Ok(self.pipeline.prober().probe(&site).await)
    }

    pub async fn get_site(&self, site_id: Uuid) -> Result<Site, CoreError> {
        self.sites
            .get_by_id(site_id)
            .await?
            .ok_or_else(|| CoreError::site_not_found(site_id))
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>, CoreError> {
        Ok(self.sites.list_all().await?)
    }

    pub async fn site_metrics(
        &self,
        site_id: Uuid,
        period: ReportPeriod,
    ) -> Result<SiteMetrics, CoreError> {
        self.get_site(site_id).await?;
        Ok(self.recorder.metrics(site_id, period).await?)
    }

    pub async fn site_history(
        &self,
        site_id: Uuid,
        window_hours: i64,
        limit: Option<u64>,
    ) -> Result<Vec<CheckResult>, CoreError> {
        self.get_site(site_id).await?;
        Ok(self.recorder.history(site_id, window_hours, limit).await?)
    }

    /// Registers a site. Name and URL must both be unused.
    #[instrument(skip(self, new_site), fields(name = %new_site.name))]
    pub async fn register_site(&self, new_site: NewSite) -> Result<Site, CoreError> {
        if let Some(existing) = self
            .sites
            .find_by_name_or_url(&new_site.name, &new_site.url)
            .await?
        {
            let field = if existing.name == new_site.name { "name" } else { "URL" };
            warn!(existing_id = %existing.id, field, "Site already registered.");
            return Err(CoreError::DuplicateConfiguration(format!(
                "a site with this {field} is already registered"
            )));
        }
        let site = self
            .sites
            .insert(new_site.into_site(self.clock.now()))
            .await
            .map_err(duplicate_on_conflict)?;
        info!(site_id = %site.id, url = %site.url, "Site registered.");
        Ok(site)
    }

    /// Applies a partial edit to a non-deleted site.
    #[instrument(skip(self, update))]
    pub async fn update_site(
        &self,
        site_id: Uuid,
        update: SiteUpdate,
        actor: &str,
    ) -> Result<Site, CoreError> {
        let mut site = self.get_site(site_id).await?;
        update.apply(&mut site, self.clock.now());
        let site = self.sites.update(site).await.map_err(duplicate_on_conflict)?;
        info!(site_id = %site.id, actor, is_active = site.is_active, "Site updated.");
        Ok(site)
    }

    /// Soft-deletes a site. It disappears from listings and probe sweeps;
    /// its history and alerts are kept.
    #[instrument(skip(self))]
    pub async fn delete_site(&self, site_id: Uuid, actor: &str) -> Result<(), CoreError> {
        if !self.sites.soft_delete(site_id, self.clock.now()).await? {
            return Err(CoreError::site_not_found(site_id));
        }
        info!(site_id = %site_id, actor, "Site deleted.");
        Ok(())
    }

    /// Deletes check results older than the retention window.
    pub async fn purge_expired_checks(&self, retention_days: i64) -> Result<u64, CoreError> {
        let removed = self.recorder.purge_expired(retention_days).await?;
        info!(removed, retention_days, "Expired checks purged.");
        Ok(removed)
    }
}
