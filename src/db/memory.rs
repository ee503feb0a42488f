//! In-memory repositories.
//!
//! Used by the test suite and by `--dry-run`, where the server monitors a
//! fleet described in the config file without a database. Each write takes
//! the store's write lock, so conditional updates are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::enums::{AlertType, NotificationChannel, Severity};
use super::models::{Alert, CheckResult, Notification, Site};
use super::repository::{
    AlertRepository, CheckRepository, NotificationLog, RepoResult, SiteRepository,
};
use crate::error::RepositoryError;

#[derive(Default)]
pub struct MemorySiteRepository {
    sites: RwLock<HashMap<Uuid, Site>>,
}

impl MemorySiteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, site: Site) {
        self.sites.write().await.insert(site.id, site);
    }
}

#[async_trait]
impl SiteRepository for MemorySiteRepository {
    async fn list_active(&self) -> RepoResult<Vec<Site>> {
        let mut sites: Vec<Site> = self
            .sites
            .read()
            .await
            .values()
            .filter(|s| s.is_schedulable())
            .cloned()
            .collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    async fn list_all(&self) -> RepoResult<Vec<Site>> {
        let mut sites: Vec<Site> = self
            .sites
            .read()
            .await
            .values()
            .filter(|s| !s.is_deleted())
            .cloned()
            .collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    async fn get_by_id(&self, id: Uuid) -> RepoResult<Option<Site>> {
        Ok(self
            .sites
            .read()
            .await
            .get(&id)
            .filter(|s| !s.is_deleted())
            .cloned())
    }

    async fn get_by_id_including_inactive(&self, id: Uuid) -> RepoResult<Option<Site>> {
        Ok(self.sites.read().await.get(&id).cloned())
    }

    async fn find_by_name_or_url(&self, name: &str, url: &str) -> RepoResult<Option<Site>> {
        Ok(self
            .sites
            .read()
            .await
            .values()
            .find(|s| s.name == name || s.url == url)
            .cloned())
    }

    async fn insert(&self, site: Site) -> RepoResult<Site> {
        let mut sites = self.sites.write().await;
        if let Some(taken) = clash(&sites, &site) {
            return Err(RepositoryError::Conflict(taken.to_string()));
        }
        sites.insert(site.id, site.clone());
        Ok(site)
    }

    async fn update(&self, site: Site) -> RepoResult<Site> {
        let mut sites = self.sites.write().await;
        if !sites.contains_key(&site.id) {
            return Err(RepositoryError::Database(DbErr::RecordNotUpdated));
        }
        if let Some(taken) = clash(&sites, &site) {
            return Err(RepositoryError::Conflict(taken.to_string()));
        }
        sites.insert(site.id, site.clone());
        Ok(site)
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<bool> {
        let mut sites = self.sites.write().await;
        match sites.get_mut(&id) {
            Some(site) if !site.is_deleted() => {
                site.deleted_at = Some(at);
                site.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// The unique column another site already holds, mirroring `UNIQUE(name)`
/// and `UNIQUE(url)`.
fn clash(sites: &HashMap<Uuid, Site>, site: &Site) -> Option<&'static str> {
    sites
        .values()
        .filter(|other| other.id != site.id)
        .find_map(|other| {
            if other.name == site.name {
                Some("sites.name")
            } else if other.url == site.url {
                Some("sites.url")
            } else {
                None
            }
        })
}

#[derive(Default)]
pub struct MemoryCheckRepository {
    checks: RwLock<Vec<CheckResult>>,
}

impl MemoryCheckRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checks.read().await.len()
    }
}

#[async_trait]
impl CheckRepository for MemoryCheckRepository {
    async fn insert(&self, check: &CheckResult) -> RepoResult<()> {
        self.checks.write().await.push(check.clone());
        Ok(())
    }

    async fn latest(&self, site_id: Uuid) -> RepoResult<Option<CheckResult>> {
        Ok(self
            .checks
            .read()
            .await
            .iter()
            .filter(|c| c.site_id == site_id)
            .max_by_key(|c| c.checked_at)
            .cloned())
    }

    async fn history(
        &self,
        site_id: Uuid,
        since: DateTime<Utc>,
        limit: Option<u64>,
    ) -> RepoResult<Vec<CheckResult>> {
        let mut checks: Vec<CheckResult> = self
            .checks
            .read()
            .await
            .iter()
            .filter(|c| c.site_id == site_id && c.checked_at >= since)
            .cloned()
            .collect();
        checks.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        if let Some(limit) = limit {
            checks.truncate(limit as usize);
        }
        Ok(checks)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let mut checks = self.checks.write().await;
        let before = checks.len();
        checks.retain(|c| c.checked_at >= cutoff);
        Ok((before - checks.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryAlertRepository {
    alerts: RwLock<HashMap<Uuid, Alert>>,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.alerts.read().await.values().cloned().collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }
}

fn newest_first(mut alerts: Vec<Alert>) -> Vec<Alert> {
    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    alerts
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn insert(&self, alert: Alert) -> RepoResult<Alert> {
        self.alerts.write().await.insert(alert.id, alert.clone());
        Ok(alert)
    }

    async fn insert_if_no_open(&self, alert: Alert) -> RepoResult<Option<Alert>> {
        let mut alerts = self.alerts.write().await;
        let exists = alerts
            .values()
            .any(|a| a.is_open() && a.site_id == alert.site_id && a.alert_type == alert.alert_type);
        if exists {
            return Ok(None);
        }
        alerts.insert(alert.id, alert.clone());
        Ok(Some(alert))
    }

    async fn get_by_id(&self, id: Uuid) -> RepoResult<Option<Alert>> {
        Ok(self.alerts.read().await.get(&id).cloned())
    }

    async fn find_open_by_type_and_site(
        &self,
        site_id: Uuid,
        alert_type: AlertType,
    ) -> RepoResult<Option<Alert>> {
        Ok(self
            .alerts
            .read()
            .await
            .values()
            .find(|a| a.is_open() && a.site_id == site_id && a.alert_type == alert_type)
            .cloned())
    }

    async fn find_pending_for_processing(&self, now: DateTime<Utc>) -> RepoResult<Vec<Alert>> {
        let alerts = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| {
                a.is_open() && !a.email_sent && a.next_retry_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        Ok(newest_first(alerts))
    }

    async fn find_open_critical_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<Vec<Alert>> {
        let alerts = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| a.is_open() && a.severity == Severity::Critical && a.created_at < cutoff)
            .cloned()
            .collect();
        Ok(newest_first(alerts))
    }

    async fn list_open(&self, site_id: Option<Uuid>) -> RepoResult<Vec<Alert>> {
        let alerts = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| a.is_open() && site_id.is_none_or(|id| a.site_id == id))
            .cloned()
            .collect();
        Ok(newest_first(alerts))
    }

    async fn list_recent(&self, site_id: Option<Uuid>, limit: u64) -> RepoResult<Vec<Alert>> {
        let alerts = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| site_id.is_none_or(|id| a.site_id == id))
            .cloned()
            .collect();
        let mut alerts = newest_first(alerts);
        alerts.truncate(limit as usize);
        Ok(alerts)
    }

    async fn list_created_since(&self, since: DateTime<Utc>) -> RepoResult<Vec<Alert>> {
        let alerts = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect();
        Ok(newest_first(alerts))
    }

    async fn mark_resolved(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
        resolved_by: Option<String>,
    ) -> RepoResult<bool> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(&id) {
            Some(alert) if alert.is_open() => {
                alert.resolved = true;
                alert.resolved_at = Some(resolved_at);
                alert.resolved_by = resolved_by;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_critical_dispatch(&self, id: Uuid) -> RepoResult<bool> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(&id) {
            Some(alert) if alert.is_open() && !alert.email_sent => {
                alert.email_sent = true;
                alert.whatsapp_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_critical_dispatch(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        if let Some(alert) = self.alerts.write().await.get_mut(&id) {
            alert.email_sent = false;
            alert.whatsapp_sent = false;
            alert.notification_attempts += 1;
            alert.next_retry_at = Some(next_retry_at);
        }
        Ok(())
    }

    async fn claim_retry(
        &self,
        id: Uuid,
        expected_attempts: i32,
        next_retry_at: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(&id) {
            Some(alert) if alert.is_open() && alert.notification_attempts == expected_attempts => {
                alert.notification_attempts = expected_attempts + 1;
                alert.next_retry_at = Some(next_retry_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_channel_sent(&self, id: Uuid, channel: NotificationChannel) -> RepoResult<()> {
        if let Some(alert) = self.alerts.write().await.get_mut(&id) {
            alert.set_channel_sent(channel, true);
        }
        Ok(())
    }

    async fn increment_attempts(&self, id: Uuid) -> RepoResult<()> {
        if let Some(alert) = self.alerts.write().await.get_mut(&id) {
            alert.notification_attempts += 1;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryNotificationLog {
    rows: RwLock<Vec<Notification>>,
}

impl MemoryNotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Notification> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl NotificationLog for MemoryNotificationLog {
    async fn record(&self, notification: Notification) -> RepoResult<()> {
        self.rows.write().await.push(notification);
        Ok(())
    }

    async fn list_for_alert(&self, alert_id: Uuid) -> RepoResult<Vec<Notification>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|n| n.alert_id == alert_id)
            .cloned()
            .collect())
    }
}
