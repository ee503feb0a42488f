//! Persistence seams consumed by the monitoring core.
//!
//! Every query the core needs is a named method with typed parameters, so the
//! SeaORM implementations in `services` and the in-memory ones in `memory`
//! are interchangeable. Alert mutations that can race between sweeps are
//! conditional updates returning whether this caller won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::enums::{AlertType, NotificationChannel};
use super::models::{Alert, CheckResult, Notification, Site};
use crate::error::RepositoryError;

pub type RepoResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// Active, non-deleted sites.
    async fn list_active(&self) -> RepoResult<Vec<Site>>;
    /// Non-deleted sites ordered by name.
    async fn list_all(&self) -> RepoResult<Vec<Site>>;
    /// Non-deleted site by id.
    async fn get_by_id(&self, id: Uuid) -> RepoResult<Option<Site>>;
    /// Any site by id, including inactive and soft-deleted ones.
    async fn get_by_id_including_inactive(&self, id: Uuid) -> RepoResult<Option<Site>>;
    async fn find_by_name_or_url(&self, name: &str, url: &str) -> RepoResult<Option<Site>>;
    /// Fails with `RepositoryError::Conflict` when the name or URL is taken.
    async fn insert(&self, site: Site) -> RepoResult<Site>;
    /// Writes every column of `site`. Same conflict rule as `insert`.
    async fn update(&self, site: Site) -> RepoResult<Site>;
    /// Sets `deleted_at` unless already set. Returns whether this call did.
    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<bool>;
}

#[async_trait]
pub trait CheckRepository: Send + Sync {
    async fn insert(&self, check: &CheckResult) -> RepoResult<()>;
    async fn latest(&self, site_id: Uuid) -> RepoResult<Option<CheckResult>>;
    /// Checks at or after `since`, newest first, optionally capped.
    async fn history(
        &self,
        site_id: Uuid,
        since: DateTime<Utc>,
        limit: Option<u64>,
    ) -> RepoResult<Vec<CheckResult>>;
    /// Deletes checks older than `cutoff`, returning the number removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> RepoResult<u64>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, alert: Alert) -> RepoResult<Alert>;
    /// Inserts `alert` unless an OPEN alert of the same type already exists for
    /// the site. Returns `None` when one does.
    async fn insert_if_no_open(&self, alert: Alert) -> RepoResult<Option<Alert>>;
    async fn get_by_id(&self, id: Uuid) -> RepoResult<Option<Alert>>;
    async fn find_open_by_type_and_site(
        &self,
        site_id: Uuid,
        alert_type: AlertType,
    ) -> RepoResult<Option<Alert>>;
    /// OPEN alerts with `next_retry_at <= now` and no email sent yet.
    async fn find_pending_for_processing(&self, now: DateTime<Utc>) -> RepoResult<Vec<Alert>>;
    /// OPEN critical alerts created before `cutoff`.
    async fn find_open_critical_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<Vec<Alert>>;
    /// OPEN alerts, newest first.
    async fn list_open(&self, site_id: Option<Uuid>) -> RepoResult<Vec<Alert>>;
    /// All alerts, newest first, capped at `limit`.
    async fn list_recent(&self, site_id: Option<Uuid>, limit: u64) -> RepoResult<Vec<Alert>>;
    async fn list_created_since(&self, since: DateTime<Utc>) -> RepoResult<Vec<Alert>>;

    /// OPEN → RESOLVED. `false` if the alert was already resolved.
    async fn mark_resolved(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
        resolved_by: Option<String>,
    ) -> RepoResult<bool>;
    /// Sets the email and whatsapp flags if the alert is open and its email
    /// flag is still unset. `false` means another caller owns the dispatch.
    async fn claim_critical_dispatch(&self, id: Uuid) -> RepoResult<bool>;
    /// Clears the email and whatsapp flags after a failed dispatch, counts the
    /// attempt and schedules the next one.
    async fn release_critical_dispatch(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> RepoResult<()>;
    /// Bumps the attempt counter from `expected_attempts` and reschedules.
    /// `false` if the counter moved or the alert closed in the meantime.
    async fn claim_retry(
        &self,
        id: Uuid,
        expected_attempts: i32,
        next_retry_at: DateTime<Utc>,
    ) -> RepoResult<bool>;
    async fn mark_channel_sent(&self, id: Uuid, channel: NotificationChannel) -> RepoResult<()>;
    async fn increment_attempts(&self, id: Uuid) -> RepoResult<()>;
}

#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn record(&self, notification: Notification) -> RepoResult<()>;
    async fn list_for_alert(&self, alert_id: Uuid) -> RepoResult<Vec<Notification>>;
}
