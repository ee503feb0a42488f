//! Alert state machine: OPEN → RESOLVED.
//!
//! All mutations go through named conditional updates on the alert store, so
//! overlapping sweeps and user actions cannot double-dispatch a critical alert
//! or send two recovery notifications for one resolution. Notification
//! failures are logged and never roll back a state change.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::report::{AlertReport, ReportPeriod};
use crate::db::enums::{AlertType, NotificationChannel, Severity};
use crate::db::models::{Alert, CheckResult, Site};
use crate::db::repository::{AlertRepository, CheckRepository, RepoResult, SiteRepository};
use crate::error::CoreError;
use crate::notifications::Notifier;
use crate::scheduler::clock::Clock;

/// What the pending sweep does with a medium or low severity alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    /// Leave the alert alone until someone resolves it.
    #[default]
    Hold,
    /// Treat it like a high severity alert: push while the condition
    /// persists, resolve once it clears.
    Recheck,
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub escalation_threshold: Duration,
    pub retry_delay: Duration,
    pub pending_policy: HashMap<AlertType, PendingAction>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            escalation_threshold: Duration::minutes(30),
            retry_delay: Duration::minutes(5),
            pending_policy: HashMap::new(),
        }
    }
}

/// Counts from one pending sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSummary {
    pub critical_dispatched: usize,
    pub notified: usize,
    pub auto_resolved: usize,
    pub held: usize,
    pub failed: usize,
}

/// Whether the condition behind an alert of `alert_type` still holds for the
/// site's latest check. No check at all counts as cleared.
pub fn still_unhealthy(alert_type: AlertType, site: &Site, latest: Option<&CheckResult>) -> bool {
    let Some(latest) = latest else {
        return false;
    };
    let down = !latest.is_online();
    match alert_type {
        AlertType::HighLatency => {
            down || latest
                .response_time_ms
                .is_some_and(|ms| ms > site.threshold_response_ms)
        }
        AlertType::HighErrorRate => {
            down || latest
                .error_rate
                .is_some_and(|rate| rate > site.threshold_error_rate)
        }
        _ => down,
    }
}

enum PendingOutcome {
    Dispatched,
    Notified,
    Resolved,
    Held,
    Skipped,
}

pub struct AlertLifecycleManager {
    alerts: Arc<dyn AlertRepository>,
    sites: Arc<dyn SiteRepository>,
    checks: Arc<dyn CheckRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: LifecycleSettings,
}

impl AlertLifecycleManager {
    pub fn new(
        alerts: Arc<dyn AlertRepository>,
        sites: Arc<dyn SiteRepository>,
        checks: Arc<dyn CheckRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            alerts,
            sites,
            checks,
            notifier,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Inserts a new OPEN alert unless one of the same type is already open
    /// for the site, in which case `None` is returned and nothing is sent.
    /// Critical alerts are dispatched immediately; every alert is due for
    /// the pending sweep right away.
    pub async fn open(
        &self,
        site: &Site,
        alert_type: AlertType,
        severity: Severity,
        title: String,
        message: String,
    ) -> RepoResult<Option<Alert>> {
        let now = self.clock.now();
        let mut alert = Alert::new_open(site.id, alert_type, severity, title, message, now);
        alert.next_retry_at = Some(now);

        let Some(alert) = self.alerts.insert_if_no_open(alert).await? else {
            debug!(site_id = %site.id, alert_type = %alert_type, "Alert already open, not creating another.");
            return Ok(None);
        };
        info!(
            alert_id = %alert.id,
            site_id = %site.id,
            alert_type = %alert_type,
            severity = %severity,
            "Alert opened."
        );

        if severity == Severity::Critical {
            self.dispatch_critical(&alert, site, now).await?;
        }
        Ok(Some(alert))
    }

    /// Resolves the open alert of `alert_type` for the site, if any, without
    /// a resolver identity.
    pub async fn close(&self, site: &Site, alert_type: AlertType) -> RepoResult<bool> {
        match self
            .alerts
            .find_open_by_type_and_site(site.id, alert_type)
            .await?
        {
            Some(alert) => self.finish(alert, Some(site), None).await,
            None => Ok(false),
        }
    }

    /// Claims the critical dispatch and sends the red flag. A failed send
    /// releases the claim and schedules a retry.
    async fn dispatch_critical(
        &self,
        alert: &Alert,
        site: &Site,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        if !self.alerts.claim_critical_dispatch(alert.id).await? {
            debug!(alert_id = %alert.id, "Critical dispatch already claimed.");
            return Ok(false);
        }
        match self.notifier.send_critical(alert, site).await {
            Ok(()) => Ok(true),
            Err(e) => {
                let next_retry_at = now + self.settings.retry_delay;
                warn!(
                    alert_id = %alert.id,
                    error = %e,
                    next_retry_at = %next_retry_at,
                    "Critical notification failed, scheduling retry."
                );
                self.alerts
                    .release_critical_dispatch(alert.id, next_retry_at)
                    .await?;
                Ok(false)
            }
        }
    }

    /// Re-checks the site behind the alert: pushes while the condition
    /// holds, resolves once it clears.
    async fn recheck(
        &self,
        alert: &Alert,
        site: &Site,
        now: DateTime<Utc>,
    ) -> RepoResult<PendingOutcome> {
        let latest = self.checks.latest(site.id).await?;
        if !still_unhealthy(alert.alert_type, site, latest.as_ref()) {
            let resolved = self.finish(alert.clone(), Some(site), None).await?;
            return Ok(if resolved {
                PendingOutcome::Resolved
            } else {
                PendingOutcome::Skipped
            });
        }

        let next_retry_at = now + self.settings.retry_delay;
        if !self
            .alerts
            .claim_retry(alert.id, alert.notification_attempts, next_retry_at)
            .await?
        {
            return Ok(PendingOutcome::Skipped);
        }
        match self
            .notifier
            .send(alert, site, NotificationChannel::Push)
            .await
        {
            Ok(()) => {
                self.alerts
                    .mark_channel_sent(alert.id, NotificationChannel::Push)
                    .await?;
            }
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "Push notification failed.");
            }
        }
        Ok(PendingOutcome::Notified)
    }

    async fn process_one(&self, alert: &Alert, now: DateTime<Utc>) -> RepoResult<PendingOutcome> {
        let Some(site) = self
            .sites
            .get_by_id_including_inactive(alert.site_id)
            .await?
        else {
            warn!(alert_id = %alert.id, site_id = %alert.site_id, "Alert references a missing site.");
            return Ok(PendingOutcome::Skipped);
        };

        match alert.severity {
            Severity::Critical => Ok(if self.dispatch_critical(alert, &site, now).await? {
                PendingOutcome::Dispatched
            } else {
                PendingOutcome::Skipped
            }),
            Severity::High => self.recheck(alert, &site, now).await,
            Severity::Medium | Severity::Low => {
                let action = self
                    .settings
                    .pending_policy
                    .get(&alert.alert_type)
                    .copied()
                    .unwrap_or_default();
                match action {
                    PendingAction::Hold => Ok(PendingOutcome::Held),
                    PendingAction::Recheck => self.recheck(alert, &site, now).await,
                }
            }
        }
    }

    /// Handles every OPEN alert due at `now` whose email has not been sent.
    /// One failing alert does not stop the others.
    #[instrument(skip(self))]
    pub async fn process_pending(&self, now: DateTime<Utc>) -> RepoResult<PendingSummary> {
        let due = self.alerts.find_pending_for_processing(now).await?;
        let mut summary = PendingSummary::default();

        for alert in &due {
            match self.process_one(alert, now).await {
                Ok(PendingOutcome::Dispatched) => summary.critical_dispatched += 1,
                Ok(PendingOutcome::Notified) => summary.notified += 1,
                Ok(PendingOutcome::Resolved) => summary.auto_resolved += 1,
                Ok(PendingOutcome::Held) => summary.held += 1,
                Ok(PendingOutcome::Skipped) => {}
                Err(e) => {
                    summary.failed += 1;
                    error!(alert_id = %alert.id, error = %e, "Failed to process pending alert.");
                }
            }
        }

        if !due.is_empty() {
            info!(
                due = due.len(),
                dispatched = summary.critical_dispatched,
                notified = summary.notified,
                resolved = summary.auto_resolved,
                "Pending alert sweep finished."
            );
        }
        Ok(summary)
    }

    /// Sends an escalation for every OPEN critical alert older than the
    /// threshold and counts the attempt. Repeats on every call while the
    /// alert stays open.
    #[instrument(skip(self))]
    pub async fn escalate(&self, now: DateTime<Utc>) -> RepoResult<usize> {
        let cutoff = now - self.settings.escalation_threshold;
        let stale = self.alerts.find_open_critical_older_than(cutoff).await?;
        let mut escalated = 0;

        for alert in stale {
            let site = match self
                .sites
                .get_by_id_including_inactive(alert.site_id)
                .await
            {
                Ok(Some(site)) => site,
                Ok(None) => {
                    warn!(alert_id = %alert.id, "Cannot escalate alert for a missing site.");
                    continue;
                }
                Err(e) => {
                    error!(alert_id = %alert.id, error = %e, "Failed to load site for escalation.");
                    continue;
                }
            };

            if let Err(e) = self.notifier.send_escalation(&alert, &site).await {
                warn!(alert_id = %alert.id, error = %e, "Escalation notification failed.");
            }
            if let Err(e) = self.alerts.increment_attempts(alert.id).await {
                error!(alert_id = %alert.id, error = %e, "Failed to count escalation attempt.");
                continue;
            }
            escalated += 1;
        }

        if escalated > 0 {
            info!(escalated, "Escalation sweep finished.");
        }
        Ok(escalated)
    }

    /// Resolves an alert on behalf of `resolver`. Resolving an already
    /// resolved alert is a no-op and sends nothing.
    pub async fn resolve(&self, alert_id: Uuid, resolver: Option<String>) -> Result<(), CoreError> {
        let alert = self
            .alerts
            .get_by_id(alert_id)
            .await?
            .ok_or_else(|| CoreError::alert_not_found(alert_id))?;
        if !alert.is_open() {
            debug!(alert_id = %alert_id, "Alert already resolved.");
            return Ok(());
        }
        self.finish(alert, None, resolver).await?;
        Ok(())
    }

    /// The single OPEN → RESOLVED transition. Only the caller that wins the
    /// conditional update sends the recovery notification.
    async fn finish(
        &self,
        mut alert: Alert,
        site: Option<&Site>,
        resolver: Option<String>,
    ) -> RepoResult<bool> {
        let now = self.clock.now();
        if !self
            .alerts
            .mark_resolved(alert.id, now, resolver.clone())
            .await?
        {
            return Ok(false);
        }
        alert.resolved = true;
        alert.resolved_at = Some(now);
        alert.resolved_by = resolver;
        info!(
            alert_id = %alert.id,
            resolved_by = alert.resolved_by.as_deref().unwrap_or("system"),
            "Alert resolved."
        );

        let site = match site {
            Some(site) => Some(site.clone()),
            None => self
                .sites
                .get_by_id_including_inactive(alert.site_id)
                .await
                .unwrap_or_else(|e| {
                    error!(alert_id = %alert.id, error = %e, "Failed to load site for recovery notification.");
                    None
                }),
        };
        if let Some(site) = site {
            if let Err(e) = self.notifier.send_recovery(&alert, &site).await {
                warn!(alert_id = %alert.id, error = %e, "Recovery notification failed.");
            }
        }
        Ok(true)
    }

    pub async fn report(&self, period: ReportPeriod) -> RepoResult<AlertReport> {
        let since = self.clock.now() - period.duration();
        let alerts = self.alerts.list_created_since(since).await?;
        Ok(AlertReport::from_alerts(period, &alerts))
    }
}
