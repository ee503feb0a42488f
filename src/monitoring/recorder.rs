//! Persists probe outcomes and answers trailing-window history queries.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::alerting::report::ReportPeriod;
use crate::db::enums::HealthStatus;
use crate::db::models::CheckResult;
use crate::db::repository::{CheckRepository, RepoResult};
use crate::scheduler::clock::Clock;

/// Aggregated check statistics for one site over a report period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteMetrics {
    pub site_id: Uuid,
    pub period: ReportPeriod,
    pub total_checks: usize,
    pub online_checks: usize,
    pub offline_checks: usize,
    pub uptime_percent: f64,
    pub avg_response_time_ms: Option<f64>,
    pub avg_error_rate: Option<f64>,
}

/// `online / total * 100`, or 0 for an empty window.
pub fn uptime_of(checks: &[CheckResult]) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    let online = checks.iter().filter(|c| c.is_online()).count();
    online as f64 / checks.len() as f64 * 100.0
}

/// Start of a trailing window. Windows reaching past the representable range
/// start at the earliest instant instead of overflowing.
fn window_start(now: DateTime<Utc>, span: Option<Duration>) -> DateTime<Utc> {
    span.and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[derive(Clone)]
pub struct CheckRecorder {
    checks: Arc<dyn CheckRepository>,
    clock: Arc<dyn Clock>,
}

impl CheckRecorder {
    pub fn new(checks: Arc<dyn CheckRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { checks, clock }
    }

    pub async fn record(&self, check: &CheckResult) -> RepoResult<()> {
        self.checks.insert(check).await
    }

    pub async fn latest(&self, site_id: Uuid) -> RepoResult<Option<CheckResult>> {
        self.checks.latest(site_id).await
    }

    /// Checks from the trailing `window_hours`, most recent first.
    pub async fn history(
        &self,
        site_id: Uuid,
        window_hours: i64,
        limit: Option<u64>,
    ) -> RepoResult<Vec<CheckResult>> {
        let since = window_start(self.clock.now(), Duration::try_hours(window_hours));
        self.checks.history(site_id, since, limit).await
    }

    pub async fn uptime_percent(&self, site_id: Uuid, window_hours: i64) -> RepoResult<f64> {
        let checks = self.history(site_id, window_hours, None).await?;
        Ok(uptime_of(&checks))
    }

    /// Deletes checks older than `retention_days`, returning how many went.
    pub async fn purge_expired(&self, retention_days: i64) -> RepoResult<u64> {
        let cutoff = window_start(self.clock.now(), Duration::try_days(retention_days));
        self.checks.purge_older_than(cutoff).await
    }

    pub async fn metrics(&self, site_id: Uuid, period: ReportPeriod) -> RepoResult<SiteMetrics> {
        let checks = self.history(site_id, period.hours(), None).await?;
        Ok(SiteMetrics {
            site_id,
            period,
            total_checks: checks.len(),
            online_checks: checks.iter().filter(|c| c.is_online()).count(),
            offline_checks: checks
                .iter()
                .filter(|c| c.status == HealthStatus::Offline)
                .count(),
            uptime_percent: uptime_of(&checks),
            avg_response_time_ms: mean(
                checks.iter().filter_map(|c| c.response_time_ms).map(f64::from),
            ),
            avg_error_rate: mean(checks.iter().filter_map(|c| c.error_rate)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryCheckRepository;
    use crate::scheduler::clock::ManualClock;
    use chrono::Utc;

    async fn seeded(statuses: &[(HealthStatus, i64, Option<i32>)]) -> (CheckRecorder, Uuid) {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let repo = Arc::new(MemoryCheckRepository::new());
        let site_id = Uuid::new_v4();
        for (status, hours_ago, response_time_ms) in statuses {
            let mut check = CheckResult::new(site_id, *status, now - Duration::hours(*hours_ago));
            check.response_time_ms = *response_time_ms;
            repo.insert(&check).await.unwrap();
        }
        (CheckRecorder::new(repo, clock), site_id)
    }

    #[tokio::test]
    async fn uptime_is_online_share_of_window() {
        let (recorder, site_id) = seeded(&[
            (HealthStatus::Online, 1, Some(100)),
            (HealthStatus::Online, 2, Some(300)),
            (HealthStatus::Offline, 3, None),
            (HealthStatus::Timeout, 4, Some(30_000)),
            (HealthStatus::Offline, 48, None),
        ])
        .await;

        assert_eq!(recorder.uptime_percent(site_id, 24).await.unwrap(), 50.0);
        assert_eq!(recorder.uptime_percent(site_id, 72).await.unwrap(), 40.0);
    }

    #[tokio::test]
    async fn uptime_of_empty_window_is_zero() {
        let (recorder, site_id) = seeded(&[(HealthStatus::Online, 30, None)]).await;
        assert_eq!(recorder.uptime_percent(site_id, 24).await.unwrap(), 0.0);
        assert_eq!(recorder.uptime_percent(Uuid::new_v4(), 24).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_capped() {
        let (recorder, site_id) = seeded(&[
            (HealthStatus::Online, 5, None),
            (HealthStatus::Offline, 1, None),
            (HealthStatus::Online, 3, None),
        ])
        .await;

        let history = recorder.history(site_id, 24, None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].status, HealthStatus::Offline);

        let capped = recorder.history(site_id, 24, Some(2)).await.unwrap();
        assert_eq!(capped.len(), 2);

        let latest = recorder.latest(site_id).await.unwrap().unwrap();
        assert_eq!(latest.status, HealthStatus::Offline);
    }

    #[tokio::test]
    async fn oversized_windows_cover_everything_without_overflow() {
        let (recorder, site_id) = seeded(&[
            (HealthStatus::Online, 1, None),
            (HealthStatus::Offline, 24 * 400, None),
        ])
        .await;

        let history = recorder.history(site_id, 10_000_000_000, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(recorder.history(site_id, i64::MAX, None).await.unwrap().len(), 2);
        assert_eq!(recorder.purge_expired(i64::MAX).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_keeps_checks_inside_retention() {
        let (recorder, site_id) = seeded(&[
            (HealthStatus::Online, 1, None),
            (HealthStatus::Online, 24 * 31, None),
            (HealthStatus::Offline, 24 * 45, None),
        ])
        .await;

        assert_eq!(recorder.purge_expired(30).await.unwrap(), 2);
        assert_eq!(recorder.history(site_id, 24 * 60, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn metrics_average_reported_values() {
        let (recorder, site_id) = seeded(&[
            (HealthStatus::Online, 1, Some(100)),
            (HealthStatus::Online, 2, Some(300)),
            (HealthStatus::Offline, 3, None),
        ])
        .await;

        let metrics = recorder.metrics(site_id, ReportPeriod::Day).await.unwrap();
        assert_eq!(metrics.total_checks, 3);
        assert_eq!(metrics.online_checks, 2);
        assert_eq!(metrics.offline_checks, 1);
        assert_eq!(metrics.avg_response_time_ms, Some(200.0));
        assert_eq!(metrics.avg_error_rate, None);
    }
}
