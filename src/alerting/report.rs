use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::db::enums::{AlertType, Severity};
use crate::db::models::Alert;

/// Trailing window used by reports and site metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportPeriod {
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl ReportPeriod {
    pub fn hours(self) -> i64 {
        match self {
            ReportPeriod::Day => 24,
            ReportPeriod::Week => 24 * 7,
            ReportPeriod::Month => 24 * 30,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::hours(self.hours())
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportPeriod::Day => "24h",
            ReportPeriod::Week => "7d",
            ReportPeriod::Month => "30d",
        })
    }
}

impl FromStr for ReportPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(ReportPeriod::Day),
            "7d" => Ok(ReportPeriod::Week),
            "30d" => Ok(ReportPeriod::Month),
            other => Err(format!("unknown report period '{other}', expected 24h, 7d or 30d")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertReport {
    pub period: ReportPeriod,
    pub total: usize,
    pub resolved: usize,
    pub open: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    /// Mean minutes from creation to resolution over resolved alerts; 0 when none.
    pub avg_resolution_minutes: f64,
}

impl AlertReport {
    /// Aggregates alerts already filtered to the period's window.
    pub fn from_alerts(period: ReportPeriod, alerts: &[Alert]) -> Self {
        let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for alert in alerts {
            *by_severity.entry(severity_key(alert.severity)).or_default() += 1;
            *by_type.entry(type_key(alert.alert_type)).or_default() += 1;
        }

        let resolution_minutes: Vec<f64> = alerts
            .iter()
            .filter(|a| a.resolved)
            .filter_map(|a| a.resolution_minutes())
            .collect();
        let avg_resolution_minutes = if resolution_minutes.is_empty() {
            0.0
        } else {
            resolution_minutes.iter().sum::<f64>() / resolution_minutes.len() as f64
        };

        let resolved = alerts.iter().filter(|a| a.resolved).count();
        Self {
            period,
            total: alerts.len(),
            resolved,
            open: alerts.len() - resolved,
            by_severity,
            by_type,
            avg_resolution_minutes,
        }
    }
}

fn severity_key(severity: Severity) -> String {
    severity.to_string()
}

fn type_key(alert_type: AlertType) -> String {
    alert_type.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn alert(alert_type: AlertType, severity: Severity, resolved_after_mins: Option<i64>) -> Alert {
        let created = Utc::now() - Duration::hours(2);
        let mut alert = Alert::new_open(
            Uuid::new_v4(),
            alert_type,
            severity,
            "title".into(),
            "message".into(),
            created,
        );
        if let Some(mins) = resolved_after_mins {
            alert.resolved = true;
            alert.resolved_at = Some(created + Duration::minutes(mins));
        }
        alert
    }

    #[test]
    fn counts_by_severity_type_and_state() {
        let alerts = vec![
            alert(AlertType::Offline, Severity::Critical, Some(10)),
            alert(AlertType::Offline, Severity::Critical, None),
            alert(AlertType::HighLatency, Severity::Medium, Some(30)),
        ];

        let report = AlertReport::from_alerts(ReportPeriod::Day, &alerts);

        assert_eq!(report.total, 3);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.open, 1);
        assert_eq!(report.by_severity.get("critical"), Some(&2));
        assert_eq!(report.by_severity.get("medium"), Some(&1));
        assert_eq!(report.by_type.get("offline"), Some(&2));
        assert_eq!(report.by_type.get("high_latency"), Some(&1));
        assert_eq!(report.avg_resolution_minutes, 20.0);
    }

    #[test]
    fn mean_resolution_is_zero_without_resolved_alerts() {
        let alerts = vec![alert(AlertType::Offline, Severity::Critical, None)];
        let report = AlertReport::from_alerts(ReportPeriod::Week, &alerts);
        assert_eq!(report.avg_resolution_minutes, 0.0);

        let empty = AlertReport::from_alerts(ReportPeriod::Month, &[]);
        assert_eq!(empty.total, 0);
        assert_eq!(empty.avg_resolution_minutes, 0.0);
    }

    #[test]
    fn periods_parse_and_span_the_right_hours() {
        assert_eq!("24h".parse::<ReportPeriod>().unwrap(), ReportPeriod::Day);
        assert_eq!("7d".parse::<ReportPeriod>().unwrap().hours(), 168);
        assert_eq!("30d".parse::<ReportPeriod>().unwrap().hours(), 720);
        assert!("1y".parse::<ReportPeriod>().is_err());
    }
}
