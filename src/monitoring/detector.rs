//! Status transition detection.
//!
//! `detect` is a pure decision over the previous and current check of one
//! site plus the set of alert types currently open for it. Each rule is
//! evaluated independently, so one check can yield several intents.

use std::collections::HashSet;

use crate::db::enums::{AlertType, HealthStatus, Severity};
use crate::db::models::{AlertIntent, CheckResult, Site};

pub fn detect(
    site: &Site,
    previous: Option<&CheckResult>,
    current: &CheckResult,
    open_types: &HashSet<AlertType>,
) -> Vec<AlertIntent> {
    let mut intents = Vec::new();
    let previous_status = previous.map(|p| p.status).unwrap_or(HealthStatus::Unknown);

    if previous_status == HealthStatus::Online
        && current.status == HealthStatus::Offline
        && !open_types.contains(&AlertType::Offline)
    {
        let reason = current.error_message.as_deref().unwrap_or("no response");
        intents.push(AlertIntent::Open {
            alert_type: AlertType::Offline,
            severity: Severity::Critical,
            title: format!("{} is OFFLINE", site.name),
            message: format!("{} stopped responding. Last error: {reason}", site.name),
        });
    }

    // Any recovery closes the outage, whatever the checks in between reported.
    if current.status == HealthStatus::Online && open_types.contains(&AlertType::Offline) {
        intents.push(AlertIntent::Close {
            alert_type: AlertType::Offline,
        });
    }

    if let Some(response_time_ms) = current.response_time_ms {
        if response_time_ms > site.threshold_response_ms
            && !open_types.contains(&AlertType::HighLatency)
        {
            intents.push(AlertIntent::Open {
                alert_type: AlertType::HighLatency,
                severity: Severity::Medium,
                title: format!("{} - High response time", site.name),
                message: format!(
                    "Response time: {response_time_ms}ms (threshold: {}ms)",
                    site.threshold_response_ms
                ),
            });
        }
    }

    if let Some(error_rate) = current.error_rate {
        if error_rate > site.threshold_error_rate
            && !open_types.contains(&AlertType::HighErrorRate)
        {
            intents.push(AlertIntent::Open {
                alert_type: AlertType::HighErrorRate,
                severity: Severity::High,
                title: format!("{} - High error rate", site.name),
                message: format!(
                    "Error rate: {error_rate}% (threshold: {}%)",
                    site.threshold_error_rate
                ),
            });
        }
    }

    intents
}
