//! One health probe against one site.
//!
//! The prober never fails: timeouts and transport errors are folded into the
//! returned `CheckResult` status.

use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::db::enums::{ComponentStatus, HealthStatus, SslStatus};
use crate::db::models::{CheckResult, Site};
use crate::scheduler::clock::Clock;

/// Body contract of a site's health endpoint.
#[derive(Debug, Deserialize)]
struct HealthReport {
    status: String,
    #[serde(default)]
    metrics: Option<ReportedMetrics>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    cache: Option<String>,
    #[serde(default)]
    ssl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportedMetrics {
    #[serde(rename = "errorRate", default)]
    error_rate: Option<f64>,
}

enum Outcome {
    Response {
        http_code: u16,
        success: bool,
        body: Vec<u8>,
    },
    TransportFailure(reqwest::Error),
}

#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl Prober {
    pub fn new(clock: Arc<dyn Clock>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sitepulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, clock })
    }

    /// Probes `site.endpoint_health` with `site.timeout_secs` as a hard
    /// deadline covering connect, headers and body.
    pub async fn probe(&self, site: &Site) -> CheckResult {
        let deadline = Duration::from_secs(site.timeout_secs.max(1) as u64);
        let mut request = self
            .client
            .get(&site.endpoint_health)
            .header(ACCEPT, "application/json");
        if let Some(api_key) = site.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {api_key}"));
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(deadline, async {
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => return Outcome::TransportFailure(e),
            };
            let status = response.status();
            match response.bytes().await {
                Ok(body) => Outcome::Response {
                    http_code: status.as_u16(),
                    success: status.is_success(),
                    body: body.to_vec(),
                },
                Err(e) => Outcome::TransportFailure(e),
            }
        })
        .await;
        let elapsed_ms = started.elapsed().as_millis().min(i32::MAX as u128) as i32;

        let mut check = CheckResult::new(site.id, HealthStatus::Unknown, self.clock.now());
        match outcome {
            Err(_) => {
                check.status = HealthStatus::Timeout;
                check.response_time_ms = Some(deadline.as_millis() as i32);
                check.error_message = Some(format!(
                    "Health check timed out after {}s",
                    deadline.as_secs()
                ));
            }
            Ok(Outcome::TransportFailure(e)) if e.is_timeout() => {
                check.status = HealthStatus::Timeout;
                check.response_time_ms = Some(deadline.as_millis() as i32);
                check.error_message = Some(e.to_string());
            }
            Ok(Outcome::TransportFailure(e)) => {
                check.status = HealthStatus::Offline;
                check.error_message = Some(e.to_string());
            }
            Ok(Outcome::Response {
                http_code,
                success,
                body,
            }) => {
                check.http_code = Some(http_code as i32);
                check.response_time_ms = Some(elapsed_ms);
                if success {
                    classify_body(&mut check, &body);
                } else {
                    check.status = HealthStatus::Error;
                    check.error_message = Some(format!("HTTP {http_code}"));
                }
            }
        }

        debug!(
            site_id = %site.id,
            status = ?check.status,
            response_time_ms = ?check.response_time_ms,
            "Probe finished."
        );
        check
    }
}

fn classify_body(check: &mut CheckResult, body: &[u8]) {
    let report: HealthReport = match serde_json::from_slice(body) {
        Ok(report) => report,
        Err(e) => {
            check.status = HealthStatus::Error;
            check.error_message = Some(format!("Malformed health response: {e}"));
            return;
        }
    };

    check.error_rate = report.metrics.and_then(|m| m.error_rate);
    check.database_status = Some(ComponentStatus::from_reported(report.database.as_deref()));
    check.cache_status = Some(ComponentStatus::from_reported(report.cache.as_deref()));
    check.ssl_status = Some(SslStatus::from_reported(report.ssl.as_deref()));

    if report.status == "ok" {
        check.status = HealthStatus::Online;
    } else {
        check.status = HealthStatus::Error;
        check.error_message = Some(format!("Site reported status '{}'", report.status));
    }
}
