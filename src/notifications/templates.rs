//! Message templates for alert notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::{Context, Tera};

use crate::db::models::{Alert, Site};

const CRITICAL_SUBJECT: &str = "RED FLAG: {{ site_name }} - {{ alert_title }}";
const CRITICAL_BODY: &str = "\
RED FLAG - CRITICAL ALERT

Site: {{ site_name }} ({{ site_url }})
Problem: {{ alert_title }}
Details: {{ alert_message }}
Severity: {{ severity | upper }}
Raised at: {{ created_at }}

Open the monitoring dashboard immediately to investigate: {{ dashboard_url }}";

const ALERT_SUBJECT: &str = "Alert: {{ site_name }} - {{ alert_title }}";
const ALERT_BODY: &str = "\
{{ alert_title }}

{{ alert_message }}

Severity: {{ severity }}
Details: {{ dashboard_url }}";

const RECOVERY_SUBJECT: &str = "Recovered: {{ site_name }}";
const RECOVERY_BODY: &str = "\
The problem was resolved. {{ site_name }} is back to normal.

Previous problem: {{ alert_title }}
{% if resolved_by %}Resolved by: {{ resolved_by }}
{% endif %}Open for {{ open_minutes }} minutes.";

const ESCALATION_SUBJECT: &str = "ESCALATION: {{ site_name }} - {{ alert_title }}";
const ESCALATION_BODY: &str = "\
This alert has been unresolved for more than {{ threshold_minutes }} minutes.

Problem: {{ alert_title }}
Open for: {{ open_minutes }} minutes
Notification attempts: {{ attempts }}
Dashboard: {{ dashboard_url }}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Critical,
    Alert,
    Recovery,
    Escalation,
}

impl TemplateKind {
    fn names(self) -> (&'static str, &'static str) {
        match self {
            TemplateKind::Critical => ("critical_subject", "critical_body"),
            TemplateKind::Alert => ("alert_subject", "alert_body"),
            TemplateKind::Recovery => ("recovery_subject", "recovery_body"),
            TemplateKind::Escalation => ("escalation_subject", "escalation_body"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Values every template can reference.
#[derive(Debug, Serialize)]
struct AlertContext<'a> {
    site_name: &'a str,
    site_url: &'a str,
    alert_title: &'a str,
    alert_message: &'a str,
    alert_type: String,
    severity: String,
    created_at: String,
    resolved_by: Option<&'a str>,
    attempts: i32,
    open_minutes: i64,
    threshold_minutes: i64,
    dashboard_url: &'a str,
}

pub struct NotificationTemplates {
    tera: Tera,
    dashboard_url: String,
    escalation_threshold_mins: i64,
}

impl NotificationTemplates {
    pub fn new(
        dashboard_url: impl Into<String>,
        escalation_threshold_mins: i64,
    ) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("critical_subject", CRITICAL_SUBJECT),
            ("critical_body", CRITICAL_BODY),
            ("alert_subject", ALERT_SUBJECT),
            ("alert_body", ALERT_BODY),
            ("recovery_subject", RECOVERY_SUBJECT),
            ("recovery_body", RECOVERY_BODY),
            ("escalation_subject", ESCALATION_SUBJECT),
            ("escalation_body", ESCALATION_BODY),
        ])?;
        // Plain-text payloads.
        tera.autoescape_on(vec![]);
        Ok(Self {
            tera,
            dashboard_url: dashboard_url.into(),
            escalation_threshold_mins,
        })
    }

    pub fn render(
        &self,
        kind: TemplateKind,
        alert: &Alert,
        site: &Site,
        now: DateTime<Utc>,
    ) -> Result<RenderedMessage, tera::Error> {
        let values = AlertContext {
            site_name: &site.name,
            site_url: &site.url,
            alert_title: &alert.title,
            alert_message: &alert.message,
            alert_type: alert.alert_type.to_string(),
            severity: alert.severity.to_string(),
            created_at: alert.created_at.to_rfc3339(),
            resolved_by: alert.resolved_by.as_deref(),
            attempts: alert.notification_attempts,
            open_minutes: (alert.resolved_at.unwrap_or(now) - alert.created_at).num_minutes(),
            threshold_minutes: self.escalation_threshold_mins,
            dashboard_url: &self.dashboard_url,
        };
        let context = Context::from_serialize(&values)?;
        let (subject_name, body_name) = kind.names();
        Ok(RenderedMessage {
            subject: self.tera.render(subject_name, &context)?,
            body: self.tera.render(body_name, &context)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AlertType, Severity};
    use crate::db::models::fixtures;
    use chrono::Duration;

    fn alert(site: &Site, created_at: DateTime<Utc>) -> Alert {
        Alert::new_open(
            site.id,
            AlertType::Offline,
            Severity::Critical,
            format!("{} is OFFLINE", site.name),
            "connection refused".into(),
            created_at,
        )
    }

    #[test]
    fn critical_subject_is_a_red_flag() {
        let templates = NotificationTemplates::new("https://status.example/alerts", 30).unwrap();
        let site = fixtures::site("Broker & Co", "https://broker.example/health");
        let now = Utc::now();

        let rendered = templates
            .render(TemplateKind::Critical, &alert(&site, now), &site, now)
            .unwrap();

        assert_eq!(rendered.subject, "RED FLAG: Broker & Co - Broker & Co is OFFLINE");
        assert!(rendered.body.contains("Severity: CRITICAL"));
        assert!(rendered.body.contains("https://status.example/alerts"));
    }

    #[test]
    fn escalation_reports_age_and_attempts() {
        let templates = NotificationTemplates::new("", 30).unwrap();
        let site = fixtures::site("Broker", "https://broker.example/health");
        let now = Utc::now();
        let mut alert = alert(&site, now - Duration::minutes(45));
        alert.notification_attempts = 2;

        let rendered = templates
            .render(TemplateKind::Escalation, &alert, &site, now)
            .unwrap();

        assert!(rendered.subject.starts_with("ESCALATION: Broker"));
        assert!(rendered.body.contains("more than 30 minutes"));
        assert!(rendered.body.contains("Open for: 45 minutes"));
        assert!(rendered.body.contains("Notification attempts: 2"));
    }

    #[test]
    fn recovery_names_the_resolver_when_present() {
        let templates = NotificationTemplates::new("", 30).unwrap();
        let site = fixtures::site("Broker", "https://broker.example/health");
        let now = Utc::now();
        let mut alert = alert(&site, now - Duration::minutes(10));

        let system = templates.render(TemplateKind::Recovery, &alert, &site, now).unwrap();
        assert_eq!(system.subject, "Recovered: Broker");
        assert!(!system.body.contains("Resolved by"));

        alert.resolved_by = Some("operator-7".into());
        let manual = templates.render(TemplateKind::Recovery, &alert, &site, now).unwrap();
        assert!(manual.body.contains("Resolved by: operator-7"));
    }
}
