use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::models::{NotifierSettings, OutgoingMessage};
use super::senders::{NotificationSender, SenderError};
use super::templates::{NotificationTemplates, RenderedMessage, TemplateKind};
use crate::db::entities::notification;
use crate::db::enums::{NotificationChannel, NotificationStatus};
use crate::db::models::{Alert, Site};
use crate::db::repository::NotificationLog;
use crate::error::RepositoryError;
use crate::scheduler::clock::Clock;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Sender error: {0}")]
    SenderError(#[from] SenderError),
    #[error("Templating error: {0}")]
    TemplatingError(#[from] tera::Error),
    #[error("Channel not configured: {0}")]
    ChannelNotConfigured(NotificationChannel),
    #[error("No recipient for channel {0}")]
    NoRecipient(NotificationChannel),
    #[error("Database error: {0}")]
    DatabaseError(#[from] RepositoryError),
}

/// Outbound notifications for the alert lifecycle. Every delivery attempt is
/// logged as a `Notification` row whether it succeeds or not.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Red-flag delivery on email and WhatsApp. Fails when the email does.
    async fn send_critical(&self, alert: &Alert, site: &Site) -> Result<(), NotificationError>;
    async fn send(
        &self,
        alert: &Alert,
        site: &Site,
        channel: NotificationChannel,
    ) -> Result<(), NotificationError>;
    async fn send_recovery(&self, alert: &Alert, site: &Site) -> Result<(), NotificationError>;
    async fn send_escalation(&self, alert: &Alert, site: &Site) -> Result<(), NotificationError>;
}

pub struct NotificationService {
    settings: NotifierSettings,
    templates: NotificationTemplates,
    sender: Arc<dyn NotificationSender>,
    log: Arc<dyn NotificationLog>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(
        settings: NotifierSettings,
        templates: NotificationTemplates,
        sender: Arc<dyn NotificationSender>,
        log: Arc<dyn NotificationLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            templates,
            sender,
            log,
            clock,
        }
    }

    fn recipient_for(&self, channel: NotificationChannel, site: &Site) -> Option<String> {
        match channel {
            NotificationChannel::Email => Some(
                site.contact_email
                    .clone()
                    .unwrap_or_else(|| self.settings.alert_email.clone()),
            ),
            NotificationChannel::Whatsapp | NotificationChannel::Sms => site
                .contact_phone
                .clone()
                .or_else(|| self.settings.alert_phone.clone()),
            NotificationChannel::Push => Some(format!("site:{}", site.id)),
        }
    }

    fn render(
        &self,
        kind: TemplateKind,
        alert: &Alert,
        site: &Site,
    ) -> Result<RenderedMessage, NotificationError> {
        Ok(self.templates.render(kind, alert, site, self.clock.now())?)
    }

    /// Sends one message and logs the attempt.
    async fn deliver(
        &self,
        alert_id: Uuid,
        channel: NotificationChannel,
        recipient: Option<String>,
        rendered: &RenderedMessage,
    ) -> Result<(), NotificationError> {
        let recipient_label = recipient.clone().unwrap_or_default();
        let result = match recipient {
            None => Err(NotificationError::NoRecipient(channel)),
            Some(recipient) => match self.settings.endpoints.get(&channel) {
                None => Err(NotificationError::ChannelNotConfigured(channel)),
                Some(endpoint) => {
                    let message = OutgoingMessage {
                        channel,
                        recipient,
                        subject: Some(rendered.subject.clone()),
                        body: rendered.body.clone(),
                    };
                    self.sender
                        .send(endpoint, &message)
                        .await
                        .map_err(NotificationError::from)
                }
            },
        };

        let (status, error_message) = match &result {
            Ok(()) => {
                info!(alert_id = %alert_id, channel = %channel, "Notification sent.");
                (NotificationStatus::Sent, None)
            }
            Err(e) => {
                warn!(alert_id = %alert_id, channel = %channel, error = %e, "Notification delivery failed.");
                (NotificationStatus::Failed, Some(e.to_string()))
            }
        };

        let row = notification::Model {
            id: Uuid::new_v4(),
            alert_id,
            channel,
            recipient: recipient_label,
            subject: Some(rendered.subject.clone()),
            body: rendered.body.clone(),
            status,
            error_message,
            sent_at: self.clock.now(),
        };
        if let Err(e) = self.log.record(row).await {
            error!(alert_id = %alert_id, error = %e, "Failed to log notification attempt.");
        }

        result
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn send_critical(&self, alert: &Alert, site: &Site) -> Result<(), NotificationError> {
        let rendered = self.render(TemplateKind::Critical, alert, site)?;
        let email = self
            .deliver(
                alert.id,
                NotificationChannel::Email,
                Some(self.settings.alert_email.clone()),
                &rendered,
            )
            .await;
        // WhatsApp failures are logged with the attempt but do not fail the dispatch.
        let _ = self
            .deliver(
                alert.id,
                NotificationChannel::Whatsapp,
                self.recipient_for(NotificationChannel::Whatsapp, site),
                &rendered,
            )
            .await;
        email
    }

    async fn send(
        &self,
        alert: &Alert,
        site: &Site,
        channel: NotificationChannel,
    ) -> Result<(), NotificationError> {
        let rendered = self.render(TemplateKind::Alert, alert, site)?;
        self.deliver(alert.id, channel, self.recipient_for(channel, site), &rendered)
            .await
    }

    async fn send_recovery(&self, alert: &Alert, site: &Site) -> Result<(), NotificationError> {
        let rendered = self.render(TemplateKind::Recovery, alert, site)?;
        self.deliver(
            alert.id,
            NotificationChannel::Email,
            self.recipient_for(NotificationChannel::Email, site),
            &rendered,
        )
        .await
    }

    async fn send_escalation(&self, alert: &Alert, site: &Site) -> Result<(), NotificationError> {
        let rendered = self.render(TemplateKind::Escalation, alert, site)?;
        self.deliver(
            alert.id,
            NotificationChannel::Email,
            Some(self.settings.ops_email.clone()),
            &rendered,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AlertType, Severity};
    use crate::db::memory::MemoryNotificationLog;
    use crate::db::models::fixtures;
    use crate::notifications::models::WebhookConfig;
    use crate::scheduler::clock::SystemClock;
    use chrono::Utc;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CapturingSender {
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl NotificationSender for CapturingSender {
        async fn send(
            &self,
            config: &WebhookConfig,
            message: &OutgoingMessage,
        ) -> Result<(), SenderError> {
            if config.url.contains("broken") {
                return Err(SenderError::SendFailed("gateway down".into()));
            }
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn service(
        endpoints: &[(NotificationChannel, &str)],
    ) -> (NotificationService, Arc<CapturingSender>, Arc<MemoryNotificationLog>) {
        let sender = Arc::new(CapturingSender::default());
        let log = Arc::new(MemoryNotificationLog::new());
        let settings = NotifierSettings {
            alert_email: "alerts@example.com".into(),
            ops_email: "ops@example.com".into(),
            alert_phone: None,
            dashboard_url: "https://status.example".into(),
            endpoints: endpoints
                .iter()
                .map(|(channel, url)| (*channel, WebhookConfig::post(*url)))
                .collect::<HashMap<_, _>>(),
        };
        let templates = NotificationTemplates::new("https://status.example", 30).unwrap();
        let service = NotificationService::new(
            settings,
            templates,
            sender.clone(),
            log.clone(),
            Arc::new(SystemClock),
        );
        (service, sender, log)
    }

    fn critical_alert(site: &Site) -> Alert {
        Alert::new_open(
            site.id,
            AlertType::Offline,
            Severity::Critical,
            "Broker is OFFLINE".into(),
            "connection refused".into(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn critical_goes_to_alert_email_and_logs_each_channel() {
        let (service, sender, log) = service(&[
            (NotificationChannel::Email, "http://mail.local/send"),
            (NotificationChannel::Whatsapp, "http://wa.local/send"),
        ]);
        let mut site = fixtures::site("Broker", "https://broker.example/health");
        site.contact_phone = Some("+5511999990000".into());
        let alert = critical_alert(&site);

        service.send_critical(&alert, &site).await.unwrap();

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].recipient, "alerts@example.com");
        assert!(sent[0].subject.as_deref().unwrap().starts_with("RED FLAG"));
        assert_eq!(sent[1].recipient, "+5511999990000");

        let rows = log.list_for_alert(alert.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.status == NotificationStatus::Sent));
    }

    #[tokio::test]
    async fn whatsapp_failure_alone_does_not_fail_critical_dispatch() {
        let (service, _, log) = service(&[(NotificationChannel::Email, "http://mail.local/send")]);
        let site = fixtures::site("Broker", "https://broker.example/health");
        let alert = critical_alert(&site);

        service.send_critical(&alert, &site).await.unwrap();

        let rows = log.list_for_alert(alert.id).await.unwrap();
        let whatsapp = rows
            .iter()
            .find(|r| r.channel == NotificationChannel::Whatsapp)
            .unwrap();
        assert_eq!(whatsapp.status, NotificationStatus::Failed);
        assert!(whatsapp.error_message.is_some());
    }

    #[tokio::test]
    async fn failed_email_is_logged_and_reported() {
        let (service, _, log) = service(&[(NotificationChannel::Email, "http://broken.local/send")]);
        let site = fixtures::site("Broker", "https://broker.example/health");
        let alert = critical_alert(&site);

        let err = service.send_critical(&alert, &site).await.unwrap_err();
        assert!(matches!(err, NotificationError::SenderError(_)));

        let rows = log.list_for_alert(alert.id).await.unwrap();
        let email = rows
            .iter()
            .find(|r| r.channel == NotificationChannel::Email)
            .unwrap();
        assert_eq!(email.status, NotificationStatus::Failed);
        assert!(email.error_message.as_deref().unwrap().contains("gateway down"));
    }

    #[tokio::test]
    async fn unconfigured_channel_is_recorded_as_failed() {
        let (service, sender, log) = service(&[]);
        let site = fixtures::site("Broker", "https://broker.example/health");
        let alert = critical_alert(&site);

        let err = service
            .send(&alert, &site, NotificationChannel::Push)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            NotificationError::ChannelNotConfigured(NotificationChannel::Push)
        ));
        assert!(sender.sent.lock().await.is_empty());
        assert_eq!(log.all().await[0].status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn escalation_goes_to_ops_and_recovery_to_site_contact() {
        let (service, sender, _) = service(&[(NotificationChannel::Email, "http://mail.local/send")]);
        let mut site = fixtures::site("Broker", "https://broker.example/health");
        site.contact_email = Some("owner@broker.example".into());
        let alert = critical_alert(&site);

        service.send_escalation(&alert, &site).await.unwrap();
        service.send_recovery(&alert, &site).await.unwrap();

        let sent = sender.sent.lock().await;
        assert_eq!(sent[0].recipient, "ops@example.com");
        assert!(sent[0].subject.as_deref().unwrap().starts_with("ESCALATION"));
        assert_eq!(sent[1].recipient, "owner@broker.example");
        assert_eq!(sent[1].subject.as_deref(), Some("Recovered: Broker"));
    }
}
