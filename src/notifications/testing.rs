use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::senders::SenderError;
use super::service::{NotificationError, Notifier};
use crate::db::enums::NotificationChannel;
use crate::db::models::{Alert, Site};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Critical,
    Channel(NotificationChannel),
    Recovery,
    Escalation,
}

/// Notifier double that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(Sent, Uuid)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(Sent, Uuid)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: Sent) -> usize {
        self.calls().iter().filter(|(k, _)| *k == kind).count()
    }

    fn record(&self, kind: Sent, alert: &Alert) -> Result<(), NotificationError> {
        self.calls.lock().unwrap().push((kind, alert.id));
        if self.failing.load(Ordering::SeqCst) {
            Err(SenderError::SendFailed("simulated outage".into()).into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_critical(&self, alert: &Alert, _site: &Site) -> Result<(), NotificationError> {
        self.record(Sent::Critical, alert)
    }

    async fn send(
        &self,
        alert: &Alert,
        _site: &Site,
        channel: NotificationChannel,
    ) -> Result<(), NotificationError> {
        self.record(Sent::Channel(channel), alert)
    }

    async fn send_recovery(&self, alert: &Alert, _site: &Site) -> Result<(), NotificationError> {
        self.record(Sent::Recovery, alert)
    }

    async fn send_escalation(&self, alert: &Alert, _site: &Site) -> Result<(), NotificationError> {
        self.record(Sent::Escalation, alert)
    }
}
