//! Outbound notifications.
//!
//! Handlers describe what happened as a [`Notification`]; a [`Notifier`]
//! decides how to deliver it. Delivery failures are logged and never fail
//! the request that triggered them.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Message templates a notifier knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Template {
    PatientReceived,
    UrgentPatient,
    VolunteerReceived,
    VolunteerApproved,
    VolunteerRejected,
    ContactReceived,
    ContactResponse,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::PatientReceived => "patient-received",
            Template::UrgentPatient => "urgent-patient",
            Template::VolunteerReceived => "volunteer-received",
            Template::VolunteerApproved => "volunteer-approved",
            Template::VolunteerRejected => "volunteer-rejected",
            Template::ContactReceived => "contact-received",
            Template::ContactResponse => "contact-response",
        }
    }
}

/// A message for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub template: Template,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, template: Template, payload: serde_json::Value) -> Self {
        Self {
            recipient: recipient.into(),
            template,
            payload,
        }
    }
}

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivers notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            recipient = %notification.recipient,
            template = notification.template.as_str(),
            payload = %notification.payload,
            "Notification"
        );
        Ok(())
    }
}

/// Send through `notifier`, logging failures.
pub async fn deliver(notifier: &dyn Notifier, notification: Notification) {
    let template = notification.template;
    if let Err(err) = notifier.send(notification).await {
        warn!(template = template.as_str(), error = %err, "Notification not delivered");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FailingNotifier, RecordingNotifier};
    use super::*;

    #[tokio::test]
    async fn test_deliver_records() {
        let notifier = RecordingNotifier::default();
        deliver(
            &notifier,
            Notification::new("a@b.com", Template::PatientReceived, serde_json::json!({})),
        )
        .await;
        assert_eq!(notifier.templates(), vec![Template::PatientReceived]);
        assert_eq!(notifier.sent()[0].recipient, "a@b.com");
    }

    #[tokio::test]
    async fn test_deliver_swallows_failure() {
        deliver(
            &FailingNotifier,
            Notification::new("a@b.com", Template::ContactResponse, serde_json::json!({})),
        )
        .await;
        assert!(LogNotifier
            .send(Notification::new("x@y.z", Template::UrgentPatient, serde_json::json!({})))
            .await
            .is_ok());
    }
}
