//! Status-change notifications.
//!
//! One send path: `Notifier::notify` re-fetches the record, checks that the
//! stored status matches the requested one, renders the email from the stored
//! record and hands it to the configured `Mailer`. Every attempt, delivered or
//! not, is written to the notification log.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::db::DbHandle;
use super::email::{
    EmailEnvelope, EmailSettings, compose_grievance_email, compose_meeting_email, render,
    render_admin_alert,
};
use super::mailer::Mailer;
use super::models::{DeliveryStatus, RecordKind};
use super::validation::is_valid_email;
use super::ws::{WsMessage, broadcast_message};
use crate::errors::NotificationError;

/// Notification request as sent by the admin dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub new_status: String,
    /// Staff member behind the send. Checked and logged, never mailed.
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub reply_to_email: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: &NotificationError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    db: DbHandle,
    mailer: Arc<dyn Mailer>,
    settings: EmailSettings,
    admin_email: Option<String>,
    ws_tx: broadcast::Sender<String>,
}

impl Notifier {
    pub fn new(
        db: DbHandle,
        mailer: Arc<dyn Mailer>,
        settings: EmailSettings,
        ws_tx: broadcast::Sender<String>,
    ) -> Self {
        Self {
            db,
            mailer,
            settings,
            admin_email: None,
            ws_tx,
        }
    }

    /// Also email `admin_email` whenever a citizen submits something new.
    pub fn with_admin_alerts(mut self, admin_email: &str) -> Self {
        let admin_email = admin_email.trim();
        self.admin_email = (!admin_email.is_empty()).then(|| admin_email.to_string());
        self
    }

    pub fn admin_email(&self) -> Option<&str> {
        self.admin_email.as_deref()
    }

    pub fn mailer_name(&self) -> &'static str {
        self.mailer.name()
    }

    /// Validate, render and send one notification. Never fails the caller:
    /// every problem is reported through `success: false`.
    pub async fn notify(&self, request: NotificationRequest) -> NotificationResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        let kind = request.kind.parse::<RecordKind>().ok();
        let record_id = request.id.trim().parse::<i64>().ok();

        let outcome = self.try_notify(&request).await;
        let (delivery, recipient, error) = match &outcome {
            Ok(recipient) => (DeliveryStatus::Sent, recipient.clone(), None),
            Err(e) if e.is_rejection() => (DeliveryStatus::Rejected, String::new(), Some(e.to_string())),
            Err(e) => (DeliveryStatus::Failed, String::new(), Some(e.to_string())),
        };

        match &outcome {
            Ok(recipient) => tracing::info!(
                request_id = %request_id,
                kind = %request.kind,
                id = %request.id,
                status = %request.new_status,
                by = %request.admin_email,
                to = %recipient,
                "notification sent"
            ),
            Err(e) => tracing::warn!(
                request_id = %request_id,
                kind = %request.kind,
                id = %request.id,
                status = %request.new_status,
                by = %request.admin_email,
                error = %e,
                "notification not delivered"
            ),
        }

        // Requests that do not name a real record type/id cannot be logged against one.
        if let (Some(kind), Some(record_id)) = (kind, record_id) {
            let log_request_id = request_id.clone();
            let new_status = request.new_status.clone();
            let log_error = error.clone();
            let logged = self
                .db
                .call(move |db| {
                    db.record_notification(
                        &log_request_id,
                        kind,
                        record_id,
                        &new_status,
                        &recipient,
                        delivery,
                        log_error.as_deref(),
                    )
                })
                .await;
            match logged {
                Ok(record) => broadcast_message(
                    &self.ws_tx,
                    &WsMessage::NotificationAttempted { record },
                ),
                Err(e) => tracing::error!(request_id = %request_id, "failed to log notification: {:#}", e),
            }
        }

        match outcome {
            Ok(_) => NotificationResponse::ok(),
            Err(e) => NotificationResponse::failed(&e),
        }
    }

    /// Best effort: a failed alert is logged and otherwise ignored.
    pub async fn alert_admin(&self, kind: RecordKind, id: i64, submitter: &str, subject: &str) {
        let Some(admin_email) = self.admin_email.as_deref() else {
            return;
        };
        let email = render_admin_alert(kind, id, submitter, subject, &self.settings, admin_email);
        if let Err(e) = self.mailer.send(&email).await {
            tracing::warn!(kind = %kind, id, "admin alert not delivered: {:#}", e);
        }
    }

    /// Returns the recipient address on successful delivery.
    async fn try_notify(&self, request: &NotificationRequest) -> Result<String, NotificationError> {
        let envelope = self.validate(request).await?;
        let email = render(&envelope, &self.settings.from_email);
        self.mailer
            .send(&email)
            .await
            .map_err(NotificationError::Delivery)?;
        Ok(email.to)
    }

    /// Re-fetch the record and build the envelope from what is stored.
    async fn validate(&self, request: &NotificationRequest) -> Result<EmailEnvelope, NotificationError> {
        let kind: RecordKind = request
            .kind
            .parse()
            .map_err(NotificationError::InvalidRequest)?;
        let id: i64 = request.id.trim().parse().map_err(|_| {
            NotificationError::InvalidRequest(format!("Invalid record id: {}", request.id))
        })?;

        let admin = request.admin_email.trim();
        if !admin.is_empty() && !is_valid_email(admin) {
            return Err(NotificationError::InvalidRequest(format!(
                "Invalid admin email: {}",
                admin
            )));
        }

        let mut settings = self.settings.clone();
        let reply_to = request.reply_to_email.trim();
        if !reply_to.is_empty() {
            if !is_valid_email(reply_to) {
                return Err(NotificationError::InvalidRequest(format!(
                    "Invalid reply-to email: {}",
                    reply_to
                )));
            }
            settings.reply_to = reply_to.to_string();
        }

        let envelope = match kind {
            RecordKind::Doleance => {
                let grievance = self
                    .db
                    .call(move |db| db.get_grievance(id))
                    .await
                    .map_err(NotificationError::Database)?
                    .ok_or_else(|| NotificationError::RecordNotFound {
                        kind: kind.to_string(),
                        id,
                    })?;
                if grievance.status.as_str() != request.new_status {
                    return Err(NotificationError::StatusMismatch {
                        stored: grievance.status.to_string(),
                        requested: request.new_status.clone(),
                    });
                }
                compose_grievance_email(&grievance, &settings)
            }
            RecordKind::Audience => {
                let meeting = self
                    .db
                    .call(move |db| db.get_meeting_request(id))
                    .await
                    .map_err(NotificationError::Database)?
                    .ok_or_else(|| NotificationError::RecordNotFound {
                        kind: kind.to_string(),
                        id,
                    })?;
                if meeting.status.as_str() != request.new_status {
                    return Err(NotificationError::StatusMismatch {
                        stored: meeting.status.to_string(),
                        requested: request.new_status.clone(),
                    });
                }
                compose_meeting_email(&meeting, &settings)
            }
        };

        if !is_valid_email(&envelope.recipient_email) {
            return Err(NotificationError::InvalidRecipient(
                envelope.recipient_email.clone(),
            ));
        }
        Ok(envelope)
    }
}
