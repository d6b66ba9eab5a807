//! Admin review workflow.
//!
//! A review persists the new status, response and (for audiences) meeting
//! date, then makes exactly one notification attempt when the status actually
//! changed. The saved record is never rolled back if that attempt fails.

use serde::Serialize;

use super::db::DbHandle;
use super::models::{Grievance, MeetingRequest, RecordKind};
use super::notify::{NotificationRequest, Notifier};
use super::validation::{GrievanceReviewForm, MeetingReviewForm};
use crate::errors::PortalError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Status unchanged, nothing sent.
    NotAttempted,
    Sent,
    Failed { error: String },
}

impl NotificationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, NotificationOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome<T> {
    pub record: T,
    pub previous_status: String,
    pub notification: NotificationOutcome,
}

impl<T> ReviewOutcome<T> {
    /// Message shown to the admin after saving.
    pub fn message(&self) -> String {
        match &self.notification {
            NotificationOutcome::NotAttempted => "Enregistré".to_string(),
            NotificationOutcome::Sent => "Enregistré, notification envoyée".to_string(),
            NotificationOutcome::Failed { error } => {
                format!("Enregistré, mais la notification a échoué : {}", error)
            }
        }
    }
}

pub async fn review_grievance(
    db: &DbHandle,
    notifier: &Notifier,
    id: i64,
    form: GrievanceReviewForm,
) -> Result<ReviewOutcome<Grievance>, PortalError> {
    let original = db
        .call(move |db| db.get_grievance(id))
        .await?
        .ok_or(PortalError::GrievanceNotFound { id })?;

    let review = form.validate().map_err(PortalError::Validation)?;

    let updated = db
        .call(move |db| db.update_grievance_review(id, review.status, review.response.as_deref()))
        .await?;
    tracing::info!(
        id,
        from = %original.status,
        to = %updated.status,
        "doléance reviewed"
    );

    let notification = if updated.status != original.status {
        let request = NotificationRequest {
            kind: RecordKind::Doleance.to_string(),
            id: updated.id.to_string(),
            new_status: updated.status.to_string(),
            response: updated.response.clone().unwrap_or_default(),
            user_email: updated.email.clone(),
            user_name: updated.full_name(),
            admin_email: notifier.admin_email().unwrap_or_default().to_string(),
            ..Default::default()
        };
        attempt(notifier, request).await
    } else {
        NotificationOutcome::NotAttempted
    };

    Ok(ReviewOutcome {
        record: updated,
        previous_status: original.status.to_string(),
        notification,
    })
}

pub async fn review_meeting(
    db: &DbHandle,
    notifier: &Notifier,
    id: i64,
    form: MeetingReviewForm,
) -> Result<ReviewOutcome<MeetingRequest>, PortalError> {
    let original = db
        .call(move |db| db.get_meeting_request(id))
        .await?
        .ok_or(PortalError::MeetingNotFound { id })?;

    let review = form.validate().map_err(PortalError::Validation)?;

    let updated = db
        .call(move |db| {
            db.update_meeting_review(
                id,
                review.status,
                review.response.as_deref(),
                review.meeting_date,
            )
        })
        .await?;
    tracing::info!(
        id,
        from = %original.status,
        to = %updated.status,
        "audience reviewed"
    );

    let notification = if updated.status != original.status {
        let request = NotificationRequest {
            kind: RecordKind::Audience.to_string(),
            id: updated.id.to_string(),
            new_status: updated.status.to_string(),
            response: updated.response.clone().unwrap_or_default(),
            user_email: updated.email.clone(),
            user_name: updated.full_name(),
            admin_email: notifier.admin_email().unwrap_or_default().to_string(),
            ..Default::default()
        };
        attempt(notifier, request).await
    } else {
        NotificationOutcome::NotAttempted
    };

    Ok(ReviewOutcome {
        record: updated,
        previous_status: original.status.to_string(),
        notification,
    })
}

async fn attempt(notifier: &Notifier, request: NotificationRequest) -> NotificationOutcome {
    let response = notifier.notify(request).await;
    if response.success {
        NotificationOutcome::Sent
    } else {
        NotificationOutcome::Failed {
            error: response.error.unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}
