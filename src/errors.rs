//! Typed error hierarchy for the constituency office back end.
//!
//! Two top-level enums cover the two failure tiers:
//! - `PortalError`: request, validation and storage failures
//! - `NotificationError`: notification validation and delivery failures

use thiserror::Error;

use crate::portal::validation::FieldError;

/// Errors surfaced by the portal API and the admin review workflow.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Doléance {id} not found")]
    GrievanceNotFound { id: i64 },

    #[error("Audience request {id} not found")]
    MeetingNotFound { id: i64 },

    #[error("News article {id} not found")]
    NewsNotFound { id: i64 },

    #[error("Initiative {id} not found")]
    InitiativeNotFound { id: i64 },

    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing or invalid admin token")]
    Unauthorized,

    #[error("Admin access is not configured")]
    AdminDisabled,
}

/// Reasons a notification attempt did not deliver an email.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid notification request: {0}")]
    InvalidRequest(String),

    #[error("{kind} {id} not found")]
    RecordNotFound { kind: String, id: i64 },

    #[error("Status mismatch: record is '{stored}', notification requested '{requested}'")]
    StatusMismatch { stored: String, requested: String },

    #[error("Invalid recipient email '{0}'")]
    InvalidRecipient(String),

    #[error("Email delivery failed: {0}")]
    Delivery(#[source] anyhow::Error),

    #[error(transparent)]
    Database(#[from] PortalError),
}

impl NotificationError {
    /// True when the attempt was stopped before any email was handed to the mailer.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, NotificationError::Delivery(_))
    }
}
