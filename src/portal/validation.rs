//! Form validation for citizen submissions and admin reviews.
//!
//! Every check runs before anything touches the database. Validation collects
//! all field errors at once so a form can highlight every problem in one pass.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::models::{
    GrievanceStatus, InitiativeInput, MeetingStatus, NewGrievance, NewMeetingRequest, NewsInput,
    parse_meeting_date,
};

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").unwrap());

static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+().\- ]+$").unwrap());

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_MESSAGE_LEN: usize = 5000;
pub const MAX_PHONE_LEN: usize = 30;
pub const MAX_SHORT_FIELD_LEN: usize = 200;
pub const MAX_ARTICLE_LEN: usize = 50_000;
pub const MAX_URL_LEN: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn required(&mut self, field: &str, value: &str, max: usize) -> String {
        let value = value.trim();
        if value.is_empty() {
            self.errors.push(FieldError::new(field, "Ce champ est obligatoire"));
        } else if value.chars().count() > max {
            self.errors.push(FieldError::new(
                field,
                &format!("{} caractères maximum", max),
            ));
        }
        value.to_string()
    }

    fn optional(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        if value.chars().count() > max {
            self.errors.push(FieldError::new(
                field,
                &format!("{} caractères maximum", max),
            ));
        }
        Some(value.to_string())
    }

    /// Free text kept exactly as typed; blank means absent.
    fn verbatim(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        let value = value.filter(|v| !v.trim().is_empty())?;
        if value.chars().count() > max {
            self.errors.push(FieldError::new(
                field,
                &format!("{} caractères maximum", max),
            ));
        }
        Some(value.to_string())
    }

    fn email(&mut self, value: &str) -> String {
        let value = value.trim();
        if value.is_empty() {
            self.errors.push(FieldError::new("email", "Ce champ est obligatoire"));
        } else if !is_valid_email(value) {
            self.errors.push(FieldError::new("email", "Adresse email invalide"));
        }
        value.to_string()
    }

    fn phone(&mut self, value: Option<&str>) -> Option<String> {
        let phone = self.optional("phone", value, MAX_PHONE_LEN)?;
        if !PHONE_REGEX.is_match(&phone) {
            self.errors.push(FieldError::new("phone", "Numéro de téléphone invalide"));
        }
        Some(phone)
    }

    fn finish<T>(self, value: T) -> Result<T, Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self.errors)
        }
    }
}

/// Grievance form as posted by the public site.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrievanceForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    #[serde(default)]
    pub subject: String,
    pub category: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl GrievanceForm {
    pub fn validate(&self) -> Result<NewGrievance, Vec<FieldError>> {
        let mut c = Checker::default();
        let grievance = NewGrievance {
            first_name: c.required("first_name", &self.first_name, MAX_NAME_LEN),
            last_name: c.required("last_name", &self.last_name, MAX_NAME_LEN),
            email: c.email(&self.email),
            phone: c.phone(self.phone.as_deref()),
            postal_code: c.optional("postal_code", self.postal_code.as_deref(), 10),
            city: c.optional("city", self.city.as_deref(), MAX_NAME_LEN),
            subject: c.required("subject", &self.subject, MAX_SUBJECT_LEN),
            category: c.optional("category", self.category.as_deref(), MAX_SHORT_FIELD_LEN),
            message: c.required("message", &self.message, MAX_MESSAGE_LEN),
        };
        c.finish(grievance)
    }
}

/// Meeting-request form as posted by the public site.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeetingForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub organization: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    pub preferred_dates: Option<String>,
}

impl MeetingForm {
    pub fn validate(&self) -> Result<NewMeetingRequest, Vec<FieldError>> {
        let mut c = Checker::default();
        let request = NewMeetingRequest {
            first_name: c.required("first_name", &self.first_name, MAX_NAME_LEN),
            last_name: c.required("last_name", &self.last_name, MAX_NAME_LEN),
            email: c.email(&self.email),
            phone: c.phone(self.phone.as_deref()),
            organization: c.optional(
                "organization",
                self.organization.as_deref(),
                MAX_SHORT_FIELD_LEN,
            ),
            subject: c.required("subject", &self.subject, MAX_SUBJECT_LEN),
            message: c.required("message", &self.message, MAX_MESSAGE_LEN),
            preferred_dates: c.optional(
                "preferred_dates",
                self.preferred_dates.as_deref(),
                MAX_SHORT_FIELD_LEN,
            ),
        };
        c.finish(request)
    }
}

/// Admin review of a grievance, as sent from the detail modal.
#[derive(Debug, Clone, Deserialize)]
pub struct GrievanceReviewForm {
    pub status: String,
    pub response: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrievanceReview {
    pub status: GrievanceStatus,
    pub response: Option<String>,
}

impl GrievanceReviewForm {
    pub fn validate(&self) -> Result<GrievanceReview, Vec<FieldError>> {
        let mut c = Checker::default();
        let status = GrievanceStatus::from_str(&self.status).map_err(|e| {
            c.errors.push(FieldError::new("status", &e));
        });
        let response = c.verbatim("response", self.response.as_deref(), MAX_MESSAGE_LEN);
        match status {
            Ok(status) => c.finish(GrievanceReview { status, response }),
            Err(()) => Err(c.errors),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeetingReviewForm {
    pub status: String,
    pub response: Option<String>,
    pub meeting_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeetingReview {
    pub status: MeetingStatus,
    pub response: Option<String>,
    pub meeting_date: Option<NaiveDateTime>,
}

impl MeetingReviewForm {
    pub fn validate(&self) -> Result<MeetingReview, Vec<FieldError>> {
        let mut c = Checker::default();
        let status = MeetingStatus::from_str(&self.status).map_err(|e| {
            c.errors.push(FieldError::new("status", &e));
        });
        let response = c.verbatim("response", self.response.as_deref(), MAX_MESSAGE_LEN);
        let meeting_date = match self
            .meeting_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            Some(raw) => match parse_meeting_date(raw) {
                Ok(date) => Some(date),
                Err(e) => {
                    c.errors.push(FieldError::new("meeting_date", &e));
                    None
                }
            },
            None => None,
        };
        match status {
            Ok(status) => c.finish(MeetingReview {
                status,
                response,
                meeting_date,
            }),
            Err(()) => Err(c.errors),
        }
    }
}

/// Admin news editor input.
pub fn validate_news(input: &NewsInput) -> Result<NewsInput, Vec<FieldError>> {
    let mut c = Checker::default();
    let article = NewsInput {
        title: c.required("title", &input.title, MAX_SUBJECT_LEN),
        summary: input.summary.trim().to_string(),
        content: c.required("content", &input.content, MAX_ARTICLE_LEN),
        category: c.optional("category", input.category.as_deref(), MAX_SHORT_FIELD_LEN),
        image_url: c.optional("image_url", input.image_url.as_deref(), MAX_URL_LEN),
        published: input.published,
    };
    c.finish(article)
}

/// Admin initiative editor input.
pub fn validate_initiative(input: &InitiativeInput) -> Result<InitiativeInput, Vec<FieldError>> {
    let mut c = Checker::default();
    if input.legislature <= 0 {
        c.errors
            .push(FieldError::new("legislature", "Numéro de législature invalide"));
    }
    let submitted_on = c.optional("submitted_on", input.submitted_on.as_deref(), 10);
    if let Some(date) = submitted_on.as_deref()
        && chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err()
    {
        c.errors
            .push(FieldError::new("submitted_on", "Date invalide (AAAA-MM-JJ)"));
    }
    let initiative = InitiativeInput {
        kind: input.kind,
        title: c.required("title", &input.title, MAX_SUBJECT_LEN * 2),
        description: input.description.trim().to_string(),
        legislature: input.legislature,
        reference: c.optional("reference", input.reference.as_deref(), MAX_SHORT_FIELD_LEN),
        ministry: c.optional("ministry", input.ministry.as_deref(), MAX_SHORT_FIELD_LEN),
        answer: c.optional("answer", input.answer.as_deref(), MAX_ARTICLE_LEN),
        document_url: c.optional("document_url", input.document_url.as_deref(), MAX_URL_LEN),
        submitted_on,
    };
    c.finish(initiative)
}
