use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Wire format for meeting dates: local time, minute precision.
pub const MEETING_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Parse a meeting date as sent by the admin date picker.
///
/// Accepts `2025-10-14T14:30` and `2025-10-14T14:30:00`.
pub fn parse_meeting_date(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, MEETING_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| format!("Invalid meeting date: {}", s))
}

// ── Submission kinds ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Doleance,
    Audience,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doleance => "doleance",
            Self::Audience => "audience",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doleance" => Ok(Self::Doleance),
            "audience" => Ok(Self::Audience),
            _ => Err(format!("Invalid record type: {}", s)),
        }
    }
}

// ── Grievances (doléances) ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrievanceStatus {
    #[default]
    Submitted,
    InProgress,
    Completed,
    Rejected,
}

impl GrievanceStatus {
    pub const ALL: [GrievanceStatus; 4] = [
        Self::Submitted,
        Self::InProgress,
        Self::Completed,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Label shown to citizens in notification emails.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted => "Reçue",
            Self::InProgress => "En cours de traitement",
            Self::Completed => "Traitée",
            Self::Rejected => "Rejetée",
        }
    }
}

impl std::fmt::Display for GrievanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrievanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid doléance status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grievance {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub subject: String,
    pub category: Option<String>,
    pub message: String,
    pub status: GrievanceStatus,
    pub response: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Grievance {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A validated, trimmed grievance ready for insertion.
#[derive(Debug, Clone, Default)]
pub struct NewGrievance {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub subject: String,
    pub category: Option<String>,
    pub message: String,
}

// ── Meeting requests (audiences) ──────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl MeetingStatus {
    pub const ALL: [MeetingStatus; 4] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "En attente",
            Self::Approved => "Acceptée",
            Self::Rejected => "Refusée",
            Self::Completed => "Terminée",
        }
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid audience status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub subject: String,
    pub message: String,
    pub preferred_dates: Option<String>,
    pub status: MeetingStatus,
    pub response: Option<String>,
    pub meeting_date: Option<NaiveDateTime>,
    pub created_at: String,
    pub updated_at: String,
}

impl MeetingRequest {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewMeetingRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub subject: String,
    pub message: String,
    pub preferred_dates: Option<String>,
}

// ── News ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub published: bool,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Full set of editable news fields. Updates overwrite every field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsInput {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub published: bool,
}

// ── Initiatives ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitiativeKind {
    WrittenQuestion,
    OralQuestion,
    InquiryCommission,
    BillProposal,
}

impl InitiativeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrittenQuestion => "written_question",
            Self::OralQuestion => "oral_question",
            Self::InquiryCommission => "inquiry_commission",
            Self::BillProposal => "bill_proposal",
        }
    }
}

impl std::fmt::Display for InitiativeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitiativeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "written_question" => Ok(Self::WrittenQuestion),
            "oral_question" => Ok(Self::OralQuestion),
            "inquiry_commission" => Ok(Self::InquiryCommission),
            "bill_proposal" => Ok(Self::BillProposal),
            _ => Err(format!("Invalid initiative kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiative {
    pub id: i64,
    pub kind: InitiativeKind,
    pub title: String,
    pub description: String,
    pub legislature: i32,
    pub reference: Option<String>,
    pub ministry: Option<String>,
    pub answer: Option<String>,
    pub document_url: Option<String>,
    pub submitted_on: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiativeInput {
    pub kind: InitiativeKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub legislature: i32,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub ministry: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub submitted_on: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegislatureSummary {
    pub legislature: i32,
    pub initiative_count: i64,
}

// ── Notification log ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Rejected,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid delivery status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub request_id: String,
    pub record_kind: RecordKind,
    pub record_id: i64,
    pub new_status: String,
    pub recipient: String,
    pub delivery: DeliveryStatus,
    pub error: Option<String>,
    pub created_at: String,
}

// ── Listing and pagination ────────────────────────────────────────────

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Requested page window, 1-based, with `per_page` clamped to `1..=MAX_PER_PAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        let per_page = request.per_page as i64;
        let total_pages = ((total + per_page - 1) / per_page) as u32;
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GrievanceFilter {
    pub status: Option<GrievanceStatus>,
    pub search: Option<String>,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Default)]
pub struct MeetingFilter {
    pub status: Option<MeetingStatus>,
    pub search: Option<String>,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Default)]
pub struct NewsFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    /// Admin listings include drafts; public ones never do.
    pub include_drafts: bool,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Default)]
pub struct InitiativeFilter {
    pub kind: Option<InitiativeKind>,
    pub legislature: Option<i32>,
    pub search: Option<String>,
    pub page: PageRequest,
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub doleances: Vec<StatusCount>,
    pub audiences: Vec<StatusCount>,
}
