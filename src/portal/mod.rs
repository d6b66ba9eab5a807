//! Constituency office back end.
//!
//! ## Overview
//!
//! Citizens submit doléances (written grievances) and audience requests,
//! and read published news and the catalog of parliamentary initiatives.
//! Staff review submissions from an admin dashboard; every status change
//! triggers one email notification to the citizen.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Public  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │  site /  │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! │  admin   │ WebSocket│         │   auth.rs (bearer token middleware)  │
//! └──────────┘          │         │                                        │
//!                       │         │ review_grievance() / review_meeting() │
//!                       │         v                                        │
//!                       │  review.rs  (persist, then notify once)          │
//!                       │         │                                        │
//!                       │         │ Notifier::notify()                     │
//!                       │         v                                        │
//!                       │  notify.rs  (re-fetch, check, render, log)       │
//!                       │         │                                        │
//!                       │         │ Mailer::send()                         │
//!                       │         v                                        │
//!                       │  mailer.rs  (HttpMailer | LogMailer)             │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | `models`     | Records, status enums with French labels, pagination    |
//! | `validation` | Form checks returning every field error at once         |
//! | `db`         | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)     |
//! | `email`      | Email payload and HTML / plain-text rendering           |
//! | `ws`         | `WsMessage` enum + `broadcast_message()` helper         |
//!
//! ## Review Flow (admin saves a doléance as "completed")
//!
//! 1. `PATCH /api/admin/doleances/{id}` → `api::admin_review_grievance()`
//! 2. `review::review_grievance()` loads the record, validates the form and
//!    writes status and response.
//! 3. The status differs from the stored one, so exactly one
//!    `Notifier::notify()` call follows. The notifier re-reads the record,
//!    checks the stored status matches, renders the email and sends it.
//! 4. The attempt lands in `notification_log` whatever its outcome. A failed
//!    send is reported back ("saved but notification failed"); the saved
//!    review stays.

pub mod api;
pub mod auth;
pub mod db;
pub mod email;
pub mod mailer;
pub mod models;
pub mod notify;
pub mod review;
pub mod server;
pub mod validation;
pub mod ws;
