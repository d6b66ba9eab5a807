use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::models::*;
use crate::errors::PortalError;

/// Shared connection for async handlers. Each call runs on the blocking pool.
#[derive(Clone)]
pub struct DbHandle(Arc<Mutex<PortalDb>>);

impl DbHandle {
    pub fn new(db: PortalDb) -> Self {
        Self(Arc::new(Mutex::new(db)))
    }

    /// A closure that panics poisons the handle; later calls get `LockPoisoned`.
    pub async fn call<F, R>(&self, f: F) -> Result<R, PortalError>
    where
        F: FnOnce(&PortalDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let shared = Arc::clone(&self.0);
        tokio::task::spawn_blocking(move || {
            let db = shared.lock().map_err(|_| PortalError::LockPoisoned)?;
            f(&db).map_err(PortalError::Database)
        })
        .await
        .unwrap_or_else(|e| {
            Err(PortalError::Database(
                anyhow::Error::new(e).context("database task panicked"),
            ))
        })
    }
}

pub struct PortalDb {
    conn: Connection,
}

const GRIEVANCE_COLUMNS: &str = "id, first_name, last_name, email, phone, postal_code, city, subject, category, message, status, response, created_at, updated_at";

const MEETING_COLUMNS: &str = "id, first_name, last_name, email, phone, organization, subject, message, preferred_dates, status, response, meeting_date, created_at, updated_at";

const NEWS_COLUMNS: &str =
    "id, title, summary, content, category, image_url, published, published_at, created_at, updated_at";

const INITIATIVE_COLUMNS: &str = "id, kind, title, description, legislature, reference, ministry, answer, document_url, submitted_on, created_at, updated_at";

const MEETING_DATE_STORAGE: &str = "%Y-%m-%dT%H:%M:%S";

/// Build a `LIKE` pattern matching `term` anywhere, with `%`/`_` escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Accumulates `WHERE` fragments and their positional parameters.
#[derive(Default)]
struct WhereClause {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl WhereClause {
    fn eq(&mut self, column: &str, value: Value) {
        self.values.push(value);
        self.clauses.push(format!("{} = ?{}", column, self.values.len()));
    }

    fn search(&mut self, columns: &[&str], term: Option<&str>) {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return;
        };
        self.values.push(Value::Text(like_pattern(term)));
        let n = self.values.len();
        let ors: Vec<String> = columns
            .iter()
            .map(|c| format!("{} LIKE ?{} ESCAPE '\\'", c, n))
            .collect();
        self.clauses.push(format!("({})", ors.join(" OR ")));
    }

    fn raw(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

impl PortalDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS grievances (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    phone TEXT,
                    postal_code TEXT,
                    city TEXT,
                    subject TEXT NOT NULL,
                    category TEXT,
                    message TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'submitted',
                    response TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS meeting_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    phone TEXT,
                    organization TEXT,
                    subject TEXT NOT NULL,
                    message TEXT NOT NULL,
                    preferred_dates TEXT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    response TEXT,
                    meeting_date TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS news_articles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    summary TEXT NOT NULL DEFAULT '',
                    content TEXT NOT NULL,
                    category TEXT,
                    image_url TEXT,
                    published INTEGER NOT NULL DEFAULT 0,
                    published_at TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS initiatives (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    legislature INTEGER NOT NULL,
                    reference TEXT,
                    ministry TEXT,
                    answer TEXT,
                    document_url TEXT,
                    submitted_on TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS notification_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    request_id TEXT NOT NULL,
                    record_kind TEXT NOT NULL,
                    record_id INTEGER NOT NULL,
                    new_status TEXT NOT NULL,
                    recipient TEXT NOT NULL DEFAULT '',
                    delivery TEXT NOT NULL,
                    error TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_grievances_status ON grievances(status);
                CREATE INDEX IF NOT EXISTS idx_meeting_requests_status ON meeting_requests(status);
                CREATE INDEX IF NOT EXISTS idx_news_published ON news_articles(published, published_at);
                CREATE INDEX IF NOT EXISTS idx_initiatives_legislature ON initiatives(legislature, kind);
                CREATE INDEX IF NOT EXISTS idx_notification_log_record ON notification_log(record_kind, record_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    fn count(&self, table: &str, filter: &WhereClause) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} {}", table, filter.sql());
        self.conn
            .query_row(&sql, params_from_iter(filter.values.iter()), |row| row.get(0))
            .with_context(|| format!("Failed to count {}", table))
    }

    fn count_by_status(&self, table: &str, statuses: &[&str]) -> Result<Vec<StatusCount>> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE status = ?1", table);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare status count for {}", table))?;
        let mut counts = Vec::with_capacity(statuses.len());
        for status in statuses {
            let count: i64 = stmt
                .query_row(params![status], |row| row.get(0))
                .with_context(|| format!("Failed to count {} by status", table))?;
            counts.push(StatusCount {
                status: status.to_string(),
                count,
            });
        }
        Ok(counts)
    }

    // ── Grievance CRUD ────────────────────────────────────────────────

    pub fn create_grievance(&self, g: &NewGrievance) -> Result<Grievance> {
        self.conn
            .execute(
                "INSERT INTO grievances (first_name, last_name, email, phone, postal_code, city, subject, category, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    g.first_name,
                    g.last_name,
                    g.email,
                    g.phone,
                    g.postal_code,
                    g.city,
                    g.subject,
                    g.category,
                    g.message
                ],
            )
            .context("Failed to insert grievance")?;
        let id = self.conn.last_insert_rowid();
        self.get_grievance(id)?
            .context("Grievance not found after insert")
    }

    pub fn get_grievance(&self, id: i64) -> Result<Option<Grievance>> {
        let sql = format!("SELECT {} FROM grievances WHERE id = ?1", GRIEVANCE_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], GrievanceRow::from_row)
            .optional()
            .context("Failed to query grievance")?;
        row.map(GrievanceRow::into_grievance).transpose()
    }

    pub fn list_grievances(&self, filter: &GrievanceFilter) -> Result<Page<Grievance>> {
        let mut wc = WhereClause::default();
        if let Some(status) = filter.status {
            wc.eq("status", Value::Text(status.as_str().to_string()));
        }
        wc.search(
            &["first_name", "last_name", "email", "subject", "message"],
            filter.search.as_deref(),
        );
        let total = self.count("grievances", &wc)?;

        let sql = format!(
            "SELECT {} FROM grievances {} ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
            GRIEVANCE_COLUMNS,
            wc.sql(),
            filter.page.limit(),
            filter.page.offset()
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_grievances")?;
        let rows = stmt
            .query_map(params_from_iter(wc.values.iter()), GrievanceRow::from_row)
            .context("Failed to query grievances")?;
        let mut items = Vec::new();
        for row in rows {
            let r = row.context("Failed to read grievance row")?;
            items.push(r.into_grievance()?);
        }
        Ok(Page::new(items, total, filter.page))
    }

    /// Full-field write of the review fields; last write wins.
    pub fn update_grievance_review(
        &self,
        id: i64,
        status: GrievanceStatus,
        response: Option<&str>,
    ) -> Result<Grievance> {
        let count = self
            .conn
            .execute(
                "UPDATE grievances SET status = ?1, response = ?2, updated_at = datetime('now') WHERE id = ?3",
                params![status.as_str(), response, id],
            )
            .context("Failed to update grievance")?;
        if count == 0 {
            anyhow::bail!("Grievance {} not found", id);
        }
        self.get_grievance(id)?
            .context("Grievance not found after update")
    }

    pub fn delete_grievance(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM grievances WHERE id = ?1", params![id])
            .context("Failed to delete grievance")?;
        Ok(count > 0)
    }

    pub fn count_grievances_by_status(&self) -> Result<Vec<StatusCount>> {
        let statuses: Vec<&str> = GrievanceStatus::ALL.iter().map(|s| s.as_str()).collect();
        self.count_by_status("grievances", &statuses)
    }

    // ── Meeting request CRUD ──────────────────────────────────────────

    pub fn create_meeting_request(&self, m: &NewMeetingRequest) -> Result<MeetingRequest> {
        self.conn
            .execute(
                "INSERT INTO meeting_requests (first_name, last_name, email, phone, organization, subject, message, preferred_dates)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    m.first_name,
                    m.last_name,
                    m.email,
                    m.phone,
                    m.organization,
                    m.subject,
                    m.message,
                    m.preferred_dates
                ],
            )
            .context("Failed to insert meeting request")?;
        let id = self.conn.last_insert_rowid();
        self.get_meeting_request(id)?
            .context("Meeting request not found after insert")
    }

    pub fn get_meeting_request(&self, id: i64) -> Result<Option<MeetingRequest>> {
        let sql = format!("SELECT {} FROM meeting_requests WHERE id = ?1", MEETING_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], MeetingRow::from_row)
            .optional()
            .context("Failed to query meeting request")?;
        row.map(MeetingRow::into_meeting_request).transpose()
    }

    pub fn list_meeting_requests(&self, filter: &MeetingFilter) -> Result<Page<MeetingRequest>> {
        let mut wc = WhereClause::default();
        if let Some(status) = filter.status {
            wc.eq("status", Value::Text(status.as_str().to_string()));
        }
        wc.search(
            &["first_name", "last_name", "email", "organization", "subject", "message"],
            filter.search.as_deref(),
        );
        let total = self.count("meeting_requests", &wc)?;

        let sql = format!(
            "SELECT {} FROM meeting_requests {} ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
            MEETING_COLUMNS,
            wc.sql(),
            filter.page.limit(),
            filter.page.offset()
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_meeting_requests")?;
        let rows = stmt
            .query_map(params_from_iter(wc.values.iter()), MeetingRow::from_row)
            .context("Failed to query meeting requests")?;
        let mut items = Vec::new();
        for row in rows {
            let r = row.context("Failed to read meeting request row")?;
            items.push(r.into_meeting_request()?);
        }
        Ok(Page::new(items, total, filter.page))
    }

    pub fn update_meeting_review(
        &self,
        id: i64,
        status: MeetingStatus,
        response: Option<&str>,
        meeting_date: Option<NaiveDateTime>,
    ) -> Result<MeetingRequest> {
        let meeting_date = meeting_date.map(|d| d.format(MEETING_DATE_STORAGE).to_string());
        let count = self
            .conn
            .execute(
                "UPDATE meeting_requests SET status = ?1, response = ?2, meeting_date = ?3, updated_at = datetime('now') WHERE id = ?4",
                params![status.as_str(), response, meeting_date, id],
            )
            .context("Failed to update meeting request")?;
        if count == 0 {
            anyhow::bail!("Meeting request {} not found", id);
        }
        self.get_meeting_request(id)?
            .context("Meeting request not found after update")
    }

    pub fn delete_meeting_request(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM meeting_requests WHERE id = ?1", params![id])
            .context("Failed to delete meeting request")?;
        Ok(count > 0)
    }

    pub fn count_meetings_by_status(&self) -> Result<Vec<StatusCount>> {
        let statuses: Vec<&str> = MeetingStatus::ALL.iter().map(|s| s.as_str()).collect();
        self.count_by_status("meeting_requests", &statuses)
    }

    // ── News CRUD ─────────────────────────────────────────────────────

    pub fn create_news(&self, input: &NewsInput) -> Result<NewsArticle> {
        self.conn
            .execute(
                "INSERT INTO news_articles (title, summary, content, category, image_url, published, published_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, CASE WHEN ?6 THEN datetime('now') ELSE NULL END)",
                params![
                    input.title,
                    input.summary,
                    input.content,
                    input.category,
                    input.image_url,
                    input.published
                ],
            )
            .context("Failed to insert news article")?;
        let id = self.conn.last_insert_rowid();
        self.get_news(id)?.context("News article not found after insert")
    }

    pub fn get_news(&self, id: i64) -> Result<Option<NewsArticle>> {
        let sql = format!("SELECT {} FROM news_articles WHERE id = ?1", NEWS_COLUMNS);
        self.conn
            .query_row(&sql, params![id], news_from_row)
            .optional()
            .context("Failed to query news article")
    }

    /// Overwrite every editable field. `published_at` is stamped on the first
    /// publication and cleared when the article goes back to draft.
    pub fn update_news(&self, id: i64, input: &NewsInput) -> Result<NewsArticle> {
        let count = self
            .conn
            .execute(
                "UPDATE news_articles SET title = ?1, summary = ?2, content = ?3, category = ?4, image_url = ?5,
                    published = ?6,
                    published_at = CASE
                        WHEN ?6 THEN COALESCE(published_at, datetime('now'))
                        ELSE NULL
                    END,
                    updated_at = datetime('now')
                 WHERE id = ?7",
                params![
                    input.title,
                    input.summary,
                    input.content,
                    input.category,
                    input.image_url,
                    input.published,
                    id
                ],
            )
            .context("Failed to update news article")?;
        if count == 0 {
            anyhow::bail!("News article {} not found", id);
        }
        self.get_news(id)?.context("News article not found after update")
    }

    pub fn delete_news(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM news_articles WHERE id = ?1", params![id])
            .context("Failed to delete news article")?;
        Ok(count > 0)
    }

    pub fn list_news(&self, filter: &NewsFilter) -> Result<Page<NewsArticle>> {
        let mut wc = WhereClause::default();
        if !filter.include_drafts {
            wc.raw("published = 1");
        }
        if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
            wc.eq("category", Value::Text(category.to_string()));
        }
        wc.search(&["title", "summary", "content"], filter.search.as_deref());
        let total = self.count("news_articles", &wc)?;

        let sql = format!(
            "SELECT {} FROM news_articles {} ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT {} OFFSET {}",
            NEWS_COLUMNS,
            wc.sql(),
            filter.page.limit(),
            filter.page.offset()
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_news")?;
        let rows = stmt
            .query_map(params_from_iter(wc.values.iter()), news_from_row)
            .context("Failed to query news articles")?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.context("Failed to read news row")?);
        }
        Ok(Page::new(items, total, filter.page))
    }

    /// Distinct categories of published articles, alphabetically.
    pub fn list_news_categories(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT category FROM news_articles
                 WHERE published = 1 AND category IS NOT NULL AND category != ''
                 ORDER BY category",
            )
            .context("Failed to prepare list_news_categories")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query news categories")?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row.context("Failed to read category row")?);
        }
        Ok(categories)
    }

    // ── Initiative CRUD ───────────────────────────────────────────────

    pub fn create_initiative(&self, input: &InitiativeInput) -> Result<Initiative> {
        self.conn
            .execute(
                "INSERT INTO initiatives (kind, title, description, legislature, reference, ministry, answer, document_url, submitted_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    input.kind.as_str(),
                    input.title,
                    input.description,
                    input.legislature,
                    input.reference,
                    input.ministry,
                    input.answer,
                    input.document_url,
                    input.submitted_on
                ],
            )
            .context("Failed to insert initiative")?;
        let id = self.conn.last_insert_rowid();
        self.get_initiative(id)?
            .context("Initiative not found after insert")
    }

    pub fn get_initiative(&self, id: i64) -> Result<Option<Initiative>> {
        let sql = format!("SELECT {} FROM initiatives WHERE id = ?1", INITIATIVE_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], InitiativeRow::from_row)
            .optional()
            .context("Failed to query initiative")?;
        row.map(InitiativeRow::into_initiative).transpose()
    }

    pub fn update_initiative(&self, id: i64, input: &InitiativeInput) -> Result<Initiative> {
        let count = self
            .conn
            .execute(
                "UPDATE initiatives SET kind = ?1, title = ?2, description = ?3, legislature = ?4, reference = ?5,
                    ministry = ?6, answer = ?7, document_url = ?8, submitted_on = ?9, updated_at = datetime('now')
                 WHERE id = ?10",
                params![
                    input.kind.as_str(),
                    input.title,
                    input.description,
                    input.legislature,
                    input.reference,
                    input.ministry,
                    input.answer,
                    input.document_url,
                    input.submitted_on,
                    id
                ],
            )
            .context("Failed to update initiative")?;
        if count == 0 {
            anyhow::bail!("Initiative {} not found", id);
        }
        self.get_initiative(id)?
            .context("Initiative not found after update")
    }

    pub fn delete_initiative(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM initiatives WHERE id = ?1", params![id])
            .context("Failed to delete initiative")?;
        Ok(count > 0)
    }

    pub fn list_initiatives(&self, filter: &InitiativeFilter) -> Result<Page<Initiative>> {
        let mut wc = WhereClause::default();
        if let Some(kind) = filter.kind {
            wc.eq("kind", Value::Text(kind.as_str().to_string()));
        }
        if let Some(legislature) = filter.legislature {
            wc.eq("legislature", Value::Integer(legislature as i64));
        }
        wc.search(
            &["title", "description", "reference", "ministry"],
            filter.search.as_deref(),
        );
        let total = self.count("initiatives", &wc)?;

        let sql = format!(
            "SELECT {} FROM initiatives {} ORDER BY COALESCE(submitted_on, created_at) DESC, id DESC LIMIT {} OFFSET {}",
            INITIATIVE_COLUMNS,
            wc.sql(),
            filter.page.limit(),
            filter.page.offset()
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_initiatives")?;
        let rows = stmt
            .query_map(params_from_iter(wc.values.iter()), InitiativeRow::from_row)
            .context("Failed to query initiatives")?;
        let mut items = Vec::new();
        for row in rows {
            let r = row.context("Failed to read initiative row")?;
            items.push(r.into_initiative()?);
        }
        Ok(Page::new(items, total, filter.page))
    }

    /// Legislatures that have at least one initiative, most recent first.
    pub fn list_legislatures(&self) -> Result<Vec<LegislatureSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT legislature, COUNT(*) FROM initiatives GROUP BY legislature ORDER BY legislature DESC",
            )
            .context("Failed to prepare list_legislatures")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegislatureSummary {
                    legislature: row.get(0)?,
                    initiative_count: row.get(1)?,
                })
            })
            .context("Failed to query legislatures")?;
        let mut legislatures = Vec::new();
        for row in rows {
            legislatures.push(row.context("Failed to read legislature row")?);
        }
        Ok(legislatures)
    }

    // ── Notification log ──────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn record_notification(
        &self,
        request_id: &str,
        kind: RecordKind,
        record_id: i64,
        new_status: &str,
        recipient: &str,
        delivery: DeliveryStatus,
        error: Option<&str>,
    ) -> Result<NotificationRecord> {
        self.conn
            .execute(
                "INSERT INTO notification_log (request_id, record_kind, record_id, new_status, recipient, delivery, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request_id,
                    kind.as_str(),
                    record_id,
                    new_status,
                    recipient,
                    delivery.as_str(),
                    error
                ],
            )
            .context("Failed to insert notification log entry")?;
        let id = self.conn.last_insert_rowid();
        let row = self
            .conn
            .query_row(
                "SELECT id, request_id, record_kind, record_id, new_status, recipient, delivery, error, created_at
                 FROM notification_log WHERE id = ?1",
                params![id],
                NotificationRow::from_row,
            )
            .context("Notification log entry not found after insert")?;
        row.into_record()
    }

    /// Notification attempts, newest first, optionally restricted to one record.
    pub fn list_notifications(
        &self,
        kind: Option<RecordKind>,
        record_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>> {
        let mut wc = WhereClause::default();
        if let Some(kind) = kind {
            wc.eq("record_kind", Value::Text(kind.as_str().to_string()));
        }
        if let Some(record_id) = record_id {
            wc.eq("record_id", Value::Integer(record_id));
        }
        let sql = format!(
            "SELECT id, request_id, record_kind, record_id, new_status, recipient, delivery, error, created_at
             FROM notification_log {} ORDER BY id DESC LIMIT {}",
            wc.sql(),
            limit
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_notifications")?;
        let rows = stmt
            .query_map(params_from_iter(wc.values.iter()), NotificationRow::from_row)
            .context("Failed to query notification log")?;
        let mut records = Vec::new();
        for row in rows {
            let r = row.context("Failed to read notification row")?;
            records.push(r.into_record()?);
        }
        Ok(records)
    }
}

// ── Row types ─────────────────────────────────────────────────────────

struct GrievanceRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    postal_code: Option<String>,
    city: Option<String>,
    subject: String,
    category: Option<String>,
    message: String,
    status: String,
    response: Option<String>,
    created_at: String,
    updated_at: String,
}

impl GrievanceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            postal_code: row.get(5)?,
            city: row.get(6)?,
            subject: row.get(7)?,
            category: row.get(8)?,
            message: row.get(9)?,
            status: row.get(10)?,
            response: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_grievance(self) -> Result<Grievance> {
        let status = GrievanceStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Grievance {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            postal_code: self.postal_code,
            city: self.city,
            subject: self.subject,
            category: self.category,
            message: self.message,
            status,
            response: self.response,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct MeetingRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    organization: Option<String>,
    subject: String,
    message: String,
    preferred_dates: Option<String>,
    status: String,
    response: Option<String>,
    meeting_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl MeetingRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            organization: row.get(5)?,
            subject: row.get(6)?,
            message: row.get(7)?,
            preferred_dates: row.get(8)?,
            status: row.get(9)?,
            response: row.get(10)?,
            meeting_date: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_meeting_request(self) -> Result<MeetingRequest> {
        let status = MeetingStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?;
        let meeting_date = self
            .meeting_date
            .as_deref()
            .map(parse_meeting_date)
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(MeetingRequest {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            organization: self.organization,
            subject: self.subject,
            message: self.message,
            preferred_dates: self.preferred_dates,
            status,
            response: self.response,
            meeting_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn news_from_row(row: &Row<'_>) -> rusqlite::Result<NewsArticle> {
    Ok(NewsArticle {
        id: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        content: row.get(3)?,
        category: row.get(4)?,
        image_url: row.get(5)?,
        published: row.get(6)?,
        published_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

struct InitiativeRow {
    id: i64,
    kind: String,
    title: String,
    description: String,
    legislature: i32,
    reference: Option<String>,
    ministry: Option<String>,
    answer: Option<String>,
    document_url: Option<String>,
    submitted_on: Option<String>,
    created_at: String,
    updated_at: String,
}

impl InitiativeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            legislature: row.get(4)?,
            reference: row.get(5)?,
            ministry: row.get(6)?,
            answer: row.get(7)?,
            document_url: row.get(8)?,
            submitted_on: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_initiative(self) -> Result<Initiative> {
        let kind = InitiativeKind::from_str(&self.kind).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Initiative {
            id: self.id,
            kind,
            title: self.title,
            description: self.description,
            legislature: self.legislature,
            reference: self.reference,
            ministry: self.ministry,
            answer: self.answer,
            document_url: self.document_url,
            submitted_on: self.submitted_on,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct NotificationRow {
    id: i64,
    request_id: String,
    record_kind: String,
    record_id: i64,
    new_status: String,
    recipient: String,
    delivery: String,
    error: Option<String>,
    created_at: String,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request_id: row.get(1)?,
            record_kind: row.get(2)?,
            record_id: row.get(3)?,
            new_status: row.get(4)?,
            recipient: row.get(5)?,
            delivery: row.get(6)?,
            error: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<NotificationRecord> {
        Ok(NotificationRecord {
            id: self.id,
            request_id: self.request_id,
            record_kind: RecordKind::from_str(&self.record_kind).map_err(|e| anyhow::anyhow!(e))?,
            record_id: self.record_id,
            new_status: self.new_status,
            recipient: self.recipient,
            delivery: DeliveryStatus::from_str(&self.delivery).map_err(|e| anyhow::anyhow!(e))?,
            error: self.error,
            created_at: self.created_at,
        })
    }
}
