use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::auth::{AdminTokens, require_admin};
use super::db::DbHandle;
use super::models::*;
use super::notify::{NotificationRequest, NotificationResponse, Notifier};
use super::review::{ReviewOutcome, review_grievance, review_meeting};
use super::validation::{
    FieldError, GrievanceForm, GrievanceReviewForm, MeetingForm, MeetingReviewForm,
    validate_initiative, validate_news,
};
use super::ws::{self, WsMessage, broadcast_message};
use crate::errors::{NotificationError, PortalError};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub notifier: Notifier,
    pub admin_tokens: AdminTokens,
}

pub type SharedState = Arc<AppState>;

// ── Query and response payloads ───────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InitiativeQuery {
    pub kind: Option<String>,
    pub legislature: Option<i32>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationLogQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<i64>,
    pub limit: Option<i64>,
}

/// Acknowledgement shown to the citizen after a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmissionAck {
    pub id: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse<T> {
    #[serde(flatten)]
    pub outcome: ReviewOutcome<T>,
    pub message: String,
}

impl<T> From<ReviewOutcome<T>> for ReviewResponse<T> {
    fn from(outcome: ReviewOutcome<T>) -> Self {
        let message = outcome.message();
        Self { outcome, message }
    }
}

const NOTIFICATION_LOG_LIMIT: i64 = 50;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Validation(Vec<FieldError>),
    Unauthorized(String),
    Unavailable(String),
    Internal(String),
    /// The request could not be extracted (malformed JSON, bad query or path).
    Rejected(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Validation(fields) => {
                let body = serde_json::json!({
                    "error": format!("Validation failed on {} field(s)", fields.len()),
                    "fields": fields,
                });
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Rejected(status, msg) => (status, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        match err {
            PortalError::GrievanceNotFound { .. }
            | PortalError::MeetingNotFound { .. }
            | PortalError::NewsNotFound { .. }
            | PortalError::InitiativeNotFound { .. } => ApiError::NotFound(err.to_string()),
            PortalError::Validation(fields) => ApiError::Validation(fields),
            PortalError::BadRequest(msg) => ApiError::BadRequest(msg),
            PortalError::Unauthorized => ApiError::Unauthorized(err.to_string()),
            PortalError::AdminDisabled => ApiError::Unavailable(err.to_string()),
            PortalError::Database(ref e) => {
                tracing::error!("database failure: {:#}", e);
                ApiError::Internal(format!("{:#}", e))
            }
            PortalError::LockPoisoned => {
                tracing::error!("database lock poisoned");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

// ── Extractors ────────────────────────────────────────────────────────
//
// Axum's own extractors answer rejections in plain text; these wrappers route
// them through `ApiError` so every error body is JSON.

#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

/// Blank means no filter; anything else must parse.
fn parse_param<T: std::str::FromStr<Err = String>>(
    value: Option<&str>,
) -> Result<Option<T>, PortalError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<T>().map_err(PortalError::BadRequest))
        .transpose()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router(state: SharedState) -> Router<SharedState> {
    let admin = Router::new()
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/doleances", get(admin_list_grievances))
        .route(
            "/api/admin/doleances/{id}",
            get(admin_get_grievance)
                .patch(admin_review_grievance)
                .delete(admin_delete_grievance),
        )
        .route("/api/admin/audiences", get(admin_list_meetings))
        .route(
            "/api/admin/audiences/{id}",
            get(admin_get_meeting)
                .patch(admin_review_meeting)
                .delete(admin_delete_meeting),
        )
        .route("/api/admin/news", get(admin_list_news).post(admin_create_news))
        .route(
            "/api/admin/news/{id}",
            get(admin_get_news).patch(admin_update_news).delete(admin_delete_news),
        )
        .route(
            "/api/admin/initiatives",
            post(admin_create_initiative),
        )
        .route(
            "/api/admin/initiatives/{id}",
            patch(admin_update_initiative).delete(admin_delete_initiative),
        )
        .route(
            "/api/admin/notifications",
            get(admin_list_notifications).post(admin_send_notification),
        )
        .route("/api/admin/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(state, require_admin));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/doleances", post(submit_grievance))
        .route("/api/audiences", post(submit_meeting))
        .route("/api/news", get(list_news))
        .route("/api/news/categories", get(list_news_categories))
        .route("/api/news/{id}", get(get_news))
        .route("/api/initiatives", get(list_initiatives))
        .route("/api/initiatives/{id}", get(get_initiative))
        .route("/api/legislatures", get(list_legislatures))
        .merge(admin)
}

// ── Public handlers ───────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn submit_grievance(
    State(state): State<SharedState>,
    JsonBody(form): JsonBody<GrievanceForm>,
) -> Result<(StatusCode, Json<SubmissionAck>), ApiError> {
    let input = form.validate().map_err(ApiError::Validation)?;
    let grievance = state
        .db
        .call(move |db| db.create_grievance(&input))
        .await?;
    tracing::info!(id = grievance.id, "doléance submitted");

    broadcast_message(
        &state.ws_tx,
        &WsMessage::GrievanceSubmitted {
            grievance: grievance.clone(),
        },
    );
    let notifier = state.notifier.clone();
    let (id, name, subject) = (grievance.id, grievance.full_name(), grievance.subject.clone());
    tokio::spawn(async move {
        notifier
            .alert_admin(RecordKind::Doleance, id, &name, &subject)
            .await;
    });

    Ok((
        StatusCode::CREATED,
        Json(SubmissionAck {
            id: grievance.id,
            message: "Votre doléance a bien été envoyée. Nous reviendrons vers vous rapidement."
                .to_string(),
        }),
    ))
}

async fn submit_meeting(
    State(state): State<SharedState>,
    JsonBody(form): JsonBody<MeetingForm>,
) -> Result<(StatusCode, Json<SubmissionAck>), ApiError> {
    let input = form.validate().map_err(ApiError::Validation)?;
    let meeting = state
        .db
        .call(move |db| db.create_meeting_request(&input))
        .await?;
    tracing::info!(id = meeting.id, "audience requested");

    broadcast_message(
        &state.ws_tx,
        &WsMessage::MeetingRequested {
            meeting: meeting.clone(),
        },
    );
    let notifier = state.notifier.clone();
    let (id, name, subject) = (meeting.id, meeting.full_name(), meeting.subject.clone());
    tokio::spawn(async move {
        notifier
            .alert_admin(RecordKind::Audience, id, &name, &subject)
            .await;
    });

    Ok((
        StatusCode::CREATED,
        Json(SubmissionAck {
            id: meeting.id,
            message: "Votre demande d'audience a bien été envoyée. Nous vous recontacterons pour convenir d'un rendez-vous."
                .to_string(),
        }),
    ))
}

async fn list_news(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<NewsQuery>,
) -> Result<Json<Page<NewsArticle>>, ApiError> {
    let filter = NewsFilter {
        search: query.q,
        category: query.category,
        include_drafts: false,
        page: PageRequest::new(query.page, query.per_page),
    };
    let page = state
        .db
        .call(move |db| db.list_news(&filter))
        .await?;
    Ok(Json(page))
}

async fn list_news_categories(
    State(state): State<SharedState>,
) -> Result<Json<Vec<String>>, ApiError> {
    let categories = state
        .db
        .call(|db| db.list_news_categories())
        .await?;
    Ok(Json(categories))
}

/// Drafts are invisible on the public site.
async fn get_news(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<Json<NewsArticle>, ApiError> {
    let article = state
        .db
        .call(move |db| db.get_news(id))
        .await?
        .filter(|a| a.published)
        .ok_or(PortalError::NewsNotFound { id })?;
    Ok(Json(article))
}

async fn list_initiatives(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<InitiativeQuery>,
) -> Result<Json<Page<Initiative>>, ApiError> {
    let filter = InitiativeFilter {
        kind: parse_param(query.kind.as_deref())?,
        legislature: query.legislature,
        search: query.q,
        page: PageRequest::new(query.page, query.per_page),
    };
    let page = state
        .db
        .call(move |db| db.list_initiatives(&filter))
        .await?;
    Ok(Json(page))
}

async fn get_initiative(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<Json<Initiative>, ApiError> {
    let initiative = state
        .db
        .call(move |db| db.get_initiative(id))
        .await?
        .ok_or(PortalError::InitiativeNotFound { id })?;
    Ok(Json(initiative))
}

async fn list_legislatures(
    State(state): State<SharedState>,
) -> Result<Json<Vec<LegislatureSummary>>, ApiError> {
    let legislatures = state
        .db
        .call(|db| db.list_legislatures())
        .await?;
    Ok(Json(legislatures))
}

// ── Admin: dashboard ──────────────────────────────────────────────────

async fn admin_stats(State(state): State<SharedState>) -> Result<Json<DashboardStats>, ApiError> {
    let stats = state
        .db
        .call(|db| {
            Ok(DashboardStats {
                doleances: db.count_grievances_by_status()?,
                audiences: db.count_meetings_by_status()?,
            })
        })
        .await?;
    Ok(Json(stats))
}

// ── Admin: doléances ──────────────────────────────────────────────────

async fn admin_list_grievances(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<SubmissionQuery>,
) -> Result<Json<Page<Grievance>>, ApiError> {
    let filter = GrievanceFilter {
        status: parse_param(query.status.as_deref())?,
        search: query.q,
        page: PageRequest::new(query.page, query.per_page),
    };
    let page = state
        .db
        .call(move |db| db.list_grievances(&filter))
        .await?;
    Ok(Json(page))
}

async fn admin_get_grievance(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<Json<Grievance>, ApiError> {
    let grievance = state
        .db
        .call(move |db| db.get_grievance(id))
        .await?
        .ok_or(PortalError::GrievanceNotFound { id })?;
    Ok(Json(grievance))
}

async fn admin_review_grievance(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
    JsonBody(form): JsonBody<GrievanceReviewForm>,
) -> Result<Json<ReviewResponse<Grievance>>, ApiError> {
    let outcome = review_grievance(&state.db, &state.notifier, id, form).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::GrievanceReviewed {
            grievance: outcome.record.clone(),
            previous_status: outcome.previous_status.clone(),
        },
    );
    Ok(Json(outcome.into()))
}

async fn admin_delete_grievance(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_grievance(id))
        .await?;
    if !deleted {
        return Err(PortalError::GrievanceNotFound { id }.into());
    }
    tracing::info!(id, "doléance deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Admin: audiences ──────────────────────────────────────────────────

async fn admin_list_meetings(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<SubmissionQuery>,
) -> Result<Json<Page<MeetingRequest>>, ApiError> {
    let filter = MeetingFilter {
        status: parse_param(query.status.as_deref())?,
        search: query.q,
        page: PageRequest::new(query.page, query.per_page),
    };
    let page = state
        .db
        .call(move |db| db.list_meeting_requests(&filter))
        .await?;
    Ok(Json(page))
}

async fn admin_get_meeting(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<Json<MeetingRequest>, ApiError> {
    let meeting = state
        .db
        .call(move |db| db.get_meeting_request(id))
        .await?
        .ok_or(PortalError::MeetingNotFound { id })?;
    Ok(Json(meeting))
}

async fn admin_review_meeting(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
    JsonBody(form): JsonBody<MeetingReviewForm>,
) -> Result<Json<ReviewResponse<MeetingRequest>>, ApiError> {
    let outcome = review_meeting(&state.db, &state.notifier, id, form).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::MeetingReviewed {
            meeting: outcome.record.clone(),
            previous_status: outcome.previous_status.clone(),
        },
    );
    Ok(Json(outcome.into()))
}

async fn admin_delete_meeting(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_meeting_request(id))
        .await?;
    if !deleted {
        return Err(PortalError::MeetingNotFound { id }.into());
    }
    tracing::info!(id, "audience deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Admin: news ───────────────────────────────────────────────────────

async fn admin_list_news(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<NewsQuery>,
) -> Result<Json<Page<NewsArticle>>, ApiError> {
    let filter = NewsFilter {
        search: query.q,
        category: query.category,
        include_drafts: true,
        page: PageRequest::new(query.page, query.per_page),
    };
    let page = state
        .db
        .call(move |db| db.list_news(&filter))
        .await?;
    Ok(Json(page))
}

async fn admin_get_news(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<Json<NewsArticle>, ApiError> {
    let article = state
        .db
        .call(move |db| db.get_news(id))
        .await?
        .ok_or(PortalError::NewsNotFound { id })?;
    Ok(Json(article))
}

async fn admin_create_news(
    State(state): State<SharedState>,
    JsonBody(input): JsonBody<NewsInput>,
) -> Result<(StatusCode, Json<NewsArticle>), ApiError> {
    let input = validate_news(&input).map_err(ApiError::Validation)?;
    let article = state
        .db
        .call(move |db| db.create_news(&input))
        .await?;
    tracing::info!(id = article.id, published = article.published, "news article created");
    Ok((StatusCode::CREATED, Json(article)))
}

async fn admin_update_news(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<NewsInput>,
) -> Result<Json<NewsArticle>, ApiError> {
    let input = validate_news(&input).map_err(ApiError::Validation)?;
    let article = state
        .db
        .call(move |db| {
            if db.get_news(id)?.is_none() {
                return Ok(None);
            }
            db.update_news(id, &input).map(Some)
        })
        .await?
        .ok_or(PortalError::NewsNotFound { id })?;
    Ok(Json(article))
}

async fn admin_delete_news(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_news(id))
        .await?;
    if !deleted {
        return Err(PortalError::NewsNotFound { id }.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Admin: initiatives ────────────────────────────────────────────────

async fn admin_create_initiative(
    State(state): State<SharedState>,
    JsonBody(input): JsonBody<InitiativeInput>,
) -> Result<(StatusCode, Json<Initiative>), ApiError> {
    let input = validate_initiative(&input).map_err(ApiError::Validation)?;
    let initiative = state
        .db
        .call(move |db| db.create_initiative(&input))
        .await?;
    tracing::info!(id = initiative.id, kind = %initiative.kind, "initiative created");
    Ok((StatusCode::CREATED, Json(initiative)))
}

async fn admin_update_initiative(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<InitiativeInput>,
) -> Result<Json<Initiative>, ApiError> {
    let input = validate_initiative(&input).map_err(ApiError::Validation)?;
    let initiative = state
        .db
        .call(move |db| {
            if db.get_initiative(id)?.is_none() {
                return Ok(None);
            }
            db.update_initiative(id, &input).map(Some)
        })
        .await?
        .ok_or(PortalError::InitiativeNotFound { id })?;
    Ok(Json(initiative))
}

async fn admin_delete_initiative(
    State(state): State<SharedState>,
    PathParam(id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_initiative(id))
        .await?;
    if !deleted {
        return Err(PortalError::InitiativeNotFound { id }.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Admin: notifications ──────────────────────────────────────────────

/// Manual (re)send from the dashboard. Always answers 200; the outcome is in
/// the body, malformed requests included.
async fn admin_send_notification(
    State(state): State<SharedState>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> Json<NotificationResponse> {
    match payload {
        Ok(Json(request)) => Json(state.notifier.notify(request).await),
        Err(rejection) => {
            let error = NotificationError::InvalidRequest(rejection.body_text());
            tracing::warn!(error = %error, "malformed notification request");
            Json(NotificationResponse::failed(&error))
        }
    }
}

async fn admin_list_notifications(
    State(state): State<SharedState>,
    QueryParams(query): QueryParams<NotificationLogQuery>,
) -> Result<Json<Vec<NotificationRecord>>, ApiError> {
    let kind: Option<RecordKind> = parse_param(query.kind.as_deref())?;
    let limit = query
        .limit
        .unwrap_or(NOTIFICATION_LOG_LIMIT)
        .clamp(1, MAX_PER_PAGE as i64);
    let record_id = query.id;
    let records = state
        .db
        .call(move |db| db.list_notifications(kind, record_id, limit))
        .await?;
    Ok(Json(records))
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::db::PortalDb;
    use crate::portal::mailer::testing::RecordingMailer;
    use crate::portal::notify::testing::email_settings;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const TOKEN: &str = "test-admin-token";

    struct TestApp {
        router: Router,
        mailer: Arc<RecordingMailer>,
        db: DbHandle,
    }

    fn test_app_with(tokens: &[&str]) -> TestApp {
        let db = DbHandle::new(PortalDb::new_in_memory().unwrap());
        let (ws_tx, _) = broadcast::channel(16);
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(db.clone(), mailer.clone(), email_settings(), ws_tx.clone());
        let state = Arc::new(AppState {
            db: db.clone(),
            ws_tx,
            notifier,
            admin_tokens: AdminTokens::new(tokens),
        });
        TestApp {
            router: api_router(state.clone()).with_state(state),
            mailer,
            db,
        }
    }

    fn test_app() -> TestApp {
        test_app_with(&[TOKEN])
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", TOKEN));
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn grievance_body() -> serde_json::Value {
        serde_json::json!({
            "first_name": "Marie",
            "last_name": "Curie",
            "email": "marie@example.fr",
            "phone": "06 12 34 56 78",
            "subject": "Éclairage public",
            "message": "Plus de lumière rue Lhomond depuis trois semaines."
        })
    }

    async fn submit_grievance_via_api(app: &TestApp) -> i64 {
        let resp = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/doleances", grievance_body()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let ack: serde_json::Value = body_json(resp.into_body()).await;
        ack["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn health_check_answers_ok() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn grievance_submission_is_acknowledged() {
        let app = test_app();
        let resp = app
            .router
            .clone()
            .oneshot(json_request("POST", "/api/doleances", grievance_body()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let ack: serde_json::Value = body_json(resp.into_body()).await;
        assert!(ack["message"].as_str().unwrap().contains("bien été envoyée"));

        let id = ack["id"].as_i64().unwrap();
        let stored = app.db.call(move |db| db.get_grievance(id)).await.unwrap().unwrap();
        assert_eq!(stored.status, GrievanceStatus::Submitted);
        assert_eq!(stored.phone.as_deref(), Some("06 12 34 56 78"));
    }

    #[tokio::test]
    async fn invalid_submission_lists_every_field() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(json_request(
                "POST",
                "/api/audiences",
                serde_json::json!({"first_name": "Jean", "email": "pas-un-email"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        let fields: Vec<&str> = body["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"last_name"));
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"subject"));
        assert!(fields.contains(&"message"));
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let app = test_app();
        let resp = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/api/admin/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/admin/stats")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_unavailable_without_configured_tokens() {
        let app = test_app_with(&[]);
        let resp = app
            .router
            .oneshot(admin_request("GET", "/api/admin/stats", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn review_with_status_change_sends_one_email() {
        let app = test_app();
        let id = submit_grievance_via_api(&app).await;

        let resp = app
            .router
            .clone()
            .oneshot(admin_request(
                "PATCH",
                &format!("/api/admin/doleances/{}", id),
                Some(serde_json::json!({
                    "status": "completed",
                    "response": "Les services techniques sont intervenus."
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["record"]["status"], "completed");
        assert_eq!(body["previous_status"], "submitted");
        assert_eq!(body["notification"]["state"], "sent");

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Traitée"));
        assert!(sent[0].text.contains("Les services techniques sont intervenus."));
    }

    #[tokio::test]
    async fn review_of_unknown_record_is_404() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(admin_request(
                "PATCH",
                "/api/admin/audiences/404",
                Some(serde_json::json!({"status": "approved"})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn admin_list_filters_by_status() {
        let app = test_app();
        let first = submit_grievance_via_api(&app).await;
        submit_grievance_via_api(&app).await;
        app.db
            .call(move |db| db.update_grievance_review(first, GrievanceStatus::Rejected, None))
            .await
            .unwrap();

        let resp = app
            .router
            .clone()
            .oneshot(admin_request("GET", "/api/admin/doleances?status=rejected", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let page: Page<Grievance> = body_json(resp.into_body()).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, first);

        let resp = app
            .router
            .oneshot(admin_request("GET", "/api/admin/doleances?status=bogus", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let app = test_app();
        submit_grievance_via_api(&app).await;
        submit_grievance_via_api(&app).await;
        let resp = app
            .router
            .oneshot(admin_request("GET", "/api/admin/stats", None))
            .await
            .unwrap();
        let stats: DashboardStats = body_json(resp.into_body()).await;
        assert_eq!(stats.doleances.len(), 4);
        assert_eq!(
            stats.doleances[0],
            StatusCount {
                status: "submitted".into(),
                count: 2
            }
        );
        assert!(stats.audiences.iter().all(|c| c.count == 0));
    }

    #[tokio::test]
    async fn draft_news_is_hidden_from_public() {
        let app = test_app();
        let resp = app
            .router
            .clone()
            .oneshot(admin_request(
                "POST",
                "/api/admin/news",
                Some(serde_json::json!({
                    "title": "Brouillon",
                    "content": "Pas encore prêt",
                    "published": false
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let draft: NewsArticle = body_json(resp.into_body()).await;

        let resp = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/news/{}", draft.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .router
            .clone()
            .oneshot(admin_request(
                "PATCH",
                &format!("/api/admin/news/{}", draft.id),
                Some(serde_json::json!({
                    "title": "Publié",
                    "content": "Maintenant prêt",
                    "category": "Circonscription",
                    "published": true
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/api/news").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let page: Page<NewsArticle> = body_json(resp.into_body()).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "Publié");

        let resp = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/news/categories")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let categories: Vec<String> = body_json(resp.into_body()).await;
        assert_eq!(categories, vec!["Circonscription".to_string()]);
    }

    #[tokio::test]
    async fn initiatives_filter_by_kind_and_legislature() {
        let app = test_app();
        for (kind, legislature) in [
            ("written_question", 16),
            ("written_question", 17),
            ("bill_proposal", 17),
        ] {
            let resp = app
                .router
                .clone()
                .oneshot(admin_request(
                    "POST",
                    "/api/admin/initiatives",
                    Some(serde_json::json!({
                        "kind": kind,
                        "title": format!("{} {}", kind, legislature),
                        "legislature": legislature
                    })),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let resp = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/initiatives?kind=written_question&legislature=17")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let page: Page<Initiative> = body_json(resp.into_body()).await;
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].kind, InitiativeKind::WrittenQuestion);

        let resp = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/legislatures")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let legislatures: Vec<LegislatureSummary> = body_json(resp.into_body()).await;
        assert_eq!(legislatures[0].legislature, 17);
        assert_eq!(legislatures[0].initiative_count, 2);
    }

    #[tokio::test]
    async fn manual_notification_reports_status_mismatch() {
        let app = test_app();
        let id = submit_grievance_via_api(&app).await;

        let resp = app
            .router
            .clone()
            .oneshot(admin_request(
                "POST",
                "/api/admin/notifications",
                Some(serde_json::json!({
                    "type": "doleance",
                    "id": id.to_string(),
                    "newStatus": "completed",
                    "userEmail": "marie@example.fr",
                    "userName": "Marie Curie"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["success"], false);
        assert!(app.mailer.sent().is_empty());

        let resp = app
            .router
            .oneshot(admin_request(
                "GET",
                &format!("/api/admin/notifications?type=doleance&id={}", id),
                None,
            ))
            .await
            .unwrap();
        let log: Vec<NotificationRecord> = body_json(resp.into_body()).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].delivery, DeliveryStatus::Rejected);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let app = test_app();
        let id = submit_grievance_via_api(&app).await;
        let uri = format!("/api/admin/doleances/{}", id);

        let resp = app
            .router
            .clone()
            .oneshot(admin_request("DELETE", &uri, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app
            .router
            .oneshot(admin_request("DELETE", &uri, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_notification_request_answers_in_protocol() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(admin_request(
                "POST",
                "/api/admin/notifications",
                Some(serde_json::json!({"type": "doleance", "id": "1"})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: NotificationResponse = body_json(resp.into_body()).await;
        assert!(!body.success);
        assert!(body.error.unwrap().contains("newStatus"));
        assert!(app.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn unparsable_body_answers_json_error() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/doleances")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn bad_query_value_answers_json_error() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/initiatives?legislature=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("query string"));
    }

    #[tokio::test]
    async fn bad_path_id_answers_json_error() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(Request::builder().uri("/api/news/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert!(body["error"].as_str().is_some());
    }

    #[test]
    fn database_errors_keep_raw_message() {
        let err: ApiError = PortalError::Database(anyhow::anyhow!("disk I/O error")).into();
        match err {
            ApiError::Internal(msg) => assert_eq!(msg, "disk I/O error"),
            other => panic!("Expected Internal, got {:?}", other),
        }
    }
}
