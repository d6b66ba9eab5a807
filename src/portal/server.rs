use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::auth::AdminTokens;
use super::db::{DbHandle, PortalDb};
use super::email::EmailSettings;
use super::mailer::{HttpMailer, LogMailer, Mailer};
use super::notify::Notifier;
use crate::config::PortalConfig;

/// Everything `start_server` needs, resolved from the layered config.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub email: EmailSettings,
    pub email_api_url: String,
    pub email_api_key: Option<String>,
    pub email_timeout: Duration,
    pub admin_email: String,
    pub admin_tokens: Vec<String>,
}

impl From<&PortalConfig> for ServerConfig {
    fn from(config: &PortalConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.server.db_path.clone(),
            dev_mode: config.server.dev_mode,
            email: config.email_settings(),
            email_api_url: config.email.api_url.clone(),
            email_api_key: config.email.api_key.clone(),
            email_timeout: Duration::from_secs(config.email.timeout_secs),
            admin_email: config.email.admin_email.clone(),
            admin_tokens: config.admin.tokens.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&PortalConfig::default())
    }
}

/// Open (and migrate) the database, creating its directory if needed.
pub fn open_database(db_path: &std::path::Path) -> Result<PortalDb> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    PortalDb::new(db_path).context("Failed to initialize portal database")
}

fn build_mailer(config: &ServerConfig) -> Result<Arc<dyn Mailer>> {
    let mailer: Arc<dyn Mailer> = match config.email_api_key.as_deref() {
        Some(key) => Arc::new(HttpMailer::new(
            &config.email_api_url,
            key,
            config.email_timeout,
        )?),
        None => Arc::new(LogMailer),
    };
    Ok(mailer)
}

/// Full application router: API, admin event stream, request tracing.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let mut app = api::api_router(state.clone())
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = DbHandle::new(open_database(&config.db_path)?);
    let (ws_tx, _rx) = broadcast::channel::<String>(256);
    let mailer = build_mailer(&config)?;
    let notifier = Notifier::new(db.clone(), mailer, config.email.clone(), ws_tx.clone())
        .with_admin_alerts(&config.admin_email);
    let admin_tokens = AdminTokens::new(config.admin_tokens.as_slice());

    if !admin_tokens.is_configured() {
        tracing::warn!("no admin token configured, admin routes will answer 503");
    }
    tracing::info!(
        db = %config.db_path.display(),
        mailer = notifier.mailer_name(),
        admin_tokens = admin_tokens.len(),
        admin_alerts = notifier.admin_email().is_some(),
        "starting permanence"
    );

    let state = Arc::new(AppState {
        db,
        ws_tx,
        notifier,
        admin_tokens,
    });
    let app = build_router(state, config.dev_mode);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr: SocketAddr = listener.local_addr()?;
    tracing::info!("listening on http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::notify::testing::email_settings;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router(dev_mode: bool) -> Router {
        let db = DbHandle::new(PortalDb::new_in_memory().unwrap());
        let (ws_tx, _) = broadcast::channel(16);
        let notifier = Notifier::new(db.clone(), Arc::new(LogMailer), email_settings(), ws_tx.clone());
        let state = Arc::new(AppState {
            db,
            ws_tx,
            notifier,
            admin_tokens: AdminTokens::new(&["t"]),
        });
        build_router(state, dev_mode)
    }

    #[tokio::test]
    async fn health_via_full_router() {
        let resp = test_router(false)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let resp = test_router(false)
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dev_mode_answers_cors_preflight() {
        let resp = test_router(true)
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/news")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.headers().contains_key("access-control-allow-origin"));
    }

    #[test]
    fn server_config_follows_portal_config() {
        let mut portal = PortalConfig::default();
        portal.email.api_key = Some("re_123".into());
        portal.admin.tokens = vec!["a".into()];
        let config = ServerConfig::from(&portal);
        assert_eq!(config.port, 3141);
        assert_eq!(config.db_path, PathBuf::from(".permanence/permanence.db"));
        assert_eq!(config.email_timeout, Duration::from_secs(10));
        assert_eq!(config.email_api_key.as_deref(), Some("re_123"));
        assert_eq!(config.admin_tokens, vec!["a".to_string()]);
        assert!(!config.dev_mode);
    }

    #[test]
    fn mailer_falls_back_to_log_without_key() {
        let config = ServerConfig::default();
        assert_eq!(build_mailer(&config).unwrap().name(), "log");
        let config = ServerConfig {
            email_api_key: Some("re_123".into()),
            ..ServerConfig::default()
        };
        assert_eq!(build_mailer(&config).unwrap().name(), "http");
    }

    #[test]
    fn open_database_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("permanence.db");
        open_database(&path).unwrap();
        assert!(path.exists());
    }
}
