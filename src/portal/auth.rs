use std::collections::HashMap;

use axum::{
    extract::{Query, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use super::api::{ApiError, SharedState};
use crate::errors::PortalError;

/// Externally issued admin bearer tokens, kept only as SHA-256 digests.
#[derive(Clone, Default)]
pub struct AdminTokens {
    digests: Vec<[u8; 32]>,
}

fn digest(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

impl AdminTokens {
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self {
            digests: tokens
                .iter()
                .map(|t| t.as_ref().trim())
                .filter(|t| !t.is_empty())
                .map(digest)
                .collect(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.digests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn verify(&self, presented: &str) -> bool {
        let presented = digest(presented);
        self.digests.iter().any(|d| *d == presented)
    }
}

/// `Authorization: Bearer <token>`, falling back to `?access_token=` for
/// WebSocket clients that cannot set headers.
fn presented_token(req: &Request) -> Option<String> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }
    Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(params)| params.get("access_token").cloned())
}

pub async fn require_admin(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.admin_tokens.is_configured() {
        return Err(PortalError::AdminDisabled.into());
    }
    match presented_token(&req) {
        Some(token) if state.admin_tokens.verify(&token) => Ok(next.run(req).await),
        _ => {
            tracing::warn!(path = %req.uri().path(), "rejected admin request");
            Err(PortalError::Unauthorized.into())
        }
    }
}
