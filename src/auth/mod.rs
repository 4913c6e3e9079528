//! Caller authentication.
//!
//! Handlers receive an [`AuthenticatedUser`] and never read identity from
//! request bodies. Bearer tokens are checked by an [`IdentityProvider`]; in
//! the `test` environment an `X-Test-User-Id` header is accepted instead.

use async_trait::async_trait;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use std::{sync::Arc, time::Duration};

use crate::{app::AppState, config::Environment, dto::ErrorResponse};

pub const TEST_USER_HEADER: &str = "x-test-user-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Google Client ID not configured")]
    NotConfigured,

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
}

/// Verifies Google ID tokens with the tokeninfo endpoint, which also checks
/// signature and expiry.
///
/// Every tokeninfo call is bounded by `request_timeout`.
pub struct GoogleTokenVerifier {
    client: reqwest::Client,
    client_id: Option<String>,
    tokeninfo_url: String,
}

impl GoogleTokenVerifier {
    pub fn new(
        client_id: Option<String>,
        tokeninfo_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            client_id,
            tokeninfo_url: tokeninfo_url.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let client_id = self.client_id.as_deref().ok_or(AuthError::NotConfigured)?;

        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Rejected(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response.json().await?;
        if info.aud != client_id {
            return Err(AuthError::Rejected("audience mismatch".to_string()));
        }

        Ok(Identity::new(info.sub))
    }
}

/// Identity of the caller, resolved before the handler runs.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            details: None,
        }),
    )
        .into_response()
}

fn header<'a>(parts: &'a Parts, name: impl axum::http::header::AsHeaderName) -> Option<&'a str> {
    parts.headers.get(name).and_then(|value| value.to_str().ok())
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.environment == Environment::Test {
            if let Some(user_id) = header(parts, TEST_USER_HEADER).filter(|id| !id.is_empty()) {
                return Ok(Self(Identity::new(user_id)));
            }
        }

        let Some(token) = header(parts, AUTHORIZATION).and_then(|h| h.strip_prefix("Bearer "))
        else {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Authorization header required",
            ));
        };

        match state.identity.verify(token.trim()).await {
            Ok(identity) => Ok(Self(identity)),
            Err(AuthError::NotConfigured) => {
                tracing::error!("bearer token received but no Google client ID is configured");
                Err(reject(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Google Client ID not configured",
                ))
            }
            Err(e) => {
                tracing::warn!("token verification failed: {}", e);
                Err(reject(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
            }
        }
    }
}
