#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use notes_api::{
    app::{self, AppState},
    auth::{AuthError, Identity, IdentityProvider, TEST_USER_HEADER},
    config::{Environment, RateLimitConfig},
    models::Note,
    rate_limit::RateLimits,
    repository::{
        MemoryNoteStore, NoteChanges, NoteStore, Precondition, QueryFilter, StoreError,
        UpdateOutcome,
    },
    service::NoteService,
};

pub const GOOD_TOKEN: &str = "good-token";
pub const GOOD_TOKEN_USER: &str = "google-user-1";

/// Accepts a single fixed bearer token.
pub struct StaticTokens;

#[async_trait]
impl IdentityProvider for StaticTokens {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token == GOOD_TOKEN {
            Ok(Identity::new(GOOD_TOKEN_USER))
        } else {
            Err(AuthError::Rejected("unknown token".to_string()))
        }
    }
}

/// Store whose every call fails as if the backend were unreachable.
pub struct DownStore;

#[async_trait]
impl NoteStore for DownStore {
    async fn put(&self, _note: &Note) -> Result<(), StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(5)))
    }

    async fn query_by_user(
        &self,
        _user_id: &str,
        _filter: QueryFilter,
    ) -> Result<Vec<Note>, StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(5)))
    }

    async fn get_by_key(
        &self,
        _user_id: &str,
        _note_id: &str,
    ) -> Result<Option<Note>, StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(5)))
    }

    async fn conditional_update(
        &self,
        _user_id: &str,
        _note_id: &str,
        _changes: &NoteChanges,
        _precondition: Precondition,
    ) -> Result<UpdateOutcome, StoreError> {
        Err(StoreError::Timeout(Duration::from_secs(5)))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryNoteStore>,
}

pub fn test_app() -> TestApp {
    test_app_in(Environment::Test)
}

pub fn test_app_in(environment: Environment) -> TestApp {
    let store = Arc::new(MemoryNoteStore::new());
    let router = router_with(store.clone(), Arc::new(StaticTokens), environment);
    TestApp { router, store }
}

pub fn router_with(
    store: Arc<dyn NoteStore>,
    identity: Arc<dyn IdentityProvider>,
    environment: Environment,
) -> Router {
    router_with_limits(store, identity, environment, RateLimitConfig::default())
}

pub fn router_with_limits(
    store: Arc<dyn NoteStore>,
    identity: Arc<dyn IdentityProvider>,
    environment: Environment,
    limits: RateLimitConfig,
) -> Router {
    let state = Arc::new(AppState::new(
        NoteService::new(store),
        identity,
        environment,
        RateLimits::new(limits),
    ));
    app::router(state, "*")
}

pub enum Auth<'a> {
    None,
    TestUser(&'a str),
    Bearer(&'a str),
}

pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    auth: Auth<'_>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    dispatch(router, build_request(method, uri, auth, body)).await
}

/// Like [`send`], as if the request arrived on a connection from `peer`.
pub async fn send_from(
    router: &Router,
    peer: &str,
    method: &str,
    uri: &str,
    auth: Auth<'_>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let peer: SocketAddr = peer.parse().expect("invalid peer address");
    let mut request = build_request(method, uri, auth, body);
    request.extensions_mut().insert(ConnectInfo(peer));
    dispatch(router, request).await
}

fn build_request(method: &str, uri: &str, auth: Auth<'_>, body: Option<Value>) -> Request<Body> {
    let mut request = Request::builder().method(method).uri(uri);

    request = match auth {
        Auth::None => request,
        Auth::TestUser(user_id) => request.header(TEST_USER_HEADER, user_id),
        Auth::Bearer(token) => request.header(header::AUTHORIZATION, format!("Bearer {token}")),
    };

    match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("failed to build request")
}

async fn dispatch(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, json)
}
