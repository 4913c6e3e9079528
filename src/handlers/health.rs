use axum::{
    Json,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use std::sync::Arc;

use crate::{
    app::AppState,
    dto::{HealthResponse, RouteNotFoundResponse, VersionResponse},
};

pub const SERVICE_NAME: &str = "Notes API";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "service"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        service: SERVICE_NAME.to_string(),
        version: SERVICE_VERSION.to_string(),
        environment: state.environment.to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/version",
    responses(
        (status = 200, description = "Build information", body = VersionResponse)
    ),
    tag = "service"
)]
pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: SERVICE_VERSION.to_string(),
        name: SERVICE_NAME.to_string(),
        description: env!("CARGO_PKG_DESCRIPTION").to_string(),
    })
}

pub async fn endpoint_not_found(method: Method, uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(RouteNotFoundResponse {
            error: "Endpoint not found".to_string(),
            path: uri.path().to_string(),
            method: method.to_string(),
        }),
    )
        .into_response()
}
