use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::get,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use crate::{
    auth::IdentityProvider,
    config::Environment,
    handlers::{health, rest},
    rate_limit::{self, RateLimits},
    service::NoteService,
};

pub struct AppState {
    pub service: NoteService,
    pub identity: Arc<dyn IdentityProvider>,
    pub environment: Environment,
    pub rate_limits: RateLimits,
}

impl AppState {
    pub fn new(
        service: NoteService,
        identity: Arc<dyn IdentityProvider>,
        environment: Environment,
        rate_limits: RateLimits,
    ) -> Self {
        Self {
            service,
            identity,
            environment,
            rate_limits,
        }
    }
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let origin = if allowed_origin == "*" {
        AllowOrigin::any()
    } else if let Ok(value) = HeaderValue::from_str(allowed_origin) {
        AllowOrigin::exact(value)
    } else {
        tracing::warn!(
            "Allowed origin '{}' is not a valid header value, allowing any origin",
            allowed_origin
        );
        AllowOrigin::any()
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn router(state: Arc<AppState>, allowed_origin: &str) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/notes", get(rest::get_all_notes).post(rest::create_note))
        .route(
            "/notes/{note_id}",
            get(rest::get_one_note)
                .put(rest::update_note)
                .delete(rest::delete_note),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", rest::ApiDoc::openapi()))
        .fallback(health::endpoint_not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ))
        .with_state(state)
        .layer(cors_layer(allowed_origin))
        .layer(TraceLayer::new_for_http())
}
