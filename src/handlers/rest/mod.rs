use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_macros::debug_handler;
use utoipa::OpenApi;

use std::sync::Arc;

use crate::{
    app::AppState,
    auth::AuthenticatedUser,
    config::Environment,
    dto::{
        CreateNoteRequest, DeleteNoteResponse, ErrorResponse, HealthResponse,
        NoteMutationResponse, NoteResponse, NotesListResponse, RateLimitedResponse,
        RouteNotFoundResponse, UpdateNoteRequest, VersionResponse,
    },
    handlers::health,
    models::Note,
    service::ServiceError,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        create_note,
        get_all_notes,
        get_one_note,
        update_note,
        delete_note,
        health::health,
        health::version
    ),
    components(schemas(
        Note,
        CreateNoteRequest,
        UpdateNoteRequest,
        NoteResponse,
        NoteMutationResponse,
        NotesListResponse,
        DeleteNoteResponse,
        ErrorResponse,
        RateLimitedResponse,
        RouteNotFoundResponse,
        HealthResponse,
        VersionResponse
    )),
    tags(
        (name = "notes", description = "Personal notes with soft delete"),
        (name = "service", description = "Service status")
    )
)]
pub struct ApiDoc;

pub fn error_response(status: StatusCode, error: String, details: Option<String>) -> Response {
    (status, Json(ErrorResponse { error, details })).into_response()
}

fn failure(state: &AppState, error: ServiceError, action: &str) -> Response {
    match error {
        ServiceError::Validation(e) => error_response(StatusCode::BAD_REQUEST, e.to_string(), None),
        ServiceError::NotFound => {
            error_response(StatusCode::NOT_FOUND, "Note not found".to_string(), None)
        }
        ServiceError::Store(e) => {
            tracing::error!("failed to {}: {}", action, e);
            let details = (state.environment == Environment::Development).then(|| e.to_string());
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {action}"),
                details,
            )
        }
    }
}

fn bad_body(state: &AppState, rejection: &JsonRejection) -> Response {
    let details = (state.environment == Environment::Development).then(|| rejection.body_text());
    error_response(
        StatusCode::BAD_REQUEST,
        "Request body must be a JSON object".to_string(),
        details,
    )
}

#[utoipa::path(
    post,
    path = "/notes",
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created successfully", body = NoteMutationResponse),
        (status = 400, description = "Invalid note fields", body = ErrorResponse),
        (status = 401, description = "Missing or invalid credentials", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = RateLimitedResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_body(&state, &rejection),
    };

    let title = payload.title.unwrap_or_default();
    let content = payload.content.unwrap_or_default();

    match state
        .service
        .create_note(user.user_id(), &title, &content)
        .await
    {
        Ok(note) => {
            tracing::info!("Created note {} for user {}", note.note_id, note.user_id);
            (
                StatusCode::CREATED,
                Json(NoteMutationResponse {
                    message: "Note created successfully".to_string(),
                    note,
                }),
            )
                .into_response()
        }
        Err(e) => failure(&state, e, "create note"),
    }
}

#[utoipa::path(
    get,
    path = "/notes",
    responses(
        (status = 200, description = "Caller's notes, deleted ones excluded", body = NotesListResponse),
        (status = 401, description = "Missing or invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn get_all_notes(State(state): State<Arc<AppState>>, user: AuthenticatedUser) -> Response {
    match state.service.get_notes_by_user(user.user_id()).await {
        Ok(notes) => {
            tracing::info!("Retrieved {} notes for user {}", notes.len(), user.user_id());
            let count = notes.len();
            (StatusCode::OK, Json(NotesListResponse { notes, count })).into_response()
        }
        Err(e) => failure(&state, e, "retrieve notes"),
    }
}

#[utoipa::path(
    get,
    path = "/notes/{note_id}",
    params(
        ("note_id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Note found", body = NoteResponse),
        (status = 404, description = "Note not found or deleted", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn get_one_note(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(note_id): Path<String>,
) -> Response {
    match state.service.get_note(user.user_id(), &note_id).await {
        Ok(note) => (StatusCode::OK, Json(NoteResponse { note })).into_response(),
        Err(e) => failure(&state, e, "retrieve note"),
    }
}

#[utoipa::path(
    put,
    path = "/notes/{note_id}",
    params(
        ("note_id" = String, Path, description = "Note ID")
    ),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "Note updated successfully", body = NoteMutationResponse),
        (status = 400, description = "Invalid note fields", body = ErrorResponse),
        (status = 404, description = "Note not found or deleted", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = RateLimitedResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(note_id): Path<String>,
    payload: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_body(&state, &rejection),
    };

    let (Some(title), Some(content)) = (
        payload.title.filter(|t| !t.is_empty()),
        payload.content.filter(|c| !c.is_empty()),
    ) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Both title and content are required".to_string(),
            None,
        );
    };

    match state
        .service
        .update_note(user.user_id(), &note_id, &title, &content)
        .await
    {
        Ok(note) => {
            tracing::info!("Updated note {} for user {}", note_id, user.user_id());
            (
                StatusCode::OK,
                Json(NoteMutationResponse {
                    message: "Note updated successfully".to_string(),
                    note,
                }),
            )
                .into_response()
        }
        Err(e) => failure(&state, e, "update note"),
    }
}

#[utoipa::path(
    delete,
    path = "/notes/{note_id}",
    params(
        ("note_id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Note soft-deleted", body = DeleteNoteResponse),
        (status = 404, description = "Note not found or already deleted", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = RateLimitedResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(note_id): Path<String>,
) -> Response {
    match state.service.delete_note(user.user_id(), &note_id).await {
        Ok(note) => {
            tracing::info!("Soft-deleted note {} for user {}", note.note_id, user.user_id());
            (
                StatusCode::OK,
                Json(DeleteNoteResponse {
                    message: "Note deleted successfully".to_string(),
                    note_id: note.note_id,
                }),
            )
                .into_response()
        }
        Err(e) => failure(&state, e, "delete note"),
    }
}
