use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::render::SessionView;
use super::server::AppState;
use crate::handlers::{SessionController, SessionError};

pub enum ApiError {
    SessionNotFound(Uuid),
    Session(SessionError),
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        ApiError::Session(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Session {} not found", id))
            }
            ApiError::Session(error) => {
                let status = match error {
                    SessionError::EmptyImage
                    | SessionError::NoImage
                    | SessionError::NoPersonalizationInput => StatusCode::BAD_REQUEST,
                    SessionError::UnsupportedImage(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    SessionError::NoPrimaryReport
                    | SessionError::Busy
                    | SessionError::Superseded => StatusCode::CONFLICT,
                };
                (status, error.to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct InputsPayload {
    #[serde(default)]
    pub allergies: String,
    #[serde(default)]
    pub location: String,
}

fn find_session(state: &AppState, id: Uuid) -> Result<Arc<SessionController>, ApiError> {
    state.registry.get(&id).ok_or(ApiError::SessionNotFound(id))
}

fn view_of(session: &SessionController) -> Json<SessionView> {
    Json(SessionView::from(session.snapshot()))
}

pub async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.registry.create();
    (StatusCode::CREATED, view_of(&session))
}

pub async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id)?;
    Ok(view_of(&session))
}

pub async fn delete_session(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    if state.registry.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

/// Raw image bytes in the body, format from magic bytes or `Content-Type`.
pub async fn upload_image(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    session.on_image_uploaded(body.to_vec(), content_type)?;
    Ok(view_of(&session))
}

pub async fn analyze(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id)?;
    session.on_analyze_requested().await?;
    Ok(view_of(&session))
}

pub async fn update_inputs(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InputsPayload>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id)?;
    session.update_inputs(&payload.allergies, &payload.location)?;
    Ok(view_of(&session))
}

pub async fn personalize(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id)?;
    session.on_personalization_requested().await?;
    Ok(view_of(&session))
}

pub async fn clear(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, id)?;
    session.on_clear();
    Ok(view_of(&session))
}
