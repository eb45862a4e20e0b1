use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use swaphub_types::api::{CanvasResponse, Claims, CreateSessionRequest, SaveCanvasRequest};

use crate::error::ApiError;
use crate::{blocking, AppState};

pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = blocking(move || {
        let title = req.title.unwrap_or_else(|| "Untitled session".to_string());
        state.db.create_session(
            &req.room_id,
            &title,
            claims.sub,
            req.max_participants,
            req.is_public,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = blocking(move || state.db.get_session(session_id)).await?;
    Ok(Json(session))
}

pub async fn get_session_by_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = blocking(move || state.db.get_session_by_room(&room_id)).await?;
    Ok(Json(session))
}

pub async fn join_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let session = blocking(move || state.db.join_session(session_id, claims.sub)).await?;
    Ok(Json(session))
}

pub async fn leave_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let session = blocking(move || state.db.leave_session(session_id, claims.sub)).await?;
    Ok(Json(session))
}

/// Explicit checkpoint of the drawing state. The live relay never persists
/// strokes; this is the only way canvas data survives.
pub async fn save_canvas(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SaveCanvasRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || state.db.save_canvas(session_id, claims.sub, &req.canvas_data)).await?;
    Ok(Json(serde_json::json!({ "saved": true })))
}

pub async fn get_canvas(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let canvas_data = blocking(move || state.db.get_canvas(session_id)).await?;
    Ok(Json(CanvasResponse { canvas_data }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || state.db.delete_session(session_id, claims.sub)).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
