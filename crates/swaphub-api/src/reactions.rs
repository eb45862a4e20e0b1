use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use swaphub_types::api::{Claims, ReactionListResponse, ReactionRequest};

use crate::error::ApiError;
use crate::{blocking, AppState};

/// Adding an existing (user, emoji) pair is a no-op; the flag in the
/// response tells the client it already reacted.
pub async fn add_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (reactions, already_reacted) = blocking(move || {
        let db = &state.db;
        db.add_reaction(db, message_id, claims.sub, &req.emoji)
    })
    .await?;

    Ok(Json(ReactionListResponse {
        reactions,
        already_reacted,
    }))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reactions = blocking(move || {
        let db = &state.db;
        db.remove_reaction(db, message_id, claims.sub, &req.emoji)
    })
    .await?;

    Ok(Json(ReactionListResponse {
        reactions,
        already_reacted: false,
    }))
}
