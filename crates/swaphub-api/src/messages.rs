use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use swaphub_types::api::{Claims, EditMessageRequest, SendMessageRequest, UnreadCountResponse};

use crate::error::ApiError;
use crate::{blocking, AppState};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    50
}

/// Fetching a page marks everything on it as read by the caller — the poll
/// itself is the read signal, there is no separate mark-read call.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let page = blocking(move || {
        let db = &state.db;
        db.fetch_page(db, group_id, claims.sub, query.page, query.page_size)
    })
    .await?;

    Ok(Json(page))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(move || {
        let db = &state.db;
        db.send_message(
            db,
            group_id,
            claims.sub,
            &claims.name,
            &req.content,
            req.message_type,
            req.reply_to,
        )
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message =
        blocking(move || state.db.edit_message(message_id, claims.sub, &req.content)).await?;

    Ok(Json(message))
}

/// The ack body is the tombstoned message so clients can patch their cached
/// copy in place instead of refetching.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(move || {
        let db = &state.db;
        db.soft_delete(db, message_id, claims.sub)
    })
    .await?;

    Ok(Json(message))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let count = blocking(move || {
        let db = &state.db;
        db.unread_count(db, group_id, claims.sub)
    })
    .await?;

    Ok(Json(UnreadCountResponse {
        unread_count: count,
    }))
}
