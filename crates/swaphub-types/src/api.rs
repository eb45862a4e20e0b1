use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageType, Reaction};

// -- JWT Claims --

/// Claims minted by the platform's identity service and consumed here, both
/// by the REST middleware and the live-channel handshake. Canonical
/// definition lives in swaphub-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    #[serde(default)]
    pub banned: bool,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    pub reply_to: Option<Uuid>,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_messages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// One page of a group's conversation, oldest-first for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReactionListResponse {
    pub reactions: Vec<Reaction>,
    /// True when an add found the (user, emoji) pair already present.
    pub already_reacted: bool,
}

// -- Sessions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub room_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub max_participants: Option<u32>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveCanvasRequest {
    pub canvas_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CanvasResponse {
    pub canvas_data: Option<String>,
}
