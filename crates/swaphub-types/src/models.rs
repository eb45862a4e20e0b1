use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on message content length, applied after trimming.
pub const MAX_CONTENT_LEN: usize = 2000;

/// Window after creation during which a sender may still edit a message.
pub const EDIT_WINDOW_MINUTES: i64 = 15;

/// Content a soft-deleted message is redacted to. The row itself survives.
pub const TOMBSTONE: &str = "This message has been deleted";

/// Default participant cap for a new session when the creator doesn't pick one.
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub emoji: String,
    pub reacted_at: DateTime<Utc>,
}

/// Records that a user has fetched/seen a message. Grow-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// Display snippet for the message a reply points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub message_id: Uuid,
    pub sender_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub reply_to: Option<ReplyPreview>,
    pub reactions: Vec<Reaction>,
    pub read_by: Vec<ReadReceipt>,
}

impl Message {
    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    pub fn has_reaction(&self, user_id: Uuid, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.user_id == user_id && r.emoji == emoji)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
}

/// A persisted collaborative room: roster plus the last checkpointed canvas.
/// Live occupancy is the broker's business, not this record's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub room_id: String,
    pub title: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
    pub canvas_data: Option<String>,
    pub is_active: bool,
    pub max_participants: u32,
    pub is_public: bool,
}

impl Session {
    pub fn active_participant_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_active).count()
    }

    pub fn is_active_participant(&self, user_id: Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.user_id == user_id && p.is_active)
    }
}

/// Minimal identity broadcast to other room occupants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: Uuid,
    pub display_name: String,
}
