/// Database row types — these map directly to SQLite rows.
/// Distinct from the swaphub-types API models to keep the storage layer
/// independent of wire shapes.

pub struct MessageRow {
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub message_type: String,
    pub reply_to_id: Option<String>,
    pub created_at: String,
    pub is_edited: bool,
    pub edited_at: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
}

pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

pub struct ReceiptRow {
    pub message_id: String,
    pub user_id: String,
    pub read_at: String,
}

pub struct SessionRow {
    pub id: String,
    pub room_id: String,
    pub title: String,
    pub created_by: String,
    pub created_at: String,
    pub canvas_data: Option<String>,
    pub is_active: bool,
    pub max_participants: u32,
    pub is_public: bool,
}

pub struct ParticipantRow {
    pub user_id: String,
    pub joined_at: String,
    pub is_active: bool,
}
