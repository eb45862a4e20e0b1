use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Presence;

/// Commands sent FROM client TO server over the live channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoomCommand {
    /// Authenticate and enter a room. Must be the first frame.
    #[serde(rename = "join-room")]
    Join { room_id: String, token: String },

    /// A drawing stroke. The payload is opaque to the server and relayed
    /// verbatim to everyone else in the room.
    #[serde(rename = "draw-event")]
    Draw { payload: serde_json::Value },

    /// Wipe the shared canvas for everyone in the room.
    #[serde(rename = "clear-room")]
    Clear,
}

/// Events sent FROM server TO clients over the live channel. Fire-and-forget:
/// no response envelope, no delivery confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoomEvent {
    /// Full occupancy of the room, sent once to a freshly joined endpoint
    /// before anything it causes can echo back.
    #[serde(rename = "presence-snapshot")]
    PresenceSnapshot { users: Vec<Presence> },

    #[serde(rename = "user-joined")]
    UserJoined { user: Presence },

    #[serde(rename = "user-left")]
    UserLeft { user: Presence },

    #[serde(rename = "draw-event")]
    Draw {
        from: Uuid,
        payload: serde_json::Value,
    },

    #[serde(rename = "clear-room")]
    Clear { from: Uuid },
}
