use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;
use uuid::Uuid;

use swaphub_types::events::RoomEvent;
use swaphub_types::models::Presence;

/// Per-endpoint outbound queue depth. On overflow the newest event for that
/// endpoint is dropped; a slow receiver never stalls the rest of the room.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// In-memory relay for live rooms. Nothing here is durable: the table is
/// rebuilt empty on restart, and it shares only a string convention with the
/// Session Registry's room ids. Constructed once at process start and
/// injected into connection handlers, so tests can run isolated instances.
#[derive(Clone)]
pub struct RoomBroker {
    inner: Arc<RwLock<BrokerState>>,
}

#[derive(Default)]
struct BrokerState {
    /// room id -> endpoint id -> live endpoint
    rooms: HashMap<String, HashMap<Uuid, Endpoint>>,
    /// reverse index for O(1) disconnect
    endpoint_rooms: HashMap<Uuid, String>,
}

struct Endpoint {
    presence: Presence,
    tx: mpsc::Sender<RoomEvent>,
}

impl RoomBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BrokerState::default())),
        }
    }

    /// Register an endpoint in a room. The returned receiver's first event
    /// is the presence snapshot of the room as it was before this join, so
    /// the joiner always sees the snapshot before anything it causes can
    /// echo back. Everyone else gets a `user-joined`.
    pub async fn connect(
        &self,
        room_id: &str,
        presence: Presence,
    ) -> (Uuid, mpsc::Receiver<RoomEvent>) {
        let endpoint_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

        let mut state = self.inner.write().await;
        let room = state.rooms.entry(room_id.to_string()).or_default();

        let snapshot: Vec<Presence> = room.values().map(|e| e.presence.clone()).collect();
        offer(&tx, RoomEvent::PresenceSnapshot { users: snapshot });

        for endpoint in room.values() {
            offer(
                &endpoint.tx,
                RoomEvent::UserJoined {
                    user: presence.clone(),
                },
            );
        }

        room.insert(endpoint_id, Endpoint { presence, tx });
        state
            .endpoint_rooms
            .insert(endpoint_id, room_id.to_string());

        (endpoint_id, rx)
    }

    /// Forward a drawing payload verbatim to every other endpoint in the
    /// sender's room. Best-effort: no persistence, no ack, per-endpoint
    /// failures swallowed.
    pub async fn relay(&self, endpoint_id: Uuid, payload: serde_json::Value) {
        self.fan_out(endpoint_id, |from| RoomEvent::Draw {
            from: from.user_id,
            payload: payload.clone(),
        })
        .await;
    }

    /// Tell everyone else in the sender's room to wipe their canvas.
    pub async fn clear(&self, endpoint_id: Uuid) {
        self.fan_out(endpoint_id, |from| RoomEvent::Clear { from: from.user_id })
            .await;
    }

    /// Remove an endpoint. Idempotent: a second call for the same endpoint
    /// is a no-op. The room entry is deleted outright when its last endpoint
    /// leaves; otherwise the rest get a `user-left`.
    pub async fn disconnect(&self, endpoint_id: Uuid) {
        let mut state = self.inner.write().await;

        let Some(room_id) = state.endpoint_rooms.remove(&endpoint_id) else {
            return;
        };
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return;
        };
        let Some(departed) = room.remove(&endpoint_id) else {
            return;
        };

        if room.is_empty() {
            state.rooms.remove(&room_id);
            return;
        }

        for endpoint in state.rooms[&room_id].values() {
            offer(
                &endpoint.tx,
                RoomEvent::UserLeft {
                    user: departed.presence.clone(),
                },
            );
        }
    }

    /// Current occupancy of a room. Empty when the room doesn't exist.
    pub async fn occupants(&self, room_id: &str) -> Vec<Presence> {
        let state = self.inner.read().await;
        state
            .rooms
            .get(room_id)
            .map(|room| room.values().map(|e| e.presence.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether the room has any connected endpoints at all.
    pub async fn has_room(&self, room_id: &str) -> bool {
        self.inner.read().await.rooms.contains_key(room_id)
    }

    async fn fan_out(&self, endpoint_id: Uuid, make_event: impl Fn(&Presence) -> RoomEvent) {
        let state = self.inner.read().await;

        let Some(room_id) = state.endpoint_rooms.get(&endpoint_id) else {
            return;
        };
        let Some(room) = state.rooms.get(room_id) else {
            return;
        };
        let Some(sender) = room.get(&endpoint_id) else {
            return;
        };

        let event = make_event(&sender.presence);
        for (id, endpoint) in room.iter() {
            if *id != endpoint_id {
                offer(&endpoint.tx, event.clone());
            }
        }
    }
}

impl Default for RoomBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking send. A full queue drops the event for that endpoint only;
/// a closed queue means the receiver is already gone and cleanup is imminent.
fn offer(tx: &mpsc::Sender<RoomEvent>, event: RoomEvent) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
        warn!("live endpoint outbound queue full, dropping event");
    }
}
