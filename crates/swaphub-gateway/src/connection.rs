use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use tracing::{info, warn};

use swaphub_types::api::Claims;
use swaphub_types::events::RoomCommand;
use swaphub_types::models::Presence;

use crate::broker::RoomBroker;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a freshly upgraded socket gets to send its join-room frame.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one live-channel connection: wait for the join handshake, register
/// with the broker, then pump events both ways until either side drops.
pub async fn handle_connection(socket: WebSocket, broker: RoomBroker, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let Some((room_id, presence)) = wait_for_join(&mut receiver, &jwt_secret).await else {
        warn!("live client failed to join a room, closing");
        return;
    };

    info!(
        "{} ({}) joined live room '{}'",
        presence.display_name, presence.user_id, room_id
    );

    let (endpoint_id, mut room_rx) = broker.connect(&room_id, presence.clone()).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = room_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode room event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client and relay through the broker
    let broker_recv = broker.clone();
    let name_recv = presence.display_name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RoomCommand>(&text) {
                    Ok(RoomCommand::Draw { payload }) => {
                        broker_recv.relay(endpoint_id, payload).await;
                    }
                    Ok(RoomCommand::Clear) => {
                        broker_recv.clear(endpoint_id).await;
                    }
                    Ok(RoomCommand::Join { .. }) => {} // already joined
                    Err(e) => {
                        warn!(
                            "{} bad live command: {} -- raw: {}",
                            name_recv,
                            e,
                            log_excerpt(&text)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish, then tear down the other
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Idempotent: a concurrent error and close both land here harmlessly.
    broker.disconnect(endpoint_id).await;
    info!(
        "{} ({}) left live room '{}'",
        presence.display_name, presence.user_id, room_id
    );
}

/// First up-to-200 bytes of a frame for log output, cut on a char boundary
/// so multibyte text never splits mid-character.
fn log_excerpt(text: &str) -> &str {
    let mut end = text.len().min(200);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// The first frame must be `join-room { room_id, token }` within the
/// handshake window. Banned identities are turned away here, same as at the
/// REST middleware.
async fn wait_for_join(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(String, Presence)> {
    let handshake = tokio::time::timeout(JOIN_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(RoomCommand::Join { room_id, token }) =
                    serde_json::from_str::<RoomCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    let claims = token_data.claims;
                    if claims.banned {
                        warn!("banned identity {} rejected from live channel", claims.sub);
                        return None;
                    }

                    let room_id = room_id.trim().to_string();
                    if room_id.is_empty() {
                        return None;
                    }

                    return Some((
                        room_id,
                        Presence {
                            user_id: claims.sub,
                            display_name: claims.name,
                        },
                    ));
                }
            }
        }
        None
    });

    handshake.await.ok().flatten()
}
