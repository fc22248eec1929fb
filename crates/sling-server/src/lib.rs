//! Sling WebSocket relay.
//!
//! Relays [`SyncEvent`]s between the peers of a room. The server keeps no
//! session state: late joiners catch up by asking the other peers for a
//! snapshot, which travels through here like any other event.
//!
//! ## Protocol
//!
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "relay", "scope": "others", "event": { "type": "drawing", "payload": { ... } } }
//! { "type": "leave" }
//! ```
//!
//! [`SyncEvent`]: sling_core::SyncEvent

mod config;

pub use config::ServerConfig;

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use sling_core::protocol::{ClientMessage, Scope, ServerMessage};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A message on a room's broadcast channel.
#[derive(Debug, Clone)]
pub struct Relayed {
    /// Connection that produced the message.
    pub from: String,
    pub scope: Scope,
    pub msg: ServerMessage,
}

impl Relayed {
    /// Check if this message should be delivered to `peer_id`.
    pub fn is_for(&self, peer_id: &str) -> bool {
        self.scope == Scope::All || self.from != peer_id
    }
}

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<Relayed>,
    /// Connected peer IDs
    peers: HashSet<String>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            peers: HashSet::new(),
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Active rooms
    rooms: DashMap<String, Room>,
    /// Broadcast buffer per room
    capacity: usize,
}

impl AppState {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Add a peer to a room, creating it if needed. Returns the room receiver
    /// and the number of peers now in the room.
    pub fn join_room(&self, room_id: &str, peer_id: &str) -> (broadcast::Receiver<Relayed>, usize) {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(self.capacity));
        room.peers.insert(peer_id.to_string());
        (room.tx.subscribe(), room.peers.len())
    }

    /// Remove a peer from a room. Empty rooms are dropped.
    pub fn leave_room(&self, room_id: &str, peer_id: &str) {
        let now_empty = match self.rooms.get_mut(room_id) {
            Some(mut room) => {
                room.peers.remove(peer_id);
                room.peers.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(room_id, |_, room| room.peers.is_empty());
        }
    }

    /// Broadcast a message to a room.
    pub fn broadcast(&self, room_id: &str, from: &str, scope: Scope, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            // No receivers is fine; the sender may be alone in the room.
            let _ = room.tx.send(Relayed {
                from: from.to_string(),
                scope,
                msg,
            });
        }
    }

    /// Number of peers in a room.
    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.peers.len())
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the relay on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

/// Index page
async fn index() -> &'static str {
    "Sling Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode server message: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<String> = None;
    let mut room_rx: Option<broadcast::Receiver<Relayed>> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ignore binary, ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                };

                let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("Invalid message from {}: {}", peer_id, e);
                        let err = ServerMessage::Error { message: format!("Invalid message: {}", e) };
                        if let Some(reply) = encode(&err) {
                            let _ = sender.send(reply).await;
                        }
                        continue;
                    }
                };

                match client_msg {
                    ClientMessage::Join { room } => {
                        // Leave current room if any
                        if let Some(old_room) = current_room.take() {
                            state.leave_room(&old_room, &peer_id);
                            state.broadcast(&old_room, &peer_id, Scope::Others, ServerMessage::PeerLeft {
                                peer_id: peer_id.clone(),
                            });
                        }

                        let (rx, peer_count) = state.join_room(&room, &peer_id);
                        room_rx = Some(rx);
                        current_room = Some(room.clone());

                        let joined = ServerMessage::Joined {
                            room: room.clone(),
                            peer_id: peer_id.clone(),
                            peer_count,
                        };
                        if let Some(reply) = encode(&joined) {
                            if sender.send(reply).await.is_err() {
                                break;
                            }
                        }

                        state.broadcast(&room, &peer_id, Scope::Others, ServerMessage::PeerJoined {
                            peer_id: peer_id.clone(),
                        });
                        info!("Peer {} joined room {} ({} peers)", peer_id, room, peer_count);
                    }
                    ClientMessage::Leave => {
                        if let Some(room) = current_room.take() {
                            state.leave_room(&room, &peer_id);
                            state.broadcast(&room, &peer_id, Scope::Others, ServerMessage::PeerLeft {
                                peer_id: peer_id.clone(),
                            });
                            info!("Peer {} left room {}", peer_id, room);
                        }
                        room_rx = None;
                    }
                    ClientMessage::Relay { scope, event } => {
                        let Some(ref room) = current_room else {
                            let err = ServerMessage::Error { message: "Not in a room".to_string() };
                            if let Some(reply) = encode(&err) {
                                let _ = sender.send(reply).await;
                            }
                            continue;
                        };
                        if let Err(e) = event.validate() {
                            warn!("Rejected {} from {}: {}", event.name(), peer_id, e);
                            let err = ServerMessage::Error { message: format!("Invalid event: {}", e) };
                            if let Some(reply) = encode(&err) {
                                let _ = sender.send(reply).await;
                            }
                            continue;
                        }
                        debug!("Relaying {} from {} ({:?})", event.name(), peer_id, scope);
                        state.broadcast(room, &peer_id, scope, ServerMessage::Event {
                            from: peer_id.clone(),
                            event,
                        });
                    }
                }
            }

            // Handle broadcast messages from room
            relayed = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await,
                    // No room joined, just wait forever
                    None => std::future::pending().await,
                }
            } => {
                match relayed {
                    Ok(relayed) => {
                        if !relayed.is_for(&peer_id) {
                            continue;
                        }
                        if let Some(out) = encode(&relayed.msg) {
                            if sender.send(out).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Peer {} lagged, {} event(s) dropped", peer_id, missed);
                    }
                    Err(RecvError::Closed) => {
                        room_rx = None;
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(ref room) = current_room {
        state.leave_room(room, &peer_id);
        state.broadcast(room, &peer_id, Scope::Others, ServerMessage::PeerLeft {
            peer_id: peer_id.clone(),
        });
    }
    info!("Connection closed: {}", peer_id);
}
