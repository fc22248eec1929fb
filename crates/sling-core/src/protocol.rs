//! Wire protocol.
//!
//! Peers exchange [`SyncEvent`]s as JSON objects of the form
//! `{"type": "<eventName>", "payload": {...}}`. When going through the relay
//! server, events are wrapped in [`ClientMessage`] / [`ServerMessage`]:
//!
//! ```json
//! { "type": "join", "room": "lecture-1" }
//! { "type": "relay", "scope": "others", "event": { "type": "drawing", "payload": { ... } } }
//! { "type": "event", "from": "<peer>", "event": { "type": "slideChange", "payload": { ... } } }
//! ```

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::state::Snapshot;
use crate::whiteboard::Stroke;

/// Protocol errors. All of them mean "drop the event".
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid stroke")]
    InvalidStroke,
    #[error("Empty color")]
    EmptyColor,
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Locally generated identity of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Navigation payload. Indices are signed so that out-of-range values from
/// other peers can be clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub slide_index: i64,
    #[serde(default)]
    pub step_index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEdit {
    pub slide_index: usize,
    pub code: String,
}

/// Empty payload of `clearCanvas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Clear {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub sender_id: PeerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReply {
    pub sender_id: PeerId,
    pub snapshot: Snapshot,
}

/// Every event peers exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SyncEvent {
    /// Broadcast to all, sender included.
    SlideChange(Navigation),
    CodeChange(CodeEdit),
    Drawing(Stroke),
    /// Broadcast to all, sender included.
    ClearCanvas(Clear),
    BackgroundColorChange(String),
    /// Broadcast to all, sender included.
    RequestSync(SyncRequest),
    /// Broadcast to all; receivers filter on `sender_id`.
    DoSync(SyncReply),
}

impl SyncEvent {
    /// Navigation event.
    pub fn slide_change(slide_index: usize, step_index: usize) -> Self {
        SyncEvent::SlideChange(Navigation {
            slide_index: slide_index as i64,
            step_index: step_index as i64,
        })
    }

    /// Code edit event.
    pub fn code_change(slide_index: usize, code: impl Into<String>) -> Self {
        SyncEvent::CodeChange(CodeEdit {
            slide_index,
            code: code.into(),
        })
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::SlideChange(_) => "slideChange",
            SyncEvent::CodeChange(_) => "codeChange",
            SyncEvent::Drawing(_) => "drawing",
            SyncEvent::ClearCanvas(_) => "clearCanvas",
            SyncEvent::BackgroundColorChange(_) => "backgroundColorChange",
            SyncEvent::RequestSync(_) => "requestSync",
            SyncEvent::DoSync(_) => "doSync",
        }
    }

    /// Check payload constraints that the type system does not capture.
    pub fn validate(&self) -> ProtocolResult<()> {
        match self {
            SyncEvent::Drawing(stroke) => validate_stroke(stroke),
            SyncEvent::BackgroundColorChange(color) if color.trim().is_empty() => {
                Err(ProtocolError::EmptyColor)
            }
            SyncEvent::DoSync(reply) => {
                let board = &reply.snapshot.whiteboard_state;
                if board.background_color.trim().is_empty() {
                    return Err(ProtocolError::EmptyColor);
                }
                board.strokes.iter().try_for_each(validate_stroke)
            }
            _ => Ok(()),
        }
    }

    /// Parse and validate an event received from a transport.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let event: SyncEvent = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    /// Serialize for a transport.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

const EVENT_NAMES: &[&str] = &[
    "slideChange",
    "codeChange",
    "drawing",
    "clearCanvas",
    "backgroundColorChange",
    "requestSync",
    "doSync",
];

/// `clearCanvas` may come without a payload; every other event requires one.
impl<'de> Deserialize<'de> for SyncEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Tagged {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            payload: Option<Value>,
        }

        fn payload<T: DeserializeOwned, E: de::Error>(payload: Option<Value>) -> Result<T, E> {
            let value = payload.ok_or_else(|| E::missing_field("payload"))?;
            serde_json::from_value(value).map_err(E::custom)
        }

        let tagged = Tagged::deserialize(deserializer)?;
        match tagged.kind.as_str() {
            "slideChange" => payload(tagged.payload).map(SyncEvent::SlideChange),
            "codeChange" => payload(tagged.payload).map(SyncEvent::CodeChange),
            "drawing" => payload(tagged.payload).map(SyncEvent::Drawing),
            "clearCanvas" => match tagged.payload {
                // A null payload also lands here.
                None => Ok(SyncEvent::ClearCanvas(Clear {})),
                body => payload(body).map(SyncEvent::ClearCanvas),
            },
            "backgroundColorChange" => payload(tagged.payload).map(SyncEvent::BackgroundColorChange),
            "requestSync" => payload(tagged.payload).map(SyncEvent::RequestSync),
            "doSync" => payload(tagged.payload).map(SyncEvent::DoSync),
            other => Err(de::Error::unknown_variant(other, EVENT_NAMES)),
        }
    }
}

fn validate_stroke(stroke: &Stroke) -> ProtocolResult<()> {
    if stroke.is_valid() {
        Ok(())
    } else {
        Err(ProtocolError::InvalidStroke)
    }
}

/// Build the `doSync` reply for a snapshot.
pub fn sync_reply(sender_id: &PeerId, snapshot: Snapshot) -> SyncEvent {
    SyncEvent::DoSync(SyncReply {
        sender_id: sender_id.clone(),
        snapshot,
    })
}

// ============================================================================
// Relay envelopes
// ============================================================================

/// Who receives a relayed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Every peer in the room except the sender.
    Others,
    /// Every peer in the room, sender included.
    All,
}

/// Messages sent to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Relay an event to the room
    Relay { scope: Scope, event: SyncEvent },
}

/// Messages received from the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join. `peer_id` is the relay's id for this connection,
    /// as it appears in the `from` field of relayed events.
    Joined {
        room: String,
        peer_id: String,
        peer_count: usize,
    },
    /// Peer joined the room
    PeerJoined { peer_id: String },
    /// Peer left the room
    PeerLeft { peer_id: String },
    /// Event relayed from a peer
    Event { from: String, event: SyncEvent },
    /// Error message
    Error { message: String },
}
