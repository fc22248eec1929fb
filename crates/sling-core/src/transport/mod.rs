//! Event transports.
//!
//! A transport delivers [`SyncEvent`]s between peers. Two variants exist:
//! [`LocalHub`] connects peers living in the same process (the cross-tab
//! case), [`NativeWebSocket`] goes through the relay server.
//!
//! Delivery is at-most-once and FIFO per sender. A peer that misses events
//! recovers through the join snapshot, never through retransmission.

mod local;
mod websocket;

pub use local::{LocalChannel, LocalHub};
pub use websocket::NativeWebSocket;

use thiserror::Error;

use crate::protocol::{ProtocolError, SyncEvent};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Encoding failed: {0}")]
    Encode(#[from] ProtocolError),
    #[error("Send failed: {0}")]
    Send(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Things a transport reports to its peer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connected to the relay
    Connected,
    /// Disconnected from the relay
    Disconnected,
    /// Joined a room; `peer_count` includes this peer
    Joined { room: String, peer_count: usize },
    /// A peer joined the room
    PeerJoined { peer_id: String },
    /// A peer left the room
    PeerLeft { peer_id: String },
    /// A validated event from a peer
    Event(SyncEvent),
    /// An event this peer sent with `broadcast_to_all`, delivered back to it
    Echo(SyncEvent),
    /// Error occurred
    Error { message: String },
}

/// A bidirectional event channel to an unbounded set of peers.
pub trait Transport {
    /// Deliver to every other peer.
    fn send(&self, event: &SyncEvent) -> TransportResult<()>;

    /// Deliver to every peer, including this one. The copy delivered back to
    /// this peer is reported as [`TransportEvent::Echo`].
    fn broadcast_to_all(&self, event: &SyncEvent) -> TransportResult<()>;

    /// Take everything received since the last poll, in arrival order.
    fn poll(&self) -> Vec<TransportEvent>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}
