//! Sling Core Library
//!
//! State synchronization for live slides: one presenter drives the deck, any
//! number of students mirror slide position, live code and the whiteboard,
//! joining at any time.

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod deck;
pub mod peer;
pub mod protocol;
pub mod state;
pub mod storage;
pub mod transport;
pub mod whiteboard;

pub use config::PeerConfig;
pub use controller::{PenSettings, PresentationController, Role};
pub use coordinator::{Handled, IgnoreReason, SyncCoordinator, SyncPhase};
pub use deck::{Deck, DeckError, Slide, SlideKind};
pub use peer::Peer;
pub use protocol::{ClientMessage, PeerId, ProtocolError, Scope, ServerMessage, SyncEvent};
pub use state::{CodeState, Session, SessionStore, Snapshot};
pub use transport::{ConnectionState, LocalHub, NativeWebSocket, Transport, TransportEvent};
pub use whiteboard::{render, DrawCommand, Stroke, Tool, WhiteboardState};
