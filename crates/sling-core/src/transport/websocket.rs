//! WebSocket client for the relay server.

use std::cell::Cell;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tungstenite::{connect, Message};
use url::Url;

use super::{ConnectionState, Transport, TransportError, TransportEvent, TransportResult};
use crate::protocol::{ClientMessage, Scope, ServerMessage, SyncEvent};

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// Relay client for native platforms.
///
/// Uses a background thread for socket IO; all received events are handed to
/// the owning peer through [`Transport::poll`], so state is only ever touched
/// on the peer's own thread.
pub struct NativeWebSocket {
    state: Cell<ConnectionState>,
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<TransportEvent>>,
    /// Handle to the WebSocket thread.
    _thread: Option<JoinHandle<()>>,
}

impl NativeWebSocket {
    /// Create a new disconnected client.
    pub fn new() -> Self {
        Self {
            state: Cell::new(ConnectionState::Disconnected),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Connect to a relay server and join `room`.
    pub fn connect(&mut self, url: &str, room: &str) -> TransportResult<()> {
        if self.cmd_tx.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let parsed_url = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed_url.scheme()
            )));
        }

        let join = serde_json::to_string(&ClientMessage::Join { room: room.to_string() })
            .map_err(|e| TransportError::Send(e.to_string()))?;

        self.state.set(ConnectionState::Connecting);

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<TransportEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || run_socket(&url, &join, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);

        Ok(())
    }

    /// Disconnect from the server.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state.set(ConnectionState::Disconnected);
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    fn relay(&self, scope: Scope, event: &SyncEvent) -> TransportResult<()> {
        let tx = self.cmd_tx.as_ref().ok_or(TransportError::NotConnected)?;
        let msg = ClientMessage::Relay {
            scope,
            event: event.clone(),
        };
        let json = serde_json::to_string(&msg).map_err(|e| TransportError::Send(e.to_string()))?;
        tx.send(WsCommand::Send(json))
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

impl Default for NativeWebSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeWebSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Transport for NativeWebSocket {
    fn send(&self, event: &SyncEvent) -> TransportResult<()> {
        self.relay(Scope::Others, event)
    }

    fn broadcast_to_all(&self, event: &SyncEvent) -> TransportResult<()> {
        self.relay(Scope::All, event)
    }

    fn poll(&self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    TransportEvent::Connected => self.state.set(ConnectionState::Connected),
                    TransportEvent::Disconnected => self.state.set(ConnectionState::Disconnected),
                    TransportEvent::Error { .. } => self.state.set(ConnectionState::Error),
                    _ => {}
                }
                events.push(event);
            }
        }
        events
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

/// Map a server message to a transport event. Invalid events are dropped.
///
/// `own_id` is the relay's id for this connection, learned from `joined`;
/// events relayed from it are reported as echoes.
fn translate(text: &str, own_id: &mut Option<String>) -> Option<TransportEvent> {
    let msg = match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            log::debug!("Dropping unparseable server message: {}", e);
            return None;
        }
    };
    let event = match msg {
        ServerMessage::Joined {
            room,
            peer_id,
            peer_count,
        } => {
            *own_id = Some(peer_id);
            TransportEvent::Joined { room, peer_count }
        }
        ServerMessage::PeerJoined { peer_id } => TransportEvent::PeerJoined { peer_id },
        ServerMessage::PeerLeft { peer_id } => TransportEvent::PeerLeft { peer_id },
        ServerMessage::Event { from, event } => {
            if let Err(e) = event.validate() {
                log::debug!("Dropping {} from {}: {}", event.name(), from, e);
                return None;
            }
            if own_id.as_deref() == Some(from.as_str()) {
                TransportEvent::Echo(event)
            } else {
                TransportEvent::Event(event)
            }
        }
        ServerMessage::Error { message } => TransportEvent::Error { message },
    };
    Some(event)
}

/// Socket loop run on the background thread.
fn run_socket(url: &str, join: &str, cmd_rx: Receiver<WsCommand>, event_tx: Sender<TransportEvent>) {
    log::info!("WebSocket thread: connecting to {}", url);

    let (mut socket, response) = match connect(url) {
        Ok(connected) => connected,
        Err(e) => {
            log::error!("WebSocket connection failed: {}", e);
            let _ = event_tx.send(TransportEvent::Error {
                message: format!("Connection failed: {}", e),
            });
            return;
        }
    };

    log::info!("WebSocket connected, status: {}", response.status());
    let _ = event_tx.send(TransportEvent::Connected);

    // Short read timeout so outgoing commands are not starved by a quiet socket.
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    if let Err(e) = socket.send(Message::Text(join.to_string())) {
        log::error!("WebSocket join failed: {}", e);
        let _ = event_tx.send(TransportEvent::Disconnected);
        return;
    }

    let mut own_id = None;

    loop {
        // Drain all pending commands, preserving send order.
        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("WebSocket send error: {}", e);
                        let _ = event_tx.send(TransportEvent::Disconnected);
                        return;
                    }
                }
                Ok(WsCommand::Close) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    return;
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("WebSocket command channel disconnected");
                    let _ = socket.close(None);
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(txt)) => {
                if let Some(event) = translate(&txt, &mut own_id) {
                    if event_tx.send(event).is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                break;
            }
        }
    }

    log::info!("WebSocket thread exiting");
    let _ = event_tx.send(TransportEvent::Disconnected);
}
