//! Join protocol.
//!
//! A starting peer is JOINING: it asks the room for a snapshot with
//! `requestSync` while already applying every live event it receives. The
//! first `doSync` reply from another peer replaces its state; later replies
//! are ignored. SYNCED peers answer every `requestSync` with their own
//! snapshot.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::protocol::{sync_reply, PeerId, SyncEvent, SyncRequest};
use crate::state::SessionStore;
use crate::transport::Transport;

/// Where a peer is in the join protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Waiting for the first snapshot.
    Joining { since: Instant },
    /// Snapshot received, or nothing left to wait for.
    Synced,
}

/// Why an incoming event was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// One of our own events coming back.
    SelfEcho,
    /// A `doSync` arriving after this peer already has state.
    DuplicateSync,
    /// A `requestSync` received while we have nothing authoritative to offer.
    StillJoining,
}

/// What handling an incoming event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// A live update was applied to the store.
    Applied,
    /// A snapshot replaced the store; the peer is now synced.
    Restored,
    /// A snapshot request was answered.
    Answered,
    Ignored(IgnoreReason),
}

/// Runs the join protocol for one peer and applies live events.
pub struct SyncCoordinator {
    transport: Rc<dyn Transport>,
    peer_id: PeerId,
    phase: SyncPhase,
    /// How long to wait for a snapshot before settling on local defaults.
    join_window: Option<Duration>,
}

impl SyncCoordinator {
    /// Create a coordinator in the JOINING phase.
    pub fn new(transport: Rc<dyn Transport>, peer_id: PeerId, join_window: Option<Duration>) -> Self {
        Self {
            transport,
            peer_id,
            phase: SyncPhase::Joining { since: Instant::now() },
            join_window,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Check if the peer is still waiting for its first snapshot.
    pub fn is_joining(&self) -> bool {
        matches!(self.phase, SyncPhase::Joining { .. })
    }

    /// Announce this peer and ask the room for a snapshot.
    pub fn start(&mut self) {
        self.phase = SyncPhase::Joining { since: Instant::now() };
        let request = SyncEvent::RequestSync(SyncRequest {
            sender_id: self.peer_id.clone(),
        });
        if let Err(e) = self.transport.broadcast_to_all(&request) {
            log::warn!("Failed to request sync: {}", e);
        }
        log::info!("Peer {} joining", self.peer_id);
    }

    /// Stop waiting for a snapshot and keep the current state.
    pub fn settle(&mut self) {
        if self.is_joining() {
            log::info!("Peer {} synced without snapshot", self.peer_id);
            self.phase = SyncPhase::Synced;
        }
    }

    /// Settle once the join window has elapsed.
    pub fn tick(&mut self, now: Instant) {
        if let (SyncPhase::Joining { since }, Some(window)) = (self.phase, self.join_window) {
            if now.saturating_duration_since(since) >= window {
                self.settle();
            }
        }
    }

    /// Handle a copy of an event this peer broadcast itself. The local state
    /// already reflects it, so it is never applied a second time.
    pub fn handle_echo(&self, event: &SyncEvent) -> Handled {
        log::trace!("Dropping own {} echo", event.name());
        Handled::Ignored(IgnoreReason::SelfEcho)
    }

    /// Handle an event received from the transport.
    pub fn handle(&mut self, store: &mut SessionStore, event: SyncEvent) -> Handled {
        match event {
            SyncEvent::SlideChange(nav) => {
                store.apply_navigation(nav.slide_index, nav.step_index);
                Handled::Applied
            }
            SyncEvent::CodeChange(edit) => {
                store.apply_code_edit(edit.slide_index, edit.code);
                Handled::Applied
            }
            SyncEvent::Drawing(stroke) => {
                store.apply_stroke(stroke);
                Handled::Applied
            }
            SyncEvent::ClearCanvas(_) => {
                store.apply_clear();
                Handled::Applied
            }
            SyncEvent::BackgroundColorChange(color) => {
                store.apply_background_color(color);
                Handled::Applied
            }
            SyncEvent::RequestSync(request) => {
                if request.sender_id == self.peer_id {
                    return Handled::Ignored(IgnoreReason::SelfEcho);
                }
                if self.is_joining() {
                    return Handled::Ignored(IgnoreReason::StillJoining);
                }
                let reply = sync_reply(&self.peer_id, store.snapshot());
                if let Err(e) = self.transport.broadcast_to_all(&reply) {
                    log::warn!("Failed to answer sync request from {}: {}", request.sender_id, e);
                }
                Handled::Answered
            }
            SyncEvent::DoSync(reply) => {
                if reply.sender_id == self.peer_id {
                    return Handled::Ignored(IgnoreReason::SelfEcho);
                }
                if !self.is_joining() {
                    log::debug!("Ignoring late snapshot from {}", reply.sender_id);
                    return Handled::Ignored(IgnoreReason::DuplicateSync);
                }
                store.restore(reply.snapshot);
                self.phase = SyncPhase::Synced;
                log::info!("Peer {} synced from {}", self.peer_id, reply.sender_id);
                Handled::Restored
            }
        }
    }
}
