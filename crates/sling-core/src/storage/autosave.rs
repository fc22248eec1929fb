//! Periodic local snapshotting of a session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{SnapshotStorage, StorageResult};
use crate::peer::Peer;
use crate::state::Snapshot;

/// Default auto-save interval in seconds.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Key for the most recently saved session.
pub const LAST_SESSION_KEY: &str = "__last_session__";

/// Saves a session's snapshot at most once per interval, and only when
/// something changed.
pub struct AutoSnapshot<S: SnapshotStorage> {
    storage: Arc<S>,
    interval: Duration,
    last_save: Option<Instant>,
    dirty: bool,
    /// ID the snapshot is saved under (usually the room name).
    session_id: String,
}

impl<S: SnapshotStorage> AutoSnapshot<S> {
    pub fn new(storage: Arc<S>, session_id: impl Into<String>) -> Self {
        Self {
            storage,
            interval: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
            last_save: None,
            dirty: false,
            session_id: session_id.into(),
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Mark the session as having unsaved changes.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Pick up changes made to a peer since the last call.
    pub fn track(&mut self, peer: &mut Peer) {
        if peer.take_changed() {
            self.mark_dirty();
        }
    }

    /// Save a peer's current state if a save is due.
    pub async fn maybe_save_peer(&mut self, peer: &mut Peer) -> StorageResult<bool> {
        self.track(peer);
        self.maybe_save(&peer.snapshot()).await
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Check if a save is due (dirty and interval elapsed).
    pub fn should_save(&self) -> bool {
        if !self.dirty {
            return false;
        }
        match self.last_save {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Save if a save is due. Returns true if a save was performed.
    pub async fn maybe_save(&mut self, snapshot: &Snapshot) -> StorageResult<bool> {
        if !self.should_save() {
            return Ok(false);
        }
        self.save(snapshot).await?;
        Ok(true)
    }

    /// Save immediately, under the session ID and as the last session.
    pub async fn save(&mut self, snapshot: &Snapshot) -> StorageResult<()> {
        self.storage.save(&self.session_id, snapshot).await?;
        self.storage.save(LAST_SESSION_KEY, snapshot).await?;
        self.last_save = Some(Instant::now());
        self.dirty = false;
        log::debug!("Saved local snapshot for {}", self.session_id);
        Ok(())
    }

    /// Load this session's snapshot, if one was saved.
    pub async fn load(&mut self) -> StorageResult<Snapshot> {
        let snapshot = self.storage.load(&self.session_id).await?;
        self.dirty = false;
        self.last_save = Some(Instant::now());
        Ok(snapshot)
    }

    /// Load the most recently saved session of any ID.
    pub async fn load_last(&self) -> Option<Snapshot> {
        self.storage.load(LAST_SESSION_KEY).await.ok()
    }

    /// List saved session IDs.
    pub async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let mut ids = self.storage.list().await?;
        ids.retain(|id| id != LAST_SESSION_KEY);
        Ok(ids)
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}
