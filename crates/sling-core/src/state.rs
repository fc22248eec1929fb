//! Session state store.
//!
//! Holds this peer's copy of the slide position, per-slide code text and the
//! whiteboard. All mutation goes through the `apply_*` methods (live events and
//! local presenter actions) or [`SessionStore::restore`] (join snapshot only).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::whiteboard::{Stroke, WhiteboardState};

/// Latest code text per slide index.
pub type CodeState = BTreeMap<usize, String>;

/// Slide position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub current_slide: usize,
    pub current_step: usize,
}

/// A full copy of the session state, as exchanged during the join protocol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub slide_index: usize,
    pub step_index: usize,
    #[serde(default)]
    pub code_state: CodeState,
    #[serde(default)]
    pub whiteboard_state: WhiteboardState,
}

/// This peer's session state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    slide_count: usize,
    session: Session,
    code: CodeState,
    whiteboard: WhiteboardState,
}

impl SessionStore {
    /// Create an empty store for a deck of `slide_count` slides.
    ///
    /// A zero count is treated as a single slide so the index invariant holds.
    pub fn new(slide_count: usize) -> Self {
        Self {
            slide_count: slide_count.max(1),
            session: Session::default(),
            code: CodeState::new(),
            whiteboard: WhiteboardState::default(),
        }
    }

    /// Number of slides navigation is clamped to.
    pub fn slide_count(&self) -> usize {
        self.slide_count
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn code_state(&self) -> &CodeState {
        &self.code
    }

    /// Code text for a slide, if any edit has been seen.
    pub fn code(&self, slide: usize) -> Option<&str> {
        self.code.get(&slide).map(String::as_str)
    }

    pub fn whiteboard(&self) -> &WhiteboardState {
        &self.whiteboard
    }

    // --- Incremental updates ---

    /// Move to a slide and step, clamping out-of-range indices to the nearest
    /// valid bound.
    pub fn apply_navigation(&mut self, slide_index: i64, step_index: i64) {
        let last = (self.slide_count - 1) as i64;
        self.session = Session {
            current_slide: slide_index.clamp(0, last) as usize,
            current_step: step_index.max(0) as usize,
        };
    }

    /// Last-write-wins overwrite of a slide's code. Any index is accepted.
    pub fn apply_code_edit(&mut self, slide_index: usize, text: impl Into<String>) {
        self.code.insert(slide_index, text.into());
    }

    /// Append a stroke to the whiteboard log.
    pub fn apply_stroke(&mut self, stroke: Stroke) {
        self.whiteboard.strokes.push(stroke);
    }

    /// Drop all strokes. The background color is kept.
    pub fn apply_clear(&mut self) {
        self.whiteboard.strokes.clear();
    }

    pub fn apply_background_color(&mut self, color: impl Into<String>) {
        self.whiteboard.background_color = color.into();
    }

    // --- Snapshots ---

    /// Copy the full state for transmission.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            slide_index: self.session.current_slide,
            step_index: self.session.current_step,
            code_state: self.code.clone(),
            whiteboard_state: self.whiteboard.clone(),
        }
    }

    /// Replace all local state with a received snapshot.
    ///
    /// The slide index is still clamped to this peer's deck.
    pub fn restore(&mut self, snapshot: Snapshot) {
        let last = self.slide_count - 1;
        self.session = Session {
            current_slide: snapshot.slide_index.min(last),
            current_step: snapshot.step_index,
        };
        self.code = snapshot.code_state;
        self.whiteboard = snapshot.whiteboard_state;
    }

    /// Seed code text from a local cache without touching anything else.
    ///
    /// Entries already present win over cached ones.
    pub fn seed_code(&mut self, cached: CodeState) {
        for (slide, text) in cached {
            self.code.entry(slide).or_insert(text);
        }
    }
}
