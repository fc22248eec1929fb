//! Slide deck definitions.
//!
//! The deck is supplied at startup and is read-only for the rest of the
//! session. The core only needs the slide count, the number of step markers
//! per slide and the starting code text of code slides.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deck loading errors.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("Deck has no slides")]
    Empty,
    #[error("Failed to parse deck: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for deck operations.
pub type DeckResult<T> = Result<T, DeckError>;

/// Kind-specific slide data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlideKind {
    /// Static content, optionally revealed in steps.
    Content {
        #[serde(default)]
        title: String,
        #[serde(default)]
        body: String,
        /// Number of step markers on this slide (0 = unstepped).
        #[serde(default)]
        steps: usize,
    },
    /// Live-edited code.
    Code {
        #[serde(default)]
        title: String,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        initial_code: String,
        #[serde(default)]
        description: Option<String>,
    },
    /// Shared freehand whiteboard.
    Whiteboard {
        #[serde(default)]
        title: String,
    },
}

/// A single slide descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub id: String,
    #[serde(flatten)]
    pub kind: SlideKind,
}

impl Slide {
    /// Create a content slide.
    pub fn content(id: impl Into<String>, title: impl Into<String>, steps: usize) -> Self {
        Self {
            id: id.into(),
            kind: SlideKind::Content {
                title: title.into(),
                body: String::new(),
                steps,
            },
        }
    }

    /// Create a code slide.
    pub fn code(id: impl Into<String>, title: impl Into<String>, initial_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SlideKind::Code {
                title: title.into(),
                language: None,
                initial_code: initial_code.into(),
                description: None,
            },
        }
    }

    /// Create a whiteboard slide.
    pub fn whiteboard(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SlideKind::Whiteboard { title: String::new() },
        }
    }

    /// Number of step markers on this slide.
    pub fn steps(&self) -> usize {
        match &self.kind {
            SlideKind::Content { steps, .. } => *steps,
            _ => 0,
        }
    }

    /// Check if this is a code slide.
    pub fn is_code(&self) -> bool {
        matches!(self.kind, SlideKind::Code { .. })
    }

    /// Check if this is a whiteboard slide.
    pub fn is_whiteboard(&self) -> bool {
        matches!(self.kind, SlideKind::Whiteboard { .. })
    }

    /// Starting code text, for code slides.
    pub fn initial_code(&self) -> Option<&str> {
        match &self.kind {
            SlideKind::Code { initial_code, .. } => Some(initial_code),
            _ => None,
        }
    }
}

/// An ordered, non-empty list of slides.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Deck {
    slides: Vec<Slide>,
}

impl Deck {
    /// Create a deck. Fails if `slides` is empty.
    pub fn new(slides: Vec<Slide>) -> DeckResult<Self> {
        if slides.is_empty() {
            return Err(DeckError::Empty);
        }
        Ok(Self { slides })
    }

    /// Parse a deck from a JSON array of slides.
    pub fn from_json(json: &str) -> DeckResult<Self> {
        let slides: Vec<Slide> = serde_json::from_str(json)?;
        Self::new(slides)
    }

    /// Number of slides (always at least 1).
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Get a slide by index.
    pub fn get(&self, index: usize) -> Option<&Slide> {
        self.slides.get(index)
    }

    /// Index of the last slide.
    pub fn last_index(&self) -> usize {
        self.slides.len() - 1
    }

    /// Iterate over all slides.
    pub fn iter(&self) -> impl Iterator<Item = &Slide> {
        self.slides.iter()
    }
}
