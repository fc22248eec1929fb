//! Whiteboard model and stroke replay.
//!
//! Strokes are stored in normalized coordinates so every peer can replay them
//! against its own canvas size. [`render`] turns the stroke log into drawing
//! commands without touching any rendering surface.

use kurbo::{Line, Point, Size};
use serde::{Deserialize, Serialize};

/// Default canvas background.
pub const DEFAULT_BACKGROUND: &str = "#ffffff";

/// Drawing tool used for a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
}

/// One normalized line segment of freehand drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub tool: Tool,
    /// Ignored when `tool` is [`Tool::Eraser`].
    pub color: String,
    pub line_width: f64,
}

impl Stroke {
    /// Build a stroke from two canvas-pixel positions, normalizing against `canvas`.
    ///
    /// Returns `None` for a degenerate canvas. Positions outside the canvas are
    /// clamped onto its edge.
    pub fn from_canvas(
        from: Point,
        to: Point,
        canvas: Size,
        tool: Tool,
        color: &str,
        line_width: f64,
    ) -> Option<Self> {
        if !(canvas.width > 0.0 && canvas.height > 0.0) {
            return None;
        }
        let nx = |x: f64| (x / canvas.width).clamp(0.0, 1.0);
        let ny = |y: f64| (y / canvas.height).clamp(0.0, 1.0);
        Some(Self {
            x0: nx(from.x),
            y0: ny(from.y),
            x1: nx(to.x),
            y1: ny(to.y),
            tool,
            color: color.to_string(),
            line_width,
        })
    }

    /// Check the coordinate, width and color constraints of a stroke.
    pub fn is_valid(&self) -> bool {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        in_unit(self.x0)
            && in_unit(self.y0)
            && in_unit(self.x1)
            && in_unit(self.y1)
            && self.line_width.is_finite()
            && self.line_width > 0.0
            && (self.tool == Tool::Eraser || !self.color.trim().is_empty())
    }

    /// The segment scaled to a canvas of the given size.
    pub fn to_canvas(&self, canvas: Size) -> Line {
        Line::new(
            Point::new(self.x0 * canvas.width, self.y0 * canvas.height),
            Point::new(self.x1 * canvas.width, self.y1 * canvas.height),
        )
    }
}

/// Whiteboard background plus the ordered stroke log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardState {
    pub background_color: String,
    pub strokes: Vec<Stroke>,
}

impl Default for WhiteboardState {
    fn default() -> Self {
        Self {
            background_color: DEFAULT_BACKGROUND.to_string(),
            strokes: Vec::new(),
        }
    }
}

/// How a segment is composited onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blend {
    /// Paint over existing pixels.
    SourceOver,
    /// Remove existing pixels along the segment.
    DestinationOut,
}

/// A single drawing operation for a canvas backend.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Wipe the canvas and fill it with a color.
    Clear { background: String },
    /// Draw a round-capped segment.
    Segment {
        line: Line,
        width: f64,
        blend: Blend,
        /// `None` for eraser segments.
        color: Option<String>,
    },
}

/// Replay a whiteboard onto a blank canvas of the given size.
///
/// The first command always clears to the background; each stroke then maps to
/// exactly one segment, in log order.
pub fn render(state: &WhiteboardState, canvas: Size) -> Vec<DrawCommand> {
    let mut commands = Vec::with_capacity(state.strokes.len() + 1);
    commands.push(DrawCommand::Clear {
        background: state.background_color.clone(),
    });
    commands.extend(state.strokes.iter().map(|stroke| {
        let (blend, color) = match stroke.tool {
            Tool::Pen => (Blend::SourceOver, Some(stroke.color.clone())),
            Tool::Eraser => (Blend::DestinationOut, None),
        };
        DrawCommand::Segment {
            line: stroke.to_canvas(canvas),
            width: stroke.line_width,
            blend,
            color,
        }
    }));
    commands
}
