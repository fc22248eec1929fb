//! Presentation controller.
//!
//! Turns local input into a store mutation plus an outbound event. Only the
//! presenter drives the session: for a student every entry point is a no-op,
//! except code edits which stay local to the student's own editor.

use std::rc::Rc;

use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};

use crate::deck::Deck;
use crate::protocol::{Clear, SyncEvent};
use crate::state::SessionStore;
use crate::transport::Transport;
use crate::whiteboard::{Stroke, Tool};

/// Smallest selectable line width.
pub const MIN_LINE_WIDTH: f64 = 1.0;
/// Largest selectable line width.
pub const MAX_LINE_WIDTH: f64 = 50.0;

/// A peer's part in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single writer of the session.
    Presenter,
    /// A passive viewer.
    #[default]
    Student,
}

/// Settings applied to newly captured strokes.
#[derive(Debug, Clone, PartialEq)]
pub struct PenSettings {
    pub tool: Tool,
    pub color: String,
    pub line_width: f64,
}

impl Default for PenSettings {
    fn default() -> Self {
        Self {
            tool: Tool::Pen,
            color: "#000000".to_string(),
            line_width: 5.0,
        }
    }
}

/// Local input handling for one peer.
pub struct PresentationController {
    transport: Rc<dyn Transport>,
    role: Role,
    deck: Deck,
    pen: PenSettings,
    /// Canvas size in pixels, used to normalize captured positions.
    canvas: Size,
    /// Last pointer position while a gesture is being captured.
    capture: Option<Point>,
}

impl PresentationController {
    pub fn new(transport: Rc<dyn Transport>, role: Role, deck: Deck) -> Self {
        Self {
            transport,
            role,
            deck,
            pen: PenSettings::default(),
            canvas: Size::ZERO,
            capture: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_presenter(&self) -> bool {
        self.role == Role::Presenter
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn pen(&self) -> &PenSettings {
        &self.pen
    }

    // --- Navigation ---

    /// Reveal the next step, or move to the next slide.
    pub fn go_next(&mut self, store: &mut SessionStore) -> bool {
        let session = store.session();
        let steps = self.deck.get(session.current_slide).map_or(0, |s| s.steps());
        if session.current_step < steps {
            self.navigate(store, session.current_slide, session.current_step + 1)
        } else if session.current_slide < self.deck.last_index() {
            self.navigate(store, session.current_slide + 1, 0)
        } else {
            false
        }
    }

    /// Move to step 0 of the previous slide.
    ///
    /// The previous slide's last revealed step is not restored.
    pub fn go_prev(&mut self, store: &mut SessionStore) -> bool {
        let session = store.session();
        if session.current_slide == 0 {
            return false;
        }
        self.navigate(store, session.current_slide - 1, 0)
    }

    /// Jump to a slide, clamped to the deck.
    pub fn go_to(&mut self, store: &mut SessionStore, slide: usize) -> bool {
        self.navigate(store, slide.min(self.deck.last_index()), 0)
    }

    fn navigate(&mut self, store: &mut SessionStore, slide: usize, step: usize) -> bool {
        if !self.is_presenter() {
            return false;
        }
        let session = store.session();
        if session.current_slide == slide && session.current_step == step {
            return false;
        }
        // A slide change always starts a fresh gesture.
        if slide != session.current_slide {
            self.capture = None;
        }
        store.apply_navigation(slide as i64, step as i64);
        self.emit_to_all(&SyncEvent::slide_change(slide, step));
        true
    }

    // --- Code editing ---

    /// Replace the code of the current slide.
    ///
    /// Returns false if the current slide is not a code slide. Student edits
    /// are applied locally and never broadcast.
    pub fn edit_code(&mut self, store: &mut SessionStore, text: &str) -> bool {
        let slide = store.session().current_slide;
        if !self.deck.get(slide).is_some_and(|s| s.is_code()) {
            return false;
        }
        store.apply_code_edit(slide, text);
        if self.is_presenter() {
            self.emit(&SyncEvent::code_change(slide, text));
        }
        true
    }

    // --- Whiteboard ---

    pub fn set_tool(&mut self, tool: Tool) {
        self.pen.tool = tool;
    }

    /// Blank colors are ignored.
    pub fn set_color(&mut self, color: impl Into<String>) {
        let color = color.into();
        if !color.trim().is_empty() {
            self.pen.color = color;
        }
    }

    pub fn set_line_width(&mut self, width: f64) {
        if width.is_finite() {
            self.pen.line_width = width.clamp(MIN_LINE_WIDTH, MAX_LINE_WIDTH);
        }
    }

    /// Update the pixel size of the local canvas.
    pub fn set_canvas_size(&mut self, size: Size) {
        self.canvas = size;
    }

    /// Check if a drawing gesture is in progress.
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Begin a gesture at `point` (canvas pixels).
    pub fn pointer_down(&mut self, point: Point) {
        if self.is_presenter() {
            self.capture = Some(point);
        }
    }

    /// Extend the current gesture, emitting one stroke per move sample.
    pub fn pointer_move(&mut self, store: &mut SessionStore, point: Point) -> Option<Stroke> {
        let last = self.capture?;
        self.capture = Some(point);
        let stroke = Stroke::from_canvas(
            last,
            point,
            self.canvas,
            self.pen.tool,
            &self.pen.color,
            self.pen.line_width,
        )?;
        store.apply_stroke(stroke.clone());
        self.emit(&SyncEvent::Drawing(stroke.clone()));
        Some(stroke)
    }

    /// End the current gesture (pointer up or leaving the canvas).
    pub fn pointer_up(&mut self) {
        self.capture = None;
    }

    /// Wipe the whiteboard for every peer.
    pub fn clear_canvas(&mut self, store: &mut SessionStore) -> bool {
        if !self.is_presenter() {
            return false;
        }
        store.apply_clear();
        self.emit_to_all(&SyncEvent::ClearCanvas(Clear {}));
        true
    }

    /// Change the whiteboard background for every peer.
    pub fn set_background(&mut self, store: &mut SessionStore, color: &str) -> bool {
        if !self.is_presenter() || color.trim().is_empty() {
            return false;
        }
        store.apply_background_color(color);
        self.emit(&SyncEvent::BackgroundColorChange(color.to_string()));
        true
    }

    // --- Outbound ---

    fn emit(&self, event: &SyncEvent) {
        if let Err(e) = self.transport.send(event) {
            log::warn!("Failed to send {}: {}", event.name(), e);
        }
    }

    fn emit_to_all(&self, event: &SyncEvent) {
        if let Err(e) = self.transport.broadcast_to_all(event) {
            log::warn!("Failed to broadcast {}: {}", event.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Slide;
    use crate::state::Session;
    use crate::transport::{LocalChannel, LocalHub, TransportEvent};

    fn deck() -> Deck {
        Deck::new(vec![
            Slide::content("intro", "Dominoes", 2),
            Slide::code("class", "The Domino Class", "class Domino {};"),
            Slide::whiteboard("board"),
        ])
        .unwrap()
    }

    fn setup(role: Role) -> (PresentationController, SessionStore, LocalChannel) {
        let hub = LocalHub::new();
        let observer = hub.channel();
        let controller = PresentationController::new(Rc::new(hub.channel()), role, deck());
        (controller, SessionStore::new(3), observer)
    }

    fn drain(channel: &LocalChannel) -> Vec<SyncEvent> {
        channel
            .poll()
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::Event(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    fn at(slide: usize, step: usize) -> Session {
        Session { current_slide: slide, current_step: step }
    }

    #[test]
    fn test_go_next_walks_steps_then_slides() {
        let (mut controller, mut store, observer) = setup(Role::Presenter);

        let mut visited = vec![store.session()];
        for _ in 0..3 {
            assert!(controller.go_next(&mut store));
            visited.push(store.session());
        }

        assert_eq!(visited, vec![at(0, 0), at(0, 1), at(0, 2), at(1, 0)]);
        assert_eq!(
            drain(&observer),
            vec![
                SyncEvent::slide_change(0, 1),
                SyncEvent::slide_change(0, 2),
                SyncEvent::slide_change(1, 0),
            ]
        );
    }

    #[test]
    fn test_go_prev_resets_step() {
        let (mut controller, mut store, _observer) = setup(Role::Presenter);
        for _ in 0..3 {
            controller.go_next(&mut store);
        }
        assert_eq!(store.session(), at(1, 0));

        assert!(controller.go_prev(&mut store));
        assert_eq!(store.session(), at(0, 0));
        assert!(!controller.go_prev(&mut store));
    }

    #[test]
    fn test_go_next_stops_at_end() {
        let (mut controller, mut store, observer) = setup(Role::Presenter);
        controller.go_to(&mut store, 99);
        assert_eq!(store.session(), at(2, 0));
        drain(&observer);

        assert!(!controller.go_next(&mut store));
        assert!(drain(&observer).is_empty());
    }

    #[test]
    fn test_navigation_broadcast_includes_sender() {
        let hub = LocalHub::new();
        let channel = Rc::new(hub.channel());
        let transport: Rc<dyn Transport> = channel.clone();
        let mut controller = PresentationController::new(transport, Role::Presenter, deck());
        let mut store = SessionStore::new(3);

        controller.go_to(&mut store, 1);

        assert_eq!(channel.poll(), vec![TransportEvent::Echo(SyncEvent::slide_change(1, 0))]);
    }

    #[test]
    fn test_student_cannot_navigate_or_draw() {
        let (mut controller, mut store, observer) = setup(Role::Student);
        controller.set_canvas_size(Size::new(100.0, 100.0));

        assert!(!controller.go_next(&mut store));
        assert!(!controller.clear_canvas(&mut store));
        assert!(!controller.set_background(&mut store, "#ff0000"));
        controller.pointer_down(Point::new(10.0, 10.0));
        assert!(controller.pointer_move(&mut store, Point::new(20.0, 20.0)).is_none());

        assert_eq!(store.session(), at(0, 0));
        assert!(store.whiteboard().strokes.is_empty());
        assert!(drain(&observer).is_empty());
    }

    #[test]
    fn test_code_edit_single_writer() {
        let (mut presenter, mut store, observer) = setup(Role::Presenter);
        assert!(!presenter.edit_code(&mut store, "not a code slide"));

        presenter.go_to(&mut store, 1);
        drain(&observer);
        assert!(presenter.edit_code(&mut store, "int x = 1;"));
        assert_eq!(store.code(1), Some("int x = 1;"));
        assert_eq!(drain(&observer), vec![SyncEvent::code_change(1, "int x = 1;")]);

        let (mut student, mut student_store, student_observer) = setup(Role::Student);
        student_store.apply_navigation(1, 0);
        assert!(student.edit_code(&mut student_store, "scratch"));
        assert_eq!(student_store.code(1), Some("scratch"));
        assert!(drain(&student_observer).is_empty());
    }

    #[test]
    fn test_drawing_capture_emits_normalized_strokes() {
        let (mut controller, mut store, observer) = setup(Role::Presenter);
        controller.set_canvas_size(Size::new(200.0, 100.0));
        controller.set_color("#ff0000");

        // Moves before pointer down are not captured.
        assert!(controller.pointer_move(&mut store, Point::new(5.0, 5.0)).is_none());

        controller.pointer_down(Point::new(0.0, 0.0));
        controller.pointer_move(&mut store, Point::new(100.0, 50.0));
        controller.pointer_move(&mut store, Point::new(200.0, 100.0));
        controller.pointer_up();
        assert!(controller.pointer_move(&mut store, Point::new(0.0, 0.0)).is_none());

        let strokes = &store.whiteboard().strokes;
        assert_eq!(strokes.len(), 2);
        assert_eq!((strokes[0].x1, strokes[0].y1), (0.5, 0.5));
        assert_eq!((strokes[1].x0, strokes[1].y0, strokes[1].x1, strokes[1].y1), (0.5, 0.5, 1.0, 1.0));
        assert_eq!(strokes[1].color, "#ff0000");

        let sent = drain(&observer);
        assert_eq!(sent, strokes.iter().cloned().map(SyncEvent::Drawing).collect::<Vec<_>>());
    }

    #[test]
    fn test_blank_color_keeps_pen_color() {
        let (mut controller, _store, _observer) = setup(Role::Presenter);
        controller.set_color("#00ff00");
        controller.set_color("");
        assert_eq!(controller.pen().color, "#00ff00");
    }

    #[test]
    fn test_line_width_clamped() {
        let (mut controller, _store, _observer) = setup(Role::Presenter);
        controller.set_line_width(120.0);
        assert_eq!(controller.pen().line_width, MAX_LINE_WIDTH);
        controller.set_line_width(0.0);
        assert_eq!(controller.pen().line_width, MIN_LINE_WIDTH);
        controller.set_line_width(f64::NAN);
        assert_eq!(controller.pen().line_width, MIN_LINE_WIDTH);
    }

    #[test]
    fn test_clear_and_background() {
        let (mut controller, mut store, observer) = setup(Role::Presenter);
        controller.set_canvas_size(Size::new(10.0, 10.0));
        controller.pointer_down(Point::new(1.0, 1.0));
        controller.pointer_move(&mut store, Point::new(2.0, 2.0));
        drain(&observer);

        assert!(controller.set_background(&mut store, "#222222"));
        assert!(controller.clear_canvas(&mut store));

        assert!(store.whiteboard().strokes.is_empty());
        assert_eq!(store.whiteboard().background_color, "#222222");
        assert_eq!(
            drain(&observer),
            vec![
                SyncEvent::BackgroundColorChange("#222222".to_string()),
                SyncEvent::ClearCanvas(Clear {}),
            ]
        );
    }
}
