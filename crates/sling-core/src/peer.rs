//! One participant in a session.
//!
//! Owns the session store and wires it to the sync coordinator and the
//! presentation controller, which share a single injected transport. The
//! host calls [`Peer::pump`] from its event loop; everything runs on that one
//! thread.

use std::rc::Rc;
use std::time::Instant;

use kurbo::{Point, Size};

use crate::config::PeerConfig;
use crate::controller::{PenSettings, PresentationController, Role};
use crate::coordinator::{Handled, SyncCoordinator};
use crate::deck::Deck;
use crate::protocol::PeerId;
use crate::state::{Session, SessionStore, Snapshot};
use crate::transport::{Transport, TransportEvent};
use crate::whiteboard::{self, DrawCommand, Stroke, Tool, WhiteboardState};

pub struct Peer {
    store: SessionStore,
    coordinator: SyncCoordinator,
    controller: PresentationController,
    transport: Rc<dyn Transport>,
    /// Set whenever the store changes; cleared by [`Peer::take_changed`].
    changed: bool,
}

impl Peer {
    /// Create a peer with a fresh identity. Call [`Peer::start`] to join.
    pub fn new(config: &PeerConfig, deck: Deck, transport: Rc<dyn Transport>) -> Self {
        Self::with_id(PeerId::new(), config, deck, transport)
    }

    pub fn with_id(peer_id: PeerId, config: &PeerConfig, deck: Deck, transport: Rc<dyn Transport>) -> Self {
        Self {
            store: SessionStore::new(deck.len()),
            coordinator: SyncCoordinator::new(Rc::clone(&transport), peer_id, config.join_window()),
            controller: PresentationController::new(Rc::clone(&transport), config.role, deck),
            transport,
            changed: false,
        }
    }

    /// Ask the room for a snapshot.
    pub fn start(&mut self) {
        self.coordinator.start();
    }

    /// Seed code text from a locally cached snapshot. Only code is taken;
    /// the rest of the cached state is not trusted.
    pub fn seed_cached(&mut self, cached: Snapshot) {
        self.store.seed_code(cached.code_state);
    }

    /// Process everything the transport received and advance the join window.
    pub fn pump(&mut self) -> Vec<Handled> {
        self.pump_at(Instant::now())
    }

    pub fn pump_at(&mut self, now: Instant) -> Vec<Handled> {
        let mut outcomes = Vec::new();
        for event in self.transport.poll() {
            match event {
                TransportEvent::Event(event) => {
                    let name = event.name();
                    let outcome = self.coordinator.handle(&mut self.store, event);
                    log::debug!("{} -> {:?}", name, outcome);
                    self.changed |= matches!(outcome, Handled::Applied | Handled::Restored);
                    outcomes.push(outcome);
                }
                TransportEvent::Echo(event) => outcomes.push(self.coordinator.handle_echo(&event)),
                TransportEvent::Joined { room, peer_count } => {
                    log::info!("Joined room {} with {} peer(s)", room, peer_count);
                    if peer_count <= 1 {
                        self.coordinator.settle();
                    }
                }
                TransportEvent::PeerJoined { peer_id } => log::debug!("Peer joined: {}", peer_id),
                TransportEvent::PeerLeft { peer_id } => log::debug!("Peer left: {}", peer_id),
                TransportEvent::Connected => log::info!("Transport connected"),
                TransportEvent::Disconnected => log::info!("Transport disconnected"),
                TransportEvent::Error { message } => log::warn!("Transport error: {}", message),
            }
        }
        self.coordinator.tick(now);
        outcomes
    }

    // --- Read-only view ---

    pub fn peer_id(&self) -> &PeerId {
        self.coordinator.peer_id()
    }

    pub fn role(&self) -> Role {
        self.controller.role()
    }

    /// True until the first snapshot arrives or the join settles.
    pub fn is_loading(&self) -> bool {
        self.coordinator.is_joining()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Copy of the current state, for local caching.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Check if the state changed since the last call, and reset the flag.
    /// Hosts feed this into [`AutoSnapshot::track`].
    ///
    /// [`AutoSnapshot::track`]: crate::storage::AutoSnapshot::track
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub fn session(&self) -> Session {
        self.store.session()
    }

    pub fn deck(&self) -> &Deck {
        self.controller.deck()
    }

    /// Code shown for a slide: the latest edit, else the slide's initial code.
    pub fn code_for(&self, slide: usize) -> Option<&str> {
        self.store
            .code(slide)
            .or_else(|| self.deck().get(slide).and_then(|s| s.initial_code()))
    }

    pub fn whiteboard(&self) -> &WhiteboardState {
        self.store.whiteboard()
    }

    /// Drawing commands for the whiteboard on a canvas of the given size.
    pub fn render_whiteboard(&self, canvas: Size) -> Vec<DrawCommand> {
        whiteboard::render(self.store.whiteboard(), canvas)
    }

    pub fn pen(&self) -> &PenSettings {
        self.controller.pen()
    }

    // --- Local input ---

    pub fn go_next(&mut self) -> bool {
        let changed = self.controller.go_next(&mut self.store);
        self.note_local(changed)
    }

    pub fn go_prev(&mut self) -> bool {
        let changed = self.controller.go_prev(&mut self.store);
        self.note_local(changed)
    }

    pub fn go_to(&mut self, slide: usize) -> bool {
        let changed = self.controller.go_to(&mut self.store, slide);
        self.note_local(changed)
    }

    pub fn edit_code(&mut self, text: &str) -> bool {
        let changed = self.controller.edit_code(&mut self.store, text);
        // A student's own edit is kept locally but does not settle the join.
        self.changed |= changed;
        self.note_local(changed && self.controller.is_presenter());
        changed
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.controller.set_tool(tool);
    }

    pub fn set_color(&mut self, color: &str) {
        self.controller.set_color(color);
    }

    pub fn set_line_width(&mut self, width: f64) {
        self.controller.set_line_width(width);
    }

    pub fn set_canvas_size(&mut self, size: Size) {
        self.controller.set_canvas_size(size);
    }

    pub fn pointer_down(&mut self, point: Point) {
        self.controller.pointer_down(point);
    }

    pub fn pointer_move(&mut self, point: Point) -> Option<Stroke> {
        let stroke = self.controller.pointer_move(&mut self.store, point);
        self.note_local(stroke.is_some());
        stroke
    }

    pub fn pointer_up(&mut self) {
        self.controller.pointer_up();
    }

    pub fn clear_canvas(&mut self) -> bool {
        let changed = self.controller.clear_canvas(&mut self.store);
        self.note_local(changed)
    }

    pub fn set_background(&mut self, color: &str) -> bool {
        let changed = self.controller.set_background(&mut self.store, color);
        self.note_local(changed)
    }

    /// A presenter that produced state of its own no longer accepts a join
    /// snapshot.
    fn note_local(&mut self, changed: bool) -> bool {
        if changed {
            self.changed = true;
            self.coordinator.settle();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::IgnoreReason;
    use crate::deck::Slide;
    use crate::protocol::SyncEvent;
    use crate::transport::{ConnectionState, LocalHub, TransportResult};
    use std::cell::RefCell;

    fn deck() -> Deck {
        Deck::new(vec![
            Slide::content("intro", "Dominoes", 2),
            Slide::code("class", "The Domino Class", "class Domino {};"),
            Slide::whiteboard("board"),
        ])
        .unwrap()
    }

    fn peer(hub: &LocalHub, id: &str, config: &PeerConfig) -> Peer {
        Peer::with_id(PeerId::from(id), config, deck(), Rc::new(hub.channel()))
    }

    fn presenter(hub: &LocalHub) -> Peer {
        let mut p = peer(hub, "presenter", &PeerConfig::presenter());
        p.start();
        p.pump();
        p
    }

    fn draw_line(p: &mut Peer, samples: usize) {
        p.set_canvas_size(Size::new(100.0, 100.0));
        p.pointer_down(Point::new(0.0, 0.0));
        for n in 1..=samples {
            p.pointer_move(Point::new(n as f64 * 10.0, n as f64 * 5.0));
        }
        p.pointer_up();
    }

    #[test]
    fn test_solo_presenter_keeps_defaults() {
        let hub = LocalHub::new();
        let mut p = peer(&hub, "presenter", &PeerConfig::presenter());
        p.start();
        let outcomes = p.pump();

        // Only its own request came back.
        assert_eq!(outcomes, vec![Handled::Ignored(IgnoreReason::SelfEcho)]);
        assert!(p.is_loading());
        assert_eq!(p.session(), Session::default());

        assert!(p.go_next());
        assert!(!p.is_loading());
    }

    #[test]
    fn test_late_joiner_catches_up_then_follows() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);
        lecturer.go_to(2);
        draw_line(&mut lecturer, 5);
        assert_eq!(lecturer.whiteboard().strokes.len(), 5);

        let mut student = peer(&hub, "student", &PeerConfig::student());
        student.start();
        lecturer.pump();
        student.pump();

        assert!(!student.is_loading());
        assert_eq!(student.session().current_slide, 2);
        assert_eq!(student.whiteboard().strokes, lecturer.whiteboard().strokes);

        // One more live stroke after the snapshot.
        lecturer.pointer_down(Point::new(50.0, 25.0));
        lecturer.pointer_move(Point::new(60.0, 30.0));
        student.pump();

        assert_eq!(student.whiteboard().strokes.len(), 6);
        assert_eq!(student.whiteboard().strokes, lecturer.whiteboard().strokes);
    }

    #[test]
    fn test_live_events_during_join_are_not_lost() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);
        lecturer.go_to(1);
        lecturer.edit_code("int x = 1;");

        let mut student = peer(&hub, "student", &PeerConfig::student());
        student.start();
        // The lecturer edits again before it has seen the request.
        lecturer.edit_code("int x = 2;");
        lecturer.pump();
        student.pump();

        assert_eq!(student.code_for(1), Some("int x = 2;"));
        assert_eq!(student.code_for(1), lecturer.code_for(1));
    }

    #[test]
    fn test_two_answers_first_wins() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);
        lecturer.go_to(2);

        // A second, already-synced viewer whose state lags behind.
        let mut viewer = peer(&hub, "viewer", &PeerConfig::student());
        viewer.start();
        lecturer.pump();
        viewer.pump();
        assert!(!viewer.is_loading());
        viewer.store.apply_navigation(1, 0);

        let mut student = peer(&hub, "student", &PeerConfig::student());
        student.start();
        lecturer.pump();
        viewer.pump();
        let outcomes = student.pump();

        assert_eq!(
            outcomes,
            vec![
                Handled::Ignored(IgnoreReason::SelfEcho),
                Handled::Restored,
                Handled::Ignored(IgnoreReason::DuplicateSync),
            ]
        );
        assert_eq!(student.session(), lecturer.session());
    }

    #[test]
    fn test_stroke_after_clear_survives_own_echo() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);
        let mut student = peer(&hub, "student", &PeerConfig::student());
        student.start();
        lecturer.pump();
        student.pump();

        lecturer.go_to(2);
        draw_line(&mut lecturer, 2);
        lecturer.clear_canvas();
        lecturer.set_canvas_size(Size::new(100.0, 100.0));
        lecturer.pointer_down(Point::new(0.0, 0.0));
        lecturer.pointer_move(Point::new(50.0, 50.0));
        lecturer.pointer_up();
        lecturer.pump();
        student.pump();

        assert_eq!(lecturer.whiteboard().strokes.len(), 1);
        assert_eq!(lecturer.whiteboard().strokes, student.whiteboard().strokes);
    }

    #[test]
    fn test_own_navigation_echoes_ignored() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);

        lecturer.go_next();
        lecturer.go_next();
        let outcomes = lecturer.pump();

        assert_eq!(outcomes, vec![Handled::Ignored(IgnoreReason::SelfEcho); 2]);
        assert_eq!(lecturer.session(), Session { current_slide: 0, current_step: 2 });
    }

    #[test]
    fn test_changes_are_reported_once() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);
        let mut student = peer(&hub, "student", &PeerConfig::student());
        student.start();
        lecturer.pump();
        student.pump();
        lecturer.take_changed();
        student.take_changed();

        lecturer.go_next();
        assert!(lecturer.take_changed());
        assert!(!lecturer.take_changed());

        student.pump();
        assert!(student.take_changed());
        assert_eq!(student.snapshot().step_index, 1);

        // Own echoes change nothing.
        lecturer.pump();
        assert!(!lecturer.take_changed());
    }

    #[test]
    fn test_students_mirror_navigation_and_clear() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);
        let mut student = peer(&hub, "student", &PeerConfig::student());
        student.start();
        lecturer.pump();
        student.pump();

        lecturer.go_next();
        lecturer.go_next();
        lecturer.go_next();
        lecturer.set_background("#fafafa");
        draw_line(&mut lecturer, 3);
        lecturer.clear_canvas();
        student.pump();

        assert_eq!(student.session(), Session { current_slide: 1, current_step: 0 });
        assert!(student.whiteboard().strokes.is_empty());
        assert_eq!(student.whiteboard().background_color, "#fafafa");

        // The student's own input changes nothing anywhere.
        assert!(!student.go_next());
        lecturer.pump();
        assert_eq!(lecturer.session(), student.session());
    }

    /// Transport that replays a fixed script of inbound events.
    #[derive(Default)]
    struct Scripted {
        inbound: RefCell<Vec<TransportEvent>>,
    }

    impl Transport for Scripted {
        fn send(&self, _event: &SyncEvent) -> TransportResult<()> {
            Ok(())
        }

        fn broadcast_to_all(&self, _event: &SyncEvent) -> TransportResult<()> {
            Ok(())
        }

        fn poll(&self) -> Vec<TransportEvent> {
            std::mem::take(&mut *self.inbound.borrow_mut())
        }

        fn state(&self) -> ConnectionState {
            ConnectionState::Connected
        }
    }

    #[test]
    fn test_alone_in_room_settles() {
        let transport = Rc::new(Scripted::default());
        let config = PeerConfig { join_window_ms: None, ..PeerConfig::student() };
        let mut p = Peer::new(&config, deck(), transport.clone());
        p.start();
        assert!(p.is_loading());

        transport.inbound.borrow_mut().push(TransportEvent::Joined {
            room: "default".to_string(),
            peer_count: 1,
        });
        p.pump();

        assert!(!p.is_loading());
    }

    #[test]
    fn test_not_alone_keeps_waiting() {
        let transport = Rc::new(Scripted::default());
        let config = PeerConfig { join_window_ms: None, ..PeerConfig::student() };
        let mut p = Peer::new(&config, deck(), transport.clone());
        p.start();

        transport.inbound.borrow_mut().extend([
            TransportEvent::Connected,
            TransportEvent::Joined { room: "default".to_string(), peer_count: 3 },
        ]);
        p.pump();

        assert!(p.is_loading());
    }

    #[test]
    fn test_join_window_elapses() {
        let hub = LocalHub::new();
        let config = PeerConfig {
            join_window_ms: Some(10),
            ..PeerConfig::student()
        };
        let mut p = peer(&hub, "solo", &config);
        p.start();

        p.pump_at(Instant::now() + std::time::Duration::from_secs(1));

        assert!(!p.is_loading());
    }

    #[test]
    fn test_code_for_falls_back_to_initial_code() {
        let hub = LocalHub::new();
        let p = presenter(&hub);

        assert_eq!(p.code_for(1), Some("class Domino {};"));
        assert_eq!(p.code_for(0), None);
    }

    #[test]
    fn test_cached_code_is_overridden_by_snapshot() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);
        lecturer.go_to(1);
        lecturer.edit_code("live");

        let mut student = peer(&hub, "student", &PeerConfig::student());
        let mut cached = Snapshot::default();
        cached.code_state.insert(1, "cached".to_string());
        student.seed_cached(cached);
        assert_eq!(student.code_for(1), Some("cached"));

        student.start();
        lecturer.pump();
        student.pump();

        assert_eq!(student.code_for(1), Some("live"));
    }

    #[test]
    fn test_render_whiteboard_uses_local_canvas() {
        let hub = LocalHub::new();
        let mut lecturer = presenter(&hub);
        draw_line(&mut lecturer, 1);

        let commands = lecturer.render_whiteboard(Size::new(1000.0, 1000.0));

        assert_eq!(commands.len(), 2);
        match &commands[1] {
            DrawCommand::Segment { line, .. } => assert_eq!(line.p1, Point::new(100.0, 50.0)),
            other => panic!("Expected segment, got {:?}", other),
        }
    }
}
