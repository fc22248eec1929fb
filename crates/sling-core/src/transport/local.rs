//! In-process transport, the same-device counterpart of a browser
//! broadcast channel.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use super::{ConnectionState, Transport, TransportError, TransportEvent, TransportResult};
use crate::protocol::SyncEvent;

/// Encoded event plus the id of the channel that published it.
struct Envelope {
    from: Option<usize>,
    text: String,
}

type Inbox = Rc<RefCell<VecDeque<Envelope>>>;

#[derive(Default)]
struct HubInner {
    next_id: usize,
    inboxes: Vec<(usize, Weak<RefCell<VecDeque<Envelope>>>)>,
}

impl HubInner {
    /// Push `text` to every live inbox. The sender's own inbox is skipped
    /// unless `include_sender` is set.
    fn deliver(&mut self, text: &str, from: Option<usize>, include_sender: bool) {
        // Prune channels that have been dropped.
        self.inboxes.retain(|(_, inbox)| inbox.strong_count() > 0);
        for (id, inbox) in &self.inboxes {
            if !include_sender && Some(*id) == from {
                continue;
            }
            if let Some(inbox) = inbox.upgrade() {
                inbox.borrow_mut().push_back(Envelope {
                    from,
                    text: text.to_string(),
                });
            }
        }
    }

    fn unregister(&mut self, id: usize) {
        self.inboxes.retain(|(other, _)| *other != id);
    }
}

/// Connects any number of [`LocalChannel`]s.
///
/// Events are carried as encoded JSON, so receivers go through the same
/// decode-and-validate path as with a network transport.
#[derive(Clone, Default)]
pub struct LocalHub {
    inner: Rc<RefCell<HubInner>>,
}

impl LocalHub {
    /// Create a hub with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new channel on this hub.
    pub fn channel(&self) -> LocalChannel {
        let inbox: Inbox = Rc::new(RefCell::new(VecDeque::new()));
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.inboxes.push((id, Rc::downgrade(&inbox)));
        LocalChannel {
            id,
            hub: Rc::clone(&self.inner),
            inbox,
            open: Cell::new(true),
        }
    }

    /// Number of channels still open.
    pub fn channel_count(&self) -> usize {
        self.inner
            .borrow()
            .inboxes
            .iter()
            .filter(|(_, inbox)| inbox.strong_count() > 0)
            .count()
    }

    /// Deliver raw text to every channel, bypassing encoding.
    pub fn inject_raw(&self, text: &str) {
        self.inner.borrow_mut().deliver(text, None, true);
    }
}

/// One peer's end of a [`LocalHub`].
pub struct LocalChannel {
    id: usize,
    hub: Rc<RefCell<HubInner>>,
    inbox: Inbox,
    open: Cell<bool>,
}

impl LocalChannel {
    /// Stop sending and receiving. Pending inbound events are discarded and
    /// the channel leaves the hub.
    pub fn close(&self) {
        self.open.set(false);
        self.hub.borrow_mut().unregister(self.id);
        self.inbox.borrow_mut().clear();
    }

    fn publish(&self, event: &SyncEvent, include_self: bool) -> TransportResult<()> {
        if !self.open.get() {
            return Err(TransportError::NotConnected);
        }
        let text = event.encode()?;
        self.hub.borrow_mut().deliver(&text, Some(self.id), include_self);
        Ok(())
    }
}

impl Transport for LocalChannel {
    fn send(&self, event: &SyncEvent) -> TransportResult<()> {
        self.publish(event, false)
    }

    fn broadcast_to_all(&self, event: &SyncEvent) -> TransportResult<()> {
        self.publish(event, true)
    }

    fn poll(&self) -> Vec<TransportEvent> {
        if !self.open.get() {
            return Vec::new();
        }
        let pending: Vec<Envelope> = self.inbox.borrow_mut().drain(..).collect();
        pending
            .into_iter()
            .filter_map(|envelope| match SyncEvent::decode(&envelope.text) {
                Ok(event) if envelope.from == Some(self.id) => Some(TransportEvent::Echo(event)),
                Ok(event) => Some(TransportEvent::Event(event)),
                Err(e) => {
                    log::debug!("Dropping event on local channel {}: {}", self.id, e);
                    None
                }
            })
            .collect()
    }

    fn state(&self) -> ConnectionState {
        if self.open.get() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Clear;

    fn events(channel: &LocalChannel) -> Vec<SyncEvent> {
        channel
            .poll()
            .into_iter()
            .filter_map(|e| match e {
                TransportEvent::Event(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_send_skips_sender() {
        let hub = LocalHub::new();
        let a = hub.channel();
        let b = hub.channel();
        let c = hub.channel();

        a.send(&SyncEvent::code_change(1, "x")).unwrap();

        assert!(events(&a).is_empty());
        assert_eq!(events(&b), vec![SyncEvent::code_change(1, "x")]);
        assert_eq!(events(&c), vec![SyncEvent::code_change(1, "x")]);
    }

    #[test]
    fn test_broadcast_to_all_includes_sender() {
        let hub = LocalHub::new();
        let a = hub.channel();
        let b = hub.channel();

        a.broadcast_to_all(&SyncEvent::ClearCanvas(Clear {})).unwrap();

        assert_eq!(a.poll(), vec![TransportEvent::Echo(SyncEvent::ClearCanvas(Clear {}))]);
        assert_eq!(b.poll(), vec![TransportEvent::Event(SyncEvent::ClearCanvas(Clear {}))]);
    }

    #[test]
    fn test_fifo_per_sender() {
        let hub = LocalHub::new();
        let a = hub.channel();
        let b = hub.channel();

        for n in 0..5 {
            a.send(&SyncEvent::code_change(n, n.to_string())).unwrap();
        }

        let received = events(&b);
        let expected: Vec<_> = (0..5).map(|n| SyncEvent::code_change(n, n.to_string())).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_malformed_dropped() {
        let hub = LocalHub::new();
        let a = hub.channel();

        hub.inject_raw(r#"{"type":"codeChange","payload":{}}"#);
        hub.inject_raw(r#"{"type":"slideChange","payload":{"slideIndex":1,"stepIndex":0}}"#);

        assert_eq!(events(&a), vec![SyncEvent::slide_change(1, 0)]);
    }

    #[test]
    fn test_dropped_channel_is_pruned() {
        let hub = LocalHub::new();
        let a = hub.channel();
        {
            let _b = hub.channel();
            assert_eq!(hub.channel_count(), 2);
        }
        a.send(&SyncEvent::slide_change(0, 0)).unwrap();
        assert_eq!(hub.channel_count(), 1);
    }

    #[test]
    fn test_closed_channel_rejects_send() {
        let hub = LocalHub::new();
        let a = hub.channel();
        a.close();

        assert!(matches!(
            a.send(&SyncEvent::slide_change(0, 0)),
            Err(TransportError::NotConnected)
        ));
        assert_eq!(a.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_closed_channel_stops_receiving() {
        let hub = LocalHub::new();
        let a = hub.channel();
        let b = hub.channel();
        a.close();

        for n in 0..3 {
            b.send(&SyncEvent::slide_change(n, 0)).unwrap();
        }
        hub.inject_raw(r#"{"type":"clearCanvas"}"#);

        assert!(a.inbox.borrow().is_empty());
        assert_eq!(hub.channel_count(), 1);
        assert!(a.poll().is_empty());
    }
}
