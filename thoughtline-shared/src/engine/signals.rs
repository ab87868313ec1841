//! Per-thread registry of observation channels.
//!
//! A subscription is whatever guard the host returned for the channel. The
//! bus owns it, so removing a subscription drops the guard and the host
//! detaches the listener or cancels the timer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tracing::{debug, trace};
use url::Url;

use crate::models::{ThreadId, WidgetMessage};

/// The three observation channels a thread can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// DOM watcher over the mounted region, including its submit, click and
    /// keyboard listeners.
    Mutation,
    /// Cross-frame message listener.
    Message,
    /// Periodic reconciliation timer.
    Interval,
}

#[derive(Debug)]
struct Subscription<G> {
    id: u64,
    _handler: G,
}

/// Owns every live subscription, at most one per `(thread, kind)`.
#[derive(Debug)]
pub struct SignalBus<G> {
    origin: String,
    subscriptions: HashMap<(ThreadId, SignalKind), Subscription<G>>,
    next_id: u64,
}

impl<G> SignalBus<G> {
    /// Creates a bus accepting widget messages from `origin` only.
    #[must_use]
    pub fn new(origin: &str) -> Self {
        Self {
            origin: normalize_origin(origin),
            subscriptions: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers `handler` for `(thread, kind)` and returns the subscription id.
    ///
    /// A previous handler for the same pair is dropped before the new one is
    /// stored.
    pub fn subscribe(&mut self, thread: &ThreadId, kind: SignalKind, handler: G) -> u64 {
        let key = (thread.clone(), kind);
        if let Some(previous) = self.subscriptions.remove(&key) {
            debug!(thread = %thread, kind = %kind, id = previous.id, "replacing subscription");
            drop(previous);
        }
        self.next_id += 1;
        let id = self.next_id;
        self.subscriptions.insert(
            key,
            Subscription {
                id,
                _handler: handler,
            },
        );
        trace!(thread = %thread, kind = %kind, id, "subscribed");
        id
    }

    /// Removes one subscription. Returns whether it was live.
    pub fn unsubscribe(&mut self, thread: &ThreadId, kind: SignalKind) -> bool {
        self.subscriptions
            .remove(&(thread.clone(), kind))
            .is_some()
    }

    /// Removes every subscription of a thread and returns how many there were.
    pub fn unsubscribe_all(&mut self, thread: &ThreadId) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|(owner, _), _| owner != thread);
        let removed = before - self.subscriptions.len();
        if removed > 0 {
            debug!(thread = %thread, removed, "unsubscribed thread");
        }
        removed
    }

    /// Removes every subscription of every thread.
    pub fn unsubscribe_everything(&mut self) -> usize {
        let removed = self.subscriptions.len();
        self.subscriptions.clear();
        removed
    }

    /// Whether `(thread, kind)` has a live subscription.
    #[must_use]
    pub fn is_live(&self, thread: &ThreadId, kind: SignalKind) -> bool {
        self.subscriptions.contains_key(&(thread.clone(), kind))
    }

    /// Number of live subscriptions of one thread.
    #[must_use]
    pub fn live_count(&self, thread: &ThreadId) -> usize {
        self.subscriptions
            .keys()
            .filter(|(owner, _)| owner == thread)
            .count()
    }

    /// Number of live subscriptions of every thread.
    #[must_use]
    pub fn total_live(&self) -> usize {
        self.subscriptions.len()
    }

    /// Filters and parses an inbound cross-frame message for `thread`.
    ///
    /// Drops messages from any other origin, messages for a thread without a
    /// live message listener, and payloads of unknown shape.
    #[must_use]
    pub fn accept_message(&self, thread: &ThreadId, origin: &str, raw: &str) -> Option<WidgetMessage> {
        if normalize_origin(origin) != self.origin {
            trace!(origin, "dropping message from foreign origin");
            return None;
        }
        if !self.is_live(thread, SignalKind::Message) {
            trace!(thread = %thread, "dropping message for thread without listener");
            return None;
        }
        WidgetMessage::parse(raw)
    }
}

fn normalize_origin(origin: &str) -> String {
    Url::parse(origin).map_or_else(
        |_| origin.trim_end_matches('/').to_string(),
        |url| url.origin().ascii_serialization(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Counts how many handlers are still alive.
    struct LiveHandle(Rc<Cell<usize>>);

    impl LiveHandle {
        fn new(live: &Rc<Cell<usize>>) -> Self {
            live.set(live.get() + 1);
            Self(Rc::clone(live))
        }
    }

    impl Drop for LiveHandle {
        fn drop(&mut self) {
            self.0.set(self.0.get() - 1);
        }
    }

    const DISCUSSION: &str = r#"{"giscus":{"discussion":{"totalCommentCount":2}}}"#;

    #[test]
    fn resubscribe_replaces_handler() {
        let live = Rc::new(Cell::new(0));
        let mut bus = SignalBus::new("https://giscus.app");
        let thread = ThreadId::new("t1");

        let first = bus.subscribe(&thread, SignalKind::Message, LiveHandle::new(&live));
        let second = bus.subscribe(&thread, SignalKind::Message, LiveHandle::new(&live));

        assert_ne!(first, second);
        assert_eq!(live.get(), 1);
        assert_eq!(bus.live_count(&thread), 1);
    }

    #[test]
    fn unsubscribe_all_only_touches_one_thread() {
        let live = Rc::new(Cell::new(0));
        let mut bus = SignalBus::new("https://giscus.app");
        let a = ThreadId::new("a");
        let b = ThreadId::new("b");
        for kind in [SignalKind::Mutation, SignalKind::Message, SignalKind::Interval] {
            bus.subscribe(&a, kind, LiveHandle::new(&live));
        }
        bus.subscribe(&b, SignalKind::Message, LiveHandle::new(&live));

        assert_eq!(bus.unsubscribe_all(&a), 3);
        assert_eq!(bus.live_count(&a), 0);
        assert_eq!(live.get(), 1);
        assert_eq!(bus.unsubscribe_all(&a), 0);

        assert_eq!(bus.unsubscribe_everything(), 1);
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn messages_require_origin_and_listener() {
        let mut bus = SignalBus::new("https://giscus.app");
        let thread = ThreadId::new("t1");

        assert_eq!(bus.accept_message(&thread, "https://giscus.app", DISCUSSION), None);

        bus.subscribe(&thread, SignalKind::Message, ());
        assert_eq!(
            bus.accept_message(&thread, "https://giscus.app/", DISCUSSION),
            Some(WidgetMessage::Discussion {
                total_comment_count: 2
            })
        );
        assert_eq!(bus.accept_message(&thread, "https://evil.example", DISCUSSION), None);
        assert_eq!(bus.accept_message(&thread, "https://giscus.app", "{}"), None);
    }
}
