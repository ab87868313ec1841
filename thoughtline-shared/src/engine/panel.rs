//! Panel lifecycle and the single-open invariant.
//!
//! The controller owns every [`PanelState`] transition and drives the
//! embedder and reconciler through [`Parts`]. At most one thread is
//! *current*: the one in Loading or Open, or the one showing its terminal
//! Error. Opening another thread closes the current one first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tracing::{debug, error, info, warn};

use super::Parts;
use super::embedder::EmbedStep;
use super::errors::CommentError;
use super::host::{FetchReason, Host, NoticeLevel, Task};
use super::signals::SignalKind;
use crate::models::{EmbedFailure, PanelState, ThreadId};

/// What [`PanelController::open`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OpenOutcome {
    /// The panel started loading.
    Opened,
    /// The thread was current, so it was closed instead.
    Toggled,
    /// The thread has no container on the page.
    Ignored,
}

#[derive(Debug)]
struct PanelEntry<G> {
    state: PanelState,
    scrolled: bool,
    scroll_timer: Option<G>,
}

impl<G> Default for PanelEntry<G> {
    fn default() -> Self {
        Self {
            state: PanelState::Closed,
            scrolled: false,
            scroll_timer: None,
        }
    }
}

/// Panel state of every known thread and the current one.
#[derive(Debug)]
pub struct PanelController<G> {
    entries: HashMap<ThreadId, PanelEntry<G>>,
    current: Option<ThreadId>,
}

impl<G> Default for PanelController<G> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            current: None,
        }
    }
}

impl<G> PanelController<G> {
    /// A controller with no known threads.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a thread known. Returns `false` if it already was.
    pub fn register(&mut self, thread: &ThreadId) -> bool {
        if self.entries.contains_key(thread) {
            return false;
        }
        self.entries.insert(thread.clone(), PanelEntry::default());
        true
    }

    /// Panel state of a thread; unknown threads are Closed.
    #[must_use]
    pub fn state(&self, thread: &ThreadId) -> PanelState {
        self.entries
            .get(thread)
            .map_or(PanelState::Closed, |entry| entry.state)
    }

    /// Thread whose panel is showing, if any.
    #[must_use]
    pub fn current(&self) -> Option<&ThreadId> {
        self.current.as_ref()
    }

    /// Threads in Loading or Open. Never more than one.
    pub fn active(&self) -> impl Iterator<Item = &ThreadId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state.is_active())
            .map(|(thread, _)| thread)
    }

    /// Opens a thread's panel, or closes it if it is already current.
    pub fn open<H: Host<Guard = G>>(&mut self, cx: &mut Parts<'_, H>, thread: &ThreadId) -> OpenOutcome {
        if !cx.host.has_container(thread) {
            let error = CommentError::ContainerMissing {
                thread: thread.clone(),
            };
            warn!(%error, "cannot open comments");
            return OpenOutcome::Ignored;
        }
        if self.current.as_ref() == Some(thread) {
            debug!(thread = %thread, "toggling current panel closed");
            self.close(cx, thread);
            return OpenOutcome::Toggled;
        }
        if let Some(previous) = self.current.clone() {
            self.close(cx, &previous);
        }

        info!(thread = %thread, "opening comments");
        let entry = self.entries.entry(thread.clone()).or_default();
        entry.state = PanelState::Loading;
        entry.scrolled = false;
        entry.scroll_timer = Some(cx.host.set_timeout(
            cx.config.engine.scroll_grace(),
            Task::ScrollIntoView {
                thread: thread.clone(),
            },
        ));
        self.current = Some(thread.clone());
        cx.host.set_container_visible(thread, true);
        cx.host.set_trigger_active(thread, true);

        let step = cx.embedder.mount(cx.host, cx.bus, cx.config, thread);
        self.on_embed_step(cx, thread, step);
        OpenOutcome::Opened
    }

    /// Closes a thread's panel and releases everything it holds.
    ///
    /// Returns whether the panel was showing. Closing twice is harmless.
    pub fn close<H: Host<Guard = G>>(&mut self, cx: &mut Parts<'_, H>, thread: &ThreadId) -> bool {
        let Some(entry) = self.entries.get_mut(thread) else {
            return false;
        };
        let was_showing = entry.state != PanelState::Closed;
        entry.state = PanelState::Closed;
        entry.scroll_timer = None;

        cx.embedder.unmount(cx.host, cx.bus, thread);
        cx.reconciler.cancel(thread);
        cx.bus.unsubscribe_all(thread);
        cx.host.set_container_visible(thread, false);
        cx.host.set_trigger_active(thread, false);
        if self.current.as_ref() == Some(thread) {
            self.current = None;
        }
        if was_showing {
            info!(thread = %thread, "comments closed");
        }
        was_showing
    }

    /// Manual retry from the terminal Error state.
    pub fn retry<H: Host<Guard = G>>(&mut self, cx: &mut Parts<'_, H>, thread: &ThreadId) -> bool {
        let Some(entry) = self.entries.get_mut(thread) else {
            return false;
        };
        if entry.state != PanelState::Error {
            debug!(thread = %thread, state = %entry.state, "retry ignored");
            return false;
        }
        entry.state = PanelState::Loading;
        info!(thread = %thread, "retrying comments");
        let step = cx.embedder.retry(cx.host, cx.bus, cx.config, thread);
        self.on_embed_step(cx, thread, step);
        true
    }

    /// Reacts to a transition reported by the embedder.
    pub fn on_embed_step<H: Host<Guard = G>>(
        &mut self,
        cx: &mut Parts<'_, H>,
        thread: &ThreadId,
        step: EmbedStep,
    ) {
        match step {
            EmbedStep::Ready => self.on_ready(cx, thread),
            EmbedStep::Failed(failure) => self.on_failed(cx, thread, failure),
            EmbedStep::Retrying { .. } | EmbedStep::Pending | EmbedStep::Stale => {}
        }
    }

    /// Scroll grace delay elapsed.
    pub fn on_scroll_grace<H: Host<Guard = G>>(&mut self, host: &mut H, thread: &ThreadId) {
        if self.state(thread) != PanelState::Closed {
            self.scroll_once(host, thread);
        }
    }

    /// Forgets every panel without touching the page.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
    }

    fn on_ready<H: Host<Guard = G>>(&mut self, cx: &mut Parts<'_, H>, thread: &ThreadId) {
        match self.entries.get_mut(thread) {
            Some(entry) if entry.state == PanelState::Loading => entry.state = PanelState::Open,
            _ => return,
        }
        info!(thread = %thread, "comments open");

        let interval = cx.host.set_interval(
            cx.config.engine.reconcile_interval(),
            Task::Reconcile {
                thread: thread.clone(),
            },
        );
        cx.bus.subscribe(thread, SignalKind::Interval, interval);
        cx.reconciler
            .request_remote(cx.host, cx.config, thread, FetchReason::Initial);
        cx.reconciler.scrape(cx.host, cx.store, thread);
        self.scroll_once(cx.host, thread);
    }

    fn on_failed<H: Host<Guard = G>>(
        &mut self,
        cx: &mut Parts<'_, H>,
        thread: &ThreadId,
        failure: EmbedFailure,
    ) {
        let Some(entry) = self.entries.get_mut(thread) else {
            return;
        };
        entry.state = PanelState::Error;
        cx.reconciler.cancel(thread);
        let failure = CommentError::from_failure(thread, failure, &cx.config.engine);
        error!(thread = %thread, error = %failure, "comments unavailable");
        cx.host.notify(NoticeLevel::Error, &failure.to_string());
    }

    fn scroll_once<H: Host<Guard = G>>(&mut self, host: &mut H, thread: &ThreadId) {
        let Some(entry) = self.entries.get_mut(thread) else {
            return;
        };
        entry.scroll_timer = None;
        if !entry.scrolled {
            entry.scrolled = true;
            host.scroll_into_view(thread);
        }
    }
}
