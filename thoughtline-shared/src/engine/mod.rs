//! # Comment engine
//!
//! [`CommentSubsystem`] bundles the five collaborators of the comment panels:
//!
//! - [`store::PersistenceStore`]: last known counts, per thread.
//! - [`signals::SignalBus`]: live observation channels, per thread.
//! - [`embedder::WidgetEmbedder`]: mount, timeout, retry and readiness of the
//!   widget.
//! - [`reconciler::CountReconciler`]: the displayed count.
//! - [`panel::PanelController`]: open/close and the single-open invariant.
//!
//! The engine is driven entirely by its host: page triggers call
//! [`CommentSubsystem::open`] and friends, and timers, widget events, frame
//! messages, DOM signals and remote answers come back through the `on_*`
//! methods. Nothing in here blocks or awaits.

pub mod embedder;
pub mod errors;
pub mod host;
pub mod observe;
pub mod panel;
pub mod reconciler;
pub mod remote;
pub mod signals;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;


pub use embedder::{EmbedStep, WidgetEmbedder};
pub use errors::{CommentError, RemoteFetchError, StorageError};
pub use host::{
    EmbedEvent, FetchReason, FetchTicket, Host, MountRequest, NoticeLevel, Placeholder, Task,
};
pub use panel::{OpenOutcome, PanelController};
pub use reconciler::{CountReconciler, Merge, RemoteOutcome, Submission};
pub use remote::DiscussionSource;
pub use signals::{SignalBus, SignalKind};
pub use store::{MemoryStorage, PersistenceStore, StorageBackend};

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::models::{
    Candidate, DomSignal, PanelState, RemoteCount, ThreadId, ThreadSnapshot, WidgetMessage,
    WidgetPhase,
};

/// Mutable borrows of everything but the panel controller, handed to it so
/// it can orchestrate the other components.
pub struct Parts<'a, H: Host> {
    /// The page.
    pub host: &'a mut H,
    /// Active configuration.
    pub config: &'a Config,
    /// Count cache.
    pub store: &'a mut PersistenceStore,
    /// Observation channels.
    pub bus: &'a mut SignalBus<H::Guard>,
    /// Widget supervision.
    pub embedder: &'a mut WidgetEmbedder<H::Guard>,
    /// Displayed counts.
    pub reconciler: &'a mut CountReconciler<H::Guard>,
}

impl<H: Host> std::fmt::Debug for Parts<'_, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parts")
            .field("store", &self.store)
            .field("live_subscriptions", &self.bus.total_live())
            .finish_non_exhaustive()
    }
}

/// The comment panels of one page.
pub struct CommentSubsystem<H: Host> {
    config: Config,
    host: H,
    store: PersistenceStore,
    bus: SignalBus<H::Guard>,
    embedder: WidgetEmbedder<H::Guard>,
    reconciler: CountReconciler<H::Guard>,
    panels: PanelController<H::Guard>,
    torn_down: bool,
}

impl<H: Host> std::fmt::Debug for CommentSubsystem<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentSubsystem")
            .field("current", &self.panels.current())
            .field("live_subscriptions", &self.bus.total_live())
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl<H: Host> CommentSubsystem<H> {
    /// An engine over `host`, caching counts in `storage`.
    #[must_use]
    pub fn new(config: Config, host: H, storage: Box<dyn StorageBackend>) -> Self {
        let bus = SignalBus::new(&config.embed.origin);
        Self {
            config,
            host,
            store: PersistenceStore::new(storage),
            bus,
            embedder: WidgetEmbedder::new(),
            reconciler: CountReconciler::new(),
            panels: PanelController::new(),
            torn_down: false,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The host the engine drives.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host.
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Registers the rendered threads and shows their cached counts.
    pub fn paint<I>(&mut self, threads: I) -> usize
    where
        I: IntoIterator<Item = ThreadId>,
    {
        let mut painted = 0;
        for thread in threads {
            self.panels.register(&thread);
            self.reconciler
                .seed_from_cache(&mut self.host, &mut self.store, &thread);
            painted += 1;
        }
        debug!(painted, "painted comment counts");
        painted
    }

    /// Opens a thread's panel; opening the current thread closes it.
    pub fn open(&mut self, thread: &ThreadId) -> OpenOutcome {
        if self.torn_down {
            return OpenOutcome::Ignored;
        }
        let (panels, mut cx) = self.split();
        panels.open(&mut cx, thread)
    }

    /// Closes a thread's panel. Returns whether it was showing.
    pub fn close(&mut self, thread: &ThreadId) -> bool {
        if self.torn_down {
            return false;
        }
        let (panels, mut cx) = self.split();
        panels.close(&mut cx, thread)
    }

    /// Closes whichever panel is current.
    pub fn close_current(&mut self) -> bool {
        match self.panels.current().cloned() {
            Some(thread) => self.close(&thread),
            None => false,
        }
    }

    /// Re-mounts a panel stuck in Error.
    pub fn retry(&mut self, thread: &ThreadId) -> bool {
        if self.torn_down {
            return false;
        }
        let (panels, mut cx) = self.split();
        panels.retry(&mut cx, thread)
    }

    /// Count shown on a thread's card.
    #[must_use]
    pub fn displayed_count(&self, thread: &ThreadId) -> u64 {
        self.reconciler.displayed(thread)
    }

    /// Panel state of a thread.
    #[must_use]
    pub fn panel_state(&self, thread: &ThreadId) -> PanelState {
        self.panels.state(thread)
    }

    /// Thread whose panel is showing, if any.
    #[must_use]
    pub fn current_thread(&self) -> Option<&ThreadId> {
        self.panels.current()
    }

    /// Number of live observation channels of a thread.
    #[must_use]
    pub fn live_subscriptions(&self, thread: &ThreadId) -> usize {
        self.bus.live_count(thread)
    }

    /// Read-only view of one thread.
    #[must_use]
    pub fn thread(&self, thread: &ThreadId) -> ThreadSnapshot {
        ThreadSnapshot {
            id: thread.clone(),
            panel: self.panels.state(thread),
            count: self.reconciler.record(thread).cloned(),
            widget: self.embedder.status(thread),
        }
    }

    /// Runs a task the host scheduled earlier.
    pub fn on_task(&mut self, task: Task) {
        if self.torn_down {
            return;
        }
        trace!(?task, "running task");
        match task {
            Task::EmbedTimeout { thread, attempt } => {
                let step = self.embedder.on_timeout(
                    &mut self.host,
                    &mut self.bus,
                    &self.config,
                    &thread,
                    attempt,
                );
                self.dispatch(&thread, step);
            }
            Task::ReadinessPoll { thread, attempt } => {
                let step = self.embedder.on_readiness_poll(
                    &mut self.host,
                    &mut self.bus,
                    &self.config,
                    &thread,
                    attempt,
                );
                self.dispatch(&thread, step);
            }
            Task::RetryMount { thread, attempt } => {
                let step = self.embedder.on_retry_due(
                    &mut self.host,
                    &mut self.bus,
                    &self.config,
                    &thread,
                    attempt,
                );
                self.dispatch(&thread, step);
            }
            Task::ScrollIntoView { thread } => {
                self.panels.on_scroll_grace(&mut self.host, &thread);
            }
            Task::Rescrape { thread, cycle } => {
                self.reconciler
                    .on_rescrape(&mut self.host, &mut self.store, &thread, cycle);
            }
            Task::RemoteConfirm { thread, cycle } => {
                self.reconciler
                    .on_confirm_due(&mut self.host, &self.config, &thread, cycle);
            }
            Task::Reconcile { thread } => {
                if self.panels.state(&thread) == PanelState::Open {
                    self.reconciler
                        .scrape(&mut self.host, &mut self.store, &thread);
                }
            }
            Task::RemoteRetry { thread, attempt } => {
                if self.panels.state(&thread) == PanelState::Open {
                    self.reconciler.on_remote_retry_due(
                        &mut self.host,
                        &self.config,
                        &thread,
                        attempt,
                    );
                }
            }
        }
    }

    /// Load or error event of the widget script injected for `attempt`.
    pub fn on_widget_event(&mut self, thread: &ThreadId, attempt: u32, event: EmbedEvent) {
        if self.torn_down {
            return;
        }
        let step = self.embedder.on_event(
            &mut self.host,
            &mut self.bus,
            &self.config,
            thread,
            attempt,
            event,
        );
        self.dispatch(thread, step);
    }

    /// Cross-frame message received by a thread's message listener.
    pub fn on_frame_message(&mut self, thread: &ThreadId, origin: &str, raw: &str) {
        if self.torn_down {
            return;
        }
        let Some(message) = self.bus.accept_message(thread, origin, raw) else {
            return;
        };
        if let WidgetMessage::WidgetError { message } = &message {
            warn!(thread = %thread, error = %message, "widget reported an error");
            return;
        }
        if let Some(trigger) = message.submission() {
            self.reconciler.submit(
                &mut self.host,
                &mut self.store,
                &self.config,
                thread,
                trigger,
            );
        }
        if let Some(count) = message.observed_count() {
            self.reconciler.apply(
                &mut self.host,
                &mut self.store,
                thread,
                Candidate::observed(count),
            );
        }
    }

    /// Signal from a thread's DOM watcher.
    pub fn on_dom_signal(&mut self, thread: &ThreadId, signal: DomSignal) {
        if self.torn_down || !self.bus.is_live(thread, SignalKind::Mutation) {
            trace!(thread = %thread, ?signal, "dropping signal without live watcher");
            return;
        }
        match signal {
            DomSignal::Mutated => {
                let step = self.embedder.on_mutation(&mut self.host, thread);
                self.dispatch(thread, step);
            }
            DomSignal::Submission(trigger) => {
                self.reconciler.submit(
                    &mut self.host,
                    &mut self.store,
                    &self.config,
                    thread,
                    trigger,
                );
            }
        }
    }

    /// The page's color theme changed.
    ///
    /// The widget of the current panel is told the new theme; widgets mounted
    /// later read it at mount. Returns whether a widget was told.
    pub fn on_theme_change(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        let Some(thread) = self.panels.current().cloned() else {
            return false;
        };
        let mounted = self
            .embedder
            .status(&thread)
            .is_some_and(|status| !matches!(status.phase, WidgetPhase::Failed { .. }));
        if !mounted {
            return false;
        }
        let theme = self.host.theme();
        let told = self.host.set_widget_theme(&thread, &theme);
        debug!(thread = %thread, theme = %theme, told, "theme change forwarded");
        told
    }

    /// Answer to a [`FetchTicket`].
    pub fn on_remote_result(&mut self, ticket: u64, result: Result<RemoteCount, RemoteFetchError>) -> RemoteOutcome {
        if self.torn_down {
            return RemoteOutcome::Unknown;
        }
        let open = self
            .reconciler
            .pending_thread(ticket)
            .is_some_and(|thread| self.panels.state(thread) == PanelState::Open);
        self.reconciler.on_remote_result(
            &mut self.host,
            &mut self.store,
            &self.config,
            ticket,
            result,
            open,
        )
    }

    /// Closes the current panel and drops every timer and listener.
    /// Every later call is a no-op.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.close_current();
        let released = self.bus.unsubscribe_everything();
        self.embedder.clear();
        self.reconciler.clear();
        self.panels.clear();
        self.torn_down = true;
        info!(released, "comment subsystem torn down");
    }

    /// Whether [`CommentSubsystem::teardown`] ran.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn dispatch(&mut self, thread: &ThreadId, step: EmbedStep) {
        let (panels, mut cx) = self.split();
        panels.on_embed_step(&mut cx, thread, step);
    }

    fn split(&mut self) -> (&mut PanelController<H::Guard>, Parts<'_, H>) {
        (
            &mut self.panels,
            Parts {
                host: &mut self.host,
                config: &self.config,
                store: &mut self.store,
                bus: &mut self.bus,
                embedder: &mut self.embedder,
                reconciler: &mut self.reconciler,
            },
        )
    }
}
