//! Mounting and supervision of the embedded discussion widget.
//!
//! Each thread has at most one [`WidgetInstance`]. A mount attempt walks
//! `Loading → Verifying → Ready`; a timeout or load error schedules another
//! attempt after a linear backoff until the retry budget is spent. Every
//! attempt gets a fresh number, and events or timers from an older attempt
//! are ignored.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::host::{EmbedEvent, Host, MountRequest, Placeholder, Task};
use super::signals::{SignalBus, SignalKind};
use crate::config::Config;
use crate::models::{EmbedFailure, ThreadId, WidgetPhase, WidgetStatus, discussion_identifier};

/// What a widget transition means for the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedStep {
    /// Still working; nothing for the panel to do.
    Pending,
    /// The widget rendered its content.
    Ready,
    /// The attempt failed and another one is scheduled.
    Retrying {
        /// Why the attempt failed.
        failure: EmbedFailure,
        /// Retries used, including the scheduled one.
        retry_count: u32,
    },
    /// The widget gave up; no automatic retry follows.
    Failed(EmbedFailure),
    /// The event belonged to a superseded attempt or an unmounted thread.
    Stale,
}

#[derive(Debug)]
struct WidgetInstance<G> {
    term: String,
    phase: WidgetPhase,
    attempt: u32,
    retry_count: u32,
    readiness_poll_count: u32,
    timer: Option<G>,
}

/// Widget instances of every thread, keyed by thread.
#[derive(Debug)]
pub struct WidgetEmbedder<G> {
    instances: HashMap<ThreadId, WidgetInstance<G>>,
    last_attempt: u32,
}

impl<G> Default for WidgetEmbedder<G> {
    fn default() -> Self {
        Self {
            instances: HashMap::new(),
            last_attempt: 0,
        }
    }
}

impl<G> WidgetEmbedder<G> {
    /// An embedder with no instances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a widget instance for `thread` and starts its first attempt.
    pub fn mount<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        config: &Config,
        thread: &ThreadId,
    ) -> EmbedStep {
        let term = discussion_identifier(&host.page_path(), thread);
        self.instances.insert(
            thread.clone(),
            WidgetInstance {
                term,
                phase: WidgetPhase::Loading,
                attempt: 0,
                retry_count: 0,
                readiness_poll_count: 0,
                timer: None,
            },
        );
        self.start_attempt(host, bus, config, thread)
    }

    /// Manual retry after a terminal failure. Resets the retry budget.
    pub fn retry<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        config: &Config,
        thread: &ThreadId,
    ) -> EmbedStep {
        match self.instances.get_mut(thread) {
            Some(instance) => {
                instance.retry_count = 0;
                self.start_attempt(host, bus, config, thread)
            }
            None => self.mount(host, bus, config, thread),
        }
    }

    /// Removes the widget, its placeholders, timers and channels.
    ///
    /// Returns whether an instance existed. Calling it again is harmless.
    pub fn unmount<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        thread: &ThreadId,
    ) -> bool {
        let existed = self.instances.remove(thread).is_some();
        if existed {
            host.clear_widget(thread);
            host.show_placeholder(thread, None);
            debug!(thread = %thread, "widget unmounted");
        }
        bus.unsubscribe_all(thread);
        existed
    }

    /// Handles the load or error event of the injected script.
    pub fn on_event<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        config: &Config,
        thread: &ThreadId,
        attempt: u32,
        event: EmbedEvent,
    ) -> EmbedStep {
        if self.phase_of(thread, attempt) != Some(WidgetPhase::Loading) {
            debug!(thread = %thread, attempt, %event, "ignoring stale widget event");
            return EmbedStep::Stale;
        }
        match event {
            EmbedEvent::Loaded => self.begin_verifying(host, config, thread),
            EmbedEvent::LoadFailed => self.fail(host, bus, config, thread, EmbedFailure::LoadError),
        }
    }

    /// The load timer of `attempt` expired.
    pub fn on_timeout<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        config: &Config,
        thread: &ThreadId,
        attempt: u32,
    ) -> EmbedStep {
        if self.phase_of(thread, attempt) != Some(WidgetPhase::Loading) {
            return EmbedStep::Stale;
        }
        self.fail(host, bus, config, thread, EmbedFailure::Timeout)
    }

    /// Readiness check of `attempt` is due.
    pub fn on_readiness_poll<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        config: &Config,
        thread: &ThreadId,
        attempt: u32,
    ) -> EmbedStep {
        if self.phase_of(thread, attempt) != Some(WidgetPhase::Verifying) {
            return EmbedStep::Stale;
        }
        if host.has_content_marker(thread) {
            return self.mark_ready(host, thread);
        }
        let Some(instance) = self.instances.get_mut(thread) else {
            return EmbedStep::Stale;
        };
        instance.readiness_poll_count += 1;
        if instance.readiness_poll_count >= config.engine.readiness_max_polls {
            return self.fail(host, bus, config, thread, EmbedFailure::NotReady);
        }
        instance.timer = Some(host.set_timeout(
            config.engine.readiness_poll_interval(),
            Task::ReadinessPoll {
                thread: thread.clone(),
                attempt,
            },
        ));
        EmbedStep::Pending
    }

    /// Backoff of a failed attempt elapsed.
    pub fn on_retry_due<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        config: &Config,
        thread: &ThreadId,
        attempt: u32,
    ) -> EmbedStep {
        match self.phase_of(thread, attempt) {
            Some(WidgetPhase::Failed {
                terminal: false, ..
            }) => self.start_attempt(host, bus, config, thread),
            _ => EmbedStep::Stale,
        }
    }

    /// The mounted region changed; it may have revealed the content marker.
    pub fn on_mutation<H: Host<Guard = G>>(&mut self, host: &mut H, thread: &ThreadId) -> EmbedStep {
        let Some(instance) = self.instances.get(thread) else {
            return EmbedStep::Stale;
        };
        let waiting = matches!(instance.phase, WidgetPhase::Loading | WidgetPhase::Verifying);
        if waiting && host.has_content_marker(thread) {
            self.mark_ready(host, thread)
        } else {
            EmbedStep::Pending
        }
    }

    /// Whether the thread's widget rendered its content.
    #[must_use]
    pub fn is_ready(&self, thread: &ThreadId) -> bool {
        self.instances
            .get(thread)
            .is_some_and(|instance| instance.phase == WidgetPhase::Ready)
    }

    /// Snapshot of the thread's widget instance.
    #[must_use]
    pub fn status(&self, thread: &ThreadId) -> Option<WidgetStatus> {
        self.instances.get(thread).map(|instance| WidgetStatus {
            term: instance.term.clone(),
            phase: instance.phase,
            attempt: instance.attempt,
            retry_count: instance.retry_count,
            readiness_poll_count: instance.readiness_poll_count,
        })
    }

    /// Drops every instance without touching the page.
    pub fn clear(&mut self) {
        self.instances.clear();
    }

    fn phase_of(&self, thread: &ThreadId, attempt: u32) -> Option<WidgetPhase> {
        self.instances
            .get(thread)
            .filter(|instance| instance.attempt == attempt)
            .map(|instance| instance.phase)
    }

    fn start_attempt<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        config: &Config,
        thread: &ThreadId,
    ) -> EmbedStep {
        self.last_attempt += 1;
        let attempt = self.last_attempt;
        let request = {
            let Some(instance) = self.instances.get_mut(thread) else {
                return EmbedStep::Stale;
            };
            instance.attempt = attempt;
            instance.phase = WidgetPhase::Loading;
            instance.readiness_poll_count = 0;
            instance.timer = None;

            host.clear_widget(thread);
            let placeholder = if instance.retry_count == 0 {
                Placeholder::Loading
            } else {
                Placeholder::Retrying {
                    retry: instance.retry_count,
                    max_retries: config.engine.max_retries,
                }
            };
            host.show_placeholder(thread, Some(placeholder));
            info!(
                thread = %thread,
                attempt,
                retry_count = instance.retry_count,
                "mounting comment widget"
            );

            let attributes = config
                .embed
                .widget_attributes(&instance.term, &host.theme())
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect();
            MountRequest {
                thread: thread.clone(),
                attempt,
                term: instance.term.clone(),
                attributes,
            }
        };

        for kind in [SignalKind::Message, SignalKind::Mutation] {
            if bus.is_live(thread, kind) {
                continue;
            }
            match host.listen(thread, kind) {
                Some(guard) => {
                    bus.subscribe(thread, kind, guard);
                }
                None => warn!(thread = %thread, %kind, "could not attach signal channel"),
            }
        }

        if !host.mount_widget(&request) {
            warn!(thread = %thread, attempt, "widget could not be injected");
            return self.fail(host, bus, config, thread, EmbedFailure::LoadError);
        }
        let timer = host.set_timeout(
            config.engine.load_timeout(),
            Task::EmbedTimeout {
                thread: thread.clone(),
                attempt,
            },
        );
        if let Some(instance) = self.instances.get_mut(thread) {
            instance.timer = Some(timer);
        }
        EmbedStep::Pending
    }

    fn begin_verifying<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        config: &Config,
        thread: &ThreadId,
    ) -> EmbedStep {
        if host.has_content_marker(thread) {
            return self.mark_ready(host, thread);
        }
        let Some(instance) = self.instances.get_mut(thread) else {
            return EmbedStep::Stale;
        };
        debug!(thread = %thread, attempt = instance.attempt, "widget loaded, verifying readiness");
        instance.phase = WidgetPhase::Verifying;
        instance.readiness_poll_count = 0;
        instance.timer = Some(host.set_timeout(
            config.engine.readiness_poll_interval(),
            Task::ReadinessPoll {
                thread: thread.clone(),
                attempt: instance.attempt,
            },
        ));
        EmbedStep::Pending
    }

    fn mark_ready<H: Host<Guard = G>>(&mut self, host: &mut H, thread: &ThreadId) -> EmbedStep {
        let Some(instance) = self.instances.get_mut(thread) else {
            return EmbedStep::Stale;
        };
        instance.phase = WidgetPhase::Ready;
        instance.timer = None;
        host.show_placeholder(thread, None);
        info!(thread = %thread, attempt = instance.attempt, "comment widget ready");
        EmbedStep::Ready
    }

    fn fail<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        bus: &mut SignalBus<G>,
        config: &Config,
        thread: &ThreadId,
        failure: EmbedFailure,
    ) -> EmbedStep {
        let Some(instance) = self.instances.get_mut(thread) else {
            return EmbedStep::Stale;
        };
        instance.timer = None;
        if failure.is_retryable() {
            instance.retry_count += 1;
        }
        let max_retries = config.engine.max_retries;

        if failure.is_retryable() && instance.retry_count < max_retries {
            let delay = config.engine.retry_backoff(instance.retry_count);
            warn!(
                thread = %thread,
                attempt = instance.attempt,
                %failure,
                retry_count = instance.retry_count,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "widget attempt failed, retrying"
            );
            instance.phase = WidgetPhase::Failed {
                failure,
                terminal: false,
            };
            host.show_placeholder(
                thread,
                Some(Placeholder::Retrying {
                    retry: instance.retry_count,
                    max_retries,
                }),
            );
            instance.timer = Some(host.set_timeout(
                delay,
                Task::RetryMount {
                    thread: thread.clone(),
                    attempt: instance.attempt,
                },
            ));
            return EmbedStep::Retrying {
                failure,
                retry_count: instance.retry_count,
            };
        }

        warn!(
            thread = %thread,
            attempt = instance.attempt,
            %failure,
            retry_count = instance.retry_count,
            "widget failed permanently"
        );
        instance.phase = WidgetPhase::Failed {
            failure,
            terminal: true,
        };
        host.clear_widget(thread);
        host.show_placeholder(thread, Some(Placeholder::Failed { failure }));
        bus.unsubscribe_all(thread);
        EmbedStep::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{self, FakeGuard, FakeHost};

    struct Rig {
        host: FakeHost,
        bus: SignalBus<FakeGuard>,
        embedder: WidgetEmbedder<FakeGuard>,
        config: Config,
        thread: ThreadId,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                host: FakeHost::with_threads(&["t1"]),
                bus: SignalBus::new("https://giscus.app"),
                embedder: WidgetEmbedder::new(),
                config: testing::config(),
                thread: ThreadId::new("t1"),
            }
        }

        fn mount(&mut self) -> EmbedStep {
            self.embedder
                .mount(&mut self.host, &mut self.bus, &self.config, &self.thread)
        }

        fn attempt(&self) -> u32 {
            self.embedder.status(&self.thread).map_or(0, |s| s.attempt)
        }

        fn event(&mut self, attempt: u32, event: EmbedEvent) -> EmbedStep {
            self.embedder.on_event(
                &mut self.host,
                &mut self.bus,
                &self.config,
                &self.thread,
                attempt,
                event,
            )
        }

        /// Runs due embed tasks for `ms` and returns the non-pending steps.
        fn advance(&mut self, ms: u64) -> Vec<EmbedStep> {
            let target = self.host.elapsed_ms() + ms;
            let mut steps = Vec::new();
            while let Some(task) = self.host.pop_due(target) {
                let step = match task {
                    Task::EmbedTimeout { thread, attempt } => self.embedder.on_timeout(
                        &mut self.host,
                        &mut self.bus,
                        &self.config,
                        &thread,
                        attempt,
                    ),
                    Task::ReadinessPoll { thread, attempt } => self.embedder.on_readiness_poll(
                        &mut self.host,
                        &mut self.bus,
                        &self.config,
                        &thread,
                        attempt,
                    ),
                    Task::RetryMount { thread, attempt } => self.embedder.on_retry_due(
                        &mut self.host,
                        &mut self.bus,
                        &self.config,
                        &thread,
                        attempt,
                    ),
                    other => panic!("unexpected task {other:?}"),
                };
                if step != EmbedStep::Pending {
                    steps.push(step);
                }
            }
            self.host.set_elapsed(target);
            steps
        }
    }

    #[test]
    fn mount_injects_widget_and_subscribes() {
        let mut rig = Rig::new();
        assert_eq!(rig.mount(), EmbedStep::Pending);

        let request = rig.host.last_mount(&rig.thread).unwrap();
        assert_eq!(request.term, "/thoughts/#t1");
        assert!(
            request
                .attributes
                .contains(&("data-term".to_string(), "/thoughts/#t1".to_string()))
        );
        assert_eq!(rig.host.placeholders.get(&rig.thread), Some(&Placeholder::Loading));
        assert!(rig.bus.is_live(&rig.thread, SignalKind::Message));
        assert!(rig.bus.is_live(&rig.thread, SignalKind::Mutation));
        assert_eq!(rig.host.live_listeners(&rig.thread), 2);
    }

    #[test]
    fn load_then_marker_becomes_ready() {
        let mut rig = Rig::new();
        rig.mount();
        let attempt = rig.attempt();

        assert_eq!(rig.event(attempt, EmbedEvent::Loaded), EmbedStep::Pending);
        assert_eq!(
            rig.embedder.status(&rig.thread).unwrap().phase,
            WidgetPhase::Verifying
        );

        assert!(rig.advance(3_000).is_empty());
        rig.host.markers.insert(rig.thread.clone());
        assert_eq!(rig.advance(1_000), vec![EmbedStep::Ready]);
        assert!(rig.embedder.is_ready(&rig.thread));
        assert_eq!(rig.host.placeholders.get(&rig.thread), None);
        // The load timer died with the attempt.
        assert!(rig.host.pending_tasks().is_empty());
    }

    #[test]
    fn mutation_short_circuits_polling() {
        let mut rig = Rig::new();
        rig.mount();
        let attempt = rig.attempt();
        rig.event(attempt, EmbedEvent::Loaded);

        assert_eq!(
            rig.embedder.on_mutation(&mut rig.host, &rig.thread),
            EmbedStep::Pending
        );
        rig.host.markers.insert(rig.thread.clone());
        assert_eq!(
            rig.embedder.on_mutation(&mut rig.host, &rig.thread),
            EmbedStep::Ready
        );
    }

    #[test]
    fn timeouts_retry_with_linear_backoff_then_give_up() {
        let mut rig = Rig::new();
        rig.mount();

        assert_eq!(
            rig.advance(15_000),
            vec![EmbedStep::Retrying {
                failure: EmbedFailure::Timeout,
                retry_count: 1
            }]
        );
        // First retry waits one unit, the second two.
        assert!(rig.advance(999).is_empty());
        assert_eq!(rig.host.mounts.len(), 1);
        rig.advance(1);
        assert_eq!(rig.host.mounts.len(), 2);

        assert_eq!(
            rig.advance(15_000),
            vec![EmbedStep::Retrying {
                failure: EmbedFailure::Timeout,
                retry_count: 2
            }]
        );
        rig.advance(2_000);
        assert_eq!(rig.host.mounts.len(), 3);

        assert_eq!(
            rig.advance(15_000),
            vec![EmbedStep::Failed(EmbedFailure::Timeout)]
        );
        assert_eq!(
            rig.host.placeholders.get(&rig.thread),
            Some(&Placeholder::Failed {
                failure: EmbedFailure::Timeout
            })
        );
        assert_eq!(rig.bus.live_count(&rig.thread), 0);
        assert_eq!(rig.host.live_listeners(&rig.thread), 0);

        // Nothing else is scheduled after the terminal failure.
        assert!(rig.advance(60_000).is_empty());
        assert_eq!(rig.host.mounts.len(), 3);
    }

    #[test]
    fn stale_attempt_events_are_ignored() {
        let mut rig = Rig::new();
        rig.mount();
        let first = rig.attempt();
        rig.event(first, EmbedEvent::LoadFailed);
        rig.advance(1_000);
        let second = rig.attempt();
        assert_ne!(first, second);

        assert_eq!(rig.event(first, EmbedEvent::Loaded), EmbedStep::Stale);
        assert_eq!(
            rig.embedder.status(&rig.thread).unwrap().phase,
            WidgetPhase::Loading
        );
        assert_eq!(rig.event(second, EmbedEvent::Loaded), EmbedStep::Pending);
    }

    #[test]
    fn missing_marker_is_terminal_without_retry() {
        let mut rig = Rig::new();
        rig.mount();
        let attempt = rig.attempt();
        rig.event(attempt, EmbedEvent::Loaded);

        let steps = rig.advance(30_000);
        assert_eq!(steps, vec![EmbedStep::Failed(EmbedFailure::NotReady)]);
        let status = rig.embedder.status(&rig.thread).unwrap();
        assert_eq!(status.readiness_poll_count, 30);
        assert_eq!(status.retry_count, 0);
        assert!(rig.advance(60_000).is_empty());
        assert_eq!(rig.host.mounts.len(), 1);
    }

    #[test]
    fn refused_injection_counts_as_load_error() {
        let mut rig = Rig::new();
        rig.host.refuse_mounts = true;
        assert_eq!(
            rig.mount(),
            EmbedStep::Retrying {
                failure: EmbedFailure::LoadError,
                retry_count: 1
            }
        );
    }

    #[test]
    fn manual_retry_resets_budget() {
        let mut rig = Rig::new();
        rig.config.engine.max_retries = 1;
        rig.mount();
        assert_eq!(
            rig.advance(15_000),
            vec![EmbedStep::Failed(EmbedFailure::Timeout)]
        );

        let step = rig
            .embedder
            .retry(&mut rig.host, &mut rig.bus, &rig.config, &rig.thread);
        assert_eq!(step, EmbedStep::Pending);
        let status = rig.embedder.status(&rig.thread).unwrap();
        assert_eq!(status.retry_count, 0);
        assert_eq!(status.phase, WidgetPhase::Loading);
        assert!(rig.bus.is_live(&rig.thread, SignalKind::Message));
    }

    #[test]
    fn unmount_is_idempotent() {
        let mut rig = Rig::new();
        rig.mount();
        assert!(rig.embedder.unmount(&mut rig.host, &mut rig.bus, &rig.thread));
        assert!(!rig.embedder.unmount(&mut rig.host, &mut rig.bus, &rig.thread));
        assert!(rig.embedder.status(&rig.thread).is_none());
        assert_eq!(rig.bus.live_count(&rig.thread), 0);
        assert!(rig.host.pending_tasks().is_empty());
    }
}
