//! Displayed comment count reconciliation.
//!
//! Four channels propose counts for a thread: the persisted cache, the local
//! optimistic bump after a submission, counts observed in the mounted region
//! or its messages, and the remote discussion service. The displayed value
//! only moves up, except when a remote answer corrects it.
//!
//! A submission opens a *cycle* per thread: the optimistic bump is applied at
//! once, then an observed re-scrape and a remote confirmation are scheduled.
//! Further submissions while the cycle runs re-arm both follow-ups instead of
//! opening a second cycle. The cycle ends when its confirmation answers.
//!
//! One posted comment is usually reported twice: once by the host page's DOM
//! and once by the widget's messages, in either order and with no bound on
//! the delay between them. A cycle keeps the reports of each channel that the
//! other channel has not matched yet, and a report that matches one is not
//! counted again.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::errors::RemoteFetchError;
use super::host::{FetchReason, FetchTicket, Host, Task};
use super::observe::first_integer;
use super::store::PersistenceStore;
use crate::config::Config;
use crate::models::{
    Candidate, CountCue, CountRecord, CountSource, RemoteCount, SubmissionTrigger, ThreadId,
    discussion_identifier,
};

/// Result of offering a candidate count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// The candidate became the displayed value.
    Accepted {
        /// Displayed value before.
        previous: u64,
        /// Displayed value now.
        value: u64,
        /// Hint for the label.
        cue: Option<CountCue>,
    },
    /// The candidate lost against the displayed value.
    Discarded {
        /// Displayed value, unchanged.
        displayed: u64,
    },
}

impl Merge {
    /// Whether the candidate was taken.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// What a submission signal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A new cycle started; `value` is the displayed count afterwards.
    Started {
        /// The new cycle.
        cycle: u64,
        /// Displayed count afterwards.
        value: u64,
    },
    /// The running cycle was re-armed.
    Rearmed {
        /// The running cycle.
        cycle: u64,
        /// Displayed count afterwards.
        value: u64,
    },
    /// Same user action reported twice; nothing changed.
    Echo {
        /// The running cycle.
        cycle: u64,
    },
}

/// How a remote answer was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The remote count was merged into the displayed count.
    Applied(Merge),
    /// No discussion matched the thread.
    Unchanged,
    /// The panel is no longer open.
    Discarded,
    /// The query failed; `retry_attempt` is set when another one is scheduled.
    Failed {
        /// Number of the scheduled retry.
        retry_attempt: Option<u32>,
    },
    /// The ticket is not outstanding any more.
    Unknown,
}

#[derive(Debug)]
struct SubmissionCycle<G> {
    id: u64,
    last_signal_at: DateTime<Utc>,
    rescrape: Option<G>,
    confirm: Option<G>,
    awaiting: Option<u64>,
    unmatched_dom: u32,
    unmatched_widget: u32,
}

impl<G> SubmissionCycle<G> {
    /// Matches a report against an earlier one from the other channel.
    fn match_report(&mut self, from_widget: bool) -> bool {
        let other = if from_widget {
            &mut self.unmatched_dom
        } else {
            &mut self.unmatched_widget
        };
        if *other == 0 {
            return false;
        }
        *other -= 1;
        true
    }

    fn record_report(&mut self, from_widget: bool) {
        if from_widget {
            self.unmatched_widget += 1;
        } else {
            self.unmatched_dom += 1;
        }
    }
}

#[derive(Debug)]
struct RemoteRetry<G> {
    attempt: u32,
    _timer: G,
}

#[derive(Debug)]
struct PendingFetch {
    thread: ThreadId,
    reason: FetchReason,
}

/// Displayed counts, submission cycles and outstanding remote queries.
#[derive(Debug)]
pub struct CountReconciler<G> {
    records: HashMap<ThreadId, CountRecord>,
    cycles: HashMap<ThreadId, SubmissionCycle<G>>,
    retries: HashMap<ThreadId, RemoteRetry<G>>,
    pending: HashMap<u64, PendingFetch>,
    last_cycle: u64,
    last_ticket: u64,
}

impl<G> Default for CountReconciler<G> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            cycles: HashMap::new(),
            retries: HashMap::new(),
            pending: HashMap::new(),
            last_cycle: 0,
            last_ticket: 0,
        }
    }
}

impl<G> CountReconciler<G> {
    /// A reconciler that knows no counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Displayed count of a thread; 0 when nothing is known.
    #[must_use]
    pub fn displayed(&self, thread: &ThreadId) -> u64 {
        self.records.get(thread).map_or(0, |record| record.value)
    }

    /// Displayed count with its source, if any.
    #[must_use]
    pub fn record(&self, thread: &ThreadId) -> Option<&CountRecord> {
        self.records.get(thread)
    }

    /// Whether a submission cycle is running for the thread.
    #[must_use]
    pub fn in_cycle(&self, thread: &ThreadId) -> bool {
        self.cycles.contains_key(thread)
    }

    /// Thread an outstanding ticket was issued for.
    #[must_use]
    pub fn pending_thread(&self, ticket: u64) -> Option<&ThreadId> {
        self.pending.get(&ticket).map(|pending| &pending.thread)
    }

    /// Offers a candidate without rendering it.
    ///
    /// Remote candidates always win and are persisted. Cache candidates only
    /// seed a thread without a record and are never persisted again. Every
    /// other candidate must exceed the displayed value.
    pub fn merge(
        &mut self,
        store: &mut PersistenceStore,
        thread: &ThreadId,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Merge {
        let current = self.records.get(thread);
        let displayed = current.map_or(0, |record| record.value);
        let cue = match candidate.source {
            CountSource::Cache if current.is_some() => return Merge::Discarded { displayed },
            CountSource::Cache => None,
            CountSource::Remote => (candidate.value != displayed).then_some(CountCue::Corrected),
            CountSource::Optimistic | CountSource::Observed => {
                if candidate.value <= displayed {
                    return Merge::Discarded { displayed };
                }
                Some(CountCue::Increased)
            }
        };

        self.records.insert(
            thread.clone(),
            CountRecord {
                value: candidate.value,
                source: candidate.source,
                updated_at: now,
            },
        );
        if candidate.source != CountSource::Cache {
            store.set(thread, candidate.value);
        }
        Merge::Accepted {
            previous: displayed,
            value: candidate.value,
            cue,
        }
    }

    /// Offers a candidate and renders it if accepted.
    pub fn apply<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        store: &mut PersistenceStore,
        thread: &ThreadId,
        candidate: Candidate,
    ) -> Merge {
        let merge = self.merge(store, thread, candidate, host.now());
        match merge {
            Merge::Accepted {
                previous,
                value,
                cue,
            } => {
                debug!(thread = %thread, source = %candidate.source, previous, value, "count accepted");
                host.render_count(thread, value, cue);
            }
            Merge::Discarded { displayed } => {
                debug!(
                    thread = %thread,
                    source = %candidate.source,
                    candidate = candidate.value,
                    displayed,
                    "count discarded"
                );
            }
        }
        merge
    }

    /// Seeds a thread from the cache and renders whatever it displays.
    pub fn seed_from_cache<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        store: &mut PersistenceStore,
        thread: &ThreadId,
    ) -> u64 {
        let seeded = store
            .get(thread)
            .is_some_and(|cached| self.apply(host, store, thread, Candidate::cache(cached)).is_accepted());
        let displayed = self.displayed(thread);
        if !seeded {
            host.render_count(thread, displayed, None);
        }
        displayed
    }

    /// Scrapes the mounted region and offers what it shows as Observed.
    pub fn scrape<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        store: &mut PersistenceStore,
        thread: &ThreadId,
    ) -> Option<Merge> {
        let text = host.scrape_count_text(thread)?;
        let Some(value) = first_integer(&text) else {
            debug!(thread = %thread, text = %text, "count element holds no number");
            return None;
        };
        Some(self.apply(host, store, thread, Candidate::observed(value)))
    }

    /// Handles a submission signal: optimistic bump plus scheduled follow-ups.
    pub fn submit<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        store: &mut PersistenceStore,
        config: &Config,
        thread: &ThreadId,
        trigger: SubmissionTrigger,
    ) -> Submission {
        let now = host.now();
        let from_widget = trigger.from_widget();
        if let Some(cycle) = self.cycles.get_mut(thread) {
            if cycle.match_report(from_widget) {
                debug!(
                    thread = %thread,
                    %trigger,
                    cycle = cycle.id,
                    "submission already counted by the other channel"
                );
                return Submission::Echo { cycle: cycle.id };
            }
            let echo = (now - cycle.last_signal_at)
                .to_std()
                .is_ok_and(|elapsed| elapsed < config.engine.submission_echo_window());
            if echo {
                debug!(thread = %thread, %trigger, cycle = cycle.id, "submission echo ignored");
                return Submission::Echo { cycle: cycle.id };
            }
        }

        let floor = self.displayed(thread).saturating_add(1);
        self.apply(host, store, thread, Candidate::optimistic(floor));
        let value = self.displayed(thread);

        let (id, started) = match self.cycles.get(thread) {
            Some(cycle) => (cycle.id, false),
            None => {
                self.last_cycle += 1;
                (self.last_cycle, true)
            }
        };
        let rescrape = host.set_timeout(
            config.engine.observed_followup(),
            Task::Rescrape {
                thread: thread.clone(),
                cycle: id,
            },
        );
        let confirm = host.set_timeout(
            config.engine.remote_followup(),
            Task::RemoteConfirm {
                thread: thread.clone(),
                cycle: id,
            },
        );
        let cycle = self
            .cycles
            .entry(thread.clone())
            .or_insert_with(|| SubmissionCycle {
                id,
                last_signal_at: now,
                rescrape: None,
                confirm: None,
                awaiting: None,
                unmatched_dom: 0,
                unmatched_widget: 0,
            });
        cycle.record_report(from_widget);
        cycle.last_signal_at = now;
        cycle.rescrape = Some(rescrape);
        cycle.confirm = Some(confirm);
        cycle.awaiting = None;

        info!(thread = %thread, %trigger, cycle = id, value, started, "submission recorded");
        if started {
            Submission::Started { cycle: id, value }
        } else {
            Submission::Rearmed { cycle: id, value }
        }
    }

    /// Observed follow-up of a cycle.
    pub fn on_rescrape<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        store: &mut PersistenceStore,
        thread: &ThreadId,
        cycle: u64,
    ) -> Option<Merge> {
        let current = self.cycles.get_mut(thread).filter(|c| c.id == cycle)?;
        current.rescrape = None;
        self.scrape(host, store, thread)
    }

    /// Remote follow-up of a cycle. Returns the ticket issued, if any.
    pub fn on_confirm_due<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        config: &Config,
        thread: &ThreadId,
        cycle: u64,
    ) -> Option<u64> {
        if !self.cycles.get(thread).is_some_and(|c| c.id == cycle) {
            return None;
        }
        let ticket = self.request_remote(host, config, thread, FetchReason::Confirmation { cycle });
        match (ticket, self.cycles.get_mut(thread)) {
            (Some(ticket), Some(current)) => {
                current.confirm = None;
                current.awaiting = Some(ticket);
            }
            (None, _) => {
                self.cycles.remove(thread);
                debug!(thread = %thread, cycle, "submission cycle closed without confirmation");
            }
            (Some(_), None) => {}
        }
        ticket
    }

    /// Asks the host for an authoritative count. Returns the ticket id, or
    /// `None` when remote queries are disabled.
    pub fn request_remote<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        config: &Config,
        thread: &ThreadId,
        reason: FetchReason,
    ) -> Option<u64> {
        if !config.remote.enabled {
            return None;
        }
        self.last_ticket += 1;
        let id = self.last_ticket;
        self.pending.insert(
            id,
            PendingFetch {
                thread: thread.clone(),
                reason,
            },
        );
        debug!(thread = %thread, ticket = id, ?reason, "requesting remote count");
        host.request_remote_count(FetchTicket {
            id,
            thread: thread.clone(),
            identifier: discussion_identifier(&host.page_path(), thread),
            reason,
        });
        Some(id)
    }

    /// Backoff of a failed remote query elapsed.
    pub fn on_remote_retry_due<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        config: &Config,
        thread: &ThreadId,
        attempt: u32,
    ) -> Option<u64> {
        if !self.retries.get(thread).is_some_and(|r| r.attempt == attempt) {
            return None;
        }
        self.request_remote(host, config, thread, FetchReason::Retry { attempt })
    }

    /// Applies the answer to a remote query.
    ///
    /// `open` tells whether the thread's panel is open; answers for other
    /// panels are dropped.
    pub fn on_remote_result<H: Host<Guard = G>>(
        &mut self,
        host: &mut H,
        store: &mut PersistenceStore,
        config: &Config,
        ticket: u64,
        result: Result<RemoteCount, RemoteFetchError>,
        open: bool,
    ) -> RemoteOutcome {
        let Some(PendingFetch { thread, reason }) = self.pending.remove(&ticket) else {
            debug!(ticket, "ignoring answer to unknown ticket");
            return RemoteOutcome::Unknown;
        };
        if let FetchReason::Confirmation { cycle } = reason {
            let completes = self
                .cycles
                .get(&thread)
                .is_some_and(|c| c.id == cycle && c.awaiting == Some(ticket));
            if completes {
                self.cycles.remove(&thread);
                debug!(thread = %thread, cycle, "submission cycle complete");
            }
        }
        if !open {
            debug!(thread = %thread, ticket, "panel not open, discarding remote answer");
            return RemoteOutcome::Discarded;
        }

        match result {
            Ok(RemoteCount::Found(value)) => {
                self.retries.remove(&thread);
                RemoteOutcome::Applied(self.apply(host, store, &thread, Candidate::remote(value)))
            }
            Ok(RemoteCount::NotFound) => {
                self.retries.remove(&thread);
                debug!(thread = %thread, "no discussion matches thread yet");
                RemoteOutcome::Unchanged
            }
            Err(error) => {
                if !self.records.contains_key(&thread) {
                    if let Some(cached) = store.get(&thread) {
                        self.apply(host, store, &thread, Candidate::cache(cached));
                    }
                }
                let attempt = self.retries.get(&thread).map_or(0, |r| r.attempt) + 1;
                if error.is_transient() && attempt <= config.engine.remote_retry_limit {
                    let delay = config.engine.remote_retry_backoff(attempt);
                    warn!(
                        thread = %thread,
                        %error,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "remote count failed, retrying"
                    );
                    let timer = host.set_timeout(
                        delay,
                        Task::RemoteRetry {
                            thread: thread.clone(),
                            attempt,
                        },
                    );
                    self.retries.insert(
                        thread,
                        RemoteRetry {
                            attempt,
                            _timer: timer,
                        },
                    );
                    RemoteOutcome::Failed {
                        retry_attempt: Some(attempt),
                    }
                } else {
                    warn!(thread = %thread, %error, "remote count failed, keeping displayed value");
                    self.retries.remove(&thread);
                    RemoteOutcome::Failed {
                        retry_attempt: None,
                    }
                }
            }
        }
    }

    /// Cancels the cycle, retries and outstanding queries of a thread.
    /// The displayed value is kept.
    pub fn cancel(&mut self, thread: &ThreadId) {
        self.cycles.remove(thread);
        self.retries.remove(thread);
        self.pending.retain(|_, pending| &pending.thread != thread);
    }

    /// Cancels everything for every thread.
    pub fn clear(&mut self) {
        self.cycles.clear();
        self.retries.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::MemoryStorage;
    use crate::engine::testing::{self, FakeGuard, FakeHost};

    struct Rig {
        host: FakeHost,
        store: PersistenceStore,
        storage: MemoryStorage,
        reconciler: CountReconciler<FakeGuard>,
        config: Config,
        thread: ThreadId,
    }

    impl Rig {
        fn new() -> Self {
            let storage = MemoryStorage::new();
            Self {
                host: FakeHost::with_threads(&["t1"]),
                store: PersistenceStore::new(Box::new(storage.clone())),
                storage,
                reconciler: CountReconciler::new(),
                config: testing::config(),
                thread: ThreadId::new("t1"),
            }
        }

        fn offer(&mut self, candidate: Candidate) -> Merge {
            self.reconciler
                .apply(&mut self.host, &mut self.store, &self.thread, candidate)
        }

        fn submit(&mut self) -> Submission {
            self.reconciler.submit(
                &mut self.host,
                &mut self.store,
                &self.config,
                &self.thread,
                SubmissionTrigger::FormSubmit,
            )
        }

        fn displayed(&self) -> u64 {
            self.reconciler.displayed(&self.thread)
        }
    }

    #[test]
    fn remote_always_wins() {
        let mut rig = Rig::new();
        rig.offer(Candidate::observed(9));
        assert_eq!(
            rig.offer(Candidate::remote(4)),
            Merge::Accepted {
                previous: 9,
                value: 4,
                cue: Some(CountCue::Corrected)
            }
        );
        assert_eq!(
            rig.offer(Candidate::remote(4)),
            Merge::Accepted {
                previous: 4,
                value: 4,
                cue: None
            }
        );
        assert_eq!(rig.storage.get("giscus-comment-count-t1").as_deref(), Some("4"));
    }

    #[test]
    fn non_remote_candidates_only_increase() {
        let mut rig = Rig::new();
        assert!(rig.offer(Candidate::observed(3)).is_accepted());
        assert_eq!(
            rig.offer(Candidate::observed(2)),
            Merge::Discarded { displayed: 3 }
        );
        assert_eq!(
            rig.offer(Candidate::optimistic(3)),
            Merge::Discarded { displayed: 3 }
        );
        assert_eq!(rig.host.last_render(&rig.thread), Some((3, Some(CountCue::Increased))));
    }

    #[test]
    fn cache_only_seeds_and_is_not_persisted() {
        let mut rig = Rig::new();
        assert_eq!(
            rig.offer(Candidate::cache(5)),
            Merge::Accepted {
                previous: 0,
                value: 5,
                cue: None
            }
        );
        assert!(rig.storage.is_empty());
        assert_eq!(
            rig.offer(Candidate::cache(8)),
            Merge::Discarded { displayed: 5 }
        );
        assert_eq!(rig.reconciler.record(&rig.thread).unwrap().source, CountSource::Cache);
    }

    #[test]
    fn seed_renders_zero_without_cache() {
        let mut rig = Rig::new();
        let shown = rig
            .reconciler
            .seed_from_cache(&mut rig.host, &mut rig.store, &rig.thread);
        assert_eq!(shown, 0);
        assert_eq!(rig.host.last_render(&rig.thread), Some((0, None)));
        assert!(rig.reconciler.record(&rig.thread).is_none());
    }

    #[test]
    fn submission_bumps_synchronously_and_schedules_followups() {
        let mut rig = Rig::new();
        rig.offer(Candidate::remote(5));

        assert_eq!(rig.submit(), Submission::Started { cycle: 1, value: 6 });
        assert_eq!(rig.displayed(), 6);
        assert!(rig.reconciler.in_cycle(&rig.thread));
        assert_eq!(
            rig.host.pending_tasks(),
            vec![
                Task::Rescrape {
                    thread: rig.thread.clone(),
                    cycle: 1
                },
                Task::RemoteConfirm {
                    thread: rig.thread.clone(),
                    cycle: 1
                },
            ]
        );
    }

    #[test]
    fn echo_is_not_counted_twice() {
        let mut rig = Rig::new();
        rig.submit();
        rig.host.set_elapsed(100);
        assert_eq!(rig.submit(), Submission::Echo { cycle: 1 });
        assert_eq!(rig.displayed(), 1);

        rig.host.set_elapsed(400);
        assert_eq!(rig.submit(), Submission::Rearmed { cycle: 1, value: 2 });
        // Re-arming replaced the follow-ups instead of adding more.
        assert_eq!(rig.host.pending_tasks().len(), 2);
    }

    #[test]
    fn late_widget_report_matches_dom_submission() {
        let mut rig = Rig::new();
        rig.submit();
        rig.host.set_elapsed(400);
        let created = rig.reconciler.submit(
            &mut rig.host,
            &mut rig.store,
            &rig.config,
            &rig.thread,
            SubmissionTrigger::CommentCreated,
        );
        assert_eq!(created, Submission::Echo { cycle: 1 });
        assert_eq!(rig.displayed(), 1);

        // A second comment after the pair was matched counts again.
        rig.host.set_elapsed(700);
        assert_eq!(rig.submit(), Submission::Rearmed { cycle: 1, value: 2 });
    }

    #[test]
    fn confirmation_answer_ends_cycle() {
        let mut rig = Rig::new();
        rig.submit();
        let ticket = rig
            .reconciler
            .on_confirm_due(&mut rig.host, &rig.config, &rig.thread, 1)
            .unwrap();
        assert!(rig.reconciler.in_cycle(&rig.thread));

        let outcome = rig.reconciler.on_remote_result(
            &mut rig.host,
            &mut rig.store,
            &rig.config,
            ticket,
            Ok(RemoteCount::Found(1)),
            true,
        );
        assert!(matches!(outcome, RemoteOutcome::Applied(_)));
        assert!(!rig.reconciler.in_cycle(&rig.thread));
    }

    #[test]
    fn disabled_remote_closes_cycle_at_confirmation() {
        let mut rig = Rig::new();
        rig.config.remote.enabled = false;
        rig.submit();
        assert_eq!(
            rig.reconciler
                .on_confirm_due(&mut rig.host, &rig.config, &rig.thread, 1),
            None
        );
        assert!(!rig.reconciler.in_cycle(&rig.thread));
        assert!(rig.host.fetches.is_empty());
    }

    #[test]
    fn answers_for_closed_panels_are_discarded() {
        let mut rig = Rig::new();
        let ticket = rig
            .reconciler
            .request_remote(&mut rig.host, &rig.config, &rig.thread, FetchReason::Initial)
            .unwrap();
        let outcome = rig.reconciler.on_remote_result(
            &mut rig.host,
            &mut rig.store,
            &rig.config,
            ticket,
            Ok(RemoteCount::Found(10)),
            false,
        );
        assert_eq!(outcome, RemoteOutcome::Discarded);
        assert_eq!(rig.displayed(), 0);
    }

    #[test]
    fn not_found_leaves_count_untouched() {
        let mut rig = Rig::new();
        rig.offer(Candidate::observed(2));
        let ticket = rig
            .reconciler
            .request_remote(&mut rig.host, &rig.config, &rig.thread, FetchReason::Initial)
            .unwrap();
        let outcome = rig.reconciler.on_remote_result(
            &mut rig.host,
            &mut rig.store,
            &rig.config,
            ticket,
            Ok(RemoteCount::NotFound),
            true,
        );
        assert_eq!(outcome, RemoteOutcome::Unchanged);
        assert_eq!(rig.displayed(), 2);
    }

    #[test]
    fn failure_without_record_seeds_from_cache() {
        let mut rig = Rig::new();
        rig.storage.insert("giscus-comment-count-t1", "6");
        let ticket = rig
            .reconciler
            .request_remote(&mut rig.host, &rig.config, &rig.thread, FetchReason::Initial)
            .unwrap();
        let outcome = rig.reconciler.on_remote_result(
            &mut rig.host,
            &mut rig.store,
            &rig.config,
            ticket,
            Err(RemoteFetchError::Status { status: 401 }),
            true,
        );
        assert_eq!(outcome, RemoteOutcome::Failed { retry_attempt: None });
        assert_eq!(rig.displayed(), 6);
        assert!(rig.host.pending_tasks().is_empty());
    }

    #[test]
    fn transient_failures_retry_up_to_limit() {
        let mut rig = Rig::new();
        let mut ticket = rig
            .reconciler
            .request_remote(&mut rig.host, &rig.config, &rig.thread, FetchReason::Initial)
            .unwrap();
        for attempt in 1..=3 {
            let outcome = rig.reconciler.on_remote_result(
                &mut rig.host,
                &mut rig.store,
                &rig.config,
                ticket,
                Err(RemoteFetchError::Transport("offline".into())),
                true,
            );
            assert_eq!(outcome, RemoteOutcome::Failed { retry_attempt: Some(attempt) });
            ticket = rig
                .reconciler
                .on_remote_retry_due(&mut rig.host, &rig.config, &rig.thread, attempt)
                .unwrap();
        }
        let outcome = rig.reconciler.on_remote_result(
            &mut rig.host,
            &mut rig.store,
            &rig.config,
            ticket,
            Err(RemoteFetchError::Transport("offline".into())),
            true,
        );
        assert_eq!(outcome, RemoteOutcome::Failed { retry_attempt: None });
    }

    #[test]
    fn cancel_forgets_outstanding_work() {
        let mut rig = Rig::new();
        rig.submit();
        let ticket = rig
            .reconciler
            .request_remote(&mut rig.host, &rig.config, &rig.thread, FetchReason::Initial)
            .unwrap();
        rig.reconciler.cancel(&rig.thread);

        assert!(rig.host.pending_tasks().is_empty());
        assert_eq!(rig.reconciler.pending_thread(ticket), None);
        assert_eq!(rig.displayed(), 1);
    }
}
