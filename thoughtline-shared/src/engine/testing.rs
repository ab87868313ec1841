//! Deterministic [`Host`] for engine tests.
//!
//! Time is virtual: timers only fire when a test advances the clock, in due
//! order, and every guard handed to the engine removes its timer or listener
//! from the shared registry when dropped.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use super::host::{FetchTicket, Host, MountRequest, NoticeLevel, Placeholder, Task};
use super::signals::SignalKind;
use super::store::MemoryStorage;
use super::{CommentSubsystem, RemoteFetchError};
use crate::config::Config;
use crate::models::{CountCue, RemoteCount, ThreadId};

#[derive(Debug)]
struct Timer {
    due_ms: u64,
    period_ms: Option<u64>,
    task: Task,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    timers: BTreeMap<u64, Timer>,
    listeners: BTreeMap<u64, (ThreadId, SignalKind)>,
}

impl Registry {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug)]
pub struct FakeGuard {
    id: u64,
    registry: Rc<RefCell<Registry>>,
}

impl Drop for FakeGuard {
    fn drop(&mut self) {
        let mut registry = self.registry.borrow_mut();
        registry.timers.remove(&self.id);
        registry.listeners.remove(&self.id);
    }
}

#[derive(Debug)]
pub struct FakeHost {
    registry: Rc<RefCell<Registry>>,
    epoch: DateTime<Utc>,
    elapsed_ms: u64,
    pub page_path: String,
    pub theme: String,
    pub containers: HashSet<ThreadId>,
    pub visible: HashSet<ThreadId>,
    pub active_triggers: HashSet<ThreadId>,
    pub scrolls: Vec<ThreadId>,
    pub mounts: Vec<MountRequest>,
    pub refuse_mounts: bool,
    pub placeholders: HashMap<ThreadId, Placeholder>,
    pub cleared: Vec<ThreadId>,
    pub markers: HashSet<ThreadId>,
    pub count_text: HashMap<ThreadId, String>,
    pub renders: Vec<(ThreadId, u64, Option<CountCue>)>,
    pub fetches: Vec<FetchTicket>,
    pub theme_updates: Vec<(ThreadId, String)>,
    pub notices: Vec<(NoticeLevel, String)>,
}

impl FakeHost {
    /// A page at `/thoughts/` with a rendered container for each id.
    pub fn with_threads(ids: &[&str]) -> Self {
        Self {
            registry: Rc::default(),
            epoch: Utc
                .with_ymd_and_hms(2024, 5, 1, 8, 0, 0)
                .single()
                .unwrap_or_default(),
            elapsed_ms: 0,
            page_path: "/thoughts/".to_string(),
            theme: "light".to_string(),
            containers: ids.iter().map(|id| ThreadId::new(*id)).collect(),
            visible: HashSet::new(),
            active_triggers: HashSet::new(),
            scrolls: Vec::new(),
            mounts: Vec::new(),
            refuse_mounts: false,
            placeholders: HashMap::new(),
            cleared: Vec::new(),
            markers: HashSet::new(),
            count_text: HashMap::new(),
            renders: Vec::new(),
            fetches: Vec::new(),
            theme_updates: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub const fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Live DOM listeners of one thread.
    pub fn live_listeners(&self, thread: &ThreadId) -> usize {
        self.registry
            .borrow()
            .listeners
            .values()
            .filter(|(owner, _)| owner == thread)
            .count()
    }

    /// Scheduled tasks, in due order.
    pub fn pending_tasks(&self) -> Vec<Task> {
        let registry = self.registry.borrow();
        let mut timers: Vec<_> = registry.timers.iter().collect();
        timers.sort_by_key(|(id, timer)| (timer.due_ms, **id));
        timers.into_iter().map(|(_, timer)| timer.task.clone()).collect()
    }

    /// Pops the earliest task due at or before `until_ms` and moves the clock
    /// to its due time.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<Task> {
        let mut registry = self.registry.borrow_mut();
        let (id, due_ms) = registry
            .timers
            .iter()
            .filter(|(_, timer)| timer.due_ms <= until_ms)
            .min_by_key(|(id, timer)| (timer.due_ms, **id))
            .map(|(id, timer)| (*id, timer.due_ms))?;
        let timer = registry.timers.get_mut(&id)?;
        let task = timer.task.clone();
        if let Some(period) = timer.period_ms {
            timer.due_ms += period;
        } else {
            registry.timers.remove(&id);
        }
        self.elapsed_ms = self.elapsed_ms.max(due_ms);
        Some(task)
    }

    pub fn set_elapsed(&mut self, ms: u64) {
        self.elapsed_ms = self.elapsed_ms.max(ms);
    }

    pub fn last_mount(&self, thread: &ThreadId) -> Option<&MountRequest> {
        self.mounts.iter().rev().find(|request| &request.thread == thread)
    }

    pub fn last_render(&self, thread: &ThreadId) -> Option<(u64, Option<CountCue>)> {
        self.renders
            .iter()
            .rev()
            .find(|(owner, _, _)| owner == thread)
            .map(|(_, value, cue)| (*value, *cue))
    }

    pub fn take_fetches(&mut self) -> Vec<FetchTicket> {
        std::mem::take(&mut self.fetches)
    }

    fn schedule(&mut self, delay: Duration, period: Option<Duration>, task: Task) -> FakeGuard {
        let mut registry = self.registry.borrow_mut();
        let id = registry.allocate();
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        registry.timers.insert(
            id,
            Timer {
                due_ms: self.elapsed_ms + delay_ms,
                period_ms: period.map(|p| u64::try_from(p.as_millis()).unwrap_or(u64::MAX)),
                task,
            },
        );
        FakeGuard {
            id,
            registry: Rc::clone(&self.registry),
        }
    }
}

impl Host for FakeHost {
    type Guard = FakeGuard;

    fn now(&self) -> DateTime<Utc> {
        self.epoch + chrono::Duration::milliseconds(i64::try_from(self.elapsed_ms).unwrap_or(i64::MAX))
    }

    fn page_path(&self) -> String {
        self.page_path.clone()
    }

    fn theme(&self) -> String {
        self.theme.clone()
    }

    fn set_timeout(&mut self, delay: Duration, task: Task) -> FakeGuard {
        self.schedule(delay, None, task)
    }

    fn set_interval(&mut self, period: Duration, task: Task) -> FakeGuard {
        self.schedule(period, Some(period), task)
    }

    fn listen(&mut self, thread: &ThreadId, kind: SignalKind) -> Option<FakeGuard> {
        if !self.containers.contains(thread) {
            return None;
        }
        let mut registry = self.registry.borrow_mut();
        let id = registry.allocate();
        registry.listeners.insert(id, (thread.clone(), kind));
        Some(FakeGuard {
            id,
            registry: Rc::clone(&self.registry),
        })
    }

    fn has_container(&self, thread: &ThreadId) -> bool {
        self.containers.contains(thread)
    }

    fn set_container_visible(&mut self, thread: &ThreadId, visible: bool) {
        if visible {
            self.visible.insert(thread.clone());
        } else {
            self.visible.remove(thread);
        }
    }

    fn set_trigger_active(&mut self, thread: &ThreadId, active: bool) {
        if active {
            self.active_triggers.insert(thread.clone());
        } else {
            self.active_triggers.remove(thread);
        }
    }

    fn scroll_into_view(&mut self, thread: &ThreadId) {
        self.scrolls.push(thread.clone());
    }

    fn mount_widget(&mut self, request: &MountRequest) -> bool {
        if self.refuse_mounts {
            return false;
        }
        self.mounts.push(request.clone());
        true
    }

    fn show_placeholder(&mut self, thread: &ThreadId, placeholder: Option<Placeholder>) {
        match placeholder {
            Some(placeholder) => {
                self.placeholders.insert(thread.clone(), placeholder);
            }
            None => {
                self.placeholders.remove(thread);
            }
        }
    }

    fn set_widget_theme(&mut self, thread: &ThreadId, theme: &str) -> bool {
        // The widget frame exists once its content marker rendered.
        if !self.markers.contains(thread) {
            return false;
        }
        self.theme_updates.push((thread.clone(), theme.to_string()));
        true
    }

    fn clear_widget(&mut self, thread: &ThreadId) {
        self.cleared.push(thread.clone());
        self.markers.remove(thread);
    }

    fn has_content_marker(&self, thread: &ThreadId) -> bool {
        self.markers.contains(thread)
    }

    fn scrape_count_text(&self, thread: &ThreadId) -> Option<String> {
        self.count_text.get(thread).cloned()
    }

    fn render_count(&mut self, thread: &ThreadId, value: u64, cue: Option<CountCue>) {
        self.renders.push((thread.clone(), value, cue));
    }

    fn request_remote_count(&mut self, ticket: FetchTicket) {
        self.fetches.push(ticket);
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        self.notices.push((level, message.to_string()));
    }
}

/// A configuration that passes validation.
pub fn config() -> Config {
    let mut config = Config::with_defaults();
    config.embed.repo = "octo/blog".to_string();
    config.embed.repo_id = "R_kgDOtest".to_string();
    config.embed.category = "Thoughts".to_string();
    config.embed.category_id = "DIC_kwDOtest".to_string();
    config
}

pub type TestEngine = CommentSubsystem<FakeHost>;

/// An engine over a fresh fake page, plus a handle on its storage.
pub fn engine(ids: &[&str]) -> (TestEngine, MemoryStorage) {
    engine_with(ids, config(), MemoryStorage::new())
}

pub fn engine_with(ids: &[&str], config: Config, storage: MemoryStorage) -> (TestEngine, MemoryStorage) {
    let engine = CommentSubsystem::new(config, FakeHost::with_threads(ids), Box::new(storage.clone()));
    (engine, storage)
}

/// Runs every task due within the next `ms` milliseconds.
pub fn advance(engine: &mut TestEngine, ms: u64) {
    let target = engine.host().elapsed_ms() + ms;
    while let Some(task) = engine.host_mut().pop_due(target) {
        engine.on_task(task);
    }
    engine.host_mut().set_elapsed(target);
}

/// Answers every outstanding remote query with `result`.
pub fn answer_fetches(engine: &mut TestEngine, result: &Result<RemoteCount, RemoteFetchError>) -> usize {
    let tickets = engine.host_mut().take_fetches();
    let answered = tickets.len();
    for ticket in tickets {
        engine.on_remote_result(ticket.id, result.clone());
    }
    answered
}

/// Opens `thread` and lets the widget load and render.
pub fn open_ready(engine: &mut TestEngine, id: &str) {
    let thread = ThreadId::new(id);
    engine.open(&thread);
    let attempt = engine
        .host()
        .last_mount(&thread)
        .map(|request| request.attempt)
        .unwrap_or_default();
    engine.host_mut().markers.insert(thread.clone());
    engine.on_widget_event(&thread, attempt, super::host::EmbedEvent::Loaded);
}
