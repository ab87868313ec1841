//! The seam between the engine and the page.
//!
//! The engine never touches the DOM, timers or the network itself. It asks a
//! [`Host`] to do so, and the host calls back into
//! [`CommentSubsystem`](super::CommentSubsystem) when something happens.
//! Anything the host hands back that must be cancellable (a timer, an event
//! listener, a DOM observer) is a [`Host::Guard`]: dropping the guard cancels
//! it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::signals::SignalKind;
use crate::models::{CountCue, EmbedFailure, ThreadId};

/// Deferred work the engine asks the host to schedule.
///
/// Every variant names its thread, and variants that belong to a mount attempt
/// or a submission cycle carry that number so the engine can ignore tasks that
/// outlived their owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// The load timer of a mount attempt expired.
    EmbedTimeout {
        /// Owning thread.
        thread: ThreadId,
        /// Mount attempt the timer belongs to.
        attempt: u32,
    },
    /// Check once more whether the widget rendered its content.
    ReadinessPoll {
        /// Owning thread.
        thread: ThreadId,
        /// Mount attempt the check belongs to.
        attempt: u32,
    },
    /// Backoff after a failed attempt elapsed; mount again.
    RetryMount {
        /// Owning thread.
        thread: ThreadId,
        /// Attempt that failed.
        attempt: u32,
    },
    /// Scroll grace delay of an opening panel elapsed.
    ScrollIntoView {
        /// Owning thread.
        thread: ThreadId,
    },
    /// Observed follow-up of a submission cycle.
    Rescrape {
        /// Owning thread.
        thread: ThreadId,
        /// Submission cycle.
        cycle: u64,
    },
    /// Remote confirmation of a submission cycle.
    RemoteConfirm {
        /// Owning thread.
        thread: ThreadId,
        /// Submission cycle.
        cycle: u64,
    },
    /// Periodic reconciliation tick of an open panel.
    Reconcile {
        /// Owning thread.
        thread: ThreadId,
    },
    /// Backoff after a failed remote query elapsed.
    RemoteRetry {
        /// Owning thread.
        thread: ThreadId,
        /// Retry number about to run.
        attempt: u32,
    },
}

impl Task {
    /// Thread the task belongs to.
    #[must_use]
    pub const fn thread(&self) -> &ThreadId {
        match self {
            Self::EmbedTimeout { thread, .. }
            | Self::ReadinessPoll { thread, .. }
            | Self::RetryMount { thread, .. }
            | Self::ScrollIntoView { thread }
            | Self::Rescrape { thread, .. }
            | Self::RemoteConfirm { thread, .. }
            | Self::Reconcile { thread }
            | Self::RemoteRetry { thread, .. } => thread,
        }
    }
}

/// Lifecycle events of the injected widget script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmbedEvent {
    /// The script's `load` event.
    Loaded,
    /// The script's `error` event.
    LoadFailed,
}

/// Why a remote count query was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FetchReason {
    /// First query after the widget became ready.
    Initial,
    /// Confirmation of a submission cycle.
    Confirmation {
        /// Cycle being confirmed.
        cycle: u64,
    },
    /// Retry of a failed query.
    Retry {
        /// Retry number.
        attempt: u32,
    },
}

/// A remote count query the host should run.
///
/// The host answers with
/// [`CommentSubsystem::on_remote_result`](super::CommentSubsystem::on_remote_result)
/// carrying the same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchTicket {
    /// Ticket number, unique for the engine's lifetime.
    pub id: u64,
    /// Thread whose count is asked for.
    pub thread: ThreadId,
    /// Discussion identifier the listing is matched against.
    pub identifier: String,
    /// Why the query was issued.
    pub reason: FetchReason,
}

/// Everything the host needs to inject one widget instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRequest {
    /// Thread whose panel receives the widget.
    pub thread: ThreadId,
    /// Mount attempt number; script events carry it back.
    pub attempt: u32,
    /// Discussion term the widget maps to.
    pub term: String,
    /// Attributes of the injected script element, in order.
    pub attributes: Vec<(String, String)>,
}

/// Placeholder shown in a panel while the widget is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "placeholder", rename_all = "snake_case")]
pub enum Placeholder {
    /// The widget is loading.
    Loading,
    /// Shown while waiting to re-mount; `retry` is the upcoming retry number.
    Retrying {
        /// Upcoming retry number.
        retry: u32,
        /// Retries allowed in total.
        max_retries: u32,
    },
    /// Terminal failure with retry/close affordances.
    Failed {
        /// Why the last attempt failed.
        failure: EmbedFailure,
    },
}

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Informational.
    Info,
    /// Something degraded.
    Warning,
    /// Something failed.
    Error,
}

/// Services the page provides to the engine.
pub trait Host {
    /// Cancels the timer or listener it was returned for when dropped.
    type Guard;

    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Path of the current page, the prefix of every discussion identifier.
    fn page_path(&self) -> String;

    /// Current color theme handed to the widget.
    fn theme(&self) -> String;

    /// Runs `task` once after `delay`.
    fn set_timeout(&mut self, delay: Duration, task: Task) -> Self::Guard;

    /// Runs `task` every `period`.
    fn set_interval(&mut self, period: Duration, task: Task) -> Self::Guard;

    /// Starts a DOM-backed observation channel for a thread.
    ///
    /// Only [`SignalKind::Message`] and [`SignalKind::Mutation`] are requested
    /// this way; intervals go through [`Host::set_interval`]. Returns `None`
    /// when the channel cannot be attached.
    fn listen(&mut self, thread: &ThreadId, kind: SignalKind) -> Option<Self::Guard>;

    /// Whether the page rendered the panel markup of a thread.
    fn has_container(&self, thread: &ThreadId) -> bool;

    /// Shows or hides a thread's panel.
    fn set_container_visible(&mut self, thread: &ThreadId, visible: bool);

    /// Marks a thread's open triggers as active or not.
    fn set_trigger_active(&mut self, thread: &ThreadId, active: bool);

    /// Scrolls a thread's panel into view.
    fn scroll_into_view(&mut self, thread: &ThreadId);

    /// Injects the widget. Returns `false` if nothing could be injected.
    fn mount_widget(&mut self, request: &MountRequest) -> bool;

    /// Replaces the placeholder of a panel; `None` removes it.
    fn show_placeholder(&mut self, thread: &ThreadId, placeholder: Option<Placeholder>);

    /// Asks the mounted widget of a thread to switch to `theme`.
    ///
    /// Returns `false` when the widget has no frame to talk to yet.
    fn set_widget_theme(&mut self, thread: &ThreadId, theme: &str) -> bool;

    /// Removes the injected widget and everything it rendered.
    fn clear_widget(&mut self, thread: &ThreadId);

    /// Whether the widget's content marker is present in the panel.
    fn has_content_marker(&self, thread: &ThreadId) -> bool;

    /// Text of the first same-origin count element inside the panel.
    fn scrape_count_text(&self, thread: &ThreadId) -> Option<String>;

    /// Shows `value` on every count label of a thread.
    fn render_count(&mut self, thread: &ThreadId, value: u64, cue: Option<CountCue>);

    /// Runs a remote count query in the background.
    fn request_remote_count(&mut self, ticket: FetchTicket);

    /// Shows a transient notice to the reader.
    fn notify(&mut self, level: NoticeLevel, message: &str);
}
