//! Thread identity, panel state and widget status.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display};

use super::count::CountRecord;

/// Identifier of one thought card's discussion unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Wraps a raw card identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Builds the discussion term that maps a thread 1:1 onto a remote discussion.
///
/// # Examples
/// ```
/// use shared::models::{ThreadId, discussion_identifier};
///
/// let id = discussion_identifier("/thoughts/", &ThreadId::new("t1"));
/// assert_eq!(id, "/thoughts/#t1");
/// ```
#[must_use]
pub fn discussion_identifier(page_path: &str, thread: &ThreadId) -> String {
    format!("{page_path}#{thread}")
}

/// Visibility state of a thread's discussion panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PanelState {
    /// Hidden, with no widget mounted.
    #[default]
    Closed,
    /// Visible while the widget loads.
    Loading,
    /// Visible with a ready widget.
    Open,
    /// Visible with a terminal failure and retry/close controls.
    Error,
}

impl PanelState {
    /// Loading and Open are the states covered by the single-open invariant.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Loading | Self::Open)
    }
}

/// Why a widget mount did not reach readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmbedFailure {
    /// The load event never arrived before the load timer fired.
    Timeout,
    /// The embed script reported an error event.
    LoadError,
    /// The script loaded but the content marker never appeared.
    NotReady,
}

impl EmbedFailure {
    /// Timeouts and load errors are retried; a missing marker is not.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::LoadError)
    }
}

/// Embedder state for a mounted widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum WidgetPhase {
    /// Script injected, load event pending.
    Loading,
    /// Script loaded, waiting for the content marker.
    Verifying,
    /// Content marker present.
    Ready,
    /// The attempt failed; `terminal` when no retry follows.
    Failed {
        /// Why the attempt failed.
        failure: EmbedFailure,
        /// No further attempt is scheduled.
        terminal: bool,
    },
}

/// Read-only view of a widget instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetStatus {
    /// Discussion term the widget maps to.
    pub term: String,
    /// Current phase.
    pub phase: WidgetPhase,
    /// Mount attempt number, starting at 1.
    pub attempt: u32,
    /// Automatic retries used so far.
    pub retry_count: u32,
    /// Readiness checks run for the current attempt.
    pub readiness_poll_count: u32,
}

/// Everything the engine knows about one thread, assembled on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    /// The thread.
    pub id: ThreadId,
    /// Panel visibility state.
    pub panel: PanelState,
    /// Displayed count, if any channel supplied one.
    pub count: Option<CountRecord>,
    /// Mounted widget, if any.
    pub widget: Option<WidgetStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_joins_path_and_thread() {
        let thread = ThreadId::from("2024-05-01-coffee");
        assert_eq!(
            discussion_identifier("/thoughts/", &thread),
            "/thoughts/#2024-05-01-coffee"
        );
    }

    #[test]
    fn panel_state_activity() {
        assert!(PanelState::Loading.is_active());
        assert!(PanelState::Open.is_active());
        assert!(!PanelState::Closed.is_active());
        assert!(!PanelState::Error.is_active());
        assert_eq!(PanelState::Open.to_string(), "open");
    }

    #[test]
    fn thread_id_serializes_transparently() {
        let json = serde_json::to_string(&ThreadId::new("t1")).unwrap();
        assert_eq!(json, "\"t1\"");
    }

    #[test]
    fn only_load_failures_retry() {
        assert!(EmbedFailure::Timeout.is_retryable());
        assert!(EmbedFailure::LoadError.is_retryable());
        assert!(!EmbedFailure::NotReady.is_retryable());
    }
}
