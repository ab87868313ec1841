//! Submission signals seen inside a mounted region.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// What made the engine believe a comment was just posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubmissionTrigger {
    /// A form inside the mounted region was submitted.
    FormSubmit,
    /// A submit button or control was clicked.
    SubmitControl,
    /// Ctrl/Cmd+Enter was pressed in the region.
    KeyboardShortcut,
    /// The widget reported a new top-level comment.
    CommentCreated,
    /// The widget reported a new reply.
    ReplyCreated,
}

impl SubmissionTrigger {
    /// Whether the trigger was reported by the widget's messages rather than
    /// seen in the host page's DOM.
    #[must_use]
    pub const fn from_widget(self) -> bool {
        matches!(self, Self::CommentCreated | Self::ReplyCreated)
    }
}

/// Event observed by a thread's DOM watcher inside its mounted region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "trigger", rename_all = "snake_case")]
pub enum DomSignal {
    /// Child nodes of the mounted region changed.
    Mutated,
    /// A form submit, submit click, or Ctrl/Cmd+Enter inside the region.
    Submission(SubmissionTrigger),
}
