//! Data types shared by the engine and its hosts.

pub mod count;
pub mod discussions;
pub mod messages;
pub mod signals;
pub mod thread;

pub use count::{Candidate, CountCue, CountRecord, CountSource};
pub use discussions::{DiscussionSummary, RemoteCount};
pub use messages::WidgetMessage;
pub use signals::{DomSignal, SubmissionTrigger};
pub use thread::{
    EmbedFailure, PanelState, ThreadId, ThreadSnapshot, WidgetPhase, WidgetStatus,
    discussion_identifier,
};
