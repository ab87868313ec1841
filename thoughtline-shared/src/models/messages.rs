//! Cross-frame messages posted by the embedded discussion widget.
//!
//! Payloads arrive untyped and in several envelope conventions. They are
//! parsed here, once, into [`WidgetMessage`]; anything that does not match a
//! known shape is dropped.

use serde::Deserialize;

use super::signals::SubmissionTrigger;

/// Closed set of widget messages the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetMessage {
    /// Discussion metadata carrying the current comment count.
    Discussion {
        /// Comments and replies in the discussion.
        total_comment_count: u64,
    },
    /// A top-level comment was created from inside the widget.
    CommentCreated {
        /// Count after the comment, when the widget reports it.
        total_comment_count: Option<u64>,
    },
    /// A reply was created from inside the widget.
    ReplyCreated {
        /// Count after the reply, when the widget reports it.
        total_comment_count: Option<u64>,
    },
    /// The widget reported an error of its own.
    WidgetError {
        /// Error text as reported.
        message: String,
    },
}

impl WidgetMessage {
    /// Parses a serialized message payload.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str::<Envelope>(raw)
            .ok()
            .and_then(Envelope::into_message)
    }

    /// Parses an already-decoded message payload.
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        serde_json::from_value::<Envelope>(value)
            .ok()
            .and_then(Envelope::into_message)
    }

    /// Count carried by the message, if any.
    #[must_use]
    pub const fn observed_count(&self) -> Option<u64> {
        match self {
            Self::Discussion {
                total_comment_count,
            } => Some(*total_comment_count),
            Self::CommentCreated {
                total_comment_count,
            }
            | Self::ReplyCreated {
                total_comment_count,
            } => *total_comment_count,
            Self::WidgetError { .. } => None,
        }
    }

    /// Submission trigger represented by the message, if any.
    #[must_use]
    pub const fn submission(&self) -> Option<SubmissionTrigger> {
        match self {
            Self::CommentCreated { .. } => Some(SubmissionTrigger::CommentCreated),
            Self::ReplyCreated { .. } => Some(SubmissionTrigger::ReplyCreated),
            Self::Discussion { .. } | Self::WidgetError { .. } => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Giscus {
        giscus: GiscusBody,
    },
    Typed {
        #[serde(rename = "type")]
        event: EventName,
        #[serde(default)]
        payload: Option<EventPayload>,
    },
    Subject {
        subject: EventName,
        #[serde(default)]
        payload: Option<EventPayload>,
    },
}

impl Envelope {
    fn into_message(self) -> Option<WidgetMessage> {
        match self {
            Self::Giscus { giscus } => giscus.into_message(),
            Self::Typed { event, payload } | Self::Subject {
                subject: event,
                payload,
            } => event.into_message(payload.unwrap_or_default()),
        }
    }
}

#[derive(Deserialize)]
struct GiscusBody {
    #[serde(default)]
    discussion: Option<DiscussionMeta>,
    #[serde(default)]
    error: Option<String>,
}

impl GiscusBody {
    fn into_message(self) -> Option<WidgetMessage> {
        if let Some(message) = self.error {
            return Some(WidgetMessage::WidgetError { message });
        }
        self.discussion
            .and_then(|meta| meta.total_comment_count)
            .map(|total_comment_count| WidgetMessage::Discussion {
                total_comment_count,
            })
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DiscussionMeta {
    #[serde(default, alias = "total_comment_count")]
    total_comment_count: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    #[serde(default, alias = "total_comment_count", alias = "count")]
    total_comment_count: Option<u64>,
    #[serde(default)]
    discussion: Option<DiscussionMeta>,
}

impl EventPayload {
    fn count(self) -> Option<u64> {
        self.total_comment_count
            .or_else(|| self.discussion.and_then(|meta| meta.total_comment_count))
    }
}

#[derive(Deserialize, Clone, Copy)]
enum EventName {
    #[serde(
        rename = "discussion",
        alias = "discussion-updated",
        alias = "discussion.updated",
        alias = "metadata"
    )]
    Discussion,
    #[serde(
        rename = "comment-created",
        alias = "comment_created",
        alias = "comment.created",
        alias = "new-comment"
    )]
    CommentCreated,
    #[serde(
        rename = "reply-created",
        alias = "reply_created",
        alias = "reply.created",
        alias = "new-reply"
    )]
    ReplyCreated,
    #[serde(rename = "error")]
    Error,
}

impl EventName {
    fn into_message(self, payload: EventPayload) -> Option<WidgetMessage> {
        match self {
            Self::Discussion => payload
                .count()
                .map(|total_comment_count| WidgetMessage::Discussion {
                    total_comment_count,
                }),
            Self::CommentCreated => Some(WidgetMessage::CommentCreated {
                total_comment_count: payload.count(),
            }),
            Self::ReplyCreated => Some(WidgetMessage::ReplyCreated {
                total_comment_count: payload.count(),
            }),
            Self::Error => Some(WidgetMessage::WidgetError {
                message: "widget reported an error".to_string(),
            }),
        }
    }
}
