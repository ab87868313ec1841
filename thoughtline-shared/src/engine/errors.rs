//! Error types of the comment engine.

use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::models::{EmbedFailure, ThreadId};

/// Failures of the comment subsystem. None of them reach the page except the
/// terminal embed failures, which are turned into a panel notice.
#[derive(Debug, Error)]
pub enum CommentError {
    /// The page has no panel markup for the thread.
    #[error("No comment container rendered for thread '{thread}'")]
    ContainerMissing {
        /// Thread that was asked for.
        thread: ThreadId,
    },

    /// The widget script never loaded.
    #[error("Comments for '{thread}' did not load within {timeout_ms} ms")]
    EmbedTimeout {
        /// Thread of the panel.
        thread: ThreadId,
        /// Load timeout that elapsed.
        timeout_ms: u64,
    },

    /// The widget script raised an error event.
    #[error("Comments for '{thread}' failed to load")]
    EmbedError {
        /// Thread of the panel.
        thread: ThreadId,
    },

    /// The widget loaded but its content marker never appeared.
    #[error("Comments for '{thread}' loaded but never rendered")]
    NotReady {
        /// Thread of the panel.
        thread: ThreadId,
    },

    /// A remote count query failed.
    #[error(transparent)]
    Remote(#[from] RemoteFetchError),

    /// The count cache failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CommentError {
    /// Maps an embed failure onto the error reported for it.
    #[must_use]
    pub fn from_failure(thread: &ThreadId, failure: EmbedFailure, config: &EngineConfig) -> Self {
        let thread = thread.clone();
        match failure {
            EmbedFailure::Timeout => Self::EmbedTimeout {
                thread,
                timeout_ms: config.load_timeout_ms,
            },
            EmbedFailure::LoadError => Self::EmbedError { thread },
            EmbedFailure::NotReady => Self::NotReady { thread },
        }
    }
}

/// Why an authoritative count query failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteFetchError {
    /// The request never got an answer.
    #[error("Request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("Discussion service answered with status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The body was not a discussion listing.
    #[error("Could not decode discussion listing: {0}")]
    Decode(String),

    /// The GraphQL endpoint reported errors and no data.
    #[error("Discussion query rejected: {}", .0.join("; "))]
    Graphql(Vec<String>),
}

impl RemoteFetchError {
    /// Transport errors, rate limiting and server errors are worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Graphql(_) => false,
        }
    }
}

/// Failures of the persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend cannot be reached at all.
    #[error("Storage is unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected a write, e.g. over quota.
    #[error("Failed to write '{key}': {reason}")]
    Write {
        /// Key being written.
        key: String,
        /// Backend's explanation.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures() {
        assert!(RemoteFetchError::Transport("offline".into()).is_transient());
        assert!(RemoteFetchError::Status { status: 502 }.is_transient());
        assert!(RemoteFetchError::Status { status: 429 }.is_transient());
        assert!(!RemoteFetchError::Status { status: 401 }.is_transient());
        assert!(!RemoteFetchError::Graphql(vec!["Bad credentials".into()]).is_transient());
    }

    #[test]
    fn failure_messages_name_the_thread() {
        let config = EngineConfig::default();
        let thread = ThreadId::new("t1");
        let error = CommentError::from_failure(&thread, EmbedFailure::Timeout, &config);
        assert_eq!(
            error.to_string(),
            "Comments for 't1' did not load within 15000 ms"
        );
        let error = CommentError::from_failure(&thread, EmbedFailure::NotReady, &config);
        assert!(matches!(error, CommentError::NotReady { .. }));
    }

    #[test]
    fn graphql_errors_are_joined() {
        let error = RemoteFetchError::Graphql(vec!["a".into(), "b".into()]);
        assert_eq!(error.to_string(), "Discussion query rejected: a; b");
    }
}
