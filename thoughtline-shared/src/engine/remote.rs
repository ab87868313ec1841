//! The authoritative count query, independent of the HTTP client.
//!
//! Hosts implement [`DiscussionSource`] on top of whatever client they have
//! and answer a [`FetchTicket`] with [`fetch_count`]. Response bodies are
//! decoded here so both query forms share one set of rules.

use async_trait::async_trait;

use super::errors::RemoteFetchError;
use super::host::FetchTicket;
use crate::models::discussions::{GraphqlResponse, RestDiscussion, resolve_count, summarize_rest};
use crate::models::{DiscussionSummary, RemoteCount};

/// Lists the discussions of the configured category.
#[async_trait(?Send)]
pub trait DiscussionSource {
    /// Fetches and decodes the listing.
    ///
    /// # Errors
    /// Returns [`RemoteFetchError`] when the listing cannot be obtained.
    async fn list_discussions(&self) -> Result<Vec<DiscussionSummary>, RemoteFetchError>;
}

/// Resolves a ticket against the discussion listing.
///
/// # Errors
/// Propagates the listing failure.
pub async fn fetch_count<S>(source: &S, ticket: &FetchTicket) -> Result<RemoteCount, RemoteFetchError>
where
    S: DiscussionSource + ?Sized,
{
    let discussions = source.list_discussions().await?;
    Ok(resolve_count(&discussions, &ticket.identifier, &ticket.thread))
}

/// Decodes a GraphQL discussions response.
///
/// # Errors
/// [`RemoteFetchError::Decode`] for malformed bodies,
/// [`RemoteFetchError::Graphql`] when the service reports errors and no data.
pub fn decode_graphql(body: &str) -> Result<Vec<DiscussionSummary>, RemoteFetchError> {
    let response: GraphqlResponse =
        serde_json::from_str(body).map_err(|error| RemoteFetchError::Decode(error.to_string()))?;
    let messages = response.error_messages();
    match response.into_summaries() {
        Some(summaries) => Ok(summaries),
        None if !messages.is_empty() => Err(RemoteFetchError::Graphql(messages)),
        None => Err(RemoteFetchError::Decode(
            "response carries no repository".to_string(),
        )),
    }
}

/// Decodes a REST discussions listing, keeping one category.
///
/// # Errors
/// [`RemoteFetchError::Decode`] for malformed bodies.
pub fn decode_rest(body: &str, category_id: &str) -> Result<Vec<DiscussionSummary>, RemoteFetchError> {
    let entries: Vec<RestDiscussion> =
        serde_json::from_str(body).map_err(|error| RemoteFetchError::Decode(error.to_string()))?;
    Ok(summarize_rest(entries, category_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::host::FetchReason;
    use crate::models::ThreadId;
    use futures::executor::block_on;

    struct Canned(Result<Vec<DiscussionSummary>, RemoteFetchError>);

    #[async_trait(?Send)]
    impl DiscussionSource for Canned {
        async fn list_discussions(&self) -> Result<Vec<DiscussionSummary>, RemoteFetchError> {
            self.0.clone()
        }
    }

    fn ticket(thread: &str) -> FetchTicket {
        FetchTicket {
            id: 1,
            thread: ThreadId::new(thread),
            identifier: format!("/thoughts/#{thread}"),
            reason: FetchReason::Initial,
        }
    }

    #[test]
    fn resolves_ticket_against_listing() {
        let source = Canned(Ok(vec![DiscussionSummary {
            title: "/thoughts/#t1".into(),
            url: "https://github.com/octo/blog/discussions/3".into(),
            comment_count: 4,
        }]));
        assert_eq!(
            block_on(fetch_count(&source, &ticket("t1"))),
            Ok(RemoteCount::Found(4))
        );
        assert_eq!(
            block_on(fetch_count(&source, &ticket("t2"))),
            Ok(RemoteCount::NotFound)
        );
    }

    #[test]
    fn listing_failures_propagate() {
        let source = Canned(Err(RemoteFetchError::Status { status: 503 }));
        assert_eq!(
            block_on(fetch_count(&source, &ticket("t1"))),
            Err(RemoteFetchError::Status { status: 503 })
        );
    }

    #[test]
    fn graphql_errors_without_data_are_reported() {
        let body = r#"{"data":null,"errors":[{"message":"Bad credentials"}]}"#;
        assert_eq!(
            decode_graphql(body),
            Err(RemoteFetchError::Graphql(vec!["Bad credentials".into()]))
        );
        assert!(matches!(
            decode_graphql("<html>"),
            Err(RemoteFetchError::Decode(_))
        ));
        assert!(matches!(
            decode_graphql(r#"{"data":{"repository":null}}"#),
            Err(RemoteFetchError::Decode(_))
        ));
    }

    #[test]
    fn rest_listing_is_filtered() {
        let body = r#"[{"title":"/thoughts/#t1","html_url":"u","comments":2,"category":{"node_id":"C1"}}]"#;
        assert_eq!(decode_rest(body, "C1").unwrap().len(), 1);
        assert!(decode_rest(body, "C2").unwrap().is_empty());
    }
}
