//! Remote discussion listings and the policy for matching them to threads.
//!
//! Two query surfaces are supported: the GraphQL `repository.discussions`
//! connection and the REST discussions listing. Both are reduced to
//! [`DiscussionSummary`] before matching.

use serde::{Deserialize, Serialize};

use super::thread::ThreadId;

/// Page size requested from the discussion listing.
pub const DISCUSSIONS_PAGE_SIZE: u32 = 100;

/// GraphQL document for counting comments in one discussion category.
pub const DISCUSSIONS_QUERY: &str = "query($owner: String!, $name: String!, $categoryId: ID!, $first: Int!) {
  repository(owner: $owner, name: $name) {
    discussions(first: $first, categoryId: $categoryId) {
      nodes {
        title
        url
        comments {
          totalCount
        }
      }
    }
  }
}";

/// Outcome of a successful remote count query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCount {
    /// A discussion matched the thread and reported this many comments.
    Found(u64),
    /// No discussion matched; the thread's count is left untouched.
    NotFound,
}

/// A discussion reduced to the fields used for matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionSummary {
    /// Discussion title, normally the discussion identifier.
    pub title: String,
    /// Link to the discussion.
    pub url: String,
    /// Comments and replies.
    pub comment_count: u64,
}

impl DiscussionSummary {
    fn mentions(&self, needle: &str) -> bool {
        self.title.contains(needle) || self.url.contains(needle)
    }
}

/// Request body sent to the GraphQL endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphqlRequest {
    /// The query document.
    pub query: &'static str,
    /// Values bound to the query's variables.
    pub variables: GraphqlVariables,
}

/// Variables of [`DISCUSSIONS_QUERY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlVariables {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// Node id of the discussion category.
    pub category_id: String,
    /// Page size.
    pub first: u32,
}

impl GraphqlRequest {
    /// The discussions listing of one category.
    #[must_use]
    pub fn discussions(owner: &str, name: &str, category_id: &str) -> Self {
        Self {
            query: DISCUSSIONS_QUERY,
            variables: GraphqlVariables {
                owner: owner.to_string(),
                name: name.to_string(),
                category_id: category_id.to_string(),
                first: DISCUSSIONS_PAGE_SIZE,
            },
        }
    }
}

/// Body of a GraphQL answer.
#[derive(Debug, Deserialize)]
pub struct GraphqlResponse {
    /// Query result, absent on hard errors.
    #[serde(default)]
    pub data: Option<GraphqlData>,
    /// Errors reported by the endpoint.
    #[serde(default)]
    pub errors: Option<Vec<GraphqlError>>,
}

/// One GraphQL error entry.
#[derive(Debug, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error text.
    pub message: String,
}

/// `data` of a discussions answer.
#[derive(Debug, Deserialize)]
pub struct GraphqlData {
    /// `None` when the repository is not visible.
    pub repository: Option<GraphqlRepository>,
}

/// The queried repository.
#[derive(Debug, Deserialize)]
pub struct GraphqlRepository {
    /// The discussions connection.
    pub discussions: GraphqlConnection,
}

/// A page of discussions.
#[derive(Debug, Deserialize)]
pub struct GraphqlConnection {
    /// Discussions; inaccessible entries come back as `null`.
    #[serde(default)]
    pub nodes: Vec<Option<GraphqlDiscussion>>,
}

/// One discussion node.
#[derive(Debug, Deserialize)]
pub struct GraphqlDiscussion {
    /// Discussion title.
    pub title: String,
    /// Link to the discussion.
    #[serde(default)]
    pub url: String,
    /// Comment totals.
    pub comments: GraphqlTotal,
}

/// A `totalCount` wrapper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlTotal {
    /// Number of items.
    pub total_count: u64,
}

impl GraphqlResponse {
    /// Error messages reported alongside (or instead of) data.
    #[must_use]
    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .flatten()
            .map(|error| error.message.clone())
            .collect()
    }

    /// Flattens the discussion nodes; `None` when the repository is absent.
    #[must_use]
    pub fn into_summaries(self) -> Option<Vec<DiscussionSummary>> {
        let repository = self.data?.repository?;
        Some(
            repository
                .discussions
                .nodes
                .into_iter()
                .flatten()
                .map(|node| DiscussionSummary {
                    title: node.title,
                    url: node.url,
                    comment_count: node.comments.total_count,
                })
                .collect(),
        )
    }
}

/// One entry of the REST discussions listing.
#[derive(Debug, Deserialize)]
pub struct RestDiscussion {
    /// Discussion title.
    pub title: String,
    /// Link to the discussion.
    #[serde(default)]
    pub html_url: String,
    /// Comment total.
    #[serde(default)]
    pub comments: u64,
    /// Category the discussion is filed under.
    #[serde(default)]
    pub category: Option<RestCategory>,
}

/// Category of a REST discussion entry.
#[derive(Debug, Deserialize)]
pub struct RestCategory {
    /// GraphQL node id of the category.
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Keeps REST entries belonging to `category_id` and reduces them.
#[must_use]
pub fn summarize_rest(entries: Vec<RestDiscussion>, category_id: &str) -> Vec<DiscussionSummary> {
    entries
        .into_iter()
        .filter(|entry| {
            entry
                .category
                .as_ref()
                .and_then(|category| category.node_id.as_deref())
                .is_some_and(|node_id| node_id == category_id)
        })
        .map(|entry| DiscussionSummary {
            title: entry.title,
            url: entry.html_url,
            comment_count: entry.comments,
        })
        .collect()
}

/// Finds the discussion belonging to a thread.
///
/// Preference order: exact title equal to `identifier`, then title or URL
/// containing `identifier`, then title or URL containing the bare thread id.
/// Substring matches are not unique; the exact pass runs first so that a
/// thread whose id is a prefix of another's still resolves to its own
/// discussion when titles are intact.
#[must_use]
pub fn match_discussion<'a>(
    discussions: &'a [DiscussionSummary],
    identifier: &str,
    thread: &ThreadId,
) -> Option<&'a DiscussionSummary> {
    discussions
        .iter()
        .find(|d| d.title == identifier)
        .or_else(|| discussions.iter().find(|d| d.mentions(identifier)))
        .or_else(|| discussions.iter().find(|d| d.mentions(thread.as_str())))
}

/// Resolves a listing into a [`RemoteCount`] for one thread.
#[must_use]
pub fn resolve_count(
    discussions: &[DiscussionSummary],
    identifier: &str,
    thread: &ThreadId,
) -> RemoteCount {
    match_discussion(discussions, identifier, thread)
        .map_or(RemoteCount::NotFound, |d| RemoteCount::Found(d.comment_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(title: &str, count: u64) -> DiscussionSummary {
        DiscussionSummary {
            title: title.to_string(),
            url: format!("https://github.com/o/r/discussions/{count}"),
            comment_count: count,
        }
    }

    #[test]
    fn exact_title_wins_over_substring() {
        let listing = vec![summary("/thoughts/#t10", 7), summary("/thoughts/#t1", 2)];
        let thread = ThreadId::new("t1");
        assert_eq!(
            resolve_count(&listing, "/thoughts/#t1", &thread),
            RemoteCount::Found(2)
        );
    }

    #[test]
    fn falls_back_to_thread_id_substring() {
        let listing = vec![summary("Comments for t42", 5)];
        let thread = ThreadId::new("t42");
        assert_eq!(
            resolve_count(&listing, "/other/#t42", &thread),
            RemoteCount::Found(5)
        );
    }

    #[test]
    fn matches_on_url() {
        let listing = vec![DiscussionSummary {
            title: "untitled".into(),
            url: "https://example.test/thoughts/#t9".into(),
            comment_count: 4,
        }];
        assert_eq!(
            resolve_count(&listing, "/thoughts/#t9", &ThreadId::new("t9")),
            RemoteCount::Found(4)
        );
    }

    #[test]
    fn no_match_is_not_found() {
        let listing = vec![summary("/thoughts/#a", 1)];
        assert_eq!(
            resolve_count(&listing, "/thoughts/#zz", &ThreadId::new("zz")),
            RemoteCount::NotFound
        );
    }

    #[test]
    fn graphql_response_flattens_nodes() {
        let body = r#"{
            "data": {"repository": {"discussions": {"nodes": [
                {"title": "/p/#t1", "url": "https://x/1", "comments": {"totalCount": 3}},
                null
            ]}}}
        }"#;
        let response: GraphqlResponse = serde_json::from_str(body).unwrap();
        assert!(response.error_messages().is_empty());
        let summaries = response.into_summaries().unwrap();
        assert_eq!(summaries, vec![DiscussionSummary {
            title: "/p/#t1".into(),
            url: "https://x/1".into(),
            comment_count: 3,
        }]);
    }

    #[test]
    fn graphql_errors_are_collected() {
        let body = r#"{"data": null, "errors": [{"message": "Bad credentials"}]}"#;
        let response: GraphqlResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.error_messages(), vec!["Bad credentials".to_string()]);
        assert!(response.into_summaries().is_none());
    }

    #[test]
    fn graphql_request_uses_variables() {
        let request = GraphqlRequest::discussions("octo", "blog", "DIC_kw");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["variables"]["owner"], "octo");
        assert_eq!(json["variables"]["categoryId"], "DIC_kw");
        assert_eq!(json["variables"]["first"], 100);
        assert!(json["query"].as_str().unwrap().contains("totalCount"));
    }

    #[test]
    fn rest_listing_filters_category() {
        let body = r#"[
            {"title": "/p/#t1", "html_url": "https://x/1", "comments": 2, "category": {"node_id": "DIC_a"}},
            {"title": "/p/#t1", "html_url": "https://x/2", "comments": 8, "category": {"node_id": "DIC_b"}}
        ]"#;
        let entries: Vec<RestDiscussion> = serde_json::from_str(body).unwrap();
        let summaries = summarize_rest(entries, "DIC_a");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].comment_count, 2);
    }
}
