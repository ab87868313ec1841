//! Discussion listings over `reqwest`, for the authoritative count query.

use async_trait::async_trait;
use once_cell::unsync::OnceCell;
use reqwest::{Client, RequestBuilder};
use shared::config::{Config, ConfigError, RemoteConfig, RemoteQueryForm};
use shared::engine::remote::{decode_graphql, decode_rest};
use shared::engine::{DiscussionSource, RemoteFetchError};
use shared::models::DiscussionSummary;
use shared::models::discussions::GraphqlRequest;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

thread_local! {
    static SHARED_CLIENT: OnceCell<Client> = OnceCell::new();
}

fn shared_http_client() -> Client {
    SHARED_CLIENT.with(|cell| cell.get_or_init(Client::new).clone())
}

/// Lists the discussions of the configured repository and category.
#[derive(Clone, Debug)]
pub struct DiscussionsClient {
    client: Client,
    remote: RemoteConfig,
    owner: String,
    name: String,
    category_id: String,
}

impl DiscussionsClient {
    /// A client for the repository and category in `config`.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let (owner, name) = config.embed.owner_and_name()?;
        Ok(Self {
            client: shared_http_client(),
            remote: config.remote.clone(),
            owner: owner.to_string(),
            name: name.to_string(),
            category_id: config.embed.category_id.clone(),
        })
    }

    fn rest_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/discussions?per_page=100",
            self.remote.rest_url.trim_end_matches('/'),
            self.owner,
            self.name
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.remote.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, RemoteFetchError> {
        let response = self
            .authorize(request)
            .header("Accept", GITHUB_ACCEPT)
            .send()
            .await
            .map_err(|error| RemoteFetchError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteFetchError::Status {
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|error| RemoteFetchError::Transport(error.to_string()))
    }
}

#[async_trait(?Send)]
impl DiscussionSource for DiscussionsClient {
    async fn list_discussions(&self) -> Result<Vec<DiscussionSummary>, RemoteFetchError> {
        match self.remote.form {
            RemoteQueryForm::Graphql => {
                let query = GraphqlRequest::discussions(&self.owner, &self.name, &self.category_id);
                let body = self
                    .send(self.client.post(&self.remote.graphql_url).json(&query))
                    .await?;
                decode_graphql(&body)
            }
            RemoteQueryForm::Rest => {
                let body = self.send(self.client.get(self.rest_url())).await?;
                decode_rest(&body, &self.category_id)
            }
        }
    }
}
