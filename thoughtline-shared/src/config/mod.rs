//! # Configuration
//!
//! Page-level configuration for the comment subsystem: the giscus embed, the
//! engine timings, the remote count query, and logging.

pub mod embed;
pub mod engine;

pub use embed::EmbedConfig;
pub use engine::EngineConfig;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for [`Config`].
    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// `repo` is not of the form `owner/name`.
    #[error("Invalid repository '{repo}': expected owner/name")]
    InvalidRepo {
        /// The rejected value.
        repo: String,
    },

    /// One or more settings failed validation.
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Which listing the remote count query uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteQueryForm {
    /// `repository.discussions` through the GraphQL endpoint.
    #[default]
    Graphql,
    /// The REST discussions listing.
    Rest,
}

/// Settings of the authoritative count query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    /// When false no remote query is ever issued.
    pub enabled: bool,
    /// Listing used for the query.
    pub form: RemoteQueryForm,
    /// GraphQL endpoint.
    pub graphql_url: String,
    /// Base URL of the REST API.
    pub rest_url: String,
    /// Optional token; anonymous GraphQL calls are rejected by GitHub.
    pub token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            form: RemoteQueryForm::Graphql,
            graphql_url: "https://api.github.com/graphql".to_string(),
            rest_url: "https://api.github.com".to_string(),
            token: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// The complete configuration of the comment subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Widget embed settings.
    pub embed: EmbedConfig,
    /// Engine timings and limits.
    pub engine: EngineConfig,
    /// Remote count query.
    pub remote: RemoteConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Parses a configuration document.
    ///
    /// Accepts either the nested [`Config`] layout or a flat giscus object
    /// (the legacy `GISCUS_CONFIG` shape), which becomes the `embed` section.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] if the document does not deserialize.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let is_flat = value.get("embed").is_none() && value.get("repo").is_some();
        if is_flat {
            Ok(Self {
                embed: serde_json::from_value(value)?,
                ..Self::default()
            })
        } else {
            Ok(serde_json::from_value(value)?)
        }
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn load(raw: &str) -> Result<Self, ConfigError> {
        let config = Self::from_json(raw)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Validate the complete configuration.
    ///
    /// # Errors
    /// Returns every problem found, one message each.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(error) = self.embed.owner_and_name() {
            errors.push(error.to_string());
        }
        for (name, value) in [
            ("repoId", &self.embed.repo_id),
            ("categoryId", &self.embed.category_id),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }
        if Url::parse(&self.embed.origin).is_err() {
            errors.push(format!("origin '{}' is not a valid URL", self.embed.origin));
        }
        errors.extend(self.engine.problems());
        if self.remote.enabled {
            let endpoint = match self.remote.form {
                RemoteQueryForm::Graphql => &self.remote.graphql_url,
                RemoteQueryForm::Rest => &self.remote.rest_url,
            };
            if Url::parse(endpoint).is_err() {
                errors.push(format!("remote endpoint '{endpoint}' is not a valid URL"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The provider origin in its canonical serialization.
    #[must_use]
    pub fn widget_origin(&self) -> String {
        Url::parse(&self.embed.origin).map_or_else(
            |_| self.embed.origin.clone(),
            |url| url.origin().ascii_serialization(),
        )
    }
}
