//! Settings for the embedded giscus widget.

use serde::{Deserialize, Deserializer, Serialize};

use super::ConfigError;

/// Embed provider settings, read from the page's giscus configuration.
///
/// Field names follow the camelCase keys of the `GISCUS_CONFIG` object so the
/// same JSON can be handed over unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbedConfig {
    /// Repository in `owner/name` form.
    pub repo: String,
    /// GraphQL node id of the repository.
    pub repo_id: String,
    /// Discussion category name.
    pub category: String,
    /// GraphQL node id of the category; the REST listing is filtered by it.
    pub category_id: String,
    /// Strict title matching on the provider side.
    #[serde(deserialize_with = "flag")]
    pub strict: bool,
    /// Show reactions on the main post.
    #[serde(deserialize_with = "flag")]
    pub reactions_enabled: bool,
    /// `top` or `bottom`.
    pub input_position: String,
    /// Widget language.
    pub lang: String,
    /// Origin every widget message must come from.
    pub origin: String,
    /// Script injected into the panel container.
    pub client_script: String,
    /// Selector of the element whose presence means the widget rendered.
    pub ready_selector: String,
    /// Selectors scraped for a same-origin comment count, tried in order.
    pub count_selectors: Vec<String>,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            repo_id: String::new(),
            category: String::new(),
            category_id: String::new(),
            strict: false,
            reactions_enabled: true,
            input_position: "bottom".to_string(),
            lang: "zh-CN".to_string(),
            origin: "https://giscus.app".to_string(),
            client_script: "https://giscus.app/client.js".to_string(),
            ready_selector: ".giscus-frame".to_string(),
            count_selectors: vec![
                ".gsc-comments-count".to_string(),
                "[data-comment-count]".to_string(),
            ],
        }
    }
}

impl EmbedConfig {
    /// Splits `repo` into owner and name.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidRepo`] unless `repo` is exactly `owner/name`.
    pub fn owner_and_name(&self) -> Result<(&str, &str), ConfigError> {
        match self.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((owner, name))
            }
            _ => Err(ConfigError::InvalidRepo {
                repo: self.repo.clone(),
            }),
        }
    }

    /// Attributes placed on the injected script element for one thread.
    #[must_use]
    pub fn widget_attributes(&self, term: &str, theme: &str) -> Vec<(&'static str, String)> {
        let flag = |value: bool| if value { "1" } else { "0" }.to_string();
        vec![
            ("src", self.client_script.clone()),
            ("data-repo", self.repo.clone()),
            ("data-repo-id", self.repo_id.clone()),
            ("data-category", self.category.clone()),
            ("data-category-id", self.category_id.clone()),
            ("data-mapping", "specific".to_string()),
            ("data-term", term.to_string()),
            ("data-title", term.to_string()),
            ("data-strict", flag(self.strict)),
            ("data-reactions-enabled", flag(self.reactions_enabled)),
            ("data-emit-metadata", "1".to_string()),
            ("data-input-position", self.input_position.clone()),
            ("data-theme", theme.to_string()),
            ("data-lang", self.lang.clone()),
            ("data-loading", "eager".to_string()),
            ("crossorigin", "anonymous".to_string()),
        ]
    }
}

/// Accepts `true`/`false` as well as the `"1"`/`"0"` strings giscus uses.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
        Number(u8),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Text(text) => matches!(text.trim(), "1" | "true" | "yes"),
        Flag::Number(value) => value != 0,
    })
}
