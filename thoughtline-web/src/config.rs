//! Page configuration
//!
//! The engine settings come from the page itself: a JSON document in
//! `<script id="thoughtline-config" type="application/json">`, or the legacy
//! `window.GISCUS_CONFIG` object. Build-time environment variables fill in
//! what the page leaves out.

use serde::Deserialize;
use shared::config::{Config, ConfigError};
use wasm_bindgen::JsValue;
use web_sys::Window;

const CONFIG_ELEMENT_ID: &str = "thoughtline-config";
const LEGACY_GLOBAL: &str = "GISCUS_CONFIG";

/// Text of the comment count labels. `{count}` is replaced by the value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountLabels {
    /// Label for no comments.
    pub zero: String,
    /// Label for exactly one comment.
    pub one: String,
    /// Label for two or more.
    pub many: String,
}

impl Default for CountLabels {
    fn default() -> Self {
        Self {
            zero: "评论".to_string(),
            one: "1条评论".to_string(),
            many: "{count}条评论".to_string(),
        }
    }
}

impl CountLabels {
    /// Label text for `count`.
    pub fn render(&self, count: u64) -> String {
        let template = match count {
            0 => &self.zero,
            1 => &self.one,
            _ => &self.many,
        };
        template.replace("{count}", &count.to_string())
    }
}

/// Everything the browser binding is configured with.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Engine configuration.
    pub core: Config,
    /// Count label texts.
    pub labels: CountLabels,
}

impl WebConfig {
    /// Parses a page configuration document and applies build overrides.
    ///
    /// A top-level `labels` object configures [`CountLabels`]; the rest of the
    /// document is handed to [`Config::from_json`].
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut document: serde_json::Value = serde_json::from_str(raw)?;
        let labels = match document.as_object_mut().and_then(|map| map.remove("labels")) {
            Some(labels) => serde_json::from_value(labels)?,
            None => CountLabels::default(),
        };
        let mut core = Config::from_json(&document.to_string())?;
        apply_build_overrides(&mut core);
        core.validate().map_err(ConfigError::Invalid)?;
        Ok(Self { core, labels })
    }

    /// Reads the configuration of the current page.
    pub fn from_page(window: &Window) -> Result<Self, ConfigError> {
        let raw = page_document(window).ok_or_else(|| {
            ConfigError::Invalid(vec![format!(
                "no #{CONFIG_ELEMENT_ID} element and no window.{LEGACY_GLOBAL}"
            )])
        })?;
        Self::parse(&raw)
    }
}

fn page_document(window: &Window) -> Option<String> {
    let embedded = window
        .document()
        .and_then(|document| document.get_element_by_id(CONFIG_ELEMENT_ID))
        .and_then(|element| element.text_content())
        .filter(|text| !text.trim().is_empty());
    if embedded.is_some() {
        return embedded;
    }

    let legacy = js_sys::Reflect::get(window, &JsValue::from_str(LEGACY_GLOBAL)).ok()?;
    if legacy.is_undefined() || legacy.is_null() {
        return None;
    }
    js_sys::JSON::stringify(&legacy).ok()?.as_string()
}

fn apply_build_overrides(config: &mut Config) {
    if config.remote.token.is_none() {
        config.remote.token = option_env!("THOUGHTLINE_GITHUB_TOKEN")
            .filter(|token| !token.is_empty())
            .map(str::to_string);
    }
    if let Some(url) = option_env!("THOUGHTLINE_GRAPHQL_URL").filter(|url| !url.is_empty()) {
        config.remote.graphql_url = url.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "repo": "octo/blog",
        "repoId": "R_1",
        "category": "Thoughts",
        "categoryId": "DIC_1",
        "labels": {"zero": "Comment", "one": "1 comment", "many": "{count} comments"}
    }"#;

    #[test]
    fn test_labels_pick_plural_form() {
        let labels = CountLabels::default();
        assert_eq!(labels.render(0), "评论");
        assert_eq!(labels.render(1), "1条评论");
        assert_eq!(labels.render(12), "12条评论");
    }

    #[test]
    fn test_flat_page_config_with_labels() {
        let config = WebConfig::parse(PAGE).unwrap();
        assert_eq!(config.core.embed.repo, "octo/blog");
        assert_eq!(config.core.embed.category_id, "DIC_1");
        assert_eq!(config.labels.render(3), "3 comments");
    }

    #[test]
    fn test_invalid_page_config_is_rejected() {
        let error = WebConfig::parse(r#"{"repo": "not-a-repo"}"#).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));
        assert!(WebConfig::parse("not json").is_err());
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_missing_page_config_is_reported() {
        let window = web_sys::window().unwrap();
        assert!(WebConfig::from_page(&window).is_err());
    }
}
