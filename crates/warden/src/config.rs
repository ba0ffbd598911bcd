//! Gateway configuration.

use serde::{Deserialize, Deserializer, Serialize};

/// Configuration for the [`Gateway`](crate::Gateway).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Disable every access filter and authorization check.
    pub bypass_permission_checks: bool,

    /// Collections that never get history records. Accepts a list or the
    /// comma-separated form, e.g. `"audit, jslog"`.
    #[serde(deserialize_with = "collection_list")]
    pub skip_history_collections: Vec<String>,

    /// Limit applied to queries that do not set one.
    pub default_query_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bypass_permission_checks: false,
            skip_history_collections: Vec::new(),
            default_query_limit: 500,
        }
    }
}

impl GatewayConfig {
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass_permission_checks = bypass;
        self
    }

    /// Set the skip list from its comma-separated form.
    pub fn with_skip_history(mut self, collections: &str) -> Self {
        self.skip_history_collections = parse_collection_list(collections);
        self
    }

    pub fn with_default_query_limit(mut self, limit: usize) -> Self {
        self.default_query_limit = limit;
        self
    }

    /// Load from JSON.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Split `"a, b,,c"` into `["a", "b", "c"]`.
pub fn parse_collection_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn collection_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Form {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Form::deserialize(deserializer)? {
        Form::Text(text) => parse_collection_list(&text),
        Form::List(names) => names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert!(!config.bypass_permission_checks);
        assert!(config.skip_history_collections.is_empty());
        assert_eq!(config.default_query_limit, 500);
    }

    #[test]
    fn test_skip_list_forms() {
        let text = GatewayConfig::from_json(r#"{"skip_history_collections": " audit, jslog ,,"}"#)
            .unwrap();
        assert_eq!(text.skip_history_collections, vec!["audit", "jslog"]);
        assert_eq!(text.default_query_limit, 500);

        let list = GatewayConfig::from_json(r#"{"skip_history_collections": ["audit", " "]}"#)
            .unwrap();
        assert_eq!(list.skip_history_collections, vec!["audit"]);

        let built = GatewayConfig::default().with_skip_history("a,b");
        assert_eq!(built.skip_history_collections, vec!["a", "b"]);
    }

    #[test]
    fn test_round_trip() {
        let config = GatewayConfig::default()
            .with_bypass(true)
            .with_skip_history("audit")
            .with_default_query_limit(10);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(GatewayConfig::from_json(&json).unwrap(), config);
    }
}
