// Client model label → upstream Kiro model identifier

use std::sync::Arc;

use crate::modules::mapping_store::MappingStore;

/// Internal model ids used by the built-in fallback when no rule table is
/// bound. The rule table is the authoritative path; these cover the common
/// Claude families by substring.
pub const FALLBACK_SONNET_ID: &str = "CLAUDE_SONNET_4_5_20250929_V1_0";
pub const FALLBACK_OPUS_ID: &str = "CLAUDE_OPUS_4_1_20250805_V1_0";
pub const FALLBACK_HAIKU_ID: &str = "CLAUDE_HAIKU_4_5_20251001_V1_0";

/// Client-facing labels advertised when no rule table is bound.
const FALLBACK_LABELS: &[&str] = &[
    "claude-sonnet-4-5",
    "claude-opus-4-1",
    "claude-haiku-4-5",
];

pub struct ModelMapper {
    store: Option<Arc<MappingStore>>,
}

impl ModelMapper {
    /// Mapper with only the built-in substring fallback.
    pub fn new() -> Self {
        Self { store: None }
    }

    /// Mapper backed by a rule table; the fallback is not consulted.
    pub fn with_store(store: Arc<MappingStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Resolve a client model label. `None` fails the whole translation with
    /// an unsupported-model error.
    pub fn map(&self, client_model: &str) -> Option<String> {
        match &self.store {
            Some(store) => store.find_mapping(client_model),
            None => fallback_model_id(client_model),
        }
    }

    /// Labels to advertise on the model-listing endpoint.
    pub fn known_labels(&self) -> Vec<String> {
        match &self.store {
            Some(store) => {
                let mut labels = store.enabled_patterns();
                labels.sort();
                labels.dedup();
                labels
            }
            None => FALLBACK_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for ModelMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Substring scan over the lowercased label; check order decides when a label
/// names several families.
fn fallback_model_id(label: &str) -> Option<String> {
    let lower = label.to_lowercase();
    if lower.contains("sonnet") {
        Some(FALLBACK_SONNET_ID.to_string())
    } else if lower.contains("opus") {
        Some(FALLBACK_OPUS_ID.to_string())
    } else if lower.contains("haiku") {
        Some(FALLBACK_HAIKU_ID.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::mapping_store::{MatchType, ModelMappingRule};

    #[test]
    fn fallback_maps_known_families() {
        let mapper = ModelMapper::new();
        assert_eq!(
            mapper.map("claude-3-5-sonnet-latest").as_deref(),
            Some(FALLBACK_SONNET_ID)
        );
        assert_eq!(
            mapper.map("Claude-Opus-4").as_deref(),
            Some(FALLBACK_OPUS_ID)
        );
        assert_eq!(
            mapper.map("claude-haiku-4-5").as_deref(),
            Some(FALLBACK_HAIKU_ID)
        );
        assert_eq!(mapper.map("gpt-4"), None);
    }

    #[test]
    fn fallback_check_order_prefers_sonnet() {
        let mapper = ModelMapper::new();
        assert_eq!(
            mapper.map("sonnet-opus-hybrid").as_deref(),
            Some(FALLBACK_SONNET_ID)
        );
    }

    #[test]
    fn bound_store_is_authoritative() {
        let store = Arc::new(MappingStore::from_rules(vec![ModelMappingRule {
            pattern: "sonnet".into(),
            internal_id: "RULE_ID".into(),
            match_type: MatchType::Contains,
            priority: 0,
            enabled: true,
        }]));
        let mapper = ModelMapper::with_store(store);
        assert_eq!(mapper.map("my-sonnet").as_deref(), Some("RULE_ID"));
        // no fallback once a store is bound
        assert_eq!(mapper.map("claude-opus-4"), None);
    }

    #[test]
    fn known_labels_come_from_store_or_fallback() {
        let mapper = ModelMapper::new();
        assert!(mapper
            .known_labels()
            .contains(&"claude-sonnet-4-5".to_string()));

        let store = Arc::new(MappingStore::from_rules(vec![ModelMappingRule {
            pattern: "my-model".into(),
            internal_id: "X".into(),
            match_type: MatchType::Exact,
            priority: 0,
            enabled: true,
        }]));
        let mapper = ModelMapper::with_store(store);
        assert_eq!(mapper.known_labels(), vec!["my-model".to_string()]);
    }
}
