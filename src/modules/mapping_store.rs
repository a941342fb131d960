// Model-mapping rule table, persisted as a JSON array on disk.
// The mapper consults this before falling back to its built-in substring scan.

use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Contains,
    Prefix,
    Suffix,
}

/// One mapping rule. Higher `priority` wins; ties keep table order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMappingRule {
    pub pattern: String,
    pub internal_id: String,
    pub match_type: MatchType,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ModelMappingRule {
    fn matches(&self, model: &str) -> bool {
        match self.match_type {
            MatchType::Exact => model == self.pattern,
            MatchType::Contains => model.contains(&self.pattern),
            MatchType::Prefix => model.starts_with(&self.pattern),
            MatchType::Suffix => model.ends_with(&self.pattern),
        }
    }
}

/// Rule storage. Rules are kept sorted by descending priority so lookups are
/// a linear first-match scan.
pub struct MappingStore {
    path: Option<PathBuf>,
    rules: RwLock<Vec<ModelMappingRule>>,
}

impl MappingStore {
    pub fn from_rules(mut rules: Vec<ModelMappingRule>) -> Self {
        sort_rules(&mut rules);
        Self {
            path: None,
            rules: RwLock::new(rules),
        }
    }

    /// Load rules from a JSON file; a missing file yields an empty table.
    pub fn load(path: PathBuf) -> Result<Self, String> {
        let mut rules: Vec<ModelMappingRule> = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read mapping rules: {e}"))?;
            serde_json::from_str(&content)
                .map_err(|e| format!("failed to parse mapping rules: {e}"))?
        } else {
            Vec::new()
        };
        sort_rules(&mut rules);
        Ok(Self {
            path: Some(path),
            rules: RwLock::new(rules),
        })
    }

    /// First enabled rule matching `model`, in priority order.
    pub fn find_mapping(&self, model: &str) -> Option<String> {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        rules
            .iter()
            .filter(|r| r.enabled)
            .find(|r| r.matches(model))
            .map(|r| r.internal_id.clone())
    }

    /// Patterns of all enabled rules (for model listing).
    pub fn enabled_patterns(&self) -> Vec<String> {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.pattern.clone())
            .collect()
    }

    /// Replace the rule table and rewrite the backing file if one is bound.
    pub fn set_rules(&self, mut rules: Vec<ModelMappingRule>) {
        sort_rules(&mut rules);
        if let Some(path) = &self.path {
            match serde_json::to_string_pretty(&rules) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(path, content) {
                        warn!(path = %path.display(), error = %e, "Failed to persist mapping rules");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to serialize mapping rules"),
            }
        }
        *self.rules.write().unwrap_or_else(|e| e.into_inner()) = rules;
    }
}

fn sort_rules(rules: &mut [ModelMappingRule]) {
    // stable sort keeps table order for equal priorities
    rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
}
