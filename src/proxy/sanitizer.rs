// Tool-name sanitization for the Kiro tool namespace.
// Upstream tool names must match [A-Za-z_][A-Za-z0-9_]* ; client tool names
// are arbitrary, so each request carries a bijective rename map that the
// response decoder uses to translate tool-use events back.

use std::collections::{HashMap, HashSet};

/// Name used when sanitization leaves nothing behind.
const EMPTY_NAME_FALLBACK: &str = "tool";

/// Prefix applied when the sanitized name starts with a digit.
const DIGIT_PREFIX: &str = "t_";

/// Reduce an arbitrary tool name to the restricted identifier namespace:
/// every character outside `[A-Za-z0-9_]` becomes `_`, runs of `_` collapse,
/// leading/trailing `_` are trimmed, the empty result becomes `tool`, and a
/// leading digit gets a `t_` prefix.
pub fn sanitize_base(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for ch in name.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '_' {
            ch
        } else {
            '_'
        };
        if mapped == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(mapped);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        return EMPTY_NAME_FALLBACK.to_string();
    }
    if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return format!("{DIGIT_PREFIX}{trimmed}");
    }
    trimmed.to_string()
}

/// Tools the upstream cannot execute. Dropped from definitions and assistant
/// tool-uses; user tool-results referencing them pass through untouched.
pub fn is_unsupported_tool(name: &str) -> bool {
    let base = sanitize_base(name).to_lowercase();
    base == "web_search" || base == "websearch"
}

/// Per-request rename table. The first sighting of an original name fixes its
/// sanitized form for the rest of the request; collisions get `_2`, `_3`, …
#[derive(Debug, Default)]
pub struct ToolNameMap {
    assigned: HashMap<String, String>,
    used: HashSet<String>,
}

impl ToolNameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitized name for `original`, assigning one on first sight.
    pub fn assign(&mut self, original: &str) -> String {
        if let Some(existing) = self.assigned.get(original) {
            return existing.clone();
        }

        let base = sanitize_base(original);
        let mut candidate = base.clone();
        let mut suffix = 2u32;
        while self.used.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }

        self.used.insert(candidate.clone());
        self.assigned
            .insert(original.to_string(), candidate.clone());
        candidate
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.assigned.get(original).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    /// The original → sanitized map, consumed when translation finishes.
    pub fn into_inner(self) -> HashMap<String, String> {
        self.assigned
    }
}
