// Bounded structural summaries of request envelopes for error logs.
// The trace carries shapes and sizes, never payload bytes, so it is safe to
// log even for adversarial inputs.

use serde_json::{json, Map, Value};

/// Recursion cap; deeper values collapse to `[MaxDepth]`.
pub const MAX_SUMMARY_DEPTH: usize = 6;
/// Per-object key cap.
pub const MAX_SUMMARY_KEYS: usize = 60;
/// Array sample size.
pub const MAX_SUMMARY_SAMPLE: usize = 3;

/// Type-tagged structural trace: strings become `<string len=N>`, numbers
/// and booleans pass through, arrays keep their length and a sampled prefix,
/// objects keep their first keys with recursive summaries.
pub fn summarize(value: &Value) -> Value {
    summarize_at(value, 0)
}

fn summarize_at(value: &Value, depth: usize) -> Value {
    if depth >= MAX_SUMMARY_DEPTH {
        return Value::String("[MaxDepth]".to_string());
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(s) => Value::String(format!("<string len={}>", s.len())),
        Value::Array(items) => json!({
            "_type": "array",
            "length": items.len(),
            "sample": items
                .iter()
                .take(MAX_SUMMARY_SAMPLE)
                .map(|item| summarize_at(item, depth + 1))
                .collect::<Vec<_>>(),
        }),
        Value::Object(map) => {
            let mut keys = Map::new();
            for (key, item) in map.iter().take(MAX_SUMMARY_KEYS) {
                keys.insert(key.clone(), summarize_at(item, depth + 1));
            }
            json!({
                "_type": "object",
                "keys": keys,
            })
        }
    }
}
