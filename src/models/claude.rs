// Anthropic-style client request models

use serde::{Deserialize, Serialize};

/// Chat-completion request as presented by Anthropic-compatible clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Thinking configuration (`{"type": "enabled", "budget_tokens": N}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

impl ThinkingConfig {
    pub fn is_enabled(&self) -> bool {
        self.type_ == "enabled"
    }
}

/// Tool selection hint. `any` and `tool` force an automatic trigger upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoice {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// System prompt: either a plain string or an ordered list of text blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    String(String),
    Array(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Coerce to a single string; block arrays join their texts with `\n`.
    pub fn to_text(&self) -> String {
        match self {
            SystemPrompt::String(s) => s.clone(),
            SystemPrompt::Array(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    String(String),
    Array(Vec<ContentBlock>),
}

/// Content block inside a message. Unknown block types deserialize into the
/// `Unknown` catch-all so the extractors can stay total and skip them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        // String or array of text blocks; kept as Value and coerced on extraction
        content: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    #[serde(untagged)]
    Unknown(serde_json::Value),
}

/// Client tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn message_content_accepts_string_and_array() {
        let msg: Message =
            serde_json::from_str(r#"{"role": "user", "content": "hi"}"#).unwrap();
        assert!(matches!(msg.content, MessageContent::String(ref s) if s == "hi"));

        let msg: Message = serde_json::from_str(
            r#"{"role": "user", "content": [{"type": "text", "text": "hi"}]}"#,
        )
        .unwrap();
        match msg.content {
            MessageContent::Array(blocks) => assert_eq!(blocks.len(), 1),
            _ => panic!("expected array content"),
        }
    }

    #[test]
    fn unknown_block_type_is_tolerated() {
        let msg: Message = serde_json::from_str(
            r#"{"role": "user", "content": [{"type": "image", "source": {"data": "zzz"}}]}"#,
        )
        .unwrap();
        match msg.content {
            MessageContent::Array(blocks) => {
                assert!(matches!(blocks[0], ContentBlock::Unknown(_)))
            }
            _ => panic!("expected array content"),
        }
    }

    #[test]
    fn system_prompt_block_array_joins_text() {
        let sp: SystemPrompt = serde_json::from_str(
            r#"[{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]"#,
        )
        .unwrap();
        assert_eq!(sp.to_text(), "a\nb");
    }

    #[test]
    fn thinking_enabled_flag() {
        let t = ThinkingConfig {
            type_: "enabled".into(),
            budget_tokens: Some(4096),
        };
        assert!(t.is_enabled());
        let t = ThinkingConfig {
            type_: "disabled".into(),
            budget_tokens: None,
        };
        assert!(!t.is_enabled());
    }

    proptest! {
        #[test]
        fn prop_tool_result_roundtrip(
            tool_use_id in "[a-zA-Z0-9_]{1,30}",
            content_str in "[a-zA-Z0-9 ]{0,50}",
        ) {
            let block = ContentBlock::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: serde_json::Value::String(content_str.clone()),
                is_error: Some(false),
            };
            let json = serde_json::to_string(&block).unwrap();
            let back: ContentBlock = serde_json::from_str(&json).unwrap();
            match back {
                ContentBlock::ToolResult { tool_use_id: tid, content, is_error } => {
                    prop_assert_eq!(tid, tool_use_id);
                    prop_assert_eq!(content.as_str().unwrap(), content_str.as_str());
                    prop_assert_eq!(is_error, Some(false));
                }
                _ => prop_assert!(false, "wrong variant"),
            }
        }

        #[test]
        fn prop_tool_use_roundtrip(
            name in "[a-zA-Z][a-zA-Z0-9_.]{0,20}",
            key in "[a-zA-Z]{1,10}",
            val in "[a-zA-Z0-9]{0,20}",
        ) {
            let block = ContentBlock::ToolUse {
                id: "toolu_abc123".into(),
                name: name.clone(),
                input: serde_json::json!({key.clone(): val.clone()}),
            };
            let json = serde_json::to_string(&block).unwrap();
            let back: ContentBlock = serde_json::from_str(&json).unwrap();
            match back {
                ContentBlock::ToolUse { id, name: n, input } => {
                    prop_assert_eq!(id, "toolu_abc123");
                    prop_assert_eq!(n, name);
                    prop_assert_eq!(input[&key].as_str().unwrap(), val.as_str());
                }
                _ => prop_assert!(false, "wrong variant"),
            }
        }
    }
}
