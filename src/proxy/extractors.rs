// Content extractors over the polymorphic client message content.
// All three are total: unknown shapes degrade to the empty string rather
// than failing, which matches what the upstream tolerates.

use serde_json::Value;

use crate::models::claude::{ContentBlock, MessageContent};
use crate::models::kiro::{KiroToolResult, KiroToolUse, TextContent, ToolResultStatus};
use crate::proxy::sanitizer::{is_unsupported_tool, ToolNameMap};

/// Assistant text substituted when tool-uses exist but no text survived.
/// The upstream rejects empty assistant content.
pub const EMPTY_ASSISTANT_TEXT: &str = "OK";

/// Normalized user-side content: merged text plus threaded tool results.
#[derive(Debug, Default)]
pub struct UserContent {
    pub text: String,
    pub tool_results: Vec<KiroToolResult>,
}

/// Normalized assistant-side content: rendered text plus tool uses.
#[derive(Debug, Default)]
pub struct AssistantContent {
    pub text: String,
    pub tool_uses: Vec<KiroToolUse>,
}

/// Plain text of a message: strings pass through, arrays keep only their
/// text blocks joined with `\n`.
pub fn extract_text(content: &MessageContent) -> String {
    match content {
        MessageContent::String(s) => s.clone(),
        MessageContent::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Text plus tool results from a user message.
pub fn extract_user_content(content: &MessageContent) -> UserContent {
    match content {
        MessageContent::String(s) => UserContent {
            text: s.clone(),
            tool_results: Vec::new(),
        },
        MessageContent::Array(blocks) => {
            let mut texts: Vec<&str> = Vec::new();
            let mut tool_results = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => texts.push(text),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => {
                        let status = if is_error.unwrap_or(false) {
                            ToolResultStatus::Error
                        } else {
                            ToolResultStatus::Success
                        };
                        tool_results.push(KiroToolResult {
                            tool_use_id: tool_use_id.clone(),
                            status,
                            content: vec![TextContent {
                                text: tool_result_text(content),
                            }],
                        });
                    }
                    _ => {}
                }
            }
            UserContent {
                text: texts.join("\n"),
                tool_results,
            }
        }
    }
}

/// Text plus tool uses from an assistant message. Thinking blocks are folded
/// into a `<thinking>` prefix; unsupported tools are dropped here (but never
/// from user tool-results). Tool names go through the request's rename map.
pub fn extract_assistant_content(
    content: &MessageContent,
    names: &mut ToolNameMap,
) -> AssistantContent {
    let blocks = match content {
        MessageContent::String(s) => {
            return AssistantContent {
                text: s.clone(),
                tool_uses: Vec::new(),
            }
        }
        MessageContent::Array(blocks) => blocks,
    };

    let mut thinking = String::new();
    let mut texts: Vec<&str> = Vec::new();
    let mut tool_uses = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::Thinking { thinking: t, .. } => thinking.push_str(t),
            ContentBlock::ToolUse { id, name, input } => {
                if is_unsupported_tool(name) {
                    continue;
                }
                tool_uses.push(KiroToolUse {
                    tool_use_id: id.clone(),
                    name: names.assign(name),
                    input: coerce_tool_input(input),
                });
            }
            _ => {}
        }
    }

    let joined = texts.join("\n");
    let mut text = match (thinking.is_empty(), joined.is_empty()) {
        (false, false) => format!("<thinking>{thinking}</thinking>\n\n{joined}"),
        (false, true) => format!("<thinking>{thinking}</thinking>"),
        (true, _) => joined,
    };

    if text.is_empty() && !tool_uses.is_empty() {
        text = EMPTY_ASSISTANT_TEXT.to_string();
    }

    AssistantContent { text, tool_uses }
}

/// Coerce an arbitrary value into a JSON object: objects pass through,
/// strings are parsed (falling back to `{}`), everything else becomes `{}`.
pub fn coerce_tool_input(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::Object(serde_json::Map::new()),
        },
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// Coerce a tool-result content value to a single string: strings pass
/// through, arrays join the `text` of their text blocks with `\n`, anything
/// else yields the empty string.
fn tool_result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
