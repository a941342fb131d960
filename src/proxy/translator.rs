// Anthropic request → Kiro conversationState envelope.
//
// The upstream requires a strict user/assistant alternation that starts with
// a user turn and ends with an assistant turn, with the driving user turn
// split out as currentMessage. Client conversations are messier: adjacent
// same-role turns, assistant-final transcripts, tool results spread across
// user turns. This module reshapes one into the other and hands back the
// tool rename map alongside the envelope.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::models::claude::{ClaudeRequest, Message};
use crate::models::kiro::{
    AssistantResponseMessage, ChatTriggerType, ConversationState, CurrentMessage, HistoryItem,
    InputSchema, KiroRequest, KiroToolSpec, ToolSpecification, UserInputMessage,
    UserInputMessageContext,
};
use crate::proxy::extractors::{
    coerce_tool_input, extract_assistant_content, extract_user_content,
};
use crate::proxy::model_mapper::ModelMapper;
use crate::proxy::sanitizer::{is_unsupported_tool, ToolNameMap};

pub const ORIGIN_AI_EDITOR: &str = "AI_EDITOR";
pub const AGENT_TASK_TYPE: &str = "vibe";

/// Acknowledgement turn paired with the injected system prompt.
pub const SYSTEM_ACK_TEXT: &str = "I will follow these instructions.";
/// Content of synthesized user turns (assistant-final requests, placeholder
/// turns, merged turns that carried only tool results).
pub const FILLER_USER_TEXT: &str = "continue";
/// Content of the filler assistant turn that closes a trailing user run.
pub const FILLER_ASSISTANT_TEXT: &str = "OK";

pub const DEFAULT_THINKING_BUDGET: u32 = 10_000;
pub const TOOL_DESCRIPTION_MAX_CHARS: usize = 10_000;

/// Translation output: the envelope plus the original → sanitized tool-name
/// map the response decoder needs.
#[derive(Debug)]
pub struct TranslatedRequest {
    pub envelope: KiroRequest,
    pub tool_names: HashMap<String, String>,
}

pub fn translate(
    request: &ClaudeRequest,
    mapper: &ModelMapper,
) -> Result<TranslatedRequest, GatewayError> {
    if request.messages.is_empty() {
        return Err(GatewayError::EmptyMessages);
    }
    let model_id = mapper
        .map(&request.model)
        .ok_or_else(|| GatewayError::UnsupportedModel(request.model.clone()))?;

    // Current window: the longest all-user suffix. An empty window means the
    // transcript ends on an assistant turn and the current message must be
    // synthesized.
    let mut history_end = request.messages.len();
    while history_end > 0 && request.messages[history_end - 1].role == "user" {
        history_end -= 1;
    }
    let ends_with_assistant = history_end == request.messages.len();

    let thinking_prefix = request
        .thinking
        .as_ref()
        .filter(|t| t.is_enabled())
        .map(|t| {
            format!(
                "<thinking_mode>enabled</thinking_mode><max_thinking_length>{}</max_thinking_length>",
                t.budget_tokens.unwrap_or(DEFAULT_THINKING_BUDGET)
            )
        });

    let mut names = ToolNameMap::new();
    let mut history: Vec<HistoryItem> = Vec::new();

    // System injection: the system prompt (with the thinking prefix, unless
    // the client already embedded one) becomes a leading user/assistant pair.
    let system_text = request
        .system
        .as_ref()
        .map(|s| s.to_text())
        .unwrap_or_default();
    let injected = if !system_text.is_empty() {
        match &thinking_prefix {
            Some(prefix)
                if !system_text.contains("<thinking_mode>")
                    && !system_text.contains("<max_thinking_length>") =>
            {
                Some(format!("{prefix}\n{system_text}"))
            }
            _ => Some(system_text),
        }
    } else {
        thinking_prefix.clone()
    };
    if let Some(content) = injected {
        history.push(HistoryItem::user(user_turn(content, &model_id, None)));
        history.push(HistoryItem::assistant(AssistantResponseMessage {
            content: SYSTEM_ACK_TEXT.to_string(),
            tool_uses: None,
        }));
    }

    // History walk: buffer consecutive user turns, merge them when an
    // assistant turn arrives, and keep the alternation invariant by
    // synthesizing a user placeholder where the client left a gap.
    let mut pending: Vec<&Message> = Vec::new();
    for msg in &request.messages[..history_end] {
        if msg.role == "assistant" {
            if !pending.is_empty() {
                history.push(HistoryItem::user(merge_user_turn(&pending, &model_id)));
                pending.clear();
            } else if history.last().is_none_or(|h| !h.is_user()) {
                history.push(HistoryItem::user(user_turn(
                    FILLER_USER_TEXT.to_string(),
                    &model_id,
                    None,
                )));
            }
            let extracted = extract_assistant_content(&msg.content, &mut names);
            history.push(HistoryItem::assistant(AssistantResponseMessage {
                content: extracted.text,
                tool_uses: if extracted.tool_uses.is_empty() {
                    None
                } else {
                    Some(extracted.tool_uses)
                },
            }));
        } else {
            pending.push(msg);
        }
    }
    if !pending.is_empty() {
        history.push(HistoryItem::user(merge_user_turn(&pending, &model_id)));
        history.push(HistoryItem::assistant(AssistantResponseMessage {
            content: FILLER_ASSISTANT_TEXT.to_string(),
            tool_uses: None,
        }));
    }

    // Current message: merge the user window, or synthesize a continuation
    // turn when the transcript ended on the assistant.
    let (current_content, current_results) = if ends_with_assistant {
        (FILLER_USER_TEXT.to_string(), Vec::new())
    } else {
        let mut texts: Vec<String> = Vec::new();
        let mut results = Vec::new();
        for msg in &request.messages[history_end..] {
            let extracted = extract_user_content(&msg.content);
            if !extracted.text.is_empty() {
                texts.push(extracted.text);
            }
            results.extend(extracted.tool_results);
        }
        let joined = texts.join("\n");
        let content = if joined.is_empty() {
            FILLER_USER_TEXT.to_string()
        } else {
            joined
        };
        (content, results)
    };

    // Tool definitions, minus unsupported tools, renamed into the sanitized
    // namespace.
    let tool_specs: Vec<KiroToolSpec> = request
        .tools
        .iter()
        .flatten()
        .filter(|tool| !is_unsupported_tool(&tool.name))
        .map(|tool| KiroToolSpec {
            tool_specification: ToolSpecification {
                name: names.assign(&tool.name),
                description: tool
                    .description
                    .as_deref()
                    .unwrap_or("")
                    .chars()
                    .take(TOOL_DESCRIPTION_MAX_CHARS)
                    .collect(),
                input_schema: InputSchema {
                    json: coerce_tool_input(tool.input_schema.as_ref().unwrap_or(&Value::Null)),
                },
            },
        })
        .collect();

    let chat_trigger_type = if !tool_specs.is_empty()
        && matches!(
            request.tool_choice.as_ref().map(|c| c.type_.as_str()),
            Some("any") | Some("tool")
        ) {
        ChatTriggerType::Auto
    } else {
        ChatTriggerType::Manual
    };

    let mut context = UserInputMessageContext::default();
    if !tool_specs.is_empty() {
        context.tools = Some(tool_specs);
    }
    if !current_results.is_empty() {
        context.tool_results = Some(current_results);
    }
    let context = if context.is_empty() {
        None
    } else {
        Some(context)
    };

    let envelope = KiroRequest {
        conversation_state: ConversationState {
            conversation_id: Uuid::new_v4().to_string(),
            agent_continuation_id: Uuid::new_v4().to_string(),
            agent_task_type: AGENT_TASK_TYPE.to_string(),
            chat_trigger_type,
            current_message: CurrentMessage {
                user_input_message: user_turn(current_content, &model_id, context),
            },
            history,
        },
        profile_arn: None,
    };

    Ok(TranslatedRequest {
        envelope,
        tool_names: names.into_inner(),
    })
}

fn user_turn(
    content: String,
    model_id: &str,
    context: Option<UserInputMessageContext>,
) -> UserInputMessage {
    UserInputMessage {
        content,
        model_id: model_id.to_string(),
        origin: ORIGIN_AI_EDITOR.to_string(),
        user_input_message_context: context,
    }
}

/// User-merge rule: concatenate the buffered turns' texts with `\n` (empty
/// texts dropped) and collect their tool results in order. A merge that only
/// carried tool results gets the `continue` filler as content.
fn merge_user_turn(pending: &[&Message], model_id: &str) -> UserInputMessage {
    let mut texts: Vec<String> = Vec::new();
    let mut results = Vec::new();
    for msg in pending {
        let extracted = extract_user_content(&msg.content);
        if !extracted.text.is_empty() {
            texts.push(extracted.text);
        }
        results.extend(extracted.tool_results);
    }
    let joined = texts.join("\n");
    let content = if joined.is_empty() && !results.is_empty() {
        FILLER_USER_TEXT.to_string()
    } else {
        joined
    };
    let context = if results.is_empty() {
        None
    } else {
        Some(UserInputMessageContext {
            tools: None,
            tool_results: Some(results),
        })
    };
    user_turn(content, model_id, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::claude::MessageContent;
    use serde_json::json;

    fn request(v: Value) -> ClaudeRequest {
        serde_json::from_value(v).unwrap()
    }

    fn translate_ok(v: Value) -> TranslatedRequest {
        translate(&request(v), &ModelMapper::new()).unwrap()
    }

    #[test]
    fn empty_messages_is_rejected() {
        let err = translate(
            &request(json!({"model": "claude-sonnet-4-5", "messages": []})),
            &ModelMapper::new(),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::EmptyMessages));
    }

    #[test]
    fn unknown_model_is_rejected_before_any_history_work() {
        let err = translate(
            &request(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hi"}]
            })),
            &ModelMapper::new(),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedModel(m) if m == "gpt-4o"));
    }

    #[test]
    fn assistant_opening_gets_a_user_placeholder() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "messages": [
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "hi"}
            ]
        }));
        let history = &t.envelope.conversation_state.history;
        assert_eq!(history.len(), 2);
        match &history[0] {
            HistoryItem::User(u) => {
                assert_eq!(u.user_input_message.content, FILLER_USER_TEXT)
            }
            _ => panic!("history must start with a user turn"),
        }
    }

    #[test]
    fn consecutive_assistant_turns_stay_alternating() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "messages": [
                {"role": "user", "content": "q"},
                {"role": "assistant", "content": "a1"},
                {"role": "assistant", "content": "a2"},
                {"role": "user", "content": "next"}
            ]
        }));
        let history = &t.envelope.conversation_state.history;
        assert_eq!(history.len(), 4);
        for (i, item) in history.iter().enumerate() {
            assert_eq!(item.is_user(), i % 2 == 0);
        }
    }

    #[test]
    fn history_parity_holds_for_mixed_transcripts() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "messages": [
                {"role": "user", "content": "a"},
                {"role": "user", "content": "b"},
                {"role": "assistant", "content": "c"},
                {"role": "user", "content": "d"},
                {"role": "assistant", "content": "e"},
                {"role": "user", "content": "tail"}
            ]
        }));
        let history = &t.envelope.conversation_state.history;
        assert_eq!(history.len() % 2, 0);
        assert!(history.first().unwrap().is_user());
        assert!(!history.last().unwrap().is_user());
    }

    #[test]
    fn trailing_user_history_run_is_closed_with_ok_filler() {
        // the run before an assistant-final message is history, not window
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "messages": [
                {"role": "user", "content": "a"},
                {"role": "user", "content": "b"},
                {"role": "assistant", "content": "done"}
            ]
        }));
        let history = &t.envelope.conversation_state.history;
        assert_eq!(history.len(), 4);
        match &history[0] {
            HistoryItem::User(u) => assert_eq!(u.user_input_message.content, "a\nb"),
            _ => panic!("expected merged user turn"),
        }
        match &history[1] {
            HistoryItem::Assistant(a) => {
                assert_eq!(a.assistant_response_message.content, FILLER_ASSISTANT_TEXT)
            }
            _ => panic!("expected filler assistant turn"),
        }
        assert_eq!(
            t.envelope
                .conversation_state
                .current_message
                .user_input_message
                .content,
            FILLER_USER_TEXT
        );
    }

    #[test]
    fn tool_choice_any_flips_trigger_to_auto() {
        let base = json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"name": "do_thing", "input_schema": {"type": "object"}}]
        });

        let t = translate_ok(base.clone());
        assert_eq!(
            t.envelope.conversation_state.chat_trigger_type,
            ChatTriggerType::Manual
        );

        let mut with_choice = base.clone();
        with_choice["tool_choice"] = json!({"type": "any"});
        let t = translate_ok(with_choice);
        assert_eq!(
            t.envelope.conversation_state.chat_trigger_type,
            ChatTriggerType::Auto
        );

        // tool_choice without surviving tools stays MANUAL
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"name": "web_search"}],
            "tool_choice": {"type": "any"}
        }));
        assert_eq!(
            t.envelope.conversation_state.chat_trigger_type,
            ChatTriggerType::Manual
        );
    }

    #[test]
    fn long_tool_description_is_truncated() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{
                "name": "big",
                "description": "d".repeat(TOOL_DESCRIPTION_MAX_CHARS + 500),
                "input_schema": {"type": "object"}
            }]
        }));
        let context = t
            .envelope
            .conversation_state
            .current_message
            .user_input_message
            .user_input_message_context
            .unwrap();
        let spec = &context.tools.unwrap()[0].tool_specification;
        assert_eq!(spec.description.chars().count(), TOOL_DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn fresh_uuids_per_translation() {
        let body = json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let a = translate_ok(body.clone());
        let b = translate_ok(body);
        assert_ne!(
            a.envelope.conversation_state.conversation_id,
            b.envelope.conversation_state.conversation_id
        );
        assert_ne!(
            a.envelope.conversation_state.agent_continuation_id,
            b.envelope.conversation_state.agent_continuation_id
        );
    }

    #[test]
    fn system_array_blocks_are_joined() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "system": [
                {"type": "text", "text": "line one"},
                {"type": "text", "text": "line two"}
            ],
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let history = &t.envelope.conversation_state.history;
        match &history[0] {
            HistoryItem::User(u) => {
                assert_eq!(u.user_input_message.content, "line one\nline two")
            }
            _ => panic!("expected injected system turn"),
        }
        match &history[1] {
            HistoryItem::Assistant(a) => {
                assert_eq!(a.assistant_response_message.content, SYSTEM_ACK_TEXT)
            }
            _ => panic!("expected acknowledgement turn"),
        }
    }

    #[test]
    fn existing_thinking_marker_suppresses_prefix() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "system": "<thinking_mode>enabled</thinking_mode> custom",
            "thinking": {"type": "enabled", "budget_tokens": 512},
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let history = &t.envelope.conversation_state.history;
        match &history[0] {
            HistoryItem::User(u) => {
                assert_eq!(
                    u.user_input_message.content,
                    "<thinking_mode>enabled</thinking_mode> custom"
                )
            }
            _ => panic!("expected system turn"),
        }
    }

    #[test]
    fn thinking_without_system_still_injects_pair() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "thinking": {"type": "enabled"},
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let history = &t.envelope.conversation_state.history;
        assert_eq!(history.len(), 2);
        match &history[0] {
            HistoryItem::User(u) => assert_eq!(
                u.user_input_message.content,
                format!(
                    "<thinking_mode>enabled</thinking_mode><max_thinking_length>{}</max_thinking_length>",
                    DEFAULT_THINKING_BUDGET
                )
            ),
            _ => panic!("expected thinking-prefix turn"),
        }
    }

    #[test]
    fn merged_turn_with_only_tool_results_gets_continue() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "messages": [
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "T0", "content": "out"}
                ]},
                {"role": "assistant", "content": "next"},
                {"role": "user", "content": "go"}
            ]
        }));
        let history = &t.envelope.conversation_state.history;
        match &history[0] {
            HistoryItem::User(u) => {
                assert_eq!(u.user_input_message.content, FILLER_USER_TEXT);
                let ctx = u.user_input_message.user_input_message_context.as_ref().unwrap();
                assert_eq!(ctx.tool_results.as_ref().unwrap().len(), 1);
            }
            _ => panic!("expected merged user turn"),
        }
    }

    #[test]
    fn string_content_roundtrips_into_current_message() {
        let t = translate_ok(json!({
            "model": "claude-sonnet-4-5",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let current = &t.envelope.conversation_state.current_message.user_input_message;
        assert_eq!(current.content, "hi");
        assert_eq!(current.origin, ORIGIN_AI_EDITOR);
        assert!(current.user_input_message_context.is_none());
        assert!(matches!(
            request(json!({"model": "x", "messages": [{"role": "user", "content": "hi"}]}))
                .messages[0]
                .content,
            MessageContent::String(_)
        ));
    }
}
