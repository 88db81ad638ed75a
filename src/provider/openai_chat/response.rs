use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::LLMError;
use crate::history::History;
use crate::response::{FinishReason, InnerResponse, ResponseCandidate, ResponseToolCall};
use crate::thread::ThreadId;

use super::types::{OpenAiChatResponse, OpenAiMessageContent, OpenAiResponseMessage, OpenAiToolCall};

/// Converts a completion into candidates whose selection appends the assistant
/// turn to `thread`.
pub(crate) fn map_response(
    resp: OpenAiChatResponse,
    history: &Arc<History<Value>>,
    thread: Option<&Arc<ThreadId>>,
) -> Result<InnerResponse, LLMError> {
    let mut choices = resp.choices;
    choices.sort_by_key(|choice| choice.index);

    let candidates = choices
        .into_iter()
        .map(|choice| {
            let finish_reason = choice
                .finish_reason
                .as_deref()
                .map_or(FinishReason::Stop, convert_finish_reason);
            let message = choice.message.unwrap_or(OpenAiResponseMessage {
                content: None,
                refusal: None,
                tool_calls: None,
            });
            convert_candidate(message, finish_reason, history, thread)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InnerResponse {
        id: resp.id,
        model: resp.model,
        candidates,
        created: resp
            .created
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
    })
}

fn convert_candidate(
    message: OpenAiResponseMessage,
    finish_reason: FinishReason,
    history: &Arc<History<Value>>,
    thread: Option<&Arc<ThreadId>>,
) -> Result<ResponseCandidate, LLMError> {
    let text = match message.content {
        None => message.refusal.unwrap_or_default(),
        Some(OpenAiMessageContent::Text(text)) => text,
        Some(OpenAiMessageContent::Parts(parts)) => parts
            .into_iter()
            .filter(|part| part.kind == "text" || part.kind == "output_text")
            .filter_map(|part| part.text)
            .collect(),
    };
    let raw_calls = message.tool_calls.unwrap_or_default();
    let tool_calls = raw_calls
        .iter()
        .map(convert_tool_call)
        .collect::<Result<Vec<_>, _>>()?;

    let mut candidate = ResponseCandidate::new(text.clone(), finish_reason);
    candidate.tool_calls = tool_calls;

    if let Some(thread) = thread.cloned() {
        let history = history.clone();
        let entry = assistant_entry(&text, &raw_calls);
        candidate = candidate.on_select(move || history.save(&thread, entry.clone()));
    }
    Ok(candidate)
}

/// History entry replayed as the assistant turn on the next request.
fn assistant_entry(text: &str, tool_calls: &[OpenAiToolCall]) -> Value {
    let mut entry = Map::new();
    entry.insert("role".to_string(), Value::String("assistant".to_string()));
    entry.insert("content".to_string(), Value::String(text.to_string()));
    if !tool_calls.is_empty() {
        entry.insert(
            "tool_calls".to_string(),
            serde_json::to_value(tool_calls).unwrap_or(Value::Null),
        );
    }
    Value::Object(entry)
}

fn convert_tool_call(call: &OpenAiToolCall) -> Result<ResponseToolCall, LLMError> {
    if call.kind != "function" {
        return Err(LLMError::Provider {
            provider: "openai_chat",
            message: format!("unsupported tool type {}", call.kind),
        });
    }
    let (name, arguments) = match &call.function {
        Some(function) => (
            function.name.clone().unwrap_or_default(),
            function.arguments.clone().unwrap_or_default(),
        ),
        None => (String::new(), String::new()),
    };
    Ok(ResponseToolCall {
        id: call.id.clone().unwrap_or_else(|| name.clone()),
        name,
        parameters: Bytes::from(arguments),
    })
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::MaxTokens,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::stub_provider;
    use serde_json::json;

    fn sample() -> OpenAiChatResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000u64,
            "model": "gpt-4o-mini",
            "choices": [
                {
                    "index": 1,
                    "message": {"role": "assistant", "content": "second"},
                    "finish_reason": "length"
                },
                {
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "get_weather", "arguments": "{\"location\":\"Paris\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }
            ]
        }))
        .expect("fixture")
    }

    #[test]
    fn choices_map_to_ordered_candidates() {
        let history = Arc::new(History::new());
        let response = map_response(sample(), &history, None).expect("response");

        assert_eq!(response.model, "gpt-4o-mini");
        assert_eq!(response.created, Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
        assert_eq!(response.candidates.len(), 2);

        let first = &response.candidates[0];
        assert_eq!(first.finish_reason, FinishReason::ToolCalls);
        assert_eq!(first.tool_calls[0].name, "get_weather");
        assert_eq!(first.tool_calls[0].parameters, Bytes::from_static(br#"{"location":"Paris"}"#));

        assert_eq!(response.candidates[1].text, "second");
        assert_eq!(response.candidates[1].finish_reason, FinishReason::MaxTokens);
    }

    #[test]
    fn selecting_saves_assistant_turn() {
        let history = Arc::new(History::new());
        let thread = Arc::new(ThreadId::new(stub_provider()));
        let response = map_response(sample(), &history, Some(&thread)).expect("response");

        assert!(history.is_empty(&thread));
        response.candidates[0].select();

        let saved = history.load(&thread);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0]["role"], "assistant");
        assert_eq!(saved[0]["tool_calls"][0]["id"], "call_1");

        response.candidates[1].select();
        let saved = history.load(&thread);
        assert_eq!(saved[1], json!({"role": "assistant", "content": "second"}));
    }

    #[test]
    fn finish_reasons() {
        assert_eq!(convert_finish_reason("stop"), FinishReason::Stop);
        assert_eq!(convert_finish_reason("content_filter"), FinishReason::ContentFilter);
        assert_eq!(
            convert_finish_reason("weird"),
            FinishReason::Other("weird".to_string())
        );
    }
}
