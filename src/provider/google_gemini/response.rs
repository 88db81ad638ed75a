use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Value, json};

use crate::error::LLMError;
use crate::history::History;
use crate::response::{
    FinishReason, Grounding, GroundingSource, InnerResponse, ResponseCandidate, ResponseToolCall,
};
use crate::thread::ThreadId;

use super::request::GeminiTurn;
use super::types::{GeminiCandidate, GeminiGenerateContentResponse, GeminiGroundingMetadata};

/// Maps a GenerateContent response to candidates whose selection appends the
/// model turn to `thread`.
pub(crate) fn map_response(
    resp: GeminiGenerateContentResponse,
    fallback_model: &str,
    history: &Arc<History<GeminiTurn>>,
    thread: Option<&Arc<ThreadId>>,
) -> Result<InnerResponse, LLMError> {
    let mut candidates: Vec<(usize, GeminiCandidate)> = resp
        .candidates
        .into_iter()
        .enumerate()
        .map(|(position, candidate)| (candidate.index.unwrap_or(position), candidate))
        .collect();
    candidates.sort_by_key(|(index, _)| *index);

    let candidates = candidates
        .into_iter()
        .map(|(_, candidate)| convert_candidate(candidate, history, thread))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InnerResponse {
        id: resp.response_id.unwrap_or_default(),
        model: resp
            .model_version
            .unwrap_or_else(|| fallback_model.to_string()),
        candidates,
        created: None,
    })
}

fn convert_candidate(
    candidate: GeminiCandidate,
    history: &Arc<History<GeminiTurn>>,
    thread: Option<&Arc<ThreadId>>,
) -> Result<ResponseCandidate, LLMError> {
    let parts = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default();

    let mut text = String::new();
    let mut thoughts = String::new();
    let mut tool_calls = Vec::new();
    for part in &parts {
        if let Some(call) = &part.function_call {
            let arguments = serde_json::to_vec(&call.args).map_err(|err| LLMError::Provider {
                provider: "google_gemini",
                message: format!("failed to encode function call arguments: {err}"),
            })?;
            tool_calls.push(ResponseToolCall {
                id: call.id.clone().unwrap_or_else(|| call.name.clone()),
                name: call.name.clone(),
                parameters: Bytes::from(arguments),
            });
        } else if let Some(part_text) = &part.text {
            if part.thought.unwrap_or(false) {
                thoughts.push_str(part_text);
            } else {
                text.push_str(part_text);
            }
        }
    }

    let finish_reason = match candidate.finish_reason.as_deref() {
        _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
        Some(reason) => convert_finish_reason(reason),
        None => FinishReason::Stop,
    };

    let mut converted = ResponseCandidate::new(text, finish_reason);
    converted.tool_calls = tool_calls;
    converted.thoughts = (!thoughts.is_empty()).then_some(thoughts);
    converted.grounding = candidate.grounding_metadata.map(convert_grounding);

    if let Some(thread) = thread.cloned() {
        let history = history.clone();
        let turn = GeminiTurn::Content(json!({
            "role": "model",
            "parts": serde_json::to_value(&parts).unwrap_or(Value::Array(Vec::new())),
        }));
        converted = converted.on_select(move || history.save(&thread, turn.clone()));
    }
    Ok(converted)
}

fn convert_grounding(metadata: GeminiGroundingMetadata) -> Grounding {
    Grounding {
        searches: metadata.web_search_queries,
        sources: metadata
            .grounding_chunks
            .into_iter()
            .filter_map(|chunk| chunk.web)
            .map(|web| GroundingSource {
                title: web.title.unwrap_or_default(),
                domain: web.domain.unwrap_or_default(),
                url: web.uri.unwrap_or_default(),
                date: None,
            })
            .collect(),
        snippets: metadata
            .grounding_supports
            .into_iter()
            .filter_map(|support| support.segment.and_then(|segment| segment.text))
            .collect(),
    }
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
        | "IMAGE_SAFETY" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}
