//! Inline batch jobs (`models/{model}:batchGenerateContent`).
//!
//! Results of a batch are never committed to thread history.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::batch::{BatchItem, BatchStatus, BatchWaitResponse};
use crate::error::LLMError;
use crate::history::History;

use super::error::status_to_error;
use super::request::GeminiTurn;
use super::response::map_response;
use super::types::{GeminiBatchOperation, GeminiInlinedResponse};

/// Wraps per-request bodies keyed by request id into a batch submission.
pub(crate) fn build_batch_body(display_name: &str, requests: Vec<(String, Value)>) -> Value {
    let requests: Vec<Value> = requests
        .into_iter()
        .map(|(key, request)| json!({ "request": request, "metadata": { "key": key } }))
        .collect();
    json!({
        "batch": {
            "display_name": display_name,
            "input_config": { "requests": { "requests": requests } },
        }
    })
}

/// Maps a job state such as `BATCH_STATE_RUNNING` or `JOB_STATE_SUCCEEDED`.
pub(crate) fn convert_state(state: &str) -> BatchStatus {
    let state = state
        .strip_prefix("BATCH_STATE_")
        .or_else(|| state.strip_prefix("JOB_STATE_"))
        .unwrap_or(state);
    match state {
        "PENDING" | "QUEUED" | "UNSPECIFIED" => BatchStatus::Pending,
        "RUNNING" => BatchStatus::Running,
        "SUCCEEDED" | "CANCELLED" => BatchStatus::Finished,
        "FAILED" | "EXPIRED" => BatchStatus::Error,
        other => {
            tracing::warn!(state = other, "unrecognized Gemini batch state");
            BatchStatus::Running
        }
    }
}

pub(crate) fn operation_status(operation: &GeminiBatchOperation) -> BatchStatus {
    if operation.error.is_some() {
        return BatchStatus::Error;
    }
    let state = operation
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.state.as_deref());
    match state {
        Some(state) => convert_state(state),
        None if operation.done => BatchStatus::Finished,
        None => BatchStatus::Pending,
    }
}

/// Terminal response of an operation, or `None` while the job is running.
///
/// Items are attributed to the model recorded on the job, or to
/// `fallback_model` when the operation does not name one.
pub(crate) fn completed_response(
    operation: GeminiBatchOperation,
    fallback_model: &str,
) -> Option<BatchWaitResponse> {
    let status = operation_status(&operation);
    if !status.is_terminal() {
        return None;
    }
    let model = operation
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.model.as_deref())
        .map_or(fallback_model, |model| model.trim_start_matches("models/"))
        .to_string();
    let model = model.as_str();
    if let Some(error) = &operation.error {
        return Some(BatchWaitResponse::failed(status_to_error(error)));
    }
    if status == BatchStatus::Error {
        let state = operation
            .metadata
            .and_then(|metadata| metadata.state)
            .unwrap_or_default();
        return Some(BatchWaitResponse::failed(LLMError::provider(
            "google_gemini",
            format!("batch {} ended in state {state}", operation.name),
        )));
    }

    let output = operation
        .response
        .or_else(|| operation.metadata.and_then(|metadata| metadata.output));
    let items = output
        .and_then(|output| output.inlined_responses)
        .map(|responses| responses.into_vec())
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, item)| convert_item(position, item, model))
        .collect();

    Some(BatchWaitResponse {
        status,
        items,
        error: None,
    })
}

fn convert_item(position: usize, item: GeminiInlinedResponse, model: &str) -> BatchItem {
    let key = item
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.get("key"))
        .and_then(Value::as_str)
        .map_or_else(|| position.to_string(), str::to_string);

    let result = match (item.response, item.error) {
        (_, Some(error)) => Err(status_to_error(&error)),
        (Some(response), None) => map_response(response, model, &Arc::new(History::new()), None),
        (None, None) => Err(LLMError::provider(
            "google_gemini",
            format!("batch item {key} has neither response nor error"),
        )),
    };
    BatchItem { key, result }
}
