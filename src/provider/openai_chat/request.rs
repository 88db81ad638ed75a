use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::request::InnerRequest;
use crate::tool::Tool;
use crate::types::{Message, Role};

use super::options::OpenAiChatOptions;

/// Assembles the chat completions body from stored history and the request.
pub(crate) fn build_openai_body(
    request: &InnerRequest,
    model: &str,
    history: Vec<Value>,
    options: &OpenAiChatOptions,
) -> Result<Value, LLMError> {
    let mut messages = history;
    messages.extend(convert_messages(&request.messages)?);

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert("messages".to_string(), Value::Array(messages));

    let generation = &request.generation;
    if let Some(count) = generation.max_candidates {
        body.insert("n".to_string(), Value::from(count));
    }
    if let Some(max_tokens) = generation.max_tokens {
        body.insert("max_completion_tokens".to_string(), Value::from(max_tokens));
    }
    if let Some(temperature) = generation.temperature {
        body.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = generation.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }

    if let Some(schema) = request.effective_schema() {
        let mut format = Map::new();
        format.insert("name".to_string(), Value::String(request.schema_name().to_string()));
        if let Some(description) = &request.schema_description {
            format.insert("description".to_string(), Value::String(description.clone()));
        }
        format.insert("schema".to_string(), schema.clone());
        format.insert("strict".to_string(), Value::Bool(true));
        body.insert(
            "response_format".to_string(),
            json!({ "type": "json_schema", "json_schema": Value::Object(format) }),
        );
    }

    if !request.tools.is_empty() {
        body.insert(
            "tools".to_string(),
            Value::Array(request.tools.values().map(convert_tool).collect()),
        );
    }

    if let Some(penalty) = options.presence_penalty {
        body.insert("presence_penalty".to_string(), Value::from(penalty));
    }
    if let Some(penalty) = options.frequency_penalty {
        body.insert("frequency_penalty".to_string(), Value::from(penalty));
    }
    if let Some(effort) = options.reasoning_effort {
        body.insert(
            "reasoning_effort".to_string(),
            Value::String(effort.as_str().to_string()),
        );
    }
    if let Some(seed) = options.seed {
        body.insert("seed".to_string(), Value::from(seed));
    }
    for (k, v) in &options.extra {
        body.insert(k.clone(), v.clone());
    }
    Ok(Value::Object(body))
}

pub(crate) fn convert_messages(messages: &[Message]) -> Result<Vec<Value>, LLMError> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(message: &Message) -> Result<Value, LLMError> {
    let content = message.joined_text()?;
    match (message.role, &message.tool) {
        (Role::Tool, Some(call)) => Ok(json!({
            "role": "tool",
            "tool_call_id": call.id,
            "content": content,
        })),
        (Role::Tool, None) => Err(LLMError::Validation {
            message: "tool message does not reference a tool call".to_string(),
        }),
        (role, _) => Ok(json!({
            "role": role.as_str(),
            "content": content,
        })),
    }
}

fn convert_tool(tool: &Tool) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name(),
            "description": tool.description(),
            "parameters": tool.parameters(),
            "strict": true,
        }
    })
}
