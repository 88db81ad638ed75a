use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::request::InnerRequest;
use crate::tool::Tool;
use crate::types::{Message, Role};

use super::options::GeminiRequestOptions;

/// Entry of a Gemini thread history.
///
/// System instructions are kept apart from contents because the API takes them
/// in a dedicated field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GeminiTurn {
    Instruction(String),
    Content(Value),
}

/// Builds a GenerateContent body.
///
/// The model travels in the URL path, so it never appears here.
pub(crate) fn build_gemini_body(
    request: &InnerRequest,
    history: &[GeminiTurn],
    options: &GeminiRequestOptions,
) -> Result<Value, LLMError> {
    let mut instructions = Vec::new();
    let mut contents = Vec::new();
    for turn in history {
        match turn {
            GeminiTurn::Instruction(text) => instructions.push(text.clone()),
            GeminiTurn::Content(content) => contents.push(content.clone()),
        }
    }
    for turn in convert_messages(&request.messages)? {
        match turn {
            GeminiTurn::Instruction(text) => instructions.push(text),
            GeminiTurn::Content(content) => contents.push(content),
        }
    }

    if contents.is_empty() {
        return Err(LLMError::Validation {
            message: "Gemini GenerateContent request requires at least one content message"
                .to_string(),
        });
    }

    let mut body = Map::new();
    if !instructions.is_empty() {
        body.insert(
            "system_instruction".to_string(),
            json!({ "parts": [ { "text": instructions.join("\n\n") } ] }),
        );
    }
    body.insert("contents".to_string(), Value::Array(contents));

    let config = build_generation_config(request, options);
    if !config.is_empty() {
        body.insert("generationConfig".to_string(), Value::Object(config));
    }

    let tools = build_tools(&request.tools, options);
    if !tools.is_empty() {
        body.insert("tools".to_string(), Value::Array(tools));
    }
    Ok(Value::Object(body))
}

/// Converts request messages into history turns.
pub(crate) fn convert_messages(messages: &[Message]) -> Result<Vec<GeminiTurn>, LLMError> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(message: &Message) -> Result<GeminiTurn, LLMError> {
    let text = message.joined_text()?;
    let content = match (message.role, &message.tool) {
        (Role::System, _) => return Ok(GeminiTurn::Instruction(text)),
        (Role::User, _) => json!({ "role": "user", "parts": [ { "text": text } ] }),
        (Role::Assistant, _) => json!({ "role": "model", "parts": [ { "text": text } ] }),
        (Role::Tool, Some(call)) => json!({
            "role": "user",
            "parts": [ {
                "functionResponse": {
                    "id": call.id,
                    "name": call.name,
                    "response": { "output": text },
                }
            } ]
        }),
        (Role::Tool, None) => {
            return Err(LLMError::Validation {
                message: "tool message does not reference a tool call".to_string(),
            });
        }
    };
    Ok(GeminiTurn::Content(content))
}

fn build_generation_config(
    request: &InnerRequest,
    options: &GeminiRequestOptions,
) -> Map<String, Value> {
    let mut config = Map::new();
    let generation = &request.generation;
    if let Some(count) = generation.max_candidates {
        config.insert("candidateCount".to_string(), Value::from(count));
    }
    if let Some(max_tokens) = generation.max_tokens {
        config.insert("maxOutputTokens".to_string(), Value::from(max_tokens));
    }
    if let Some(temperature) = generation.temperature {
        config.insert("temperature".to_string(), Value::from(temperature));
    }
    if let Some(top_p) = generation.top_p {
        config.insert("topP".to_string(), Value::from(top_p));
    }
    if let Some(top_k) = options.top_k {
        config.insert("topK".to_string(), Value::from(top_k));
    }
    if let Some(schema) = request.effective_schema() {
        config.insert(
            "responseMimeType".to_string(),
            Value::String("application/json".to_string()),
        );
        config.insert("responseJsonSchema".to_string(), schema.clone());
    }
    if let Some(thinking) = &options.thinking {
        let mut thinking_config = Map::new();
        thinking_config.insert(
            "includeThoughts".to_string(),
            Value::Bool(thinking.include_thoughts),
        );
        if let Some(budget) = thinking.budget {
            thinking_config.insert("thinkingBudget".to_string(), Value::from(budget));
        }
        config.insert("thinkingConfig".to_string(), Value::Object(thinking_config));
    }
    config
}

fn build_tools<'a>(
    tools: impl IntoIterator<Item = (&'a String, &'a Tool)>,
    options: &GeminiRequestOptions,
) -> Vec<Value> {
    let declarations: Vec<Value> = tools
        .into_iter()
        .map(|(_, tool)| {
            json!({
                "name": tool.name(),
                "description": tool.description(),
                "parametersJsonSchema": tool.parameters(),
            })
        })
        .collect();

    let mut entries = Vec::new();
    if !declarations.is_empty() {
        entries.push(json!({ "functionDeclarations": declarations }));
    }
    if options.google_search {
        entries.push(json!({ "googleSearch": {} }));
    }
    entries
}
