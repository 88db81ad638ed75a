use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GenerateContentResponse, also embedded in inline batch results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiGenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "modelVersion")]
    pub(crate) model_version: Option<String>,
    #[serde(default, rename = "responseId")]
    pub(crate) response_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    pub(crate) finish_reason: Option<String>,
    #[serde(default)]
    pub(crate) index: Option<usize>,
    #[serde(default, rename = "groundingMetadata")]
    pub(crate) grounding_metadata: Option<GeminiGroundingMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
    #[serde(default)]
    pub(crate) role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
    /// Marks a reasoning summary part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) thought: Option<bool>,
    #[serde(
        default,
        rename = "thoughtSignature",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) thought_signature: Option<String>,
    #[serde(
        default,
        rename = "functionCall",
        alias = "function_call",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GeminiGroundingMetadata {
    #[serde(default, rename = "webSearchQueries")]
    pub(crate) web_search_queries: Vec<String>,
    #[serde(default, rename = "groundingChunks")]
    pub(crate) grounding_chunks: Vec<GeminiGroundingChunk>,
    #[serde(default, rename = "groundingSupports")]
    pub(crate) grounding_supports: Vec<GeminiGroundingSupport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiGroundingChunk {
    #[serde(default)]
    pub(crate) web: Option<GeminiWebChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiWebChunk {
    #[serde(default)]
    pub(crate) uri: Option<String>,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiGroundingSupport {
    #[serde(default)]
    pub(crate) segment: Option<GeminiSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiSegment {
    #[serde(default)]
    pub(crate) text: Option<String>,
}

/// Long-running operation wrapping a batch job.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiBatchOperation {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) metadata: Option<GeminiBatchMetadata>,
    #[serde(default)]
    pub(crate) done: bool,
    #[serde(default)]
    pub(crate) error: Option<GeminiStatus>,
    #[serde(default)]
    pub(crate) response: Option<GeminiBatchOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiBatchMetadata {
    #[serde(default)]
    pub(crate) model: Option<String>,
    #[serde(default)]
    pub(crate) state: Option<String>,
    #[serde(default)]
    pub(crate) output: Option<GeminiBatchOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiBatchOutput {
    #[serde(default, rename = "inlinedResponses")]
    pub(crate) inlined_responses: Option<GeminiInlinedResponses>,
}

/// `inlinedResponses` is either a bare list or an object wrapping one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum GeminiInlinedResponses {
    List(Vec<GeminiInlinedResponse>),
    Nested {
        #[serde(default, rename = "inlinedResponses")]
        inlined_responses: Vec<GeminiInlinedResponse>,
    },
}

impl GeminiInlinedResponses {
    pub(crate) fn into_vec(self) -> Vec<GeminiInlinedResponse> {
        match self {
            GeminiInlinedResponses::List(items) => items,
            GeminiInlinedResponses::Nested { inlined_responses } => inlined_responses,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiInlinedResponse {
    #[serde(default)]
    pub(crate) metadata: Option<Value>,
    #[serde(default)]
    pub(crate) response: Option<GeminiGenerateContentResponse>,
    #[serde(default)]
    pub(crate) error: Option<GeminiStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiStatus {
    #[serde(default)]
    pub(crate) code: Option<i32>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}
