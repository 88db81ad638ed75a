use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::options::ProviderRequestOptions;

/// How much hidden reasoning a reasoning model should spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

/// Request options understood only by the OpenAI chat backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenAiChatOptions {
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub seed: Option<i64>,
    /// Raw fields merged into the request body last, such as `service_tier`.
    pub extra: BTreeMap<String, Value>,
}

impl ProviderRequestOptions for OpenAiChatOptions {}
