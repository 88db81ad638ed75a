use crate::options::ProviderRequestOptions;

/// Request options understood only by the Gemini backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeminiRequestOptions {
    /// Lets the model ground its answer with Google Search.
    pub google_search: bool,
    pub top_k: Option<u32>,
    pub thinking: Option<ThinkingOptions>,
}

/// Reasoning controls for thinking models.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThinkingOptions {
    /// Return reasoning summaries as candidate thoughts.
    pub include_thoughts: bool,
    /// Token budget for reasoning; `Some(0)` disables it, `Some(-1)` lets the model decide.
    pub budget: Option<i32>,
}

impl ProviderRequestOptions for GeminiRequestOptions {}
