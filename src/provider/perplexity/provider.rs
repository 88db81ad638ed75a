use std::any::TypeId;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterSettings;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::options::cast_provider_options;
use crate::provider::LLMProvider;
use crate::provider::openai_chat::{OpenAiChatOptions, OpenAiChatProvider};
use crate::request::InnerRequest;
use crate::response::InnerResponse;
use crate::thread::ThreadId;
use crate::types::CapabilityDescriptor;

use super::options::PerplexityOptions;
use super::response::grounding_from_search_results;

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

/// Perplexity chat completions.
///
/// Requests and thread history go through the OpenAI chat backend; search
/// filters come from [`PerplexityOptions`] and the returned search results are
/// attached to every candidate as grounding.
pub struct PerplexityProvider {
    chat: OpenAiChatProvider,
}

impl PerplexityProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            chat: OpenAiChatProvider::new(api_key)
                .with_base_url(DEFAULT_BASE_URL)
                .without_version_prefix(),
        }
    }

    /// Uses `transport` instead of the adapter's shared one.
    pub fn with_transport(mut self, transport: DynHttpTransport) -> Self {
        self.chat = self.chat.with_transport(transport);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.chat = self.chat.with_base_url(base_url);
        self
    }

    /// Sets a default model such as `sonar` when the request omits one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.chat = self.chat.with_default_model(model);
        self
    }

    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.chat = self.chat.with_api_key_header(header);
        self
    }
}

#[async_trait]
impl LLMProvider for PerplexityProvider {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    fn init(&self, settings: &AdapterSettings) -> Result<(), LLMError> {
        self.chat.init(settings).map_err(|_| LLMError::Auth {
            message: "perplexity requires an API key".to_string(),
        })
    }

    async fn chat_completion(
        &self,
        _ctx: &CancellationToken,
        settings: &AdapterSettings,
        request: &InnerRequest,
    ) -> Result<InnerResponse, LLMError> {
        let options: PerplexityOptions = cast_provider_options(request.options_for(self));
        let chat_options = OpenAiChatOptions {
            extra: options.body_fields()?,
            ..OpenAiChatOptions::default()
        };
        let (mut response, extra) = self.chat.complete(settings, request, &chat_options).await?;

        if let Some(results) = extra.get("search_results") {
            let grounding = grounding_from_search_results(results)?;
            for candidate in &mut response.candidates {
                candidate.grounding = Some(grounding.clone());
            }
        }
        Ok(response)
    }

    fn reset_thread(&self, thread: &ThreadId) {
        self.chat.reset_thread(thread);
    }

    fn copy_thread(&self, thread: &ThreadId) -> ThreadId {
        self.chat.copy_thread(thread)
    }

    fn close_thread(&self, thread: &ThreadId) {
        self.chat.close_thread(thread);
    }

    fn request_options_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<PerplexityOptions>())
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_tools: false,
            supports_structured_output: true,
            supports_batch: false,
            supports_grounding: true,
            supports_thoughts: false,
        }
    }
}
