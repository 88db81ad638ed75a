use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterSettings;
use crate::error::LLMError;
use crate::history::History;
use crate::http::{DynHttpTransport, HttpResponse, post_json_with_headers};
use crate::options::cast_provider_options;
use crate::provider::{LLMProvider, retry::retry_after_from_headers};
use crate::request::InnerRequest;
use crate::response::InnerResponse;
use crate::thread::ThreadId;
use crate::types::CapabilityDescriptor;

use super::error::parse_openai_error;
use super::options::OpenAiChatOptions;
use super::request::{build_openai_body, convert_messages};
use super::response::map_response;
use super::types::OpenAiChatResponse;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI Chat Completions backend.
///
/// Thread history is kept in the chat completions message format and replayed
/// in front of every threaded request.
pub struct OpenAiChatProvider {
    transport: Option<DynHttpTransport>,
    base_url: String,
    versioned_path: bool,
    api_key: String,
    api_key_header: Option<String>,
    organization: Option<String>,
    project: Option<String>,
    default_model: Option<String>,
    history: Arc<History<Value>>,
}

impl OpenAiChatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            transport: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            versioned_path: true,
            api_key: api_key.into(),
            api_key_header: None,
            organization: None,
            project: None,
            default_model: None,
            history: Arc::new(History::new()),
        }
    }

    /// Uses `transport` instead of the adapter's shared one.
    pub fn with_transport(mut self, transport: DynHttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Targets an OpenAI-compatible endpoint. A trailing `/v1` is accepted.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Posts to `{base}/chat/completions` without inserting `/v1`.
    pub(crate) fn without_version_prefix(mut self) -> Self {
        self.versioned_path = false;
        self
    }

    /// Sends the raw key in `header` instead of `Authorization: Bearer`, as
    /// gateways such as Azure OpenAI expect.
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = Some(header.into());
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") || !self.versioned_path {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        match &self.api_key_header {
            Some(header) => headers.insert(header.clone(), self.api_key.clone()),
            None => headers.insert(
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            ),
        };
        headers.insert("Accept".to_string(), "application/json".to_string());
        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), org.clone());
        }
        if let Some(project) = &self.project {
            headers.insert("OpenAI-Project".to_string(), project.clone());
        }
        headers
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, LLMError> {
        let retry_after = retry_after_from_headers(&response.headers);
        let status = response.status;
        let text = response.into_string()?;
        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(parse_openai_error(status, &text, retry_after))
        }
    }

    fn try_parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, LLMError> {
        serde_json::from_str(text).map_err(|err| LLMError::Provider {
            provider: self.name(),
            message: format!("failed to parse OpenAI response: {err}"),
        })
    }

    /// Sends one chat completion with `options` and returns the mapped response
    /// together with the body fields outside the OpenAI schema.
    pub(crate) async fn complete(
        &self,
        settings: &AdapterSettings,
        request: &InnerRequest,
        options: &OpenAiChatOptions,
    ) -> Result<(InnerResponse, Map<String, Value>), LLMError> {
        let model = request.resolve_model(self.default_model.as_deref(), settings)?;
        let history = request
            .thread
            .as_ref()
            .map(|thread| self.history.load(thread))
            .unwrap_or_default();
        let body = build_openai_body(request, &model, history, options)?;

        let transport = self.transport.as_ref().unwrap_or(settings.transport());
        tracing::debug!(model = %model, endpoint = %self.endpoint(), "sending OpenAI chat request");
        let response = post_json_with_headers(
            transport.as_ref(),
            self.endpoint(),
            self.build_headers(),
            &body,
        )
        .await?;
        let text = self.ensure_success(response)?;
        let mut parsed: OpenAiChatResponse = self.try_parse(&text)?;
        let extra = std::mem::take(&mut parsed.extra);

        if let Some(thread) = request.input_thread() {
            self.history
                .save_all(thread, convert_messages(&request.messages)?);
        }
        let response = map_response(parsed, &self.history, request.output_thread())?;
        Ok((response, extra))
    }
}

#[async_trait]
impl LLMProvider for OpenAiChatProvider {
    fn name(&self) -> &'static str {
        "openai_chat"
    }

    fn init(&self, _settings: &AdapterSettings) -> Result<(), LLMError> {
        if self.api_key.trim().is_empty() {
            return Err(LLMError::Auth {
                message: "openai_chat requires an API key".to_string(),
            });
        }
        Ok(())
    }

    async fn chat_completion(
        &self,
        _ctx: &CancellationToken,
        settings: &AdapterSettings,
        request: &InnerRequest,
    ) -> Result<InnerResponse, LLMError> {
        let options: OpenAiChatOptions = cast_provider_options(request.options_for(self));
        let (response, _) = self.complete(settings, request, &options).await?;
        Ok(response)
    }

    fn reset_thread(&self, thread: &ThreadId) {
        self.history.clear(thread);
    }

    fn copy_thread(&self, thread: &ThreadId) -> ThreadId {
        self.history.copy(thread)
    }

    fn close_thread(&self, thread: &ThreadId) {
        self.history.close(thread);
    }

    fn request_options_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<OpenAiChatOptions>())
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_tools: true,
            supports_structured_output: true,
            supports_batch: false,
            supports_grounding: false,
            supports_thoughts: false,
        }
    }
}
