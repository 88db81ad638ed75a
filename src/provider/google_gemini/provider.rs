use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterSettings;
use crate::batch::{BatchStatus, BatchWaitResponse, poll_until_terminal};
use crate::error::LLMError;
use crate::history::History;
use crate::http::{DynHttpTransport, HttpResponse, HttpTransport, get_with_headers, post_json_with_headers};
use crate::options::cast_provider_options;
use crate::provider::{LLMProvider, retry::retry_after_from_headers};
use crate::request::InnerRequest;
use crate::response::InnerResponse;
use crate::thread::ThreadId;
use crate::types::CapabilityDescriptor;

use super::batch::{build_batch_body, completed_response, operation_status};
use super::error::parse_gemini_error;
use super::options::GeminiRequestOptions;
use super::request::{GeminiTurn, build_gemini_body, convert_messages};
use super::response::map_response;
use super::types::{GeminiBatchOperation, GeminiGenerateContentResponse};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_BATCH_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Google Gemini GenerateContent backend with inline batch support.
pub struct GoogleGeminiProvider {
    transport: Option<DynHttpTransport>,
    base_url: String,
    api_key: String,
    api_key_header: Option<String>,
    default_model: Option<String>,
    batch_poll_interval: Duration,
    history: Arc<History<GeminiTurn>>,
    /// Transport batches were submitted through; jobs are polled on it.
    batch_transport: Mutex<Option<DynHttpTransport>>,
}

impl GoogleGeminiProvider {
    /// Creates a provider that targets the default Google Generative Language endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            transport: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            api_key_header: None,
            default_model: None,
            batch_poll_interval: DEFAULT_BATCH_POLL_INTERVAL,
            history: Arc::new(History::new()),
            batch_transport: Mutex::new(None),
        }
    }

    /// Uses `transport` instead of the adapter's shared one.
    pub fn with_transport(mut self, transport: DynHttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the base URL, making it easier to point at proxies or compatibility layers.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sends the key in `header` instead of `x-goog-api-key`.
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = Some(header.into());
        self
    }

    /// Sets a default model such as `gemini-2.5-flash` when the request omits one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// How often [`LLMProvider::wait_batch`] polls a running job.
    pub fn with_batch_poll_interval(mut self, interval: Duration) -> Self {
        self.batch_poll_interval = interval;
        self
    }

    fn api_base(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1beta") {
            base.to_string()
        } else {
            format!("{base}/v1beta")
        }
    }

    pub(crate) fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.api_base(), normalize_model(model))
    }

    pub(crate) fn batch_endpoint(&self, model: &str) -> String {
        format!("{}/{}:batchGenerateContent", self.api_base(), normalize_model(model))
    }

    pub(crate) fn operation_endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.api_base(), name.trim_start_matches('/'))
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        let key_header = self.api_key_header.as_deref().unwrap_or("x-goog-api-key");
        headers.insert(key_header.to_string(), self.api_key.clone());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    fn transport_for(&self, settings: &AdapterSettings) -> DynHttpTransport {
        self.transport
            .clone()
            .unwrap_or_else(|| settings.transport().clone())
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, LLMError> {
        let HttpResponse {
            status,
            headers,
            body,
        } = response;
        let text = String::from_utf8(body).map_err(|err| LLMError::transport(err.to_string()))?;
        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(parse_gemini_error(
                status,
                &text,
                retry_after_from_headers(&headers),
            ))
        }
    }

    fn try_parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, LLMError> {
        serde_json::from_str(text).map_err(|err| LLMError::Provider {
            provider: self.name(),
            message: format!("failed to parse Gemini response: {err}"),
        })
    }

    fn batch_transport(&self) -> Result<DynHttpTransport, LLMError> {
        self.batch_transport
            .lock()
            .clone()
            .ok_or_else(|| LLMError::Validation {
                message: "no batch was submitted through this provider".to_string(),
            })
    }

    async fn fetch_operation(
        &self,
        transport: &dyn HttpTransport,
        job_id: &str,
    ) -> Result<GeminiBatchOperation, LLMError> {
        let response =
            get_with_headers(transport, self.operation_endpoint(job_id), self.build_headers())
                .await?;
        let text = self.ensure_success(response)?;
        self.try_parse(&text)
    }
}

fn normalize_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl LLMProvider for GoogleGeminiProvider {
    fn name(&self) -> &'static str {
        "google_gemini"
    }

    fn init(&self, _settings: &AdapterSettings) -> Result<(), LLMError> {
        if self.api_key.trim().is_empty() {
            return Err(LLMError::Auth {
                message: "google_gemini requires an API key".to_string(),
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
        let model = request.resolve_model(self.default_model.as_deref(), settings)?;
        let options: GeminiRequestOptions = cast_provider_options(request.options_for(self));
        let history = request
            .thread
            .as_ref()
            .map(|thread| self.history.load(thread))
            .unwrap_or_default();
        let body = build_gemini_body(request, &history, &options)?;

        let endpoint = self.endpoint(&model);
        tracing::debug!(model = %model, endpoint = %endpoint, "sending Gemini request");
        let transport = self.transport_for(settings);
        let response =
            post_json_with_headers(transport.as_ref(), endpoint, self.build_headers(), &body)
                .await?;
        let text = self.ensure_success(response)?;
        let parsed: GeminiGenerateContentResponse = self.try_parse(&text)?;

        if let Some(thread) = request.input_thread() {
            self.history
                .save_all(thread, convert_messages(&request.messages)?);
        }
        map_response(parsed, &model, &self.history, request.output_thread())
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
        Some(TypeId::of::<GeminiRequestOptions>())
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_tools: true,
            supports_structured_output: true,
            supports_batch: true,
            supports_grounding: true,
            supports_thoughts: true,
        }
    }

    async fn submit_batch(
        &self,
        _ctx: &CancellationToken,
        settings: &AdapterSettings,
        requests: &[&InnerRequest],
    ) -> Result<String, LLMError> {
        let mut model: Option<String> = None;
        let mut entries = Vec::with_capacity(requests.len());
        for request in requests {
            let request_model = request.resolve_model(self.default_model.as_deref(), settings)?;
            match &model {
                Some(existing) if *existing != request_model => {
                    return Err(LLMError::Validation {
                        message: format!(
                            "all requests in a Gemini batch must use the same model ({existing} != {request_model})"
                        ),
                    });
                }
                Some(_) => {}
                None => model = Some(request_model),
            }

            let key = request.id.clone().ok_or_else(|| LLMError::Validation {
                message: "all requests in a batch must have an ID".to_string(),
            })?;
            let options: GeminiRequestOptions = cast_provider_options(request.options_for(self));
            let history = request
                .thread
                .as_ref()
                .map(|thread| self.history.load(thread))
                .unwrap_or_default();
            entries.push((key, build_gemini_body(request, &history, &options)?));
        }
        let model = model.ok_or_else(|| LLMError::Validation {
            message: "a batch needs at least one request".to_string(),
        })?;

        let transport = self.transport_for(settings);
        let body = build_batch_body("kotoba-adapter batch", entries);
        let response = post_json_with_headers(
            transport.as_ref(),
            self.batch_endpoint(&model),
            self.build_headers(),
            &body,
        )
        .await?;
        let text = self.ensure_success(response)?;
        let operation: GeminiBatchOperation = self.try_parse(&text)?;

        tracing::debug!(job = %operation.name, model = %model, "Gemini batch created");
        *self.batch_transport.lock() = Some(transport);
        Ok(operation.name)
    }

    async fn check_batch(
        &self,
        _ctx: &CancellationToken,
        job_id: &str,
    ) -> Result<BatchStatus, LLMError> {
        let transport = self.batch_transport()?;
        let operation = self.fetch_operation(transport.as_ref(), job_id).await?;
        Ok(operation_status(&operation))
    }

    async fn wait_batch(
        &self,
        ctx: &CancellationToken,
        job_id: &str,
    ) -> Option<BatchWaitResponse> {
        let transport = match self.batch_transport() {
            Ok(transport) => transport,
            Err(err) => return Some(BatchWaitResponse::failed(err)),
        };
        let transport = transport.as_ref();
        let model = self.default_model.as_deref().unwrap_or_default();
        poll_until_terminal(ctx, self.batch_poll_interval, || async move {
            let operation = self.fetch_operation(transport, job_id).await?;
            Ok::<_, LLMError>(completed_response(operation, model))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_share_versioned_base() {
        let provider = GoogleGeminiProvider::new("key");
        assert_eq!(
            provider.endpoint("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        let provider = GoogleGeminiProvider::new("key").with_base_url("http://proxy/v1beta/");
        assert_eq!(
            provider.batch_endpoint("models/gemini-2.5-flash"),
            "http://proxy/v1beta/models/gemini-2.5-flash:batchGenerateContent"
        );
        assert_eq!(
            provider.operation_endpoint("batches/abc"),
            "http://proxy/v1beta/batches/abc"
        );
    }

    #[test]
    fn key_header_can_be_renamed() {
        let headers = GoogleGeminiProvider::new("key").build_headers();
        assert_eq!(headers["x-goog-api-key"], "key");

        let headers = GoogleGeminiProvider::new("key")
            .with_api_key_header("x-proxy-key")
            .build_headers();
        assert_eq!(headers["x-proxy-key"], "key");
        assert!(!headers.contains_key("x-goog-api-key"));
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let provider = GoogleGeminiProvider::new("key");
        let ctx = CancellationToken::new();
        let err = provider
            .check_batch(&ctx, "batches/missing")
            .await
            .expect_err("unknown job");
        assert!(matches!(err, LLMError::Validation { .. }));

        let response = provider
            .wait_batch(&ctx, "batches/missing")
            .await
            .expect("failed response");
        assert_eq!(response.status, BatchStatus::Error);
    }
}
