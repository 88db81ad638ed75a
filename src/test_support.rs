//! In-crate doubles for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterSettings;
use crate::error::LLMError;
use crate::history::History;
use crate::http::{DynHttpTransport, HttpRequest, HttpResponse, HttpTransport};
use crate::provider::{DynProvider, LLMProvider};
use crate::request::InnerRequest;
use crate::response::{FinishReason, InnerResponse, ResponseCandidate};
use crate::thread::ThreadId;
use crate::types::CapabilityDescriptor;

/// Echoes the last message back and keeps text history.
pub(crate) struct StubProvider {
    history: Arc<History<String>>,
    fail_init: bool,
}

impl StubProvider {
    pub(crate) fn new() -> Self {
        Self {
            history: Arc::new(History::new()),
            fail_init: false,
        }
    }

    pub(crate) fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl LLMProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn init(&self, _settings: &AdapterSettings) -> Result<(), LLMError> {
        if self.fail_init {
            return Err(LLMError::Auth {
                message: "missing key".to_string(),
            });
        }
        Ok(())
    }

    async fn chat_completion(
        &self,
        _ctx: &CancellationToken,
        _settings: &AdapterSettings,
        request: &InnerRequest,
    ) -> Result<InnerResponse, LLMError> {
        let text = match request.messages.last() {
            Some(message) => message.joined_text()?,
            None => String::new(),
        };
        if let Some(thread) = request.input_thread() {
            for message in &request.messages {
                self.history.save(thread, message.joined_text()?);
            }
        }

        let mut candidate = ResponseCandidate::new(text.clone(), FinishReason::Stop);
        if let Some(thread) = request.output_thread().cloned() {
            let history = self.history.clone();
            candidate = candidate.on_select(move || history.save(&thread, text.clone()));
        }
        Ok(InnerResponse {
            id: "stub-response".to_string(),
            model: request.model.clone().unwrap_or_else(|| "stub".to_string()),
            candidates: vec![candidate],
            created: None,
        })
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

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::default()
    }
}

pub(crate) fn stub_provider() -> DynProvider {
    Arc::new(StubProvider::new())
}

/// Transport that fails every call.
struct NullTransport;

#[async_trait]
impl HttpTransport for NullTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        Err(LLMError::transport(format!("no network in tests: {}", request.url)))
    }
}

pub(crate) fn null_transport() -> DynHttpTransport {
    Arc::new(NullTransport)
}

/// Transport recording every request and failing it like [`null_transport`].
#[derive(Default)]
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingTransport {
    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        let url = request.url.clone();
        self.requests.lock().push(request);
        Err(LLMError::transport(format!("no network in tests: {url}")))
    }
}
