#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kotoba_adapter::adapter::AdapterSettings;
use kotoba_adapter::batch::{BatchStatus, BatchWaitResponse};
use kotoba_adapter::error::LLMError;
use kotoba_adapter::history::History;
use kotoba_adapter::http::{DynHttpTransport, HttpRequest, HttpResponse, HttpTransport};
use kotoba_adapter::provider::LLMProvider;
use kotoba_adapter::request::InnerRequest;
use kotoba_adapter::response::{FinishReason, InnerResponse, ResponseCandidate};
use kotoba_adapter::thread::ThreadId;
use kotoba_adapter::types::CapabilityDescriptor;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Scripted reply of [`MockProvider`].
#[derive(Clone)]
pub enum Reply {
    /// Candidates with these texts.
    Texts(Vec<&'static str>),
    Fail(LLMError),
}

struct Step {
    delay: Duration,
    reply: Reply,
}

/// In-memory provider that replays scripted replies and keeps a text history.
///
/// Every saved entry is `"<role>: <text>"`.
pub struct MockProvider {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    cancelled: AtomicUsize,
    seen: Mutex<Vec<InnerRequest>>,
    history: Arc<History<String>>,
    batch_statuses: Mutex<VecDeque<Result<BatchStatus, LLMError>>>,
    batch_result: Mutex<Option<BatchWaitResponse>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            history: Arc::new(History::new()),
            batch_statuses: Mutex::new(VecDeque::new()),
            batch_result: Mutex::new(None),
        }
    }

    pub fn reply(self, texts: Vec<&'static str>) -> Self {
        self.reply_after(Duration::ZERO, Reply::Texts(texts))
    }

    pub fn fail(self, err: LLMError) -> Self {
        self.reply_after(Duration::ZERO, Reply::Fail(err))
    }

    pub fn reply_after(self, delay: Duration, reply: Reply) -> Self {
        self.steps.lock().push_back(Step { delay, reply });
        self
    }

    pub fn batch_statuses(self, statuses: Vec<Result<BatchStatus, LLMError>>) -> Self {
        *self.batch_statuses.lock() = statuses.into();
        self
    }

    pub fn batch_result(self, result: BatchWaitResponse) -> Self {
        *self.batch_result.lock() = Some(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<InnerRequest> {
        self.seen.lock().clone()
    }

    pub fn history(&self, thread: &ThreadId) -> Vec<String> {
        self.history.load(thread)
    }

    pub fn thread_count(&self) -> usize {
        self.history.thread_count()
    }

    fn next_step(&self) -> Step {
        self.steps.lock().pop_front().unwrap_or(Step {
            delay: Duration::ZERO,
            reply: Reply::Texts(vec!["ok"]),
        })
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn chat_completion(
        &self,
        ctx: &CancellationToken,
        _settings: &AdapterSettings,
        request: &InnerRequest,
    ) -> Result<InnerResponse, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(request.clone());
        let step = self.next_step();

        tokio::select! {
            _ = ctx.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                return Err(LLMError::Aborted { message: "mock cancelled".to_string() });
            }
            _ = tokio::time::sleep(step.delay) => {}
        }

        let texts = match step.reply {
            Reply::Texts(texts) => texts,
            Reply::Fail(err) => return Err(err),
        };
        if let Some(thread) = request.input_thread() {
            for message in &request.messages {
                let entry = format!("{}: {}", message.role.as_str(), message.joined_text()?);
                self.history.save(thread, entry);
            }
        }

        let candidates = texts
            .into_iter()
            .map(|text| {
                let candidate = ResponseCandidate::new(text, FinishReason::Stop);
                match request.output_thread().cloned() {
                    Some(thread) => {
                        let history = self.history.clone();
                        candidate.on_select(move || {
                            history.save(&thread, format!("assistant: {text}"))
                        })
                    }
                    None => candidate,
                }
            })
            .collect();

        Ok(InnerResponse {
            id: format!("mock-{}", self.calls()),
            model: request.model.clone().unwrap_or_else(|| "mock-model".to_string()),
            candidates,
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
        CapabilityDescriptor {
            supports_batch: true,
            ..CapabilityDescriptor::default()
        }
    }

    async fn submit_batch(
        &self,
        _ctx: &CancellationToken,
        _settings: &AdapterSettings,
        requests: &[&InnerRequest],
    ) -> Result<String, LLMError> {
        self.seen
            .lock()
            .extend(requests.iter().map(|request| (*request).clone()));
        Ok(format!("job-{}", requests.len()))
    }

    async fn check_batch(
        &self,
        _ctx: &CancellationToken,
        _job_id: &str,
    ) -> Result<BatchStatus, LLMError> {
        self.batch_statuses
            .lock()
            .pop_front()
            .unwrap_or(Ok(BatchStatus::Running))
    }

    async fn wait_batch(
        &self,
        ctx: &CancellationToken,
        _job_id: &str,
    ) -> Option<BatchWaitResponse> {
        let result = self.batch_result.lock().clone();
        match result {
            Some(result) => Some(result),
            None => {
                ctx.cancelled().await;
                None
            }
        }
    }
}

/// Transport replaying queued responses and recording every request.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.push_with_headers(status, body, HashMap::new());
    }

    pub fn push_with_headers(&self, status: u16, body: Value, headers: HashMap<String, String>) {
        self.responses.lock().push_back(HttpResponse {
            status,
            headers,
            body: serde_json::to_vec(&body).expect("serialize mock body"),
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Decoded JSON body of the `index`-th request.
    pub fn request_json(&self, index: usize) -> Value {
        let requests = self.requests.lock();
        let body = requests[index].body.as_ref().expect("request body");
        serde_json::from_slice(body).expect("request json")
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| LLMError::transport("no scripted response left"))
    }
}

pub fn dyn_transport(transport: &Arc<MockTransport>) -> DynHttpTransport {
    transport.clone()
}
