//! The capability contract every backend implements.

use std::any::TypeId;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterSettings;
use crate::batch::{BatchStatus, BatchWaitResponse};
use crate::error::LLMError;
use crate::request::InnerRequest;
use crate::response::InnerResponse;
use crate::thread::ThreadId;
use crate::types::CapabilityDescriptor;

pub mod google_gemini;
pub mod openai_chat;
pub mod perplexity;
pub(crate) mod retry;

/// Backend contract consumed by the adapter.
///
/// A provider owns the conversation history of every thread it minted. Batch
/// operations are optional: the default implementations report
/// [`LLMError::UnsupportedFeature`] from submission and checks, and emit no result
/// from waiting.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Stable identifier used in errors and logs, such as `openai_chat`.
    fn name(&self) -> &'static str;

    /// One-time setup against the adapter settings, run when the adapter is built.
    fn init(&self, _settings: &AdapterSettings) -> Result<(), LLMError> {
        Ok(())
    }

    /// Executes one normalized request.
    async fn chat_completion(
        &self,
        ctx: &CancellationToken,
        settings: &AdapterSettings,
        request: &InnerRequest,
    ) -> Result<InnerResponse, LLMError>;

    /// Empties the history of a thread while keeping it usable.
    fn reset_thread(&self, thread: &ThreadId);

    /// Forks a thread into a new, independent one with the same messages.
    fn copy_thread(&self, thread: &ThreadId) -> ThreadId;

    /// Discards a thread's history entirely.
    fn close_thread(&self, thread: &ThreadId);

    /// Type of the provider-specific options accepted by this backend, if any.
    fn request_options_type(&self) -> Option<TypeId> {
        None
    }

    /// Describes optional capabilities.
    fn capabilities(&self) -> CapabilityDescriptor;

    /// Submits requests as one asynchronous job and returns the job identifier.
    async fn submit_batch(
        &self,
        _ctx: &CancellationToken,
        _settings: &AdapterSettings,
        _requests: &[&InnerRequest],
    ) -> Result<String, LLMError> {
        Err(batch_unsupported())
    }

    /// Reads the current state of a submitted job once.
    async fn check_batch(
        &self,
        _ctx: &CancellationToken,
        _job_id: &str,
    ) -> Result<BatchStatus, LLMError> {
        Err(batch_unsupported())
    }

    /// Waits for a job to reach a terminal state.
    ///
    /// Returns `None` when the context is cancelled or the backend has no batch
    /// support.
    async fn wait_batch(
        &self,
        _ctx: &CancellationToken,
        _job_id: &str,
    ) -> Option<BatchWaitResponse> {
        None
    }
}

/// Thread-safe provider handle.
pub type DynProvider = Arc<dyn LLMProvider>;

pub(crate) fn batch_unsupported() -> LLMError {
    LLMError::UnsupportedFeature {
        feature: "batch mode",
    }
}

/// Identity comparison between two provider handles.
pub(crate) fn same_provider(a: &DynProvider, b: &DynProvider) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
