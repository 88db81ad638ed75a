//! Asynchronous batch jobs.
//!
//! [`crate::adapter::Adapter::submit_batch`] hands a set of keyed requests to a
//! provider and returns a [`BatchPromise`] bound to the resulting job. The promise
//! can be polled once with [`BatchPromise::check`] or awaited with
//! [`BatchPromise::wait`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::provider::DynProvider;
use crate::response::InnerResponse;

/// Lifecycle of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchStatus {
    Pending,
    Running,
    Finished,
    Error,
}

impl BatchStatus {
    /// `Finished` and `Error` are terminal; a job never leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Finished | BatchStatus::Error)
    }
}

/// Outcome of one request of a batch, matched by the request id.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub key: String,
    pub result: Result<InnerResponse, LLMError>,
}

/// Terminal state of a batch job.
#[derive(Debug, Clone)]
pub struct BatchWaitResponse {
    pub status: BatchStatus,
    pub items: Vec<BatchItem>,
    /// Job-level failure, set when `status` is [`BatchStatus::Error`].
    pub error: Option<LLMError>,
}

impl BatchWaitResponse {
    /// Terminal response for a job that could not be completed.
    pub fn failed(error: LLMError) -> Self {
        Self {
            status: BatchStatus::Error,
            items: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Finished && self.error.is_none()
    }
}

/// Handle to a submitted job, bound to the provider that accepted it.
#[derive(Clone)]
pub struct BatchPromise {
    provider: DynProvider,
    provider_name: String,
    id: String,
}

impl BatchPromise {
    pub(crate) fn new(provider: DynProvider, provider_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider,
            provider_name: provider_name.into(),
            id: id.into(),
        }
    }

    /// Job identifier assigned by the provider.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registered name of the provider the job was submitted to.
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Reads the job status once.
    ///
    /// A failed check is reported as [`BatchStatus::Error`] together with the
    /// error; callers that want to retry can inspect it.
    pub async fn check(&self, ctx: &CancellationToken) -> (BatchStatus, Option<LLMError>) {
        let result = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(LLMError::aborted()),
            result = self.provider.check_batch(ctx, &self.id) => result,
        };
        match result {
            Ok(status) => (status, None),
            Err(err) => {
                tracing::warn!(job = %self.id, provider = %self.provider_name, "batch check failed: {err}");
                (BatchStatus::Error, Some(err))
            }
        }
    }

    /// Waits for the job to reach a terminal state.
    ///
    /// Returns `None` if `ctx` is cancelled first.
    pub async fn wait(&self, ctx: &CancellationToken) -> Option<BatchWaitResponse> {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => None,
            response = self.provider.wait_batch(ctx, &self.id) => response,
        }
    }
}

impl fmt::Debug for BatchPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchPromise")
            .field("provider", &self.provider_name)
            .field("id", &self.id)
            .finish()
    }
}

/// Polls a job every `interval` until it reports a terminal state.
///
/// `poll` returns `Ok(None)` while the job is still running. A poll error ends
/// the wait with [`BatchWaitResponse::failed`]; cancellation ends it with `None`.
pub async fn poll_until_terminal<F, Fut>(
    ctx: &CancellationToken,
    interval: Duration,
    mut poll: F,
) -> Option<BatchWaitResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<BatchWaitResponse>, LLMError>>,
{
    loop {
        let polled = tokio::select! {
            biased;
            _ = ctx.cancelled() => return None,
            polled = poll() => polled,
        };
        match polled {
            Ok(Some(response)) => return Some(response),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("batch polling failed: {err}");
                return Some(BatchWaitResponse::failed(err));
            }
        }

        tokio::select! {
            biased;
            _ = ctx.cancelled() => return None,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn terminal_states() {
        assert!(!BatchStatus::Pending.is_terminal());
        assert!(!BatchStatus::Running.is_terminal());
        assert!(BatchStatus::Finished.is_terminal());
        assert!(BatchStatus::Error.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_at_first_terminal_response() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let response = poll_until_terminal(
            &CancellationToken::new(),
            Duration::from_secs(30),
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Ok(None)
                    } else {
                        Ok(Some(BatchWaitResponse {
                            status: BatchStatus::Finished,
                            items: Vec::new(),
                            error: None,
                        }))
                    }
                }
            },
        )
        .await
        .expect("terminal response");

        assert!(response.is_success());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_error_becomes_failed_response() {
        let response = poll_until_terminal(&CancellationToken::new(), Duration::from_secs(1), || async {
            Err(LLMError::transport("connection reset"))
        })
        .await
        .expect("failed response");

        assert_eq!(response.status, BatchStatus::Error);
        assert!(matches!(response.error, Some(LLMError::Transport { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_polling_without_response() {
        let ctx = CancellationToken::new();
        let cancel = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(90)).await;
            cancel.cancel();
        });

        let response = poll_until_terminal(&ctx, Duration::from_secs(30), || async { Ok(None) }).await;
        assert!(response.is_none());
    }
}
