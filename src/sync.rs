//! Concurrent execution of several requests.

use futures_util::StreamExt;
use futures_util::future::join_all;
use futures_util::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;

use crate::adapter::Adapter;
use crate::error::LLMError;
use crate::request::Request;
use crate::response::Response;

/// Executes every request concurrently and waits for all of them.
///
/// Results are returned in input order; a failing request does not affect the
/// others.
pub async fn all<T>(
    ctx: &CancellationToken,
    adapter: &Adapter,
    requests: &[Request<T>],
) -> Vec<Result<Response<T>, LLMError>> {
    join_all(requests.iter().map(|request| request.execute(ctx, adapter))).await
}

/// Executes every request concurrently and returns the first success.
///
/// As soon as one request succeeds the others are cancelled through a child of
/// `ctx`.
///
/// # Errors
///
/// - [`LLMError::AllFailed`] with every error in input order when no request
///   succeeds.
/// - [`LLMError::Aborted`] when `ctx` itself is cancelled.
/// - [`LLMError::Validation`] for an empty request list.
pub async fn race<T>(
    ctx: &CancellationToken,
    adapter: &Adapter,
    requests: &[Request<T>],
) -> Result<Response<T>, LLMError> {
    if requests.is_empty() {
        return Err(LLMError::Validation {
            message: "race requires at least one request".to_string(),
        });
    }

    let scope = ctx.child_token();
    let scope_ref = &scope;
    let mut pending: FuturesUnordered<_> = requests
        .iter()
        .enumerate()
        .map(|(index, request)| async move { (index, request.execute(scope_ref, adapter).await) })
        .collect();

    let mut errors: Vec<Option<LLMError>> = vec![None; requests.len()];
    while let Some((index, result)) = pending.next().await {
        match result {
            Ok(response) => {
                scope.cancel();
                tracing::debug!(winner = index, "race settled");
                return Ok(response);
            }
            Err(err) => errors[index] = Some(err),
        }
    }

    if ctx.is_cancelled() {
        return Err(LLMError::aborted());
    }
    Err(LLMError::AllFailed {
        errors: errors.into_iter().flatten().collect(),
    })
}
