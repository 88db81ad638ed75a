//! Normalized responses and deferred candidate selection.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LLMError;
use crate::thread::ThreadId;

/// Why the model stopped generating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    ContentFilter,
    ToolCalls,
    /// Provider-specific reason passed through unchanged.
    Other(String),
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments, decoded by [`crate::tool::Tool::call`].
    pub parameters: Bytes,
}

/// Web sources a grounded answer was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    pub searches: Vec<String>,
    pub sources: Vec<GroundingSource>,
    pub snippets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub domain: String,
    pub url: String,
    /// Publication date, when the provider reports one.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

type SelectFn = Arc<dyn Fn() + Send + Sync>;

/// One alternative completion.
///
/// Providers attach a select action that commits the candidate to the thread
/// history of the request that produced it. Nothing is committed until
/// [`ResponseCandidate::select`] runs, and each call commits again.
#[derive(Clone)]
pub struct ResponseCandidate {
    pub text: String,
    pub finish_reason: FinishReason,
    pub tool_calls: Vec<ResponseToolCall>,
    pub grounding: Option<Grounding>,
    /// Reasoning summary, when the provider returns one.
    pub thoughts: Option<String>,
    select: Option<SelectFn>,
}

impl ResponseCandidate {
    pub fn new(text: impl Into<String>, finish_reason: FinishReason) -> Self {
        Self {
            text: text.into(),
            finish_reason,
            tool_calls: Vec::new(),
            grounding: None,
            thoughts: None,
            select: None,
        }
    }

    /// Attaches the commit action run by [`ResponseCandidate::select`].
    pub fn on_select(mut self, action: impl Fn() + Send + Sync + 'static) -> Self {
        self.select = Some(Arc::new(action));
        self
    }

    /// Commits this candidate to its thread, if the request had one.
    pub fn select(&self) {
        if let Some(action) = &self.select {
            action();
        }
    }
}

impl fmt::Debug for ResponseCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCandidate")
            .field("text", &self.text)
            .field("finish_reason", &self.finish_reason)
            .field("tool_calls", &self.tool_calls)
            .field("grounding", &self.grounding)
            .field("thoughts", &self.thoughts)
            .finish_non_exhaustive()
    }
}

/// Provider output before typing.
#[derive(Debug, Clone)]
pub struct InnerResponse {
    pub id: String,
    pub model: String,
    pub candidates: Vec<ResponseCandidate>,
    pub created: Option<SystemTime>,
}

/// Read access to the candidates of any response, whatever its output type.
pub trait Candidater {
    fn num_candidates(&self) -> usize;
    fn candidate(&self, index: usize) -> Result<&ResponseCandidate, LLMError>;
    /// Thread the originating request ran in.
    fn thread(&self) -> Option<&Arc<ThreadId>>;
}

/// Typed result of [`crate::request::Request::execute`].
///
/// `T` is the shape candidates decode into. For `String` the raw candidate text
/// is returned, anything else is decoded from JSON.
pub struct Response<T = String> {
    inner: InnerResponse,
    thread: Option<Arc<ThreadId>>,
    _output: PhantomData<fn() -> T>,
}

impl<T> Clone for Response<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            thread: self.thread.clone(),
            _output: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Response<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("inner", &self.inner)
            .field("thread", &self.thread)
            .finish()
    }
}

impl<T> Response<T> {
    pub fn from_inner(inner: InnerResponse, thread: Option<Arc<ThreadId>>) -> Self {
        Self {
            inner,
            thread,
            _output: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn model(&self) -> &str {
        &self.inner.model
    }

    pub fn inner(&self) -> &InnerResponse {
        &self.inner
    }

    pub fn into_inner(self) -> InnerResponse {
        self.inner
    }

    pub fn num_candidates(&self) -> usize {
        self.inner.candidates.len()
    }

    pub fn candidate(&self, index: usize) -> Result<&ResponseCandidate, LLMError> {
        self.inner
            .candidates
            .get(index)
            .ok_or(LLMError::MissingCandidate {
                index,
                available: self.inner.candidates.len(),
            })
    }

    pub fn thread(&self) -> Option<&Arc<ThreadId>> {
        self.thread.as_ref()
    }
}

impl<T: DeserializeOwned + 'static> Response<T> {
    /// Decodes candidate `index`.
    ///
    /// # Errors
    ///
    /// [`LLMError::MissingCandidate`] for an out-of-range index and
    /// [`LLMError::Decode`] when the text does not match `T`.
    pub fn get(&self, index: usize) -> Result<T, LLMError> {
        decode_text(&self.candidate(index)?.text)
    }

    /// Decodes every candidate in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<T, LLMError>> + '_ {
        self.inner
            .candidates
            .iter()
            .map(|candidate| decode_text(&candidate.text))
    }
}

impl<T> Candidater for Response<T> {
    fn num_candidates(&self) -> usize {
        Response::num_candidates(self)
    }

    fn candidate(&self, index: usize) -> Result<&ResponseCandidate, LLMError> {
        Response::candidate(self, index)
    }

    fn thread(&self) -> Option<&Arc<ThreadId>> {
        Response::thread(self)
    }
}

fn decode_text<T: DeserializeOwned + 'static>(text: &str) -> Result<T, LLMError> {
    let decoded = if TypeId::of::<T>() == TypeId::of::<String>() {
        serde_json::from_value(Value::String(text.to_string()))
    } else {
        serde_json::from_str(text)
    };
    decoded.map_err(|err| LLMError::Decode {
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq, Deserialize)]
    struct Output {
        reply: String,
    }

    fn response_with<T>(texts: &[&str]) -> Response<T> {
        Response::from_inner(
            InnerResponse {
                id: "resp-1".into(),
                model: "mock".into(),
                candidates: texts
                    .iter()
                    .map(|text| ResponseCandidate::new(*text, FinishReason::Stop))
                    .collect(),
                created: None,
            },
            None,
        )
    }

    #[test]
    fn typed_get_decodes_json() {
        let response: Response<Output> = response_with(&[r#"{"reply":"ok"}"#]);
        assert_eq!(
            response.get(0).expect("decode"),
            Output {
                reply: "ok".into()
            }
        );
    }

    #[test]
    fn truncated_json_is_a_decode_error() {
        let response: Response<Output> = response_with(&[r#"{"reply":"#]);
        match response.get(0).expect_err("truncated") {
            LLMError::Decode { .. } => {}
            other => panic!("unexpected error type: {other:?}"),
        }
        // raw text stays available for inspection
        assert_eq!(response.candidate(0).expect("candidate").text, r#"{"reply":"#);
    }

    #[test]
    fn string_responses_return_raw_text() {
        let response: Response = response_with(&["not { json", "second"]);
        assert_eq!(response.get(0).expect("text"), "not { json");
        let all: Vec<String> = response.iter().collect::<Result<_, _>>().expect("iter");
        assert_eq!(all, vec!["not { json", "second"]);
    }

    #[test]
    fn missing_candidate_reports_count() {
        let response: Response = response_with(&["only"]);
        let err = response.get(3).expect_err("out of range");
        assert_eq!(err.to_string(), "candidate 3 does not exist (1 candidates)");
    }

    #[test]
    fn select_runs_action_each_time() {
        let selected = Arc::new(AtomicUsize::new(0));
        let counter = selected.clone();
        let candidate = ResponseCandidate::new("hi", FinishReason::Stop).on_select(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        candidate.select();
        candidate.clone().select();
        assert_eq!(selected.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn select_without_action_is_inert() {
        ResponseCandidate::new("hi", FinishReason::Stop).select();
    }
}
