//! Request builder.
//!
//! [`Request`] is an owned value: every builder step consumes it and returns the
//! updated request, so a partially built request can be cloned and forked. The
//! first failing step is remembered and turns every later step into a no-op;
//! [`Request::execute`] then reports it.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::adapter::{Adapter, AdapterSettings};
use crate::error::LLMError;
use crate::options::{ProviderOptions, ProviderRequestOptions};
use crate::provider::LLMProvider;
use crate::response::{Candidater, Response, ResponseCandidate};
use crate::schema::generate_schema;
use crate::serializer::Serializer;
use crate::thread::ThreadId;
use crate::tool::Tool;
use crate::types::{GenerationOptions, Message, Role, ToolCallRef};

const DEFAULT_SCHEMA_NAME: &str = "response";

/// Normalized request handed to providers.
#[derive(Debug, Clone, Default)]
pub struct InnerRequest {
    /// Key identifying the request inside a batch.
    pub id: Option<String>,
    /// Registered provider name; the adapter default when absent.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub thread: Option<Arc<ThreadId>>,
    pub messages: Vec<Message>,
    /// Schema generated from the response type.
    pub response_schema: Option<Value>,
    pub schema_name: Option<String>,
    pub schema_description: Option<String>,
    /// Replaces the generated schema on the wire.
    pub schema_override: Option<Value>,
    pub tools: BTreeMap<String, Tool>,
    pub generation: GenerationOptions,
    pub skip_save_input: bool,
    pub skip_save_output: bool,
    pub provider_options: ProviderOptions,
}

impl InnerRequest {
    /// Schema to send, if the request expects structured output.
    pub fn effective_schema(&self) -> Option<&Value> {
        self.schema_override
            .as_ref()
            .or(self.response_schema.as_ref())
    }

    pub fn schema_name(&self) -> &str {
        self.schema_name.as_deref().unwrap_or(DEFAULT_SCHEMA_NAME)
    }

    /// Thread the inputs should be recorded in.
    pub fn input_thread(&self) -> Option<&Arc<ThreadId>> {
        self.thread.as_ref().filter(|_| !self.skip_save_input)
    }

    /// Thread a selected candidate should be recorded in.
    pub fn output_thread(&self) -> Option<&Arc<ThreadId>> {
        self.thread.as_ref().filter(|_| !self.skip_save_output)
    }

    /// Picks the request model, then the provider default, then the adapter default.
    pub fn resolve_model(
        &self,
        provider_default: Option<&str>,
        settings: &AdapterSettings,
    ) -> Result<String, LLMError> {
        self.model
            .as_deref()
            .or(provider_default)
            .or(settings.default_model())
            .map(str::to_string)
            .ok_or_else(|| LLMError::Validation {
                message: "no model was configured".to_string(),
            })
    }

    /// Options entry matching the type `provider` advertises.
    pub fn options_for(&self, provider: &dyn LLMProvider) -> Option<&(dyn Any + Send + Sync)> {
        provider
            .request_options_type()
            .and_then(|type_id| self.provider_options.get_by_type(type_id))
    }

    pub fn provider_options<O: ProviderRequestOptions>(&self) -> Option<&O> {
        self.provider_options.get::<O>()
    }
}

/// Object-safe view of a request, whatever its output type.
pub trait Requester: Send + Sync {
    fn to_request(&self) -> &InnerRequest;
    /// First error recorded while building.
    fn error(&self) -> Option<&LLMError>;
}

/// Chainable request whose candidates decode into `T`.
pub struct Request<T = String> {
    inner: InnerRequest,
    create_thread: bool,
    candidate: Option<ResponseCandidate>,
    error: Option<LLMError>,
    _output: PhantomData<fn() -> T>,
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            create_thread: self.create_thread,
            candidate: self.candidate.clone(),
            error: self.error.clone(),
            _output: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("inner", &self.inner)
            .field("create_thread", &self.create_thread)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Request<String> {
    /// Request whose candidates are plain text.
    pub fn untyped() -> Self {
        Self::from_inner(InnerRequest::default())
    }
}

impl<T: JsonSchema + 'static> Request<T> {
    /// Request whose candidates decode into `T`.
    ///
    /// A JSON schema generated from `T` is attached unless `T` is `String`.
    pub fn new() -> Self {
        let response_schema =
            (TypeId::of::<T>() != TypeId::of::<String>()).then(generate_schema::<T>);
        Self::from_inner(InnerRequest {
            response_schema,
            ..InnerRequest::default()
        })
    }
}

impl<T: JsonSchema + 'static> Default for Request<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Request<T> {
    fn from_inner(inner: InnerRequest) -> Self {
        Self {
            inner,
            create_thread: false,
            candidate: None,
            error: None,
            _output: PhantomData,
        }
    }

    fn apply(mut self, step: impl FnOnce(&mut Self) -> Result<(), LLMError>) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Err(err) = step(&mut self) {
            self.error = Some(err);
        }
        self
    }

    fn append(&mut self, message: Message) -> Result<(), LLMError> {
        message.validate()?;
        self.inner.messages.push(message);
        Ok(())
    }

    fn push_message(self, message: Message) -> Self {
        self.apply(|request| request.append(message))
    }

    /// Targets a registered provider by name.
    pub fn with_provider(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.apply(|request| {
            request.inner.provider = Some(name);
            Ok(())
        })
    }

    pub fn with_model(self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.apply(|request| {
            request.inner.model = Some(model);
            Ok(())
        })
    }

    /// Key used to match results of a batch.
    pub fn with_id(self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.apply(|request| {
            request.inner.id = Some(id);
            Ok(())
        })
    }

    /// Opens a new thread on the resolved provider when executed.
    pub fn create_thread(self) -> Self {
        self.apply(|request| {
            request.create_thread = true;
            Ok(())
        })
    }

    /// Continues an existing thread.
    pub fn in_thread(self, thread: &Arc<ThreadId>) -> Self {
        let thread = thread.clone();
        self.apply(|request| {
            request.inner.thread = Some(thread);
            Ok(())
        })
    }

    /// Continues from candidate `index` of a previous response.
    ///
    /// The candidate is selected (committed to its thread), the response's thread
    /// is reused, and the candidate's tool calls become available to
    /// [`Request::with_tool_execution`].
    pub fn from_candidate<C: Candidater + ?Sized>(self, response: &C, index: usize) -> Self {
        self.apply(|request| {
            let candidate = response.candidate(index)?.clone();
            candidate.select();
            if let Some(thread) = response.thread() {
                request.inner.thread = Some(thread.clone());
            }
            request.candidate = Some(candidate);
            Ok(())
        })
    }

    /// Appends a prebuilt message.
    pub fn with_message(self, message: Message) -> Self {
        self.push_message(message)
    }

    /// Appends a system instruction.
    pub fn with_instruction(self, text: impl Into<String>) -> Self {
        self.push_message(Message::text(Role::System, text))
    }

    pub fn with_instruction_reader(self, reader: impl Read) -> Self {
        self.with_text_reader(Role::System, reader)
    }

    pub fn with_instruction_file(self, path: impl AsRef<Path>) -> Self {
        self.with_text_file(Role::System, path)
    }

    pub fn with_text(self, role: Role, text: impl Into<String>) -> Self {
        self.push_message(Message::text(role, text))
    }

    /// Appends a message read to the end from `reader`.
    pub fn with_text_reader(self, role: Role, mut reader: impl Read) -> Self {
        self.apply(|request| {
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .map_err(|err| LLMError::input(format!("could not read content part: {err}")))?;
            request.append(Message {
                role,
                parts: vec![Bytes::from(buf)],
                tool: None,
            })
        })
    }

    /// Appends a message with the contents of a file.
    pub fn with_text_file(self, role: Role, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        self.apply(|request| {
            let buf = std::fs::read(path).map_err(|err| {
                LLMError::input(format!("could not read file {}: {err}", path.display()))
            })?;
            request.append(Message {
                role,
                parts: vec![Bytes::from(buf)],
                tool: None,
            })
        })
    }

    /// Appends `value` encoded by `serializer`.
    pub fn with_serializable<S, V>(self, role: Role, serializer: &S, value: &V) -> Self
    where
        S: Serializer,
        V: Serialize + ?Sized,
    {
        self.apply(|request| {
            let buf = serializer.serialize(value)?;
            request.append(Message {
                role,
                parts: vec![Bytes::from(buf)],
                tool: None,
            })
        })
    }

    pub fn with_max_tokens(self, max_tokens: u32) -> Self {
        self.apply(|request| {
            request.inner.generation.max_tokens = Some(max_tokens);
            Ok(())
        })
    }

    /// Number of alternative candidates to generate.
    pub fn with_max_candidates(self, count: u32) -> Self {
        self.apply(|request| {
            if count == 0 {
                return Err(LLMError::Validation {
                    message: "candidate count must be at least 1".to_string(),
                });
            }
            request.inner.generation.max_candidates = Some(count);
            Ok(())
        })
    }

    pub fn with_temperature(self, temperature: f64) -> Self {
        self.apply(|request| {
            request.inner.generation.temperature = Some(temperature);
            Ok(())
        })
    }

    pub fn with_top_p(self, top_p: f64) -> Self {
        self.apply(|request| {
            request.inner.generation.top_p = Some(top_p);
            Ok(())
        })
    }

    pub fn with_schema_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.apply(|request| {
            request.inner.schema_name = Some(name);
            Ok(())
        })
    }

    pub fn with_schema_description(self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.apply(|request| {
            request.inner.schema_description = Some(description);
            Ok(())
        })
    }

    /// Sends `schema` instead of the one generated from `T`.
    pub fn override_response_schema(self, schema: Value) -> Self {
        self.apply(|request| {
            request.inner.schema_override = Some(schema);
            Ok(())
        })
    }

    /// Declares tools the model may call. A later tool with the same name
    /// replaces the earlier one.
    pub fn with_tools(self, tools: impl IntoIterator<Item = Tool>) -> Self {
        let tools: Vec<Tool> = tools.into_iter().collect();
        self.apply(|request| {
            for tool in tools {
                request.inner.tools.insert(tool.name().to_string(), tool);
            }
            Ok(())
        })
    }

    /// Runs every tool call of the candidate chosen with
    /// [`Request::from_candidate`] and appends one tool message per call.
    ///
    /// The executed tools stay declared on the request.
    pub fn with_tool_execution(self, tools: impl IntoIterator<Item = Tool>) -> Self {
        let tools: Vec<Tool> = tools.into_iter().collect();
        self.apply(|request| {
            let candidate = request.candidate.as_ref().ok_or_else(|| LLMError::Validation {
                message: "tool execution requires a candidate selected with from_candidate"
                    .to_string(),
            })?;

            let mut responses = Vec::with_capacity(candidate.tool_calls.len());
            for call in &candidate.tool_calls {
                let tool = tools
                    .iter()
                    .find(|tool| tool.name() == call.name)
                    .ok_or_else(|| LLMError::ToolNotRegistered {
                        name: call.name.clone(),
                    })?;
                let output = tool.call(&call.parameters)?;
                responses.push(Message::tool_response(
                    ToolCallRef {
                        id: call.id.clone(),
                        name: call.name.clone(),
                    },
                    output,
                ));
            }

            request.inner.messages.extend(responses);
            for tool in tools {
                request.inner.tools.insert(tool.name().to_string(), tool);
            }
            Ok(())
        })
    }

    /// Attaches options for the provider that understands `O`.
    pub fn with_provider_options<O: ProviderRequestOptions>(self, options: O) -> Self {
        self.apply(|request| {
            request.inner.provider_options.insert(options);
            Ok(())
        })
    }

    /// Do not record this request's messages in the thread.
    pub fn skip_save_input(self) -> Self {
        self.apply(|request| {
            request.inner.skip_save_input = true;
            Ok(())
        })
    }

    /// Do not record selected candidates in the thread.
    pub fn skip_save_output(self) -> Self {
        self.apply(|request| {
            request.inner.skip_save_output = true;
            Ok(())
        })
    }

    /// Sends the request.
    ///
    /// Resolves the provider, mints or checks the thread, then delegates to the
    /// provider. Configuration errors are returned before any network activity.
    ///
    /// # Errors
    ///
    /// The first builder error, [`LLMError::UnknownProvider`],
    /// [`LLMError::NoDefaultProvider`], [`LLMError::ThreadMismatch`],
    /// [`LLMError::Aborted`] when `ctx` is cancelled, or the provider's error.
    pub async fn execute(
        &self,
        ctx: &CancellationToken,
        adapter: &Adapter,
    ) -> Result<Response<T>, LLMError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let provider = adapter.provider(self.inner.provider.as_deref())?;
        let mut inner = self.inner.clone();
        if self.create_thread {
            inner.thread = Some(Arc::new(ThreadId::new(provider.clone())));
        } else if let Some(thread) = &inner.thread {
            if !thread.belongs_to(&provider) {
                return Err(LLMError::ThreadMismatch {
                    provider: provider.name(),
                });
            }
        }

        tracing::debug!(
            provider = provider.name(),
            model = ?inner.model,
            messages = inner.messages.len(),
            threaded = inner.thread.is_some(),
            "dispatching chat completion"
        );

        let response = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(LLMError::aborted()),
            result = provider.chat_completion(ctx, adapter.settings(), &inner) => result?,
        };

        Ok(Response::from_inner(response, inner.thread))
    }

    pub fn inner(&self) -> &InnerRequest {
        &self.inner
    }

    pub fn error(&self) -> Option<&LLMError> {
        self.error.as_ref()
    }
}

impl<T> Requester for Request<T> {
    fn to_request(&self) -> &InnerRequest {
        &self.inner
    }

    fn error(&self) -> Option<&LLMError> {
        self.error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{FinishReason, InnerResponse, ResponseToolCall};
    use crate::serializer::JsonSerializer;
    use crate::test_support::stub_provider;
    use serde::Deserialize;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Output {
        reply: String,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Weather {
        location: String,
    }

    fn response_with_calls(calls: Vec<ResponseToolCall>) -> Response {
        let mut candidate = ResponseCandidate::new("", FinishReason::ToolCalls);
        candidate.tool_calls = calls;
        Response::from_inner(
            InnerResponse {
                id: "resp".into(),
                model: "stub".into(),
                candidates: vec![candidate],
                created: None,
            },
            None,
        )
    }

    fn weather_call() -> ResponseToolCall {
        ResponseToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            parameters: Bytes::from_static(br#"{"location":"Paris"}"#),
        }
    }

    #[test]
    fn typed_request_attaches_schema() {
        let request = Request::<Output>::new();
        let schema = request.inner().effective_schema().expect("schema");
        assert_eq!(schema["properties"]["reply"]["type"], "string");

        assert!(Request::untyped().inner().effective_schema().is_none());
        assert!(Request::<String>::new().inner().effective_schema().is_none());
    }

    #[test]
    fn schema_override_wins() {
        let request = Request::<Output>::new()
            .with_schema_name("reply")
            .override_response_schema(serde_json::json!({"type": "object"}));
        assert_eq!(
            request.inner().effective_schema(),
            Some(&serde_json::json!({"type": "object"}))
        );
        assert_eq!(request.inner().schema_name(), "reply");
    }

    #[test]
    fn forks_do_not_share_messages() {
        let base = Request::untyped().with_instruction("be brief");
        let a = base.clone().with_text(Role::User, "first");
        let b = base.clone().with_text(Role::User, "second");

        assert_eq!(base.inner().messages.len(), 1);
        assert_eq!(a.inner().messages[1].joined_text().unwrap(), "first");
        assert_eq!(b.inner().messages[1].joined_text().unwrap(), "second");
    }

    #[test]
    fn first_error_short_circuits_later_steps() {
        let request = Request::untyped()
            .with_text_file(Role::User, "/definitely/not/here.txt")
            .with_text(Role::User, "ignored")
            .with_max_candidates(0);

        assert!(request.inner().messages.is_empty());
        match request.error() {
            Some(LLMError::Input { message }) => assert!(message.contains("here.txt")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reader_and_serializer_inputs_become_messages() {
        let request = Request::untyped()
            .with_instruction_reader(&b"system prompt"[..])
            .with_serializable(Role::User, &JsonSerializer, &vec![1, 2, 3]);

        let messages = &request.inner().messages;
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].joined_text().unwrap(), "system prompt");
        assert_eq!(messages[1].joined_text().unwrap(), "[1,2,3]");
    }

    #[test]
    fn tool_execution_without_candidate_fails() {
        let tool = Tool::from_fn("get_weather", "", |_: Weather| {
            Ok::<_, Infallible>("sunny".to_string())
        });
        let request = Request::untyped().with_tool_execution([tool]);
        assert!(matches!(request.error(), Some(LLMError::Validation { .. })));
    }

    #[test]
    fn tool_execution_requires_registered_tool() {
        let response = response_with_calls(vec![weather_call()]);
        let other = Tool::from_fn("get_time", "", |_: Weather| {
            Ok::<_, Infallible>("noon".to_string())
        });

        let request = Request::untyped()
            .from_candidate(&response, 0)
            .with_tool_execution([other]);
        let err = request.error().expect("error");
        assert!(
            err.to_string().contains("no tool was registered"),
            "unexpected message: {err}"
        );
    }

    #[test]
    fn tool_execution_appends_tool_messages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let tool = Tool::from_fn("get_weather", "", move |args: Weather| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(format!("sunny in {}", args.location))
        });

        let response = response_with_calls(vec![weather_call()]);
        let request = Request::untyped()
            .from_candidate(&response, 0)
            .with_tool_execution([tool]);

        assert!(request.error().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let message = &request.inner().messages[0];
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.joined_text().unwrap(), "sunny in Paris");
        assert_eq!(
            message.tool,
            Some(ToolCallRef {
                id: "call_1".into(),
                name: "get_weather".into()
            })
        );
        assert!(request.inner().tools.contains_key("get_weather"));
    }

    #[test]
    fn from_candidate_reports_missing_index() {
        let response = response_with_calls(Vec::new());
        let request = Request::untyped().from_candidate(&response, 2);
        match request.error() {
            Some(LLMError::MissingCandidate { index, available }) => {
                assert_eq!((*index, *available), (2, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_tool_message_is_rejected() {
        let request = Request::untyped().with_message(Message::text(Role::Tool, "orphan"));
        assert!(matches!(request.error(), Some(LLMError::Validation { .. })));
    }

    #[test]
    fn tool_role_inputs_need_a_call_reference() {
        let read = Request::untyped().with_text_reader(Role::Tool, &b"orphan"[..]);
        match read.error() {
            Some(LLMError::Validation { message }) => assert!(message.contains("tool call")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(read.inner().messages.is_empty());

        let encoded = Request::untyped().with_serializable(Role::Tool, &JsonSerializer, &[1, 2]);
        assert!(matches!(encoded.error(), Some(LLMError::Validation { .. })));

        let path = std::env::temp_dir().join("kotoba-adapter-tool-input.txt");
        std::fs::write(&path, "orphan").expect("write temp file");
        let from_file = Request::untyped().with_text_file(Role::Tool, &path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(from_file.error(), Some(LLMError::Validation { .. })));
    }

    #[test]
    fn model_resolution_order() {
        let settings = AdapterSettings::new(Some("adapter-model".into()), crate::test_support::null_transport());
        let mut inner = InnerRequest::default();
        assert_eq!(inner.resolve_model(None, &settings).unwrap(), "adapter-model");
        assert_eq!(
            inner.resolve_model(Some("provider-model"), &settings).unwrap(),
            "provider-model"
        );
        inner.model = Some("request-model".into());
        assert_eq!(
            inner.resolve_model(Some("provider-model"), &settings).unwrap(),
            "request-model"
        );

        let bare = AdapterSettings::new(None, crate::test_support::null_transport());
        assert!(InnerRequest::default().resolve_model(None, &bare).is_err());
    }

    #[tokio::test]
    async fn builder_error_is_returned_before_resolution() {
        let adapter = Adapter::builder()
            .with_transport(crate::test_support::null_transport())
            .build()
            .expect("adapter");
        let request = Request::untyped()
            .with_provider("missing")
            .with_text_file(Role::User, "/nope");
        match request.execute(&CancellationToken::new(), &adapter).await {
            Err(LLMError::Input { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_thread_is_rejected() {
        let owner = stub_provider();
        let adapter = Adapter::builder()
            .with_provider("stub", stub_provider())
            .with_transport(crate::test_support::null_transport())
            .build()
            .expect("adapter");

        let thread = Arc::new(ThreadId::new(owner));
        let err = Request::untyped()
            .in_thread(&thread)
            .with_text(Role::User, "hi")
            .execute(&CancellationToken::new(), &adapter)
            .await
            .expect_err("thread mismatch");
        assert!(matches!(err, LLMError::ThreadMismatch { .. }));
    }
}
