use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Opaque error returned by a tool callback.
pub type ToolCallbackError = Arc<dyn StdError + Send + Sync>;

/// Aggregates every failure mode exposed by the adapter.
///
/// Configuration problems (unknown provider, missing default, foreign thread) are
/// reported before any network activity. Builder problems accumulate on a
/// [`crate::request::Request`] and surface when it is executed. Backend failures are
/// normalized into the transport and provider variants.
///
/// The type is `Clone` so a request that captured an error can report it from every
/// execution.
#[derive(Debug, Clone, Error)]
pub enum LLMError {
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Reports invalid or missing credentials.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// Indicates that the provider throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        /// Raw message returned by the upstream provider.
        message: String,
        /// Optional wait duration suggested by the provider before retrying.
        retry_after: Option<Duration>,
    },
    /// Indicates that the prompt or expected completion exceeds the allowed token budget.
    #[error("token limit exceeded: {message}")]
    TokenLimitExceeded { message: String },
    /// Signals validation failures in the request payload.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Declares that a capability is not supported by the selected provider.
    #[error("feature unsupported: {feature}")]
    UnsupportedFeature { feature: &'static str },
    /// Indicates that a requested model could not be resolved.
    #[error("model not found: {message}")]
    ModelNotFound {
        /// Model identifier extracted from the error payload when available.
        model: Option<String>,
        /// Full error message returned by the provider for debugging.
        message: String,
    },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
    /// The request names a provider that was never registered.
    #[error("unknown provider '{name}'")]
    UnknownProvider { name: String },
    /// The request names no provider and the adapter has no default.
    #[error("no provider was configured")]
    NoDefaultProvider,
    /// A provider refused to initialize against the adapter settings.
    #[error("could not initialize LLM provider '{name}': {source}")]
    ProviderInit {
        name: String,
        source: Box<LLMError>,
    },
    /// A thread handle was used with a provider other than the one that minted it.
    #[error("thread was created by another provider and cannot be used with '{provider}'")]
    ThreadMismatch { provider: &'static str },
    /// A candidate index is out of range.
    #[error("candidate {index} does not exist ({available} candidates)")]
    MissingCandidate { index: usize, available: usize },
    /// Candidate text could not be decoded into the requested shape.
    #[error("failed to decode response to schema: {message}")]
    Decode { message: String },
    /// Caller-supplied input (reader, file, serializer) could not be consumed.
    #[error("invalid input: {message}")]
    Input { message: String },
    /// Tool arguments produced by the model do not match the declared shape.
    #[error("invalid arguments for tool '{tool}': {message}")]
    ToolArguments { tool: String, message: String },
    /// The registered callback does not accept the declared argument type.
    #[error("tool '{tool}' has an invalid signature: {message}")]
    ToolSignature { tool: String, message: String },
    /// The tool callback itself reported a failure.
    #[error("tool '{tool}' failed: {source}")]
    ToolFailed {
        tool: String,
        source: ToolCallbackError,
    },
    /// The model requested a tool that was not supplied for execution.
    #[error("no tool was registered for '{name}'")]
    ToolNotRegistered { name: String },
    /// Surfaces cancellations triggered by the caller's context.
    #[error("request aborted: {message}")]
    Aborted {
        /// Message describing who/what cancelled the request.
        message: String,
    },
    /// Every request of a race failed.
    #[error("all requests failed: {}", join_errors(.errors))]
    AllFailed { errors: Vec<LLMError> },
    /// Wraps provider-defined errors that cannot be normalized.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Name of the provider, such as `openai_chat`.
        provider: &'static str,
        /// Human-readable error message returned by the provider.
        message: String,
    },
    /// Catches opaque or unexpected failures.
    #[error("unknown error: {message}")]
    Unknown { message: String },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use kotoba_adapter::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given provider name and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use kotoba_adapter::error::LLMError;
    ///
    /// let err = LLMError::provider("openai_chat", "bad JSON payload");
    /// assert!(matches!(err, LLMError::Provider { provider: "openai_chat", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Input`] for unreadable caller input.
    pub fn input<T: Into<String>>(message: T) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    pub(crate) fn aborted() -> Self {
        Self::Aborted {
            message: "context cancelled".to_string(),
        }
    }
}

fn join_errors(errors: &[LLMError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Returns `true` when an error code or message suggests a context/window overflow.
pub(crate) fn looks_like_token_limit_error(code_hint: Option<&str>, message: &str) -> bool {
    if let Some(code) = code_hint {
        let lower = code.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "context_length_exceeded" | "max_context_length_exceeded" | "prompt_tokens_exceeded"
        ) {
            return true;
        }
    }

    let lower_message = message.to_ascii_lowercase();
    const HINTS: [&str; 5] = [
        "context length",
        "context window",
        "token limit",
        "maximum output tokens",
        "prompt is too long",
    ];
    HINTS.iter().any(|needle| lower_message.contains(needle))
}

/// Attempts to extract a model identifier quoted inside an error payload.
pub(crate) fn extract_model_identifier(message: &str) -> Option<String> {
    ['`', '"', '\'']
        .into_iter()
        .filter_map(|delimiter| between_delimiters(message, delimiter))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn between_delimiters(message: &str, delimiter: char) -> Option<&str> {
    let start = message.find(delimiter)? + delimiter.len_utf8();
    let rest = &message[start..];
    let end = rest.find(delimiter)?;
    Some(&rest[..end])
}
