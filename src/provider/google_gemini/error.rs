use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

use super::types::GeminiStatus;

/// Parses error responses returned by Google Gemini.
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<InnerError>,
    }

    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        status: Option<String>,
    }

    let Some(error) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
    else {
        return LLMError::Provider {
            provider: "google_gemini",
            message: format!("status {status}: {body}"),
        };
    };

    let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
    let status_hint = error.status.as_deref().filter(|text| !text.is_empty());
    if let Some(status_text) = status_hint {
        message = format!("{message} ({status_text})");
    }

    if looks_like_token_limit_error(status_hint, &message) {
        return LLMError::TokenLimitExceeded { message };
    }
    if status == 404 || status_hint == Some("NOT_FOUND") {
        return LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        };
    }
    match status {
        401 | 403 => LLMError::Auth { message },
        429 => LLMError::RateLimit {
            message,
            retry_after,
        },
        400 => LLMError::Validation { message },
        _ => LLMError::Provider {
            provider: "google_gemini",
            message,
        },
    }
}

/// Converts an embedded RPC status, such as the error of one batch item.
pub(crate) fn status_to_error(status: &GeminiStatus) -> LLMError {
    let message = status
        .message
        .clone()
        .unwrap_or_else(|| "unknown error".to_string());
    LLMError::Provider {
        provider: "google_gemini",
        message: match status.code {
            Some(code) => format!("{message} (code {code})"),
            None => message,
        },
    }
}
