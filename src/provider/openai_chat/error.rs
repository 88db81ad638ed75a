use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

pub(crate) fn parse_openai_error(
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
        code: Option<Value>,
    }

    let Some(error) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
    else {
        return LLMError::Provider {
            provider: "openai_chat",
            message: format!("status {status}: {body}"),
        };
    };

    let raw_message = error.message.unwrap_or_else(|| "unknown error".to_string());
    let code = error.code.as_ref().and_then(Value::as_str).map(str::to_string);
    let message = match &error.code {
        Some(code) => format!("{raw_message} ({code})"),
        None => raw_message.clone(),
    };

    if looks_like_token_limit_error(code.as_deref(), &raw_message) {
        return LLMError::TokenLimitExceeded { message };
    }
    match status {
        401 | 403 => LLMError::Auth { message },
        429 => LLMError::RateLimit {
            message,
            retry_after,
        },
        400 => LLMError::Validation { message },
        404 => LLMError::ModelNotFound {
            model: extract_model_identifier(&raw_message),
            message,
        },
        _ => LLMError::Provider {
            provider: "openai_chat",
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes() {
        let body = r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#;
        match parse_openai_error(401, body, None) {
            LLMError::Auth { message } => assert!(message.contains("invalid_api_key")),
            other => panic!("unexpected error type: {other:?}"),
        }
        match parse_openai_error(
            429,
            r#"{"error":{"message":"slow down"}}"#,
            Some(Duration::from_secs(2)),
        ) {
            LLMError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(2)))
            }
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn detects_context_overflow() {
        let body = r#"{"error":{"message":"This model's maximum context length is 8192 tokens","code":"context_length_exceeded"}}"#;
        assert!(matches!(
            parse_openai_error(400, body, None),
            LLMError::TokenLimitExceeded { .. }
        ));
    }

    #[test]
    fn missing_model_is_reported() {
        let body = r#"{"error":{"message":"The model `gpt-nope` does not exist","code":"model_not_found"}}"#;
        match parse_openai_error(404, body, None) {
            LLMError::ModelNotFound { model, .. } => assert_eq!(model.as_deref(), Some("gpt-nope")),
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn unparseable_body_keeps_status() {
        match parse_openai_error(502, "Bad Gateway", None) {
            LLMError::Provider { message, .. } => assert_eq!(message, "status 502: Bad Gateway"),
            other => panic!("unexpected error type: {other:?}"),
        }
    }
}
