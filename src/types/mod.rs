//! Normalized message and option types shared by every provider.
//!
//! Providers translate these into their own wire format; nothing in here knows
//! about a particular vendor.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::LLMError;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Reference to the model tool call a tool-role message answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
}

/// Normalized chat message.
///
/// Content parts are stored as immutable byte buffers so that cloning a request
/// never copies message bodies.
///
/// # Examples
///
/// ```
/// use kotoba_adapter::types::{Message, Role};
///
/// let msg = Message::text(Role::User, "Describe Rust in one sentence.");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.joined_text().unwrap(), "Describe Rust in one sentence.");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Bytes>,
    /// Set on tool-role messages only.
    pub tool: Option<ToolCallRef>,
}

impl Message {
    /// Single-part text message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Bytes::from(text.into())],
            tool: None,
        }
    }

    /// Tool-role message answering `call`.
    pub fn tool_response(call: ToolCallRef, output: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            parts: vec![Bytes::from(output.into())],
            tool: Some(call),
        }
    }

    /// Decodes every part as UTF-8.
    pub fn texts(&self) -> Result<Vec<&str>, LLMError> {
        self.parts
            .iter()
            .map(|part| {
                std::str::from_utf8(part).map_err(|err| LLMError::Validation {
                    message: format!("message part is not valid UTF-8: {err}"),
                })
            })
            .collect()
    }

    /// All parts concatenated.
    pub fn joined_text(&self) -> Result<String, LLMError> {
        Ok(self.texts()?.concat())
    }

    /// Checks the structural invariants of a message.
    pub fn validate(&self) -> Result<(), LLMError> {
        match (self.role, &self.tool) {
            (Role::Tool, None) => Err(LLMError::Validation {
                message: "tool message does not reference a tool call".to_string(),
            }),
            (role, Some(_)) if role != Role::Tool => Err(LLMError::Validation {
                message: format!("{} message cannot reference a tool call", role.as_str()),
            }),
            _ => Ok(()),
        }
    }
}

/// Sampling parameters shared by all providers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub max_candidates: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

/// Optional features a provider supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub supports_tools: bool,
    pub supports_structured_output: bool,
    pub supports_batch: bool,
    pub supports_grounding: bool,
    pub supports_thoughts: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_requires_call_reference() {
        let mut message = Message::text(Role::Tool, "42");
        let err = message.validate().expect_err("tool message without call");
        match err {
            LLMError::Validation { message } => assert!(message.contains("tool call")),
            other => panic!("unexpected error type: {other:?}"),
        }

        message.tool = Some(ToolCallRef {
            id: "call_1".into(),
            name: "answer".into(),
        });
        message.validate().expect("valid tool message");
    }

    #[test]
    fn only_tool_messages_reference_calls() {
        let mut message = Message::text(Role::User, "hi");
        message.tool = Some(ToolCallRef {
            id: "call_1".into(),
            name: "answer".into(),
        });
        assert!(message.validate().is_err());
    }

    #[test]
    fn invalid_utf8_parts_are_reported() {
        let message = Message {
            role: Role::User,
            parts: vec![Bytes::from_static(&[0xff, 0xfe])],
            tool: None,
        };
        assert!(matches!(
            message.joined_text(),
            Err(LLMError::Validation { .. })
        ));
    }
}
