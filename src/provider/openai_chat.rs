//! OpenAI Chat Completions backend and compatible endpoints.

mod error;
mod options;
mod provider;
mod request;
mod response;
mod types;

pub use options::{OpenAiChatOptions, ReasoningEffort};
pub use provider::OpenAiChatProvider;
