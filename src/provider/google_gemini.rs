//! Google Gemini GenerateContent backend.

mod batch;
mod error;
mod options;
mod provider;
mod request;
mod response;
mod types;

pub use options::{GeminiRequestOptions, ThinkingOptions};
pub use provider::GoogleGeminiProvider;
