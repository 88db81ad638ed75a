//! Perplexity Sonar backend, an OpenAI-compatible chat completions API with
//! web search.

mod options;
mod provider;
mod response;

pub use options::{ContextSize, PerplexityOptions, RecencyFilter, SearchMode, UserLocation, WebSearchOptions};
pub use provider::PerplexityProvider;
