//! Provider-agnostic LLM request adapter.
//!
//! Requests are built with [`Request`], executed against a provider registered on
//! an [`Adapter`], and answered with typed [`Response`]s whose candidates are only
//! committed to a conversation [`ThreadId`] once selected.

pub mod adapter;
pub mod batch;
pub mod config;
pub mod error;
pub mod history;
pub mod http;
pub mod options;
pub mod provider;
pub mod request;
pub mod response;
pub mod schema;
pub mod serializer;
pub mod sync;
pub mod thread;
pub mod tool;
pub mod types;

#[cfg(test)]
mod test_support;

pub use adapter::{Adapter, AdapterBuilder, AdapterSettings};
pub use batch::{BatchItem, BatchPromise, BatchStatus, BatchWaitResponse};
pub use error::LLMError;
pub use options::{ProviderOptions, ProviderRequestOptions};
pub use provider::{DynProvider, LLMProvider};
pub use request::{InnerRequest, Request, Requester};
pub use response::{Candidater, FinishReason, InnerResponse, Response, ResponseCandidate};
pub use thread::ThreadId;
pub use tool::Tool;
pub use types::{Message, Role};
