//! Declarative adapter configuration.
//!
//! [`AdapterConfig`] can be deserialized from JSON (or any serde format) and
//! turned into an [`Adapter`] with [`build_adapter_from_config`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::Adapter;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::provider::openai_chat::OpenAiChatProvider;
use crate::provider::perplexity::PerplexityProvider;

/// One backend registered under a name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Registered provider name, such as `default-openai`.
    pub name: String,
    pub provider: ProviderKind,
    pub credential: Credential,
    pub default_model: Option<String>,
    pub base_url: Option<String>,
    /// Backend-specific settings, such as `organization` or `batch_poll_interval_secs`.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAiChat,
    GoogleGemini,
    Perplexity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    ApiKey {
        /// Header carrying the raw key, replacing the provider's default
        /// authentication header.
        #[serde(default)]
        header: Option<String>,
        key: String,
    },
    Bearer { token: String },
    /// Google/GCP service account JSON, not accepted by the bundled backends.
    ServiceAccount { json: Value },
    None,
}

/// Whole adapter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Name of the default provider; the first entry when absent.
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub providers: Vec<ModelConfig>,
}

/// Builds an adapter from configuration.
///
/// `transport` becomes the shared transport; reqwest is used when `None`.
///
/// # Errors
///
/// [`LLMError::Auth`] for unusable credentials, [`LLMError::InvalidConfig`] for
/// malformed extra settings or an unknown default provider, and the errors of
/// [`crate::adapter::AdapterBuilder::build`].
pub fn build_adapter_from_config(
    config: &AdapterConfig,
    transport: Option<DynHttpTransport>,
) -> Result<Adapter, LLMError> {
    let mut builder = Adapter::builder();
    for model_config in &config.providers {
        let provider = build_provider_from_config(model_config)?;
        builder = if config.default_provider.as_deref() == Some(model_config.name.as_str()) {
            builder.with_default_provider(model_config.name.clone(), provider)
        } else {
            builder.with_provider(model_config.name.clone(), provider)
        };
    }

    if let Some(name) = &config.default_provider {
        if !config.providers.iter().any(|p| &p.name == name) {
            return Err(LLMError::InvalidConfig {
                field: "default_provider".to_string(),
                reason: format!("no provider is named '{name}'"),
            });
        }
    }
    if let Some(model) = &config.default_model {
        builder = builder.with_default_model(model.clone());
    }
    if let Some(transport) = transport {
        builder = builder.with_transport(transport);
    }
    builder.build()
}

fn build_provider_from_config(config: &ModelConfig) -> Result<DynProvider, LLMError> {
    let provider: DynProvider = match config.provider {
        ProviderKind::OpenAiChat => {
            let (api_key, header) = extract_api_key(&config.credential, "openai_chat")?;
            let mut provider = OpenAiChatProvider::new(api_key);
            if let Some(header) = header {
                provider = provider.with_api_key_header(header);
            }

            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(org) = extra_string(config, "organization")? {
                provider = provider.with_organization(org);
            }
            if let Some(project) = extra_string(config, "project")? {
                provider = provider.with_project(project);
            }

            Arc::new(provider)
        }
        ProviderKind::GoogleGemini => {
            let (api_key, header) = extract_api_key(&config.credential, "google_gemini")?;
            let mut provider = GoogleGeminiProvider::new(api_key);
            if let Some(header) = header {
                provider = provider.with_api_key_header(header);
            }

            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(value) = config.extra.get("batch_poll_interval_secs") {
                let secs = value
                    .as_u64()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| LLMError::InvalidConfig {
                        field: format!("{}.batch_poll_interval_secs", config.name),
                        reason: "expected a positive number of seconds".to_string(),
                    })?;
                provider = provider.with_batch_poll_interval(Duration::from_secs(secs));
            }

            Arc::new(provider)
        }
        ProviderKind::Perplexity => {
            let (api_key, header) = extract_api_key(&config.credential, "perplexity")?;
            let mut provider = PerplexityProvider::new(api_key);
            if let Some(header) = header {
                provider = provider.with_api_key_header(header);
            }

            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }

            Arc::new(provider)
        }
    };

    Ok(provider)
}

fn extra_string(config: &ModelConfig, key: &str) -> Result<Option<String>, LLMError> {
    match config.extra.get(key) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(LLMError::InvalidConfig {
            field: format!("{}.{key}", config.name),
            reason: "expected a string".to_string(),
        }),
    }
}

/// Key and optional header override of a credential.
fn extract_api_key(
    credential: &Credential,
    provider: &'static str,
) -> Result<(String, Option<String>), LLMError> {
    match credential {
        Credential::ApiKey { key, header } => Ok((
            key.clone(),
            header.clone().filter(|header| !header.trim().is_empty()),
        )),
        Credential::Bearer { token } => Ok((token.clone(), None)),
        Credential::ServiceAccount { .. } => Err(LLMError::Auth {
            message: format!("provider {provider} does not support service account credential"),
        }),
        Credential::None => Err(LLMError::Auth {
            message: format!("provider {provider} requires credential"),
        }),
    }
}
