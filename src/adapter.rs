use std::collections::HashMap;
use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::batch::BatchPromise;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::http::reqwest::default_dyn_transport;
use crate::provider::DynProvider;
use crate::request::{InnerRequest, Requester};
use crate::types::CapabilityDescriptor;

/// Adapter-wide settings handed to every provider call.
#[derive(Clone)]
pub struct AdapterSettings {
    default_model: Option<String>,
    transport: DynHttpTransport,
}

impl AdapterSettings {
    pub fn new(default_model: Option<String>, transport: DynHttpTransport) -> Self {
        Self {
            default_model,
            transport,
        }
    }

    /// Model used when neither the request nor the provider names one.
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Shared transport for providers built without their own.
    pub fn transport(&self) -> &DynHttpTransport {
        &self.transport
    }
}

impl fmt::Debug for AdapterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterSettings")
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

/// Entry point owning the registered providers.
///
/// Requests name a provider by its registered name or fall back to the default
/// one. The adapter is immutable once built and can be shared across tasks.
pub struct Adapter {
    providers: HashMap<String, DynProvider>,
    order: Vec<String>,
    default_provider: Option<String>,
    settings: AdapterSettings,
}

impl Adapter {
    pub fn builder() -> AdapterBuilder {
        AdapterBuilder::default()
    }

    /// Resolves a provider by name, or the default one when `name` is `None`.
    ///
    /// # Errors
    ///
    /// [`LLMError::UnknownProvider`] for an unregistered name and
    /// [`LLMError::NoDefaultProvider`] when no name is given and nothing was
    /// registered.
    pub fn provider(&self, name: Option<&str>) -> Result<DynProvider, LLMError> {
        let name = match name {
            Some(name) => name,
            None => self
                .default_provider
                .as_deref()
                .ok_or(LLMError::NoDefaultProvider)?,
        };
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LLMError::UnknownProvider {
                name: name.to_string(),
            })
    }

    /// Registered name of the default provider.
    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    pub fn capabilities(&self, name: &str) -> Result<CapabilityDescriptor, LLMError> {
        Ok(self.provider(Some(name))?.capabilities())
    }

    /// Names of the providers that accept batch jobs.
    pub fn names_supporting_batch(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                self.providers
                    .get(name.as_str())
                    .is_some_and(|provider| provider.capabilities().supports_batch)
            })
            .cloned()
            .collect()
    }

    /// Submits requests as one batch job on provider `name` (or the default).
    ///
    /// Every request needs an id, which keys its result in the job output.
    ///
    /// # Errors
    ///
    /// The first builder error among `requests`, a resolution error,
    /// [`LLMError::Validation`] for an empty batch or a request without id,
    /// [`LLMError::ThreadMismatch`] for a thread owned by another provider,
    /// [`LLMError::UnsupportedFeature`] from providers without batch support, or
    /// [`LLMError::Aborted`] when `ctx` is cancelled.
    pub async fn submit_batch(
        &self,
        ctx: &CancellationToken,
        name: Option<&str>,
        requests: &[&dyn Requester],
    ) -> Result<BatchPromise, LLMError> {
        if let Some(err) = requests.iter().find_map(|request| request.error()) {
            return Err(err.clone());
        }
        if requests.is_empty() {
            return Err(LLMError::Validation {
                message: "a batch needs at least one request".to_string(),
            });
        }
        let inner: Vec<&InnerRequest> = requests.iter().map(|request| request.to_request()).collect();
        if inner.iter().any(|request| request.id.is_none()) {
            return Err(LLMError::Validation {
                message: "all requests in a batch must have an ID".to_string(),
            });
        }

        let provider = self.provider(name)?;
        if inner
            .iter()
            .filter_map(|request| request.thread.as_ref())
            .any(|thread| !thread.belongs_to(&provider))
        {
            return Err(LLMError::ThreadMismatch {
                provider: provider.name(),
            });
        }
        let provider_name = match name {
            Some(name) => name.to_string(),
            None => self.default_provider.clone().unwrap_or_default(),
        };

        let job_id = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(LLMError::aborted()),
            result = provider.submit_batch(ctx, &self.settings, &inner) => result?,
        };
        tracing::info!(provider = %provider_name, job = %job_id, requests = inner.len(), "batch submitted");

        Ok(BatchPromise::new(provider, provider_name, job_id))
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("providers", &self.order)
            .field("default_provider", &self.default_provider)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Builder registering providers and adapter settings.
#[derive(Default)]
pub struct AdapterBuilder {
    providers: HashMap<String, DynProvider>,
    order: Vec<String>,
    default_provider: Option<String>,
    default_model: Option<String>,
    transport: Option<DynHttpTransport>,
}

impl AdapterBuilder {
    /// Registers a provider under `name`. The first registered provider becomes
    /// the default unless one is set explicitly; re-registering a name replaces it.
    pub fn with_provider(mut self, name: impl Into<String>, provider: DynProvider) -> Self {
        let name = name.into();
        if self.providers.insert(name.clone(), provider).is_none() {
            self.order.push(name);
        }
        self
    }

    /// Registers a provider and makes it the default.
    pub fn with_default_provider(self, name: impl Into<String>, provider: DynProvider) -> Self {
        let name = name.into();
        let mut builder = self.with_provider(name.clone(), provider);
        builder.default_provider = Some(name);
        builder
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Transport shared by providers built without their own.
    pub fn with_transport(mut self, transport: DynHttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Initializes every provider and builds the adapter.
    ///
    /// # Errors
    ///
    /// [`LLMError::ProviderInit`] naming the first provider that refused to
    /// initialize, or a transport error when the default client cannot be built.
    pub fn build(self) -> Result<Adapter, LLMError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_dyn_transport()?,
        };
        let settings = AdapterSettings::new(self.default_model, transport);

        for name in &self.order {
            if let Some(provider) = self.providers.get(name) {
                provider.init(&settings).map_err(|source| LLMError::ProviderInit {
                    name: name.clone(),
                    source: Box::new(source),
                })?;
                tracing::debug!(provider = %name, backend = provider.name(), "provider initialized");
            }
        }

        let default_provider = self.default_provider.or_else(|| self.order.first().cloned());
        Ok(Adapter {
            providers: self.providers,
            order: self.order,
            default_provider,
            settings,
        })
    }
}
