//! Provider-specific request options.
//!
//! A request can carry options for several backends at once, keyed by their
//! type. Each provider advertises the type it understands through
//! [`crate::provider::LLMProvider::request_options_type`] and only reads that entry.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Marker for structs holding options of one provider.
pub trait ProviderRequestOptions: Any + Send + Sync {}

#[derive(Clone)]
struct Entry {
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Type-keyed set of provider options. Inserting the same type twice keeps the
/// last value.
#[derive(Clone, Default)]
pub struct ProviderOptions {
    entries: HashMap<TypeId, Entry>,
}

impl ProviderOptions {
    pub fn insert<O: ProviderRequestOptions>(&mut self, options: O) {
        self.entries.insert(
            TypeId::of::<O>(),
            Entry {
                name: type_name::<O>(),
                value: Arc::new(options),
            },
        );
    }

    pub fn get<O: ProviderRequestOptions>(&self) -> Option<&O> {
        self.entries
            .get(&TypeId::of::<O>())
            .and_then(|entry| entry.value.downcast_ref::<O>())
    }

    /// Untyped lookup used with a provider's advertised options type.
    pub fn get_by_type(&self, type_id: TypeId) -> Option<&(dyn Any + Send + Sync)> {
        self.entries.get(&type_id).map(|entry| entry.value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.entries.values().map(|entry| entry.name))
            .finish()
    }
}

/// Downcasts an untyped options entry, falling back to the default options.
pub fn cast_provider_options<O>(options: Option<&(dyn Any + Send + Sync)>) -> O
where
    O: ProviderRequestOptions + Clone + Default,
{
    options
        .and_then(|value| value.downcast_ref::<O>())
        .cloned()
        .unwrap_or_default()
}
