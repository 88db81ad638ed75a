//! Conversation identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::provider::{DynProvider, same_provider};

static NEXT_THREAD_KEY: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying one conversation on one provider.
///
/// Two handles denote the same thread only if they are the same instance, so the
/// type is neither `Clone` nor `Copy`; share it as `Arc<ThreadId>`. The owning
/// provider stores the history, keyed by the handle.
pub struct ThreadId {
    key: u64,
    owner: DynProvider,
}

impl ThreadId {
    /// Mints a new thread owned by `owner`.
    pub fn new(owner: DynProvider) -> Self {
        Self {
            key: NEXT_THREAD_KEY.fetch_add(1, Ordering::Relaxed),
            owner,
        }
    }

    /// Mints a fresh thread owned by the same provider.
    pub fn sibling(&self) -> Self {
        Self::new(self.owner.clone())
    }

    /// Lookup key used by history stores.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Provider that minted this thread.
    pub fn provider(&self) -> &DynProvider {
        &self.owner
    }

    /// Whether `provider` is the instance that minted this thread.
    pub fn belongs_to(&self, provider: &DynProvider) -> bool {
        same_provider(&self.owner, provider)
    }

    /// Empties the thread's history on its provider.
    pub fn clear(&self) {
        self.owner.reset_thread(self);
    }

    /// Forks the thread on its provider.
    pub fn copy(&self) -> ThreadId {
        self.owner.copy_thread(self)
    }

    /// Releases the thread's history on its provider.
    pub fn close(&self) {
        self.owner.close_thread(self);
    }
}

impl PartialEq for ThreadId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ThreadId {}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadId")
            .field("key", &self.key)
            .field("provider", &self.owner.name())
            .finish()
    }
}
