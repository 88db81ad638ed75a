//! Per-provider conversation storage.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::thread::ThreadId;

/// Ordered messages of every thread a provider minted.
///
/// `M` is the provider's native message encoding. A thread that was never saved
/// to, or that was closed, loads as an empty sequence.
pub struct History<M> {
    threads: Mutex<HashMap<u64, Vec<M>>>,
}

impl<M> Default for History<M> {
    fn default() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
        }
    }
}

impl<M> History<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message, creating the thread entry on first use.
    pub fn save(&self, thread: &ThreadId, message: M) {
        self.threads
            .lock()
            .entry(thread.key())
            .or_default()
            .push(message);
    }

    /// Appends several messages in order.
    pub fn save_all(&self, thread: &ThreadId, messages: impl IntoIterator<Item = M>) {
        self.threads
            .lock()
            .entry(thread.key())
            .or_default()
            .extend(messages);
    }

    /// Empties the thread but keeps its entry.
    pub fn clear(&self, thread: &ThreadId) {
        if let Some(messages) = self.threads.lock().get_mut(&thread.key()) {
            messages.clear();
        }
    }

    /// Drops the thread entry entirely.
    pub fn close(&self, thread: &ThreadId) {
        self.threads.lock().remove(&thread.key());
    }

    /// Number of messages stored for the thread.
    pub fn len(&self, thread: &ThreadId) -> usize {
        self.threads
            .lock()
            .get(&thread.key())
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, thread: &ThreadId) -> bool {
        self.len(thread) == 0
    }

    /// Number of threads with a stored entry, including cleared ones.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }
}

impl<M: Clone> History<M> {
    /// Snapshot of the thread's messages in insertion order.
    pub fn load(&self, thread: &ThreadId) -> Vec<M> {
        self.threads
            .lock()
            .get(&thread.key())
            .cloned()
            .unwrap_or_default()
    }

    /// Duplicates the thread's messages into a freshly minted thread.
    pub fn copy(&self, thread: &ThreadId) -> ThreadId {
        let fork = thread.sibling();
        let mut threads = self.threads.lock();
        if let Some(messages) = threads.get(&thread.key()).cloned() {
            threads.insert(fork.key(), messages);
        }
        fork
    }
}
