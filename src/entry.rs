use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::timer::Token;

/// Handle identifying one stored value.
///
/// Ids are allocated from a process-wide counter and never reused, so a
/// handle that outlives its entry goes permanently stale instead of
/// aliasing a newer value stored under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

impl EntryId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A stored value together with its expiry state.
pub(crate) struct Entry<V> {
    id: EntryId,
    value: Arc<V>,
    armed: Option<Token>,
}

impl<V> Entry<V> {
    pub(crate) fn new(id: EntryId, value: V) -> Self {
        Self {
            id,
            value: Arc::new(value),
            armed: None,
        }
    }

    pub(crate) fn id(&self) -> EntryId {
        self.id
    }

    /// Returns a shared reference to the stored value (zero-cost clone)
    pub(crate) fn value(&self) -> Arc<V> {
        Arc::clone(&self.value)
    }

    /// Token of the timer currently armed for this entry, if any.
    pub(crate) fn armed(&self) -> Option<Token> {
        self.armed
    }

    /// Records `token` as the active timer, returning the one it replaces.
    pub(crate) fn arm(&mut self, token: Token) -> Option<Token> {
        self.armed.replace(token)
    }

    pub(crate) fn disarm(&mut self) -> Option<Token> {
        self.armed.take()
    }
}
