use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::entry::{Entry, EntryId};
use crate::store::Store;
use crate::timer::{OwnerId, Timer, Token};

/// Error type for TTL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TtlError {
    /// The key or handle does not refer to a value currently in the store
    #[error("entry not found")]
    NotFound,
}

struct State<K, V> {
    entries: Store<K, Entry<V>>,
    index: HashMap<EntryId, K>,
}

struct TimedInner<K, V> {
    state: Mutex<State<K, V>>,
    timer: Timer,
    owner: OwnerId,
}

impl<K, V> TimedInner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn locked(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().expect("store state lock poisoned")
    }

    /// Timeout-fired path. Runs on the timer's execution context, so it
    /// re-checks under the lock that the fired registration still owns the
    /// entry before evicting it.
    fn expire(&self, id: EntryId, token: Token) {
        let mut state = self.locked();
        let Some(key) = state.index.get(&id) else {
            return; // already removed through another path
        };
        let key = key.clone();
        if state.entries.get(&key).and_then(Entry::armed) != Some(token) {
            return; // re-armed since this registration was made
        }
        debug!(?id, "entry expired");
        state.index.remove(&id);
        state.entries.remove(&key); // the removal hook re-cancels, harmlessly
    }
}

impl<K, V> Drop for TimedInner<K, V> {
    fn drop(&mut self) {
        self.timer.cancel_all(self.owner);
    }
}

/// Keyed store whose entries optionally self-destruct after a delay.
///
/// The store owns every value inserted into it. A value leaves the store in
/// exactly one of three ways, and is dropped exactly once:
///
/// - explicit [`remove`](Self::remove) / [`remove_by_id`](Self::remove_by_id)
/// - its expiry timer firing
/// - a bulk [`clear`](Self::clear)
///
/// Expiry timers are one-shot per arming and are always cancelled before an
/// entry is destroyed through another path, so a timer can never fire
/// against a value that is already gone. The reverse race is handled on the
/// timer side: a fired callback re-checks under the store lock that its
/// registration is still the live one before evicting anything.
///
/// Handles are cheap to clone and share a single store.
///
/// # Example
///
/// ```rust,no_run
/// use keepsake::TimedStore;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let store = TimedStore::new();
///     let id = store.insert("token", "abc123".to_string(), Some(Duration::from_secs(60)));
///
///     // Re-arm through the handle returned by insert.
///     store.set_ttl_by_id(id, Some(Duration::from_secs(120))).unwrap();
/// }
/// ```
pub struct TimedStore<K, V> {
    inner: Arc<TimedInner<K, V>>,
}

impl<K, V> Clone for TimedStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TimedStore<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a store driven by its own private [`Timer`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context; see
    /// [`Timer::new`].
    pub fn new() -> Self {
        Self::with_timer(Timer::new())
    }

    /// Creates a store driven by `timer`.
    ///
    /// Several stores can share one timer; each registers under its own
    /// owner id, so bulk cancellation on [`clear`](Self::clear) never
    /// touches another store's registrations.
    pub fn with_timer(timer: Timer) -> Self {
        let owner = OwnerId::next();
        let hook_timer = timer.clone();
        let entries = Store::with_removal_hook(move |_key: &K, entry: &Entry<V>| {
            // Whatever path removes an entry, its timer must not outlive it.
            if let Some(token) = entry.armed() {
                hook_timer.cancel(owner, token);
            }
        });
        Self {
            inner: Arc::new(TimedInner {
                state: Mutex::new(State {
                    entries,
                    index: HashMap::new(),
                }),
                timer,
                owner,
            }),
        }
    }

    /// Inserts `value` under `key`, taking ownership of it.
    ///
    /// If the key is already occupied the previous value is retired first:
    /// its timer is cancelled and it is dropped before the new value becomes
    /// visible. With `ttl = None` (or a zero duration) the value is kept
    /// until it is explicitly removed; otherwise it is evicted and dropped
    /// once `ttl` has elapsed.
    ///
    /// Returns a handle identifying this particular value. The handle goes
    /// stale once the value leaves the store; it never aliases a later value
    /// stored under the same key.
    pub fn insert(&self, key: K, value: V, ttl: Option<Duration>) -> EntryId {
        let ttl = normalize_ttl(ttl);
        let id = EntryId::next();
        let mut state = self.inner.locked();
        if let Some(old_id) = state.entries.get(&key).map(Entry::id) {
            state.index.remove(&old_id);
            state.entries.remove(&key);
        }
        let mut entry = Entry::new(id, value);
        if let Some(ttl) = ttl {
            let token = Token::next();
            entry.arm(token);
            self.schedule_expiry(id, token, ttl);
        }
        state.index.insert(id, key.clone());
        state.entries.insert(key, entry);
        id
    }

    /// Returns a shared reference to the value under `key`.
    ///
    /// The reference keeps the value alive even if the entry is evicted
    /// while it is held; the value is dropped when the last reference goes
    /// away.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.locked().entries.get(key).map(Entry::value)
    }

    /// Returns a shared reference to the value identified by `id`, if it is
    /// still in the store.
    pub fn get_by_id(&self, id: EntryId) -> Option<Arc<V>> {
        let state = self.inner.locked();
        let key = state.index.get(&id)?;
        state.entries.get(key).map(Entry::value)
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.locked().entries.contains_key(key)
    }

    #[must_use]
    pub fn contains_id(&self, id: EntryId) -> bool {
        self.inner.locked().index.contains_key(&id)
    }

    /// Removes the entry under `key`, cancelling its timer and dropping its
    /// value.
    #[must_use = "returns whether the key held a value"]
    pub fn remove(&self, key: &K) -> bool {
        let mut state = self.inner.locked();
        match state.entries.get(key).map(Entry::id) {
            Some(id) => {
                state.index.remove(&id);
                state.entries.remove(key);
                true
            }
            None => false,
        }
    }

    /// Removes the entry identified by `id`. No-op on a stale handle.
    #[must_use = "returns whether the handle referred to a live entry"]
    pub fn remove_by_id(&self, id: EntryId) -> bool {
        let mut state = self.inner.locked();
        match state.index.remove(&id) {
            Some(key) => {
                state.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Re-arms the expiry deadline of the value under `key`.
    ///
    /// Any existing timer for the value is cancelled first. With
    /// `ttl = None` (or a zero duration) the value becomes indefinite;
    /// otherwise a fresh one-shot timer is armed for `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns [`TtlError::NotFound`] if the key holds no value; the store
    /// is left unchanged.
    pub fn set_ttl(&self, key: &K, ttl: Option<Duration>) -> Result<(), TtlError> {
        let mut state = self.inner.locked();
        self.rearm_locked(&mut state, key, ttl)
    }

    /// Re-arms the expiry deadline of the value identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TtlError::NotFound`] if the handle is stale (the value it
    /// referred to has left the store), which protects against re-arming a
    /// newer value that happens to sit under the same key.
    pub fn set_ttl_by_id(&self, id: EntryId, ttl: Option<Duration>) -> Result<(), TtlError> {
        let mut state = self.inner.locked();
        let key = state.index.get(&id).cloned().ok_or(TtlError::NotFound)?;
        self.rearm_locked(&mut state, &key, ttl)
    }

    fn rearm_locked(
        &self,
        state: &mut State<K, V>,
        key: &K,
        ttl: Option<Duration>,
    ) -> Result<(), TtlError> {
        let entry = state.entries.get_mut(key).ok_or(TtlError::NotFound)?;
        let id = entry.id();
        // Cancel-then-reschedule keeps at most one live timer per value.
        if let Some(token) = entry.disarm() {
            self.inner.timer.cancel(self.inner.owner, token);
        }
        if let Some(ttl) = normalize_ttl(ttl) {
            let token = Token::next();
            entry.arm(token);
            self.schedule_expiry(id, token, ttl);
        }
        Ok(())
    }

    fn schedule_expiry(&self, id: EntryId, token: Token, ttl: Duration) {
        debug!(?id, ?ttl, "armed expiry");
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .timer
            .schedule(self.inner.owner, token, ttl, None, move || {
                // The store may be gone by the time this fires.
                if let Some(inner) = weak.upgrade() {
                    inner.expire(id, token);
                }
            });
    }

    /// Removes and drops every value, cancelling every timer this store has
    /// registered.
    ///
    /// Timers are cancelled before any value is dropped, so no expiry can
    /// fire against a value mid-teardown.
    pub fn clear(&self) {
        let mut state = self.inner.locked();
        self.inner.timer.cancel_all(self.inner.owner);
        let count = state.entries.len();
        state.entries.clear();
        state.index.clear();
        debug!(count, "store cleared");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.locked().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.locked().entries.is_empty()
    }

    /// Returns a copy of every key currently in the store.
    pub fn keys(&self) -> Vec<K> {
        self.inner.locked().entries.keys()
    }

    /// The timer driving this store's expiries.
    pub fn timer(&self) -> &Timer {
        &self.inner.timer
    }
}

impl<K, V> Default for TimedStore<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// `Some(Duration::ZERO)` means "keep indefinitely", same as `None`; an
/// immediate expiry must be expressed as an explicit remove.
fn normalize_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}
