use std::collections::HashMap;
use std::hash::Hash;

/// Hook invoked with the key and value of every removed entry, before the
/// value is dropped.
type RemovalHook<K, V> = Box<dyn FnMut(&K, &V) + Send>;

/// Keyed container that owns its values.
///
/// Values are moved into the store on insert and dropped by the store when
/// they are removed, replaced, or cleared. A removal hook can be installed
/// at construction; it runs synchronously on every removal path before the
/// value is dropped, which lets a wrapping layer release resources tied to
/// the value (see [`TimedStore`](crate::TimedStore)).
///
/// The store itself is not synchronized; wrap it in a lock for shared
/// access.
pub struct Store<K, V> {
    entries: HashMap<K, V>,
    on_remove: Option<RemovalHook<K, V>>,
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty store with no removal hook.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            on_remove: None,
        }
    }

    /// Creates an empty store whose `hook` runs for every removed entry,
    /// before the value is dropped.
    pub fn with_removal_hook(hook: impl FnMut(&K, &V) + Send + 'static) -> Self {
        Self {
            entries: HashMap::new(),
            on_remove: Some(Box::new(hook)),
        }
    }

    fn notify(&mut self, key: &K, value: &V) {
        if let Some(hook) = self.on_remove.as_mut() {
            hook(key, value);
        }
    }

    /// Inserts `value` under `key`, taking ownership of it.
    ///
    /// If the key was already occupied the previous value is removed first,
    /// invoking the removal hook before it is dropped.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(old) = self.entries.remove(&key) {
            self.notify(&key, &old);
        }
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    /// Removes the entry under `key` and drops its value.
    ///
    /// Returns `true` if the key held a value. The removal hook runs before
    /// the value is dropped.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(value) => {
                self.notify(key, &value);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes and drops every entry, invoking the removal hook for each
    /// before any value is dropped.
    pub fn clear(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        for (key, value) in &entries {
            self.notify(key, value);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy of every key currently in the store.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.entries.keys().cloned().collect()
    }
}

impl<K, V> Default for Store<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
