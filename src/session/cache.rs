//! Bounded, access-ordered session cache.
//!
//! A fixed-capacity map from session key to value, ordered by recency of
//! access. Inserting a *new* key at capacity evicts exactly one entry, the
//! least-recently-touched, and hands it to the eviction hook before the new
//! entry is admitted. Re-inserting an *existing* key promotes it and never
//! evicts; this asymmetry is load-bearing for the lifecycle layer, which
//! implements "touch" as get-and-update rather than delete-and-reinsert.

use std::collections::{HashMap, VecDeque};

use super::types::SessionKey;

/// Callback invoked synchronously with each evicted entry, before the
/// triggering insert completes. Must not panic; errors in any cleanup it
/// starts are the hook's own problem to absorb.
pub type EvictionHook<V> = Box<dyn FnMut(&SessionKey, V) + Send>;

/// Fixed-capacity key→value map with LRU eviction.
///
/// Not internally synchronized; the owner serializes access.
pub struct SessionCache<V> {
    capacity: usize,
    map: HashMap<SessionKey, V>,
    /// Recency order, oldest-accessed at the front.
    order: VecDeque<SessionKey>,
    on_evict: EvictionHook<V>,
}

impl<V> SessionCache<V> {
    pub fn new(capacity: usize, on_evict: EvictionHook<V>) -> Self {
        assert!(capacity > 0, "session capacity must be at least 1");
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            on_evict,
        }
    }

    /// Look up a key and promote it to most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.promote(key);
        self.map.get(key)
    }

    /// Mutable variant of [`get`](Self::get); same promotion side effect.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.promote(key);
        self.map.get_mut(key)
    }

    /// Membership test with no recency side effect.
    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Insert or replace.
    ///
    /// Replacing an existing key promotes it and never evicts. Inserting a
    /// new key at capacity evicts the least-recently-used entry through the
    /// hook first.
    pub fn insert(&mut self, key: SessionKey, value: V) {
        if self.map.contains_key(key.as_str()) {
            self.promote(key.as_str());
            self.map.insert(key, value);
            return;
        }
        if self.map.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                if let Some(evicted) = self.map.remove(oldest.as_str()) {
                    (self.on_evict)(&oldest, evicted);
                }
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);
    }

    /// Remove a key if present. Never invokes the eviction hook, and is a
    /// no-op on absent keys so concurrent close paths cannot fault.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let value = self.map.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            self.order.remove(pos);
        }
        Some(value)
    }

    /// All entries, oldest-accessed first. The idle sweep walks this to find
    /// stale sessions without a second ordering structure.
    pub fn entries(&self) -> impl Iterator<Item = (&SessionKey, &V)> {
        self.order
            .iter()
            .filter_map(|k| self.map.get(k.as_str()).map(|v| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry without firing the hook. Teardown paths close the
    /// engines themselves before calling this.
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    fn promote(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_cache(capacity: usize) -> (SessionCache<u32>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hook_log = log.clone();
        let cache = SessionCache::new(
            capacity,
            Box::new(move |key, _value| {
                hook_log.lock().expect("hook log").push(key.to_string());
            }),
        );
        (cache, log)
    }

    fn evicted(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().expect("hook log").clone()
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let (mut cache, log) = recording_cache(3);
        for name in ["a", "b", "c", "d", "e"] {
            cache.insert(name.into(), 0);
            assert!(cache.len() <= 3);
        }
        assert_eq!(evicted(&log), vec!["a", "b"]);
    }

    #[test]
    fn get_promotes_to_most_recent() {
        let (mut cache, log) = recording_cache(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        assert_eq!(cache.get("a"), Some(&1));

        // "b" is now the least recently used.
        cache.insert("c".into(), 3);
        assert_eq!(evicted(&log), vec!["b"]);
        assert!(cache.has("a"));
        assert!(cache.has("c"));
    }

    #[test]
    fn has_grants_no_recency_credit() {
        let (mut cache, log) = recording_cache(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        for _ in 0..5 {
            assert!(cache.has("a"));
        }

        // "a" is still oldest despite the has() calls.
        cache.insert("c".into(), 3);
        assert_eq!(evicted(&log), vec!["a"]);
    }

    #[test]
    fn reinserting_existing_key_promotes_without_eviction() {
        let (mut cache, log) = recording_cache(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("a".into(), 10);
        assert!(evicted(&log).is_empty());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(&10));

        // The reinsert promoted "a", so "b" goes first.
        cache.insert("c".into(), 3);
        assert_eq!(evicted(&log), vec!["b"]);
    }

    #[test]
    fn eviction_hook_fires_once_before_insert_completes() {
        let (mut cache, log) = recording_cache(1);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        assert_eq!(evicted(&log), vec!["a"]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(&2));
    }

    #[test]
    fn remove_is_idempotent_and_never_fires_hook() {
        let (mut cache, log) = recording_cache(2);
        cache.insert("a".into(), 1);
        assert_eq!(cache.remove("a"), Some(1));
        assert_eq!(cache.remove("a"), None);
        assert_eq!(cache.remove("never-existed"), None);
        assert!(evicted(&log).is_empty());
    }

    #[test]
    fn entries_iterate_oldest_first() {
        let (mut cache, _log) = recording_cache(3);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("c".into(), 3);
        assert_eq!(cache.get("a"), Some(&1));

        let order: Vec<&str> = cache.entries().map(|(k, _)| k.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn clear_empties_without_hook() {
        let (mut cache, log) = recording_cache(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(evicted(&log).is_empty());
    }
}
