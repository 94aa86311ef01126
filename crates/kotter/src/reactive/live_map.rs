//! A reactive map.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::LiveVar;
use crate::sync::SessionLock;

/// A keyed map whose mutations repaint the section that last read it.
///
/// Shares the rerender plumbing of [`LiveList`](super::LiveList): an
/// internal modification counter in a [`LiveVar`] is touched by reads
/// and bumped by every operation that actually changes the map —
/// removing an absent key or clearing an empty map schedules nothing.
/// Materialized views (keys, values, entries) are snapshots.
pub struct LiveMap<K, V> {
    shared: Arc<MapShared<K, V>>,
}

struct MapShared<K, V> {
    lock: Arc<SessionLock>,
    entries: Mutex<HashMap<K, V>>,
    tick: LiveVar<u64>,
    next_tick: AtomicU64,
}

impl<K, V> LiveMap<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    pub(crate) fn new(lock: Arc<SessionLock>, entries: HashMap<K, V>) -> Self {
        Self {
            shared: Arc::new(MapShared {
                lock: Arc::clone(&lock),
                entries: Mutex::new(entries),
                tick: LiveVar::new(lock, 0),
                next_tick: AtomicU64::new(1),
            }),
        }
    }

    fn read_entries<R>(&self, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        self.shared.lock.read(|| {
            let _ = self.shared.tick.get();
            let entries = self
                .shared
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            f(&entries)
        })
    }

    /// Run a mutation under the write lock; `f` reports whether it
    /// actually changed the map, and only a real change bumps the
    /// counter (and so repaints).
    fn write_entries<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> (R, bool)) -> R {
        self.shared.lock.write(|| {
            let (result, changed) = {
                let mut entries = self
                    .shared
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                f(&mut entries)
            };
            if changed {
                let tick = self.shared.next_tick.fetch_add(1, Ordering::Relaxed);
                self.shared.tick.set(tick);
            }
            result
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.read_entries(HashMap::len)
    }

    /// True if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.read_entries(HashMap::is_empty)
    }

    /// Clone of the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.read_entries(|entries| entries.get(key).cloned())
    }

    /// True if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.read_entries(|entries| entries.contains_key(key))
    }

    /// Insert a value, returning the previous one if any.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.write_entries(|entries| (entries.insert(key, value), true))
    }

    /// Remove the entry under `key`, returning its value if present.
    /// A no-op for an absent key.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.write_entries(|entries| {
            let removed = entries.remove(key);
            let changed = removed.is_some();
            (removed, changed)
        })
    }

    /// Remove all entries. A no-op on an empty map.
    pub fn clear(&self) {
        self.write_entries(|entries| {
            let had_entries = !entries.is_empty();
            entries.clear();
            ((), had_entries)
        });
    }

    /// Snapshot of the keys.
    pub fn keys(&self) -> Vec<K> {
        self.read_entries(|entries| entries.keys().cloned().collect())
    }

    /// Snapshot of the values.
    pub fn values(&self) -> Vec<V> {
        self.read_entries(|entries| entries.values().cloned().collect())
    }

    /// Snapshot of the entries.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.read_entries(|entries| {
            entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })
    }

    /// Run several read operations under one lock acquisition.
    pub fn with_read_lock<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.shared.lock.read(|| f(self))
    }

    /// Run several operations (reads and writes) under one acquisition
    /// of the write lock.
    pub fn with_write_lock<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.shared.lock.write(|| f(self))
    }
}

impl<K, V> Clone for LiveMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reactive::RerenderTarget;
    use crate::reactive::test_support::CountingTarget;
    use crate::reactive::with_render_target;
    use std::sync::Weak;
    use std::sync::atomic::Ordering;

    fn map() -> LiveMap<&'static str, i32> {
        LiveMap::new(Arc::new(SessionLock::new()), HashMap::new())
    }

    #[test]
    fn insert_get_roundtrip() {
        let m = map();
        assert_eq!(m.insert("a", 1), None);
        assert_eq!(m.insert("a", 2), Some(1));
        assert_eq!(m.get(&"a"), Some(2));
        assert!(m.contains_key(&"a"));
    }

    #[test]
    fn remove_clears_entry() {
        let m = map();
        m.insert("a", 1);
        assert_eq!(m.remove(&"a"), Some(1));
        assert_eq!(m.remove(&"a"), None);
        assert!(m.is_empty());
    }

    #[test]
    fn snapshots_are_detached() {
        let m = map();
        m.insert("a", 1);
        let keys = m.keys();
        m.insert("b", 2);
        assert_eq!(keys, vec!["a"]);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn mutation_after_render_read_requests_rerender() {
        let m = map();
        let target = CountingTarget::new();
        let weak = Arc::downgrade(&target) as Weak<dyn RerenderTarget>;
        with_render_target(weak, || {
            let _ = m.get(&"missing");
        });

        m.insert("k", 1);
        assert_eq!(target.rerenders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_mutations_do_not_rerender() {
        let m = map();
        let target = CountingTarget::new();
        let weak = Arc::downgrade(&target) as Weak<dyn RerenderTarget>;
        with_render_target(weak, || {
            let _ = m.len();
        });

        assert_eq!(m.remove(&"missing"), None);
        // Clearing an already-empty map is not a mutation.
        m.clear();
        assert_eq!(target.rerenders.load(Ordering::SeqCst), 0);

        m.insert("k", 1);
        assert_eq!(target.rerenders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn grouped_ops_under_write_lock() {
        let m = map();
        m.with_write_lock(|m| {
            m.insert("a", 1);
            m.insert("b", 2);
            assert_eq!(m.len(), 2);
        });
        assert_eq!(m.len(), 2);
    }
}
