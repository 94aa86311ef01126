//! A reactive list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::LiveVar;
use crate::sync::SessionLock;

/// A list whose mutations repaint the section that last read it.
///
/// All rerender plumbing is delegated to an internal modification
/// counter held in a [`LiveVar`]: reads touch the counter (recording
/// the section association) and every operation that actually changes
/// the list bumps it — an out-of-bounds `remove` or `set` is not a
/// mutation and schedules nothing. Reads that materialize a view
/// return snapshots, so no borrow outlives the lock.
/// [`with_read_lock`](Self::with_read_lock) and
/// [`with_write_lock`](Self::with_write_lock) group several operations
/// under one acquisition of the session lock.
pub struct LiveList<T> {
    shared: Arc<ListShared<T>>,
}

struct ListShared<T> {
    lock: Arc<SessionLock>,
    items: Mutex<Vec<T>>,
    tick: LiveVar<u64>,
    next_tick: AtomicU64,
}

impl<T: Clone + Send + 'static> LiveList<T> {
    pub(crate) fn new(lock: Arc<SessionLock>, items: Vec<T>) -> Self {
        Self {
            shared: Arc::new(ListShared {
                lock: Arc::clone(&lock),
                items: Mutex::new(items),
                tick: LiveVar::new(lock, 0),
                next_tick: AtomicU64::new(1),
            }),
        }
    }

    fn read_items<R>(&self, f: impl FnOnce(&Vec<T>) -> R) -> R {
        self.shared.lock.read(|| {
            let _ = self.shared.tick.get();
            let items = self
                .shared
                .items
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            f(&items)
        })
    }

    /// Run a mutation under the write lock; `f` reports whether it
    /// actually changed the list, and only a real change bumps the
    /// counter (and so repaints).
    fn write_items<R>(&self, f: impl FnOnce(&mut Vec<T>) -> (R, bool)) -> R {
        self.shared.lock.write(|| {
            let (result, changed) = {
                let mut items = self
                    .shared
                    .items
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                f(&mut items)
            };
            if changed {
                let tick = self.shared.next_tick.fetch_add(1, Ordering::Relaxed);
                self.shared.tick.set(tick);
            }
            result
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.read_items(Vec::len)
    }

    /// True if the list holds no elements.
    pub fn is_empty(&self) -> bool {
        self.read_items(Vec::is_empty)
    }

    /// Clone of the element at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<T> {
        self.read_items(|items| items.get(index).cloned())
    }

    /// Snapshot of the whole list.
    pub fn to_vec(&self) -> Vec<T> {
        self.read_items(Vec::clone)
    }

    /// Append an element.
    pub fn push(&self, value: T) {
        self.write_items(|items| {
            items.push(value);
            ((), true)
        });
    }

    /// Insert at `index`, clamped to the list length.
    pub fn insert(&self, index: usize, value: T) {
        self.write_items(|items| {
            let index = index.min(items.len());
            items.insert(index, value);
            ((), true)
        });
    }

    /// Remove and return the element at `index`, if in bounds.
    pub fn remove(&self, index: usize) -> Option<T> {
        self.write_items(|items| {
            if index < items.len() {
                (Some(items.remove(index)), true)
            } else {
                (None, false)
            }
        })
    }

    /// Replace the element at `index`. Returns false if out of bounds.
    pub fn set(&self, index: usize, value: T) -> bool {
        self.write_items(|items| match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                (true, true)
            }
            None => (false, false),
        })
    }

    /// Remove all elements. A no-op on an empty list.
    pub fn clear(&self) {
        self.write_items(|items| {
            let had_items = !items.is_empty();
            items.clear();
            ((), had_items)
        });
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

impl<T> Clone for LiveList<T> {
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

    fn list() -> LiveList<i32> {
        LiveList::new(Arc::new(SessionLock::new()), Vec::new())
    }

    #[test]
    fn push_get_roundtrip() {
        let l = list();
        l.push(1);
        l.push(2);
        assert_eq!(l.len(), 2);
        assert_eq!(l.get(1), Some(2));
        assert_eq!(l.get(5), None);
    }

    #[test]
    fn to_vec_is_snapshot() {
        let l = list();
        l.push(1);
        let snapshot = l.to_vec();
        l.push(2);
        assert_eq!(snapshot, vec![1]);
    }

    #[test]
    fn insert_clamps_index() {
        let l = list();
        l.insert(10, 7);
        assert_eq!(l.to_vec(), vec![7]);
    }

    #[test]
    fn remove_out_of_bounds_is_none() {
        let l = list();
        assert_eq!(l.remove(0), None);
    }

    #[test]
    fn set_replaces_in_bounds() {
        let l = list();
        l.push(1);
        assert!(l.set(0, 9));
        assert!(!l.set(3, 9));
        assert_eq!(l.to_vec(), vec![9]);
    }

    #[test]
    fn mutation_after_render_read_requests_rerender() {
        let l = list();
        let target = CountingTarget::new();
        let weak = Arc::downgrade(&target) as Weak<dyn RerenderTarget>;
        with_render_target(weak, || {
            let _ = l.len();
        });

        l.push(1);
        assert_eq!(target.rerenders.load(Ordering::SeqCst), 1);
        l.clear();
        assert_eq!(target.rerenders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_mutations_do_not_rerender() {
        let l = list();
        l.push(1);
        let target = CountingTarget::new();
        let weak = Arc::downgrade(&target) as Weak<dyn RerenderTarget>;
        with_render_target(weak, || {
            let _ = l.len();
        });

        assert_eq!(l.remove(5), None);
        assert!(!l.set(5, 9));
        assert_eq!(target.rerenders.load(Ordering::SeqCst), 0);

        l.clear();
        assert_eq!(target.rerenders.load(Ordering::SeqCst), 1);
        // Clearing an already-empty list is not a mutation.
        l.clear();
        assert_eq!(target.rerenders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn grouped_ops_under_write_lock() {
        let l = list();
        l.with_write_lock(|l| {
            l.push(1);
            l.push(2);
            assert_eq!(l.len(), 2);
        });
        assert_eq!(l.to_vec(), vec![1, 2]);
    }
}
