//! A concurrent key/value store whose entries are reclaimed when a named
//! lifecycle ends.
//!
//! Lifecycles form a static parent/child forest (session → section →
//! run/render). Every entry is bound to a lifecycle at its [`Key`];
//! stopping a lifecycle disposes the entries bound to it in insertion
//! order and then recursively stops its active descendants. All access is
//! serialized by the session's reader/writer lock.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{KotterError, Result};
use crate::sync::SessionLock;

/// A named scope in the data store's lifecycle forest.
///
/// Lifecycles are declared as statics; identity is the static's address.
pub struct Lifecycle {
    /// Name used in error messages.
    pub name: &'static str,
    /// Parent lifecycle; `None` for a root.
    pub parent: Option<&'static Lifecycle>,
}

/// Stable identity of a static lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct LifecycleId(usize);

impl Lifecycle {
    fn id(&'static self) -> LifecycleId {
        LifecycleId(std::ptr::from_ref(self) as usize)
    }
}

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// A typed key binding a value slot to a lifecycle.
pub struct Key<T> {
    lifecycle: &'static Lifecycle,
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    /// Create a key whose entries live and die with `lifecycle`.
    #[must_use]
    pub fn new(lifecycle: &'static Lifecycle) -> Self {
        Self {
            lifecycle,
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    /// The lifecycle this key is bound to.
    pub fn lifecycle(&self) -> &'static Lifecycle {
        self.lifecycle
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

type StoredValue = Arc<dyn Any + Send + Sync>;
type DisposeFn = Box<dyn FnOnce(&StoredValue) + Send>;

struct Entry {
    key_id: u64,
    lifecycle: LifecycleId,
    value: StoredValue,
    dispose: Option<DisposeFn>,
}

#[derive(Default)]
struct StoreInner {
    /// Active lifecycles, by identity, with the static kept for parent walks.
    active: HashMap<LifecycleId, &'static Lifecycle>,
    /// Entries in insertion order.
    entries: Vec<Entry>,
}

/// The lifecycle-scoped store shared by a session.
pub struct ConcurrentScopedData {
    lock: Arc<SessionLock>,
    inner: Mutex<StoreInner>,
}

impl ConcurrentScopedData {
    pub(crate) fn new(lock: Arc<SessionLock>) -> Self {
        Self {
            lock,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut StoreInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    /// Activate a lifecycle. A no-op if it is already active; fails if its
    /// parent is not active.
    pub fn start(&self, lifecycle: &'static Lifecycle) -> Result<()> {
        self.lock.write(|| {
            self.with_inner(|inner| {
                if let Some(parent) = lifecycle.parent
                    && !inner.active.contains_key(&parent.id())
                {
                    return Err(KotterError::InactiveLifecycle(parent.name));
                }
                inner.active.insert(lifecycle.id(), lifecycle);
                Ok(())
            })
        })
    }

    /// True if `lifecycle` is currently active.
    pub fn is_active(&self, lifecycle: &'static Lifecycle) -> bool {
        self.lock
            .read(|| self.with_inner(|inner| inner.active.contains_key(&lifecycle.id())))
    }

    /// Deactivate a lifecycle: dispose its entries in insertion order,
    /// then recursively stop its active descendants. A no-op if the
    /// lifecycle is not active.
    pub fn stop(&self, lifecycle: &'static Lifecycle) {
        self.lock.write(|| self.stop_locked(lifecycle));
    }

    fn stop_locked(&self, lifecycle: &'static Lifecycle) {
        let id = lifecycle.id();
        let removed = self.with_inner(|inner| {
            if inner.active.remove(&id).is_none() {
                return None;
            }
            let mut kept = Vec::with_capacity(inner.entries.len());
            let mut dropped = Vec::new();
            for entry in inner.entries.drain(..) {
                if entry.lifecycle == id {
                    dropped.push(entry);
                } else {
                    kept.push(entry);
                }
            }
            inner.entries = kept;
            let children: Vec<&'static Lifecycle> = inner
                .active
                .values()
                .copied()
                .filter(|l| l.parent.is_some_and(|p| p.id() == id))
                .collect();
            Some((dropped, children))
        });

        let Some((dropped, children)) = removed else {
            return;
        };
        for mut entry in dropped {
            if let Some(dispose) = entry.dispose.take() {
                dispose(&entry.value);
            }
        }
        for child in children {
            self.stop_locked(child);
        }
    }

    /// Stop every active root lifecycle, cascading through the forest.
    pub fn stop_all(&self) {
        self.lock.write(|| {
            let roots: Vec<&'static Lifecycle> = self.with_inner(|inner| {
                inner
                    .active
                    .values()
                    .copied()
                    .filter(|l| l.parent.is_none())
                    .collect()
            });
            for root in roots {
                self.stop_locked(root);
            }
        });
    }

    /// Insert a value if the key is absent. Returns false (without calling
    /// `provide`) when the key is already present; fails if the key's
    /// lifecycle is not active.
    pub fn try_put<T: Send + Sync + 'static>(
        &self,
        key: Key<T>,
        provide: impl FnOnce() -> T,
        dispose: Option<Box<dyn FnOnce(&T) + Send>>,
    ) -> Result<bool> {
        self.lock.write(|| {
            self.with_inner(|inner| {
                if !inner.active.contains_key(&key.lifecycle.id()) {
                    return Err(KotterError::InactiveLifecycle(key.lifecycle.name));
                }
                if inner.entries.iter().any(|e| e.key_id == key.id) {
                    return Ok(false);
                }
                let value: StoredValue = Arc::new(provide());
                let dispose = dispose.map(|d| {
                    Box::new(move |stored: &StoredValue| {
                        if let Some(typed) = stored.downcast_ref::<T>() {
                            d(typed);
                        }
                    }) as DisposeFn
                });
                inner.entries.push(Entry {
                    key_id: key.id,
                    lifecycle: key.lifecycle.id(),
                    value,
                    dispose,
                });
                Ok(true)
            })
        })
    }

    /// Insert a value if absent, then run `block` against the stored value
    /// while still holding the write lock.
    pub fn put_if_absent<T: Send + Sync + 'static, R>(
        &self,
        key: Key<T>,
        provide: impl FnOnce() -> T,
        dispose: Option<Box<dyn FnOnce(&T) + Send>>,
        block: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        self.lock.write(|| {
            self.try_put(key, provide, dispose)?;
            let stored = self
                .with_inner(|inner| {
                    inner
                        .entries
                        .iter()
                        .find(|e| e.key_id == key.id)
                        .map(|e| Arc::clone(&e.value))
                })
                .ok_or(KotterError::InactiveLifecycle(key.lifecycle.name))?;
            let typed = stored
                .downcast_ref::<T>()
                .ok_or(KotterError::InactiveLifecycle(key.lifecycle.name))?;
            Ok(block(typed))
        })
    }

    /// A shared handle to the value stored for `key`, if present. The
    /// handle stays valid after the entry is disposed; disposal only
    /// drops the store's reference.
    pub fn get_handle<T: Send + Sync + 'static>(&self, key: Key<T>) -> Option<Arc<T>> {
        self.lock.read(|| {
            let stored = self.with_inner(|inner| {
                inner
                    .entries
                    .iter()
                    .find(|e| e.key_id == key.id)
                    .map(|e| Arc::clone(&e.value))
            })?;
            stored.downcast::<T>().ok()
        })
    }

    /// Run `block` against the value stored for `key`, if present.
    pub fn get<T: Send + Sync + 'static, R>(
        &self,
        key: Key<T>,
        block: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        self.lock.read(|| {
            let stored = self.with_inner(|inner| {
                inner
                    .entries
                    .iter()
                    .find(|e| e.key_id == key.id)
                    .map(|e| Arc::clone(&e.value))
            })?;
            stored.downcast_ref::<T>().map(block)
        })
    }

    /// Remove the entry for `key`, running its dispose callback. Returns
    /// true if an entry was removed.
    pub fn remove<T: Send + Sync + 'static>(&self, key: Key<T>) -> bool {
        self.lock.write(|| {
            let entry = self.with_inner(|inner| {
                inner
                    .entries
                    .iter()
                    .position(|e| e.key_id == key.id)
                    .map(|pos| inner.entries.remove(pos))
            });
            match entry {
                Some(mut entry) => {
                    if let Some(dispose) = entry.dispose.take() {
                        dispose(&entry.value);
                    }
                    true
                }
                None => false,
            }
        })
    }
}
