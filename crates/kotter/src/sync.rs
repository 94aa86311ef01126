//! The session-wide reader/writer lock.
//!
//! Every read and write of session-scoped state (the data store and the
//! live primitives) is serialized through one [`SessionLock`]. A render
//! pass holds the write side for its whole duration, so live values
//! observed during a pass cannot change mid-pass.
//!
//! The lock is re-entrant per thread: a callback running under the lock
//! (a render block, an input callback, a timer callback) may call back
//! into locked operations without deadlocking. Re-entrant acquisition is
//! tracked per thread and per lock instance.

use std::cell::RefCell;
use std::sync::{PoisonError, RwLock};

thread_local! {
    /// Locks held by this thread: (lock identity, nesting depth, is_write).
    static HELD: RefCell<Vec<(usize, u32, bool)>> = const { RefCell::new(Vec::new()) };
}

/// A re-entrant reader/writer lock serializing session state.
///
/// Memory safety of the guarded structures is provided by their own
/// interior locks; this lock supplies the coarse isolation invariant
/// (readers share, writers exclude). Requesting `write` while the same
/// thread only holds `read` is a misuse: it is logged and runs under the
/// existing read hold rather than deadlocking.
pub(crate) struct SessionLock {
    rw: RwLock<()>,
}

impl SessionLock {
    pub(crate) fn new() -> Self {
        Self {
            rw: RwLock::new(()),
        }
    }

    fn key(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    /// True if this thread already holds the lock (either side).
    fn enter_reentrant(&self, want_write: bool) -> bool {
        let key = self.key();
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            for entry in held.iter_mut() {
                if entry.0 == key {
                    if want_write && !entry.2 {
                        tracing::warn!(
                            "write requested while read lock held on the same thread; \
                             proceeding under the read hold"
                        );
                    }
                    entry.1 += 1;
                    return true;
                }
            }
            false
        })
    }

    fn exit_reentrant(&self) {
        let key = self.key();
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().position(|e| e.0 == key) {
                held[pos].1 -= 1;
                if held[pos].1 == 0 {
                    held.swap_remove(pos);
                }
            }
        });
    }

    /// Run `f` holding the read side.
    pub(crate) fn read<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.enter_reentrant(false) {
            let result = f();
            self.exit_reentrant();
            return result;
        }
        let guard = self.rw.read().unwrap_or_else(PoisonError::into_inner);
        HELD.with(|held| held.borrow_mut().push((self.key(), 1, false)));
        let result = f();
        self.exit_reentrant();
        drop(guard);
        result
    }

    /// Run `f` holding the write side.
    pub(crate) fn write<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.enter_reentrant(true) {
            let result = f();
            self.exit_reentrant();
            return result;
        }
        let guard = self.rw.write().unwrap_or_else(PoisonError::into_inner);
        HELD.with(|held| held.borrow_mut().push((self.key(), 1, true)));
        let result = f();
        self.exit_reentrant();
        drop(guard);
        result
    }
}
