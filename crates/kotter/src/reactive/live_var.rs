//! A reactive single value.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::{RerenderTarget, current_render_target};
use crate::sync::SessionLock;

/// A mutable value that repaints the section that last read it.
///
/// `LiveVar` handles are cheaply cloneable; clones share the underlying
/// value. Reads during a render pass record a weak back-reference to the
/// rendering section. A write that changes the value (by `PartialEq`)
/// requests a rerender on that section if, and only if, it is still the
/// active one. The association is weak: a finished and dropped section
/// never keeps the value alive and never receives stale repaints.
pub struct LiveVar<T> {
    shared: Arc<LiveShared<T>>,
}

struct LiveShared<T> {
    lock: Arc<SessionLock>,
    state: Mutex<LiveState<T>>,
}

struct LiveState<T> {
    value: T,
    target: Option<Weak<dyn RerenderTarget>>,
}

impl<T: Clone + PartialEq + Send + 'static> LiveVar<T> {
    pub(crate) fn new(lock: Arc<SessionLock>, value: T) -> Self {
        Self {
            shared: Arc::new(LiveShared {
                lock,
                state: Mutex::new(LiveState {
                    value,
                    target: None,
                }),
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LiveState<T>) -> R) -> R {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Read the value, associating this variable with the section
    /// currently being rendered (if any).
    pub fn get(&self) -> T {
        self.shared.lock.read(|| {
            self.with_state(|state| {
                if let Some(target) = current_render_target() {
                    state.target = Some(target);
                }
                state.value.clone()
            })
        })
    }

    /// Write the value. If it differs from the previous one, request a
    /// rerender on the associated section.
    pub fn set(&self, value: T) {
        let notify = self.shared.lock.write(|| {
            self.with_state(|state| {
                if state.value == value {
                    return None;
                }
                state.value = value;
                state.target.clone()
            })
        });
        self.notify(notify);
    }

    /// Mutate the value in place; notifies like [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let notify = self.shared.lock.write(|| {
            self.with_state(|state| {
                let before = state.value.clone();
                f(&mut state.value);
                if state.value == before {
                    return None;
                }
                state.target.clone()
            })
        });
        self.notify(notify);
    }

    fn notify(&self, target: Option<Weak<dyn RerenderTarget>>) {
        let Some(weak) = target else { return };
        match weak.upgrade() {
            Some(section) if section.is_active_target() => section.request_rerender(),
            Some(_) => {}
            None => {
                // Section is gone; drop the stale association.
                self.with_state(|state| state.target = None);
            }
        }
    }
}

impl<T> Clone for LiveVar<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
