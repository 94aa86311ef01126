//! Reactive primitives for automatic repaint.
//!
//! Provides [`LiveVar<T>`] for single values and [`LiveList<T>`] /
//! [`LiveMap<K, V>`] for collections. Reading one inside a render pass
//! associates it (weakly) with the section being rendered; a later write
//! that actually changes the value requests a coalesced rerender of that
//! section, provided it is still the active one.

mod live_list;
mod live_map;
mod live_var;

pub use live_list::LiveList;
pub use live_map::LiveMap;
pub use live_var::LiveVar;

use std::cell::RefCell;
use std::sync::Weak;

/// The hook a section exposes to the reactive layer.
///
/// Implemented by the section runtime; kept as a trait so the reactive
/// primitives do not depend on the section machinery.
pub(crate) trait RerenderTarget: Send + Sync {
    /// True while this section still owns the active-section slot.
    fn is_active_target(&self) -> bool;

    /// Schedule a coalesced render pass.
    fn request_rerender(&self);

    /// Register a repeating timer on the current run, deduplicated by
    /// `key`. Used by animations on first read.
    fn add_keyed_timer(
        &self,
        key: crate::timer::TimerKey,
        interval: std::time::Duration,
        callback: Box<dyn FnMut() + Send>,
    );
}

thread_local! {
    /// The section currently being rendered on this thread, if any.
    static ACTIVE_RENDER: RefCell<Option<Weak<dyn RerenderTarget>>> =
        const { RefCell::new(None) };
}

/// Run `f` with `target` installed as the rendering section. The
/// installation is cleared even if `f` unwinds.
pub(crate) fn with_render_target<R>(
    target: Weak<dyn RerenderTarget>,
    f: impl FnOnce() -> R,
) -> R {
    struct Reset;
    impl Drop for Reset {
        fn drop(&mut self) {
            ACTIVE_RENDER.with(|cell| *cell.borrow_mut() = None);
        }
    }
    ACTIVE_RENDER.with(|cell| *cell.borrow_mut() = Some(target));
    let _reset = Reset;
    f()
}

/// The section being rendered on this thread, if a render pass is live.
pub(crate) fn current_render_target() -> Option<Weak<dyn RerenderTarget>> {
    ACTIVE_RENDER.with(|cell| cell.borrow().clone())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A minimal rerender target for exercising the reactive layer
    //! without a session.

    use super::RerenderTarget;
    use crate::timer::TimerKey;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    type StoredTimer = (TimerKey, Box<dyn FnMut() + Send>);

    pub(crate) struct CountingTarget {
        pub active: AtomicBool,
        pub rerenders: AtomicUsize,
        pub timers: Mutex<Vec<StoredTimer>>,
    }

    impl CountingTarget {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                active: AtomicBool::new(true),
                rerenders: AtomicUsize::new(0),
                timers: Mutex::new(Vec::new()),
            })
        }

        /// Invoke every registered timer callback once.
        pub(crate) fn tick_timers(&self) {
            let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            for (_, callback) in timers.iter_mut() {
                callback();
            }
        }
    }

    impl RerenderTarget for CountingTarget {
        fn is_active_target(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        fn request_rerender(&self) {
            self.rerenders.fetch_add(1, Ordering::SeqCst);
        }

        fn add_keyed_timer(
            &self,
            key: TimerKey,
            _interval: std::time::Duration,
            callback: Box<dyn FnMut() + Send>,
        ) {
            let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            if timers.iter().any(|(k, _)| *k == key) {
                return;
            }
            timers.push((key, callback));
        }
    }
}
