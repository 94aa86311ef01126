//! Timers scoped to a section run.
//!
//! A [`TimerManager`] keeps an ordered wake queue and a single background
//! loop that ticks roughly every 16 ms, draining every due timer in wake
//! order. Callbacks can stretch or shrink their own duration and turn
//! repetition off through the [`TimerScope`] they receive. Disposing the
//! manager (at run end) discards all timers, so finishing hooks observe a
//! quiescent system.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{KotterError, Result};

/// The background loop's tick interval.
pub(crate) const TICK: Duration = Duration::from_millis(16);

static NEXT_TIMER_KEY: AtomicU64 = AtomicU64::new(1);

/// A deduplication key for timers.
///
/// Scheduling a timer with a key that is already live is a no-op, which
/// lets reactive code request its timer on every read without stacking
/// duplicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerKey(u64);

impl TimerKey {
    /// Allocate a key no other caller holds.
    #[must_use]
    pub fn unique() -> Self {
        Self(NEXT_TIMER_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

/// The view a timer callback gets of its own schedule.
pub struct TimerScope {
    /// Time since this timer last asked to be woken.
    pub elapsed: Duration,
    /// Time since the timer was first enqueued.
    pub total_elapsed: Duration,
    /// The wake interval; may be changed for subsequent fires. Setting a
    /// zero duration removes the timer.
    pub duration: Duration,
    /// Whether the timer reschedules itself after this fire.
    pub repeat: bool,
}

type TimerCallback = Box<dyn FnMut(&mut TimerScope) + Send>;

struct TimerEntry {
    enqueued: Instant,
    last_fire: Instant,
    duration: Duration,
    repeat: bool,
    key: Option<TimerKey>,
    callback: TimerCallback,
}

#[derive(Default)]
struct TimerQueue {
    /// Wake queue ordered by (wake time, insertion sequence).
    timers: BTreeMap<(Instant, u64), TimerEntry>,
    live_keys: HashSet<TimerKey>,
    next_seq: u64,
    disposed: bool,
}

struct TimerShared {
    queue: Mutex<TimerQueue>,
    cancel: CancellationToken,
}

/// The per-run timer registry and its background loop.
pub struct TimerManager {
    shared: Arc<TimerShared>,
}

impl TimerManager {
    /// Create a manager and spawn its tick loop. Must be called from
    /// within a tokio runtime.
    pub(crate) fn new() -> Self {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new(TimerQueue::default()),
            cancel: CancellationToken::new(),
        });

        let loop_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = loop_shared.cancel.cancelled() => break,
                    () = tokio::time::sleep(TICK) => {}
                }
                Self::process_due(&loop_shared, Instant::now());
            }
        });

        Self { shared }
    }

    fn with_queue<R>(shared: &TimerShared, f: impl FnOnce(&mut TimerQueue) -> R) -> R {
        let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut queue)
    }

    /// Schedule a callback to fire after `duration` (and, with `repeat`,
    /// every `duration` thereafter).
    ///
    /// Returns false when a live timer already holds `key` or the manager
    /// has been disposed. Fails on a zero duration.
    pub fn add_timer(
        &self,
        duration: Duration,
        repeat: bool,
        key: Option<TimerKey>,
        callback: impl FnMut(&mut TimerScope) + Send + 'static,
    ) -> Result<bool> {
        if duration.is_zero() {
            tracing::debug!("rejecting timer with zero duration");
            return Err(KotterError::InvalidTimer(duration));
        }
        let now = Instant::now();
        Self::with_queue(&self.shared, |queue| {
            if queue.disposed {
                return Ok(false);
            }
            if let Some(key) = key
                && queue.live_keys.contains(&key)
            {
                return Ok(false);
            }
            if let Some(key) = key {
                queue.live_keys.insert(key);
            }
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.timers.insert(
                (now + duration, seq),
                TimerEntry {
                    enqueued: now,
                    last_fire: now,
                    duration,
                    repeat,
                    key,
                    callback: Box::new(callback),
                },
            );
            Ok(true)
        })
    }

    /// Number of timers currently scheduled.
    pub fn len(&self) -> usize {
        Self::with_queue(&self.shared, |queue| queue.timers.len())
    }

    /// True if no timer is scheduled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every timer and stop the tick loop.
    pub(crate) fn dispose(&self) {
        self.shared.cancel.cancel();
        Self::with_queue(&self.shared, |queue| {
            queue.disposed = true;
            queue.timers.clear();
            queue.live_keys.clear();
        });
    }

    /// Fire every timer due at `now`, in wake order. Repeating timers are
    /// rescheduled after their callback returns, unless the callback
    /// cleared `repeat` or zeroed the duration.
    fn process_due(shared: &TimerShared, now: Instant) {
        loop {
            let due = Self::with_queue(shared, |queue| {
                let first = queue.timers.first_key_value().map(|(k, _)| *k)?;
                if first.0 > now {
                    return None;
                }
                queue.timers.remove(&first).map(|entry| (first.1, entry))
            });
            let Some((seq, mut entry)) = due else { break };

            let mut scope = TimerScope {
                elapsed: now.saturating_duration_since(entry.last_fire),
                total_elapsed: now.saturating_duration_since(entry.enqueued),
                duration: entry.duration,
                repeat: entry.repeat,
            };
            // Callback runs without the queue lock so it may add timers.
            (entry.callback)(&mut scope);

            Self::with_queue(shared, |queue| {
                if queue.disposed {
                    return;
                }
                if scope.repeat && !scope.duration.is_zero() {
                    entry.duration = scope.duration;
                    entry.repeat = true;
                    entry.last_fire = now;
                    queue.timers.insert((now + scope.duration, seq), entry);
                } else if let Some(key) = entry.key {
                    queue.live_keys.remove(&key);
                }
            });
        }
    }

    /// Test-only deterministic drain at a fabricated instant.
    #[cfg(test)]
    pub(crate) fn drain_at(&self, now: Instant) {
        Self::process_due(&self.shared, now);
    }
}

impl Clone for TimerManager {
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
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let manager = TimerManager::new();
        let err = manager
            .add_timer(Duration::ZERO, false, None, |_| {})
            .unwrap_err();
        assert!(matches!(err, KotterError::InvalidTimer(_)));
        manager.dispose();
    }

    #[tokio::test]
    async fn one_shot_fires_once() {
        let manager = TimerManager::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&fires);
        manager
            .add_timer(Duration::from_millis(10), false, None, move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let later = Instant::now() + Duration::from_millis(50);
        manager.drain_at(later);
        manager.drain_at(later + Duration::from_millis(50));
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
        manager.dispose();
    }

    #[tokio::test]
    async fn repeat_fires_until_cleared() {
        let manager = TimerManager::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&fires);
        manager
            .add_timer(Duration::from_millis(10), true, None, move |scope| {
                let n = counted.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 3 {
                    scope.repeat = false;
                }
            })
            .unwrap();

        let mut now = Instant::now();
        for _ in 0..6 {
            now += Duration::from_millis(20);
            manager.drain_at(now);
        }
        assert_eq!(fires.load(Ordering::SeqCst), 3);
        assert!(manager.is_empty());
        manager.dispose();
    }

    #[tokio::test]
    async fn zeroed_duration_removes_repeating_timer() {
        let manager = TimerManager::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&fires);
        manager
            .add_timer(Duration::from_millis(10), true, None, move |scope| {
                counted.fetch_add(1, Ordering::SeqCst);
                scope.duration = Duration::ZERO;
            })
            .unwrap();

        let mut now = Instant::now();
        for _ in 0..3 {
            now += Duration::from_millis(20);
            manager.drain_at(now);
        }
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        manager.dispose();
    }

    #[tokio::test]
    async fn keyed_timer_deduplicates() {
        let manager = TimerManager::new();
        let key = TimerKey::unique();
        assert!(
            manager
                .add_timer(Duration::from_millis(10), true, Some(key), |_| {})
                .unwrap()
        );
        assert!(
            !manager
                .add_timer(Duration::from_millis(10), true, Some(key), |_| {})
                .unwrap()
        );
        assert_eq!(manager.len(), 1);
        manager.dispose();
    }

    #[tokio::test]
    async fn key_is_reusable_after_one_shot_fires() {
        let manager = TimerManager::new();
        let key = TimerKey::unique();
        manager
            .add_timer(Duration::from_millis(10), false, Some(key), |_| {})
            .unwrap();
        manager.drain_at(Instant::now() + Duration::from_millis(50));
        assert!(
            manager
                .add_timer(Duration::from_millis(10), false, Some(key), |_| {})
                .unwrap()
        );
        manager.dispose();
    }

    #[tokio::test]
    async fn callback_can_stretch_duration() {
        let manager = TimerManager::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&fires);
        manager
            .add_timer(Duration::from_millis(10), true, None, move |scope| {
                counted.fetch_add(1, Ordering::SeqCst);
                scope.duration = Duration::from_secs(3600);
            })
            .unwrap();

        let start = Instant::now();
        manager.drain_at(start + Duration::from_millis(20));
        manager.drain_at(start + Duration::from_millis(40));
        // Second fire is an hour away now.
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert_eq!(manager.len(), 1);
        manager.dispose();
    }

    #[tokio::test]
    async fn dispose_discards_timers() {
        let manager = TimerManager::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&fires);
        manager
            .add_timer(Duration::from_millis(10), true, None, move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        manager.dispose();
        assert!(manager.is_empty());
        manager.drain_at(Instant::now() + Duration::from_secs(1));
        assert_eq!(fires.load(Ordering::SeqCst), 0);
        assert!(
            !manager
                .add_timer(Duration::from_millis(10), false, None, |_| {})
                .unwrap()
        );
    }

    #[tokio::test]
    async fn due_timers_fire_in_wake_order() {
        let manager = TimerManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, ms) in [("slow", 30u64), ("fast", 10u64)] {
            let order = Arc::clone(&order);
            manager
                .add_timer(Duration::from_millis(ms), false, None, move |_| {
                    order.lock().unwrap().push(label);
                })
                .unwrap();
        }
        manager.drain_at(Instant::now() + Duration::from_millis(100));
        assert_eq!(*order.lock().unwrap(), vec!["fast", "slow"]);
        manager.dispose();
    }
}
