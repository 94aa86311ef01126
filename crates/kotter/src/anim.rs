//! Frame-indexed animations driven by the run's timer loop.
//!
//! An animation registers a single repeating timer (deduplicated by the
//! animation instance) the first time it is read inside a render pass.
//! Each tick advances the elapsed clock and publishes the frame index
//! through a [`LiveVar`], so the reading section repaints automatically.
//! Reading outside a live section is allowed and simply shows the
//! current frame without animating.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::reactive::{LiveVar, current_render_target};
use crate::render_scope::RenderScope;
use crate::sync::SessionLock;
use crate::timer::{TICK, TimerKey};

struct AnimClock {
    frame_ms: u128,
    total_ms: u128,
    timer_key: TimerKey,
    elapsed_ms: Mutex<u128>,
    frame_index: LiveVar<usize>,
}

impl AnimClock {
    fn new(lock: Arc<SessionLock>, frame_count: usize, frame_duration: Duration) -> Self {
        let frame_ms = frame_duration.as_millis().max(1);
        Self {
            frame_ms,
            total_ms: frame_ms * frame_count.max(1) as u128,
            timer_key: TimerKey::unique(),
            elapsed_ms: Mutex::new(0),
            frame_index: LiveVar::new(lock, 0),
        }
    }

    /// Register the driving timer if a section is currently rendering.
    fn ensure_timer(self: &Arc<Self>) {
        let Some(target) = current_render_target().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let clock = Arc::clone(self);
        target.add_keyed_timer(
            self.timer_key,
            TICK,
            Box::new(move || clock.advance(TICK.as_millis())),
        );
    }

    fn advance(&self, by_ms: u128) {
        let frame = {
            let mut elapsed = self
                .elapsed_ms
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *elapsed = (*elapsed + by_ms) % self.total_ms;
            (*elapsed / self.frame_ms) as usize
        };
        self.frame_index.set(frame);
    }

    fn current_frame(&self) -> usize {
        self.frame_index.get()
    }
}

/// An animation cycling through a fixed list of frame strings.
pub struct TextAnim {
    frames: Vec<String>,
    clock: Arc<AnimClock>,
}

impl TextAnim {
    pub(crate) fn new(lock: Arc<SessionLock>, frames: Vec<String>, frame_duration: Duration) -> Self {
        let clock = Arc::new(AnimClock::new(lock, frames.len(), frame_duration));
        Self { frames, clock }
    }

    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The frame for the current tick. Reading from inside a render pass
    /// starts the animation and subscribes the section to frame changes.
    pub fn curr_frame(&self) -> String {
        self.clock.ensure_timer();
        let index = self.clock.current_frame();
        self.frames.get(index).cloned().unwrap_or_default()
    }
}

impl fmt::Display for TextAnim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.curr_frame())
    }
}

type DrawFn = Box<dyn Fn(&mut RenderScope<'_>, usize) + Send + Sync>;

/// An animation whose frames are drawn by a callback instead of fixed
/// strings; the callback may emit arbitrary commands.
pub struct RenderAnim {
    frame_count: usize,
    draw: DrawFn,
    clock: Arc<AnimClock>,
}

impl RenderAnim {
    pub(crate) fn new(
        lock: Arc<SessionLock>,
        frame_count: usize,
        frame_duration: Duration,
        draw: impl Fn(&mut RenderScope<'_>, usize) + Send + Sync + 'static,
    ) -> Self {
        Self {
            frame_count,
            draw: Box::new(draw),
            clock: Arc::new(AnimClock::new(lock, frame_count, frame_duration)),
        }
    }

    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Draw the current frame into `scope`, starting the animation on
    /// first use inside a render pass.
    pub fn render(&self, scope: &mut RenderScope<'_>) {
        self.clock.ensure_timer();
        let index = self.clock.current_frame().min(self.frame_count.saturating_sub(1));
        (self.draw)(scope, index);
    }
}
