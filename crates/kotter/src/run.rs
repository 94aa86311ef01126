//! The suspendable foreground of a section: the run scope, signals,
//! cancellation, and the `run_until_*` entry points.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::{KotterError, Result};
use crate::input::{OnInputChangedScope, OnInputEnteredScope, OnKeyPressedScope};
use crate::key::Key;
use crate::render_scope::RenderScope;
use crate::section::{
    RUN_LIFECYCLE, SECTION_LIFECYCLE, SectionRuntime, TIMER_MANAGER_KEY,
};
use crate::timer::{TimerKey, TimerManager, TimerScope};

/// Handle given to a section's run block.
///
/// The scope registers callbacks, drives the signal used by the
/// `run_until_*` entry points, and reaches the run's timers and the
/// input widget. Cloning is cheap; clones refer to the same section.
pub struct RunScope {
    section: Arc<SectionRuntime>,
}

impl Clone for RunScope {
    fn clone(&self) -> Self {
        Self {
            section: Arc::clone(&self.section),
        }
    }
}

impl RunScope {
    pub(crate) fn new(section: Arc<SectionRuntime>) -> Self {
        Self { section }
    }

    /// Schedule a coalesced repaint of the section.
    pub fn request_rerender(&self) {
        self.section.request_rerender_internal();
    }

    /// Enqueue a one-shot history line above the active region.
    pub fn aside(&self, render: impl FnOnce(&mut RenderScope<'_>) + Send + 'static) {
        self.section.enqueue_aside(Box::new(render));
    }

    /// Unblock [`wait_for_signal`](Self::wait_for_signal).
    pub fn signal(&self) {
        self.section.signal();
    }

    /// Suspend until [`signal`](Self::signal) is called.
    pub async fn wait_for_signal(&self) {
        self.section.wait_for_signal().await;
    }

    /// Cancel the run block cooperatively; the section exits in an
    /// orderly fashion and `run` returns `Ok`.
    pub fn abort(&self) {
        self.section.run_cancel().cancel();
    }

    /// Spawn a child task that is cancelled with the run.
    pub fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) -> JoinHandle<()> {
        let token = self.section.run_cancel();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = future => {}
            }
        })
    }

    /// Run `callback` for every key delivered to this section.
    pub fn on_key_pressed(
        &self,
        callback: impl FnMut(&mut OnKeyPressedScope) + Send + 'static,
    ) {
        self.section.register_key_pressed(Box::new(callback));
    }

    /// Run `callback` whenever the input widget's text is about to
    /// change. Callbacks fire in registration order.
    pub fn on_input_changed(
        &self,
        callback: impl FnMut(&mut OnInputChangedScope) + Send + 'static,
    ) {
        self.section.register_input_changed(Box::new(callback));
    }

    /// Run `callback` when Enter is pressed in the input widget.
    pub fn on_input_entered(
        &self,
        callback: impl FnMut(&mut OnInputEnteredScope) + Send + 'static,
    ) {
        self.section.register_input_entered(Box::new(callback));
    }

    /// The input widget's current text, if the widget has rendered.
    pub fn get_input(&self) -> Option<String> {
        self.section.input_text()
    }

    /// Replace the input widget's text, moving the cursor to the end.
    pub fn set_input(&self, text: impl Into<String>) {
        self.section.set_input_text(text.into());
    }

    /// Empty the input widget.
    pub fn clear_input(&self) {
        self.set_input("");
    }

    /// Schedule a callback on the run's timer loop.
    pub fn add_timer(
        &self,
        duration: Duration,
        repeat: bool,
        callback: impl FnMut(&mut TimerScope) + Send + 'static,
    ) -> Result<()> {
        self.timers()?.add_timer(duration, repeat, None, callback)?;
        Ok(())
    }

    /// Schedule a callback, deduplicated by `key`: a no-op returning
    /// false if a live timer already holds the key.
    pub fn add_keyed_timer(
        &self,
        duration: Duration,
        repeat: bool,
        key: TimerKey,
        callback: impl FnMut(&mut TimerScope) + Send + 'static,
    ) -> Result<bool> {
        self.timers()?.add_timer(duration, repeat, Some(key), callback)
    }

    fn timers(&self) -> Result<TimerManager> {
        self.section
            .session
            .data
            .get(*TIMER_MANAGER_KEY, TimerManager::clone)
            .ok_or(KotterError::SessionClosed)
    }
}

/// One invocation of `section { render }`: the unit of atomic repaint.
///
/// A section renders once when run and again whenever its live inputs
/// change, until the run block finishes. Sections are single-use.
pub struct Section {
    runtime: Arc<SectionRuntime>,
}

impl Section {
    pub(crate) fn new(runtime: Arc<SectionRuntime>) -> Self {
        Self { runtime }
    }

    /// Register a hook invoked after the run block completes, before the
    /// section's final repaint. A hook may request one last rerender.
    #[must_use]
    pub fn on_finishing(self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.runtime.push_finishing(Box::new(hook));
        self
    }

    /// Render the section once and finish immediately.
    pub async fn run(&self) -> Result<()> {
        self.run_with(|_scope| async { Ok(()) }).await
    }

    /// Render the section and drive `block` in the background until it
    /// returns. Live state mutations repaint the section while the block
    /// runs.
    pub async fn run_with<F, Fut>(&self, block: F) -> Result<()>
    where
        F: FnOnce(RunScope) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let runtime = Arc::clone(&self.runtime);
        if runtime.consumed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Err(KotterError::SectionConsumed);
        }
        runtime.session.claim_active(&runtime)?;

        let setup = Self::start_run(&runtime);
        let outcome = match setup {
            Ok(timers) => Self::drive(&runtime, timers, block).await,
            Err(error) => Ok(Err(error)),
        };
        Self::finish_run(&runtime).await;
        match outcome {
            Ok(result) => result,
            // A panic in the run block propagates, but only after the
            // section has been torn down.
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn start_run(runtime: &Arc<SectionRuntime>) -> Result<TimerManager> {
        let session = &runtime.session;
        session.data.start(&SECTION_LIFECYCLE)?;
        session.data.start(&RUN_LIFECYCLE)?;

        let timers = TimerManager::new();
        let handle = timers.clone();
        session.data.try_put(
            *TIMER_MANAGER_KEY,
            move || handle,
            Some(Box::new(|timers: &TimerManager| timers.dispose())),
        )?;

        let cancel = session.shutdown.child_token();
        runtime.set_run_cancel(cancel.clone());
        runtime.spawn_key_dispatch(cancel);
        Ok(timers)
    }

    /// The run sequence proper. `Err` carries a panic payload from the
    /// run block, rethrown by the caller after teardown.
    async fn drive<F, Fut>(
        runtime: &Arc<SectionRuntime>,
        timers: TimerManager,
        block: F,
    ) -> std::result::Result<Result<()>, Box<dyn std::any::Any + Send>>
    where
        F: FnOnce(RunScope) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // Initial synchronous render.
        runtime.render_and_wait().await;

        let cancel = runtime.run_cancel();
        let scope = RunScope::new(Arc::clone(runtime));
        let mut handle = tokio::spawn(block(scope));

        let block_result = tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(join_error) if join_error.is_panic() => {
                    return Err(join_error.into_panic());
                }
                Err(_) => Ok(()),
            },
            () = cancel.cancelled() => {
                handle.abort();
                Ok(())
            }
        };

        // Let any rerender the block requested settle.
        runtime.session.executor_barrier().await;

        if let Some(policy_error) = runtime.take_policy_error() {
            return Ok(Err(policy_error));
        }

        // Timers are discarded before the finishing hooks, which
        // therefore observe a quiescent system.
        timers.dispose();
        for hook in runtime.take_finishing() {
            hook();
        }
        runtime.session.executor_barrier().await;

        Ok(block_result)
    }

    async fn finish_run(runtime: &Arc<SectionRuntime>) {
        runtime.close();
        runtime.run_cancel().cancel();
        let session = &runtime.session;
        session.data.stop(&RUN_LIFECYCLE);
        session.data.stop(&SECTION_LIFECYCLE);
        session.clear_active(runtime);
    }

    /// Run until one of `keys` is pressed.
    pub async fn run_until_key_pressed(&self, keys: impl IntoIterator<Item = Key>) -> Result<()> {
        let keys: Vec<Key> = keys.into_iter().collect();
        self.run_with(move |scope| async move {
            let signaller = scope.clone();
            scope.on_key_pressed(move |pressed| {
                if keys.contains(&pressed.key) {
                    signaller.signal();
                }
            });
            scope.wait_for_signal().await;
            Ok(())
        })
        .await
    }

    /// Run `block` for setup, then wait for [`RunScope::signal`].
    pub async fn run_until_signal<F, Fut>(&self, block: F) -> Result<()>
    where
        F: FnOnce(RunScope) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.run_with(move |scope| async move {
            block(scope.clone()).await?;
            scope.wait_for_signal().await;
            Ok(())
        })
        .await
    }

    /// Run `block` for setup, then wait until the input widget accepts
    /// an entry: the user callbacks run first, and if none rejected the
    /// input, the section signals itself.
    pub async fn run_until_input_entered<F, Fut>(&self, block: F) -> Result<()>
    where
        F: FnOnce(RunScope) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.run_with(move |scope| async move {
            let signaller = scope.clone();
            scope
                .section
                .install_internal_enter_handler(Box::new(move || signaller.signal()));
            block(scope.clone()).await?;
            scope.wait_for_signal().await;
            Ok(())
        })
        .await
    }
}
