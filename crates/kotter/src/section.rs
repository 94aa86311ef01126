//! The section runtime: one active block at a time, redrawn in place.
//!
//! A section binds a render block to the session's active-block slot.
//! Rerender requests coalesce under the section's render lock into at
//! most one queued pass; each pass emits, in a single terminal write,
//! the clear-previous-area sequence, any queued aside lines (which
//! become immutable history), and the freshly serialized text area.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::ansi::codes;
use crate::error::KotterError;
use crate::input::{
    InputChangedCallback, InputEnteredCallback, InputSnapshot, InputState, KeyPressedCallback,
    OnInputEnteredScope, OnKeyPressedScope, Proposal, commit_proposal,
};
use crate::key::Key;
use crate::reactive::RerenderTarget;
use crate::render_scope::{AsideRender, InputOptions, PassState, RenderScope};
use crate::scoped_data::{Key as DataKey, Lifecycle};
use crate::session::{SESSION_LIFECYCLE, SessionShared};
use crate::text_area::TextArea;
use crate::timer::{TICK, TimerKey, TimerManager};

/// Lifecycle of one section, from run start to run exit.
pub static SECTION_LIFECYCLE: Lifecycle = Lifecycle {
    name: "Section",
    parent: Some(&SESSION_LIFECYCLE),
};

/// Lifecycle of a section's run block.
pub static RUN_LIFECYCLE: Lifecycle = Lifecycle {
    name: "Section.Run",
    parent: Some(&SECTION_LIFECYCLE),
};

/// Lifecycle of a single render pass.
pub static RENDER_LIFECYCLE: Lifecycle = Lifecycle {
    name: "Section.Render",
    parent: Some(&SECTION_LIFECYCLE),
};

/// The run's timer registry.
pub(crate) static TIMER_MANAGER_KEY: LazyLock<DataKey<TimerManager>> =
    LazyLock::new(|| DataKey::new(&RUN_LIFECYCLE));

/// The input widget's state, if `input()` has been rendered.
static INPUT_STATE_KEY: LazyLock<DataKey<Mutex<InputState>>> =
    LazyLock::new(|| DataKey::new(&SECTION_LIFECYCLE));

static KEY_PRESSED_CALLBACKS: LazyLock<DataKey<Mutex<Vec<KeyPressedCallback>>>> =
    LazyLock::new(|| DataKey::new(&SECTION_LIFECYCLE));

static INPUT_CHANGED_CALLBACKS: LazyLock<DataKey<Mutex<Vec<InputChangedCallback>>>> =
    LazyLock::new(|| DataKey::new(&SECTION_LIFECYCLE));

static INPUT_ENTERED_CALLBACKS: LazyLock<DataKey<Mutex<Vec<InputEnteredCallback>>>> =
    LazyLock::new(|| DataKey::new(&SECTION_LIFECYCLE));

/// The section's internal enter handler, run after the user callbacks
/// when the entry was not rejected.
static INTERNAL_ENTER_HANDLER: LazyLock<DataKey<Mutex<Option<Box<dyn FnMut() + Send>>>>> =
    LazyLock::new(|| DataKey::new(&SECTION_LIFECYCLE));

type RenderFn = Box<dyn for<'a> FnMut(&mut RenderScope<'a>) + Send>;

struct RenderState {
    render_requested: bool,
    prev_lines: usize,
    asides: Vec<AsideRender>,
}

pub(crate) struct SectionRuntime {
    pub(crate) session: Arc<SessionShared>,
    weak_self: Weak<SectionRuntime>,
    render_block: Mutex<RenderFn>,
    state: Mutex<RenderState>,
    finishing: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    policy_error: Mutex<Option<KotterError>>,
    run_cancel: Mutex<Option<CancellationToken>>,
    signaled: AtomicBool,
    signal_notify: Notify,
    blink_timer_key: TimerKey,
    pub(crate) consumed: AtomicBool,
    closed: AtomicBool,
}

impl SectionRuntime {
    pub(crate) fn new(session: Arc<SessionShared>, render: RenderFn) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            session,
            weak_self: weak.clone(),
            render_block: Mutex::new(render),
            state: Mutex::new(RenderState {
                render_requested: false,
                prev_lines: 0,
                asides: Vec::new(),
            }),
            finishing: Mutex::new(Vec::new()),
            policy_error: Mutex::new(None),
            run_cancel: Mutex::new(None),
            signaled: AtomicBool::new(false),
            signal_notify: Notify::new(),
            blink_timer_key: TimerKey::unique(),
            consumed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RenderState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn lock_in<T, R>(mutex: &Mutex<T>, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    // --- rerender coalescing -------------------------------------------

    pub(crate) fn request_rerender_internal(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let already_queued = self.with_state(|state| {
            if state.render_requested {
                true
            } else {
                state.render_requested = true;
                false
            }
        });
        if already_queued {
            return;
        }
        let weak = self.weak_self.clone();
        self.session.enqueue_render(Box::new(move || {
            if let Some(section) = weak.upgrade() {
                section.with_state(|state| state.render_requested = false);
                section.render_once();
            }
        }));
    }

    /// Enqueue a render and wait until the executor has performed it.
    pub(crate) async fn render_and_wait(&self) {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let weak = self.weak_self.clone();
        self.session.enqueue_render(Box::new(move || {
            if let Some(section) = weak.upgrade() {
                section.with_state(|state| state.render_requested = false);
                section.render_once();
            }
            let _ = done_tx.send(());
        }));
        let _ = done_rx.await;
    }

    // --- the render pass -----------------------------------------------

    /// One full pass: clear the previous area, flush queued asides, then
    /// the new serialization, all in a single terminal write. Runs on the
    /// section executor and holds the session write lock throughout.
    fn render_once(self: &Arc<Self>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let target = self.weak_self.clone() as Weak<dyn RerenderTarget>;
        self.session.lock.write(|| {
            let _ = self.session.data.start(&RENDER_LIFECYCLE);
            let output = crate::reactive::with_render_target(target, || self.compose_pass());
            self.session.data.stop(&RENDER_LIFECYCLE);
            self.session.write_terminal(&output);
        });
    }

    fn compose_pass(self: &Arc<Self>) -> String {
        let mut pass = PassState::new(Arc::clone(self));

        // Run the user's render block; a panic flushes the partial area.
        let mut scope = RenderScope::main(&mut pass);
        {
            let mut block = self.render_block.lock().unwrap_or_else(PoisonError::into_inner);
            let outcome = catch_unwind(AssertUnwindSafe(|| (*block)(&mut scope)));
            if outcome.is_err() {
                tracing::warn!("render block panicked; flushing partial output");
            }
        }
        let mut area = TextArea::new();
        area.apply_all(scope.into_commands());

        let mut output = String::new();
        let (prev_lines, asides) = self.with_state(|state| {
            (state.prev_lines, std::mem::take(&mut state.asides))
        });
        for _ in 0..prev_lines {
            output.push_str(codes::CURSOR_PREV_LINE);
            output.push('\r');
            output.push_str(codes::ERASE_LINE_END);
        }
        for aside in asides {
            let mut aside_scope = RenderScope::aside_pass(&mut pass);
            let outcome = catch_unwind(AssertUnwindSafe(|| aside(&mut aside_scope)));
            if outcome.is_err() {
                tracing::warn!("aside block panicked; flushing partial line");
            }
            let mut aside_area = TextArea::new();
            aside_area.apply_all(aside_scope.into_commands());
            output.push_str(&aside_area.to_history_string());
        }
        output.push_str(&area.to_string());

        self.with_state(|state| state.prev_lines = area.num_lines().max(1));
        output
    }

    // --- asides ---------------------------------------------------------

    pub(crate) fn enqueue_aside(&self, render: AsideRender) {
        self.with_state(|state| state.asides.push(render));
        self.request_rerender_internal();
    }

    // --- policy errors --------------------------------------------------

    pub(crate) fn record_policy_error(&self, error: KotterError) {
        Self::lock_in(&self.policy_error, |slot| {
            if slot.is_none() {
                tracing::warn!("input policy violation: {error}");
                *slot = Some(error);
            }
        });
    }

    pub(crate) fn take_policy_error(&self) -> Option<KotterError> {
        Self::lock_in(&self.policy_error, Option::take)
    }

    // --- signals and cancellation --------------------------------------

    pub(crate) fn signal(&self) {
        self.signaled.store(true, Ordering::SeqCst);
        self.signal_notify.notify_waiters();
    }

    pub(crate) async fn wait_for_signal(&self) {
        loop {
            let notified = self.signal_notify.notified();
            if self.signaled.swap(false, Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn set_run_cancel(&self, token: CancellationToken) {
        Self::lock_in(&self.run_cancel, |slot| *slot = Some(token));
    }

    pub(crate) fn run_cancel(&self) -> CancellationToken {
        Self::lock_in(&self.run_cancel, |slot| slot.clone())
            .unwrap_or_else(CancellationToken::new)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn push_finishing(&self, hook: Box<dyn FnOnce() + Send>) {
        Self::lock_in(&self.finishing, |hooks| hooks.push(hook));
    }

    pub(crate) fn take_finishing(&self) -> Vec<Box<dyn FnOnce() + Send>> {
        Self::lock_in(&self.finishing, std::mem::take)
    }

    // --- input widget ---------------------------------------------------

    /// Create the widget state on first use, keep its blink timer alive,
    /// and hand the render pass a drawing snapshot.
    pub(crate) fn prepare_input(&self, options: InputOptions) -> Option<InputSnapshot> {
        let data = &self.session.data;
        let created = data.try_put(
            *INPUT_STATE_KEY,
            || Mutex::new(InputState::new(options.initial_text, options.completer)),
            None,
        );
        if let Err(error) = created {
            tracing::warn!("input state unavailable: {error}");
            return None;
        }

        let weak = self.weak_self.clone();
        self.add_keyed_timer_internal(
            self.blink_timer_key,
            TICK,
            Box::new(move || {
                let Some(section) = weak.upgrade() else { return };
                let flipped = section
                    .session
                    .data
                    .get(*INPUT_STATE_KEY, |state| {
                        Self::lock_in(state, |state| state.advance_blink(TICK.as_millis() as u64))
                    })
                    .unwrap_or(false);
                if flipped {
                    section.request_rerender_internal();
                }
            }),
        );

        data.get(*INPUT_STATE_KEY, |state| {
            Self::lock_in(state, |state| state.snapshot())
        })
    }

    fn add_keyed_timer_internal(
        &self,
        key: TimerKey,
        interval: Duration,
        mut callback: Box<dyn FnMut() + Send>,
    ) {
        let Some(timers) = self.session.data.get(*TIMER_MANAGER_KEY, TimerManager::clone) else {
            tracing::debug!("no timer manager; section is not running");
            return;
        };
        let added = timers.add_timer(interval, true, Some(key), move |_| callback());
        if let Err(error) = added {
            tracing::warn!("failed to register keyed timer: {error}");
        }
    }

    /// Route one logical key through the input widget and the key
    /// callbacks. Runs under the session write lock.
    pub(crate) fn handle_key(self: &Arc<Self>, key: Key) {
        self.session.lock.write(|| {
            let data = &self.session.data;
            let mut changed = false;

            if let Some(input) = data.get_handle(*INPUT_STATE_KEY) {
                let proposal = Self::lock_in(&input, |state| state.propose(key));
                match proposal {
                    Proposal::Moved(index) => {
                        changed = Self::lock_in(&input, |state| state.commit_move(index));
                    }
                    Proposal::TextChange { text, index } => {
                        changed = match data.get_handle(*INPUT_CHANGED_CALLBACKS) {
                            Some(callbacks) => Self::lock_in(&input, |state| {
                                Self::lock_in(&callbacks, |callbacks| {
                                    commit_proposal(state, text, index, callbacks)
                                })
                            }),
                            None => Self::lock_in(&input, |state| state.commit_text(text, index)),
                        };
                    }
                    Proposal::Entered => {
                        let text = Self::lock_in(&input, |state| state.text.clone());
                        let mut scope = OnInputEnteredScope::new(text);
                        if let Some(callbacks) = data.get_handle(*INPUT_ENTERED_CALLBACKS) {
                            Self::lock_in(&callbacks, |callbacks| {
                                for callback in callbacks.iter_mut() {
                                    callback(&mut scope);
                                }
                            });
                        }
                        if !scope.is_rejected()
                            && let Some(handler) = data.get_handle(*INTERNAL_ENTER_HANDLER)
                        {
                            Self::lock_in(&handler, |handler| {
                                if let Some(handler) = handler.as_mut() {
                                    handler();
                                }
                            });
                        }
                        if scope.is_clear_requested() {
                            changed = Self::lock_in(&input, |state| state.set_text(String::new()));
                        }
                    }
                    Proposal::Unhandled => {}
                }
            }

            if let Some(callbacks) = data.get_handle(*KEY_PRESSED_CALLBACKS) {
                let mut scope = OnKeyPressedScope { key };
                Self::lock_in(&callbacks, |callbacks| {
                    for callback in callbacks.iter_mut() {
                        callback(&mut scope);
                    }
                });
            }

            if changed {
                self.request_rerender_internal();
            }
        });
    }

    /// Consume keys from the shared session stream for the run's
    /// duration.
    pub(crate) fn spawn_key_dispatch(self: &Arc<Self>, cancel: CancellationToken) {
        let mut keys = self.session.key_receiver();
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    () = cancel.cancelled() => break,
                    received = keys.recv() => received,
                };
                match received {
                    Ok(key) => match weak.upgrade() {
                        Some(section) => section.handle_key(key),
                        None => break,
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "key stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // --- callback registration (via the run scope) ----------------------

    pub(crate) fn register_key_pressed(&self, callback: KeyPressedCallback) {
        let registered = self.session.data.put_if_absent(
            *KEY_PRESSED_CALLBACKS,
            || Mutex::new(Vec::new()),
            None,
            |callbacks| Self::lock_in(callbacks, |callbacks| callbacks.push(callback)),
        );
        if registered.is_err() {
            tracing::warn!("on_key_pressed registered outside a running section");
        }
    }

    pub(crate) fn register_input_changed(&self, callback: InputChangedCallback) {
        let registered = self.session.data.put_if_absent(
            *INPUT_CHANGED_CALLBACKS,
            || Mutex::new(Vec::new()),
            None,
            |callbacks| Self::lock_in(callbacks, |callbacks| callbacks.push(callback)),
        );
        if registered.is_err() {
            tracing::warn!("on_input_changed registered outside a running section");
        }
    }

    pub(crate) fn register_input_entered(&self, callback: InputEnteredCallback) {
        let registered = self.session.data.put_if_absent(
            *INPUT_ENTERED_CALLBACKS,
            || Mutex::new(Vec::new()),
            None,
            |callbacks| Self::lock_in(callbacks, |callbacks| callbacks.push(callback)),
        );
        if registered.is_err() {
            tracing::warn!("on_input_entered registered outside a running section");
        }
    }

    pub(crate) fn install_internal_enter_handler(&self, handler: Box<dyn FnMut() + Send>) {
        let installed = self.session.data.put_if_absent(
            *INTERNAL_ENTER_HANDLER,
            || Mutex::new(None),
            None,
            |slot| Self::lock_in(slot, |slot| *slot = Some(handler)),
        );
        if installed.is_err() {
            tracing::warn!("enter handler installed outside a running section");
        }
    }

    pub(crate) fn input_text(&self) -> Option<String> {
        self.session
            .data
            .get(*INPUT_STATE_KEY, |state| {
                Self::lock_in(state, |state| state.text.clone())
            })
    }

    pub(crate) fn set_input_text(&self, text: String) {
        let changed = self.session.lock.write(|| {
            self.session
                .data
                .get(*INPUT_STATE_KEY, |state| {
                    Self::lock_in(state, |state| state.set_text(text))
                })
                .unwrap_or(false)
        });
        if changed {
            self.request_rerender_internal();
        }
    }
}

impl RerenderTarget for SectionRuntime {
    fn is_active_target(&self) -> bool {
        self.session.active_is(self)
    }

    fn request_rerender(&self) {
        self.request_rerender_internal();
    }

    fn add_keyed_timer(&self, key: TimerKey, interval: Duration, callback: Box<dyn FnMut() + Send>) {
        self.add_keyed_timer_internal(key, interval, callback);
    }
}
