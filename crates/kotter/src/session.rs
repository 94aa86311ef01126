//! The top-level lifetime: terminal ownership, the render executor, the
//! data store, and the single-active-section invariant.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::anim::{RenderAnim, TextAnim};
use crate::error::{KotterError, Result};
use crate::input;
use crate::key::Key;
use crate::reactive::{LiveList, LiveMap, LiveVar};
use crate::render_scope::RenderScope;
use crate::run::Section;
use crate::scoped_data::{ConcurrentScopedData, Key as DataKey, Lifecycle};
use crate::section::SectionRuntime;
use crate::sync::SessionLock;
use crate::terminal::{SystemTerminal, Terminal, first_available};

/// Lifecycle of a whole session; the root of the lifecycle forest.
pub static SESSION_LIFECYCLE: Lifecycle = Lifecycle {
    name: "Session",
    parent: None,
};

/// The shared key stream, created on first use and shared by every
/// consumer so the escape accumulator is never forked.
static KEY_STREAM_KEY: LazyLock<DataKey<broadcast::Sender<Key>>> =
    LazyLock::new(|| DataKey::new(&SESSION_LIFECYCLE));

type RenderJob = Box<dyn FnOnce() + Send>;

pub(crate) struct SessionShared {
    pub(crate) lock: Arc<SessionLock>,
    pub(crate) data: ConcurrentScopedData,
    pub(crate) shutdown: CancellationToken,
    terminal: Mutex<Box<dyn Terminal>>,
    active: Mutex<Option<Arc<SectionRuntime>>>,
    executor: mpsc::UnboundedSender<RenderJob>,
}

impl SessionShared {
    fn new(terminal: Box<dyn Terminal>) -> Arc<Self> {
        let lock = Arc::new(SessionLock::new());
        let shutdown = CancellationToken::new();
        let (executor, mut jobs) = mpsc::unbounded_channel::<RenderJob>();

        // The section executor: a single FIFO through which every byte
        // of the active region is written.
        let executor_cancel = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    () = executor_cancel.cancelled() => break,
                    job = jobs.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                job();
            }
        });

        Arc::new(Self {
            data: ConcurrentScopedData::new(Arc::clone(&lock)),
            lock,
            shutdown,
            terminal: Mutex::new(terminal),
            active: Mutex::new(None),
            executor,
        })
    }

    pub(crate) fn enqueue_render(&self, job: RenderJob) {
        if self.executor.send(job).is_err() {
            tracing::debug!("render job dropped; session executor has shut down");
        }
    }

    /// Wait until every job enqueued so far has been executed.
    pub(crate) async fn executor_barrier(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue_render(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.await;
    }

    pub(crate) fn write_terminal(&self, text: &str) {
        let mut terminal = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = terminal.write(text) {
            tracing::warn!("terminal write failed: {error}");
        }
    }

    pub(crate) fn claim_active(&self, section: &Arc<SectionRuntime>) -> Result<()> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Err(KotterError::ActiveSectionExists);
        }
        *active = Some(Arc::clone(section));
        Ok(())
    }

    pub(crate) fn clear_active(&self, section: &Arc<SectionRuntime>) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, section))
        {
            *active = None;
        }
    }

    pub(crate) fn active_is(&self, section: *const SectionRuntime) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active
            .as_ref()
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), section))
    }

    /// Subscribe to the session's logical key stream, establishing the
    /// fold from terminal codepoints on first use. Subscription happens
    /// before the fold task starts, so the first consumer cannot miss
    /// keys that were already buffered.
    pub(crate) fn key_receiver(&self) -> broadcast::Receiver<Key> {
        let established = self.data.try_put(
            *KEY_STREAM_KEY,
            || input::key_channel().0,
            None,
        );
        let receiver = self
            .data
            .get(*KEY_STREAM_KEY, broadcast::Sender::subscribe);

        if established.unwrap_or(false)
            && let Some(sender) = self.data.get(*KEY_STREAM_KEY, Clone::clone)
        {
            let codepoints = {
                let mut terminal = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);
                terminal.input()
            };
            input::spawn_key_fold(codepoints, sender, self.shutdown.child_token());
        }

        receiver.unwrap_or_else(|| {
            // Session is shutting down; hand back a receiver that is
            // already closed.
            let (sender, receiver) = input::key_channel();
            drop(sender);
            receiver
        })
    }

    fn dispose(&self) {
        self.data.stop_all();
        self.shutdown.cancel();
        let mut terminal = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);
        terminal.close();
        tracing::debug!("session shut down");
    }
}

/// A handle on a live session. Cheap to clone.
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Session {
    /// Start configuring a session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder { terminal: None }
    }

    /// Create a section bound to `render`. The section renders nothing
    /// until one of its `run` methods is called.
    pub fn section(
        &self,
        render: impl for<'a> FnMut(&mut RenderScope<'a>) + Send + 'static,
    ) -> Section {
        Section::new(SectionRuntime::new(
            Arc::clone(&self.shared),
            Box::new(render),
        ))
    }

    /// A reactive single value.
    pub fn live_var<T: Clone + PartialEq + Send + 'static>(&self, value: T) -> LiveVar<T> {
        LiveVar::new(Arc::clone(&self.shared.lock), value)
    }

    /// A reactive list.
    pub fn live_list<T: Clone + Send + 'static>(
        &self,
        items: impl IntoIterator<Item = T>,
    ) -> LiveList<T> {
        LiveList::new(Arc::clone(&self.shared.lock), items.into_iter().collect())
    }

    /// A reactive map.
    pub fn live_map<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> LiveMap<K, V>
    where
        K: Clone + Eq + std::hash::Hash + Send + 'static,
        V: Clone + Send + 'static,
    {
        LiveMap::new(
            Arc::clone(&self.shared.lock),
            entries.into_iter().collect::<HashMap<K, V>>(),
        )
    }

    /// An animation cycling through fixed frame strings.
    pub fn text_anim(
        &self,
        frames: impl IntoIterator<Item = impl Into<String>>,
        frame_duration: Duration,
    ) -> TextAnim {
        TextAnim::new(
            Arc::clone(&self.shared.lock),
            frames.into_iter().map(Into::into).collect(),
            frame_duration,
        )
    }

    /// An animation whose frames are drawn by a callback.
    pub fn render_anim(
        &self,
        frame_count: usize,
        frame_duration: Duration,
        draw: impl Fn(&mut RenderScope<'_>, usize) + Send + Sync + 'static,
    ) -> RenderAnim {
        RenderAnim::new(
            Arc::clone(&self.shared.lock),
            frame_count,
            frame_duration,
            draw,
        )
    }
}

/// Configures and runs a [`Session`].
pub struct SessionBuilder {
    terminal: Option<Box<dyn Terminal>>,
}

impl SessionBuilder {
    /// Use a specific terminal backend instead of the default chain.
    #[must_use]
    pub fn terminal(mut self, terminal: Box<dyn Terminal>) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Run `block` against a fresh session, then shut the session down:
    /// the data store is disposed in lifecycle order, background tasks
    /// are cancelled, and the terminal is closed.
    pub async fn run<F, Fut>(self, block: F) -> Result<()>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let terminal = match self.terminal {
            Some(terminal) => terminal,
            None => first_available(vec![Box::new(|| {
                SystemTerminal::new().map(|t| Box::new(t) as Box<dyn Terminal>)
            })])?,
        };
        let shared = SessionShared::new(terminal);
        shared.data.start(&SESSION_LIFECYCLE)?;

        let session = Session {
            shared: Arc::clone(&shared),
        };
        let result = block(session).await;
        shared.dispose();
        result
    }
}

/// Run `block` against a session on the default terminal chain.
///
/// The entry point for most programs:
///
/// ```ignore
/// kotter::session(|s| async move {
///     let count = s.live_var(0);
///     s.section({
///         let count = count.clone();
///         move |scope| scope.text_line(format!("count: {}", count.get()))
///     })
///     .run_until_key_pressed([kotter::Key::Q])
///     .await
/// })
/// .await?;
/// ```
pub async fn session<F, Fut>(block: F) -> Result<()>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    Session::builder().run(block).await
}
