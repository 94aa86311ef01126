//! The input pipeline: raw codepoints to logical keys, and the editable
//! single-line input widget's state machine.
//!
//! The key fold is established once per session and shared by every
//! consumer, so the escape-sequence accumulator is never duplicated
//! across forks. The widget core ([`InputState`]) is pure: keys produce
//! [`Proposal`]s, and committing a proposed text change runs the
//! registered change callbacks before anything is stored.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::ansi;
use crate::key::Key;
use crate::style::Color;

/// How many pending keys the shared broadcast may buffer per consumer.
pub(crate) const KEY_CHANNEL_CAPACITY: usize = 256;

// --- key fold -----------------------------------------------------------

enum FoldState {
    Normal,
    /// Saw ESC; deciding between a bare Esc key and a CSI sequence.
    EscapeStart,
    /// Inside `ESC [`, accumulating until a terminator byte.
    Csi(String),
}

/// Translate raw terminal codepoints into logical keys, fanning out on a
/// broadcast channel. One fold exists per session.
pub(crate) fn spawn_key_fold(
    mut codepoints: mpsc::UnboundedReceiver<u32>,
    keys: broadcast::Sender<Key>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut state = FoldState::Normal;
        loop {
            let codepoint = tokio::select! {
                () = cancel.cancelled() => break,
                received = codepoints.recv() => match received {
                    Some(cp) => cp,
                    None => break,
                },
            };
            let Some(c) = char::from_u32(codepoint) else {
                continue;
            };
            for key in fold_char(&mut state, c) {
                // Send errors just mean no consumer is listening yet.
                let _ = keys.send(key);
            }
        }
    });
}

/// Feed one char through the fold state machine; returns emitted keys.
fn fold_char(state: &mut FoldState, c: char) -> Vec<Key> {
    match state {
        FoldState::Normal => match fold_normal(c) {
            NormalOutcome::Emit(key) => vec![key],
            NormalOutcome::BeginEscape => {
                *state = FoldState::EscapeStart;
                Vec::new()
            }
            NormalOutcome::Drop => Vec::new(),
        },
        FoldState::EscapeStart => {
            if c == '[' {
                *state = FoldState::Csi(String::new());
                Vec::new()
            } else {
                // A bare escape, followed by whatever `c` turns out to be.
                *state = FoldState::Normal;
                let mut keys = vec![Key::Esc];
                keys.extend(fold_char(state, c));
                keys
            }
        }
        FoldState::Csi(buffer) => {
            buffer.push(c);
            if !ansi::is_csi_terminator(c) {
                return Vec::new();
            }
            let body = std::mem::take(buffer);
            *state = FoldState::Normal;
            match ansi::parse_csi(&body) {
                Some(csi) => vec![Key::from(csi)],
                None => {
                    tracing::debug!(sequence = %body, "dropping unknown CSI input");
                    Vec::new()
                }
            }
        }
    }
}

enum NormalOutcome {
    Emit(Key),
    BeginEscape,
    Drop,
}

fn fold_normal(c: char) -> NormalOutcome {
    match c {
        ansi::ESC => NormalOutcome::BeginEscape,
        '\r' | '\n' => NormalOutcome::Emit(Key::Enter),
        '\u{7f}' | '\u{8}' => NormalOutcome::Emit(Key::Backspace),
        '\t' => NormalOutcome::Emit(Key::Tab),
        c if c.is_control() => NormalOutcome::Drop,
        c => NormalOutcome::Emit(Key::Char(c)),
    }
}

/// Open a receiver on the shared key broadcast.
pub(crate) fn key_channel() -> (broadcast::Sender<Key>, broadcast::Receiver<Key>) {
    broadcast::channel(KEY_CHANNEL_CAPACITY)
}

// --- completion ---------------------------------------------------------

/// Suggests a suffix completing the text typed so far.
pub trait InputCompleter: Send + Sync {
    /// The suffix that would complete `input`, if any.
    fn complete(&self, input: &str) -> Option<String>;

    /// The color completion text is rendered in.
    fn color(&self) -> Color {
        Color::BrightBlack
    }
}

/// A completer over a fixed list of candidate words.
pub struct Completions {
    candidates: Vec<String>,
}

impl Completions {
    /// Complete against the given candidate words, first match wins.
    #[must_use]
    pub fn new(candidates: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

impl InputCompleter for Completions {
    fn complete(&self, input: &str) -> Option<String> {
        if input.is_empty() {
            return None;
        }
        self.candidates
            .iter()
            .find(|candidate| candidate.starts_with(input) && candidate.len() > input.len())
            .map(|candidate| candidate[input.len()..].to_string())
    }
}

// --- widget state -------------------------------------------------------

/// Milliseconds between cursor blink flips.
pub(crate) const BLINK_INTERVAL_MS: u64 = 500;

/// The single-line input widget's state. Invariant: `index` stays within
/// `0..=text.chars().count()`.
pub(crate) struct InputState {
    pub(crate) text: String,
    pub(crate) index: usize,
    pub(crate) completion: Option<String>,
    pub(crate) blink_on: bool,
    pub(crate) blink_elapsed_ms: u64,
    pub(crate) completer: Option<Arc<dyn InputCompleter>>,
}

/// What a key asks the widget to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Proposal {
    /// Not a widget key.
    Unhandled,
    /// Move the cursor; no text change, no change callbacks.
    Moved(usize),
    /// A text change to run through the change callbacks.
    TextChange {
        /// The text as it would be after the edit.
        text: String,
        /// The cursor position accompanying the edit.
        index: usize,
    },
    /// Enter was pressed.
    Entered,
}

impl InputState {
    pub(crate) fn new(initial_text: String, completer: Option<Arc<dyn InputCompleter>>) -> Self {
        let index = initial_text.chars().count();
        let completion = completer
            .as_ref()
            .and_then(|completer| completer.complete(&initial_text));
        Self {
            text: initial_text,
            index,
            completion,
            blink_on: true,
            blink_elapsed_ms: 0,
            completer,
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map_or(self.text.len(), |(byte, _)| byte)
    }

    /// Interpret a key against the current state.
    pub(crate) fn propose(&self, key: Key) -> Proposal {
        let len = self.char_len();
        match key {
            Key::Left => Proposal::Moved(self.index.saturating_sub(1)),
            Key::Right => {
                if self.index < len {
                    Proposal::Moved(self.index + 1)
                } else if let Some(suffix) = &self.completion {
                    let text = format!("{}{}", self.text, suffix);
                    let index = text.chars().count();
                    Proposal::TextChange { text, index }
                } else {
                    Proposal::Unhandled
                }
            }
            Key::Home => Proposal::Moved(0),
            Key::End => Proposal::Moved(len),
            Key::Delete => {
                if self.index < len {
                    let mut text = self.text.clone();
                    text.remove(self.byte_index(self.index));
                    Proposal::TextChange {
                        text,
                        index: self.index,
                    }
                } else {
                    Proposal::Unhandled
                }
            }
            Key::Backspace => {
                if self.index > 0 {
                    let mut text = self.text.clone();
                    text.remove(self.byte_index(self.index - 1));
                    Proposal::TextChange {
                        text,
                        index: self.index - 1,
                    }
                } else {
                    Proposal::Unhandled
                }
            }
            Key::Enter => Proposal::Entered,
            Key::Char(c) => {
                let mut text = self.text.clone();
                text.insert(self.byte_index(self.index), c);
                Proposal::TextChange {
                    text,
                    index: self.index + 1,
                }
            }
            _ => Proposal::Unhandled,
        }
    }

    /// Commit a cursor move. Returns true if the index changed.
    pub(crate) fn commit_move(&mut self, index: usize) -> bool {
        let clamped = index.min(self.char_len());
        if clamped == self.index {
            return false;
        }
        self.index = clamped;
        self.reset_blink();
        true
    }

    /// Commit a text change after the change callbacks have settled on
    /// `text` (or rejected, in which case the caller skips this). The
    /// index is clamped into the new text. Returns true if anything
    /// visible changed.
    pub(crate) fn commit_text(&mut self, text: String, index: usize) -> bool {
        let changed = text != self.text || index.min(text.chars().count()) != self.index;
        self.text = text;
        self.index = index.min(self.char_len());
        self.completion = self
            .completer
            .as_ref()
            .and_then(|completer| completer.complete(&self.text));
        if changed {
            self.reset_blink();
        }
        changed
    }

    /// Force the text to `text` (programmatic `set_input`).
    pub(crate) fn set_text(&mut self, text: String) -> bool {
        let index = text.chars().count();
        self.commit_text(text, index)
    }

    fn reset_blink(&mut self) {
        self.blink_on = true;
        self.blink_elapsed_ms = 0;
    }

    /// Advance the blink clock. Returns true when the cursor flipped and
    /// the widget needs a repaint.
    pub(crate) fn advance_blink(&mut self, by_ms: u64) -> bool {
        self.blink_elapsed_ms += by_ms;
        if self.blink_elapsed_ms >= BLINK_INTERVAL_MS {
            self.blink_elapsed_ms = 0;
            self.blink_on = !self.blink_on;
            true
        } else {
            false
        }
    }

    pub(crate) fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            text: self.text.clone(),
            index: self.index,
            completion: self.completion.clone(),
            completion_color: self
                .completer
                .as_ref()
                .map_or(Color::BrightBlack, |completer| completer.color()),
            blink_on: self.blink_on,
        }
    }
}

/// What the render pass needs to draw the widget.
pub(crate) struct InputSnapshot {
    pub(crate) text: String,
    pub(crate) index: usize,
    pub(crate) completion: Option<String>,
    pub(crate) completion_color: Color,
    pub(crate) blink_on: bool,
}

// --- callback scopes ----------------------------------------------------

/// Scope passed to `on_key_pressed` callbacks.
pub struct OnKeyPressedScope {
    /// The key that was pressed.
    pub key: Key,
}

/// Scope passed to `on_input_changed` callbacks.
///
/// Callbacks run in registration order over the same scope; each may
/// rewrite `input`, reject the change, or re-accept a rejection made
/// by an earlier callback. The state after the last callback wins.
pub struct OnInputChangedScope {
    /// The proposed text.
    pub input: String,
    /// The text before the proposal.
    pub prev_input: String,
    rejected: bool,
}

impl OnInputChangedScope {
    pub(crate) fn new(input: String, prev_input: String) -> Self {
        Self {
            input,
            prev_input,
            rejected: false,
        }
    }

    /// Discard the proposed change, keeping the previous text.
    pub fn reject_input(&mut self) {
        self.rejected = true;
    }

    /// Re-accept a change an earlier callback rejected. The flag's
    /// state after the last callback decides.
    pub fn accept_input(&mut self) {
        self.rejected = false;
    }

    /// Whether the change has been rejected.
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }
}

/// Scope passed to `on_input_entered` callbacks.
pub struct OnInputEnteredScope {
    /// The text at the moment Enter was pressed.
    pub input: String,
    rejected: bool,
    clear_requested: bool,
}

impl OnInputEnteredScope {
    pub(crate) fn new(input: String) -> Self {
        Self {
            input,
            rejected: false,
            clear_requested: false,
        }
    }

    /// Treat the entry as not accepted; the section's internal enter
    /// handler will not run.
    pub fn reject_input(&mut self) {
        self.rejected = true;
    }

    /// Whether the entry was rejected.
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Empty the widget after the entry is processed.
    pub fn clear_input(&mut self) {
        self.clear_requested = true;
    }

    /// Whether the widget should be emptied afterwards.
    pub fn is_clear_requested(&self) -> bool {
        self.clear_requested
    }
}

/// Callback invoked for every key delivered to the section.
pub(crate) type KeyPressedCallback = Box<dyn FnMut(&mut OnKeyPressedScope) + Send>;
/// Callback invoked when the input widget's text is about to change.
pub(crate) type InputChangedCallback = Box<dyn FnMut(&mut OnInputChangedScope) + Send>;
/// Callback invoked when Enter is pressed in the input widget.
pub(crate) type InputEnteredCallback = Box<dyn FnMut(&mut OnInputEnteredScope) + Send>;

/// Run a proposed text change through the change callbacks and commit
/// the winner. Returns true if the widget changed visibly.
pub(crate) fn commit_proposal(
    state: &mut InputState,
    proposed_text: String,
    proposed_index: usize,
    callbacks: &mut [InputChangedCallback],
) -> bool {
    let mut scope = OnInputChangedScope::new(proposed_text, state.text.clone());
    for callback in callbacks.iter_mut() {
        callback(&mut scope);
    }
    if scope.rejected {
        return false;
    }
    // If a callback rewrote the text, the proposed index may overshoot;
    // commit_text clamps it.
    state.commit_text(scope.input, proposed_index)
}
