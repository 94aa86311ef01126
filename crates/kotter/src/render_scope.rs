//! The per-pass render builder.
//!
//! A render block receives a [`RenderScope`] and appends
//! [`TerminalCommand`]s through it: text, line breaks, paragraph
//! spacing, color and decoration changes, nested style scopes, offscreen
//! measurement, aside lines, and the input widget. The scope tracks the
//! style state commands have produced so far, so leaving a
//! [`scoped_style`](RenderScope::scoped_style) block can restore the
//! parent state with a minimal command diff.

use std::sync::Arc;

use crate::command::{TerminalCommand, style_transition};
use crate::error::KotterError;
use crate::input::{InputCompleter, InputSnapshot};
use crate::offscreen::OffscreenBuffer;
use crate::section::SectionRuntime;
use crate::style::{CellStyle, Color, ColorLayer, Decoration};
use crate::text_area::TextArea;

/// Which kind of output a scope is building.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScopeMode {
    /// The active region of the owning section.
    Main,
    /// A captured buffer that is measured, not flushed.
    Offscreen,
    /// A one-shot history line.
    Aside,
}

/// Per-pass state shared between a scope and its children.
pub(crate) struct PassState {
    pub(crate) section: Arc<SectionRuntime>,
    pub(crate) input_called: bool,
}

impl PassState {
    pub(crate) fn new(section: Arc<SectionRuntime>) -> Self {
        Self {
            section,
            input_called: false,
        }
    }
}

/// One render pass's command builder.
pub struct RenderScope<'a> {
    commands: Vec<TerminalCommand>,
    current: CellStyle,
    mode: ScopeMode,
    pass: Option<&'a mut PassState>,
}

/// A run-block callback that paints one aside line.
pub(crate) type AsideRender = Box<dyn FnOnce(&mut RenderScope<'_>) + Send>;

impl<'a> RenderScope<'a> {
    pub(crate) fn main(pass: &'a mut PassState) -> Self {
        Self::with_mode(ScopeMode::Main, Some(pass))
    }

    pub(crate) fn aside_pass(pass: &'a mut PassState) -> Self {
        Self::with_mode(ScopeMode::Aside, Some(pass))
    }

    /// A scope with no owning section; asides and input are unavailable.
    pub(crate) fn detached() -> Self {
        Self::with_mode(ScopeMode::Main, None)
    }

    fn with_mode(mode: ScopeMode, pass: Option<&'a mut PassState>) -> Self {
        Self {
            commands: Vec::new(),
            current: CellStyle::default(),
            mode,
            pass,
        }
    }

    pub(crate) fn into_commands(self) -> Vec<TerminalCommand> {
        self.commands
    }

    pub(crate) fn commands(&self) -> &[TerminalCommand] {
        &self.commands
    }

    fn push(&mut self, command: TerminalCommand) {
        crate::command::apply_style_command(&mut self.current, &command);
        self.commands.push(command);
    }

    pub(crate) fn current_style(&self) -> &CellStyle {
        &self.current
    }

    pub(crate) fn push_all(&mut self, commands: impl IntoIterator<Item = TerminalCommand>) {
        for command in commands {
            self.push(command);
        }
    }

    // --- text -----------------------------------------------------------

    /// Append text. Embedded newlines break lines.
    pub fn text(&mut self, text: impl Into<String>) {
        self.push(TerminalCommand::Text(text.into()));
    }

    /// Append text and end the line.
    pub fn text_line(&mut self, text: impl Into<String>) {
        self.push(TerminalCommand::Text(text.into()));
        self.push(TerminalCommand::Newline);
    }

    /// End the current line.
    pub fn newline(&mut self) {
        self.push(TerminalCommand::Newline);
    }

    /// Append a single char.
    pub fn char(&mut self, c: char) {
        self.push(TerminalCommand::Char(c));
    }

    /// Render `block` as a paragraph: exactly one blank line separates it
    /// from surrounding content, and nothing is inserted at the very
    /// start of the section.
    pub fn p(&mut self, block: impl FnOnce(&mut Self)) {
        self.ensure_paragraph_break(false);
        block(self);
        self.ensure_paragraph_break(true);
    }

    fn ensure_paragraph_break(&mut self, after_block: bool) {
        let (has_content, trailing) = content_shape(&self.commands);
        if !has_content && !after_block {
            return;
        }
        for _ in trailing..2 {
            self.push(TerminalCommand::Newline);
        }
    }

    // --- style ----------------------------------------------------------

    /// Set a color on the given layer.
    pub fn color(&mut self, layer: ColorLayer, color: Color) {
        self.push(TerminalCommand::SetColor(layer, color));
    }

    /// Set the foreground color.
    pub fn fg(&mut self, color: Color) {
        self.color(ColorLayer::Foreground, color);
    }

    /// Set the background color.
    pub fn bg(&mut self, color: Color) {
        self.color(ColorLayer::Background, color);
    }

    /// Set the foreground from a packed `0xRRGGBB` value.
    pub fn rgb(&mut self, rgb: u32) {
        self.fg(Color::from_hex(rgb));
    }

    /// Set the foreground from HSV components.
    pub fn hsv(&mut self, h: f32, s: f32, v: f32) {
        self.fg(Color::from_hsv(h, s, v));
    }

    /// Restore a layer to the terminal default color.
    pub fn clear_color(&mut self, layer: ColorLayer) {
        self.push(TerminalCommand::ClearColor(layer));
    }

    /// Restore the foreground to the terminal default.
    pub fn clear_fg(&mut self) {
        self.push(TerminalCommand::ClearColor(ColorLayer::Foreground));
    }

    /// Restore the background to the terminal default.
    pub fn clear_bg(&mut self) {
        self.push(TerminalCommand::ClearColor(ColorLayer::Background));
    }

    /// Bold on.
    pub fn bold(&mut self) {
        self.push(TerminalCommand::SetDecoration(Decoration::Bold));
    }

    /// Bold off.
    pub fn clear_bold(&mut self) {
        self.push(TerminalCommand::ClearDecoration(Decoration::Bold));
    }

    /// Underline on.
    pub fn underline(&mut self) {
        self.push(TerminalCommand::SetDecoration(Decoration::Underline));
    }

    /// Underline off.
    pub fn clear_underline(&mut self) {
        self.push(TerminalCommand::ClearDecoration(Decoration::Underline));
    }

    /// Strikethrough on.
    pub fn strikethrough(&mut self) {
        self.push(TerminalCommand::SetDecoration(Decoration::Strikethrough));
    }

    /// Strikethrough off.
    pub fn clear_strikethrough(&mut self) {
        self.push(TerminalCommand::ClearDecoration(Decoration::Strikethrough));
    }

    /// Invert (reverse video) on.
    pub fn invert(&mut self) {
        self.push(TerminalCommand::SetDecoration(Decoration::Invert));
    }

    /// Invert off.
    pub fn clear_invert(&mut self) {
        self.push(TerminalCommand::ClearDecoration(Decoration::Invert));
    }

    /// Clear every style attribute back to the default.
    pub fn clear_all(&mut self) {
        let commands = style_transition(&self.current, &CellStyle::default());
        self.push_all(commands);
    }

    /// Run `block` in a nested style frame. Style changes made inside are
    /// confined to the block; the surrounding state is restored on exit.
    pub fn scoped_style(&mut self, block: impl FnOnce(&mut Self)) {
        let saved = self.current.clone();
        block(self);
        let restore = style_transition(&self.current, &saved);
        self.push_all(restore);
    }

    // --- composition ----------------------------------------------------

    /// Run `block` into a private buffer that is measured, not flushed.
    /// The buffer starts from this scope's current style; changes inside
    /// it do not leak back.
    pub fn offscreen(&mut self, block: impl FnOnce(&mut RenderScope<'_>)) -> OffscreenBuffer {
        let initial = self.current.clone();
        let mut child = RenderScope {
            commands: Vec::new(),
            current: initial.clone(),
            mode: ScopeMode::Offscreen,
            pass: self.pass.as_deref_mut(),
        };
        block(&mut child);
        let commands = child.commands;
        let mut area = TextArea::new();
        area.apply_all(&commands);
        OffscreenBuffer::new(commands, area.line_lengths().to_vec(), initial)
    }

    /// Enqueue a one-shot line that becomes history above the active
    /// region on the next flush.
    pub fn aside(&mut self, render: impl FnOnce(&mut RenderScope<'_>) + Send + 'static) {
        if self.mode != ScopeMode::Main {
            tracing::warn!("aside() ignored outside a main render pass");
            return;
        }
        match &self.pass {
            Some(pass) => pass.section.enqueue_aside(Box::new(render)),
            None => tracing::warn!("aside() ignored on a detached render scope"),
        }
    }

    // --- input ----------------------------------------------------------

    /// Render the single-line editable input widget.
    ///
    /// May be called once per render pass, from the main pass only;
    /// violations are policy errors that fail the section's run.
    pub fn input(&mut self) {
        self.input_with(InputOptions::default());
    }

    /// [`input`](Self::input) with a completer and/or initial text.
    pub fn input_with(&mut self, options: InputOptions) {
        if self.mode != ScopeMode::Main {
            self.report_policy_error(KotterError::InvalidInputContext(
                "input() is only available in the main render pass".into(),
            ));
            return;
        }
        let Some(pass) = self.pass.as_deref_mut() else {
            tracing::warn!("input() ignored on a detached render scope");
            return;
        };
        if pass.input_called {
            pass.section.record_policy_error(KotterError::InvalidInputContext(
                "input() may only be called once per render pass".into(),
            ));
            return;
        }
        pass.input_called = true;

        let Some(snapshot) = pass.section.prepare_input(options) else {
            return;
        };
        self.render_input(&snapshot);
    }

    fn report_policy_error(&mut self, error: KotterError) {
        match &self.pass {
            Some(pass) => pass.section.record_policy_error(error),
            None => tracing::warn!("{error}"),
        }
    }

    fn render_input(&mut self, snapshot: &InputSnapshot) {
        let text_len = snapshot.text.chars().count();
        let completion = snapshot.completion.clone().unwrap_or_default();
        let chars: Vec<char> = snapshot
            .text
            .chars()
            .chain(completion.chars())
            .chain(std::iter::once(' '))
            .collect();

        for (pos, c) in chars.iter().enumerate() {
            let in_completion = pos >= text_len && pos < text_len + completion.chars().count();
            let cursor_here = snapshot.blink_on && pos == snapshot.index;
            if !in_completion && !cursor_here {
                self.char(*c);
                continue;
            }
            let color = snapshot.completion_color;
            self.scoped_style(|scope| {
                if in_completion {
                    scope.fg(color);
                }
                if cursor_here {
                    scope.invert();
                }
                scope.char(*c);
            });
        }
    }
}

/// Configuration for the input widget.
#[derive(Clone, Default)]
pub struct InputOptions {
    /// Suggests a completion suffix for the current text.
    pub completer: Option<Arc<dyn InputCompleter>>,
    /// Text the widget starts out with.
    pub initial_text: String,
}

impl InputOptions {
    /// Empty options: no completer, empty initial text.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a completer.
    #[must_use]
    pub fn completer(mut self, completer: Arc<dyn InputCompleter>) -> Self {
        self.completer = Some(completer);
        self
    }

    /// Start the widget with `text` already entered.
    #[must_use]
    pub fn initial_text(mut self, text: impl Into<String>) -> Self {
        self.initial_text = text.into();
        self
    }
}

/// Whether any content was emitted and how many newlines end the stream.
fn content_shape(commands: &[TerminalCommand]) -> (bool, usize) {
    let mut has_content = false;
    let mut trailing = 0usize;
    for command in commands {
        match command {
            TerminalCommand::Char(c) => {
                has_content = true;
                if *c == '\n' {
                    trailing += 1;
                } else {
                    trailing = 0;
                }
            }
            TerminalCommand::Text(text) => {
                for c in text.chars() {
                    has_content = true;
                    if c == '\n' {
                        trailing += 1;
                    } else {
                        trailing = 0;
                    }
                }
            }
            TerminalCommand::Newline => {
                has_content = true;
                trailing += 1;
            }
            _ => {}
        }
    }
    (has_content, trailing)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn render_to_string(f: impl FnOnce(&mut RenderScope<'_>)) -> String {
        let mut scope = RenderScope::detached();
        f(&mut scope);
        let mut area = TextArea::new();
        area.apply_all(scope.commands());
        area.to_string()
    }

    #[test]
    fn text_and_text_line() {
        let out = render_to_string(|s| {
            s.text_line("Line 1");
            s.text("Line 2");
        });
        assert_eq!(out, "Line 1\nLine 2\x1b[0m\n");
    }

    #[test]
    fn scoped_style_is_isolated() {
        let out = render_to_string(|s| {
            s.scoped_style(|s| {
                s.fg(Color::Red);
                s.text("red");
            });
            s.text("plain");
        });
        assert_eq!(out, "\x1b[31mred\x1b[39mplain\x1b[0m\n");
    }

    #[test]
    fn nested_scopes_restore_outer_color() {
        let out = render_to_string(|s| {
            s.fg(Color::Green);
            s.scoped_style(|s| {
                s.fg(Color::Red);
                s.text("r");
            });
            s.text("g");
        });
        assert_eq!(out, "\x1b[31mr\x1b[32mg\x1b[0m\n");
    }

    #[test]
    fn clear_inside_scope_restores_on_exit() {
        let out = render_to_string(|s| {
            s.bold();
            s.text("b");
            s.scoped_style(|s| {
                s.clear_bold();
                s.text("n");
            });
            s.text("b2");
        });
        assert_eq!(out, "\x1b[1mb\x1b[22mn\x1b[1mb2\x1b[0m\n");
    }

    #[test]
    fn paragraphs_single_blank_line_between() {
        let out = render_to_string(|s| {
            for label in ["one", "two", "three", "four"] {
                s.p(|s| s.text_line(label));
            }
        });
        assert_eq!(out, "one\n\ntwo\n\nthree\n\nfour\n\n\x1b[0m\n");
    }

    #[test]
    fn paragraph_adds_no_leading_blank_at_start() {
        let out = render_to_string(|s| {
            s.p(|s| s.text_line("only"));
        });
        assert!(out.starts_with("only"));
    }

    #[test]
    fn paragraph_respects_existing_blank() {
        let out = render_to_string(|s| {
            s.text_line("a");
            s.newline();
            s.p(|s| s.text_line("b"));
        });
        assert_eq!(out, "a\n\nb\n\n\x1b[0m\n");
    }

    #[test]
    fn clear_all_resets_everything() {
        let out = render_to_string(|s| {
            s.fg(Color::Red);
            s.bg(Color::Blue);
            s.bold();
            s.text("x");
            s.clear_all();
            s.text("y");
        });
        assert_eq!(
            out,
            "\x1b[31m\x1b[44m\x1b[1mx\x1b[39m\x1b[49m\x1b[22my\x1b[0m\n"
        );
    }

    #[test]
    fn offscreen_captures_without_emitting() {
        let mut scope = RenderScope::detached();
        let buffer = scope.offscreen(|s| {
            s.text_line("ab");
            s.text_line("cdef");
        });
        assert!(scope.commands().is_empty());
        assert_eq!(buffer.line_lengths(), &[2, 4, 0]);
    }

    #[test]
    fn offscreen_replay_preserves_interior_state() {
        let mut scope = RenderScope::detached();
        let buffer = scope.offscreen(|s| {
            s.fg(Color::Red);
            s.text_line("r1");
            s.text_line("r2");
        });
        let mut renderer = buffer.renderer();
        while renderer.has_next_row() {
            renderer.render_next_row(&mut scope);
            scope.newline();
        }
        let mut area = TextArea::new();
        area.apply_all(scope.commands());
        // Both rows render red even though the color was set in row one;
        // serialization stays minimal because the effective cell styles
        // already match across the row boundary.
        assert_eq!(area.to_string(), "\x1b[31mr1\nr2\x1b[0m\n");
        assert_eq!(*area.current_style(), CellStyle::default());
    }

    #[test]
    fn hsv_and_rgb_set_foreground() {
        let out = render_to_string(|s| {
            s.rgb(0xff0000);
            s.text("a");
        });
        assert_eq!(out, "\x1b[38;2;255;0;0ma\x1b[0m\n");
    }
}
