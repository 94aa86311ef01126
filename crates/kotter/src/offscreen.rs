//! A buffer for measuring and decorating content before it is emitted.
//!
//! `offscreen { ... }` captures a block's commands instead of flushing
//! them, exposing per-row widths for layout math and a row-by-row replay
//! renderer. Replay wraps each row in a style scope so nothing leaks
//! outward, while carrying the block's interior style state across row
//! boundaries — a color set on row one still paints row two.

use crate::command::{TerminalCommand, apply_style_command, style_transition};
use crate::render_scope::RenderScope;
use crate::style::CellStyle;

/// Captured render output: commands plus measured line widths.
pub struct OffscreenBuffer {
    commands: Vec<TerminalCommand>,
    line_lengths: Vec<usize>,
    initial: CellStyle,
}

impl OffscreenBuffer {
    pub(crate) fn new(
        commands: Vec<TerminalCommand>,
        line_lengths: Vec<usize>,
        initial: CellStyle,
    ) -> Self {
        Self {
            commands,
            line_lengths,
            initial,
        }
    }

    /// Display width of each captured line.
    pub fn line_lengths(&self) -> &[usize] {
        &self.line_lengths
    }

    /// Display width of one row, or 0 if the row does not exist.
    pub fn width(&self, row: usize) -> usize {
        self.line_lengths.get(row).copied().unwrap_or(0)
    }

    /// The widest captured line.
    pub fn max_width(&self) -> usize {
        self.line_lengths.iter().copied().max().unwrap_or(0)
    }

    /// A replay object that pushes the buffer's rows into an outer scope.
    pub fn renderer(&self) -> OffscreenRenderer<'_> {
        OffscreenRenderer {
            buffer: self,
            pos: 0,
            carry: self.initial.clone(),
        }
    }
}

/// Replays an [`OffscreenBuffer`] one row at a time.
pub struct OffscreenRenderer<'b> {
    buffer: &'b OffscreenBuffer,
    pos: usize,
    carry: CellStyle,
}

impl OffscreenRenderer<'_> {
    /// True while captured rows remain.
    pub fn has_next_row(&self) -> bool {
        self.pos < self.buffer.commands.len()
    }

    /// Push the next row's commands into `scope`, without a trailing
    /// newline. Returns false if no row remained.
    pub fn render_next_row(&mut self, scope: &mut RenderScope<'_>) -> bool {
        if !self.has_next_row() {
            return false;
        }

        let mut row = Vec::new();
        while self.pos < self.buffer.commands.len() {
            let command = &self.buffer.commands[self.pos];
            self.pos += 1;
            if matches!(command, TerminalCommand::Newline) {
                break;
            }
            row.push(command.clone());
        }

        let carry_in = self.carry.clone();
        for command in &row {
            apply_style_command(&mut self.carry, command);
        }

        scope.scoped_style(|scope| {
            let entering = scope.current_style().clone();
            scope.push_all(style_transition(&entering, &carry_in));
            scope.push_all(row);
        });
        true
    }
}
