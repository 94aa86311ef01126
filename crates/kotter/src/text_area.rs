//! The rendered output of a pass: a sequence of styled cells with
//! tracked per-line widths.
//!
//! A `TextArea` is append-only. Commands are applied in order, the area
//! records each visible char with the style in effect at that point, and
//! serialization walks the cells emitting minimal SGR transitions.

use std::fmt;

use unicode_width::UnicodeWidthChar;

use crate::ansi;
use crate::command::TerminalCommand;
use crate::style::{CellStyle, write_sgr_transition};

/// A single char plus the style in effect when it was appended.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// The codepoint displayed in this cell; `'\n'` marks a line break.
    pub ch: char,
    /// The effective style of this cell.
    pub style: CellStyle,
}

/// A growable grid of styled cells produced by applying commands.
#[derive(Clone, Debug, Default)]
pub struct TextArea {
    cells: Vec<Cell>,
    /// Display width per line; always one entry per started line.
    widths: Vec<usize>,
    newline_count: usize,
    /// Style applied to subsequently appended chars.
    current: CellStyle,
}

impl TextArea {
    /// Create an empty area with default style state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no command has appended a char or newline yet.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of lines: newline count, plus one if any content exists.
    pub fn num_lines(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.newline_count + 1
        }
    }

    /// Display width of each line, SGR bytes excluded.
    pub fn line_lengths(&self) -> &[usize] {
        if self.is_empty() { &[] } else { &self.widths }
    }

    /// The styled cells appended so far.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// The style that the next appended char would receive.
    pub fn current_style(&self) -> &CellStyle {
        &self.current
    }

    /// Apply one command, mutating style state or appending cells.
    pub fn apply(&mut self, command: &TerminalCommand) {
        match command {
            TerminalCommand::Char(c) => self.push_char(*c),
            TerminalCommand::Text(text) => {
                for c in text.chars() {
                    self.push_char(c);
                }
            }
            TerminalCommand::SetColor(layer, color) => match layer {
                crate::style::ColorLayer::Foreground => self.current.fg = Some(*color),
                crate::style::ColorLayer::Background => self.current.bg = Some(*color),
            },
            TerminalCommand::ClearColor(layer) => match layer {
                crate::style::ColorLayer::Foreground => self.current.fg = None,
                crate::style::ColorLayer::Background => self.current.bg = None,
            },
            TerminalCommand::SetDecoration(d) => self.current.set_decoration(*d, true),
            TerminalCommand::ClearDecoration(d) => self.current.set_decoration(*d, false),
            TerminalCommand::Newline => self.push_newline(),
        }
    }

    /// Apply a sequence of commands (owned or borrowed) in order.
    pub fn apply_all<C: std::borrow::Borrow<TerminalCommand>>(
        &mut self,
        commands: impl IntoIterator<Item = C>,
    ) {
        for command in commands {
            self.apply(command.borrow());
        }
    }

    fn push_char(&mut self, c: char) {
        if c == '\n' {
            self.push_newline();
            return;
        }
        if self.widths.is_empty() {
            self.widths.push(0);
        }
        if let Some(last) = self.widths.last_mut() {
            *last += UnicodeWidthChar::width(c).unwrap_or(0);
        }
        self.cells.push(Cell {
            ch: c,
            style: self.current.clone(),
        });
    }

    fn push_newline(&mut self) {
        if self.widths.is_empty() {
            self.widths.push(0);
        }
        self.widths.push(0);
        self.newline_count += 1;
        self.cells.push(Cell {
            ch: '\n',
            style: self.current.clone(),
        });
    }

    /// Serialize cell content with minimal SGR transitions, without the
    /// trailing reset. Returns the bytes and whether any SGR was emitted.
    fn write_content(&self, out: &mut String) -> bool {
        let mut prev = CellStyle::default();
        let mut styled = false;
        for cell in &self.cells {
            if cell.ch == '\n' {
                out.push('\n');
                continue;
            }
            if cell.style != prev {
                write_sgr_transition(out, &prev, &cell.style);
                prev = cell.style.clone();
                styled = true;
            }
            out.push(cell.ch);
        }
        styled
    }

    /// Serialization for a one-shot history line: content, an SGR reset
    /// only if any style was used, and a guaranteed trailing newline.
    pub(crate) fn to_history_string(&self) -> String {
        let mut out = String::new();
        let styled = self.write_content(&mut out);
        if styled {
            out.push_str(ansi::codes::RESET);
        }
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for TextArea {
    /// The full serialization: content with minimal SGR transitions,
    /// terminated by an SGR reset and exactly one newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_content(&mut out);
        out.push_str(ansi::codes::RESET);
        out.push('\n');
        f.write_str(&out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::style::{Color, ColorLayer, Decoration};

    fn area_of(commands: &[TerminalCommand]) -> TextArea {
        let mut area = TextArea::new();
        area.apply_all(commands);
        area
    }

    #[test]
    fn empty_area() {
        let area = TextArea::new();
        assert!(area.is_empty());
        assert_eq!(area.num_lines(), 0);
        assert!(area.line_lengths().is_empty());
        assert_eq!(area.to_string(), "\x1b[0m\n");
    }

    #[test]
    fn single_line_counts() {
        let area = area_of(&[TerminalCommand::Text("abc".into())]);
        assert_eq!(area.num_lines(), 1);
        assert_eq!(area.line_lengths(), &[3]);
    }

    #[test]
    fn newline_splits_lines() {
        let area = area_of(&[
            TerminalCommand::Text("ab".into()),
            TerminalCommand::Newline,
            TerminalCommand::Text("cdef".into()),
        ]);
        assert_eq!(area.num_lines(), 2);
        assert_eq!(area.line_lengths(), &[2, 4]);
    }

    #[test]
    fn embedded_newline_in_text() {
        let area = area_of(&[TerminalCommand::Text("a\nb".into())]);
        assert_eq!(area.num_lines(), 2);
        assert_eq!(area.line_lengths(), &[1, 1]);
    }

    #[test]
    fn trailing_newline_starts_empty_line() {
        let area = area_of(&[TerminalCommand::Text("ab".into()), TerminalCommand::Newline]);
        assert_eq!(area.num_lines(), 2);
        assert_eq!(area.line_lengths(), &[2, 0]);
    }

    #[test]
    fn wide_chars_count_double() {
        let area = area_of(&[TerminalCommand::Text("世界".into())]);
        assert_eq!(area.line_lengths(), &[4]);
    }

    #[test]
    fn serialization_ends_with_reset_and_newline() {
        let area = area_of(&[TerminalCommand::Text("hi".into())]);
        assert_eq!(area.to_string(), "hi\x1b[0m\n");
    }

    #[test]
    fn serialization_emits_minimal_transitions() {
        let area = area_of(&[
            TerminalCommand::SetColor(ColorLayer::Foreground, Color::Red),
            TerminalCommand::Char('a'),
            TerminalCommand::Char('b'),
            TerminalCommand::ClearColor(ColorLayer::Foreground),
            TerminalCommand::Char('c'),
        ]);
        assert_eq!(area.to_string(), "\x1b[31mab\x1b[39mc\x1b[0m\n");
    }

    #[test]
    fn style_persists_across_newline() {
        let area = area_of(&[
            TerminalCommand::SetDecoration(Decoration::Bold),
            TerminalCommand::Char('a'),
            TerminalCommand::Newline,
            TerminalCommand::Char('b'),
        ]);
        assert_eq!(area.to_string(), "\x1b[1ma\nb\x1b[0m\n");
    }

    #[test]
    fn sgr_bytes_do_not_affect_line_lengths() {
        let area = area_of(&[
            TerminalCommand::SetColor(ColorLayer::Background, Color::Blue),
            TerminalCommand::Text("xy".into()),
        ]);
        assert_eq!(area.line_lengths(), &[2]);
    }

    #[test]
    fn history_string_plain_has_no_reset() {
        let area = area_of(&[TerminalCommand::Text("Aside #1".into())]);
        assert_eq!(area.to_history_string(), "Aside #1\n");
    }

    #[test]
    fn history_string_styled_gets_reset() {
        let area = area_of(&[
            TerminalCommand::SetColor(ColorLayer::Foreground, Color::Green),
            TerminalCommand::Text("ok".into()),
        ]);
        assert_eq!(area.to_history_string(), "\x1b[32mok\x1b[0m\n");
    }

    #[test]
    fn history_string_empty_is_blank_line() {
        let area = TextArea::new();
        assert_eq!(area.to_history_string(), "\n");
    }
}
