//! An in-memory terminal for tests: scripted input, captured output,
//! and a resolver that interprets the redraw codes to compute the final
//! visible lines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::Terminal;
use crate::ansi;
use crate::error::Result;
use crate::text_ptr::TextPtr;

struct TestTerminalShared {
    output: Mutex<String>,
    closed: AtomicBool,
}

/// A terminal that records every written byte and replays scripted
/// keystrokes.
pub struct TestTerminal {
    shared: Arc<TestTerminalShared>,
    input: Option<mpsc::UnboundedReceiver<u32>>,
}

/// The test's side of a [`TestTerminal`]: pushes input and inspects
/// output while the session owns the terminal itself. Cloneable, so a
/// test can type from one task and assert from another.
pub struct TestTerminalHandle {
    shared: Arc<TestTerminalShared>,
    keys: mpsc::UnboundedSender<u32>,
}

impl Clone for TestTerminalHandle {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            keys: self.keys.clone(),
        }
    }
}

impl TestTerminal {
    /// A terminal plus the handle a test drives it with.
    #[must_use]
    pub fn new() -> (Self, TestTerminalHandle) {
        let shared = Arc::new(TestTerminalShared {
            output: Mutex::new(String::new()),
            closed: AtomicBool::new(false),
        });
        let (keys, input) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::clone(&shared),
                input: Some(input),
            },
            TestTerminalHandle { shared, keys },
        )
    }
}

impl Terminal for TestTerminal {
    fn write(&mut self, text: &str) -> Result<()> {
        self.shared
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
        Ok(())
    }

    fn input(&mut self) -> mpsc::UnboundedReceiver<u32> {
        match self.input.take() {
            Some(receiver) => receiver,
            None => mpsc::unbounded_channel().1,
        }
    }

    fn close(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

impl TestTerminalHandle {
    /// Feed each char of `text` as one input codepoint.
    pub fn send_text(&self, text: &str) {
        for c in text.chars() {
            let _ = self.keys.send(c as u32);
        }
    }

    /// Press Enter.
    pub fn press_enter(&self) {
        self.send_text("\r");
    }

    /// Press Backspace.
    pub fn press_backspace(&self) {
        self.send_text("\u{7f}");
    }

    /// Press Delete.
    pub fn press_delete(&self) {
        self.send_text("\x1b[3~");
    }

    /// Press the left arrow.
    pub fn press_left(&self) {
        self.send_text("\x1b[D");
    }

    /// Press the right arrow.
    pub fn press_right(&self) {
        self.send_text("\x1b[C");
    }

    /// Press the up arrow.
    pub fn press_up(&self) {
        self.send_text("\x1b[A");
    }

    /// Press the down arrow.
    pub fn press_down(&self) {
        self.send_text("\x1b[B");
    }

    /// Press Home.
    pub fn press_home(&self) {
        self.send_text("\x1b[1~");
    }

    /// Press End.
    pub fn press_end(&self) {
        self.send_text("\x1b[4~");
    }

    /// Every byte written so far, unresolved.
    pub fn output(&self) -> String {
        self.shared
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The final visible lines after interpreting the redraw codes.
    pub fn resolved_lines(&self) -> Vec<String> {
        resolve_lines(&self.output())
    }

    /// True once the session has closed the terminal.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// Interpret the cursor and erase codes the redraw scheme uses (CR,
/// newline, cursor-prev-line, erase-to-line-end) over `output`,
/// returning the lines a terminal would show. SGR sequences are kept
/// in place as ordinary text so assertions can see styling.
#[must_use]
pub fn resolve_lines(output: &str) -> Vec<String> {
    let mut lines: Vec<Vec<char>> = vec![Vec::new()];
    let mut row = 0usize;
    let mut col = 0usize;

    let mut write_char = |lines: &mut Vec<Vec<char>>, row: usize, col: usize, c: char| {
        while lines.len() <= row {
            lines.push(Vec::new());
        }
        let line = &mut lines[row];
        while line.len() < col {
            line.push(' ');
        }
        if col < line.len() {
            line[col] = c;
        } else {
            line.push(c);
        }
    };

    let mut ptr = TextPtr::new(output);
    while ptr.index() < ptr.len() {
        let c = ptr.curr_char();
        match c {
            '\n' => {
                row += 1;
                col = 0;
                while lines.len() <= row {
                    lines.push(Vec::new());
                }
                ptr.increment();
            }
            '\r' => {
                col = 0;
                ptr.increment();
            }
            ansi::ESC => {
                ptr.increment();
                if ptr.curr_char() != '[' {
                    continue;
                }
                ptr.increment();
                let params = ptr.read_until(ansi::is_csi_terminator);
                let terminator = ptr.curr_char();
                ptr.increment();
                match terminator {
                    'F' => {
                        let mut count_ptr = TextPtr::new(&params);
                        let count = count_ptr.read_int().unwrap_or(1).max(1) as usize;
                        row = row.saturating_sub(count);
                        col = 0;
                    }
                    'K' => {
                        if let Some(line) = lines.get_mut(row) {
                            line.truncate(col);
                        }
                    }
                    'm' => {
                        for sgr_char in format!("\x1b[{params}m").chars() {
                            write_char(&mut lines, row, col, sgr_char);
                            col += 1;
                        }
                    }
                    _ => {}
                }
            }
            c => {
                write_char(&mut lines, row, col, c);
                col += 1;
                ptr.increment();
            }
        }
    }

    lines.into_iter().map(|line| line.into_iter().collect()).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_resolve_verbatim() {
        let lines = resolve_lines("one\ntwo\n");
        assert_eq!(lines, vec!["one", "two", ""]);
    }

    #[test]
    fn carriage_return_overwrites() {
        let lines = resolve_lines("abc\rx");
        assert_eq!(lines, vec!["xbc"]);
    }

    #[test]
    fn erase_truncates_from_cursor() {
        let lines = resolve_lines("abc\r\x1b[0K");
        assert_eq!(lines, vec![""]);
    }

    #[test]
    fn cursor_prev_line_moves_up() {
        let lines = resolve_lines("old\n\x1b[1F\r\x1b[0Knew\n");
        assert_eq!(lines, vec!["new", ""]);
    }

    #[test]
    fn sgr_codes_stay_in_line_text() {
        let lines = resolve_lines("\x1b[31mred\x1b[0m\n");
        assert_eq!(lines, vec!["\x1b[31mred\x1b[0m", ""]);
    }

    #[test]
    fn redraw_sequence_converges_to_last_pass() {
        let mut stream = String::from("1\x1b[0m\n");
        stream.push_str("\x1b[1F\r\x1b[0K2\x1b[0m\n");
        stream.push_str("\x1b[1F\r\x1b[0K3\x1b[0m\n");
        assert_eq!(resolve_lines(&stream), vec!["3\x1b[0m", ""]);
    }

    #[test]
    fn written_output_is_captured() {
        let (mut terminal, handle) = TestTerminal::new();
        terminal.write("hello").unwrap();
        assert_eq!(handle.output(), "hello");
        assert!(!handle.is_closed());
        terminal.close();
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn scripted_input_arrives_in_order() {
        let (mut terminal, handle) = TestTerminal::new();
        let mut input = terminal.input();
        handle.send_text("ab");
        handle.press_enter();
        assert_eq!(input.recv().await, Some(u32::from('a')));
        assert_eq!(input.recv().await, Some(u32::from('b')));
        assert_eq!(input.recv().await, Some(u32::from('\r')));
    }

    #[tokio::test]
    async fn second_input_take_is_closed() {
        let (mut terminal, _handle) = TestTerminal::new();
        let _first = terminal.input();
        let mut second = terminal.input();
        assert_eq!(second.recv().await, None);
    }
}
