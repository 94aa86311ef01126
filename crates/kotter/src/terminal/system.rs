//! The default OS terminal backend.
//!
//! Raw mode is managed through crossterm; output goes straight to
//! stdout, and a blocking reader thread feeds stdin codepoints into the
//! input channel.

use std::io::{Read, Write};

use crossterm::tty::IsTty;
use tokio::sync::mpsc;

use super::Terminal;
use crate::error::{KotterError, Result};

/// A crossterm-backed raw-mode terminal on stdin/stdout.
pub struct SystemTerminal {
    closed: bool,
    input_taken: bool,
}

impl SystemTerminal {
    /// Enter raw mode on the process terminal. Fails with
    /// [`KotterError::NoInteractiveTerminal`] when stdin or stdout is
    /// not a TTY.
    pub fn new() -> Result<Self> {
        if !std::io::stdin().is_tty() || !std::io::stdout().is_tty() {
            return Err(KotterError::NoInteractiveTerminal(
                "stdin/stdout is not a tty".into(),
            ));
        }
        crossterm::terminal::enable_raw_mode()
            .map_err(|error| KotterError::Terminal(error.to_string()))?;
        Ok(Self {
            closed: false,
            input_taken: false,
        })
    }
}

impl Terminal for SystemTerminal {
    fn write(&mut self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    fn input(&mut self) -> mpsc::UnboundedReceiver<u32> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if self.input_taken {
            return receiver; // sender dropped: the channel reads as closed
        }
        self.input_taken = true;

        std::thread::Builder::new()
            .name("kotter-stdin".into())
            .spawn(move || {
                let stdin = std::io::stdin().lock();
                let mut pending: Vec<u8> = Vec::with_capacity(4);
                for byte in stdin.bytes() {
                    let Ok(byte) = byte else { break };
                    pending.push(byte);
                    match std::str::from_utf8(&pending) {
                        Ok(text) => {
                            let Some(c) = text.chars().next() else { continue };
                            pending.clear();
                            if sender.send(c as u32).is_err() {
                                break;
                            }
                        }
                        // Incomplete multi-byte sequence; keep reading.
                        Err(error) if error.error_len().is_none() => {}
                        Err(_) => {
                            tracing::debug!("dropping invalid utf-8 from stdin");
                            pending.clear();
                        }
                    }
                }
            })
            .ok();

        receiver
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = crossterm::terminal::disable_raw_mode() {
            tracing::warn!("failed to leave raw mode: {error}");
        }
    }
}

impl Drop for SystemTerminal {
    fn drop(&mut self) {
        self.close();
    }
}
