//! Terminal backends.
//!
//! The core talks to a [`Terminal`] capability: raw ANSI-bearing writes,
//! a one-shot stream of input codepoints, and an idempotent close. The
//! default implementation is [`SystemTerminal`] (a crossterm raw-mode
//! OS terminal); [`TestTerminal`] captures output in memory and scripts
//! input for tests.

mod system;
mod test_terminal;

use tokio::sync::mpsc;

pub use system::SystemTerminal;
pub use test_terminal::{TestTerminal, TestTerminalHandle, resolve_lines};

use crate::error::{KotterError, Result};

/// Abstraction over terminal backends.
pub trait Terminal: Send {
    /// Write text that may contain CSI escape sequences, uninterpreted.
    fn write(&mut self, text: &str) -> Result<()>;

    /// The stream of raw input codepoints. Each codepoint is emitted
    /// exactly once, so the stream may be taken once; later calls
    /// return an already-closed channel.
    fn input(&mut self) -> mpsc::UnboundedReceiver<u32>;

    /// Release the terminal. Idempotent.
    fn close(&mut self);
}

/// A deferred backend constructor for [`first_available`].
pub type TerminalFactory = Box<dyn FnOnce() -> Result<Box<dyn Terminal>>>;

/// Try each factory in order and return the first backend that
/// initializes, or the last error if none does.
pub fn first_available(factories: Vec<TerminalFactory>) -> Result<Box<dyn Terminal>> {
    let mut last_error = KotterError::NoInteractiveTerminal("no terminal factories given".into());
    for factory in factories {
        match factory() {
            Ok(terminal) => return Ok(terminal),
            Err(error) => {
                tracing::debug!("terminal backend unavailable: {error}");
                last_error = error;
            }
        }
    }
    Err(last_error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn first_available_returns_first_success() {
        let factories: Vec<TerminalFactory> = vec![
            Box::new(|| Err(KotterError::NoInteractiveTerminal("a".into()))),
            Box::new(|| {
                let (terminal, _handle) = TestTerminal::new();
                Ok(Box::new(terminal) as Box<dyn Terminal>)
            }),
        ];
        assert!(first_available(factories).is_ok());
    }

    #[test]
    fn first_available_propagates_last_error() {
        let factories: Vec<TerminalFactory> = vec![
            Box::new(|| Err(KotterError::NoInteractiveTerminal("a".into()))),
            Box::new(|| Err(KotterError::NoInteractiveTerminal("b".into()))),
        ];
        let error = first_available(factories).err().unwrap();
        assert!(error.to_string().contains('b'));
    }

    #[test]
    fn empty_chain_is_an_error() {
        assert!(first_available(Vec::new()).is_err());
    }
}
