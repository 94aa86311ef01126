//! Error types for kotter.

use std::io;

/// Error type for kotter operations.
#[derive(Debug, thiserror::Error)]
pub enum KotterError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Terminal backend operation failed.
    #[error("terminal error: {0}")]
    Terminal(String),

    /// No usable interactive terminal could be initialized.
    #[error("no interactive terminal available: {0}")]
    NoInteractiveTerminal(String),

    /// A section was started while another section was already active.
    #[error("another section is already active in this session")]
    ActiveSectionExists,

    /// A finished section was run a second time.
    #[error("section has already been run; sections are single-use")]
    SectionConsumed,

    /// `input()` was called outside a main render pass, or twice in one pass.
    #[error("invalid input() call: {0}")]
    InvalidInputContext(String),

    /// A timer was scheduled with a non-positive duration.
    #[error("invalid timer duration: {0:?}")]
    InvalidTimer(std::time::Duration),

    /// A value was stored against a lifecycle that is not active.
    #[error("lifecycle '{0}' is not active")]
    InactiveLifecycle(&'static str),

    /// The session has already shut down.
    #[error("session is closed")]
    SessionClosed,
}

/// Result type alias for kotter operations.
pub type Result<T> = std::result::Result<T, KotterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = KotterError::Terminal("no tty".into());
        assert_eq!(err.to_string(), "terminal error: no tty");
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: KotterError = io_err.into();
        assert!(matches!(err, KotterError::Io(_)));
    }

    #[test]
    fn consumed_section_message() {
        let err = KotterError::SectionConsumed;
        assert!(err.to_string().contains("single-use"));
    }
}
