use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the PTY backend (its error type is opaque).
    #[error("PTY error: {0}")]
    Pty(String),

    /// Command description parse errors; the message is printed verbatim.
    #[error("{0}")]
    Config(String),

    /// An impossible state transition was requested. Treated as fatal.
    #[error("cannot {action} a command in the {state} state")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}

pub type AppResult<T> = Result<T, AppError>;
