//! Error taxonomy for the shell driver.

use thiserror::Error;

use crate::traits::TransportError;

/// Numeric code attached to runtime errors extracted from shell output.
///
/// The interpreter's error reports carry a message but no machine-readable
/// code, so every extracted error uses this fixed value.
pub const EVAL_ERROR_CODE: i32 = 0;

/// Reason a code block was rejected before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// Open and close parenthesis counts differ.
    UnmatchedParen,
    /// Odd number of double-quote characters.
    UnmatchedQuote,
    /// Open and close brace counts differ.
    UnmatchedBrace,
}

impl SyntaxErrorKind {
    /// Short description used in error messages.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::UnmatchedParen => "unmatched parenthesis",
            Self::UnmatchedQuote => "unmatched double-quote",
            Self::UnmatchedBrace => "unmatched brace",
        }
    }
}

/// Structured runtime error reported by the interpreter for one command.
///
/// This is a value, not a transport failure: it travels alongside the partial
/// output captured before the error marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shell error {code}: {message}")]
pub struct EvalError {
    /// Numeric error code (always [`EVAL_ERROR_CODE`] for marker-detected errors).
    pub code: i32,
    /// Message text extracted after the error marker.
    pub message: String,
}

impl EvalError {
    /// Build an error with the fixed marker-detection code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: EVAL_ERROR_CODE,
            message: message.into(),
        }
    }
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The submitted text failed a balance check; nothing was sent.
    #[error("syntax not ready to send: {}", .0.describe())]
    Syntax(SyntaxErrorKind),
    /// The interpreter reported an error for an executed command.
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// The interpreter process or relay socket closed mid-exchange.
    #[error("interpreter disconnected")]
    Disconnected,
    /// The in-flight command was interrupted by the caller.
    #[error("execution interrupted")]
    Interrupted,
    /// Failure at the transport layer.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ShellError {
    /// Whether a fresh session is expected to recover from this error.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Transport(TransportError::Disconnected { .. })
        )
    }
}
