//! Shared building blocks for the Virtuoso shell driver.
//!
//! This crate performs no I/O. It provides:
//! - `CodeBlock` - balance-checked command blocks and their wire form
//! - `PromptScheme` / `ReadyProbe` - prompt literals, the start-up handshake
//!   command, and the recognizers the synchronizer matches against
//! - `OutputClassifier` - raw terminal output into results or typed errors
//! - Transport traits connecting the session controller to a pseudo-terminal
//!   or to the relay

pub mod classify;
pub mod code;
pub mod error;
pub mod prompt;
pub mod traits;

pub use classify::{Classified, ERROR_MARKER, OutputClassifier, StatementOutput};
pub use code::{CodeBlock, EXIT_COMMAND, check_balance, skill_quote};
pub use error::{EVAL_ERROR_CODE, EvalError, ShellError, SyntaxErrorKind};
pub use prompt::{CONTINUATION_PROMPT, PRIMARY_PROMPT, PromptScheme, ReadyProbe};
pub use traits::{
    ChunkRead, ChunkSource, InterruptSignal, RawReply, ShellConnector, ShellTransport, SyncMode,
    TransportError,
};
