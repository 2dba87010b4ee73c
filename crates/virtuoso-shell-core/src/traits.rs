//! Transport seams between the session controller and the interpreter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::code::CodeBlock;
use crate::error::EvalError;
use crate::prompt::PromptScheme;

/// How the synchronizer decides that a command's output is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Wait for the first prompt match; used for single-statement lookups
    /// whose output cannot contain prompt-like text.
    Raw,
    /// Send a tagged probe after the command and wait for its sentinel;
    /// robust against output that merely looks like a prompt.
    #[default]
    ReadyProbe,
}

/// Raw answer produced by one exchange, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawReply {
    /// Accumulated output text. For a pseudo-terminal link this is the raw
    /// buffer up to the synchronization point; for a relay link it is the
    /// reply's result text.
    pub text: String,
    /// Structured error already extracted by the transport, if any.
    pub error: Option<EvalError>,
}

/// Transport-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No live link; `connect` has not succeeded.
    #[error("interpreter not connected")]
    NotConnected,
    /// The peer closed mid-exchange. Text read before the close is kept so
    /// the caller can surface partial output across a restart.
    #[error("peer disconnected")]
    Disconnected {
        /// Output accumulated before the stream closed.
        partial: String,
    },
    /// Establishing the link failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// A bounded wait elapsed without completion.
    #[error("exchange timed out after {0:?}")]
    Timeout(Duration),
    /// The peer's reply could not be decoded.
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One step of a chunked read from the interpreter-facing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRead {
    /// Fresh output, lossily decoded.
    Data(String),
    /// The bounded wait elapsed with no new output.
    Timeout,
    /// The stream has ended; no further output will arrive.
    Closed,
}

/// Chunked output source the prompt synchronizer waits on.
#[async_trait]
pub trait ChunkSource: Send {
    /// Receive the next output chunk, waiting at most `wait` when given.
    async fn recv_chunk(&mut self, wait: Option<Duration>) -> ChunkRead;
}

/// Best-effort cancellation signal deliverable while an exchange is in
/// flight. Implementations must not block.
pub trait InterruptSignal: Send + Sync {
    /// Deliver the signal to the peer.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the signal cannot be written.
    fn signal(&self) -> std::io::Result<()>;
}

/// One live link carrying commands to the interpreter.
#[async_trait]
pub trait ShellTransport: Send {
    /// Submit one command block and collect the complete raw answer.
    async fn exchange(
        &mut self,
        block: &CodeBlock,
        mode: SyncMode,
    ) -> Result<RawReply, TransportError>;

    /// Handle for delivering interrupts concurrently with an exchange.
    fn interrupter(&self) -> Arc<dyn InterruptSignal>;

    /// Send the interpreter's exit command and release the link. A peer that
    /// already disconnected is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory for fresh links, used at session start and on transparent restart
/// after a disconnect.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    /// Open a link and synchronize it on the session's prompt scheme.
    async fn connect(
        &self,
        prompts: &PromptScheme,
    ) -> Result<Box<dyn ShellTransport>, TransportError>;
}
