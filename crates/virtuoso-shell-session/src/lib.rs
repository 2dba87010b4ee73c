//! Session layer for the Virtuoso interactive shell.
//!
//! Builds on the core classification types and the pseudo-terminal transport:
//!
//! - [`sync`]: prompt synchronization over a chunked output stream
//! - [`link`]: the pseudo-terminal transport and its connector
//! - [`session`]: one live session, owning transport and command state
//! - [`driver`]: restart-tolerant execution over sessions
//! - [`complete`]: interpreter-backed name completion and help lookup
//! - [`config`]: launch and timing configuration

pub mod complete;
pub mod config;
pub mod driver;
pub mod link;
pub mod session;
pub mod sync;

pub use complete::{Arrow, Completer, CompletionRequest};
pub use config::ShellConfig;
pub use driver::{RESTART_NOTICE, RunOutcome, ShellDriver};
pub use link::{PtyConnector, PtyLink};
pub use session::{Session, SessionInterrupt};
pub use sync::{PromptSync, SyncTiming};
