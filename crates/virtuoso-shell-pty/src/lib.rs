//! Pseudo-terminal plumbing for driving the interpreter.
//!
//! Provides:
//! - `PtyShell` - the interpreter process on its own pseudo-terminal, with
//!   chunked async reads, serialized writes, and interrupt delivery
//! - executable resolution through the user's login shell
//! - the version banner probe

pub mod banner;
pub mod resolve;
pub mod spawn;

pub use banner::{fetch_banner, language_version};
pub use resolve::{UnixShell, merge_paths, resolve_executable};
pub use spawn::{PtyDims, PtyError, PtyInterrupt, PtyShell};
