//! Session configuration.

use std::time::Duration;

use virtuoso_shell_core::prompt::{CONTINUATION_PROMPT, PRIMARY_PROMPT, PromptScheme};
use virtuoso_shell_pty::PtyDims;

/// How to launch the interpreter and how patiently to wait for it.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Interpreter command name or path.
    pub command: String,
    /// Arguments passed to the interpreter.
    pub args: Vec<String>,
    /// Launch through the user's login shell so site setup files are sourced.
    ///
    /// EDA installations routinely put the interpreter on `PATH` and license
    /// variables in the environment from `.cshrc`-style files.
    pub login_shell: bool,
    /// Terminal dimensions for the pseudo-terminal.
    pub dims: PtyDims,
    /// Primary prompt literal requested during the start-up handshake.
    pub primary_prompt: String,
    /// Continuation prompt literal requested during the start-up handshake.
    pub continuation_prompt: String,
    /// First bounded wait between ready-probe buffer scans.
    pub probe_initial: Duration,
    /// Ceiling the probe wait backs off to while the interpreter is busy.
    pub probe_cap: Duration,
    /// Overall deadline for raw-mode waits. `None` waits indefinitely.
    pub raw_deadline: Option<Duration>,
    /// Deadline for the start-up prompt handshake. Interpreter start-up is
    /// dominated by license checkout and can take tens of seconds.
    pub handshake_deadline: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            command: "virtuoso".to_owned(),
            args: vec!["-nograph".to_owned()],
            login_shell: true,
            dims: PtyDims::default(),
            primary_prompt: PRIMARY_PROMPT.to_owned(),
            continuation_prompt: CONTINUATION_PROMPT.to_owned(),
            probe_initial: Duration::from_millis(50),
            probe_cap: Duration::from_millis(500),
            raw_deadline: None,
            handshake_deadline: Duration::from_secs(60),
        }
    }
}

impl ShellConfig {
    /// The prompt recognizers this configuration asks the interpreter for.
    #[must_use]
    pub fn prompt_scheme(&self) -> PromptScheme {
        PromptScheme::new(&self.primary_prompt, &self.continuation_prompt)
    }
}
