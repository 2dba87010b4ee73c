//! One live session against the interpreter.
//!
//! The session owns the transport, the prompt scheme and the classifier, and
//! keeps the output and error of the most recent command. All interpreter
//! state lives here; dropping the session drops the interpreter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use virtuoso_shell_core::classify::OutputClassifier;
use virtuoso_shell_core::code::CodeBlock;
use virtuoso_shell_core::error::{EvalError, ShellError};
use virtuoso_shell_core::prompt::PromptScheme;
use virtuoso_shell_core::traits::{
    InterruptSignal, ShellConnector, ShellTransport, SyncMode, TransportError,
};
use virtuoso_shell_pty::fetch_banner;

use crate::config::ShellConfig;

pub struct Session {
    link: Box<dyn ShellTransport>,
    prompts: PromptScheme,
    classifier: OutputClassifier,
    command: String,
    output: String,
    last_error: Option<EvalError>,
    banner: Option<String>,
    interrupter: Arc<dyn InterruptSignal>,
    aborted: Arc<AtomicBool>,
}

impl Session {
    /// Connect and synchronize on the first prompt.
    ///
    /// # Errors
    ///
    /// Propagates connect and handshake failures from the transport.
    pub async fn start(
        connector: &dyn ShellConnector,
        config: &ShellConfig,
    ) -> Result<Self, ShellError> {
        let prompts = config.prompt_scheme();
        let link = connector.connect(&prompts).await?;
        let interrupter = link.interrupter();
        Ok(Self {
            link,
            prompts,
            classifier: OutputClassifier::new(),
            command: config.command.clone(),
            output: String::new(),
            last_error: None,
            banner: None,
            interrupter,
            aborted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Validate, send, synchronize and classify one command.
    ///
    /// Whitespace-only input completes locally with empty output; nothing is
    /// written to the interpreter. The cleaned output of the command is also
    /// retained and stays available through [`Session::output`], including
    /// the partial output accompanying an error.
    ///
    /// # Errors
    ///
    /// [`ShellError::Syntax`] when the input has unbalanced delimiters, before
    /// any I/O. [`ShellError::Eval`] when the interpreter reports an error.
    /// [`ShellError::Disconnected`] when the interpreter went away mid-command.
    pub async fn send(&mut self, source: &str, mode: SyncMode) -> Result<String, ShellError> {
        let block = CodeBlock::parse(source).map_err(ShellError::Syntax)?;
        if block.is_empty() {
            self.output.clear();
            self.last_error = None;
            return Ok(String::new());
        }
        match self.link.exchange(&block, mode).await {
            Ok(reply) => {
                let classified = self.classifier.classify(&reply.text, &self.prompts);
                self.output = classified.text();
                self.last_error = reply.error.or(classified.error);
                match &self.last_error {
                    Some(err) => Err(ShellError::Eval(err.clone())),
                    None => Ok(self.output.clone()),
                }
            }
            Err(TransportError::Disconnected { partial }) => {
                let classified = self.classifier.classify(&partial, &self.prompts);
                self.output = classified.text();
                self.last_error = classified.error;
                Err(ShellError::Disconnected)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Run a short raw-mode lookup without disturbing the recorded output and
    /// error of the most recent user command.
    ///
    /// # Errors
    ///
    /// Same as [`Session::send`], except that partial output of a failed
    /// lookup is discarded.
    pub async fn lookup(&mut self, source: &str) -> Result<String, ShellError> {
        let block = CodeBlock::parse(source).map_err(ShellError::Syntax)?;
        if block.is_empty() {
            return Ok(String::new());
        }
        let reply = self.link.exchange(&block, SyncMode::Raw).await.map_err(|e| match e {
            TransportError::Disconnected { .. } => ShellError::Disconnected,
            other => other.into(),
        })?;
        let classified = self.classifier.classify(&reply.text, &self.prompts);
        let text = classified.text();
        match reply.error.or(classified.error) {
            Some(err) => Err(ShellError::Eval(err)),
            None => Ok(text),
        }
    }

    /// Cleaned output of the most recent command, partial on error.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// The error reported for the most recent command, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&EvalError> {
        self.last_error.as_ref()
    }

    /// Handle for aborting the in-flight command from another task.
    ///
    /// Acquire before calling [`Session::send`]; the handle stays valid for
    /// the lifetime of this session.
    #[must_use]
    pub fn interrupt_handle(&self) -> SessionInterrupt {
        SessionInterrupt {
            signal: Arc::clone(&self.interrupter),
            aborted: Arc::clone(&self.aborted),
        }
    }

    /// Whether an interrupt was requested since the last call. Clears the flag.
    pub fn take_aborted(&self) -> bool {
        self.aborted.swap(false, Ordering::SeqCst)
    }

    /// The interpreter's version banner, fetched once on first use.
    ///
    /// # Errors
    ///
    /// Returns the probe failure when the interpreter binary cannot report a
    /// version.
    pub async fn banner(&mut self) -> Result<&str, ShellError> {
        if self.banner.is_none() {
            let text = fetch_banner(&self.command)
                .await
                .map_err(|e| ShellError::Transport(TransportError::Io(e)))?;
            self.banner = Some(text);
        }
        Ok(self.banner.as_deref().unwrap_or_default())
    }

    /// Ask the interpreter to exit and release the transport.
    ///
    /// An interpreter that is already gone counts as a clean shutdown.
    ///
    /// # Errors
    ///
    /// Propagates transport teardown failures other than a closed peer.
    pub async fn shutdown(mut self) -> Result<(), ShellError> {
        self.link.close().await?;
        Ok(())
    }
}

/// Cloneable interrupt handle, deliverable while a command is in flight.
#[derive(Clone)]
pub struct SessionInterrupt {
    signal: Arc<dyn InterruptSignal>,
    aborted: Arc<AtomicBool>,
}

impl SessionInterrupt {
    /// Request cancellation of the in-flight command.
    ///
    /// The command's wait still completes normally; the session reports the
    /// run as aborted once it does.
    pub fn interrupt(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        if let Err(e) = self.signal.signal() {
            warn!("interrupt delivery failed: {e}");
        }
    }
}
