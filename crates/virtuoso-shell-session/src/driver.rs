//! Restart-tolerant driving of a shell session.
//!
//! The driver owns the connector and the current session. When the
//! interpreter goes away mid-command, a fresh session is started through the
//! same connector and the partial output is surfaced with a restart notice
//! appended, so one crashed command never takes the whole driver down.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use virtuoso_shell_core::error::{EvalError, ShellError};
use virtuoso_shell_core::traits::{ShellConnector, SyncMode, TransportError};

use crate::complete::{Completer, extract_candidates};
use crate::config::ShellConfig;
use crate::session::{Session, SessionInterrupt};

/// Line appended to surfaced output when the interpreter had to be restarted.
pub const RESTART_NOTICE: &str = "Restarting Virtuoso";

/// How one driven command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The command completed; cleaned output, possibly empty.
    Done { output: String },
    /// The interpreter reported an error; partial output travels beside it.
    Failed { output: String, error: EvalError },
    /// The command was interrupted; output gathered up to the abort.
    Aborted { output: String },
}

impl RunOutcome {
    /// The output text regardless of how the command ended.
    #[must_use]
    pub fn output(&self) -> &str {
        match self {
            Self::Done { output } | Self::Failed { output, .. } | Self::Aborted { output } => {
                output
            }
        }
    }
}

pub struct ShellDriver {
    connector: Box<dyn ShellConnector>,
    config: ShellConfig,
    completer: Completer,
    session: Option<Session>,
}

impl ShellDriver {
    /// Connect the first session.
    ///
    /// # Errors
    ///
    /// Propagates connect and handshake failures.
    pub async fn start(
        connector: Box<dyn ShellConnector>,
        config: ShellConfig,
    ) -> Result<Self, ShellError> {
        let session = Session::start(connector.as_ref(), &config).await?;
        Ok(Self {
            connector,
            config,
            completer: Completer::new(),
            session: Some(session),
        })
    }

    fn session_mut(&mut self) -> Result<&mut Session, ShellError> {
        self.session
            .as_mut()
            .ok_or(ShellError::Transport(TransportError::NotConnected))
    }

    /// Execute one command to completion.
    ///
    /// A disconnect mid-command is recovered from transparently: the session
    /// is restarted and the partial output is returned with
    /// [`RESTART_NOTICE`] appended.
    ///
    /// # Errors
    ///
    /// [`ShellError::Syntax`] for unbalanced input. Transport errors other
    /// than a disconnect, and failure to restart after one, are propagated.
    pub async fn run(&mut self, source: &str) -> Result<RunOutcome, ShellError> {
        let session = self.session_mut()?;
        match session.send(source, SyncMode::ReadyProbe).await {
            Ok(output) => {
                if session.take_aborted() {
                    Ok(RunOutcome::Aborted { output })
                } else {
                    Ok(RunOutcome::Done { output })
                }
            }
            Err(ShellError::Eval(error)) => {
                let output = session.output().to_owned();
                if session.take_aborted() {
                    Ok(RunOutcome::Aborted { output })
                } else {
                    Ok(RunOutcome::Failed { output, error })
                }
            }
            Err(err) if err.is_disconnect() => {
                let mut output = session.output().to_owned();
                let aborted = session.take_aborted();
                warn!("interpreter went away mid-command, restarting");
                self.restart().await?;
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(RESTART_NOTICE);
                if aborted {
                    Ok(RunOutcome::Aborted { output })
                } else {
                    Ok(RunOutcome::Done { output })
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Complete the identifier-ish tail of `partial` against the live
    /// interpreter.
    ///
    /// Lookups that answer with an error contribute nothing; the result is
    /// deduplicated and sorted. An uncompletable tail yields an empty list.
    ///
    /// # Errors
    ///
    /// Propagates transport failures; a failed individual lookup does not.
    pub async fn complete(&mut self, partial: &str) -> Result<Vec<String>, ShellError> {
        let Some(request) = self.completer.parse(partial) else {
            return Ok(Vec::new());
        };
        let session = self.session_mut()?;
        let mut merged = BTreeSet::new();
        for lookup in request.lookups() {
            match session.lookup(&lookup).await {
                Ok(answer) => {
                    merged.extend(extract_candidates(&answer, request.prefix()));
                }
                Err(ShellError::Eval(e)) => debug!("completion lookup answered with: {e}"),
                Err(other) => return Err(other),
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// The interpreter's help text for `token`, empty when there is none.
    ///
    /// # Errors
    ///
    /// Propagates transport failures; a help lookup that errors yields empty
    /// text instead.
    pub async fn inspect(&mut self, token: &str) -> Result<String, ShellError> {
        let Some(command) = self.completer.help_command(token) else {
            return Ok(String::new());
        };
        match self.session_mut()?.lookup(&command).await {
            Ok(text) => {
                let trimmed = text.trim();
                Ok(if trimmed == "nil" {
                    String::new()
                } else {
                    trimmed.to_owned()
                })
            }
            Err(ShellError::Eval(e)) => {
                debug!("help lookup answered with: {e}");
                Ok(String::new())
            }
            Err(other) => Err(other),
        }
    }

    /// [`ShellDriver::inspect`], decorated for terminal display.
    ///
    /// # Errors
    ///
    /// Same as [`ShellDriver::inspect`].
    pub async fn inspect_styled(&mut self, token: &str) -> Result<String, ShellError> {
        let plain = self.inspect(token).await?;
        Ok(self.completer.style_help(&plain, token))
    }

    /// The interpreter's version banner.
    ///
    /// # Errors
    ///
    /// Propagates the probe failure.
    pub async fn banner(&mut self) -> Result<String, ShellError> {
        Ok(self.session_mut()?.banner().await?.to_owned())
    }

    /// Handle for aborting an in-flight [`ShellDriver::run`] from another
    /// task. Acquire before the run; a restart invalidates earlier handles.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] after a final shutdown.
    pub fn interrupt_handle(&self) -> Result<SessionInterrupt, ShellError> {
        self.session
            .as_ref()
            .map(Session::interrupt_handle)
            .ok_or(ShellError::Transport(TransportError::NotConnected))
    }

    /// Output of the most recent command, partial on error.
    #[must_use]
    pub fn output(&self) -> &str {
        self.session.as_ref().map_or("", Session::output)
    }

    /// Ask the interpreter to exit; with `restart` set, connect a fresh
    /// session afterwards.
    ///
    /// # Errors
    ///
    /// Propagates teardown failures other than an already-gone interpreter,
    /// and connect failures of the replacement session.
    pub async fn shutdown(&mut self, restart: bool) -> Result<(), ShellError> {
        if let Some(session) = self.session.take() {
            session.shutdown().await?;
        }
        if restart {
            self.restart().await?;
        }
        Ok(())
    }

    async fn restart(&mut self) -> Result<(), ShellError> {
        self.session = None;
        let session = Session::start(self.connector.as_ref(), &self.config).await?;
        self.session = Some(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use virtuoso_shell_core::code::CodeBlock;
    use virtuoso_shell_core::prompt::PromptScheme;
    use virtuoso_shell_core::traits::{
        InterruptSignal, RawReply, ShellTransport,
    };

    use super::*;

    type Reply = Result<RawReply, TransportError>;

    struct FakeTransport {
        replies: VecDeque<Reply>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ShellTransport for FakeTransport {
        async fn exchange(
            &mut self,
            block: &CodeBlock,
            _mode: SyncMode,
        ) -> Result<RawReply, TransportError> {
            self.sent.lock().unwrap().push(block.joined());
            self.replies
                .pop_front()
                .unwrap_or(Err(TransportError::NotConnected))
        }

        fn interrupter(&self) -> Arc<dyn InterruptSignal> {
            Arc::new(NoopSignal)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct NoopSignal;

    impl InterruptSignal for NoopSignal {
        fn signal(&self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Yields one scripted transport per connect call.
    struct FakeConnector {
        scripts: Mutex<VecDeque<VecDeque<Reply>>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl FakeConnector {
        fn new(scripts: Vec<Vec<Reply>>) -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let connector = Box::new(Self {
                scripts: Mutex::new(scripts.into_iter().map(Into::into).collect()),
                sent: Arc::clone(&sent),
            });
            (connector, sent)
        }
    }

    #[async_trait]
    impl ShellConnector for FakeConnector {
        async fn connect(
            &self,
            _prompts: &PromptScheme,
        ) -> Result<Box<dyn ShellTransport>, TransportError> {
            let replies = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::ConnectFailed("no session scripted".to_owned()))?;
            Ok(Box::new(FakeTransport {
                replies,
                sent: Arc::clone(&self.sent),
            }))
        }
    }

    fn ok_reply(text: &str) -> Reply {
        Ok(RawReply {
            text: text.to_owned(),
            error: None,
        })
    }

    async fn driver_with(scripts: Vec<Vec<Reply>>) -> (ShellDriver, Arc<Mutex<Vec<String>>>) {
        let (connector, sent) = FakeConnector::new(scripts);
        let driver = ShellDriver::start(connector, ShellConfig::default())
            .await
            .unwrap();
        (driver, sent)
    }

    #[tokio::test]
    async fn successful_run_is_done_with_cleaned_output() {
        let raw = "6\nvsh> \"ok\"\nvsh> ";
        let (mut driver, _) = driver_with(vec![vec![ok_reply(raw)]]).await;
        let outcome = driver.run("2 * 3\nsprintf(nil \"ok\")").await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Done {
                output: "6\n\"ok\"".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn interpreter_error_becomes_a_failed_outcome() {
        let raw = "partial\nvsh> *Error* eval: not a number\nvsh> ";
        let (mut driver, _) = driver_with(vec![vec![ok_reply(raw)]]).await;
        let outcome = driver.run("1 + nil").await.unwrap();
        match outcome {
            RunOutcome::Failed { output, error } => {
                assert_eq!(output, "partial");
                assert_eq!(error.message, "eval: not a number");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_mid_run_restarts_and_annotates_the_output() {
        let (mut driver, _) = driver_with(vec![
            vec![Err(TransportError::Disconnected {
                partial: "made it here\n".to_owned(),
            })],
            vec![ok_reply("alive again\nvsh> ")],
        ])
        .await;

        let outcome = driver.run("hardCrash()").await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Done {
                output: "made it here\nRestarting Virtuoso".to_owned()
            }
        );
        // the replacement session serves the next command
        let outcome = driver.run("1 + 1").await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Done {
                output: "alive again".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn interrupted_run_is_surfaced_as_aborted() {
        let (mut driver, _) = driver_with(vec![vec![ok_reply("loop output\nvsh> ")]]).await;
        let handle = driver.interrupt_handle().unwrap();
        handle.interrupt();
        let outcome = driver.run("while(t 1)").await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                output: "loop output".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn completion_merges_function_and_variable_namespaces() {
        let (mut driver, sent) = driver_with(vec![vec![
            ok_reply("(\"plot\" \"plotMode\")\nvsh> "),
            ok_reply("(\"plWidth\" \"plot\")\nvsh> "),
        ]])
        .await;
        let matches = driver.complete("pl").await.unwrap();
        assert_eq!(matches, ["plWidth", "plot", "plotMode"]);
        let sent = sent.lock().unwrap();
        assert!(sent.contains(&"listFunctions(\"^pl\")".to_owned()));
        assert!(sent.contains(&"listVariables(\"^pl\")".to_owned()));
    }

    #[tokio::test]
    async fn completion_survives_an_erroring_lookup() {
        let (mut driver, _) = driver_with(vec![vec![
            ok_reply("*Error* eval: unbound variable\nvsh> "),
            ok_reply("(\"plotArgs\")\nvsh> "),
        ]])
        .await;
        let matches = driver.complete("plot").await.unwrap();
        assert_eq!(matches, ["plotArgs"]);
    }

    #[tokio::test]
    async fn attribute_completion_asks_the_object() {
        let (mut driver, sent) = driver_with(vec![vec![ok_reply(
            "(name numInst lastModified)\nvsh> ",
        )]])
        .await;
        let matches = driver.complete("cv~>n").await.unwrap();
        assert_eq!(matches, ["name", "numInst"]);
        assert_eq!(sent.lock().unwrap().as_slice(), ["cv~>?".to_owned()]);
    }

    #[tokio::test]
    async fn inspect_answers_help_text_and_nil_becomes_empty() {
        let (mut driver, _) = driver_with(vec![vec![
            ok_reply("plot( x y ?mode m )\nvsh> "),
            ok_reply("nil\nvsh> "),
        ]])
        .await;
        assert_eq!(driver.inspect("plot").await.unwrap(), "plot( x y ?mode m )");
        assert_eq!(driver.inspect("unknownThing").await.unwrap(), "");
    }

    #[tokio::test]
    async fn shutdown_without_restart_disconnects_the_driver() {
        let (mut driver, _) = driver_with(vec![vec![]]).await;
        driver.shutdown(false).await.unwrap();
        let err = driver.run("1").await.unwrap_err();
        assert!(matches!(
            err,
            ShellError::Transport(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn shutdown_with_restart_connects_a_fresh_session() {
        let (mut driver, _) = driver_with(vec![
            vec![],
            vec![ok_reply("fresh\nvsh> ")],
        ])
        .await;
        driver.shutdown(true).await.unwrap();
        let outcome = driver.run("1").await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Done {
                output: "fresh".to_owned()
            }
        );
    }
}
