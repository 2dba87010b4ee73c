//! Pseudo-terminal transport: spawn, handshake, exchange.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use virtuoso_shell_core::code::{CodeBlock, EXIT_COMMAND};
use virtuoso_shell_core::prompt::{PromptScheme, ReadyProbe};
use virtuoso_shell_core::traits::{
    ChunkRead, ChunkSource, InterruptSignal, RawReply, ShellConnector, ShellTransport, SyncMode,
    TransportError,
};
use virtuoso_shell_pty::{PtyShell, resolve_executable, UnixShell};

use crate::config::ShellConfig;
use crate::sync::{PromptSync, SyncTiming};

/// How long to wait for the interpreter to wind down after an exit request
/// before it is reaped forcibly.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// A live interpreter behind a pseudo-terminal.
pub struct PtyLink {
    shell: PtyShell,
    sync: PromptSync,
    prompts: PromptScheme,
    raw_deadline: Option<Duration>,
}

impl PtyLink {
    fn new(shell: PtyShell, prompts: PromptScheme, config: &ShellConfig) -> Self {
        Self {
            shell,
            sync: PromptSync::new(SyncTiming {
                initial: config.probe_initial,
                cap: config.probe_cap,
            }),
            prompts,
            raw_deadline: config.raw_deadline,
        }
    }

    /// Ask the interpreter for the session's distinctive prompts and wait for
    /// the first one. Everything printed before it, banner included, is
    /// discarded.
    async fn handshake(&mut self, deadline: Duration) -> Result<(), TransportError> {
        self.shell.send_line(&self.prompts.handshake_command())?;
        let startup = self
            .sync
            .wait_raw(&mut self.shell, &self.prompts, Some(deadline))
            .await?;
        debug!("prompt handshake done, {} bytes of start-up output", startup.len());
        Ok(())
    }

    fn send_block(&self, block: &CodeBlock) -> Result<(), TransportError> {
        for line in block.wire_lines() {
            self.shell.send_line(line)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ShellTransport for PtyLink {
    async fn exchange(
        &mut self,
        block: &CodeBlock,
        mode: SyncMode,
    ) -> Result<RawReply, TransportError> {
        let text = match mode {
            SyncMode::Raw => {
                self.send_block(block)?;
                self.sync
                    .wait_raw(&mut self.shell, &self.prompts, self.raw_deadline)
                    .await?
            }
            SyncMode::ReadyProbe => {
                let probe = ReadyProbe::new();
                self.send_block(block)?;
                self.shell.send_line(&probe.command())?;
                self.sync
                    .wait_ready(&mut self.shell, &self.prompts, &probe)
                    .await?
            }
        };
        Ok(RawReply { text, error: None })
    }

    fn interrupter(&self) -> Arc<dyn InterruptSignal> {
        Arc::new(self.shell.interrupter())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // A peer that is already gone counts as a clean shutdown.
        if let Err(e) = self.shell.send_line(EXIT_COMMAND) {
            debug!("exit request not delivered: {e}");
        }
        loop {
            match self.shell.recv_chunk(Some(EXIT_GRACE)).await {
                ChunkRead::Data(_) => {}
                ChunkRead::Timeout | ChunkRead::Closed => break,
            }
        }
        self.shell.shutdown();
        Ok(())
    }
}

/// Spawns interpreters on the local machine.
pub struct PtyConnector {
    config: ShellConfig,
}

impl PtyConnector {
    #[must_use]
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    /// Compose the program and argument vector to spawn.
    ///
    /// With `login_shell` set, the command is run through `$SHELL -l -c` so
    /// the user's site setup is sourced first.
    async fn launch_parts(&self) -> Result<(String, Vec<String>), TransportError> {
        let resolved = resolve_executable(&self.config.command).await.ok_or_else(|| {
            TransportError::ConnectFailed(format!(
                "interpreter '{}' not found on PATH",
                self.config.command
            ))
        })?;
        let resolved = resolved.to_string_lossy().into_owned();
        if !self.config.login_shell {
            return Ok((resolved, self.config.args.clone()));
        }
        let words: Vec<String> = std::iter::once(resolved)
            .chain(self.config.args.iter().cloned())
            .collect();
        let command = shlex::try_join(words.iter().map(String::as_str))
            .map_err(|e| TransportError::ConnectFailed(format!("unquotable argument: {e}")))?;
        Ok(UnixShell::current_shell().wrap_command(&command))
    }
}

#[async_trait]
impl ShellConnector for PtyConnector {
    async fn connect(&self, prompts: &PromptScheme) -> Result<Box<dyn ShellTransport>, TransportError> {
        let (program, args) = self.launch_parts().await?;
        info!("starting interpreter: {program} {args:?}");
        let shell = PtyShell::spawn(&program, &args, self.config.dims)?;
        let mut link = PtyLink::new(shell, prompts.clone(), &self.config);
        link.handshake(self.config.handshake_deadline).await?;
        Ok(Box::new(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Script with the interpreter's framing contract: an initial prompt,
    /// blank input lines consumed silently, a prompt after every executed
    /// command, and `printf("..\n")` probe lines answered with their tag.
    const FAKE_REPL: &str = r#"
printf 'vsh> '
while IFS= read -r line; do
  [ -z "$line" ] && continue
  case "$line" in
    'printf("'*'\n")')
      body=${line#'printf("'}
      body=${body%'\n")'}
      printf '%s\nt\n' "$body"
      ;;
    *)
      eval "$line" 2>&1
      ;;
  esac
  printf 'vsh> '
done
"#;

    async fn connect_fake_repl() -> PtyLink {
        let config = ShellConfig::default();
        let shell = PtyShell::spawn(
            "/bin/sh",
            &["-c".to_owned(), FAKE_REPL.to_owned()],
            config.dims,
        )
        .unwrap();
        let mut link = PtyLink::new(shell, config.prompt_scheme(), &config);
        let prompts = link.prompts.clone();
        // swallow the initial prompt
        link.sync
            .wait_raw(&mut link.shell, &prompts, Some(Duration::from_secs(10)))
            .await
            .unwrap();
        link
    }

    #[tokio::test]
    async fn raw_exchange_returns_command_output() {
        let mut link = connect_fake_repl().await;
        let block = CodeBlock::single("echo raw-reply");
        let reply = link.exchange(&block, SyncMode::Raw).await.unwrap();
        assert_eq!(reply.text, "raw-reply\n");
        assert!(reply.error.is_none());
        link.close().await.unwrap();
    }

    #[tokio::test]
    async fn ready_exchange_strips_the_probe_trailer() {
        let mut link = connect_fake_repl().await;
        let block = CodeBlock::single("echo probed-reply");
        let reply = link.exchange(&block, SyncMode::ReadyProbe).await.unwrap();
        assert!(reply.text.starts_with("probed-reply\n"), "got: {:?}", reply.text);
        assert!(!reply.text.contains("vsh-done-"), "got: {:?}", reply.text);
        link.close().await.unwrap();
    }

    #[tokio::test]
    async fn exchange_after_peer_exit_reports_disconnect_and_close_is_clean() {
        let mut link = connect_fake_repl().await;
        let err = link
            .exchange(&CodeBlock::single("exit"), SyncMode::Raw)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Disconnected { .. }));
        link.close().await.unwrap();
    }

    #[tokio::test]
    async fn launch_parts_wraps_through_a_login_shell() {
        let config = ShellConfig {
            command: "sh".to_owned(),
            args: vec!["-x".to_owned()],
            login_shell: true,
            ..ShellConfig::default()
        };
        let connector = PtyConnector::new(config);
        let (program, args) = connector.launch_parts().await.unwrap();
        assert!(program.ends_with("sh"));
        let joined = args.join(" ");
        assert!(joined.contains("-c"), "got: {program} {args:?}");
        assert!(joined.contains("-x"), "got: {program} {args:?}");
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_connect_failure() {
        let config = ShellConfig {
            command: "definitely-not-a-real-binary-name".to_owned(),
            ..ShellConfig::default()
        };
        let connector = PtyConnector::new(config);
        let err = connector.launch_parts().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed(_)));
    }
}
