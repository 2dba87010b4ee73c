//! Spawning the interpreter on a pseudo-terminal.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use virtuoso_shell_core::traits::{ChunkRead, ChunkSource, InterruptSignal, TransportError};

/// ASCII ETX, the terminal interrupt character.
const INTR_CHAR: u8 = 0x03;

/// Errors from pseudo-terminal management.
#[derive(Debug, Error)]
pub enum PtyError {
    /// The pseudo-terminal pair could not be opened or the child not spawned.
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PtyError> for TransportError {
    fn from(err: PtyError) -> Self {
        match err {
            PtyError::SpawnFailed(msg) => Self::ConnectFailed(msg),
            PtyError::Io(io) => Self::Io(io),
        }
    }
}

/// Terminal size given to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtyDims {
    pub rows: u16,
    pub cols: u16,
}

impl Default for PtyDims {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// A spawned interpreter on its own pseudo-terminal.
///
/// Output arrives as chunks on an unbounded channel fed by a blocking reader
/// thread. Writes go through a shared handle so an interrupt can be delivered
/// while a read wait is in progress. Local echo is disabled on the terminal,
/// so the stream carries interpreter output only, never echoed input.
pub struct PtyShell {
    child: Box<dyn Child + Send + Sync>,
    _master: Box<dyn MasterPty + Send>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl PtyShell {
    /// Spawn `program` with `args` on a fresh pseudo-terminal.
    ///
    /// # Errors
    ///
    /// Returns [`PtyError::SpawnFailed`] when the terminal pair cannot be
    /// opened or the program cannot be started.
    pub fn spawn(program: &str, args: &[String], dims: PtyDims) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: dims.rows,
                cols: dims.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        // Carry the full parent environment into the PTY; EDA licensing and
        // site variables must reach the interpreter.
        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        cmd.env("TERM", "dumb");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        drop(pair.slave);

        disable_echo(pair.master.as_ref())?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || {
            let mut buf = [0_u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("pty read ended: {e}");
                        break;
                    }
                }
            }
        });

        debug!(program, pid = child.process_id(), "interpreter spawned");
        Ok(Self {
            child,
            _master: pair.master,
            writer: Arc::new(Mutex::new(writer)),
            chunks: rx,
        })
    }

    /// Write one line to the interpreter.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the terminal is gone.
    pub fn send_line(&self, line: &str) -> Result<(), PtyError> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Cloneable handle delivering the terminal interrupt character.
    #[must_use]
    pub fn interrupter(&self) -> PtyInterrupt {
        PtyInterrupt {
            writer: Arc::clone(&self.writer),
        }
    }

    /// Whether the interpreter process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the interpreter process if it is still running.
    pub fn shutdown(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.child.kill() {
                debug!("kill after exit request failed: {e}");
            }
        }
        match self.child.wait() {
            Ok(status) => debug!("interpreter exited: {status:?}"),
            Err(e) => debug!("interpreter wait failed: {e}"),
        }
    }
}

impl Drop for PtyShell {
    fn drop(&mut self) {
        if self.is_alive() {
            self.shutdown();
        }
    }
}

#[async_trait]
impl ChunkSource for PtyShell {
    async fn recv_chunk(&mut self, wait: Option<Duration>) -> ChunkRead {
        let next = match wait {
            Some(window) => match tokio::time::timeout(window, self.chunks.recv()).await {
                Ok(read) => read,
                Err(_) => return ChunkRead::Timeout,
            },
            None => self.chunks.recv().await,
        };
        next.map_or(ChunkRead::Closed, |bytes| {
            ChunkRead::Data(String::from_utf8_lossy(&bytes).into_owned())
        })
    }
}

/// Interrupt handle for a [`PtyShell`].
#[derive(Clone)]
pub struct PtyInterrupt {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl InterruptSignal for PtyInterrupt {
    fn signal(&self) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(&[INTR_CHAR])?;
        writer.flush()
    }
}

#[cfg(unix)]
fn disable_echo(master: &dyn MasterPty) -> Result<(), PtyError> {
    use std::os::fd::BorrowedFd;

    use nix::sys::termios::{self, LocalFlags, SetArg};

    let Some(raw) = master.as_raw_fd() else {
        return Ok(());
    };
    // SAFETY: the fd stays owned by `master`, which outlives this borrow.
    let fd = unsafe { BorrowedFd::borrow_raw(raw) };
    let mut term = termios::tcgetattr(fd)
        .map_err(|e| PtyError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
    term.local_flags.remove(LocalFlags::ECHO);
    termios::tcsetattr(fd, SetArg::TCSANOW, &term)
        .map_err(|e| PtyError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
    Ok(())
}

#[cfg(not(unix))]
fn disable_echo(_master: &dyn MasterPty) -> Result<(), PtyError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_output(shell: &mut PtyShell) -> String {
        let mut out = String::new();
        loop {
            match shell.recv_chunk(Some(Duration::from_secs(5))).await {
                ChunkRead::Data(chunk) => out.push_str(&chunk),
                ChunkRead::Timeout | ChunkRead::Closed => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn spawned_process_output_arrives_in_chunks() {
        let mut shell = PtyShell::spawn(
            "/bin/sh",
            &["-c".to_owned(), "echo ready".to_owned()],
            PtyDims::default(),
        )
        .unwrap();
        let out = collect_output(&mut shell).await;
        assert!(out.contains("ready"), "unexpected output: {out:?}");
    }

    #[tokio::test]
    async fn stream_closes_when_the_process_exits() {
        let mut shell = PtyShell::spawn(
            "/bin/sh",
            &["-c".to_owned(), "exit 0".to_owned()],
            PtyDims::default(),
        )
        .unwrap();
        loop {
            match shell.recv_chunk(Some(Duration::from_secs(5))).await {
                ChunkRead::Closed => break,
                ChunkRead::Data(_) => {}
                ChunkRead::Timeout => panic!("expected the stream to close"),
            }
        }
        assert!(!shell.is_alive());
    }

    #[tokio::test]
    async fn echo_is_disabled_on_the_terminal() {
        let mut shell = PtyShell::spawn(
            "/bin/sh",
            &["-c".to_owned(), "read line; echo got-$line".to_owned()],
            PtyDims::default(),
        )
        .unwrap();
        shell.send_line("hello").unwrap();
        let out = collect_output(&mut shell).await;
        assert!(
            out.trim_start().starts_with("got-hello"),
            "input was echoed back: {out:?}"
        );
    }

    #[tokio::test]
    async fn shutdown_reaps_a_running_process() {
        let mut shell = PtyShell::spawn(
            "/bin/sh",
            &["-c".to_owned(), "sleep 30".to_owned()],
            PtyDims::default(),
        )
        .unwrap();
        assert!(shell.is_alive());
        shell.shutdown();
        assert!(!shell.is_alive());
    }
}
