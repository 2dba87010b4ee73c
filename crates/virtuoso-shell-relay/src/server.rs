//! The relay request/reply loop.
//!
//! Sits between shell clients on a socket and the interpreter on its own
//! standard streams, which is how the interpreter starts the relay. Strict
//! half-duplex: one request is fully relayed and answered before the next is
//! read, and only one client connection is serviced at a time; further
//! clients queue in the listen backlog.

use std::io;
use std::ops::RangeInclusive;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

use crate::protocol::{
    CLIENT_CONNECTED, CLIENT_DISCONNECTED, EXIT_PAYLOAD, ExitPattern, REPLY_SENTINEL, status_line,
};

/// Ports the relay may claim.
pub const PORT_RANGE: RangeInclusive<u16> = 30000..=40000;

/// Bind the first free port in [`PORT_RANGE`].
///
/// # Errors
///
/// [`io::ErrorKind::AddrNotAvailable`] when the whole range is taken;
/// other bind failures are propagated as-is.
pub async fn bind_in_range() -> io::Result<(TcpListener, u16)> {
    for port in PORT_RANGE {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {}
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        "no free port in the relay range",
    ))
}

/// Relays client requests to the interpreter and frames replies back.
///
/// `R` is the interpreter-facing result stream (the relay's standard input
/// when started by the interpreter), `W` the interpreter-facing command
/// stream (its standard output).
pub struct RelayServer<R, W> {
    results: BufReader<R>,
    commands: W,
    exit: ExitPattern,
    conn_active: bool,
}

impl<R, W> RelayServer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(results: R, commands: W) -> Self {
        Self {
            results: BufReader::new(results),
            commands,
            exit: ExitPattern::new(),
            conn_active: false,
        }
    }

    /// Accept and serve clients until the listener fails.
    ///
    /// A client dropping its connection does not deactivate the relay; the
    /// active flag is cleared only by an exit request.
    ///
    /// # Errors
    ///
    /// Propagates accept failures and interpreter-side stream failures.
    pub async fn serve(&mut self, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("relay client connected from {peer}");
            match self.serve_client(stream).await {
                Ok(()) => debug!("relay client went away"),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(e),
                Err(e) => warn!("relay client failed: {e}"),
            }
        }
    }

    /// Serve one client connection to its end.
    ///
    /// # Errors
    ///
    /// Client-side failures end the connection; interpreter-side stream
    /// failures surface as [`io::ErrorKind::UnexpectedEof`].
    pub(crate) async fn serve_client<S>(&mut self, stream: S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
        while let Some(frame) = framed.next().await {
            let request = String::from_utf8_lossy(&frame?).into_owned();

            if !self.conn_active {
                self.housekeep(CLIENT_CONNECTED).await?;
                self.conn_active = true;
            }

            if self.exit.matches(&request) {
                framed.send(Bytes::from_static(EXIT_PAYLOAD.as_bytes())).await?;
                // The socket and descriptor stay up; teardown is an explicit
                // control command on the interpreter side.
                self.housekeep(CLIENT_DISCONNECTED).await?;
                self.conn_active = false;
                continue;
            }

            self.forward(&request).await?;
            let reply = self.read_reply().await?;
            framed.send(Bytes::from(reply)).await?;
        }
        Ok(())
    }

    /// Notify the interpreter and drain its paired response.
    async fn housekeep(&mut self, notice: &str) -> io::Result<()> {
        self.commands.write_all(status_line(notice).as_bytes()).await?;
        self.commands.flush().await?;
        let ack = self.read_reply().await?;
        debug!("housekeeping acknowledged: {ack}");
        Ok(())
    }

    /// Forward one request verbatim onto the interpreter's input.
    async fn forward(&mut self, request: &str) -> io::Result<()> {
        self.commands.write_all(request.as_bytes()).await?;
        self.commands.flush().await
    }

    /// Join interpreter output lines until the sentinel line.
    async fn read_reply(&mut self) -> io::Result<String> {
        let mut joined = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.results.read_line(&mut line).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "interpreter stream closed before the reply sentinel",
                ));
            }
            let trimmed = line.trim();
            if trimmed == REPLY_SENTINEL {
                break;
            }
            joined.push(trimmed.to_owned());
        }
        Ok(joined.join("\n"))
    }
}
