//! Shell transport over a relay socket.
//!
//! Used when the interpreter cannot be spawned directly: it starts the relay
//! itself, and the session connects to the published socket instead of a
//! pseudo-terminal. The interpreter side classifies outcomes before they
//! reach the wire, so replies arrive pre-structured.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use virtuoso_shell_core::code::CodeBlock;
use virtuoso_shell_core::prompt::PromptScheme;
use virtuoso_shell_core::traits::{
    InterruptSignal, RawReply, ShellConnector, ShellTransport, SyncMode, TransportError,
};

use crate::descriptor::ConnectionDescriptor;
use crate::protocol::RelayReply;

/// A live relay connection.
pub struct RelayLink {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl RelayLink {
    /// Connect to the listener a descriptor points at.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectFailed`] when the endpoint does not answer.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(descriptor.endpoint())
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(format!(
                    "relay at {} unreachable: {e}",
                    descriptor.endpoint()
                ))
            })?;
        Ok(Self {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
        })
    }

    async fn round_trip(&mut self, request: String) -> Result<String, TransportError> {
        self.framed
            .send(Bytes::from(request))
            .await
            .map_err(TransportError::Io)?;
        let frame = self
            .framed
            .next()
            .await
            .ok_or(TransportError::Disconnected {
                partial: String::new(),
            })?
            .map_err(TransportError::Io)?;
        Ok(String::from_utf8_lossy(&frame).into_owned())
    }
}

#[async_trait]
impl ShellTransport for RelayLink {
    /// One strict request/reply exchange.
    ///
    /// The sync mode is irrelevant here: the relay's reply frame is itself
    /// the completion signal.
    async fn exchange(
        &mut self,
        block: &CodeBlock,
        _mode: SyncMode,
    ) -> Result<RawReply, TransportError> {
        let payload = self.round_trip(format!("{}\n", block.joined())).await?;
        let reply = RelayReply::parse(&payload)
            .map_err(|e| TransportError::MalformedReply(format!("{e}: {payload:?}")))?;
        Ok(reply.into_raw())
    }

    fn interrupter(&self) -> Arc<dyn InterruptSignal> {
        Arc::new(RelayInterrupt)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The relay stays up for the next client; only this link's view ends.
        match self.round_trip("{exit()}".to_owned()).await {
            Ok(payload) => debug!("relay released: {payload}"),
            Err(e) => debug!("relay already gone on close: {e}"),
        }
        Ok(())
    }
}

/// The relay carries no out-of-band channel, so an interrupt cannot reach a
/// command in flight. Requests are accepted and dropped.
struct RelayInterrupt;

impl InterruptSignal for RelayInterrupt {
    fn signal(&self) -> std::io::Result<()> {
        debug!("interrupt has no effect over the relay transport");
        Ok(())
    }
}

/// Connects sessions through a published relay descriptor.
pub struct RelayConnector {
    descriptor_path: Option<PathBuf>,
}

impl RelayConnector {
    /// Use the well-known descriptor location.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor_path: None,
        }
    }

    /// Use a specific descriptor file.
    #[must_use]
    pub fn at(descriptor_path: PathBuf) -> Self {
        Self {
            descriptor_path: Some(descriptor_path),
        }
    }
}

impl Default for RelayConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShellConnector for RelayConnector {
    /// Open a relay link. The prompt scheme is unused: prompt matching
    /// happens on the interpreter side of the relay.
    async fn connect(
        &self,
        _prompts: &PromptScheme,
    ) -> Result<Box<dyn ShellTransport>, TransportError> {
        let path = match &self.descriptor_path {
            Some(path) => path.clone(),
            None => ConnectionDescriptor::default_path().ok_or_else(|| {
                TransportError::ConnectFailed("no data directory for the descriptor".to_owned())
            })?,
        };
        let descriptor = ConnectionDescriptor::read(&path).await.map_err(|e| {
            TransportError::ConnectFailed(format!("descriptor {} unreadable: {e}", path.display()))
        })?;
        let link = RelayLink::connect(&descriptor).await?;
        Ok(Box::new(link))
    }
}
