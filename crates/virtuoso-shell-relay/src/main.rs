//! Relay entry point.
//!
//! Started by the interpreter itself via IPC: commands are forwarded onto
//! standard output (which the interpreter reads back), replies are read from
//! standard input (where the interpreter prints results). The listening port
//! is published through the connection descriptor so shell clients can find
//! this process.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use virtuoso_shell_relay::descriptor::ConnectionDescriptor;
use virtuoso_shell_relay::server::{RelayServer, bind_in_range};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (listener, port) = bind_in_range().await.context("no free relay port")?;
    let path = ConnectionDescriptor::default_path()
        .context("no data directory to publish the descriptor in")?;
    ConnectionDescriptor::local(port)
        .write(&path)
        .await
        .with_context(|| format!("publishing {}", path.display()))?;
    info!("relay listening on port {port}, descriptor at {}", path.display());

    let mut server = RelayServer::new(tokio::io::stdin(), tokio::io::stdout());
    server.serve(listener).await.context("relay loop ended")?;
    Ok(())
}
