//! Connection descriptor file.
//!
//! The relay publishes where it listens as a two-element JSON array,
//! `["localhost", 31852]`, in the notebook runtime directory, where shell
//! clients look for it.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the published descriptor.
pub const DESCRIPTOR_FILE: &str = "virtuoso-pyll.json";

/// Where a relay listener can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u16)", into = "(String, u16)")]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
}

impl From<(String, u16)> for ConnectionDescriptor {
    fn from((host, port): (String, u16)) -> Self {
        Self { host, port }
    }
}

impl From<ConnectionDescriptor> for (String, u16) {
    fn from(descriptor: ConnectionDescriptor) -> Self {
        (descriptor.host, descriptor.port)
    }
}

impl ConnectionDescriptor {
    /// Descriptor for a listener on the local host.
    #[must_use]
    pub fn local(port: u16) -> Self {
        Self {
            host: "localhost".to_owned(),
            port,
        }
    }

    /// `host:port` form for a socket connect.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The well-known descriptor location in the notebook runtime directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|data| data.join("jupyter").join("runtime").join(DESCRIPTOR_FILE))
    }

    /// Publish the descriptor, creating the runtime directory if needed.
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures.
    pub async fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_string(self)?;
        tokio::fs::write(path, payload).await
    }

    /// Read a published descriptor.
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures and malformed content.
    pub async fn read(path: &Path) -> io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
