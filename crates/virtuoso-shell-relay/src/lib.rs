//! Socket relay for the Virtuoso interactive shell.
//!
//! When the interpreter cannot be spawned under a pseudo-terminal, it starts
//! this relay instead and the session connects through a socket:
//!
//! - [`protocol`]: wire constants, exit recognition, the reply payload
//! - [`descriptor`]: the published host/port discovery file
//! - [`server`]: the request/reply relay loop over the interpreter's streams
//! - [`client`]: the session-facing transport over a relay socket

pub mod client;
pub mod descriptor;
pub mod protocol;
pub mod server;

pub use client::{RelayConnector, RelayLink};
pub use descriptor::{ConnectionDescriptor, DESCRIPTOR_FILE};
pub use protocol::{EXIT_PAYLOAD, ExitPattern, REPLY_SENTINEL, RelayReply};
pub use server::{PORT_RANGE, RelayServer, bind_in_range};
