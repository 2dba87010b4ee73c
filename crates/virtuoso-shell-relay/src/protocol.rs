//! Relay wire format.
//!
//! The interpreter-facing side is line oriented: commands are forwarded
//! verbatim onto the interpreter's standard input, and replies are read from
//! its standard output line by line until the sentinel line. The client-facing
//! side carries one reply per request: a JSON payload with four fixed fields.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use virtuoso_shell_core::error::EvalError;
use virtuoso_shell_core::traits::RawReply;

/// Line terminating one interpreter reply frame.
pub const REPLY_SENTINEL: &str = "PYLL_EOS";

/// Reply sent for a relay exit request. Fixed bytes; clients match on it.
pub const EXIT_PAYLOAD: &str =
    "{\"error\": null,\n \"warning\": null,\n \"info\": \"Exiting kernel\",\n \"result\": \"t\"}";

/// Housekeeping notice for a newly active connection.
pub const CLIENT_CONNECTED: &str = "New client connected to the PyLLServer";

/// Housekeeping notice once a client has asked the relay to exit.
pub const CLIENT_DISCONNECTED: &str = "Client disconnected from the PyLLServer";

/// Wrap a housekeeping notice for the interpreter-facing stream.
///
/// The interpreter side unwraps the `<PYLL_STATUS|..|PYLL_STATUS>` envelope
/// and evaluates the inner command, then answers with a regular
/// sentinel-terminated frame.
#[must_use]
pub fn status_line(message: &str) -> String {
    format!("<PYLL_STATUS|printf(\"{message}\\n\")|PYLL_STATUS>")
}

/// Recognizer for the relay's own termination request.
///
/// Matches an `exit()` call, optionally wrapped in braces, anywhere in the
/// request text. This is the relay's exit, distinct from the interpreter's.
#[derive(Debug, Clone)]
pub struct ExitPattern {
    re: Regex,
}

impl ExitPattern {
    #[must_use]
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"\{*exit\(\)\}*").expect("static pattern compiles"),
        }
    }

    #[must_use]
    pub fn matches(&self, request: &str) -> bool {
        self.re.is_match(request)
    }
}

impl Default for ExitPattern {
    fn default() -> Self {
        Self::new()
    }
}

/// One structured reply from the interpreter side of the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReply {
    pub error: Option<String>,
    pub warning: Option<String>,
    pub info: Option<String>,
    pub result: Option<String>,
}

impl RelayReply {
    /// Parse the JSON payload of a reply frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error for malformed payloads.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Fold into the transport-level reply shape.
    ///
    /// Warnings and informational notices are side notes, not results; they
    /// go to the log and the result text travels on.
    #[must_use]
    pub fn into_raw(self) -> RawReply {
        if let Some(warning) = self.warning {
            warn!("interpreter warning: {warning}");
        }
        if let Some(notice) = self.info {
            info!("interpreter notice: {notice}");
        }
        RawReply {
            text: self.result.unwrap_or_default(),
            error: self.error.map(EvalError::new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_pattern_accepts_braced_and_bare_calls() {
        let exit = ExitPattern::new();
        assert!(exit.matches("{exit()}"));
        assert!(exit.matches("exit()"));
        assert!(exit.matches("ignore this exit() too"));
        assert!(!exit.matches("exitFlow()"));
        assert!(!exit.matches("exit"));
    }

    #[test]
    fn exit_payload_is_itself_a_valid_reply() {
        let reply = RelayReply::parse(EXIT_PAYLOAD).unwrap();
        assert_eq!(reply.info.as_deref(), Some("Exiting kernel"));
        assert_eq!(reply.result.as_deref(), Some("t"));
        assert!(reply.error.is_none());
    }

    #[test]
    fn reply_folds_error_and_result() {
        let reply = RelayReply::parse(
            "{\"error\": \"eval: bad call\", \"warning\": null, \"info\": null, \"result\": \"partial\"}",
        )
        .unwrap();
        let raw = reply.into_raw();
        assert_eq!(raw.text, "partial");
        assert_eq!(raw.error.unwrap().message, "eval: bad call");
    }

    #[test]
    fn status_lines_carry_the_printf_envelope() {
        assert_eq!(
            status_line(CLIENT_CONNECTED),
            "<PYLL_STATUS|printf(\"New client connected to the PyLLServer\\n\")|PYLL_STATUS>"
        );
    }
}
