//! Version banner probe.
//!
//! The banner is fetched with a plain subprocess rather than through the
//! session's pseudo-terminal, so it works before a session exists and never
//! disturbs prompt synchronization.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::resolve::UnixShell;

const BANNER_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `<command> -V` through the user's login shell and capture the banner.
///
/// # Errors
///
/// Returns an I/O error when the probe cannot be spawned, exits unhappily,
/// or does not finish within the probe timeout.
pub async fn fetch_banner(command: &str) -> io::Result<String> {
    let (program, args) = UnixShell::current_shell().wrap_command(&format!("{command} -V"));
    debug!(program, "fetching version banner");
    let child = Command::new(program)
        .args(args)
        .env("TERM", "dumb")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let output = tokio::time::timeout(BANNER_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "banner probe timed out"))??;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "banner probe exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

/// Extract the dotted version number from a banner string.
#[must_use]
pub fn language_version(banner: &str) -> Option<String> {
    let pattern = Regex::new(r"version (\d+(\.\d+)+)").expect("static pattern compiles");
    pattern
        .captures(banner)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_extracted_from_a_banner_line() {
        let banner = "@(#)$CDS: virtuoso version 6.1.8-64b 11/11/2021 22:37 (host) $";
        assert_eq!(language_version(banner).as_deref(), Some("6.1.8"));
    }

    #[test]
    fn banner_without_a_version_yields_none() {
        assert_eq!(language_version("no numbers here"), None);
    }

    #[tokio::test]
    async fn probe_captures_subprocess_output() {
        let banner = fetch_banner("echo").await.unwrap();
        assert_eq!(banner, "-V");
    }
}
