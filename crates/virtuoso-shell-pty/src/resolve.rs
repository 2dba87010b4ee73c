//! Interpreter executable resolution through the user's login shell.
//!
//! EDA installations rarely put the interpreter on the ambient `PATH`; the
//! usual setup appends it from a shell startup script (classically a csh
//! family one). Resolution therefore falls back to asking the user's login
//! shell for its `PATH` and retrying.

use std::{
    collections::HashSet,
    env::{join_paths, split_paths},
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

/// Resolve an executable by name, falling back to a refreshed PATH if needed.
///
/// The search order is:
/// 1. Explicit paths (absolute or containing a separator).
/// 2. The current process PATH via `which`.
/// 3. A login-shell refresh of PATH, then `which` again.
pub async fn resolve_executable(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    if let Some(found) = which_async(executable).await {
        return Some(found);
    }

    if refresh_path().await {
        if let Some(found) = which_async(executable).await {
            return Some(found);
        }
    }

    None
}

/// Merge two PATH strings into a single, de-duplicated PATH.
#[must_use]
pub fn merge_paths(primary: impl AsRef<OsStr>, secondary: impl AsRef<OsStr>) -> OsString {
    let mut seen = HashSet::<PathBuf>::new();
    let mut merged = Vec::<PathBuf>::new();

    for p in split_paths(primary.as_ref()).chain(split_paths(secondary.as_ref())) {
        if !p.as_os_str().is_empty() && seen.insert(p.clone()) {
            merged.push(p);
        }
    }

    join_paths(merged).unwrap_or_default()
}

async fn refresh_path() -> bool {
    let Some(refreshed) = get_fresh_path().await else {
        return false;
    };
    let existing = std::env::var_os("PATH").unwrap_or_default();
    let refreshed_os = OsString::from(&refreshed);
    let merged = merge_paths(&existing, refreshed_os);
    if merged == existing {
        return false;
    }
    tracing::debug!(?existing, ?refreshed, ?merged, "Refreshed PATH");
    // SAFETY: We're only modifying the current process's environment.
    unsafe {
        std::env::set_var("PATH", &merged);
    }
    true
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Unix shell types, csh family included because EDA site setups live there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnixShell {
    Tcsh(PathBuf),
    Csh(PathBuf),
    Zsh(PathBuf),
    Bash(PathBuf),
    Sh(PathBuf),
    Other(PathBuf),
}

impl UnixShell {
    /// Get the shell path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Tcsh(p) | Self::Csh(p) | Self::Zsh(p) | Self::Bash(p) | Self::Sh(p)
            | Self::Other(p) => p,
        }
    }

    /// Whether this shell supports login mode.
    #[must_use]
    pub const fn login(&self) -> bool {
        matches!(
            self,
            Self::Tcsh(_) | Self::Csh(_) | Self::Zsh(_) | Self::Bash(_)
        )
    }

    /// Get the startup file sourced for this shell, if it exists.
    #[must_use]
    pub fn config_file(&self) -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let candidates: &[&str] = match self {
            Self::Tcsh(_) => &[".tcshrc", ".cshrc"],
            Self::Csh(_) => &[".cshrc"],
            Self::Zsh(_) => &[".zshrc"],
            Self::Bash(_) => &[".bashrc"],
            Self::Sh(_) | Self::Other(_) => &[],
        };
        candidates
            .iter()
            .map(|name| home.join(name))
            .find(|p| p.is_file())
    }

    /// Get the source command for the startup file.
    #[must_use]
    pub fn source_command(&self) -> Option<String> {
        if let Some(source_file) = self.config_file() {
            if let Ok(escaped) = shlex::try_quote(source_file.to_string_lossy().as_ref()) {
                return Some(format!("source {escaped}"));
            }
        }
        None
    }

    /// Get the current shell from `$SHELL`.
    #[must_use]
    pub fn current_shell() -> Self {
        if let Ok(shell) = std::env::var("SHELL") {
            if let Some(shell) = Self::from_path(Path::new(&shell)) {
                return shell;
            }
        }
        Self::Sh(PathBuf::from("/bin/sh"))
    }

    /// Create from a path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.is_absolute() && path.is_file() {
            let path_buf = path.to_path_buf();
            match path.file_name().and_then(OsStr::to_str) {
                Some("tcsh") => Some(Self::Tcsh(path_buf)),
                Some("csh") => Some(Self::Csh(path_buf)),
                Some("zsh") => Some(Self::Zsh(path_buf)),
                Some("bash") => Some(Self::Bash(path_buf)),
                Some("sh") => Some(Self::Sh(path_buf)),
                _ => Some(Self::Other(path_buf)),
            }
        } else {
            None
        }
    }

    /// Compose a `shell -c` invocation running `command` with the shell's
    /// startup environment loaded.
    #[must_use]
    pub fn wrap_command(&self, command: &str) -> (String, Vec<String>) {
        let mut args = Vec::new();
        if self.login() {
            args.push("-l".to_owned());
        }
        args.push("-c".to_owned());
        args.push(command.to_owned());
        (self.path().to_string_lossy().into_owned(), args)
    }
}

async fn get_fresh_path() -> Option<String> {
    use std::{process::Stdio, time::Duration};

    use tokio::process::Command;

    async fn run(shell: &UnixShell) -> Option<String> {
        let mut cmd = Command::new(shell.path());
        if shell.login() {
            cmd.arg("-l");
        }
        if let Some(source_command) = shell.source_command() {
            cmd.arg("-c")
                .arg(format!("{source_command}; printf '%s' \"$PATH\""));
        } else {
            cmd.arg("-c").arg("printf '%s' \"$PATH\"");
        }
        cmd.env("TERM", "dumb")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        const PATH_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

        let child = cmd.spawn().ok()?;
        let output = match tokio::time::timeout(PATH_REFRESH_TIMEOUT, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                tracing::debug!(
                    shell = %shell.path().display(),
                    ?err,
                    "Failed to retrieve PATH from login shell"
                );
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    shell = %shell.path().display(),
                    "Timed out retrieving PATH from login shell"
                );
                return None;
            }
        };

        if !output.status.success() {
            return None;
        }
        let path = String::from_utf8(output.stdout).ok()?.trim().to_string();
        if path.is_empty() { None } else { Some(path) }
    }

    let mut paths = Vec::new();

    let current_shell = UnixShell::current_shell();
    if let Some(path) = run(&current_shell).await {
        paths.push(path);
    }

    let shells: Vec<UnixShell> = ["/bin/tcsh", "/bin/csh", "/bin/bash", "/bin/sh"]
        .into_iter()
        .filter_map(|p| UnixShell::from_path(Path::new(p)))
        .collect();

    for shell in shells {
        if shell != current_shell {
            if let Some(path) = run(&shell).await {
                paths.push(path);
            }
        }
    }

    if paths.is_empty() {
        return None;
    }

    paths
        .into_iter()
        .map(OsString::from)
        .reduce(|a, b| merge_paths(&a, &b))
        .map(|merged| merged.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_paths_dedupes_and_keeps_order() {
        let merged = merge_paths("/usr/bin:/bin", "/bin:/opt/eda/bin");
        assert_eq!(merged, OsString::from("/usr/bin:/bin:/opt/eda/bin"));
    }

    #[test]
    fn shell_kind_follows_file_name() {
        assert_eq!(
            UnixShell::from_path(Path::new("/bin/sh")),
            Some(UnixShell::Sh(PathBuf::from("/bin/sh")))
        );
        assert_eq!(UnixShell::from_path(Path::new("relative/sh")), None);
    }

    #[test]
    fn wrapped_command_goes_through_dash_c() {
        let shell = UnixShell::Sh(PathBuf::from("/bin/sh"));
        let (program, args) = shell.wrap_command("virtuoso -nograph");
        assert_eq!(program, "/bin/sh");
        assert_eq!(args, ["-c", "virtuoso -nograph"]);
    }

    #[tokio::test]
    async fn common_tools_resolve_from_path() {
        assert!(resolve_executable("sh").await.is_some());
        assert!(resolve_executable("").await.is_none());
    }
}
