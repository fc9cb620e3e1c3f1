// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! tmux-backed `SessionBackend`.
//!
//! Every call shells out to the tmux binary. Failure stderr is classified so
//! the session manager can treat a missing session or a missing server as
//! "already gone".

use crate::domain::runtime::{SessionBackend, SessionBackendError};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

pub struct TmuxBackend {
    binary: String,
}

impl TmuxBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, name: &str, args: &[&str]) -> Result<String, SessionBackendError> {
        debug!(binary = %self.binary, ?args, "tmux invocation");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(name, args.first().copied().unwrap_or_default(), stderr))
    }
}

impl Default for TmuxBackend {
    fn default() -> Self {
        Self::new("tmux")
    }
}

/// Maps tmux stderr onto the backend error kinds.
fn classify_failure(name: &str, command: &str, stderr: String) -> SessionBackendError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("no server running") || lowered.contains("error connecting to") {
        SessionBackendError::NoServer
    } else if lowered.contains("can't find session")
        || lowered.contains("can't find pane")
        || lowered.contains("session not found")
    {
        SessionBackendError::SessionNotFound(name.to_string())
    } else {
        SessionBackendError::CommandFailed {
            command: format!("tmux {command}"),
            stderr,
        }
    }
}

/// Exact-match session target so `sc3-impl-m4` never resolves to `sc3-impl-m40`.
fn exact_target(name: &str) -> String {
    format!("={name}")
}

/// Active pane of the exactly-matched session. A bare `=name` is not a valid
/// pane target.
fn exact_pane_target(name: &str) -> String {
    format!("={name}:")
}

#[async_trait]
impl SessionBackend for TmuxBackend {
    async fn new_session(&self, name: &str, command: &str, workdir: &str) -> Result<(), SessionBackendError> {
        self.run(name, &["new-session", "-d", "-s", name, "-c", workdir, command])
            .await
            .map(|_| ())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, SessionBackendError> {
        let stdout = self.run("", &["list-sessions", "-F", "#{session_name}"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn send_keys(&self, name: &str, keys: &str, enter: bool) -> Result<(), SessionBackendError> {
        let target = exact_pane_target(name);
        // -l sends the text literally instead of as key names.
        self.run(name, &["send-keys", "-t", &target, "-l", keys]).await?;
        if enter {
            self.run(name, &["send-keys", "-t", &target, "Enter"]).await?;
        }
        Ok(())
    }

    async fn capture_pane(&self, name: &str, lines: u32) -> Result<String, SessionBackendError> {
        let target = exact_pane_target(name);
        let start = format!("-{lines}");
        self.run(name, &["capture-pane", "-p", "-J", "-t", &target, "-S", &start])
            .await
    }

    async fn kill_session(&self, name: &str) -> Result<(), SessionBackendError> {
        let target = exact_target(name);
        self.run(name, &["kill-session", "-t", &target]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("sc3-impl-m4", "kill-session", "can't find session: sc3-impl-m4".into()),
            SessionBackendError::SessionNotFound(name) if name == "sc3-impl-m4"
        ));
        assert!(matches!(
            classify_failure("sc3-impl-m4", "capture-pane", "can't find pane: =sc3-impl-m4".into()),
            SessionBackendError::SessionNotFound(_)
        ));
        assert!(matches!(
            classify_failure("x", "list-sessions", "no server running on /tmp/tmux-0/default".into()),
            SessionBackendError::NoServer
        ));
        assert!(matches!(
            classify_failure("x", "list-sessions", "error connecting to /tmp/tmux-0/default (No such file or directory)".into()),
            SessionBackendError::NoServer
        ));
        assert!(matches!(
            classify_failure("x", "new-session", "duplicate session: x".into()),
            SessionBackendError::CommandFailed { .. }
        ));
    }

    #[test]
    fn test_targets() {
        assert_eq!(exact_target("sc3-impl-m4"), "=sc3-impl-m4");
        assert_eq!(exact_pane_target("sc3-impl-m4"), "=sc3-impl-m4:");
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let backend = TmuxBackend::new("/nonexistent/sc3-tmux");
        let err = backend.list_sessions().await.unwrap_err();
        assert!(matches!(err, SessionBackendError::Io(_)));
    }
}
