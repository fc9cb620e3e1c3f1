// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Process-control surface consumed by the session manager.
//!
//! [`SessionBackend`] drives named terminal sessions (tmux in production);
//! [`ProcessControl`] signals and probes individual pids.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionBackendError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("no session server running")]
    NoServer,
    #[error("session command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("failed to launch session backend: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionBackendError {
    /// Conditions in which the session is already absent.
    pub fn is_gone(&self) -> bool {
        matches!(self, SessionBackendError::SessionNotFound(_) | SessionBackendError::NoServer)
    }
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Starts a detached session running `command` in `workdir`.
    async fn new_session(&self, name: &str, command: &str, workdir: &str) -> Result<(), SessionBackendError>;

    async fn list_sessions(&self) -> Result<Vec<String>, SessionBackendError>;

    async fn send_keys(&self, name: &str, keys: &str, enter: bool) -> Result<(), SessionBackendError>;

    /// Returns the last `lines` lines of scrollback.
    async fn capture_pane(&self, name: &str, lines: u32) -> Result<String, SessionBackendError>;

    async fn kill_session(&self, name: &str) -> Result<(), SessionBackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Terminate => f.write_str("SIGTERM"),
            Signal::Kill => f.write_str("SIGKILL"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process {0} not found")]
    NotFound(u32),
    #[error("permission denied signalling process {0}")]
    PermissionDenied(u32),
    #[error("failed to send {signal} to process {pid}: {source}")]
    Signal {
        pid: u32,
        signal: Signal,
        #[source]
        source: std::io::Error,
    },
}

pub trait ProcessControl: Send + Sync {
    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError>;

    fn is_alive(&self, pid: u32) -> bool;
}
