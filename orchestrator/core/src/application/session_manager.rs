// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Session Lifecycle Manager
//!
//! One supervised terminal session per agent dispatch, named
//! `sc3-<role>-<mission-id>`. Names are validated before any backend call.
//! Teardown is idempotent and timeout enforcement escalates from SIGTERM to
//! SIGKILL within bounded windows, then verifies the process is gone.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Agent process supervision

use crate::domain::config::SessionManagerConfig;
use crate::domain::events::{SessionEvent, Severity};
use crate::domain::runtime::{ProcessControl, ProcessError, SessionBackend, SessionBackendError, Signal};
use crate::domain::session::{pane_delta, truncate_to_limit, InvalidSessionName, OutputChunk, SessionName};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    InvalidName(#[from] InvalidSessionName),

    #[error("{0} must not be blank")]
    MissingArgument(&'static str),

    #[error("session {session}: {source}")]
    Backend {
        session: String,
        #[source]
        source: SessionBackendError,
    },

    #[error("process {pid} of session {session}: {source}")]
    Process {
        session: String,
        pid: u32,
        #[source]
        source: ProcessError,
    },

    #[error("process {pid} of session {session} still alive after forced termination")]
    StillAlive { session: String, pid: u32 },

    #[error("session {session}: operation cancelled")]
    Cancelled { session: String },

    #[error("listing sessions: {0}")]
    List(#[source] SessionBackendError),

    #[error("session listing cancelled")]
    ListCancelled,
}

/// How `enforce_timeout` ended the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationOutcome {
    /// No pid was known; only the session was removed.
    SessionOnly,
    /// The process exited after SIGTERM.
    Graceful,
    /// SIGKILL was required.
    Forced,
}

pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    process: Arc<dyn ProcessControl>,
    event_bus: EventBus,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        process: Arc<dyn ProcessControl>,
        event_bus: EventBus,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            backend,
            process,
            event_bus,
            config,
        }
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    pub async fn create_session(
        &self,
        cancel: &CancellationToken,
        name: &str,
        command: &str,
        workdir: &str,
    ) -> Result<SessionName, SessionError> {
        let session = SessionName::parse(name)?;
        if command.trim().is_empty() {
            return Err(SessionError::MissingArgument("command"));
        }
        if workdir.trim().is_empty() {
            return Err(SessionError::MissingArgument("workdir"));
        }

        self.call(cancel, &session, self.backend.new_session(session.as_str(), command, workdir))
            .await?;

        info!(session = %session, workdir = %workdir, "Agent session created");
        self.event_bus.publish_session_event(SessionEvent::SessionCreated {
            session: session.clone(),
            workdir: workdir.to_string(),
            created_at: Utc::now(),
        });
        Ok(session)
    }

    /// Conformant sessions currently known to the backend.
    pub async fn list_sessions(&self, cancel: &CancellationToken) -> Result<Vec<SessionName>, SessionError> {
        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::ListCancelled),
            listed = self.backend.list_sessions() => listed,
        };
        match listed {
            Ok(names) => Ok(names.iter().filter_map(|n| SessionName::parse(n).ok()).collect()),
            Err(SessionBackendError::NoServer) => Ok(Vec::new()),
            Err(source) => Err(SessionError::List(source)),
        }
    }

    pub async fn send_keys(
        &self,
        cancel: &CancellationToken,
        name: &str,
        keys: &str,
        enter: bool,
    ) -> Result<(), SessionError> {
        let session = SessionName::parse(name)?;
        self.call(cancel, &session, self.backend.send_keys(session.as_str(), keys, enter))
            .await
    }

    /// Bounded scrollback of the session, trimmed.
    pub async fn capture_panes(&self, cancel: &CancellationToken, name: &str) -> Result<String, SessionError> {
        let session = SessionName::parse(name)?;
        let content = self
            .call(
                cancel,
                &session,
                self.backend.capture_pane(session.as_str(), self.config.capture_lines),
            )
            .await?;
        Ok(content.trim().to_string())
    }

    /// Removes the session. Already-absent sessions count as success.
    pub async fn kill_session(&self, cancel: &CancellationToken, name: &str) -> Result<(), SessionError> {
        let session = SessionName::parse(name)?;
        self.kill(cancel, &session).await
    }

    async fn kill(&self, cancel: &CancellationToken, session: &SessionName) -> Result<(), SessionError> {
        match self.call(cancel, session, self.backend.kill_session(session.as_str())).await {
            Ok(()) => {
                info!(session = %session, "Agent session killed");
                self.event_bus.publish_session_event(SessionEvent::SessionKilled {
                    session: session.clone(),
                    killed_at: Utc::now(),
                });
                Ok(())
            }
            Err(SessionError::Backend { source, .. }) if source.is_gone() => {
                debug!(session = %session, reason = %source, "Session already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Publishes incremental pane output until cancelled or the session ends.
    ///
    /// A zero `interval` uses the configured stream interval.
    pub async fn stream_output(
        &self,
        cancel: &CancellationToken,
        name: &str,
        interval: Duration,
    ) -> Result<(), SessionError> {
        let session = SessionName::parse(name)?;
        let interval = if interval.is_zero() {
            self.config.effective_stream_interval()
        } else {
            interval
        };
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut previous = String::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(SessionError::Cancelled { session: session.to_string() });
                }
                _ = ticker.tick() => {}
            }

            let captured = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(SessionError::Cancelled { session: session.to_string() });
                }
                captured = self.backend.capture_pane(session.as_str(), self.config.capture_lines) => captured,
            };

            let current = match captured {
                Ok(content) => content.trim_end().to_string(),
                Err(e) if e.is_gone() => {
                    warn!(session = %session, reason = %e, "Session disappeared while streaming output");
                    self.event_bus.publish_session_event(SessionEvent::SessionEnded {
                        session: session.clone(),
                        severity: Severity::Warning,
                        ended_at: Utc::now(),
                    });
                    return Ok(());
                }
                Err(source) => {
                    return Err(SessionError::Backend {
                        session: session.to_string(),
                        source,
                    })
                }
            };

            let delta = pane_delta(&previous, &current);
            if !delta.is_empty() {
                let (content, truncated) = truncate_to_limit(delta, self.config.stream_max_bytes);
                if truncated {
                    debug!(session = %session, limit = self.config.stream_max_bytes, "Output chunk truncated");
                }
                if !content.is_empty() {
                    self.event_bus.publish_output(OutputChunk {
                        session: session.clone(),
                        content,
                        truncated,
                        captured_at: Utc::now(),
                    });
                }
            }
            previous = current;
        }
    }

    /// Terminates the agent behind `name`: SIGTERM, grace window, SIGKILL,
    /// forced window, session removal, final liveness check.
    ///
    /// A zero `grace_period` uses the configured default. Cancellation aborts
    /// the remaining steps and leaves the outcome unknown.
    pub async fn enforce_timeout(
        &self,
        cancel: &CancellationToken,
        name: &str,
        pid: Option<u32>,
        grace_period: Duration,
    ) -> Result<TerminationOutcome, SessionError> {
        let session = SessionName::parse(name)?;
        let grace_period = if grace_period.is_zero() { self.config.grace_period } else { grace_period };

        let outcome = match pid {
            None => TerminationOutcome::SessionOnly,
            Some(pid) => self.terminate_process(cancel, &session, pid, grace_period).await?,
        };

        self.ensure_not_cancelled(cancel, &session)?;
        self.kill(cancel, &session).await?;

        if let Some(pid) = pid {
            if self.process.is_alive(pid) {
                warn!(session = %session, pid, "Process survived forced termination");
                return Err(SessionError::StillAlive {
                    session: session.to_string(),
                    pid,
                });
            }
            self.event_bus.publish_session_event(SessionEvent::ProcessTerminated {
                session: session.clone(),
                pid,
                forced: outcome == TerminationOutcome::Forced,
                terminated_at: Utc::now(),
            });
        }
        Ok(outcome)
    }

    async fn terminate_process(
        &self,
        cancel: &CancellationToken,
        session: &SessionName,
        pid: u32,
        grace_period: Duration,
    ) -> Result<TerminationOutcome, SessionError> {
        self.ensure_not_cancelled(cancel, session)?;
        if !self.send_signal(session, pid, Signal::Terminate)? {
            return Ok(TerminationOutcome::Graceful);
        }
        let grace_ms = u64::try_from(grace_period.as_millis()).unwrap_or(u64::MAX);
        info!(session = %session, pid, grace_ms, "Sent SIGTERM to agent process");

        if self.wait_for_exit(cancel, session, pid, grace_period).await? {
            info!(session = %session, pid, "Agent process exited gracefully");
            return Ok(TerminationOutcome::Graceful);
        }

        warn!(session = %session, pid, "Grace period elapsed, sending SIGKILL");
        metrics::counter!("sc3_forced_kills_total").increment(1);
        if self.send_signal(session, pid, Signal::Kill)? {
            self.wait_for_exit(cancel, session, pid, self.config.forced_exit_window)
                .await?;
        }
        Ok(TerminationOutcome::Forced)
    }

    /// Returns `false` when the process was already gone.
    fn send_signal(&self, session: &SessionName, pid: u32, signal: Signal) -> Result<bool, SessionError> {
        match self.process.signal(pid, signal) {
            Ok(()) => Ok(true),
            Err(ProcessError::NotFound(_)) => {
                debug!(session = %session, pid, %signal, "Process already exited");
                Ok(false)
            }
            Err(source) => Err(SessionError::Process {
                session: session.to_string(),
                pid,
                source,
            }),
        }
    }

    /// Polls liveness until the process exits (`true`) or `window` elapses.
    async fn wait_for_exit(
        &self,
        cancel: &CancellationToken,
        session: &SessionName,
        pid: u32,
        window: Duration,
    ) -> Result<bool, SessionError> {
        let deadline = Instant::now() + window;
        loop {
            if !self.process.is_alive(pid) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let nap = self
                .config
                .effective_liveness_poll_interval()
                .min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(SessionError::Cancelled { session: session.to_string() });
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    fn ensure_not_cancelled(&self, cancel: &CancellationToken, session: &SessionName) -> Result<(), SessionError> {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled {
                session: session.to_string(),
            });
        }
        Ok(())
    }

    /// Runs one backend call, racing it against cancellation.
    async fn call<T, F>(&self, cancel: &CancellationToken, session: &SessionName, fut: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, SessionBackendError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SessionError::Cancelled { session: session.to_string() }),
            result = fut => result.map_err(|source| SessionError::Backend {
                session: session.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        kill_error: Mutex<Option<SessionBackendError>>,
        listed: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl SessionBackend for RecordingBackend {
        async fn new_session(&self, name: &str, _command: &str, _workdir: &str) -> Result<(), SessionBackendError> {
            self.calls.lock().push(format!("new {name}"));
            Ok(())
        }

        async fn list_sessions(&self) -> Result<Vec<String>, SessionBackendError> {
            Ok(self.listed.lock().clone())
        }

        async fn send_keys(&self, name: &str, keys: &str, _enter: bool) -> Result<(), SessionBackendError> {
            self.calls.lock().push(format!("keys {name} {keys}"));
            Ok(())
        }

        async fn capture_pane(&self, name: &str, lines: u32) -> Result<String, SessionBackendError> {
            self.calls.lock().push(format!("capture {name} {lines}"));
            Ok("  $ cargo test\nok  \n\n".to_string())
        }

        async fn kill_session(&self, name: &str) -> Result<(), SessionBackendError> {
            self.calls.lock().push(format!("kill {name}"));
            match self.kill_error.lock().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    struct NoProcesses;

    impl ProcessControl for NoProcesses {
        fn signal(&self, pid: u32, _signal: Signal) -> Result<(), ProcessError> {
            Err(ProcessError::NotFound(pid))
        }

        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    fn manager(backend: Arc<RecordingBackend>) -> SessionManager {
        SessionManager::new(backend, Arc::new(NoProcesses), EventBus::new(16), SessionManagerConfig::default())
    }

    #[tokio::test]
    async fn test_invalid_name_never_reaches_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let mgr = manager(backend.clone());
        let cancel = CancellationToken::new();

        assert!(matches!(
            mgr.create_session(&cancel, "agent-m4", "claude", "/tmp").await,
            Err(SessionError::InvalidName(_))
        ));
        assert!(mgr.kill_session(&cancel, "SC3-impl-m4").await.is_err());
        assert!(mgr.capture_panes(&cancel, "sc3-impl").await.is_err());
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_command_and_workdir() {
        let backend = Arc::new(RecordingBackend::default());
        let mgr = manager(backend.clone());
        let cancel = CancellationToken::new();

        assert!(matches!(
            mgr.create_session(&cancel, "sc3-impl-m4", " ", "/tmp").await,
            Err(SessionError::MissingArgument("command"))
        ));
        assert!(matches!(
            mgr.create_session(&cancel, "sc3-impl-m4", "claude", "").await,
            Err(SessionError::MissingArgument("workdir"))
        ));
        mgr.create_session(&cancel, "sc3-impl-m4", "claude", "/tmp").await.unwrap();
        assert_eq!(*backend.calls.lock(), vec!["new sc3-impl-m4".to_string()]);
    }

    #[tokio::test]
    async fn test_capture_is_bounded_and_trimmed() {
        let backend = Arc::new(RecordingBackend::default());
        let mgr = manager(backend.clone());

        let content = mgr.capture_panes(&CancellationToken::new(), "sc3-impl-m4").await.unwrap();
        assert_eq!(content, "$ cargo test\nok");
        assert_eq!(*backend.calls.lock(), vec!["capture sc3-impl-m4 10000".to_string()]);
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let backend = Arc::new(RecordingBackend::default());
        let mgr = manager(backend.clone());
        let cancel = CancellationToken::new();

        *backend.kill_error.lock() = Some(SessionBackendError::SessionNotFound("sc3-impl-m4".into()));
        mgr.kill_session(&cancel, "sc3-impl-m4").await.unwrap();

        *backend.kill_error.lock() = Some(SessionBackendError::NoServer);
        mgr.kill_session(&cancel, "sc3-impl-m4").await.unwrap();

        *backend.kill_error.lock() = Some(SessionBackendError::CommandFailed {
            command: "tmux kill-session".into(),
            stderr: "boom".into(),
        });
        assert!(matches!(
            mgr.kill_session(&cancel, "sc3-impl-m4").await,
            Err(SessionError::Backend { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters_foreign_sessions() {
        let backend = Arc::new(RecordingBackend::default());
        *backend.listed.lock() = vec!["sc3-impl-m4".into(), "scratch".into(), "sc3-review-m4".into()];
        let mgr = manager(backend);

        let names = mgr.list_sessions(&CancellationToken::new()).await.unwrap();
        let names: Vec<_> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["sc3-impl-m4", "sc3-review-m4"]);
    }

    #[tokio::test]
    async fn test_list_cancelled_has_own_error() {
        let mgr = manager(Arc::new(RecordingBackend::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(mgr.list_sessions(&cancel).await, Err(SessionError::ListCancelled)));
    }

    #[tokio::test]
    async fn test_enforce_timeout_without_pid_only_kills_session() {
        let backend = Arc::new(RecordingBackend::default());
        let mgr = manager(backend.clone());

        let outcome = mgr
            .enforce_timeout(&CancellationToken::new(), "sc3-impl-m4", None, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(outcome, TerminationOutcome::SessionOnly);
        assert_eq!(*backend.calls.lock(), vec!["kill sc3-impl-m4".to_string()]);
    }

    #[tokio::test]
    async fn test_enforce_timeout_with_exited_process_is_graceful() {
        let backend = Arc::new(RecordingBackend::default());
        let mgr = manager(backend.clone());

        let outcome = mgr
            .enforce_timeout(&CancellationToken::new(), "sc3-impl-m4", Some(4242), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(outcome, TerminationOutcome::Graceful);
        assert_eq!(*backend.calls.lock(), vec!["kill sc3-impl-m4".to_string()]);
    }
}
