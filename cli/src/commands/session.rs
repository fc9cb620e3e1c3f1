// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Agent session commands
//!
//! Commands: ls, new, send, capture, kill, stream, reap

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sc3_core::application::session_manager::{SessionError, SessionManager, TerminationOutcome};
use sc3_core::domain::config::Sc3Config;
use sc3_core::domain::events::SessionEvent;
use sc3_core::domain::session::SessionName;
use sc3_core::infrastructure::event_bus::{DomainEvent, EventBus, EventBusError};
use sc3_core::infrastructure::process::UnixProcessControl;
use sc3_core::infrastructure::tmux::TmuxBackend;

use super::{load_config, parse_duration};

#[derive(Subcommand)]
pub enum SessionCommand {
    /// List SC3 agent sessions
    Ls,

    /// Start a detached agent session
    New {
        /// Agent role, e.g. red, green, refactor
        #[arg(long)]
        role: String,

        #[arg(long)]
        mission: String,

        /// Command run inside the session
        #[arg(long)]
        command: String,

        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },

    /// Type text into a session
    Send {
        #[arg(long)]
        name: String,

        /// Literal text to type
        keys: String,

        /// Do not press Enter afterwards
        #[arg(long)]
        no_enter: bool,
    },

    /// Print the session scrollback
    Capture {
        #[arg(long)]
        name: String,
    },

    /// Remove a session (already-gone counts as success)
    Kill {
        #[arg(long)]
        name: String,
    },

    /// Follow new output until the session ends or Ctrl-C
    Stream {
        #[arg(long)]
        name: String,

        /// Capture interval (default: spec.sessions.stream_interval)
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,
    },

    /// Terminate a timed-out agent: SIGTERM, grace, SIGKILL, session removal
    Reap {
        #[arg(long)]
        name: String,

        /// Agent process id
        #[arg(long)]
        pid: Option<u32>,

        /// Grace period before SIGKILL (default: spec.sessions.grace_period)
        #[arg(long, value_parser = parse_duration)]
        grace: Option<Duration>,
    },
}

fn manager(config: &Sc3Config, event_bus: EventBus) -> SessionManager {
    SessionManager::new(
        Arc::new(TmuxBackend::new(config.spec.sessions.tmux_binary.clone())),
        Arc::new(UnixProcessControl::new()),
        event_bus,
        config.spec.sessions.clone(),
    )
}

pub async fn handle_command(
    command: SessionCommand,
    config_override: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = load_config(config_override)?;
    let event_bus = EventBus::with_default_capacity();
    let sessions = manager(&config, event_bus.clone());

    match command {
        SessionCommand::Ls => list(&sessions, cancel).await,
        SessionCommand::New {
            role,
            mission,
            command,
            workdir,
        } => {
            let name = SessionName::new(&role, &mission)?;
            let workdir = workdir.to_string_lossy();
            let session = sessions.create_session(cancel, name.as_str(), &command, &workdir).await?;
            println!("{}", format!("✓ Session started: {session}").green());
            Ok(())
        }
        SessionCommand::Send { name, keys, no_enter } => {
            sessions.send_keys(cancel, &name, &keys, !no_enter).await?;
            Ok(())
        }
        SessionCommand::Capture { name } => {
            println!("{}", sessions.capture_panes(cancel, &name).await?);
            Ok(())
        }
        SessionCommand::Kill { name } => {
            sessions.kill_session(cancel, &name).await?;
            println!("{}", format!("✓ Session removed: {name}").green());
            Ok(())
        }
        SessionCommand::Stream { name, interval } => {
            stream(&sessions, &event_bus, cancel, &name, interval.unwrap_or(Duration::ZERO)).await
        }
        SessionCommand::Reap { name, pid, grace } => {
            let outcome = sessions
                .enforce_timeout(cancel, &name, pid, grace.unwrap_or(Duration::ZERO))
                .await?;
            let summary = match outcome {
                TerminationOutcome::SessionOnly => "session removed (no pid given)".to_string(),
                TerminationOutcome::Graceful => "process exited after SIGTERM".to_string(),
                TerminationOutcome::Forced => "process killed with SIGKILL".yellow().to_string(),
            };
            println!("{} {name}: {summary}", "✓".green());
            Ok(())
        }
    }
}

async fn list(sessions: &SessionManager, cancel: &CancellationToken) -> Result<()> {
    let names = sessions.list_sessions(cancel).await?;
    if names.is_empty() {
        println!("{}", "No SC3 sessions running".dimmed());
        return Ok(());
    }
    println!("{:<40} {:<12} {}", "SESSION".bold(), "ROLE".bold(), "MISSION".bold());
    for name in names {
        println!("{:<40} {:<12} {}", name.as_str(), name.role(), name.mission_id());
    }
    Ok(())
}

async fn stream(
    sessions: &SessionManager,
    event_bus: &EventBus,
    cancel: &CancellationToken,
    name: &str,
    interval: Duration,
) -> Result<()> {
    let mut receiver = event_bus.subscribe();
    let streaming = sessions.stream_output(cancel, name, interval);
    tokio::pin!(streaming);

    loop {
        tokio::select! {
            result = &mut streaming => {
                for event in receiver.drain() {
                    print_event(&event);
                }
                return match result {
                    Ok(()) | Err(SessionError::Cancelled { .. }) => Ok(()),
                    Err(e) => Err(e.into()),
                };
            }
            received = receiver.recv() => match received {
                Ok(event) => print_event(&event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn print_event(event: &DomainEvent) {
    match event {
        DomainEvent::OutputChunk(chunk) => {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", chunk.content);
            if chunk.truncated {
                let _ = writeln!(stdout, "{}", "[output truncated]".dimmed());
            }
        }
        DomainEvent::Session(SessionEvent::SessionEnded { session, .. }) => {
            eprintln!("{}", format!("⚠ Session {session} ended").yellow());
        }
        _ => {}
    }
}
