// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # SC3 Operator CLI
//!
//! The `sc3` binary wires the orchestration core to real adapters: a JSONL
//! event log, a JSON state file, tmux sessions and unix signals.
//!
//! ## Commands
//!
//! - `sc3 config show|validate|generate` - Configuration management
//! - `sc3 transition <entity> <id> <from> <to>` - Apply a lifecycle transition
//! - `sc3 claim publish|wait|log` - Agent claim protocol
//! - `sc3 proof check` - Validate a mission completion artifact
//! - `sc3 session ls|new|send|capture|kill|stream|reap` - Agent sessions
//!
//! Ctrl-C cancels whatever operation is in flight.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sc3_orchestrator::commands::{self, ClaimCommand, ConfigCommand, ProofCommand, SessionCommand, TransitionArgs};

/// SC3 - supervised agent orchestration
#[derive(Parser)]
#[command(name = "sc3")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "SC3_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SC3_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Apply one lifecycle transition
    #[command(name = "transition")]
    Transition(TransitionArgs),

    /// Agent claim protocol
    #[command(name = "claim")]
    Claim {
        #[command(subcommand)]
        command: ClaimCommand,
    },

    /// Completion proof checks
    #[command(name = "proof")]
    Proof {
        #[command(subcommand)]
        command: ProofCommand,
    },

    /// Agent session supervision
    #[command(name = "session")]
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Transition(args)) => commands::transition::handle_command(args, cli.config).await,
        Some(Commands::Claim { command }) => commands::claim::handle_command(command, cli.config, &cancel).await,
        Some(Commands::Proof { command }) => commands::proof::handle_command(command).await,
        Some(Commands::Session { command }) => {
            commands::session::handle_command(command, cli.config, &cancel).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// First Ctrl-C cancels the active operation.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
