// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sc3_core::domain::config::Sc3Config;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./sc3-config.yaml)
        #[arg(short, long, default_value = "./sc3-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = Sc3Config::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SC3_CONFIG_PATH: {}",
            std::env::var("SC3_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./sc3-config.yaml");
        println!("  4. ~/.sc3/config.yaml");
        println!("  5. /etc/sc3/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let protocol = &config.spec.protocol;
    println!("{}", "Protocol:".bold());
    println!("  Poll interval: {:?}", protocol.poll_interval);
    println!("  Claim timeout: {:?}", protocol.claim_timeout);
    println!("  Event log: {}", protocol.event_log.display());
    println!();

    let sessions = &config.spec.sessions;
    println!("{}", "Sessions:".bold());
    println!("  tmux binary: {}", sessions.tmux_binary);
    println!("  Capture lines: {}", sessions.capture_lines);
    println!("  Stream interval: {:?}", sessions.stream_interval);
    println!("  Stream chunk limit: {} bytes", sessions.stream_max_bytes);
    println!("  Grace period: {:?}", sessions.grace_period);
    println!("  Forced exit window: {:?}", sessions.forced_exit_window);
    println!();

    let lifecycle = &config.spec.lifecycle;
    println!("{}", "Lifecycle:".bold());
    println!("  Actor: {}", lifecycle.actor);
    println!("  State file: {}", lifecycle.state_file.display());
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = Sc3Config::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_templates_parse_and_validate() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = sc3_core::domain::config::Sc3Config::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }
}
