// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the SC3 CLI

pub mod claim;
pub mod config;
pub mod proof;
pub mod session;
pub mod transition;

pub use self::claim::ClaimCommand;
pub use self::config::ConfigCommand;
pub use self::proof::ProofCommand;
pub use self::session::SessionCommand;
pub use self::transition::TransitionArgs;

use anyhow::{Context, Result};
use sc3_core::domain::config::Sc3Config;
use std::path::PathBuf;
use std::time::Duration;

/// Parses human-readable durations such as `250ms`, `5s` or `30m`.
pub fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw.trim()).map_err(|e| e.to_string())
}

/// Loads and validates configuration for commands that touch the core.
pub(crate) fn load_config(config_override: Option<PathBuf>) -> Result<Sc3Config> {
    let config = Sc3Config::load_or_default(config_override).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}
