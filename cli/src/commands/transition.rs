// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `sc3 transition` - apply one lifecycle transition to the state file.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use opentelemetry::Context as TraceContext;
use std::path::PathBuf;
use std::sync::Arc;

use sc3_core::application::state_machine::LifecycleStateMachine;
use sc3_core::domain::lifecycle::{EntityType, LifecycleState};
use sc3_core::infrastructure::repositories::JsonFilePersister;

use super::load_config;

#[derive(Args)]
pub struct TransitionArgs {
    /// Entity type: commission, mission, ac, agent
    #[arg(value_name = "ENTITY")]
    pub entity_type: String,

    /// Entity identifier
    #[arg(value_name = "ID")]
    pub entity_id: String,

    /// Current state
    #[arg(value_name = "FROM")]
    pub from: String,

    /// Next state
    #[arg(value_name = "TO")]
    pub to: String,

    /// Free-text reason recorded in the audit comment
    #[arg(short, long, default_value = "")]
    pub reason: String,

    /// Actor recorded on the transition (default: spec.lifecycle.actor)
    #[arg(long)]
    pub actor: Option<String>,
}

pub async fn handle_command(args: TransitionArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;

    let entity_type: EntityType = args.entity_type.parse()?;
    let from = LifecycleState::parse(entity_type, &args.from)?;
    let to = LifecycleState::parse(entity_type, &args.to)?;

    let persister = Arc::new(JsonFilePersister::new(&config.spec.lifecycle.state_file));

    // The state file is the source of truth for what `from` must be.
    let recorded = persister
        .state(&args.entity_id, &entity_type.state_key())
        .await
        .context("Failed to read state file")?;
    if let Some(recorded) = recorded {
        if recorded != from.as_str() {
            bail!(
                "{} {} is recorded as '{}', not '{}'",
                entity_type,
                args.entity_id,
                recorded,
                from
            );
        }
    }

    let actor = args.actor.unwrap_or_else(|| config.spec.lifecycle.actor.clone());
    let machine = LifecycleStateMachine::new(persister, actor);
    let record = machine
        .transition(&TraceContext::current(), entity_type, &args.entity_id, from, to, &args.reason)
        .await?;

    println!(
        "{}",
        format!(
            "✓ {} {}: {} -> {}",
            record.entity_type, record.entity_id, record.from_state, record.to_state
        )
        .green()
    );
    if let Some(next) = record.to_state.next() {
        println!("  next: {}", next.to_string().dimmed());
    }
    Ok(())
}
