// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `sc3 proof check` - validate a mission's completion artifact.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sc3_core::application::artifact::{validate_mission_completion, CompletionArtifact};
use sc3_core::domain::proof::MissionRef;

#[derive(Subcommand)]
pub enum ProofCommand {
    /// Check the completion artifact of a mission
    Check {
        /// Worktree that holds the mission artifact
        #[arg(long, default_value = ".")]
        worktree: PathBuf,

        #[arg(long)]
        mission: String,

        /// RED_ALERT or STANDARD_OPS (default: the artifact's own classification)
        #[arg(long)]
        classification: Option<String>,
    },
}

pub async fn handle_command(command: ProofCommand) -> Result<()> {
    match command {
        ProofCommand::Check {
            worktree,
            mission,
            classification,
        } => check(worktree, mission, classification.unwrap_or_default()),
    }
}

fn check(worktree: PathBuf, mission: String, classification: String) -> Result<()> {
    let mission = MissionRef::new(mission, classification);
    let artifact = validate_mission_completion(&worktree, &mission)?;
    print_summary(&artifact);
    Ok(())
}

fn print_summary(artifact: &CompletionArtifact) {
    let proof = artifact.proof();
    println!(
        "{}",
        format!("✓ Completion proof accepted: {}", artifact.path.display()).green()
    );
    println!(
        "  classification: {}",
        artifact.field("classification").unwrap_or("-")
    );
    println!("  tests:        {}", proof.tests.len());
    println!("  commands:     {}", proof.commands.len());
    println!("  manual steps: {}", proof.manual_steps.len());
    println!("  diff refs:    {}", proof.diff_refs.len());
    for reference in &proof.diff_refs {
        println!("    {}", reference.dimmed());
    }
}
