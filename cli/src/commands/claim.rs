// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Claim protocol commands
//!
//! Commands: publish, wait, log

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sc3_core::application::protocol_service::{ProtocolError, ProtocolEventService};
use sc3_core::domain::config::Sc3Config;
use sc3_core::domain::protocol::{parse_payload, ClaimType, ProtocolEvent, CLAIM_TYPE_KEYS};
use sc3_core::infrastructure::event_bus::EventBus;
use sc3_core::infrastructure::repositories::JsonlEventStore;

use super::{load_config, parse_duration};

#[derive(Subcommand)]
pub enum ClaimCommand {
    /// Publish an AGENT_CLAIM event
    Publish {
        #[arg(long)]
        mission: String,

        #[arg(long)]
        ac: String,

        #[arg(long)]
        agent: String,

        /// RED_COMPLETE, GREEN_COMPLETE, REFACTOR_COMPLETE or BLOCKED
        #[arg(long)]
        claim: String,

        /// Extra JSON payload fields
        #[arg(long, value_name = "JSON")]
        payload: Option<String>,
    },

    /// Block until a claim is observed
    Wait {
        #[arg(long)]
        mission: String,

        #[arg(long)]
        ac: String,

        #[arg(long)]
        claim: String,

        /// How long to wait (default: spec.protocol.claim_timeout)
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Print every event recorded for a mission
    Log {
        #[arg(long)]
        mission: String,
    },
}

fn service(config: &Sc3Config) -> ProtocolEventService {
    let store = Arc::new(JsonlEventStore::new(&config.spec.protocol.event_log));
    ProtocolEventService::new(store, EventBus::with_default_capacity(), config.spec.protocol.clone())
}

pub async fn handle_command(
    command: ClaimCommand,
    config_override: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = load_config(config_override)?;
    let svc = service(&config);

    match command {
        ClaimCommand::Publish {
            mission,
            ac,
            agent,
            claim,
            payload,
        } => publish(&svc, cancel, mission, ac, agent, &claim, payload.as_deref()).await,
        ClaimCommand::Wait {
            mission,
            ac,
            claim,
            timeout,
        } => wait(&svc, cancel, &mission, &ac, &claim, timeout.unwrap_or(Duration::ZERO)).await,
        ClaimCommand::Log { mission } => log(&svc, cancel, &mission).await,
    }
}

/// Builds the claim payload, letting `--claim` win over any claim key in `extra`.
fn claim_payload(claim: ClaimType, extra: Option<&str>) -> Result<Value> {
    let mut payload = match extra {
        Some(raw) => parse_payload(raw)?,
        None => Value::Object(Default::default()),
    };
    let object = payload
        .as_object_mut()
        .context("--payload must be a JSON object")?;
    for key in CLAIM_TYPE_KEYS {
        object.remove(key);
    }
    object.insert(CLAIM_TYPE_KEYS[0].to_string(), Value::String(claim.as_str().to_string()));
    Ok(payload)
}

async fn publish(
    svc: &ProtocolEventService,
    cancel: &CancellationToken,
    mission: String,
    ac: String,
    agent: String,
    claim: &str,
    extra: Option<&str>,
) -> Result<()> {
    let claim: ClaimType = claim.parse()?;
    let mut event = ProtocolEvent::agent_claim(mission, ac, agent, claim);
    event.payload = claim_payload(claim, extra)?;

    let published = svc.publish(cancel, event).await?;
    println!("{}", serde_json::to_string(&published)?);
    Ok(())
}

async fn wait(
    svc: &ProtocolEventService,
    cancel: &CancellationToken,
    mission: &str,
    ac: &str,
    claim: &str,
    timeout: Duration,
) -> Result<()> {
    match svc.wait_for_claim(cancel, mission, ac, claim, timeout).await {
        Ok(event) => {
            println!("{}", serde_json::to_string(&event)?);
            Ok(())
        }
        Err(err @ ProtocolError::ClaimTimeout { .. }) => {
            eprintln!("{}", format!("✗ {err}").red());
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn log(svc: &ProtocolEventService, cancel: &CancellationToken, mission: &str) -> Result<()> {
    let events = svc.events_for_mission(cancel, mission).await?;
    if events.is_empty() {
        println!("{}", format!("No events recorded for {mission}").dimmed());
    }
    for event in events {
        let when = event.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
        let detail = event
            .payload_claim_type()
            .or_else(|| event.payload_verdict())
            .unwrap_or("");
        println!(
            "{} {} ac={} agent={} {}",
            when.dimmed(),
            event.event_type.to_string().bold(),
            event.ac_id.as_deref().unwrap_or("-"),
            event.agent_id.as_deref().unwrap_or("-"),
            detail
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_flag_overrides_payload() {
        let payload = claim_payload(ClaimType::Blocked, Some(r#"{"claim":"GREEN_COMPLETE","why":"flaky ci"}"#)).unwrap();
        assert_eq!(payload["claim_type"], "BLOCKED");
        assert!(payload.get("claim").is_none());
        assert_eq!(payload["why"], "flaky ci");
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(claim_payload(ClaimType::Blocked, Some("[1,2]")).is_err());
        assert!(claim_payload(ClaimType::Blocked, Some("{")).is_err());
    }
}
