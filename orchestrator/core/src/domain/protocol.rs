// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Coordination Protocol Envelope
//!
//! Typed events exchanged between the orchestrator and agent processes.
//! Events are immutable once persisted; ordering within a mission is the
//! event store's append order.
//!
//! | Event type | Extra requirements |
//! |------------|--------------------|
//! | `AGENT_CLAIM` | `ac_id`, `agent_id`, payload `claim_type` (or `claim`) in [`ClaimType`] |
//! | `GATE_RESULT` | none |
//! | `STATE_TRANSITION` | none |
//! | `REVIEW_COMPLETE` | payload `verdict` (or `decision`) in [`ReviewVerdict`] |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PROTOCOL_VERSION: &str = "sc3.protocol/v1";

pub const CLAIM_TYPE_KEYS: [&str; 2] = ["claim_type", "claim"];
pub const VERDICT_KEYS: [&str; 2] = ["verdict", "decision"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    AgentClaim,
    GateResult,
    StateTransition,
    ReviewComplete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentClaim => "AGENT_CLAIM",
            EventType::GateResult => "GATE_RESULT",
            EventType::StateTransition => "STATE_TRANSITION",
            EventType::ReviewComplete => "REVIEW_COMPLETE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ProtocolValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AGENT_CLAIM" => Ok(EventType::AgentClaim),
            "GATE_RESULT" => Ok(EventType::GateResult),
            "STATE_TRANSITION" => Ok(EventType::StateTransition),
            "REVIEW_COMPLETE" => Ok(EventType::ReviewComplete),
            _ => Err(ProtocolValidationError::UnsupportedEventType(s.to_string())),
        }
    }
}

/// Phase-completion signals an agent may assert for one AC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    RedComplete,
    GreenComplete,
    RefactorComplete,
    Blocked,
}

impl ClaimType {
    pub const ALL: [ClaimType; 4] = [
        ClaimType::RedComplete,
        ClaimType::GreenComplete,
        ClaimType::RefactorComplete,
        ClaimType::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::RedComplete => "RED_COMPLETE",
            ClaimType::GreenComplete => "GREEN_COMPLETE",
            ClaimType::RefactorComplete => "REFACTOR_COMPLETE",
            ClaimType::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimType {
    type Err = ProtocolValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        ClaimType::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ProtocolValidationError::UnsupportedClaimType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewVerdict {
    Approved,
    NeedsFixes,
}

impl ReviewVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewVerdict::Approved => "APPROVED",
            ReviewVerdict::NeedsFixes => "NEEDS_FIXES",
        }
    }
}

impl FromStr for ReviewVerdict {
    type Err = ProtocolValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => Ok(ReviewVerdict::Approved),
            "NEEDS_FIXES" => Ok(ReviewVerdict::NeedsFixes),
            _ => Err(ProtocolValidationError::UnsupportedVerdict(s.to_string())),
        }
    }
}

/// Rejections raised before an event reaches the store. Not transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolValidationError {
    #[error("unsupported protocol version '{found}' (expected '{expected}')")]
    UnsupportedVersion { found: String, expected: &'static str },
    #[error("unsupported event type '{0}'")]
    UnsupportedEventType(String),
    #[error("mission_id is required")]
    MissingMissionId,
    #[error("timestamp is required")]
    MissingTimestamp,
    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(String),
    #[error("{event_type} requires {field}")]
    MissingField { event_type: EventType, field: &'static str },
    #[error("unsupported claim type '{0}'")]
    UnsupportedClaimType(String),
    #[error("unsupported review verdict '{0}'")]
    UnsupportedVerdict(String),
}

/// Wire envelope for one coordination event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub mission_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
    /// `None` is filled with the publish time during normalization.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ProtocolEvent {
    pub fn new(event_type: EventType, mission_id: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            event_type,
            mission_id: mission_id.into(),
            ac_id: None,
            agent_id: None,
            payload: Value::Object(Map::new()),
            timestamp: None,
        }
    }

    pub fn agent_claim(
        mission_id: impl Into<String>,
        ac_id: impl Into<String>,
        agent_id: impl Into<String>,
        claim: ClaimType,
    ) -> Self {
        let mut event = Self::new(EventType::AgentClaim, mission_id);
        event.ac_id = Some(ac_id.into());
        event.agent_id = Some(agent_id.into());
        event.payload = serde_json::json!({ "claim_type": claim.as_str() });
        event
    }

    pub fn review_complete(mission_id: impl Into<String>, verdict: ReviewVerdict) -> Self {
        let mut event = Self::new(EventType::ReviewComplete, mission_id);
        event.payload = serde_json::json!({ "verdict": verdict.as_str() });
        event
    }

    pub fn gate_result(mission_id: impl Into<String>, ac_id: Option<String>, payload: Value) -> Self {
        let mut event = Self::new(EventType::GateResult, mission_id);
        event.ac_id = ac_id;
        event.payload = payload;
        event
    }

    pub fn state_transition(mission_id: impl Into<String>, payload: Value) -> Self {
        let mut event = Self::new(EventType::StateTransition, mission_id);
        event.payload = payload;
        event
    }

    pub fn with_ac(mut self, ac_id: impl Into<String>) -> Self {
        self.ac_id = Some(ac_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Replaces the payload with raw JSON text, rejecting malformed input.
    pub fn with_raw_payload(mut self, raw: &str) -> Result<Self, ProtocolValidationError> {
        self.payload = parse_payload(raw)?;
        Ok(self)
    }

    /// Claim type named in the payload, as written by the agent.
    pub fn payload_claim_type(&self) -> Option<&str> {
        payload_str(&self.payload, &CLAIM_TYPE_KEYS)
    }

    pub fn payload_verdict(&self) -> Option<&str> {
        payload_str(&self.payload, &VERDICT_KEYS)
    }

    /// Whether this event satisfies a wait for `claim_type` on `(mission_id, ac_id)`.
    ///
    /// Matches either an event whose type name equals the claim type, or an
    /// `AGENT_CLAIM` whose payload claim type equals it (case-insensitive).
    pub fn matches_claim(&self, mission_id: &str, ac_id: &str, claim_type: &str) -> bool {
        if self.mission_id != mission_id || self.ac_id.as_deref().unwrap_or("") != ac_id {
            return false;
        }
        if self.event_type.as_str().eq_ignore_ascii_case(claim_type) {
            return true;
        }
        self.event_type == EventType::AgentClaim
            && self
                .payload_claim_type()
                .is_some_and(|claim| claim.trim().eq_ignore_ascii_case(claim_type.trim()))
    }
}

/// Parses raw payload text; blank text becomes an empty object.
pub fn parse_payload(raw: &str) -> Result<Value, ProtocolValidationError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ProtocolValidationError::InvalidPayload(e.to_string()))
}

fn payload_str<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    let object = payload.as_object()?;
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .filter(|value| !value.trim().is_empty())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fills defaults: trims identifiers, protocol version, timestamp, empty payload.
pub fn normalize_event(mut event: ProtocolEvent, now: DateTime<Utc>) -> ProtocolEvent {
    event.protocol_version = event.protocol_version.trim().to_string();
    if event.protocol_version.is_empty() {
        event.protocol_version = PROTOCOL_VERSION.to_string();
    }
    event.mission_id = event.mission_id.trim().to_string();
    event.ac_id = trimmed(event.ac_id);
    event.agent_id = trimmed(event.agent_id);
    if event.timestamp.is_none() {
        event.timestamp = Some(now);
    }
    let empty = match &event.payload {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if empty {
        event.payload = Value::Object(Map::new());
    }
    event
}

/// Validates a normalized event and canonicalizes claim/verdict values to upper case.
pub fn validate_event(mut event: ProtocolEvent) -> Result<ProtocolEvent, ProtocolValidationError> {
    if event.protocol_version != PROTOCOL_VERSION {
        return Err(ProtocolValidationError::UnsupportedVersion {
            found: event.protocol_version,
            expected: PROTOCOL_VERSION,
        });
    }
    if event.mission_id.is_empty() {
        return Err(ProtocolValidationError::MissingMissionId);
    }
    if event.timestamp.is_none() {
        return Err(ProtocolValidationError::MissingTimestamp);
    }
    // A payload that arrived as a JSON string is re-parsed as the raw document.
    if let Value::String(raw) = &event.payload {
        event.payload = parse_payload(raw)?;
    }

    match event.event_type {
        EventType::AgentClaim => {
            if event.ac_id.is_none() {
                return Err(ProtocolValidationError::MissingField {
                    event_type: EventType::AgentClaim,
                    field: "ac_id",
                });
            }
            if event.agent_id.is_none() {
                return Err(ProtocolValidationError::MissingField {
                    event_type: EventType::AgentClaim,
                    field: "agent_id",
                });
            }
            let claim: ClaimType = event
                .payload_claim_type()
                .ok_or(ProtocolValidationError::MissingField {
                    event_type: EventType::AgentClaim,
                    field: "payload.claim_type",
                })?
                .parse()?;
            rewrite_payload_key(&mut event.payload, &CLAIM_TYPE_KEYS, claim.as_str());
        }
        EventType::ReviewComplete => {
            let verdict: ReviewVerdict = event
                .payload_verdict()
                .ok_or(ProtocolValidationError::MissingField {
                    event_type: EventType::ReviewComplete,
                    field: "payload.verdict",
                })?
                .parse()?;
            rewrite_payload_key(&mut event.payload, &VERDICT_KEYS, verdict.as_str());
        }
        EventType::GateResult | EventType::StateTransition => {}
    }

    Ok(event)
}

fn rewrite_payload_key(payload: &mut Value, keys: &[&str], canonical: &str) {
    if let Some(object) = payload.as_object_mut() {
        for key in keys {
            if let Some(slot) = object.get_mut(*key) {
                if slot.is_string() {
                    *slot = Value::String(canonical.to_string());
                    return;
                }
            }
        }
    }
}
