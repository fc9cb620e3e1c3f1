// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Entity Lifecycles
//!
//! Fixed forward-only state graphs for the four tracked entity types.
//!
//! | Entity | States |
//! |--------|--------|
//! | Commission | Planning → Approved → Executing → Completed |
//! | Mission | Backlog → InProgress → Review → Approved → Done |
//! | AC | Red → VerifyRed → Green → VerifyGreen → Refactor → VerifyRefactor → Complete |
//! | Agent | Idle → Spawning → Running → Stuck → Done |
//!
//! Only the single adjacent forward edge out of each state is legal. Retries and
//! compensation are expressed by callers as fresh forward transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reason attached to every [`IllegalTransitionError`].
pub const ILLEGAL_TRANSITION_REASON: &str = "illegal transition for entity lifecycle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Commission,
    Mission,
    #[serde(rename = "ac")]
    AcceptanceCriterion,
    Agent,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Commission,
        EntityType::Mission,
        EntityType::AcceptanceCriterion,
        EntityType::Agent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Commission => "commission",
            EntityType::Mission => "mission",
            EntityType::AcceptanceCriterion => "ac",
            EntityType::Agent => "agent",
        }
    }

    /// Key under which the durable store keeps this entity's current state.
    pub fn state_key(&self) -> String {
        format!("{}_state", self.as_str())
    }

    /// Every state of this entity type in lifecycle order.
    pub fn states(&self) -> Vec<LifecycleState> {
        match self {
            EntityType::Commission => CommissionState::ORDER.iter().copied().map(LifecycleState::Commission).collect(),
            EntityType::Mission => MissionState::ORDER.iter().copied().map(LifecycleState::Mission).collect(),
            EntityType::AcceptanceCriterion => AcState::ORDER.iter().copied().map(LifecycleState::Ac).collect(),
            EntityType::Agent => AgentState::ORDER.iter().copied().map(LifecycleState::Agent).collect(),
        }
    }

    pub fn initial_state(&self) -> LifecycleState {
        match self {
            EntityType::Commission => LifecycleState::Commission(CommissionState::initial()),
            EntityType::Mission => LifecycleState::Mission(MissionState::initial()),
            EntityType::AcceptanceCriterion => LifecycleState::Ac(AcState::initial()),
            EntityType::Agent => LifecycleState::Agent(AgentState::initial()),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = UnknownLifecycleValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "commission" | "directive" => Ok(EntityType::Commission),
            "mission" => Ok(EntityType::Mission),
            "ac" | "acceptance_criterion" | "acceptancecriterion" => Ok(EntityType::AcceptanceCriterion),
            "agent" => Ok(EntityType::Agent),
            _ => Err(UnknownLifecycleValue::EntityType(s.to_string())),
        }
    }
}

/// Parse failure for entity types and states coming from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnknownLifecycleValue {
    #[error("unknown entity type '{0}'")]
    EntityType(String),
    #[error("unknown {entity_type} state '{value}'")]
    State { entity_type: EntityType, value: String },
}

/// Generates a per-entity state enum with its ordered table and text forms.
macro_rules! lifecycle_states {
    ($(#[$meta:meta])* $name:ident ($entity:expr) { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ORDER: &'static [$name] = &[$($name::$variant),+];

            pub fn initial() -> $name {
                Self::ORDER[0]
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// The only legal successor, or `None` for the terminal state.
            pub fn next(&self) -> Option<$name> {
                let idx = Self::ORDER.iter().position(|s| s == self)?;
                Self::ORDER.get(idx + 1).copied()
            }

            pub fn is_terminal(&self) -> bool {
                self.next().is_none()
            }

            fn parse(s: &str) -> Option<$name> {
                let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
                Self::ORDER.iter().copied().find(|state| {
                    state.as_str() == wanted || state.as_str().replace('_', "") == wanted
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLifecycleValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s).ok_or_else(|| UnknownLifecycleValue::State {
                    entity_type: $entity,
                    value: s.to_string(),
                })
            }
        }
    };
}

lifecycle_states!(
    /// Top-level unit of human-approved work.
    CommissionState (EntityType::Commission) {
        Planning => "planning",
        Approved => "approved",
        Executing => "executing",
        Completed => "completed",
    }
);

lifecycle_states!(
    MissionState (EntityType::Mission) {
        Backlog => "backlog",
        InProgress => "in_progress",
        Review => "review",
        Approved => "approved",
        Done => "done",
    }
);

lifecycle_states!(
    /// Red/green/refactor verification pipeline of one acceptance criterion.
    AcState (EntityType::AcceptanceCriterion) {
        Red => "red",
        VerifyRed => "verify_red",
        Green => "green",
        VerifyGreen => "verify_green",
        Refactor => "refactor",
        VerifyRefactor => "verify_refactor",
        Complete => "complete",
    }
);

lifecycle_states!(
    AgentState (EntityType::Agent) {
        Idle => "idle",
        Spawning => "spawning",
        Running => "running",
        Stuck => "stuck",
        Done => "done",
    }
);

/// A state tagged with the entity type it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Commission(CommissionState),
    Mission(MissionState),
    #[serde(rename = "ac")]
    Ac(AcState),
    Agent(AgentState),
}

impl LifecycleState {
    pub fn entity_type(&self) -> EntityType {
        match self {
            LifecycleState::Commission(_) => EntityType::Commission,
            LifecycleState::Mission(_) => EntityType::Mission,
            LifecycleState::Ac(_) => EntityType::AcceptanceCriterion,
            LifecycleState::Agent(_) => EntityType::Agent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Commission(s) => s.as_str(),
            LifecycleState::Mission(s) => s.as_str(),
            LifecycleState::Ac(s) => s.as_str(),
            LifecycleState::Agent(s) => s.as_str(),
        }
    }

    pub fn next(&self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Commission(s) => s.next().map(LifecycleState::Commission),
            LifecycleState::Mission(s) => s.next().map(LifecycleState::Mission),
            LifecycleState::Ac(s) => s.next().map(LifecycleState::Ac),
            LifecycleState::Agent(s) => s.next().map(LifecycleState::Agent),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    /// Parses a state name in the context of an entity type.
    pub fn parse(entity_type: EntityType, value: &str) -> Result<Self, UnknownLifecycleValue> {
        let parsed = match entity_type {
            EntityType::Commission => CommissionState::parse(value).map(LifecycleState::Commission),
            EntityType::Mission => MissionState::parse(value).map(LifecycleState::Mission),
            EntityType::AcceptanceCriterion => AcState::parse(value).map(LifecycleState::Ac),
            EntityType::Agent => AgentState::parse(value).map(LifecycleState::Agent),
        };
        parsed.ok_or_else(|| UnknownLifecycleValue::State {
            entity_type,
            value: value.to_string(),
        })
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CommissionState> for LifecycleState {
    fn from(s: CommissionState) -> Self {
        LifecycleState::Commission(s)
    }
}

impl From<MissionState> for LifecycleState {
    fn from(s: MissionState) -> Self {
        LifecycleState::Mission(s)
    }
}

impl From<AcState> for LifecycleState {
    fn from(s: AcState) -> Self {
        LifecycleState::Ac(s)
    }
}

impl From<AgentState> for LifecycleState {
    fn from(s: AgentState) -> Self {
        LifecycleState::Agent(s)
    }
}

/// Checks `(entity_type, from, to)` against the edge table.
///
/// Both states must belong to `entity_type` and `to` must be exactly the
/// successor of `from`.
pub fn is_legal_transition(entity_type: EntityType, from: LifecycleState, to: LifecycleState) -> bool {
    from.entity_type() == entity_type
        && to.entity_type() == entity_type
        && from.next() == Some(to)
}

/// A rejected state change. Never retried by the machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {entity_type} {entity_id} {from_state} -> {to_state}")]
pub struct IllegalTransitionError {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub from_state: LifecycleState,
    pub to_state: LifecycleState,
    pub reason: &'static str,
}

impl IllegalTransitionError {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>, from: LifecycleState, to: LifecycleState) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            from_state: from,
            to_state: to,
            reason: ILLEGAL_TRANSITION_REASON,
        }
    }
}

/// Audit record of one successful transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub from_state: LifecycleState,
    pub to_state: LifecycleState,
    pub actor: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl TransitionRecord {
    /// Comment text persisted alongside the state change.
    ///
    /// `actor=` and `reason="..."` are matched by downstream tooling; keep them stable.
    pub fn comment_text(&self) -> String {
        format!(
            "state transition {} {} -> {} actor={} reason=\"{}\" at={}",
            self.entity_type,
            self.from_state,
            self.to_state,
            self.actor,
            escape_quoted(&self.reason),
            self.timestamp.to_rfc3339(),
        )
    }
}

/// Backslash-escapes `\` and `"` so the quoted reason round-trips exactly.
fn escape_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_adjacent_edge_is_legal() {
        for entity_type in EntityType::ALL {
            let states = entity_type.states();
            for pair in states.windows(2) {
                assert!(
                    is_legal_transition(entity_type, pair[0], pair[1]),
                    "{} {} -> {} should be legal",
                    entity_type,
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn test_non_adjacent_pairs_are_illegal() {
        for entity_type in EntityType::ALL {
            let states = entity_type.states();
            for (i, from) in states.iter().enumerate() {
                for (j, to) in states.iter().enumerate() {
                    if j == i + 1 {
                        continue;
                    }
                    assert!(!is_legal_transition(entity_type, *from, *to));
                }
            }
        }
    }

    #[test]
    fn test_cross_entity_states_rejected() {
        assert!(!is_legal_transition(
            EntityType::Mission,
            LifecycleState::Agent(AgentState::Idle),
            LifecycleState::Agent(AgentState::Spawning),
        ));
        assert!(!is_legal_transition(
            EntityType::Mission,
            MissionState::Backlog.into(),
            AgentState::Spawning.into(),
        ));
    }

    #[test]
    fn test_state_key() {
        assert_eq!(EntityType::Mission.state_key(), "mission_state");
        assert_eq!(EntityType::AcceptanceCriterion.state_key(), "ac_state");
    }

    #[test]
    fn test_parse_states() {
        assert_eq!(
            LifecycleState::parse(EntityType::Mission, "InProgress").unwrap(),
            LifecycleState::Mission(MissionState::InProgress)
        );
        assert_eq!(
            LifecycleState::parse(EntityType::AcceptanceCriterion, "verify-green").unwrap(),
            LifecycleState::Ac(AcState::VerifyGreen)
        );
        assert!(LifecycleState::parse(EntityType::Agent, "sleeping").is_err());
        assert_eq!("AC".parse::<EntityType>().unwrap(), EntityType::AcceptanceCriterion);
    }

    #[test]
    fn test_state_enums_from_str() {
        assert_eq!("verify_refactor".parse::<AcState>().unwrap(), AcState::VerifyRefactor);
        assert_eq!(AgentState::initial(), AgentState::Idle);
        assert_eq!(
            "paused".parse::<AgentState>().unwrap_err(),
            UnknownLifecycleValue::State {
                entity_type: EntityType::Agent,
                value: "paused".to_string(),
            }
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(MissionState::Done.is_terminal());
        assert!(AcState::Complete.is_terminal());
        assert!(!AgentState::Stuck.is_terminal());
    }

    #[test]
    fn test_comment_text_format() {
        let record = TransitionRecord {
            entity_type: EntityType::Mission,
            entity_id: "M-1".to_string(),
            from_state: MissionState::Backlog.into(),
            to_state: MissionState::InProgress.into(),
            actor: "orchestrator".to_string(),
            reason: "dispatch".to_string(),
            timestamp: Utc::now(),
        };
        let text = record.comment_text();
        assert!(text.contains("actor=orchestrator"));
        assert!(text.contains("reason=\"dispatch\""));
    }

    #[test]
    fn test_comment_reason_quotes_are_escaped() {
        let record = TransitionRecord {
            entity_type: EntityType::AcceptanceCriterion,
            entity_id: "AC-1".to_string(),
            from_state: AcState::Red.into(),
            to_state: AcState::VerifyRed.into(),
            actor: "planner".to_string(),
            reason: r#"said "go" \ retry"#.to_string(),
            timestamp: Utc::now(),
        };
        assert!(record.comment_text().contains(r#"reason="said \"go\" \\ retry""#));
    }
}
