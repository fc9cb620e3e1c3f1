// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Completion Proof Rules
//!
//! Decides whether the evidence extracted from a mission's completion artifact
//! is sufficient for the mission's classification. A failure here blocks the
//! mission's `Done` transition; it never aborts the run.
//!
//! | Classification | Required evidence |
//! |----------------|-------------------|
//! | `RED_ALERT` | tests AND (commands OR diff refs) |
//! | `STANDARD_OPS` | commands OR manual steps OR diff refs |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    RedAlert,
    StandardOps,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::RedAlert => "RED_ALERT",
            Classification::StandardOps => "STANDARD_OPS",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RED_ALERT" => Ok(Classification::RedAlert),
            "STANDARD_OPS" => Ok(Classification::StandardOps),
            _ => Err(()),
        }
    }
}

/// The mission under validation. Classification stays textual so unknown
/// tiers are reported rather than rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionRef {
    pub id: String,
    pub classification: String,
}

impl MissionRef {
    pub fn new(id: impl Into<String>, classification: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            classification: classification.into(),
        }
    }
}

/// Evidence sections of a completion artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub manual_steps: Vec<String>,
    #[serde(default)]
    pub diff_refs: Vec<String>,
}

impl Proof {
    /// Trims every entry and drops blanks.
    pub fn normalized(&self) -> Proof {
        Proof {
            tests: normalize_list(&self.tests),
            commands: normalize_list(&self.commands),
            manual_steps: normalize_list(&self.manual_steps),
            diff_refs: normalize_list(&self.diff_refs),
        }
    }
}

pub fn normalize_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// What was missing, for callers that branch without parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofRequirement {
    MissionId,
    Classification,
    UnsupportedClassification,
    Tests,
    CommandsOrDiffRefs,
    AnyEvidence,
}

impl ProofRequirement {
    pub fn reason(&self) -> &'static str {
        match self {
            ProofRequirement::MissionId => "mission id is required",
            ProofRequirement::Classification => "classification is required",
            ProofRequirement::UnsupportedClassification => "unsupported classification",
            ProofRequirement::Tests => "RED_ALERT requires tests",
            ProofRequirement::CommandsOrDiffRefs => "RED_ALERT requires commands or diff_refs in addition to tests",
            ProofRequirement::AnyEvidence => "STANDARD_OPS requires commands, manual_steps, or diff_refs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mission {mission_id} ({classification}) proof rejected: {reason}")]
pub struct ProofValidationError {
    pub mission_id: String,
    pub classification: String,
    pub reason: String,
    pub requirement: ProofRequirement,
}

impl ProofValidationError {
    fn new(mission: &MissionRef, requirement: ProofRequirement) -> Self {
        Self {
            mission_id: mission.id.trim().to_string(),
            classification: mission.classification.trim().to_string(),
            reason: requirement.reason().to_string(),
            requirement,
        }
    }
}

pub fn validate_classification_proof(mission: &MissionRef, proof: &Proof) -> Result<(), ProofValidationError> {
    if mission.id.trim().is_empty() {
        return Err(ProofValidationError::new(mission, ProofRequirement::MissionId));
    }
    if mission.classification.trim().is_empty() {
        return Err(ProofValidationError::new(mission, ProofRequirement::Classification));
    }
    let classification: Classification = mission
        .classification
        .parse()
        .map_err(|_| ProofValidationError::new(mission, ProofRequirement::UnsupportedClassification))?;

    let proof = proof.normalized();
    let has_tests = !proof.tests.is_empty();
    let has_commands = !proof.commands.is_empty();
    let has_manual = !proof.manual_steps.is_empty();
    let has_diff_refs = !proof.diff_refs.is_empty();

    match classification {
        Classification::RedAlert => {
            if !has_tests {
                return Err(ProofValidationError::new(mission, ProofRequirement::Tests));
            }
            if !has_commands && !has_diff_refs {
                return Err(ProofValidationError::new(mission, ProofRequirement::CommandsOrDiffRefs));
            }
        }
        Classification::StandardOps => {
            if !has_commands && !has_manual && !has_diff_refs {
                return Err(ProofValidationError::new(mission, ProofRequirement::AnyEvidence));
            }
        }
    }
    Ok(())
}
