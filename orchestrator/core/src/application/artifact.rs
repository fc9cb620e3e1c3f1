// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Completion artifact reader.
//!
//! A mission closes with `<worktree>/.sc3/missions/<mission-id>/DEMO.md`: a
//! YAML front-matter block between `---` lines, then a markdown body whose
//! `### <Heading>` sections list the evidence. The reader checks the front
//! matter, confines every diff reference to the worktree and hands the
//! collected evidence to the proof validator.

use crate::domain::path_sanitizer::{PathSanitizer, PathSanitizerError};
use crate::domain::proof::{validate_classification_proof, MissionRef, Proof, ProofValidationError};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const ARTIFACT_DIR: &str = ".sc3/missions";
pub const ARTIFACT_FILE: &str = "DEMO.md";

/// Front-matter keys that must be present and non-blank.
pub const REQUIRED_FRONT_MATTER_KEYS: [&str; 6] =
    ["mission_id", "title", "classification", "status", "created_at", "agent_id"];

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("invalid mission id '{0}' for artifact lookup")]
    InvalidMissionId(String),

    #[error("completion artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read completion artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("completion artifact {} has no front matter block", .0.display())]
    MissingFrontMatter(PathBuf),

    #[error("invalid front matter: {0}")]
    FrontMatter(#[from] serde_yaml::Error),

    #[error("front matter key '{0}' is missing or blank")]
    MissingField(&'static str),

    #[error("artifact mission_id '{found}' does not match mission '{expected}'")]
    MissionMismatch { expected: String, found: String },

    #[error("diff reference '{reference}' rejected: {source}")]
    DiffRefRejected {
        reference: String,
        #[source]
        source: PathSanitizerError,
    },

    #[error("diff reference '{0}' does not name an existing file in the worktree")]
    DiffRefMissing(String),

    #[error(transparent)]
    Proof(#[from] ProofValidationError),
}

/// Parsed completion artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionArtifact {
    pub path: PathBuf,
    pub front_matter: BTreeMap<String, String>,
    pub sections: BTreeMap<String, Vec<String>>,
    /// Union of front-matter and body diff references, first occurrence wins.
    pub diff_refs: Vec<String>,
}

impl CompletionArtifact {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.front_matter.get(key).map(String::as_str)
    }

    pub fn section(&self, key: &str) -> &[String] {
        self.sections.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn proof(&self) -> Proof {
        Proof {
            tests: self.section("tests").to_vec(),
            commands: self.section("commands").to_vec(),
            manual_steps: self.section("manual_steps").to_vec(),
            diff_refs: self.diff_refs.clone(),
        }
        .normalized()
    }
}

/// Location of the artifact for `mission_id` under `worktree`.
pub fn artifact_path(worktree: &Path, mission_id: &str) -> Result<PathBuf, ArtifactError> {
    let id = mission_id.trim();
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        return Err(ArtifactError::InvalidMissionId(mission_id.to_string()));
    }
    Ok(worktree.join(ARTIFACT_DIR).join(id).join(ARTIFACT_FILE))
}

/// Splits `content` into its front-matter text and markdown body.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content.trim_start_matches('\u{feff}');
    let rest = rest.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

/// `Diff Refs` -> `diff_refs`.
fn section_key(heading: &str) -> String {
    heading
        .trim()
        .trim_end_matches(':')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Text of a bullet or numbered list item.
fn list_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        return Some(item);
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        return trimmed[digits..].strip_prefix(". ");
    }
    None
}

fn strip_code_span(item: &str) -> &str {
    let item = item.trim();
    item.strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .unwrap_or(item)
}

/// Collects list entries under each level-3 heading. Fenced lines count as
/// entries in the `commands` section.
fn parse_sections(body: &str) -> BTreeMap<String, Vec<String>> {
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            if current.as_deref() == Some("commands") && !trimmed.is_empty() {
                sections.entry("commands".to_string()).or_default().push(trimmed.to_string());
            }
            continue;
        }
        if let Some(heading) = trimmed.strip_prefix("### ") {
            let key = section_key(heading);
            sections.entry(key.clone()).or_default();
            current = Some(key);
            continue;
        }
        if trimmed.starts_with('#') {
            current = None;
            continue;
        }
        if let (Some(key), Some(item)) = (current.as_ref(), list_item(line)) {
            let item = strip_code_span(item);
            if !item.is_empty() {
                sections.entry(key.clone()).or_default().push(item.to_string());
            }
        }
    }
    sections
}

/// Parses artifact text without touching the filesystem.
pub fn parse_artifact(path: impl Into<PathBuf>, content: &str) -> Result<CompletionArtifact, ArtifactError> {
    let path = path.into();
    let Some((yaml, body)) = split_front_matter(content) else {
        return Err(ArtifactError::MissingFrontMatter(path));
    };

    let raw: BTreeMap<String, Value> = if yaml.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_yaml::from_str(yaml)?
    };

    let mut front_matter = BTreeMap::new();
    for (key, value) in &raw {
        if let Some(text) = scalar_text(value) {
            front_matter.insert(key.clone(), text);
        }
    }
    for key in REQUIRED_FRONT_MATTER_KEYS {
        if front_matter.get(key).is_none_or(|v| v.is_empty()) {
            return Err(ArtifactError::MissingField(key));
        }
    }

    let sections = parse_sections(body);

    let mut diff_refs: Vec<String> = Vec::new();
    let declared = raw.get("diff_refs").map(string_list).unwrap_or_default();
    for reference in declared.into_iter().chain(sections.get("diff_refs").cloned().unwrap_or_default()) {
        let reference = reference.trim().to_string();
        if !reference.is_empty() && !diff_refs.contains(&reference) {
            diff_refs.push(reference);
        }
    }

    Ok(CompletionArtifact {
        path,
        front_matter,
        sections,
        diff_refs,
    })
}

/// Reads and parses the artifact for `mission_id`.
pub fn read_artifact(worktree: &Path, mission_id: &str) -> Result<CompletionArtifact, ArtifactError> {
    let path = artifact_path(worktree, mission_id)?;
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ArtifactError::NotFound(path)),
        Err(source) => return Err(ArtifactError::Io { path, source }),
    };
    parse_artifact(path, &content)
}

/// Every diff reference must be a relative path to an existing file strictly
/// inside `worktree`. Lexical checks run before existence checks.
pub fn check_diff_refs(worktree: &Path, refs: &[String]) -> Result<(), ArtifactError> {
    let sanitizer = PathSanitizer::new();
    for reference in refs {
        let candidate = sanitizer
            .join_within(worktree, reference)
            .map_err(|source| ArtifactError::DiffRefRejected {
                reference: reference.clone(),
                source,
            })?;
        if !candidate.is_file() {
            return Err(ArtifactError::DiffRefMissing(reference.clone()));
        }
        sanitizer
            .ensure_contained(worktree, &candidate)
            .map_err(|source| ArtifactError::DiffRefRejected {
                reference: reference.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Reads the mission's artifact, checks it, and validates its proof against
/// the mission classification. A blank classification on `mission` falls back
/// to the artifact's own.
pub fn validate_mission_completion(worktree: &Path, mission: &MissionRef) -> Result<CompletionArtifact, ArtifactError> {
    let artifact = read_artifact(worktree, &mission.id)?;

    let declared = artifact.field("mission_id").unwrap_or_default();
    if declared != mission.id.trim() {
        warn!(expected = %mission.id, found = %declared, "Completion artifact belongs to another mission");
        return Err(ArtifactError::MissionMismatch {
            expected: mission.id.trim().to_string(),
            found: declared.to_string(),
        });
    }

    check_diff_refs(worktree, &artifact.diff_refs)?;

    let classification = if mission.classification.trim().is_empty() {
        artifact.field("classification").unwrap_or_default().to_string()
    } else {
        mission.classification.clone()
    };
    let proof = artifact.proof();
    validate_classification_proof(&MissionRef::new(mission.id.trim(), classification), &proof)?;

    debug!(
        mission_id = %mission.id,
        tests = proof.tests.len(),
        commands = proof.commands.len(),
        diff_refs = proof.diff_refs.len(),
        "Completion artifact accepted"
    );
    Ok(artifact)
}
