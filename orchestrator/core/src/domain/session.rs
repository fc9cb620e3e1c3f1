// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Session names and streamed output chunks.
//!
//! A session name has the shape `sc3-<role>-<mission-id>`: lowercase,
//! hyphen-delimited, role without hyphens.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

pub const SESSION_PREFIX: &str = "sc3";

static SESSION_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sc3-([a-z0-9]+)-([a-z0-9]+(?:-[a-z0-9]+)*)$").expect("session name pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid session name '{0}': expected sc3-<role>-<mission-id>")]
pub struct InvalidSessionName(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    /// Builds a name from a role and mission id, lowercasing both.
    pub fn new(role: &str, mission_id: &str) -> Result<Self, InvalidSessionName> {
        let candidate = format!(
            "{}-{}-{}",
            SESSION_PREFIX,
            role.trim().to_ascii_lowercase(),
            mission_id.trim().to_ascii_lowercase().replace(['_', ' '], "-")
        );
        Self::parse(&candidate)
    }

    pub fn parse(name: &str) -> Result<Self, InvalidSessionName> {
        if SESSION_NAME_PATTERN.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(InvalidSessionName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn role(&self) -> &str {
        SESSION_NAME_PATTERN
            .captures(&self.0)
            .and_then(|c| c.get(1))
            .map_or("", |m| m.as_str())
    }

    pub fn mission_id(&self) -> &str {
        SESSION_NAME_PATTERN
            .captures(&self.0)
            .and_then(|c| c.get(2))
            .map_or("", |m| m.as_str())
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionName {
    type Error = InvalidSessionName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionName> for String {
    fn from(name: SessionName) -> Self {
        name.0
    }
}

/// Incremental pane output published while streaming a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub session: SessionName,
    pub content: String,
    pub truncated: bool,
    pub captured_at: DateTime<Utc>,
}

/// New output since `previous`.
///
/// When `current` extends `previous` the delta is the suffix; otherwise the
/// pane was cleared or scrolled past the capture window and the whole capture
/// is new.
pub fn pane_delta<'a>(previous: &str, current: &'a str) -> &'a str {
    match current.strip_prefix(previous) {
        Some(suffix) => suffix,
        None => current,
    }
}

/// Cuts `content` to at most `max_bytes`, on a char boundary.
pub fn truncate_to_limit(content: &str, max_bytes: usize) -> (String, bool) {
    if content.len() <= max_bytes {
        return (content.to_string(), false);
    }
    let mut end = max_bytes;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    (content[..end].to_string(), true)
}
