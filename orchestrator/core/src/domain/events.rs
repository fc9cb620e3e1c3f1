// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::domain::session::SessionName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Raised when a claim was not observed within its timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuckAlert {
    pub mission_id: String,
    pub ac_id: String,
    pub claim_type: String,
    pub timeout_ms: u64,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    SessionCreated {
        session: SessionName,
        workdir: String,
        created_at: DateTime<Utc>,
    },
    SessionKilled {
        session: SessionName,
        killed_at: DateTime<Utc>,
    },
    /// Streaming observed the session disappear without being asked to stop.
    SessionEnded {
        session: SessionName,
        severity: Severity,
        ended_at: DateTime<Utc>,
    },
    ProcessTerminated {
        session: SessionName,
        pid: u32,
        forced: bool,
        terminated_at: DateTime<Utc>,
    },
}
