// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod artifact;
pub mod protocol_service;
pub mod session_manager;
pub mod state_machine;

pub use artifact::{validate_mission_completion, ArtifactError, CompletionArtifact};
pub use protocol_service::{ProtocolError, ProtocolEventService};
pub use session_manager::{SessionError, SessionManager, TerminationOutcome};
pub use state_machine::{LifecycleStateMachine, TransitionError};
