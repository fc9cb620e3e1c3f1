// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! SC3 orchestration core
//!
//! Lifecycle state machine, claim protocol, agent session supervision and
//! completion-proof validation.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Coordination primitives shared by the CLI and embedders

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
