// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! SC3 CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers wiring the core to concrete adapters

pub mod commands;
