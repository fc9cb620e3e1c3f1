// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Lifecycle tables, the protocol envelope, proof rules, session naming and
//! the collaborator traits the application services are written against.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and rules, no I/O

pub mod clock;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod path_sanitizer;
pub mod proof;
pub mod protocol;
pub mod repository;
pub mod runtime;
pub mod session;
