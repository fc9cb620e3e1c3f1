// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Durable Store Interfaces
//!
//! Persistence contracts consumed by the core, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Backs | Implementations |
//! |-------|-------|-----------------|
//! | `Persister` | Lifecycle state + audit comments | `InMemoryPersister`, `JsonFilePersister` |
//! | `EventStore` | Append-only protocol events | `InMemoryEventStore`, `JsonlEventStore` |
//!
//! Both stores are assumed safe for concurrent use by many orchestrator
//! workers; the core adds no locking around them.

use async_trait::async_trait;
use crate::domain::protocol::ProtocolEvent;

#[async_trait]
pub trait Persister: Send + Sync {
    async fn set_state(&self, entity_id: &str, key: &str, value: &str) -> Result<(), RepositoryError>;

    async fn add_comment(&self, entity_id: &str, text: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &ProtocolEvent) -> Result<(), RepositoryError>;

    /// Events for one mission in append order.
    async fn list_by_mission(&self, mission_id: &str) -> Result<Vec<ProtocolEvent>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store rejected write: {0}")]
    Rejected(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
