// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Store adapters for `Persister` and `EventStore`.
//!
//! - `InMemoryPersister` / `InMemoryEventStore`: process-local, used by tests
//!   and dry runs; both record what they were asked to do.
//! - `JsonFilePersister`: one JSON document, rewritten through a temp file.
//! - `JsonlEventStore`: append-only JSON lines, one envelope per line.

use crate::domain::protocol::ProtocolEvent;
use crate::domain::repository::{EventStore, Persister, RepositoryError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

/// One call observed by `InMemoryPersister`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersisterCall {
    SetState { entity_id: String, key: String, value: String },
    AddComment { entity_id: String, text: String },
}

#[derive(Clone, Default)]
pub struct InMemoryPersister {
    calls: Arc<Mutex<Vec<PersisterCall>>>,
    states: Arc<Mutex<BTreeMap<String, BTreeMap<String, String>>>>,
    fail_set_state: Arc<AtomicBool>,
    fail_add_comment: Arc<AtomicBool>,
}

impl InMemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful calls in the order they were made.
    pub fn calls(&self) -> Vec<PersisterCall> {
        self.calls.lock().clone()
    }

    pub fn state(&self, entity_id: &str, key: &str) -> Option<String> {
        self.states.lock().get(entity_id).and_then(|keys| keys.get(key).cloned())
    }

    pub fn comments(&self, entity_id: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PersisterCall::AddComment { entity_id: id, text } if id == entity_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn fail_set_state(&self, fail: bool) {
        self.fail_set_state.store(fail, Ordering::SeqCst);
    }

    pub fn fail_add_comment(&self, fail: bool) {
        self.fail_add_comment.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Persister for InMemoryPersister {
    async fn set_state(&self, entity_id: &str, key: &str, value: &str) -> Result<(), RepositoryError> {
        if self.fail_set_state.load(Ordering::SeqCst) {
            return Err(RepositoryError::Rejected(format!("set_state {entity_id}")));
        }
        self.states
            .lock()
            .entry(entity_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.calls.lock().push(PersisterCall::SetState {
            entity_id: entity_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn add_comment(&self, entity_id: &str, text: &str) -> Result<(), RepositoryError> {
        if self.fail_add_comment.load(Ordering::SeqCst) {
            return Err(RepositoryError::Rejected(format!("add_comment {entity_id}")));
        }
        self.calls.lock().push(PersisterCall::AddComment {
            entity_id: entity_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<Mutex<Vec<ProtocolEvent>>>,
    fail_appends: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &ProtocolEvent) -> Result<(), RepositoryError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Rejected(format!("append for mission {}", event.mission_id)));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn list_by_mission(&self, mission_id: &str) -> Result<Vec<ProtocolEvent>, RepositoryError> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|event| event.mission_id == mission_id)
            .cloned()
            .collect())
    }
}

/// Append-only JSON-lines event log.
pub struct JsonlEventStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventStore for JsonlEventStore {
    async fn append(&self, event: &ProtocolEvent) -> Result<(), RepositoryError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;
        // A writer that died mid-line leaves no trailing newline; start a fresh
        // line so this event stays readable.
        if file.metadata().await?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(std::io::SeekFrom::End(-1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                line.insert(0, '\n');
            }
        }
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list_by_mission(&self, mission_id: &str) -> Result<Vec<ProtocolEvent>, RepositoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        let mut skipped = 0usize;
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: ProtocolEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    skipped += 1;
                    warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable event log line"
                    );
                    continue;
                }
            };
            if event.mission_id == mission_id {
                events.push(event);
            }
        }
        if skipped > 0 {
            warn!(path = %self.path.display(), skipped, "Event log contains unreadable lines");
        }
        Ok(events)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    entities: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    comments: Vec<CommentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentEntry {
    pub entity_id: String,
    pub text: String,
}

/// Entity state and audit comments kept in a single JSON document.
pub struct JsonFilePersister {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFilePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn state(&self, entity_id: &str, key: &str) -> Result<Option<String>, RepositoryError> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(doc.entities.get(entity_id).and_then(|keys| keys.get(key).cloned()))
    }

    pub async fn comments(&self, entity_id: &str) -> Result<Vec<String>, RepositoryError> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(doc
            .comments
            .into_iter()
            .filter(|c| c.entity_id == entity_id)
            .map(|c| c.text)
            .collect())
    }

    async fn load(&self) -> Result<StateDocument, RepositoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StateDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, doc: &StateDocument) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut StateDocument) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        apply(&mut doc);
        self.store(&doc).await
    }
}

#[async_trait]
impl Persister for JsonFilePersister {
    async fn set_state(&self, entity_id: &str, key: &str, value: &str) -> Result<(), RepositoryError> {
        self.update(|doc| {
            doc.entities
                .entry(entity_id.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn add_comment(&self, entity_id: &str, text: &str) -> Result<(), RepositoryError> {
        self.update(|doc| {
            doc.comments.push(CommentEntry {
                entity_id: entity_id.to_string(),
                text: text.to_string(),
            });
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::ClaimType;

    #[tokio::test]
    async fn test_jsonl_store_survives_torn_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let store = JsonlEventStore::new(&path);

        store
            .append(&ProtocolEvent::agent_claim("M-1", "AC-1", "a", ClaimType::RedComplete))
            .await
            .unwrap();
        // Half-written append from a crashed agent.
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str(r#"{"type":"AGENT_CLAIM","mission_id":"M-1","ac_"#);
        std::fs::write(&path, content).unwrap();

        let events = store.list_by_mission("M-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].agent_id.as_deref(), Some("a"));

        store
            .append(&ProtocolEvent::agent_claim("M-1", "AC-1", "b", ClaimType::GreenComplete))
            .await
            .unwrap();
        let events = store.list_by_mission("M-1").await.unwrap();
        let agents: Vec<_> = events.iter().filter_map(|e| e.agent_id.as_deref()).collect();
        assert_eq!(agents, vec!["a", "b"]);
        assert!(store.list_by_mission("M-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_store_keeps_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::new(dir.path().join("nested").join("events.jsonl"));

        assert!(store.list_by_mission("M-1").await.unwrap().is_empty());

        for (mission, agent) in [("M-1", "a"), ("M-2", "b"), ("M-1", "c")] {
            let event = ProtocolEvent::agent_claim(mission, "AC-1", agent, ClaimType::RedComplete)
                .with_timestamp(chrono::Utc::now());
            store.append(&event).await.unwrap();
        }

        let events = store.list_by_mission("M-1").await.unwrap();
        let agents: Vec<_> = events.iter().filter_map(|e| e.agent_id.as_deref()).collect();
        assert_eq!(agents, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_jsonl_store_reports_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        let store = JsonlEventStore::new(&path);
        let err = store.list_by_mission("M-1").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Serialization(msg) if msg.contains(":1:")));
    }

    #[tokio::test]
    async fn test_json_file_persister_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let persister = JsonFilePersister::new(dir.path().join("state.json"));

        persister.set_state("M-1", "mission_state", "in_progress").await.unwrap();
        persister.add_comment("M-1", "actor=orchestrator reason=\"dispatch\"").await.unwrap();
        persister.set_state("M-1", "mission_state", "review").await.unwrap();

        let reopened = JsonFilePersister::new(dir.path().join("state.json"));
        assert_eq!(
            reopened.state("M-1", "mission_state").await.unwrap().as_deref(),
            Some("review")
        );
        assert_eq!(reopened.comments("M-1").await.unwrap().len(), 1);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_in_memory_persister_failure_injection() {
        let persister = InMemoryPersister::new();
        persister.fail_add_comment(true);

        persister.set_state("A-1", "agent_state", "spawning").await.unwrap();
        assert!(persister.add_comment("A-1", "x").await.is_err());
        assert_eq!(persister.calls().len(), 1);
        assert_eq!(persister.state("A-1", "agent_state").as_deref(), Some("spawning"));
    }
}
