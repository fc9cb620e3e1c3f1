// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Protocol Event Service
//!
//! Persists coordination events and lets the orchestrator block until an
//! agent's claim shows up. Events reach the bus only after the store accepted
//! them. A claim that does not appear within its timeout raises a stuck alert.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrator/agent synchronization

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::config::ProtocolConfig;
use crate::domain::events::{Severity, StuckAlert};
use crate::domain::protocol::{normalize_event, validate_event, ProtocolEvent, ProtocolValidationError};
use crate::domain::repository::{EventStore, RepositoryError};
use crate::infrastructure::event_bus::EventBus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid protocol event: {0}")]
    Validation(#[from] ProtocolValidationError),

    #[error("{action} protocol events: {source}")]
    Store {
        action: &'static str,
        #[source]
        source: RepositoryError,
    },

    #[error("wait for claim timed out: mission={mission_id} ac={ac_id} claim={claim_type} after {timeout:?}")]
    ClaimTimeout {
        mission_id: String,
        ac_id: String,
        claim_type: String,
        timeout: Duration,
    },

    #[error("protocol operation cancelled")]
    Cancelled,
}

impl ProtocolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::ClaimTimeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProtocolError::Cancelled)
    }
}

pub struct ProtocolEventService {
    store: Arc<dyn EventStore>,
    event_bus: EventBus,
    config: ProtocolConfig,
    clock: Arc<dyn Clock>,
}

impl ProtocolEventService {
    pub fn new(store: Arc<dyn EventStore>, event_bus: EventBus, config: ProtocolConfig) -> Self {
        Self {
            store,
            event_bus,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Normalizes, validates and appends `event`, then notifies the bus.
    pub async fn publish(
        &self,
        cancel: &CancellationToken,
        event: ProtocolEvent,
    ) -> Result<ProtocolEvent, ProtocolError> {
        let event = validate_event(normalize_event(event, self.clock.now()))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProtocolError::Cancelled),
            appended = self.store.append(&event) => {
                appended.map_err(|source| ProtocolError::Store { action: "append", source })?;
            }
        }

        debug!(
            mission_id = %event.mission_id,
            event_type = %event.event_type,
            "Protocol event persisted"
        );
        self.event_bus.publish_protocol_event(event.clone());
        Ok(event)
    }

    /// Blocks until a matching claim exists for `(mission_id, ac_id)`.
    ///
    /// A zero `timeout` falls back to the configured claim timeout.
    pub async fn wait_for_claim(
        &self,
        cancel: &CancellationToken,
        mission_id: &str,
        ac_id: &str,
        claim_type: &str,
        timeout: Duration,
    ) -> Result<ProtocolEvent, ProtocolError> {
        let mission_id = mission_id.trim();
        let ac_id = ac_id.trim();
        let claim_type = claim_type.trim();
        let timeout = if timeout.is_zero() { self.config.claim_timeout } else { timeout };

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        if let Some(found) = self.find_claim(cancel, mission_id, ac_id, claim_type).await? {
            return Ok(found);
        }

        let poll = self.config.effective_poll_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(mission_id = %mission_id, ac_id = %ac_id, "Claim wait cancelled");
                    return Err(ProtocolError::Cancelled);
                }
                _ = &mut deadline => {
                    self.raise_stuck_alert(mission_id, ac_id, claim_type, timeout);
                    return Err(ProtocolError::ClaimTimeout {
                        mission_id: mission_id.to_string(),
                        ac_id: ac_id.to_string(),
                        claim_type: claim_type.to_string(),
                        timeout,
                    });
                }
                _ = ticker.tick() => {
                    if let Some(found) = self.find_claim(cancel, mission_id, ac_id, claim_type).await? {
                        info!(
                            mission_id = %mission_id,
                            ac_id = %ac_id,
                            claim_type = %claim_type,
                            "Claim observed"
                        );
                        return Ok(found);
                    }
                }
            }
        }
    }

    /// Events of one mission in append order.
    pub async fn events_for_mission(
        &self,
        cancel: &CancellationToken,
        mission_id: &str,
    ) -> Result<Vec<ProtocolEvent>, ProtocolError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProtocolError::Cancelled),
            listed = self.store.list_by_mission(mission_id.trim()) => {
                listed.map_err(|source| ProtocolError::Store { action: "list", source })
            }
        }
    }

    async fn find_claim(
        &self,
        cancel: &CancellationToken,
        mission_id: &str,
        ac_id: &str,
        claim_type: &str,
    ) -> Result<Option<ProtocolEvent>, ProtocolError> {
        let events = self.events_for_mission(cancel, mission_id).await?;
        // Newest first: a later claim wins over earlier duplicates.
        Ok(events
            .into_iter()
            .rev()
            .find(|event| event.matches_claim(mission_id, ac_id, claim_type)))
    }

    fn raise_stuck_alert(&self, mission_id: &str, ac_id: &str, claim_type: &str, timeout: Duration) {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        error!(
            mission_id = %mission_id,
            ac_id = %ac_id,
            claim_type = %claim_type,
            timeout_ms,
            "Claim not observed before timeout; agent may be stuck"
        );
        metrics::counter!("sc3_stuck_alerts_total").increment(1);
        self.event_bus.publish_stuck_alert(StuckAlert {
            mission_id: mission_id.to_string(),
            ac_id: ac_id.to_string(),
            claim_type: claim_type.to_string(),
            timeout_ms,
            severity: Severity::Error,
            raised_at: self.clock.now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::{ClaimType, EventType, ReviewVerdict};
    use crate::infrastructure::event_bus::DomainEvent;
    use crate::infrastructure::repositories::InMemoryEventStore;

    fn service(store: Arc<InMemoryEventStore>, bus: EventBus) -> ProtocolEventService {
        let config = ProtocolConfig {
            poll_interval: Duration::from_millis(10),
            ..ProtocolConfig::default()
        };
        ProtocolEventService::new(store, bus, config)
    }

    #[tokio::test]
    async fn test_publish_normalizes_and_notifies() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let svc = service(store.clone(), bus);

        let mut event = ProtocolEvent::review_complete(" M-1 ", ReviewVerdict::Approved);
        event.payload = serde_json::json!({ "decision": "needs_fixes" });
        let published = svc.publish(&CancellationToken::new(), event).await.unwrap();

        assert_eq!(published.mission_id, "M-1");
        assert!(published.timestamp.is_some());
        assert_eq!(published.payload_verdict(), Some("NEEDS_FIXES"));
        assert_eq!(store.len(), 1);
        match rx.recv().await.unwrap() {
            DomainEvent::Protocol(e) => assert_eq!(e.event_type, EventType::ReviewComplete),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_event_is_not_stored() {
        let store = Arc::new(InMemoryEventStore::new());
        let svc = service(store.clone(), EventBus::new(8));

        let mut event = ProtocolEvent::agent_claim("M-1", "AC-1", "impl-1", ClaimType::RedComplete);
        event.agent_id = None;
        let err = svc.publish(&CancellationToken::new(), event).await.unwrap_err();

        assert!(matches!(err, ProtocolError::Validation(ProtocolValidationError::MissingField { .. })));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_never_reaches_bus() {
        let store = Arc::new(InMemoryEventStore::new());
        store.fail_appends(true);
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let svc = service(store.clone(), bus);

        let event = ProtocolEvent::agent_claim("M-1", "AC-1", "impl-1", ClaimType::RedComplete);
        let err = svc.publish(&CancellationToken::new(), event).await.unwrap_err();

        assert!(matches!(err, ProtocolError::Store { action: "append", .. }));
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_newest_matching_claim_wins() {
        let store = Arc::new(InMemoryEventStore::new());
        let svc = service(store.clone(), EventBus::new(8));
        let cancel = CancellationToken::new();

        for agent in ["impl-1", "impl-2"] {
            let event = ProtocolEvent::agent_claim("M-1", "AC-1", agent, ClaimType::GreenComplete);
            svc.publish(&cancel, event).await.unwrap();
        }

        let found = svc
            .wait_for_claim(&cancel, "M-1", "AC-1", "green_complete", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(found.agent_id.as_deref(), Some("impl-2"));
    }

    #[tokio::test]
    async fn test_cancelled_wait_raises_no_alert() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let svc = service(store, bus);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = svc
            .wait_for_claim(&cancel, "M-1", "AC-1", "RED_COMPLETE", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(rx.drain().is_empty());
    }
}
