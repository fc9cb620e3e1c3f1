// Event Bus Implementation - Pub/Sub for coordination events
//
// In-memory fan-out using tokio broadcast channels. Observers (TUI, log
// writers, escalation hooks) subscribe; publishing never blocks and never
// fails when nobody listens.

use crate::domain::events::{SessionEvent, StuckAlert};
use crate::domain::lifecycle::TransitionRecord;
use crate::domain::protocol::ProtocolEvent;
use crate::domain::session::OutputChunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified event type carried by the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Protocol(ProtocolEvent),
    StateTransition(TransitionRecord),
    StuckAlert(StuckAlert),
    OutputChunk(OutputChunk),
    Session(SessionEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_protocol_event(&self, event: ProtocolEvent) {
        self.publish(DomainEvent::Protocol(event));
    }

    pub fn publish_transition(&self, record: TransitionRecord) {
        self.publish(DomainEvent::StateTransition(record));
    }

    pub fn publish_stuck_alert(&self, alert: StuckAlert) {
        self.publish(DomainEvent::StuckAlert(alert));
    }

    pub fn publish_output(&self, chunk: OutputChunk) {
        self.publish(DomainEvent::OutputChunk(chunk));
    }

    pub fn publish_session_event(&self, event: SessionEvent) {
        self.publish(DomainEvent::Session(event));
    }

    /// Fire-and-forget fan-out to all subscribers
    pub fn publish(&self, event: DomainEvent) {
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single mission
    pub fn subscribe_mission(&self, mission_id: impl Into<String>) -> MissionEventReceiver {
        MissionEventReceiver {
            receiver: self.sender.subscribe(),
            mission_id: mission_id.into(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Drain everything currently buffered
    pub fn drain(&mut self) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }
}

/// Receiver for protocol events and alerts of one mission
pub struct MissionEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    mission_id: String,
}

impl MissionEventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if self.matches_mission(&event) {
                return Ok(event);
            }
        }
    }

    fn matches_mission(&self, event: &DomainEvent) -> bool {
        match event {
            DomainEvent::Protocol(e) => e.mission_id == self.mission_id,
            DomainEvent::StuckAlert(a) => a.mission_id == self.mission_id,
            DomainEvent::StateTransition(r) => r.entity_id == self.mission_id,
            DomainEvent::OutputChunk(c) => c.session.mission_id().eq_ignore_ascii_case(&self.mission_id),
            DomainEvent::Session(_) => false,
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::Severity;
    use crate::domain::protocol::{ClaimType, ProtocolEvent};
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = ProtocolEvent::agent_claim("M-1", "AC-1", "impl-1", ClaimType::RedComplete);
        event_bus.publish_protocol_event(event.clone());

        match receiver.recv().await.unwrap() {
            DomainEvent::Protocol(received) => assert_eq!(received, event),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mission_event_filtering() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_mission("M-1");

        event_bus.publish_stuck_alert(StuckAlert {
            mission_id: "M-2".to_string(),
            ac_id: "AC-1".to_string(),
            claim_type: "RED_COMPLETE".to_string(),
            timeout_ms: 10,
            severity: Severity::Error,
            raised_at: Utc::now(),
        });
        event_bus.publish_protocol_event(ProtocolEvent::agent_claim("M-1", "AC-1", "impl-1", ClaimType::GreenComplete));

        match receiver.recv().await.unwrap() {
            DomainEvent::Protocol(e) => assert_eq!(e.mission_id, "M-1"),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_protocol_event(ProtocolEvent::agent_claim("M-1", "AC-1", "impl-1", ClaimType::Blocked));

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let event_bus = EventBus::default();
        event_bus.publish_protocol_event(ProtocolEvent::agent_claim("M-1", "AC-1", "impl-1", ClaimType::Blocked));
        assert_eq!(event_bus.subscriber_count(), 0);
    }
}
