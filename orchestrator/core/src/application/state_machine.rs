// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Lifecycle State Machine
//!
//! Applies forward-only transitions to commissions, missions, acceptance
//! criteria and agents. Every accepted transition is persisted in two ordered
//! steps: the state value first, the audit comment second. Only once both
//! writes have landed is it appended to the in-process history and published
//! on the event bus.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Audited entity state changes

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::lifecycle::{
    is_legal_transition, EntityType, IllegalTransitionError, LifecycleState, TransitionRecord,
};
use crate::domain::repository::{Persister, RepositoryError};
use crate::infrastructure::event_bus::EventBus;
use opentelemetry::global::{BoxedSpan, BoxedTracer};
use opentelemetry::trace::{Span, Status, Tracer};
use opentelemetry::{Context, KeyValue};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const TRANSITION_SPAN_NAME: &str = "state.transition";

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Illegal(#[from] IllegalTransitionError),

    #[error("persist state transition: {0}")]
    PersistState(#[source] RepositoryError),

    #[error("persist transition event: {0}")]
    PersistEvent(#[source] RepositoryError),
}

impl TransitionError {
    pub fn is_illegal(&self) -> bool {
        matches!(self, TransitionError::Illegal(_))
    }
}

pub struct LifecycleStateMachine {
    persister: Arc<dyn Persister>,
    actor: String,
    tracer: Option<BoxedTracer>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    history: Mutex<Vec<TransitionRecord>>,
}

impl LifecycleStateMachine {
    pub fn new(persister: Arc<dyn Persister>, actor: impl Into<String>) -> Self {
        Self {
            persister,
            actor: actor.into(),
            tracer: None,
            clock: Arc::new(SystemClock),
            event_bus: None,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tracer(mut self, tracer: BoxedTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Moves `entity_id` from `from` to `to`.
    ///
    /// `cx` is the caller's trace context; the transition span is opened as
    /// its child when a tracer is configured.
    pub async fn transition(
        &self,
        cx: &Context,
        entity_type: EntityType,
        entity_id: &str,
        from: LifecycleState,
        to: LifecycleState,
        reason: &str,
    ) -> Result<TransitionRecord, TransitionError> {
        let started = Instant::now();
        let mut span = self.tracer.as_ref().map(|tracer| {
            let mut span = tracer.start_with_context(TRANSITION_SPAN_NAME, cx);
            span.set_attribute(KeyValue::new("entity_type", entity_type.as_str()));
            span.set_attribute(KeyValue::new("entity_id", entity_id.to_string()));
            span.set_attribute(KeyValue::new("from_state", from.as_str()));
            span.set_attribute(KeyValue::new("to_state", to.as_str()));
            span.set_attribute(KeyValue::new("reason", reason.to_string()));
            span
        });

        let result = self.apply(entity_type, entity_id, from, to, reason).await;

        metrics::counter!(
            "sc3_state_transitions_total",
            "entity_type" => entity_type.as_str(),
            "outcome" => if result.is_ok() { "ok" } else { "error" }
        )
        .increment(1);

        if let Some(span) = span.as_mut() {
            finish_span(span, started, &result);
        }
        result
    }

    async fn apply(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        from: LifecycleState,
        to: LifecycleState,
        reason: &str,
    ) -> Result<TransitionRecord, TransitionError> {
        if !is_legal_transition(entity_type, from, to) {
            warn!(
                entity_type = %entity_type,
                entity_id = %entity_id,
                from_state = %from,
                to_state = %to,
                "Rejected illegal lifecycle transition"
            );
            return Err(IllegalTransitionError::new(entity_type, entity_id, from, to).into());
        }

        let record = TransitionRecord {
            entity_type,
            entity_id: entity_id.to_string(),
            from_state: from,
            to_state: to,
            actor: self.actor.clone(),
            reason: reason.to_string(),
            timestamp: self.clock.now(),
        };
        self.persister
            .set_state(entity_id, &entity_type.state_key(), to.as_str())
            .await
            .map_err(TransitionError::PersistState)?;
        self.persister
            .add_comment(entity_id, &record.comment_text())
            .await
            .map_err(TransitionError::PersistEvent)?;
        self.history.lock().push(record.clone());

        info!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            from_state = %from,
            to_state = %to,
            actor = %self.actor,
            "Lifecycle transition applied"
        );

        if let Some(bus) = &self.event_bus {
            bus.publish_transition(record.clone());
        }
        Ok(record)
    }

    /// Ordered snapshot of every transition this instance has recorded.
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history.lock().clone()
    }
}

fn finish_span(span: &mut BoxedSpan, started: Instant, result: &Result<TransitionRecord, TransitionError>) {
    let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    span.set_attribute(KeyValue::new("duration_ms", duration_ms));
    match result {
        Ok(_) => span.set_status(Status::Ok),
        Err(err) => {
            debug!(error = %err, "Transition span marked as error");
            span.record_error(err);
            span.set_status(Status::error(err.to_string()));
        }
    }
    span.end();
}
