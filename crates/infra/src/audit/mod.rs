//! Audit sink adapters.
//!
//! - [`TracingAuditSink`]: structured log line per event
//! - [`InMemoryAuditSink`]: collects events (tests/dev)
//! - [`ChannelAuditSink`]: bounded queue drained by a background task into an
//!   [`AuditWriter`] such as [`PostgresAuditWriter`]

pub mod channel;
pub mod postgres;

use std::sync::{Arc, Mutex};

use guardian_auth::{AuditEvent, AuditSink, AuditSinkError};

pub use channel::{AuditWorkerHandle, AuditWriter, ChannelAuditSink};
pub use postgres::PostgresAuditWriter;

/// Writes every event to the `guardian::audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        match &event {
            AuditEvent::Decision(e) => tracing::info!(
                target: "guardian::audit",
                event_id = %e.event_id,
                principal_id = %e.principal_id,
                rule = e.rule,
                decision = e.decision.as_str(),
                codes = ?e.capability_codes.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                reasons = ?e.reason_codes(),
                failure = e.failure.as_deref(),
                "authorization decision"
            ),
            AuditEvent::AdminAction(e) => tracing::info!(
                target: "guardian::audit",
                event_id = %e.event_id,
                actor_id = %e.actor_id,
                action = e.action.as_str(),
                resource_type = e.resource_type.as_str(),
                resource_id = %e.resource_id,
                status = e.status.as_str(),
                error_kind = e.error_kind,
                "{}",
                e.description
            ),
        }
        Ok(())
    }
}

/// Keeps every recorded event in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        self.events
            .lock()
            .map_err(|_| AuditSinkError::Write("lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuditWriter for InMemoryAuditSink {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        self.record(event.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use guardian_auth::{DecisionEvent, Requirement};
    use guardian_core::UserId;

    use super::*;

    fn event() -> AuditEvent {
        AuditEvent::Decision(DecisionEvent::failed(
            UserId::new(),
            &Requirement::single("users.read"),
            "store unavailable",
            Utc::now(),
        ))
    }

    #[test]
    fn tracing_sink_never_fails() {
        assert!(TracingAuditSink.record(event()).is_ok());
    }

    #[test]
    fn in_memory_sink_keeps_order() {
        let sink = InMemoryAuditSink::new();
        let first = event();
        let second = event();
        sink.record(first.clone()).unwrap();
        sink.record(second.clone()).unwrap();
        assert_eq!(sink.events(), vec![first, second]);
    }
}
