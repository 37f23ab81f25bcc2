//! Postgres audit writer (`audit_logs` table, see `store::postgres::SCHEMA`).

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use guardian_auth::{AuditEvent, AuditSinkError, AuditStatus, DecisionOutcome, ResourceType};

use super::channel::AuditWriter;

#[derive(Debug, Clone)]
pub struct PostgresAuditWriter {
    pool: Arc<PgPool>,
}

impl PostgresAuditWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

/// Flat column values of one `audit_logs` row.
struct AuditRow<'a> {
    event_type: &'static str,
    actor_id: Uuid,
    action: &'static str,
    resource_type: Option<&'static str>,
    resource_id: Option<&'a str>,
    status: &'static str,
    description: Option<&'a str>,
}

impl<'a> AuditRow<'a> {
    fn from_event(event: &'a AuditEvent) -> Self {
        match event {
            AuditEvent::Decision(e) => AuditRow {
                event_type: "decision",
                actor_id: *e.principal_id.as_uuid(),
                action: "authorize",
                resource_type: Some(ResourceType::Permission.as_str()),
                resource_id: None,
                status: match e.decision {
                    DecisionOutcome::Allow => AuditStatus::Success.as_str(),
                    DecisionOutcome::Deny => AuditStatus::Failure.as_str(),
                },
                description: e.failure.as_deref(),
            },
            AuditEvent::AdminAction(e) => AuditRow {
                event_type: "admin_action",
                actor_id: *e.actor_id.as_uuid(),
                action: e.action.as_str(),
                resource_type: Some(e.resource_type.as_str()),
                resource_id: Some(e.resource_id.as_str()),
                status: e.status.as_str(),
                description: Some(e.description.as_str()),
            },
        }
    }
}

#[async_trait::async_trait]
impl AuditWriter for PostgresAuditWriter {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let details = serde_json::to_value(event).map_err(|e| AuditSinkError::Write(e.to_string()))?;
        let row = AuditRow::from_event(event);

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, event_type, actor_id, action, resource_type, resource_id,
                status, description, details, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.event_id().as_uuid())
        .bind(row.event_type)
        .bind(row.actor_id)
        .bind(row.action)
        .bind(row.resource_type)
        .bind(row.resource_id)
        .bind(row.status)
        .bind(row.description)
        .bind(details)
        .bind(event.timestamp())
        .execute(&*self.pool)
        .await
        .map_err(|e| AuditSinkError::Write(format!("insert audit_logs: {e}")))?;
        Ok(())
    }
}
