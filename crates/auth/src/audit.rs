//! Audit event model and the sink port.
//!
//! Every intercepted authorization call produces exactly one
//! [`DecisionEvent`]; administrative mutations produce an
//! [`AdminActionEvent`]. Sinks are best-effort: a failing sink is logged and
//! never affects the outcome returned to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use guardian_core::{AuditEventId, UserId};

use crate::{CodeDecision, Evaluation, PermissionCode, Requirement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Allow,
    Deny,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Allow => "allow",
            DecisionOutcome::Deny => "deny",
        }
    }
}

/// Allow/deny record for one intercepted authorization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionEvent {
    pub event_id: AuditEventId,
    pub principal_id: UserId,
    pub capability_codes: Vec<PermissionCode>,
    /// `all_of` / `any_of`.
    pub rule: &'static str,
    pub decision: DecisionOutcome,
    /// Per-code resolver reasons (internal detail, never shown to callers).
    pub checks: Vec<CodeDecision>,
    /// Set when no decision could be computed (e.g. the store was unreachable).
    pub failure: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DecisionEvent {
    pub fn from_evaluation(
        principal_id: UserId,
        requirement: &Requirement,
        evaluation: &Evaluation,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: AuditEventId::new(),
            principal_id,
            capability_codes: requirement.codes().to_vec(),
            rule: requirement.rule(),
            decision: if evaluation.allowed {
                DecisionOutcome::Allow
            } else {
                DecisionOutcome::Deny
            },
            checks: evaluation.checks.clone(),
            failure: None,
            timestamp,
        }
    }

    /// Fail-closed record for a call whose snapshot could not be read.
    pub fn failed(
        principal_id: UserId,
        requirement: &Requirement,
        failure: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: AuditEventId::new(),
            principal_id,
            capability_codes: requirement.codes().to_vec(),
            rule: requirement.rule(),
            decision: DecisionOutcome::Deny,
            checks: Vec::new(),
            failure: Some(failure.into()),
            timestamp,
        }
    }

    /// Reason codes in declaration order (e.g. `["granted", "role_inactive"]`).
    pub fn reason_codes(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.decision.reason_code()).collect()
    }
}

/// Administrative action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    RoleCreate,
    RoleUpdate,
    PermissionChange,
    RoleDelete,
    RoleAssign,
    UserActivate,
    UserDeactivate,
    UserDelete,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::RoleCreate => "role_create",
            AdminAction::RoleUpdate => "role_update",
            AdminAction::PermissionChange => "permission_change",
            AdminAction::RoleDelete => "role_delete",
            AdminAction::RoleAssign => "role_assign",
            AdminAction::UserActivate => "user_activate",
            AdminAction::UserDeactivate => "user_deactivate",
            AdminAction::UserDelete => "user_delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Role,
    Permission,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::User => "user",
            ResourceType::Role => "role",
            ResourceType::Permission => "permission",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminActionEvent {
    pub event_id: AuditEventId,
    pub actor_id: UserId,
    pub action: AdminAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub status: AuditStatus,
    pub description: String,
    /// Error kind on failure (see `RbacError::kind`).
    pub error_kind: Option<&'static str>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Decision(DecisionEvent),
    AdminAction(AdminActionEvent),
}

impl AuditEvent {
    pub fn event_id(&self) -> AuditEventId {
        match self {
            AuditEvent::Decision(e) => e.event_id,
            AuditEvent::AdminAction(e) => e.event_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::Decision(e) => e.timestamp,
            AuditEvent::AdminAction(e) => e.timestamp,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditSinkError {
    #[error("audit sink is full")]
    Full,

    #[error("audit sink is closed")]
    Closed,

    #[error("audit write failed: {0}")]
    Write(String),
}

/// Destination for audit events.
///
/// `record` must not block on durable persistence; implementations that
/// persist hand the event to a background task.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        (**self).record(event)
    }
}

/// Record `event`, swallowing (and logging) any sink failure.
pub fn record_best_effort<S: AuditSink + ?Sized>(sink: &S, event: AuditEvent) {
    let event_id = event.event_id();
    if let Err(err) = sink.record(event) {
        tracing::warn!(%event_id, error = %err, "failed to record audit event");
    }
}
