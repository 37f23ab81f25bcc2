//! Error taxonomy of the authorization engine.

use thiserror::Error;

use guardian_core::{DomainError, PermissionId};

use crate::PermissionCode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RbacError {
    /// External face of every resolver deny reason. Carries only the codes
    /// the call was denied on.
    #[error("authorization denied: missing {}", join_codes(.denied))]
    AuthorizationDenied { denied: Vec<PermissionCode> },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("validation failed on '{field}': {message}")]
    Validation {
        field: &'static str,
        message: String,
        /// Unknown or inactive permission ids rejected in a batch edge update.
        invalid_permission_ids: Vec<PermissionId>,
    },

    /// Self-deactivation, self-deletion, system-role deletion, system-role
    /// code change.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("conflict: {message}")]
    Conflict {
        field: Option<&'static str>,
        message: String,
        /// Number of active principals blocking a role deletion.
        count: Option<u64>,
    },

    /// Persistence backend failure.
    #[error("store error: {0}")]
    Store(String),
}

impl RbacError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
            invalid_permission_ids: Vec::new(),
        }
    }

    pub fn invalid_permissions(ids: Vec<PermissionId>) -> Self {
        let listed = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
        Self::Validation {
            field: "permission_ids",
            message: format!("unknown or inactive permission ids: {listed}"),
            invalid_permission_ids: ids,
        }
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn duplicate(field: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            field: Some(field),
            message: message.into(),
            count: None,
        }
    }

    pub fn role_in_use(code: &str, count: u64) -> Self {
        Self::Conflict {
            field: None,
            message: format!("role '{code}' is assigned to {count} active user(s)"),
            count: Some(count),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Stable machine-readable kind, used in audit records and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RbacError::AuthorizationDenied { .. } => "authorization_denied",
            RbacError::NotFound { .. } => "not_found",
            RbacError::Validation { .. } => "validation_error",
            RbacError::InvalidOperation(_) => "invalid_operation",
            RbacError::Conflict { .. } => "conflict",
            RbacError::Store(_) => "store_error",
        }
    }
}

impl From<DomainError> for RbacError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => RbacError::validation("input", msg),
            DomainError::InvalidId(msg) => RbacError::validation("id", msg),
        }
    }
}

fn join_codes(codes: &[PermissionCode]) -> String {
    if codes.is_empty() {
        return "<no capability declared>".to_string();
    }
    codes.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_message_lists_codes() {
        let err = RbacError::AuthorizationDenied {
            denied: vec![PermissionCode::new("reports.export"), PermissionCode::new("users.read")],
        };
        assert_eq!(err.to_string(), "authorization denied: missing reports.export, users.read");
    }

    #[test]
    fn role_in_use_carries_count() {
        let err = RbacError::role_in_use("OPERATIONS", 3);
        assert!(matches!(err, RbacError::Conflict { count: Some(3), .. }));
        assert!(err.to_string().contains("3 active"));
    }
}
