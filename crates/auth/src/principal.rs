use serde::{Deserialize, Serialize};

use guardian_core::UserId;

use crate::RoleCode;

/// A fully resolved principal for authorization decisions.
///
/// Supplied by the identity provider; this crate never verifies credentials.
/// Exactly one role per principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: RoleCode,
    pub is_active: bool,
    pub is_deleted: bool,
}

impl Principal {
    pub fn new(user_id: UserId, role: impl Into<RoleCode>) -> Self {
        Self {
            user_id,
            role: role.into(),
            is_active: true,
            is_deleted: false,
        }
    }

    /// Inactive or deleted principals are denied everything.
    pub fn is_enabled(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}
