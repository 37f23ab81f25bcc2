//! Enforcement interceptor.
//!
//! Fetches one policy snapshot per call, evaluates the declared requirement,
//! emits exactly one decision event and only then lets the operation run.

use std::future::Future;

use chrono::Utc;
use tracing::{debug, info, warn};

use guardian_auth::{
    AuditEvent, AuditSink, DecisionEvent, Evaluation, GrantedPermission, Principal, RbacError,
    Requirement, RequiresCapability, evaluate, granted_permissions, record_best_effort,
};

use crate::store::RbacStore;

/// Authorization gate in front of every protected operation.
#[derive(Debug, Clone)]
pub struct Enforcer<S, A> {
    store: S,
    audit: A,
}

impl<S, A> Enforcer<S, A>
where
    S: RbacStore,
    A: AuditSink,
{
    pub fn new(store: S, audit: A) -> Self {
        Self { store, audit }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    /// Decide `requirement` for `principal`.
    ///
    /// Resolver reasons collapse to `AuthorizationDenied`; a store failure
    /// fails closed with `Store` (and is audited as a deny).
    pub async fn authorize(&self, principal: &Principal, requirement: &Requirement) -> Result<Evaluation, RbacError> {
        let snapshot = match self.store.snapshot_for_role(&principal.role).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let err = RbacError::from(err);
                warn!(
                    principal_id = %principal.user_id,
                    rule = requirement.rule(),
                    error = %err,
                    "policy snapshot unavailable; denying"
                );
                self.emit(AuditEvent::Decision(DecisionEvent::failed(
                    principal.user_id,
                    requirement,
                    err.to_string(),
                    Utc::now(),
                )));
                return Err(err);
            }
        };

        let evaluation = evaluate(principal, requirement, &snapshot);
        let event = DecisionEvent::from_evaluation(principal.user_id, requirement, &evaluation, Utc::now());

        if evaluation.allowed {
            debug!(
                principal_id = %principal.user_id,
                rule = event.rule,
                reasons = ?event.reason_codes(),
                "authorization allowed"
            );
        } else {
            info!(
                principal_id = %principal.user_id,
                rule = event.rule,
                reasons = ?event.reason_codes(),
                "authorization denied"
            );
        }
        self.emit(AuditEvent::Decision(event));

        evaluation.into_result()
    }

    /// Authorize an operation that declares its own requirement.
    pub async fn authorize_operation<O>(&self, principal: &Principal, operation: &O) -> Result<Evaluation, RbacError>
    where
        O: RequiresCapability + ?Sized,
    {
        self.authorize(principal, &operation.requirement()).await
    }

    /// Authorize, then run `operation`. The operation is never started on
    /// deny.
    pub async fn enforce<T, F, Fut>(&self, principal: &Principal, requirement: &Requirement, operation: F) -> Result<T, RbacError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RbacError>>,
    {
        self.authorize(principal, requirement).await?;
        operation().await
    }

    /// The principal's current grant set, ordered by category then code.
    ///
    /// Disabled principals and inactive roles get an empty list.
    pub async fn list_permissions_for(&self, principal: &Principal) -> Result<Vec<GrantedPermission>, RbacError> {
        let snapshot = self.store.snapshot_for_role(&principal.role).await?;
        Ok(granted_permissions(principal, &snapshot))
    }

    pub(crate) fn emit(&self, event: AuditEvent) {
        record_best_effort(&self.audit, event);
    }
}
