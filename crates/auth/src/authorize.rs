use serde::Serialize;

use crate::resolver::{Decision, resolve};
use crate::{PermissionCode, PolicySnapshot, Principal, RbacError};

/// Capabilities an operation declares, with their composition rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "codes", rename_all = "snake_case")]
pub enum Requirement {
    /// Every listed capability must be held.
    AllOf(Vec<PermissionCode>),
    /// At least one listed capability must be held.
    AnyOf(Vec<PermissionCode>),
}

impl Requirement {
    pub fn single(code: impl Into<PermissionCode>) -> Self {
        Requirement::AllOf(vec![code.into()])
    }

    pub fn all_of<I, C>(codes: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<PermissionCode>,
    {
        Requirement::AllOf(codes.into_iter().map(Into::into).collect())
    }

    pub fn any_of<I, C>(codes: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<PermissionCode>,
    {
        Requirement::AnyOf(codes.into_iter().map(Into::into).collect())
    }

    pub fn codes(&self) -> &[PermissionCode] {
        match self {
            Requirement::AllOf(codes) | Requirement::AnyOf(codes) => codes,
        }
    }

    pub fn rule(&self) -> &'static str {
        match self {
            Requirement::AllOf(_) => "all_of",
            Requirement::AnyOf(_) => "any_of",
        }
    }
}

/// Operation-side authorization contract (checked at the operation boundary).
///
/// Implement this on operations that require capabilities. Composition is
/// declared here, never inferred.
pub trait RequiresCapability {
    fn requirement(&self) -> Requirement;
}

/// Per-code outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeDecision {
    pub code: PermissionCode,
    pub decision: Decision,
}

/// Result of evaluating a requirement against a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub allowed: bool,
    pub checks: Vec<CodeDecision>,
}

impl Evaluation {
    /// Codes to report to the caller on denial.
    ///
    /// For `AllOf` only the codes that failed; for `AnyOf` the declared
    /// alternatives (none of them held). Never the principal's full gap.
    pub fn denied_codes(&self) -> Vec<PermissionCode> {
        if self.allowed {
            return Vec::new();
        }
        self.checks
            .iter()
            .filter(|c| !c.decision.is_allowed())
            .map(|c| c.code.clone())
            .collect()
    }

    pub fn into_result(self) -> Result<Evaluation, RbacError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(RbacError::AuthorizationDenied {
                denied: self.denied_codes(),
            })
        }
    }
}

/// Evaluate `requirement` for `principal`.
///
/// Every declared code is resolved (no short-circuit) so that the audit
/// record carries the full per-code detail. An empty requirement fails
/// closed.
pub fn evaluate(principal: &Principal, requirement: &Requirement, snapshot: &PolicySnapshot) -> Evaluation {
    let checks: Vec<CodeDecision> = requirement
        .codes()
        .iter()
        .map(|code| CodeDecision {
            code: code.clone(),
            decision: resolve(principal, code, snapshot),
        })
        .collect();

    let allowed = !checks.is_empty()
        && match requirement {
            Requirement::AllOf(_) => checks.iter().all(|c| c.decision.is_allowed()),
            Requirement::AnyOf(_) => checks.iter().any(|c| c.decision.is_allowed()),
        };

    Evaluation { allowed, checks }
}

/// Authorize a principal against a requirement.
///
/// - No IO
/// - No panics
/// - Internal deny reasons collapse to `AuthorizationDenied`
pub fn authorize(
    principal: &Principal,
    requirement: &Requirement,
    snapshot: &PolicySnapshot,
) -> Result<Evaluation, RbacError> {
    evaluate(principal, requirement, snapshot).into_result()
}
