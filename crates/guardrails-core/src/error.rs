//! Error types for guard configuration and execution

use thiserror::Error;

use crate::types::{RuleResult, Stage};

#[derive(Error, Debug)]
pub enum GuardError {
    /// Guard or rule misconfiguration, detected eagerly at construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Resolved roles did not satisfy a rule's required roles; the rule body
    /// never ran
    #[error("rule '{rule}' denied by RBAC during {stage} stage (missing roles: {missing:?})")]
    Denied {
        rule: String,
        stage: Stage,
        missing: Vec<String>,
    },

    /// A rule returned a failing result during a protect-mode invocation
    #[error("rule '{rule}' blocked the call during {stage} stage")]
    Blocked {
        rule: String,
        stage: Stage,
        result: RuleResult,
    },

    /// A rule raised an unexpected fault instead of returning a result
    #[error("rule '{rule}' faulted during {stage} stage")]
    RuleFault {
        rule: String,
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// The underlying wrapped call failed; the post stage never ran
    #[error("underlying call failed")]
    CallFailed(#[source] anyhow::Error),
}

pub type GuardResult<T> = Result<T, GuardError>;
