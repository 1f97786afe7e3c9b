//! Rule contract and per-rule configuration

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use serde_json::Value;

use crate::context::EvaluationContext;
use crate::error::{GuardError, GuardResult};
use crate::types::{RuleResult, Severity, Stage};

/// Static configuration every rule carries: identity, stage membership,
/// RBAC requirements, severity, and the enabled flag.
///
/// Constructed once at configuration time; an empty stage set is rejected
/// eagerly rather than surfacing at call time.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    name: String,
    stages: Vec<Stage>,
    required_roles: BTreeSet<String>,
    severity: Severity,
    enabled: bool,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> GuardResult<Self> {
        let name = name.into();
        if stages.is_empty() {
            return Err(GuardError::Configuration(format!(
                "rule '{name}' must participate in at least one stage"
            )));
        }
        Ok(Self {
            name,
            stages,
            required_roles: BTreeSet::new(),
            severity: Severity::High,
            enabled: true,
        })
    }

    pub fn with_required_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn required_roles(&self) -> &BTreeSet<String> {
        &self.required_roles
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// A pluggable validator producing a pass/fail result for a payload at a
/// given stage.
///
/// Rules are configured once and are expected to be stateless with respect
/// to a single evaluation. `evaluate` must not mutate the context; an `Err`
/// return is an orchestration fault, not a failing result. Rules doing
/// out-of-process work (e.g. an inference call) override `evaluate_async`;
/// the default implementation delegates to the synchronous `evaluate`, so
/// every rule is usable from either dispatch path.
#[async_trait]
pub trait Rule: std::fmt::Debug + Send + Sync {
    fn spec(&self) -> &RuleSpec;

    fn evaluate(
        &self,
        payload: &Value,
        context: &EvaluationContext,
        stage: Stage,
    ) -> anyhow::Result<RuleResult>;

    async fn evaluate_async(
        &self,
        payload: &Value,
        context: &EvaluationContext,
        stage: Stage,
    ) -> anyhow::Result<RuleResult> {
        self.evaluate(payload, context, stage)
    }

    fn name(&self) -> &str {
        self.spec().name()
    }

    fn severity(&self) -> Severity {
        self.spec().severity()
    }

    fn enabled(&self) -> bool {
        self.spec().enabled()
    }

    /// Pure membership test against the configured stage set
    fn supports_stage(&self, stage: Stage) -> bool {
        self.spec().stages().contains(&stage)
    }

    /// Fail-closed RBAC check: the required-role set must be a subset of the
    /// assigned roles, matched exactly by name. Returns the missing roles on
    /// failure; no-op for rules without role requirements.
    fn validate_roles(&self, assigned_roles: &HashSet<String>) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .spec()
            .required_roles()
            .iter()
            .filter(|role| !assigned_roles.contains(*role))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}
