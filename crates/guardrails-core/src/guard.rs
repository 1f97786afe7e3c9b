//! Guard orchestration: the stage-based rule pipeline
//!
//! A guard owns an ordered rule set and runs the pre/post pipeline around a
//! wrapped call (`protect_sync` / `protect_async`) or against an arbitrary
//! payload (`check` / `check_async`). Rules within a stage execute strictly
//! sequentially in configuration order; the async variant suspends only at
//! rule boundaries and at the underlying call.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::context::EvaluationContext;
use crate::error::{GuardError, GuardResult};
use crate::rbac::RoleResolver;
use crate::rule::Rule;
use crate::sink::{AuditEvent, AuditSink, NullAuditSink, NullPerformanceSink, PerformanceSink};
use crate::types::{GuardReport, RuleResult, Stage};

/// Tagged outcome of a protect-mode invocation
///
/// Callers pattern-match instead of catching typed errors; the conventional
/// "raise on failure" path is [`Outcome::into_value`].
#[derive(Debug)]
pub enum Outcome {
    /// Every rule in both stages passed; carries the call's output and the
    /// full report
    Passed { value: Value, report: GuardReport },
    /// A rule returned a failing result; remaining rules in that stage never
    /// ran
    Blocked {
        result: RuleResult,
        context: EvaluationContext,
    },
    /// RBAC denied a rule before its body ran
    Denied {
        result: RuleResult,
        context: EvaluationContext,
    },
    /// A rule raised an unexpected fault instead of returning a result
    Faulted {
        rule: String,
        stage: Stage,
        source: anyhow::Error,
    },
    /// The underlying call failed; the post stage never ran
    CallFailed { source: anyhow::Error },
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    /// Report for a fully completed invocation, if there is one
    pub fn report(&self) -> Option<&GuardReport> {
        match self {
            Self::Passed { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Convert into the call's output value, turning every non-passing
    /// variant into the matching [`GuardError`]
    pub fn into_value(self) -> GuardResult<Value> {
        match self {
            Self::Passed { value, .. } => Ok(value),
            Self::Blocked { result, .. } => Err(GuardError::Blocked {
                rule: result.rule.clone(),
                stage: result.stage,
                result,
            }),
            Self::Denied { result, .. } => {
                let missing = result
                    .details
                    .get("missing_roles")
                    .and_then(Value::as_array)
                    .map(|roles| {
                        roles
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Err(GuardError::Denied {
                    rule: result.rule,
                    stage: result.stage,
                    missing,
                })
            }
            Self::Faulted {
                rule,
                stage,
                source,
            } => Err(GuardError::RuleFault {
                rule,
                stage,
                source,
            }),
            Self::CallFailed { source } => Err(GuardError::CallFailed(source)),
        }
    }
}

/// How a single stage run ended (internal to the pipeline)
enum StageOutcome {
    Completed(Vec<RuleResult>),
    Blocked(RuleResult),
    Denied(RuleResult),
    Faulted { rule: String, source: anyhow::Error },
}

/// Primary interface for executing guardrail rules around model calls.
///
/// The rule list and sinks are read-only after construction; a guard may be
/// invoked concurrently as long as each rule's `evaluate` is itself safe for
/// concurrent invocation.
pub struct Guard {
    name: String,
    rules: Vec<Arc<dyn Rule>>,
    audit_sink: Arc<dyn AuditSink>,
    performance_sink: Arc<dyn PerformanceSink>,
    role_resolver: Option<Arc<dyn RoleResolver>>,
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .finish()
    }
}

impl Guard {
    /// Create a guard over an ordered, non-empty rule set.
    ///
    /// Sinks default to the no-op implementations; without a role resolver
    /// every call resolves to an empty role set, so RBAC-gated rules fail
    /// closed.
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> GuardResult<Self> {
        if rules.is_empty() {
            return Err(GuardError::Configuration(
                "at least one rule must be supplied to the guard".to_string(),
            ));
        }
        Ok(Self {
            name: "guard".to_string(),
            rules,
            audit_sink: Arc::new(NullAuditSink),
            performance_sink: Arc::new(NullPerformanceSink),
            role_resolver: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    pub fn with_performance_sink(mut self, sink: Arc<dyn PerformanceSink>) -> Self {
        self.performance_sink = sink;
        self
    }

    pub fn with_role_resolver(mut self, resolver: Arc<dyn RoleResolver>) -> Self {
        self.role_resolver = Some(resolver);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    // ------------------------------------------------------------------ //
    // Protect mode: wrap a call, fail fast on the first failing rule
    // ------------------------------------------------------------------ //

    /// Run the full pre → call → post sequence around a synchronous call
    pub fn protect_sync<F>(&self, context: EvaluationContext, call: F) -> Outcome
    where
        F: FnOnce() -> anyhow::Result<Value>,
    {
        match self.run_stage_sync(Stage::Pre, &context.inputs.clone(), &context, true) {
            StageOutcome::Completed(pre_results) => {
                let value = match call() {
                    Ok(value) => value,
                    Err(source) => return Outcome::CallFailed { source },
                };
                let post_context = context.with_output(value.clone());
                match self.run_stage_sync(Stage::Post, &value, &post_context, true) {
                    StageOutcome::Completed(post_results) => Outcome::Passed {
                        value,
                        report: GuardReport {
                            context: post_context,
                            pre_results,
                            post_results,
                        },
                    },
                    other => Self::abort_outcome(other, post_context, Stage::Post),
                }
            }
            other => Self::abort_outcome(other, context, Stage::Pre),
        }
    }

    /// Run the full pre → call → post sequence around an asynchronous call.
    ///
    /// The call is awaited to completion before the post stage executes;
    /// nothing observes partial output.
    pub async fn protect_async<F, Fut>(&self, context: EvaluationContext, call: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        match self
            .run_stage_async(Stage::Pre, &context.inputs.clone(), &context, true)
            .await
        {
            StageOutcome::Completed(pre_results) => {
                let value = match call().await {
                    Ok(value) => value,
                    Err(source) => return Outcome::CallFailed { source },
                };
                let post_context = context.with_output(value.clone());
                match self
                    .run_stage_async(Stage::Post, &value, &post_context, true)
                    .await
                {
                    StageOutcome::Completed(post_results) => Outcome::Passed {
                        value,
                        report: GuardReport {
                            context: post_context,
                            pre_results,
                            post_results,
                        },
                    },
                    other => Self::abort_outcome(other, post_context, Stage::Post),
                }
            }
            other => Self::abort_outcome(other, context, Stage::Pre),
        }
    }

    fn abort_outcome(outcome: StageOutcome, context: EvaluationContext, stage: Stage) -> Outcome {
        match outcome {
            StageOutcome::Blocked(result) => Outcome::Blocked { result, context },
            StageOutcome::Denied(result) => Outcome::Denied { result, context },
            StageOutcome::Faulted { rule, source } => Outcome::Faulted {
                rule,
                stage,
                source,
            },
            // fail-fast stage runs never return Completed through this path
            StageOutcome::Completed(_) => unreachable!("completed stage treated as abort"),
        }
    }

    // ------------------------------------------------------------------ //
    // Check mode: run one stage manually, never abort on failing rules
    // ------------------------------------------------------------------ //

    /// Run only the requested stage against an arbitrary payload.
    ///
    /// Never invokes an underlying call and never errors on a failing rule;
    /// the full report is always returned so callers can inspect every
    /// result. The only error is a rule fault.
    pub fn check(
        &self,
        payload: Value,
        stage: Stage,
        context: Option<EvaluationContext>,
    ) -> GuardResult<GuardReport> {
        let context = context.unwrap_or_else(|| EvaluationContext::new(Value::Null));
        let context = match stage {
            Stage::Pre => context.with_inputs(payload.clone()),
            Stage::Post => context.with_output(payload.clone()),
        };
        let results = match self.run_stage_sync(stage, &payload, &context, false) {
            StageOutcome::Completed(results) => results,
            StageOutcome::Faulted { rule, source } => {
                return Err(GuardError::RuleFault {
                    rule,
                    stage,
                    source,
                })
            }
            // non-fail-fast runs surface denials as failing results
            StageOutcome::Blocked(_) | StageOutcome::Denied(_) => unreachable!(),
        };
        Ok(Self::stage_report(context, stage, results))
    }

    /// Async variant of [`Guard::check`] with the identical contract
    pub async fn check_async(
        &self,
        payload: Value,
        stage: Stage,
        context: Option<EvaluationContext>,
    ) -> GuardResult<GuardReport> {
        let context = context.unwrap_or_else(|| EvaluationContext::new(Value::Null));
        let context = match stage {
            Stage::Pre => context.with_inputs(payload.clone()),
            Stage::Post => context.with_output(payload.clone()),
        };
        let results = match self.run_stage_async(stage, &payload, &context, false).await {
            StageOutcome::Completed(results) => results,
            StageOutcome::Faulted { rule, source } => {
                return Err(GuardError::RuleFault {
                    rule,
                    stage,
                    source,
                })
            }
            StageOutcome::Blocked(_) | StageOutcome::Denied(_) => unreachable!(),
        };
        Ok(Self::stage_report(context, stage, results))
    }

    fn stage_report(
        context: EvaluationContext,
        stage: Stage,
        results: Vec<RuleResult>,
    ) -> GuardReport {
        let (pre_results, post_results) = match stage {
            Stage::Pre => (results, Vec::new()),
            Stage::Post => (Vec::new(), results),
        };
        GuardReport {
            context,
            pre_results,
            post_results,
        }
    }

    // ------------------------------------------------------------------ //
    // Stage runner
    // ------------------------------------------------------------------ //

    fn rules_for_stage(&self, stage: Stage) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules
            .iter()
            .filter(move |rule| rule.enabled() && rule.supports_stage(stage))
    }

    fn resolve_roles(&self, context: &EvaluationContext) -> HashSet<String> {
        match &self.role_resolver {
            Some(resolver) => resolver.resolve(context),
            None => HashSet::new(),
        }
    }

    fn run_stage_sync(
        &self,
        stage: Stage,
        payload: &Value,
        context: &EvaluationContext,
        fail_fast: bool,
    ) -> StageOutcome {
        let roles = self.resolve_roles(context);
        let mut results = Vec::new();
        for rule in self.rules_for_stage(stage) {
            if let Err(missing) = rule.validate_roles(&roles) {
                let result = self.denial_result(rule.as_ref(), stage, &roles, &missing);
                self.after_rule(&result, context);
                if fail_fast {
                    return StageOutcome::Denied(result);
                }
                results.push(result);
                continue;
            }

            let start = Instant::now();
            let mut result = match rule.evaluate(payload, context, stage) {
                Ok(result) => result,
                Err(source) => return self.fault(rule.name(), stage, source),
            };
            result.latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            self.after_rule(&result, context);
            if !result.passed && fail_fast {
                return StageOutcome::Blocked(result);
            }
            results.push(result);
        }
        StageOutcome::Completed(results)
    }

    async fn run_stage_async(
        &self,
        stage: Stage,
        payload: &Value,
        context: &EvaluationContext,
        fail_fast: bool,
    ) -> StageOutcome {
        let roles = self.resolve_roles(context);
        let mut results = Vec::new();
        for rule in self.rules_for_stage(stage) {
            if let Err(missing) = rule.validate_roles(&roles) {
                let result = self.denial_result(rule.as_ref(), stage, &roles, &missing);
                self.after_rule(&result, context);
                if fail_fast {
                    return StageOutcome::Denied(result);
                }
                results.push(result);
                continue;
            }

            let start = Instant::now();
            let mut result = match rule.evaluate_async(payload, context, stage).await {
                Ok(result) => result,
                Err(source) => return self.fault(rule.name(), stage, source),
            };
            result.latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            self.after_rule(&result, context);
            if !result.passed && fail_fast {
                return StageOutcome::Blocked(result);
            }
            results.push(result);
        }
        StageOutcome::Completed(results)
    }

    /// Synthesize a failing result for a fail-closed RBAC denial; the rule
    /// body never ran, so latency stays at zero
    fn denial_result(
        &self,
        rule: &dyn Rule,
        stage: Stage,
        assigned: &HashSet<String>,
        missing: &[String],
    ) -> RuleResult {
        let mut assigned: Vec<&String> = assigned.iter().collect();
        assigned.sort();
        RuleResult::fail(rule.name(), stage, rule.severity())
            .with_detail("error", json!("rbac_denied"))
            .with_detail(
                "required_roles",
                json!(rule.spec().required_roles().iter().collect::<Vec<_>>()),
            )
            .with_detail("missing_roles", json!(missing))
            .with_detail("assigned_roles", json!(assigned))
    }

    /// Sink dispatch: happens for both passing and failing results, even
    /// when the pipeline is about to abort
    fn after_rule(&self, result: &RuleResult, context: &EvaluationContext) {
        let event = AuditEvent::from_result(&self.name, result, context);
        self.audit_sink.record(&event);
        self.performance_sink.record(result, context);
        if result.passed {
            debug!(
                guard = %self.name,
                rule = %result.rule,
                stage = %result.stage,
                "guardrail passed"
            );
        } else {
            warn!(
                guard = %self.name,
                rule = %result.rule,
                stage = %result.stage,
                severity = %result.severity,
                "guardrail failed"
            );
        }
    }

    fn fault(&self, rule: &str, stage: Stage, source: anyhow::Error) -> StageOutcome {
        error!(
            guard = %self.name,
            rule = %rule,
            stage = %stage,
            error = %source,
            "rule raised an unexpected fault"
        );
        StageOutcome::Faulted {
            rule: rule.to_string(),
            source,
        }
    }
}
