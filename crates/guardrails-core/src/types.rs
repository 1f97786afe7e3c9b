//! Core result types for the guardrail engine

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::EvaluationContext;

/// Pipeline stage a rule runs in: before or after the underlying call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pre,
    Post,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// Severity label attached to a rule and its results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl Severity {
    /// Parse severity from string (case-insensitive), defaulting to Medium
    pub fn from_str_lenient(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

/// Structured outcome of a single rule evaluation
///
/// `latency_ms` is stamped by the engine after evaluation returns; a value
/// set by the rule itself is overwritten so measurement semantics stay
/// consistent across rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule: String,
    pub passed: bool,
    pub stage: Stage,
    pub severity: Severity,
    pub latency_ms: f64,
    #[serde(default)]
    pub details: serde_json::Map<String, Value>,
}

impl RuleResult {
    /// Build a passing result
    pub fn pass(rule: impl Into<String>, stage: Stage, severity: Severity) -> Self {
        Self {
            rule: rule.into(),
            passed: true,
            stage,
            severity,
            latency_ms: 0.0,
            details: serde_json::Map::new(),
        }
    }

    /// Build a failing result
    pub fn fail(rule: impl Into<String>, stage: Stage, severity: Severity) -> Self {
        Self {
            passed: false,
            ..Self::pass(rule, stage, severity)
        }
    }

    /// Attach a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Whether this result is a synthesized RBAC denial rather than an
    /// ordinary rule failure
    pub fn is_rbac_denial(&self) -> bool {
        self.details
            .get("error")
            .and_then(Value::as_str)
            .map(|e| e == "rbac_denied")
            .unwrap_or(false)
    }
}

/// Aggregate outcome of one guarded call or manual check
///
/// Pre-stage results always precede post-stage results; within a stage,
/// result order equals rule configuration order. Produced fresh per call and
/// immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct GuardReport {
    pub context: EvaluationContext,
    pub pre_results: Vec<RuleResult>,
    pub post_results: Vec<RuleResult>,
}

impl GuardReport {
    /// Logical AND over all results; vacuously true when no rules ran
    pub fn passed(&self) -> bool {
        self.pre_results
            .iter()
            .chain(self.post_results.iter())
            .all(|r| r.passed)
    }

    /// Failing results in execution order
    pub fn failures(&self) -> Vec<&RuleResult> {
        self.pre_results
            .iter()
            .chain(self.post_results.iter())
            .filter(|r| !r.passed)
            .collect()
    }
}
