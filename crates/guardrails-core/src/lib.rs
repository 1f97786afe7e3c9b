//! Guardrails: stage-based rule orchestration around LLM and agent calls
//!
//! Validates inputs before a call and outputs after it, using an ordered set
//! of pluggable rules gated by RBAC, with audit and performance sinks
//! observing every rule execution.
//!
//! # Architecture
//!
//! - **Guard**: owns the rule set, runs the pre/post pipeline, enforces RBAC,
//!   measures latency, dispatches sink events
//! - **Rule**: polymorphic validator declaring its stages, required roles,
//!   and severity; sync by default, async-capable via `evaluate_async`
//! - **Sinks**: narrow audit/performance observers, shareable across guards
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use guardrails_core::{EvaluationContext, Guard, Outcome, Rule, RuleResult, RuleSpec, Stage};
//! use serde_json::{json, Value};
//!
//! #[derive(Debug)]
//! struct NonEmptyOutput {
//!     spec: RuleSpec,
//! }
//!
//! impl Rule for NonEmptyOutput {
//!     fn spec(&self) -> &RuleSpec {
//!         &self.spec
//!     }
//!
//!     fn evaluate(
//!         &self,
//!         payload: &Value,
//!         _context: &EvaluationContext,
//!         stage: Stage,
//!     ) -> anyhow::Result<RuleResult> {
//!         let empty = payload.as_str().map(str::is_empty).unwrap_or(false);
//!         Ok(if empty {
//!             RuleResult::fail(self.name(), stage, self.severity())
//!         } else {
//!             RuleResult::pass(self.name(), stage, self.severity())
//!         })
//!     }
//! }
//!
//! let rule = Arc::new(NonEmptyOutput {
//!     spec: RuleSpec::new("non_empty_output", vec![Stage::Post]).unwrap(),
//! });
//! let guard = Guard::new(vec![rule]).unwrap();
//!
//! let outcome = guard.protect_sync(EvaluationContext::new(json!("prompt")), || {
//!     Ok(json!("model response"))
//! });
//! assert!(matches!(outcome, Outcome::Passed { .. }));
//! ```

pub mod context;
pub mod error;
pub mod guard;
pub mod rbac;
pub mod rule;
pub mod sink;
pub mod types;

pub use context::EvaluationContext;
pub use error::{GuardError, GuardResult};
pub use guard::{Guard, Outcome};
pub use rbac::{RoleResolver, StaticRoles};
pub use rule::{Rule, RuleSpec};
pub use sink::{
    AuditEvent, AuditSink, MemoryAuditSink, NullAuditSink, NullPerformanceSink, PerformanceSink,
    TracingAuditSink, TracingPerformanceSink,
};
pub use types::{GuardReport, RuleResult, Severity, Stage};
