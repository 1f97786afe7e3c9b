//! Audit and performance sinks
//!
//! Narrow consumer interfaces invoked synchronously after each rule result is
//! computed, before the pipeline decides whether to abort. Sinks may be
//! shared across guards; sink reliability is the sink's own concern, the
//! engine does not guard against a misbehaving sink.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::EvaluationContext;
use crate::types::{RuleResult, Severity, Stage};

/// Structured event emitted once per rule execution
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub guard: String,
    pub rule: String,
    pub passed: bool,
    pub stage: Stage,
    pub severity: Severity,
    pub latency_ms: f64,
    pub details: serde_json::Map<String, Value>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub call_id: String,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn from_result(guard: &str, result: &RuleResult, context: &EvaluationContext) -> Self {
        Self {
            guard: guard.to_string(),
            rule: result.rule.clone(),
            passed: result.passed,
            stage: result.stage,
            severity: result.severity,
            latency_ms: result.latency_ms,
            details: result.details.clone(),
            user_id: context.user_id.clone(),
            session_id: context.session_id.clone(),
            call_id: context.call_id.clone(),
            tags: context.tags.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives one audit event per rule execution. Delivery and persistence are
/// entirely the sink's concern.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Receives per-result latency data, independent of the audit sink
pub trait PerformanceSink: Send + Sync {
    fn record(&self, result: &RuleResult, context: &EvaluationContext);
}

/// Audit sink that discards all events
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Performance sink that discards all measurements
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPerformanceSink;

impl PerformanceSink for NullPerformanceSink {
    fn record(&self, _result: &RuleResult, _context: &EvaluationContext) {}
}

/// Audit sink that emits structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        if event.passed {
            info!(
                target: "guardrails::audit",
                guard = %event.guard,
                rule = %event.rule,
                stage = %event.stage,
                severity = %event.severity,
                latency_ms = event.latency_ms,
                call_id = %event.call_id,
                "guardrail passed"
            );
        } else {
            warn!(
                target: "guardrails::audit",
                guard = %event.guard,
                rule = %event.rule,
                stage = %event.stage,
                severity = %event.severity,
                latency_ms = event.latency_ms,
                call_id = %event.call_id,
                details = %serde_json::Value::Object(event.details.clone()),
                "guardrail failed"
            );
        }
    }
}

/// Performance sink that logs rule latency at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPerformanceSink;

impl PerformanceSink for TracingPerformanceSink {
    fn record(&self, result: &RuleResult, context: &EvaluationContext) {
        debug!(
            target: "guardrails::performance",
            rule = %result.rule,
            stage = %result.stage,
            latency_ms = result.latency_ms,
            user_id = context.user_id.as_deref().unwrap_or(""),
            session_id = context.session_id.as_deref().unwrap_or(""),
            "guardrail rule latency"
        );
    }
}

/// Audit sink that buffers events in memory, for tests and in-process
/// inspection
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}
