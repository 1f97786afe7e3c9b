//! Per-call evaluation context threaded through a pipeline run

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Bundle of call inputs/outputs, metadata, identity, and tags for one
/// guarded invocation or manual check.
///
/// Treated as immutable once handed to the pipeline: the post-stage context
/// is always derived via [`EvaluationContext::with_output`], which copies
/// metadata and tags instead of aliasing them, so concurrent stages never
/// observe each other's state. Discarded after the report is produced.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationContext {
    pub inputs: Value,
    pub output: Option<Value>,
    pub metadata: HashMap<String, Value>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub tags: Vec<String>,
    /// Unique id for this guarded call, generated at construction
    pub call_id: String,
}

impl EvaluationContext {
    /// Create a context for the given call inputs
    pub fn new(inputs: Value) -> Self {
        Self {
            inputs,
            output: None,
            metadata: HashMap::new(),
            user_id: None,
            session_id: None,
            tags: Vec::new(),
            call_id: Uuid::new_v4().to_string(),
        }
    }

    /// Replace the captured inputs
    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    /// Return a copy of the context with the call output populated
    ///
    /// Pure transform: metadata and tags are copied, never shared.
    pub fn with_output(&self, output: Value) -> Self {
        Self {
            inputs: self.inputs.clone(),
            output: Some(output),
            metadata: self.metadata.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            tags: self.tags.clone(),
            call_id: self.call_id.clone(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
