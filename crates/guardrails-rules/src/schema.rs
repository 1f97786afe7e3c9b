//! JSON schema conformance rule
//!
//! Validates payloads against a Draft-7 JSON schema compiled once at
//! configuration time. An invalid schema surfaces as a configuration error
//! at construction, never at call time.

use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};

use guardrails_core::{
    EvaluationContext, GuardError, GuardResult, Rule, RuleResult, RuleSpec, Severity, Stage,
};

/// Validates payloads against a compiled JSON schema.
///
/// Validation errors land in the result details under `"errors"`, one entry
/// per violation with the instance path and message.
pub struct SchemaRule {
    spec: RuleSpec,
    schema: JSONSchema,
    raw_schema: Value,
}

impl std::fmt::Debug for SchemaRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRule")
            .field("spec", &self.spec)
            .field("raw_schema", &self.raw_schema)
            .finish()
    }
}

impl SchemaRule {
    /// Default configuration: post stage, high severity
    pub fn new(schema: Value) -> GuardResult<Self> {
        Self::with_spec(
            schema,
            RuleSpec::new("schema", vec![Stage::Post])?.with_severity(Severity::High),
        )
    }

    pub fn with_spec(schema: Value, spec: RuleSpec) -> GuardResult<Self> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|e| GuardError::Configuration(format!("invalid JSON schema: {e}")))?;
        Ok(Self {
            spec,
            schema: compiled,
            raw_schema: schema,
        })
    }

    /// Convenience: an object schema that requires the given fields
    pub fn required_fields<I, S>(fields: I) -> GuardResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(GuardError::Configuration(
                "schema rule requires at least one required field".to_string(),
            ));
        }
        Self::new(json!({
            "type": "object",
            "required": fields,
        }))
    }

    pub fn raw_schema(&self) -> &Value {
        &self.raw_schema
    }
}

impl Rule for SchemaRule {
    fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    fn evaluate(
        &self,
        payload: &Value,
        _context: &EvaluationContext,
        stage: Stage,
    ) -> anyhow::Result<RuleResult> {
        let result = match self.schema.validate(payload) {
            Ok(()) => RuleResult::pass(self.name(), stage, self.severity()),
            Err(errors) => {
                let errors: Vec<Value> = errors
                    .map(|e| {
                        json!({
                            "path": e.instance_path.to_string(),
                            "message": e.to_string(),
                        })
                    })
                    .collect();
                RuleResult::fail(self.name(), stage, self.severity())
                    .with_detail("errors", Value::Array(errors))
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(Value::Null)
    }

    #[test]
    fn test_conforming_payload_passes() {
        let rule = SchemaRule::required_fields(["message", "channel"]).unwrap();
        let payload = json!({"message": "ok", "channel": "sms"});
        let result = rule.evaluate(&payload, &ctx(), Stage::Post).unwrap();
        assert!(result.passed);
    }

    #[test]
    fn test_missing_field_fails_with_details() {
        let rule = SchemaRule::required_fields(["message", "channel"]).unwrap();
        let payload = json!({"message": "ok"});
        let result = rule.evaluate(&payload, &ctx(), Stage::Post).unwrap();
        assert!(!result.passed);
        let errors = result.details["errors"].as_array().unwrap();
        assert!(errors
            .iter()
            .any(|e| e["message"].as_str().unwrap().contains("channel")));
    }

    #[test]
    fn test_full_schema_validation() {
        let rule = SchemaRule::new(json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer", "minimum": 0}
            },
            "required": ["count"],
        }))
        .unwrap();

        let result = rule
            .evaluate(&json!({"count": 3}), &ctx(), Stage::Post)
            .unwrap();
        assert!(result.passed);

        let result = rule
            .evaluate(&json!({"count": -1}), &ctx(), Stage::Post)
            .unwrap();
        assert!(!result.passed);
        let errors = result.details["errors"].as_array().unwrap();
        assert_eq!(errors[0]["path"], json!("/count"));
    }

    #[test]
    fn test_invalid_schema_is_configuration_error() {
        let err = SchemaRule::new(json!({"type": "not-a-type"})).unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }

    #[test]
    fn test_empty_required_fields_is_configuration_error() {
        let err = SchemaRule::required_fields(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }

    #[test]
    fn test_non_object_payload_fails_object_schema() {
        let rule = SchemaRule::required_fields(["message"]).unwrap();
        let result = rule
            .evaluate(&json!("just a string"), &ctx(), Stage::Post)
            .unwrap();
        assert!(!result.passed);
    }
}
