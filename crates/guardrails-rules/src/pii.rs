//! PII detection rule
//!
//! Regex-based detection of common personally identifiable information.
//! Patterns are intentionally strict to reduce false positives.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use guardrails_core::{
    EvaluationContext, GuardError, GuardResult, Rule, RuleResult, RuleSpec, Severity, Stage,
};

const DEFAULT_MATCH_LIMIT: usize = 20;

/// Default entity patterns: email, phone, ssn, credit_card, ipv4
fn default_patterns() -> GuardResult<Vec<(String, Regex)>> {
    [
        ("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
        ("phone", r"(?:\+?\d{1,3}[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?){2}\d{4}"),
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
        ("credit_card", r"\b(?:\d[ -]*?){13,16}\b"),
        (
            "ipv4",
            r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b",
        ),
    ]
    .iter()
    .map(|(entity, pattern)| {
        Regex::new(pattern)
            .map(|re| (entity.to_string(), re))
            .map_err(|e| {
                GuardError::Configuration(format!("builtin PII pattern '{entity}': {e}"))
            })
    })
    .collect()
}

/// Yield string fragments from arbitrary payload structures
fn flatten_payload(payload: &Value, fragments: &mut Vec<String>) {
    match payload {
        Value::Null => {}
        Value::String(s) => fragments.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                flatten_payload(item, fragments);
            }
        }
        Value::Object(_) => fragments.push(payload.to_string()),
        other => fragments.push(other.to_string()),
    }
}

/// Detects common personally identifiable information in payloads.
///
/// Fails when any configured entity pattern matches outside the allowlist;
/// matched entities land in the result details under `"matches"`.
#[derive(Debug)]
pub struct PiiRule {
    spec: RuleSpec,
    patterns: Vec<(String, Regex)>,
    allowlist: HashSet<String>,
    match_limit: usize,
}

impl PiiRule {
    /// Default configuration: post stage, critical severity, builtin patterns
    pub fn new() -> GuardResult<Self> {
        Self::with_spec(RuleSpec::new("pii", vec![Stage::Post])?.with_severity(Severity::Critical))
    }

    pub fn with_spec(spec: RuleSpec) -> GuardResult<Self> {
        Ok(Self {
            spec,
            patterns: default_patterns()?,
            allowlist: HashSet::new(),
            match_limit: DEFAULT_MATCH_LIMIT,
        })
    }

    /// Replace the detection patterns; compiled eagerly, an empty map or an
    /// invalid pattern is a configuration error
    pub fn patterns(mut self, patterns: &BTreeMap<String, String>) -> GuardResult<Self> {
        if patterns.is_empty() {
            return Err(GuardError::Configuration(
                "PII rule requires at least one detection pattern".to_string(),
            ));
        }
        self.patterns = patterns
            .iter()
            .map(|(entity, pattern)| {
                Regex::new(pattern)
                    .map(|re| (entity.clone(), re))
                    .map_err(|e| {
                        GuardError::Configuration(format!(
                            "invalid PII pattern for entity '{entity}': {e}"
                        ))
                    })
            })
            .collect::<GuardResult<_>>()?;
        Ok(self)
    }

    /// Matches equal (case-insensitive) to an allowlisted value are ignored
    pub fn allowlist<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = values.into_iter().map(|v| v.into().to_lowercase()).collect();
        self
    }

    /// Cap on reported matches per entity
    pub fn match_limit(mut self, limit: usize) -> Self {
        self.match_limit = limit.max(1);
        self
    }
}

impl Rule for PiiRule {
    fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    fn evaluate(
        &self,
        payload: &Value,
        _context: &EvaluationContext,
        stage: Stage,
    ) -> anyhow::Result<RuleResult> {
        let mut fragments = Vec::new();
        flatten_payload(payload, &mut fragments);

        let mut matches: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for fragment in &fragments {
            if fragment.is_empty() {
                continue;
            }
            for (entity, pattern) in &self.patterns {
                let entity_matches = matches.entry(entity.clone()).or_default();
                if entity_matches.len() >= self.match_limit {
                    continue;
                }
                for found in pattern.find_iter(fragment) {
                    if entity_matches.len() >= self.match_limit {
                        break;
                    }
                    let text = found.as_str();
                    if text.is_empty() || self.allowlist.contains(&text.to_lowercase()) {
                        continue;
                    }
                    entity_matches.insert(text.to_string());
                }
            }
        }
        matches.retain(|_, found| !found.is_empty());

        debug!(
            rule = %self.name(),
            stage = %stage,
            entities = matches.len(),
            "PII scan complete"
        );

        let result = if matches.is_empty() {
            RuleResult::pass(self.name(), stage, self.severity())
        } else {
            RuleResult::fail(self.name(), stage, self.severity())
                .with_detail("matches", json!(matches))
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
    fn test_detects_phone_number_in_object_payload() {
        let rule = PiiRule::new().unwrap();
        let payload = json!({"message": "Call 555-123-4567"});
        let result = rule.evaluate(&payload, &ctx(), Stage::Post).unwrap();
        assert!(!result.passed);
        let matches = &result.details["matches"];
        assert!(matches.get("phone").is_some());
    }

    #[test]
    fn test_detects_email_and_ssn() {
        let rule = PiiRule::new().unwrap();
        let payload = json!("Reach jane@example.com, SSN 123-45-6789");
        let result = rule.evaluate(&payload, &ctx(), Stage::Post).unwrap();
        assert!(!result.passed);
        let matches = result.details["matches"].as_object().unwrap();
        assert!(matches.contains_key("email"));
        assert!(matches.contains_key("ssn"));
    }

    #[test]
    fn test_clean_payload_passes() {
        let rule = PiiRule::new().unwrap();
        let payload = json!({"message": "All systems operational."});
        let result = rule.evaluate(&payload, &ctx(), Stage::Post).unwrap();
        assert!(result.passed);
        assert!(result.details.is_empty());
    }

    #[test]
    fn test_allowlist_suppresses_match() {
        let rule = PiiRule::new().unwrap().allowlist(["Support@Example.com"]);
        let payload = json!("Contact support@example.com for help");
        let result = rule.evaluate(&payload, &ctx(), Stage::Post).unwrap();
        assert!(result.passed);
    }

    #[test]
    fn test_match_limit_caps_reported_entities() {
        let rule = PiiRule::new().unwrap().match_limit(2);
        let payload = json!([
            "a@example.com",
            "b@example.com",
            "c@example.com",
            "d@example.com"
        ]);
        let result = rule.evaluate(&payload, &ctx(), Stage::Post).unwrap();
        assert!(!result.passed);
        let emails = result.details["matches"]["email"].as_array().unwrap();
        assert_eq!(emails.len(), 2);
    }

    #[test]
    fn test_empty_pattern_map_is_configuration_error() {
        let err = PiiRule::new()
            .unwrap()
            .patterns(&BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let mut patterns = BTreeMap::new();
        patterns.insert("broken".to_string(), "(unclosed".to_string());
        let err = PiiRule::new().unwrap().patterns(&patterns).unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }

    #[test]
    fn test_custom_patterns_replace_defaults() {
        let mut patterns = BTreeMap::new();
        patterns.insert("badge_id".to_string(), r"\bBDG-\d{6}\b".to_string());
        let rule = PiiRule::new().unwrap().patterns(&patterns).unwrap();

        let result = rule
            .evaluate(&json!("badge BDG-123456"), &ctx(), Stage::Post)
            .unwrap();
        assert!(!result.passed);

        // default entities no longer fire
        let result = rule
            .evaluate(&json!("mail me at x@example.com"), &ctx(), Stage::Post)
            .unwrap();
        assert!(result.passed);
    }

    #[test]
    fn test_null_payload_passes() {
        let rule = PiiRule::new().unwrap();
        let result = rule.evaluate(&Value::Null, &ctx(), Stage::Post).unwrap();
        assert!(result.passed);
    }
}
