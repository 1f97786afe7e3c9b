//! Closed rule registry
//!
//! Config-driven rule construction: a tagged descriptor maps to exactly one
//! rule constructor, and everything (stage sets, regexes, schemas) is
//! validated when the descriptor is built, not at call time. Unknown rule
//! kinds are unrepresentable; serde rejects them when parsing a descriptor.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use guardrails_core::{GuardError, GuardResult, Rule, RuleSpec, Severity, Stage};

use crate::injection::InjectionRule;
use crate::pii::PiiRule;
use crate::schema::SchemaRule;

/// Settings shared by every rule descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    pub name: Option<String>,
    pub stages: Option<Vec<Stage>>,
    pub required_roles: Vec<String>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub patterns: Option<BTreeMap<String, String>>,
    pub allowlist: Vec<String>,
    pub match_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub allow_patterns: Vec<String>,
    pub min_findings_to_fail: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub schema: Option<Value>,
    pub required_fields: Option<Vec<String>>,
}

/// Descriptor for one configured rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleDescriptor {
    Pii(PiiConfig),
    Injection(InjectionConfig),
    Schema(SchemaConfig),
}

impl RuleDescriptor {
    /// Build the configured rule, validating eagerly
    pub fn build(&self) -> GuardResult<Arc<dyn Rule>> {
        match self {
            Self::Pii(config) => {
                let spec = spec_from(&config.common, "pii", vec![Stage::Post], Severity::Critical)?;
                let mut rule = PiiRule::with_spec(spec)?;
                if let Some(patterns) = &config.patterns {
                    rule = rule.patterns(patterns)?;
                }
                if !config.allowlist.is_empty() {
                    rule = rule.allowlist(config.allowlist.iter().cloned());
                }
                if let Some(limit) = config.match_limit {
                    rule = rule.match_limit(limit);
                }
                Ok(Arc::new(rule))
            }
            Self::Injection(config) => {
                let spec = spec_from(
                    &config.common,
                    "prompt_injection",
                    vec![Stage::Pre, Stage::Post],
                    Severity::High,
                )?;
                let mut rule = InjectionRule::with_spec(spec)?;
                if !config.allow_patterns.is_empty() {
                    rule = rule.allow_patterns(&config.allow_patterns)?;
                }
                if let Some(count) = config.min_findings_to_fail {
                    rule = rule.min_findings_to_fail(count);
                }
                Ok(Arc::new(rule))
            }
            Self::Schema(config) => {
                let spec = spec_from(&config.common, "schema", vec![Stage::Post], Severity::High)?;
                let rule = match (&config.schema, &config.required_fields) {
                    (Some(schema), None) => SchemaRule::with_spec(schema.clone(), spec)?,
                    (None, Some(fields)) => {
                        let schema = SchemaRule::required_fields(fields.iter().cloned())?
                            .raw_schema()
                            .clone();
                        SchemaRule::with_spec(schema, spec)?
                    }
                    (Some(_), Some(_)) => {
                        return Err(GuardError::Configuration(
                            "schema descriptor takes either 'schema' or 'required_fields', not both"
                                .to_string(),
                        ))
                    }
                    (None, None) => {
                        return Err(GuardError::Configuration(
                            "schema descriptor requires 'schema' or 'required_fields'".to_string(),
                        ))
                    }
                };
                Ok(Arc::new(rule))
            }
        }
    }
}

fn spec_from(
    common: &CommonConfig,
    default_name: &str,
    default_stages: Vec<Stage>,
    default_severity: Severity,
) -> GuardResult<RuleSpec> {
    let name = common
        .name
        .clone()
        .unwrap_or_else(|| default_name.to_string());
    let stages = common.stages.clone().unwrap_or(default_stages);
    let mut spec = RuleSpec::new(name, stages)?
        .with_severity(common.severity.unwrap_or(default_severity));
    if !common.required_roles.is_empty() {
        spec = spec.with_required_roles(common.required_roles.iter().cloned());
    }
    if let Some(enabled) = common.enabled {
        spec = spec.with_enabled(enabled);
    }
    Ok(spec)
}

/// Build all configured rules in order
pub fn build_rules(descriptors: &[RuleDescriptor]) -> GuardResult<Vec<Arc<dyn Rule>>> {
    descriptors.iter().map(RuleDescriptor::build).collect()
}
