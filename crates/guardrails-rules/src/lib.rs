//! Built-in guardrail rules
//!
//! Interchangeable, stateless validation strategies behind the
//! `guardrails_core::Rule` contract:
//!
//! - **PiiRule**: regex detection of emails, phone numbers, SSNs, credit
//!   cards, and IP addresses
//! - **InjectionRule**: layered prompt-injection heuristics with pluggable
//!   external detectors
//! - **SchemaRule**: Draft-7 JSON schema conformance
//!
//! Rules are built directly or through the closed [`registry`], which maps
//! tagged descriptors to constructors and validates the whole configuration
//! eagerly.

pub mod injection;
pub mod pii;
pub mod registry;
pub mod schema;

pub use injection::{InjectionDetector, InjectionRule};
pub use pii::PiiRule;
pub use registry::{
    build_rules, CommonConfig, InjectionConfig, PiiConfig, RuleDescriptor, SchemaConfig,
};
pub use schema::SchemaRule;
