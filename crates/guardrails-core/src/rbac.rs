//! Role resolution for RBAC-gated rules

use std::collections::HashSet;

use crate::context::EvaluationContext;

/// Maps an evaluation context to the caller's role set.
///
/// Typically backed by an external identity system. The guard calls the
/// resolver once per stage invocation, not once per rule, so several rules
/// sharing role requirements do not trigger redundant lookups. Without a
/// resolver the role set is empty and any rule with non-empty required roles
/// fails closed.
pub trait RoleResolver: Send + Sync {
    fn resolve(&self, context: &EvaluationContext) -> HashSet<String>;
}

impl<F> RoleResolver for F
where
    F: Fn(&EvaluationContext) -> HashSet<String> + Send + Sync,
{
    fn resolve(&self, context: &EvaluationContext) -> HashSet<String> {
        self(context)
    }
}

/// Resolver that returns the same role set for every call
#[derive(Debug, Clone, Default)]
pub struct StaticRoles(pub HashSet<String>);

impl StaticRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }
}

impl RoleResolver for StaticRoles {
    fn resolve(&self, _context: &EvaluationContext) -> HashSet<String> {
        self.0.clone()
    }
}
