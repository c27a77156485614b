//! Routes and route evaluation.

use ahash::AHashMap;

use crate::context::ConnectionTarget;
use crate::policy::Policy;
use crate::rule::RouteRule;
use crate::RouteId;

/// All routes of a snapshot, by id.
pub type RouteCatalog = AHashMap<RouteId, Route>;

/// A named rule set plus the policy applied to connections it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    rules: Vec<RouteRule>,
    pub policy: Policy,
    pub enabled: bool,
}

impl Route {
    pub fn new(
        id: RouteId,
        name: impl Into<String>,
        rules: Vec<RouteRule>,
        policy: Policy,
        enabled: bool,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            rules,
            policy,
            enabled,
        }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// A route matches iff it is enabled and every one of its rules matches.
    pub fn evaluate(&self, target: &ConnectionTarget) -> bool {
        if !self.enabled || self.rules.is_empty() {
            return false;
        }
        self.rules.iter().all(|rule| rule.matches(target))
    }
}

/// Evaluate a route against a target.
#[inline]
pub fn evaluate(route: &Route, target: &ConnectionTarget) -> bool {
    route.evaluate(target)
}
