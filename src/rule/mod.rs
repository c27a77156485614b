//! Route rules and the matcher trait.

mod domain;
mod geo;

pub use domain::DomainPattern;
pub use geo::GeoSet;

use crate::context::ConnectionTarget;
use crate::error::RuleError;
use crate::{ConditionType, MatchOp};

/// Matcher is the membership test behind a single rule condition.
pub trait Matcher: Send + Sync {
    /// Test whether the target is a member of this matcher's set.
    ///
    /// # Returns
    /// `Some(true)`/`Some(false)` for a definite answer, `None` when the
    /// target lacks the attribute this matcher inspects (no host, no geo).
    fn membership(&self, target: &ConnectionTarget) -> Option<bool>;

    /// Get the condition type this matcher evaluates.
    fn condition(&self) -> ConditionType;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Compiled {
    Domain(DomainPattern),
    Geo(GeoSet),
}

impl Compiled {
    fn as_matcher(&self) -> &dyn Matcher {
        match self {
            Compiled::Domain(p) => p,
            Compiled::Geo(g) => g,
        }
    }
}

/// A compiled route rule: condition, operator and parsed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    op: MatchOp,
    value: String,
    compiled: Compiled,
}

impl RouteRule {
    /// Compile a rule from its configuration triple.
    ///
    /// # Examples
    /// ```
    /// use routegate::rule::RouteRule;
    /// use routegate::{ConditionType, ConnectionTarget, MatchOp};
    ///
    /// let rule = RouteRule::compile(ConditionType::Domain, MatchOp::NotIn, "*.ads.com").unwrap();
    /// assert!(rule.matches(&ConnectionTarget::new("example.com", 443)));
    /// assert!(!rule.matches(&ConnectionTarget::new("x.ads.com", 443)));
    /// ```
    pub fn compile(condition: ConditionType, op: MatchOp, value: &str) -> Result<Self, RuleError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(RuleError::EmptyValue);
        }

        let compiled = match condition {
            ConditionType::Domain => Compiled::Domain(DomainPattern::parse(value)?),
            ConditionType::Geo => Compiled::Geo(GeoSet::parse(value)?),
        };

        Ok(Self {
            op,
            value: value.to_string(),
            compiled,
        })
    }

    pub fn condition(&self) -> ConditionType {
        self.compiled.as_matcher().condition()
    }

    pub fn op(&self) -> MatchOp {
        self.op
    }

    /// The trimmed configuration value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Evaluate this rule against a target.
    ///
    /// Missing data never matches, whichever the operator.
    pub fn matches(&self, target: &ConnectionTarget) -> bool {
        match self.compiled.as_matcher().membership(target) {
            Some(member) => self.op.apply(member),
            None => false,
        }
    }
}

/// Evaluate one rule against a target.
#[inline]
pub fn matches(rule: &RouteRule, target: &ConnectionTarget) -> bool {
    rule.matches(target)
}
