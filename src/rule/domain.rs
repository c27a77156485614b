//! Domain pattern matching.

use crate::context::{normalize_host, ConnectionTarget};
use crate::error::RuleError;
use crate::ConditionType;
use super::Matcher;

/// DomainPattern matches target hosts using exact or subdomain-wildcard matching.
///
/// # Pattern Formats
/// - Exact match: `example.com` - matches only `example.com`
/// - Wildcard match: `*.example.com` - matches `a.example.com`, `a.b.example.com`,
///   but not the bare `example.com`
///
/// # Examples
/// ```
/// use routegate::rule::DomainPattern;
/// use routegate::ConnectionTarget;
/// use routegate::rule::Matcher;
///
/// let pattern = DomainPattern::parse("*.example.com").unwrap();
/// assert_eq!(pattern.membership(&ConnectionTarget::new("www.example.com", 443)), Some(true));
/// assert_eq!(pattern.membership(&ConnectionTarget::new("example.com", 443)), Some(false));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    /// Exact host (lowercase, no trailing dot)
    Exact(String),
    /// Subdomain wildcard, stored as `.suffix` with the leading dot
    Wildcard(String),
}

impl DomainPattern {
    /// Parse a rule value into a pattern.
    pub fn parse(value: &str) -> Result<Self, RuleError> {
        let value = normalize_host(value);

        if value.is_empty() {
            return Err(RuleError::EmptyValue);
        }

        if let Some(suffix) = value.strip_prefix("*.") {
            if !valid_labels(suffix) {
                return Err(RuleError::InvalidDomainPattern(value));
            }
            return Ok(DomainPattern::Wildcard(format!(".{}", suffix)));
        }

        if !valid_labels(&value) {
            return Err(RuleError::InvalidDomainPattern(value));
        }

        Ok(DomainPattern::Exact(value))
    }

    /// Check a normalized host against this pattern.
    pub fn matches_host(&self, host: &str) -> bool {
        match self {
            DomainPattern::Exact(exact) => host == exact,
            DomainPattern::Wildcard(suffix) => match host.strip_suffix(suffix.as_str()) {
                // At least one non-empty label must precede the suffix
                Some(prefix) => !prefix.is_empty() && !prefix.ends_with('.'),
                None => false,
            },
        }
    }
}

/// Labels must be non-empty and free of wildcards.
fn valid_labels(s: &str) -> bool {
    !s.is_empty() && !s.contains('*') && s.split('.').all(|label| !label.is_empty())
}

impl Matcher for DomainPattern {
    fn membership(&self, target: &ConnectionTarget) -> Option<bool> {
        let host = target.host();
        if host.is_empty() {
            return None;
        }
        Some(self.matches_host(host))
    }

    fn condition(&self) -> ConditionType {
        ConditionType::Domain
    }
}
