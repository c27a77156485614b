//! Rule condition and operator definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// ConditionType is the connection attribute a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionType {
    /// Target host, exact or `*.suffix`
    Domain,
    /// Destination country code
    Geo,
}

impl ConditionType {
    /// Parse a condition type from a string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DOMAIN" => Some(ConditionType::Domain),
            "GEO" | "GEOIP" => Some(ConditionType::Geo),
            _ => None,
        }
    }

    /// Get the canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Domain => "DOMAIN",
            ConditionType::Geo => "GEO",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// MatchOp says whether a rule wants membership or non-membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOp {
    #[default]
    In,
    NotIn,
}

impl MatchOp {
    /// Parse an operator from a string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "IN" => Some(MatchOp::In),
            "NOT_IN" | "NOTIN" => Some(MatchOp::NotIn),
            _ => None,
        }
    }

    /// Get the canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOp::In => "IN",
            MatchOp::NotIn => "NOT_IN",
        }
    }

    /// Apply the operator to a membership result.
    #[inline]
    pub fn apply(self, member: bool) -> bool {
        match self {
            MatchOp::In => member,
            MatchOp::NotIn => !member,
        }
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_type_parse() {
        assert_eq!(ConditionType::parse("DOMAIN"), Some(ConditionType::Domain));
        assert_eq!(ConditionType::parse("domain"), Some(ConditionType::Domain));
        assert_eq!(ConditionType::parse("GEO"), Some(ConditionType::Geo));
        assert_eq!(ConditionType::parse("geoip"), Some(ConditionType::Geo));
        assert_eq!(ConditionType::parse("AD_BLOCK"), None);
    }

    #[test]
    fn test_match_op_parse() {
        assert_eq!(MatchOp::parse("IN"), Some(MatchOp::In));
        assert_eq!(MatchOp::parse("not_in"), Some(MatchOp::NotIn));
        assert_eq!(MatchOp::parse("NOT-IN"), Some(MatchOp::NotIn));
        assert_eq!(MatchOp::parse("BETWEEN"), None);
    }

    #[test]
    fn test_match_op_apply() {
        assert!(MatchOp::In.apply(true));
        assert!(!MatchOp::In.apply(false));
        assert!(!MatchOp::NotIn.apply(true));
        assert!(MatchOp::NotIn.apply(false));
    }

    #[test]
    fn test_serde_names() {
        let op: MatchOp = serde_json::from_str("\"NOT_IN\"").unwrap();
        assert_eq!(op, MatchOp::NotIn);
        let ty: ConditionType = serde_json::from_str("\"GEO\"").unwrap();
        assert_eq!(ty, ConditionType::Geo);
        assert_eq!(serde_json::to_string(&MatchOp::NotIn).unwrap(), "\"NOT_IN\"");
    }
}
