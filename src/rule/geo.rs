//! Country-code set matching.

use ahash::AHashSet;

use crate::context::ConnectionTarget;
use crate::error::RuleError;
use crate::ConditionType;
use super::Matcher;

/// GeoSet matches the connection's destination country against a set of
/// 2-letter ISO codes.
///
/// The rule value is a single code (`CN`) or a comma-separated set
/// (`US,CA,MX`). Codes are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoSet {
    /// Uppercase country codes
    countries: AHashSet<String>,
}

impl GeoSet {
    /// Parse a rule value into a country set.
    pub fn parse(value: &str) -> Result<Self, RuleError> {
        if value.trim().is_empty() {
            return Err(RuleError::EmptyValue);
        }

        let mut countries = AHashSet::new();
        for part in value.split(',') {
            let code = part.trim().to_ascii_uppercase();

            // Must be exactly 2 ASCII letters
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(RuleError::InvalidCountryCode(code));
            }
            countries.insert(code);
        }

        Ok(Self { countries })
    }

    /// Get the number of country codes in this set.
    pub fn count(&self) -> usize {
        self.countries.len()
    }

    /// Check if a country code is in this set.
    pub fn contains(&self, country: &str) -> bool {
        self.countries.contains(&country.to_ascii_uppercase())
    }
}

impl Matcher for GeoSet {
    fn membership(&self, target: &ConnectionTarget) -> Option<bool> {
        // Unknown geo is neither in nor out of any set
        let country = target.geo()?;
        Some(self.countries.contains(country))
    }

    fn condition(&self) -> ConditionType {
        ConditionType::Geo
    }
}
