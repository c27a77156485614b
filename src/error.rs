//! Error types for routegate.

use std::fmt;

use thiserror::Error;

use crate::{InboundId, RateLimitId, RouteId, UserId};

/// Error type for routegate operations.
///
/// Nothing on the per-connection decision path returns this type; it is
/// produced by feed loading, snapshot validation and the CLI.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The feed violates one or more configuration invariants
    #[error("invalid configuration: {0}")]
    Validation(ValidationErrors),

    /// Configuration store could not be reached or answered badly
    #[error("config source error: {0}")]
    Source(String),

    /// GeoIP database error
    #[error("GeoIP error: {0}")]
    GeoIp(String),

    /// Feed encoding could not be determined
    #[error("unsupported feed format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for routegate operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

/// A single configuration invariant violation.
///
/// These are the messages surfaced back to the admin console on writes and
/// logged when a reload is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigViolation {
    #[error("duplicate inbound id {0}")]
    DuplicateInbound(InboundId),

    #[error("duplicate route id {0}")]
    DuplicateRoute(RouteId),

    #[error("duplicate rate limit id {0}")]
    DuplicateRateLimit(RateLimitId),

    #[error("inbound {inbound}: port must be in 1-65535")]
    InvalidListenPort { inbound: InboundId },

    #[error("inbound {inbound}: invalid listen address {addr:?}")]
    InvalidListenAddress { inbound: InboundId, addr: String },

    #[error("inbound {inbound}: {addr}:{port} is already used by inbound {other}")]
    ListenConflict {
        inbound: InboundId,
        other: InboundId,
        addr: String,
        port: u16,
    },

    #[error("inbound {inbound}: {protocol} does not support TLS")]
    TlsNotSupported { inbound: InboundId, protocol: String },

    #[error("inbound {inbound}: Shadowsocks requires a cipher")]
    MissingCipher { inbound: InboundId },

    #[error("inbound {inbound}: Shadowsocks binding must have exactly one user, found {found}")]
    SharedKeyBinding { inbound: InboundId, found: usize },

    #[error("inbound {inbound}: user {user} appears in more than one binding")]
    OverlappingBindings { inbound: InboundId, user: UserId },

    #[error("inbound {inbound}: more than one anonymous binding")]
    MultipleAnonymousBindings { inbound: InboundId },

    #[error("route {route}: at least one rule is required")]
    EmptyRoute { route: RouteId },

    #[error("route {route}: name must be 2-50 characters")]
    InvalidRouteName { route: RouteId },

    #[error("route {route}: rule {index} has an empty value")]
    EmptyRuleValue { route: RouteId, index: usize },

    #[error("route {route}: invalid domain pattern {value:?}")]
    InvalidDomainPattern { route: RouteId, value: String },

    #[error("route {route}: invalid country code {value:?}")]
    InvalidCountryCode { route: RouteId, value: String },

    #[error("route {route}: {policy} requires {field}")]
    MissingOutboundField {
        route: RouteId,
        policy: &'static str,
        field: &'static str,
    },

    #[error("route {route}: invalid outbound {field} {value:?}")]
    InvalidOutboundField {
        route: RouteId,
        field: &'static str,
        value: String,
    },

    #[error("rate limit {limit}: USERS scope requires at least one user")]
    EmptyUserScope { limit: RateLimitId },

    #[error("rate limit {limit}: GLOBAL scope must not list users")]
    GlobalScopeWithUsers { limit: RateLimitId },

    #[error("rate limit {limit}: {field} must be greater than 0")]
    NonPositiveCap {
        limit: RateLimitId,
        field: &'static str,
    },

    #[error("rate limit {limit}: effective date range starts after it ends")]
    InvertedDateRange { limit: RateLimitId },

    #[error("rate limit {limit}: daily window needs both a start and an end")]
    HalfOpenTimeWindow { limit: RateLimitId },
}

/// Error type for compiling a single route rule value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Value is empty after trimming
    #[error("empty rule value")]
    EmptyValue,

    /// Not an exact host or a `*.suffix` wildcard
    #[error("invalid domain pattern: {0}")]
    InvalidDomainPattern(String),

    /// Country code must be 2 ASCII letters
    #[error("invalid country code (must be 2 letters): {0}")]
    InvalidCountryCode(String),
}

/// A non-empty list of [`ConfigViolation`]s found while building a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ConfigViolation>);

impl ValidationErrors {
    pub(crate) fn new(violations: Vec<ConfigViolation>) -> Option<Self> {
        if violations.is_empty() {
            None
        } else {
            Some(Self(violations))
        }
    }

    /// The individual violations, in discovery order.
    pub fn violations(&self) -> &[ConfigViolation] {
        &self.0
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
