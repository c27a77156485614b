//! Per-connection input to the decision engine.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{InboundId, UserId};

/// Normalize a host for comparison: lowercase, trailing dot stripped.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Normalize a country code: uppercase, `None` when blank.
pub fn normalize_geo(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_ascii_uppercase)
}

/// Target attributes of a connection that rules are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    /// Normalized target host (domain or IP literal)
    host: String,
    /// Target port
    port: u16,
    /// Destination country code, if resolved
    dst_geo: Option<String>,
    /// Source country code, if resolved
    src_geo: Option<String>,
}

impl ConnectionTarget {
    /// Create a target, normalizing the host.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: normalize_host(host),
            port,
            dst_geo: None,
            src_geo: None,
        }
    }

    /// Set the destination country code.
    #[must_use]
    pub fn with_dst_geo(mut self, code: Option<&str>) -> Self {
        self.dst_geo = normalize_geo(code);
        self
    }

    /// Set the source country code.
    #[must_use]
    pub fn with_src_geo(mut self, code: Option<&str>) -> Self {
        self.src_geo = normalize_geo(code);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Country code GEO rules are tested against.
    pub fn geo(&self) -> Option<&str> {
        self.dst_geo.as_deref()
    }

    pub fn src_geo(&self) -> Option<&str> {
        self.src_geo.as_deref()
    }
}

/// Everything the engine needs to know about one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Listener that accepted the connection
    pub inbound_id: InboundId,
    /// Authenticated user, `None` for anonymous inbounds
    pub user_id: Option<UserId>,
    /// Where the client wants to go
    pub target: ConnectionTarget,
    /// Local wall-clock time of acceptance
    pub at: NaiveDateTime,
}

impl ConnectionContext {
    /// Create a context stamped with the current local time.
    pub fn new(inbound_id: InboundId, user_id: Option<UserId>, target: ConnectionTarget) -> Self {
        Self {
            inbound_id,
            user_id,
            target,
            at: Local::now().naive_local(),
        }
    }

    /// Override the acceptance time.
    #[must_use]
    pub fn at(mut self, at: NaiveDateTime) -> Self {
        self.at = at;
        self
    }
}
