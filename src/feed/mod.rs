//! Configuration feed: the aggregate document published by the admin console.
//!
//! Field names follow the console's REST shapes (`InboundConfigDTO`,
//! `RouteDTO`, `RateLimitDTO`), so the JSON served by its aggregate config
//! endpoint deserializes directly:
//!
//! ```json
//! {
//!   "inbounds": [{
//!     "id": 1, "name": "socks-in", "protocol": "SOCKS5",
//!     "listenIp": "0.0.0.0", "port": 1080, "status": 1,
//!     "inboundRouteBindings": [{ "userIds": [7], "routeIds": [10, 11] }]
//!   }],
//!   "routes": [{
//!     "id": 10, "name": "ads", "policy": "BLOCK", "status": 1,
//!     "rules": [{ "conditionType": "DOMAIN", "op": "IN", "value": "*.ads.com" }]
//!   }],
//!   "rateLimits": [{
//!     "id": 1, "scopeType": "GLOBAL", "uplinkLimitBps": 10000000,
//!     "downlinkLimitBps": 10000000, "enabled": true
//!   }]
//! }
//! ```

use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::listener::{Cipher, Protocol};
use crate::policy::{PolicyKind, ProxyProtocol};
use crate::ratelimit::ScopeType;
use crate::{ConditionType, Error, InboundId, MatchOp, RateLimitId, Result, RouteId, UserId};

/// Status value the console uses for "enabled".
pub const STATUS_ENABLED: i32 = 1;

fn enabled_status() -> i32 {
    STATUS_ENABLED
}

fn default_true() -> bool {
    true
}

/// The full configuration aggregate a snapshot is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFeed {
    #[serde(default)]
    pub inbounds: Vec<InboundConfigDto>,
    #[serde(default)]
    pub routes: Vec<RouteDto>,
    #[serde(default)]
    pub rate_limits: Vec<RateLimitDto>,
    /// Content hash computed by the console, if it sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

/// Inbound listener as the console stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundConfigDto {
    pub id: InboundId,
    #[serde(default)]
    pub name: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub listen_ip: String,
    pub port: i64,
    #[serde(default)]
    pub tls_enabled: bool,
    #[serde(default)]
    pub sniff_enabled: bool,
    #[serde(default)]
    pub ss_method: Option<Cipher>,
    #[serde(default = "enabled_status")]
    pub status: i32,
    #[serde(default)]
    pub inbound_route_bindings: Vec<RouteBindingDto>,
    /// Legacy single-binding form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_user_ids: Option<Vec<UserId>>,
    /// Legacy single-binding form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_ids: Option<Vec<RouteId>>,
}

impl InboundConfigDto {
    /// Bindings to build from, converting the legacy
    /// `allowedUserIds` + `routeIds` pair when no explicit bindings exist.
    pub fn effective_bindings(&self) -> Vec<RouteBindingDto> {
        if !self.inbound_route_bindings.is_empty() {
            return self.inbound_route_bindings.clone();
        }
        match (&self.allowed_user_ids, &self.route_ids) {
            (None, None) => Vec::new(),
            (users, routes) => vec![RouteBindingDto {
                user_ids: users.clone().unwrap_or_default(),
                route_ids: routes.clone().unwrap_or_default(),
                anonymous: false,
            }],
        }
    }
}

/// A user set bound to an ordered list of route ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBindingDto {
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    #[serde(default)]
    pub route_ids: Vec<RouteId>,
    /// Used for connections without an authenticated user
    #[serde(default)]
    pub anonymous: bool,
}

/// Route as the console stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDto {
    pub id: RouteId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<RouteRuleDto>,
    pub policy: PolicyKind,
    #[serde(default)]
    pub outbound_tag: Option<String>,
    #[serde(default)]
    pub outbound_proxy_type: Option<ProxyProtocol>,
    #[serde(default)]
    pub outbound_proxy_host: Option<String>,
    #[serde(default)]
    pub outbound_proxy_port: Option<i64>,
    #[serde(default)]
    pub outbound_proxy_username: Option<String>,
    #[serde(default)]
    pub outbound_proxy_password: Option<String>,
    #[serde(default)]
    pub outbound_proxy_enc_algo: Option<Cipher>,
    #[serde(default = "enabled_status")]
    pub status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One rule of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRuleDto {
    pub condition_type: ConditionType,
    #[serde(default)]
    pub op: MatchOp,
    pub value: String,
}

/// Rate-limit policy as the console stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDto {
    pub id: RateLimitId,
    pub scope_type: ScopeType,
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    #[serde(default)]
    pub uplink_limit_bps: Option<i64>,
    #[serde(default)]
    pub downlink_limit_bps: Option<i64>,
    #[serde(default)]
    pub burst_bytes: Option<i64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `HH:mm:ss`
    #[serde(default)]
    pub effective_time_start: Option<NaiveTime>,
    /// `HH:mm:ss`
    #[serde(default)]
    pub effective_time_end: Option<NaiveTime>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
}

/// Feed encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Json,
    Yaml,
}

impl FeedFormat {
    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(FeedFormat::Json),
            Some("yaml") | Some("yml") => Ok(FeedFormat::Yaml),
            _ => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Guess a format from content: a leading `{` means JSON.
    pub fn sniff(data: &[u8]) -> Self {
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => FeedFormat::Json,
            _ => FeedFormat::Yaml,
        }
    }
}

impl ConfigFeed {
    /// Parse a feed from bytes.
    pub fn from_slice(data: &[u8], format: FeedFormat) -> Result<Self> {
        let feed = match format {
            FeedFormat::Json => serde_json::from_slice(data)?,
            FeedFormat::Yaml => serde_yaml::from_slice(data)?,
        };
        Ok(feed)
    }

    /// Parse a feed from a reader.
    pub fn from_reader<R: Read>(mut reader: R, format: FeedFormat) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_slice(&data, format)
    }

    /// Load a feed from a file, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self> {
        let format = FeedFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        Self::from_slice(&data, format)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Content hash identifying this configuration.
    ///
    /// Uses the console's `configHash` when present, otherwise the hex
    /// SHA-256 of the feed's JSON encoding.
    pub fn content_hash(&self) -> String {
        if let Some(hash) = self.config_hash.as_deref().filter(|h| !h.is_empty()) {
            return hash.to_string();
        }

        let mut hasher = Sha256::new();
        // Serializing plain data structs cannot fail
        if let Ok(bytes) = serde_json::to_vec(self) {
            hasher.update(&bytes);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}
