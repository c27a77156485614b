//! Rate-limit policies and bandwidth resolution.
//!
//! Resolution for a user at a point in time:
//!
//! 1. Only enabled policies whose activation window contains `now` apply.
//! 2. USERS policies naming the user beat GLOBAL policies.
//! 3. Several applicable policies at the winning level merge to the
//!    tightest cap per dimension.
//! 4. Nothing applicable means unrestricted.

mod window;

pub use window::{ActivationWindow, DailyWindow, DateRange};

use ahash::AHashSet;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{RateLimitId, UserId};

/// Scope type as stored by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScopeType {
    Global,
    Users,
}

/// Connections a policy applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Global,
    Users(AHashSet<UserId>),
}

impl Scope {
    pub fn scope_type(&self) -> ScopeType {
        match self {
            Scope::Global => ScopeType::Global,
            Scope::Users(_) => ScopeType::Users,
        }
    }
}

/// Bandwidth caps; `None` in a dimension means no cap there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthCaps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_bps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_bps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_bytes: Option<u64>,
}

fn tighter(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

impl BandwidthCaps {
    pub fn new(uplink_bps: Option<u64>, downlink_bps: Option<u64>, burst_bytes: Option<u64>) -> Self {
        Self {
            uplink_bps,
            downlink_bps,
            burst_bytes,
        }
    }

    /// Merge `other` in, keeping the tighter cap of each dimension.
    pub fn tighten(&mut self, other: &BandwidthCaps) {
        self.uplink_bps = tighter(self.uplink_bps, other.uplink_bps);
        self.downlink_bps = tighter(self.downlink_bps, other.downlink_bps);
        self.burst_bytes = tighter(self.burst_bytes, other.burst_bytes);
    }

    pub fn is_unlimited(&self) -> bool {
        self.uplink_bps.is_none() && self.downlink_bps.is_none() && self.burst_bytes.is_none()
    }
}

/// Bandwidth a connection is allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Bandwidth {
    #[default]
    Unrestricted,
    Limited(BandwidthCaps),
}

impl Bandwidth {
    pub fn caps(&self) -> Option<&BandwidthCaps> {
        match self {
            Bandwidth::Unrestricted => None,
            Bandwidth::Limited(caps) => Some(caps),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Bandwidth::Unrestricted)
    }
}

impl From<BandwidthCaps> for Bandwidth {
    fn from(caps: BandwidthCaps) -> Self {
        if caps.is_unlimited() {
            Bandwidth::Unrestricted
        } else {
            Bandwidth::Limited(caps)
        }
    }
}

/// A validated rate-limit policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub id: RateLimitId,
    pub scope: Scope,
    pub caps: BandwidthCaps,
    pub enabled: bool,
    pub window: ActivationWindow,
}

impl RateLimitPolicy {
    pub fn new(id: RateLimitId, scope: Scope, caps: BandwidthCaps) -> Self {
        Self {
            id,
            scope,
            caps,
            enabled: true,
            window: ActivationWindow::always(),
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: ActivationWindow) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enabled and inside its activation window.
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        self.enabled && self.window.is_active(now)
    }

    fn names_user(&self, user: Option<UserId>) -> bool {
        match (&self.scope, user) {
            (Scope::Users(users), Some(user)) => users.contains(&user),
            _ => false,
        }
    }
}

/// Result of rate-limit resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitResolution {
    pub bandwidth: Bandwidth,
    /// Policies that contributed, in configuration order
    pub policy_ids: Vec<RateLimitId>,
}

fn merge<'a>(policies: impl Iterator<Item = &'a RateLimitPolicy>) -> RateLimitResolution {
    let mut caps: Option<BandwidthCaps> = None;
    let mut policy_ids = Vec::new();
    for policy in policies {
        match caps.as_mut() {
            Some(c) => c.tighten(&policy.caps),
            None => caps = Some(policy.caps),
        }
        policy_ids.push(policy.id);
    }

    RateLimitResolution {
        bandwidth: caps.map(Bandwidth::from).unwrap_or_default(),
        policy_ids,
    }
}

/// Resolve the bandwidth for `user` at `now`.
///
/// An active USERS policy naming the user replaces every GLOBAL policy,
/// even one with no caps: such a policy exempts its users from the global
/// limits while it is active.
pub fn resolve(
    policies: &[RateLimitPolicy],
    user: Option<UserId>,
    now: NaiveDateTime,
) -> RateLimitResolution {
    let user_specific = policies
        .iter()
        .filter(|p| p.names_user(user) && p.is_active(now));
    let resolution = merge(user_specific);
    if !resolution.policy_ids.is_empty() {
        return resolution;
    }

    merge(
        policies
            .iter()
            .filter(|p| p.scope == Scope::Global && p.is_active(now)),
    )
}
