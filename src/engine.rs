//! The per-connection decision façade.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::{Action, Fallback};
use crate::context::ConnectionContext;
use crate::policy::{self, Outbound};
use crate::ratelimit::{self, Bandwidth};
use crate::snapshot::{ConfigSnapshot, SnapshotManager};
use crate::stats::{DecisionCounters, DecisionStats};
use crate::{RateLimitId, RouteId};

/// Engine tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// What to do when no candidate route matches
    #[serde(default)]
    pub fallback: Fallback,
}

/// Everything the data-plane needs to handle one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDecision {
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound: Option<Outbound>,
    pub bandwidth: Bandwidth,
    /// Route that decided; `None` when the fallback did
    pub route_id: Option<RouteId>,
    /// Rate-limit policies that produced `bandwidth`
    pub rate_limit_ids: Vec<RateLimitId>,
    /// Snapshot the decision was made against
    pub epoch: u64,
}

/// Decides how each accepted connection is handled.
///
/// Cheap to share across threads; every call reads the current snapshot
/// once and works only on that snapshot.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use routegate::{Action, ConnectionContext, ConnectionTarget, DecisionEngine, SnapshotManager};
///
/// let engine = DecisionEngine::new(Arc::new(SnapshotManager::new()));
/// let ctx = ConnectionContext::new(1, Some(7), ConnectionTarget::new("example.com", 443));
///
/// let decision = engine.decide(&ctx);
/// assert_eq!(decision.action, Action::Direct);
/// assert!(decision.bandwidth.is_unrestricted());
/// ```
pub struct DecisionEngine {
    snapshots: Arc<SnapshotManager>,
    config: EngineConfig,
    counters: DecisionCounters,
}

impl DecisionEngine {
    pub fn new(snapshots: Arc<SnapshotManager>) -> Self {
        Self::with_config(snapshots, EngineConfig::default())
    }

    pub fn with_config(snapshots: Arc<SnapshotManager>, config: EngineConfig) -> Self {
        Self {
            snapshots,
            config,
            counters: DecisionCounters::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    /// Decide against the current snapshot.
    pub fn decide(&self, ctx: &ConnectionContext) -> ConnectionDecision {
        let snapshot = self.snapshots.load();
        self.decide_with(&snapshot, ctx)
    }

    /// Decide against a specific snapshot.
    pub fn decide_with(&self, snapshot: &ConfigSnapshot, ctx: &ConnectionContext) -> ConnectionDecision {
        let candidates = snapshot.routes_for(ctx.inbound_id, ctx.user_id);
        let route = policy::decide(&candidates.routes, &ctx.target, self.config.fallback);
        let limits = ratelimit::resolve(snapshot.rate_limits(), ctx.user_id, ctx.at);

        self.counters
            .record(route.action, route.is_fallback(), candidates.unresolved.len());

        log::debug!(
            "inbound {} user {:?} -> {}:{}: {} (route {:?}, limits {:?}, epoch {})",
            ctx.inbound_id,
            ctx.user_id,
            ctx.target.host(),
            ctx.target.port(),
            route.action,
            route.route_id,
            limits.policy_ids,
            snapshot.epoch()
        );

        ConnectionDecision {
            action: route.action,
            outbound: route.outbound,
            bandwidth: limits.bandwidth,
            route_id: route.route_id,
            rate_limit_ids: limits.policy_ids,
            epoch: snapshot.epoch(),
        }
    }

    /// Get decision statistics.
    pub fn stats(&self) -> DecisionStats {
        self.counters.snapshot()
    }
}
