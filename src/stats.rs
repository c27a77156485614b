//! Lock-free decision and reload counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::action::Action;

/// Per-action decision counters kept by the engine.
#[derive(Debug, Default)]
pub(crate) struct DecisionCounters {
    direct: AtomicU64,
    block: AtomicU64,
    proxy: AtomicU64,
    overridden: AtomicU64,
    fallback: AtomicU64,
    unresolved_routes: AtomicU64,
}

impl DecisionCounters {
    /// Count one decision.
    #[inline]
    pub(crate) fn record(&self, action: Action, fallback: bool, unresolved: usize) {
        let counter = match action {
            Action::Direct => &self.direct,
            Action::Block => &self.block,
            Action::Proxy => &self.proxy,
            Action::Override => &self.overridden,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.fallback.fetch_add(1, Ordering::Relaxed);
        }
        if unresolved > 0 {
            self.unresolved_routes
                .fetch_add(unresolved as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> DecisionStats {
        DecisionStats {
            direct: self.direct.load(Ordering::Relaxed),
            block: self.block.load(Ordering::Relaxed),
            proxy: self.proxy.load(Ordering::Relaxed),
            overridden: self.overridden.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            unresolved_routes: self.unresolved_routes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of decision statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionStats {
    pub direct: u64,
    pub block: u64,
    pub proxy: u64,
    pub overridden: u64,
    /// Decisions no route matched
    pub fallback: u64,
    /// Bound route ids that did not resolve
    pub unresolved_routes: u64,
}

impl DecisionStats {
    /// Total number of decisions.
    pub fn total(&self) -> u64 {
        self.direct + self.block + self.proxy + self.overridden
    }
}

/// Reload outcome counters kept by the snapshot manager.
#[derive(Debug, Default)]
pub(crate) struct ReloadCounters {
    accepted: AtomicU64,
    unchanged: AtomicU64,
    rejected: AtomicU64,
}

impl ReloadCounters {
    #[inline]
    pub(crate) fn accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ReloadStats {
        ReloadStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of reload statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadStats {
    pub accepted: u64,
    pub unchanged: u64,
    pub rejected: u64,
}
