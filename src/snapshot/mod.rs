//! Immutable configuration snapshots and their manager.

mod build;
mod manager;

pub use manager::{Refresher, SnapshotManager};

use std::time::SystemTime;

use ahash::AHashMap;

use crate::binding::{self, Resolution};
use crate::error::ValidationErrors;
use crate::feed::ConfigFeed;
use crate::listener::InboundListener;
use crate::ratelimit::RateLimitPolicy;
use crate::route::{Route, RouteCatalog};
use crate::{InboundId, RouteId, UserId};

/// A validated, read-only view of all listeners, routes and rate limits
/// at one point in time.
#[derive(Debug)]
pub struct ConfigSnapshot {
    epoch: u64,
    hash: String,
    created_at: SystemTime,
    listeners: AHashMap<InboundId, InboundListener>,
    routes: RouteCatalog,
    rate_limits: Vec<RateLimitPolicy>,
}

impl ConfigSnapshot {
    /// The snapshot served before any configuration has been loaded.
    pub fn empty() -> Self {
        Self {
            epoch: 0,
            hash: String::new(),
            created_at: SystemTime::now(),
            listeners: AHashMap::new(),
            routes: RouteCatalog::new(),
            rate_limits: Vec::new(),
        }
    }

    /// Validate `feed` and build a snapshot for `epoch`.
    pub fn build(feed: &ConfigFeed, epoch: u64) -> Result<Self, ValidationErrors> {
        Self::build_with_hash(feed, epoch, feed.content_hash())
    }

    pub(crate) fn build_with_hash(
        feed: &ConfigFeed,
        epoch: u64,
        hash: String,
    ) -> Result<Self, ValidationErrors> {
        let parts = build::build(feed)?;
        Ok(Self {
            epoch,
            hash,
            created_at: SystemTime::now(),
            listeners: parts.listeners,
            routes: parts.routes,
            rate_limits: parts.rate_limits,
        })
    }

    /// Run every invariant check on `feed` without keeping the result.
    ///
    /// Produces the same violations a rejected reload would.
    pub fn validate(feed: &ConfigFeed) -> Result<(), ValidationErrors> {
        build::build(feed).map(|_| ())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Content hash of the feed this snapshot was built from.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn listener(&self, id: InboundId) -> Option<&InboundListener> {
        self.listeners.get(&id)
    }

    pub fn listeners(&self) -> impl Iterator<Item = &InboundListener> {
        self.listeners.values()
    }

    pub fn route(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(&id)
    }

    pub fn routes(&self) -> &RouteCatalog {
        &self.routes
    }

    pub fn rate_limits(&self) -> &[RateLimitPolicy] {
        &self.rate_limits
    }

    /// Candidate routes for a user on a listener.
    ///
    /// An unknown listener has no candidates.
    pub fn routes_for(&self, inbound: InboundId, user: Option<UserId>) -> Resolution<'_> {
        match self.listeners.get(&inbound) {
            Some(listener) => binding::resolve(listener, user, &self.routes),
            None => {
                log::debug!("unknown inbound {}, no routes apply", inbound);
                Resolution::default()
            }
        }
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedFormat;

    const FEED: &str = r#"{
        "inbounds": [{ "id": 1, "protocol": "SOCKS5", "port": 1080,
                       "inboundRouteBindings": [{ "userIds": [7], "routeIds": [2, 1] }] }],
        "routes": [
            { "id": 1, "name": "all-cn", "policy": "DIRECT",
              "rules": [{ "conditionType": "GEO", "value": "CN" }] },
            { "id": 2, "name": "ads", "policy": "BLOCK",
              "rules": [{ "conditionType": "DOMAIN", "value": "*.ads.com" }] }
        ]
    }"#;

    fn feed() -> ConfigFeed {
        ConfigFeed::from_slice(FEED.as_bytes(), FeedFormat::Json).unwrap()
    }

    #[test]
    fn test_build_and_lookup() {
        let snapshot = ConfigSnapshot::build(&feed(), 3).unwrap();
        assert_eq!(snapshot.epoch(), 3);
        assert_eq!(snapshot.hash(), feed().content_hash());
        assert!(snapshot.listener(1).is_some());
        assert_eq!(snapshot.route(2).unwrap().name, "ads");
        assert_eq!(snapshot.routes().len(), 2);
        assert!(snapshot.rate_limits().is_empty());

        let ids: Vec<_> = snapshot.routes_for(1, Some(7)).routes.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_unknown_inbound_has_no_routes() {
        let snapshot = ConfigSnapshot::build(&feed(), 1).unwrap();
        assert!(snapshot.routes_for(42, Some(7)).routes.is_empty());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ConfigSnapshot::empty();
        assert_eq!(snapshot.epoch(), 0);
        assert_eq!(snapshot.hash(), "");
        assert_eq!(snapshot.listeners().count(), 0);
    }

    #[test]
    fn test_validate_reports_violations() {
        let mut bad = feed();
        bad.routes[0].rules.clear();
        let err = ConfigSnapshot::validate(&bad).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(ConfigSnapshot::validate(&feed()).is_ok());
    }
}
