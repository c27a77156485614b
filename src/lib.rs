//! routegate - connection admission and routing decisions for a
//! multi-protocol proxy data-plane.
//!
//! For every accepted connection the data-plane asks the engine how to
//! handle it: pass it through, block it, forward it through an upstream
//! proxy, or rewrite its destination, and at what bandwidth.
//!
//! # Features
//!
//! - **Route rules**: exact and `*.suffix` domain patterns, country-code sets,
//!   `IN`/`NOT_IN` operators; all rules of a route must match
//! - **Ordered bindings**: per-listener user bindings to ordered route lists,
//!   first match wins
//! - **Rate limits**: global and per-user caps with daily and date-range
//!   activation windows
//! - **Hot reload**: immutable snapshots swapped atomically; invalid
//!   configuration is rejected and the previous snapshot keeps serving
//! - **Config feeds**: the admin console's aggregate JSON/YAML, from disk or
//!   over HTTP with ETag and a local cache
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use routegate::feed::{ConfigFeed, FeedFormat};
//! use routegate::{Action, ConnectionContext, ConnectionTarget, DecisionEngine, SnapshotManager};
//!
//! let feed = ConfigFeed::from_slice(br#"{
//!     "inbounds": [{ "id": 1, "protocol": "SOCKS5", "port": 1080,
//!                    "inboundRouteBindings": [{ "userIds": [7], "routeIds": [10] }] }],
//!     "routes": [{ "id": 10, "name": "ads", "policy": "BLOCK",
//!                  "rules": [{ "conditionType": "DOMAIN", "op": "IN", "value": "*.ads.com" }] }]
//! }"#, FeedFormat::Json)?;
//!
//! let snapshots = Arc::new(SnapshotManager::with_feed(&feed)?);
//! let engine = DecisionEngine::new(snapshots);
//!
//! let ctx = ConnectionContext::new(1, Some(7), ConnectionTarget::new("x.ads.com", 443));
//! assert_eq!(engine.decide(&ctx).action, Action::Block);
//!
//! let ctx = ConnectionContext::new(1, Some(7), ConnectionTarget::new("example.com", 443));
//! assert_eq!(engine.decide(&ctx).action, Action::Direct);
//! # Ok::<(), routegate::Error>(())
//! ```
//!
//! # Decision Order
//!
//! 1. The listener's binding for the user (or its anonymous binding)
//! 2. The binding's routes, in order; the first matching route's policy
//! 3. The fallback (DIRECT unless configured otherwise) when none matches
//! 4. Rate limits: user-specific policies before global ones

mod action;
mod condition;
mod context;
mod error;
mod stats;

pub mod binding;
pub mod engine;
pub mod feed;
pub mod geoip;
pub mod listener;
pub mod policy;
pub mod ratelimit;
pub mod route;
pub mod rule;
pub mod snapshot;
pub mod source;

/// Identifier of a user.
pub type UserId = u64;
/// Identifier of a route.
pub type RouteId = u64;
/// Identifier of an inbound listener.
pub type InboundId = u64;
/// Identifier of a rate-limit policy.
pub type RateLimitId = u64;

// Re-export core types
pub use action::{Action, Fallback};
pub use condition::{ConditionType, MatchOp};
pub use context::{ConnectionContext, ConnectionTarget};
pub use error::{ConfigViolation, Error, Result, RuleError, ValidationErrors};

// Re-export the engine and its configuration
pub use engine::{ConnectionDecision, DecisionEngine, EngineConfig};
pub use snapshot::{ConfigSnapshot, Refresher, SnapshotManager};

// Re-export statistics
pub use stats::{DecisionStats, ReloadStats};
