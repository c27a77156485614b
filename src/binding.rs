//! Route bindings and candidate-route resolution.

use ahash::AHashSet;

use crate::listener::InboundListener;
use crate::route::{Route, RouteCatalog};
use crate::{RouteId, UserId};

/// Association between a set of users and an ordered list of route ids
/// on one inbound listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    users: AHashSet<UserId>,
    routes: Vec<RouteId>,
    anonymous: bool,
}

impl RouteBinding {
    pub fn new(users: Vec<UserId>, routes: Vec<RouteId>, anonymous: bool) -> Self {
        Self {
            users: users.into_iter().collect(),
            routes,
            anonymous,
        }
    }

    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.users.iter()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.users.contains(&user)
    }

    /// Route ids in evaluation order.
    pub fn route_ids(&self) -> &[RouteId] {
        &self.routes
    }

    /// Whether this binding serves connections without a user.
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

/// Candidate routes for one connection.
#[derive(Debug, Default)]
pub struct Resolution<'a> {
    /// Routes in binding order
    pub routes: Vec<&'a Route>,
    /// Ids the binding names but the catalog no longer has
    pub unresolved: Vec<RouteId>,
}

/// Select the ordered candidate routes for a user on a listener.
///
/// No binding (or a disabled listener) yields an empty list, never an
/// error; callers fall through to the fallback policy. Ids that no longer
/// resolve against the catalog are skipped and reported.
pub fn resolve<'a>(
    listener: &InboundListener,
    user: Option<UserId>,
    catalog: &'a RouteCatalog,
) -> Resolution<'a> {
    if !listener.enabled {
        log::debug!("inbound {} is disabled, no routes apply", listener.id);
        return Resolution::default();
    }

    let binding = match listener.binding_for(user) {
        Some(b) => b,
        None => {
            log::debug!("inbound {}: no binding for user {:?}", listener.id, user);
            return Resolution::default();
        }
    };

    let mut resolution = Resolution {
        routes: Vec::with_capacity(binding.route_ids().len()),
        unresolved: Vec::new(),
    };

    for id in binding.route_ids() {
        match catalog.get(id) {
            Some(route) => resolution.routes.push(route),
            None => {
                log::debug!("inbound {}: route {} no longer exists, skipping", listener.id, id);
                resolution.unresolved.push(*id);
            }
        }
    }

    resolution
}
