//! Feed to model conversion with invariant checks.
//!
//! Every entity is checked and every violation collected, so a rejected
//! reload reports all problems at once. Entities with violations are left
//! out of the result; the result is only used when there are none.

use std::collections::hash_map::Entry;
use std::net::{IpAddr, Ipv4Addr};

use ahash::{AHashMap, AHashSet};

use crate::binding::RouteBinding;
use crate::error::{ConfigViolation, RuleError, ValidationErrors};
use crate::feed::{ConfigFeed, InboundConfigDto, RateLimitDto, RouteDto, STATUS_ENABLED};
use crate::listener::{Capabilities, InboundListener};
use crate::policy::{
    Credentials, DestinationOverride, Policy, PolicyKind, ProxyProtocol, UpstreamProxy,
};
use crate::ratelimit::{
    ActivationWindow, BandwidthCaps, DailyWindow, DateRange, RateLimitPolicy, Scope, ScopeType,
};
use crate::route::{Route, RouteCatalog};
use crate::rule::RouteRule;
use crate::{InboundId, RouteId, UserId};

const ROUTE_NAME_MIN: usize = 2;
const ROUTE_NAME_MAX: usize = 50;

/// Validated model parts of a snapshot.
pub(super) struct Parts {
    pub listeners: AHashMap<InboundId, InboundListener>,
    pub routes: RouteCatalog,
    pub rate_limits: Vec<RateLimitPolicy>,
}

pub(super) fn build(feed: &ConfigFeed) -> Result<Parts, ValidationErrors> {
    let mut violations = Vec::new();

    let routes = build_routes(&feed.routes, &mut violations);
    let listeners = build_listeners(&feed.inbounds, &mut violations);
    let rate_limits = build_rate_limits(&feed.rate_limits, &mut violations);

    if let Some(errors) = ValidationErrors::new(violations) {
        return Err(errors);
    }

    warn_unresolved(&listeners, &routes);

    Ok(Parts {
        listeners,
        routes,
        rate_limits,
    })
}

/// Unresolved route references are drift, not errors.
fn warn_unresolved(listeners: &AHashMap<InboundId, InboundListener>, routes: &RouteCatalog) {
    for listener in listeners.values() {
        for binding in listener.bindings() {
            for id in binding.route_ids() {
                if !routes.contains_key(id) {
                    log::warn!("inbound {} binds missing route {}", listener.id, id);
                }
            }
        }
    }
}

fn valid_port(port: i64) -> Option<u16> {
    u16::try_from(port).ok().filter(|p| *p != 0)
}

fn valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn valid_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':')
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// Routes

fn build_routes(dtos: &[RouteDto], violations: &mut Vec<ConfigViolation>) -> RouteCatalog {
    let mut routes = RouteCatalog::with_capacity(dtos.len());
    let mut seen = AHashSet::with_capacity(dtos.len());

    for dto in dtos {
        if !seen.insert(dto.id) {
            violations.push(ConfigViolation::DuplicateRoute(dto.id));
            continue;
        }

        let before = violations.len();

        let name = dto.name.trim();
        let name_len = name.chars().count();
        if !(ROUTE_NAME_MIN..=ROUTE_NAME_MAX).contains(&name_len) {
            violations.push(ConfigViolation::InvalidRouteName { route: dto.id });
        }

        if dto.rules.is_empty() {
            violations.push(ConfigViolation::EmptyRoute { route: dto.id });
        }

        let mut rules = Vec::with_capacity(dto.rules.len());
        for (index, rule) in dto.rules.iter().enumerate() {
            match RouteRule::compile(rule.condition_type, rule.op, &rule.value) {
                Ok(r) => rules.push(r),
                Err(e) => violations.push(rule_violation(dto.id, index, e)),
            }
        }

        let policy = build_policy(dto, violations);

        if violations.len() == before {
            if let Some(policy) = policy {
                let enabled = dto.status == STATUS_ENABLED;
                routes.insert(dto.id, Route::new(dto.id, name, rules, policy, enabled));
            }
        }
    }

    routes
}

fn rule_violation(route: RouteId, index: usize, err: RuleError) -> ConfigViolation {
    match err {
        RuleError::EmptyValue => ConfigViolation::EmptyRuleValue { route, index },
        RuleError::InvalidDomainPattern(value) => {
            ConfigViolation::InvalidDomainPattern { route, value }
        }
        RuleError::InvalidCountryCode(value) => ConfigViolation::InvalidCountryCode { route, value },
    }
}

fn build_policy(dto: &RouteDto, violations: &mut Vec<ConfigViolation>) -> Option<Policy> {
    match dto.policy {
        PolicyKind::Direct => Some(Policy::Direct),
        PolicyKind::Block => Some(Policy::Block),
        PolicyKind::OutboundProxy => {
            let before = violations.len();
            let kind = dto.policy.as_str();

            let tag = outbound_tag(dto, kind, violations);
            let host = outbound_host(dto, kind, violations);
            let port = match dto.outbound_proxy_port {
                None => {
                    violations.push(ConfigViolation::MissingOutboundField {
                        route: dto.id,
                        policy: kind,
                        field: "outboundProxyPort",
                    });
                    None
                }
                Some(p) => outbound_port(dto.id, p, violations),
            };

            let protocol = dto.outbound_proxy_type.unwrap_or_default();
            if protocol == ProxyProtocol::Shadowsocks && dto.outbound_proxy_enc_algo.is_none() {
                violations.push(ConfigViolation::MissingOutboundField {
                    route: dto.id,
                    policy: kind,
                    field: "outboundProxyEncAlgo",
                });
            }

            let credentials = non_blank(&dto.outbound_proxy_username).map(|user| {
                Credentials::new(user, dto.outbound_proxy_password.clone().unwrap_or_default())
            });

            if violations.len() != before {
                return None;
            }
            Some(Policy::OutboundProxy(UpstreamProxy {
                tag: tag?,
                host: host?,
                port: port?,
                protocol,
                credentials,
                cipher: dto.outbound_proxy_enc_algo,
            }))
        }
        PolicyKind::DestinationOverride => {
            let before = violations.len();
            let kind = dto.policy.as_str();

            let tag = outbound_tag(dto, kind, violations);
            let host = outbound_host(dto, kind, violations);
            let port = dto
                .outbound_proxy_port
                .and_then(|p| outbound_port(dto.id, p, violations));

            if violations.len() != before {
                return None;
            }
            Some(Policy::DestinationOverride(DestinationOverride {
                tag: tag?,
                host: host?,
                port,
            }))
        }
    }
}

fn outbound_tag(
    dto: &RouteDto,
    kind: &'static str,
    violations: &mut Vec<ConfigViolation>,
) -> Option<String> {
    match non_blank(&dto.outbound_tag) {
        None => {
            violations.push(ConfigViolation::MissingOutboundField {
                route: dto.id,
                policy: kind,
                field: "outboundTag",
            });
            None
        }
        Some(tag) if !valid_tag(tag) => {
            violations.push(ConfigViolation::InvalidOutboundField {
                route: dto.id,
                field: "outboundTag",
                value: tag.to_string(),
            });
            None
        }
        Some(tag) => Some(tag.to_string()),
    }
}

fn outbound_host(
    dto: &RouteDto,
    kind: &'static str,
    violations: &mut Vec<ConfigViolation>,
) -> Option<String> {
    match non_blank(&dto.outbound_proxy_host) {
        None => {
            violations.push(ConfigViolation::MissingOutboundField {
                route: dto.id,
                policy: kind,
                field: "outboundProxyHost",
            });
            None
        }
        Some(host) if !valid_host(host) => {
            violations.push(ConfigViolation::InvalidOutboundField {
                route: dto.id,
                field: "outboundProxyHost",
                value: host.to_string(),
            });
            None
        }
        Some(host) => Some(host.to_ascii_lowercase()),
    }
}

fn outbound_port(route: RouteId, port: i64, violations: &mut Vec<ConfigViolation>) -> Option<u16> {
    let valid = valid_port(port);
    if valid.is_none() {
        violations.push(ConfigViolation::InvalidOutboundField {
            route,
            field: "outboundProxyPort",
            value: port.to_string(),
        });
    }
    valid
}

// Listeners

fn build_listeners(
    dtos: &[InboundConfigDto],
    violations: &mut Vec<ConfigViolation>,
) -> AHashMap<InboundId, InboundListener> {
    let mut listeners = AHashMap::with_capacity(dtos.len());
    let mut seen = AHashSet::with_capacity(dtos.len());
    let mut endpoints: AHashMap<(IpAddr, u16), InboundId> = AHashMap::new();

    for dto in dtos {
        if !seen.insert(dto.id) {
            violations.push(ConfigViolation::DuplicateInbound(dto.id));
            continue;
        }

        let before = violations.len();
        let enabled = dto.status == STATUS_ENABLED;
        let caps = dto.protocol.capabilities();

        let port = valid_port(dto.port);
        if port.is_none() {
            violations.push(ConfigViolation::InvalidListenPort { inbound: dto.id });
        }

        let listen_ip = match dto.listen_ip.trim() {
            "" => Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            addr => match addr.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    violations.push(ConfigViolation::InvalidListenAddress {
                        inbound: dto.id,
                        addr: addr.to_string(),
                    });
                    None
                }
            },
        };

        if let (Some(ip), Some(port), true) = (listen_ip, port, enabled) {
            match endpoints.entry((ip, port)) {
                Entry::Occupied(e) => violations.push(ConfigViolation::ListenConflict {
                    inbound: dto.id,
                    other: *e.get(),
                    addr: ip.to_string(),
                    port,
                }),
                Entry::Vacant(e) => {
                    e.insert(dto.id);
                }
            }
        }

        if dto.tls_enabled && !caps.contains(Capabilities::TLS) {
            violations.push(ConfigViolation::TlsNotSupported {
                inbound: dto.id,
                protocol: dto.protocol.to_string(),
            });
        }

        let shared_key = caps.contains(Capabilities::SHARED_KEY);
        if shared_key && dto.ss_method.is_none() {
            violations.push(ConfigViolation::MissingCipher { inbound: dto.id });
        }

        let bindings = build_bindings(dto, shared_key, violations);

        if violations.len() != before {
            continue;
        }
        if let (Some(ip), Some(port)) = (listen_ip, port) {
            let cipher = if shared_key { dto.ss_method } else { None };
            listeners.insert(
                dto.id,
                InboundListener::new(
                    dto.id,
                    dto.name.clone(),
                    dto.protocol,
                    ip,
                    port,
                    dto.tls_enabled,
                    dto.sniff_enabled,
                    cipher,
                    enabled,
                    bindings,
                ),
            );
        }
    }

    listeners
}

fn build_bindings(
    dto: &InboundConfigDto,
    shared_key: bool,
    violations: &mut Vec<ConfigViolation>,
) -> Vec<RouteBinding> {
    let dtos = dto.effective_bindings();
    let mut bindings = Vec::with_capacity(dtos.len());
    let mut owner: AHashMap<UserId, usize> = AHashMap::new();
    let mut reported = AHashSet::new();
    let mut anonymous = 0;

    for (idx, b) in dtos.into_iter().enumerate() {
        let binding = RouteBinding::new(b.user_ids, b.route_ids, b.anonymous);

        if shared_key && binding.user_count() != 1 {
            violations.push(ConfigViolation::SharedKeyBinding {
                inbound: dto.id,
                found: binding.user_count(),
            });
        }

        for user in binding.users() {
            let first = *owner.entry(*user).or_insert(idx);
            if first != idx && reported.insert(*user) {
                violations.push(ConfigViolation::OverlappingBindings {
                    inbound: dto.id,
                    user: *user,
                });
            }
        }

        if binding.is_anonymous() {
            anonymous += 1;
            if anonymous == 2 {
                violations.push(ConfigViolation::MultipleAnonymousBindings { inbound: dto.id });
            }
        }

        bindings.push(binding);
    }

    bindings
}

// Rate limits

fn build_rate_limits(
    dtos: &[RateLimitDto],
    violations: &mut Vec<ConfigViolation>,
) -> Vec<RateLimitPolicy> {
    let mut policies = Vec::with_capacity(dtos.len());
    let mut seen = AHashSet::with_capacity(dtos.len());

    for dto in dtos {
        if !seen.insert(dto.id) {
            violations.push(ConfigViolation::DuplicateRateLimit(dto.id));
            continue;
        }

        let before = violations.len();

        let scope = match dto.scope_type {
            ScopeType::Users => {
                if dto.user_ids.is_empty() {
                    violations.push(ConfigViolation::EmptyUserScope { limit: dto.id });
                }
                Scope::Users(dto.user_ids.iter().copied().collect())
            }
            ScopeType::Global => {
                if !dto.user_ids.is_empty() {
                    violations.push(ConfigViolation::GlobalScopeWithUsers { limit: dto.id });
                }
                Scope::Global
            }
        };

        let mut cap = |value: Option<i64>, field: &'static str| -> Option<u64> {
            let value = value?;
            if value <= 0 {
                violations.push(ConfigViolation::NonPositiveCap {
                    limit: dto.id,
                    field,
                });
                return None;
            }
            Some(value as u64)
        };
        let caps = BandwidthCaps::new(
            cap(dto.uplink_limit_bps, "uplinkLimitBps"),
            cap(dto.downlink_limit_bps, "downlinkLimitBps"),
            cap(dto.burst_bytes, "burstBytes"),
        );

        if let (Some(from), Some(to)) = (dto.effective_from, dto.effective_to) {
            if from > to {
                violations.push(ConfigViolation::InvertedDateRange { limit: dto.id });
            }
        }

        let daily = match (dto.effective_time_start, dto.effective_time_end) {
            (Some(start), Some(end)) => Some(DailyWindow::new(start, end)),
            (None, None) => None,
            _ => {
                violations.push(ConfigViolation::HalfOpenTimeWindow { limit: dto.id });
                None
            }
        };

        if violations.len() != before {
            continue;
        }

        let mut policy = RateLimitPolicy::new(dto.id, scope, caps).with_window(ActivationWindow {
            daily,
            dates: DateRange::new(dto.effective_from, dto.effective_to),
        });
        policy.enabled = dto.enabled;
        policies.push(policy);
    }

    policies
}
