//! Route policies and the first-match policy actuator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{Action, Fallback};
use crate::context::ConnectionTarget;
use crate::listener::Cipher;
use crate::route::Route;
use crate::RouteId;

/// Policy kind as stored by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyKind {
    Direct,
    Block,
    OutboundProxy,
    DestinationOverride,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Direct => "DIRECT",
            PolicyKind::Block => "BLOCK",
            PolicyKind::OutboundProxy => "OUTBOUND_PROXY",
            PolicyKind::DestinationOverride => "DESTINATION_OVERRIDE",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Protocol spoken to an upstream proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProxyProtocol {
    #[default]
    #[serde(rename = "SOCKS5")]
    Socks5,
    #[serde(rename = "HTTPS_CONNECT")]
    HttpsConnect,
    #[serde(rename = "SHADOW_SOCKS", alias = "SS")]
    Shadowsocks,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Socks5 => "SOCKS5",
            ProxyProtocol::HttpsConnect => "HTTPS_CONNECT",
            ProxyProtocol::Shadowsocks => "SHADOW_SOCKS",
        }
    }
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upstream proxy credentials.
///
/// The password is never serialized or printed; decisions are written to
/// access logs.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parameters of an OUTBOUND_PROXY policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamProxy {
    pub tag: String,
    pub host: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
    pub credentials: Option<Credentials>,
    /// Required for Shadowsocks upstreams
    pub cipher: Option<Cipher>,
}

/// Parameters of a DESTINATION_OVERRIDE policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationOverride {
    pub tag: String,
    pub host: String,
    /// `None` keeps the connection's original port
    pub port: Option<u16>,
}

/// What a matched route prescribes, carrying only the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    Direct,
    Block,
    OutboundProxy(UpstreamProxy),
    DestinationOverride(DestinationOverride),
}

impl Policy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Direct => PolicyKind::Direct,
            Policy::Block => PolicyKind::Block,
            Policy::OutboundProxy(_) => PolicyKind::OutboundProxy,
            Policy::DestinationOverride(_) => PolicyKind::DestinationOverride,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Policy::Direct => Action::Direct,
            Policy::Block => Action::Block,
            Policy::OutboundProxy(_) => Action::Proxy,
            Policy::DestinationOverride(_) => Action::Override,
        }
    }

    /// The concrete outbound target for a connection to `target`.
    pub fn outbound(&self, target: &ConnectionTarget) -> Option<Outbound> {
        match self {
            Policy::Direct | Policy::Block => None,
            Policy::OutboundProxy(p) => Some(Outbound {
                tag: p.tag.clone(),
                host: p.host.clone(),
                port: p.port,
                protocol: Some(p.protocol),
                credentials: p.credentials.clone(),
                cipher: p.cipher,
            }),
            Policy::DestinationOverride(o) => Some(Outbound {
                tag: o.tag.clone(),
                host: o.host.clone(),
                port: o.port.unwrap_or_else(|| target.port()),
                protocol: None,
                credentials: None,
                cipher: None,
            }),
        }
    }
}

/// Resolved outbound target of a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outbound {
    pub tag: String,
    pub host: String,
    pub port: u16,
    /// Upstream protocol; `None` for a destination override, which keeps
    /// the inbound protocol
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProxyProtocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher: Option<Cipher>,
}

/// Route part of a connection decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub action: Action,
    pub outbound: Option<Outbound>,
    /// Route that produced the decision; `None` for the fallback
    pub route_id: Option<RouteId>,
}

impl RouteDecision {
    pub fn fallback(fallback: Fallback) -> Self {
        Self {
            action: fallback.action(),
            outbound: None,
            route_id: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.route_id.is_none()
    }
}

/// Apply the first route in `routes` that matches `target`.
///
/// When none matches, the fallback decides.
pub fn decide(routes: &[&Route], target: &ConnectionTarget, fallback: Fallback) -> RouteDecision {
    for route in routes {
        if route.evaluate(target) {
            log::debug!(
                "{}:{} matched route {} ({}) -> {}",
                target.host(),
                target.port(),
                route.id,
                route.name,
                route.policy.kind()
            );
            return RouteDecision {
                action: route.policy.action(),
                outbound: route.policy.outbound(target),
                route_id: Some(route.id),
            };
        }
    }

    RouteDecision::fallback(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RouteRule;
    use crate::{ConditionType, MatchOp};

    fn domain_route(id: RouteId, pattern: &str, policy: Policy) -> Route {
        let rule = RouteRule::compile(ConditionType::Domain, MatchOp::In, pattern).unwrap();
        Route::new(id, format!("route-{}", id), vec![rule], policy, true)
    }

    fn proxy() -> Policy {
        Policy::OutboundProxy(UpstreamProxy {
            tag: "hk-1".to_string(),
            host: "10.0.0.2".to_string(),
            port: 8388,
            protocol: ProxyProtocol::Shadowsocks,
            credentials: None,
            cipher: Some(Cipher::Chacha20IetfPoly1305),
        })
    }

    #[test]
    fn test_first_match_wins() {
        let t = ConnectionTarget::new("api.example.com", 443);
        let r1 = domain_route(1, "other.org", Policy::Block);
        let r2 = domain_route(2, "*.example.com", Policy::Block);
        let r3 = domain_route(3, "api.example.com", proxy());

        let d = decide(&[&r1, &r2, &r3], &t, Fallback::Direct);
        assert_eq!(d.route_id, Some(2));
        assert_eq!(d.action, Action::Block);

        let d = decide(&[&r3, &r1, &r2], &t, Fallback::Direct);
        assert_eq!(d.route_id, Some(3));
        assert_eq!(d.action, Action::Proxy);
    }

    #[test]
    fn test_no_match_uses_fallback() {
        let t = ConnectionTarget::new("example.net", 80);
        let r = domain_route(1, "example.com", Policy::Block);

        let d = decide(&[&r], &t, Fallback::Direct);
        assert_eq!(d.action, Action::Direct);
        assert!(d.is_fallback());
        assert!(d.outbound.is_none());

        assert_eq!(decide(&[], &t, Fallback::Block).action, Action::Block);
    }

    #[test]
    fn test_proxy_outbound_carries_cipher() {
        let t = ConnectionTarget::new("example.com", 443);
        let r = domain_route(1, "example.com", proxy());

        let out = decide(&[&r], &t, Fallback::Direct).outbound.unwrap();
        assert_eq!(out.host, "10.0.0.2");
        assert_eq!(out.port, 8388);
        assert_eq!(out.protocol, Some(ProxyProtocol::Shadowsocks));
        assert_eq!(out.cipher, Some(Cipher::Chacha20IetfPoly1305));
    }

    #[test]
    fn test_override_keeps_original_port() {
        let t = ConnectionTarget::new("example.com", 8443);
        let keep = domain_route(
            1,
            "example.com",
            Policy::DestinationOverride(DestinationOverride {
                tag: "mirror".to_string(),
                host: "mirror.internal".to_string(),
                port: None,
            }),
        );
        let out = decide(&[&keep], &t, Fallback::Direct).outbound.unwrap();
        assert_eq!(out.host, "mirror.internal");
        assert_eq!(out.port, 8443);
        assert_eq!(out.protocol, None);

        let replace = domain_route(
            2,
            "example.com",
            Policy::DestinationOverride(DestinationOverride {
                tag: "mirror".to_string(),
                host: "mirror.internal".to_string(),
                port: Some(80),
            }),
        );
        let d = decide(&[&replace], &t, Fallback::Direct);
        assert_eq!(d.action, Action::Override);
        assert_eq!(d.outbound.unwrap().port, 80);
    }

    #[test]
    fn test_credentials_are_redacted() {
        let c = Credentials::new("alice", "s3cret");
        assert!(!format!("{:?}", c).contains("s3cret"));
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"username":"alice"}"#);
    }

    #[test]
    fn test_policy_kind_names() {
        let k: PolicyKind = serde_json::from_str("\"DESTINATION_OVERRIDE\"").unwrap();
        assert_eq!(k, PolicyKind::DestinationOverride);
        assert_eq!(PolicyKind::OutboundProxy.to_string(), "OUTBOUND_PROXY");
        let p: ProxyProtocol = serde_json::from_str("\"SS\"").unwrap();
        assert_eq!(p, ProxyProtocol::Shadowsocks);
    }
}
