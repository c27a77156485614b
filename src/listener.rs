//! Inbound listeners and their protocol properties.

use std::fmt;
use std::net::IpAddr;

use ahash::AHashMap;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::binding::RouteBinding;
use crate::{InboundId, UserId};

bitflags! {
    /// Properties of an inbound protocol that configuration checks rely on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Connections carry an authenticated user
        const AUTHENTICATES = 0b0000_0001;
        /// Listener may terminate TLS
        const TLS = 0b0000_0010;
        /// One key shared by the whole listener
        const SHARED_KEY = 0b0000_0100;
    }
}

/// Inbound protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "SOCKS5")]
    Socks5,
    #[serde(rename = "HTTPS_CONNECT")]
    HttpsConnect,
    #[serde(rename = "SOCKS5_HTTPS")]
    Socks5Https,
    #[serde(rename = "SHADOW_SOCKS", alias = "SS")]
    Shadowsocks,
    #[serde(rename = "TRANSPARENT", alias = "NONE")]
    Transparent,
    #[serde(rename = "DNS")]
    Dns,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Socks5 => "SOCKS5",
            Protocol::HttpsConnect => "HTTPS_CONNECT",
            Protocol::Socks5Https => "SOCKS5_HTTPS",
            Protocol::Shadowsocks => "SHADOW_SOCKS",
            Protocol::Transparent => "TRANSPARENT",
            Protocol::Dns => "DNS",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Protocol::Socks5 | Protocol::HttpsConnect => {
                Capabilities::AUTHENTICATES | Capabilities::TLS
            }
            Protocol::Socks5Https => Capabilities::AUTHENTICATES,
            Protocol::Shadowsocks => Capabilities::AUTHENTICATES | Capabilities::SHARED_KEY,
            Protocol::Transparent | Protocol::Dns => Capabilities::empty(),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shadowsocks AEAD cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cipher {
    #[serde(rename = "aes_256_gcm", alias = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "aes_128_gcm", alias = "aes-128-gcm")]
    Aes128Gcm,
    #[serde(rename = "chacha20_ietf_poly1305", alias = "chacha20-ietf-poly1305")]
    Chacha20IetfPoly1305,
}

impl Cipher {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cipher::Aes256Gcm => "aes_256_gcm",
            Cipher::Aes128Gcm => "aes_128_gcm",
            Cipher::Chacha20IetfPoly1305 => "chacha20_ietf_poly1305",
        }
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A configured network endpoint accepting client connections.
#[derive(Debug, Clone)]
pub struct InboundListener {
    pub id: InboundId,
    pub name: String,
    pub protocol: Protocol,
    pub listen_ip: IpAddr,
    pub port: u16,
    pub tls: bool,
    pub sniff: bool,
    /// Only set for Shadowsocks listeners
    pub cipher: Option<Cipher>,
    pub enabled: bool,
    bindings: Vec<RouteBinding>,
    /// user -> index into `bindings`
    by_user: AHashMap<UserId, usize>,
    anonymous: Option<usize>,
}

impl InboundListener {
    /// Create a listener from already-validated bindings.
    ///
    /// Bindings must have disjoint user sets; a later binding claiming an
    /// already-bound user is ignored for that user.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: InboundId,
        name: String,
        protocol: Protocol,
        listen_ip: IpAddr,
        port: u16,
        tls: bool,
        sniff: bool,
        cipher: Option<Cipher>,
        enabled: bool,
        bindings: Vec<RouteBinding>,
    ) -> Self {
        let mut by_user = AHashMap::new();
        let mut anonymous = None;
        for (idx, binding) in bindings.iter().enumerate() {
            for user in binding.users() {
                by_user.entry(*user).or_insert(idx);
            }
            if binding.is_anonymous() && anonymous.is_none() {
                anonymous = Some(idx);
            }
        }

        Self {
            id,
            name,
            protocol,
            listen_ip,
            port,
            tls,
            sniff,
            cipher,
            enabled,
            bindings,
            by_user,
            anonymous,
        }
    }

    /// Ordered bindings as configured.
    pub fn bindings(&self) -> &[RouteBinding] {
        &self.bindings
    }

    /// The binding applying to a user, or the anonymous binding when
    /// there is no authenticated user.
    pub fn binding_for(&self, user: Option<UserId>) -> Option<&RouteBinding> {
        let idx = match user {
            Some(user) => self.by_user.get(&user).copied(),
            None => self.anonymous,
        }?;
        self.bindings.get(idx)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.protocol.capabilities()
    }
}
