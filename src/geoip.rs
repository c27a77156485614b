//! Country lookup for filling connection geo codes.
//!
//! The decision path only consumes country codes; this module is a
//! convenience for callers that have IPs and a MaxMind country database.
//! Lookups that fail for any reason yield "unknown".

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use crate::{Error, Result};

/// Maps an IP address to an ISO country code.
pub trait GeoResolver: Send + Sync {
    /// Uppercase 2-letter code, or `None` when unknown.
    fn country(&self, ip: IpAddr) -> Option<String>;
}

/// Process-wide default resolver.
static DEFAULT_RESOLVER: once_cell::sync::OnceCell<Arc<dyn GeoResolver>> =
    once_cell::sync::OnceCell::new();

/// [`GeoResolver`] backed by a MaxMind country database.
pub struct MaxMindResolver {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindResolver {
    /// Open a `.mmdb` file.
    pub fn open(path: &Path) -> Result<Self> {
        let reader =
            maxminddb::Reader::open_readfile(path).map_err(|e| Error::GeoIp(e.to_string()))?;
        Ok(Self { reader })
    }

    /// Load a database already in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let reader = maxminddb::Reader::from_source(data).map_err(|e| Error::GeoIp(e.to_string()))?;
        Ok(Self { reader })
    }
}

impl GeoResolver for MaxMindResolver {
    fn country(&self, ip: IpAddr) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct Country {
            iso_code: Option<String>,
        }

        #[derive(serde::Deserialize)]
        struct GeoIpResponse {
            country: Option<Country>,
        }

        let result: GeoIpResponse = match self.reader.lookup(ip) {
            Ok(r) => r,
            Err(e) => {
                log::debug!("GeoIP lookup for {} failed: {}", ip, e);
                return None;
            }
        };
        result
            .country?
            .iso_code
            .map(|code| code.to_ascii_uppercase())
    }
}

/// Install the process-wide default resolver.
///
/// Can only be done once.
pub fn init_default(resolver: Arc<dyn GeoResolver>) -> Result<()> {
    DEFAULT_RESOLVER
        .set(resolver)
        .map_err(|_| Error::GeoIp("default GeoIP resolver already initialized".to_string()))
}

/// Install a MaxMind database file as the default resolver.
pub fn init_default_database(path: &Path) -> Result<()> {
    let resolver = MaxMindResolver::open(path)?;
    log::info!("Loaded GeoIP database: {:?}", path);
    init_default(Arc::new(resolver))
}

/// Whether a default resolver has been installed.
pub fn is_initialized() -> bool {
    DEFAULT_RESOLVER.get().is_some()
}

/// Look up an IP with the default resolver; `None` when there is none.
pub fn lookup_country(ip: IpAddr) -> Option<String> {
    DEFAULT_RESOLVER.get()?.country(ip)
}
