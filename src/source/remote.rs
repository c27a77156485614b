//! Remote configuration feed with ETag and a local cache.
//!
//! `RemoteSource` handles:
//! - Downloading the aggregate feed from the console's endpoint
//! - Gzip decompression of `.json.gz` style payloads
//! - ETag-based conditional requests (304 Not Modified)
//! - Caching the last good feed with atomic file replacement
//! - Serving the cache when the console is unreachable at startup

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ConfigSource;
use crate::feed::{ConfigFeed, FeedFormat};
use crate::{Error, Result};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// What the last good download looked like, stored next to the cached feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// When the console last answered with this feed (200 or 304)
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub etag: Option<String>,
    /// Content hash of the cached feed; a cache that no longer hashes to
    /// this is not served
    #[serde(default)]
    pub config_hash: Option<String>,
}

/// Config feed fetched over HTTP.
///
/// # Example
///
/// ```ignore
/// use routegate::source::{ConfigSource, RemoteSource};
/// use std::path::Path;
///
/// let mut source = RemoteSource::new(
///     "https://console.example.com/api/config/aggregate",
///     Path::new("/var/cache/routegate"),
/// );
///
/// if let Some(feed) = source.fetch()? {
///     manager.reload(&feed)?;
/// }
/// ```
pub struct RemoteSource {
    /// Feed URL
    url: String,
    /// Local cache directory
    cache_dir: PathBuf,
    /// ETag from last download (for conditional requests)
    etag: Option<String>,
    /// Whether a feed has been handed out since construction
    served: bool,
    timeout: Duration,
}

impl RemoteSource {
    /// Create a remote source.
    ///
    /// # Arguments
    ///
    /// * `url` - URL of the aggregate config feed (JSON or YAML, optionally gzipped)
    /// * `cache_dir` - Directory to keep the last good feed in
    pub fn new(url: &str, cache_dir: &Path) -> Self {
        Self {
            url: url.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            etag: None,
            served: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn feed_path(&self) -> PathBuf {
        self.cache_dir.join("feed.cache")
    }

    fn temp_path(&self) -> PathBuf {
        self.cache_dir.join("feed.cache.tmp")
    }

    fn metadata_path(&self) -> PathBuf {
        self.cache_dir.join("feed.meta")
    }

    /// Metadata of the last good download; default when missing or unreadable.
    pub fn metadata(&self) -> CacheMetadata {
        let path = self.metadata_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(_) => return CacheMetadata::default(),
        };
        serde_json::from_slice(&data).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable cache metadata {:?}: {}", path, e);
            CacheMetadata::default()
        })
    }

    fn save_metadata(&self, metadata: &CacheMetadata) -> Result<()> {
        fs::write(self.metadata_path(), serde_json::to_vec_pretty(metadata)?)?;
        Ok(())
    }

    /// Whether `interval` has passed since the console last answered.
    pub fn is_stale(&self, interval: Duration) -> bool {
        match self.metadata().fetched_at {
            None => true,
            Some(at) => Utc::now()
                .signed_duration_since(at)
                .to_std()
                .map_or(false, |elapsed| elapsed >= interval),
        }
    }

    /// When the console last answered.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.metadata().fetched_at
    }

    /// Load the cached feed, if there is one.
    ///
    /// # Errors
    /// When the cache does not hash to the value recorded at download time.
    pub fn load_cached(&self) -> Result<Option<ConfigFeed>> {
        let path = self.feed_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        let feed = ConfigFeed::from_slice(&data, FeedFormat::sniff(&data))?;

        if let Some(recorded) = self.metadata().config_hash {
            let hash = feed.content_hash();
            if hash != recorded {
                return Err(Error::Source(format!(
                    "cached feed {:?} hashes to {}, expected {}",
                    path, hash, recorded
                )));
            }
        }
        Ok(Some(feed))
    }

    /// Get the current ETag (if any).
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Get the URL being used.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// First fetch after a failure: fall back to the cache if we have one.
    fn serve_cache_or(&mut self, err: Error) -> Result<Option<ConfigFeed>> {
        if !self.served {
            if let Some(feed) = self.load_cached()? {
                log::warn!("{}; serving cached feed from {:?}", err, self.feed_path());
                self.served = true;
                return Ok(Some(feed));
            }
        }
        Err(err)
    }

    /// 304: nothing new once a feed is out; before that, the cache holds
    /// the body the ETag refers to.
    fn not_modified(&mut self) -> Result<Option<ConfigFeed>> {
        log::debug!("Config feed not modified (304)");

        let mut metadata = self.metadata();
        metadata.fetched_at = Some(Utc::now());
        self.save_metadata(&metadata)?;

        if self.served {
            return Ok(None);
        }
        match self.load_cached()? {
            Some(feed) => {
                self.served = true;
                Ok(Some(feed))
            }
            None => {
                self.etag = None;
                Err(Error::Source("304 Not Modified but no cached feed".to_string()))
            }
        }
    }

    /// Read, decompress, parse and cache a 200 response body.
    ///
    /// # Returns
    /// `Ok(None)` when the body hashes to the feed already handed out.
    fn process_response(&mut self, response: ureq::Response) -> Result<Option<ConfigFeed>> {
        let etag = response.header("ETag").map(str::to_string);

        let mut raw_data = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut raw_data)
            .map_err(|e| Error::Source(format!("failed to read response: {}", e)))?;

        let raw_len = raw_data.len();
        let data = decode_payload(raw_data)?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Source("empty config feed body".to_string()));
        }
        let feed = ConfigFeed::from_slice(&data, FeedFormat::sniff(&data))?;
        let hash = feed.content_hash();

        let previous = self.metadata();
        let unchanged = self.served && previous.config_hash.as_deref() == Some(hash.as_str());

        if !unchanged {
            // Write to temp file, then rename over the cache
            let temp_path = self.temp_path();
            let mut temp_file = fs::File::create(&temp_path)?;
            temp_file.write_all(&data)?;
            temp_file.sync_all()?;
            drop(temp_file);
            fs::rename(&temp_path, self.feed_path())?;
        }

        self.save_metadata(&CacheMetadata {
            fetched_at: Some(Utc::now()),
            etag: etag.clone(),
            config_hash: Some(hash.clone()),
        })?;
        self.etag = etag;

        if unchanged {
            log::debug!("Config feed from {} unchanged (hash {})", self.url, hash);
            return Ok(None);
        }

        log::info!(
            "Downloaded config feed from {}: {} bytes ({} on the wire), hash {}",
            self.url,
            data.len(),
            raw_len,
            hash
        );
        Ok(Some(feed))
    }
}

impl ConfigSource for RemoteSource {
    fn fetch(&mut self) -> Result<Option<ConfigFeed>> {
        fs::create_dir_all(&self.cache_dir)?;

        if self.etag.is_none() {
            self.etag = self.metadata().etag;
        }

        let mut request = ureq::get(&self.url).timeout(self.timeout);
        if let Some(ref etag) = self.etag {
            request = request.set("If-None-Match", etag);
        }

        // ureq hands 304 back as a successful response
        match request.call() {
            Ok(response) if response.status() == 304 => self.not_modified(),
            Ok(response) => match self.process_response(response) {
                Ok(Some(feed)) => {
                    self.served = true;
                    Ok(Some(feed))
                }
                Ok(None) => Ok(None),
                Err(e) => self.serve_cache_or(e),
            },
            Err(ureq::Error::Status(code, _)) => {
                self.serve_cache_or(Error::Source(format!("HTTP error: {}", code)))
            }
            Err(ureq::Error::Transport(t)) => {
                self.serve_cache_or(Error::Source(format!("transport error: {}", t)))
            }
        }
    }

    fn describe(&self) -> String {
        format!("remote {}", self.url)
    }
}

/// Check if data is gzip compressed.
fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Decompress a payload if it is gzipped.
fn decode_payload(raw: Vec<u8>) -> Result<Vec<u8>> {
    if !is_gzip(&raw) {
        return Ok(raw);
    }
    let mut decoder = GzDecoder::new(&raw[..]);
    let mut data = Vec::new();
    decoder
        .read_to_end(&mut data)
        .map_err(|e| Error::Source(format!("gzip decompression failed: {}", e)))?;
    Ok(data)
}
