//! Where configuration feeds come from.

mod remote;

pub use remote::{CacheMetadata, RemoteSource};

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::feed::{ConfigFeed, FeedFormat};
use crate::Result;

/// A configuration store the snapshot manager can poll.
pub trait ConfigSource: Send {
    /// Fetch the current feed.
    ///
    /// # Returns
    /// `Ok(None)` when the source knows nothing changed since the last
    /// successful fetch.
    fn fetch(&mut self) -> Result<Option<ConfigFeed>>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// A feed file on local disk (JSON or YAML by extension).
///
/// The file is read on every poll; a feed is only returned when its bytes
/// differ from the last one returned.
pub struct FileSource {
    path: PathBuf,
    format: FeedFormat,
    /// SHA-256 of the last returned file contents
    digest: Option<Vec<u8>>,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = FeedFormat::from_path(&path)?;
        Ok(Self {
            path,
            format,
            digest: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileSource {
    fn fetch(&mut self) -> Result<Option<ConfigFeed>> {
        let data = std::fs::read(&self.path)?;
        let digest = Sha256::digest(&data).to_vec();
        if self.digest.as_ref() == Some(&digest) {
            return Ok(None);
        }

        let feed = ConfigFeed::from_slice(&data, self.format)?;
        self.digest = Some(digest);
        Ok(Some(feed))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
