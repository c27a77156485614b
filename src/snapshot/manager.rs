//! Atomic snapshot publication and hot reload.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;

use super::ConfigSnapshot;
use crate::feed::ConfigFeed;
use crate::source::ConfigSource;
use crate::stats::{ReloadCounters, ReloadStats};
use crate::Result;

/// Holds the current [`ConfigSnapshot`] and replaces it on reload.
///
/// Readers never block: [`current`](Self::current) is an atomic load.
/// Reloads build and validate a complete snapshot before a single atomic
/// store, and a rejected reload leaves the served snapshot untouched.
///
/// # Example
///
/// ```ignore
/// use routegate::snapshot::SnapshotManager;
///
/// let manager = SnapshotManager::new();
/// let epoch = manager.reload(&feed)?;
///
/// // In-flight decisions keep the snapshot they loaded
/// let snapshot = manager.current();
/// assert_eq!(snapshot.epoch(), epoch);
/// ```
pub struct SnapshotManager {
    current: ArcSwap<ConfigSnapshot>,
    /// Serializes writers so epochs stay monotonic
    reload_lock: Mutex<()>,
    stats: ReloadCounters,
}

impl SnapshotManager {
    /// Start with the empty snapshot (epoch 0).
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(ConfigSnapshot::empty()),
            reload_lock: Mutex::new(()),
            stats: ReloadCounters::default(),
        }
    }

    /// Start from an initial feed, which must be valid.
    pub fn with_feed(feed: &ConfigFeed) -> Result<Self> {
        let manager = Self::new();
        manager.reload(feed)?;
        Ok(manager)
    }

    /// The snapshot currently in service.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Cheaper borrow of the current snapshot for short-lived use.
    pub fn load(&self) -> Guard<Arc<ConfigSnapshot>> {
        self.current.load()
    }

    /// Epoch of the snapshot currently in service.
    pub fn epoch(&self) -> u64 {
        self.current.load().epoch()
    }

    /// Validate `feed` and publish it as a new snapshot.
    ///
    /// # Returns
    /// The epoch now in service. A feed with the current content hash is
    /// not rebuilt and keeps the current epoch.
    ///
    /// # Errors
    /// [`Error::Validation`](crate::Error::Validation) when the feed
    /// violates an invariant; the previous snapshot stays in service.
    pub fn reload(&self, feed: &ConfigFeed) -> Result<u64> {
        let _guard = self.reload_lock.lock();
        let current = self.current.load();
        let hash = feed.content_hash();

        if current.epoch() > 0 && current.hash() == hash {
            log::debug!("Config unchanged (hash {}), keeping epoch {}", hash, current.epoch());
            self.stats.unchanged();
            return Ok(current.epoch());
        }

        let epoch = current.epoch() + 1;
        match ConfigSnapshot::build_with_hash(feed, epoch, hash) {
            Ok(snapshot) => {
                log::info!(
                    "Config snapshot {} published: {} inbounds, {} routes, {} rate limits (hash {})",
                    epoch,
                    snapshot.listeners.len(),
                    snapshot.routes.len(),
                    snapshot.rate_limits.len(),
                    snapshot.hash()
                );
                self.current.store(Arc::new(snapshot));
                self.stats.accepted();
                Ok(epoch)
            }
            Err(errors) => {
                log::error!(
                    "Config reload rejected, keeping epoch {}: {} violation(s)",
                    current.epoch(),
                    errors.len()
                );
                for violation in errors.violations() {
                    log::error!("  {}", violation);
                }
                self.stats.rejected();
                Err(errors.into())
            }
        }
    }

    /// Fetch from `source` and reload if it returned a feed.
    ///
    /// # Returns
    /// `Ok(None)` when the source reported no change.
    pub fn reload_from(&self, source: &mut dyn ConfigSource) -> Result<Option<u64>> {
        match source.fetch()? {
            Some(feed) => self.reload(&feed).map(Some),
            None => Ok(None),
        }
    }

    /// Poll `source` every `interval` on a background thread.
    ///
    /// The first poll happens immediately. Failures are logged and the last
    /// good snapshot stays in service. Dropping the returned handle stops
    /// the thread.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        mut source: Box<dyn ConfigSource>,
        interval: Duration,
    ) -> Result<Refresher> {
        let manager = Arc::clone(self);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("routegate-refresh".to_string())
            .spawn(move || loop {
                match manager.reload_from(source.as_mut()) {
                    Ok(Some(epoch)) => log::debug!("Refreshed from {}: epoch {}", source.describe(), epoch),
                    Ok(None) => log::debug!("{} unchanged", source.describe()),
                    Err(e) => log::warn!("Refresh from {} failed: {}", source.describe(), e),
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Refresher {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Get reload statistics.
    pub fn stats(&self) -> ReloadStats {
        self.stats.snapshot()
    }
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a background refresh thread.
pub struct Refresher {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Refresher {
    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Config refresh thread panicked");
            }
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
