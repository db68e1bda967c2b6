//! Synchronized Structures
//!
//! In-memory projections of a channel that stay consistent with it by polling
//! its version and change feed. Each structure owns its maps and checkpoint
//! behind an async mutex held for the whole refresh, so concurrent readers
//! that find the cache stale wait for the refresh in flight instead of
//! starting their own.

pub mod dictionary;
pub mod tree;

pub use dictionary::SynchronizedDictionary;
pub use tree::{Hierarchy, NodeRef, SynchronizedTree};

use std::time::{Duration, Instant};

/// Default staleness window for synchronized structures
pub const DEFAULT_CACHE_UPDATE_INTERVAL: Duration = Duration::from_millis(2000);

/// Staleness window: how long a refresh stays valid
#[derive(Debug, Clone)]
pub(crate) struct RefreshWindow {
    interval: Duration,
    last_refresh: Option<Instant>,
}

impl RefreshWindow {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_refresh: None,
        }
    }

    /// A zero interval is never fresh
    pub(crate) fn is_fresh(&self) -> bool {
        match self.last_refresh {
            Some(at) => at.elapsed() < self.interval,
            None => false,
        }
    }

    pub(crate) fn mark(&mut self) {
        self.last_refresh = Some(Instant::now());
    }

    pub(crate) fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }
}
