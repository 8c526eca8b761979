//! In-flight request coalescing.
//!
//! Concurrent executions that miss the cache under the same key are
//! collapsed into one upstream pipeline: the first caller becomes the
//! leader and runs it, later callers subscribe and receive the leader's
//! response. A leader that is dropped mid-flight wakes its followers
//! with a closed channel, and each follower then runs the pipeline
//! itself.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::cache::CacheKey;
use crate::executor::response::RouterResponse;

/// One coalescing map, keyed like the cache.
#[derive(Default)]
pub struct InflightMap {
    inner: Arc<DashMap<CacheKey, broadcast::Sender<RouterResponse>>>,
}

/// What `join` hands back: run the pipeline, or wait for whoever is.
pub enum Flight {
    Leader(FlightGuard),
    Follower(broadcast::Receiver<RouterResponse>),
}

impl InflightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, creating it if none is active.
    pub fn join(&self, key: &CacheKey) -> Flight {
        match self.inner.entry(key.clone()) {
            Entry::Occupied(entry) => Flight::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                entry.insert(tx.clone());
                Flight::Leader(FlightGuard {
                    map: Arc::clone(&self.inner),
                    key: key.clone(),
                    tx,
                    done: false,
                })
            }
        }
    }

    /// Active flights (for the status view).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Held by the leader. The flight entry is removed when the leader
/// completes or is dropped, never left behind.
pub struct FlightGuard {
    map: Arc<DashMap<CacheKey, broadcast::Sender<RouterResponse>>>,
    key: CacheKey,
    tx: broadcast::Sender<RouterResponse>,
    done: bool,
}

impl FlightGuard {
    /// Publish the response to followers. The entry is removed first so
    /// a caller arriving during delivery starts a new flight instead of
    /// subscribing to a finished one.
    pub fn complete(mut self, response: RouterResponse) {
        self.map.remove(&self.key);
        self.done = true;
        let _ = self.tx.send(response);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.done {
            self.map.remove(&self.key);
        }
    }
}
