use super::*;
use crate::bpv7::{
    bundle::{Bundle, Id},
    dtn_time::DtnTime,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Counters exposed for observability.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub pushed: u64,
    pub retrieved: u64,
    pub removed: u64,
}

struct Inner {
    bundles: HashMap<Id, Arc<Bundle>>,
    stats: StoreStats,
}

/// In-memory bundle storage keyed by bundle id.
///
/// All operations serialize on a single lock; enumerations return snapshots
/// so callers never process entries while holding it.
pub struct BundleStore {
    inner: Mutex<Inner>,
    max_bundles: usize,
}

impl BundleStore {
    pub fn new(max_bundles: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                bundles: HashMap::new(),
                stats: StoreStats::default(),
            }),
            max_bundles,
        }
    }

    /// Insert a bundle. Rejects the insertion when the store is at capacity
    /// or already holds the id; eviction only ever happens in
    /// [`cleanup`](Self::cleanup).
    pub fn push(&self, bundle: Arc<Bundle>) -> bool {
        let id = bundle.id();
        let mut inner = self.inner.lock().expect("store lock");
        if inner.bundles.contains_key(&id) {
            trace!("store already holds bundle {id}");
            return false;
        }
        if inner.bundles.len() >= self.max_bundles {
            warn!("store at capacity ({}), rejecting bundle {id}", self.max_bundles);
            return false;
        }
        inner.bundles.insert(id, bundle);
        inner.stats.pushed += 1;
        true
    }

    /// Fetch a bundle, absent if unknown or expired.
    pub fn get(&self, id: &Id) -> Option<Arc<Bundle>> {
        let mut inner = self.inner.lock().expect("store lock");
        let bundle = inner.bundles.get(id).cloned()?;
        if bundle.is_expired() {
            return None;
        }
        inner.stats.retrieved += 1;
        Some(bundle)
    }

    pub fn has(&self, id: &Id) -> bool {
        self.inner
            .lock()
            .expect("store lock")
            .bundles
            .contains_key(id)
    }

    /// Idempotent removal; returns whether the bundle was present.
    pub fn remove(&self, id: &Id) -> bool {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.bundles.remove(id).is_some() {
            inner.stats.removed += 1;
            true
        } else {
            false
        }
    }

    /// Snapshot of every stored bundle.
    pub fn get_all(&self) -> Vec<Arc<Bundle>> {
        self.inner
            .lock()
            .expect("store lock")
            .bundles
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of the bundles matching `predicate`.
    pub fn query(&self, predicate: impl Fn(&Bundle) -> bool) -> Vec<Arc<Bundle>> {
        self.inner
            .lock()
            .expect("store lock")
            .bundles
            .values()
            .filter(|b| predicate(b))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock").bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every bundle whose lifetime has elapsed; returns the count
    /// removed.
    pub fn cleanup(&self, now: DtnTime) -> usize {
        let mut inner = self.inner.lock().expect("store lock");
        let before = inner.bundles.len();
        inner.bundles.retain(|_, b| !b.is_expired_at(now));
        let removed = before - inner.bundles.len();
        inner.stats.removed += removed as u64;
        if removed > 0 {
            debug!("expired {removed} bundles");
        }
        removed
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.lock().expect("store lock").stats
    }
}
