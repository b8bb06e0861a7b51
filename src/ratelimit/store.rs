//! In-memory quota store with per-key locking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::counter::WindowState;
use super::key::LimitKey;
use super::policy::Policy;

/// Identifies one budget: the same limit key under the same policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketId {
    pub policy: Policy,
    pub key: LimitKey,
}

impl BucketId {
    pub fn new(policy: Policy, key: LimitKey) -> Self {
        Self { policy, key }
    }
}

/// Owns every [`WindowState`].
///
/// Each bucket sits behind its own mutex, so evaluations for unrelated keys
/// never wait on each other. Entries are created on first use and replaced in
/// place when their window rolls over.
#[derive(Debug, Default)]
pub struct QuotaStore {
    buckets: DashMap<BucketId, Arc<Mutex<WindowState>>>,
}

impl QuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, id: &BucketId, window_seconds: u64, now: DateTime<Utc>) -> Arc<Mutex<WindowState>> {
        // Clone the Arc out so the shard lock is released before the bucket
        // lock is taken.
        if let Some(bucket) = self.buckets.get(id) {
            return Arc::clone(bucket.value());
        }
        let entry = self.buckets.entry(id.clone()).or_insert_with(|| {
            debug!(key = %id.key, policy = %id.policy, "Creating quota bucket");
            Arc::new(Mutex::new(WindowState::new(now, window_seconds)))
        });
        Arc::clone(entry.value())
    }

    /// Run `f` against the current window of `id` while holding the bucket's
    /// lock. Expired windows are reset before `f` sees them.
    pub fn transact<R>(
        &self,
        id: &BucketId,
        window_seconds: u64,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut WindowState) -> R,
    ) -> R {
        let bucket = self.bucket(id, window_seconds, now);
        let mut state = bucket.lock();
        if state.roll(now, window_seconds) {
            debug!(key = %id.key, window_start = %now, "Quota window reset");
        }
        f(&mut *state)
    }

    /// Snapshot of the current window for `id`, creating it if needed.
    pub fn get_or_create(&self, id: &BucketId, window_seconds: u64, now: DateTime<Utc>) -> WindowState {
        self.transact(id, window_seconds, now, |state| state.clone())
    }

    /// Charge `cost` to the current window of `id`.
    pub fn record(&self, id: &BucketId, cost: f64, now: DateTime<Utc>) {
        let window_seconds = id.policy.window_seconds();
        self.transact(id, window_seconds, now, |state| state.record(cost));
    }

    /// Consumption in the current window, `None` if the bucket was never
    /// used. An expired window reads as zero.
    pub fn consumed(&self, id: &BucketId, now: DateTime<Utc>) -> Option<f64> {
        let bucket = self.buckets.get(id).map(|b| Arc::clone(b.value()))?;
        let state = bucket.lock();
        if state.is_expired(now) {
            Some(0.0)
        } else {
            Some(state.consumed())
        }
    }

    /// Number of buckets ever created.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop every bucket.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn bucket(policy: &str, key: LimitKey) -> BucketId {
        BucketId::new(policy.parse().unwrap(), key)
    }

    #[test]
    fn test_get_or_create_lazily() {
        let store = QuotaStore::new();
        let id = bucket("10;w=60", LimitKey::global());
        assert!(store.is_empty());
        assert_eq!(store.consumed(&id, start()), None);

        let state = store.get_or_create(&id, 60, start());
        assert_eq!(state.consumed(), 0.0);
        assert_eq!(state.window_start(), start());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_record_accumulates() {
        let store = QuotaStore::new();
        let id = bucket("10;w=60", LimitKey::global());

        store.record(&id, 2.0, start());
        store.record(&id, 3.0, start() + chrono::Duration::seconds(10));
        assert_eq!(store.consumed(&id, start()), Some(5.0));
    }

    #[test]
    fn test_window_rollover_replaces_state() {
        let store = QuotaStore::new();
        let id = bucket("10;w=60", LimitKey::user("a"));
        store.record(&id, 4.0, start());

        let later = start() + chrono::Duration::seconds(60);
        assert_eq!(store.consumed(&id, later), Some(0.0));

        let state = store.get_or_create(&id, 60, later);
        assert_eq!(state.consumed(), 0.0);
        assert_eq!(state.window_start(), later);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_policies_do_not_share_buckets() {
        let store = QuotaStore::new();
        let hourly = bucket("10;w=3600;s=user", LimitKey::user("a"));
        let daily = bucket("10;w=86400;s=user", LimitKey::user("a"));

        store.record(&hourly, 1.0, start());
        assert_eq!(store.consumed(&daily, start()), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let store = QuotaStore::new();
        store.record(&bucket("10;w=60", LimitKey::global()), 1.0, start());
        store.clear();
        assert!(store.is_empty());
    }
}
