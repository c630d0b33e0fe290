//! Reconciliation cache.
//!
//! Two channels report field values independently: the request/response
//! channel (saves, fetches) and the push channel (device state, local
//! echoes). Their messages race. The cache keeps, per key, the value with the
//! highest timestamp ever offered; ties go to the latest offer. Older offers
//! are dropped without error.
//!
//! The cache is an explicitly constructed value, normally shared as
//! `Arc<ReconciliationCache>` by every component that reads or writes field
//! values. Writes to one key are atomic read-modify-write operations.
//!
//! Listener calls are serialised. A write that a newer write to the same key
//! overtakes before its listeners run is not reported, so the last
//! notification for a key always matches the stored entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use field_types::{Payload, Source};
use parking_lot::ReentrantMutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// The stored state for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Current value.
    pub value: Value,
    /// Timestamp of the accepted write (ms since epoch).
    pub timestamp: i64,
    /// Channel that wrote it.
    pub source: Source,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    revision: u64,
}

/// Callback invoked once per accepted write: `(key, value, source, timestamp)`.
pub type Listener = dyn Fn(&str, &Value, Source, i64) + Send + Sync;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(u64, Arc<Listener>)>>,
}

impl Listeners {
    fn add(&self, listener: Arc<Listener>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.write() {
            entries.push((id, listener));
        }
        id
    }

    fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|(existing, _)| *existing != id);
        }
    }

    /// Copy of the current listeners so callbacks run without the lock held.
    fn current(&self) -> Vec<Arc<Listener>> {
        self.entries
            .read()
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }
}

/// Handle returned by [`ReconciliationCache::subscribe`].
///
/// The listener stays registered until this handle is dropped or
/// [`Subscription::unsubscribe`] is called.
#[must_use = "dropping the subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    /// Stop receiving notifications.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Keyed store of `(value, timestamp, source)` with same-or-newer arbitration.
#[derive(Default)]
pub struct ReconciliationCache {
    entries: DashMap<String, Slot>,
    revisions: AtomicU64,
    listeners: Arc<Listeners>,
    // Reentrant so a listener may write back to the cache.
    notify_gate: ReentrantMutex<()>,
}

impl std::fmt::Debug for ReconciliationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationCache")
            .field("entries", &self.entries.len())
            .field("listeners", &self.listeners.current().len())
            .finish()
    }
}

impl ReconciliationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|slot| slot.entry.value.clone())
    }

    /// Full entry for `key`.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Values for the requested keys that are present, in request order.
    pub fn snapshot<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Payload {
        let mut out = Payload::new();
        for key in keys {
            if let Some(value) = self.get(key) {
                out.insert(key.to_string(), value);
            }
        }
        out
    }

    /// Offer a value stamped with the current time.
    ///
    /// Returns whether the write was accepted.
    pub fn put(&self, key: &str, value: Value, source: Source) -> bool {
        self.put_at(key, value, source, now_millis())
    }

    /// Offer a value with an explicit timestamp.
    ///
    /// Accepted when the key is new or `timestamp >= stored.timestamp`;
    /// otherwise a silent no-op. Listeners run only for accepted writes that
    /// are still current when their turn comes.
    pub fn put_at(&self, key: &str, value: Value, source: Source, timestamp: i64) -> bool {
        let entry = CacheEntry {
            value: value.clone(),
            timestamp,
            source,
        };

        let revision = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if timestamp < existing.get().entry.timestamp {
                    return false;
                }
                let revision = self.next_revision();
                existing.insert(Slot { entry, revision });
                revision
            }
            Entry::Vacant(slot) => {
                let revision = self.next_revision();
                slot.insert(Slot { entry, revision });
                revision
            }
        };

        // Shard lock is released here; listeners may read the cache.
        let _gate = self.notify_gate.lock();
        let current = self
            .entries
            .get(key)
            .is_some_and(|slot| slot.revision == revision);
        if current {
            for listener in self.listeners.current() {
                listener(key, &value, source, timestamp);
            }
        }
        true
    }

    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed)
    }

    /// Offer a batch of values.
    ///
    /// Entries are stamped `now + index`, so timestamps strictly increase in
    /// input order. Each entry is still judged on its own against the stored
    /// entry for its key. Returns the number of accepted writes.
    pub fn put_bulk<K, I>(&self, patch: I, source: Source) -> usize
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let base = now_millis();
        patch
            .into_iter()
            .enumerate()
            .filter(|(i, (key, value))| {
                self.put_at(key.as_ref(), value.clone(), source, base + *i as i64)
            })
            .count()
    }

    /// Register a listener for accepted writes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&str, &Value, Source, i64) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Number of keys ever written.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
