//! Per-key mutual exclusion.
//!
//! Entries are created on first use and dropped again once nobody holds or
//! waits for the key. Different keys never contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard};

struct Entry {
    lock: Arc<KeyMutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkout(&self, key: &str) -> Arc<KeyMutex<()>> {
        let mut entries = self.entries();
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            lock: Arc::new(KeyMutex::new(())),
            users: 0,
        });
        entry.users += 1;
        entry.lock.clone()
    }

    fn checkin(&self, key: &str) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            entry.users -= 1;
            if entry.users == 0 {
                entries.remove(key);
            }
        }
    }
}

/// A keyed lock table. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct LockRegistry {
    inner: Arc<Inner>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no one else holds `key`. The lock is released when the
    /// returned guard is dropped.
    pub async fn acquire(&self, key: &str) -> LockGuard {
        let lock = self.inner.checkout(key);
        // the checkout is returned by the guard even if this future is dropped
        let mut pending = Pending {
            inner: Some(self.inner.clone()),
            key,
        };
        let guard = lock.lock_owned().await;
        pending.inner = None;
        debug!("acquired lock for {key}");
        LockGuard {
            guard: Some(guard),
            inner: self.inner.clone(),
            key: key.to_string(),
        }
    }

    /// Returns `None` right away when `key` is already held.
    pub fn try_acquire(&self, key: &str) -> Option<LockGuard> {
        let lock = self.inner.checkout(key);
        match lock.try_lock_owned() {
            Ok(guard) => Some(LockGuard {
                guard: Some(guard),
                inner: self.inner.clone(),
                key: key.to_string(),
            }),
            Err(_) => {
                self.inner.checkin(key);
                None
            }
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Pending<'a> {
    inner: Option<Arc<Inner>>,
    key: &'a str,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.checkin(self.key);
        }
    }
}

pub struct LockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    inner: Arc<Inner>,
    key: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // unlock before the entry can be removed
        drop(self.guard.take());
        self.inner.checkin(&self.key);
        debug!("released lock for {}", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let registry = LockRegistry::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire("vol-1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let registry = LockRegistry::new();
        let _a = registry.acquire("vol-a").await;
        let b = timeout(Duration::from_secs(1), registry.acquire("vol-b")).await;
        assert!(b.is_ok(), "acquiring a different key must not wait");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_try_acquire() {
        let registry = LockRegistry::new();
        let guard = registry.try_acquire("vol-1").expect("first try must succeed");
        assert_eq!(guard.key(), "vol-1");
        assert!(registry.try_acquire("vol-1").is_none());
        drop(guard);
        assert!(registry.is_empty());
        assert!(registry.try_acquire("vol-1").is_some());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_entry() {
        let registry = LockRegistry::new();
        let guard = registry.acquire("vol-1").await;
        let waited = timeout(Duration::from_millis(10), registry.acquire("vol-1")).await;
        assert!(waited.is_err());
        drop(guard);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        async fn failing(registry: &LockRegistry) -> Result<(), &'static str> {
            let _guard = registry.acquire("vol-1").await;
            Err("boom")
        }

        let registry = LockRegistry::new();
        assert!(failing(&registry).await.is_err());
        assert!(registry.try_acquire("vol-1").is_some());
    }
}
