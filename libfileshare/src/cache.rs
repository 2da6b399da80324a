//! A TTL cache whose misses are filled by a getter function.
//!
//! At most one getter call runs per key at a time; concurrent readers of a
//! missing or expired key wait for that call and all see its result.
//! Only successful, non-empty results are stored.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use moka::future::Cache;

use crate::error::{Result, ShareError};

type Getter<T> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<Option<T>>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheReadType {
    /// Serve an unexpired entry if there is one.
    UseCacheIfPresent,
    /// Always call the getter.
    ForceRefresh,
}

// Ok(None) from the getter must not be stored either.
enum Miss {
    Absent,
    Failed(ShareError),
}

pub struct TimedCache<T> {
    ttl: Duration,
    getter: Getter<T>,
    store: Cache<String, T>,
}

impl<T> TimedCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(ttl: Duration, getter: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        Self {
            ttl,
            getter: Arc::new(move |key| getter(key).boxed()),
            store: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value for `key`, calling the getter on a miss.
    /// `Ok(None)` means the getter found nothing; that is not cached either.
    pub async fn get(&self, key: &str, read_type: CacheReadType) -> Result<Option<T>> {
        match read_type {
            CacheReadType::UseCacheIfPresent => {
                if let Some(data) = self.store.get(key).await {
                    return Ok(Some(data));
                }
            }
            CacheReadType::ForceRefresh => self.store.invalidate(key).await,
        }

        let getter = self.getter.clone();
        let owned = key.to_string();
        let load = async move {
            match getter(owned).await {
                Ok(Some(data)) => Ok(data),
                Ok(None) => Err(Miss::Absent),
                Err(e) => Err(Miss::Failed(e)),
            }
        };
        match self.store.try_get_with(key.to_string(), load).await {
            Ok(data) => Ok(Some(data)),
            Err(miss) => match miss.as_ref() {
                Miss::Absent => Ok(None),
                Miss::Failed(e) => Err(e.clone()),
            },
        }
    }

    pub async fn set(&self, key: &str, data: T) {
        self.store.insert(key.to_string(), data).await;
    }

    pub async fn delete(&self, key: &str) {
        self.store.invalidate(key).await;
    }
}
