//! Stale-while-revalidate protocol over a [`DocumentStore`].
//!
//! `get` never blocks on freshness: an expired value is returned as-is and,
//! when this caller wins the refresh claim, a rebuild is spawned in the
//! background. The rebuild writes back through `set`, which resets the entry
//! to `fresh`.

use std::{future::Future, sync::Arc};

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    clock::Clock,
    config::CacheConfig,
    keys::BlockCacheKey,
    store::{CacheEntry, CacheLink, DocumentStore, EntryStatus, StoreError},
};

const METRIC_CACHE_HIT: &str = "tessera_block_cache_hit_total";
const METRIC_CACHE_MISS: &str = "tessera_block_cache_miss_total";
const METRIC_CACHE_STALE: &str = "tessera_block_cache_stale_total";
const METRIC_CACHE_REFRESH: &str = "tessera_block_refresh_total";

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Miss,
    Fresh(String),
    /// Expired value served as-is. `refresh_scheduled` is true when this
    /// call spawned the background rebuild.
    Stale {
        value: String,
        refresh_scheduled: bool,
    },
}

impl CacheLookup {
    pub fn value(&self) -> Option<&str> {
        match self {
            CacheLookup::Miss => None,
            CacheLookup::Fresh(value) | CacheLookup::Stale { value, .. } => Some(value),
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            CacheLookup::Miss => None,
            CacheLookup::Fresh(value) | CacheLookup::Stale { value, .. } => Some(value),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheSetError {
    #[error("caching disabled for this entry")]
    Disabled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct CacheManager {
    config: CacheConfig,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    pub fn new(config: CacheConfig, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Read `key`, scheduling `refresh` in the background when the entry has
    /// expired and this caller wins the claim.
    ///
    /// Store failures degrade to a miss.
    pub async fn get<F, Fut>(&self, key: &BlockCacheKey, refresh: F) -> CacheLookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.config.enabled {
            return CacheLookup::Miss;
        }

        let entry = match self.store.find(key.as_str()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                return CacheLookup::Miss;
            }
            Err(err) => {
                warn!(cache_key = %key, error = %err, "cache read failed; treating as miss");
                counter!(METRIC_CACHE_MISS).increment(1);
                return CacheLookup::Miss;
            }
        };

        let now = self.clock.now();
        if !entry.is_expired(now) {
            counter!(METRIC_CACHE_HIT).increment(1);
            return CacheLookup::Fresh(entry.value);
        }

        counter!(METRIC_CACHE_STALE).increment(1);
        let claimed = match self
            .store
            .claim_refresh(key.as_str(), now, self.config.refresh_lease)
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                warn!(cache_key = %key, error = %err, "refresh claim failed");
                false
            }
        };

        if claimed {
            counter!(METRIC_CACHE_REFRESH).increment(1);
            debug!(cache_key = %key, origin = %entry.origin, "scheduling background refresh");
            tokio::spawn(refresh());
        }

        CacheLookup::Stale {
            value: entry.value,
            refresh_scheduled: claimed,
        }
    }

    /// Store `value` for `ttl_minutes`. A zero ttl stores nothing and
    /// reports [`CacheSetError::Disabled`].
    pub async fn set(
        &self,
        key: &BlockCacheKey,
        value: String,
        link: CacheLink,
        ttl_minutes: u32,
        origin: impl Into<String>,
    ) -> Result<(), CacheSetError> {
        if !self.config.enabled || ttl_minutes == 0 {
            return Err(CacheSetError::Disabled);
        }

        let deadline = self.clock.now() + time::Duration::minutes(i64::from(ttl_minutes));
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            value,
            link,
            deadline,
            status: EntryStatus::Fresh,
            claimed_at: None,
            origin: origin.into(),
        };

        self.store.upsert(entry).await.map_err(CacheSetError::from)
    }
}
