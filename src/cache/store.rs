//! Cache entries and the document store they live in.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Freshness state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Fresh,
    Updating,
}

/// `[page_uid, block_uid]` linkage kept for bulk invalidation tooling.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheLink(pub String, pub String);

impl CacheLink {
    pub fn new(page_uid: impl Into<String>, block_uid: impl Into<String>) -> Self {
        Self(page_uid.into(), block_uid.into())
    }

    pub fn page_uid(&self) -> &str {
        &self.0
    }

    pub fn block_uid(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub link: CacheLink,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
    pub status: EntryStatus,
    /// When the current refresh claim was taken, if any.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub claimed_at: Option<OffsetDateTime>,
    /// Path and query the entry was rendered for.
    pub origin: String,
}

impl CacheEntry {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache entry `{key}` could not be decoded: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Key-value document store backing the block cache.
///
/// Implementations must serialize operations on the same key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    async fn upsert(&self, entry: CacheEntry) -> Result<(), StoreError>;

    /// Atomically move an expired entry to [`EntryStatus::Updating`].
    ///
    /// Returns `true` for exactly one caller per expiry cycle. A claim older
    /// than `lease` may be taken over so a failed refresh does not pin the
    /// entry forever.
    async fn claim_refresh(
        &self,
        key: &str,
        now: OffsetDateTime,
        lease: Duration,
    ) -> Result<bool, StoreError>;
}

/// In-process store. Each `DashMap` shard lock makes the claim a true
/// compare-and-swap.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries linked to the given page, for bulk invalidation tooling.
    pub fn keys_for_page(&self, page_uid: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.link.page_uid() == page_uid)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), StoreError> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn claim_refresh(
        &self,
        key: &str,
        now: OffsetDateTime,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };

        if !entry.is_expired(now) {
            return Ok(false);
        }

        let claimable = match entry.status {
            EntryStatus::Fresh => true,
            EntryStatus::Updating => entry
                .claimed_at
                .is_none_or(|claimed_at| claimed_at + lease <= now),
        };

        if claimable {
            entry.status = EntryStatus::Updating;
            entry.claimed_at = Some(now);
        }
        Ok(claimable)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::datetime;

    use super::*;

    fn entry(key: &str, deadline: OffsetDateTime) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value: "<p>cached</p>".to_string(),
            link: CacheLink::new("page-1", "block-1"),
            deadline,
            status: EntryStatus::Fresh,
            claimed_at: None,
            origin: "/news?page=1".to_string(),
        }
    }

    const LEASE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn upsert_then_find_returns_entry() {
        let store = MemoryDocumentStore::new();
        assert!(store.find("k").await.unwrap().is_none());

        store
            .upsert(entry("k", datetime!(2024-01-01 00:10 UTC)))
            .await
            .unwrap();

        let found = store.find("k").await.unwrap().expect("entry stored");
        assert_eq!(found.value, "<p>cached</p>");
        assert_eq!(store.keys_for_page("page-1"), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn claim_requires_expiry() {
        let store = MemoryDocumentStore::new();
        store
            .upsert(entry("k", datetime!(2024-01-01 00:10 UTC)))
            .await
            .unwrap();

        let before = datetime!(2024-01-01 00:05 UTC);
        assert!(!store.claim_refresh("k", before, LEASE).await.unwrap());
        assert!(!store.claim_refresh("missing", before, LEASE).await.unwrap());
    }

    #[tokio::test]
    async fn only_one_claim_per_expiry_until_lease_lapses() {
        let store = MemoryDocumentStore::new();
        store
            .upsert(entry("k", datetime!(2024-01-01 00:10 UTC)))
            .await
            .unwrap();

        let now = datetime!(2024-01-01 00:11 UTC);
        assert!(store.claim_refresh("k", now, LEASE).await.unwrap());
        assert!(!store.claim_refresh("k", now, LEASE).await.unwrap());

        let found = store.find("k").await.unwrap().unwrap();
        assert_eq!(found.status, EntryStatus::Updating);
        assert_eq!(found.value, "<p>cached</p>");

        let after_lease = datetime!(2024-01-01 00:12:01 UTC);
        assert!(store.claim_refresh("k", after_lease, LEASE).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_claims_have_a_single_winner() {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .upsert(entry("k", datetime!(2024-01-01 00:10 UTC)))
            .await
            .unwrap();
        let now = datetime!(2024-01-01 00:11 UTC);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.claim_refresh("k", now, LEASE).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn link_serializes_as_pair() {
        let json = serde_json::to_string(&CacheLink::new("p", "b")).unwrap();
        assert_eq!(json, r#"["p","b"]"#);
    }
}
