//! Block cache key derivation.
//!
//! The persisted key format is `sha256(identity)_sha256(path)_sha256(query)`
//! in lowercase hex. A block may opt out of the path or the query component,
//! in which case that segment is left empty (`<id>__<query>`), giving four
//! key shapes for the same logical request. External invalidation tooling
//! must reproduce this derivation exactly.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::domain::entities::Block;

/// Which request components participate in a block's cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyShape {
    pub include_path: bool,
    pub include_query: bool,
}

impl KeyShape {
    pub const FULL: KeyShape = KeyShape {
        include_path: true,
        include_query: true,
    };

    pub fn for_block(block: &Block) -> Self {
        Self {
            include_path: !block.cache_omits_path(),
            include_query: !block.cache_omits_query(),
        }
    }
}

impl Default for KeyShape {
    fn default() -> Self {
        Self::FULL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockCacheKey(String);

impl BlockCacheKey {
    pub fn derive(identity: &str, path: &str, query: &str, shape: KeyShape) -> Self {
        let path_segment = if shape.include_path {
            digest(path)
        } else {
            String::new()
        };
        let query_segment = if shape.include_query {
            digest(query)
        } else {
            String::new()
        };
        Self(format!("{}_{}_{}", digest(identity), path_segment, query_segment))
    }

    /// Key for a block rendered under the given request path and query.
    pub fn for_block(block: &Block, path: &str, query: &str) -> Self {
        Self::derive(block.uid(), path, query, KeyShape::for_block(block))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase hex SHA-256 of the UTF-8 bytes of `value`.
pub fn digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
