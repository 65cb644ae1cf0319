#![allow(unused)]

//! # contract: the object store capability surface
//!
//! zonelake never talks to a storage backend directly. Everything it needs
//! from the backing object store is expressed by the [`ObjectStore`] trait:
//! put/get/delete/copy/list/head/presign plus two bucket-level configuration
//! calls used when the lake layout is first ensured.
//!
//! ## Contract
//! - Each call is atomic from the caller's point of view; there is no
//!   partial or streamed result.
//! - Failures surface as a single [`StoreError`], split only into
//!   "not found" and "other". Implementations do not retry.
//! - Listings come back in store order (lexicographic by key for the
//!   shipped implementations).
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockObjectStore` is exported
//!   under the `test-export-mocks` feature for downstream integration tests.
//! - [`crate::memory::MemoryObjectStore`] is a working in-process store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use mockall::{automock, predicate::*};

pub use crate::error::StoreError;
use crate::lifecycle::LifecycleRule;

/// Ordered string-to-string annotations attached to an object at write time.
pub type Metadata = IndexMap<String, String>;

/// One entry of a store listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl ObjectInfo {
    /// First path segment of the key, or `unknown` for keys without one.
    pub fn zone(&self) -> &str {
        match self.key.split_once('/') {
            Some((zone, _)) => zone,
            None => "unknown",
        }
    }
}

/// Result of a `head` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
    pub metadata: Metadata,
    pub etag: Option<String>,
}

/// What happens to metadata when an object is copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataDirective {
    /// Destination keeps the source metadata.
    Copy,
    /// Destination gets exactly this metadata.
    Replace(Metadata),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Existing,
    Created,
}

/// Capability surface of the backing object store.
///
/// The trait is `Send` + `Sync` and intended for async/await usage. Real
/// backends, the in-memory store and test mocks all implement it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Make sure the bucket exists, creating it in `region` when missing.
    async fn ensure_bucket(&self, region: &str) -> Result<BucketStatus, StoreError>;

    /// Replace the bucket's lifecycle configuration.
    async fn configure_lifecycle(&self, rules: &[LifecycleRule]) -> Result<(), StoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: Metadata) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn copy(
        &self,
        src_key: &str,
        dst_key: &str,
        directive: MetadataDirective,
    ) -> Result<(), StoreError>;

    /// All objects whose key starts with `prefix` (empty prefix lists everything).
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError>;

    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError>;

    /// A time-limited read URL for `key`.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError>;
}
