use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::codec::content_type_for;
use crate::contract::{
    BucketStatus, Metadata, MetadataDirective, ObjectHead, ObjectInfo, ObjectStore, StoreError,
};
use crate::lifecycle::LifecycleRule;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    metadata: Metadata,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Bucket {
    created: bool,
    objects: BTreeMap<String, StoredObject>,
    lifecycle: Vec<LifecycleRule>,
}

/// In-process object store for tests and dry runs. Listings are
/// lexicographic by key. Clones share the same bucket.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    name: String,
    bucket: Arc<Mutex<Bucket>>,
}

impl MemoryObjectStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: Arc::new(Mutex::new(Bucket::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Bucket>, StoreError> {
        self.bucket
            .lock()
            .map_err(|_| StoreError::other("memory store lock poisoned"))
    }

    /// Keys currently stored, in listing order.
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn lifecycle_rules(&self) -> Vec<LifecycleRule> {
        self.lock().map(|b| b.lifecycle.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_bucket(&self, region: &str) -> Result<BucketStatus, StoreError> {
        let mut bucket = self.lock()?;
        if bucket.created {
            return Ok(BucketStatus::Existing);
        }
        bucket.created = true;
        debug!(bucket = %self.name, region, "Created in-memory bucket");
        Ok(BucketStatus::Created)
    }

    async fn configure_lifecycle(&self, rules: &[LifecycleRule]) -> Result<(), StoreError> {
        self.lock()?.lifecycle = rules.to_vec();
        Ok(())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: Metadata) -> Result<(), StoreError> {
        debug!(key, size = bytes.len(), "memory put");
        self.lock()?.objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                metadata,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.lock()?
            .objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.objects.remove(key);
        Ok(())
    }

    async fn copy(
        &self,
        src_key: &str,
        dst_key: &str,
        directive: MetadataDirective,
    ) -> Result<(), StoreError> {
        let mut bucket = self.lock()?;
        let mut object = bucket
            .objects
            .get(src_key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(src_key.to_string()))?;
        if let MetadataDirective::Replace(metadata) = directive {
            object.metadata = metadata;
        }
        object.last_modified = Utc::now();
        bucket.objects.insert(dst_key.to_string(), object);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        Ok(self
            .lock()?
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, o)| ObjectInfo {
                key: key.clone(),
                size: o.bytes.len() as u64,
                last_modified: o.last_modified,
            })
            .collect())
    }

    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError> {
        let bucket = self.lock()?;
        let object = bucket
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(ObjectHead {
            key: key.to_string(),
            size: object.bytes.len() as u64,
            last_modified: object.last_modified,
            content_type: Some(content_type_for(key).to_string()),
            metadata: object.metadata.clone(),
            etag: None,
        })
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        if !self.lock()?.objects.contains_key(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!(
            "memory://{}/{}?token={}&expires={}",
            self.name,
            key,
            Uuid::new_v4(),
            expires
        ))
    }
}
