//! # Local-directory object store
//!
//! [`FsObjectStore`] implements the core [`ObjectStore`] contract on a plain
//! directory, one directory per bucket:
//!
//! ```text
//! <root>/<bucket>/bucket.json        region the bucket was created in
//! <root>/<bucket>/lifecycle.json     last applied lifecycle rules
//! <root>/<bucket>/objects/<name>     object bytes
//! <root>/<bucket>/meta/<name>.json   metadata sidecar
//! ```
//!
//! Keys are stored flat: `<name>` is the key with `%` and `/` escaped, so
//! zone markers such as `raw/` are ordinary objects. Writes go through a
//! temporary file and are renamed into place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use zonelake_core::codec::content_type_for;
use zonelake_core::contract::{
    BucketStatus, Metadata, MetadataDirective, ObjectHead, ObjectInfo, ObjectStore, StoreError,
};
use zonelake_core::lifecycle::LifecycleRule;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    metadata: Metadata,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketInfo {
    region: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    bucket_dir: PathBuf,
}

pub(crate) fn encode_key(key: &str) -> String {
    key.replace('%', "%25").replace('/', "%2F")
}

pub(crate) fn decode_key(name: &str) -> String {
    name.replace("%2F", "/").replace("%25", "%")
}

fn etag_of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn store_err(key: &str, e: std::io::Error) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::other(format!("{key}: {e}"))
    }
}

/// Write `bytes` next to `path` and rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl FsObjectStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            bucket_dir: root.as_ref().join(bucket),
        }
    }

    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn objects_dir(&self) -> PathBuf {
        self.bucket_dir.join("objects")
    }

    fn meta_dir(&self) -> PathBuf {
        self.bucket_dir.join("meta")
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.objects_dir().join(encode_key(key))
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.meta_dir().join(format!("{}.json", encode_key(key)))
    }

    async fn read_sidecar(&self, key: &str) -> Result<Sidecar, StoreError> {
        let raw = tokio::fs::read(self.sidecar_path(key))
            .await
            .map_err(|e| store_err(key, e))?;
        serde_json::from_slice(&raw).map_err(|e| StoreError::other(format!("{key}: {e}")))
    }

    fn write_sidecar(&self, key: &str, sidecar: &Sidecar) -> Result<(), StoreError> {
        let raw =
            serde_json::to_vec_pretty(sidecar).map_err(|e| StoreError::other(format!("{key}: {e}")))?;
        write_atomic(&self.sidecar_path(key), &raw).map_err(|e| store_err(key, e))
    }

    fn ensure_dirs(&self) -> Result<(), StoreError> {
        for dir in [self.objects_dir(), self.meta_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| StoreError::other(format!("{}: {e}", dir.display())))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn ensure_bucket(&self, region: &str) -> Result<BucketStatus, StoreError> {
        let info_path = self.bucket_dir.join("bucket.json");
        if info_path.exists() {
            return Ok(BucketStatus::Existing);
        }
        self.ensure_dirs()?;
        let info = BucketInfo {
            region: region.to_string(),
            created: Utc::now(),
        };
        let raw = serde_json::to_vec_pretty(&info).map_err(StoreError::other)?;
        write_atomic(&info_path, &raw).map_err(|e| store_err("bucket.json", e))?;
        info!(bucket_dir = %self.bucket_dir.display(), region, "Created local bucket");
        Ok(BucketStatus::Created)
    }

    async fn configure_lifecycle(&self, rules: &[LifecycleRule]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.bucket_dir).map_err(|e| store_err("lifecycle.json", e))?;
        let raw = serde_json::to_vec_pretty(rules).map_err(StoreError::other)?;
        write_atomic(&self.bucket_dir.join("lifecycle.json"), &raw)
            .map_err(|e| store_err("lifecycle.json", e))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: Metadata) -> Result<(), StoreError> {
        self.ensure_dirs()?;
        let sidecar = Sidecar {
            metadata,
            etag: etag_of(&bytes),
            last_modified: Utc::now(),
        };
        write_atomic(&self.object_path(key), &bytes).map_err(|e| store_err(key, e))?;
        self.write_sidecar(key, &sidecar)?;
        debug!(key, size = bytes.len(), "fs put");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(self.object_path(key))
            .await
            .map_err(|e| store_err(key, e))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        for path in [self.object_path(key), self.sidecar_path(key)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(store_err(key, e)),
            }
        }
        Ok(())
    }

    async fn copy(
        &self,
        src_key: &str,
        dst_key: &str,
        directive: MetadataDirective,
    ) -> Result<(), StoreError> {
        let bytes = self.get(src_key).await?;
        let mut sidecar = self.read_sidecar(src_key).await?;
        if let MetadataDirective::Replace(metadata) = directive {
            sidecar.metadata = metadata;
        }
        sidecar.last_modified = Utc::now();
        if src_key != dst_key {
            write_atomic(&self.object_path(dst_key), &bytes).map_err(|e| store_err(dst_key, e))?;
        }
        self.write_sidecar(dst_key, &sidecar)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let mut entries = match tokio::fs::read_dir(self.objects_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_err(prefix, e)),
        };

        let mut listing = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| store_err(prefix, e))? {
            let Some(name) = entry.file_name().to_str().map(decode_key) else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }
            let size = entry
                .metadata()
                .await
                .map_err(|e| store_err(&name, e))?
                .len();
            let last_modified = match self.read_sidecar(&name).await {
                Ok(sidecar) => sidecar.last_modified,
                Err(_) => Utc::now(),
            };
            listing.push(ObjectInfo {
                key: name,
                size,
                last_modified,
            });
        }
        listing.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listing)
    }

    async fn head(&self, key: &str) -> Result<ObjectHead, StoreError> {
        let size = tokio::fs::metadata(self.object_path(key))
            .await
            .map_err(|e| store_err(key, e))?
            .len();
        let sidecar = self.read_sidecar(key).await?;
        Ok(ObjectHead {
            key: key.to_string(),
            size,
            last_modified: sidecar.last_modified,
            content_type: Some(content_type_for(key).to_string()),
            metadata: sidecar.metadata,
            etag: Some(sidecar.etag),
        })
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        let path = self.object_path(key);
        let absolute = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| store_err(key, e))?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("file://{}?expires={expires}", absolute.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encoding_is_reversible() {
        for key in ["raw/", "raw/a/b.csv", "curated/100%.txt"] {
            let encoded = encode_key(key);
            assert!(!encoded.contains('/'));
            assert_eq!(decode_key(&encoded), key);
        }
    }

    #[test]
    fn etag_is_hex_sha256() {
        let etag = etag_of(b"abc");
        assert_eq!(etag.len(), 64);
        assert!(etag.starts_with("ba7816bf"));
    }
}
