//! # lake: zone-aware file operations over an [`ObjectStore`]
//!
//! [`DataLake`] bundles a store with the [`ZoneCatalog`] and the
//! [`CodecRegistry`] and provides everything above raw object calls:
//! layout bootstrap, uploads into zones, moves between zones, metadata
//! management, parse/serialize round-trips and bulk transfers.
//!
//! # Invariants
//! - Any zone argument is resolved against the catalog before the first
//!   store call, so an unknown zone never mutates the store.
//! - Lineage metadata keys ([`LINEAGE_KEYS`]) are reserved: caller-supplied
//!   metadata has them stripped, and only the pipeline writes them.
//! - Every store call runs under the configured timeout.
//! - Local temporary files are scoped and removed on every path.

use indexmap::IndexMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::codec::{self, content_type_for, CodecRegistry, Content, ContentEnvelope};
use crate::config::LakeConfig;
use crate::contract::{
    BucketStatus, Metadata, MetadataDirective, ObjectHead, ObjectInfo, ObjectStore, StoreError,
};
use crate::error::{LakeError, Result};
use crate::lifecycle::LifecycleRule;
use crate::pipeline::PipelineStep;
use crate::zone::{ObjectKey, Zone, ZoneCatalog};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// Metadata keys only the pipeline may set.
pub const LINEAGE_KEYS: [&str; 3] = ["original_file", "processing_step", "processor"];

pub struct DataLake<S> {
    store: S,
    catalog: ZoneCatalog,
    codecs: CodecRegistry,
    region: String,
    lifecycle: Vec<LifecycleRule>,
    store_timeout: Duration,
}

fn strip_lineage(mut metadata: Metadata) -> Metadata {
    metadata.retain(|k, _| {
        let reserved = LINEAGE_KEYS.contains(&k.as_str());
        if reserved {
            debug!(key = %k, "Dropping reserved lineage key from caller metadata");
        }
        !reserved
    });
    metadata
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| LakeError::InvalidKey(path.display().to_string()))
}

/// Object path for `path` relative to `root`, always `/`-separated.
fn relative_object_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            if recursive {
                collect_files(&path, recursive, out)?;
            }
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

impl<S: ObjectStore> DataLake<S> {
    pub fn new(store: S, catalog: ZoneCatalog) -> Self {
        Self {
            store,
            catalog,
            codecs: CodecRegistry::standard(),
            region: crate::config::DEFAULT_REGION.to_string(),
            lifecycle: Vec::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Validate `config` and build a lake from it.
    pub fn from_config(store: S, config: &LakeConfig) -> Result<Self> {
        config.validate()?;
        let catalog = config.catalog()?;
        let lifecycle = config.lifecycle_rules(&catalog)?;
        Ok(Self::new(store, catalog)
            .with_region(&config.storage.region_name)
            .with_lifecycle(lifecycle))
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    pub fn with_lifecycle(mut self, rules: Vec<LifecycleRule>) -> Self {
        self.lifecycle = rules;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &ZoneCatalog {
        &self.catalog
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Run one store call under the configured timeout.
    pub(crate) async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(LakeError::from),
            Err(_) => {
                error!(operation, timeout = ?self.store_timeout, "Store call timed out");
                Err(LakeError::Timeout {
                    operation,
                    timeout: self.store_timeout,
                })
            }
        }
    }

    /// Make sure the bucket exists, apply lifecycle rules and write a marker
    /// object for every zone.
    pub async fn ensure_layout(&self) -> Result<()> {
        match self.call("ensure_bucket", self.store.ensure_bucket(&self.region)).await? {
            BucketStatus::Existing => info!(region = %self.region, "Bucket already exists"),
            BucketStatus::Created => info!(region = %self.region, "Created bucket"),
        }

        if let Err(e) = self
            .call("configure_lifecycle", self.store.configure_lifecycle(&self.lifecycle))
            .await
        {
            // A bucket without lifecycle rules is still usable.
            error!(error = %e, "Error setting lifecycle policies");
        } else {
            info!(rules = self.lifecycle.len(), "Lifecycle policies set up");
        }

        for zone in self.catalog.zones() {
            self.call(
                "put",
                self.store.put(&format!("{zone}/"), Vec::new(), Metadata::new()),
            )
            .await?;
            info!(zone = %zone, "Created or confirmed zone");
        }
        Ok(())
    }

    /// Upload a local file into `zone`. The object path defaults to the file
    /// name and metadata defaults to [`DataLake::extract_metadata`].
    pub async fn upload_file(
        &self,
        local_path: &Path,
        zone: &str,
        object_path: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<ObjectKey> {
        let zone = self.catalog.resolve(zone)?;
        let name = match object_path {
            Some(p) => p.to_string(),
            None => file_name_of(local_path)?,
        };
        let key = ObjectKey::in_zone(zone, &name)?;

        let metadata = match metadata {
            Some(m) => m,
            None => self.extract_metadata(local_path).await?,
        };
        let bytes = tokio::fs::read(local_path).await?;
        self.write_object(&key, bytes, strip_lineage(metadata)).await?;
        info!(local = %local_path.display(), key = %key, "Successfully uploaded file");
        Ok(key)
    }

    /// Upload in-memory bytes as `<zone>/<object_path>`.
    pub async fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        zone: &str,
        object_path: &str,
        metadata: Metadata,
    ) -> Result<ObjectKey> {
        let key = ObjectKey::new(&self.catalog, zone, object_path)?;
        self.write_object(&key, bytes, strip_lineage(metadata)).await?;
        Ok(key)
    }

    /// Raw write with no metadata filtering.
    pub(crate) async fn write_object(
        &self,
        key: &ObjectKey,
        bytes: Vec<u8>,
        metadata: Metadata,
    ) -> Result<()> {
        let key = key.to_string();
        debug!(key = %key, size = bytes.len(), "Writing object");
        self.call("put", self.store.put(&key, bytes, metadata)).await
    }

    /// Download `key` to `local_path`, creating parent directories. The file
    /// appears atomically or not at all.
    pub async fn download_file(&self, key: &str, local_path: &Path) -> Result<()> {
        let bytes = self.call("get", self.store.get(key)).await?;

        let parent = local_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&bytes)?;
        tmp.persist(local_path).map_err(|e| LakeError::Io(e.error))?;

        info!(key, local = %local_path.display(), "Downloaded file");
        Ok(())
    }

    /// List objects, optionally restricted to a zone and/or a prefix inside
    /// it. Zone marker objects (keys ending in `/`) are skipped.
    pub async fn list_files(
        &self,
        zone: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectInfo>> {
        let full_prefix = match (zone, prefix) {
            (Some(zone), Some(prefix)) => format!("{}/{prefix}", self.catalog.resolve(zone)?),
            (Some(zone), None) => format!("{}/", self.catalog.resolve(zone)?),
            (None, Some(prefix)) => prefix.to_string(),
            (None, None) => String::new(),
        };
        let listing = self.call("list", self.store.list(&full_prefix)).await?;
        Ok(listing
            .into_iter()
            .filter(|o| !o.key.ends_with('/'))
            .collect())
    }

    pub async fn delete_file(&self, key: &str) -> Result<()> {
        self.call("delete", self.store.delete(key)).await?;
        info!(key, "Deleted object");
        Ok(())
    }

    /// Move an object into `target_zone` (copy then delete). The target path
    /// defaults to the source file name.
    pub async fn move_file(
        &self,
        source_key: &str,
        target_zone: &str,
        target_path: Option<&str>,
    ) -> Result<ObjectKey> {
        let zone = self.catalog.resolve(target_zone)?;
        let name = match target_path {
            Some(p) => p,
            None => source_key.rsplit('/').next().unwrap_or(source_key),
        };
        let target = ObjectKey::in_zone(zone, name)?;
        let target_key = target.to_string();

        self.call(
            "copy",
            self.store
                .copy(source_key, &target_key, MetadataDirective::Copy),
        )
        .await?;
        self.call("delete", self.store.delete(source_key)).await?;
        info!(source = source_key, target = %target_key, "Moved object");
        Ok(target)
    }

    pub async fn get_file_metadata(&self, key: &str) -> Result<ObjectHead> {
        self.call("head", self.store.head(key)).await
    }

    /// Replace the caller-owned metadata of `key`. Lineage keys already on
    /// the object are carried over unchanged.
    pub async fn update_file_metadata(&self, key: &str, metadata: Metadata) -> Result<()> {
        let existing = self.call("head", self.store.head(key)).await?;
        let mut replacement = strip_lineage(metadata);
        for (k, v) in existing.metadata {
            if LINEAGE_KEYS.contains(&k.as_str()) {
                replacement.insert(k, v);
            }
        }
        self.call(
            "copy",
            self.store
                .copy(key, key, MetadataDirective::Replace(replacement)),
        )
        .await?;
        info!(key, "Updated metadata");
        Ok(())
    }

    /// Create an empty `<zone>/<folder>/` marker object.
    pub async fn create_folder(&self, zone: &str, folder_path: &str) -> Result<String> {
        let zone = self.catalog.resolve(zone)?;
        let folder = folder_path.trim_matches('/');
        if folder.is_empty() {
            return Err(LakeError::InvalidKey(format!("{zone}/{folder_path}")));
        }
        let key = format!("{zone}/{folder}/");
        self.call("put", self.store.put(&key, Vec::new(), Metadata::new()))
            .await?;
        info!(key = %key, "Created folder");
        Ok(key)
    }

    pub async fn presigned_url(&self, key: &str, ttl: Option<Duration>) -> Result<String> {
        let ttl = ttl.unwrap_or(DEFAULT_PRESIGN_TTL);
        self.call("presign", self.store.presign(key, ttl)).await
    }

    /// Fetch `key` and parse it with the codec for its extension. `None`
    /// means the format is recognised but cannot be parsed.
    pub async fn parse_object(&self, key: &str) -> Result<Option<ContentEnvelope>> {
        let bytes = self.call("get", self.store.get(key)).await?;
        let codec = self.codecs.resolve_by_extension(key);
        codec::parse(&bytes, &codec)
    }

    /// Serialize `content` with the codec for `file_name` and upload it to
    /// `<zone>/<file_name>`. `None` when the format has no serializer.
    pub async fn save_and_upload(
        &self,
        content: &Content,
        file_name: &str,
        zone: &str,
        metadata: Metadata,
    ) -> Result<Option<ObjectKey>> {
        let key = ObjectKey::new(&self.catalog, zone, file_name)?;
        let codec = self.codecs.resolve_by_extension(file_name);
        let bytes = match codec::serialize(content, &codec) {
            Ok(bytes) => bytes,
            Err(LakeError::CapabilityGap { format, extension }) => {
                warn!(format, extension = %extension, "Saving not implemented for this format");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.write_object(&key, bytes, strip_lineage(metadata))
            .await?;
        Ok(Some(key))
    }

    /// Basic file facts plus format-specific hints (column names and row
    /// count for tables, sheet names for workbooks).
    pub async fn extract_metadata(&self, local_path: &Path) -> Result<Metadata> {
        let name = file_name_of(local_path)?;
        let stat = tokio::fs::metadata(local_path).await?;

        let mut metadata = Metadata::new();
        metadata.insert("filename".into(), name.clone());
        metadata.insert("size_bytes".into(), stat.len().to_string());
        if let Ok(modified) = stat.modified() {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            metadata.insert("modified_time".into(), modified.to_rfc3339());
        }
        metadata.insert("content_type".into(), content_type_for(&name).to_string());

        let codec = self.codecs.resolve_by_extension(&name);
        if matches!(codec.format(), "tabular" | "spreadsheet") {
            let bytes = tokio::fs::read(local_path).await?;
            match codec.parse(&bytes) {
                Ok(Content::Records(records)) => {
                    if let Some(first) = records.first() {
                        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
                        metadata.insert("columns".into(), columns.join(","));
                    }
                    metadata.insert("row_count_estimate".into(), records.len().to_string());
                }
                Ok(Content::Sheets(sheets)) => {
                    let names: Vec<&str> = sheets.keys().map(String::as_str).collect();
                    metadata.insert("sheets".into(), names.join(","));
                }
                Ok(_) => {}
                Err(e) => warn!(path = %local_path.display(), error = %e, "Could not extract format metadata"),
            }
        }
        Ok(metadata)
    }

    /// Upload every file under `directory` into `zone`, keeping relative
    /// paths. Files that fail are logged and skipped.
    pub async fn bulk_upload(
        &self,
        directory: &Path,
        zone: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectKey>> {
        let zone = self.catalog.resolve(zone)?;
        let mut files = Vec::new();
        collect_files(directory, recursive, &mut files)?;

        let mut uploaded = Vec::new();
        for path in files {
            let Some(object_path) = relative_object_path(directory, &path) else {
                continue;
            };
            match self
                .upload_file(&path, zone.as_str(), Some(&object_path), None)
                .await
            {
                Ok(key) => uploaded.push(key),
                Err(e) => error!(path = %path.display(), error = %e, "Failed to upload file"),
            }
        }
        info!(count = uploaded.len(), zone = %zone, "Bulk upload finished");
        Ok(uploaded)
    }

    /// Download every object under `prefix` into `local_dir`. Returns how
    /// many files were written.
    pub async fn bulk_download(
        &self,
        prefix: &str,
        local_dir: &Path,
        flatten: bool,
    ) -> Result<usize> {
        std::fs::create_dir_all(local_dir)?;
        let files = self.list_files(None, Some(prefix)).await?;

        let mut count = 0;
        for file in files {
            let base_name = file.key.rsplit('/').next().unwrap_or(&file.key);
            let relative = if flatten {
                base_name
            } else {
                match file.key.strip_prefix(prefix).map(|r| r.trim_start_matches('/')) {
                    Some(rel) if !rel.is_empty() => rel,
                    _ => base_name,
                }
            };
            let local_path = local_dir.join(relative);
            match self.download_file(&file.key, &local_path).await {
                Ok(()) => count += 1,
                Err(e) => error!(key = %file.key, error = %e, "Failed to download file"),
            }
        }
        Ok(count)
    }

    /// Parse each local file, optionally transform it with `step`, and upload
    /// it into `zone` under its own file name with extracted metadata.
    /// Without a step files are uploaded as-is. Returns input path to key.
    pub async fn batch_process_files(
        &self,
        paths: &[PathBuf],
        zone: &str,
        step: Option<&PipelineStep>,
    ) -> Result<IndexMap<PathBuf, ObjectKey>> {
        let zone: Zone = self.catalog.resolve(zone)?;
        let mut results = IndexMap::new();

        for path in paths {
            let outcome = match step {
                None => self.upload_file(path, zone.as_str(), None, None).await,
                Some(step) => self.transform_and_upload(path, &zone, step).await,
            };
            match outcome {
                Ok(key) => {
                    info!(path = %path.display(), key = %key, "Processed and uploaded file");
                    results.insert(path.clone(), key);
                }
                Err(e) => error!(path = %path.display(), error = %e, "Error processing file"),
            }
        }
        Ok(results)
    }

    async fn transform_and_upload(
        &self,
        path: &Path,
        zone: &Zone,
        step: &PipelineStep,
    ) -> Result<ObjectKey> {
        let name = file_name_of(path)?;
        let codec = self.codecs.resolve_by_extension(&name);
        let bytes = tokio::fs::read(path).await?;
        let envelope = codec::parse(&bytes, &codec)?.ok_or_else(|| LakeError::CapabilityGap {
            format: codec.format(),
            extension: codec::extension_of(&name),
        })?;
        let content = step.apply(envelope.content).map_err(|e| LakeError::Parse {
            format: codec.format(),
            message: format!("step '{}' failed: {e}", step.name()),
        })?;
        let metadata = self.extract_metadata(path).await?;
        self.save_and_upload(&content, &name, zone.as_str(), metadata)
            .await?
            .ok_or_else(|| LakeError::CapabilityGap {
                format: codec.format(),
                extension: codec::extension_of(&name),
            })
    }
}
