use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LakeError, Result};
use crate::lifecycle::{self, LifecyclePolicy, LifecycleRule};
use crate::zone::{Zone, ZoneCatalog, ZoneRouting, STANDARD_ZONES};

pub const DEFAULT_BUCKET: &str = "ai-knowledge-manager";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Complete lake configuration: store identity plus zone layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LakeConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub lake: LayoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub region_name: String,
    #[serde(default)]
    pub profile_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub zones: Vec<String>,
    #[serde(default)]
    pub lifecycle_rules: IndexMap<String, LifecyclePolicy>,
    /// Explicit step-to-zone routing; tiered routing when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<Vec<String>>,
    /// Zones whose outputs count as pipeline results; third and fourth zone when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_zones: Option<Vec<String>>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_name: DEFAULT_BUCKET.to_string(),
            region_name: DEFAULT_REGION.to_string(),
            profile_name: None,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let mut lifecycle_rules = IndexMap::new();
        lifecycle_rules.insert(
            "raw".to_string(),
            LifecyclePolicy {
                days_to_ia: Some(90),
                days_to_glacier: None,
            },
        );
        lifecycle_rules.insert(
            "processed".to_string(),
            LifecyclePolicy {
                days_to_ia: None,
                days_to_glacier: Some(180),
            },
        );
        Self {
            zones: STANDARD_ZONES.iter().map(|z| z.to_string()).collect(),
            lifecycle_rules,
            routing: None,
            result_zones: None,
        }
    }
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            lake: LayoutConfig::default(),
        }
    }
}

impl LakeConfig {
    /// Check identity fields and the whole zone layout. This is the only
    /// fatal check of a run.
    pub fn validate(&self) -> Result<()> {
        if self.storage.bucket_name.trim().is_empty() {
            return Err(LakeError::Config("bucket name is required".into()));
        }
        if self.storage.region_name.trim().is_empty() {
            return Err(LakeError::Config("region name is required".into()));
        }
        if let Some(profile) = &self.storage.profile_name {
            let plain = !profile.trim().is_empty()
                && profile != "."
                && profile != ".."
                && !profile.contains(['/', '\\']);
            if !plain {
                return Err(LakeError::Config(format!("invalid profile name '{profile}'")));
            }
        }
        if self.lake.zones.is_empty() {
            return Err(LakeError::Config("data lake zones are required".into()));
        }
        let catalog = self.catalog()?;
        self.routing(&catalog)?;
        self.result_zones(&catalog)?;
        self.lifecycle_rules(&catalog)?;
        Ok(())
    }

    pub fn catalog(&self) -> Result<ZoneCatalog> {
        ZoneCatalog::new(&self.lake.zones)
    }

    pub fn routing(&self, catalog: &ZoneCatalog) -> Result<ZoneRouting> {
        match &self.lake.routing {
            Some(zones) => ZoneRouting::explicit(catalog, zones),
            None => Ok(ZoneRouting::Tiered),
        }
    }

    pub fn result_zones(&self, catalog: &ZoneCatalog) -> Result<Vec<Zone>> {
        match &self.lake.result_zones {
            Some(zones) => zones.iter().map(|z| catalog.resolve(z)).collect(),
            None => Ok(catalog.default_result_zones()),
        }
    }

    pub fn lifecycle_rules(&self, catalog: &ZoneCatalog) -> Result<Vec<LifecycleRule>> {
        lifecycle::rules_for(catalog, &self.lake.lifecycle_rules)
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.storage.bucket_name,
            region = %self.storage.region_name,
            profile = ?self.storage.profile_name,
            zones = ?self.lake.zones,
            "Loaded LakeConfig"
        );
        debug!(?self, "LakeConfig loaded (full debug)");
    }
}
