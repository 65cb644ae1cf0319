//! Zone model: the fixed, ordered catalog of storage tiers and the rules for
//! moving content between them.
//!
//! A [`ZoneCatalog`] is built once (from config or [`ZoneCatalog::standard`])
//! and handed to every component that needs it. Any operation that accepts a
//! zone name resolves it through the catalog first, so an unknown zone fails
//! with [`LakeError::InvalidZone`] before anything touches the store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LakeError, Result};

/// Names of the standard four-tier layout.
pub const STANDARD_ZONES: [&str; 4] = ["raw", "processed", "enriched", "curated"];

/// A named tier of the catalog. Only obtainable through [`ZoneCatalog`], so a
/// `Zone` value is always a member of the catalog that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Zone(String);

impl Zone {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Zone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneCatalog {
    zones: Vec<Zone>,
}

impl ZoneCatalog {
    /// Build a catalog from ordered zone names. Names must be non-empty,
    /// unique and free of `/`; the catalog itself must not be empty.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut zones: Vec<Zone> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || name.contains('/') {
                return Err(LakeError::Config(format!("invalid zone name '{name}'")));
            }
            if zones.iter().any(|z| z.as_str() == name) {
                return Err(LakeError::Config(format!("duplicate zone '{name}'")));
            }
            zones.push(Zone(name.to_string()));
        }
        if zones.is_empty() {
            return Err(LakeError::Config("zone catalog must not be empty".into()));
        }
        Ok(Self { zones })
    }

    /// `raw → processed → enriched → curated`
    pub fn standard() -> Self {
        Self {
            zones: STANDARD_ZONES.iter().map(|z| Zone(z.to_string())).collect(),
        }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn names(&self) -> Vec<String> {
        self.zones.iter().map(|z| z.0.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    /// Landing zone for new content.
    pub fn first(&self) -> &Zone {
        &self.zones[0]
    }

    pub fn last(&self) -> &Zone {
        &self.zones[self.zones.len() - 1]
    }

    pub fn validate(&self, zone: &str) -> bool {
        self.zones.iter().any(|z| z.as_str() == zone)
    }

    pub fn resolve(&self, zone: &str) -> Result<Zone> {
        self.zones
            .iter()
            .find(|z| z.as_str() == zone)
            .cloned()
            .ok_or_else(|| LakeError::InvalidZone {
                zone: zone.to_string(),
                allowed: self.names(),
            })
    }

    pub fn position(&self, zone: &Zone) -> Option<usize> {
        self.zones.iter().position(|z| z == zone)
    }

    /// Fixed three-tier mapping: the first step lands in the second zone, the
    /// final step in the last zone and every step in between in the third
    /// zone. Indices are clamped for catalogs shorter than four zones.
    pub fn target_zone_for_step(&self, step_index: usize, total_steps: usize) -> Zone {
        let last = self.zones.len() - 1;
        let index = if step_index == 0 {
            1
        } else if step_index + 1 == total_steps {
            last
        } else {
            2
        };
        self.zones[index.min(last)].clone()
    }

    /// Zones whose final outputs count as pipeline results: the third and
    /// fourth catalog entries.
    pub fn default_result_zones(&self) -> Vec<Zone> {
        self.zones.iter().skip(2).take(2).cloned().collect()
    }
}

impl Default for ZoneCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// How pipeline steps map onto target zones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ZoneRouting {
    /// [`ZoneCatalog::target_zone_for_step`].
    #[default]
    Tiered,
    /// Step `i` lands in `zones[i]`; steps past the end reuse the last entry.
    Explicit(Vec<Zone>),
}

impl ZoneRouting {
    pub fn explicit<I, S>(catalog: &ZoneCatalog, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let zones = names
            .into_iter()
            .map(|n| catalog.resolve(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if zones.is_empty() {
            return Err(LakeError::Config("explicit routing needs at least one zone".into()));
        }
        Ok(ZoneRouting::Explicit(zones))
    }

    pub fn target(&self, catalog: &ZoneCatalog, step_index: usize, total_steps: usize) -> Zone {
        match self {
            ZoneRouting::Tiered => catalog.target_zone_for_step(step_index, total_steps),
            // An empty list behaves like tiered routing.
            ZoneRouting::Explicit(zones) => zones
                .get(step_index)
                .or_else(|| zones.last())
                .cloned()
                .unwrap_or_else(|| catalog.target_zone_for_step(step_index, total_steps)),
        }
    }
}

/// A `<zone>/<path>` object key whose zone is guaranteed to be in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    zone: Zone,
    path: String,
}

impl ObjectKey {
    pub fn new(catalog: &ZoneCatalog, zone: &str, path: &str) -> Result<Self> {
        let zone = catalog.resolve(zone)?;
        Self::in_zone(zone, path)
    }

    pub fn in_zone(zone: Zone, path: &str) -> Result<Self> {
        if path.is_empty() || path.starts_with('/') {
            return Err(LakeError::InvalidKey(format!("{zone}/{path}")));
        }
        Ok(Self {
            zone,
            path: path.to_string(),
        })
    }

    pub fn parse(catalog: &ZoneCatalog, key: &str) -> Result<Self> {
        let (zone, path) = key
            .split_once('/')
            .ok_or_else(|| LakeError::InvalidKey(key.to_string()))?;
        Self::new(catalog, zone, path)
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.path)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.to_string()
    }
}
