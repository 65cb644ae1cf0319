//! Per-zone storage lifecycle rules derived from configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{LakeError, Result};
use crate::zone::ZoneCatalog;

pub const INFREQUENT_ACCESS: &str = "STANDARD_IA";
pub const ARCHIVE: &str = "GLACIER";

/// Day thresholds for one zone, as written in config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    #[serde(default)]
    pub days_to_ia: Option<u32>,
    #[serde(default)]
    pub days_to_glacier: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub days: u32,
    pub storage_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub id: String,
    pub prefix: String,
    pub transitions: Vec<Transition>,
}

/// Turn per-zone policies into store rules, one per zone with at least one
/// threshold. Policies for zones outside the catalog are rejected.
pub fn rules_for(
    catalog: &ZoneCatalog,
    policies: &IndexMap<String, LifecyclePolicy>,
) -> Result<Vec<LifecycleRule>> {
    let mut rules = Vec::new();
    for (zone, policy) in policies {
        let zone = catalog
            .resolve(zone)
            .map_err(|_| LakeError::Config(format!("lifecycle rule for unknown zone '{zone}'")))?;

        let mut transitions = Vec::new();
        if let Some(days) = policy.days_to_ia {
            transitions.push(Transition {
                days,
                storage_class: INFREQUENT_ACCESS.to_string(),
            });
        }
        if let Some(days) = policy.days_to_glacier {
            transitions.push(Transition {
                days,
                storage_class: ARCHIVE.to_string(),
            });
        }
        if transitions.is_empty() {
            continue;
        }
        rules.push(LifecycleRule {
            id: format!("{zone}-transitions"),
            prefix: format!("{zone}/"),
            transitions,
        });
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policies_produce_no_rules() {
        let mut policies = IndexMap::new();
        policies.insert("raw".to_string(), LifecyclePolicy::default());
        let rules = rules_for(&ZoneCatalog::standard(), &policies).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn unknown_zone_is_a_config_error() {
        let mut policies = IndexMap::new();
        policies.insert(
            "archive".to_string(),
            LifecyclePolicy {
                days_to_ia: Some(30),
                days_to_glacier: None,
            },
        );
        let err = rules_for(&ZoneCatalog::standard(), &policies).unwrap_err();
        assert!(matches!(err, LakeError::Config(_)));
    }
}
