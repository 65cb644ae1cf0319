/// `load_config` module: reads the YAML lake configuration and applies
/// environment overrides before anything touches the store.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`CliConfig`]
/// - Fall back to built-in defaults when the file does not exist
/// - Apply `ZONELAKE_*` environment overrides for store identity
/// - Validate the result; a failure here is the only fatal error of a run
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use zonelake_core::config::LakeConfig;

pub const ENV_BUCKET: &str = "ZONELAKE_BUCKET";
pub const ENV_REGION: &str = "ZONELAKE_REGION";
pub const ENV_PROFILE: &str = "ZONELAKE_PROFILE";
pub const ENV_ROOT: &str = "ZONELAKE_ROOT";

pub const DEFAULT_ROOT: &str = ".zonelake";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub lake: LakeConfig,
    #[serde(default)]
    pub local: LocalSection,
}

/// Where the filesystem store keeps its buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSection {
    pub root: PathBuf,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            lake: LakeConfig::default(),
            local: LocalSection::default(),
        }
    }
}

fn env_override(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn apply_env_overrides(config: &mut CliConfig) {
    if let Some(bucket) = env_override(ENV_BUCKET) {
        info!(bucket = %bucket, "Bucket name overridden from environment");
        config.lake.storage.bucket_name = bucket;
    }
    if let Some(region) = env_override(ENV_REGION) {
        info!(region = %region, "Region overridden from environment");
        config.lake.storage.region_name = region;
    }
    if let Some(profile) = env_override(ENV_PROFILE) {
        config.lake.storage.profile_name = Some(profile);
    }
    if let Some(root) = env_override(ENV_ROOT) {
        config.local.root = PathBuf::from(root);
    }
}

/// Load the config at `path`, or defaults when it does not exist, then apply
/// environment overrides and validate.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let mut config = if path_ref.exists() {
        let content = match fs::read_to_string(path_ref) {
            Ok(content) => content,
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
                return Err(anyhow::anyhow!(
                    "Failed to read config file {:?}: {}",
                    path_ref,
                    e
                ));
            }
        };
        match serde_yaml::from_str::<CliConfig>(&content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    } else {
        warn!(config_path = ?path_ref, "Config file not found, using defaults");
        CliConfig::default()
    };

    dotenvy::dotenv().ok(); // loads environment overrides from .env if present
    apply_env_overrides(&mut config);

    if let Err(e) = config.lake.validate() {
        error!(error = %e, "Configuration is invalid");
        return Err(anyhow::anyhow!("Invalid configuration: {e}"));
    }
    config.lake.trace_loaded();
    Ok(config)
}

/// Write the default configuration to `path`. Refuses to overwrite unless
/// `force` is set.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let yaml = serde_yaml::to_string(&CliConfig::default())
        .context("Failed to render default config")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(config_path = ?path, "Wrote default configuration");
    Ok(())
}
