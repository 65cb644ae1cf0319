/// # zonelake CLI Interface (Module)
///
/// Command parsing and dispatch for the `zonelake` binary. All lake logic
/// (zones, codecs, pipeline, search) lives in `zonelake-core`; this module
/// only loads config, opens the local store and prints results.
///
/// ## How To Use
/// - Command line: `zonelake --help`.
/// - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, write_default_config, CliConfig};
use crate::steps::resolve_steps;
use crate::store::FsObjectStore;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use zonelake_core::contract::Metadata;
use zonelake_core::pipeline::{Pipeline, PipelineOptions};
use zonelake_core::DataLake;

/// CLI for zonelake: move files through raw → processed → enriched → curated zones.
#[derive(Parser)]
#[clap(
    name = "zonelake",
    version,
    about = "Zone-based data lake: upload, organise and transform files across storage zones"
)]
pub struct Cli {
    /// Path to the YAML config file (defaults are used when it is missing)
    #[clap(long, global = true, default_value = "zonelake.yaml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default configuration to --config
    InitConfig {
        #[clap(long)]
        force: bool,
    },
    /// Create the bucket, apply lifecycle rules and write zone markers
    Setup,
    /// Upload a local file into a zone
    Upload {
        file: PathBuf,
        #[clap(long, default_value = "raw")]
        zone: String,
        /// Object path inside the zone (defaults to the file name)
        #[clap(long)]
        path: Option<String>,
        /// Extra metadata as key=value (repeatable)
        #[clap(long = "meta", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,
    },
    /// Download an object to a local path
    Download { key: String, dest: PathBuf },
    /// List objects, optionally within a zone and prefix
    List {
        #[clap(long)]
        zone: Option<String>,
        #[clap(long)]
        prefix: Option<String>,
    },
    /// Delete an object
    Delete { key: String },
    /// Move an object into another zone
    Move {
        key: String,
        #[clap(long)]
        zone: String,
        #[clap(long)]
        path: Option<String>,
    },
    /// Show an object's metadata, or replace it with --set key=value
    Metadata {
        key: String,
        #[clap(long = "set", value_parser = parse_key_val)]
        set: Vec<(String, String)>,
    },
    /// Create an empty folder marker inside a zone
    Mkdir { zone: String, folder: String },
    /// Find objects whose metadata matches every --filter key=value
    Search {
        #[clap(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,
        #[clap(long)]
        zone: Option<String>,
    },
    /// Print a time-limited URL for an object
    Presign {
        key: String,
        /// Lifetime in seconds
        #[clap(long, default_value_t = 3600)]
        expires: u64,
    },
    /// Upload every file in a directory into a zone
    BulkUpload {
        dir: PathBuf,
        #[clap(long, default_value = "raw")]
        zone: String,
        #[clap(long)]
        recursive: bool,
    },
    /// Download every object under a prefix
    BulkDownload {
        prefix: String,
        dest: PathBuf,
        #[clap(long)]
        flatten: bool,
    },
    /// Run local files or object keys through built-in steps
    Run {
        #[clap(required = true)]
        inputs: Vec<String>,
        /// Step name, in order (repeatable): identity, dedupe, trim, lowercase-keys, uppercase
        #[clap(long = "step")]
        steps: Vec<String>,
        #[clap(long, default_value_t = 1)]
        concurrency: usize,
        /// Per store call timeout in seconds
        #[clap(long)]
        timeout: Option<u64>,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

fn to_metadata(pairs: Vec<(String, String)>) -> Metadata {
    pairs.into_iter().collect()
}

/// Each storage profile is a separate account directory under the local root.
fn open_lake(config: &CliConfig) -> Result<DataLake<FsObjectStore>> {
    let root = match &config.lake.storage.profile_name {
        Some(profile) => config.local.root.join(profile),
        None => config.local.root.clone(),
    };
    let store = FsObjectStore::new(root, &config.lake.storage.bucket_name);
    tracing::info!(bucket_dir = %store.bucket_dir().display(), "Opened local object store");
    Ok(DataLake::from_config(store, &config.lake)?)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    if let Commands::InitConfig { force } = cli.command {
        write_default_config(&cli.config, force)?;
        println!("Wrote default configuration to {}", cli.config.display());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    let lake = open_lake(&config)?;

    match cli.command {
        Commands::InitConfig { .. } => {}
        Commands::Setup => {
            lake.ensure_layout().await?;
            println!("Zones ready: {}", lake.catalog().names().join(", "));
        }
        Commands::Upload {
            file,
            zone,
            path,
            metadata,
        } => {
            let metadata = if metadata.is_empty() {
                None
            } else {
                Some(to_metadata(metadata))
            };
            let key = lake
                .upload_file(&file, &zone, path.as_deref(), metadata)
                .await?;
            println!("{key}");
        }
        Commands::Download { key, dest } => {
            lake.download_file(&key, &dest).await?;
            println!("{}", dest.display());
        }
        Commands::List { zone, prefix } => {
            for file in lake.list_files(zone.as_deref(), prefix.as_deref()).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    file.zone(),
                    file.key,
                    file.size,
                    file.last_modified.to_rfc3339()
                );
            }
        }
        Commands::Delete { key } => {
            lake.delete_file(&key).await?;
            println!("Deleted {key}");
        }
        Commands::Move { key, zone, path } => {
            let target = lake.move_file(&key, &zone, path.as_deref()).await?;
            println!("{target}");
        }
        Commands::Metadata { key, set } => {
            if !set.is_empty() {
                lake.update_file_metadata(&key, to_metadata(set)).await?;
            }
            let head = lake.get_file_metadata(&key).await?;
            println!("{}", serde_json::to_string_pretty(&head)?);
        }
        Commands::Mkdir { zone, folder } => {
            println!("{}", lake.create_folder(&zone, &folder).await?);
        }
        Commands::Search { filters, zone } => {
            let filters = to_metadata(filters);
            for file in lake.search_by_metadata(&filters, zone.as_deref()).await? {
                println!("{}", file.key);
            }
        }
        Commands::Presign { key, expires } => {
            let url = lake
                .presigned_url(&key, Some(Duration::from_secs(expires)))
                .await?;
            println!("{url}");
        }
        Commands::BulkUpload {
            dir,
            zone,
            recursive,
        } => {
            let keys = lake.bulk_upload(&dir, &zone, recursive).await?;
            for key in &keys {
                println!("{key}");
            }
            tracing::info!(command = "bulk-upload", count = keys.len(), "Bulk upload complete");
        }
        Commands::BulkDownload {
            prefix,
            dest,
            flatten,
        } => {
            let count = lake.bulk_download(&prefix, &dest, flatten).await?;
            println!("Downloaded {count} files to {}", dest.display());
        }
        Commands::Run {
            inputs,
            steps,
            concurrency,
            timeout,
        } => {
            let steps = resolve_steps(&steps)?;
            let lake = match timeout {
                Some(secs) => lake.with_store_timeout(Duration::from_secs(secs)),
                None => lake,
            };
            let pipeline = Pipeline::from_config(&lake, &config.lake)?
                .with_options(PipelineOptions { concurrency });
            tracing::info!(command = "run", inputs = inputs.len(), steps = steps.len(), "Starting pipeline");
            let report = pipeline.run_with_report(&inputs, &steps).await;
            for input in &report.inputs {
                if let Some(failure) = &input.failure {
                    eprintln!("{}: failed at {} ({})", input.input, failure.stage, failure.message);
                }
            }
            for key in report.results() {
                println!("{key}");
            }
        }
    }

    Ok(())
}
