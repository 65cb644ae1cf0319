//! # pipeline: drive inputs through transformation steps across zones
//!
//! For each input the orchestrator resolves initial content (uploading a local
//! file into the first zone when needed), applies every [`PipelineStep`] in
//! order, and writes each step's output into the zone chosen by
//! [`ZoneRouting`], tagged with lineage metadata.
//!
//! # Failure isolation
//! A failure while resolving, parsing, transforming, serializing or writing
//! one input is logged and ends that input only. The batch always completes
//! and returns the (possibly empty) list of result keys; inputs whose final
//! zone is not a result zone are left out.
//!
//! # Concurrency
//! Inputs may run under a bounded pool ([`PipelineOptions::concurrency`]);
//! steps within one input are strictly sequential. Results keep input order.
//! A [`CancelToken`] is checked before every input and every step.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::codec::{self, CodecHandle, Content};
use crate::config::LakeConfig;
use crate::contract::{Metadata, ObjectStore};
use crate::error::{LakeError, Result};
use crate::lake::DataLake;
use crate::zone::{ObjectKey, Zone, ZoneRouting};

pub type StepError = Box<dyn std::error::Error + Send + Sync>;

type StepFn = dyn Fn(Content) -> std::result::Result<Content, StepError> + Send + Sync;

/// A named, pure `content -> content` transformation.
#[derive(Clone)]
pub struct PipelineStep {
    name: Option<String>,
    func: Arc<StepFn>,
}

impl PipelineStep {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Content) -> std::result::Result<Content, StepError> + Send + Sync + 'static,
    {
        Self {
            name: Some(name.into()),
            func: Arc::new(func),
        }
    }

    pub fn unnamed<F>(func: F) -> Self
    where
        F: Fn(Content) -> std::result::Result<Content, StepError> + Send + Sync + 'static,
    {
        Self {
            name: None,
            func: Arc::new(func),
        }
    }

    /// Name recorded as the `processor` lineage value.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }

    pub fn apply(&self, content: Content) -> std::result::Result<Content, StepError> {
        (self.func)(content)
    }
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name())
            .finish()
    }
}

/// Cooperative cancellation shared between a caller and a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Inputs processed at once. `1` is fully sequential.
    pub concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Where a failed input stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureStage {
    Resolve,
    Parse,
    /// Parsing produced no content (format recognised but not processable).
    Unprocessable,
    Step { index: usize, name: String },
    Serialize { index: usize },
    Write { index: usize },
    Cancelled,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Resolve => write!(f, "resolve"),
            FailureStage::Parse => write!(f, "parse"),
            FailureStage::Unprocessable => write!(f, "unprocessable"),
            FailureStage::Step { index, name } => write!(f, "step_{} ({name})", index + 1),
            FailureStage::Serialize { index } => write!(f, "serialize step_{}", index + 1),
            FailureStage::Write { index } => write!(f, "write step_{}", index + 1),
            FailureStage::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Finished in a result zone.
    Completed,
    /// Finished, but outside the result zones.
    Excluded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct InputReport {
    pub input: String,
    /// Step outputs written for this input, in step order.
    pub writes: Vec<ObjectKey>,
    /// Last place the input's content lived.
    pub final_key: Option<ObjectKey>,
    /// `final_key` when its zone counts as a result zone.
    pub result: Option<ObjectKey>,
    pub failure: Option<StageFailure>,
}

impl InputReport {
    pub fn outcome(&self) -> InputOutcome {
        if self.failure.is_some() {
            InputOutcome::Failed
        } else if self.result.is_some() {
            InputOutcome::Completed
        } else {
            InputOutcome::Excluded
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub inputs: Vec<InputReport>,
}

impl PipelineReport {
    /// Result keys in input order.
    pub fn results(&self) -> Vec<ObjectKey> {
        self.inputs.iter().filter_map(|r| r.result.clone()).collect()
    }

    pub fn failed(&self) -> usize {
        self.inputs
            .iter()
            .filter(|r| r.failure.is_some())
            .count()
    }
}

/// Transient state of one input as it advances through steps and zones.
#[derive(Debug)]
pub struct PipelineRun {
    pub input_ref: String,
    /// File name of the original input, which fixes output naming and codec.
    pub original_name: String,
    pub current_zone: Zone,
    pub current_path: String,
    pub current_content: Option<Content>,
    pub step_index: usize,
}

impl PipelineRun {
    fn current_key(&self) -> Option<ObjectKey> {
        ObjectKey::in_zone(self.current_zone.clone(), &self.current_path).ok()
    }
}

/// `<stem>_<step_number>_<YYYYmmdd_HHMMSS><.ext>` built from the original
/// file name. The step number keeps names unique within one second.
pub fn output_name(original_name: &str, step_number: usize, at: DateTime<Utc>) -> String {
    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original_name);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("{stem}_{step_number}_{}{ext}", at.format("%Y%m%d_%H%M%S"))
}

pub fn lineage_metadata(input_ref: &str, step_index: usize, step: &PipelineStep) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("original_file".into(), input_ref.to_string());
    metadata.insert("processing_step".into(), format!("step_{}", step_index + 1));
    metadata.insert("processor".into(), step.name().to_string());
    metadata
}

pub struct Pipeline<'a, S> {
    lake: &'a DataLake<S>,
    routing: ZoneRouting,
    result_zones: Vec<Zone>,
    options: PipelineOptions,
    cancel: CancelToken,
}

enum Resolved {
    Ready(PipelineRun),
    Failed(StageFailure, Option<ObjectKey>),
}

impl<'a, S: ObjectStore> Pipeline<'a, S> {
    /// Tiered routing with the default result zones.
    pub fn new(lake: &'a DataLake<S>) -> Self {
        Self {
            lake,
            routing: ZoneRouting::Tiered,
            result_zones: lake.catalog().default_result_zones(),
            options: PipelineOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Routing and result zones taken from `config`, validated against the
    /// lake's catalog.
    pub fn from_config(lake: &'a DataLake<S>, config: &LakeConfig) -> Result<Self> {
        let routing = config.routing(lake.catalog())?;
        let result_zones = config.result_zones(lake.catalog())?;
        Ok(Self::new(lake)
            .with_routing(routing)
            .with_result_zones(result_zones))
    }

    pub fn with_routing(mut self, routing: ZoneRouting) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_result_zones(mut self, zones: Vec<Zone>) -> Self {
        self.result_zones = zones;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every input through `steps` and return the keys that finished in
    /// a result zone. Never fails for per-input errors.
    pub async fn run<T>(&self, inputs: &[T], steps: &[PipelineStep]) -> Vec<ObjectKey>
    where
        T: AsRef<str> + Sync,
    {
        self.run_with_report(inputs, steps).await.results()
    }

    pub async fn run_with_report<T>(&self, inputs: &[T], steps: &[PipelineStep]) -> PipelineReport
    where
        T: AsRef<str> + Sync,
    {
        info!(
            inputs = inputs.len(),
            steps = steps.len(),
            concurrency = self.options.concurrency,
            "[PIPELINE] Starting run"
        );

        let reports: Vec<InputReport> = stream::iter(inputs)
            .map(|input| self.run_one(input.as_ref(), steps))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        let report = PipelineReport { inputs: reports };
        info!(
            results = report.results().len(),
            failed = report.failed(),
            "[PIPELINE] Run finished"
        );
        report
    }

    async fn run_one(&self, input: &str, steps: &[PipelineStep]) -> InputReport {
        let mut report = InputReport {
            input: input.to_string(),
            writes: Vec::new(),
            final_key: None,
            result: None,
            failure: None,
        };

        if self.cancel.is_cancelled() {
            warn!(input, "[PIPELINE] Cancelled before input started");
            report.failure = Some(StageFailure {
                stage: FailureStage::Cancelled,
                message: LakeError::Cancelled.to_string(),
            });
            return report;
        }

        let mut run = match self.resolve(input).await {
            Resolved::Ready(run) => run,
            Resolved::Failed(failure, key) => {
                error!(input, stage = %failure.stage, error = %failure.message, "[PIPELINE][ERROR] Could not resolve input");
                report.final_key = key;
                report.failure = Some(failure);
                return report;
            }
        };

        let codec = self.lake.codecs().resolve_by_extension(&run.original_name);
        report.failure = self.apply_steps(&mut run, steps, &codec, &mut report.writes).await;

        // An early abort still reports the last successful write.
        report.final_key = run.current_key();
        report.result = report
            .final_key
            .clone()
            .filter(|key| self.result_zones.contains(key.zone()));

        match &report.result {
            Some(key) => info!(input, key = %key, "[PIPELINE] Input completed"),
            None => debug!(input, final_zone = %run.current_zone, "[PIPELINE] Input not in a result zone"),
        }
        report
    }

    async fn resolve(&self, input: &str) -> Resolved {
        let catalog = self.lake.catalog();
        let local = Path::new(input);
        let is_local = local.is_file();

        let (zone, path) = if is_local {
            match self
                .lake
                .upload_file(local, catalog.first().as_str(), None, None)
                .await
            {
                Ok(key) => {
                    info!(input, key = %key, "[PIPELINE] Uploaded local input");
                    (key.zone().clone(), key.path().to_string())
                }
                Err(e) => {
                    return Resolved::Failed(
                        StageFailure {
                            stage: FailureStage::Resolve,
                            message: e.to_string(),
                        },
                        None,
                    )
                }
            }
        } else {
            let located = match input.split_once('/') {
                Some((head, rest)) => catalog.resolve(head).map(|zone| (zone, rest)),
                None => Ok((catalog.first().clone(), input)),
            };
            let key = located.and_then(|(zone, path)| {
                if path.ends_with('/') {
                    return Err(LakeError::InvalidKey(input.to_string()));
                }
                ObjectKey::in_zone(zone, path)
            });
            match key {
                Ok(key) => (key.zone().clone(), key.path().to_string()),
                Err(e) => {
                    return Resolved::Failed(
                        StageFailure {
                            stage: FailureStage::Resolve,
                            message: e.to_string(),
                        },
                        None,
                    )
                }
            }
        };

        let key_string = if is_local {
            format!("{zone}/{path}")
        } else {
            input.to_string()
        };
        let current_key = ObjectKey::in_zone(zone.clone(), &path).ok();

        let content = match self.lake.parse_object(&key_string).await {
            Ok(Some(envelope)) => envelope.content,
            Ok(None) => {
                return Resolved::Failed(
                    StageFailure {
                        stage: FailureStage::Unprocessable,
                        message: format!("no content parsed from {key_string}"),
                    },
                    current_key,
                )
            }
            Err(e) => {
                let stage = if matches!(e, LakeError::Parse { .. }) {
                    FailureStage::Parse
                } else {
                    FailureStage::Resolve
                };
                return Resolved::Failed(
                    StageFailure {
                        stage,
                        message: e.to_string(),
                    },
                    current_key,
                );
            }
        };

        let original_name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Resolved::Ready(PipelineRun {
            input_ref: input.to_string(),
            original_name,
            current_zone: zone,
            current_path: path,
            current_content: Some(content),
            step_index: 0,
        })
    }

    /// Returns the failure that ended the input early, if any.
    async fn apply_steps(
        &self,
        run: &mut PipelineRun,
        steps: &[PipelineStep],
        codec: &CodecHandle,
        writes: &mut Vec<ObjectKey>,
    ) -> Option<StageFailure> {
        let catalog = self.lake.catalog();

        for (index, step) in steps.iter().enumerate() {
            run.step_index = index;
            if self.cancel.is_cancelled() {
                warn!(input = %run.input_ref, step = index + 1, "[PIPELINE] Cancelled between steps");
                return Some(StageFailure {
                    stage: FailureStage::Cancelled,
                    message: LakeError::Cancelled.to_string(),
                });
            }

            let target = self.routing.target(catalog, index, steps.len());
            let Some(content) = run.current_content.take() else {
                return Some(StageFailure {
                    stage: FailureStage::Step {
                        index,
                        name: step.name().to_string(),
                    },
                    message: "no content to transform".into(),
                });
            };
            let content = match step.apply(content) {
                Ok(content) => content,
                Err(e) => {
                    error!(input = %run.input_ref, step = step.name(), error = %e, "[PIPELINE][ERROR] Step failed");
                    return Some(StageFailure {
                        stage: FailureStage::Step {
                            index,
                            name: step.name().to_string(),
                        },
                        message: e.to_string(),
                    });
                }
            };

            let bytes = match codec::serialize(&content, codec) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(input = %run.input_ref, step = step.name(), error = %e, "[PIPELINE][ERROR] Could not serialize step output");
                    return Some(StageFailure {
                        stage: FailureStage::Serialize { index },
                        message: e.to_string(),
                    });
                }
            };

            let name = output_name(&run.original_name, index + 1, Utc::now());
            let key = match ObjectKey::in_zone(target.clone(), &name) {
                Ok(key) => key,
                Err(e) => {
                    return Some(StageFailure {
                        stage: FailureStage::Write { index },
                        message: e.to_string(),
                    })
                }
            };
            let metadata = lineage_metadata(&run.input_ref, index, step);
            if let Err(e) = self.lake.write_object(&key, bytes, metadata).await {
                error!(input = %run.input_ref, key = %key, error = %e, "[PIPELINE][ERROR] Could not write step output");
                return Some(StageFailure {
                    stage: FailureStage::Write { index },
                    message: e.to_string(),
                });
            }

            info!(input = %run.input_ref, step = step.name(), key = %key, "[PIPELINE] Step output written");
            run.current_zone = target;
            run.current_path = name;
            run.current_content = Some(content);
            writes.push(key);
        }
        None
    }
}

impl<S: ObjectStore> DataLake<S> {
    /// Run `inputs` through `steps` with tiered routing and default options.
    pub async fn process_data_pipeline<T>(
        &self,
        inputs: &[T],
        steps: &[PipelineStep],
    ) -> Vec<ObjectKey>
    where
        T: AsRef<str> + Sync,
    {
        Pipeline::new(self).run(inputs, steps).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn output_name_keeps_stem_and_extension() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(output_name("notes.csv", 2, at), "notes_2_20240309_140507.csv");
        assert_eq!(output_name("README", 1, at), "README_1_20240309_140507");
    }

    #[test]
    fn lineage_uses_unknown_for_unnamed_steps() {
        let step = PipelineStep::unnamed(Ok);
        let metadata = lineage_metadata("raw/a.txt", 0, &step);
        assert_eq!(metadata["processing_step"], "step_1");
        assert_eq!(metadata["processor"], "unknown");
        assert_eq!(metadata["original_file"], "raw/a.txt");
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }
}
