#![doc = "zonelake-core: zone-based data lake pipeline engine."]

//! This crate holds the zone model, the format-aware codec registry, the
//! pipeline orchestrator and metadata search. The backing object store is
//! reached only through the [`contract::ObjectStore`] trait; an in-process
//! implementation lives in [`memory`].
//!
//! # Usage
//! Build a [`lake::DataLake`] from a store and a [`config::LakeConfig`], then
//! drive inputs through steps with [`pipeline::Pipeline`].

pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod lake;
pub mod lifecycle;
pub mod memory;
pub mod pipeline;
pub mod search;
pub mod zone;

pub use error::{LakeError, Result};
pub use lake::DataLake;
pub use pipeline::{Pipeline, PipelineStep};
pub use zone::{ObjectKey, Zone, ZoneCatalog};
