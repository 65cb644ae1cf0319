//! Error taxonomy shared by every zonelake component.
//!
//! `InvalidZone` is a caller error and is always raised before any store I/O.
//! Everything else is caught by the pipeline at the per-input or per-step
//! boundary, logged, and turned into a skipped item.

use std::time::Duration;
use thiserror::Error;

/// Failure signal surfaced by an [`ObjectStore`](crate::contract::ObjectStore) implementation.
///
/// The core only distinguishes "not found" from everything else.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store failure: {0}")]
    Other(String),
}

impl StoreError {
    pub fn other(msg: impl std::fmt::Display) -> Self {
        StoreError::Other(msg.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum LakeError {
    #[error("invalid zone '{zone}', must be one of {allowed:?}")]
    InvalidZone { zone: String, allowed: Vec<String> },

    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("failed to parse {format} content: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("cannot serialize {shape} content as {format}")]
    UnsupportedShape {
        format: &'static str,
        shape: &'static str,
    },

    #[error("{format} content ({extension}) is recognised but not supported")]
    CapabilityGap {
        format: &'static str,
        extension: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store call '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline cancelled")]
    Cancelled,
}

impl LakeError {
    pub(crate) fn parse(format: &'static str, err: impl std::fmt::Display) -> Self {
        LakeError::Parse {
            format,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LakeError>;
