use serde_json::Value;

use super::{Codec, Content};
use crate::error::{LakeError, Result};

/// Structured documents. Objects keep their key order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &str {
        "application/json"
    }

    fn parse(&self, bytes: &[u8]) -> Result<Content> {
        serde_json::from_slice::<Value>(bytes)
            .map(Content::Document)
            .map_err(|e| LakeError::parse("json", e))
    }

    fn serialize(&self, content: &Content) -> Result<Vec<u8>> {
        let value = content.to_value().ok_or(LakeError::UnsupportedShape {
            format: "json",
            shape: content.shape(),
        })?;
        serde_json::to_vec_pretty(&value).map_err(|e| LakeError::parse("json", e))
    }
}

/// Key-value documents, decoded into the same tree as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn format(&self) -> &'static str {
        "yaml"
    }

    fn content_type(&self) -> &str {
        "application/yaml"
    }

    fn parse(&self, bytes: &[u8]) -> Result<Content> {
        serde_yaml::from_slice::<Value>(bytes)
            .map(Content::Document)
            .map_err(|e| LakeError::parse("yaml", e))
    }

    fn serialize(&self, content: &Content) -> Result<Vec<u8>> {
        let value = content.to_value().ok_or(LakeError::UnsupportedShape {
            format: "yaml",
            shape: content.shape(),
        })?;
        serde_yaml::to_string(&value)
            .map(String::into_bytes)
            .map_err(|e| LakeError::parse("yaml", e))
    }
}
