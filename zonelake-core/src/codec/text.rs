use serde_json::Value;

use super::{Codec, Content, OCTET_STREAM};
use crate::error::{LakeError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn format(&self) -> &'static str {
        "text"
    }

    fn content_type(&self) -> &str {
        "text/plain"
    }

    fn parse(&self, bytes: &[u8]) -> Result<Content> {
        String::from_utf8(bytes.to_vec())
            .map(Content::Text)
            .map_err(|e| LakeError::parse("text", e))
    }

    fn serialize(&self, content: &Content) -> Result<Vec<u8>> {
        match content {
            Content::Text(text) | Content::Document(Value::String(text)) => {
                Ok(text.as_bytes().to_vec())
            }
            other => Err(LakeError::UnsupportedShape {
                format: "text",
                shape: other.shape(),
            }),
        }
    }
}

/// Opaque bytes for extensions with no registered codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl Codec for PassthroughCodec {
    fn format(&self) -> &'static str {
        "binary"
    }

    fn content_type(&self) -> &str {
        OCTET_STREAM
    }

    fn parse(&self, bytes: &[u8]) -> Result<Content> {
        Ok(Content::Bytes(bytes.to_vec()))
    }

    fn serialize(&self, content: &Content) -> Result<Vec<u8>> {
        match content {
            Content::Bytes(bytes) => Ok(bytes.clone()),
            Content::Text(text) => Ok(text.as_bytes().to_vec()),
            other => Err(LakeError::UnsupportedShape {
                format: "binary",
                shape: other.shape(),
            }),
        }
    }
}

/// A format that is recognised (it has a content type) but has no parser.
#[derive(Debug, Clone)]
pub struct UnsupportedCodec {
    extension: &'static str,
    content_type: &'static str,
}

impl UnsupportedCodec {
    pub fn new(extension: &'static str, content_type: &'static str) -> Self {
        Self {
            extension,
            content_type,
        }
    }

    fn gap(&self) -> LakeError {
        LakeError::CapabilityGap {
            format: "document",
            extension: self.extension.to_string(),
        }
    }
}

impl Codec for UnsupportedCodec {
    fn format(&self) -> &'static str {
        "document"
    }

    fn content_type(&self) -> &str {
        self.content_type
    }

    fn parse(&self, _bytes: &[u8]) -> Result<Content> {
        Err(self.gap())
    }

    fn serialize(&self, _content: &Content) -> Result<Vec<u8>> {
        Err(self.gap())
    }
}
