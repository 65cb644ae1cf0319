//! Format-aware codec registry.
//!
//! Content is parsed into a [`Content`] value whose shape depends on the
//! format, handed to pipeline steps, and serialized back with the codec of
//! the original file extension.
//!
//! | extensions        | codec                  | parsed shape         |
//! |-------------------|------------------------|----------------------|
//! | `.csv` `.tsv`     | [`TabularCodec`]       | `Records`            |
//! | `.json`           | [`JsonCodec`]          | `Document`           |
//! | `.yaml` `.yml`    | [`YamlCodec`]          | `Document`           |
//! | `.xlsx`           | [`SpreadsheetCodec`]   | `Sheets`             |
//! | `.txt`            | [`TextCodec`]          | `Text`               |
//! | documents, media  | [`UnsupportedCodec`]   | none (capability gap)|
//! | anything else     | [`PassthroughCodec`]   | `Bytes`              |

mod document;
mod spreadsheet;
mod tabular;
mod text;

pub use document::{JsonCodec, YamlCodec};
pub use spreadsheet::SpreadsheetCodec;
pub use tabular::TabularCodec;
pub use text::{PassthroughCodec, TextCodec, UnsupportedCodec};

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{LakeError, Result};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// One row of tabular content: column name to cell text, in column order.
pub type Record = IndexMap<String, String>;

/// Parsed, in-memory content. Never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Rows of a delimited file.
    Records(Vec<Record>),
    /// Sheet name to rows, in workbook order.
    Sheets(IndexMap<String, Vec<Record>>),
    /// JSON/YAML tree.
    Document(Value),
    Text(String),
    /// Opaque bytes of an unregistered format.
    Bytes(Vec<u8>),
}

impl Content {
    pub fn shape(&self) -> &'static str {
        match self {
            Content::Records(_) => "records",
            Content::Sheets(_) => "sheets",
            Content::Document(_) => "document",
            Content::Text(_) => "text",
            Content::Bytes(_) => "bytes",
        }
    }

    /// View the content as a flat list of records, if it has that shape.
    ///
    /// A single-sheet workbook and a JSON array of flat objects both count.
    pub fn to_records(&self) -> Option<Vec<Record>> {
        match self {
            Content::Records(records) => Some(records.clone()),
            Content::Sheets(sheets) if sheets.len() == 1 => sheets.values().next().cloned(),
            Content::Document(value) => records_from_value(value),
            _ => None,
        }
    }

    /// View the content as a workbook, if it has a tabular shape.
    pub fn to_sheets(&self) -> Option<IndexMap<String, Vec<Record>>> {
        match self {
            Content::Sheets(sheets) => Some(sheets.clone()),
            Content::Document(Value::Object(map)) => map
                .iter()
                .map(|(name, rows)| Some((name.clone(), records_from_value(rows)?)))
                .collect(),
            other => {
                let records = other.to_records()?;
                let mut sheets = IndexMap::new();
                sheets.insert(spreadsheet::DEFAULT_SHEET.to_string(), records);
                Some(sheets)
            }
        }
    }

    /// JSON rendering of tabular shapes; documents are returned as-is.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Content::Document(value) => Some(value.clone()),
            Content::Records(records) => Some(records_to_value(records)),
            Content::Sheets(sheets) => Some(Value::Object(
                sheets
                    .iter()
                    .map(|(name, rows)| (name.clone(), records_to_value(rows)))
                    .collect(),
            )),
            Content::Text(text) => Some(Value::String(text.clone())),
            Content::Bytes(_) => None,
        }
    }
}

fn records_to_value(records: &[Record]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|r| {
                Value::Object(
                    r.iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect(),
                )
            })
            .collect(),
    )
}

fn records_from_value(value: &Value) -> Option<Vec<Record>> {
    let rows = value.as_array()?;
    rows.iter()
        .map(|row| {
            row.as_object()?
                .iter()
                .map(|(k, v)| Some((k.clone(), scalar_to_cell(v)?)))
                .collect::<Option<Record>>()
        })
        .collect()
}

fn scalar_to_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Check that every record carries the same column set as the first one and
/// return that column order. An empty table has no columns.
pub(crate) fn uniform_columns(format: &'static str, records: &[Record]) -> Result<Vec<String>> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = first.keys().cloned().collect();
    let uniform = records
        .iter()
        .all(|r| r.len() == columns.len() && columns.iter().all(|c| r.contains_key(c)));
    if !uniform {
        return Err(LakeError::UnsupportedShape {
            format,
            shape: "non-uniform records",
        });
    }
    Ok(columns)
}

/// Result of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentEnvelope {
    pub content: Content,
    pub content_type: String,
}

/// A parse/serialize pair bound to a content type.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Short format family name used in logs and errors.
    fn format(&self) -> &'static str;

    fn content_type(&self) -> &str;

    fn parse(&self, bytes: &[u8]) -> Result<Content>;

    fn serialize(&self, content: &Content) -> Result<Vec<u8>>;
}

pub type CodecHandle = Arc<dyn Codec>;

/// Extension to codec lookup, populated once at startup.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, CodecHandle>,
    passthrough: CodecHandle,
}

impl CodecRegistry {
    /// A registry with no formats: everything resolves to pass-through.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
            passthrough: Arc::new(PassthroughCodec),
        }
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(".csv", Arc::new(TabularCodec::csv()));
        registry.register(".tsv", Arc::new(TabularCodec::tsv()));
        registry.register(".json", Arc::new(JsonCodec));
        let yaml: CodecHandle = Arc::new(YamlCodec);
        registry.register(".yaml", yaml.clone());
        registry.register(".yml", yaml);
        registry.register(".xlsx", Arc::new(SpreadsheetCodec));
        registry.register(".txt", Arc::new(TextCodec));
        for ext in UNSUPPORTED_EXTENSIONS {
            let content_type = content_type_for(&format!("file{ext}"));
            registry.register(ext, Arc::new(UnsupportedCodec::new(ext, content_type)));
        }
        registry
    }

    /// Register `codec` for `extension` (with or without the leading dot,
    /// any case). Replaces an earlier registration.
    pub fn register(&mut self, extension: &str, codec: CodecHandle) {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.codecs.insert(format!(".{ext}"), codec);
    }

    /// Case-insensitive lookup by the extension of `path`. Unregistered
    /// extensions get the pass-through codec.
    pub fn resolve_by_extension(&self, path: &str) -> CodecHandle {
        let ext = extension_of(path);
        match self.codecs.get(&ext) {
            Some(codec) => codec.clone(),
            None => {
                debug!(path, extension = %ext, "No codec registered, using pass-through");
                self.passthrough.clone()
            }
        }
    }

    pub fn is_registered(&self, path: &str) -> bool {
        self.codecs.contains_key(&extension_of(path))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Parse `bytes` with `codec`.
///
/// A capability gap is not an error: it is logged and reported as `None`,
/// which callers treat as "not processable".
pub fn parse(bytes: &[u8], codec: &CodecHandle) -> Result<Option<ContentEnvelope>> {
    match codec.parse(bytes) {
        Ok(content) => Ok(Some(ContentEnvelope {
            content,
            content_type: codec.content_type().to_string(),
        })),
        Err(LakeError::CapabilityGap { format, extension }) => {
            warn!(format, extension = %extension, "Parsing not implemented for this format, skipping content");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub fn serialize(content: &Content, codec: &CodecHandle) -> Result<Vec<u8>> {
    codec.serialize(content)
}

/// Lowercased extension of `path` including the leading dot, or `""`.
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Recognised formats with no parser.
pub const UNSUPPORTED_EXTENSIONS: [&str; 18] = [
    ".pdf", ".docx", ".doc", ".pptx", ".ppt", ".xls", ".jpg", ".jpeg", ".png", ".gif", ".mp3",
    ".mp4", ".wav", ".html", ".htm", ".xml", ".zip", ".gz",
];

/// MIME-like tag for `path`, used only to annotate metadata.
pub fn content_type_for(path: &str) -> &'static str {
    match extension_of(path).as_str() {
        ".csv" => "text/csv",
        ".tsv" => "text/tab-separated-values",
        ".json" => "application/json",
        ".yaml" | ".yml" => "application/yaml",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xls" => "application/vnd.ms-excel",
        ".txt" => "text/plain",
        ".pdf" => "application/pdf",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".doc" => "application/msword",
        ".pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".ppt" => "application/vnd.ms-powerpoint",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".mp3" => "audio/mpeg",
        ".mp4" => "video/mp4",
        ".wav" => "audio/wav",
        ".html" | ".htm" => "text/html",
        ".xml" => "application/xml",
        ".zip" => "application/zip",
        ".gz" => "application/gzip",
        _ => OCTET_STREAM,
    }
}
