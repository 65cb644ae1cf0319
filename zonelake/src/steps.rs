//! Built-in named pipeline steps exposed on the command line.

use serde_json::Value;
use std::collections::HashSet;
use zonelake_core::codec::{Content, Record};
use zonelake_core::pipeline::{PipelineStep, StepError};

pub const BUILTIN_STEPS: [&str; 5] = ["identity", "dedupe", "trim", "lowercase-keys", "uppercase"];

/// Look up a built-in step by name.
pub fn builtin(name: &str) -> Option<PipelineStep> {
    let step = match name {
        "identity" => PipelineStep::new(name, Ok),
        "dedupe" => PipelineStep::new(name, dedupe),
        "trim" => PipelineStep::new(name, |c| map_strings(c, |s| s.trim().to_string())),
        "lowercase-keys" => PipelineStep::new(name, lowercase_keys),
        "uppercase" => PipelineStep::new(name, |c| map_strings(c, |s| s.to_uppercase())),
        _ => return None,
    };
    Some(step)
}

pub fn resolve_steps(names: &[String]) -> anyhow::Result<Vec<PipelineStep>> {
    names
        .iter()
        .map(|name| {
            builtin(name).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown step '{name}'. Available steps: {}",
                    BUILTIN_STEPS.join(", ")
                )
            })
        })
        .collect()
}

fn binary_err(step: &str) -> StepError {
    format!("{step} does not apply to binary content").into()
}

fn dedupe_records(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            let fingerprint: Vec<(String, String)> =
                r.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            seen.insert(fingerprint)
        })
        .collect()
}

fn dedupe(content: Content) -> Result<Content, StepError> {
    Ok(match content {
        Content::Records(records) => Content::Records(dedupe_records(records)),
        Content::Sheets(sheets) => Content::Sheets(
            sheets
                .into_iter()
                .map(|(name, records)| (name, dedupe_records(records)))
                .collect(),
        ),
        Content::Text(text) => {
            let mut seen = HashSet::new();
            let lines: Vec<&str> = text.lines().filter(|l| seen.insert(*l)).collect();
            Content::Text(lines.join("\n"))
        }
        Content::Document(Value::Array(items)) => {
            let mut seen = HashSet::new();
            Content::Document(Value::Array(
                items
                    .into_iter()
                    .filter(|v| seen.insert(v.to_string()))
                    .collect(),
            ))
        }
        Content::Document(other) => Content::Document(other),
        Content::Bytes(_) => return Err(binary_err("dedupe")),
    })
}

fn map_value(value: Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_value(v, f)).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, map_value(v, f))).collect()),
        other => other,
    }
}

fn map_record(record: Record, f: &dyn Fn(&str) -> String) -> Record {
    record.into_iter().map(|(k, v)| (k, f(&v))).collect()
}

/// Apply `f` to every string value, leaving keys and structure alone.
fn map_strings<F>(content: Content, f: F) -> Result<Content, StepError>
where
    F: Fn(&str) -> String,
{
    Ok(match content {
        Content::Records(records) => {
            Content::Records(records.into_iter().map(|r| map_record(r, &f)).collect())
        }
        Content::Sheets(sheets) => Content::Sheets(
            sheets
                .into_iter()
                .map(|(name, records)| (name, records.into_iter().map(|r| map_record(r, &f)).collect()))
                .collect(),
        ),
        Content::Text(text) => {
            let lines: Vec<String> = text.lines().map(|l| f(l)).collect();
            Content::Text(lines.join("\n"))
        }
        Content::Document(value) => Content::Document(map_value(value, &f)),
        Content::Bytes(_) => return Err(binary_err("string transform")),
    })
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), lower_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(lower_keys).collect()),
        other => other,
    }
}

fn lowercase_record(record: Record) -> Record {
    record
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect()
}

fn lowercase_keys(content: Content) -> Result<Content, StepError> {
    Ok(match content {
        Content::Records(records) => {
            Content::Records(records.into_iter().map(lowercase_record).collect())
        }
        Content::Sheets(sheets) => Content::Sheets(
            sheets
                .into_iter()
                .map(|(name, records)| (name, records.into_iter().map(lowercase_record).collect()))
                .collect(),
        ),
        Content::Document(value) => Content::Document(lower_keys(value)),
        Content::Text(text) => Content::Text(text),
        Content::Bytes(_) => return Err(binary_err("lowercase-keys")),
    })
}
