use std::borrow::Cow;
use tracing::warn;

use super::{uniform_columns, Codec, Content, Record};
use crate::error::{LakeError, Result};

const FORMAT: &str = "tabular";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Delimited text with a header row.
#[derive(Debug, Clone)]
pub struct TabularCodec {
    delimiter: u8,
    content_type: &'static str,
}

impl TabularCodec {
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            content_type: "text/csv",
        }
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            content_type: "text/tab-separated-values",
        }
    }

    fn read_records(&self, text: &str) -> Result<Vec<Record>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| LakeError::parse(FORMAT, e))?
            .clone();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| LakeError::parse(FORMAT, e))?;
            records.push(
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect(),
            );
        }
        Ok(records)
    }
}

/// UTF-8 first; on malformed UTF-8 retry once as Windows-1252.
fn decode(bytes: &[u8]) -> Result<Cow<'_, str>> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(body) {
        Ok(text) => Ok(Cow::Borrowed(text)),
        Err(e) => {
            warn!(error = %e, "Tabular content is not valid UTF-8, retrying as windows-1252");
            let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(body);
            if had_errors {
                return Err(LakeError::parse(FORMAT, "undecodable character data"));
            }
            Ok(text)
        }
    }
}

impl Codec for TabularCodec {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn content_type(&self) -> &str {
        self.content_type
    }

    fn parse(&self, bytes: &[u8]) -> Result<Content> {
        let text = decode(bytes)?;
        Ok(Content::Records(self.read_records(&text)?))
    }

    fn serialize(&self, content: &Content) -> Result<Vec<u8>> {
        let records = content.to_records().ok_or(LakeError::UnsupportedShape {
            format: FORMAT,
            shape: content.shape(),
        })?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let columns = uniform_columns(FORMAT, &records)?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer
            .write_record(&columns)
            .map_err(|e| LakeError::parse(FORMAT, e))?;
        for record in &records {
            writer
                .write_record(columns.iter().map(|c| record[c.as_str()].as_str()))
                .map_err(|e| LakeError::parse(FORMAT, e))?;
        }
        writer
            .into_inner()
            .map_err(|e| LakeError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_content_is_decoded_on_retry() {
        let bytes = b"name,city\nJos\xe9,M\xe1laga\n";
        let content = TabularCodec::csv().parse(bytes).unwrap();
        let Content::Records(records) = content else {
            panic!("expected records");
        };
        assert_eq!(records[0]["name"], "José");
        assert_eq!(records[0]["city"], "Málaga");
    }

    #[test]
    fn bom_is_stripped_from_first_header() {
        let bytes = b"\xEF\xBB\xBFid,name\n1,a\n";
        let Content::Records(records) = TabularCodec::csv().parse(bytes).unwrap() else {
            panic!("expected records");
        };
        assert!(records[0].contains_key("id"));
    }

    #[test]
    fn ragged_rows_are_a_parse_error() {
        let err = TabularCodec::csv().parse(b"a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(err, LakeError::Parse { .. }));
    }
}
