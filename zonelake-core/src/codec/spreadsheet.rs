use calamine::{open_workbook_from_rs, Reader, Xlsx};
use indexmap::IndexMap;
use rust_xlsxwriter::Workbook;
use std::io::Cursor;

use super::{uniform_columns, Codec, Content, Record};
use crate::error::{LakeError, Result};

const FORMAT: &str = "spreadsheet";

/// Sheet name used when a flat record list is written as a workbook.
pub(crate) const DEFAULT_SHEET: &str = "Sheet1";

/// Multi-sheet workbooks. Each sheet is one header row followed by records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetCodec;

fn write_err(e: rust_xlsxwriter::XlsxError) -> LakeError {
    LakeError::parse(FORMAT, e)
}

impl Codec for SpreadsheetCodec {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn content_type(&self) -> &str {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    }

    fn parse(&self, bytes: &[u8]) -> Result<Content> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| LakeError::parse(FORMAT, e))?;

        let mut sheets = IndexMap::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| LakeError::parse(FORMAT, e))?;
            let mut rows = range.rows();
            let headers: Vec<String> = match rows.next() {
                Some(header) => header.iter().map(|cell| cell.to_string()).collect(),
                None => {
                    sheets.insert(name, Vec::new());
                    continue;
                }
            };
            let records: Vec<Record> = rows
                .map(|row| {
                    headers
                        .iter()
                        .zip(row.iter())
                        .map(|(h, cell)| (h.clone(), cell.to_string()))
                        .collect()
                })
                .collect();
            sheets.insert(name, records);
        }
        Ok(Content::Sheets(sheets))
    }

    fn serialize(&self, content: &Content) -> Result<Vec<u8>> {
        let sheets = content.to_sheets().ok_or(LakeError::UnsupportedShape {
            format: FORMAT,
            shape: content.shape(),
        })?;

        let mut workbook = Workbook::new();
        for (name, records) in &sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name).map_err(write_err)?;
            if records.is_empty() {
                continue;
            }
            let columns = uniform_columns(FORMAT, records)?;
            for (col, header) in columns.iter().enumerate() {
                worksheet
                    .write_string(0, col as u16, header)
                    .map_err(write_err)?;
            }
            for (row, record) in records.iter().enumerate() {
                for (col, header) in columns.iter().enumerate() {
                    worksheet
                        .write_string(row as u32 + 1, col as u16, &record[header.as_str()])
                        .map_err(write_err)?;
                }
            }
        }
        workbook.save_to_buffer().map_err(write_err)
    }
}
