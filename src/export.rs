//! Tabular export: a [`DocumentResult`] as one-sheet `.xlsx` bytes.
//!
//! The sheet has a bold header row holding [`DocumentResult::columns`] and
//! one row per record below it. Cell types follow the JSON value:
//!
//! | Value          | Cell                         |
//! |----------------|------------------------------|
//! | string         | text                         |
//! | number         | number                       |
//! | bool           | boolean                      |
//! | null           | left empty                   |
//! | array / object | compact JSON text            |

use crate::error::ExtractError;
use crate::output::DocumentResult;
use crate::profile::ExtractionProfile;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::Value;
use tracing::debug;

/// MIME type of the exported workbook.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Longest text Excel accepts in one cell.
const MAX_CELL_CHARS: usize = 32_767;

/// Excel's column limit.
const MAX_COLUMNS: usize = 16_384;

/// Serialise the result into workbook bytes, one sheet named after the profile.
///
/// An empty result still produces a valid workbook with only the header row;
/// whether to offer it for download is the caller's decision.
pub fn to_xlsx(result: &DocumentResult, profile: &ExtractionProfile) -> Result<Vec<u8>, ExtractError> {
    if result.columns.len() > MAX_COLUMNS {
        return Err(ExtractError::ExportFailed(format!(
            "{} columns exceed the sheet limit of {}",
            result.columns.len(),
            MAX_COLUMNS
        )));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name(&profile.sheet_name)).map_err(export_err)?;
    write_table(sheet, result).map_err(export_err)?;

    let bytes = workbook.save_to_buffer().map_err(export_err)?;
    debug!(
        "Exported {} rows × {} columns ({} bytes)",
        result.records.len(),
        result.columns.len(),
        bytes.len()
    );
    Ok(bytes)
}

fn write_table(sheet: &mut Worksheet, result: &DocumentResult) -> Result<(), XlsxError> {
    let bold = Format::new().set_bold();

    for (c, name) in result.columns.iter().enumerate() {
        let col = c as u16;
        sheet.write_string_with_format(0, col, clip(name), &bold)?;
        sheet.set_column_width(col, column_width(result, c))?;
    }
    if !result.columns.is_empty() {
        sheet.set_freeze_panes(1, 0)?;
    }

    for (r, record) in result.records.iter().enumerate() {
        let row = r as u32 + 1;
        for (c, name) in result.columns.iter().enumerate() {
            let col = c as u16;
            match record.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => {
                    sheet.write_string(row, col, clip(s))?;
                }
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(f) => {
                        sheet.write_number(row, col, f)?;
                    }
                    None => {
                        sheet.write_string(row, col, n.to_string())?;
                    }
                },
                Some(Value::Bool(b)) => {
                    sheet.write_boolean(row, col, *b)?;
                }
                Some(nested) => {
                    sheet.write_string(row, col, clip(&nested.to_string()))?;
                }
            }
        }
    }
    Ok(())
}

/// Widest of header and values, in characters, within sane bounds.
fn column_width(result: &DocumentResult, c: usize) -> f64 {
    let name = &result.columns[c];
    let widest = result
        .records
        .iter()
        .filter_map(|r| r.get(name))
        .map(|v| match v {
            Value::String(s) => s.chars().count(),
            Value::Null => 0,
            other => other.to_string().chars().count(),
        })
        .chain(std::iter::once(name.chars().count()))
        .max()
        .unwrap_or(0);
    (widest as f64 + 2.0).clamp(8.0, 60.0)
}

fn clip(s: &str) -> &str {
    match s.char_indices().nth(MAX_CELL_CHARS) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Excel sheet names: at most 31 characters, none of `[]:*?/\`.
fn sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim().to_string();
    if cleaned.is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

fn export_err(e: XlsxError) -> ExtractError {
    ExtractError::ExportFailed(e.to_string())
}
