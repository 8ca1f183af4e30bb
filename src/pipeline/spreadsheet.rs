//! Spreadsheet bypass: read workbook rows straight into [`Record`]s.
//!
//! Every sheet is read in workbook order. In each sheet the first non-empty
//! row is the header and every later non-empty row becomes one record keyed
//! by those header names. No model is involved.

use crate::error::ExtractError;
use crate::output::Record;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::{Number, Value};
use std::io::Cursor;
use tracing::debug;

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Concatenated rows of every sheet in the workbook.
pub fn read_records(bytes: &[u8]) -> Result<Vec<Record>, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        ExtractError::SpreadsheetReadFailed {
            detail: e.to_string(),
        }
    })?;

    let mut records = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::SpreadsheetReadFailed {
                detail: format!("sheet '{}': {}", name, e),
            })?;

        let mut rows = range.rows().filter(|row| !row.iter().all(is_empty_cell));
        let Some(header) = rows.next() else {
            debug!("Sheet '{}' is empty", name);
            continue;
        };
        let header = header_names(header);

        let before = records.len();
        for row in rows {
            records.push(
                header
                    .iter()
                    .zip(row.iter().map(cell_value).chain(std::iter::repeat(Value::Null)))
                    .map(|(h, v)| (h.clone(), v))
                    .collect::<Record>(),
            );
        }
        debug!("Sheet '{}': {} rows", name, records.len() - before);
    }

    Ok(records)
}

fn is_empty_cell(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Header cells as field names. Blank headers get a positional name and
/// repeated names a numeric suffix, so no column is lost.
fn header_names(row: &[Data]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(row.len());
    for (i, cell) in row.iter().enumerate() {
        let base = match cell.to_string().trim() {
            "" => format!("Column {}", i + 1),
            s => s.to_string(),
        };
        let mut name = base.clone();
        let mut n = 2;
        while names.contains(&name) {
            name = format!("{} ({})", base, n);
            n += 1;
        }
        names.push(name);
    }
    names
}

/// Workbooks store every number as a float; whole values come back as integers.
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_INT => Value::from(*f as i64),
        Data::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use serde_json::json;

    fn two_sheet_workbook() -> Vec<u8> {
        let mut wb = Workbook::new();

        let a = wb.add_worksheet();
        a.set_name("Bons").unwrap();
        a.write_string(0, 0, "Référence produit").unwrap();
        a.write_string(0, 1, "Quantité corrigée").unwrap();
        for r in 1..=3u32 {
            a.write_string(r, 0, format!("REF{r}")).unwrap();
            a.write_number(r, 1, f64::from(r * 10)).unwrap();
        }

        let b = wb.add_worksheet();
        b.set_name("Inventaire").unwrap();
        b.write_string(0, 0, "Couleur").unwrap();
        b.write_string(0, 1, "Total").unwrap();
        for r in 1..=5u32 {
            b.write_string(r, 0, format!("C{r}")).unwrap();
            b.write_number(r, 1, f64::from(r) + 0.5).unwrap();
        }

        wb.save_to_buffer().unwrap()
    }

    #[test]
    fn concatenates_all_sheets() {
        let recs = read_records(&two_sheet_workbook()).unwrap();
        assert_eq!(recs.len(), 8);
        assert_eq!(recs[0].get("Référence produit"), Some(&json!("REF1")));
        assert_eq!(recs[2].get("Quantité corrigée"), Some(&json!(30)));
        assert_eq!(recs[3].get("Couleur"), Some(&json!("C1")));
        assert_eq!(recs[7].get("Total"), Some(&json!(5.5)));
        assert_eq!(recs[3].get("Quantité corrigée"), None);
    }

    #[test]
    fn blank_rows_are_skipped_and_short_rows_padded() {
        let mut wb = Workbook::new();
        let s = wb.add_worksheet();
        s.write_string(2, 1, "a").unwrap();
        s.write_string(2, 2, "b").unwrap();
        s.write_string(4, 1, "x").unwrap();
        let bytes = wb.save_to_buffer().unwrap();

        let recs = read_records(&bytes).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].get("a"), Some(&json!("x")));
        assert_eq!(recs[0].get("b"), Some(&Value::Null));
    }

    #[test]
    fn duplicate_and_blank_headers_keep_every_column() {
        let names = header_names(&[
            Data::String("Qty".into()),
            Data::Empty,
            Data::String("Qty".into()),
        ]);
        assert_eq!(names, vec!["Qty", "Column 2", "Qty (2)"]);
    }

    #[test]
    fn garbage_bytes_fail_to_read() {
        let err = read_records(b"PK\x03\x04 not really a workbook").unwrap_err();
        assert!(matches!(err, ExtractError::SpreadsheetReadFailed { .. }));
    }
}
