//! Post-processing: deterministic cleanup of model-extracted records.
//!
//! Even when the JSON is valid, models leave residue that breaks downstream
//! spreadsheet formulas and lookups:
//!
//! - `" REF123 "` with padding, or `"DIA\nCOLOR 7.1"` with an embedded newline
//! - zero-width spaces and BOMs copied from the page's text layer
//! - a trailing `{}` or a row of empty strings for a blank table line
//!
//! These passes fix that without touching content. Numbers, booleans and
//! nested values are left as they are.

use crate::output::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Apply every cleanup rule to a page's records.
///
/// 1. Trim field names and string values
/// 2. Collapse internal whitespace runs (including newlines) to one space
/// 3. Strip invisible Unicode (zero-width, BOM, soft hyphen, word joiner)
/// 4. Drop records whose every value is null or an empty string
pub fn clean_records(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .map(clean_record)
        .filter(|r| !is_blank(r))
        .collect()
}

/// Keys that collide after cleanup keep the first non-empty value, in the
/// position of the first occurrence.
fn clean_record(record: Record) -> Record {
    let mut out = Record::new();
    for (k, v) in record.into_inner() {
        let v = match v {
            Value::String(s) => Value::String(clean_text(&s)),
            other => other,
        };
        let k = clean_text(&k);
        let keep_existing = out
            .get(&k)
            .is_some_and(|existing| !is_empty_value(existing) || is_empty_value(&v));
        if !keep_existing {
            out.insert(k, v);
        }
    }
    out
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn clean_text(s: &str) -> String {
    let s = RE_INVISIBLE.replace_all(s, "");
    RE_WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn is_blank(record: &Record) -> bool {
    record.iter().all(|(_, v)| is_empty_value(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        match v {
            Value::Object(m) => Record::from(m),
            _ => unreachable!(),
        }
    }

    #[test]
    fn trims_and_collapses_whitespace() {
        let out = clean_records(vec![rec(json!({" Nom produit ": "  DIA\nCOLOR   7.1 "}))]);
        assert_eq!(out[0].get("Nom produit"), Some(&json!("DIA COLOR 7.1")));
    }

    #[test]
    fn keys_colliding_after_trim_keep_first_non_empty_value() {
        let out = clean_records(vec![
            rec(json!({"Nom produit": "MAJIREL 5.1", " Nom produit ": "autre", "qty": 3})),
            rec(json!({"Nom produit": "", " Nom produit ": "DIA COLOR 7.1"})),
        ]);
        assert_eq!(out[0].get("Nom produit"), Some(&json!("MAJIREL 5.1")));
        assert_eq!(out[0].len(), 2);
        assert_eq!(out[1].get("Nom produit"), Some(&json!("DIA COLOR 7.1")));
        let names: Vec<&str> = out[0].field_names().collect();
        assert_eq!(names, vec!["Nom produit", "qty"]);
    }

    #[test]
    fn strips_invisible_characters() {
        let out = clean_records(vec![rec(json!({"ref": "\u{FEFF}REF\u{200B}123"}))]);
        assert_eq!(out[0].get("ref"), Some(&json!("REF123")));
    }

    #[test]
    fn keeps_numbers_and_nested_values() {
        let out = clean_records(vec![rec(json!({"qty": 12, "lots": [" a "]}))]);
        assert_eq!(out[0].get("qty"), Some(&json!(12)));
        assert_eq!(out[0].get("lots"), Some(&json!([" a "])));
    }

    #[test]
    fn drops_blank_rows_only() {
        let out = clean_records(vec![
            rec(json!({})),
            rec(json!({"a": "", "b": null, "c": "  "})),
            rec(json!({"a": "", "b": 0})),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("b"), Some(&json!(0)));
    }

    #[test]
    fn preserves_field_order() {
        let out = clean_records(vec![rec(json!({"z": "1", "a": "2"}))]);
        let names: Vec<&str> = out[0].field_names().collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
