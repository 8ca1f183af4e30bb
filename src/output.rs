//! Result types: records, per-page outcomes and the document result.
//!
//! A [`Record`] is one table row. Field order is preserved as the model (or
//! the spreadsheet header) produced it, which is why the crate enables
//! `serde_json`'s `preserve_order` feature.
//!
//! A [`DocumentResult`] is the terminal artifact handed to the exporter. Its
//! records are already normalised to one consistent field set, listed in
//! [`DocumentResult::columns`].

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structured output row: field name → scalar value.
///
/// Nested values (objects, arrays) are carried as-is under their field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Value of `field`, if present.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Insert or replace a field, keeping its original position on replace.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(field, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rebuild the record with exactly `columns`, in that order. Fields the
    /// record lacks become `null`.
    pub fn conform_to(&self, columns: &[String]) -> Record {
        let mut out = Map::with_capacity(columns.len());
        for c in columns {
            out.insert(c.clone(), self.0.get(c).cloned().unwrap_or(Value::Null));
        }
        Record(out)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    /// Zero or more records were recovered.
    Extracted { records: Vec<Record> },
    /// The page failed; other pages are unaffected.
    Failed { error: PageError },
}

/// Outcome of processing one page image, with per-page stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page index within the source document.
    pub page: usize,
    pub outcome: PageOutcome,
    /// Interpretation attempts made (1 when the first call succeeded).
    pub attempts: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl PageResult {
    /// A failure that happened before any model call returned.
    pub fn failed(page: usize, error: PageError) -> Self {
        Self {
            page,
            outcome: PageOutcome::Failed { error },
            attempts: 0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PageOutcome::Extracted { .. })
    }

    pub fn records(&self) -> &[Record] {
        match &self.outcome {
            PageOutcome::Extracted { records } => records,
            PageOutcome::Failed { .. } => &[],
        }
    }

    pub fn error(&self) -> Option<&PageError> {
        match &self.outcome {
            PageOutcome::Failed { error } => Some(error),
            PageOutcome::Extracted { .. } => None,
        }
    }
}

/// Where the records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Rasterised pages interpreted by the vision model.
    Pages,
    /// Rows read straight from a spreadsheet, no model involved.
    Spreadsheet,
}

/// Terminal state of a document run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Records recovered and no page failed.
    Complete,
    /// Records recovered but at least one page failed.
    Partial,
    /// No page produced a record. Not an error, but there is nothing to export.
    Empty,
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_records: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub model_duration_ms: u64,
}

/// Concatenated records of every page plus the per-page outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub source: ResultSource,
    /// Union of the field names the records carry, in first-seen order,
    /// except that declared profile fields present in at least one record
    /// come first, in declared order. A declared field no record has is not
    /// a column.
    pub columns: Vec<String>,
    /// Records in page order, then within-page order. Every record has
    /// exactly `columns` as its fields.
    pub records: Vec<Record>,
    /// One entry per page, sorted by page. Empty for spreadsheet input.
    pub pages: Vec<PageResult>,
    pub stats: ExtractionStats,
}

impl DocumentResult {
    /// Build a result from page outcomes (any order), concatenating records
    /// in page order and conforming them to one column set.
    pub fn from_pages(mut pages: Vec<PageResult>, declared: &[String]) -> Self {
        pages.sort_by_key(|p| p.page);

        let raw: Vec<&Record> = pages.iter().flat_map(|p| p.records()).collect();
        let columns = union_columns(declared, raw.iter().copied());
        let records: Vec<Record> = raw.iter().map(|r| r.conform_to(&columns)).collect();

        let failed = pages.iter().filter(|p| !p.is_success()).count();
        let stats = ExtractionStats {
            total_pages: pages.len(),
            processed_pages: pages.len() - failed,
            failed_pages: failed,
            total_records: records.len(),
            total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
            total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
            ..Default::default()
        };

        Self {
            source: ResultSource::Pages,
            columns,
            records,
            pages,
            stats,
        }
    }

    /// Build a result from rows read directly out of a spreadsheet.
    pub fn from_rows(rows: Vec<Record>, declared: &[String]) -> Self {
        let columns = union_columns(declared, rows.iter());
        let records: Vec<Record> = rows.iter().map(|r| r.conform_to(&columns)).collect();
        let stats = ExtractionStats {
            total_records: records.len(),
            ..Default::default()
        };
        Self {
            source: ResultSource::Spreadsheet,
            columns,
            records,
            pages: Vec::new(),
            stats,
        }
    }

    pub fn status(&self) -> DocumentStatus {
        if self.records.is_empty() {
            DocumentStatus::Empty
        } else if self.stats.failed_pages > 0 {
            DocumentStatus::Partial
        } else {
            DocumentStatus::Complete
        }
    }

    /// True when there is nothing to export.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Failed pages with their errors, in page order.
    pub fn failures(&self) -> impl Iterator<Item = &PageError> {
        self.pages.iter().filter_map(PageResult::error)
    }

    pub fn failed_pages(&self) -> usize {
        self.stats.failed_pages
    }
}

/// Seen declared fields first, then every other field in first-seen order.
fn union_columns<'a>(declared: &[String], records: impl Iterator<Item = &'a Record>) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    for r in records {
        for name in r.field_names() {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }

    let mut columns: Vec<String> = Vec::with_capacity(seen.len());
    for d in declared {
        if seen.contains(&d.as_str()) && !columns.contains(d) {
            columns.push(d.clone());
        }
    }
    for name in seen {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    fn ok_page(page: usize, records: Vec<Record>) -> PageResult {
        PageResult {
            page,
            outcome: PageOutcome::Extracted { records },
            attempts: 1,
            input_tokens: 10,
            output_tokens: 5,
            duration_ms: 1,
        }
    }

    #[test]
    fn missing_fields_become_null_not_dropped() {
        let pages = vec![ok_page(
            1,
            vec![
                rec(&[("a", json!(1)), ("b", json!("x"))]),
                rec(&[("a", json!(2))]),
            ],
        )];
        let doc = DocumentResult::from_pages(pages, &[]);
        assert_eq!(doc.columns, vec!["a", "b"]);
        assert_eq!(doc.records[1].get("b"), Some(&Value::Null));
        assert_eq!(doc.records[1].len(), 2);
    }

    #[test]
    fn declared_fields_lead_column_order() {
        let declared = vec!["b".to_string(), "a".to_string()];
        let pages = vec![
            ok_page(1, vec![rec(&[("c", json!(0)), ("a", json!(1))])]),
            ok_page(2, vec![rec(&[("b", json!(2))])]),
        ];
        let doc = DocumentResult::from_pages(pages, &declared);
        assert_eq!(doc.columns, vec!["b", "a", "c"]);
        let names: Vec<&str> = doc.records[0].field_names().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn declared_fields_no_record_has_are_not_columns() {
        let declared = vec!["Référence produit".to_string(), "Nom produit".to_string()];
        let pages = vec![ok_page(1, vec![rec(&[("ref", json!("A1")), ("Nom produit", json!("x"))])])];
        let doc = DocumentResult::from_pages(pages, &declared);
        assert_eq!(doc.columns, vec!["Nom produit", "ref"]);
        assert_eq!(doc.records[0].len(), 2);
    }

    #[test]
    fn pages_sorted_and_failures_counted() {
        let pages = vec![
            ok_page(3, vec![rec(&[("n", json!(3))])]),
            PageResult::failed(
                2,
                PageError::NoStructuredData {
                    page: 2,
                    raw: "sorry".into(),
                },
            ),
            ok_page(1, vec![rec(&[("n", json!(1))])]),
        ];
        let doc = DocumentResult::from_pages(pages, &[]);
        let order: Vec<&Value> = doc.records.iter().filter_map(|r| r.get("n")).collect();
        assert_eq!(order, vec![&json!(1), &json!(3)]);
        assert_eq!(doc.failed_pages(), 1);
        assert_eq!(doc.status(), DocumentStatus::Partial);
        assert_eq!(doc.failures().next().map(PageError::page), Some(2));
        assert_eq!(doc.stats.total_input_tokens, 20);
    }

    #[test]
    fn all_empty_pages_is_empty_status() {
        let doc = DocumentResult::from_pages(vec![ok_page(1, vec![]), ok_page(2, vec![])], &[]);
        assert!(doc.is_empty());
        assert_eq!(doc.status(), DocumentStatus::Empty);
        assert_eq!(doc.failed_pages(), 0);
    }

    #[test]
    fn page_result_serialises_with_status_tag() {
        let page = ok_page(1, vec![rec(&[("a", json!(1))])]);
        let v = serde_json::to_value(&page).unwrap();
        assert_eq!(v["outcome"]["status"], "extracted");
        assert_eq!(v["outcome"]["records"][0]["a"], 1);
    }
}
