//! Error types for the notescan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] (**fatal**): the document cannot be processed at all
//!   (unrecognised format, corrupt PDF, provider not configured). Returned as
//!   `Err(ExtractError)` from the top-level `extract*` / `process_document`
//!   functions.
//!
//! * [`PageError`] (**non-fatal**): a single page failed (model unreachable
//!   after retries, response without a usable table) but all other pages are
//!   fine. Stored inside [`crate::output::PageResult`] so callers see which
//!   pages failed and why, next to the rows that were recovered.
//!
//! The two stage-level errors, [`InterpretationError`] and [`BlockError`],
//! are what the interpretation client and the block extractor return on their
//! own; the aggregator folds them into a [`PageError`] tagged with the page.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the notescan library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The document is neither a supported bitmap image, a PDF, nor a
    /// spreadsheet.
    #[error("Unsupported document format{}: {detail}", for_name(.name))]
    UnsupportedFormat { name: Option<String>, detail: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// pdfium could not render (or we could not re-encode) a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The bytes claim to be an image but cannot be decoded.
    #[error("Image could not be decoded: {detail}")]
    ImageDecodeFailed { detail: String },

    /// The workbook could not be opened or one of its sheets could not be read.
    #[error("Spreadsheet could not be read: {detail}")]
    SpreadsheetReadFailed { detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("Vision model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The spreadsheet writer rejected the record set.
    #[error("Spreadsheet export failed: {0}")]
    ExportFailed(String),

    /// Could not create or write the output spreadsheet file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn for_name(name: &Option<String>) -> String {
    name.as_deref()
        .map(|n| format!(" for '{n}'"))
        .unwrap_or_default()
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::PageResult`] when a page fails. The document
/// continues with its remaining pages. The structured-data variants keep the
/// model's raw text so an operator can see what came back.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The interpretation service failed on every attempt.
    #[error("Page {page}: interpretation failed after {attempts} attempts: {detail}")]
    Interpretation {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The response contained no bracketed list of records.
    #[error("Page {page}: response contained no structured data")]
    NoStructuredData { page: usize, raw: String },

    /// A candidate block was found but could not be parsed into records.
    #[error("Page {page}: structured data is malformed: {detail}")]
    MalformedData {
        page: usize,
        detail: String,
        raw: String,
    },

    /// The document deadline passed before this page finished.
    #[error("Page {page}: document deadline exceeded after {secs}s")]
    DeadlineExceeded { page: usize, secs: u64 },
}

impl PageError {
    /// 1-based page index the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Interpretation { page, .. }
            | PageError::NoStructuredData { page, .. }
            | PageError::MalformedData { page, .. }
            | PageError::DeadlineExceeded { page, .. } => *page,
        }
    }

    /// The raw model response, when the failure happened after one arrived.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            PageError::NoStructuredData { raw, .. } | PageError::MalformedData { raw, .. } => {
                Some(raw)
            }
            _ => None,
        }
    }

    /// Attach a page index to an extractor failure, keeping the raw text.
    pub fn from_block(page: usize, err: BlockError, raw: String) -> Self {
        match err {
            BlockError::NoStructuredData => PageError::NoStructuredData { page, raw },
            BlockError::MalformedData { detail } => PageError::MalformedData { page, detail, raw },
        }
    }
}

/// The interpretation client gave up on a page.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Page {page}: interpretation failed after {attempts} attempts: {detail}")]
pub struct InterpretationError {
    /// 1-based page index.
    pub page: usize,
    /// Number of attempts actually made.
    pub attempts: u32,
    /// The last underlying error.
    pub detail: String,
}

impl From<InterpretationError> for PageError {
    fn from(e: InterpretationError) -> Self {
        PageError::Interpretation {
            page: e.page,
            attempts: e.attempts,
            detail: e.detail,
        }
    }
}

/// Why a raw response could not be turned into records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// No bracketed list-of-objects block anywhere in the text.
    #[error("no structured data block found in response")]
    NoStructuredData,

    /// The selected block is not a valid array of flat objects.
    #[error("structured data block is malformed: {detail}")]
    MalformedData { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display_with_name() {
        let e = ExtractError::UnsupportedFormat {
            name: Some("notes.docx".into()),
            detail: "unrecognised signature".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.docx"), "got: {msg}");
        assert!(msg.contains("unrecognised signature"), "got: {msg}");
    }

    #[test]
    fn unsupported_format_display_without_name() {
        let e = ExtractError::UnsupportedFormat {
            name: None,
            detail: "empty input".into(),
        };
        assert_eq!(e.to_string(), "Unsupported document format: empty input");
    }

    #[test]
    fn page_error_keeps_raw_text() {
        let e = PageError::from_block(
            2,
            BlockError::MalformedData {
                detail: "expected value".into(),
            },
            "[{oops}]".into(),
        );
        assert_eq!(e.page(), 2);
        assert_eq!(e.raw_response(), Some("[{oops}]"));
        assert!(e.to_string().contains("Page 2"));
    }

    #[test]
    fn interpretation_error_converts_to_page_error() {
        let e = InterpretationError {
            page: 4,
            attempts: 3,
            detail: "connection reset".into(),
        };
        let page: PageError = e.into();
        assert_eq!(page.page(), 4);
        assert!(page.raw_response().is_none());
        assert!(page.to_string().contains("after 3 attempts"));
    }
}
