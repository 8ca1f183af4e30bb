//! # notescan
//!
//! Extract tables from scanned paperwork using Vision Language Models (VLMs).
//!
//! Hand-corrected delivery notes and handwritten stock counts defeat
//! classic OCR: struck-through quantities, pencilled replacements and loose
//! column alignment all come out as noise. This crate rasterises every page,
//! asks a vision model to read it as a person would, recovers the JSON table
//! from its free-text reply, and exports the rows as a spreadsheet.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF / workbook
//!  │
//!  ├─ 1. Input    sniff kind from bytes, download URLs
//!  ├─ 2. Render   one RGB PNG per page via pdfium (spawn_blocking)
//!  ├─ 3. Model    instruction + page image, retried with backoff
//!  ├─ 4. Blocks   longest JSON list-of-objects in the reply
//!  ├─ 5. Collect  per-page outcomes, records in page order
//!  └─ 6. Export   one-sheet .xlsx
//! ```
//!
//! Workbooks skip steps 2–4: their rows are read directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notescan::{extract_to_file, ExtractionConfig, ExtractionProfile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let profile = ExtractionProfile::delivery_note();
//!     let result = extract_to_file("bon.pdf", "corrections.xlsx", &profile, &config).await?;
//!     for failure in result.failures() {
//!         eprintln!("{failure}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `notescan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! notescan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_DPI, DEFAULT_MODEL};
pub use error::{BlockError, ExtractError, InterpretationError, PageError};
pub use export::{to_xlsx, XLSX_MIME};
pub use extract::{extract, extract_sync, extract_to_file, process_document, process_pages, resolve_model};
pub use output::{
    DocumentResult, DocumentStatus, ExtractionStats, PageOutcome, PageResult, Record, ResultSource,
};
pub use pipeline::blocks::extract_records;
pub use pipeline::input::{Document, DocumentKind};
pub use pipeline::llm::{
    ExtractionRequest, InterpretationClient, LlmVisionModel, ModelError, ModelReply, RawResponse,
    VisionModel,
};
pub use pipeline::render::{rasterize, PageImage, RenderOptions};
pub use pipeline::retry::RetryPolicy;
pub use profile::ExtractionProfile;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, PageStream};
