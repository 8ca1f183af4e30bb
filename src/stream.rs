//! Streaming extraction API: emit pages as they complete.
//!
//! Unlike the eager [`crate::extract::extract`], which returns only after
//! every page finishes, [`extract_stream`] yields one [`PageResult`] per
//! page as soon as it has an outcome. With `concurrency > 1` pages arrive in
//! completion order; [`PageResult::page`] says where each one belongs, and
//! [`crate::DocumentResult::from_pages`] restores page order.
//!
//! Failed pages are items too (a [`PageResult`] whose outcome is `Failed`),
//! so the stream always yields exactly one item per page. The progress
//! callback sees `on_document_start` before the first item and
//! `on_document_complete` after the last one.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::{interpret_page, resolve_model};
use crate::output::{DocumentResult, PageOutcome, PageResult};
use crate::pipeline::input::{Document, DocumentKind};
use crate::pipeline::llm::InterpretationClient;
use crate::pipeline::render::{rasterize, RenderOptions};
use crate::pipeline::spreadsheet::read_records;
use crate::profile::ExtractionProfile;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Run a document through the pipeline, streaming pages as they are ready.
///
/// Rasterisation happens before this returns, so a document that cannot be
/// read fails here rather than mid-stream. A spreadsheet yields a single
/// item holding every row, numbered page 1.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use notescan::{extract_stream, Document, ExtractionConfig, ExtractionProfile};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let doc = Document::from_path("inventaire.pdf")?;
/// let mut pages = extract_stream(doc, &ExtractionProfile::stock_count(), &ExtractionConfig::default()).await?;
/// while let Some(page) = pages.next().await {
///     println!("page {}: {} rows", page.page, page.records().len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    document: Document,
    profile: &ExtractionProfile,
    config: &ExtractionConfig,
) -> Result<PageStream, ExtractError> {
    info!("Starting streaming extraction ({:?})", document.kind);

    if document.kind == DocumentKind::Spreadsheet {
        let bytes = document.bytes;
        let rows = tokio::task::spawn_blocking(move || read_records(&bytes))
            .await
            .map_err(|e| ExtractError::Internal(format!("Read task panicked: {}", e)))??;
        let records = DocumentResult::from_rows(rows, &[]).records;
        if let Some(cb) = &config.progress_callback {
            cb.on_document_start(1);
            cb.on_page_complete(1, 1, records.len());
            cb.on_document_complete(1, 1);
        }
        let page = PageResult {
            page: 1,
            outcome: PageOutcome::Extracted { records },
            attempts: 0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        };
        return Ok(Box::pin(stream::once(async move { page })));
    }

    let client = InterpretationClient::from_config(resolve_model(config)?, config);
    let pages = rasterize(&document, &RenderOptions::from(config)).await?;
    let total = pages.len();

    let instruction: Arc<str> = Arc::from(profile.instruction.as_str());
    let callback = config.progress_callback.clone();
    let concurrency = config.concurrency.max(1);

    if let Some(cb) = &callback {
        cb.on_document_start(total);
    }

    let succeeded = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&succeeded);
    let tail_callback = callback.clone();

    let s = stream::iter(pages.into_iter().map(move |page| {
        let client = client.clone();
        let instruction = Arc::clone(&instruction);
        let callback = callback.clone();
        async move { interpret_page(page, &client, &instruction, total, callback.as_ref()).await }
    }))
    .buffer_unordered(concurrency)
    .inspect(move |page| {
        if page.is_success() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    // Yields nothing; fires the completion event once every page is out.
    let done = stream::once(async move {
        if let Some(cb) = tail_callback {
            cb.on_document_complete(total, succeeded.load(Ordering::Relaxed));
        }
    })
    .filter_map(|()| async { None::<PageResult> });

    Ok(Box::pin(s.chain(done)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{ExtractionRequest, ModelError, ModelReply, VisionModel};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct Echo;

    #[async_trait]
    impl VisionModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn interpret(&self, r: &ExtractionRequest<'_>) -> Result<ModelReply, ModelError> {
            Ok(ModelReply::text(format!(r#"[{{"page": {}}}]"#, r.page)))
        }
    }

    #[tokio::test]
    async fn image_yields_one_page() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let doc = Document::new(png, DocumentKind::Image);
        let config = ExtractionConfig::builder()
            .model_client(Arc::new(Echo))
            .build()
            .unwrap();

        let pages: Vec<PageResult> = extract_stream(doc, &ExtractionProfile::default(), &config)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].records()[0].get("page"), Some(&serde_json::json!(1)));
    }

    #[derive(Default)]
    struct Events(std::sync::Mutex<Vec<String>>);

    impl crate::progress::ExtractionProgressCallback for Events {
        fn on_document_start(&self, total: usize) {
            self.0.lock().unwrap().push(format!("start {total}"));
        }
        fn on_page_complete(&self, page: usize, _total: usize, records: usize) {
            self.0.lock().unwrap().push(format!("page {page}: {records}"));
        }
        fn on_document_complete(&self, total: usize, success: usize) {
            self.0.lock().unwrap().push(format!("done {success}/{total}"));
        }
    }

    #[tokio::test]
    async fn document_events_bracket_the_stream() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let events = Arc::new(Events::default());
        let config = ExtractionConfig::builder()
            .model_client(Arc::new(Echo))
            .progress_callback(events.clone())
            .build()
            .unwrap();

        let mut pages = extract_stream(
            Document::new(png, DocumentKind::Image),
            &ExtractionProfile::default(),
            &config,
        )
        .await
        .unwrap();
        assert_eq!(*events.0.lock().unwrap(), vec!["start 1"]);

        while pages.next().await.is_some() {}
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["start 1", "page 1: 1", "done 1/1"]
        );
    }

    #[tokio::test]
    async fn spreadsheet_rows_share_one_field_set() {
        let mut wb = rust_xlsxwriter::Workbook::new();
        let a = wb.add_worksheet();
        a.write_string(0, 0, "Couleur").unwrap();
        a.write_string(1, 0, "5.1").unwrap();
        let b = wb.add_worksheet();
        b.write_string(0, 0, "Total").unwrap();
        b.write_number(1, 0, 12.0).unwrap();
        let bytes = wb.save_to_buffer().unwrap();

        let events = Arc::new(Events::default());
        let config = ExtractionConfig::builder()
            .progress_callback(events.clone())
            .build()
            .unwrap();
        let pages: Vec<PageResult> = extract_stream(
            Document::new(bytes, DocumentKind::Spreadsheet),
            &ExtractionProfile::default(),
            &config,
        )
        .await
        .unwrap()
        .collect()
        .await;

        let records = pages[0].records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.len() == 2));
        assert_eq!(records[0].get("Total"), Some(&serde_json::Value::Null));
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["start 1", "page 1: 2", "done 1/1"]
        );
    }
}
