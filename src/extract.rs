//! Eager (full-document) extraction entry points.
//!
//! These wait for every page and return one [`DocumentResult`]. Use
//! [`crate::stream::extract_stream`] to receive pages as they finish.
//!
//! A page that fails never aborts the document: its error is recorded in
//! [`DocumentResult::pages`] and the other pages carry on. Only failures
//! that make the whole document unusable (unreadable input, a page that
//! cannot be rasterised, no model configured) come back as `Err`.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::{ExtractError, PageError};
use crate::export::to_xlsx;
use crate::output::{DocumentResult, PageOutcome, PageResult};
use crate::pipeline::blocks::extract_records;
use crate::pipeline::input::{resolve_input, Document, DocumentKind};
use crate::pipeline::llm::{InterpretationClient, LlmVisionModel, VisionModel};
use crate::pipeline::postprocess::clean_records;
use crate::pipeline::render::{rasterize, PageImage, RenderOptions};
use crate::pipeline::spreadsheet::read_records;
use crate::profile::ExtractionProfile;
use crate::progress::ProgressCallback;
use edgequake_llm::ProviderFactory;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Extract records from a file path or HTTP(S) URL.
///
/// # Example
/// ```rust,no_run
/// use notescan::{extract, ExtractionConfig, ExtractionProfile};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default();
/// let result = extract("bon_livraison.pdf", &ExtractionProfile::delivery_note(), &config).await?;
/// for record in &result.records {
///     println!("{:?}", record.get("Quantité corrigée"));
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input: impl AsRef<str>,
    profile: &ExtractionProfile,
    config: &ExtractionConfig,
) -> Result<DocumentResult, ExtractError> {
    let input = input.as_ref();
    info!("Starting extraction: {}", input);
    let document = resolve_input(input, config.download_timeout_secs).await?;
    process_document(document, profile, config).await
}

/// Extract and write the workbook to `output_path`.
///
/// Nothing is written when the result is empty; the returned result tells
/// the caller why. The write is atomic (temp file + rename).
pub async fn extract_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    profile: &ExtractionProfile,
    config: &ExtractionConfig,
) -> Result<DocumentResult, ExtractError> {
    let result = extract(input, profile, config).await?;
    if result.is_empty() {
        warn!("No records extracted; not writing {}", output_path.as_ref().display());
        return Ok(result);
    }
    let bytes = to_xlsx(&result, profile)?;
    write_atomic(output_path.as_ref(), &bytes).await?;
    Ok(result)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input: impl AsRef<str>,
    profile: &ExtractionProfile,
    config: &ExtractionConfig,
) -> Result<DocumentResult, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input, profile, config))
}

/// Run one already-loaded document through the pipeline.
///
/// Spreadsheets are read directly. Images and PDFs are rasterised and
/// every page is interpreted, with the optional document deadline counted
/// from this call.
pub async fn process_document(
    document: Document,
    profile: &ExtractionProfile,
    config: &ExtractionConfig,
) -> Result<DocumentResult, ExtractError> {
    let start = Instant::now();

    if document.kind == DocumentKind::Spreadsheet {
        let bytes = document.bytes;
        let rows = tokio::task::spawn_blocking(move || read_records(&bytes))
            .await
            .map_err(|e| ExtractError::Internal(format!("Read task panicked: {}", e)))??;
        // The workbook's own headers define its columns.
        let mut result = DocumentResult::from_rows(rows, &[]);
        result.stats.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Spreadsheet read: {} records, {} columns",
            result.records.len(),
            result.columns.len()
        );
        return Ok(result);
    }

    let deadline = config.document_timeout().map(|t| start + t);
    let model = resolve_model(config)?;
    let client = InterpretationClient::from_config(model, config);

    let render_start = Instant::now();
    let pages = rasterize(&document, &RenderOptions::from(config)).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rasterised {} pages in {}ms", pages.len(), render_duration_ms);

    let model_start = Instant::now();
    let mut result = aggregate(pages, &client, profile, config, deadline).await;
    result.stats.model_duration_ms = model_start.elapsed().as_millis() as u64;
    result.stats.render_duration_ms = render_duration_ms;
    result.stats.total_duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Extraction complete: {} records from {}/{} pages, {}ms total",
        result.stats.total_records,
        result.stats.processed_pages,
        result.stats.total_pages,
        result.stats.total_duration_ms
    );
    Ok(result)
}

/// Interpret already-rasterised pages and assemble the document result.
///
/// At most `config.concurrency` pages are in flight; records come out in
/// page order whatever order the pages finish in.
pub async fn process_pages(
    pages: Vec<PageImage>,
    client: &InterpretationClient,
    profile: &ExtractionProfile,
    config: &ExtractionConfig,
) -> DocumentResult {
    let deadline = config.document_timeout().map(|t| Instant::now() + t);
    aggregate(pages, client, profile, config, deadline).await
}

async fn aggregate(
    pages: Vec<PageImage>,
    client: &InterpretationClient,
    profile: &ExtractionProfile,
    config: &ExtractionConfig,
    deadline: Option<Instant>,
) -> DocumentResult {
    let total = pages.len();
    let callback = config.progress_callback.as_ref();
    if let Some(cb) = callback {
        cb.on_document_start(total);
    }

    let budget_secs = config.document_timeout_secs.unwrap_or(0);
    let results: Vec<PageResult> = stream::iter(pages.into_iter().map(|page| {
        let index = page.page;
        let work = interpret_page(page, client, &profile.instruction, total, callback);
        async move {
            match deadline {
                None => work.await,
                Some(at) => match tokio::time::timeout_at(at, work).await {
                    Ok(result) => result,
                    Err(_) => {
                        let error = PageError::DeadlineExceeded {
                            page: index,
                            secs: budget_secs,
                        };
                        warn!("{}", error);
                        if let Some(cb) = callback {
                            cb.on_page_error(index, total, &error.to_string());
                        }
                        PageResult::failed(index, error)
                    }
                },
            }
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    let result = DocumentResult::from_pages(results, &profile.fields);
    if let Some(cb) = callback {
        cb.on_document_complete(total, result.stats.processed_pages);
    }
    result
}

/// Interpret one page and turn the reply into records.
///
/// Calls `on_page_start` and then exactly one of `on_page_complete` or
/// `on_page_error`, with nothing awaited after the final callback.
pub(crate) async fn interpret_page(
    page: PageImage,
    client: &InterpretationClient,
    instruction: &str,
    total: usize,
    callback: Option<&ProgressCallback>,
) -> PageResult {
    let index = page.page;
    if let Some(cb) = callback {
        cb.on_page_start(index, total);
    }

    let result = match client.interpret(&page, instruction).await {
        Err(e) => {
            let attempts = e.attempts;
            PageResult {
                attempts,
                ..PageResult::failed(index, e.into())
            }
        }
        Ok(raw) => {
            let outcome = match extract_records(&raw.text) {
                Ok(records) => PageOutcome::Extracted {
                    records: clean_records(records),
                },
                Err(e) => PageOutcome::Failed {
                    error: PageError::from_block(index, e, raw.text),
                },
            };
            PageResult {
                page: index,
                outcome,
                attempts: raw.attempts,
                input_tokens: raw.input_tokens,
                output_tokens: raw.output_tokens,
                duration_ms: raw.duration_ms,
            }
        }
    };

    match &result.outcome {
        PageOutcome::Extracted { records } => {
            debug!("Page {}: {} records", index, records.len());
            if let Some(cb) = callback {
                cb.on_page_complete(index, total, records.len());
            }
        }
        PageOutcome::Failed { error } => {
            warn!("{}", error);
            if let Some(cb) = callback {
                cb.on_page_error(index, total, &error.to_string());
            }
        }
    }
    result
}

/// Resolve the vision model, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.model_client`), used as-is. This is how
///    tests and custom middleware plug in.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`DEFAULT_MODEL`]. The provider reads its own API key variable.
/// 3. **Environment pair** `NOTESCAN_PROVIDER` + `NOTESCAN_MODEL`, when both
///    are set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, ExtractError> {
    if let Some(ref client) = config.model_client {
        return Ok(Arc::clone(client));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_model(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("NOTESCAN_PROVIDER"),
        std::env::var("NOTESCAN_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_model(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_model("openai", model);
        }
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision model provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(LlmVisionModel::new(provider, "auto")))
}

fn create_vision_model(provider_name: &str, model: &str) -> Result<Arc<dyn VisionModel>, ExtractError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    debug!("Using {}/{}", provider_name, model);
    Ok(Arc::new(LlmVisionModel::new(
        provider,
        format!("{provider_name}/{model}"),
    )))
}

/// Write to a sibling temp file, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExtractError> {
    let write_err = |source| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("xlsx.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{ExtractionRequest, ModelError, ModelReply};
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl VisionModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn interpret(&self, _r: &ExtractionRequest<'_>) -> Result<ModelReply, ModelError> {
            Ok(ModelReply::text(self.0))
        }
    }

    fn page(n: usize) -> PageImage {
        PageImage {
            page: n,
            png: vec![0x89, b'P', b'N', b'G'],
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn explicit_client_wins() {
        let config = ExtractionConfig::builder()
            .model_client(Arc::new(Fixed("[]")))
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        assert_eq!(resolve_model(&config).unwrap().name(), "fixed");
    }

    #[tokio::test]
    async fn reply_records_are_cleaned_and_kept() {
        let config = ExtractionConfig::default();
        let client = InterpretationClient::from_config(
            Arc::new(Fixed(r#"Sure: [{" Nom produit ": " DIA  COLOR "}, {"Nom produit": ""}]"#)),
            &config,
        );
        let result = interpret_page(page(1), &client, "read", 1, None).await;
        assert_eq!(result.records().len(), 1);
        assert_eq!(
            result.records()[0].get("Nom produit"),
            Some(&serde_json::json!("DIA COLOR"))
        );
    }

    #[tokio::test]
    async fn prose_reply_fails_with_raw_text() {
        let config = ExtractionConfig::default();
        let client =
            InterpretationClient::from_config(Arc::new(Fixed("Je ne peux pas lire.")), &config);
        let result = interpret_page(page(4), &client, "read", 4, None).await;
        let err = result.error().unwrap();
        assert_eq!(err.page(), 4);
        assert_eq!(err.raw_response(), Some("Je ne peux pas lire."));
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn spreadsheet_documents_skip_the_model() {
        let mut wb = rust_xlsxwriter::Workbook::new();
        let s = wb.add_worksheet();
        s.write_string(0, 0, "Couleur").unwrap();
        s.write_string(1, 0, "5.1").unwrap();
        let bytes = wb.save_to_buffer().unwrap();

        // No model is configured: a model call would fail resolution.
        let config = ExtractionConfig::builder()
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        let doc = Document::new(bytes, DocumentKind::Spreadsheet);
        let result = process_document(doc, &ExtractionProfile::delivery_note(), &config)
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["Couleur"]);
        assert_eq!(result.records.len(), 1);
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("inventaire.xlsx");
        write_atomic(&path, b"data").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        assert!(!path.with_extension("xlsx.tmp").exists());
    }
}
