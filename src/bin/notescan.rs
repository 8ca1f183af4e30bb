//! CLI binary for notescan.
//!
//! A thin shim over the library crate that maps CLI flags to an
//! `ExtractionConfig` plus an `ExtractionProfile`, then writes the workbook.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use notescan::{
    extract, extract_to_file, DocumentResult, ExtractionConfig, ExtractionProfile,
    ExtractionProgressCallback, PageError, ProgressCallback, DEFAULT_DPI,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Exit code when the run succeeded but produced no records.
const EXIT_EMPTY: i32 = 2;

/// Characters of raw model output shown for a failed page.
const RAW_EXCERPT_CHARS: usize = 200;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages may finish out of
/// order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    rows: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_document_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            rows: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Reading");
        self.bar.reset_eta();
    }

    /// Clear the spinner when no document events closed it: spreadsheet
    /// input, or a fatal error before any page ran.
    fn dismiss(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }

    fn elapsed_secs(&self, page: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&page)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(page, Instant::now());
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: usize, total: usize, record_count: usize) {
        let secs = self.elapsed_secs(page);
        self.rows.fetch_add(record_count, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page,
            total,
            dim(&format!("{record_count:>4} rows")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(&excerpt(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();
        let rows = self.rows.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} rows from {} page(s)",
                green("✔"),
                bold(&rows.to_string()),
                success_count
            );
        } else {
            eprintln!(
                "{} {} rows from {}/{} page(s)  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&rows.to_string()),
                success_count,
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Corrected quantities from an annotated delivery note
  notescan bon_livraison.pdf

  # Handwritten stock count, explicit output file
  notescan --profile stock-count inventaire.jpg -o inventaire.xlsx

  # Your own instruction and columns
  notescan --instruction-file consignes.txt --fields "Lot,Poids,Date" scan.png

  # Records as JSON on stdout (no workbook written)
  notescan --json bon.pdf > bon.json

  # Re-export an existing workbook (no model call)
  notescan ancien_export.xlsx -o fusion.xlsx

EXIT CODES:
  0  workbook written (some pages may have failed; they are listed)
  1  the document could not be processed
  2  no page produced a record; nothing was written

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY       OpenAI API key (default provider, model gpt-4o)
  ANTHROPIC_API_KEY    Anthropic API key
  GEMINI_API_KEY       Google Gemini API key
  NOTESCAN_PROVIDER    Provider (openai, anthropic, gemini, ollama, …)
  NOTESCAN_MODEL       Model ID
  PDFIUM_LIB_PATH      Path to libpdfium; otherwise the system library is used
"#;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ProfileArg {
    /// Hand-corrected delivery notes.
    DeliveryNote,
    /// Handwritten stock counts.
    StockCount,
}

/// Extract tables from scanned notes into a spreadsheet using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "notescan",
    version,
    about = "Extract tables from scanned notes into a spreadsheet using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image, PDF or spreadsheet: local path or HTTP/HTTPS URL.
    input: String,

    /// Workbook to write. Default: the profile's file name.
    #[arg(short, long, env = "NOTESCAN_OUTPUT")]
    output: Option<PathBuf>,

    /// What kind of document this is.
    #[arg(long, env = "NOTESCAN_PROFILE", value_enum, default_value = "delivery-note")]
    profile: ProfileArg,

    /// Text file with a custom instruction. Replaces the profile's.
    #[arg(long, env = "NOTESCAN_INSTRUCTION_FILE")]
    instruction_file: Option<PathBuf>,

    /// Comma-separated column names expected from a custom instruction.
    #[arg(long, env = "NOTESCAN_FIELDS", value_delimiter = ',', requires = "instruction_file")]
    fields: Vec<String>,

    /// Vision model ID (e.g. gpt-4o).
    #[arg(long, env = "NOTESCAN_MODEL")]
    model: Option<String>,

    /// Provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "NOTESCAN_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "NOTESCAN_DPI", default_value_t = DEFAULT_DPI,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pages interpreted at the same time. 1 = strictly sequential.
    #[arg(short, long, env = "NOTESCAN_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u64).range(1..))]
    concurrency: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "NOTESCAN_PASSWORD")]
    password: Option<String>,

    /// Max model output tokens per page.
    #[arg(long, env = "NOTESCAN_MAX_TOKENS", default_value_t = 1500)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "NOTESCAN_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Model attempts per page, first call included.
    #[arg(long, env = "NOTESCAN_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Per-attempt model call timeout in seconds.
    #[arg(long, env = "NOTESCAN_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Wall-clock budget for the whole document in seconds.
    #[arg(long, env = "NOTESCAN_DOCUMENT_TIMEOUT")]
    document_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "NOTESCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the result as JSON on stdout. Writes no workbook unless -o is given.
    #[arg(long, env = "NOTESCAN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "NOTESCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "NOTESCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "NOTESCAN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is set.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let profile = build_profile(&cli).await?;

    let cli_progress = show_progress.then(CliProgressCallback::new_dynamic);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn ExtractionProgressCallback>);
    let config = build_config(&cli, progress_cb)?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output_path = match (&cli.output, cli.json) {
        (Some(path), _) => Some(path.clone()),
        (None, false) => Some(PathBuf::from(&profile.file_name)),
        (None, true) => None,
    };

    let outcome = match output_path {
        Some(ref path) => extract_to_file(&cli.input, path, &profile, &config).await,
        None => extract(&cli.input, &profile, &config).await,
    };
    if let Some(cb) = &cli_progress {
        cb.dismiss();
    }
    let result = outcome.context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        println!("{json}");
    }

    if !cli.quiet {
        report_failures(&result);
    }

    if result.is_empty() {
        eprintln!(
            "{} No rows could be extracted from '{}'. Nothing was written.",
            red("✘"),
            cli.input
        );
        if result.failed_pages() > 0 {
            eprintln!("   Every page failed; see the raw responses above.");
        }
        std::process::exit(EXIT_EMPTY);
    }

    if !cli.quiet {
        if let Some(ref path) = output_path {
            eprintln!(
                "{}  {} rows × {} columns  {}ms  →  {}",
                if result.failed_pages() == 0 { green("✔") } else { cyan("⚠") },
                result.records.len(),
                result.columns.len(),
                result.stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
        if result.stats.total_input_tokens > 0 {
            eprintln!(
                "   {} tokens in  /  {} tokens out",
                dim(&result.stats.total_input_tokens.to_string()),
                dim(&result.stats.total_output_tokens.to_string()),
            );
        }
    }

    Ok(())
}

/// Built-in profile, or a custom one from `--instruction-file`.
async fn build_profile(cli: &Cli) -> Result<ExtractionProfile> {
    if let Some(ref path) = cli.instruction_file {
        let instruction = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        let fields = cli
            .fields
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        return Ok(ExtractionProfile::custom(instruction, fields));
    }

    Ok(match cli.profile {
        ProfileArg::DeliveryNote => ExtractionProfile::delivery_note(),
        ProfileArg::StockCount => ExtractionProfile::stock_count(),
    })
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency as usize)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_attempts(cli.max_attempts)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(secs) = cli.document_timeout {
        builder = builder.document_timeout_secs(secs);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// One block per failed page, with the start of what the model said.
fn report_failures(result: &DocumentResult) {
    for error in result.failures() {
        eprintln!("{} {}", red("✗"), error);
        if let Some(raw) = error.raw_response() {
            let raw = raw.trim();
            if raw.is_empty() {
                eprintln!("   {}", dim("(empty response)"));
            } else {
                eprintln!("   {}", dim(&excerpt(raw, RAW_EXCERPT_CHARS)));
            }
        } else if let PageError::Interpretation { attempts, .. } = error {
            eprintln!("   {}", dim(&format!("gave up after {attempts} attempt(s)")));
        }
    }
}

/// First `max` characters of `s` on one line, with an ellipsis when cut.
fn excerpt(s: &str, max: usize) -> String {
    let flat: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\u{2026}", &flat[..idx]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_is_cleared_without_document_events() {
        let cb = CliProgressCallback::new_dynamic();
        assert!(!cb.bar.is_finished());
        cb.dismiss();
        assert!(cb.bar.is_finished());
    }

    #[test]
    fn dismiss_after_completion_is_harmless() {
        let cb = CliProgressCallback::new_dynamic();
        cb.on_document_start(1);
        cb.on_page_complete(1, 1, 3);
        cb.on_document_complete(1, 1);
        cb.dismiss();
        assert!(cb.bar.is_finished());
        assert_eq!(cb.rows.load(Ordering::SeqCst), 3);
    }
}
