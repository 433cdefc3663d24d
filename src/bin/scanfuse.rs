//! CLI binary for scanfuse.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints the resulting record.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scanfuse::{process, InputSource, PipelineConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a scanned PDF (structured record to stdout)
  scanfuse scan.pdf

  # Single photographed page
  scanfuse photo.jpg

  # Full run detail: per-page texts, engine map, counters
  scanfuse --full scan.pdf > run.json

  # Just the fused OCR text, no LLM analysis output
  scanfuse --text-only scan.pdf

  # Russian + English document against a specific model
  scanfuse --language rus+eng --model llama3.1:70b scan.pdf

  # Raw page OCR without segmentation or cleanup
  scanfuse --no-segment --no-preprocess scan.pdf

ENVIRONMENT VARIABLES:
  OLLAMA_HOST            Chat backend endpoint (default http://localhost:11434)
  SCANFUSE_MODEL         Override the chat model ID
  SCANFUSE_OCRS_MODELS   Model directory for the ocrs engine (engine-ocrs builds)
  PDFIUM_LIB_PATH        Path to an existing libpdfium

SETUP:
  1. Install an OCR engine:   apt install tesseract-ocr
  2. Run a chat backend:      ollama serve && ollama pull llama3.1
  3. Analyse:                 scanfuse scan.pdf
"#;

/// Extract text from scans with multiple OCR engines and analyse it with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "scanfuse",
    version,
    about = "Multi-engine OCR + staged LLM analysis for scanned documents",
    long_about = "Extract text from scanned documents (PDF or image) by fusing the output of \
multiple OCR engines, then classify the document and extract its fields through staged LLM \
analysis. Works against any Ollama-compatible endpoint.",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Scanned PDF or image file.
    input: PathBuf,

    /// Rasterisation DPI for PDF pages (72–600).
    #[arg(long, env = "SCANFUSE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Tesseract language code(s), e.g. eng or rus+eng.
    #[arg(short, long, env = "SCANFUSE_LANGUAGE", default_value = "eng")]
    language: String,

    /// Chat model ID for the analysis stages.
    #[arg(long, env = "SCANFUSE_MODEL")]
    model: Option<String>,

    /// Chat backend endpoint (Ollama-compatible).
    #[arg(long, env = "OLLAMA_HOST")]
    endpoint: Option<String>,

    /// Similarity ratio above which engine texts count as duplicates.
    #[arg(long, default_value_t = 0.85)]
    similarity: f64,

    /// Skip per-region image cleanup (deskew, contrast, binarize).
    #[arg(long)]
    no_preprocess: bool,

    /// OCR whole pages instead of detected text regions.
    #[arg(long)]
    no_segment: bool,

    /// Retries per analysis stage on transient backend failures.
    #[arg(long, env = "SCANFUSE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-LLM-call timeout in seconds (0 disables).
    #[arg(long, env = "SCANFUSE_LLM_TIMEOUT", default_value_t = 120)]
    llm_timeout: u64,

    /// Print the full run output (record, pages, engine texts, stats).
    #[arg(long)]
    full: bool,

    /// Print only the fused OCR text; skip printing the record.
    #[arg(long, conflicts_with = "full")]
    text_only: bool,

    /// Disable the spinner.
    #[arg(long, env = "SCANFUSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCANFUSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, env = "SCANFUSE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner owns the terminal while it runs, so library INFO logs are
    // suppressed unless explicitly requested.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let config = build_config(&cli)?;

    let spinner = if show_progress {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Processing");
        bar.set_message(cli.input.display().to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    let result = process(InputSource::FilePath(cli.input.clone()), &config).await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let output = result.context("Processing failed")?;

    // ── Print result ─────────────────────────────────────────────────────
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if cli.text_only {
        handle
            .write_all(output.document_text.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.document_text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    } else {
        let value = if cli.full {
            serde_json::to_string_pretty(&output)
        } else {
            serde_json::to_string_pretty(&output.record)
        };
        let json = value.context("Failed to serialise output")?;
        handle
            .write_all(json.as_bytes())
            .context("Failed to write to stdout")?;
        handle.write_all(b"\n").ok();
    }

    if !cli.quiet {
        eprintln!(
            "{} pages, {} regions, {} engine calls ({} failed) — OCR {}ms, analysis {}ms",
            output.stats.total_pages,
            output.stats.regions,
            output.stats.engine_calls,
            output.stats.engine_failures,
            output.stats.ocr_duration_ms,
            output.stats.analysis_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .language(cli.language.clone())
        .similarity_threshold(cli.similarity)
        .preprocess(!cli.no_preprocess)
        .segment_regions(!cli.no_segment)
        .max_retries(cli.max_retries)
        .llm_timeout_secs(cli.llm_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.backend_endpoint(endpoint.clone());
    }

    builder.build().context("Invalid configuration")
}
