//! # scanfuse
//!
//! Turn scanned documents (PDF or image) into a structured record by fusing
//! multiple OCR engines and running staged LLM analysis over the result.
//!
//! ## Why this crate?
//!
//! A single OCR engine on a phone-photographed or badly scanned page is a
//! coin flip: one engine garbles digits, another garbles Cyrillic, a third
//! chokes on skew. Running several engines and fusing their output keeps the
//! best reading per page, and where the engines genuinely disagree the
//! variants are preserved for the analysis stage to reconcile with context
//! instead of being silently discarded.
//!
//! ## Pipeline Overview
//!
//! ```text
//! scan (PDF / image / bytes)
//!  │
//!  ├─ 1. Input    sniff kind by magic bytes, land on a local path
//!  ├─ 2. Split    rasterise PDF pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Segment  connected-component regions, greedy merge
//!  ├─ 4. Prep     deskew / contrast / denoise / sharpen / binarize per region
//!  ├─ 5. OCR      every configured engine per region, failures isolated
//!  ├─ 6. Fuse     dedup near-identical engine texts, keep real variants
//!  └─ 7. Analyse  4 LLM stages → DocumentRecord (never aborts the record)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanfuse::{process, InputSource, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Engines and the chat backend resolve from the host by default:
//!     // tesseract if installed, Ollama at OLLAMA_HOST or localhost.
//!     let config = PipelineConfig::default();
//!     let output = process(InputSource::FilePath("scan.pdf".into()), &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     eprintln!(
//!         "pages: {} / regions: {} / engine failures: {}",
//!         output.stats.total_pages,
//!         output.stats.regions,
//!         output.stats.engine_failures
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`         | on  | Enables the `scanfuse` binary (clap + anyhow + tracing-subscriber) |
//! | `engine-ocrs` | off | Pure-Rust ocrs/rten OCR engine, no system tesseract needed |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scanfuse = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::backend::{ChatBackend, ChatSession, OllamaBackend};
pub use analysis::orchestrator::AnalysisOrchestrator;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{BackendError, EngineError, PreprocessError, ScanFuseError};
pub use output::{DocumentRecord, PageText, ProcessOutput, RunStats, StageOutcome};
pub use pipeline::input::{InputKind, InputSource};
pub use pipeline::ocr::{EngineOutput, LineText, OcrEngine};
pub use process::{process, process_bytes, process_sync};
