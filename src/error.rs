//! Error types for the scanfuse library.
//!
//! Distinct error types reflect distinct failure modes:
//!
//! * [`ScanFuseError`] — **Fatal**: the run cannot proceed at all (bad input
//!   file, corrupt PDF, no OCR engine installed, no text extracted from any
//!   page). Returned as `Err(ScanFuseError)` from the top-level `process*`
//!   functions.
//!
//! * [`EngineError`] — **Non-fatal**: a single OCR engine failed on a single
//!   region. Stored as the `Err` side of each engine run so fusion can tell
//!   "engine ran and found nothing" apart from "engine failed". Other engines
//!   on the same region are unaffected.
//!
//! * [`BackendError`] — **Non-fatal**: one LLM analysis stage could not reach
//!   or use its backend session. The stage degrades to an error-tagged
//!   outcome and the orchestrator continues with the next stage.
//!
//! * [`PreprocessError`] — **Non-fatal**: per-region image cleanup failed;
//!   the caller OCRs the original crop instead.
//!
//! Structured-parse failures are not errors at all: an undecodable LLM reply
//! becomes a free-form markdown outcome, never an `Err`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scanfuse library.
///
/// Per-engine and per-stage failures use [`EngineError`] and [`BackendError`]
/// and are recorded in the run output rather than propagated here.
#[derive(Debug, Error)]
pub enum ScanFuseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input bytes are neither a PDF nor a decodable image.
    #[error("unsupported input: {detail}")]
    UnsupportedInput { detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt or unreadable: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium returned an error for a specific page.
    #[error("rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// An image file could not be decoded.
    #[error("image decode failed: {detail}")]
    ImageDecode { detail: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// No OCR engine is installed/configured; the pipeline cannot run.
    #[error(
        "no OCR engine available.\n\
         Install tesseract (apt install tesseract-ocr) or inject engines \
         via PipelineConfig::builder().engines(..)."
    )]
    NoEnginesAvailable,

    /// Every engine on every page failed or produced no usable text.
    ///
    /// This is the terminal, user-visible "text extraction failed" condition:
    /// there is nothing for the analysis stages to work with.
    #[error("text extraction failed: no OCR engine produced usable text for any page")]
    NoTextExtracted,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked blocking task, tempfile I/O, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one OCR engine on one region.
///
/// One engine erroring must never prevent the other engines from running,
/// nor abort the region; the failure is recorded and fusion proceeds with
/// whatever the remaining engines produced.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine's binary or model files are missing on this host.
    #[error("engine not available: {0}")]
    NotAvailable(String),

    /// The engine ran but reported a failure.
    #[error("engine failed: {0}")]
    Failed(String),

    /// The region image could not be written or decoded for the engine.
    #[error("engine image error: {0}")]
    Image(String),

    /// Subprocess or filesystem error while invoking the engine.
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal failure of one LLM analysis stage.
///
/// Each stage acquires its own backend session, so a failure here is local:
/// the stage yields an error-tagged outcome and the next stage still runs.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend session could not be established (credentials, handshake).
    #[error("backend authorization failed: {0}")]
    Authorization(String),

    /// The backend could not be reached.
    #[error("backend connection failed: {0}")]
    Connection(String),

    /// The backend answered with an error.
    #[error("backend API error: {0}")]
    Api(String),

    /// The call exceeded the configured per-call timeout.
    #[error("backend call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A non-fatal failure inside the image preprocessor.
///
/// The caller keeps the original crop for OCR when preprocessing fails;
/// the region is never silently dropped.
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// The input image has a zero dimension.
    #[error("empty image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// The perspective transform could not be constructed from the detected corners.
    #[error("degenerate quadrilateral: {0}")]
    DegenerateQuad(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_text_extracted_display() {
        let e = ScanFuseError::NoTextExtracted;
        assert!(e.to_string().contains("text extraction failed"));
    }

    #[test]
    fn engine_error_distinguishes_absence_kinds() {
        let missing = EngineError::NotAvailable("tesseract not found".into());
        let failed = EngineError::Failed("exit status 1".into());
        assert!(missing.to_string().contains("not available"));
        assert!(failed.to_string().contains("engine failed"));
    }

    #[test]
    fn backend_timeout_display() {
        let e = BackendError::Timeout { secs: 120 };
        assert!(e.to_string().contains("120s"));
    }
}
