//! Pipeline stages for OCR text extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. add an OCR engine) without touching other
//! stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ segment ──▶ preprocess ──▶ ocr ──▶ fusion
//! (path/bytes) (pdfium)  (regions)   (per region)  (engines) (per page)
//! ```
//!
//! 1. [`input`]      — normalise a path or byte buffer to a local file with
//!    a sniffed kind (PDF or image)
//! 2. [`split`]      — rasterise PDF pages or decode the single image; runs
//!    in `spawn_blocking` because pdfium is not async-safe
//! 3. [`segment`]    — connected-component region detection with a greedy
//!    merge pass; never returns an empty region set
//! 4. [`preprocess`] — deterministic per-region cleanup (deskew, contrast,
//!    denoise, sharpen, binarize); failures fall back to the original crop
//! 5. [`ocr`]        — run every configured engine over each region,
//!    isolating per-engine failures ([`engines`] holds the shipped ones)
//! 6. [`fusion`]     — collapse near-duplicate engine texts per page and
//!    surface genuine disagreements behind a variant marker

pub mod engines;
pub mod fusion;
pub mod input;
pub mod ocr;
pub mod preprocess;
pub mod segment;
pub mod split;
