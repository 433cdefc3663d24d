//! Shipped OCR engines.
//!
//! - [`tesseract`] — system tesseract binary via subprocess (default)
//! - [`ocrs`] — pure-Rust ocrs/rten engine (feature `engine-ocrs`)
//!
//! Both implement [`crate::pipeline::ocr::OcrEngine`]; callers may inject any
//! additional implementation through `PipelineConfig`.

pub mod tesseract;

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;
