//! Multi-engine OCR: the engine trait and the isolated per-region runner.
//!
//! Engines are explicitly constructed, dependency-injected handles owned by
//! the pipeline run — never ambient globals. Each engine is invoked
//! independently and its failure is captured as the `Err` side of its run,
//! so "engine ran and found nothing" (empty text) stays distinguishable from
//! "engine failed" (error), and one engine can never abort the region or its
//! peers.

use crate::error::EngineError;
use image::DynamicImage;
use tracing::{debug, warn};

/// One OCR engine's reading of one region.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// Raw extracted text, possibly empty (an empty page is a valid reading).
    pub text: String,
    /// Per-line text with confidence in [0, 1], when available.
    pub lines: Option<Vec<LineText>>,
}

/// One recognised line.
#[derive(Debug, Clone)]
pub struct LineText {
    pub text: String,
    /// Confidence in [0, 1]. When the engine provides none this is the
    /// length heuristic `min(len/80, 1.0)` — a documented placeholder, not a
    /// measured model confidence.
    pub confidence: f32,
}

/// An opaque text producer for one image region.
///
/// Implementations must be cheap to share (`Arc`) and safe to call from a
/// blocking thread; all shipped engines are synchronous subprocess or
/// in-process calls.
pub trait OcrEngine: Send + Sync {
    /// Stable engine name used as the key in per-page engine text maps.
    fn name(&self) -> &str;

    /// Whether the engine can run on this host (binary installed, models
    /// present). Unavailable engines are skipped at registry resolution.
    fn is_available(&self) -> bool {
        true
    }

    /// Recognise text in one region image.
    fn recognize(&self, image: &DynamicImage) -> Result<EngineOutput, EngineError>;
}

/// Result of running one engine on one region.
pub struct EngineRun {
    pub engine: String,
    pub outcome: Result<EngineOutput, EngineError>,
}

/// Run every engine over one region, isolating failures.
///
/// Engines run in registry order; an erroring engine yields an `Err` entry
/// and the remaining engines still run. Successful outputs with no per-line
/// data get the length-heuristic confidences filled in.
pub fn run_engines(image: &DynamicImage, engines: &[std::sync::Arc<dyn OcrEngine>]) -> Vec<EngineRun> {
    engines
        .iter()
        .map(|engine| {
            let outcome = match engine.recognize(image) {
                Ok(mut output) => {
                    if output.lines.is_none() && !output.text.trim().is_empty() {
                        output.lines = Some(synthetic_line_confidences(&output.text));
                    }
                    debug!(
                        engine = engine.name(),
                        chars = output.text.len(),
                        "engine produced text"
                    );
                    Ok(output)
                }
                Err(e) => {
                    warn!(engine = engine.name(), error = %e, "engine failed on region");
                    Err(e)
                }
            };
            EngineRun {
                engine: engine.name().to_string(),
                outcome,
            }
        })
        .collect()
}

/// Synthesize per-line confidences proportional to line length, capped at 1.
///
/// Placeholder heuristic: longer recognised lines are less likely to be
/// noise. Consumers must not treat these values as model confidences.
pub fn synthetic_line_confidences(text: &str) -> Vec<LineText> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| LineText {
            text: line.to_string(),
            confidence: (line.chars().count() as f32 / 80.0).min(1.0),
        })
        .collect()
}

/// Resolve the default engine set for this host.
///
/// Tesseract when installed; the pure-Rust ocrs engine when the
/// `engine-ocrs` feature is enabled and its models are found. The list may
/// be empty — the caller turns that into a fatal configuration error.
pub fn default_engines(language: &str) -> Vec<std::sync::Arc<dyn OcrEngine>> {
    let mut engines: Vec<std::sync::Arc<dyn OcrEngine>> = Vec::new();

    let tesseract = super::engines::tesseract::TesseractEngine::new(language);
    if tesseract.is_available() {
        engines.push(std::sync::Arc::new(tesseract));
    }

    #[cfg(feature = "engine-ocrs")]
    {
        let ocrs = super::engines::ocrs::OcrsEngine::new();
        if ocrs.is_available() {
            engines.push(std::sync::Arc::new(ocrs));
        }
    }

    engines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedEngine {
        name: &'static str,
        text: &'static str,
    }

    impl OcrEngine for FixedEngine {
        fn name(&self) -> &str {
            self.name
        }
        fn recognize(&self, _image: &DynamicImage) -> Result<EngineOutput, EngineError> {
            Ok(EngineOutput {
                text: self.text.to_string(),
                lines: None,
            })
        }
    }

    struct BrokenEngine;

    impl OcrEngine for BrokenEngine {
        fn name(&self) -> &str {
            "broken"
        }
        fn recognize(&self, _image: &DynamicImage) -> Result<EngineOutput, EngineError> {
            Err(EngineError::Failed("simulated crash".into()))
        }
    }

    fn blank_image() -> DynamicImage {
        DynamicImage::new_rgb8(32, 32)
    }

    #[test]
    fn failures_are_isolated_per_engine() {
        let engines: Vec<Arc<dyn OcrEngine>> = vec![
            Arc::new(BrokenEngine),
            Arc::new(FixedEngine {
                name: "fixed",
                text: "hello",
            }),
        ];
        let runs = run_engines(&blank_image(), &engines);
        assert_eq!(runs.len(), 2);
        assert!(runs[0].outcome.is_err());
        assert_eq!(runs[1].outcome.as_ref().unwrap().text, "hello");
    }

    #[test]
    fn empty_text_is_present_not_absent() {
        let engines: Vec<Arc<dyn OcrEngine>> = vec![Arc::new(FixedEngine {
            name: "fixed",
            text: "",
        })];
        let runs = run_engines(&blank_image(), &engines);
        // Ran and found nothing: Ok with empty text, not Err.
        let output = runs[0].outcome.as_ref().unwrap();
        assert!(output.text.is_empty());
    }

    #[test]
    fn heuristic_confidence_scales_with_length_and_caps() {
        let lines = synthetic_line_confidences("short\n");
        assert_eq!(lines.len(), 1);
        assert!((lines[0].confidence - 5.0 / 80.0).abs() < 1e-6);

        let long = "x".repeat(200);
        let lines = synthetic_line_confidences(&long);
        assert_eq!(lines[0].confidence, 1.0);
    }

    #[test]
    fn heuristic_fills_missing_lines_only() {
        let engines: Vec<Arc<dyn OcrEngine>> = vec![Arc::new(FixedEngine {
            name: "fixed",
            text: "line one\nline two",
        })];
        let runs = run_engines(&blank_image(), &engines);
        let output = runs[0].outcome.as_ref().unwrap();
        let lines = output.lines.as_ref().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.confidence > 0.0 && l.confidence <= 1.0));
    }
}
