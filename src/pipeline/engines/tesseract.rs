//! Tesseract OCR engine via the system binary.
//!
//! The region image is written to a temp PNG and fed to `tesseract <img>
//! stdout`. Tesseract is the traditional, widely available option and the
//! default engine on hosts that have it installed.

use crate::error::EngineError;
use crate::pipeline::ocr::{EngineOutput, OcrEngine};
use image::DynamicImage;
use std::process::Command;
use tempfile::TempDir;

/// Tesseract system-binary OCR engine.
pub struct TesseractEngine {
    language: String,
}

impl TesseractEngine {
    /// Create an engine for the given tesseract language code(s),
    /// e.g. `"eng"` or `"rus+eng"`.
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    fn run_tesseract(&self, image_path: &std::path::Path) -> Result<String, EngineError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(EngineError::Failed(format!("tesseract failed: {stderr}")))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::NotAvailable(
                "tesseract not found (install tesseract-ocr)".to_string(),
            )),
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        which::which("tesseract").is_ok()
    }

    fn recognize(&self, image: &DynamicImage) -> Result<EngineOutput, EngineError> {
        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join("region.png");
        image
            .save(&image_path)
            .map_err(|e| EngineError::Image(format!("failed to write region image: {e}")))?;

        let text = self.run_tesseract(&image_path)?;

        // Line confidences are filled by the runner's length heuristic;
        // tesseract's TSV confidences are not parsed here.
        Ok(EngineOutput { text, lines: None })
    }
}
