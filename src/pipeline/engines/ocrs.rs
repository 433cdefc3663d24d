//! Pure-Rust OCR engine backed by the ocrs/rten crates.
//!
//! No external binaries; detection and recognition models are loaded from
//! disk. The model directory is taken from `SCANFUSE_OCRS_MODELS` and must
//! contain `text-detection.rten` and `text-recognition.rten` (the standard
//! ocrs model release). The engine is unavailable when the models are
//! missing; nothing is downloaded at runtime.

use crate::error::EngineError;
use crate::pipeline::ocr::{EngineOutput, OcrEngine};
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Model files required in the model directory.
const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Cached engine instance: model loading is expensive and `ocrs::OcrEngine`
/// methods take `&self`, so one process-wide instance suffices.
static OCR_ENGINE: OnceLock<ocrs::OcrEngine> = OnceLock::new();

/// Pure-Rust ocrs OCR engine.
pub struct OcrsEngine {
    model_dir: Option<PathBuf>,
}

impl OcrsEngine {
    pub fn new() -> Self {
        Self {
            model_dir: std::env::var_os("SCANFUSE_OCRS_MODELS").map(PathBuf::from),
        }
    }

    /// Explicit model directory, overriding the environment.
    pub fn with_model_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: Some(model_dir.into()),
        }
    }

    fn find_models(&self) -> Option<PathBuf> {
        let dir = self.model_dir.as_ref()?;
        let present =
            dir.join(DETECTION_MODEL).is_file() && dir.join(RECOGNITION_MODEL).is_file();
        present.then(|| dir.clone())
    }

    fn get_or_init_engine(&self) -> Result<&'static ocrs::OcrEngine, EngineError> {
        if let Some(engine) = OCR_ENGINE.get() {
            return Ok(engine);
        }

        let model_dir = self.find_models().ok_or_else(|| {
            EngineError::NotAvailable(format!(
                "ocrs models not found; set SCANFUSE_OCRS_MODELS to a directory \
                 containing {DETECTION_MODEL} and {RECOGNITION_MODEL}"
            ))
        })?;

        let detection_model = rten::Model::load_file(model_dir.join(DETECTION_MODEL))
            .map_err(|e| EngineError::Failed(format!("failed to load detection model: {e}")))?;
        let recognition_model = rten::Model::load_file(model_dir.join(RECOGNITION_MODEL))
            .map_err(|e| EngineError::Failed(format!("failed to load recognition model: {e}")))?;

        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| EngineError::Failed(format!("failed to create ocrs engine: {e}")))?;

        // If another thread won the init race its engine is just as good.
        let _ = OCR_ENGINE.set(engine);
        OCR_ENGINE
            .get()
            .ok_or_else(|| EngineError::Failed("failed to cache ocrs engine".to_string()))
    }
}

impl Default for OcrsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for OcrsEngine {
    fn name(&self) -> &str {
        "ocrs"
    }

    fn is_available(&self) -> bool {
        self.find_models().is_some()
    }

    fn recognize(&self, image: &DynamicImage) -> Result<EngineOutput, EngineError> {
        let engine = self.get_or_init_engine()?;

        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ocrs::ImageSource::from_bytes(rgb.as_raw(), (width, height))
            .map_err(|e| EngineError::Image(format!("failed to convert region: {e}")))?;

        let input = engine
            .prepare_input(source)
            .map_err(|e| EngineError::Failed(format!("failed to prepare input: {e}")))?;
        let text = engine
            .get_text(&input)
            .map_err(|e| EngineError::Failed(format!("failed to extract text: {e}")))?;

        Ok(EngineOutput { text, lines: None })
    }
}
