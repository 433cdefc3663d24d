//! Configuration types for the scan-to-record pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across runs and to diff two runs to understand
//! why their outputs differ.
//!
//! OCR engines and the LLM chat backend are injected here as trait handles
//! owned by the run; there are no ambient globals. Leave them unset to have
//! [`crate::process`] resolve the host defaults (tesseract + Ollama from the
//! environment).

use crate::analysis::backend::ChatBackend;
use crate::error::ScanFuseError;
use crate::pipeline::ocr::OcrEngine;
use std::fmt;
use std::sync::Arc;

/// Configuration for one document-processing run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use scanfuse::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(300)
///     .language("eng")
///     .similarity_threshold(0.85)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rasterisation DPI for PDF pages. Range: 72–600. Default: 300.
    ///
    /// 300 DPI is the conventional OCR operating point; below ~200 small
    /// print starts losing glyph detail, above ~400 the engines gain nothing
    /// while memory use grows quadratically.
    pub dpi: u32,

    /// Maximum rendered page dimension (width or height) in pixels. Default: 4000.
    ///
    /// A safety cap independent of DPI: a 300-DPI render of an A0 poster
    /// would otherwise allocate hundreds of megapixels.
    pub max_rendered_pixels: u32,

    /// Run the geometric/photometric normalisation pass per region. Default: true.
    pub preprocess: bool,

    /// Segment each page into text-bearing regions before OCR. Default: true.
    ///
    /// When disabled each page is OCR'd as a single region.
    pub segment_regions: bool,

    /// Pixel epsilon by which detection boxes are expanded when testing for
    /// overlap during the greedy region merge. Default: 50.
    pub merge_epsilon_px: u32,

    /// Minimum region width and height in pixels; smaller merged boxes are
    /// discarded. Default: 10.
    pub min_region_px: u32,

    /// Similarity ratio at or above which two OCR candidates are treated as
    /// duplicates during fusion. Range: (0, 1]. Default: 0.85.
    pub similarity_threshold: f64,

    /// Human-readable marker inserted between disagreeing OCR variants in the
    /// fused text. Default: `--- OCR variant ---`.
    pub variant_marker: String,

    /// Tesseract language code(s), e.g. `"eng"` or `"rus+eng"`. Default: `"eng"`.
    pub language: String,

    /// OCR engines to run per region. Empty means "resolve host defaults"
    /// (tesseract when installed, plus ocrs when the `engine-ocrs` feature is
    /// enabled and its models are present).
    pub engines: Vec<Arc<dyn OcrEngine>>,

    /// Pre-constructed chat backend for the analysis stages. If `None`, an
    /// Ollama backend is built from `backend_endpoint`/`model` and the
    /// environment.
    pub backend: Option<Arc<dyn ChatBackend>>,

    /// Chat backend endpoint. If `None`, `OLLAMA_HOST` or
    /// `http://localhost:11434`.
    pub backend_endpoint: Option<String>,

    /// Chat model identifier. If `None`, `SCANFUSE_MODEL` or the backend default.
    pub model: Option<String>,

    /// Sampling temperature for analysis prompts. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to the extracted text, which
    /// is what classification and field extraction want.
    pub temperature: f32,

    /// Maximum tokens the backend may generate per stage reply. Default: 2048.
    pub max_reply_tokens: u32,

    /// Maximum characters of document text sent to the base-analysis stage.
    /// Longer text is cut and a truncation marker appended. Default: 2000.
    pub max_base_chars: usize,

    /// Retry attempts per analysis stage on a transient backend failure.
    /// Default: 2. Authorization failures are not retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-backend-call timeout in seconds; `0` disables the timeout.
    /// Default: 120.
    ///
    /// The upstream design imposed no timeout, so a hung backend blocked the
    /// whole document. This cap is the hardening knob for that.
    pub llm_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            preprocess: true,
            segment_regions: true,
            merge_epsilon_px: 50,
            min_region_px: 10,
            similarity_threshold: 0.85,
            variant_marker: "--- OCR variant ---".to_string(),
            language: "eng".to_string(),
            engines: Vec::new(),
            backend: None,
            backend_endpoint: None,
            model: None,
            temperature: 0.1,
            max_reply_tokens: 2048,
            max_base_chars: 2000,
            max_retries: 2,
            retry_backoff_ms: 500,
            llm_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("preprocess", &self.preprocess)
            .field("segment_regions", &self.segment_regions)
            .field("merge_epsilon_px", &self.merge_epsilon_px)
            .field("min_region_px", &self.min_region_px)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("language", &self.language)
            .field(
                "engines",
                &self
                    .engines
                    .iter()
                    .map(|e| e.name().to_string())
                    .collect::<Vec<_>>(),
            )
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ChatBackend>"))
            .field("backend_endpoint", &self.backend_endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_base_chars", &self.max_base_chars)
            .field("max_retries", &self.max_retries)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn preprocess(mut self, v: bool) -> Self {
        self.config.preprocess = v;
        self
    }

    pub fn segment_regions(mut self, v: bool) -> Self {
        self.config.segment_regions = v;
        self
    }

    pub fn merge_epsilon_px(mut self, px: u32) -> Self {
        self.config.merge_epsilon_px = px;
        self
    }

    pub fn min_region_px(mut self, px: u32) -> Self {
        self.config.min_region_px = px;
        self
    }

    pub fn similarity_threshold(mut self, ratio: f64) -> Self {
        self.config.similarity_threshold = ratio;
        self
    }

    pub fn variant_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.variant_marker = marker.into();
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn engines(mut self, engines: Vec<Arc<dyn OcrEngine>>) -> Self {
        self.config.engines = engines;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.engines.push(engine);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn backend_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.backend_endpoint = Some(endpoint.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_reply_tokens(mut self, n: u32) -> Self {
        self.config.max_reply_tokens = n;
        self
    }

    pub fn max_base_chars(mut self, n: usize) -> Self {
        self.config.max_base_chars = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ScanFuseError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ScanFuseError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !(c.similarity_threshold > 0.0 && c.similarity_threshold <= 1.0) {
            return Err(ScanFuseError::InvalidConfig(format!(
                "similarity threshold must be in (0, 1], got {}",
                c.similarity_threshold
            )));
        }
        if c.min_region_px == 0 {
            return Err(ScanFuseError::InvalidConfig(
                "minimum region size must be ≥ 1 px".into(),
            ));
        }
        Ok(self.config)
    }
}
