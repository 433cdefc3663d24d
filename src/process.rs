//! Top-level orchestration: one call from input to [`ProcessOutput`].
//!
//! The run is strictly sequential: pages in order, regions in order, engines
//! in registry order, analysis stages in order. Parallelism is deliberately
//! absent; OCR subprocesses and pdfium already saturate a core, and ordered
//! output makes runs reproducible. CPU-bound page work happens inside
//! `spawn_blocking` so callers can drive this from an async context without
//! stalling the runtime.
//!
//! Failure severity is graded, not uniform:
//! * unusable input, zero engines, zero extracted text — fatal `Err`;
//! * one engine failing on one region — recorded, other engines still run;
//! * one analysis stage failing — error-tagged in the record, next stage runs.

use crate::analysis::backend::{ChatBackend, OllamaBackend};
use crate::analysis::orchestrator::AnalysisOrchestrator;
use crate::config::PipelineConfig;
use crate::error::ScanFuseError;
use crate::output::{PageText, ProcessOutput, RunStats};
use crate::pipeline::input::{resolve_input, InputSource};
use crate::pipeline::ocr::{default_engines, run_engines, OcrEngine};
use crate::pipeline::{fusion, preprocess, segment, split};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process one document end to end: split, segment, OCR, fuse, analyse.
pub async fn process(
    source: InputSource,
    config: &PipelineConfig,
) -> Result<ProcessOutput, ScanFuseError> {
    let run_start = Instant::now();

    let input = resolve_input(source)?;
    let engines = resolve_engines(config)?;
    info!(
        engines = ?engines.iter().map(|e| e.name()).collect::<Vec<_>>(),
        kind = ?input.kind(),
        "starting run"
    );

    // ── OCR phase ────────────────────────────────────────────────────────
    let ocr_start = Instant::now();
    let pages = split::split_pages(&input, config).await?;

    let mut stats = RunStats {
        total_pages: pages.len(),
        ..RunStats::default()
    };
    let mut page_texts: Vec<PageText> = Vec::with_capacity(pages.len());

    for page in pages {
        let engines = engines.clone();
        let config = config.clone();
        let index = page.index;
        let ocr = tokio::task::spawn_blocking(move || ocr_page(index, page.image, &engines, &config))
            .await
            .map_err(|e| ScanFuseError::Internal(format!("OCR task panicked: {e}")))?;

        stats.regions += ocr.page.regions;
        stats.engine_calls += ocr.engine_calls;
        stats.engine_failures += ocr.engine_failures;
        if ocr.page.text.is_some() {
            stats.pages_with_text += 1;
        } else {
            stats.pages_without_text += 1;
            warn!(page = ocr.page.page_num, "no usable text on page");
        }
        page_texts.push(ocr.page);
    }
    stats.ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

    let document_text = page_texts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join(" ");
    if document_text.trim().is_empty() {
        return Err(ScanFuseError::NoTextExtracted);
    }

    // ── Analysis phase ───────────────────────────────────────────────────
    let analysis_start = Instant::now();
    let backend = resolve_backend(config)?;
    let record = AnalysisOrchestrator::new(backend.as_ref(), config)
        .run(&document_text)
        .await;
    stats.analysis_duration_ms = analysis_start.elapsed().as_millis() as u64;
    stats.total_duration_ms = run_start.elapsed().as_millis() as u64;

    info!(
        pages = stats.total_pages,
        regions = stats.regions,
        total_ms = stats.total_duration_ms,
        "run complete"
    );

    Ok(ProcessOutput {
        record,
        document_text,
        pages: page_texts,
        stats,
    })
}

/// Process an in-memory PDF or image buffer.
pub async fn process_bytes(
    bytes: Vec<u8>,
    config: &PipelineConfig,
) -> Result<ProcessOutput, ScanFuseError> {
    process(InputSource::InMemoryBytes(bytes), config).await
}

/// Blocking wrapper for callers without a Tokio runtime.
pub fn process_sync(
    source: InputSource,
    config: &PipelineConfig,
) -> Result<ProcessOutput, ScanFuseError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| ScanFuseError::Internal(format!("failed to start runtime: {e}")))?;
    runtime.block_on(process(source, config))
}

fn resolve_engines(config: &PipelineConfig) -> Result<Vec<Arc<dyn OcrEngine>>, ScanFuseError> {
    let engines = if config.engines.is_empty() {
        default_engines(&config.language)
    } else {
        config.engines.clone()
    };
    if engines.is_empty() {
        return Err(ScanFuseError::NoEnginesAvailable);
    }
    Ok(engines)
}

fn resolve_backend(config: &PipelineConfig) -> Result<Arc<dyn ChatBackend>, ScanFuseError> {
    match &config.backend {
        Some(backend) => Ok(backend.clone()),
        None => {
            let backend = OllamaBackend::from_env(
                config.backend_endpoint.as_deref(),
                config.model.as_deref(),
                config.temperature,
                config.max_reply_tokens,
            )
            .map_err(|e| ScanFuseError::Internal(format!("failed to build chat backend: {e}")))?;
            Ok(Arc::new(backend))
        }
    }
}

struct PageOcr {
    page: PageText,
    engine_calls: usize,
    engine_failures: usize,
}

/// Blocking per-page work: segment, preprocess, OCR every region, fuse.
fn ocr_page(
    index: usize,
    image: DynamicImage,
    engines: &[Arc<dyn OcrEngine>],
    config: &PipelineConfig,
) -> PageOcr {
    let regions = if config.segment_regions {
        segment::segment(&image, config.merge_epsilon_px, config.min_region_px)
    } else {
        vec![image]
    };
    debug!(page = index + 1, regions = regions.len(), "OCR'ing page");

    // Per-engine text fragments across the page's regions, in engine order.
    let mut fragments: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut engine_calls = 0usize;
    let mut engine_failures = 0usize;

    for region in &regions {
        let prepared = if config.preprocess {
            match preprocess::preprocess(region) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    // Keep the raw crop; a region is never dropped over a
                    // failed cleanup.
                    warn!(page = index + 1, error = %e, "preprocess failed; using original crop");
                    region.clone()
                }
            }
        } else {
            region.clone()
        };

        for run in run_engines(&prepared, engines) {
            engine_calls += 1;
            match run.outcome {
                Ok(output) => {
                    let entry = fragments
                        .entry(engine_name(engines, &run.engine))
                        .or_default();
                    entry.push(output.text);
                }
                Err(_) => engine_failures += 1,
            }
        }
    }

    // Engine order, not map order, so fusion sees candidates by registry
    // priority. An engine that failed on every region stays absent.
    let mut engine_texts: BTreeMap<String, String> = BTreeMap::new();
    let mut candidates: Vec<String> = Vec::new();
    for engine in engines {
        if let Some(parts) = fragments.get(engine.name()) {
            let text = parts.join("\n");
            candidates.push(text.clone());
            engine_texts.insert(engine.name().to_string(), text);
        }
    }

    let fused = fusion::fuse(
        &candidates,
        config.similarity_threshold,
        &config.variant_marker,
    );

    PageOcr {
        page: PageText {
            page_num: index + 1,
            text: fused,
            engine_texts,
            regions: regions.len(),
        },
        engine_calls,
        engine_failures,
    }
}

/// Borrow the registry's copy of an engine name so the fragment map can key
/// on `&str` without cloning per region.
fn engine_name<'a>(engines: &'a [Arc<dyn OcrEngine>], name: &str) -> &'a str {
    engines
        .iter()
        .map(|e| e.name())
        .find(|n| *n == name)
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pipeline::ocr::EngineOutput;

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
            Err(EngineError::Failed("boom".into()))
        }
    }

    fn png_bytes() -> Vec<u8> {
        let mut png = Vec::new();
        DynamicImage::new_rgb8(64, 64)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    #[tokio::test]
    async fn silent_engines_mean_no_text_extracted() {
        let config = PipelineConfig::builder()
            .engine(Arc::new(FixedEngine {
                name: "silent",
                text: "",
            }))
            .build()
            .unwrap();
        let err = process_bytes(png_bytes(), &config).await.unwrap_err();
        assert!(matches!(err, ScanFuseError::NoTextExtracted));
    }

    #[tokio::test]
    async fn all_engines_failing_means_no_text_extracted() {
        let config = PipelineConfig::builder()
            .engine(Arc::new(BrokenEngine))
            .build()
            .unwrap();
        let err = process_bytes(png_bytes(), &config).await.unwrap_err();
        assert!(matches!(err, ScanFuseError::NoTextExtracted));
    }

    #[test]
    fn failed_engine_is_absent_from_page_map() {
        let engines: Vec<Arc<dyn OcrEngine>> = vec![
            Arc::new(BrokenEngine),
            Arc::new(FixedEngine {
                name: "fixed",
                text: "hello",
            }),
        ];
        let config = PipelineConfig::builder().preprocess(false).build().unwrap();
        let ocr = ocr_page(0, DynamicImage::new_rgb8(64, 64), &engines, &config);

        assert!(!ocr.page.engine_texts.contains_key("broken"));
        assert_eq!(ocr.page.engine_texts.get("fixed").map(String::as_str), Some("hello"));
        assert_eq!(ocr.page.text.as_deref(), Some("hello"));
        assert_eq!(ocr.engine_failures, 1);
    }

    #[test]
    fn segmentation_disabled_means_one_region() {
        let engines: Vec<Arc<dyn OcrEngine>> = vec![Arc::new(FixedEngine {
            name: "fixed",
            text: "x",
        })];
        let config = PipelineConfig::builder()
            .segment_regions(false)
            .preprocess(false)
            .build()
            .unwrap();
        let ocr = ocr_page(3, DynamicImage::new_rgb8(64, 64), &engines, &config);
        assert_eq!(ocr.page.regions, 1);
        assert_eq!(ocr.page.page_num, 4);
    }
}
