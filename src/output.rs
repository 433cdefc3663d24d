//! Output types: the structured record a run produces, plus run statistics.
//!
//! The terminal value of a run is [`ProcessOutput`], which carries the
//! [`DocumentRecord`] assembled by the analysis stages, the fused document
//! text the stages saw, per-page OCR detail, and counters for observability.
//! Nothing here is persisted by the library; the caller owns the record.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of one LLM analysis stage.
///
/// Serialises to the shapes downstream consumers expect:
/// a structured reply is emitted as its JSON object, a free-form reply as
/// `{"markdown_response": ...}`, and a failed stage as `{"error": ...}`.
/// A stage never produces anything outside these three shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageOutcome {
    /// The reply decoded into the expected field schema.
    Structured(Value),
    /// The reply could not be decoded; kept verbatim as lower-fidelity output.
    Markdown { markdown_response: String },
    /// The stage's backend call failed after retries; error marker recorded.
    Error { error: String },
}

impl StageOutcome {
    /// Free-form fallback wrapper.
    pub fn markdown(text: impl Into<String>) -> Self {
        StageOutcome::Markdown {
            markdown_response: text.into(),
        }
    }

    /// Error-tagged stage marker.
    pub fn error(detail: impl Into<String>) -> Self {
        StageOutcome::Error {
            error: detail.into(),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, StageOutcome::Structured(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StageOutcome::Error { .. })
    }

    /// The structured value, if this outcome has one.
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            StageOutcome::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Look up a string field on a structured outcome.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.as_structured()?.get(key)?.as_str()
    }
}

/// The structured record built across the analysis stages.
///
/// Assembled unconditionally: every stage failure is recorded inside its
/// field rather than aborting the record. `document_count` is `None` when
/// count estimation failed or produced nothing parseable.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    /// Estimated number of distinct documents in the scan, if determinable.
    pub document_count: Option<u64>,
    /// Classification + top-level fields from the truncated text.
    pub base_analysis: StageOutcome,
    /// Full-text extraction including type-specific discovered fields.
    pub detailed_analysis: StageOutcome,
}

impl DocumentRecord {
    /// The classified document type, when base analysis yielded one.
    pub fn document_type(&self) -> Option<&str> {
        self.base_analysis.str_field("document_type")
    }
}

/// OCR detail for one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Fused text for the page; `None` when no engine produced usable text.
    pub text: Option<String>,
    /// Raw per-engine page text, keyed by engine name. An engine that failed
    /// on every region of the page is absent from the map (absence, not
    /// empty string).
    pub engine_texts: BTreeMap<String, String>,
    /// Number of regions OCR'd on this page.
    pub regions: usize,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Pages in the input document.
    pub total_pages: usize,
    /// Pages that yielded fused text.
    pub pages_with_text: usize,
    /// Pages where every engine failed or found nothing.
    pub pages_without_text: usize,
    /// Total regions OCR'd across all pages.
    pub regions: usize,
    /// Engine invocations (regions × engines actually run).
    pub engine_calls: usize,
    /// Engine invocations that returned an error.
    pub engine_failures: usize,
    /// Wall-clock time spent splitting + preprocessing + OCR, in ms.
    pub ocr_duration_ms: u64,
    /// Wall-clock time spent in the analysis stages, in ms.
    pub analysis_duration_ms: u64,
    /// Total wall-clock time for the run, in ms.
    pub total_duration_ms: u64,
}

/// Everything a run returns to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    /// The assembled document record.
    pub record: DocumentRecord,
    /// All page fused texts joined in page order; what analysis saw.
    pub document_text: String,
    /// Per-page OCR detail.
    pub pages: Vec<PageText>,
    /// Run counters and timings.
    pub stats: RunStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_outcome_serialises_to_consumer_shapes() {
        let structured = StageOutcome::Structured(json!({"document_type": "invoice"}));
        let markdown = StageOutcome::markdown("free-form");
        let error = StageOutcome::error("authorization failed");

        assert_eq!(
            serde_json::to_value(&structured).unwrap(),
            json!({"document_type": "invoice"})
        );
        assert_eq!(
            serde_json::to_value(&markdown).unwrap(),
            json!({"markdown_response": "free-form"})
        );
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"error": "authorization failed"})
        );
    }

    #[test]
    fn document_type_reads_base_analysis() {
        let record = DocumentRecord {
            document_count: Some(1),
            base_analysis: StageOutcome::Structured(json!({"document_type": "contract"})),
            detailed_analysis: StageOutcome::markdown("n/a"),
        };
        assert_eq!(record.document_type(), Some("contract"));

        let degraded = DocumentRecord {
            document_count: None,
            base_analysis: StageOutcome::error("down"),
            detailed_analysis: StageOutcome::error("down"),
        };
        assert_eq!(degraded.document_type(), None);
    }
}
