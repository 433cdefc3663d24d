//! Staged LLM analysis: classification, field discovery, detailed
//! extraction, and document-count estimation.
//!
//! Stages run strictly in sequence and each may feed the next, but no stage
//! failure halts the pipeline: a failed stage degrades to an error-tagged
//! outcome (or an empty field list) and the orchestrator proceeds. A document
//! always yields a terminal [`DocumentRecord`], even if every stage failed.
//!
//! Each stage re-acquires its own backend session via
//! [`ChatBackend::session`] — the design does not assume a long-lived session
//! survives across stages, so a credential or network hiccup only costs the
//! stage that hit it.
//!
//! ## Retry strategy
//!
//! Transient send failures are retried with exponential backoff
//! (`retry_backoff_ms * 2^attempt`), the same shape the page pipeline uses
//! for flaky HTTP APIs. Authorization failures are not retried: a rejected
//! credential will not start working 500 ms later.

use crate::analysis::backend::ChatBackend;
use crate::analysis::parser::{self, Reply};
use crate::config::PipelineConfig;
use crate::error::BackendError;
use crate::output::{DocumentRecord, StageOutcome};
use crate::prompts;
use std::fmt;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// One discrete LLM call in the orchestration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BaseAnalysis,
    FieldDiscovery,
    DetailedAnalysis,
    CountEstimation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::BaseAnalysis => "base analysis",
            Stage::FieldDiscovery => "field discovery",
            Stage::DetailedAnalysis => "detailed analysis",
            Stage::CountEstimation => "count estimation",
        };
        f.write_str(name)
    }
}

/// Drives the four analysis stages against a chat backend.
pub struct AnalysisOrchestrator<'a> {
    backend: &'a dyn ChatBackend,
    config: &'a PipelineConfig,
}

impl<'a> AnalysisOrchestrator<'a> {
    pub fn new(backend: &'a dyn ChatBackend, config: &'a PipelineConfig) -> Self {
        Self { backend, config }
    }

    /// Run all stages over the fused document text and assemble the record.
    ///
    /// Never fails: stage errors are recorded inside the record.
    pub async fn run(&self, document_text: &str) -> DocumentRecord {
        info!(chars = document_text.len(), "starting document analysis");

        // ── Stage 1: base analysis over truncated text ───────────────────
        let truncated = prompts::truncate_for_base(document_text, self.config.max_base_chars);
        let base_analysis = self
            .stage_outcome(Stage::BaseAnalysis, &prompts::base_analysis(&truncated))
            .await;

        // ── Stage 2: field discovery conditioned on the classified type ──
        let document_type = base_analysis
            .str_field("document_type")
            .unwrap_or("unknown")
            .to_string();
        let fields = self.discover_fields(&document_type).await;

        // ── Stage 3: detailed extraction over the full text ──────────────
        let detailed_analysis = self
            .stage_outcome(
                Stage::DetailedAnalysis,
                &prompts::detailed_analysis(document_text, &document_type, &fields),
            )
            .await;

        // ── Stage 4: document-count estimation ───────────────────────────
        let document_count = self.estimate_count(document_text).await;

        info!(
            document_type = %document_type,
            document_count = ?document_count,
            "document analysis complete"
        );

        DocumentRecord {
            document_count,
            base_analysis,
            detailed_analysis,
        }
    }

    /// Send a prompt and convert the result into a [`StageOutcome`].
    async fn stage_outcome(&self, stage: Stage, prompt: &str) -> StageOutcome {
        match self.send(stage, prompt).await {
            Ok(raw) => match parser::parse(&raw) {
                Reply::Structured(value) => {
                    debug!(%stage, "reply decoded as structured JSON");
                    StageOutcome::Structured(value)
                }
                Reply::Markdown(text) => {
                    debug!(%stage, "reply kept as free-form markdown");
                    StageOutcome::markdown(text)
                }
            },
            Err(e) => {
                warn!(%stage, error = %e, "stage degraded to error marker");
                StageOutcome::error(format!("{stage} failed: {e}"))
            }
        }
    }

    /// Field discovery never blocks downstream stages: any failure or
    /// unparseable reply yields an empty list.
    async fn discover_fields(&self, document_type: &str) -> Vec<String> {
        match self
            .send(Stage::FieldDiscovery, &prompts::field_discovery(document_type))
            .await
        {
            Ok(raw) => {
                let fields = parser::parse_field_list(&raw);
                debug!(count = fields.len(), "discovered type-specific fields");
                fields
            }
            Err(e) => {
                warn!(error = %e, "field discovery failed; continuing with no extra fields");
                Vec::new()
            }
        }
    }

    /// Count estimation: structured `document_count` field first, then the
    /// first integer literal anywhere in the raw reply, else `None`.
    ///
    /// The regex fallback also covers structured replies without the field,
    /// e.g. a bare `3`, which still carry a usable count.
    async fn estimate_count(&self, document_text: &str) -> Option<u64> {
        let raw = match self
            .send(Stage::CountEstimation, &prompts::count_estimation(document_text))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "count estimation failed");
                return None;
            }
        };

        match parser::parse(&raw) {
            Reply::Structured(value) => value
                .get("document_count")
                .and_then(|v| {
                    v.as_u64()
                        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                })
                .or_else(|| parser::first_integer(&raw)),
            Reply::Markdown(text) => parser::first_integer(&text),
        }
    }

    /// One stage's send: fresh session per attempt, optional per-call
    /// timeout, exponential backoff on transient failures.
    async fn send(&self, stage: Stage, prompt: &str) -> Result<String, BackendError> {
        let mut last_err: Option<BackendError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    %stage,
                    attempt,
                    max = self.config.max_retries,
                    backoff_ms = backoff,
                    "retrying stage"
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.send_once(prompt).await {
                Ok(reply) => return Ok(reply),
                Err(e @ BackendError::Authorization(_)) => return Err(e),
                Err(e) => {
                    warn!(%stage, attempt, error = %e, "stage attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| BackendError::Api("no attempts made".into())))
    }

    async fn send_once(&self, prompt: &str) -> Result<String, BackendError> {
        let secs = self.config.llm_timeout_secs;
        let call = async {
            let session = self.backend.session().await?;
            session.send(prompt).await
        };

        if secs == 0 {
            call.await
        } else {
            timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| BackendError::Timeout { secs })?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::backend::ChatSession;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted backend: pops one canned reply per send, in stage order.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, String>>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
            }
        }
    }

    struct ScriptedSession {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn session(&self) -> Result<Box<dyn ChatSession>, BackendError> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err("script exhausted".to_string()));
            Ok(Box::new(ScriptedSession { reply }))
        }
    }

    #[async_trait]
    impl ChatSession for ScriptedSession {
        async fn send(&self, _prompt: &str) -> Result<String, BackendError> {
            self.reply
                .clone()
                .map_err(BackendError::Api)
        }
    }

    /// Backend whose session acquisition always fails with an auth error.
    struct DeadBackend;

    #[async_trait]
    impl ChatBackend for DeadBackend {
        async fn session(&self) -> Result<Box<dyn ChatSession>, BackendError> {
            Err(BackendError::Authorization("bad credentials".into()))
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig::builder()
            .max_retries(0)
            .retry_backoff_ms(1)
            .llm_timeout_secs(5)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn happy_path_assembles_full_record() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"document_type": "invoice", "title": "Invoice #123"}"#),
            Ok(r#"["invoice_number", "vendor"]"#),
            Ok(r#"{"document_type": "invoice", "invoice_number": "123"}"#),
            Ok(r#"{"document_count": 2}"#),
        ]);
        let config = test_config();
        let record = AnalysisOrchestrator::new(&backend, &config)
            .run("Invoice #123")
            .await;

        assert_eq!(record.document_type(), Some("invoice"));
        assert_eq!(record.document_count, Some(2));
        assert_eq!(
            record.detailed_analysis.str_field("invoice_number"),
            Some("123")
        );
    }

    #[tokio::test]
    async fn total_backend_failure_still_yields_record() {
        let backend = DeadBackend;
        let config = test_config();
        let record = AnalysisOrchestrator::new(&backend, &config)
            .run("some text")
            .await;

        assert_eq!(record.document_count, None);
        assert!(record.base_analysis.is_error());
        assert!(record.detailed_analysis.is_error());
    }

    #[tokio::test]
    async fn base_failure_degrades_type_to_unknown_and_continues() {
        let backend = ScriptedBackend::new(vec![
            Err("503 service unavailable"),
            Ok(r#"[]"#),
            Ok(r#"{"document_type": "unknown"}"#),
            Ok("maybe 4 documents?"),
        ]);
        let config = test_config();
        let record = AnalysisOrchestrator::new(&backend, &config)
            .run("text")
            .await;

        assert!(record.base_analysis.is_error());
        // Detailed analysis still ran and count fell back to the regex scan.
        assert!(record.detailed_analysis.is_structured());
        assert_eq!(record.document_count, Some(4));
    }

    #[tokio::test]
    async fn markdown_reply_is_not_an_error() {
        let backend = ScriptedBackend::new(vec![
            Ok("This looks like a letter, but I cannot produce JSON."),
            Ok(r#"[]"#),
            Ok("Still prose."),
            Ok("no numbers here"),
        ]);
        let config = test_config();
        let record = AnalysisOrchestrator::new(&backend, &config)
            .run("text")
            .await;

        assert!(matches!(
            record.base_analysis,
            StageOutcome::Markdown { .. }
        ));
        assert!(matches!(
            record.detailed_analysis,
            StageOutcome::Markdown { .. }
        ));
        assert_eq!(record.document_count, None);
    }

    #[tokio::test]
    async fn count_accepts_string_valued_field() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"document_type": "memo"}"#),
            Ok(r#"[]"#),
            Ok(r#"{"document_type": "memo"}"#),
            Ok(r#"{"document_count": "3"}"#),
        ]);
        let config = test_config();
        let record = AnalysisOrchestrator::new(&backend, &config)
            .run("text")
            .await;
        assert_eq!(record.document_count, Some(3));
    }

    #[tokio::test]
    async fn count_falls_back_to_bare_number_reply() {
        // A bare `3` decodes as JSON but carries no document_count field;
        // the integer scan over the raw reply still recovers the count.
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"document_type": "memo"}"#),
            Ok(r#"[]"#),
            Ok(r#"{"document_type": "memo"}"#),
            Ok("3"),
        ]);
        let config = test_config();
        let record = AnalysisOrchestrator::new(&backend, &config)
            .run("text")
            .await;
        assert_eq!(record.document_count, Some(3));
    }

    #[tokio::test]
    async fn count_object_without_field_falls_back_to_scan() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"{"document_type": "memo"}"#),
            Ok(r#"[]"#),
            Ok(r#"{"document_type": "memo"}"#),
            Ok(r#"{"count": 2, "note": "two receipts"}"#),
        ]);
        let config = test_config();
        let record = AnalysisOrchestrator::new(&backend, &config)
            .run("text")
            .await;
        assert_eq!(record.document_count, Some(2));
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let backend = ScriptedBackend::new(vec![
            Err("429 too many requests"),
            Ok(r#"{"document_type": "invoice"}"#),
            Ok(r#"[]"#),
            Ok(r#"{"document_type": "invoice"}"#),
            Ok(r#"{"document_count": 1}"#),
        ]);
        let config = PipelineConfig::builder()
            .max_retries(1)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let record = AnalysisOrchestrator::new(&backend, &config)
            .run("text")
            .await;
        assert!(record.base_analysis.is_structured());
    }
}
