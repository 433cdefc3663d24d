//! Prompt builders for the four analysis stages.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing how a stage asks its question
//!    requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without a
//!    live backend, making prompt regressions easy to catch.

/// Marker appended to document text that was cut for the base-analysis stage.
pub const TRUNCATION_MARKER: &str = "\n\n[text truncated due to length limits]";

/// Cut `text` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was removed.
///
/// Counts characters, not bytes, so multi-byte input never splits mid-glyph.
pub fn truncate_for_base(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// Stage 1: overall classification plus top-level fields.
pub fn base_analysis(truncated_text: &str) -> String {
    format!(
        "Analyze the following document text and determine its type. \
         Produce a JSON object with the fields: document_type, title, author, \
         date, summary, full_text, keywords.\n\n\
         Document text:\n{truncated_text}"
    )
}

/// Stage 2: typical field names for the classified type.
pub fn field_discovery(document_type: &str) -> String {
    format!(
        "For a document of type '{document_type}', list the typical \
         type-specific fields that should be extracted. Return the answer as \
         a JSON array, for example: \
         [\"invoice_number\", \"vendor\", \"total_amount\", \"date_of_issue\"]"
    )
}

/// Stage 3: detailed extraction over the full text plus discovered fields.
pub fn detailed_analysis(full_text: &str, document_type: &str, fields: &[String]) -> String {
    format!(
        "The document type is: {document_type}.\n\
         Based on the full text below, extract and fill the following fields:\n\
         \x20 - document_type\n\
         \x20 - title\n\
         \x20 - author\n\
         \x20 - date\n\
         \x20 - summary\n\
         \x20 - full_text\n\
         \x20 - keywords\n\
         Additionally extract these type-specific fields: {}\n\n\
         Document text:\n{full_text}",
        fields.join(", ")
    )
}

/// Stage 4: distinct-document count estimation.
pub fn count_estimation(full_text: &str) -> String {
    format!(
        "Based on the following text, estimate how many separate documents \
         are present in the scan. Return the answer as JSON, for example: \
         {{\"document_count\": 2}}\n\n\
         Document text:\n{full_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_appends_marker_only_when_cut() {
        let short = truncate_for_base("hello", 10);
        assert_eq!(short, "hello");

        let long = truncate_for_base(&"x".repeat(50), 10);
        assert!(long.starts_with("xxxxxxxxxx"));
        assert!(long.ends_with(TRUNCATION_MARKER));
        assert_eq!(long.chars().count(), 10 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let cyrillic = "привет мир привет мир";
        let cut = truncate_for_base(cyrillic, 6);
        assert!(cut.starts_with("привет"));
    }

    #[test]
    fn prompts_embed_their_inputs() {
        assert!(base_analysis("TEXT").contains("TEXT"));
        assert!(field_discovery("invoice").contains("'invoice'"));
        let detailed =
            detailed_analysis("BODY", "invoice", &["vendor".into(), "total".into()]);
        assert!(detailed.contains("vendor, total"));
        assert!(detailed.contains("BODY"));
        assert!(count_estimation("BODY").contains("document_count"));
    }
}
