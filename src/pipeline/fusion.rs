//! Result fusion: merge several engines' text for one page into one string.
//!
//! Fusion deliberately does NOT attempt character-level reconciliation.
//! Near-identical candidates (similarity ≥ threshold) are duplicates and only
//! the longest survives; genuinely different candidates are all kept and
//! surfaced behind a visible variant marker, so downstream analysis can
//! reconcile the disagreement with context instead of this module silently
//! picking one truth.

use strsim::normalized_levenshtein;
use tracing::debug;

/// Merge OCR candidates for one page.
///
/// * blank/whitespace candidates are dropped; none left ⇒ `None`
///   ("no text extracted" for the page);
/// * a single survivor is returned verbatim;
/// * otherwise candidates are deduplicated greedily in input order: a
///   candidate is kept only if its similarity to every already-kept
///   candidate is below `threshold` (first seen wins ties);
/// * the output is the longest kept candidate, followed by each other kept
///   candidate separated by `marker`.
pub fn fuse(candidates: &[String], threshold: f64, marker: &str) -> Option<String> {
    let texts: Vec<&str> = candidates
        .iter()
        .map(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
        .collect();

    if texts.is_empty() {
        return None;
    }
    if texts.len() == 1 {
        return Some(texts[0].to_string());
    }

    // Greedy dedup, input order. Order dependence is intentional: the first
    // spelling of a near-duplicate pair is the one later candidates are
    // compared against.
    let mut unique: Vec<&str> = Vec::new();
    for &t in &texts {
        if unique
            .iter()
            .all(|u| normalized_levenshtein(t, u) < threshold)
        {
            unique.push(t);
        }
    }

    let best = unique
        .iter()
        .copied()
        .max_by_key(|t| t.len())
        .unwrap_or(texts[0]);

    debug!(
        candidates = texts.len(),
        unique = unique.len(),
        "fused page text"
    );

    let mut merged = best.to_string();
    for other in &unique {
        if *other != best {
            merged.push_str("\n\n");
            merged.push_str(marker);
            merged.push_str("\n\n");
            merged.push_str(other);
        }
    }

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "--- OCR variant ---";

    fn fuse_default(candidates: &[&str]) -> Option<String> {
        let owned: Vec<String> = candidates.iter().map(|s| s.to_string()).collect();
        fuse(&owned, 0.85, MARKER)
    }

    #[test]
    fn idempotent_on_single_candidate() {
        assert_eq!(
            fuse_default(&["Invoice #123"]),
            Some("Invoice #123".to_string())
        );
    }

    #[test]
    fn empty_and_blank_inputs_are_absent() {
        assert_eq!(fuse_default(&[]), None);
        assert_eq!(fuse_default(&["", "  "]), None);
        assert_eq!(fuse_default(&["", "\n\t", "   "]), None);
    }

    #[test]
    fn near_duplicates_keep_exactly_one() {
        // One character differs out of twelve: similarity ≈ 0.92.
        let fused = fuse_default(&["Invoice #123", "lnvoice #123"]).unwrap();
        assert_eq!(fused, "Invoice #123");
        assert!(!fused.contains(MARKER));
    }

    #[test]
    fn first_seen_near_duplicate_wins_even_when_shorter() {
        // Greedy dedup keeps the first spelling; a longer near-duplicate
        // arriving later is dropped, not substituted.
        let short = "Invoice #123 issued on 2024-01-01 by ACME Cor";
        let long = "Invoice #123 issued on 2024-01-01 by ACME Corp";
        let fused = fuse_default(&[short, long]).unwrap();
        assert_eq!(fused, short);

        // In the opposite order the longer one is first seen and survives.
        let fused = fuse_default(&[long, short]).unwrap();
        assert_eq!(fused, long);
    }

    #[test]
    fn dissimilar_candidates_are_both_preserved() {
        let a = "A completely different text about apples.";
        let b = "Numbers: 9934-2231, ref QX.";
        let fused = fuse_default(&[a, b]).unwrap();
        assert!(fused.contains(a));
        assert!(fused.contains(b));
        assert!(fused.contains(MARKER));
        // Longest candidate comes first.
        assert!(fused.starts_with(a));
    }

    #[test]
    fn blanks_mixed_with_one_real_text_return_it_verbatim() {
        let fused = fuse_default(&["", "Invoice #123", "  "]).unwrap();
        assert_eq!(fused, "Invoice #123");
    }

    #[test]
    fn first_seen_wins_ties_among_duplicates() {
        // Equal length near-duplicates: the kept one is the first seen.
        let fused = fuse_default(&["lnvoice #123", "Invoice #123"]).unwrap();
        assert_eq!(fused, "lnvoice #123");
    }

    #[test]
    fn three_way_mix_dedups_only_the_similar_pair() {
        let a = "Invoice #123 from ACME";
        let b = "lnvoice #123 from ACME"; // near-duplicate of a
        let c = "Totally unrelated shipping manifest";
        let fused = fuse_default(&[a, b, c]).unwrap();
        assert!(fused.contains(a));
        assert!(!fused.contains(b));
        assert!(fused.contains(c));
        assert_eq!(fused.matches(MARKER).count(), 1);
    }
}
