//! Token Estimation and Chunking
//!
//! Approximate token counting for budget arithmetic, model limit lookups,
//! and paragraph-aligned splitting of oversized documents.
//!
//! ## Strategy
//! - Estimation is a heuristic (`ceil(chars / 4)` by default), not a tokenizer
//! - Estimators are pluggable so a precise tokenizer can replace the heuristic
//!   without touching the budget-capping arithmetic
//! - Chunks never cut through a paragraph; concatenating them reproduces the input

use crate::ai::catalog::ModelCatalog;
use crate::constants::budget::CHARS_PER_TOKEN;

// =============================================================================
// Estimators
// =============================================================================

/// Pre-call token estimator
pub trait TokenEstimator: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &'static str;

    /// Estimated token count of `text`
    fn estimate(&self, text: &str) -> usize;
}

/// Character-based estimation (4 chars = 1 token)
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl TokenEstimator for CharEstimator {
    fn name(&self) -> &'static str {
        "chars"
    }

    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// Word-based estimation (0.75 tokens per word on average, plus one)
///
/// Tends to undercount dense text such as code or CJK scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordEstimator;

impl TokenEstimator for WordEstimator {
    fn name(&self) -> &'static str {
        "words"
    }

    fn estimate(&self, text: &str) -> usize {
        if text.trim().is_empty() {
            return 0;
        }
        let words = text.split_whitespace().count();
        (words as f32 * 0.75).ceil() as usize + 1
    }
}

/// Estimate tokens with the default heuristic
pub fn estimate_tokens(text: &str) -> usize {
    CharEstimator.estimate(text)
}

/// Context window of a model from the built-in catalog
pub fn max_context_tokens(model_id: &str) -> usize {
    ModelCatalog::shared_builtin().context_limit(model_id)
}

/// Output limit of a model from the built-in catalog
pub fn max_output_tokens(model_id: &str) -> usize {
    ModelCatalog::shared_builtin().output_limit(model_id)
}

// =============================================================================
// Chunking
// =============================================================================

/// Split `text` into paragraph-aligned chunks of at most `chunk_char_limit` characters
///
/// Paragraphs are separated by blank lines; each blank-line gap stays with the
/// paragraph before it. A single paragraph longer than the limit becomes its own
/// oversized chunk. Text that already fits is returned as one chunk.
pub fn split_into_chunks(text: &str, chunk_char_limit: usize) -> Vec<String> {
    if text.chars().count() <= chunk_char_limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in paragraphs(text) {
        let len = paragraph.chars().count();
        if current_len > 0 && current_len + len > chunk_char_limit {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(paragraph);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Paragraph slices of `text`, each including its trailing blank lines
fn paragraphs(text: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    let mut has_content = false;
    let mut after_blank = false;

    for line in text.split_inclusive('\n') {
        let blank = line.trim().is_empty();
        if !blank && has_content && after_blank {
            result.push(&text[start..offset]);
            start = offset;
            has_content = false;
        }
        if blank {
            after_blank = true;
        } else {
            has_content = true;
            after_blank = false;
        }
        offset += line.len();
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_char_estimation() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("hi"), 1);
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens("hello world"), 3);
        // Multi-byte characters count once
        assert_eq!(estimate_tokens("日本語の"), 1);
    }

    #[test]
    fn test_word_estimation() {
        let estimator = WordEstimator;
        assert_eq!(estimator.estimate("   "), 0);
        assert_eq!(estimator.estimate("one two three four"), 4);
        assert_eq!(estimator.name(), "words");
    }

    #[test]
    fn test_model_limits() {
        assert_eq!(max_context_tokens("gpt-4o-mini"), 128_000);
        assert_eq!(max_output_tokens("gpt-4o-mini"), 16_384);
        assert_eq!(max_context_tokens("unheard-of"), 8_192);
        assert_eq!(max_output_tokens("unheard-of"), 2_048);
    }

    #[test]
    fn test_fitting_text_is_single_chunk() {
        let text = "alpha\n\nbeta\n\ngamma";
        assert_eq!(split_into_chunks(text, 1_000), vec![text.to_string()]);
        assert_eq!(split_into_chunks("", 10), vec![String::new()]);
    }

    #[test]
    fn test_paragraphs_keep_trailing_gap() {
        let text = "\n\nfirst line\nstill first\n\n\nsecond\n\nthird";
        let parts = paragraphs(text);
        assert_eq!(
            parts,
            vec!["\n\nfirst line\nstill first\n\n\n", "second\n\n", "third"]
        );
    }

    #[test]
    fn test_greedy_accumulation() {
        let para = "x".repeat(30);
        let text = format!("{para}\n\n{para}\n\n{para}\n\n{para}");
        let chunks = split_into_chunks(&text, 70);

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 70));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_oversized_paragraph_stays_whole() {
        let big = "y".repeat(200);
        let text = format!("short\n\n{big}\n\ntail");
        let chunks = split_into_chunks(&text, 50);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], format!("{big}\n\n"));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_document_split_into_three_chunks() {
        // 120,000 characters of ~1,000-character paragraphs
        let para = format!("{}\n\n", "z".repeat(998));
        let text = para.repeat(120);
        assert_eq!(text.len(), 120_000);

        let chunks = split_into_chunks(&text, 40_000);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 40_000));
    }

    fn paragraph_text() -> impl Strategy<Value = String> {
        let para = "[a-z .]{1,60}(\n[a-z .]{1,60}){0,3}";
        (
            proptest::collection::vec(para, 0..12),
            proptest::collection::vec(1usize..4, 12),
        )
            .prop_map(|(paras, gaps)| {
                let mut text = String::new();
                for (i, p) in paras.iter().enumerate() {
                    text.push_str(p);
                    text.push_str(&"\n".repeat(gaps[i]));
                }
                text
            })
    }

    proptest! {
        #[test]
        fn prop_chunks_concatenate_to_input(text in paragraph_text(), limit in 1usize..300) {
            let chunks = split_into_chunks(&text, limit);
            prop_assert_eq!(chunks.concat(), text);
        }

        #[test]
        fn prop_chunks_respect_limit_unless_single_paragraph(
            text in paragraph_text(),
            limit in 1usize..300,
        ) {
            for chunk in split_into_chunks(&text, limit) {
                let within = chunk.chars().count() <= limit;
                prop_assert!(within || paragraphs(&chunk).len() == 1);
            }
        }
    }
}
