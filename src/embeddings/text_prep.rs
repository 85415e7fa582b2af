// text_prep.rs — Text preparation for embedding generation.
//
// Abstracts from arXiv and library exports carry hard line breaks and LaTeX spacing.
// Collapse whitespace so the tokenizer sees one clean paragraph, then cap the length.

use crate::config;

/// Prepare embedding text for a paper abstract.
pub fn prepare_paper_text(text: &str) -> String {
    truncate_words(&collapse_whitespace(text), config::embedding::MAX_INPUT_WORDS)
}

/// Replace every run of whitespace (including newlines) with a single space.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate text to at most `max_words` words, preserving word boundaries.
fn truncate_words(text: &str, max_words: usize) -> String {
    let mut words = 0;
    let mut end = 0;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            words += 1;
            if words >= max_words {
                end = i;
                break;
            }
        }
        end = i + c.len_utf8();
    }

    text[..end].trim().to_string()
}
