//! Span location: word-level spans over a whitespace-split sentence and
//! token-level spans inside a tokenizer's id sequence.
//!
//! Word boundaries in the original string do not generally align with subword
//! token boundaries, so a target is located in two steps: first as a run of
//! whitespace words, then by re-tokenizing exactly those words and searching
//! for the resulting id sequence inside the full sentence's ids.

use crate::error::{Error, Result};

/// A target word or phrase inside a sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordTarget {
    /// Literal text, located at its first occurrence as a contiguous run of
    /// whitespace words.
    Text(String),
    /// An explicit half-open range of word indices into the
    /// whitespace-split sentence.
    Indices(usize, usize),
}

impl From<&str> for WordTarget {
    fn from(text: &str) -> Self {
        WordTarget::Text(text.to_string())
    }
}

impl From<String> for WordTarget {
    fn from(text: String) -> Self {
        WordTarget::Text(text)
    }
}

impl From<(usize, usize)> for WordTarget {
    fn from(span: (usize, usize)) -> Self {
        WordTarget::Indices(span.0, span.1)
    }
}

/// Locate `target` as a half-open word-index span in `sentence`.
///
/// Literal text matches its first occurrence as a contiguous run in
/// `sentence.split_whitespace()`; explicit indices pass through after a
/// bounds check. Fails with [`Error::WordNotFound`] otherwise.
pub fn find_word_span(sentence: &str, target: &WordTarget) -> Result<(usize, usize)> {
    let words: Vec<&str> = sentence.split_whitespace().collect();

    match target {
        WordTarget::Indices(start, end) => {
            if *start >= *end || *end > words.len() {
                return Err(Error::WordNotFound {
                    word: format!("{start}..{end}"),
                    sentence: sentence.to_string(),
                });
            }
            Ok((*start, *end))
        }
        WordTarget::Text(text) => {
            let needle: Vec<&str> = text.split_whitespace().collect();
            if needle.is_empty() {
                return Err(Error::WordNotFound {
                    word: text.clone(),
                    sentence: sentence.to_string(),
                });
            }
            words
                .windows(needle.len())
                .position(|window| window == needle)
                .map(|start| (start, start + needle.len()))
                .ok_or_else(|| Error::WordNotFound {
                    word: text.clone(),
                    sentence: sentence.to_string(),
                })
        }
    }
}

/// Locate two independent targets in the same sentence, for relational
/// extraction between a pair of words.
pub fn find_paired_word_spans(
    sentence: &str,
    first: &WordTarget,
    second: &WordTarget,
) -> Result<((usize, usize), (usize, usize))> {
    let span1 = find_word_span(sentence, first)?;
    let span2 = find_word_span(sentence, second)?;
    Ok((span1, span2))
}

/// The words of a half-open word span, re-joined with single spaces.
///
/// Callers are expected to pass a span previously validated by
/// [`find_word_span`]; out-of-range spans yield the words that do exist.
pub fn span_text(sentence: &str, span: (usize, usize)) -> String {
    sentence
        .split_whitespace()
        .skip(span.0)
        .take(span.1.saturating_sub(span.0))
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Find `needle` as a contiguous subsequence of `haystack` and return the
/// half-open token-index span of its leftmost occurrence.
///
/// Fails with [`Error::PatternNotFound`] when there is no match anywhere,
/// which is a real failure mode: subword merging is sensitive to surrounding
/// context, so a word tokenized in isolation may not reappear verbatim inside
/// the full sentence's tokenization. An empty needle is also a
/// [`Error::PatternNotFound`], since an empty span cannot be pooled.
///
/// The leftmost match always wins. If the target also occurs earlier in the
/// sentence, that earlier occurrence is the one located; preferring a later,
/// context-correct occurrence is a known limitation.
pub fn find_token_span(needle: &[u32], haystack: &[u32]) -> Result<(usize, usize)> {
    if needle.is_empty() {
        return Err(Error::PatternNotFound {
            token_ids: Vec::new(),
        });
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|start| (start, start + needle.len()))
        .ok_or_else(|| Error::PatternNotFound {
            token_ids: needle.to_vec(),
        })
}
