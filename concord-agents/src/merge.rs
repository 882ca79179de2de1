//! Content merge engine.
//!
//! Two contents are compatible when their lengths are comparable and their
//! token sets overlap enough. Merging unions their sentences: every sentence
//! of the first content in order, then the sentences of the second content
//! not already present, in order.

use concord_core::MergeError;
use std::collections::{BTreeSet, HashSet};

/// Similarity and length rules for merging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeEngine {
    similarity_threshold: f64,
    min_length_ratio: f64,
}

impl MergeEngine {
    pub fn new(similarity_threshold: f64, min_length_ratio: f64) -> Self {
        Self {
            similarity_threshold,
            min_length_ratio,
        }
    }

    /// Whether `a` and `b` are similar enough to be merged.
    pub fn can_merge(&self, a: &str, b: &str) -> bool {
        if a.trim().is_empty() || b.trim().is_empty() {
            return false;
        }
        length_ratio(a, b) >= self.min_length_ratio && similarity(a, b) > self.similarity_threshold
    }

    /// Sentence union of `a` and `b`, without checking compatibility.
    pub fn merge(&self, a: &str, b: &str) -> Result<String, MergeError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged: Vec<String> = Vec::new();

        for sentence in split_sentences(a).into_iter().chain(split_sentences(b)) {
            if seen.insert(sentence.clone()) {
                merged.push(sentence);
            }
        }

        if merged.is_empty() {
            return Err(MergeError::EmptyOutput);
        }
        Ok(merged.join(" "))
    }
}

/// Shorter length over longer length, in characters. Two empty strings are 1.0.
pub fn length_ratio(a: &str, b: &str) -> f64 {
    let (la, lb) = (a.chars().count(), b.chars().count());
    let longer = la.max(lb);
    if longer == 0 {
        return 1.0;
    }
    la.min(lb) as f64 / longer as f64
}

/// Token-set Jaccard similarity on lowercase alphanumeric words.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Split text into trimmed sentences, keeping their terminators.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            // Keep runs like "?!" or "..." inside one sentence.
            while let Some(&next) = chars.peek() {
                if matches!(next, '.' | '!' | '?') {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_sentence() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,8}( [a-z]{1,8}){0,4}\\.".prop_map(|s| s)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Merged content contains every input sentence exactly once.
        #[test]
        fn prop_merge_is_duplicate_free_union(
            a in prop::collection::vec(arb_sentence(), 1..6),
            b in prop::collection::vec(arb_sentence(), 1..6),
        ) {
            let merged = MergeEngine::new(0.6, 0.3).merge(&a.join(" "), &b.join(" ")).unwrap();
            let sentences = split_sentences(&merged);

            let unique: HashSet<&String> = sentences.iter().collect();
            prop_assert_eq!(unique.len(), sentences.len());
            for sentence in a.iter().chain(b.iter()) {
                prop_assert!(sentences.contains(sentence));
            }
            // The first content's sentences lead, in their original order.
            prop_assert_eq!(&sentences[0], &a[0]);
        }

        /// Similarity is symmetric and bounded.
        #[test]
        fn prop_similarity_symmetric(a in "[a-z ]{0,40}", b in "[a-z ]{0,40}") {
            let ab = similarity(&a, &b);
            let ba = similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-12);
            prop_assert!((0.0..=1.0).contains(&ab));
        }
    }
}
