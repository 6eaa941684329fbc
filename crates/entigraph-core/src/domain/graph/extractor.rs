//! Mention extraction seam
//!
//! The graph does not do NLP. An [`EntityExtractor`] turns message text into
//! candidate spans with a type; [`KeywordExtractor`] is a gazetteer
//! implementation good enough for deterministic pipelines and tests.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::entity::EntityType;

/// One candidate mention produced by an extractor
///
/// Positions are character offsets into the message, end exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMention {
    pub text: String,
    pub start_position: usize,
    pub end_position: usize,
    pub candidate_type: EntityType,
    pub confidence: f64,
}

/// Extracts candidate entity mentions from raw text
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, content: &str) -> Result<Vec<ExtractedMention>>;

    /// Name recorded as the mention's extraction method
    fn method(&self) -> &str {
        "external"
    }
}

/// A gazetteer entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTerm {
    pub name: String,
    pub entity_type: EntityType,
}

impl KeywordTerm {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
        }
    }
}

/// Case-insensitive, word-bounded gazetteer matcher
///
/// Overlapping hits resolve to the longest span; ties go to the earlier one.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    terms: Vec<(Vec<char>, KeywordTerm)>,
    confidence: f64,
}

impl KeywordExtractor {
    pub fn new(terms: impl IntoIterator<Item = KeywordTerm>) -> Self {
        let terms = terms
            .into_iter()
            .filter(|t| !t.name.trim().is_empty())
            .map(|t| (lowercase_chars(t.name.trim()), t))
            .collect();
        Self {
            terms,
            confidence: 0.9,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn lowercase_chars(s: &str) -> Vec<char> {
    // one char in, one char out, so offsets stay aligned with the source
    s.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl EntityExtractor for KeywordExtractor {
    fn extract(&self, content: &str) -> Result<Vec<ExtractedMention>> {
        let original: Vec<char> = content.chars().collect();
        let haystack = lowercase_chars(content);
        let mut hits: Vec<(usize, usize, &KeywordTerm)> = Vec::new();

        for (needle, term) in &self.terms {
            if needle.is_empty() || needle.len() > haystack.len() {
                continue;
            }
            for start in 0..=haystack.len() - needle.len() {
                let end = start + needle.len();
                if haystack[start..end] != needle[..] {
                    continue;
                }
                let bounded_left = start == 0 || !is_word_char(haystack[start - 1]);
                let bounded_right = end == haystack.len() || !is_word_char(haystack[end]);
                if bounded_left && bounded_right {
                    hits.push((start, end, term));
                }
            }
        }

        // longest first, then earliest
        hits.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)).then(a.0.cmp(&b.0)));

        let mut occupied: HashSet<usize> = HashSet::new();
        let mut mentions = Vec::new();
        for (start, end, term) in hits {
            if (start..end).any(|pos| occupied.contains(&pos)) {
                continue;
            }
            occupied.extend(start..end);
            mentions.push(ExtractedMention {
                text: original[start..end].iter().collect(),
                start_position: start,
                end_position: end,
                candidate_type: term.entity_type,
                confidence: self.confidence,
            });
        }

        mentions.sort_by_key(|m| m.start_position);
        Ok(mentions)
    }

    fn method(&self) -> &str {
        "keyword"
    }
}
