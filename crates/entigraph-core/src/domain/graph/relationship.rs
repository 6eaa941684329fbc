//! Typed, weighted, directed edges between entities
//!
//! Edges reference entities by id only. The triple (source, target, type) is
//! the identity of an edge; re-detections fold into the existing row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored relationship between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relationship_type: RelationshipType,
    /// Strength (0.0 to 1.0)
    pub strength: f64,
    pub first_mentioned_at: DateTime<Utc>,
    pub last_mentioned_at: DateTime<Utc>,
    /// Number of detections folded into this edge, at least 1
    pub mention_count: i64,
    /// Most recent supporting message ids, bounded
    pub context_messages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRelationship {
    /// Build a fresh edge from its first detection
    pub fn from_candidate(candidate: &RelationshipCandidate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_entity_id: candidate.source_entity_id.clone(),
            target_entity_id: candidate.target_entity_id.clone(),
            relationship_type: candidate.relationship_type,
            strength: candidate.confidence.clamp(0.0, 1.0),
            first_mentioned_at: candidate.observed_at,
            last_mentioned_at: candidate.observed_at,
            mention_count: 1,
            context_messages: candidate.message_id.iter().cloned().collect(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold another detection of the same triple into this edge
    pub fn absorb(&mut self, candidate: &RelationshipCandidate, max_context: usize) {
        self.strength = combine_strength(self.strength, candidate.confidence);
        self.mention_count += 1;
        if candidate.observed_at < self.first_mentioned_at {
            self.first_mentioned_at = candidate.observed_at;
        }
        if candidate.observed_at > self.last_mentioned_at {
            self.last_mentioned_at = candidate.observed_at;
        }
        if let Some(message_id) = &candidate.message_id {
            push_context(&mut self.context_messages, message_id, max_context);
        }
        self.updated_at = Utc::now();
    }

    /// The endpoint on the other side of `entity_id`
    pub fn other_end(&self, entity_id: &str) -> &str {
        if self.source_entity_id == entity_id {
            &self.target_entity_id
        } else {
            &self.source_entity_id
        }
    }

    pub fn touches(&self, entity_id: &str) -> bool {
        self.source_entity_id == entity_id || self.target_entity_id == entity_id
    }
}

/// A detected relationship that has not been stored yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relationship_type: RelationshipType,
    /// Detection confidence, clamped on store
    pub confidence: f64,
    /// Supporting message, if any
    pub message_id: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl RelationshipCandidate {
    pub fn new(
        source_entity_id: impl Into<String>,
        target_entity_id: impl Into<String>,
        relationship_type: RelationshipType,
        confidence: f64,
    ) -> Self {
        Self {
            source_entity_id: source_entity_id.into(),
            target_entity_id: target_entity_id.into(),
            relationship_type,
            confidence,
            message_id: None,
            observed_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn observed_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.observed_at = timestamp;
        self
    }
}

/// Combine two observations of the same edge
///
/// Weighted toward the stronger observation, so a single weak re-detection
/// cannot wipe out a strong edge. Result is always in [0, 1].
pub fn combine_strength(existing: f64, observed: f64) -> f64 {
    let existing = existing.clamp(0.0, 1.0);
    let observed = observed.clamp(0.0, 1.0);
    let (high, low) = if existing >= observed {
        (existing, observed)
    } else {
        (observed, existing)
    };
    (0.7 * high + 0.3 * low).clamp(0.0, 1.0)
}

/// Append a message id to a context list, keeping the newest `max` distinct ids
pub fn push_context(context: &mut Vec<String>, message_id: &str, max: usize) {
    context.retain(|id| id != message_id);
    context.push(message_id.to_string());
    if context.len() > max {
        let excess = context.len() - max;
        context.drain(..excess);
    }
}

/// Union of two context lists, order preserved, newest kept
pub fn union_context(first: &[String], second: &[String], max: usize) -> Vec<String> {
    let mut merged = Vec::with_capacity(first.len() + second.len());
    for id in first.iter().chain(second.iter()) {
        push_context(&mut merged, id, usize::MAX);
    }
    if merged.len() > max {
        let excess = merged.len() - max;
        merged.drain(..excess);
    }
    merged
}

/// Types of relationships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    WorksFor,
    CreatedBy,
    DiscussedWith,
    RelatedTo,
    PartOf,
    MentionedWith,
    TemporalSequence,
    CauseEffect,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorksFor => "works_for",
            Self::CreatedBy => "created_by",
            Self::DiscussedWith => "discussed_with",
            Self::RelatedTo => "related_to",
            Self::PartOf => "part_of",
            Self::MentionedWith => "mentioned_with",
            Self::TemporalSequence => "temporal_sequence",
            Self::CauseEffect => "cause_effect",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "works_for" => Some(Self::WorksFor),
            "created_by" => Some(Self::CreatedBy),
            "discussed_with" => Some(Self::DiscussedWith),
            "related_to" => Some(Self::RelatedTo),
            "part_of" => Some(Self::PartOf),
            "mentioned_with" => Some(Self::MentionedWith),
            "temporal_sequence" => Some(Self::TemporalSequence),
            "cause_effect" => Some(Self::CauseEffect),
            _ => None,
        }
    }

    pub fn all() -> &'static [RelationshipType] {
        &[
            Self::WorksFor,
            Self::CreatedBy,
            Self::DiscussedWith,
            Self::RelatedTo,
            Self::PartOf,
            Self::MentionedWith,
            Self::TemporalSequence,
            Self::CauseEffect,
        ]
    }

    /// Label used for Cypher edges (`WORKS_FOR`)
    pub fn cypher_label(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
