//! Relationship detection from entity co-occurrence
//!
//! Two linked entities in the same message co-occur when their start
//! positions are at most `max_co_occurrence_distance` characters apart. Each
//! co-occurring pair gets a relationship type from the (type, type) rule
//! table and a confidence from distance decay plus relation phrases found
//! between the two mentions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::entity::EntityType;
use super::relationship::{EntityRelationship, RelationshipCandidate, RelationshipType};
use super::repository::GraphRepository;

/// Weight of the distance term in the confidence score
const DISTANCE_WEIGHT: f64 = 0.7;
/// Bonus per relation phrase found between the mentions
const INDICATOR_BONUS: f64 = 0.15;
/// Cap on the total phrase bonus
const MAX_INDICATOR_BONUS: f64 = 0.3;

/// Phrases suggesting a specific relationship type
const TYPE_INDICATORS: &[(RelationshipType, &[&str])] = &[
    (
        RelationshipType::WorksFor,
        &[
            "works at", "works for", "working at", "working for", "employed by", "employee of",
            "hired by", "joined", "job at", "engineer at",
        ],
    ),
    (
        RelationshipType::CreatedBy,
        &[
            "created by", "built by", "developed by", "made by", "maintained by", "released by",
            "designed by", "from",
        ],
    ),
    (
        RelationshipType::DiscussedWith,
        &[
            "talked to", "talked with", "spoke with", "spoke to", "met with", "meeting with",
            "discussed", "told", "asked",
        ],
    ),
    (
        RelationshipType::PartOf,
        &["part of", "component of", "module of", "inside", "built on", "runs on", "included in"],
    ),
    (
        RelationshipType::MentionedWith,
        &["uses", "using", "used", "likes", "prefers", "knows", "learning", "wrote", "writes"],
    ),
    (
        RelationshipType::TemporalSequence,
        &["then", "after", "before", "followed by", "later", "next"],
    ),
    (
        RelationshipType::CauseEffect,
        &["because", "led to", "leads to", "due to", "caused", "resulted in", "so that"],
    ),
    (
        RelationshipType::RelatedTo,
        &["related to", "about", "regarding", "near", "located in"],
    ),
];

/// Phrases suggesting association regardless of type
const GENERAL_INDICATORS: &[&str] = &[
    "collaborating with",
    "working with",
    "together with",
    "along with",
    "partnered with",
    "teamed up with",
];

/// Relationship detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Largest start-to-start distance (chars) at which two mentions co-occur
    pub max_co_occurrence_distance: usize,
    /// Candidates below this confidence are dropped
    pub min_relationship_strength: f64,
    /// Chars scanned from each side of the gap between two mentions
    pub context_window_size: usize,
    /// Bound on context_messages kept per edge
    pub max_context_messages: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_co_occurrence_distance: 200,
            min_relationship_strength: 0.3,
            context_window_size: 100,
            max_context_messages: 20,
        }
    }
}

/// An entity already linked within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEntity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub start_position: usize,
    pub end_position: usize,
}

impl LinkedEntity {
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        start_position: usize,
        end_position: usize,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type,
            start_position,
            end_position,
        }
    }
}

/// Two entities appearing within the co-occurrence distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoOccurrence {
    /// Entity mentioned first
    pub first_entity_id: String,
    pub second_entity_id: String,
    pub distance: usize,
}

/// A relationship proposed for one message, before storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRelationship {
    pub candidate: RelationshipCandidate,
    pub distance: usize,
    /// Relation phrases found between the mentions
    pub indicators: Vec<String>,
}

/// Pure detection output for one message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub co_occurrences: Vec<CoOccurrence>,
    pub relationships: Vec<DetectedRelationship>,
}

/// Detection output after the relationships were stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageAnalysis {
    pub co_occurrences: Vec<CoOccurrence>,
    pub detected_relationships: Vec<EntityRelationship>,
    /// Candidates that could not be stored, one line each
    pub failures: Vec<String>,
}

/// Which endpoint of an ordered pair becomes the edge source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// First entity of the pair is the source
    Forward,
    /// Second entity of the pair is the source
    Reverse,
}

/// Relationship type for an ordered entity type pair
///
/// Total over every pair: person edges start at the person, products and
/// technical artifacts point at the organization that created them, and
/// anything involving a location or event that no rule claims is
/// `related_to`.
pub fn infer_relationship(first: EntityType, second: EntityType) -> (RelationshipType, Orientation) {
    use EntityType::*;
    use Orientation::{Forward, Reverse};
    use RelationshipType as Rel;

    match (first, second) {
        (Person, Organization) => (Rel::WorksFor, Forward),
        (Organization, Person) => (Rel::WorksFor, Reverse),
        (Person, Person) => (Rel::DiscussedWith, Forward),
        (Person, Technical | Product | Concept | Decision) => (Rel::MentionedWith, Forward),
        (Technical | Product | Concept | Decision, Person) => (Rel::MentionedWith, Reverse),
        (Technical | Product, Organization) => (Rel::CreatedBy, Forward),
        (Organization, Technical | Product) => (Rel::CreatedBy, Reverse),
        (Technical, Product) => (Rel::PartOf, Forward),
        (Product, Technical) => (Rel::PartOf, Reverse),
        (Technical, Technical) => (Rel::MentionedWith, Forward),
        (Event, Event) => (Rel::TemporalSequence, Forward),
        (Decision, Event | Decision) => (Rel::CauseEffect, Forward),
        (Event, Decision) => (Rel::CauseEffect, Reverse),
        (Location | Event, _) | (_, Location | Event) => (Rel::RelatedTo, Forward),
        (
            Organization | Product | Concept | Decision | Technical,
            Organization | Product | Concept | Decision | Technical,
        ) => (Rel::RelatedTo, Forward),
    }
}

/// Lowercase, punctuation to spaces, single-spaced, space padded
fn normalize_window(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn contains_phrase(window: &str, phrase: &str) -> bool {
    window.contains(&format!(" {} ", phrase))
}

/// Relationship detector
pub struct RelationshipDetector<R: GraphRepository> {
    repository: Arc<R>,
    config: DetectorConfig,
}

impl<R: GraphRepository> RelationshipDetector<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            config: DetectorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DetectorConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: DetectorConfig) {
        self.config = config;
    }

    /// Confidence for a pair at `distance` with `indicators` relation phrases
    ///
    /// Monotonically decreasing in distance, bounded to [0, 1].
    pub fn confidence(&self, distance: usize, indicators: usize) -> f64 {
        let max = self.config.max_co_occurrence_distance as f64;
        let decay = (1.0 - distance as f64 / (max + 1.0)).clamp(0.0, 1.0);
        let bonus = (INDICATOR_BONUS * indicators as f64).min(MAX_INDICATOR_BONUS);
        (DISTANCE_WEIGHT * decay + bonus).clamp(0.0, 1.0)
    }

    /// Text between two mentions, trimmed to the context window
    fn gap_window(&self, chars: &[char], from: usize, to: usize) -> String {
        let from = from.min(chars.len());
        let to = to.min(chars.len());
        if from >= to {
            return String::new();
        }
        let gap = &chars[from..to];
        let window = self.config.context_window_size;
        if window == 0 {
            return String::new();
        }
        if gap.len() > window * 2 {
            let head: String = gap[..window].iter().collect();
            let tail: String = gap[gap.len() - window..].iter().collect();
            format!("{} {}", head, tail)
        } else {
            gap.iter().collect()
        }
    }

    fn indicators_for(&self, window: &str, relationship_type: RelationshipType) -> Vec<String> {
        if window.trim().is_empty() {
            return Vec::new();
        }
        let window = normalize_window(window);
        let typed = TYPE_INDICATORS
            .iter()
            .filter(|(ty, _)| *ty == relationship_type)
            .flat_map(|(_, phrases)| phrases.iter());
        typed
            .chain(GENERAL_INDICATORS.iter())
            .filter(|phrase| contains_phrase(&window, phrase))
            .map(|phrase| phrase.to_string())
            .collect()
    }

    /// Detect co-occurrences and candidate relationships without storing
    pub fn detect(
        &self,
        message_id: &str,
        content: &str,
        linked: &[LinkedEntity],
        observed_at: DateTime<Utc>,
    ) -> Result<Detection> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("message content must not be empty".into()));
        }

        let chars: Vec<char> = content.chars().collect();
        let mut ordered: Vec<&LinkedEntity> = linked.iter().collect();
        ordered.sort_by_key(|e| (e.start_position, e.end_position));

        let mut detection = Detection::default();
        let mut best: HashMap<(String, String, RelationshipType), DetectedRelationship> = HashMap::new();

        for (i, first) in ordered.iter().enumerate() {
            for second in &ordered[i + 1..] {
                if first.entity_id == second.entity_id {
                    continue;
                }
                let distance = second.start_position - first.start_position;
                if distance > self.config.max_co_occurrence_distance {
                    continue;
                }

                detection.co_occurrences.push(CoOccurrence {
                    first_entity_id: first.entity_id.clone(),
                    second_entity_id: second.entity_id.clone(),
                    distance,
                });

                let (relationship_type, orientation) =
                    infer_relationship(first.entity_type, second.entity_type);
                let window = self.gap_window(&chars, first.end_position, second.start_position);
                let indicators = self.indicators_for(&window, relationship_type);
                let confidence = self.confidence(distance, indicators.len());

                if confidence < self.config.min_relationship_strength {
                    debug!(
                        message_id = %message_id,
                        distance,
                        confidence,
                        "Co-occurrence below relationship strength floor"
                    );
                    continue;
                }

                let (source, target) = match orientation {
                    Orientation::Forward => (first, second),
                    Orientation::Reverse => (second, first),
                };
                let candidate = RelationshipCandidate::new(
                    &source.entity_id,
                    &target.entity_id,
                    relationship_type,
                    confidence,
                )
                .with_message(message_id)
                .observed_at(observed_at);

                let key = (
                    source.entity_id.clone(),
                    target.entity_id.clone(),
                    relationship_type,
                );
                let detected = DetectedRelationship {
                    candidate,
                    distance,
                    indicators,
                };
                match best.get(&key) {
                    Some(existing) if existing.candidate.confidence >= confidence => {}
                    _ => {
                        best.insert(key, detected);
                    }
                }
            }
        }

        let mut relationships: Vec<DetectedRelationship> = best.into_values().collect();
        relationships.sort_by(|a, b| {
            b.candidate
                .confidence
                .partial_cmp(&a.candidate.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.distance.cmp(&b.distance))
        });
        detection.relationships = relationships;
        Ok(detection)
    }

    /// Detect relationships in a message and persist them
    pub async fn analyze_message(
        &self,
        message_id: &str,
        conversation_id: &str,
        content: &str,
        linked: &[LinkedEntity],
    ) -> Result<MessageAnalysis> {
        self.analyze_message_at(message_id, conversation_id, content, linked, Utc::now())
            .await
    }

    /// [`Self::analyze_message`] with an explicit message timestamp
    pub async fn analyze_message_at(
        &self,
        message_id: &str,
        conversation_id: &str,
        content: &str,
        linked: &[LinkedEntity],
        observed_at: DateTime<Utc>,
    ) -> Result<MessageAnalysis> {
        let detection = self.detect(message_id, content, linked, observed_at)?;

        let mut stored = Vec::with_capacity(detection.relationships.len());
        let mut failures = Vec::new();
        for detected in &detection.relationships {
            let candidate = &detected.candidate;
            match self.store_relationship(candidate).await {
                Ok(relationship) => stored.push(relationship),
                Err(e) => {
                    warn!(
                        message_id = %message_id,
                        source = %candidate.source_entity_id,
                        target = %candidate.target_entity_id,
                        error = %e,
                        "Failed to store relationship"
                    );
                    failures.push(format!(
                        "{} {} -> {}: {}",
                        candidate.relationship_type,
                        candidate.source_entity_id,
                        candidate.target_entity_id,
                        e
                    ));
                }
            }
        }

        debug!(
            message_id = %message_id,
            conversation_id = %conversation_id,
            co_occurrences = detection.co_occurrences.len(),
            relationships = stored.len(),
            failed = failures.len(),
            "Message analyzed"
        );

        Ok(MessageAnalysis {
            co_occurrences: detection.co_occurrences,
            detected_relationships: stored,
            failures,
        })
    }

    /// Insert a relationship or fold it into the existing triple
    pub async fn store_relationship(&self, candidate: &RelationshipCandidate) -> Result<EntityRelationship> {
        if candidate.source_entity_id == candidate.target_entity_id {
            return Err(Error::InvalidInput(format!(
                "relationship endpoints must differ, got '{}' twice",
                candidate.source_entity_id
            )));
        }
        self.repository
            .upsert_relationship(candidate, self.config.max_context_messages)
            .await
    }

    /// Edges touching an entity, strongest first
    pub async fn get_entity_relationships(&self, entity_id: &str) -> Result<Vec<EntityRelationship>> {
        self.repository.list_relationships_for_entity(entity_id).await
    }
}
