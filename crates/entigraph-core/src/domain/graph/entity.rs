//! Entity types for the conversation graph
//!
//! An entity is the identity anchor every mention, alias and relationship
//! points at. Identity is the pair (normalized name, type).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A deduplicated real-world thing tracked by the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier for the entity
    pub id: String,
    /// Display form
    pub name: String,
    /// Canonical lookup key, see [`Entity::normalize`]
    pub normalized_name: String,
    /// Kind of entity
    pub entity_type: EntityType,
    /// Preferred display string, distinct from aliases
    pub canonical_form: Option<String>,
    /// Confidence score (0.0 to 1.0)
    pub confidence_score: f64,
    /// Number of mention rows pointing at this entity
    pub mention_count: i64,
    /// When the entity was last mentioned
    pub last_mentioned_at: Option<DateTime<Utc>>,
    /// Free-form structured metadata
    pub metadata: Option<serde_json::Value>,
    /// When the entity was created
    pub created_at: DateTime<Utc>,
    /// When the entity was last updated
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into().trim().to_string();
        let normalized_name = Self::normalize(&name);
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            name,
            normalized_name,
            entity_type,
            canonical_form: None,
            confidence_score: 0.5,
            mention_count: 0,
            last_mentioned_at: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set confidence score
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the canonical display form
    pub fn with_canonical_form(mut self, canonical_form: impl Into<String>) -> Self {
        self.canonical_form = Some(canonical_form.into());
        self
    }

    /// Attach structured metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Preferred string for display
    pub fn display_name(&self) -> &str {
        self.canonical_form.as_deref().unwrap_or(&self.name)
    }

    /// Normalize a name into its lookup key
    ///
    /// Lowercases, trims and collapses internal whitespace. Punctuation is
    /// kept: "C++" and "C#" must stay distinct.
    pub fn normalize(name: &str) -> String {
        name.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Kinds of entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Product,
    Concept,
    Location,
    /// Languages, libraries, tools and other technical artifacts
    Technical,
    Event,
    Decision,
}

impl EntityType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Product => "product",
            Self::Concept => "concept",
            Self::Location => "location",
            Self::Technical => "technical",
            Self::Event => "event",
            Self::Decision => "decision",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "person" => Some(Self::Person),
            "organization" | "organisation" | "org" => Some(Self::Organization),
            "product" => Some(Self::Product),
            "concept" => Some(Self::Concept),
            "location" | "place" => Some(Self::Location),
            "technical" | "tech" => Some(Self::Technical),
            "event" => Some(Self::Event),
            "decision" => Some(Self::Decision),
            _ => None,
        }
    }

    /// Get all entity types
    pub fn all() -> &'static [EntityType] {
        &[
            Self::Person,
            Self::Organization,
            Self::Product,
            Self::Concept,
            Self::Location,
            Self::Technical,
            Self::Event,
            Self::Decision,
        ]
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
