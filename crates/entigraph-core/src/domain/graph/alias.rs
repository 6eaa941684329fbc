//! Alternate surface forms bound to an entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An alias resolving to an existing entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAlias {
    pub id: String,
    pub entity_id: String,
    /// Surface string, unique per entity
    pub alias: String,
    pub alias_type: AliasType,
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
}

impl EntityAlias {
    pub fn new(entity_id: impl Into<String>, alias: impl Into<String>, alias_type: AliasType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            alias: alias.into().trim().to_string(),
            alias_type,
            confidence_score: 0.5,
            created_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence.clamp(0.0, 1.0);
        self
    }
}

/// An alias to create, before it is bound to a stored row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasSpec {
    pub alias: String,
    pub alias_type: AliasType,
    pub confidence: f64,
}

impl AliasSpec {
    pub fn new(alias: impl Into<String>, alias_type: AliasType, confidence: f64) -> Self {
        Self {
            alias: alias.into(),
            alias_type,
            confidence,
        }
    }
}

/// How an alias relates to the entity's name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasType {
    Formal,
    Informal,
    Abbreviation,
    Nickname,
    Variation,
}

impl AliasType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formal => "formal",
            Self::Informal => "informal",
            Self::Abbreviation => "abbreviation",
            Self::Nickname => "nickname",
            Self::Variation => "variation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "formal" => Some(Self::Formal),
            "informal" => Some(Self::Informal),
            "abbreviation" | "abbr" => Some(Self::Abbreviation),
            "nickname" => Some(Self::Nickname),
            "variation" => Some(Self::Variation),
            _ => None,
        }
    }

    pub fn all() -> &'static [AliasType] {
        &[
            Self::Formal,
            Self::Informal,
            Self::Abbreviation,
            Self::Nickname,
            Self::Variation,
        ]
    }

    /// Guess the alias type of a surface string
    ///
    /// Short all-caps strings read as abbreviations ("JS", "NASA").
    pub fn infer(alias: &str) -> Self {
        let letters: Vec<char> = alias.chars().filter(|c| c.is_alphabetic()).collect();
        if !letters.is_empty() && letters.len() <= 5 && letters.iter().all(|c| c.is_uppercase()) {
            Self::Abbreviation
        } else {
            Self::Variation
        }
    }
}

impl std::fmt::Display for AliasType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
