//! Entity mentions: one occurrence of an entity in one message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// One occurrence of an entity's surface form in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub id: String,
    pub entity_id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub mention_text: String,
    /// Character offset of the first char (inclusive)
    pub start_position: i64,
    /// Character offset past the last char (exclusive), always > start
    pub end_position: i64,
    pub confidence_score: f64,
    pub extraction_method: String,
    pub created_at: DateTime<Utc>,
}

impl EntityMention {
    /// Create a mention, rejecting empty or inverted spans
    pub fn new(
        entity_id: impl Into<String>,
        message_id: impl Into<String>,
        conversation_id: impl Into<String>,
        mention_text: impl Into<String>,
        start_position: i64,
        end_position: i64,
    ) -> Result<Self> {
        if start_position < 0 || start_position >= end_position {
            return Err(Error::InvalidInput(format!(
                "mention span must satisfy 0 <= start < end, got {}..{}",
                start_position, end_position
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            message_id: message_id.into(),
            conversation_id: conversation_id.into(),
            mention_text: mention_text.into(),
            start_position,
            end_position,
            confidence_score: 0.5,
            extraction_method: "unknown".to_string(),
            created_at: Utc::now(),
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_extraction_method(mut self, method: impl Into<String>) -> Self {
        self.extraction_method = method.into();
        self
    }

    /// Timestamp the mention with message time instead of wall time
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.created_at = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_span() {
        assert!(EntityMention::new("e", "m", "c", "x", 5, 5).is_err());
        assert!(EntityMention::new("e", "m", "c", "x", 6, 2).is_err());
        assert!(EntityMention::new("e", "m", "c", "x", -1, 2).is_err());
    }

    #[test]
    fn test_builder() {
        let mention = EntityMention::new("e", "m", "c", "Rust", 0, 4)
            .unwrap()
            .with_confidence(0.9)
            .with_extraction_method("keyword");
        assert_eq!(mention.confidence_score, 0.9);
        assert_eq!(mention.extraction_method, "keyword");
    }
}
