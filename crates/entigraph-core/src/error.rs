//! Error types for Entigraph

use thiserror::Error;

/// Result type alias using Entigraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Entigraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Lookup errors (E001-E099)
    #[error("Entity '{0}' not found. Run `entigraph search <name>` to find entity ids.")]
    EntityNotFound(String),

    #[error("Relationship '{0}' not found.")]
    RelationshipNotFound(String),

    #[error("Conversation '{0}' has no stored messages.")]
    ConversationNotFound(String),

    // Merge errors (E100-E199)
    #[error("Merge source entity '{0}' not found.")]
    MergeSourceNotFound(String),

    #[error("Merge target entity '{0}' not found.")]
    MergeTargetNotFound(String),

    #[error("Merge of '{source_id}' into '{target_id}' failed and was rolled back: {reason}")]
    MergeFailed {
        source_id: String,
        target_id: String,
        reason: String,
    },

    // Integrity errors (E200-E299)
    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("Validation error '{0}' not found.")]
    ValidationErrorNotFound(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::EntityNotFound(_) => "E001",
            Self::RelationshipNotFound(_) => "E002",
            Self::ConversationNotFound(_) => "E003",
            Self::MergeSourceNotFound(_) => "E100",
            Self::MergeTargetNotFound(_) => "E101",
            Self::MergeFailed { .. } => "E102",
            Self::ReferentialIntegrity(_) => "E200",
            Self::ValidationErrorNotFound(_) => "E201",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Serialization(_) => "E801",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::EntityNotFound(_) | Self::MergeSourceNotFound(_) | Self::MergeTargetNotFound(_) => {
                Some("entigraph search <name>".to_string())
            }
            Self::ConversationNotFound(_) => Some("entigraph ingest <file>".to_string()),
            Self::ReferentialIntegrity(_) => Some("entigraph check".to_string()),
            Self::ConfigError(_) => Some("entigraph config list".to_string()),
            _ => None,
        }
    }

    /// Whether the error is a lookup miss rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntityNotFound(_)
                | Self::RelationshipNotFound(_)
                | Self::ConversationNotFound(_)
                | Self::MergeSourceNotFound(_)
                | Self::MergeTargetNotFound(_)
                | Self::ValidationErrorNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_errors_have_distinct_codes() {
        let source = Error::MergeSourceNotFound("a".into());
        let target = Error::MergeTargetNotFound("b".into());
        let failed = Error::MergeFailed {
            source_id: "a".into(),
            target_id: "b".into(),
            reason: "disk full".into(),
        };

        assert_eq!(source.code(), "E100");
        assert_eq!(target.code(), "E101");
        assert_eq!(failed.code(), "E102");
        assert!(source.is_not_found());
        assert!(!failed.is_not_found());
        assert!(failed.to_string().contains("rolled back"));
    }

    #[test]
    fn test_suggestions() {
        assert_eq!(
            Error::ReferentialIntegrity("x".into()).suggestion().as_deref(),
            Some("entigraph check")
        );
        assert!(Error::InvalidInput("x".into()).suggestion().is_none());
    }
}
