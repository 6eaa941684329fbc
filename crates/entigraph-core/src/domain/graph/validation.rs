//! Validation types and record-level rule checks
//!
//! Records are validated in their raw stored shape (strings and numbers as
//! read from the store) so that rows no typed constructor would produce can
//! still be inspected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{Entity, EntityType};
use super::relationship::RelationshipType;

/// Category of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    /// Missing required field
    Constraint,
    /// Numeric field outside its allowed range
    Range,
    /// Malformed value
    Format,
    /// Dangling entity reference
    ReferentialIntegrity,
    /// Derived field drift
    BusinessRule,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constraint => "constraint",
            Self::Range => "range",
            Self::Format => "format",
            Self::ReferentialIntegrity => "referential_integrity",
            Self::BusinessRule => "business_rule",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "constraint" => Some(Self::Constraint),
            "range" => Some(Self::Range),
            "format" => Some(Self::Format),
            "referential_integrity" => Some(Self::ReferentialIntegrity),
            "business_rule" => Some(Self::BusinessRule),
            _ => None,
        }
    }

    pub fn all() -> &'static [ValidationType] {
        &[
            Self::Constraint,
            Self::Range,
            Self::Format,
            Self::ReferentialIntegrity,
            Self::BusinessRule,
        ]
    }
}

impl std::fmt::Display for ValidationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tables the validator knows how to inspect and repair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphTable {
    Entities,
    EntityAliases,
    EntityMentions,
    EntityRelationships,
}

impl GraphTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::EntityAliases => "entity_aliases",
            Self::EntityMentions => "entity_mentions",
            Self::EntityRelationships => "entity_relationships",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "entities" => Some(Self::Entities),
            "entity_aliases" => Some(Self::EntityAliases),
            "entity_mentions" => Some(Self::EntityMentions),
            "entity_relationships" => Some(Self::EntityRelationships),
            _ => None,
        }
    }
}

/// A single finding against one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub validation_type: ValidationType,
    /// Column the finding is about, when it is about one column
    pub field: Option<String>,
    pub message: String,
    pub severity: Severity,
    pub auto_correctable: bool,
}

impl ValidationIssue {
    pub fn error(validation_type: ValidationType, field: &str, message: impl Into<String>) -> Self {
        Self {
            validation_type,
            field: Some(field.to_string()),
            message: message.into(),
            severity: Severity::Error,
            auto_correctable: false,
        }
    }

    pub fn warning(validation_type: ValidationType, field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(validation_type, field, message)
        }
    }

    pub fn correctable(mut self) -> Self {
        self.auto_correctable = true;
        self
    }
}

/// Outcome of validating one record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// False when any error-severity issue was found
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            issues.into_iter().partition(|i| i.severity == Severity::Error);
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(self.warnings.iter())
    }
}

/// Persistent audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorRecord {
    pub id: String,
    pub table_name: String,
    pub record_id: String,
    pub validation_type: ValidationType,
    pub field_name: Option<String>,
    pub error_message: String,
    pub severity: Severity,
    pub auto_correctable: bool,
    pub created_at: DateTime<Utc>,
    pub corrected_at: Option<DateTime<Utc>>,
    pub correction_method: Option<String>,
}

impl ValidationErrorRecord {
    pub fn from_issue(table: GraphTable, record_id: &str, issue: &ValidationIssue) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            table_name: table.as_str().to_string(),
            record_id: record_id.to_string(),
            validation_type: issue.validation_type,
            field_name: issue.field.clone(),
            error_message: issue.message.clone(),
            severity: issue.severity,
            auto_correctable: issue.auto_correctable,
            created_at: Utc::now(),
            corrected_at: None,
            correction_method: None,
        }
    }

    /// Mark as already fixed at logging time
    pub fn corrected_with(mut self, method: &str) -> Self {
        self.corrected_at = Some(Utc::now());
        self.correction_method = Some(method.to_string());
        self
    }

    pub fn is_corrected(&self) -> bool {
        self.corrected_at.is_some()
    }
}

/// Entity row as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub normalized_name: String,
    pub entity_type: String,
    pub confidence_score: f64,
    pub mention_count: i64,
    pub metadata: Option<String>,
}

impl From<&Entity> for EntityRecord {
    fn from(entity: &Entity) -> Self {
        Self {
            name: entity.name.clone(),
            normalized_name: entity.normalized_name.clone(),
            entity_type: entity.entity_type.as_str().to_string(),
            confidence_score: entity.confidence_score,
            mention_count: entity.mention_count,
            metadata: entity.metadata.as_ref().map(|m| m.to_string()),
        }
    }
}

/// Relationship row as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relationship_type: String,
    pub strength: f64,
    pub mention_count: i64,
}

/// Mention row as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionRecord {
    pub entity_id: String,
    pub mention_text: String,
    pub start_position: i64,
    pub end_position: i64,
    pub confidence_score: f64,
}

fn in_unit_range(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Field-level checks on an entity row that need no store access
pub fn check_entity_record(record: &EntityRecord) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if record.name.trim().is_empty() {
        issues.push(ValidationIssue::error(
            ValidationType::Constraint,
            "name",
            "entity name is empty",
        ));
    } else if record.normalized_name != Entity::normalize(&record.name) {
        issues.push(
            ValidationIssue::warning(
                ValidationType::Format,
                "normalized_name",
                format!(
                    "normalized_name '{}' does not match expected '{}'",
                    record.normalized_name,
                    Entity::normalize(&record.name)
                ),
            )
            .correctable(),
        );
    }

    if EntityType::parse(&record.entity_type).is_none() {
        issues.push(ValidationIssue::error(
            ValidationType::Format,
            "entity_type",
            format!("unknown entity type '{}'", record.entity_type),
        ));
    }

    if !in_unit_range(record.confidence_score) {
        issues.push(
            ValidationIssue::error(
                ValidationType::Range,
                "confidence_score",
                format!("confidence_score {} outside [0, 1]", record.confidence_score),
            )
            .correctable(),
        );
    }

    if record.mention_count < 0 {
        issues.push(
            ValidationIssue::error(
                ValidationType::BusinessRule,
                "mention_count",
                format!("mention_count {} is negative", record.mention_count),
            )
            .correctable(),
        );
    }

    if let Some(metadata) = &record.metadata {
        if serde_json::from_str::<serde_json::Value>(metadata).is_err() {
            issues.push(ValidationIssue::error(
                ValidationType::Format,
                "metadata",
                "metadata is not well-formed JSON",
            ));
        }
    }

    issues
}

/// Field-level checks on a relationship row that need no store access
pub fn check_relationship_record(record: &RelationshipRecord) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if record.source_entity_id.trim().is_empty() || record.target_entity_id.trim().is_empty() {
        issues.push(ValidationIssue::error(
            ValidationType::Constraint,
            "source_entity_id",
            "relationship endpoint is empty",
        ));
    }

    if RelationshipType::parse(&record.relationship_type).is_none() {
        issues.push(ValidationIssue::error(
            ValidationType::Format,
            "relationship_type",
            format!("unknown relationship type '{}'", record.relationship_type),
        ));
    }

    if !in_unit_range(record.strength) {
        issues.push(
            ValidationIssue::error(
                ValidationType::Range,
                "strength",
                format!("strength {} outside [0, 1]", record.strength),
            )
            .correctable(),
        );
    }

    if record.mention_count < 1 {
        issues.push(
            ValidationIssue::error(
                ValidationType::Range,
                "mention_count",
                format!("relationship mention_count {} is below 1", record.mention_count),
            )
            .correctable(),
        );
    }

    issues
}

/// Field-level checks on a mention row that need no store access
pub fn check_mention_record(record: &MentionRecord) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if record.mention_text.trim().is_empty() {
        issues.push(ValidationIssue::error(
            ValidationType::Constraint,
            "mention_text",
            "mention text is empty",
        ));
    }

    if record.start_position >= record.end_position {
        issues.push(ValidationIssue::error(
            ValidationType::Constraint,
            "end_position",
            format!(
                "mention span {}..{} is empty or inverted",
                record.start_position, record.end_position
            ),
        ));
    }

    if !in_unit_range(record.confidence_score) {
        issues.push(
            ValidationIssue::error(
                ValidationType::Range,
                "confidence_score",
                format!("confidence_score {} outside [0, 1]", record.confidence_score),
            )
            .correctable(),
        );
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_record(name: &str, normalized: &str) -> EntityRecord {
        EntityRecord {
            name: name.to_string(),
            normalized_name: normalized.to_string(),
            entity_type: "person".to_string(),
            confidence_score: 0.5,
            mention_count: 0,
            metadata: None,
        }
    }

    #[test]
    fn test_valid_entity_has_no_issues() {
        let issues = check_entity_record(&entity_record("John Doe", "john doe"));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_normalization_mismatch_is_warning() {
        let result = ValidationResult::from_issues(check_entity_record(&entity_record(
            "John Doe", "JOHN",
        )));
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].validation_type, ValidationType::Format);
        assert_eq!(result.warnings[0].field.as_deref(), Some("normalized_name"));
    }

    #[test]
    fn test_entity_errors() {
        let mut record = entity_record("", "");
        record.entity_type = "robot".into();
        record.confidence_score = 1.5;
        record.metadata = Some("{not json".into());

        let result = ValidationResult::from_issues(check_entity_record(&record));
        assert!(!result.is_valid);
        let types: Vec<_> = result.errors.iter().map(|e| e.validation_type).collect();
        assert!(types.contains(&ValidationType::Constraint));
        assert!(types.contains(&ValidationType::Range));
        assert_eq!(
            types.iter().filter(|t| **t == ValidationType::Format).count(),
            2
        );
    }

    #[test]
    fn test_relationship_strength_range() {
        let record = RelationshipRecord {
            source_entity_id: "a".into(),
            target_entity_id: "b".into(),
            relationship_type: "works_for".into(),
            strength: 1.2,
            mention_count: 1,
        };
        let issues = check_relationship_record(&record);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].auto_correctable);
    }

    #[test]
    fn test_mention_span() {
        let record = MentionRecord {
            entity_id: "e".into(),
            mention_text: "Rust".into(),
            start_position: 4,
            end_position: 4,
            confidence_score: 0.5,
        };
        let result = ValidationResult::from_issues(check_mention_record(&record));
        assert!(!result.is_valid);
    }
}
