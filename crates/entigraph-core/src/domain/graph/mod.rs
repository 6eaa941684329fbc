//! Entity graph domain module
//!
//! Turns conversation messages into a deduplicated graph of entities and
//! typed relationships:
//!
//! - **Entity linking**: resolve a surface string to an existing entity or
//!   signal that a new one is needed
//! - **Relationship detection**: infer typed edges from entity co-occurrence
//! - **Orchestration**: run a message or conversation through both and
//!   summarize the result as insights
//! - **Integrity**: validate stored rows and repair derived fields
//!
//! ## Architecture
//!
//! ```text
//! message ─→ EntityExtractor ─→ EntityLinker ─→ RelationshipDetector
//!                                     │                  │
//!                                     └──→ GraphRepository ←──┘
//!                                                ↑
//!                       IntegrityValidator ──────┘ (out of band)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entigraph_core::domain::graph::{GraphOrchestrator, KeywordExtractor, KeywordTerm};
//!
//! let extractor = KeywordExtractor::new(vec![
//!     KeywordTerm::new("John Doe", EntityType::Person),
//!     KeywordTerm::new("Acme Corp", EntityType::Organization),
//! ]);
//! let orchestrator = GraphOrchestrator::new(repository, Arc::new(extractor));
//! let result = orchestrator
//!     .process_message("m1", "c1", "John Doe works at Acme Corp")
//!     .await?;
//! println!("{} relationships", result.relationships_detected);
//! ```

mod alias;
mod detector;
mod entity;
mod export;
mod extractor;
mod insight;
mod integrity;
mod linker;
mod mention;
mod message;
mod orchestrator;
mod relationship;
mod repository;
mod similarity;
mod validation;

pub use alias::{AliasSpec, AliasType, EntityAlias};
pub use detector::{
    CoOccurrence, DetectedRelationship, Detection, DetectorConfig, LinkedEntity, MessageAnalysis,
    Orientation, RelationshipDetector, infer_relationship,
};
pub use entity::{Entity, EntityType};
pub use export::{
    EXPORT_VERSION, ExportFormat, ExportMetadata, JsonExport, export_cypher, export_graph,
    export_graphml, export_json,
};
pub use extractor::{EntityExtractor, ExtractedMention, KeywordExtractor, KeywordTerm};
pub use insight::{Insight, InsightKind, merge_insights};
pub use integrity::{
    CorrectionReport, IntegrityReport, IntegrityValidator, RECENT_ERRORS_LIMIT, RecordIssue,
    TimeRange, ValidationErrorSummary, methods as correction_methods,
};
pub use linker::{EntityLinker, LinkCandidate, LinkResult, LinkerConfig, MatchKind};
pub use mention::EntityMention;
pub use message::{Message, MessageSource};
pub use orchestrator::{
    ConversationProcessingResult, EntityGraph, GraphOrchestrator, MessageProcessingResult,
    OrchestratorConfig, SearchHit, SearchOptions, SearchResult,
};
pub use relationship::{
    EntityRelationship, RelationshipCandidate, RelationshipType, combine_strength, push_context,
    union_context,
};
pub use repository::{CountDrift, GraphRepository, GraphStats, IntegrityRepository, MergeOutcome};
pub use similarity::{
    ABBREVIATION_SCORE, NICKNAME_SCORE, TECHNICAL_VARIATION_SCORE, initials, is_abbreviation_of,
    is_nickname_of, is_technical_variation, name_similarity, split_words, technical_fold,
};
pub use validation::{
    EntityRecord, GraphTable, MentionRecord, RelationshipRecord, Severity, ValidationErrorRecord,
    ValidationIssue, ValidationResult, ValidationType, check_entity_record, check_mention_record,
    check_relationship_record,
};
