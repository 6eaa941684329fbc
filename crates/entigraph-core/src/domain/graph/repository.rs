//! Repository traits for entity graph persistence
//!
//! [`GraphRepository`] covers the write and read paths used while
//! processing messages. [`IntegrityRepository`] covers the raw scans and
//! repairs used by the maintenance pass. One backend usually implements
//! both.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::alias::EntityAlias;
use super::entity::{Entity, EntityType};
use super::mention::EntityMention;
use super::relationship::{EntityRelationship, RelationshipCandidate};
use super::validation::{
    EntityRecord, GraphTable, MentionRecord, RelationshipRecord, ValidationErrorRecord,
};

/// Repository trait for the entity graph
#[async_trait]
pub trait GraphRepository: Send + Sync {
    // ========== Entity Operations ==========

    /// Insert an entity unless one with the same (normalized_name, type)
    /// exists; returns whichever row is stored
    async fn insert_entity(&self, entity: &Entity) -> Result<Entity>;

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>>;

    async fn find_entity_by_normalized_name(
        &self,
        normalized_name: &str,
        entity_type: EntityType,
    ) -> Result<Option<Entity>>;

    async fn list_entities_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>>;

    /// All entities ordered by id
    async fn list_entities(&self) -> Result<Vec<Entity>>;

    /// Entities whose name or any alias contains `needle` (case-insensitive)
    async fn search_entities(
        &self,
        needle: &str,
        entity_types: Option<&[EntityType]>,
    ) -> Result<Vec<Entity>>;

    // ========== Alias Operations ==========

    /// Insert or raise the confidence of an alias; entity must exist
    async fn upsert_alias(&self, alias: &EntityAlias) -> Result<EntityAlias>;

    /// Entity of the given type owning `alias` (case-insensitive)
    async fn find_entity_by_alias(
        &self,
        alias: &str,
        entity_type: EntityType,
    ) -> Result<Option<Entity>>;

    /// Aliases of one entity, highest confidence first
    async fn list_aliases(&self, entity_id: &str) -> Result<Vec<EntityAlias>>;

    /// Aliases of every entity of one type
    async fn list_aliases_by_type(&self, entity_type: EntityType) -> Result<Vec<EntityAlias>>;

    // ========== Mention Operations ==========

    /// Store a mention and bump the entity's counters atomically
    ///
    /// Rejects mentions of unknown entities with `ReferentialIntegrity`.
    async fn record_mention(&self, mention: &EntityMention) -> Result<()>;

    async fn list_mentions(&self, entity_id: &str) -> Result<Vec<EntityMention>>;

    // ========== Relationship Operations ==========

    /// Insert the edge or fold the candidate into the existing triple
    async fn upsert_relationship(
        &self,
        candidate: &RelationshipCandidate,
        max_context: usize,
    ) -> Result<EntityRelationship>;

    /// Edges touching an entity, strongest first
    async fn list_relationships_for_entity(&self, entity_id: &str) -> Result<Vec<EntityRelationship>>;

    /// All edges ordered by id
    async fn list_relationships(&self) -> Result<Vec<EntityRelationship>>;

    // ========== Merge ==========

    /// Fold `source_id` into `target_id` in one transaction
    async fn merge_entities(
        &self,
        source_id: &str,
        target_id: &str,
        max_context: usize,
    ) -> Result<MergeOutcome>;

    // ========== Statistics ==========

    async fn graph_stats(&self) -> Result<GraphStats>;
}

/// Repository trait for integrity scans and repairs
#[async_trait]
pub trait IntegrityRepository: Send + Sync {
    async fn entity_exists(&self, id: &str) -> Result<bool>;

    /// Raw entity rows as (id, record)
    async fn entity_records(&self) -> Result<Vec<(String, EntityRecord)>>;

    /// Raw relationship rows as (id, record)
    async fn relationship_records(&self) -> Result<Vec<(String, RelationshipRecord)>>;

    /// Raw mention rows as (id, record)
    async fn mention_records(&self) -> Result<Vec<(String, MentionRecord)>>;

    /// Number of stored rows carrying this triple
    async fn count_relationship_triples(
        &self,
        source_entity_id: &str,
        target_entity_id: &str,
        relationship_type: &str,
    ) -> Result<u64>;

    /// Ids of mentions whose entity does not exist
    async fn find_orphaned_mentions(&self) -> Result<Vec<String>>;

    /// Ids of relationships with a missing endpoint
    async fn find_orphaned_relationships(&self) -> Result<Vec<String>>;

    /// Entities whose stored mention_count differs from their mention rows
    async fn find_mention_count_drift(&self) -> Result<Vec<CountDrift>>;

    /// Set mention_count from the mention rows; returns whether it changed
    async fn recount_mentions(&self, entity_id: &str) -> Result<bool>;

    /// Delete a row from one of the graph tables
    async fn delete_record(&self, table: GraphTable, record_id: &str) -> Result<bool>;

    /// Clamp a numeric column into [lower, upper]; returns whether it changed
    async fn clamp_field(
        &self,
        table: GraphTable,
        record_id: &str,
        field: &str,
        lower: f64,
        upper: f64,
    ) -> Result<bool>;

    /// Rewrite normalized_name from name
    async fn renormalize_entity(&self, entity_id: &str) -> Result<bool>;

    async fn record_exists(&self, table: GraphTable, record_id: &str) -> Result<bool>;

    // ========== Validation Log ==========

    /// Append to the log unless an identical uncorrected entry exists;
    /// returns whether a row was written
    async fn log_validation_error(&self, record: &ValidationErrorRecord) -> Result<bool>;

    /// Log entries, optionally limited to ids, newest first
    async fn list_validation_errors(&self, ids: Option<&[String]>) -> Result<Vec<ValidationErrorRecord>>;

    /// Log entries created within [start, end], newest first
    async fn list_validation_errors_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ValidationErrorRecord>>;

    async fn mark_validation_error_corrected(&self, id: &str, method: &str) -> Result<()>;
}

/// What a merge moved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub source_id: String,
    pub target_id: String,
    pub mentions_moved: u64,
    pub relationships_moved: u64,
    pub relationships_combined: u64,
    /// Edges between source and target, which would become self-loops
    pub relationships_dropped: u64,
    pub aliases_moved: u64,
}

/// An entity whose stored mention_count is out of date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDrift {
    pub entity_id: String,
    pub stored: i64,
    pub actual: i64,
}

/// Aggregate counts over the whole graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_entities: u64,
    pub total_relationships: u64,
    pub total_aliases: u64,
    pub total_mentions: u64,
    pub entities_by_type: BTreeMap<String, u64>,
    pub relationships_by_type: BTreeMap<String, u64>,
}
