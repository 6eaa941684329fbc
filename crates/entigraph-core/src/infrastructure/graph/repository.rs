//! SQLite implementation of the graph repositories
//!
//! Every write that touches more than one row runs in a transaction. Inside
//! a transaction all statements go through the transaction's connection, so
//! the code also works on single-connection pools.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::domain::graph::{
    AliasType, CountDrift, Entity, EntityAlias, EntityMention, EntityRecord, EntityRelationship,
    EntityType, GraphRepository, GraphStats, GraphTable, IntegrityRepository, MentionRecord,
    MergeOutcome, RelationshipCandidate, RelationshipRecord, RelationshipType, Severity,
    ValidationErrorRecord, ValidationType, union_context,
};
use crate::error::{Error, Result};

/// Confidence given to the alias a merge leaves behind for the source name
const MERGED_NAME_ALIAS_CONFIDENCE: f64 = 0.9;

/// SQLite implementation of the entity graph repositories
#[derive(Clone)]
pub struct SqliteGraphRepository {
    pool: SqlitePool,
}

impl SqliteGraphRepository {
    /// Create a new SQLite graph repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Keep the rows that convert cleanly; malformed ones are left for the integrity pass
fn readable<T>(rows: impl IntoIterator<Item = Result<T>>, table: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match row {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(table, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect()
}

/// LIKE pattern matching `needle` anywhere, with wildcards escaped
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Numeric columns that may be clamped, per table
fn clampable(table: GraphTable, field: &str) -> bool {
    matches!(
        (table, field),
        (GraphTable::Entities, "confidence_score" | "mention_count")
            | (GraphTable::EntityAliases, "confidence_score")
            | (GraphTable::EntityMentions, "confidence_score")
            | (GraphTable::EntityRelationships, "strength" | "mention_count")
    )
}

async fn fetch_entity(conn: &mut SqliteConnection, id: &str) -> Result<Option<Entity>> {
    let row: Option<EntityRow> = sqlx::query_as("SELECT * FROM entities WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| r.into_entity()).transpose()
}

async fn fetch_relationship_by_triple(
    conn: &mut SqliteConnection,
    source_entity_id: &str,
    target_entity_id: &str,
    relationship_type: RelationshipType,
) -> Result<Option<EntityRelationship>> {
    let row: Option<RelationshipRow> = sqlx::query_as(
        r#"
        SELECT * FROM entity_relationships
        WHERE source_entity_id = ? AND target_entity_id = ? AND relationship_type = ?
        "#,
    )
    .bind(source_entity_id)
    .bind(target_entity_id)
    .bind(relationship_type.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    row.map(|r| r.into_relationship()).transpose()
}

async fn insert_relationship(conn: &mut SqliteConnection, rel: &EntityRelationship) -> Result<()> {
    let context = serde_json::to_string(&rel.context_messages)?;
    sqlx::query(
        r#"
        INSERT INTO entity_relationships (
            id, source_entity_id, target_entity_id, relationship_type, strength,
            first_mentioned_at, last_mentioned_at, mention_count, context_messages,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&rel.id)
    .bind(&rel.source_entity_id)
    .bind(&rel.target_entity_id)
    .bind(rel.relationship_type.as_str())
    .bind(rel.strength)
    .bind(rel.first_mentioned_at.to_rfc3339())
    .bind(rel.last_mentioned_at.to_rfc3339())
    .bind(rel.mention_count)
    .bind(&context)
    .bind(rel.created_at.to_rfc3339())
    .bind(rel.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rewrite every mutable column of an edge, endpoints included
async fn update_relationship(conn: &mut SqliteConnection, rel: &EntityRelationship) -> Result<()> {
    let context = serde_json::to_string(&rel.context_messages)?;
    sqlx::query(
        r#"
        UPDATE entity_relationships SET
            source_entity_id = ?, target_entity_id = ?, strength = ?,
            first_mentioned_at = ?, last_mentioned_at = ?, mention_count = ?,
            context_messages = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&rel.source_entity_id)
    .bind(&rel.target_entity_id)
    .bind(rel.strength)
    .bind(rel.first_mentioned_at.to_rfc3339())
    .bind(rel.last_mentioned_at.to_rfc3339())
    .bind(rel.mention_count)
    .bind(&context)
    .bind(rel.updated_at.to_rfc3339())
    .bind(&rel.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl SqliteGraphRepository {
    /// Body of [`GraphRepository::merge_entities`], run inside the caller's transaction
    async fn merge_in(
        conn: &mut SqliteConnection,
        source_id: &str,
        target_id: &str,
        max_context: usize,
    ) -> Result<MergeOutcome> {
        let source = fetch_entity(conn, source_id)
            .await?
            .ok_or_else(|| Error::MergeSourceNotFound(source_id.to_string()))?;
        let target = fetch_entity(conn, target_id)
            .await?
            .ok_or_else(|| Error::MergeTargetNotFound(target_id.to_string()))?;

        let mut outcome = MergeOutcome {
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            ..Default::default()
        };

        outcome.mentions_moved = sqlx::query("UPDATE entity_mentions SET entity_id = ? WHERE entity_id = ?")
            .bind(&target.id)
            .bind(&source.id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        let rows: Vec<RelationshipRow> = sqlx::query_as(
            "SELECT * FROM entity_relationships WHERE source_entity_id = ? OR target_entity_id = ? ORDER BY id",
        )
        .bind(&source.id)
        .bind(&source.id)
        .fetch_all(&mut *conn)
        .await?;

        for row in rows {
            let mut rel = row.into_relationship()?;
            if rel.source_entity_id == source.id {
                rel.source_entity_id = target.id.clone();
            }
            if rel.target_entity_id == source.id {
                rel.target_entity_id = target.id.clone();
            }

            if rel.source_entity_id == rel.target_entity_id {
                sqlx::query("DELETE FROM entity_relationships WHERE id = ?")
                    .bind(&rel.id)
                    .execute(&mut *conn)
                    .await?;
                outcome.relationships_dropped += 1;
                continue;
            }

            let existing = fetch_relationship_by_triple(
                conn,
                &rel.source_entity_id,
                &rel.target_entity_id,
                rel.relationship_type,
            )
            .await?;

            match existing {
                Some(mut kept) if kept.id != rel.id => {
                    kept.mention_count += rel.mention_count;
                    kept.strength = kept.strength.max(rel.strength).clamp(0.0, 1.0);
                    kept.context_messages =
                        union_context(&kept.context_messages, &rel.context_messages, max_context);
                    kept.first_mentioned_at = kept.first_mentioned_at.min(rel.first_mentioned_at);
                    kept.last_mentioned_at = kept.last_mentioned_at.max(rel.last_mentioned_at);
                    kept.updated_at = Utc::now();

                    sqlx::query("DELETE FROM entity_relationships WHERE id = ?")
                        .bind(&rel.id)
                        .execute(&mut *conn)
                        .await?;
                    update_relationship(conn, &kept).await?;
                    outcome.relationships_combined += 1;
                }
                _ => {
                    rel.updated_at = Utc::now();
                    update_relationship(conn, &rel).await?;
                    outcome.relationships_moved += 1;
                }
            }
        }

        // aliases the target already has are dropped with the source row
        outcome.aliases_moved = sqlx::query(
            r#"
            UPDATE entity_aliases SET entity_id = ?
            WHERE entity_id = ?
              AND alias NOT IN (SELECT alias FROM entity_aliases WHERE entity_id = ?)
            "#,
        )
        .bind(&target.id)
        .bind(&source.id)
        .bind(&target.id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let name_alias = EntityAlias::new(&target.id, &source.name, AliasType::Variation)
            .with_confidence(MERGED_NAME_ALIAS_CONFIDENCE);
        sqlx::query(
            r#"
            INSERT INTO entity_aliases (id, entity_id, alias, alias_type, confidence_score, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(entity_id, alias) DO UPDATE SET
                confidence_score = MAX(entity_aliases.confidence_score, excluded.confidence_score)
            "#,
        )
        .bind(&name_alias.id)
        .bind(&name_alias.entity_id)
        .bind(&name_alias.alias)
        .bind(name_alias.alias_type.as_str())
        .bind(name_alias.confidence_score)
        .bind(name_alias.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        let last_mentioned_at = match (source.last_mentioned_at, target.last_mentioned_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        sqlx::query(
            r#"
            UPDATE entities SET
                mention_count = (SELECT COUNT(*) FROM entity_mentions WHERE entity_id = ?),
                last_mentioned_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&target.id)
        .bind(last_mentioned_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(&target.id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(&source.id)
            .execute(&mut *conn)
            .await?;

        Ok(outcome)
    }
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    // ========== Entity Operations ==========

    async fn insert_entity(&self, entity: &Entity) -> Result<Entity> {
        let metadata = entity.metadata.as_ref().map(|m| m.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO entities (
                id, name, normalized_name, entity_type, canonical_form, confidence_score,
                mention_count, last_mentioned_at, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(normalized_name, entity_type) DO NOTHING
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.name)
        .bind(&entity.normalized_name)
        .bind(entity.entity_type.as_str())
        .bind(&entity.canonical_form)
        .bind(entity.confidence_score)
        .bind(entity.mention_count)
        .bind(entity.last_mentioned_at.map(|t| t.to_rfc3339()))
        .bind(&metadata)
        .bind(entity.created_at.to_rfc3339())
        .bind(entity.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(name = %entity.name, entity_type = %entity.entity_type, "Entity already exists");
        } else {
            debug!(entity_id = %entity.id, name = %entity.name, "Entity inserted");
        }

        self.find_entity_by_normalized_name(&entity.normalized_name, entity.entity_type)
            .await?
            .ok_or_else(|| Error::EntityNotFound(entity.id.clone()))
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as("SELECT * FROM entities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_entity()).transpose()
    }

    async fn find_entity_by_normalized_name(
        &self,
        normalized_name: &str,
        entity_type: EntityType,
    ) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(
            "SELECT * FROM entities WHERE normalized_name = ? AND entity_type = ?",
        )
        .bind(normalized_name)
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_entity()).transpose()
    }

    async fn list_entities_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            "SELECT * FROM entities WHERE entity_type = ? ORDER BY mention_count DESC, id",
        )
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(readable(rows.into_iter().map(|r| r.into_entity()), "entities"))
    }

    async fn list_entities(&self) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as("SELECT * FROM entities ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(readable(rows.into_iter().map(|r| r.into_entity()), "entities"))
    }

    async fn search_entities(
        &self,
        needle: &str,
        entity_types: Option<&[EntityType]>,
    ) -> Result<Vec<Entity>> {
        let pattern = contains_pattern(needle.trim());
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT e.* FROM entities e
            LEFT JOIN entity_aliases a ON a.entity_id = e.id
            WHERE LOWER(e.name) LIKE ? ESCAPE '\'
               OR e.normalized_name LIKE ? ESCAPE '\'
               OR LOWER(a.alias) LIKE ? ESCAPE '\'
            ORDER BY e.id
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        let entities = readable(rows.into_iter().map(|r| r.into_entity()), "entities");
        Ok(match entity_types {
            Some(types) => entities
                .into_iter()
                .filter(|e| types.contains(&e.entity_type))
                .collect(),
            None => entities,
        })
    }

    // ========== Alias Operations ==========

    async fn upsert_alias(&self, alias: &EntityAlias) -> Result<EntityAlias> {
        if self.get_entity(&alias.entity_id).await?.is_none() {
            return Err(Error::EntityNotFound(alias.entity_id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO entity_aliases (id, entity_id, alias, alias_type, confidence_score, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(entity_id, alias) DO UPDATE SET
                confidence_score = MAX(entity_aliases.confidence_score, excluded.confidence_score)
            "#,
        )
        .bind(&alias.id)
        .bind(&alias.entity_id)
        .bind(&alias.alias)
        .bind(alias.alias_type.as_str())
        .bind(alias.confidence_score)
        .bind(alias.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row: AliasRow = sqlx::query_as("SELECT * FROM entity_aliases WHERE entity_id = ? AND alias = ?")
            .bind(&alias.entity_id)
            .bind(&alias.alias)
            .fetch_one(&self.pool)
            .await?;

        debug!(entity_id = %alias.entity_id, alias = %alias.alias, "Alias stored");
        row.into_alias()
    }

    async fn find_entity_by_alias(
        &self,
        alias: &str,
        entity_type: EntityType,
    ) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(
            r#"
            SELECT e.* FROM entities e
            JOIN entity_aliases a ON a.entity_id = e.id
            WHERE LOWER(a.alias) = LOWER(?) AND e.entity_type = ?
            ORDER BY a.confidence_score DESC, e.id
            LIMIT 1
            "#,
        )
        .bind(alias.trim())
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_entity()).transpose()
    }

    async fn list_aliases(&self, entity_id: &str) -> Result<Vec<EntityAlias>> {
        let rows: Vec<AliasRow> = sqlx::query_as(
            "SELECT * FROM entity_aliases WHERE entity_id = ? ORDER BY confidence_score DESC, alias",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(readable(rows.into_iter().map(|r| r.into_alias()), "entity_aliases"))
    }

    async fn list_aliases_by_type(&self, entity_type: EntityType) -> Result<Vec<EntityAlias>> {
        let rows: Vec<AliasRow> = sqlx::query_as(
            r#"
            SELECT a.* FROM entity_aliases a
            JOIN entities e ON e.id = a.entity_id
            WHERE e.entity_type = ?
            ORDER BY a.entity_id, a.confidence_score DESC
            "#,
        )
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(readable(rows.into_iter().map(|r| r.into_alias()), "entity_aliases"))
    }

    // ========== Mention Operations ==========

    async fn record_mention(&self, mention: &EntityMention) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let Some(entity) = fetch_entity(&mut *tx, &mention.entity_id).await? else {
            return Err(Error::ReferentialIntegrity(format!(
                "mention references missing entity '{}'",
                mention.entity_id
            )));
        };

        sqlx::query(
            r#"
            INSERT INTO entity_mentions (
                id, entity_id, message_id, conversation_id, mention_text,
                start_position, end_position, confidence_score, extraction_method, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&mention.id)
        .bind(&mention.entity_id)
        .bind(&mention.message_id)
        .bind(&mention.conversation_id)
        .bind(&mention.mention_text)
        .bind(mention.start_position)
        .bind(mention.end_position)
        .bind(mention.confidence_score)
        .bind(&mention.extraction_method)
        .bind(mention.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let last_mentioned_at = match entity.last_mentioned_at {
            Some(previous) => previous.max(mention.created_at),
            None => mention.created_at,
        };
        sqlx::query(
            "UPDATE entities SET mention_count = mention_count + 1, last_mentioned_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(last_mentioned_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(&entity.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            entity_id = %mention.entity_id,
            message_id = %mention.message_id,
            "Mention recorded"
        );
        Ok(())
    }

    async fn list_mentions(&self, entity_id: &str) -> Result<Vec<EntityMention>> {
        let rows: Vec<MentionRow> = sqlx::query_as(
            "SELECT * FROM entity_mentions WHERE entity_id = ? ORDER BY created_at, id",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_mention()).collect())
    }

    // ========== Relationship Operations ==========

    async fn upsert_relationship(
        &self,
        candidate: &RelationshipCandidate,
        max_context: usize,
    ) -> Result<EntityRelationship> {
        let mut tx = self.pool.begin().await?;

        for id in [&candidate.source_entity_id, &candidate.target_entity_id] {
            if fetch_entity(&mut *tx, id).await?.is_none() {
                return Err(Error::ReferentialIntegrity(format!(
                    "relationship references missing entity '{}'",
                    id
                )));
            }
        }

        let existing = fetch_relationship_by_triple(
            &mut *tx,
            &candidate.source_entity_id,
            &candidate.target_entity_id,
            candidate.relationship_type,
        )
        .await?;

        let relationship = match existing {
            Some(mut rel) => {
                rel.absorb(candidate, max_context);
                update_relationship(&mut *tx, &rel).await?;
                debug!(
                    relationship_id = %rel.id,
                    mention_count = rel.mention_count,
                    strength = rel.strength,
                    "Relationship strengthened"
                );
                rel
            }
            None => {
                let mut rel = EntityRelationship::from_candidate(candidate);
                rel.context_messages.truncate(max_context);
                insert_relationship(&mut *tx, &rel).await?;
                debug!(
                    relationship_id = %rel.id,
                    source = %rel.source_entity_id,
                    target = %rel.target_entity_id,
                    relationship_type = %rel.relationship_type,
                    "Relationship created"
                );
                rel
            }
        };

        tx.commit().await?;
        Ok(relationship)
    }

    async fn list_relationships_for_entity(&self, entity_id: &str) -> Result<Vec<EntityRelationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT * FROM entity_relationships
            WHERE source_entity_id = ? OR target_entity_id = ?
            ORDER BY strength DESC, id
            "#,
        )
        .bind(entity_id)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(readable(rows.into_iter().map(|r| r.into_relationship()), "entity_relationships"))
    }

    async fn list_relationships(&self) -> Result<Vec<EntityRelationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as("SELECT * FROM entity_relationships ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(readable(rows.into_iter().map(|r| r.into_relationship()), "entity_relationships"))
    }

    // ========== Merge ==========

    async fn merge_entities(
        &self,
        source_id: &str,
        target_id: &str,
        max_context: usize,
    ) -> Result<MergeOutcome> {
        let mut tx = self.pool.begin().await?;

        let outcome = match Self::merge_in(&mut *tx, source_id, target_id, max_context).await {
            Ok(outcome) => outcome,
            Err(e @ (Error::MergeSourceNotFound(_) | Error::MergeTargetNotFound(_))) => return Err(e),
            Err(e) => {
                return Err(Error::MergeFailed {
                    source_id: source_id.to_string(),
                    target_id: target_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        tx.commit().await.map_err(|e| Error::MergeFailed {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            reason: e.to_string(),
        })?;

        info!(source_id = %source_id, target_id = %target_id, "Merge committed");
        Ok(outcome)
    }

    // ========== Statistics ==========

    async fn graph_stats(&self) -> Result<GraphStats> {
        let (total_entities,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;
        let (total_relationships,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entity_relationships")
            .fetch_one(&self.pool)
            .await?;
        let (total_aliases,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entity_aliases")
            .fetch_one(&self.pool)
            .await?;
        let (total_mentions,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entity_mentions")
            .fetch_one(&self.pool)
            .await?;

        let entity_types: Vec<(String, i64)> =
            sqlx::query_as("SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type")
                .fetch_all(&self.pool)
                .await?;
        let relationship_types: Vec<(String, i64)> = sqlx::query_as(
            "SELECT relationship_type, COUNT(*) FROM entity_relationships GROUP BY relationship_type",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(GraphStats {
            total_entities: total_entities as u64,
            total_relationships: total_relationships as u64,
            total_aliases: total_aliases as u64,
            total_mentions: total_mentions as u64,
            entities_by_type: entity_types
                .into_iter()
                .map(|(t, c)| (t, c as u64))
                .collect::<BTreeMap<_, _>>(),
            relationships_by_type: relationship_types
                .into_iter()
                .map(|(t, c)| (t, c as u64))
                .collect(),
        })
    }
}

#[async_trait]
impl IntegrityRepository for SqliteGraphRepository {
    async fn entity_exists(&self, id: &str) -> Result<bool> {
        self.record_exists(GraphTable::Entities, id).await
    }

    async fn entity_records(&self) -> Result<Vec<(String, EntityRecord)>> {
        let rows: Vec<EntityRecordRow> = sqlx::query_as(
            r#"
            SELECT id, name, normalized_name, entity_type, confidence_score, mention_count, metadata
            FROM entities ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_pair()).collect())
    }

    async fn relationship_records(&self) -> Result<Vec<(String, RelationshipRecord)>> {
        let rows: Vec<RelationshipRecordRow> = sqlx::query_as(
            r#"
            SELECT id, source_entity_id, target_entity_id, relationship_type, strength, mention_count
            FROM entity_relationships ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_pair()).collect())
    }

    async fn mention_records(&self) -> Result<Vec<(String, MentionRecord)>> {
        let rows: Vec<MentionRecordRow> = sqlx::query_as(
            r#"
            SELECT id, entity_id, mention_text, start_position, end_position, confidence_score
            FROM entity_mentions ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_pair()).collect())
    }

    async fn count_relationship_triples(
        &self,
        source_entity_id: &str,
        target_entity_id: &str,
        relationship_type: &str,
    ) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM entity_relationships
            WHERE source_entity_id = ? AND target_entity_id = ? AND relationship_type = ?
            "#,
        )
        .bind(source_entity_id)
        .bind(target_entity_id)
        .bind(relationship_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn find_orphaned_mentions(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT m.id FROM entity_mentions m
            LEFT JOIN entities e ON e.id = m.entity_id
            WHERE e.id IS NULL
            ORDER BY m.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn find_orphaned_relationships(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT r.id FROM entity_relationships r
            LEFT JOIN entities s ON s.id = r.source_entity_id
            LEFT JOIN entities t ON t.id = r.target_entity_id
            WHERE s.id IS NULL OR t.id IS NULL
            ORDER BY r.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn find_mention_count_drift(&self) -> Result<Vec<CountDrift>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, stored, actual FROM (
                SELECT e.id AS id,
                       e.mention_count AS stored,
                       (SELECT COUNT(*) FROM entity_mentions m WHERE m.entity_id = e.id) AS actual
                FROM entities e
            )
            WHERE stored != actual
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(entity_id, stored, actual)| CountDrift {
                entity_id,
                stored,
                actual,
            })
            .collect())
    }

    async fn recount_mentions(&self, entity_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE entities SET
                mention_count = (SELECT COUNT(*) FROM entity_mentions WHERE entity_id = ?),
                updated_at = ?
            WHERE id = ?
              AND mention_count != (SELECT COUNT(*) FROM entity_mentions WHERE entity_id = ?)
            "#,
        )
        .bind(entity_id)
        .bind(Utc::now().to_rfc3339())
        .bind(entity_id)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_record(&self, table: GraphTable, record_id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table.as_str());
        let result = sqlx::query(&sql).bind(record_id).execute(&self.pool).await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(table = %table.as_str(), record_id = %record_id, "Record deleted");
        }
        Ok(deleted)
    }

    async fn clamp_field(
        &self,
        table: GraphTable,
        record_id: &str,
        field: &str,
        lower: f64,
        upper: f64,
    ) -> Result<bool> {
        if !clampable(table, field) {
            return Err(Error::InvalidInput(format!(
                "field '{}' of {} cannot be clamped",
                field,
                table.as_str()
            )));
        }
        let sql = format!(
            "UPDATE {table} SET {field} = MIN(MAX({field}, ?), ?) WHERE id = ? AND ({field} < ? OR {field} > ?)",
            table = table.as_str(),
            field = field
        );
        let result = sqlx::query(&sql)
            .bind(lower)
            .bind(upper)
            .bind(record_id)
            .bind(lower)
            .bind(upper)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn renormalize_entity(&self, entity_id: &str) -> Result<bool> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT name, normalized_name FROM entities WHERE id = ?")
                .bind(entity_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some((name, normalized_name)) = row else {
            return Ok(false);
        };

        let expected = Entity::normalize(&name);
        if expected == normalized_name {
            return Ok(false);
        }
        sqlx::query("UPDATE entities SET normalized_name = ?, updated_at = ? WHERE id = ?")
            .bind(&expected)
            .bind(Utc::now().to_rfc3339())
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    async fn record_exists(&self, table: GraphTable, record_id: &str) -> Result<bool> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table.as_str());
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(record_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    // ========== Validation Log ==========

    async fn log_validation_error(&self, record: &ValidationErrorRecord) -> Result<bool> {
        if !record.is_corrected() {
            let (open,): (i64,) = sqlx::query_as(
                r#"
                SELECT COUNT(*) FROM validation_errors
                WHERE table_name = ? AND record_id = ? AND validation_type = ?
                  AND field_name IS ? AND corrected_at IS NULL
                "#,
            )
            .bind(&record.table_name)
            .bind(&record.record_id)
            .bind(record.validation_type.as_str())
            .bind(&record.field_name)
            .fetch_one(&self.pool)
            .await?;
            if open > 0 {
                return Ok(false);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO validation_errors (
                id, table_name, record_id, validation_type, field_name, error_message,
                severity, auto_correctable, created_at, corrected_at, correction_method
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.table_name)
        .bind(&record.record_id)
        .bind(record.validation_type.as_str())
        .bind(&record.field_name)
        .bind(&record.error_message)
        .bind(record.severity.as_str())
        .bind(record.auto_correctable)
        .bind(record.created_at.to_rfc3339())
        .bind(record.corrected_at.map(|t| t.to_rfc3339()))
        .bind(&record.correction_method)
        .execute(&self.pool)
        .await?;

        debug!(
            table = %record.table_name,
            record_id = %record.record_id,
            validation_type = %record.validation_type,
            "Validation error logged"
        );
        Ok(true)
    }

    async fn list_validation_errors(&self, ids: Option<&[String]>) -> Result<Vec<ValidationErrorRecord>> {
        let rows: Vec<ValidationErrorRow> = match ids {
            None => {
                sqlx::query_as("SELECT * FROM validation_errors ORDER BY created_at DESC, id")
                    .fetch_all(&self.pool)
                    .await?
            }
            Some([]) => Vec::new(),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT * FROM validation_errors WHERE id IN ({}) ORDER BY created_at DESC, id",
                    placeholders
                );
                let mut query = sqlx::query_as(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query.fetch_all(&self.pool).await?
            }
        };

        rows.into_iter().map(|r| r.into_record()).collect()
    }

    async fn list_validation_errors_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ValidationErrorRecord>> {
        let start = start.map(|t| t.to_rfc3339());
        let end = end.map(|t| t.to_rfc3339());
        let rows: Vec<ValidationErrorRow> = sqlx::query_as(
            r#"
            SELECT * FROM validation_errors
            WHERE (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(&start)
        .bind(&start)
        .bind(&end)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_record()).collect()
    }

    async fn mark_validation_error_corrected(&self, id: &str, method: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE validation_errors SET corrected_at = ?, correction_method = ? WHERE id = ? AND corrected_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(method)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM validation_errors WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
            if count == 0 {
                return Err(Error::ValidationErrorNotFound(id.to_string()));
            }
        }
        Ok(())
    }
}

// ========== Row Types ==========

#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    name: String,
    normalized_name: String,
    entity_type: String,
    canonical_form: Option<String>,
    confidence_score: f64,
    mention_count: i64,
    last_mentioned_at: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl EntityRow {
    fn into_entity(self) -> Result<Entity> {
        let entity_type = EntityType::parse(&self.entity_type)
            .ok_or_else(|| Error::Other(format!("Invalid entity type: {}", self.entity_type)))?;

        Ok(Entity {
            id: self.id,
            name: self.name,
            normalized_name: self.normalized_name,
            entity_type,
            canonical_form: self.canonical_form,
            confidence_score: self.confidence_score,
            mention_count: self.mention_count,
            last_mentioned_at: self.last_mentioned_at.as_deref().map(parse_timestamp),
            metadata: self
                .metadata
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok()),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct AliasRow {
    id: String,
    entity_id: String,
    alias: String,
    alias_type: String,
    confidence_score: f64,
    created_at: String,
}

impl AliasRow {
    fn into_alias(self) -> Result<EntityAlias> {
        let alias_type = AliasType::parse(&self.alias_type)
            .ok_or_else(|| Error::Other(format!("Invalid alias type: {}", self.alias_type)))?;

        Ok(EntityAlias {
            id: self.id,
            entity_id: self.entity_id,
            alias: self.alias,
            alias_type,
            confidence_score: self.confidence_score,
            created_at: parse_timestamp(&self.created_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct MentionRow {
    id: String,
    entity_id: String,
    message_id: String,
    conversation_id: String,
    mention_text: String,
    start_position: i64,
    end_position: i64,
    confidence_score: f64,
    extraction_method: String,
    created_at: String,
}

impl MentionRow {
    fn into_mention(self) -> EntityMention {
        EntityMention {
            id: self.id,
            entity_id: self.entity_id,
            message_id: self.message_id,
            conversation_id: self.conversation_id,
            mention_text: self.mention_text,
            start_position: self.start_position,
            end_position: self.end_position,
            confidence_score: self.confidence_score,
            extraction_method: self.extraction_method,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug, FromRow)]
struct RelationshipRow {
    id: String,
    source_entity_id: String,
    target_entity_id: String,
    relationship_type: String,
    strength: f64,
    first_mentioned_at: String,
    last_mentioned_at: String,
    mention_count: i64,
    context_messages: String,
    created_at: String,
    updated_at: String,
}

impl RelationshipRow {
    fn into_relationship(self) -> Result<EntityRelationship> {
        let relationship_type = RelationshipType::parse(&self.relationship_type).ok_or_else(|| {
            Error::Other(format!("Invalid relationship type: {}", self.relationship_type))
        })?;

        Ok(EntityRelationship {
            id: self.id,
            source_entity_id: self.source_entity_id,
            target_entity_id: self.target_entity_id,
            relationship_type,
            strength: self.strength,
            first_mentioned_at: parse_timestamp(&self.first_mentioned_at),
            last_mentioned_at: parse_timestamp(&self.last_mentioned_at),
            mention_count: self.mention_count,
            context_messages: serde_json::from_str(&self.context_messages).unwrap_or_default(),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct EntityRecordRow {
    id: String,
    name: String,
    normalized_name: String,
    entity_type: String,
    confidence_score: f64,
    mention_count: i64,
    metadata: Option<String>,
}

impl EntityRecordRow {
    fn into_pair(self) -> (String, EntityRecord) {
        (
            self.id,
            EntityRecord {
                name: self.name,
                normalized_name: self.normalized_name,
                entity_type: self.entity_type,
                confidence_score: self.confidence_score,
                mention_count: self.mention_count,
                metadata: self.metadata,
            },
        )
    }
}

#[derive(Debug, FromRow)]
struct RelationshipRecordRow {
    id: String,
    source_entity_id: String,
    target_entity_id: String,
    relationship_type: String,
    strength: f64,
    mention_count: i64,
}

impl RelationshipRecordRow {
    fn into_pair(self) -> (String, RelationshipRecord) {
        (
            self.id,
            RelationshipRecord {
                source_entity_id: self.source_entity_id,
                target_entity_id: self.target_entity_id,
                relationship_type: self.relationship_type,
                strength: self.strength,
                mention_count: self.mention_count,
            },
        )
    }
}

#[derive(Debug, FromRow)]
struct MentionRecordRow {
    id: String,
    entity_id: String,
    mention_text: String,
    start_position: i64,
    end_position: i64,
    confidence_score: f64,
}

impl MentionRecordRow {
    fn into_pair(self) -> (String, MentionRecord) {
        (
            self.id,
            MentionRecord {
                entity_id: self.entity_id,
                mention_text: self.mention_text,
                start_position: self.start_position,
                end_position: self.end_position,
                confidence_score: self.confidence_score,
            },
        )
    }
}

#[derive(Debug, FromRow)]
struct ValidationErrorRow {
    id: String,
    table_name: String,
    record_id: String,
    validation_type: String,
    field_name: Option<String>,
    error_message: String,
    severity: String,
    auto_correctable: bool,
    created_at: String,
    corrected_at: Option<String>,
    correction_method: Option<String>,
}

impl ValidationErrorRow {
    fn into_record(self) -> Result<ValidationErrorRecord> {
        let validation_type = ValidationType::parse(&self.validation_type).ok_or_else(|| {
            Error::Other(format!("Invalid validation type: {}", self.validation_type))
        })?;
        let severity = Severity::parse(&self.severity)
            .ok_or_else(|| Error::Other(format!("Invalid severity: {}", self.severity)))?;

        Ok(ValidationErrorRecord {
            id: self.id,
            table_name: self.table_name,
            record_id: self.record_id,
            validation_type,
            field_name: self.field_name,
            error_message: self.error_message,
            severity,
            auto_correctable: self.auto_correctable,
            created_at: parse_timestamp(&self.created_at),
            corrected_at: self.corrected_at.as_deref().map(parse_timestamp),
            correction_method: self.correction_method,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::ValidationIssue;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqliteGraphRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        SqliteGraphRepository::new(pool)
    }

    async fn entity(repo: &SqliteGraphRepository, name: &str, ty: EntityType) -> Entity {
        repo.insert_entity(&Entity::new(name, ty)).await.unwrap()
    }

    fn mention(entity_id: &str, message_id: &str) -> EntityMention {
        EntityMention::new(entity_id, message_id, "c1", "x", 0, 1).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_entity() {
        let repo = setup_test_db().await;

        let stored = repo
            .insert_entity(
                &Entity::new("Acme Corp", EntityType::Organization)
                    .with_metadata(serde_json::json!({"sector": "widgets"})),
            )
            .await
            .unwrap();

        let retrieved = repo.get_entity(&stored.id).await.unwrap().unwrap();
        assert_eq!(retrieved.name, "Acme Corp");
        assert_eq!(retrieved.normalized_name, "acme corp");
        assert_eq!(retrieved.metadata.unwrap()["sector"], "widgets");
        assert!(repo.get_entity("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_conflict_returns_existing() {
        let repo = setup_test_db().await;

        let first = entity(&repo, "Acme Corp", EntityType::Organization).await;
        let second = entity(&repo, "  ACME   corp ", EntityType::Organization).await;
        assert_eq!(first.id, second.id);

        let other_type = entity(&repo, "Acme Corp", EntityType::Product).await;
        assert_ne!(first.id, other_type.id);
        assert_eq!(repo.list_entities().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_alias_upsert_keeps_higher_confidence() {
        let repo = setup_test_db().await;
        let js = entity(&repo, "JavaScript", EntityType::Technical).await;

        repo.upsert_alias(&EntityAlias::new(&js.id, "JS", AliasType::Abbreviation).with_confidence(0.9))
            .await
            .unwrap();
        let again = repo
            .upsert_alias(&EntityAlias::new(&js.id, "JS", AliasType::Abbreviation).with_confidence(0.4))
            .await
            .unwrap();
        assert!((again.confidence_score - 0.9).abs() < 1e-9);
        assert_eq!(repo.list_aliases(&js.id).await.unwrap().len(), 1);

        let found = repo.find_entity_by_alias("js", EntityType::Technical).await.unwrap();
        assert_eq!(found.unwrap().id, js.id);
        assert!(
            repo.find_entity_by_alias("js", EntityType::Product)
                .await
                .unwrap()
                .is_none()
        );

        let missing = repo
            .upsert_alias(&EntityAlias::new("nope", "X", AliasType::Variation))
            .await;
        assert!(matches!(missing, Err(Error::EntityNotFound(_))));
    }

    #[tokio::test]
    async fn test_record_mention_updates_counters() {
        let repo = setup_test_db().await;
        let john = entity(&repo, "John Doe", EntityType::Person).await;

        let early = Utc::now() - chrono::Duration::hours(2);
        let late = Utc::now() - chrono::Duration::hours(1);
        repo.record_mention(&mention(&john.id, "m2").at(late)).await.unwrap();
        repo.record_mention(&mention(&john.id, "m1").at(early)).await.unwrap();

        let stored = repo.get_entity(&john.id).await.unwrap().unwrap();
        assert_eq!(stored.mention_count, 2);
        assert_eq!(
            stored.last_mentioned_at.unwrap().timestamp(),
            late.timestamp()
        );
        assert_eq!(repo.list_mentions(&john.id).await.unwrap()[0].message_id, "m1");
    }

    #[tokio::test]
    async fn test_record_mention_rejects_missing_entity() {
        let repo = setup_test_db().await;

        let result = repo.record_mention(&mention("ghost", "m1")).await;
        assert!(matches!(result, Err(Error::ReferentialIntegrity(_))));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entity_mentions")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_upsert_relationship_folds_triple() {
        let repo = setup_test_db().await;
        let john = entity(&repo, "John Doe", EntityType::Person).await;
        let acme = entity(&repo, "Acme Corp", EntityType::Organization).await;

        let candidate = |msg: &str, confidence: f64| {
            RelationshipCandidate::new(&john.id, &acme.id, RelationshipType::WorksFor, confidence)
                .with_message(msg)
        };

        let first = repo.upsert_relationship(&candidate("m1", 1.7), 20).await.unwrap();
        assert!((first.strength - 1.0).abs() < 1e-9);

        let second = repo.upsert_relationship(&candidate("m2", 0.5), 20).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.mention_count, 2);
        assert!(second.strength <= 1.0);
        assert_eq!(second.context_messages, vec!["m1", "m2"]);
        assert_eq!(repo.list_relationships().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_relationship_rejects_missing_endpoint() {
        let repo = setup_test_db().await;
        let john = entity(&repo, "John Doe", EntityType::Person).await;

        let result = repo
            .upsert_relationship(
                &RelationshipCandidate::new(&john.id, "ghost", RelationshipType::WorksFor, 0.8),
                20,
            )
            .await;
        assert!(matches!(result, Err(Error::ReferentialIntegrity(_))));
        assert!(repo.list_relationships().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_combines_and_drops_edges() {
        let repo = setup_test_db().await;
        let js = entity(&repo, "JS", EntityType::Technical).await;
        let javascript = entity(&repo, "JavaScript", EntityType::Technical).await;
        let react = entity(&repo, "React", EntityType::Technical).await;

        repo.record_mention(&mention(&js.id, "m1")).await.unwrap();
        repo.record_mention(&mention(&javascript.id, "m2")).await.unwrap();
        repo.upsert_alias(&EntityAlias::new(&js.id, "ecmascript", AliasType::Variation))
            .await
            .unwrap();

        for (source, msg, confidence) in [(&js, "m1", 0.6), (&javascript, "m2", 0.8)] {
            repo.upsert_relationship(
                &RelationshipCandidate::new(&react.id, &source.id, RelationshipType::RelatedTo, confidence)
                    .with_message(msg),
                20,
            )
            .await
            .unwrap();
        }
        repo.upsert_relationship(
            &RelationshipCandidate::new(&js.id, &javascript.id, RelationshipType::RelatedTo, 0.9),
            20,
        )
        .await
        .unwrap();

        let outcome = repo.merge_entities(&js.id, &javascript.id, 20).await.unwrap();
        assert_eq!(outcome.mentions_moved, 1);
        assert_eq!(outcome.relationships_combined, 1);
        assert_eq!(outcome.relationships_dropped, 1);
        assert_eq!(outcome.aliases_moved, 1);

        assert!(repo.get_entity(&js.id).await.unwrap().is_none());
        let target = repo.get_entity(&javascript.id).await.unwrap().unwrap();
        assert_eq!(target.mention_count, 2);

        let edges = repo.list_relationships().await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].mention_count, 2);
        assert!((edges[0].strength - 0.8).abs() < 1e-9);
        assert_eq!(edges[0].context_messages, vec!["m2", "m1"]);

        let by_old_name = repo.find_entity_by_alias("JS", EntityType::Technical).await.unwrap();
        assert_eq!(by_old_name.unwrap().id, javascript.id);
    }

    #[tokio::test]
    async fn test_merge_reports_missing_sides() {
        let repo = setup_test_db().await;
        let john = entity(&repo, "John Doe", EntityType::Person).await;

        let missing_source = repo.merge_entities("ghost", &john.id, 20).await;
        assert!(matches!(missing_source, Err(Error::MergeSourceNotFound(_))));

        let missing_target = repo.merge_entities(&john.id, "ghost", 20).await;
        assert!(matches!(missing_target, Err(Error::MergeTargetNotFound(_))));

        assert!(repo.get_entity(&john.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_search_matches_names_and_aliases() {
        let repo = setup_test_db().await;
        let js = entity(&repo, "JavaScript", EntityType::Technical).await;
        entity(&repo, "Java Island", EntityType::Location).await;
        entity(&repo, "100% Pure", EntityType::Product).await;
        repo.upsert_alias(&EntityAlias::new(&js.id, "ECMAScript", AliasType::Formal))
            .await
            .unwrap();

        assert_eq!(repo.search_entities("java", None).await.unwrap().len(), 2);
        assert_eq!(
            repo.search_entities("java", Some(&[EntityType::Technical]))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(repo.search_entities("ecma", None).await.unwrap()[0].id, js.id);
        assert_eq!(repo.search_entities("0%", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_orphans_and_drift() {
        let repo = setup_test_db().await;
        let john = entity(&repo, "John Doe", EntityType::Person).await;
        repo.record_mention(&mention(&john.id, "m1")).await.unwrap();

        sqlx::query("PRAGMA foreign_keys = OFF").execute(repo.pool()).await.unwrap();
        sqlx::query(
            "INSERT INTO entity_mentions (id, entity_id, message_id, conversation_id, mention_text, start_position, end_position, created_at) VALUES ('orphan', 'ghost', 'm1', 'c1', 'x', 0, 1, '2024-01-01T00:00:00+00:00')",
        )
        .execute(repo.pool())
        .await
        .unwrap();
        sqlx::query("PRAGMA foreign_keys = ON").execute(repo.pool()).await.unwrap();
        sqlx::query("UPDATE entities SET mention_count = 7 WHERE id = ?")
            .bind(&john.id)
            .execute(repo.pool())
            .await
            .unwrap();

        assert_eq!(repo.find_orphaned_mentions().await.unwrap(), vec!["orphan"]);
        let drift = repo.find_mention_count_drift().await.unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!((drift[0].stored, drift[0].actual), (7, 1));

        assert!(repo.recount_mentions(&john.id).await.unwrap());
        assert!(!repo.recount_mentions(&john.id).await.unwrap());
        assert!(repo.find_mention_count_drift().await.unwrap().is_empty());

        assert!(repo.delete_record(GraphTable::EntityMentions, "orphan").await.unwrap());
        assert!(repo.find_orphaned_mentions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clamp_field() {
        let repo = setup_test_db().await;
        let john = entity(&repo, "John Doe", EntityType::Person).await;
        sqlx::query("UPDATE entities SET confidence_score = 1.4 WHERE id = ?")
            .bind(&john.id)
            .execute(repo.pool())
            .await
            .unwrap();

        assert!(
            repo.clamp_field(GraphTable::Entities, &john.id, "confidence_score", 0.0, 1.0)
                .await
                .unwrap()
        );
        let stored = repo.get_entity(&john.id).await.unwrap().unwrap();
        assert!((stored.confidence_score - 1.0).abs() < 1e-9);

        let bad_field = repo
            .clamp_field(GraphTable::Entities, &john.id, "name", 0.0, 1.0)
            .await;
        assert!(matches!(bad_field, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_validation_log_dedup_and_correction() {
        let repo = setup_test_db().await;
        let issue = ValidationIssue::error(ValidationType::Range, "strength", "too strong").correctable();

        let first = ValidationErrorRecord::from_issue(GraphTable::EntityRelationships, "r1", &issue);
        assert!(repo.log_validation_error(&first).await.unwrap());
        let duplicate = ValidationErrorRecord::from_issue(GraphTable::EntityRelationships, "r1", &issue);
        assert!(!repo.log_validation_error(&duplicate).await.unwrap());

        repo.mark_validation_error_corrected(&first.id, "clamp_range")
            .await
            .unwrap();
        let stored = repo
            .list_validation_errors(Some(&[first.id.clone()]))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_corrected());
        assert_eq!(stored[0].correction_method.as_deref(), Some("clamp_range"));
        assert!(stored[0].auto_correctable);

        // once corrected, the same finding may be logged again
        let again = ValidationErrorRecord::from_issue(GraphTable::EntityRelationships, "r1", &issue);
        assert!(repo.log_validation_error(&again).await.unwrap());

        let missing = repo.mark_validation_error_corrected("ghost", "x").await;
        assert!(matches!(missing, Err(Error::ValidationErrorNotFound(_))));

        let window = repo
            .list_validation_errors_between(Some(Utc::now() - chrono::Duration::hours(1)), None)
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn test_graph_stats() {
        let repo = setup_test_db().await;
        let john = entity(&repo, "John Doe", EntityType::Person).await;
        let jane = entity(&repo, "Jane Roe", EntityType::Person).await;
        let acme = entity(&repo, "Acme Corp", EntityType::Organization).await;
        repo.upsert_relationship(
            &RelationshipCandidate::new(&john.id, &acme.id, RelationshipType::WorksFor, 0.8),
            20,
        )
        .await
        .unwrap();
        repo.upsert_relationship(
            &RelationshipCandidate::new(&john.id, &jane.id, RelationshipType::DiscussedWith, 0.8),
            20,
        )
        .await
        .unwrap();
        repo.record_mention(&mention(&john.id, "m1")).await.unwrap();

        let stats = repo.graph_stats().await.unwrap();
        assert_eq!(stats.total_entities, 3);
        assert_eq!(stats.total_relationships, 2);
        assert_eq!(stats.total_mentions, 1);
        assert_eq!(stats.entities_by_type["person"], 2);
        assert_eq!(stats.relationships_by_type["works_for"], 1);
    }
}
