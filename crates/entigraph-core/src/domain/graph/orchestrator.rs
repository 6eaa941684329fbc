//! Graph orchestration
//!
//! Drives one message (or a whole conversation) through extraction, entity
//! linking and relationship detection, and turns the result into insights.
//! This is the only place that decides which failures are soft: a mention
//! that cannot be linked or a relationship pass that fails is logged and
//! counted, the rest of the message still goes through.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::alias::EntityAlias;
use super::detector::{DetectorConfig, LinkedEntity, MessageAnalysis, RelationshipDetector};
use super::entity::{Entity, EntityType};
use super::export::{ExportFormat, export_graph};
use super::extractor::{EntityExtractor, ExtractedMention};
use super::insight::{Insight, InsightKind, merge_insights};
use super::linker::{EntityLinker, LinkerConfig};
use super::mention::EntityMention;
use super::message::MessageSource;
use super::relationship::EntityRelationship;
use super::repository::{GraphRepository, GraphStats};
use super::similarity::name_similarity;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// People in one message needed for a collaboration_network insight
    pub collaboration_threshold: usize,
    /// Technical entities in one message needed for a technology_stack insight
    pub technology_stack_threshold: usize,
    /// Relationship count at which an entity is a hub
    pub hub_threshold: usize,
    /// Conversation mentions a person needs before being a key person
    pub key_person_min_mentions: usize,
    /// How far above the mean person score a key person must be
    pub key_person_ratio: f64,
    /// Edge density among search hits needed for a relationship_cluster
    pub cluster_density: f64,
    /// Search hits needed before cluster detection runs
    pub cluster_min_entities: usize,
    /// Default search result cap
    pub search_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collaboration_threshold: 3,
            technology_stack_threshold: 3,
            hub_threshold: 3,
            key_person_min_mentions: 2,
            key_person_ratio: 1.5,
            cluster_density: 0.5,
            cluster_min_entities: 3,
            search_limit: 20,
        }
    }
}

/// Result of processing one message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageProcessingResult {
    pub message_id: String,
    pub conversation_id: String,
    /// Mentions linked and recorded
    pub entities_extracted: usize,
    /// Of those, how many created a new entity
    pub entities_created: usize,
    pub relationships_detected: usize,
    pub co_occurrences: usize,
    pub processing_time_ms: u64,
    pub insights: Vec<Insight>,
    /// Entities mentioned in the message, first mention order, distinct
    pub entities: Vec<Entity>,
    /// Mentions per entity id in this message
    pub mention_counts: BTreeMap<String, usize>,
    pub relationships: Vec<EntityRelationship>,
    /// Soft failures, one line each
    pub failures: Vec<String>,
}

/// Result of processing a whole conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationProcessingResult {
    pub conversation_id: String,
    pub messages_processed: usize,
    pub messages_failed: usize,
    pub entities_extracted: usize,
    pub relationships_detected: usize,
    pub processing_time_ms: u64,
    pub insights: Vec<Insight>,
    pub failures: Vec<String>,
}

/// One entity and its immediate neighborhood
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityGraph {
    pub entity: Option<Entity>,
    pub aliases: Vec<EntityAlias>,
    pub relationships: Vec<EntityRelationship>,
    pub related_entities: Vec<Entity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub entity_types: Option<Vec<EntityType>>,
    pub limit: Option<usize>,
}

impl SearchOptions {
    pub fn with_types(mut self, types: Vec<EntityType>) -> Self {
        self.entity_types = Some(types);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A search hit with its match score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity: Entity,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub entities: Vec<SearchHit>,
    pub insights: Vec<Insight>,
}

/// Running totals while a conversation is replayed
#[derive(Debug, Default)]
struct ConversationAccumulator {
    messages_processed: usize,
    messages_failed: usize,
    entities_extracted: usize,
    relationships_detected: usize,
    insights: Vec<Insight>,
    failures: Vec<String>,
    persons: BTreeMap<String, PersonTally>,
}

#[derive(Debug, Default)]
struct PersonTally {
    name: String,
    mentions: usize,
    relationships: HashSet<String>,
}

impl ConversationAccumulator {
    fn absorb(&mut self, result: MessageProcessingResult) {
        self.messages_processed += 1;
        self.entities_extracted += result.entities_extracted;
        self.relationships_detected += result.relationships_detected;
        self.failures.extend(
            result
                .failures
                .into_iter()
                .map(|f| format!("{}: {}", result.message_id, f)),
        );

        for entity in result.entities.iter().filter(|e| e.entity_type == EntityType::Person) {
            let tally = self.persons.entry(entity.id.clone()).or_default();
            tally.name = entity.name.clone();
            tally.mentions += result.mention_counts.get(&entity.id).copied().unwrap_or(0);
        }
        for rel in &result.relationships {
            for end in [&rel.source_entity_id, &rel.target_entity_id] {
                if let Some(tally) = self.persons.get_mut(end.as_str()) {
                    tally.relationships.insert(rel.id.clone());
                }
            }
        }

        merge_insights(&mut self.insights, result.insights);
    }

    fn fail(&mut self, message_id: &str, error: &Error) {
        self.messages_failed += 1;
        self.failures.push(format!("{}: {}", message_id, error));
    }

    fn key_persons(&self, config: &OrchestratorConfig) -> Vec<Insight> {
        if self.persons.is_empty() {
            return Vec::new();
        }
        let score = |t: &PersonTally| (t.mentions + t.relationships.len()) as f64;
        let mean = self.persons.values().map(score).sum::<f64>() / self.persons.len() as f64;
        let only_one = self.persons.len() == 1;

        self.persons
            .iter()
            .filter(|(_, tally)| tally.mentions >= config.key_person_min_mentions)
            .filter(|(_, tally)| only_one || score(tally) >= config.key_person_ratio * mean)
            .map(|(id, tally)| {
                let confidence = if mean > 0.0 {
                    (score(tally) / (mean * 2.0 * config.key_person_ratio)).clamp(0.5, 1.0)
                } else {
                    0.5
                };
                Insight::new(
                    InsightKind::KeyPerson,
                    format!(
                        "{} is a key person in this conversation ({} mentions, {} relationships)",
                        tally.name,
                        tally.mentions,
                        tally.relationships.len()
                    ),
                    vec![(id.clone(), tally.name.clone())],
                    confidence,
                )
            })
            .collect()
    }
}

/// Message pipeline and graph query facade
pub struct GraphOrchestrator<R: GraphRepository> {
    repository: Arc<R>,
    extractor: Arc<dyn EntityExtractor>,
    messages: Option<Arc<dyn MessageSource>>,
    linker: EntityLinker<R>,
    detector: RelationshipDetector<R>,
    config: OrchestratorConfig,
}

impl<R: GraphRepository> GraphOrchestrator<R> {
    pub fn new(repository: Arc<R>, extractor: Arc<dyn EntityExtractor>) -> Self {
        Self {
            linker: EntityLinker::new(Arc::clone(&repository)),
            detector: RelationshipDetector::new(Arc::clone(&repository)),
            repository,
            extractor,
            messages: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Attach the source used by [`Self::process_conversation`]
    pub fn with_message_source(mut self, messages: Arc<dyn MessageSource>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_linker_config(mut self, config: LinkerConfig) -> Self {
        self.linker.set_config(config);
        self
    }

    pub fn with_detector_config(mut self, config: DetectorConfig) -> Self {
        self.linker.set_detector_config(&config);
        self.detector.set_config(config);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut OrchestratorConfig {
        &mut self.config
    }

    pub fn linker(&self) -> &EntityLinker<R> {
        &self.linker
    }

    pub fn detector(&self) -> &RelationshipDetector<R> {
        &self.detector
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    // ========== Message Processing ==========

    /// Extract, link and relate the entities of one message
    pub async fn process_message(
        &self,
        message_id: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<MessageProcessingResult> {
        self.process_message_at(message_id, conversation_id, content, Utc::now())
            .await
    }

    /// [`Self::process_message`] with the message's own timestamp
    pub async fn process_message_at(
        &self,
        message_id: &str,
        conversation_id: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageProcessingResult> {
        let started = Instant::now();
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("message content must not be empty".into()));
        }

        let extracted = self.extractor.extract(content)?;
        let mut result = MessageProcessingResult {
            message_id: message_id.to_string(),
            conversation_id: conversation_id.to_string(),
            ..Default::default()
        };

        let mut linked = Vec::with_capacity(extracted.len());
        for mention in &extracted {
            match self
                .link_and_record(message_id, conversation_id, mention, timestamp)
                .await
            {
                Ok((entity, created)) => {
                    linked.push(LinkedEntity::new(
                        &entity.id,
                        entity.entity_type,
                        mention.start_position,
                        mention.end_position,
                    ));
                    result.entities_extracted += 1;
                    if created {
                        result.entities_created += 1;
                    }
                    *result.mention_counts.entry(entity.id.clone()).or_default() += 1;
                    if !result.entities.iter().any(|e| e.id == entity.id) {
                        result.entities.push(entity);
                    }
                }
                Err(e) => {
                    warn!(message_id = %message_id, mention = %mention.text, error = %e, "Failed to link mention");
                    result.failures.push(format!("link '{}': {}", mention.text, e));
                }
            }
        }

        let analysis = match self
            .detector
            .analyze_message_at(message_id, conversation_id, content, &linked, timestamp)
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Relationship analysis failed");
                result.failures.push(format!("relationships: {}", e));
                MessageAnalysis::default()
            }
        };
        result.co_occurrences = analysis.co_occurrences.len();
        result.relationships_detected = analysis.detected_relationships.len();
        result.relationships = analysis.detected_relationships;
        result
            .failures
            .extend(analysis.failures.into_iter().map(|f| format!("relationship {}", f)));

        result.insights = self.message_insights(&result.entities, &mut result.failures).await;
        result.processing_time_ms = started.elapsed().as_millis() as u64;

        info!(
            message_id = %message_id,
            conversation_id = %conversation_id,
            entities = result.entities_extracted,
            created = result.entities_created,
            relationships = result.relationships_detected,
            insights = result.insights.len(),
            "Message processed"
        );
        Ok(result)
    }

    /// Resolve one extracted mention to an entity and store the mention
    async fn link_and_record(
        &self,
        message_id: &str,
        conversation_id: &str,
        mention: &ExtractedMention,
        timestamp: DateTime<Utc>,
    ) -> Result<(Entity, bool)> {
        let link = self
            .linker
            .link_entity(&mention.text, mention.candidate_type)
            .await?;

        let (entity, created) = match link.linked_entity {
            Some(entity) => (entity, false),
            None => {
                let entity = self
                    .linker
                    .create_entity(&mention.text, mention.candidate_type, mention.confidence)
                    .await?;
                (entity, true)
            }
        };

        if !link.suggested_aliases.is_empty() {
            if let Err(e) = self
                .linker
                .create_aliases(&entity.id, &link.suggested_aliases)
                .await
            {
                warn!(entity_id = %entity.id, error = %e, "Failed to store suggested aliases");
            }
        }

        let record = EntityMention::new(
            &entity.id,
            message_id,
            conversation_id,
            &mention.text,
            mention.start_position as i64,
            mention.end_position as i64,
        )?
        .with_confidence(mention.confidence)
        .with_extraction_method(self.extractor.method())
        .at(timestamp);
        self.repository.record_mention(&record).await?;

        Ok((entity, created))
    }

    async fn message_insights(&self, entities: &[Entity], failures: &mut Vec<String>) -> Vec<Insight> {
        let mut insights = Vec::new();

        let of_type = |ty: EntityType| -> Vec<(String, String)> {
            entities
                .iter()
                .filter(|e| e.entity_type == ty)
                .map(|e| (e.id.clone(), e.name.clone()))
                .collect()
        };

        let persons = of_type(EntityType::Person);
        if persons.len() >= self.config.collaboration_threshold {
            let names: Vec<_> = persons.iter().map(|(_, n)| n.as_str()).collect();
            let confidence = 0.6 + 0.1 * (persons.len() - self.config.collaboration_threshold) as f64;
            insights.push(Insight::new(
                InsightKind::CollaborationNetwork,
                format!("{} people are collaborating: {}", persons.len(), names.join(", ")),
                persons,
                confidence,
            ));
        }

        let technical = of_type(EntityType::Technical);
        if technical.len() >= self.config.technology_stack_threshold {
            let names: Vec<_> = technical.iter().map(|(_, n)| n.as_str()).collect();
            let confidence =
                0.6 + 0.1 * (technical.len() - self.config.technology_stack_threshold) as f64;
            insights.push(Insight::new(
                InsightKind::TechnologyStack,
                format!("Technology stack discussed: {}", names.join(", ")),
                technical,
                confidence,
            ));
        }

        for entity in entities {
            match self.repository.list_relationships_for_entity(&entity.id).await {
                Ok(relationships) if relationships.len() >= self.config.hub_threshold => {
                    let confidence = relationships.len() as f64 / (relationships.len() + 2) as f64;
                    insights.push(Insight::new(
                        InsightKind::HubEntity,
                        format!(
                            "{} is a hub with {} relationships",
                            entity.name,
                            relationships.len()
                        ),
                        vec![(entity.id.clone(), entity.name.clone())],
                        confidence,
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(entity_id = %entity.id, error = %e, "Hub check failed");
                    failures.push(format!("hub check '{}': {}", entity.name, e));
                }
            }
        }

        insights
    }

    /// Replay every stored message of a conversation, oldest first
    pub async fn process_conversation(&self, conversation_id: &str) -> Result<ConversationProcessingResult> {
        let started = Instant::now();
        let source = self
            .messages
            .as_ref()
            .ok_or_else(|| Error::ConfigError("no message source configured".into()))?;

        let mut messages = source.messages_for_conversation(conversation_id).await?;
        if messages.is_empty() {
            return Err(Error::ConversationNotFound(conversation_id.to_string()));
        }
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut acc = ConversationAccumulator::default();
        for message in &messages {
            match self
                .process_message_at(&message.id, conversation_id, &message.content, message.timestamp)
                .await
            {
                Ok(result) => acc.absorb(result),
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Message processing failed");
                    acc.fail(&message.id, &e);
                }
            }
        }

        let key_persons = acc.key_persons(&self.config);
        merge_insights(&mut acc.insights, key_persons);

        info!(
            conversation_id = %conversation_id,
            messages = acc.messages_processed,
            failed = acc.messages_failed,
            relationships = acc.relationships_detected,
            "Conversation processed"
        );

        Ok(ConversationProcessingResult {
            conversation_id: conversation_id.to_string(),
            messages_processed: acc.messages_processed,
            messages_failed: acc.messages_failed,
            entities_extracted: acc.entities_extracted,
            relationships_detected: acc.relationships_detected,
            processing_time_ms: started.elapsed().as_millis() as u64,
            insights: acc.insights,
            failures: acc.failures,
        })
    }

    // ========== Queries ==========

    /// An entity with its aliases, edges and neighbors; empty when unknown
    pub async fn get_entity_graph(&self, entity_id: &str) -> Result<EntityGraph> {
        let Some(entity) = self.repository.get_entity(entity_id).await? else {
            debug!(entity_id = %entity_id, "Entity graph requested for unknown entity");
            return Ok(EntityGraph::default());
        };

        let aliases = self.repository.list_aliases(entity_id).await?;
        let relationships = self.repository.list_relationships_for_entity(entity_id).await?;

        let mut seen = HashSet::new();
        let mut related_entities = Vec::new();
        for rel in &relationships {
            let other = rel.other_end(entity_id);
            if seen.insert(other.to_string()) {
                if let Some(related) = self.repository.get_entity(other).await? {
                    related_entities.push(related);
                }
            }
        }

        Ok(EntityGraph {
            entity: Some(entity),
            aliases,
            relationships,
            related_entities,
        })
    }

    /// Substring and fuzzy search over names and aliases
    pub async fn search_knowledge_graph(&self, query: &str, options: &SearchOptions) -> Result<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query must not be empty".into()));
        }
        let normalized = Entity::normalize(query);
        let types = options.entity_types.as_deref();
        let limit = options.limit.unwrap_or(self.config.search_limit).max(1);

        let mut scored: HashMap<String, SearchHit> = HashMap::new();
        for entity in self.repository.search_entities(query, types).await? {
            let score = if entity.normalized_name == normalized {
                1.0
            } else if entity.normalized_name.starts_with(&normalized) {
                0.9
            } else if entity.normalized_name.contains(&normalized) {
                0.8
            } else {
                // matched through an alias
                0.75
            };
            scored.insert(entity.id.clone(), SearchHit { entity, score });
        }

        let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
        for ty in types.unwrap_or(EntityType::all()) {
            for alias in self.repository.list_aliases_by_type(*ty).await? {
                aliases.entry(alias.entity_id).or_default().push(alias.alias);
            }
        }

        for entity in self.repository.list_entities().await? {
            if scored.contains_key(&entity.id) {
                continue;
            }
            if types.is_some_and(|t| !t.contains(&entity.entity_type)) {
                continue;
            }
            let alias_best = aliases
                .get(&entity.id)
                .into_iter()
                .flatten()
                .map(|alias| name_similarity(query, alias))
                .fold(0.0_f64, f64::max);
            let similarity = name_similarity(query, &entity.name).max(alias_best);
            if self.linker.clears_threshold(similarity) {
                scored.insert(
                    entity.id.clone(),
                    SearchHit {
                        entity,
                        score: 0.7 * similarity,
                    },
                );
            }
        }

        let mut hits: Vec<SearchHit> = scored.into_values().collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.name.cmp(&b.entity.name))
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        hits.truncate(limit);

        let mut insights = Vec::new();
        if let Some(cluster) = self.relationship_cluster(&hits).await? {
            insights.push(cluster);
        }

        debug!(query = %query, hits = hits.len(), "Graph searched");
        Ok(SearchResult {
            entities: hits,
            insights,
        })
    }

    async fn relationship_cluster(&self, hits: &[SearchHit]) -> Result<Option<Insight>> {
        let n = hits.len();
        if n < self.config.cluster_min_entities.max(2) {
            return Ok(None);
        }
        let ids: HashSet<&str> = hits.iter().map(|h| h.entity.id.as_str()).collect();

        let mut edges: HashSet<(String, String)> = HashSet::new();
        for hit in hits {
            for rel in self.repository.list_relationships_for_entity(&hit.entity.id).await? {
                let (a, b) = (rel.source_entity_id.as_str(), rel.target_entity_id.as_str());
                if ids.contains(a) && ids.contains(b) {
                    // one undirected pair counts once whatever the edge types
                    let pair = if a < b { (a, b) } else { (b, a) };
                    edges.insert((pair.0.to_string(), pair.1.to_string()));
                }
            }
        }

        let possible = (n * (n - 1) / 2) as f64;
        let density = edges.len() as f64 / possible;
        if density + 1e-9 < self.config.cluster_density {
            return Ok(None);
        }

        Ok(Some(Insight::new(
            InsightKind::RelationshipCluster,
            format!(
                "{} matching entities form a dense cluster ({} of {} possible connections)",
                n,
                edges.len(),
                possible as u64
            ),
            hits.iter()
                .map(|h| (h.entity.id.clone(), h.entity.name.clone()))
                .collect(),
            density,
        )))
    }

    /// Serialize the whole graph
    pub async fn export_knowledge_graph(&self, format: ExportFormat) -> Result<String> {
        let entities = self.repository.list_entities().await?;
        let relationships = self.repository.list_relationships().await?;
        info!(
            format = %format,
            entities = entities.len(),
            relationships = relationships.len(),
            "Exporting graph"
        );
        export_graph(format, &entities, &relationships)
    }

    pub async fn graph_stats(&self) -> Result<GraphStats> {
        self.repository.graph_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, name: &str) -> Entity {
        let mut entity = Entity::new(name, EntityType::Person);
        entity.id = id.to_string();
        entity
    }

    fn message_result(id: &str, persons: &[(&str, &str, usize)]) -> MessageProcessingResult {
        let mut result = MessageProcessingResult {
            message_id: id.to_string(),
            ..Default::default()
        };
        for (pid, name, count) in persons {
            result.entities.push(person(pid, name));
            result.mention_counts.insert(pid.to_string(), *count);
        }
        result
    }

    #[test]
    fn test_key_person_dominant() {
        let mut acc = ConversationAccumulator::default();
        acc.absorb(message_result("m1", &[("a", "Alice", 2), ("b", "Bob", 1)]));
        acc.absorb(message_result("m2", &[("a", "Alice", 3)]));
        acc.absorb(message_result("m3", &[("c", "Carol", 1)]));

        let insights = acc.key_persons(&OrchestratorConfig::default());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].entity_ids, vec!["a"]);
        assert_eq!(insights[0].kind, InsightKind::KeyPerson);
    }

    #[test]
    fn test_key_person_needs_minimum_mentions() {
        let mut acc = ConversationAccumulator::default();
        acc.absorb(message_result("m1", &[("a", "Alice", 1)]));
        assert!(acc.key_persons(&OrchestratorConfig::default()).is_empty());

        acc.absorb(message_result("m2", &[("a", "Alice", 1)]));
        assert_eq!(acc.key_persons(&OrchestratorConfig::default()).len(), 1);
    }

    #[test]
    fn test_accumulator_counts_failures() {
        let mut acc = ConversationAccumulator::default();
        acc.fail("m1", &Error::InvalidInput("empty".into()));
        assert_eq!(acc.messages_failed, 1);
        assert!(acc.failures[0].starts_with("m1:"));
    }
}
