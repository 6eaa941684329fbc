//! Entity linking: resolve a surface string to an existing entity
//!
//! Resolution runs in stages and stops at the first stage that produces a
//! candidate:
//!
//! 1. exact normalized-name match within the type
//! 2. stored alias match within the type
//! 3. fuzzy match (normalized Levenshtein) against names and aliases
//! 4. structural heuristics: abbreviation, person nickname, technical fold
//!
//! Anything below the similarity threshold is a signal to create a new
//! entity; the linker never creates entities itself.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::alias::{AliasSpec, AliasType, EntityAlias};
use super::detector::DetectorConfig;
use super::entity::{Entity, EntityType};
use super::repository::{GraphRepository, MergeOutcome};
use super::similarity::{
    ABBREVIATION_SCORE, NICKNAME_SCORE, TECHNICAL_VARIATION_SCORE, is_abbreviation_of,
    is_nickname_of, is_technical_variation, name_similarity, technical_fold,
};

/// Slack for comparing computed similarities against the threshold
const SIMILARITY_EPSILON: f64 = 1e-9;

/// Entity linker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Minimum similarity for a fuzzy or heuristic match
    pub similarity_threshold: f64,
    /// Maximum candidates returned by one link call
    pub max_candidates: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            max_candidates: 5,
        }
    }
}

/// Which stage produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Alias,
    Fuzzy,
    Abbreviation,
    Nickname,
    TechnicalVariation,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Alias => "alias",
            Self::Fuzzy => "fuzzy",
            Self::Abbreviation => "abbreviation",
            Self::Nickname => "nickname",
            Self::TechnicalVariation => "technical_variation",
        }
    }
}

/// An existing entity the candidate string may refer to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub entity: Entity,
    pub similarity: f64,
    pub match_kind: MatchKind,
}

/// Outcome of [`EntityLinker::link_entity`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    pub linked_entity: Option<Entity>,
    pub candidates: Vec<LinkCandidate>,
    pub should_create_new: bool,
    /// Aliases worth persisting on the linked entity
    pub suggested_aliases: Vec<AliasSpec>,
}

impl LinkResult {
    fn unresolved() -> Self {
        Self {
            linked_entity: None,
            candidates: Vec::new(),
            should_create_new: true,
            suggested_aliases: Vec::new(),
        }
    }

    fn resolved(candidates: Vec<LinkCandidate>, candidate_name: &str) -> Self {
        let Some(best) = candidates.first() else {
            return Self::unresolved();
        };
        let suggested_aliases = suggest_aliases(candidate_name, best);
        Self {
            linked_entity: Some(best.entity.clone()),
            should_create_new: false,
            suggested_aliases,
            candidates,
        }
    }
}

/// Aliases proposed for a successful link
fn suggest_aliases(candidate_name: &str, best: &LinkCandidate) -> Vec<AliasSpec> {
    let candidate_name = candidate_name.trim();
    let entity = &best.entity;
    let mut suggestions = Vec::new();

    if Entity::normalize(candidate_name) != entity.normalized_name {
        let alias_type = match best.match_kind {
            MatchKind::Nickname => AliasType::Nickname,
            MatchKind::Abbreviation => AliasType::Abbreviation,
            _ => AliasType::infer(candidate_name),
        };
        suggestions.push(AliasSpec::new(candidate_name, alias_type, best.similarity));
    }

    if entity.entity_type == EntityType::Technical {
        let fold = technical_fold(candidate_name);
        let already = |s: &str| Entity::normalize(s) == fold;
        if !fold.is_empty()
            && fold != entity.normalized_name
            && !already(candidate_name)
            && !suggestions.iter().any(|s| already(&s.alias))
        {
            suggestions.push(AliasSpec::new(fold, AliasType::Variation, best.similarity * 0.9));
        }
    }

    suggestions
}

/// Entity linker
pub struct EntityLinker<R: GraphRepository> {
    repository: Arc<R>,
    config: LinkerConfig,
    /// Bound on context_messages when merges combine edges, owned by the detector config
    max_context_messages: usize,
}

impl<R: GraphRepository> EntityLinker<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            config: LinkerConfig::default(),
            max_context_messages: DetectorConfig::default().max_context_messages,
        }
    }

    /// Take the context bound from the detector that stores the same edges
    pub fn with_detector_config(mut self, detector: &DetectorConfig) -> Self {
        self.set_detector_config(detector);
        self
    }

    pub fn set_detector_config(&mut self, detector: &DetectorConfig) {
        self.max_context_messages = detector.max_context_messages;
    }

    pub fn max_context_messages(&self) -> usize {
        self.max_context_messages
    }

    pub fn with_config(mut self, config: LinkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut LinkerConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: LinkerConfig) {
        self.config = config;
    }

    /// Whether a computed similarity reaches the configured threshold
    pub fn clears_threshold(&self, similarity: f64) -> bool {
        similarity + SIMILARITY_EPSILON >= self.config.similarity_threshold
    }

    /// Resolve a candidate name to an existing entity of the same type
    pub async fn link_entity(&self, candidate_name: &str, entity_type: EntityType) -> Result<LinkResult> {
        let name = candidate_name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("entity name must not be empty".into()));
        }
        let normalized = Entity::normalize(name);

        if let Some(entity) = self
            .repository
            .find_entity_by_normalized_name(&normalized, entity_type)
            .await?
        {
            debug!(entity_id = %entity.id, name = %name, "Exact entity match");
            let candidate = LinkCandidate {
                entity,
                similarity: 1.0,
                match_kind: MatchKind::Exact,
            };
            return Ok(LinkResult::resolved(vec![candidate], name));
        }

        if let Some(entity) = self.repository.find_entity_by_alias(name, entity_type).await? {
            debug!(entity_id = %entity.id, alias = %name, "Alias entity match");
            let candidate = LinkCandidate {
                entity,
                similarity: 1.0,
                match_kind: MatchKind::Alias,
            };
            return Ok(LinkResult::resolved(vec![candidate], name));
        }

        let entities = self.repository.list_entities_by_type(entity_type).await?;
        if entities.is_empty() {
            return Ok(LinkResult::unresolved());
        }
        let aliases = self.repository.list_aliases_by_type(entity_type).await?;
        let mut aliases_by_entity: HashMap<&str, Vec<&str>> = HashMap::new();
        for alias in &aliases {
            aliases_by_entity
                .entry(alias.entity_id.as_str())
                .or_default()
                .push(alias.alias.as_str());
        }

        let fuzzy = self.fuzzy_candidates(name, &entities, &aliases_by_entity);
        if !fuzzy.is_empty() {
            debug!(name = %name, candidates = fuzzy.len(), "Fuzzy entity match");
            return Ok(LinkResult::resolved(fuzzy, name));
        }

        let heuristic = self.heuristic_candidates(name, entity_type, &entities, &aliases_by_entity);
        if !heuristic.is_empty() {
            debug!(name = %name, candidates = heuristic.len(), "Heuristic entity match");
            return Ok(LinkResult::resolved(heuristic, name));
        }

        debug!(name = %name, entity_type = %entity_type, "No entity match, create new");
        Ok(LinkResult::unresolved())
    }

    fn fuzzy_candidates(
        &self,
        name: &str,
        entities: &[Entity],
        aliases_by_entity: &HashMap<&str, Vec<&str>>,
    ) -> Vec<LinkCandidate> {
        let mut candidates: Vec<LinkCandidate> = entities
            .iter()
            .filter_map(|entity| {
                let alias_best = aliases_by_entity
                    .get(entity.id.as_str())
                    .into_iter()
                    .flatten()
                    .map(|alias| name_similarity(name, alias))
                    .fold(0.0_f64, f64::max);
                let similarity = name_similarity(name, &entity.name).max(alias_best);
                self.clears_threshold(similarity).then(|| LinkCandidate {
                    entity: entity.clone(),
                    similarity,
                    match_kind: MatchKind::Fuzzy,
                })
            })
            .collect();

        self.rank(&mut candidates);
        candidates
    }

    fn heuristic_candidates(
        &self,
        name: &str,
        entity_type: EntityType,
        entities: &[Entity],
        aliases_by_entity: &HashMap<&str, Vec<&str>>,
    ) -> Vec<LinkCandidate> {
        let mut candidates = Vec::new();

        for entity in entities {
            let surfaces: Vec<&str> = std::iter::once(entity.name.as_str())
                .chain(aliases_by_entity.get(entity.id.as_str()).into_iter().flatten().copied())
                .collect();

            let hit = if surfaces
                .iter()
                .any(|s| is_abbreviation_of(name, s) || is_abbreviation_of(s, name))
            {
                Some((MatchKind::Abbreviation, ABBREVIATION_SCORE))
            } else if entity_type == EntityType::Person
                && surfaces.iter().any(|s| is_nickname_of(name, s))
            {
                Some((MatchKind::Nickname, NICKNAME_SCORE))
            } else if entity_type == EntityType::Technical
                && surfaces.iter().any(|s| is_technical_variation(name, s))
            {
                Some((MatchKind::TechnicalVariation, TECHNICAL_VARIATION_SCORE))
            } else {
                None
            };

            if let Some((match_kind, similarity)) = hit {
                if self.clears_threshold(similarity) {
                    candidates.push(LinkCandidate {
                        entity: entity.clone(),
                        similarity,
                        match_kind,
                    });
                }
            }
        }

        self.rank(&mut candidates);
        candidates
    }

    fn rank(&self, candidates: &mut Vec<LinkCandidate>) {
        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.entity.mention_count.cmp(&a.entity.mention_count))
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        candidates.truncate(self.config.max_candidates.max(1));
    }

    /// Create a fresh entity, or return the row that won a concurrent create
    pub async fn create_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        confidence: f64,
    ) -> Result<Entity> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("entity name must not be empty".into()));
        }
        let entity = Entity::new(name, entity_type).with_confidence(confidence);
        let stored = self.repository.insert_entity(&entity).await?;
        if stored.id == entity.id {
            info!(entity_id = %stored.id, name = %stored.name, entity_type = %entity_type, "Entity created");
        }
        Ok(stored)
    }

    /// Bind an alias to an entity; re-adding keeps the higher confidence
    pub async fn create_alias(
        &self,
        entity_id: &str,
        alias: &str,
        alias_type: AliasType,
        confidence: f64,
    ) -> Result<EntityAlias> {
        if alias.trim().is_empty() {
            return Err(Error::InvalidInput("alias must not be empty".into()));
        }
        let alias = EntityAlias::new(entity_id, alias, alias_type).with_confidence(confidence);
        self.repository.upsert_alias(&alias).await
    }

    /// Bind several aliases to one entity
    pub async fn create_aliases(&self, entity_id: &str, aliases: &[AliasSpec]) -> Result<Vec<EntityAlias>> {
        if self.repository.get_entity(entity_id).await?.is_none() {
            return Err(Error::EntityNotFound(entity_id.to_string()));
        }
        let mut stored = Vec::with_capacity(aliases.len());
        for spec in aliases {
            stored.push(
                self.create_alias(entity_id, &spec.alias, spec.alias_type, spec.confidence)
                    .await?,
            );
        }
        Ok(stored)
    }

    /// Fold `source_id` into `target_id`
    ///
    /// Runs as a single transaction: either every mention, edge and alias is
    /// moved and the source is deleted, or nothing changes.
    pub async fn merge_entities(&self, source_id: &str, target_id: &str) -> Result<MergeOutcome> {
        if source_id == target_id {
            return Err(Error::InvalidInput(format!(
                "cannot merge entity '{}' into itself",
                source_id
            )));
        }
        let outcome = self
            .repository
            .merge_entities(source_id, target_id, self.max_context_messages)
            .await?;
        info!(
            source_id = %source_id,
            target_id = %target_id,
            mentions = outcome.mentions_moved,
            relationships = outcome.relationships_moved,
            combined = outcome.relationships_combined,
            "Entities merged"
        );
        Ok(outcome)
    }

    /// Aliases of an entity, highest confidence first
    pub async fn get_entity_aliases(&self, entity_id: &str) -> Result<Vec<EntityAlias>> {
        self.repository.list_aliases(entity_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, ty: EntityType, kind: MatchKind, similarity: f64) -> LinkCandidate {
        LinkCandidate {
            entity: Entity::new(name, ty),
            similarity,
            match_kind: kind,
        }
    }

    #[test]
    fn test_no_alias_suggested_for_exact_match() {
        let best = candidate("JavaScript", EntityType::Concept, MatchKind::Exact, 1.0);
        assert!(suggest_aliases("javascript", &best).is_empty());
    }

    #[test]
    fn test_abbreviation_suggestion() {
        let best = candidate("JavaScript", EntityType::Concept, MatchKind::Abbreviation, 0.85);
        let suggestions = suggest_aliases("JS", &best);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].alias, "JS");
        assert_eq!(suggestions[0].alias_type, AliasType::Abbreviation);
    }

    #[test]
    fn test_technical_fold_suggestion() {
        let best = candidate("Node", EntityType::Technical, MatchKind::Fuzzy, 0.8);
        let suggestions = suggest_aliases("Node.JS", &best);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].alias, "Node.JS");

        let best = candidate("React", EntityType::Technical, MatchKind::Fuzzy, 0.8);
        let suggestions = suggest_aliases("React Native", &best);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[1].alias, "reactnative");
    }

    #[test]
    fn test_nickname_suggestion_type() {
        let best = candidate("Robert Smith", EntityType::Person, MatchKind::Nickname, 0.8);
        let suggestions = suggest_aliases("Bob Smith", &best);
        assert_eq!(suggestions[0].alias_type, AliasType::Nickname);
    }
}
