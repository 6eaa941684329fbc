//! Human-facing observations synthesized from graph updates

use serde::{Deserialize, Serialize};

/// Kinds of insights the orchestrator emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    /// Several people appear together in one message
    CollaborationNetwork,
    /// Several technical entities appear together in one message
    TechnologyStack,
    /// An entity's relationship count crossed the hub threshold
    HubEntity,
    /// A person dominates a conversation
    KeyPerson,
    /// Search hits that are densely connected to each other
    RelationshipCluster,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollaborationNetwork => "collaboration_network",
            Self::TechnologyStack => "technology_stack",
            Self::HubEntity => "hub_entity",
            Self::KeyPerson => "key_person",
            Self::RelationshipCluster => "relationship_cluster",
        }
    }
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub description: String,
    /// Entities the insight is about, in a stable order
    pub entity_ids: Vec<String>,
    pub entity_names: Vec<String>,
    /// Strength of the signal, in [0, 1]
    pub confidence: f64,
}

impl Insight {
    pub fn new(
        kind: InsightKind,
        description: impl Into<String>,
        entities: Vec<(String, String)>,
        confidence: f64,
    ) -> Self {
        let (entity_ids, entity_names) = entities.into_iter().unzip();
        Self {
            kind,
            description: description.into(),
            entity_ids,
            entity_names,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Identity used to drop repeated insights
    pub fn dedup_key(&self) -> (InsightKind, Vec<String>) {
        let mut ids = self.entity_ids.clone();
        ids.sort();
        (self.kind, ids)
    }
}

/// Append insights, skipping ones already present
pub fn merge_insights(into: &mut Vec<Insight>, new: impl IntoIterator<Item = Insight>) {
    for insight in new {
        let key = insight.dedup_key();
        if !into.iter().any(|existing| existing.dedup_key() == key) {
            into.push(insight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_ignores_entity_order() {
        let a = Insight::new(
            InsightKind::CollaborationNetwork,
            "x",
            vec![("1".into(), "A".into()), ("2".into(), "B".into())],
            0.5,
        );
        let b = Insight::new(
            InsightKind::CollaborationNetwork,
            "y",
            vec![("2".into(), "B".into()), ("1".into(), "A".into())],
            0.9,
        );
        let c = Insight::new(InsightKind::HubEntity, "z", vec![("1".into(), "A".into())], 0.9);

        let mut all = Vec::new();
        merge_insights(&mut all, [a, b, c]);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].description, "x");
    }
}
