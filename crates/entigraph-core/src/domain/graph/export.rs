//! Whole-graph serialization
//!
//! All formats are deterministic for a given graph state: callers pass
//! entities and relationships ordered by id and nothing time-dependent is
//! written.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::entity::Entity;
use super::relationship::EntityRelationship;

/// Format version written into JSON exports
pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    #[serde(rename = "graphml")]
    GraphMl,
    Cypher,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::GraphMl => "graphml",
            Self::Cypher => "cypher",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "graphml" | "xml" => Some(Self::GraphMl),
            "cypher" | "neo4j" => Some(Self::Cypher),
            _ => None,
        }
    }

    pub fn all() -> &'static [ExportFormat] {
        &[Self::Json, Self::GraphMl, Self::Cypher]
    }

    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::GraphMl => "graphml",
            Self::Cypher => "cypher",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON export document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonExport {
    pub entities: Vec<Entity>,
    pub relationships: Vec<EntityRelationship>,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub format: String,
    pub version: String,
}

/// Serialize the graph in the requested format
pub fn export_graph(
    format: ExportFormat,
    entities: &[Entity],
    relationships: &[EntityRelationship],
) -> Result<String> {
    match format {
        ExportFormat::Json => export_json(entities, relationships),
        ExportFormat::GraphMl => export_graphml(entities, relationships),
        ExportFormat::Cypher => export_cypher(entities, relationships),
    }
}

pub fn export_json(entities: &[Entity], relationships: &[EntityRelationship]) -> Result<String> {
    let document = JsonExport {
        entities: entities.to_vec(),
        relationships: relationships.to_vec(),
        metadata: ExportMetadata {
            entity_count: entities.len(),
            relationship_count: relationships.len(),
            format: ExportFormat::Json.as_str().to_string(),
            version: EXPORT_VERSION.to_string(),
        },
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn fmt_err(e: std::fmt::Error) -> Error {
    Error::Other(format!("Failed to format export: {}", e))
}

pub fn export_graphml(entities: &[Entity], relationships: &[EntityRelationship]) -> Result<String> {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\"?>\n");
    out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
    for (id, target, name, ty) in [
        ("name", "node", "name", "string"),
        ("entity_type", "node", "entity_type", "string"),
        ("confidence_score", "node", "confidence_score", "double"),
        ("mention_count", "node", "mention_count", "long"),
        ("relationship_type", "edge", "relationship_type", "string"),
        ("strength", "edge", "strength", "double"),
        ("edge_mentions", "edge", "mention_count", "long"),
    ] {
        writeln!(
            out,
            "  <key id=\"{}\" for=\"{}\" attr.name=\"{}\" attr.type=\"{}\"/>",
            id, target, name, ty
        )
        .map_err(fmt_err)?;
    }
    out.push_str("  <graph id=\"entigraph\" edgedefault=\"directed\">\n");

    for entity in entities {
        writeln!(out, "    <node id=\"{}\">", xml_escape(&entity.id)).map_err(fmt_err)?;
        writeln!(out, "      <data key=\"name\">{}</data>", xml_escape(&entity.name)).map_err(fmt_err)?;
        writeln!(out, "      <data key=\"entity_type\">{}</data>", entity.entity_type).map_err(fmt_err)?;
        writeln!(out, "      <data key=\"confidence_score\">{}</data>", entity.confidence_score)
            .map_err(fmt_err)?;
        writeln!(out, "      <data key=\"mention_count\">{}</data>", entity.mention_count).map_err(fmt_err)?;
        out.push_str("    </node>\n");
    }

    for rel in relationships {
        writeln!(
            out,
            "    <edge id=\"{}\" source=\"{}\" target=\"{}\">",
            xml_escape(&rel.id),
            xml_escape(&rel.source_entity_id),
            xml_escape(&rel.target_entity_id)
        )
        .map_err(fmt_err)?;
        writeln!(out, "      <data key=\"relationship_type\">{}</data>", rel.relationship_type)
            .map_err(fmt_err)?;
        writeln!(out, "      <data key=\"strength\">{}</data>", rel.strength).map_err(fmt_err)?;
        writeln!(out, "      <data key=\"edge_mentions\">{}</data>", rel.mention_count).map_err(fmt_err)?;
        out.push_str("    </edge>\n");
    }

    out.push_str("  </graph>\n");
    out.push_str("</graphml>\n");
    Ok(out)
}

fn cypher_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn cypher_label(entity: &Entity) -> String {
    let ty = entity.entity_type.as_str();
    let mut chars = ty.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn export_cypher(entities: &[Entity], relationships: &[EntityRelationship]) -> Result<String> {
    let mut out = String::new();

    for entity in entities {
        writeln!(
            out,
            "CREATE (:Entity:{} {{id: {}, name: {}, normalized_name: {}, entity_type: {}, confidence_score: {}, mention_count: {}}});",
            cypher_label(entity),
            cypher_string(&entity.id),
            cypher_string(&entity.name),
            cypher_string(&entity.normalized_name),
            cypher_string(entity.entity_type.as_str()),
            entity.confidence_score,
            entity.mention_count
        )
        .map_err(fmt_err)?;
    }

    for rel in relationships {
        writeln!(
            out,
            "MATCH (a:Entity {{id: {}}}), (b:Entity {{id: {}}}) CREATE (a)-[:{} {{id: {}, strength: {}, mention_count: {}}}]->(b);",
            cypher_string(&rel.source_entity_id),
            cypher_string(&rel.target_entity_id),
            rel.relationship_type.cypher_label(),
            cypher_string(&rel.id),
            rel.strength,
            rel.mention_count
        )
        .map_err(fmt_err)?;
    }

    Ok(out)
}
