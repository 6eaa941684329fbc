//! Entigraph Core Library
//!
//! This crate provides the core functionality for Entigraph, including:
//! - Entity linking (exact, alias, fuzzy and heuristic resolution, merges)
//! - Relationship detection from entity co-occurrence
//! - Message and conversation orchestration with insights
//! - Graph queries and export (JSON, GraphML, Cypher)
//! - Integrity validation and auto-correction
//! - Storage (SQLite with versioned migrations)

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::graph::{
        Entity, EntityLinker, EntityRelationship, EntityType, ExportFormat, GraphOrchestrator,
        IntegrityValidator, KeywordExtractor, RelationshipDetector, RelationshipType,
    };
    pub use crate::error::{Error, Result};
    pub use crate::infrastructure::graph::{SqliteGraphRepository, SqliteMessageSource};
    pub use crate::storage::Database;
}
