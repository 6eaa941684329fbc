//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::graph::{
    DetectorConfig, EntityType, KeywordExtractor, KeywordTerm, LinkerConfig, OrchestratorConfig,
};
use crate::storage::{DATABASE_ENV, default_database_path};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "ENTIGRAPH_CONFIG_DIR";

const KEYS: &[&str] = &[
    "database.path",
    "linker.similarity_threshold",
    "linker.max_candidates",
    "detector.max_co_occurrence_distance",
    "detector.min_relationship_strength",
    "detector.context_window_size",
    "detector.max_context_messages",
    "orchestrator.hub_threshold",
    "orchestrator.collaboration_threshold",
    "orchestrator.technology_stack_threshold",
    "orchestrator.key_person_min_mentions",
    "orchestrator.cluster_density",
    "orchestrator.search_limit",
    "extraction.confidence",
    "extraction.terms",
];

/// Entigraph configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub linker: LinkerConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Database file; the platform data dir is used when unset
    pub path: Option<PathBuf>,
}

/// Gazetteer fed to the bundled keyword extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub confidence: f64,
    pub terms: Vec<KeywordTerm>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence: 0.9,
            terms: Vec::new(),
        }
    }
}

fn parse_unit(key: &str, value: &str) -> anyhow::Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(parsed)
}

fn parse_count(key: &str, value: &str) -> anyhow::Result<usize> {
    let parsed: usize = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if parsed == 0 {
        return Err(anyhow!("{} must be greater than 0", key));
    }
    Ok(parsed)
}

/// Parse `name:type, name:type`
fn parse_terms(value: &str) -> anyhow::Result<Vec<KeywordTerm>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (name, ty) = entry
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("Invalid term '{}', expected name:type", entry))?;
            let entity_type = EntityType::parse(ty)
                .ok_or_else(|| anyhow!("Unknown entity type '{}' in term '{}'", ty.trim(), entry))?;
            Ok(KeywordTerm::new(name.trim(), entity_type))
        })
        .collect()
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("entigraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let unit = [
            ("linker.similarity_threshold", self.linker.similarity_threshold),
            ("detector.min_relationship_strength", self.detector.min_relationship_strength),
            ("orchestrator.cluster_density", self.orchestrator.cluster_density),
            ("extraction.confidence", self.extraction.confidence),
        ];
        for (key, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be between 0.0 and 1.0, got {}", key, value));
            }
        }

        let counts = [
            ("linker.max_candidates", self.linker.max_candidates),
            ("detector.max_co_occurrence_distance", self.detector.max_co_occurrence_distance),
            ("detector.context_window_size", self.detector.context_window_size),
            ("detector.max_context_messages", self.detector.max_context_messages),
            ("orchestrator.hub_threshold", self.orchestrator.hub_threshold),
            ("orchestrator.collaboration_threshold", self.orchestrator.collaboration_threshold),
            (
                "orchestrator.technology_stack_threshold",
                self.orchestrator.technology_stack_threshold,
            ),
            ("orchestrator.key_person_min_mentions", self.orchestrator.key_person_min_mentions),
            ("orchestrator.search_limit", self.orchestrator.search_limit),
        ];
        for (key, value) in counts {
            if value == 0 {
                return Err(anyhow!("{} must be greater than 0", key));
            }
        }

        if self.orchestrator.key_person_ratio < 1.0 {
            return Err(anyhow!("orchestrator.key_person_ratio must be at least 1.0"));
        }
        Ok(())
    }

    /// Database location: `ENTIGRAPH_DATABASE`, then `database.path`, then the data dir
    pub fn database_path(&self) -> PathBuf {
        if let Ok(path) = env::var(DATABASE_ENV) {
            return PathBuf::from(path);
        }
        self.database.path.clone().unwrap_or_else(default_database_path)
    }

    pub fn linker_config(&self) -> LinkerConfig {
        self.linker.clone()
    }

    /// Keyword extractor built from `extraction.terms`
    pub fn keyword_extractor(&self) -> KeywordExtractor {
        KeywordExtractor::new(self.extraction.terms.clone()).with_confidence(self.extraction.confidence)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database_path().display().to_string()),

            "linker.similarity_threshold" => Ok(self.linker.similarity_threshold.to_string()),
            "linker.max_candidates" => Ok(self.linker.max_candidates.to_string()),

            "detector.max_co_occurrence_distance" => {
                Ok(self.detector.max_co_occurrence_distance.to_string())
            }
            "detector.min_relationship_strength" => {
                Ok(self.detector.min_relationship_strength.to_string())
            }
            "detector.context_window_size" => Ok(self.detector.context_window_size.to_string()),
            "detector.max_context_messages" => Ok(self.detector.max_context_messages.to_string()),

            "orchestrator.hub_threshold" => Ok(self.orchestrator.hub_threshold.to_string()),
            "orchestrator.collaboration_threshold" => {
                Ok(self.orchestrator.collaboration_threshold.to_string())
            }
            "orchestrator.technology_stack_threshold" => {
                Ok(self.orchestrator.technology_stack_threshold.to_string())
            }
            "orchestrator.key_person_min_mentions" => {
                Ok(self.orchestrator.key_person_min_mentions.to_string())
            }
            "orchestrator.cluster_density" => Ok(self.orchestrator.cluster_density.to_string()),
            "orchestrator.search_limit" => Ok(self.orchestrator.search_limit.to_string()),

            "extraction.confidence" => Ok(self.extraction.confidence.to_string()),
            "extraction.terms" => Ok(self
                .extraction
                .terms
                .iter()
                .map(|t| format!("{}:{}", t.name, t.entity_type))
                .collect::<Vec<_>>()
                .join(", ")),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `entigraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                let value = value.trim();
                self.database.path = (!value.is_empty()).then(|| PathBuf::from(value));
            }

            "linker.similarity_threshold" => {
                self.linker.similarity_threshold = parse_unit(key, value)?;
            }
            "linker.max_candidates" => {
                self.linker.max_candidates = parse_count(key, value)?;
            }

            "detector.max_co_occurrence_distance" => {
                self.detector.max_co_occurrence_distance = parse_count(key, value)?;
            }
            "detector.min_relationship_strength" => {
                self.detector.min_relationship_strength = parse_unit(key, value)?;
            }
            "detector.context_window_size" => {
                self.detector.context_window_size = parse_count(key, value)?;
            }
            "detector.max_context_messages" => {
                self.detector.max_context_messages = parse_count(key, value)?;
            }

            "orchestrator.hub_threshold" => {
                self.orchestrator.hub_threshold = parse_count(key, value)?;
            }
            "orchestrator.collaboration_threshold" => {
                self.orchestrator.collaboration_threshold = parse_count(key, value)?;
            }
            "orchestrator.technology_stack_threshold" => {
                self.orchestrator.technology_stack_threshold = parse_count(key, value)?;
            }
            "orchestrator.key_person_min_mentions" => {
                self.orchestrator.key_person_min_mentions = parse_count(key, value)?;
            }
            "orchestrator.cluster_density" => {
                self.orchestrator.cluster_density = parse_unit(key, value)?;
            }
            "orchestrator.search_limit" => {
                self.orchestrator.search_limit = parse_count(key, value)?;
            }

            "extraction.confidence" => {
                self.extraction.confidence = parse_unit(key, value)?;
            }
            "extraction.terms" => {
                self.extraction.terms = parse_terms(value)?;
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `entigraph config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.linker.similarity_threshold, 0.7);
        assert_eq!(config.linker.max_candidates, 5);
        assert_eq!(config.detector.max_co_occurrence_distance, 200);
        assert_eq!(config.detector.min_relationship_strength, 0.3);
        assert_eq!(config.orchestrator.hub_threshold, 3);
        assert_eq!(config.orchestrator.search_limit, 20);
        assert!(config.extraction.terms.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();

        config.set("linker.similarity_threshold", "0.85").unwrap();
        assert_eq!(config.get("linker.similarity_threshold").unwrap(), "0.85");

        config.set("orchestrator.hub_threshold", "5").unwrap();
        assert_eq!(config.orchestrator.hub_threshold, 5);

        assert!(config.set("linker.similarity_threshold", "1.5").is_err());
        assert!(config.set("detector.max_co_occurrence_distance", "0").is_err());
        assert!(config.set("detector.context_window_size", "wide").is_err());
        assert!(config.set("nope", "1").is_err());
        assert!(config.get("nope").is_err());
    }

    #[test]
    fn test_terms_round_trip_through_set() {
        let mut config = Config::default();
        config
            .set("extraction.terms", "John Doe:person, Acme Corp:organization, Rust:technical")
            .unwrap();

        assert_eq!(config.extraction.terms.len(), 3);
        assert_eq!(config.extraction.terms[1].entity_type, EntityType::Organization);
        assert_eq!(
            config.get("extraction.terms").unwrap(),
            "John Doe:person, Acme Corp:organization, Rust:technical"
        );
        assert_eq!(config.keyword_extractor().len(), 3);

        assert!(config.set("extraction.terms", "Mars:planet").is_err());
        assert!(config.set("extraction.terms", "no type here").is_err());
    }

    #[test]
    fn test_list_covers_every_key() {
        let config = Config::default();
        let listed = config.list().unwrap();
        assert_eq!(listed.len(), KEYS.len());
        assert!(listed.iter().any(|(k, _)| k == "detector.max_context_messages"));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("extraction.terms", "Acme Corp:organization").unwrap();
        config.set("detector.max_context_messages", "7").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.detector.max_context_messages, 7);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[linker]\nsimilarity_threshold = 0.9\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.linker.similarity_threshold, 0.9);
        assert_eq!(loaded.linker.max_candidates, 5);
        assert_eq!(loaded.detector, DetectorConfig::default());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[orchestrator]\ncluster_density = 3.0\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }
}
