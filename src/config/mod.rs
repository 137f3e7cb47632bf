//! Configuration management for feedsearch
//!
//! Loading, environment overrides, profiles and validation of the TOML
//! configuration that wires the retrieval engine.

use crate::error::{FeedsearchError, Result};
use crate::retrieval::{ConfidenceTier, DEFAULT_RERANKER_MODEL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

/// Schema version written by this release
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Prefix of environment overrides, e.g. `FEEDSEARCH_RETRIEVAL__RRF_K=40`
pub const ENV_PREFIX: &str = "FEEDSEARCH_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub sparse: SparseConfig,
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// HNSW parameters of the in-memory dense index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub max_elements: usize,
}

/// Fusion and search defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub use_hybrid: bool,
    pub use_reranking: bool,
    pub rrf_k: f32,
    pub overfetch_factor: usize,
    pub candidate_window_factor: usize,
    pub agreement_boost: f32,
    pub dense_timeout_ms: u64,
    pub confidence_tiers: Vec<ConfidenceTier>,
}

/// Sparse keyword index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseConfig {
    pub enabled: bool,
    pub stemming: bool,
}

/// Cross-encoder reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub model: String,
    #[serde(default = "default_rerank_batch")]
    pub batch_size: usize,
}

fn default_rerank_batch() -> usize {
    32
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_hybrid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_reranking: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stemming: Option<bool>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Parse a file without overrides or validation
    fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FeedsearchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FeedsearchError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FeedsearchError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let mut config = self.clone();
        config.meta.last_modified = current_timestamp();

        let content = toml::to_string_pretty(&config)?;
        std::fs::write(path, content).map_err(|e| FeedsearchError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| FeedsearchError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(enabled) = overrides.use_hybrid {
            self.retrieval.use_hybrid = enabled;
        }
        if let Some(enabled) = overrides.use_reranking {
            self.retrieval.use_reranking = enabled;
        }
        if let Some(enabled) = overrides.reranker_enabled {
            self.reranker.enabled = enabled;
        }
        if let Some(stemming) = overrides.stemming {
            self.sparse.stemming = stemming;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: FEEDSEARCH_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "RETRIEVAL__DEFAULT_TOP_K" => {
                self.retrieval.default_top_k = parse_value(path, value)?
            }
            "RETRIEVAL__USE_HYBRID" => self.retrieval.use_hybrid = parse_value(path, value)?,
            "RETRIEVAL__USE_RERANKING" => {
                self.retrieval.use_reranking = parse_value(path, value)?
            }
            "RETRIEVAL__RRF_K" => self.retrieval.rrf_k = parse_value(path, value)?,
            "RETRIEVAL__DENSE_TIMEOUT_MS" => {
                self.retrieval.dense_timeout_ms = parse_value(path, value)?
            }
            "SPARSE__ENABLED" => self.sparse.enabled = parse_value(path, value)?,
            "SPARSE__STEMMING" => self.sparse.stemming = parse_value(path, value)?,
            "RERANKER__ENABLED" => self.reranker.enabled = parse_value(path, value)?,
            "RERANKER__MODEL" => self.reranker.model = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            FeedsearchError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("feedsearch").join("config.toml"))
    }

    /// Load from `path`, the default location, or fall back to defaults
    ///
    /// An explicit path must exist; a missing default file is not an error.
    pub fn resolve(path: Option<&Path>, profile: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let default = Self::default_path()?;
                if default.exists() {
                    Self::load(&default)?
                } else {
                    let mut config = Self::default();
                    config.apply_env_overrides();
                    ConfigValidator::validate(&config)?;
                    config
                }
            }
        };

        if let Some(profile) = profile {
            config.apply_profile(profile)?;
            ConfigValidator::validate(&config)?;
        }
        Ok(config)
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FeedsearchError::InvalidConfigValue {
            path: path.to_string(),
            message: format!(
                "Cannot parse '{}' as {}",
                value,
                std::any::type_name::<T>()
            ),
        })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            index: IndexConfig {
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
                max_elements: 100_000,
            },
            retrieval: RetrievalConfig {
                default_top_k: 10,
                use_hybrid: true,
                use_reranking: true,
                rrf_k: 60.0,
                overfetch_factor: 3,
                candidate_window_factor: 2,
                agreement_boost: 1.1,
                dense_timeout_ms: 10_000,
                confidence_tiers: vec![
                    ConfidenceTier::new(0.3, 1.2),
                    ConfidenceTier::new(0.5, 1.1),
                ],
            },
            sparse: SparseConfig {
                enabled: true,
                stemming: true,
            },
            reranker: RerankerConfig {
                enabled: true,
                model: DEFAULT_RERANKER_MODEL.to_string(),
                batch_size: default_rerank_batch(),
            },
            profiles: HashMap::from([
                (
                    "fast".to_string(),
                    ProfileOverrides {
                        use_reranking: Some(false),
                        reranker_enabled: Some(false),
                        ..Default::default()
                    },
                ),
                (
                    "dense".to_string(),
                    ProfileOverrides {
                        use_hybrid: Some(false),
                        ..Default::default()
                    },
                ),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.retrieval.rrf_k = 40.0;
        config.sparse.stemming = false;
        config.save(&path).unwrap();

        let loaded = Config::read(&path).unwrap();
        assert_eq!(loaded.retrieval.rrf_k, 40.0);
        assert!(!loaded.sparse.stemming);
        assert_eq!(loaded.retrieval.confidence_tiers.len(), 2);
        assert!(loaded.profiles.contains_key("fast"));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(FeedsearchError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("FEEDSEARCH_RETRIEVAL__RRF_K", "30"),
            ("FEEDSEARCH_SPARSE__ENABLED", "false"),
            ("FEEDSEARCH_RERANKER__MODEL", "rozgo/bge-reranker-v2-m3"),
            ("OTHER_APP__RRF_K", "1"),
        ]));

        assert_eq!(config.retrieval.rrf_k, 30.0);
        assert!(!config.sparse.enabled);
        assert_eq!(config.reranker.model, "rozgo/bge-reranker-v2-m3");
    }

    #[test]
    fn test_unparseable_override_is_skipped() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[("FEEDSEARCH_SPARSE__STEMMING", "maybe")]));
        assert!(config.sparse.stemming);

        let err = config.set_value("RETRIEVAL__DENSE_TIMEOUT_MS", "soon");
        assert!(matches!(err, Err(FeedsearchError::InvalidConfigValue { .. })));
    }

    #[test]
    fn test_profiles() {
        let mut config = Config::default();
        config.apply_profile("fast").unwrap();
        assert!(!config.reranker.enabled);
        assert!(!config.retrieval.use_reranking);
        assert!(config.retrieval.use_hybrid);

        assert!(config.apply_profile("nope").is_err());
    }
}
