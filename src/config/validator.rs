use crate::config::{Config, SCHEMA_VERSION};
use crate::embedding::FastEmbedProvider;
use crate::error::{FeedsearchError, Result, ValidationError};
use crate::retrieval::ConfidenceTier;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every problem at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_reranker(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FeedsearchError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        let model = config.embedding.model.as_str();
        if !FastEmbedProvider::is_supported(model) {
            errors.push(ValidationError::new(
                "embedding.model",
                format!(
                    "Model must be one of {:?}, got '{}'",
                    FastEmbedProvider::SUPPORTED_MODELS,
                    model
                ),
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let index = &config.index;
        for (path, value) in [
            ("index.hnsw_m", index.hnsw_m),
            ("index.hnsw_ef_construction", index.hnsw_ef_construction),
            ("index.hnsw_ef_search", index.hnsw_ef_search),
            ("index.max_elements", index.max_elements),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.default_top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_top_k",
                "Default top_k must be at least 1",
            ));
        }

        if !retrieval.rrf_k.is_finite() || retrieval.rrf_k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be a non-negative number, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.overfetch_factor == 0 {
            errors.push(ValidationError::new(
                "retrieval.overfetch_factor",
                "Over-fetch factor must be at least 1",
            ));
        }

        if retrieval.candidate_window_factor == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_window_factor",
                "Candidate window factor must be at least 1",
            ));
        }

        if !retrieval.agreement_boost.is_finite() || retrieval.agreement_boost < 1.0 {
            errors.push(ValidationError::new(
                "retrieval.agreement_boost",
                format!(
                    "Agreement boost must be >= 1.0, got {}",
                    retrieval.agreement_boost
                ),
            ));
        }

        if retrieval.dense_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.dense_timeout_ms",
                "Dense timeout must be greater than 0",
            ));
        }

        let mut previous: Option<ConfidenceTier> = None;
        for (i, tier) in retrieval.confidence_tiers.iter().enumerate() {
            let path = format!("retrieval.confidence_tiers[{}]", i);

            if !tier.max_distance.is_finite() || tier.max_distance <= 0.0 {
                errors.push(ValidationError::new(
                    &path,
                    format!("max_distance must be positive, got {}", tier.max_distance),
                ));
            }
            if !tier.boost.is_finite() || tier.boost < 1.0 {
                errors.push(ValidationError::new(
                    &path,
                    format!("boost must be >= 1.0, got {}", tier.boost),
                ));
            }
            if let Some(prev) = previous {
                if tier.max_distance <= prev.max_distance {
                    errors.push(ValidationError::new(
                        &path,
                        "Tiers must be listed by strictly increasing max_distance",
                    ));
                } else if tier.boost > prev.boost {
                    errors.push(ValidationError::new(
                        &path,
                        format!(
                            "boost {} exceeds the closer tier's boost {}",
                            tier.boost, prev.boost
                        ),
                    ));
                }
            }
            previous = Some(*tier);
        }
    }

    fn validate_reranker(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.reranker.batch_size == 0 {
            errors.push(ValidationError::new(
                "reranker.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.reranker.enabled && config.reranker.model.trim().is_empty() {
            errors.push(ValidationError::new(
                "reranker.model",
                "Model name cannot be empty when the reranker is enabled",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_of(config: &Config) -> Vec<ValidationError> {
        match ConfigValidator::validate(config) {
            Err(FeedsearchError::ConfigValidation { errors }) => errors,
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_embedding_model() {
        let mut config = Config::default();
        config.embedding.model = "word2vec".to_string();
        let errors = errors_of(&config);
        assert_eq!(errors[0].path, "embedding.model");
    }

    #[test]
    fn test_embedding_model_name_is_case_sensitive() {
        let mut config = Config::default();
        config.embedding.model = "BGE-SMALL-EN-V1.5".to_string();
        let errors = errors_of(&config);
        assert_eq!(errors[0].path, "embedding.model");

        config.embedding.model = "bge-small-en-v1.5".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_errors_accumulate() {
        let mut config = Config::default();
        config.meta.schema_version = "0.1.0".to_string();
        config.retrieval.overfetch_factor = 0;
        config.index.hnsw_m = 0;

        assert_eq!(errors_of(&config).len(), 3);
    }

    #[test]
    fn test_tiers_must_increase() {
        let mut config = Config::default();
        config.retrieval.confidence_tiers =
            vec![ConfidenceTier::new(0.5, 1.1), ConfidenceTier::new(0.3, 1.2)];

        let errors = errors_of(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "retrieval.confidence_tiers[1]");
    }

    #[test]
    fn test_boosts_not_below_one() {
        let mut config = Config::default();
        config.retrieval.agreement_boost = 0.9;
        config.retrieval.confidence_tiers = vec![ConfidenceTier::new(0.3, 0.5)];
        assert_eq!(errors_of(&config).len(), 2);
    }

    #[test]
    fn test_farther_tier_cannot_boost_more() {
        let mut config = Config::default();
        config.retrieval.confidence_tiers =
            vec![ConfidenceTier::new(0.3, 1.0), ConfidenceTier::new(0.9, 1.5)];

        let errors = errors_of(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "retrieval.confidence_tiers[1]");

        // Equal boosts across tiers are allowed
        config.retrieval.confidence_tiers =
            vec![ConfidenceTier::new(0.3, 1.2), ConfidenceTier::new(0.9, 1.2)];
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
