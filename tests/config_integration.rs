use feedsearch::config::Config;
use feedsearch::retrieval::RetrievalSettings;
use feedsearch::FeedsearchError;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_init_then_load_with_profile() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    Config::default().save(&path).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.meta.schema_version, "1.0.0");
    assert!(config.reranker.enabled);

    let fast = Config::load_with_profile(&path, "fast").unwrap();
    assert!(!fast.reranker.enabled);
    assert!(!fast.retrieval.use_reranking);

    let resolved = Config::resolve(Some(&path), Some("dense")).unwrap();
    assert!(!resolved.retrieval.use_hybrid);
}

#[test]
fn test_hand_written_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[_meta]
schema_version = "1.0.0"

[embedding]
model = "bge-small-en-v1.5"
batch_size = 16

[index]
hnsw_m = 8
hnsw_ef_construction = 100
hnsw_ef_search = 32
max_elements = 5000

[retrieval]
default_top_k = 5
use_hybrid = true
use_reranking = false
rrf_k = 30.0
overfetch_factor = 4
candidate_window_factor = 3
agreement_boost = 1.25
dense_timeout_ms = 2500

[[retrieval.confidence_tiers]]
max_distance = 0.2
boost = 1.5

[sparse]
enabled = true
stemming = false

[reranker]
enabled = false
model = "BAAI/bge-reranker-base"
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.reranker.batch_size, 32);
    assert!(config.profiles.is_empty());

    let settings = RetrievalSettings::from_config(&config.retrieval).unwrap();
    assert_eq!(settings.fusion.rrf_k, 30.0);
    assert_eq!(settings.fusion.confidence_boost(0.1), 1.5);
    assert_eq!(settings.fusion.confidence_boost(0.3), 1.0);
    assert_eq!(settings.overfetch_factor, 4);
    assert_eq!(settings.dense_timeout, Duration::from_millis(2500));
}

#[test]
fn test_invalid_config_reports_all_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.retrieval.candidate_window_factor = 0;
    config.retrieval.dense_timeout_ms = 0;
    config.embedding.batch_size = 0;
    config.save(&path).unwrap();

    match Config::load(&path) {
        Err(FeedsearchError::ConfigValidation { errors }) => {
            let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
            assert!(paths.contains(&"retrieval.candidate_window_factor"));
            assert!(paths.contains(&"retrieval.dense_timeout_ms"));
            assert!(paths.contains(&"embedding.batch_size"));
        }
        other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_malformed_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[retrieval\nrrf_k = ").unwrap();

    assert!(matches!(Config::load(&path), Err(FeedsearchError::Toml(_))));
}

#[test]
fn test_unknown_profile() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    Config::default().save(&path).unwrap();

    assert!(matches!(
        Config::load_with_profile(&path, "turbo"),
        Err(FeedsearchError::Config(_))
    ));
}
