use feedsearch::citation::{self, MIN_RELEVANCE_SCORE};
use feedsearch::cli::{Cli, Commands, ConfigAction};
use feedsearch::config::Config;
use feedsearch::corpus;
use feedsearch::error::{FeedsearchError, Result};
use feedsearch::{Candidate, HybridEngine, MetadataFilter, MetadataValue, SearchRequest};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    match cli.command {
        Commands::Config { action } => cmd_config(cli.config, cli.profile, action),
        command => {
            let config = Config::resolve(cli.config.as_deref(), cli.profile.as_deref())?;
            run(config, command)
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "feedsearch=debug"
    } else {
        "feedsearch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr so `--json` output stays parseable
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: Config, command: Commands) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| FeedsearchError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })?;

    tracing::info!("Loading embedding model {}", config.embedding.model);
    let engine = HybridEngine::from_config(&config)?;

    runtime.block_on(async {
        match command {
            Commands::Search {
                query,
                corpus,
                top_k,
                dense_only,
                no_rerank,
                filters,
                context,
                json,
            } => {
                index_corpus(&engine, &corpus).await?;

                let filter = filters
                    .into_iter()
                    .fold(MetadataFilter::new(), |filter, (key, value)| {
                        filter.with(key, MetadataValue::parse_scalar(&value))
                    });

                let request = SearchRequest::new(
                    query,
                    top_k.unwrap_or(config.retrieval.default_top_k),
                )
                .hybrid(config.retrieval.use_hybrid && !dense_only)
                .reranking(config.retrieval.use_reranking && !no_rerank)
                .filters(filter);

                let results = engine.search(&request).await;

                if context {
                    println!("{}", citation::build_context(&results));
                } else if json {
                    print_json(&results)?;
                } else {
                    print_results(&results);
                    print_citation_summary(&results);
                }
            }
            Commands::Similar {
                id,
                corpus,
                top_k,
                json,
            } => {
                index_corpus(&engine, &corpus).await?;
                let results = engine.similar(&id, top_k).await?;

                if json {
                    print_json(&results)?;
                } else {
                    print_results(&results);
                }
            }
            Commands::Stats { corpus } => {
                index_corpus(&engine, &corpus).await?;

                engine.refresh_sparse_index().await;

                print_json(&engine.stats().await)?;
            }
            Commands::Config { .. } => {
                return Err(FeedsearchError::Config(
                    "config commands run without an engine".to_string(),
                ))
            }
        }
        Ok::<(), FeedsearchError>(())
    })
}

async fn index_corpus(engine: &HybridEngine, path: &Path) -> Result<()> {
    let documents = corpus::load_jsonl(path)?;
    let total = documents.len();
    let written = engine.add_documents(documents).await?;
    tracing::info!("Indexed {} of {} records from {}", written, total, path.display());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| FeedsearchError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn print_results(results: &[Candidate]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        let mut header = format!(
            "{}. [{}] {} score={:.4}",
            i + 1,
            result.id,
            result.retrieval_method,
            result.score
        );
        if let Some(distance) = result.dense_distance {
            header.push_str(&format!(" distance={:.3}", distance));
        }
        if let Some(rerank) = result.rerank_score {
            header.push_str(&format!(" rerank={:.3}", rerank));
        }
        println!("{}", header);
        println!("   {}", result.preview(160));

        if !result.metadata.is_empty() {
            let meta: Vec<String> = result
                .metadata
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            println!("   {}", meta.join(" "));
        }
    }
}

fn print_citation_summary(results: &[Candidate]) {
    let sources = citation::relevant_sources(results, MIN_RELEVANCE_SCORE);
    println!();
    println!(
        "{} of {} results citable (score >= {}), mean score {:.4}",
        sources.len(),
        results.len(),
        MIN_RELEVANCE_SCORE,
        citation::average_score(&sources)
    );
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = Config::resolve(config_path.as_deref(), profile.as_deref())?;
            let value = serde_json::to_value(&config).map_err(|e| FeedsearchError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            match section {
                Some(section) => {
                    let part = value.get(&section).ok_or_else(|| {
                        FeedsearchError::Config(format!("Unknown config section: {}", section))
                    })?;
                    print_json(part)?;
                }
                None => print_json(&value)?,
            }
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}
