//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "feedsearch",
    version,
    author = "neur0map",
    about = "Hybrid semantic + keyword search over customer feedback",
    long_about = "Feedsearch indexes customer-feedback snippets from a JSONL export and answers \
                  queries by fusing dense embedding similarity with BM25 keyword relevance, \
                  optionally reranked by a cross-encoder."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/feedsearch/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "fast", "dense")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a feedback corpus
    Search {
        /// Search query text
        query: String,

        /// JSONL corpus file
        #[arg(short = 'f', long, value_name = "FILE")]
        corpus: PathBuf,

        /// Maximum number of results (defaults to retrieval.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Skip keyword scoring
        #[arg(long)]
        dense_only: bool,

        /// Keep fused order instead of reranking
        #[arg(long)]
        no_rerank: bool,

        /// Exact-match metadata filter, repeatable (e.g., market=DE)
        #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        /// Print the citation context block instead of results
        #[arg(long, conflicts_with = "json")]
        context: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Find feedback similar to a stored record
    Similar {
        /// Record id
        id: String,

        /// JSONL corpus file
        #[arg(short = 'f', long, value_name = "FILE")]
        corpus: PathBuf,

        /// Maximum number of results
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Index a corpus and report engine diagnostics
    Stats {
        /// JSONL corpus file
        #[arg(short = 'f', long, value_name = "FILE")]
        corpus: PathBuf,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section (e.g., "retrieval")
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file location
    Path,
}

/// Parse a `key=value` filter argument
pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty filter key in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("market=DE"),
            Ok(("market".to_string(), "DE".to_string()))
        );
        assert_eq!(
            parse_filter("label = NAVIGATION"),
            Ok(("label".to_string(), "NAVIGATION".to_string()))
        );
        assert!(parse_filter("market").is_err());
        assert!(parse_filter("=DE").is_err());
    }

    #[test]
    fn test_search_args() {
        let cli = Cli::try_parse_from([
            "feedsearch",
            "search",
            "battery drain",
            "-f",
            "feedback.jsonl",
            "-k",
            "3",
            "--filter",
            "market=DE",
            "--filter",
            "language=de",
            "--dense-only",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                query,
                top_k,
                filters,
                dense_only,
                no_rerank,
                ..
            } => {
                assert_eq!(query, "battery drain");
                assert_eq!(top_k, Some(3));
                assert_eq!(filters.len(), 2);
                assert!(dense_only);
                assert!(!no_rerank);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
