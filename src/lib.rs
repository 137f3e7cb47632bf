//! Feedsearch - Hybrid Retrieval for Customer Feedback
//!
//! Indexes short feedback snippets and answers queries by fusing dense
//! embedding similarity with BM25 keyword relevance (Reciprocal Rank Fusion
//! plus confidence boosting), optionally reordered by a cross-encoder.

pub mod analysis;
pub mod citation;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod dense;
pub mod document;
pub mod embedding;
pub mod error;
pub mod retrieval;
pub mod sparse;

pub use document::{Document, Metadata, MetadataFilter, MetadataValue};
pub use error::{FeedsearchError, Result};
pub use retrieval::{Candidate, HybridEngine, RetrievalMethod, SearchRequest};
