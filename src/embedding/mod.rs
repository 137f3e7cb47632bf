/// Embedding generation for the dense index.
///
/// - `EmbeddingProvider` trait for abstraction over backends
/// - `FastEmbedProvider` for local embedding (all-MiniLM-L6-v2, 384-dim by default)
mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
