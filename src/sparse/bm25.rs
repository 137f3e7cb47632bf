//! BM25 scoring over an in-RAM tantivy index
use super::{SparseBackend, SparseIndex, SparseIndexError};
use crate::analysis::Tokenizer;
use crate::document::CorpusSnapshot;
use std::collections::HashMap;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, warn};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Builds [`Bm25Index`]es, tokenizing documents with the engine's tokenizer
pub struct Bm25Backend {
    tokenizer: Tokenizer,
}

impl Bm25Backend {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }
}

impl SparseBackend for Bm25Backend {
    fn name(&self) -> &str {
        "bm25"
    }

    fn build(&self, corpus: &CorpusSnapshot) -> Result<Arc<dyn SparseIndex>, SparseIndexError> {
        Ok(Arc::new(Bm25Index::build(corpus, &self.tokenizer)?))
    }
}

/// Immutable BM25 index over one corpus snapshot
///
/// Documents are pre-tokenized and stored space-separated, so tantivy's
/// whitespace tokenizer sees exactly the tokens the query side produces.
pub struct Bm25Index {
    reader: IndexReader,
    ord_field: Field,
    tokens_field: Field,
    ids: Vec<String>,
}

impl Bm25Index {
    pub fn build(corpus: &CorpusSnapshot, tokenizer: &Tokenizer) -> Result<Self, SparseIndexError> {
        let mut schema_builder = Schema::builder();

        let ord_field = schema_builder.add_u64_field("ord", STORED);
        let indexing = TextFieldIndexing::default()
            .set_tokenizer("whitespace")
            .set_index_option(IndexRecordOption::WithFreqs);
        let tokens_field = schema_builder.add_text_field(
            "tokens",
            TextOptions::default().set_indexing_options(indexing),
        );

        let schema = schema_builder.build();
        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(|e| SparseIndexError::Build(e.to_string()))?;

        let mut ids = Vec::with_capacity(corpus.len());
        for (ord, (id, text)) in corpus.entries().iter().enumerate() {
            let tokens = tokenizer.tokenize(text).join(" ");
            writer.add_document(doc!(
                ord_field => ord as u64,
                tokens_field => tokens,
            ))?;
            ids.push(id.clone());
        }

        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| SparseIndexError::Build(e.to_string()))?;

        debug!("Built BM25 index over {} documents", ids.len());

        Ok(Self {
            reader,
            ord_field,
            tokens_field,
            ids,
        })
    }

    fn matched_scores(&self, query_tokens: &[String]) -> Result<Vec<(usize, f32)>, SparseIndexError> {
        if query_tokens.is_empty() || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = query_tokens
            .iter()
            .map(|token| {
                let term = Term::from_field_text(self.tokens_field, token);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(self.ids.len()))
            .map_err(|e| SparseIndexError::Search(e.to_string()))?;

        let mut matched = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let stored: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| SparseIndexError::Search(e.to_string()))?;

            let ord = stored
                .get_first(self.ord_field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| SparseIndexError::Search("Missing ord field".to_string()))?;

            matched.push((ord as usize, score));
        }

        Ok(matched)
    }
}

impl SparseIndex for Bm25Index {
    fn score(&self, query_tokens: &[String]) -> HashMap<String, f32> {
        let mut scores: HashMap<String, f32> =
            self.ids.iter().map(|id| (id.clone(), 0.0)).collect();

        match self.matched_scores(query_tokens) {
            Ok(matched) => {
                for (ord, score) in matched {
                    if let Some(id) = self.ids.get(ord) {
                        scores.insert(id.clone(), score.max(0.0));
                    }
                }
            }
            Err(e) => warn!("BM25 scoring failed, contributing no sparse scores: {}", e),
        }

        scores
    }

    fn doc_ids(&self) -> &[String] {
        &self.ids
    }
}
