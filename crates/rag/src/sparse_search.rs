//! Sparse Search using Tantivy (BM25)
//!
//! Keyword side of hybrid retrieval. The index is rebuilt in RAM from the
//! loaded passages' raw text every time an embedding index is loaded, so it
//! always matches the passage list exactly and is never persisted.

use std::collections::HashMap;
use std::sync::Arc;
use tantivy::{
    collector::TopDocs,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{
        Field, IndexRecordOption, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED,
        STRING,
    },
    tokenizer::{
        Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
        TokenStream,
    },
    Index, IndexReader, TantivyDocument, Term,
};

use regnav_core::Passage;

use crate::{RagError, Result};

const TOKENIZER_NAME: &str = "legal_en";

/// Writer heap; tantivy's per-thread minimum
const WRITER_HEAP_BYTES: usize = 15_000_000;

/// BM25 index over passage text
pub struct SparseIndex {
    index: Index,
    reader: IndexReader,
    chunk_id_field: Field,
    text_field: Field,
}

impl SparseIndex {
    /// Build an in-memory index over the given passages
    pub fn build(passages: &[Arc<Passage>]) -> Result<Self> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let chunk_id_field = schema_builder.add_text_field("chunk_id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", text_options);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        index.tokenizers().register(TOKENIZER_NAME, Self::build_tokenizer());

        let mut writer = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| RagError::Index(e.to_string()))?;

        for passage in passages {
            let mut doc = TantivyDocument::default();
            doc.add_text(chunk_id_field, passage.chunk_id());
            doc.add_text(text_field, passage.text());
            writer
                .add_document(doc)
                .map_err(|e| RagError::Index(e.to_string()))?;
        }

        writer.commit().map_err(|e| RagError::Index(e.to_string()))?;

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;
        reader.reload().map_err(|e| RagError::Index(e.to_string()))?;

        tracing::debug!(documents = passages.len(), "Sparse index built");

        Ok(Self {
            index,
            reader,
            chunk_id_field,
            text_field,
        })
    }

    /// English analysis: simple tokens, long-token removal, lowercase, stemming
    fn build_tokenizer() -> TextAnalyzer {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::English))
            .build()
    }

    /// Query terms in index form, in query order
    ///
    /// The query runs through the same analyzer as the passages, so
    /// operators, parentheses and `field:` prefixes are plain words.
    fn query_terms(&self, query: &str) -> Result<Vec<Term>> {
        let mut analyzer = self
            .index
            .tokenizers()
            .get(TOKENIZER_NAME)
            .ok_or_else(|| {
                RagError::Search(format!("tokenizer '{}' not registered", TOKENIZER_NAME))
            })?;
        let mut stream = analyzer.token_stream(query);
        let mut terms = Vec::new();
        while stream.advance() {
            terms.push(Term::from_field_text(self.text_field, &stream.token().text));
        }
        Ok(terms)
    }

    /// BM25 score of every matching passage, divided by the best score
    ///
    /// Keys are chunk IDs; passages with no matching term are absent. Any
    /// query term may match; there is no query syntax.
    pub fn normalized_scores(&self, query: &str) -> Result<HashMap<String, f32>> {
        let searcher = self.reader.searcher();
        let num_docs = searcher.num_docs() as usize;
        if num_docs == 0 {
            return Ok(HashMap::new());
        }

        let terms = self.query_terms(query)?;
        if terms.is_empty() {
            return Ok(HashMap::new());
        }
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let any_term = BooleanQuery::new(clauses);

        let top_docs = searcher
            .search(&any_term, &TopDocs::with_limit(num_docs))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut scores = HashMap::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| RagError::Search(e.to_string()))?;
            if let Some(OwnedValue::Str(id)) = doc.get_first(self.chunk_id_field) {
                scores.insert(id.to_string(), score);
            }
        }

        let max = scores.values().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            for score in scores.values_mut() {
                *score /= max;
            }
        }

        Ok(scores)
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}
