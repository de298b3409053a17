//! Structure-aware retrieval over EU regulatory text
//!
//! Features:
//! - Structural chunking of recitals, articles and annexes
//! - Dense vectors from a semantic ONNX encoder, or a TF-IDF fallback
//! - Sparse BM25 search via Tantivy
//! - Hybrid fusion with structural boosts (regulation, article, headings)
//! - Intent-aware query planning with multi-pass retrieval
//! - Confidence gating and citation verification around generation

pub mod builder;
pub mod chunker;
pub mod citation;
pub mod embeddings;
pub mod extraction;
pub mod gate;
pub mod index;
pub mod lexical;
pub mod planner;
pub mod prompt;
pub mod query_expansion;
pub mod registry;
pub mod retriever;
pub mod service;
pub mod sparse_search;

pub use builder::{BuildReport, IndexBuilder};
pub use chunker::{
    AnnexRule, AnnexSubPointRule, ArticleRule, DocumentChunker, RecitalRule, StructuralRule,
};
pub use citation::{extract_citations, verify_citations, Citation, CitationVerifier};
pub use embeddings::{load_semantic_encoder, OnnxEncoder};
pub use extraction::{discover_sources, PdfToTextExtractor, PlainTextExtractor, SourceDocument};
pub use gate::{overall_confidence, ConfidenceGate, GateDecision};
pub use index::{EmbeddingIndex, EmbeddingMatrix, EncoderRecord, IndexManifest, SemanticLoader};
pub use lexical::LexicalEncoder;
pub use planner::{infer_focus, infer_intent, QueryPlanner, RetrievalOutcome};
pub use prompt::{
    build_system_prompt, build_user_prompt, format_passage_for_prompt, format_sources, SourceRef,
};
pub use query_expansion::{role_terms, ExpansionRule, QueryExpander};
pub use retriever::{HybridRetriever, PassageScore, RetrieveOptions};
pub use service::{Answer, AnswerOutcome, Refusal, RegulationSearch};
pub use sparse_search::SparseIndex;

use std::time::Duration;
use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Index must be rebuilt: {0}")]
    RebuildRequired(String),

    #[error("Embedding dimension mismatch: index has {expected}, encoder produces {actual}")]
    IncompatibleDimension { expected: usize, actual: usize },

    #[error("Retrieval unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval timed out after {0:?}")]
    Timeout(Duration),

    #[error("Index not loaded")]
    NotLoaded,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] regnav_core::Error),
}

impl From<RagError> for regnav_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Core(inner) => inner,
            RagError::RebuildRequired(msg) => regnav_core::Error::RebuildRequired(msg),
            RagError::Timeout(after) => regnav_core::Error::Timeout(after),
            RagError::Embedding(msg) | RagError::Model(msg) => regnav_core::Error::Encoder(msg),
            RagError::Unavailable(msg) => regnav_core::Error::Unavailable(msg),
            RagError::IncompatibleDimension { expected, actual } => {
                regnav_core::Error::IncompatibleEncoder { expected, actual }
            },
            RagError::Index(msg) | RagError::Persistence(msg) => regnav_core::Error::Index(msg),
            RagError::Search(msg) => regnav_core::Error::Search(msg),
            RagError::NotLoaded => regnav_core::Error::NotLoaded,
            RagError::Io(e) => regnav_core::Error::Io(e),
            other => regnav_core::Error::Retrieval(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
