//! Centralized defaults for the regulation navigator
//!
//! Single source of truth for calibration constants and limits. Settings
//! structs take their defaults from here; code should read the settings,
//! not these constants, so deployments can retune them.

/// Hybrid retrieval calibration
///
/// Boost magnitudes and confidence thresholds are an empirical starting
/// calibration, to be tuned against a labeled query/relevance set.
pub mod retrieval {
    /// Weight of cosine similarity in the fused score
    pub const SEMANTIC_WEIGHT: f32 = 0.6;

    /// Weight of max-normalized BM25 in the fused score
    pub const LEXICAL_WEIGHT: f32 = 0.4;

    /// Query names the passage's regulation
    pub const REGULATION_BOOST: f32 = 0.30;

    /// Query names the passage's exact article number
    pub const ARTICLE_BOOST: f32 = 0.40;

    /// Per content word shared with the chapter title
    pub const CHAPTER_WORD_BOOST: f32 = 0.05;

    /// Per content word shared with the section title
    pub const SECTION_WORD_BOOST: f32 = 0.08;

    /// Score at or above which a passage is "high" confidence
    pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.5;

    /// Score at or above which a passage is "medium" confidence
    pub const MEDIUM_CONFIDENCE_THRESHOLD: f32 = 0.3;

    pub const DEFAULT_TOP_K: usize = 7;

    pub const DEFAULT_MIN_SCORE: f32 = 0.05;
}

/// Query planning
pub mod planner {
    /// Below this many distinct passages a pass is considered thin
    pub const MIN_DISTINCT_PASSAGES: usize = 3;

    /// Score assigned to passages found by direct article lookup
    pub const STRUCTURAL_FALLBACK_SCORE: f32 = 0.30;
}

/// Confidence gate
pub mod gate {
    /// Low-confidence results all below this score suppress generation
    pub const SUPPRESSION_THRESHOLD: f32 = 0.15;
}

/// Structural chunking limits (characters)
pub mod chunking {
    pub const MAX_CHUNK_CHARS: usize = 2000;
    pub const MIN_ARTICLE_CHUNK_CHARS: usize = 50;
    pub const MIN_RECITAL_CHARS: usize = 100;
    pub const MIN_ANNEX_CHARS: usize = 100;
    pub const MIN_ANNEX_POINT_CHARS: usize = 50;
}

/// Encoders
pub mod encoder {
    pub const SEMANTIC_MODEL_NAME: &str = "all-MiniLM-L6-v2";
    pub const SEMANTIC_EMBEDDING_DIM: usize = 384;
    pub const SEMANTIC_MAX_SEQ_LEN: usize = 256;
    pub const SEMANTIC_BATCH_SIZE: usize = 32;
    pub const LEXICAL_MAX_FEATURES: usize = 5000;
}

/// Filesystem defaults
pub mod paths {
    pub const INDEX_DIR: &str = "data/index";
    pub const SOURCES_DIR: &str = "data";
    pub const SEMANTIC_MODEL: &str = "models/embeddings/all-MiniLM-L6-v2.onnx";
    pub const SEMANTIC_TOKENIZER: &str = "models/embeddings/tokenizer.json";
}

/// Request deadline for offloaded retrieval, in milliseconds
pub const RETRIEVAL_TIMEOUT_MS: u64 = 10_000;
