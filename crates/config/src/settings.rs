//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{self, chunking, encoder, gate, paths, planner, retrieval};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Index and source locations
    #[serde(default)]
    pub index: IndexConfig,

    /// Structural chunking limits
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Semantic and lexical encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Hybrid scoring calibration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Query planning
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Confidence gate
    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_retrieval()?;
        self.validate_planner()?;
        self.validate_chunking()?;
        self.validate_encoder()?;
        self.validate_index()?;
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;

        let unit_fields = [
            ("retrieval.semantic_weight", r.semantic_weight),
            ("retrieval.lexical_weight", r.lexical_weight),
            ("retrieval.regulation_boost", r.regulation_boost),
            ("retrieval.article_boost", r.article_boost),
            ("retrieval.chapter_word_boost", r.chapter_word_boost),
            ("retrieval.section_word_boost", r.section_word_boost),
            ("retrieval.high_confidence_threshold", r.high_confidence_threshold),
            ("retrieval.medium_confidence_threshold", r.medium_confidence_threshold),
            ("retrieval.default_min_score", r.default_min_score),
            ("gate.suppression_threshold", self.gate.suppression_threshold),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        if r.medium_confidence_threshold > r.high_confidence_threshold {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.medium_confidence_threshold".to_string(),
                message: format!(
                    "must not exceed high_confidence_threshold ({} > {})",
                    r.medium_confidence_threshold, r.high_confidence_threshold
                ),
            });
        }

        if self.gate.suppression_threshold > r.medium_confidence_threshold {
            return Err(ConfigError::InvalidValue {
                field: "gate.suppression_threshold".to_string(),
                message: format!(
                    "must not exceed medium_confidence_threshold ({} > {})",
                    self.gate.suppression_threshold, r.medium_confidence_threshold
                ),
            });
        }

        if r.default_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.default_top_k".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_planner(&self) -> Result<(), ConfigError> {
        let p = &self.planner;
        if p.min_distinct_passages == 0 {
            return Err(ConfigError::InvalidValue {
                field: "planner.min_distinct_passages".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !p.structural_fallback_score.is_finite() || p.structural_fallback_score < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "planner.structural_fallback_score".to_string(),
                message: format!("must be a non-negative number, got {}", p.structural_fallback_score),
            });
        }
        if let Some(ref rules) = p.expansion_rules_path {
            if !Path::new(rules).exists() {
                if self.environment.is_strict() {
                    return Err(ConfigError::FileNotFound(rules.clone()));
                }
                tracing::warn!(path = %rules, "Expansion rule file not found, using built-in rules");
            }
        }
        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let c = &self.chunking;
        let minimums = [
            ("chunking.min_article_chunk_chars", c.min_article_chunk_chars),
            ("chunking.min_recital_chars", c.min_recital_chars),
            ("chunking.min_annex_chars", c.min_annex_chars),
            ("chunking.min_annex_point_chars", c.min_annex_point_chars),
        ];
        for (field, value) in minimums {
            if value >= c.max_chunk_chars {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!(
                        "must be below max_chunk_chars ({} >= {})",
                        value, c.max_chunk_chars
                    ),
                });
            }
        }
        Ok(())
    }

    fn validate_encoder(&self) -> Result<(), ConfigError> {
        let e = &self.encoder;
        if e.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "encoder.batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if e.embedding_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "encoder.embedding_dim".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if e.lexical_max_features == 0 {
            return Err(ConfigError::InvalidValue {
                field: "encoder.lexical_max_features".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        // A missing model is not fatal: the index falls back to the lexical encoder
        if e.semantic_enabled {
            for (field, path) in [
                ("encoder.model_path", &e.model_path),
                ("encoder.tokenizer_path", &e.tokenizer_path),
            ] {
                if !Path::new(path).is_file() {
                    tracing::warn!("Semantic encoder file not found: {} = {}", field, path);
                }
            }
        }
        Ok(())
    }

    fn validate_index(&self) -> Result<(), ConfigError> {
        if self.index.index_dir.trim().is_empty() {
            return Err(ConfigError::MissingField("index.index_dir".to_string()));
        }
        if self.index.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "index.timeout_ms".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Index and source locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the passage manifest, matrix and lexical model
    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    /// Directory holding the source documents
    #[serde(default = "default_sources_dir")]
    pub sources_dir: String,

    /// Deadline for one offloaded retrieval, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_index_dir() -> String {
    paths::INDEX_DIR.to_string()
}
fn default_sources_dir() -> String {
    paths::SOURCES_DIR.to_string()
}
fn default_timeout_ms() -> u64 {
    constants::RETRIEVAL_TIMEOUT_MS
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            sources_dir: default_sources_dir(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Structural chunking limits, in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Longer passages are truncated
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Shorter article paragraphs are dropped
    #[serde(default = "default_min_article_chunk_chars")]
    pub min_article_chunk_chars: usize,

    #[serde(default = "default_min_recital_chars")]
    pub min_recital_chars: usize,

    #[serde(default = "default_min_annex_chars")]
    pub min_annex_chars: usize,

    #[serde(default = "default_min_annex_point_chars")]
    pub min_annex_point_chars: usize,
}

fn default_max_chunk_chars() -> usize {
    chunking::MAX_CHUNK_CHARS
}
fn default_min_article_chunk_chars() -> usize {
    chunking::MIN_ARTICLE_CHUNK_CHARS
}
fn default_min_recital_chars() -> usize {
    chunking::MIN_RECITAL_CHARS
}
fn default_min_annex_chars() -> usize {
    chunking::MIN_ANNEX_CHARS
}
fn default_min_annex_point_chars() -> usize {
    chunking::MIN_ANNEX_POINT_CHARS
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            min_article_chunk_chars: default_min_article_chunk_chars(),
            min_recital_chars: default_min_recital_chars(),
            min_annex_chars: default_min_annex_chars(),
            min_annex_point_chars: default_min_annex_point_chars(),
        }
    }
}

/// Encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Try the semantic encoder before falling back to TF-IDF
    #[serde(default = "default_true")]
    pub semantic_enabled: bool,

    /// ONNX sentence encoder
    #[serde(default = "default_model_path")]
    pub model_path: String,

    #[serde(default = "default_tokenizer_path")]
    pub tokenizer_path: String,

    /// Identifier recorded in the index manifest
    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// ONNX output tensor holding token embeddings
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Vocabulary cap for the lexical fallback
    #[serde(default = "default_lexical_max_features")]
    pub lexical_max_features: usize,
}

fn default_true() -> bool {
    true
}
fn default_model_path() -> String {
    paths::SEMANTIC_MODEL.to_string()
}
fn default_tokenizer_path() -> String {
    paths::SEMANTIC_TOKENIZER.to_string()
}
fn default_model_name() -> String {
    encoder::SEMANTIC_MODEL_NAME.to_string()
}
fn default_embedding_dim() -> usize {
    encoder::SEMANTIC_EMBEDDING_DIM
}
fn default_max_seq_len() -> usize {
    encoder::SEMANTIC_MAX_SEQ_LEN
}
fn default_batch_size() -> usize {
    encoder::SEMANTIC_BATCH_SIZE
}
fn default_output_name() -> String {
    "last_hidden_state".to_string()
}
fn default_lexical_max_features() -> usize {
    encoder::LEXICAL_MAX_FEATURES
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            semantic_enabled: true,
            model_path: default_model_path(),
            tokenizer_path: default_tokenizer_path(),
            model_name: default_model_name(),
            embedding_dim: default_embedding_dim(),
            max_seq_len: default_max_seq_len(),
            batch_size: default_batch_size(),
            output_name: default_output_name(),
            lexical_max_features: default_lexical_max_features(),
        }
    }
}

/// Hybrid scoring calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    #[serde(default = "default_regulation_boost")]
    pub regulation_boost: f32,

    #[serde(default = "default_article_boost")]
    pub article_boost: f32,

    #[serde(default = "default_chapter_word_boost")]
    pub chapter_word_boost: f32,

    #[serde(default = "default_section_word_boost")]
    pub section_word_boost: f32,

    #[serde(default = "default_high_threshold")]
    pub high_confidence_threshold: f32,

    #[serde(default = "default_medium_threshold")]
    pub medium_confidence_threshold: f32,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default = "default_min_score")]
    pub default_min_score: f32,
}

fn default_semantic_weight() -> f32 {
    retrieval::SEMANTIC_WEIGHT
}
fn default_lexical_weight() -> f32 {
    retrieval::LEXICAL_WEIGHT
}
fn default_regulation_boost() -> f32 {
    retrieval::REGULATION_BOOST
}
fn default_article_boost() -> f32 {
    retrieval::ARTICLE_BOOST
}
fn default_chapter_word_boost() -> f32 {
    retrieval::CHAPTER_WORD_BOOST
}
fn default_section_word_boost() -> f32 {
    retrieval::SECTION_WORD_BOOST
}
fn default_high_threshold() -> f32 {
    retrieval::HIGH_CONFIDENCE_THRESHOLD
}
fn default_medium_threshold() -> f32 {
    retrieval::MEDIUM_CONFIDENCE_THRESHOLD
}
fn default_top_k() -> usize {
    retrieval::DEFAULT_TOP_K
}
fn default_min_score() -> f32 {
    retrieval::DEFAULT_MIN_SCORE
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
            regulation_boost: default_regulation_boost(),
            article_boost: default_article_boost(),
            chapter_word_boost: default_chapter_word_boost(),
            section_word_boost: default_section_word_boost(),
            high_confidence_threshold: default_high_threshold(),
            medium_confidence_threshold: default_medium_threshold(),
            default_top_k: default_top_k(),
            default_min_score: default_min_score(),
        }
    }
}

/// Query planning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Fewer distinct passages than this triggers the next fallback pass
    #[serde(default = "default_min_distinct_passages")]
    pub min_distinct_passages: usize,

    /// Score given to passages surfaced by direct article lookup
    #[serde(default = "default_structural_fallback_score")]
    pub structural_fallback_score: f32,

    /// YAML file replacing the built-in expansion rules
    #[serde(default)]
    pub expansion_rules_path: Option<String>,
}

fn default_min_distinct_passages() -> usize {
    planner::MIN_DISTINCT_PASSAGES
}
fn default_structural_fallback_score() -> f32 {
    planner::STRUCTURAL_FALLBACK_SCORE
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_distinct_passages: default_min_distinct_passages(),
            structural_fallback_score: default_structural_fallback_score(),
            expansion_rules_path: None,
        }
    }
}

/// Confidence gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_suppression_threshold")]
    pub suppression_threshold: f32,
}

fn default_suppression_threshold() -> f32 {
    gate::SUPPRESSION_THRESHOLD
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            suppression_threshold: default_suppression_threshold(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from `config/` and the environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (REGNAV__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from an explicit config directory
pub fn load_settings_from(config_dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_file = config_dir.join("default");
    builder = builder.add_source(File::with_name(&default_file.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_file = config_dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_file.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("REGNAV")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.retrieval.default_top_k, 7);
        assert!((settings.retrieval.article_boost - 0.40).abs() < f32::EPSILON);
        assert!((settings.retrieval.section_word_boost - 0.08).abs() < f32::EPSILON);
        assert_eq!(settings.planner.min_distinct_passages, 3);
        assert_eq!(settings.chunking.max_chunk_chars, 2000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.retrieval.semantic_weight = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "retrieval.semantic_weight"
        ));

        let mut settings = Settings::default();
        settings.retrieval.medium_confidence_threshold = 0.7;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.gate.suppression_threshold = 0.4;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retrieval.default_top_k = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.chunking.min_recital_chars = 5000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            "retrieval:\n  article_boost: 0.5\nobservability:\n  log_json: true\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), None).unwrap();
        assert!((settings.retrieval.article_boost - 0.5).abs() < f32::EPSILON);
        assert!((settings.retrieval.regulation_boost - 0.30).abs() < f32::EPSILON);
        assert!(settings.observability.log_json);
    }

    #[test]
    fn test_env_file_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.yaml"), "retrieval:\n  default_top_k: 5\n").unwrap();
        std::fs::write(dir.path().join("staging.yaml"), "retrieval:\n  default_top_k: 9\n").unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.retrieval.default_top_k, 9);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.yaml"), "retrieval:\n  lexical_weight: 3.0\n").unwrap();
        assert!(load_settings_from(dir.path(), None).is_err());
    }

    #[test]
    fn test_settings_serde_roundtrip() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.retrieval.default_top_k, settings.retrieval.default_top_k);
        assert_eq!(back.encoder.model_name, "all-MiniLM-L6-v2");
    }
}
