//! Embedding index: passages, their vectors, and the encoder that made them
//!
//! On disk an index directory holds:
//! - `manifest.json`: format version, encoder record, passage list
//! - `embeddings.safetensors`: the `[passages, dim]` f32 matrix
//! - `lexical.json`: fitted TF-IDF state, when the lexical encoder was used
//!
//! Query encoding must happen in the same vector space as the stored
//! matrix. The query encoder is resolved once, on first use, in order:
//!
//! 1. a preloaded semantic encoder of matching kind and dimension
//! 2. the persisted lexical encoder, if its dimension matches
//! 3. a semantic encoder from the lazy loader, if its dimension matches
//! 4. a lexical encoder refitted in memory on the passages, replacing the
//!    matrix for this process
//!
//! Each step that is skipped is logged. If none succeeds, searches fail
//! with [`RagError::Unavailable`].

use once_cell::sync::OnceCell;
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regnav_core::{Encoder, EncoderKind, Passage, PassageKind, RegulationFocus, SourceId};

use crate::lexical::LexicalEncoder;
use crate::registry;
use crate::sparse_search::SparseIndex;
use crate::{RagError, Result};

/// Index format understood by this build
pub const INDEX_FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MATRIX_FILE: &str = "embeddings.safetensors";
pub const LEXICAL_FILE: &str = "lexical.json";

const MATRIX_TENSOR: &str = "embeddings";

/// Deferred semantic encoder construction
pub type SemanticLoader =
    Arc<dyn Fn() -> regnav_core::Result<Option<Arc<dyn Encoder>>> + Send + Sync>;

/// Which encoder produced the stored vectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderRecord {
    pub kind: EncoderKind,
    pub name: String,
    pub dim: usize,
}

impl EncoderRecord {
    pub fn of(encoder: &dyn Encoder) -> Self {
        Self {
            kind: encoder.kind(),
            name: encoder.name().to_string(),
            dim: encoder.dim(),
        }
    }
}

/// Persisted index metadata and passages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub encoder: EncoderRecord,
    pub passages: Vec<Passage>,
}

/// Row-major `[rows, dim]` matrix
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    dim: usize,
}

impl EmbeddingMatrix {
    pub fn from_rows(rows: Vec<Vec<f32>>, dim: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(RagError::Index(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            data.extend(row);
        }
        Ok(Self { data, dim })
    }

    pub fn rows(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    fn to_safetensors(&self) -> Result<Vec<u8>> {
        let bytes: Vec<u8> = self.data.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, vec![self.rows(), self.dim], &bytes)
            .map_err(|e| RagError::Persistence(e.to_string()))?;
        let metadata: HashMap<String, String> =
            [("format_version".to_string(), INDEX_FORMAT_VERSION.to_string())].into();
        safetensors::serialize(vec![(MATRIX_TENSOR, view)], &Some(metadata))
            .map_err(|e| RagError::Persistence(e.to_string()))
    }

    fn from_safetensors(buf: &[u8]) -> Result<Self> {
        let tensors =
            SafeTensors::deserialize(buf).map_err(|e| RagError::RebuildRequired(e.to_string()))?;
        let tensor = tensors
            .tensor(MATRIX_TENSOR)
            .map_err(|e| RagError::RebuildRequired(e.to_string()))?;

        if tensor.dtype() != Dtype::F32 {
            return Err(RagError::RebuildRequired(format!(
                "embedding matrix has dtype {:?}, expected F32",
                tensor.dtype()
            )));
        }
        let (rows, dim) = match tensor.shape() {
            [rows, dim] => (*rows, *dim),
            other => {
                return Err(RagError::RebuildRequired(format!(
                    "embedding matrix has shape {:?}, expected two dimensions",
                    other
                )))
            },
        };

        let data: Vec<f32> = tensor
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if data.len() != rows * dim {
            return Err(RagError::RebuildRequired(
                "embedding matrix data is truncated".to_string(),
            ));
        }

        Ok(Self { data, dim })
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Query encoder paired with the matrix in its vector space
struct ActiveSpace {
    encoder: Arc<dyn Encoder>,
    matrix: Arc<EmbeddingMatrix>,
}

/// Loaded passages, vectors and BM25 index
pub struct EmbeddingIndex {
    passages: Vec<Arc<Passage>>,
    matrix: Arc<EmbeddingMatrix>,
    encoder: EncoderRecord,
    sparse: SparseIndex,
    semantic: Option<Arc<dyn Encoder>>,
    lexical: Option<Arc<LexicalEncoder>>,
    semantic_loader: Option<SemanticLoader>,
    lexical_max_features: usize,
    active: OnceCell<ActiveSpace>,
}

impl EmbeddingIndex {
    /// Assemble an index from built parts
    pub fn from_parts(
        passages: Vec<Passage>,
        matrix: EmbeddingMatrix,
        encoder: EncoderRecord,
        lexical: Option<LexicalEncoder>,
    ) -> Result<Self> {
        if matrix.rows() != passages.len() {
            return Err(RagError::RebuildRequired(format!(
                "embedding matrix has {} rows for {} passages",
                matrix.rows(),
                passages.len()
            )));
        }
        if matrix.dim() != encoder.dim && !passages.is_empty() {
            return Err(RagError::IncompatibleDimension {
                expected: encoder.dim,
                actual: matrix.dim(),
            });
        }

        let passages: Vec<Arc<Passage>> = passages.into_iter().map(Arc::new).collect();
        let sparse = SparseIndex::build(&passages)?;

        Ok(Self {
            passages,
            matrix: Arc::new(matrix),
            encoder,
            sparse,
            semantic: None,
            lexical: lexical.map(Arc::new),
            semantic_loader: None,
            lexical_max_features: regnav_config::constants::encoder::LEXICAL_MAX_FEATURES,
            active: OnceCell::new(),
        })
    }

    /// Load an index directory
    ///
    /// Missing or unreadable manifest or matrix, an unknown format version,
    /// duplicate chunk IDs and a row count mismatch all report
    /// [`RagError::RebuildRequired`]. Article passages stored without
    /// chapter or section metadata get it from the structural registry.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILE);
        let matrix_path = dir.join(MATRIX_FILE);

        let manifest_bytes = fs::read(&manifest_path).map_err(|e| {
            RagError::RebuildRequired(format!("{}: {}", manifest_path.display(), e))
        })?;
        let manifest: IndexManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
            RagError::RebuildRequired(format!("{}: {}", manifest_path.display(), e))
        })?;
        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(RagError::RebuildRequired(format!(
                "index format version {} is not supported (expected {})",
                manifest.format_version, INDEX_FORMAT_VERSION
            )));
        }

        let matrix_bytes = fs::read(&matrix_path)
            .map_err(|e| RagError::RebuildRequired(format!("{}: {}", matrix_path.display(), e)))?;
        let matrix = EmbeddingMatrix::from_safetensors(&matrix_bytes)?;

        let lexical_path = dir.join(LEXICAL_FILE);
        let lexical = if lexical_path.exists() {
            match LexicalEncoder::load(&lexical_path) {
                Ok(encoder) => Some(encoder),
                Err(e) => {
                    tracing::warn!(path = %lexical_path.display(), error = %e, "Ignoring unreadable lexical encoder");
                    None
                },
            }
        } else {
            None
        };

        let passages: Vec<Passage> = manifest
            .passages
            .into_iter()
            .map(|passage| {
                let passage = match passage.kind() {
                    PassageKind::Article => {
                        let number = passage.label().trim_start_matches("Article ");
                        let known = registry::lookup_label(passage.source_id(), number);
                        passage.with_structure_defaults(&known)
                    },
                    _ => passage,
                };
                passage.with_derived_breadcrumb()
            })
            .collect();

        let mut seen = HashSet::new();
        if let Some(duplicate) = passages.iter().find(|p| !seen.insert(p.chunk_id())) {
            return Err(RagError::RebuildRequired(format!(
                "{}: duplicate chunk id {}",
                manifest_path.display(),
                duplicate.chunk_id()
            )));
        }

        let index = Self::from_parts(passages, matrix, manifest.encoder, lexical)?;

        tracing::info!(
            dir = %dir.display(),
            passages = index.len(),
            encoder = %index.encoder.name,
            dim = index.encoder.dim,
            "Loaded embedding index"
        );

        Ok(index)
    }

    /// Persist to `dir`, replacing any existing index only once fully written
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let staging = sibling(dir, "tmp")?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            encoder: self.encoder.clone(),
            passages: self.passages.iter().map(|p| p.as_ref().clone()).collect(),
        };
        fs::write(staging.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;
        fs::write(staging.join(MATRIX_FILE), self.matrix.to_safetensors()?)?;
        if let Some(lexical) = &self.lexical {
            lexical.save(staging.join(LEXICAL_FILE))?;
        }

        swap_into_place(&staging, dir)?;

        tracing::info!(dir = %dir.display(), passages = self.len(), "Saved embedding index");
        Ok(())
    }

    pub fn with_semantic_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.semantic = Some(encoder);
        self
    }

    pub fn with_semantic_loader(mut self, loader: SemanticLoader) -> Self {
        self.semantic_loader = Some(loader);
        self
    }

    pub fn with_lexical_max_features(mut self, max_features: usize) -> Self {
        self.lexical_max_features = max_features;
        self
    }

    pub fn passages(&self) -> &[Arc<Passage>] {
        &self.passages
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn encoder_record(&self) -> &EncoderRecord {
        &self.encoder
    }

    /// Kind of the encoder queries are currently projected with, if resolved
    pub fn active_encoder(&self) -> Option<EncoderRecord> {
        self.active.get().map(|space| EncoderRecord::of(space.encoder.as_ref()))
    }

    /// Article passages with the given number, optionally limited to one source
    pub fn article_passages(&self, number: u32, focus: RegulationFocus) -> Vec<Arc<Passage>> {
        let filter: Option<SourceId> = focus.filter();
        self.passages
            .iter()
            .filter(|p| p.is_article(number))
            .filter(|p| filter.map_or(true, |source| p.source_id() == source))
            .cloned()
            .collect()
    }

    /// Max-normalized BM25 scores keyed by chunk ID
    pub fn sparse_scores(&self, query: &str) -> Result<HashMap<String, f32>> {
        self.sparse.normalized_scores(query)
    }

    /// Cosine similarity of the query to every passage, in passage order
    pub fn semantic_scores(&self, query: &str) -> Result<Vec<f32>> {
        if self.passages.is_empty() {
            return Ok(Vec::new());
        }

        let space = self.active()?;
        let query_vector = space.encoder.encode(query)?;
        if query_vector.len() != space.matrix.dim() {
            return Err(RagError::IncompatibleDimension {
                expected: space.matrix.dim(),
                actual: query_vector.len(),
            });
        }

        Ok((0..self.passages.len())
            .map(|i| cosine(&query_vector, space.matrix.row(i)))
            .collect())
    }

    fn active(&self) -> Result<&ActiveSpace> {
        self.active.get_or_try_init(|| self.resolve_space())
    }

    fn compatible(&self, encoder: &dyn Encoder) -> bool {
        encoder.kind() == self.encoder.kind && encoder.dim() == self.matrix.dim()
    }

    fn stored_space(&self, encoder: Arc<dyn Encoder>) -> ActiveSpace {
        ActiveSpace {
            encoder,
            matrix: Arc::clone(&self.matrix),
        }
    }

    fn resolve_space(&self) -> Result<ActiveSpace> {
        let stored_dim = self.matrix.dim();

        if let Some(semantic) = &self.semantic {
            if self.compatible(semantic.as_ref()) {
                return Ok(self.stored_space(Arc::clone(semantic)));
            }
            tracing::warn!(
                encoder = semantic.name(),
                encoder_dim = semantic.dim(),
                index_dim = stored_dim,
                "Preloaded semantic encoder does not match the index"
            );
        }

        if let Some(lexical) = &self.lexical {
            if self.compatible(lexical.as_ref()) {
                tracing::info!(dim = stored_dim, "Using persisted lexical encoder");
                return Ok(self.stored_space(Arc::clone(lexical) as Arc<dyn Encoder>));
            }
            tracing::warn!(
                encoder_dim = lexical.dim(),
                index_dim = stored_dim,
                "Persisted lexical encoder does not match the index"
            );
        }

        if let Some(loader) = &self.semantic_loader {
            match loader() {
                Ok(Some(semantic)) if self.compatible(semantic.as_ref()) => {
                    tracing::info!(encoder = semantic.name(), "Loaded semantic encoder on demand");
                    return Ok(self.stored_space(semantic));
                },
                Ok(Some(semantic)) => tracing::warn!(
                    encoder = semantic.name(),
                    encoder_dim = semantic.dim(),
                    index_dim = stored_dim,
                    "Loaded semantic encoder does not match the index"
                ),
                Ok(None) => tracing::warn!("No semantic encoder available"),
                Err(e) => tracing::warn!(error = %e, "Semantic encoder failed to load"),
            }
        }

        tracing::warn!(
            passages = self.passages.len(),
            "Refitting lexical encoder and re-embedding passages in memory"
        );
        self.refit_lexical()
            .map_err(|e| RagError::Unavailable(format!("no usable query encoder: {}", e)))
    }

    fn refit_lexical(&self) -> Result<ActiveSpace> {
        let enriched: Vec<String> = self.passages.iter().map(|p| p.enriched_text()).collect();
        let texts: Vec<&str> = enriched.iter().map(String::as_str).collect();

        let encoder = LexicalEncoder::fit(&texts, self.lexical_max_features)?;
        let rows = texts.iter().map(|t| encoder.transform(t)).collect();
        let matrix = EmbeddingMatrix::from_rows(rows, encoder.dim())?;

        Ok(ActiveSpace {
            encoder: Arc::new(encoder),
            matrix: Arc::new(matrix),
        })
    }
}

/// `<dir>.<suffix>` next to `dir`
fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .ok_or_else(|| RagError::Persistence(format!("invalid index path: {}", dir.display())))?;
    Ok(dir.with_file_name(format!("{}.{}", name.to_string_lossy(), suffix)))
}

fn swap_into_place(staging: &Path, target: &Path) -> Result<()> {
    let previous = sibling(target, "old")?;
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }
    if target.exists() {
        fs::rename(target, &previous)?;
    }
    if let Err(e) = fs::rename(staging, target) {
        if previous.exists() {
            if let Err(restore) = fs::rename(&previous, target) {
                tracing::error!(
                    target_dir = %target.display(),
                    previous = %previous.display(),
                    error = %restore,
                    "Failed to restore previous index; it remains at the backup path"
                );
            }
        }
        return Err(e.into());
    }
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regnav_core::{PassageKind, Structure};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn passages() -> Vec<Passage> {
        vec![
            Passage::new(
                SourceId::Gdpr,
                PassageKind::Article,
                "Article 33",
                Structure::default(),
                "The controller shall notify a personal data breach to the supervisory authority within 72 hours.",
                "gdpr_art_033_para_1",
            ),
            Passage::new(
                SourceId::Dora,
                PassageKind::Article,
                "Article 19",
                Structure::default(),
                "Financial entities shall report major ICT-related incidents to the competent authority.",
                "dora_art_019_para_1",
            ),
        ]
    }

    fn lexical_index() -> EmbeddingIndex {
        let passages = passages();
        let enriched: Vec<String> = passages.iter().map(|p| p.enriched_text()).collect();
        let texts: Vec<&str> = enriched.iter().map(String::as_str).collect();
        let encoder = LexicalEncoder::fit(&texts, 5000).unwrap();
        let rows = texts.iter().map(|t| encoder.transform(t)).collect();
        let matrix = EmbeddingMatrix::from_rows(rows, encoder.dim()).unwrap();
        let record = EncoderRecord::of(&encoder);
        EmbeddingIndex::from_parts(passages, matrix, record, Some(encoder)).unwrap()
    }

    /// Semantic stand-in with a fixed output
    struct FixedEncoder {
        dim: usize,
    }

    impl Encoder for FixedEncoder {
        fn kind(&self) -> EncoderKind {
            EncoderKind::Semantic
        }
        fn name(&self) -> &str {
            "fixed"
        }
        fn dim(&self) -> usize {
            self.dim
        }
        fn encode(&self, _text: &str) -> regnav_core::Result<Vec<f32>> {
            Ok(vec![1.0; self.dim])
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");

        let index = lexical_index();
        index.save(&target).unwrap();
        assert!(target.join(MANIFEST_FILE).exists());
        assert!(target.join(LEXICAL_FILE).exists());

        let loaded = EmbeddingIndex::load(&target).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.encoder_record(), index.encoder_record());
        assert_eq!(loaded.matrix.as_ref(), index.matrix.as_ref());
        assert_eq!(
            loaded.semantic_scores("data breach").unwrap(),
            index.semantic_scores("data breach").unwrap()
        );
        assert_eq!(loaded.active_encoder().unwrap().kind, EncoderKind::Lexical);
    }

    #[test]
    fn test_save_replaces_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        lexical_index().save(&target).unwrap();
        lexical_index().save(&target).unwrap();
        assert!(EmbeddingIndex::load(&target).is_ok());
        assert!(!dir.path().join("index.old").exists());
        assert!(!dir.path().join("index.tmp").exists());
    }

    #[test]
    fn test_missing_files_require_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EmbeddingIndex::load(dir.path()),
            Err(RagError::RebuildRequired(_))
        ));

        let target = dir.path().join("index");
        lexical_index().save(&target).unwrap();
        fs::remove_file(target.join(MATRIX_FILE)).unwrap();
        assert!(matches!(
            EmbeddingIndex::load(&target),
            Err(RagError::RebuildRequired(_))
        ));
    }

    #[test]
    fn test_failed_swap_restores_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        lexical_index().save(&target).unwrap();

        let missing_staging = dir.path().join("never-written");
        assert!(swap_into_place(&missing_staging, &target).is_err());
        assert!(EmbeddingIndex::load(&target).is_ok());
        assert!(!dir.path().join("index.old").exists());
    }

    #[test]
    fn test_duplicate_chunk_ids_require_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        lexical_index().save(&target).unwrap();

        let manifest_path = target.join(MANIFEST_FILE);
        let mut manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
        manifest["passages"][1]["chunk_id"] = manifest["passages"][0]["chunk_id"].clone();
        fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        match EmbeddingIndex::load(&target) {
            Err(RagError::RebuildRequired(msg)) => assert!(msg.contains("gdpr_art_033_para_1")),
            other => panic!("expected rebuild, got {:?}", other.map(|i| i.len())),
        }
    }

    #[test]
    fn test_load_fills_article_structure_from_registry() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        let index = lexical_index();
        assert!(index.passages()[0].structure().is_empty());
        index.save(&target).unwrap();

        let loaded = EmbeddingIndex::load(&target).unwrap();
        let article = &loaded.passages()[0];
        assert_eq!(article.chunk_id(), "gdpr_art_033_para_1");
        assert_eq!(article.structure().chapter_number, "IV");
        assert_eq!(article.structure().section_title, "Security of Personal Data");
        assert!(article.breadcrumb().contains("Chapter IV"));
        assert!(article.breadcrumb().contains("Article 33"));
    }

    #[test]
    fn test_row_mismatch_requires_rebuild() {
        let matrix = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0]], 2).unwrap();
        let record = EncoderRecord {
            kind: EncoderKind::Semantic,
            name: "fixed".to_string(),
            dim: 2,
        };
        assert!(matches!(
            EmbeddingIndex::from_parts(passages(), matrix, record, None),
            Err(RagError::RebuildRequired(_))
        ));
    }

    #[test]
    fn test_semantic_encoder_preferred_when_compatible() {
        let matrix = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 2).unwrap();
        let record = EncoderRecord {
            kind: EncoderKind::Semantic,
            name: "fixed".to_string(),
            dim: 2,
        };
        let index = EmbeddingIndex::from_parts(passages(), matrix, record, None)
            .unwrap()
            .with_semantic_encoder(Arc::new(FixedEncoder { dim: 2 }));

        let scores = index.semantic_scores("anything").unwrap();
        assert!((scores[0] - scores[1]).abs() < 1e-6);
        assert_eq!(index.active_encoder().unwrap().name, "fixed");
    }

    #[test]
    fn test_dimension_mismatch_falls_back_to_refit() {
        let matrix = EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 2).unwrap();
        let record = EncoderRecord {
            kind: EncoderKind::Semantic,
            name: "fixed".to_string(),
            dim: 2,
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader: SemanticLoader = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Arc::new(FixedEncoder { dim: 384 }) as Arc<dyn Encoder>))
        });

        let index = EmbeddingIndex::from_parts(passages(), matrix, record, None)
            .unwrap()
            .with_semantic_encoder(Arc::new(FixedEncoder { dim: 384 }))
            .with_semantic_loader(loader);

        let scores = index.semantic_scores("personal data breach").unwrap();
        assert!(scores[0] > scores[1]);
        assert_eq!(index.active_encoder().unwrap().kind, EncoderKind::Lexical);

        // Resolution happens once
        index.semantic_scores("ICT incident").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_index_scores_nothing() {
        let matrix = EmbeddingMatrix::from_rows(Vec::new(), 0).unwrap();
        let record = EncoderRecord {
            kind: EncoderKind::Lexical,
            name: "tfidf".to_string(),
            dim: 0,
        };
        let index = EmbeddingIndex::from_parts(Vec::new(), matrix, record, None).unwrap();
        assert!(index.semantic_scores("anything").unwrap().is_empty());
        assert!(index.active_encoder().is_none());
    }

    #[test]
    fn test_article_passages_respect_focus() {
        let index = lexical_index();
        assert_eq!(index.article_passages(33, RegulationFocus::All).len(), 1);
        assert!(index
            .article_passages(33, RegulationFocus::Source(SourceId::Dora))
            .is_empty());
    }
}
