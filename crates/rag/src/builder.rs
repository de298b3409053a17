//! Offline index build
//!
//! Discover sources, extract text, chunk, embed, persist. A source that
//! cannot be found or extracted is skipped with a warning; the build only
//! fails on embedding or persistence errors. Passages are embedded from
//! their enriched text so structural headings contribute to similarity.

use std::path::Path;
use std::sync::Arc;

use regnav_config::{ChunkingConfig, EncoderConfig, Settings};
use regnav_core::{Encoder, Passage, SourceId, TextExtractor};

use crate::chunker::DocumentChunker;
use crate::embeddings::load_semantic_encoder;
use crate::extraction::{discover_sources, extract_source, PdfToTextExtractor, PlainTextExtractor};
use crate::index::{EmbeddingIndex, EmbeddingMatrix, EncoderRecord};
use crate::lexical::LexicalEncoder;
use crate::Result;

/// Outcome summary of one build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub sources_indexed: Vec<SourceId>,
    pub sources_skipped: Vec<SourceId>,
    pub passages: usize,
    pub encoder: EncoderRecord,
}

pub struct IndexBuilder {
    chunker: DocumentChunker,
    encoder_config: EncoderConfig,
    semantic: Option<Arc<dyn Encoder>>,
    pdf: Box<dyn TextExtractor>,
    plain: Box<dyn TextExtractor>,
}

impl IndexBuilder {
    pub fn new(chunking: ChunkingConfig, encoder: EncoderConfig) -> Self {
        Self {
            chunker: DocumentChunker::new(chunking),
            encoder_config: encoder,
            semantic: None,
            pdf: Box::new(PdfToTextExtractor::new()),
            plain: Box::new(PlainTextExtractor),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.chunking.clone(), settings.encoder.clone())
    }

    /// Embed with this encoder instead of loading the configured model
    pub fn with_semantic_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.semantic = Some(encoder);
        self
    }

    pub fn with_pdf_extractor(mut self, extractor: Box<dyn TextExtractor>) -> Self {
        self.pdf = extractor;
        self
    }

    /// Build from the documents found under `sources_dir`
    pub fn build(&self, sources_dir: impl AsRef<Path>) -> Result<(EmbeddingIndex, BuildReport)> {
        let sources_dir = sources_dir.as_ref();
        tracing::info!(dir = %sources_dir.display(), "Building regulation index");

        let mut texts = Vec::new();
        for doc in discover_sources(sources_dir) {
            match extract_source(&doc, self.pdf.as_ref(), self.plain.as_ref()) {
                Ok(text) => texts.push((doc.source, text)),
                Err(e) => tracing::warn!(
                    source = %doc.source,
                    path = %doc.path.display(),
                    error = %e,
                    "Text extraction failed, skipping source"
                ),
            }
        }

        self.build_from_texts(texts)
    }

    /// Build from already-extracted text per regulation
    pub fn build_from_texts(
        &self,
        texts: Vec<(SourceId, String)>,
    ) -> Result<(EmbeddingIndex, BuildReport)> {
        let mut passages: Vec<Passage> = Vec::new();
        let mut sources_indexed = Vec::new();

        for (source, text) in texts {
            let chunks = self.chunker.chunk(&text, source);
            if chunks.is_empty() {
                tracing::warn!(source = %source, "No passages extracted, skipping source");
                continue;
            }
            tracing::info!(source = %source, passages = chunks.len(), "Chunked source");
            sources_indexed.push(source);
            passages.extend(chunks);
        }

        let sources_skipped = SourceId::ALL
            .into_iter()
            .filter(|s| !sources_indexed.contains(s))
            .collect();

        let (matrix, record, lexical) = self.embed(&passages)?;
        let mut index = EmbeddingIndex::from_parts(passages, matrix, record.clone(), lexical)?
            .with_lexical_max_features(self.encoder_config.lexical_max_features);
        if let Some(semantic) = &self.semantic {
            index = index.with_semantic_encoder(Arc::clone(semantic));
        }

        let report = BuildReport {
            sources_indexed,
            sources_skipped,
            passages: index.len(),
            encoder: record,
        };
        tracing::info!(
            passages = report.passages,
            encoder = %report.encoder.name,
            dim = report.encoder.dim,
            "Index built"
        );
        Ok((index, report))
    }

    /// Build and persist, replacing any index already at `index_dir`
    pub fn build_and_save(
        &self,
        sources_dir: impl AsRef<Path>,
        index_dir: impl AsRef<Path>,
    ) -> Result<BuildReport> {
        let (index, report) = self.build(sources_dir)?;
        index.save(index_dir)?;
        Ok(report)
    }

    fn embed(
        &self,
        passages: &[Passage],
    ) -> Result<(EmbeddingMatrix, EncoderRecord, Option<LexicalEncoder>)> {
        let enriched: Vec<String> = passages.iter().map(|p| p.enriched_text()).collect();
        let texts: Vec<&str> = enriched.iter().map(String::as_str).collect();

        if texts.is_empty() {
            tracing::warn!("No passages to embed; writing an empty index");
            let record = EncoderRecord {
                kind: regnav_core::EncoderKind::Lexical,
                name: "tfidf".to_string(),
                dim: 0,
            };
            return Ok((EmbeddingMatrix::from_rows(Vec::new(), 0)?, record, None));
        }

        let semantic = match &self.semantic {
            Some(encoder) => Some(Arc::clone(encoder)),
            None => load_semantic_encoder(&self.encoder_config)?,
        };

        if let Some(encoder) = semantic {
            match self.embed_semantic(encoder.as_ref(), &texts) {
                Ok(rows) => {
                    let matrix = EmbeddingMatrix::from_rows(rows, encoder.dim())?;
                    return Ok((matrix, EncoderRecord::of(encoder.as_ref()), None));
                },
                Err(e) => tracing::warn!(
                    encoder = encoder.name(),
                    error = %e,
                    "Semantic embedding failed, falling back to TF-IDF"
                ),
            }
        } else {
            tracing::warn!("No semantic encoder available, embedding with TF-IDF");
        }

        let lexical = LexicalEncoder::fit(&texts, self.encoder_config.lexical_max_features)?;
        let rows = texts.iter().map(|t| lexical.transform(t)).collect();
        let matrix = EmbeddingMatrix::from_rows(rows, lexical.dim())?;
        let record = EncoderRecord::of(&lexical);
        Ok((matrix, record, Some(lexical)))
    }

    fn embed_semantic(&self, encoder: &dyn Encoder, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.encoder_config.batch_size.max(1);
        let mut rows = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(batch_size).enumerate() {
            rows.extend(encoder.encode_batch(batch)?);
            tracing::debug!(batch = i, embedded = rows.len(), total = texts.len(), "Embedded batch");
        }
        Ok(rows)
    }
}
