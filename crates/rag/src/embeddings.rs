//! Semantic Text Embeddings
//!
//! Sentence-transformer encoder run through ONNX Runtime: tokenize, run the
//! model, mean-pool the last hidden state over the attention mask and
//! L2-normalize. Only compiled with the `onnx` feature; without it the
//! loader reports no semantic encoder and the index falls back to TF-IDF.

use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use parking_lot::Mutex;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use regnav_config::EncoderConfig;
use regnav_core::{Encoder, EncoderKind};

use crate::{RagError, Result};

/// Load the configured semantic encoder if it is enabled and available
///
/// Returns `Ok(None)` when semantic encoding is disabled, the model files
/// are missing, or the crate was built without ONNX support.
pub fn load_semantic_encoder(config: &EncoderConfig) -> Result<Option<Arc<dyn Encoder>>> {
    if !config.semantic_enabled {
        tracing::debug!("Semantic encoder disabled by configuration");
        return Ok(None);
    }

    let model = Path::new(&config.model_path);
    let tokenizer = Path::new(&config.tokenizer_path);
    if !model.exists() || !tokenizer.exists() {
        tracing::warn!(
            model = %model.display(),
            tokenizer = %tokenizer.display(),
            "Semantic model files not found"
        );
        return Ok(None);
    }

    load_onnx(model, tokenizer, config)
}

#[cfg(feature = "onnx")]
fn load_onnx(model: &Path, tokenizer: &Path, config: &EncoderConfig) -> Result<Option<Arc<dyn Encoder>>> {
    let encoder = OnnxEncoder::new(model, tokenizer, config.clone())?;
    tracing::info!(model = %config.model_name, dim = config.embedding_dim, "Loaded semantic encoder");
    Ok(Some(Arc::new(encoder)))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(_model: &Path, _tokenizer: &Path, _config: &EncoderConfig) -> Result<Option<Arc<dyn Encoder>>> {
    tracing::warn!("Built without ONNX support; semantic encoder unavailable");
    Ok(None)
}

/// Sentence embedder using an ONNX transformer model
pub struct OnnxEncoder {
    #[cfg(feature = "onnx")]
    session: Mutex<Session>,
    #[cfg(feature = "onnx")]
    tokenizer: Tokenizer,
    config: EncoderConfig,
}

impl OnnxEncoder {
    #[cfg(feature = "onnx")]
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        config: EncoderConfig,
    ) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| RagError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::Model(e.to_string()))?;

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| RagError::Model(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            config,
        })
    }

    #[cfg(not(feature = "onnx"))]
    pub fn new(
        _model_path: impl AsRef<Path>,
        _tokenizer_path: impl AsRef<Path>,
        _config: EncoderConfig,
    ) -> Result<Self> {
        Err(RagError::Model("built without ONNX support".to_string()))
    }

    /// Embed multiple texts in configured batch sizes
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            all_embeddings.extend(self.embed_batch_internal(chunk)?);
        }
        Ok(all_embeddings)
    }

    #[cfg(not(feature = "onnx"))]
    fn embed_batch_internal(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::Model("built without ONNX support".to_string()))
    }

    #[cfg(feature = "onnx")]
    fn embed_batch_internal(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let batch_size = texts.len();
        let max_seq_len = self.config.max_seq_len;

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let mut input_ids = vec![0i64; batch_size * max_seq_len];
        let mut attention_mask = vec![0i64; batch_size * max_seq_len];
        let mut token_type_ids = vec![0i64; batch_size * max_seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();

            let len = ids.len().min(max_seq_len);
            let offset = i * max_seq_len;

            for j in 0..len {
                input_ids[offset + j] = ids[j] as i64;
                attention_mask[offset + j] = mask[j] as i64;
                token_type_ids[offset + j] = types[j] as i64;
            }
        }

        let mask_rows = attention_mask.clone();

        let input_ids = Array2::from_shape_vec((batch_size, max_seq_len), input_ids)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        let attention_mask = Array2::from_shape_vec((batch_size, max_seq_len), attention_mask)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        let token_type_ids = Array2::from_shape_vec((batch_size, max_seq_len), token_type_ids)
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let input_ids_tensor =
            Tensor::from_array(input_ids).map_err(|e| RagError::Model(e.to_string()))?;
        let attention_mask_tensor =
            Tensor::from_array(attention_mask).map_err(|e| RagError::Model(e.to_string()))?;
        let token_type_ids_tensor =
            Tensor::from_array(token_type_ids).map_err(|e| RagError::Model(e.to_string()))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| RagError::Model(e.to_string()))?;

        let (shape, hidden_data) = outputs
            .get(&self.config.output_name)
            .ok_or_else(|| {
                RagError::Model(format!("Missing output tensor: {}", self.config.output_name))
            })?
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::Model(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        mean_pool(hidden_data, &dims, &mask_rows, max_seq_len, self.config.embedding_dim)
    }
}

/// Mask-aware mean pooling of a `[batch, seq_len, hidden]` tensor, then L2
///
/// `mask` is laid out as `[batch, max_seq_len]`. The hidden size must equal
/// `expected_dim`; vectors are never truncated or padded to fit.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn mean_pool(
    hidden_data: &[f32],
    dims: &[usize],
    mask: &[i64],
    max_seq_len: usize,
    expected_dim: usize,
) -> Result<Vec<Vec<f32>>> {
    let (tensor_batch, tensor_seq_len, hidden) = match dims {
        [b, s, h] => (*b, *s, *h),
        _ => return Err(RagError::Model(format!("Unexpected tensor shape: {:?}", dims))),
    };
    if hidden != expected_dim {
        return Err(RagError::IncompatibleDimension {
            expected: expected_dim,
            actual: hidden,
        });
    }
    let batch_size = mask.len() / max_seq_len.max(1);
    if tensor_batch != batch_size || hidden_data.len() < tensor_batch * tensor_seq_len * hidden {
        return Err(RagError::Model(format!(
            "Output tensor {:?} does not cover a batch of {}",
            dims, batch_size
        )));
    }

    let mut embeddings = Vec::with_capacity(batch_size);
    for i in 0..batch_size {
        let mut embedding = vec![0.0f32; hidden];
        let mut tokens = 0.0f32;

        for j in 0..max_seq_len.min(tensor_seq_len) {
            if mask[i * max_seq_len + j] == 0 {
                continue;
            }
            tokens += 1.0;
            let row = i * tensor_seq_len * hidden + j * hidden;
            for (value, h) in embedding.iter_mut().zip(&hidden_data[row..row + hidden]) {
                *value += h;
            }
        }

        if tokens > 0.0 {
            for v in &mut embedding {
                *v /= tokens;
            }
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embeddings.push(embedding);
    }

    Ok(embeddings)
}

impl Encoder for OnnxEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Semantic
    }

    fn name(&self) -> &str {
        &self.config.model_name
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn encode(&self, text: &str) -> regnav_core::Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text])?;
        embeddings
            .pop()
            .ok_or_else(|| regnav_core::Error::Encoder("model returned no embedding".to_string()))
    }

    fn encode_batch(&self, texts: &[&str]) -> regnav_core::Result<Vec<Vec<f32>>> {
        Ok(self.embed_batch(texts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_semantic_encoder() {
        let config = EncoderConfig {
            semantic_enabled: false,
            ..EncoderConfig::default()
        };
        assert!(load_semantic_encoder(&config).unwrap().is_none());
    }

    #[test]
    fn test_missing_model_files() {
        let config = EncoderConfig {
            semantic_enabled: true,
            model_path: "/nonexistent/model.onnx".to_string(),
            tokenizer_path: "/nonexistent/tokenizer.json".to_string(),
            ..EncoderConfig::default()
        };
        assert!(load_semantic_encoder(&config).unwrap().is_none());
    }

    #[test]
    fn test_mean_pool_masks_and_normalizes() {
        // batch 1, seq 3, hidden 2; the third token is padding
        let hidden = [1.0, 0.0, 3.0, 0.0, 100.0, 100.0];
        let mask = [1, 1, 0];
        let pooled = mean_pool(&hidden, &[1, 3, 2], &mask, 3, 2).unwrap();
        assert_eq!(pooled.len(), 1);
        assert!((pooled[0][0] - 1.0).abs() < 1e-6);
        assert_eq!(pooled[0][1], 0.0);
    }

    #[test]
    fn test_mean_pool_rejects_hidden_size_mismatch() {
        let hidden = vec![0.5f32; 2 * 4];
        let mask = [1, 1];
        let err = mean_pool(&hidden, &[1, 2, 4], &mask, 2, 3).unwrap_err();
        assert!(matches!(
            err,
            RagError::IncompatibleDimension {
                expected: 3,
                actual: 4
            }
        ));

        let hidden = vec![0.5f32; 2 * 2];
        assert!(matches!(
            mean_pool(&hidden, &[1, 2, 2], &mask, 2, 3),
            Err(RagError::IncompatibleDimension { .. })
        ));
    }

    #[test]
    fn test_mean_pool_rejects_short_batch() {
        let hidden = vec![0.5f32; 2 * 2];
        let mask = [1, 1, 1, 1];
        assert!(matches!(
            mean_pool(&hidden, &[1, 2, 2], &mask, 2, 2),
            Err(RagError::Model(_))
        ));
    }
}
