//! Seams to pluggable collaborators
//!
//! Encoders, text extraction and answer generation are provided from outside
//! the retrieval engine so tests can substitute small in-memory doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ChatMessage, Result};

/// Which family of encoder produced a vector space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    Semantic,
    Lexical,
}

/// Maps text to a fixed-dimension vector
pub trait Encoder: Send + Sync {
    fn kind(&self) -> EncoderKind;

    /// Model identifier recorded in the index manifest
    fn name(&self) -> &str;

    /// Output dimensionality
    fn dim(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Turns a source document into plain text
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, path: &Path) -> Result<String>;
}

/// Input to the external generation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// External language-model call producing prose from a prepared prompt
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}
