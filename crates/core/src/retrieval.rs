//! Retrieval results and confidence tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::Passage;

/// Coarse bucket summarizing retrieval score strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Tier a score: `>= high` is high, `>= medium` is medium, anything else low
    ///
    /// Total over all floats; NaN falls through to low.
    pub fn from_score(score: f32, high: f32, medium: f32) -> Self {
        if score >= high {
            Self::High
        } else if score >= medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A passage paired with its post-boost score, tier and reference URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub passage: Arc<Passage>,
    /// Post-boost score; not bounded to [0, 1]
    pub score: f32,
    pub confidence: Confidence,
    pub url: String,
}

impl RetrievedPassage {
    pub fn chunk_id(&self) -> &str {
        self.passage.chunk_id()
    }
}
