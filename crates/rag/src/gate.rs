//! Confidence Gate
//!
//! Decides whether retrieved evidence is strong enough to hand to the
//! answer generator. Overall confidence is high with at least two
//! high-tier passages, medium with at least one medium-or-high passage,
//! and low otherwise. Low confidence where every passage also scores below
//! the suppression threshold refuses generation outright.

use regnav_config::GateConfig;
use regnav_core::{Confidence, RetrievedPassage};

/// Guidance returned instead of an answer when evidence is too weak
pub const NARROWING_GUIDANCE: &str = "The indexed regulatory texts do not contain passages that \
clearly support an answer to this question. Please narrow it down: name the regulation you mean \
(EU AI Act, GDPR or DORA), refer to a specific article such as \"Article 6 EU AI Act\", or name \
the legal concept you are asking about, for example \"data protection impact assessment\".";

pub const LOW_CONFIDENCE_WARNING: &str = "Low retrieval confidence: the question may be beyond \
the scope of the retrieved regulatory texts. The answer may include interpretation.";

/// Outcome of gating one retrieval result
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Evidence is usable; warnings go along with the answer
    Proceed {
        confidence: Confidence,
        warnings: Vec<String>,
    },
    /// Evidence is too weak to generate from
    Refuse {
        guidance: String,
        best_score: Option<f32>,
    },
}

impl GateDecision {
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Refuse { .. })
    }
}

/// Aggregate tier over a merged result list
pub fn overall_confidence(passages: &[RetrievedPassage]) -> Confidence {
    let high = passages
        .iter()
        .filter(|p| p.confidence == Confidence::High)
        .count();
    if high >= 2 {
        Confidence::High
    } else if passages.iter().any(|p| p.confidence >= Confidence::Medium) {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

pub struct ConfidenceGate {
    config: GateConfig,
}

impl ConfidenceGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, passages: &[RetrievedPassage]) -> GateDecision {
        let confidence = overall_confidence(passages);
        let best_score = passages.iter().map(|p| p.score).reduce(f32::max);

        let all_below_threshold = passages
            .iter()
            .all(|p| p.score < self.config.suppression_threshold);

        if confidence == Confidence::Low && all_below_threshold {
            tracing::info!(
                passages = passages.len(),
                best_score = ?best_score,
                threshold = self.config.suppression_threshold,
                "Generation suppressed: evidence below threshold"
            );
            return GateDecision::Refuse {
                guidance: NARROWING_GUIDANCE.to_string(),
                best_score,
            };
        }

        let mut warnings = Vec::new();
        if confidence == Confidence::Low {
            warnings.push(LOW_CONFIDENCE_WARNING.to_string());
        }

        GateDecision::Proceed {
            confidence,
            warnings,
        }
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
