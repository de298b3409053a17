//! Regulation search service
//!
//! Owns the loaded index and everything needed to answer a question over
//! it. The index is loaded explicitly and can be swapped or closed while
//! requests are in flight; each request keeps the `Arc` it started with.
//! Scoring is CPU-bound over the whole corpus, so every retrieval runs on
//! the blocking pool under the configured deadline.

use parking_lot::RwLock;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regnav_config::{EncoderConfig, RetrievalConfig, Settings};
use regnav_core::{
    AnswerGenerator, Confidence, GenerationRequest, QueryContext, QueryPlan, RetrievedPassage,
};

use crate::citation::CitationVerifier;
use crate::embeddings::load_semantic_encoder;
use crate::gate::{ConfidenceGate, GateDecision};
use crate::index::{EmbeddingIndex, SemanticLoader};
use crate::planner::{QueryPlanner, RetrievalOutcome};
use crate::prompt::{build_system_prompt, build_user_prompt, format_sources, SourceRef};
use crate::retriever::{HybridRetriever, RetrieveOptions};
use crate::{RagError, Result};

/// A generated answer with its evidence
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub passages: Vec<RetrievedPassage>,
    pub sources: Vec<SourceRef>,
    pub confidence: Confidence,
    /// Gate warnings, e.g. low confidence
    pub warnings: Vec<String>,
    /// Citations in the text with no retrieved passage behind them
    pub citation_warnings: Vec<String>,
}

/// Generation was withheld for lack of evidence
#[derive(Debug, Clone, Serialize)]
pub struct Refusal {
    pub guidance: String,
    pub passages: Vec<RetrievedPassage>,
    pub best_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnswerOutcome {
    Answered(Answer),
    Refused(Refusal),
}

pub struct RegulationSearch {
    retrieval: RetrievalConfig,
    encoder: EncoderConfig,
    planner: Arc<QueryPlanner>,
    gate: ConfidenceGate,
    verifier: CitationVerifier,
    timeout: Duration,
    loaded: RwLock<Option<Arc<HybridRetriever>>>,
}

impl RegulationSearch {
    pub fn new(settings: &Settings) -> Result<Self> {
        let planner = QueryPlanner::from_settings(&settings.planner, &settings.retrieval)?;
        Ok(Self {
            retrieval: settings.retrieval.clone(),
            encoder: settings.encoder.clone(),
            planner: Arc::new(planner),
            gate: ConfidenceGate::new(settings.gate.clone()),
            verifier: CitationVerifier::new(),
            timeout: Duration::from_millis(settings.index.timeout_ms),
            loaded: RwLock::new(None),
        })
    }

    /// Load a persisted index and make it current
    pub fn load(&self, dir: impl AsRef<Path>) -> Result<()> {
        let encoder = self.encoder.clone();
        let loader: SemanticLoader = Arc::new(move || {
            load_semantic_encoder(&encoder).map_err(regnav_core::Error::from)
        });
        let index = EmbeddingIndex::load(dir)?
            .with_semantic_loader(loader)
            .with_lexical_max_features(self.encoder.lexical_max_features);
        self.load_index(index);
        Ok(())
    }

    /// Make an in-memory index current, replacing any loaded one
    pub fn load_index(&self, index: EmbeddingIndex) {
        let passages = index.len();
        let retriever = HybridRetriever::new(Arc::new(index), self.retrieval.clone());
        let previous = self.loaded.write().replace(Arc::new(retriever));
        tracing::info!(passages, replaced = previous.is_some(), "Regulation index ready");
    }

    /// Drop the current index; later requests fail with `NotLoaded`
    pub fn close(&self) {
        if self.loaded.write().take().is_some() {
            tracing::info!("Regulation index closed");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.read().is_some()
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    fn retriever(&self) -> Result<Arc<HybridRetriever>> {
        self.loaded.read().clone().ok_or(RagError::NotLoaded)
    }

    /// Run scoring work on the blocking pool under the deadline
    async fn offload<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&HybridRetriever) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let retriever = self.retriever()?;
        let handle = tokio::task::spawn_blocking(move || work(&retriever));
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(RagError::Search(format!(
                "retrieval task failed: {}",
                join_error
            ))),
            Err(_elapsed) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Retrieval timed out");
                Err(RagError::Timeout(self.timeout))
            },
        }
    }

    /// Single-pass hybrid retrieval
    pub async fn retrieve(
        &self,
        query: &str,
        options: RetrieveOptions,
    ) -> Result<Vec<RetrievedPassage>> {
        let query = query.to_string();
        self.offload(move |retriever| retriever.retrieve(&query, &options))
            .await
    }

    pub fn plan(&self, question: &str, context: &QueryContext) -> QueryPlan {
        self.planner.plan(question, context)
    }

    /// Multi-pass retrieval with unfiltered retry and structural fallback
    pub async fn retrieve_with_plan(&self, plan: &QueryPlan) -> Result<RetrievalOutcome> {
        let planner = Arc::clone(&self.planner);
        let plan = plan.clone();
        self.offload(move |retriever| planner.retrieve_with_plan(retriever, &plan))
            .await
    }

    pub fn evaluate(&self, passages: &[RetrievedPassage]) -> GateDecision {
        self.gate.evaluate(passages)
    }

    pub fn verify_citations(&self, generated: &str, retrieved: &[RetrievedPassage]) -> Vec<String> {
        self.verifier.verify(generated, retrieved)
    }

    /// Plan, retrieve, gate, generate and verify
    pub async fn answer(
        &self,
        question: &str,
        context: &QueryContext,
        generator: &dyn AnswerGenerator,
    ) -> Result<AnswerOutcome> {
        let plan = self.plan(question, context);
        let outcome = self.retrieve_with_plan(&plan).await?;
        let passages = outcome.passages;

        let (confidence, warnings) = match self.gate.evaluate(&passages) {
            GateDecision::Refuse {
                guidance,
                best_score,
            } => {
                return Ok(AnswerOutcome::Refused(Refusal {
                    guidance,
                    passages,
                    best_score,
                }))
            },
            GateDecision::Proceed {
                confidence,
                warnings,
            } => (confidence, warnings),
        };

        let request = GenerationRequest {
            system_prompt: build_system_prompt(context, &passages),
            user_prompt: build_user_prompt(question, context),
            history: context.history.clone(),
        };
        let text = generator.generate(request).await?;

        let citation_warnings = self.verifier.verify(&text, &passages);

        Ok(AnswerOutcome::Answered(Answer {
            text,
            sources: format_sources(&passages),
            passages,
            confidence,
            warnings,
            citation_warnings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use regnav_core::SourceId;

    const GDPR_TEXT: &str = "\
Article 22
Automated individual decision-making, including profiling

1. The data subject shall have the right not to be subject to a decision based solely on automated processing, including profiling, which produces legal effects concerning him or her or similarly significantly affects him or her.

Article 35
Data protection impact assessment

1. Where a type of processing is likely to result in a high risk to the rights and freedoms of natural persons, the controller shall carry out an assessment of the impact of the envisaged processing operations on the protection of personal data.
";

    struct CannedGenerator {
        reply: String,
        seen: Mutex<Option<GenerationRequest>>,
    }

    #[async_trait]
    impl AnswerGenerator for CannedGenerator {
        async fn generate(&self, request: GenerationRequest) -> regnav_core::Result<String> {
            *self.seen.lock() = Some(request);
            Ok(self.reply.clone())
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.encoder.semantic_enabled = false;
        settings
    }

    fn service() -> RegulationSearch {
        let settings = settings();
        let (index, _) = IndexBuilder::from_settings(&settings)
            .build_from_texts(vec![(SourceId::Gdpr, GDPR_TEXT.to_string())])
            .unwrap();
        let service = RegulationSearch::new(&settings).unwrap();
        service.load_index(index);
        service
    }

    #[tokio::test]
    async fn test_not_loaded() {
        let service = RegulationSearch::new(&settings()).unwrap();
        assert!(!service.is_loaded());
        let err = service
            .retrieve("automated decisions", RetrieveOptions::new(3))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NotLoaded));
    }

    #[tokio::test]
    async fn test_close_unloads() {
        let service = service();
        assert!(service.is_loaded());
        service.close();
        assert!(!service.is_loaded());
    }

    #[tokio::test]
    async fn test_answer_with_citation_check() {
        let service = service();
        let generator = CannedGenerator {
            reply: "Solely automated decisions are restricted [GDPR Art. 22]. See also [GDPR Art. 99]."
                .to_string(),
            seen: Mutex::new(None),
        };

        let outcome = service
            .answer(
                "What does Article 22 GDPR say about automated decisions?",
                &QueryContext::default(),
                &generator,
            )
            .await
            .unwrap();

        let answer = match outcome {
            AnswerOutcome::Answered(answer) => answer,
            AnswerOutcome::Refused(r) => panic!("unexpected refusal: {}", r.guidance),
        };
        assert!(answer.passages[0].passage.is_article(22));
        assert_eq!(answer.citation_warnings.len(), 1);
        assert!(answer.citation_warnings[0].contains("GDPR Article 99"));
        assert!(!answer.sources.is_empty());

        let request = generator.seen.lock().clone().unwrap();
        assert!(request.system_prompt.contains("### SOURCE 1:"));
        assert!(request.user_prompt.contains("Article 22 GDPR"));
    }
}
