//! Query Planner
//!
//! Turns a free-form question into a [`QueryPlan`] and executes it as a
//! series of retrieval passes:
//!
//! 1. the expanded question, plus one `Article N` query per named article,
//!    filtered to the inferred regulation focus
//! 2. if fewer than `min_distinct_passages` came back under a filter, the
//!    same queries again without the filter
//! 3. if still thin and the question named articles, a direct structural
//!    lookup of those articles at a fixed conservative score
//!
//! Passes are merged by chunk ID, keeping each passage's best score.
//! Regulation and article boosts follow the question as asked, never the
//! expansion terms appended to it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regnav_config::{PlannerConfig, RetrievalConfig};
use regnav_core::{Passage, QueryContext, QueryIntent, QueryPlan, RegulationFocus, RetrievedPassage};

use crate::query_expansion::{role_terms, QueryExpander};
use crate::retriever::{mentioned_articles, mentioned_regulations, HybridRetriever, RetrieveOptions};
use crate::Result;

static COMPARE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:compare|compared|comparison|comparing|difference|differences|differ|versus|vs|both)\b")
        .expect("compare regex is valid")
});

static OBLIGATION_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:must|shall|required|require|requirement|requirements|obligation|obligations|obliged|need to|have to|comply|compliance)\b",
    )
    .expect("obligation regex is valid")
});

static CONCEPT_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:what is|what are|define|definition|meaning|mean|explain|concept)\b")
        .expect("concept regex is valid")
});

/// Classify a question into one of the five intents
///
/// Comparison outranks article lookups, which outrank obligation and
/// concept questions.
pub fn infer_intent(question: &str) -> QueryIntent {
    let lowered = question.to_lowercase();

    if COMPARE_WORDS.is_match(&lowered) || mentioned_regulations(&lowered).len() >= 2 {
        QueryIntent::CrossRegulationCompare
    } else if !mentioned_articles(&lowered).is_empty() {
        QueryIntent::ArticleClarification
    } else if OBLIGATION_WORDS.is_match(&lowered) {
        QueryIntent::ObligationFinder
    } else if CONCEPT_WORDS.is_match(&lowered) {
        QueryIntent::ConceptExplainer
    } else {
        QueryIntent::General
    }
}

/// Regulation to restrict retrieval to
///
/// A single named regulation becomes the focus. Comparisons and questions
/// naming several regulations search everything. A question naming none
/// falls back to the regulation selected in the request context.
pub fn infer_focus(question: &str, intent: QueryIntent, context: &QueryContext) -> RegulationFocus {
    if intent == QueryIntent::CrossRegulationCompare {
        return RegulationFocus::All;
    }
    match mentioned_regulations(question).as_slice() {
        [single] => RegulationFocus::Source(*single),
        [] => context.regulation.map_or(RegulationFocus::All, RegulationFocus::Source),
        _ => RegulationFocus::All,
    }
}

/// Plan execution result
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub plan: QueryPlan,
    /// Merged passages, best first
    pub passages: Vec<RetrievedPassage>,
    /// The filtered passes were too thin and were repeated without a filter
    pub unfiltered_retry: bool,
    /// Named articles were added by direct lookup
    pub structural_fallback: bool,
}

/// Builds and executes retrieval plans
pub struct QueryPlanner {
    expander: QueryExpander,
    config: PlannerConfig,
    default_top_k: usize,
    default_min_score: f32,
}

impl QueryPlanner {
    pub fn new(expander: QueryExpander, config: PlannerConfig, retrieval: &RetrievalConfig) -> Self {
        Self {
            expander,
            config,
            default_top_k: retrieval.default_top_k,
            default_min_score: retrieval.default_min_score,
        }
    }

    /// Planner with expansion rules from the configured YAML file, if any
    pub fn from_settings(config: &PlannerConfig, retrieval: &RetrievalConfig) -> Result<Self> {
        let expander = match &config.expansion_rules_path {
            Some(path) => QueryExpander::from_yaml_file(path)?,
            None => QueryExpander::with_defaults(),
        };
        Ok(Self::new(expander, config.clone(), retrieval))
    }

    pub fn expander(&self) -> &QueryExpander {
        &self.expander
    }

    /// Derive the plan for one question
    pub fn plan(&self, question: &str, context: &QueryContext) -> QueryPlan {
        let intent = infer_intent(question);
        let regulation_focus = infer_focus(question, intent, context);
        let article_numbers = mentioned_articles(question);

        let mut expanded = self.expander.expand(question);
        if intent == QueryIntent::ObligationFinder {
            if let Some(terms) = context.role.as_deref().and_then(role_terms) {
                expanded.push(' ');
                expanded.push_str(terms);
            }
        }

        let mut queries = vec![expanded];
        for number in &article_numbers {
            queries.push(match regulation_focus {
                RegulationFocus::Source(source) => format!("Article {} {}", number, source.name()),
                RegulationFocus::All => format!("Article {}", number),
            });
        }
        let mut seen = HashSet::new();
        queries.retain(|q| seen.insert(q.clone()));

        let plan = QueryPlan {
            question: question.to_string(),
            intent,
            regulation_focus,
            article_numbers,
            queries,
            top_k: self.default_top_k,
            min_score: self.default_min_score,
        };

        tracing::debug!(
            intent = %plan.intent,
            focus = ?plan.regulation_focus,
            articles = ?plan.article_numbers,
            queries = plan.queries.len(),
            "Query planned"
        );

        plan
    }

    /// Execute a plan with unfiltered retry and structural fallback
    pub fn retrieve_with_plan(
        &self,
        retriever: &HybridRetriever,
        plan: &QueryPlan,
    ) -> Result<RetrievalOutcome> {
        let filter = plan.regulation_focus.filter();
        let mut merged: HashMap<String, (Arc<Passage>, f32)> = HashMap::new();

        let options = RetrieveOptions::new(plan.top_k)
            .with_filter(filter)
            .with_min_score(plan.min_score)
            .with_mentions(plan.question.as_str());
        self.run_passes(retriever, plan, &options, &mut merged)?;

        let mut unfiltered_retry = false;
        if merged.len() < self.config.min_distinct_passages && filter.is_some() {
            tracing::info!(
                found = merged.len(),
                filter = ?filter,
                "Too few passages under regulation filter, retrying unfiltered"
            );
            let options = options.clone().with_filter(None);
            self.run_passes(retriever, plan, &options, &mut merged)?;
            unfiltered_retry = true;
        }

        let mut structural_fallback = false;
        if merged.len() < self.config.min_distinct_passages && !plan.article_numbers.is_empty() {
            let score = self.config.structural_fallback_score;
            for &number in &plan.article_numbers {
                for passage in retriever.index().article_passages(number, plan.regulation_focus) {
                    let entry = merged
                        .entry(passage.chunk_id().to_string())
                        .or_insert_with(|| (Arc::clone(&passage), score));
                    entry.1 = entry.1.max(score);
                    structural_fallback = true;
                }
            }
            if structural_fallback {
                tracing::info!(
                    articles = ?plan.article_numbers,
                    found = merged.len(),
                    "Added named articles by structural lookup"
                );
            }
        }

        let mut ranked: Vec<(Arc<Passage>, f32)> = merged.into_values().collect();
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.chunk_id().cmp(b.0.chunk_id()))
        });
        ranked.truncate(plan.top_k);

        Ok(RetrievalOutcome {
            plan: plan.clone(),
            passages: ranked
                .into_iter()
                .map(|(passage, score)| retriever.retrieved(passage, score))
                .collect(),
            unfiltered_retry,
            structural_fallback,
        })
    }

    fn run_passes(
        &self,
        retriever: &HybridRetriever,
        plan: &QueryPlan,
        options: &RetrieveOptions,
        merged: &mut HashMap<String, (Arc<Passage>, f32)>,
    ) -> Result<()> {
        for query in &plan.queries {
            for hit in retriever.retrieve(query, options)? {
                let entry = merged
                    .entry(hit.chunk_id().to_string())
                    .or_insert_with(|| (Arc::clone(&hit.passage), hit.score));
                entry.1 = entry.1.max(hit.score);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{EmbeddingIndex, EmbeddingMatrix, EncoderRecord};
    use crate::lexical::LexicalEncoder;
    use regnav_core::{Encoder, PassageKind, SourceId, Structure};

    fn planner() -> QueryPlanner {
        QueryPlanner::new(
            QueryExpander::with_defaults(),
            PlannerConfig::default(),
            &RetrievalConfig::default(),
        )
    }

    fn retriever(passages: Vec<Passage>) -> HybridRetriever {
        let enriched: Vec<String> = passages.iter().map(|p| p.enriched_text()).collect();
        let texts: Vec<&str> = enriched.iter().map(String::as_str).collect();
        let encoder = LexicalEncoder::fit(&texts, 5000).unwrap();
        let rows = texts.iter().map(|t| encoder.transform(t)).collect();
        let matrix = EmbeddingMatrix::from_rows(rows, encoder.dim()).unwrap();
        let record = EncoderRecord::of(&encoder);
        let index = EmbeddingIndex::from_parts(passages, matrix, record, Some(encoder)).unwrap();
        HybridRetriever::new(Arc::new(index), RetrievalConfig::default())
    }

    fn article(source: SourceId, number: u32, text: &str) -> Passage {
        Passage::new(
            source,
            PassageKind::Article,
            format!("Article {}", number),
            Structure::default(),
            text,
            format!("{}_art_{:03}_para_1", source.key(), number),
        )
    }

    #[test]
    fn test_intent_inference() {
        assert_eq!(infer_intent("Compare GDPR and DORA incident reporting"), QueryIntent::CrossRegulationCompare);
        assert_eq!(infer_intent("How do the AI Act and GDPR interact?"), QueryIntent::CrossRegulationCompare);
        assert_eq!(infer_intent("What does Article 22 say?"), QueryIntent::ArticleClarification);
        assert_eq!(infer_intent("What must a deployer do?"), QueryIntent::ObligationFinder);
        assert_eq!(infer_intent("What is a provider?"), QueryIntent::ConceptExplainer);
        assert_eq!(infer_intent("Tell me about sandboxes"), QueryIntent::General);
    }

    #[test]
    fn test_focus_inference() {
        let ctx = QueryContext::default();
        let intent = QueryIntent::General;
        assert_eq!(infer_focus("GDPR consent", intent, &ctx), RegulationFocus::Source(SourceId::Gdpr));
        assert_eq!(infer_focus("consent", intent, &ctx), RegulationFocus::All);
        assert_eq!(
            infer_focus("GDPR vs DORA", QueryIntent::CrossRegulationCompare, &ctx),
            RegulationFocus::All
        );

        let ctx = QueryContext {
            regulation: Some(SourceId::Dora),
            ..QueryContext::default()
        };
        assert_eq!(infer_focus("incident reporting", intent, &ctx), RegulationFocus::Source(SourceId::Dora));
        assert_eq!(infer_focus("GDPR consent", intent, &ctx), RegulationFocus::Source(SourceId::Gdpr));
    }

    #[test]
    fn test_plan_queries() {
        let plan = planner().plan("What does Article 22 GDPR say about automated decisions?", &QueryContext::default());
        assert_eq!(plan.intent, QueryIntent::ArticleClarification);
        assert_eq!(plan.regulation_focus, RegulationFocus::Source(SourceId::Gdpr));
        assert_eq!(plan.article_numbers.iter().copied().collect::<Vec<_>>(), vec![22]);
        assert_eq!(plan.queries.len(), 2);
        assert!(plan.queries[0].contains("automated individual decisions"));
        assert_eq!(plan.queries[1], "Article 22 GDPR");
        assert_eq!(plan.top_k, 7);
    }

    #[test]
    fn test_role_terms_added_to_obligation_queries() {
        let ctx = QueryContext {
            role: Some("deployer".to_string()),
            ..QueryContext::default()
        };
        let plan = planner().plan("What must we do before using a credit scoring system?", &ctx);
        assert_eq!(plan.intent, QueryIntent::ObligationFinder);
        assert!(plan.queries[0].contains("Article 26"));

        let plan = planner().plan("What is a credit scoring system?", &ctx);
        assert!(!plan.queries[0].contains("Article 26"));
    }

    #[test]
    fn test_unfiltered_retry_when_thin() {
        let r = retriever(vec![
            article(SourceId::Gdpr, 33, "The controller shall notify a personal data breach to the supervisory authority."),
            article(SourceId::Dora, 19, "Financial entities shall report major ICT-related incidents and data breach events."),
            article(SourceId::Dora, 17, "Financial entities shall define an ICT-related incident management process for data breach handling."),
        ]);
        let planner = planner();
        let plan = planner.plan("GDPR data breach notification", &QueryContext::default());
        let outcome = planner.retrieve_with_plan(&r, &plan).unwrap();

        assert!(outcome.unfiltered_retry);
        assert!(outcome.passages.len() > 1);
        assert_eq!(outcome.passages[0].chunk_id(), "gdpr_art_033_para_1");
        let ids: HashSet<&str> = outcome.passages.iter().map(|p| p.chunk_id()).collect();
        assert_eq!(ids.len(), outcome.passages.len());
    }

    #[test]
    fn test_structural_fallback_surfaces_named_article() {
        let r = retriever(vec![
            article(SourceId::Gdpr, 99, "This Regulation shall enter into force on the twentieth day following publication."),
            article(SourceId::Gdpr, 1, "This Regulation lays down rules relating to the protection of natural persons."),
        ]);
        let planner = planner();
        let mut plan = planner.plan("zzz article 99 qqq", &QueryContext::default());
        plan.min_score = 10.0;
        let outcome = planner.retrieve_with_plan(&r, &plan).unwrap();

        assert!(outcome.structural_fallback);
        assert_eq!(outcome.passages.len(), 1);
        assert_eq!(outcome.passages[0].chunk_id(), "gdpr_art_099_para_1");
        assert_eq!(outcome.passages[0].score, 0.30);
    }
}
