//! End-to-end retrieval over a small three-regulation corpus
//!
//! Build -> persist -> load -> plan -> retrieve -> gate -> verify, with the
//! TF-IDF encoder so the tests need no model files.

use std::path::Path;

use regnav_config::Settings;
use regnav_core::{QueryContext, QueryIntent, RegulationFocus, SourceId};
use regnav_rag::{
    verify_citations, ConfidenceGate, EmbeddingIndex, GateDecision, HybridRetriever, IndexBuilder,
    QueryPlanner, RegulationSearch, RetrieveOptions,
};
use std::sync::Arc;

const GDPR: &str = "\
REGULATION (EU) 2016/679 OF THE EUROPEAN PARLIAMENT AND OF THE COUNCIL

Whereas:

(1) The protection of natural persons in relation to the processing of personal data is a fundamental right under the Charter of Fundamental Rights of the European Union.

(2) The principles of, and rules on the protection of natural persons with regard to the processing of their personal data should respect their fundamental rights and freedoms.

HAVE ADOPTED THIS REGULATION:

CHAPTER III
Rights of the data subject

Article 22
Automated individual decision-making, including profiling

1. The data subject shall have the right not to be subject to a decision based solely on automated processing, including profiling, which produces legal effects concerning him or her or similarly significantly affects him or her.

2. Paragraph 1 shall not apply if the decision is necessary for entering into, or performance of, a contract between the data subject and a data controller.

CHAPTER IV
Controller and processor

Article 33
Notification of a personal data breach to the supervisory authority

1. In the case of a personal data breach, the controller shall without undue delay and, where feasible, not later than 72 hours after having become aware of it, notify the personal data breach to the supervisory authority.

Article 35
Data protection impact assessment

1. Where a type of processing in particular using new technologies is likely to result in a high risk to the rights and freedoms of natural persons, the controller shall carry out an assessment of the impact of the envisaged processing operations on the protection of personal data.
";

const AI_ACT: &str = "\
Article 6
Classification rules for high-risk AI systems

1. An AI system shall be considered to be high-risk where it is intended to be used as a safety component of a product covered by the Union harmonisation legislation listed in Annex I.

2. In addition to the high-risk AI systems referred to in paragraph 1, AI systems referred to in Annex III shall be considered to be high-risk.

3. By derogation from paragraph 2, an AI system referred to in Annex III shall not be considered to be high-risk where it does not pose a significant risk of harm to the health, safety or fundamental rights of natural persons.

Article 26
Obligations of deployers of high-risk AI systems

1. Deployers of high-risk AI systems shall take appropriate technical and organisational measures to ensure they use such systems in accordance with the instructions for use accompanying the systems.

ANNEX III
High-risk AI systems referred to in Article 6(2)

1. Biometrics, in so far as their use is permitted under relevant Union or national law:
(a) remote biometric identification systems, excluding AI systems intended to be used for biometric verification;
(b) AI systems intended to be used for biometric categorisation, according to sensitive or protected attributes or characteristics;
2. Critical infrastructure: AI systems intended to be used as safety components in the management and operation of critical digital infrastructure, road traffic, or in the supply of water, gas, heating or electricity.
";

const DORA: &str = "\
Article 6
ICT risk management framework

1. Financial entities shall have a sound, comprehensive and well-documented ICT risk management framework as part of their overall risk management system.

Article 28
General principles

1. Financial entities shall manage ICT third-party risk as an integral component of ICT risk within their ICT risk management framework.
";

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.encoder.semantic_enabled = false;
    settings
}

fn corpus() -> Vec<(SourceId, String)> {
    vec![
        (SourceId::EuAiAct, AI_ACT.to_string()),
        (SourceId::Gdpr, GDPR.to_string()),
        (SourceId::Dora, DORA.to_string()),
    ]
}

fn build_index() -> EmbeddingIndex {
    let (index, report) = IndexBuilder::from_settings(&settings())
        .build_from_texts(corpus())
        .unwrap();
    assert_eq!(report.sources_indexed.len(), 3);
    index
}

fn retriever(index: EmbeddingIndex) -> HybridRetriever {
    HybridRetriever::new(Arc::new(index), settings().retrieval)
}

fn write_sources(dir: &Path) {
    std::fs::write(dir.join("AI ACT.txt"), AI_ACT).unwrap();
    let gdpr_dir = dir.join("raw").join("gdpr");
    std::fs::create_dir_all(&gdpr_dir).unwrap();
    std::fs::write(gdpr_dir.join("GDPR.txt"), GDPR).unwrap();
    std::fs::write(dir.join("DORA.txt"), DORA).unwrap();
}

const BENCHMARK_QUERIES: &[&str] = &[
    "What does Article 22 GDPR say about automated decisions?",
    "When must a personal data breach be notified?",
    "Is remote biometric identification high-risk under the AI Act?",
    "How should financial entities manage ICT third-party risk?",
    "What are the obligations of deployers?",
];

#[test]
fn test_chunked_corpus_shape() {
    let index = build_index();
    let ids: Vec<&str> = index.passages().iter().map(|p| p.chunk_id()).collect();
    for expected in [
        "gdpr_recital_1",
        "gdpr_art_022_para_1",
        "gdpr_art_022_para_2",
        "eu_ai_act_art_006_para_3",
        "eu_ai_act_annex_iii_1a",
        "eu_ai_act_annex_iii_1b",
        "eu_ai_act_annex_iii_2",
        "dora_art_028_para_1",
    ] {
        assert!(ids.contains(&expected), "missing {}", expected);
    }
    assert!(index.passages().iter().all(|p| !p.breadcrumb().is_empty()));
}

#[test]
fn test_named_article_is_boosted_into_results() {
    let retriever = retriever(build_index());
    let target = "gdpr_art_035_para_1";

    let with_number = "What does Article 35 require for high risk processing?";
    let redacted = "What does Article require for high risk processing?";

    let results = retriever
        .retrieve(with_number, &RetrieveOptions::new(7))
        .unwrap();
    assert!(results.iter().any(|r| r.chunk_id() == target));

    let boosted = retriever.score(with_number, target).unwrap().unwrap();
    let plain = retriever.score(redacted, target).unwrap().unwrap();
    assert!((boosted.article - 0.40).abs() < 1e-6);
    assert_eq!(plain.article, 0.0);
    assert!(boosted.total() > plain.total());
}

#[test]
fn test_source_filter_is_respected() {
    let retriever = retriever(build_index());
    for query in BENCHMARK_QUERIES {
        for source in SourceId::ALL {
            let options = RetrieveOptions::new(10)
                .with_filter(Some(source))
                .with_min_score(0.0);
            let results = retriever.retrieve(query, &options).unwrap();
            assert!(
                results.iter().all(|r| r.passage.source_id() == source),
                "filter {} leaked for {:?}",
                source,
                query
            );
        }
    }
}

#[test]
fn test_article_22_scenario() {
    let retriever = retriever(build_index());
    let query = "What does Article 22 GDPR say about automated decisions?";

    let results = retriever.retrieve(query, &RetrieveOptions::new(5)).unwrap();
    let top = &results[0];
    assert!(top.passage.is_article(22));
    assert_eq!(top.passage.source_id(), SourceId::Gdpr);
    assert_eq!(top.passage.structure().chapter_title, "Rights of the Data Subject");
    assert!(top.url.ends_with("#article_22"));

    let filtered = retriever
        .retrieve(query, &RetrieveOptions::new(15).with_filter(Some(SourceId::Gdpr)))
        .unwrap();
    assert!(!filtered.is_empty());
    assert!(filtered.iter().all(|r| r.passage.source_id() == SourceId::Gdpr));
}

#[test]
fn test_no_regulation_or_article_boost_without_mentions() {
    let retriever = retriever(build_index());
    let scores = retriever
        .score_all("How should financial entities manage risks from outsourcing?")
        .unwrap();
    assert!(!scores.is_empty());
    for (passage, score) in scores {
        assert_eq!(score.regulation, 0.0, "regulation boost on {}", passage.chunk_id());
        assert_eq!(score.article, 0.0, "article boost on {}", passage.chunk_id());
    }
}

#[test]
fn test_expansion_terms_do_not_trigger_mention_boosts() {
    let settings = settings();
    let planner = QueryPlanner::from_settings(&settings.planner, &settings.retrieval).unwrap();
    let index = Arc::new(build_index());
    let boosted = HybridRetriever::new(Arc::clone(&index), settings.retrieval.clone());
    let mut without_mentions = settings.retrieval.clone();
    without_mentions.regulation_boost = 0.0;
    without_mentions.article_boost = 0.0;
    let unboosted = HybridRetriever::new(Arc::clone(&index), without_mentions);

    for question in [
        "Do I need a DPIA before deploying a credit scoring model?",
        "When does the high-risk regime start to apply?",
        "How do we handle ICT risk with cloud vendors?",
    ] {
        let plan = planner.plan(question, &QueryContext::default());
        assert_eq!(plan.regulation_focus, RegulationFocus::All, "{}", question);
        assert!(plan.article_numbers.is_empty(), "{}", question);
        // The expansion names a regulation and articles the question does not
        assert_ne!(plan.queries[0], question);
        assert!(plan.queries[0].contains("Article"), "{}", plan.queries[0]);

        for query in &plan.queries {
            for (passage, score) in boosted.score_all_with_mentions(query, &plan.question).unwrap() {
                assert_eq!(score.regulation, 0.0, "regulation boost on {}", passage.chunk_id());
                assert_eq!(score.article, 0.0, "article boost on {}", passage.chunk_id());
            }
        }

        let a = planner.retrieve_with_plan(&boosted, &plan).unwrap();
        let b = planner.retrieve_with_plan(&unboosted, &plan).unwrap();
        assert!(!a.passages.is_empty(), "{}", question);
        assert_eq!(a.passages.len(), b.passages.len(), "{}", question);
        for (x, y) in a.passages.iter().zip(&b.passages) {
            assert_eq!(x.chunk_id(), y.chunk_id(), "{}", question);
            assert_eq!(x.score.to_bits(), y.score.to_bits(), "{}", question);
        }
    }
}

#[test]
fn test_empty_corpus_returns_nothing() {
    let (index, _) = IndexBuilder::from_settings(&settings())
        .build_from_texts(Vec::new())
        .unwrap();
    let retriever = retriever(index);
    for query in BENCHMARK_QUERIES {
        assert!(retriever.retrieve(query, &RetrieveOptions::new(7)).unwrap().is_empty());
    }
}

#[test]
fn test_persisted_index_reproduces_rankings() {
    let sources = tempfile::tempdir().unwrap();
    write_sources(sources.path());
    let out = tempfile::tempdir().unwrap();
    let index_dir = out.path().join("index");

    let builder = IndexBuilder::from_settings(&settings());
    let (built, report) = builder.build(sources.path()).unwrap();
    assert_eq!(report.sources_skipped, Vec::<SourceId>::new());
    built.save(&index_dir).unwrap();

    let before = retriever(built);
    let after = retriever(EmbeddingIndex::load(&index_dir).unwrap());

    for query in BENCHMARK_QUERIES {
        let options = RetrieveOptions::new(7);
        let a = before.retrieve(query, &options).unwrap();
        let b = after.retrieve(query, &options).unwrap();
        assert_eq!(a.len(), b.len(), "{}", query);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.chunk_id(), y.chunk_id(), "{}", query);
            assert_eq!(x.score.to_bits(), y.score.to_bits(), "{}", query);
            assert_eq!(x.passage.breadcrumb(), y.passage.breadcrumb());
        }
    }
}

#[test]
fn test_missing_matrix_requires_rebuild() {
    let out = tempfile::tempdir().unwrap();
    let index_dir = out.path().join("index");
    build_index().save(&index_dir).unwrap();
    std::fs::remove_file(index_dir.join(regnav_rag::index::MATRIX_FILE)).unwrap();

    let err = EmbeddingIndex::load(&index_dir).err().unwrap();
    assert!(matches!(err, regnav_rag::RagError::RebuildRequired(_)));
}

#[test]
fn test_plan_and_multi_pass_retrieval() {
    let settings = settings();
    let planner = QueryPlanner::from_settings(&settings.planner, &settings.retrieval).unwrap();
    let retriever = retriever(build_index());

    let plan = planner.plan(
        "What does Article 22 GDPR say about automated decisions?",
        &QueryContext::default(),
    );
    assert_eq!(plan.intent, QueryIntent::ArticleClarification);
    assert_eq!(plan.regulation_focus, RegulationFocus::Source(SourceId::Gdpr));
    assert!(plan.article_numbers.contains(&22));

    let outcome = planner.retrieve_with_plan(&retriever, &plan).unwrap();
    assert!(outcome.passages[0].passage.is_article(22));
    assert!(outcome.passages.len() <= plan.top_k);
    let mut ids: Vec<&str> = outcome.passages.iter().map(|p| p.chunk_id()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), outcome.passages.len());
}

#[test]
fn test_thin_filtered_results_retry_unfiltered() {
    let settings = settings();
    let planner = QueryPlanner::from_settings(&settings.planner, &settings.retrieval).unwrap();
    let retriever = retriever(build_index());

    // Only two DORA passages exist, below the three-passage floor
    let plan = planner.plan(
        "What does DORA say about profiling of customers?",
        &QueryContext::default(),
    );
    assert_eq!(plan.regulation_focus, RegulationFocus::Source(SourceId::Dora));

    let outcome = planner.retrieve_with_plan(&retriever, &plan).unwrap();
    assert!(outcome.unfiltered_retry);
    assert!(outcome.passages.len() >= 3);
    assert!(outcome.passages.iter().any(|p| p.passage.source_id() != SourceId::Dora));
}

#[test]
fn test_gate_refuses_unrelated_question() {
    let retriever = retriever(build_index());
    let results = retriever
        .retrieve("zzxq qqvv wwkk", &RetrieveOptions::new(7))
        .unwrap();
    let decision = ConfidenceGate::default().evaluate(&results);
    assert!(decision.is_refusal());

    let strong = retriever
        .retrieve(
            "What does Article 22 GDPR say about automated decisions?",
            &RetrieveOptions::new(7),
        )
        .unwrap();
    assert!(matches!(
        ConfidenceGate::default().evaluate(&strong),
        GateDecision::Proceed { .. }
    ));
}

#[test]
fn test_unsupported_citation_warning() {
    let retriever = retriever(build_index());
    let retrieved = retriever
        .retrieve(
            "What does Article 22 GDPR say about automated decisions?",
            &RetrieveOptions::new(5).with_filter(Some(SourceId::Gdpr)),
        )
        .unwrap();

    let warnings = verify_citations(
        "Solely automated decisions are restricted [GDPR Art. 22], see also [GDPR Art. 99].",
        &retrieved,
    );
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("GDPR"));
    assert!(warnings[0].contains("99"));
}

#[tokio::test]
async fn test_service_lifecycle() {
    let sources = tempfile::tempdir().unwrap();
    write_sources(sources.path());
    let out = tempfile::tempdir().unwrap();
    let index_dir = out.path().join("index");

    let settings = settings();
    IndexBuilder::from_settings(&settings)
        .build_and_save(sources.path(), &index_dir)
        .unwrap();

    let service = RegulationSearch::new(&settings).unwrap();
    service.load(&index_dir).unwrap();

    let results = service
        .retrieve(
            "When must a personal data breach be notified?",
            RetrieveOptions::new(3).with_filter(Some(SourceId::Gdpr)),
        )
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.passage.source_id() == SourceId::Gdpr));

    let plan = service.plan("Do I need a DPIA under GDPR?", &QueryContext::default());
    let outcome = service.retrieve_with_plan(&plan).await.unwrap();
    assert!(outcome.passages.iter().any(|p| p.passage.is_article(35)));

    service.close();
    assert!(matches!(
        service.retrieve_with_plan(&plan).await,
        Err(regnav_rag::RagError::NotLoaded)
    ));
}
