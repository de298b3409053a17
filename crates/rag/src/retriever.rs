//! Hybrid Retriever
//!
//! Scores every passage for a query as a weighted fusion of embedding
//! cosine similarity and max-normalized BM25, then adds structural boosts:
//!
//! | signal | boost |
//! |---|---|
//! | query names the passage's regulation | `regulation_boost` |
//! | query names the passage's exact article number | `article_boost` |
//! | per content word shared with the chapter title | `chapter_word_boost` |
//! | per content word shared with the section title | `section_word_boost` |
//!
//! Boosts are additive and the final score is not clamped. Regulation and
//! article mentions are read from `RetrieveOptions::mentions` when set, so
//! terms injected by query expansion never trigger them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use regnav_config::RetrievalConfig;
use regnav_core::{Confidence, Passage, RetrievedPassage, SourceId};

use crate::index::EmbeddingIndex;
use crate::Result;

/// "article 6", "art. 6", "art 6"
static ARTICLE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:article|art\.?)\s*(\d+)\b").expect("article reference regex is valid")
});

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]+").expect("word regex is valid"));

static REGULATION_ALIASES: Lazy<Vec<(SourceId, Regex)>> = Lazy::new(|| {
    SourceId::ALL
        .iter()
        .flat_map(|source| {
            source.aliases().iter().map(move |alias| {
                let pattern = format!(r"\b{}\b", regex::escape(alias));
                (*source, Regex::new(&pattern).expect("alias regex is valid"))
            })
        })
        .collect()
});

const HEADING_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "of", "for", "and", "or", "to", "in", "on", "is", "are", "be", "by", "with",
    "this", "that", "it", "at", "as", "from", "which", "when", "not", "does", "do", "have",
];

/// Regulations named in the text, in corpus order
pub fn mentioned_regulations(text: &str) -> Vec<SourceId> {
    let lowered = text.to_lowercase();
    let named: HashSet<SourceId> = REGULATION_ALIASES
        .iter()
        .filter(|(_, pattern)| pattern.is_match(&lowered))
        .map(|(source, _)| *source)
        .collect();
    SourceId::ALL.into_iter().filter(|s| named.contains(s)).collect()
}

/// Article numbers referenced in the text
pub fn mentioned_articles(text: &str) -> BTreeSet<u32> {
    let lowered = text.to_lowercase();
    ARTICLE_REFERENCE
        .captures_iter(&lowered)
        .filter_map(|cap| cap.get(1)?.as_str().parse().ok())
        .collect()
}

/// Lowercase alphabetic words longer than three letters, minus stop words
pub fn content_words(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() > 3 && !HEADING_STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Query features computed once and reused for every passage
struct QuerySignals {
    regulations: Vec<SourceId>,
    articles: BTreeSet<u32>,
    words: HashSet<String>,
}

impl QuerySignals {
    /// Heading words come from `query`, regulation and article mentions from `mentions`
    fn new(query: &str, mentions: &str) -> Self {
        Self {
            regulations: mentioned_regulations(mentions),
            articles: mentioned_articles(mentions),
            words: content_words(query),
        }
    }
}

/// Per-passage score components
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassageScore {
    pub semantic: f32,
    pub lexical: f32,
    /// Weighted fusion of `semantic` and `lexical`
    pub base: f32,
    pub regulation: f32,
    pub article: f32,
    pub chapter: f32,
    pub section: f32,
}

impl PassageScore {
    pub fn total(&self) -> f32 {
        self.base + self.regulation + self.article + self.chapter + self.section
    }
}

/// Per-call retrieval options
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    pub top_k: Option<usize>,
    pub source_filter: Option<SourceId>,
    pub min_score: Option<f32>,
    /// Text the regulation and article boosts are read from; the query itself when unset
    pub mentions: Option<String>,
}

impl RetrieveOptions {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k: Some(top_k),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, source: Option<SourceId>) -> Self {
        self.source_filter = source;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_mentions(mut self, text: impl Into<String>) -> Self {
        self.mentions = Some(text.into());
        self
    }
}

/// Hybrid retriever over one loaded index
pub struct HybridRetriever {
    index: Arc<EmbeddingIndex>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(index: Arc<EmbeddingIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn confidence(&self, score: f32) -> Confidence {
        Confidence::from_score(
            score,
            self.config.high_confidence_threshold,
            self.config.medium_confidence_threshold,
        )
    }

    /// Score breakdown for every passage, in index order
    pub fn score_all(&self, query: &str) -> Result<Vec<(Arc<Passage>, PassageScore)>> {
        self.score_all_with_mentions(query, query)
    }

    /// Like [`score_all`](Self::score_all), reading regulation and article
    /// mentions from `mentions` instead of the query
    pub fn score_all_with_mentions(
        &self,
        query: &str,
        mentions: &str,
    ) -> Result<Vec<(Arc<Passage>, PassageScore)>> {
        let passages = self.index.passages();
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let semantic = self.index.semantic_scores(query)?;
        let lexical = self.index.sparse_scores(query)?;
        let signals = QuerySignals::new(query, mentions);

        Ok(passages
            .iter()
            .zip(semantic)
            .map(|(passage, cosine)| {
                let bm25 = lexical.get(passage.chunk_id()).copied().unwrap_or(0.0);
                let score = self.score_passage(passage, cosine, bm25, &signals);
                (Arc::clone(passage), score)
            })
            .collect())
    }

    /// Score breakdown for a single passage, by chunk ID
    pub fn score(&self, query: &str, chunk_id: &str) -> Result<Option<PassageScore>> {
        Ok(self
            .score_all(query)?
            .into_iter()
            .find(|(p, _)| p.chunk_id() == chunk_id)
            .map(|(_, s)| s))
    }

    fn score_passage(
        &self,
        passage: &Passage,
        semantic: f32,
        lexical: f32,
        signals: &QuerySignals,
    ) -> PassageScore {
        let base = self.config.semantic_weight * semantic + self.config.lexical_weight * lexical;

        let regulation = if signals.regulations.contains(&passage.source_id()) {
            self.config.regulation_boost
        } else {
            0.0
        };

        let article = if signals.articles.iter().any(|&n| passage.is_article(n)) {
            self.config.article_boost
        } else {
            0.0
        };

        let structure = passage.structure();
        let chapter_overlap = content_words(&structure.chapter_title)
            .intersection(&signals.words)
            .count();
        let section_overlap = content_words(&structure.section_title)
            .intersection(&signals.words)
            .count();

        PassageScore {
            semantic,
            lexical,
            base,
            regulation,
            article,
            chapter: self.config.chapter_word_boost * chapter_overlap as f32,
            section: self.config.section_word_boost * section_overlap as f32,
        }
    }

    /// Top passages for a query, best first
    ///
    /// Passages outside the source filter or below the minimum score are
    /// dropped before truncating to `top_k`. Ties keep index order.
    pub fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Result<Vec<RetrievedPassage>> {
        let top_k = options.top_k.unwrap_or(self.config.default_top_k);
        let min_score = options.min_score.unwrap_or(self.config.default_min_score);

        let mentions = options.mentions.as_deref().unwrap_or(query);

        let mut scored: Vec<(Arc<Passage>, f32)> = self
            .score_all_with_mentions(query, mentions)?
            .into_iter()
            .filter(|(p, _)| options.source_filter.map_or(true, |s| p.source_id() == s))
            .map(|(p, s)| (p, s.total()))
            .filter(|(_, total)| *total >= min_score)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        tracing::debug!(
            query = %query,
            filter = ?options.source_filter,
            results = scored.len(),
            top_score = scored.first().map(|(_, s)| *s),
            "Hybrid retrieval"
        );

        Ok(scored
            .into_iter()
            .map(|(passage, score)| self.retrieved(passage, score))
            .collect())
    }

    /// Wrap a passage with its score, confidence tier and link
    pub fn retrieved(&self, passage: Arc<Passage>, score: f32) -> RetrievedPassage {
        RetrievedPassage {
            url: passage.url(),
            confidence: self.confidence(score),
            score,
            passage,
        }
    }
}
