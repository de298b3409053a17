//! Lexical TF-IDF encoder
//!
//! The fallback vector space when no semantic model is available. Fitted on
//! the corpus at build time and persisted next to the index so a query is
//! projected into exactly the space the passages were embedded in.
//!
//! Tokens are lowercase `\w\w+` runs with English stop words removed;
//! features are unigrams and bigrams, capped at the most frequent
//! `max_features`. Weights use sublinear TF and smoothed IDF
//! (`ln((1 + n) / (1 + df)) + 1`), rows are L2-normalized.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use regnav_core::{Encoder, EncoderKind};

use crate::{RagError, Result};

/// Artifact format understood by this build
pub const LEXICAL_FORMAT_VERSION: u32 = 1;

const ENCODER_NAME: &str = "tfidf";

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("token regex is valid"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "as", "at", "be", "because", "been", "before", "being", "below", "between",
        "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during",
        "each", "either", "else", "etc", "every", "few", "for", "from", "further", "had", "has",
        "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how",
        "however", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "may", "me",
        "might", "more", "most", "must", "my", "myself", "neither", "no", "nor", "not", "now",
        "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out",
        "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the",
        "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this",
        "those", "through", "thus", "to", "too", "under", "until", "up", "upon", "very", "was",
        "we", "were", "what", "when", "where", "whether", "which", "while", "who", "whom",
        "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your",
        "yours", "yourself", "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Unigram and bigram features of a text, in order of occurrence
fn features(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !STOP_WORDS.contains(t))
        .collect();

    let mut out: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    out.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    out
}

/// Smoothed inverse document frequency
fn smooth_idf(n_docs: usize, document_frequency: u32) -> f32 {
    (((1 + n_docs) as f64 / (1 + document_frequency as u64) as f64).ln() + 1.0) as f32
}

/// Persisted form: vocabulary in index order with integer document frequencies
#[derive(Debug, Serialize, Deserialize)]
struct LexicalArtifact {
    format_version: u32,
    n_docs: usize,
    vocabulary: Vec<String>,
    document_frequency: Vec<u32>,
}

/// Fitted TF-IDF vectorizer
#[derive(Debug, Clone)]
pub struct LexicalEncoder {
    /// Feature -> column index
    vocabulary: HashMap<String, usize>,
    /// Column index -> feature
    terms: Vec<String>,
    document_frequency: Vec<u32>,
    idf: Vec<f32>,
    n_docs: usize,
}

impl LexicalEncoder {
    /// Fit on a corpus, keeping the `max_features` most frequent features
    pub fn fit(texts: &[&str], max_features: usize) -> Result<Self> {
        if texts.is_empty() {
            return Err(RagError::Embedding(
                "cannot fit a lexical encoder on an empty corpus".to_string(),
            ));
        }

        let mut total_count: HashMap<String, u64> = HashMap::new();
        let mut doc_count: HashMap<String, u32> = HashMap::new();

        for text in texts {
            let feats = features(text);
            let mut in_doc = HashSet::new();
            for feature in feats {
                *total_count.entry(feature.clone()).or_default() += 1;
                if in_doc.insert(feature.clone()) {
                    *doc_count.entry(feature).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, u64)> = total_count.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max_features);

        let selected: BTreeMap<String, u32> = ranked
            .into_iter()
            .map(|(term, _)| {
                let df = doc_count.get(&term).copied().unwrap_or(0);
                (term, df)
            })
            .collect();

        let (terms, document_frequency): (Vec<String>, Vec<u32>) = selected.into_iter().unzip();

        tracing::info!(
            documents = texts.len(),
            features = terms.len(),
            "Fitted lexical encoder"
        );

        Self::from_parts(terms, document_frequency, texts.len())
    }

    fn from_parts(terms: Vec<String>, document_frequency: Vec<u32>, n_docs: usize) -> Result<Self> {
        if terms.len() != document_frequency.len() {
            return Err(RagError::Persistence(format!(
                "lexical vocabulary has {} terms but {} document frequencies",
                terms.len(),
                document_frequency.len()
            )));
        }
        if terms.is_empty() {
            return Err(RagError::Embedding("lexical vocabulary is empty".to_string()));
        }

        let vocabulary = terms
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();
        let idf = document_frequency
            .iter()
            .map(|&df| smooth_idf(n_docs, df))
            .collect();

        Ok(Self {
            vocabulary,
            terms,
            document_frequency,
            idf,
            n_docs,
        })
    }

    /// Project text into the fitted space
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<usize, u32> = HashMap::new();
        for feature in features(text) {
            if let Some(&idx) = self.vocabulary.get(&feature) {
                *counts.entry(idx).or_default() += 1;
            }
        }

        let mut vector = vec![0.0f32; self.terms.len()];
        for (idx, tf) in counts {
            vector[idx] = (1.0 + (tf as f32).ln()) * self.idf[idx];
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }

    pub fn document_count(&self) -> usize {
        self.n_docs
    }

    /// Write the fitted state as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let artifact = LexicalArtifact {
            format_version: LEXICAL_FORMAT_VERSION,
            n_docs: self.n_docs,
            vocabulary: self.terms.clone(),
            document_frequency: self.document_frequency.clone(),
        };
        let json = serde_json::to_vec(&artifact)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Restore a saved encoder; IDF is recomputed so the weights are identical
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let artifact: LexicalArtifact = serde_json::from_slice(&bytes)?;

        if artifact.format_version != LEXICAL_FORMAT_VERSION {
            return Err(RagError::RebuildRequired(format!(
                "lexical artifact {} has format version {}, expected {}",
                path.display(),
                artifact.format_version,
                LEXICAL_FORMAT_VERSION
            )));
        }

        Self::from_parts(artifact.vocabulary, artifact.document_frequency, artifact.n_docs)
    }
}

impl Encoder for LexicalEncoder {
    fn kind(&self) -> EncoderKind {
        EncoderKind::Lexical
    }

    fn name(&self) -> &str {
        ENCODER_NAME
    }

    fn dim(&self) -> usize {
        self.terms.len()
    }

    fn encode(&self, text: &str) -> regnav_core::Result<Vec<f32>> {
        Ok(self.transform(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &[&str] = &[
        "The controller shall carry out a data protection impact assessment.",
        "Providers of high-risk AI systems shall establish a risk management system.",
        "Financial entities shall have an ICT risk management framework.",
        "The data subject shall have the right to object to processing.",
    ];

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_features_drop_stop_words_and_add_bigrams() {
        let feats = features("The right to object");
        assert_eq!(feats, vec!["right", "object", "right object"]);
    }

    #[test]
    fn test_fit_and_transform() {
        let encoder = LexicalEncoder::fit(CORPUS, 5000).unwrap();
        assert!(encoder.dim() > 0);
        assert_eq!(encoder.document_count(), 4);

        let query = encoder.transform("risk management system");
        let norm: f32 = query.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        let ai = encoder.transform(CORPUS[1]);
        let gdpr = encoder.transform(CORPUS[3]);
        assert!(cosine(&query, &ai) > cosine(&query, &gdpr));
    }

    #[test]
    fn test_unknown_text_is_zero_vector() {
        let encoder = LexicalEncoder::fit(CORPUS, 5000).unwrap();
        let v = encoder.transform("zzz qqq");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_max_features_cap() {
        let encoder = LexicalEncoder::fit(CORPUS, 5).unwrap();
        assert_eq!(encoder.vocabulary_size(), 5);
        // "shall" and "risk" are the most frequent terms
        assert!(encoder.vocabulary.contains_key("shall"));
        assert!(encoder.vocabulary.contains_key("risk"));
    }

    #[test]
    fn test_empty_corpus_rejected() {
        assert!(LexicalEncoder::fit(&[], 10).is_err());
    }

    #[test]
    fn test_save_load_is_exact() {
        let encoder = LexicalEncoder::fit(CORPUS, 5000).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexical.json");

        encoder.save(&path).unwrap();
        let restored = LexicalEncoder::load(&path).unwrap();

        let text = "ICT risk management framework for financial entities";
        assert_eq!(encoder.transform(text), restored.transform(text));
        assert_eq!(encoder.dim(), restored.dim());
    }

    #[test]
    fn test_unsupported_version_requires_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexical.json");
        std::fs::write(
            &path,
            r#"{"format_version":99,"n_docs":1,"vocabulary":["risk"],"document_frequency":[1]}"#,
        )
        .unwrap();
        assert!(matches!(
            LexicalEncoder::load(&path),
            Err(RagError::RebuildRequired(_))
        ));
    }
}
