//! Citation Verification
//!
//! Checks bracketed citation markers in generated prose, e.g.
//! `[GDPR Art. 22]` or `[EU AI Act Article 6(3)]`, against the article
//! passages that were actually supplied to the generator. A citation with
//! no matching retrieved article yields an advisory warning.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use regnav_core::{RetrievedPassage, SourceId};

static CITATION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[(EU AI Act|GDPR|DORA)\s+Art(?:icle)?\.?\s*(\d+)[^\]]*\]")
        .expect("citation regex is valid")
});

/// A citation marker found in generated text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: SourceId,
    pub article: u32,
    /// Marker as written
    pub text: String,
}

/// Citation markers in order of appearance
pub fn extract_citations(text: &str) -> Vec<Citation> {
    CITATION_MARKER
        .captures_iter(text)
        .filter_map(|cap| {
            Some(Citation {
                source: cap.get(1)?.as_str().parse().ok()?,
                article: cap.get(2)?.as_str().parse().ok()?,
                text: cap.get(0)?.as_str().to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CitationVerifier;

impl CitationVerifier {
    pub fn new() -> Self {
        Self
    }

    /// One warning per distinct (regulation, article) cited but not retrieved
    pub fn verify(&self, generated: &str, retrieved: &[RetrievedPassage]) -> Vec<String> {
        let supported: HashSet<(SourceId, u32)> = retrieved
            .iter()
            .filter_map(|p| Some((p.passage.source_id(), p.passage.article_number()?)))
            .collect();

        let mut reported = HashSet::new();
        let warnings: Vec<String> = extract_citations(generated)
            .into_iter()
            .filter(|c| !supported.contains(&(c.source, c.article)))
            .filter(|c| reported.insert((c.source, c.article)))
            .map(|c| {
                format!(
                    "Unsupported citation {}: no {} Article {} passage was retrieved for this answer",
                    c.text,
                    c.source.name(),
                    c.article
                )
            })
            .collect();

        if !warnings.is_empty() {
            tracing::warn!(unsupported = warnings.len(), "Generated answer cites unretrieved articles");
        }
        warnings
    }
}

/// Convenience wrapper over [`CitationVerifier::verify`]
pub fn verify_citations(generated: &str, retrieved: &[RetrievedPassage]) -> Vec<String> {
    CitationVerifier::new().verify(generated, retrieved)
}
