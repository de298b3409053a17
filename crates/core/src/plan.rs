//! Query plans and request context

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::SourceId;

/// What the question is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    ArticleClarification,
    ObligationFinder,
    ConceptExplainer,
    CrossRegulationCompare,
    General,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArticleClarification => "article_clarification",
            Self::ObligationFinder => "obligation_finder",
            Self::ConceptExplainer => "concept_explainer",
            Self::CrossRegulationCompare => "cross_regulation_compare",
            Self::General => "general",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which regulation a plan restricts retrieval to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationFocus {
    Source(SourceId),
    #[default]
    All,
}

impl RegulationFocus {
    /// Source filter to apply, if any
    pub fn filter(&self) -> Option<SourceId> {
        match self {
            Self::Source(source) => Some(*source),
            Self::All => None,
        }
    }
}

/// Retrieval plan derived from one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub question: String,
    pub intent: QueryIntent,
    pub regulation_focus: RegulationFocus,
    /// Explicit article numbers named in the question
    pub article_numbers: BTreeSet<u32>,
    /// Ordered, deduplicated query strings
    pub queries: Vec<String>,
    pub top_k: usize,
    pub min_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Caller-supplied context accompanying a question
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryContext {
    /// Operator role, e.g. "provider" or "deployer"
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub institution_type: Option<String>,
    /// Regulation to assume when the question names none
    #[serde(default)]
    pub regulation: Option<SourceId>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}
