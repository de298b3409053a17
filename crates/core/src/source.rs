//! Regulation identifiers
//!
//! The corpus is a closed set of three EU legal instruments. Each carries its
//! display name, a stable key used in chunk IDs and artifact paths, the names
//! a question may use to refer to it, and its EUR-Lex reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// One of the three indexed regulations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceId {
    /// Regulation (EU) 2024/1689
    #[serde(rename = "EU AI Act")]
    EuAiAct,
    /// Regulation (EU) 2016/679
    #[serde(rename = "GDPR")]
    Gdpr,
    /// Regulation (EU) 2022/2554
    #[serde(rename = "DORA")]
    Dora,
}

impl SourceId {
    /// All sources in corpus order
    pub const ALL: [SourceId; 3] = [SourceId::EuAiAct, SourceId::Gdpr, SourceId::Dora];

    /// Human-facing name, also used in citation markers
    pub fn name(&self) -> &'static str {
        match self {
            Self::EuAiAct => "EU AI Act",
            Self::Gdpr => "GDPR",
            Self::Dora => "DORA",
        }
    }

    /// Stable lowercase key used in chunk IDs
    pub fn key(&self) -> &'static str {
        match self {
            Self::EuAiAct => "eu_ai_act",
            Self::Gdpr => "gdpr",
            Self::Dora => "dora",
        }
    }

    /// Lowercase phrases a question may use to name this regulation
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::EuAiAct => &["eu ai act", "ai act", "artificial intelligence act"],
            Self::Gdpr => &["gdpr", "general data protection regulation"],
            Self::Dora => &["dora", "digital operational resilience"],
        }
    }

    /// Directory name under `raw/` in the sources directory
    pub fn raw_dir(&self) -> &'static str {
        match self {
            Self::EuAiAct => "eu-ai-act",
            Self::Gdpr => "gdpr",
            Self::Dora => "dora",
        }
    }

    /// File stem of the published document
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::EuAiAct => "AI ACT",
            Self::Gdpr => "GDPR",
            Self::Dora => "DORA",
        }
    }

    /// Official EUR-Lex HTML rendering
    pub fn eurlex_url(&self) -> &'static str {
        match self {
            Self::EuAiAct => {
                "https://eur-lex.europa.eu/legal-content/EN/TXT/HTML/?uri=OJ:L_202401689"
            },
            Self::Gdpr => "https://eur-lex.europa.eu/legal-content/EN/TXT/HTML/?uri=CELEX:32016R0679",
            Self::Dora => "https://eur-lex.europa.eu/legal-content/EN/TXT/HTML/?uri=CELEX:32022R2554",
        }
    }

    /// Deep link to a passage label, e.g. `...#article_6`
    pub fn passage_url(&self, label: &str) -> String {
        format!(
            "{}#{}",
            self.eurlex_url(),
            label.replace(' ', "_").to_lowercase()
        )
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        SourceId::ALL
            .into_iter()
            .find(|source| {
                normalized == source.key().replace('_', " ")
                    || source.aliases().contains(&normalized.as_str())
            })
            .ok_or_else(|| Error::UnknownSource(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_keys() {
        assert_eq!("GDPR".parse::<SourceId>().unwrap(), SourceId::Gdpr);
        assert_eq!("eu_ai_act".parse::<SourceId>().unwrap(), SourceId::EuAiAct);
        assert_eq!("EU AI Act".parse::<SourceId>().unwrap(), SourceId::EuAiAct);
        assert_eq!("dora".parse::<SourceId>().unwrap(), SourceId::Dora);
        assert!("MiCA".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_passage_url() {
        let url = SourceId::Gdpr.passage_url("Article 22");
        assert!(url.ends_with("CELEX:32016R0679#article_22"));
    }

    #[test]
    fn test_serde_uses_display_name() {
        let json = serde_json::to_string(&SourceId::EuAiAct).unwrap();
        assert_eq!(json, "\"EU AI Act\"");
        let back: SourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SourceId::EuAiAct);
    }
}
