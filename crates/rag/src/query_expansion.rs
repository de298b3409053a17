//! Query Expansion for improved retrieval
//!
//! Colloquial questions rarely use the vocabulary of the legal text. Each
//! rule maps trigger phrases to canonical regulatory terms that are appended
//! to the question. Rules are tried in order and the first match wins.
//! Triggers match on word boundaries, so "article 6" does not fire on
//! "article 60".
//!
//! The built-in table can be replaced from a YAML file:
//!
//! ```yaml
//! rules:
//!   - name: dpia
//!     triggers: ["dpia", "data protection impact"]
//!     expansion: "Article 35 GDPR data protection impact assessment"
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{RagError, Result};

/// One trigger-phrase rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionRule {
    pub name: String,
    /// Lowercase phrases; any one of them fires the rule
    pub triggers: Vec<String>,
    /// Terms appended to the question
    pub expansion: String,
}

impl ExpansionRule {
    fn new(name: &str, triggers: &[&str], expansion: &str) -> Self {
        Self {
            name: name.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            expansion: expansion.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<ExpansionRule>,
}

struct CompiledRule {
    rule: ExpansionRule,
    patterns: Vec<Regex>,
}

/// Word-boundary pattern for a phrase; boundaries only where the phrase
/// starts or ends with a word character
fn trigger_pattern(trigger: &str) -> Result<Regex> {
    let trigger = trigger.trim().to_lowercase();
    let is_word = |c: Option<char>| c.map_or(false, |c| c.is_alphanumeric() || c == '_');
    let prefix = if is_word(trigger.chars().next()) { r"\b" } else { "" };
    let suffix = if is_word(trigger.chars().last()) { r"\b" } else { "" };
    Regex::new(&format!("{}{}{}", prefix, regex::escape(&trigger), suffix))
        .map_err(|e| RagError::Config(format!("invalid trigger '{}': {}", trigger, e)))
}

/// Ordered trigger-phrase expansion table
pub struct QueryExpander {
    rules: Vec<CompiledRule>,
}

impl QueryExpander {
    pub fn new(rules: Vec<ExpansionRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let patterns = rule
                    .triggers
                    .iter()
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| trigger_pattern(t))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledRule { rule, patterns })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Expander with the built-in rule table
    pub fn with_defaults() -> Self {
        let rules = default_rules()
            .into_iter()
            .map(|rule| {
                let patterns = rule
                    .triggers
                    .iter()
                    .filter_map(|t| trigger_pattern(t).ok())
                    .collect();
                CompiledRule { rule, patterns }
            })
            .collect();
        Self { rules }
    }

    /// Replace the built-in table with rules from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: RuleFile =
            serde_yaml::from_str(yaml).map_err(|e| RagError::Config(e.to_string()))?;
        Self::new(file.rules)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))?;
        let expander = Self::from_yaml_str(&yaml)?;
        tracing::info!(path = %path.display(), rules = expander.rules.len(), "Loaded expansion rules");
        Ok(expander)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule.name.as_str()).collect()
    }

    /// First rule with a trigger present in the question
    pub fn matching_rule(&self, question: &str) -> Option<&ExpansionRule> {
        let lowered = question.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.patterns.iter().any(|p| p.is_match(&lowered)))
            .map(|r| &r.rule)
    }

    /// Question with the first matching rule's terms appended
    pub fn expand(&self, question: &str) -> String {
        match self.matching_rule(question) {
            Some(rule) => {
                tracing::debug!(rule = %rule.name, "Query expanded");
                format!("{} {}", question, rule.expansion)
            },
            None => question.to_string(),
        }
    }
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Obligation vocabulary for an operator role
pub fn role_terms(role: &str) -> Option<&'static str> {
    match role.trim().to_lowercase().replace(|c: char| c == ' ' || c == '-', "_").as_str() {
        "provider" => Some(
            "provider obligations Article 16 quality management system technical documentation \
             conformity assessment",
        ),
        "deployer" => Some(
            "deployer obligations Article 26 human oversight monitoring logs fundamental rights \
             impact assessment Article 27",
        ),
        "provider_and_deployer" => Some(
            "provider obligations Article 16 deployer obligations Article 26 quality management \
             human oversight",
        ),
        "importer" => Some("importer obligations Article 23 verify conformity assessment CE marking"),
        "distributor" => Some("distributor obligations Article 24 verify CE marking"),
        _ => None,
    }
}

/// Built-in rule table
pub fn default_rules() -> Vec<ExpansionRule> {
    vec![
        ExpansionRule::new(
            "ai_act_fria",
            &[
                "fria", "fundamental rights impact", "fundamental-rights impact", "article 27",
            ],
            "Article 27 fundamental rights impact assessment for high-risk AI systems deployers \
             bodies governed by public law credit scoring insurance",
        ),
        ExpansionRule::new(
            "gdpr_dpia",
            &["dpia", "data protection impact", "privacy impact assessment"],
            "Article 35 GDPR data protection impact assessment high risk processing prior \
             consultation Article 36",
        ),
        ExpansionRule::new(
            "ai_act_high_risk_exemption",
            &[
                "shall not be considered", "not be considered", "not considered",
                "when not high", "not high-risk", "not high risk", "exemption", "exception",
                "exempt from high", "high-risk exclusion", "excluded from high",
                "article 6(3)", "art. 6(3)", "art 6 paragraph 3", "6(3)", "narrow procedural",
            ],
            "Article 6 paragraph 3 narrow procedural task does not materially influence \
             high-risk AI system classification exemption Annex III",
        ),
        ExpansionRule::new(
            "ai_act_classification",
            &[
                "high-risk classification", "classify as high", "classified as high",
                "how to classify", "risk classification", "article 6", "annex iii", "annex 3",
                "safety component", "placed on market",
            ],
            "Article 6 classification high-risk AI systems Annex III safety component \
             paragraph 1 paragraph 2 paragraph 3 criteria",
        ),
        ExpansionRule::new(
            "ai_act_prohibited_practices",
            &[
                "prohibited", "banned", "not allowed", "article 5", "manipulation",
                "social scoring", "subliminal", "biometric categorisation", "real-time biometric",
                "remote biometric",
            ],
            "Article 5 prohibited AI practices manipulation vulnerabilities social scoring \
             biometric identification public spaces emotion recognition",
        ),
        ExpansionRule::new(
            "ai_act_gpai",
            &[
                "gpai", "foundation model", "general purpose", "llm", "large language model",
                "article 51", "article 52", "article 53", "systemic risk", "10^25", "flops",
            ],
            "general purpose AI GPAI foundation model systemic risk Article 51 52 53 54 55 \
             transparency evaluation capability",
        ),
        ExpansionRule::new(
            "ai_act_transparency",
            &[
                "transparency", "disclose", "disclosure", "deepfake", "synthetic content",
                "emotion recognition", "chatbot", "article 50",
            ],
            "Article 50 transparency obligation deepfake synthetic content emotion recognition \
             chatbot interaction natural person",
        ),
        ExpansionRule::new(
            "ai_act_conformity",
            &[
                "conformity", "conformity assessment", "notified body", "third party assessment",
                "ce marking", "article 43",
            ],
            "Article 43 conformity assessment procedure notified body third party \
             self-assessment technical documentation",
        ),
        ExpansionRule::new(
            "ai_act_high_risk_obligations",
            &[
                "high-risk obligation", "obligation for high", "what must",
                "risk management system", "data governance", "technical documentation",
                "human oversight", "accuracy robustness", "article 9", "article 10", "article 11",
                "article 12", "article 13", "article 14", "article 15",
            ],
            "Article 9 10 11 12 13 14 15 risk management system data governance technical \
             documentation logging transparency human oversight accuracy robustness",
        ),
        ExpansionRule::new(
            "ai_act_operator_roles",
            &[
                "provider obligation", "deployer obligation", "provider vs deployer",
                "who is responsible", "responsibility", "article 16", "article 26",
            ],
            "Article 16 provider obligations Article 26 deployer obligations responsibility \
             high-risk AI system",
        ),
        ExpansionRule::new(
            "ai_act_timeline",
            &[
                "deadline", "when does", "when apply", "entry into force", "implementation",
                "transition", "february 2025", "august 2026", "article 113",
            ],
            "Article 113 entry into force transitional provisions application dates February \
             2025 August 2026 implementation timeline",
        ),
        ExpansionRule::new(
            "gdpr_automated_decisions",
            &[
                "automated decision", "article 22", "solely automated", "profiling",
                "legal effect", "right to explanation", "human review", "right to contest",
            ],
            "Article 22 GDPR automated individual decisions profiling legal effects right to \
             explanation human review contest",
        ),
        ExpansionRule::new(
            "dora_ict_risk",
            &[
                "dora", "digital operational resilience", "ict risk", "third party ict",
                "article 28", "incident reporting",
            ],
            "DORA Article 5 ICT risk management framework Article 28 third-party ICT service \
             providers incident classification reporting",
        ),
    ]
}
