//! Passages: the retrievable unit of regulatory text
//!
//! A passage is immutable once created. Its breadcrumb and enriched
//! embedding text are projections of `source_id`, `kind`, `label` and
//! `structure`, never independently edited.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SourceId;

/// Breadcrumb separator
const CRUMB_SEPARATOR: &str = " › ";

/// Structural category of a passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassageKind {
    Article,
    Recital,
    Annex,
}

impl PassageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Recital => "recital",
            Self::Annex => "annex",
        }
    }
}

impl fmt::Display for PassageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enclosing chapter/section/title of a passage
///
/// For articles this comes from the structural registry. Recitals and
/// annexes get synthesized values (e.g. chapter "Preamble" / "Recitals",
/// or an annex number and title with the annex point as section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    #[serde(default)]
    pub chapter_number: String,
    #[serde(default)]
    pub chapter_title: String,
    #[serde(default)]
    pub section_number: String,
    #[serde(default)]
    pub section_title: String,
    #[serde(default)]
    pub article_title: String,
}

impl Structure {
    /// Structure shared by every recital
    pub fn preamble() -> Self {
        Self {
            chapter_number: "Preamble".to_string(),
            chapter_title: "Recitals".to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chapter_number.is_empty()
            && self.chapter_title.is_empty()
            && self.section_number.is_empty()
            && self.section_title.is_empty()
            && self.article_title.is_empty()
    }
}

/// An indexed unit of regulatory text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    text: String,
    source_id: SourceId,
    label: String,
    kind: PassageKind,
    #[serde(default)]
    structure: Structure,
    chunk_id: String,
    #[serde(default)]
    breadcrumb: String,
}

impl Passage {
    pub fn new(
        source_id: SourceId,
        kind: PassageKind,
        label: impl Into<String>,
        structure: Structure,
        text: impl Into<String>,
        chunk_id: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let breadcrumb = derive_breadcrumb(source_id, kind, &label, &structure);
        Self {
            text: text.into(),
            source_id,
            label,
            kind,
            structure,
            chunk_id: chunk_id.into(),
            breadcrumb,
        }
    }

    /// Re-derive the breadcrumb if a stored record lacks one
    pub fn with_derived_breadcrumb(mut self) -> Self {
        if self.breadcrumb.trim().is_empty() {
            self.breadcrumb =
                derive_breadcrumb(self.source_id, self.kind, &self.label, &self.structure);
        }
        self
    }

    /// Fill empty structural fields from `known`
    ///
    /// The breadcrumb is re-derived when any field was filled.
    pub fn with_structure_defaults(mut self, known: &Structure) -> Self {
        let structure = &mut self.structure;
        let mut filled = false;
        for (field, value) in [
            (&mut structure.chapter_number, &known.chapter_number),
            (&mut structure.chapter_title, &known.chapter_title),
            (&mut structure.section_number, &known.section_number),
            (&mut structure.section_title, &known.section_title),
            (&mut structure.article_title, &known.article_title),
        ] {
            if field.trim().is_empty() && !value.trim().is_empty() {
                *field = value.clone();
                filled = true;
            }
        }
        if filled {
            self.breadcrumb =
                derive_breadcrumb(self.source_id, self.kind, &self.label, &self.structure);
        }
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> PassageKind {
        self.kind
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn breadcrumb(&self) -> &str {
        &self.breadcrumb
    }

    /// Numeric article number for article passages; `None` for lettered ones like "Article 6a"
    pub fn article_number(&self) -> Option<u32> {
        if self.kind != PassageKind::Article {
            return None;
        }
        self.label.strip_prefix("Article ")?.trim().parse().ok()
    }

    /// Whether this passage is exactly the given article (not "Article 6a" for 6)
    pub fn is_article(&self, number: u32) -> bool {
        self.kind == PassageKind::Article && self.label == format!("Article {}", number)
    }

    /// EUR-Lex deep link for this passage
    pub fn url(&self) -> String {
        self.source_id.passage_url(&self.label)
    }

    /// Text fed to the encoder: a structural tag line followed by the raw text
    ///
    /// `[GDPR] [Chapter III: Rights of the Data Subject] [Section 4: ...] [Article 22: ...]`
    pub fn enriched_text(&self) -> String {
        let mut tags = vec![format!("[{}]", self.source_id.name())];
        if let Some(chapter) = chapter_heading(self.kind, &self.structure) {
            tags.push(format!("[{}]", chapter));
        }
        if let Some(section) = section_heading(self.kind, &self.structure) {
            tags.push(format!("[{}]", section));
        }
        tags.push(format!("[{}]", leaf_heading(self.kind, &self.label, &self.structure)));
        format!("{}\n{}", tags.join(" "), self.text)
    }
}

fn chapter_heading(kind: PassageKind, s: &Structure) -> Option<String> {
    if s.chapter_number.is_empty() && s.chapter_title.is_empty() {
        return None;
    }
    let heading = match kind {
        PassageKind::Article => match (s.chapter_number.is_empty(), s.chapter_title.is_empty()) {
            (false, false) => format!("Chapter {}: {}", s.chapter_number, s.chapter_title),
            (false, true) => format!("Chapter {}", s.chapter_number),
            _ => s.chapter_title.clone(),
        },
        PassageKind::Recital => s.chapter_number.clone(),
        PassageKind::Annex => {
            if s.chapter_title.is_empty() || s.chapter_title == s.chapter_number {
                s.chapter_number.clone()
            } else {
                format!("{}: {}", s.chapter_number, s.chapter_title)
            }
        },
    };
    Some(heading)
}

fn section_heading(kind: PassageKind, s: &Structure) -> Option<String> {
    if s.section_number.is_empty() {
        return None;
    }
    let prefix = match kind {
        PassageKind::Annex => "Point",
        _ => "Section",
    };
    if s.section_title.is_empty() {
        Some(format!("{} {}", prefix, s.section_number))
    } else {
        Some(format!("{} {}: {}", prefix, s.section_number, s.section_title))
    }
}

fn leaf_heading(kind: PassageKind, label: &str, s: &Structure) -> String {
    match kind {
        PassageKind::Article if !s.article_title.is_empty() => {
            format!("{}: {}", label, s.article_title)
        },
        PassageKind::Annex if !s.article_title.is_empty() => s.article_title.clone(),
        _ => label.to_string(),
    }
}

fn derive_breadcrumb(
    source_id: SourceId,
    kind: PassageKind,
    label: &str,
    structure: &Structure,
) -> String {
    let mut parts = vec![source_id.name().to_string()];
    let chapter = chapter_heading(kind, structure);
    let section = section_heading(kind, structure);
    let has_section = section.is_some();

    parts.extend(chapter.clone());
    parts.extend(section);

    let leaf = leaf_heading(kind, label, structure);
    // Annex point passages end at the point heading; whole annexes at the annex heading
    let leaf_is_redundant = match kind {
        PassageKind::Annex => {
            structure.article_title.is_empty() && (has_section || chapter.is_some())
        },
        _ => false,
    };
    if !leaf_is_redundant {
        parts.push(leaf);
    }

    parts.join(CRUMB_SEPARATOR)
}
