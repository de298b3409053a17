//! Structural Document Chunking
//!
//! Parses extracted regulatory text into passages using an ordered list of
//! named extraction rules, each testable on its own:
//!
//! 1. **recital**: `(N)` markers at line start within the preamble
//! 2. **article**: `Article N` heading lines, split into paragraph chunks
//! 3. **annex**: `ANNEX N` heading lines, one passage per annex
//! 4. **annex_sub_point**: numbered points and lettered sub-points of the
//!    EU AI Act high-risk annex
//!
//! # Usage
//!
//! ```ignore
//! use regnav_rag::chunker::DocumentChunker;
//!
//! let chunker = DocumentChunker::new(ChunkingConfig::default());
//! let passages = chunker.chunk(&text, SourceId::Gdpr);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

use regnav_config::ChunkingConfig;
use regnav_core::{Passage, PassageKind, SourceId, Structure};

use crate::registry;

static RECITAL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\((\d+)\)[ \t]+").expect("recital regex is valid"));

static ARTICLE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*Article[ \t]+(\d+[a-z]?)[ \t]*$").expect("article regex is valid")
});

static ANNEX_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*ANNEX[ \t]+([IVXLC]+|\d+)[ \t]*$").expect("annex regex is valid")
});

/// Headings that close an article body
static DIVISION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:CHAPTER|SECTION|ANNEX)\b").expect("division regex is valid")
});

static ENACTING_FORMULA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:HAVE ADOPTED THIS REGULATION|CHAPTER[ \t]+I\b)")
        .expect("enacting formula regex is valid")
});

static BLANK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("blank line regex is valid"));

/// `1. ` style marker; group 1 is the number
static NUMBERED_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(\d{1,3})\.\s+").expect("numbered marker regex is valid"));

/// `(a) ` style marker; group 1 is the letter
static LETTERED_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([a-z])\)\s+").expect("lettered marker regex is valid"));

/// An ordinal marker located in text
#[derive(Debug, Clone, Copy)]
struct Marker {
    ordinal: u32,
    /// Start of the marker itself
    start: usize,
    /// Start of the text following the marker
    body_start: usize,
}

/// Keep only markers whose ordinals follow on from the previous one
///
/// With `consecutive`, each ordinal must be exactly one more than the last
/// (starting at `first`); otherwise any strictly increasing ordinal is kept.
fn ordered_markers(markers: impl Iterator<Item = Marker>, first: u32, consecutive: bool) -> Vec<Marker> {
    let mut kept: Vec<Marker> = Vec::new();
    for marker in markers {
        let accept = match kept.last() {
            None if consecutive => marker.ordinal == first,
            None => marker.ordinal >= first,
            Some(last) if consecutive => marker.ordinal == last.ordinal + 1,
            Some(last) => marker.ordinal > last.ordinal,
        };
        if accept {
            kept.push(marker);
        }
    }
    kept
}

fn numbered_markers(text: &str) -> Vec<Marker> {
    let found = NUMBERED_MARKER.captures_iter(text).filter_map(|cap| {
        let number = cap.get(1)?;
        Some(Marker {
            ordinal: number.as_str().parse().ok()?,
            start: number.start(),
            body_start: cap.get(0)?.end(),
        })
    });
    ordered_markers(found, 1, true)
}

fn lettered_markers(text: &str) -> Vec<Marker> {
    let found = LETTERED_MARKER.captures_iter(text).filter_map(|cap| {
        let letter = cap.get(1)?.as_str().chars().next()?;
        let whole = cap.get(0)?;
        Some(Marker {
            ordinal: letter as u32 - 'a' as u32 + 1,
            start: whole.start(),
            body_start: whole.end(),
        })
    });
    ordered_markers(found, 1, true)
}

/// Split `text` at marker starts, returning `(marker, slice from marker start)`
fn slices_at<'a>(text: &'a str, markers: &[Marker], end: usize) -> Vec<(Marker, &'a str)> {
    markers
        .iter()
        .enumerate()
        .map(|(i, marker)| {
            let stop = markers.get(i + 1).map(|next| next.start).unwrap_or(end);
            (*marker, &text[marker.start..stop])
        })
        .collect()
}

/// Collapse all whitespace runs to single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bound text to `max_chars` characters, marking the cut with an ellipsis
pub fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push('…');
    truncated
}

/// One named structural extraction rule
pub trait StructuralRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, text: &str, source: SourceId, config: &ChunkingConfig) -> Vec<Passage>;
}

/// Recitals: `(N)` markers in the preamble
pub struct RecitalRule;

impl RecitalRule {
    /// Byte offset where the enacting terms begin
    fn preamble_end(text: &str) -> usize {
        [
            ENACTING_FORMULA.find(text).map(|m| m.start()),
            ARTICLE_HEADING.find(text).map(|m| m.start()),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(text.len())
    }
}

impl StructuralRule for RecitalRule {
    fn name(&self) -> &'static str {
        "recital"
    }

    fn extract(&self, text: &str, source: SourceId, config: &ChunkingConfig) -> Vec<Passage> {
        let end = Self::preamble_end(text);
        let preamble = &text[..end];

        let found = RECITAL_MARKER.captures_iter(preamble).filter_map(|cap| {
            let number = cap.get(1)?;
            Some(Marker {
                ordinal: number.as_str().parse().ok()?,
                start: cap.get(0)?.start(),
                body_start: cap.get(0)?.end(),
            })
        });
        let markers = ordered_markers(found, 1, false);

        slices_at(preamble, &markers, end)
            .into_iter()
            .filter_map(|(marker, slice)| {
                let body = &slice[marker.body_start - marker.start..];
                let text = normalize_whitespace(body);
                if text.chars().count() < config.min_recital_chars {
                    return None;
                }
                Some(Passage::new(
                    source,
                    PassageKind::Recital,
                    format!("Recital {}", marker.ordinal),
                    Structure::preamble(),
                    truncate_chars(text, config.max_chunk_chars),
                    format!("{}_recital_{}", source.key(), marker.ordinal),
                ))
            })
            .collect()
    }
}

/// Articles: `Article N` headings, split into paragraph-level chunks
pub struct ArticleRule;

impl ArticleRule {
    /// Zero-padded chunk-id fragment: "6" -> "006", "6a" -> "006a"
    fn padded_number(number: &str) -> String {
        let digits: String = number.chars().take_while(|c| c.is_ascii_digit()).collect();
        let suffix = &number[digits.len()..];
        match digits.parse::<u32>() {
            Ok(n) => format!("{:03}{}", n, suffix),
            Err(_) => number.to_string(),
        }
    }

    /// Separate a leading title line from the article body
    fn split_title(body: &str) -> (Option<String>, &str) {
        let trimmed = body.trim_start();
        let offset = body.len() - trimmed.len();
        let line_end = trimmed.find('\n').unwrap_or(trimmed.len());
        let first_line = trimmed[..line_end].trim();

        let looks_like_title = !first_line.is_empty()
            && first_line.len() < 200
            && line_end < trimmed.len()
            && !first_line.starts_with(|c: char| c.is_ascii_digit() || c == '(')
            && !first_line.ends_with('.');

        if looks_like_title {
            (Some(first_line.to_string()), &body[offset + line_end..])
        } else {
            (None, body)
        }
    }

    /// Splitting cascade: blank lines, numbered paragraphs, sentences, whole body
    fn split_body(body: &str, max_chars: usize) -> Vec<String> {
        let paragraphs: Vec<String> = BLANK_LINE
            .split(body)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if paragraphs.len() > 1 {
            return paragraphs;
        }

        let markers = numbered_markers(body);
        if !markers.is_empty() {
            let mut pieces = Vec::with_capacity(markers.len() + 1);
            let intro = body[..markers[0].start].trim();
            if !intro.is_empty() {
                pieces.push(intro.to_string());
            }
            pieces.extend(
                slices_at(body, &markers, body.len())
                    .into_iter()
                    .map(|(_, slice)| slice.trim().to_string()),
            );
            if pieces.len() > 1 {
                return pieces;
            }
        }

        let sentences = pack_sentences(&normalize_whitespace(body), max_chars);
        if sentences.len() > 1 {
            return sentences;
        }

        vec![body.trim().to_string()]
    }
}

/// Greedily pack sentences into chunks of at most `max_chars` characters
fn pack_sentences(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split_sentence_bounds() {
        let sentence_chars = sentence.chars().count();
        if !current.is_empty() && current.chars().count() + sentence_chars > max_chars {
            chunks.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(sentence);
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

impl StructuralRule for ArticleRule {
    fn name(&self) -> &'static str {
        "article"
    }

    fn extract(&self, text: &str, source: SourceId, config: &ChunkingConfig) -> Vec<Passage> {
        let headings: Vec<(String, usize, usize)> = ARTICLE_HEADING
            .captures_iter(text)
            .filter_map(|cap| {
                let whole = cap.get(0)?;
                Some((cap.get(1)?.as_str().to_string(), whole.start(), whole.end()))
            })
            .collect();
        let divisions: Vec<usize> = DIVISION_HEADING.find_iter(text).map(|m| m.start()).collect();

        let mut seen = HashSet::new();
        let mut passages = Vec::new();

        for (i, (number, _, body_start)) in headings.iter().enumerate() {
            let next_article = headings.get(i + 1).map(|h| h.1).unwrap_or(text.len());
            let next_division = divisions
                .iter()
                .copied()
                .find(|&d| d >= *body_start)
                .unwrap_or(text.len());
            let body_end = next_article.min(next_division);

            if !seen.insert(number.clone()) {
                tracing::debug!(source = %source, article = %number, "Skipping repeated article heading");
                continue;
            }

            let (parsed_title, body) = Self::split_title(&text[*body_start..body_end]);

            let mut structure = registry::lookup_label(source, number);
            if structure.article_title.is_empty() {
                if let Some(title) = parsed_title {
                    structure.article_title = title;
                }
            }

            let label = format!("Article {}", number);
            let padded = Self::padded_number(number);

            let mut chunks: Vec<String> = Self::split_body(body, config.max_chunk_chars)
                .iter()
                .map(|piece| normalize_whitespace(piece))
                .filter(|piece| piece.chars().count() >= config.min_article_chunk_chars)
                .collect();
            if chunks.is_empty() {
                let whole = normalize_whitespace(body);
                if whole.chars().count() >= config.min_article_chunk_chars {
                    chunks.push(whole);
                }
            }

            for (idx, chunk) in chunks.into_iter().enumerate() {
                passages.push(Passage::new(
                    source,
                    PassageKind::Article,
                    label.clone(),
                    structure.clone(),
                    truncate_chars(chunk, config.max_chunk_chars),
                    format!("{}_art_{}_para_{}", source.key(), padded, idx + 1),
                ));
            }
        }

        passages
    }
}

/// `ANNEX N` sections, first occurrence of each number
fn annex_blocks(text: &str) -> Vec<(String, &str)> {
    let headings: Vec<(String, usize, usize)> = ANNEX_HEADING
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            Some((cap.get(1)?.as_str().to_uppercase(), whole.start(), whole.end()))
        })
        .collect();

    let mut seen = HashSet::new();
    headings
        .iter()
        .enumerate()
        .filter_map(|(i, (number, _, body_start))| {
            let end = headings.get(i + 1).map(|h| h.1).unwrap_or(text.len());
            seen.insert(number.clone())
                .then(|| (number.clone(), &text[*body_start..end]))
        })
        .collect()
}

fn whole_annex(source: SourceId, number: &str, body: &str, config: &ChunkingConfig) -> Option<Passage> {
    let text = normalize_whitespace(body);
    if text.chars().count() < config.min_annex_chars {
        return None;
    }
    let label = format!("Annex {}", number);
    Some(Passage::new(
        source,
        PassageKind::Annex,
        label.clone(),
        Structure {
            chapter_number: label.clone(),
            chapter_title: label,
            ..Structure::default()
        },
        truncate_chars(text, config.max_chunk_chars),
        format!("{}_annex_{}", source.key(), number.to_lowercase()),
    ))
}

/// Annexes stored whole (every annex except the high-risk list)
pub struct AnnexRule;

impl StructuralRule for AnnexRule {
    fn name(&self) -> &'static str {
        "annex"
    }

    fn extract(&self, text: &str, source: SourceId, config: &ChunkingConfig) -> Vec<Passage> {
        annex_blocks(text)
            .into_iter()
            .filter(|(number, _)| !registry::is_high_risk_annex(source, number))
            .filter_map(|(number, body)| whole_annex(source, &number, body, config))
            .collect()
    }
}

/// Points and lettered sub-points of the high-risk annex
pub struct AnnexSubPointRule;

impl AnnexSubPointRule {
    fn point_structure(number: &str, point: u32, sub_point: Option<&str>) -> Structure {
        let section_title = registry::high_risk_point_title(point)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Point {}", point));
        Structure {
            chapter_number: format!("Annex {}", number),
            chapter_title: registry::HIGH_RISK_ANNEX_TITLE.to_string(),
            section_number: point.to_string(),
            section_title,
            article_title: sub_point
                .map(|letter| format!("Point {}({})", point, letter))
                .unwrap_or_default(),
        }
    }
}

impl StructuralRule for AnnexSubPointRule {
    fn name(&self) -> &'static str {
        "annex_sub_point"
    }

    fn extract(&self, text: &str, source: SourceId, config: &ChunkingConfig) -> Vec<Passage> {
        let mut passages = Vec::new();

        for (number, body) in annex_blocks(text) {
            if !registry::is_high_risk_annex(source, &number) {
                continue;
            }
            let key = format!("{}_annex_{}", source.key(), number.to_lowercase());

            let points = numbered_markers(body);
            if points.is_empty() {
                tracing::warn!(source = %source, annex = %number, "No numbered points found, storing annex whole");
                passages.extend(whole_annex(source, &number, body, config));
                continue;
            }

            for (marker, slice) in slices_at(body, &points, body.len()) {
                let point = marker.ordinal;
                let point_text = normalize_whitespace(&slice[marker.body_start - marker.start..]);
                if point_text.chars().count() < config.min_annex_point_chars {
                    continue;
                }

                let sub_points = lettered_markers(&point_text);
                if sub_points.is_empty() {
                    passages.push(Passage::new(
                        source,
                        PassageKind::Annex,
                        format!("Annex {} Point {}", number, point),
                        Self::point_structure(&number, point, None),
                        truncate_chars(point_text, config.max_chunk_chars),
                        format!("{}_{}", key, point),
                    ));
                    continue;
                }

                for (sub, sub_slice) in slices_at(&point_text, &sub_points, point_text.len()) {
                    let sub_text = sub_slice[sub.body_start - sub.start..].trim().to_string();
                    if sub_text.chars().count() < config.min_annex_point_chars {
                        continue;
                    }
                    let letter = char::from_u32('a' as u32 + sub.ordinal - 1)
                        .map(String::from)
                        .unwrap_or_default();
                    passages.push(Passage::new(
                        source,
                        PassageKind::Annex,
                        format!("Annex {} Point {}({})", number, point, letter),
                        Self::point_structure(&number, point, Some(&letter)),
                        truncate_chars(sub_text, config.max_chunk_chars),
                        format!("{}_{}{}", key, point, letter),
                    ));
                }
            }
        }

        passages
    }
}

/// Runs the structural rules in order over one source's text
pub struct DocumentChunker {
    rules: Vec<Box<dyn StructuralRule>>,
    config: ChunkingConfig,
}

impl DocumentChunker {
    /// Chunker with the standard rule order
    pub fn new(config: ChunkingConfig) -> Self {
        Self::with_rules(
            config,
            vec![
                Box::new(RecitalRule),
                Box::new(ArticleRule),
                Box::new(AnnexRule),
                Box::new(AnnexSubPointRule),
            ],
        )
    }

    pub fn with_rules(config: ChunkingConfig, rules: Vec<Box<dyn StructuralRule>>) -> Self {
        Self { rules, config }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Parse one source's extracted text into passages
    ///
    /// Chunk IDs are unique in the output; a later duplicate is dropped with
    /// a warning.
    pub fn chunk(&self, text: &str, source: SourceId) -> Vec<Passage> {
        let text = text.replace("\r\n", "\n").replace('\x0c', "\n");

        let mut seen = HashSet::new();
        let mut passages = Vec::new();

        for rule in &self.rules {
            let extracted = rule.extract(&text, source, &self.config);
            tracing::debug!(source = %source, rule = rule.name(), count = extracted.len(), "Rule applied");

            for passage in extracted {
                if seen.insert(passage.chunk_id().to_string()) {
                    passages.push(passage);
                } else {
                    tracing::warn!(
                        source = %source,
                        rule = rule.name(),
                        chunk_id = passage.chunk_id(),
                        "Duplicate chunk id dropped"
                    );
                }
            }
        }

        tracing::info!(source = %source, passages = passages.len(), "Chunked source text");
        passages
    }
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}
