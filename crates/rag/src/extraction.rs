//! Source Document Discovery and Text Extraction
//!
//! Each regulation is looked up under the sources directory, first at
//! `raw/<raw_dir>/<FILE>` and then at the legacy flat `<FILE>` location.
//! A `.txt` file is taken as already-extracted text; a `.pdf` goes through
//! the external `pdftotext` utility.

use std::path::{Path, PathBuf};
use std::process::Command;

use regnav_core::{Error, Result, SourceId, TextExtractor};

/// A located source file for one regulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub source: SourceId,
    pub path: PathBuf,
}

impl SourceDocument {
    pub fn is_pdf(&self) -> bool {
        self.path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("pdf"))
    }
}

/// Candidate locations in lookup order
fn candidate_paths(sources_dir: &Path, source: SourceId) -> Vec<PathBuf> {
    let nested = sources_dir.join("raw").join(source.raw_dir());
    let mut candidates = Vec::with_capacity(4);
    for dir in [nested.as_path(), sources_dir] {
        for ext in ["pdf", "txt"] {
            candidates.push(dir.join(format!("{}.{}", source.file_stem(), ext)));
        }
    }
    candidates
}

/// Locate the document for one regulation
pub fn locate_source(sources_dir: &Path, source: SourceId) -> Option<SourceDocument> {
    candidate_paths(sources_dir, source)
        .into_iter()
        .find(|p| p.is_file())
        .map(|path| SourceDocument { source, path })
}

/// Locate every regulation; missing ones are logged and left out
pub fn discover_sources(sources_dir: &Path) -> Vec<SourceDocument> {
    SourceId::ALL
        .into_iter()
        .filter_map(|source| {
            let found = locate_source(sources_dir, source);
            if found.is_none() {
                tracing::warn!(
                    source = %source,
                    dir = %sources_dir.display(),
                    "Source document not found, skipping"
                );
            }
            found
        })
        .collect()
}

/// Runs `pdftotext <pdf> -` and captures stdout
#[derive(Debug, Clone)]
pub struct PdfToTextExtractor {
    program: String,
}

impl PdfToTextExtractor {
    pub fn new() -> Self {
        Self {
            program: "pdftotext".to_string(),
        }
    }

    /// Use a different executable with the same command line
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PdfToTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for PdfToTextExtractor {
    fn name(&self) -> &str {
        &self.program
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let output = Command::new(&self.program)
            .arg(path)
            .arg("-")
            .output()
            .map_err(|e| Error::Extraction(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(Error::Extraction(format!(
                "{} exited with {} for {}: {}",
                self.program,
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(Error::Extraction(format!(
                "no text extracted from {}",
                path.display()
            )));
        }
        Ok(text)
    }
}

/// Reads UTF-8 text as-is
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn extract(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| Error::Extraction(format!("{}: {}", path.display(), e)))
    }
}

/// Extract one located document with the extractor its extension calls for
pub fn extract_source(
    doc: &SourceDocument,
    pdf: &dyn TextExtractor,
    plain: &dyn TextExtractor,
) -> Result<String> {
    let extractor = if doc.is_pdf() { pdf } else { plain };
    tracing::debug!(
        source = %doc.source,
        path = %doc.path.display(),
        extractor = extractor.name(),
        "Extracting source text"
    );
    extractor.extract(&doc.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_nested_location_preferred() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("raw").join("gdpr");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("GDPR.txt"), "nested").unwrap();
        std::fs::write(dir.path().join("GDPR.txt"), "legacy").unwrap();

        let doc = locate_source(dir.path(), SourceId::Gdpr).unwrap();
        assert_eq!(doc.path, nested.join("GDPR.txt"));
        assert!(!doc.is_pdf());
    }

    #[test]
    fn test_legacy_location() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("AI ACT.pdf"), b"%PDF").unwrap();
        let doc = locate_source(dir.path(), SourceId::EuAiAct).unwrap();
        assert!(doc.is_pdf());
    }

    #[test]
    fn test_missing_sources_skipped() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("DORA.txt"), "text").unwrap();
        let docs = discover_sources(dir.path());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, SourceId::Dora);
    }

    #[test]
    fn test_plain_text_extraction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("GDPR.txt");
        std::fs::write(&path, "Article 1\nSubject-matter").unwrap();
        let text = PlainTextExtractor.extract(&path).unwrap();
        assert!(text.starts_with("Article 1"));
    }

    #[test]
    fn test_missing_program_is_extraction_error() {
        let extractor = PdfToTextExtractor::with_program("regnav-no-such-pdftotext");
        let err = extractor.extract(Path::new("missing.pdf")).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }
}
