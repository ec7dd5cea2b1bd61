// file: src/loader/reader.rs
// description: directory walking and include/exclude selection of document files
// reference: https://docs.rs/walkdir

use crate::error::{PipelineError, Result};
use crate::models::Document;
use crate::utils::Validator;
use crate::writer::{MANIFEST_FILE, read_document};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
struct FilePattern {
    include: bool,
    pattern: Pattern,
}

impl FilePattern {
    fn parse(raw: &str) -> Result<Self> {
        let (include, glob) = if let Some(rest) = raw.strip_prefix("[+]") {
            (true, rest)
        } else if let Some(rest) = raw.strip_prefix("[-]") {
            (false, rest)
        } else {
            (true, raw)
        };

        let pattern = Pattern::new(glob)
            .map_err(|e| PipelineError::Config(format!("invalid pattern {}: {}", raw, e)))?;

        Ok(Self { include, pattern })
    }
}

#[derive(Debug, Default)]
pub struct ReadReport {
    pub documents: Vec<Document>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Picks document files out of a directory tree. A file is selected when it
/// matches at least one include pattern (or there are none) and no exclude pattern.
pub struct DocumentReader {
    patterns: Vec<FilePattern>,
}

impl DocumentReader {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| FilePattern::parse(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Validator::validate_directory(root)?;
        info!("Scanning directory: {}", root.display());

        let mut files = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if path.file_name().is_some_and(|n| n == MANIFEST_FILE) {
                continue;
            }

            let relative = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            if self.is_selected(&relative) {
                files.push(path.to_path_buf());
            } else {
                debug!("Skipping file: {}", relative);
            }
        }

        info!("Found {} document files", files.len());
        Ok(files)
    }

    fn is_selected(&self, relative: &str) -> bool {
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        let matches = |p: &FilePattern| p.pattern.matches(relative) || p.pattern.matches(file_name);

        let has_includes = self.patterns.iter().any(|p| p.include);
        let included = !has_includes || self.patterns.iter().filter(|p| p.include).any(matches);
        let excluded = self.patterns.iter().filter(|p| !p.include).any(matches);

        included && !excluded
    }

    /// Reads every selected file as a fresh source record. Unreadable files
    /// are logged and skipped.
    pub fn load(&self, root: &Path) -> Result<ReadReport> {
        let mut report = ReadReport::default();

        for path in self.scan(root)? {
            match read_document(&path) {
                Ok(document) => report.documents.push(document.into_source()),
                Err(e) => {
                    warn!("Skipping unreadable document {}: {}", path.display(), e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Annotation;
    use crate::writer::DocumentWriter;
    use std::fs;
    use tempfile::TempDir;

    fn reader(patterns: &[&str]) -> DocumentReader {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        DocumentReader::new(&patterns).unwrap()
    }

    #[test]
    fn test_include_and_exclude() {
        let r = reader(&["[+]*.json*", "[-]10*", "[-]11*"]);

        assert!(r.is_selected("mail_1.json"));
        assert!(r.is_selected("mail_1.json.gz"));
        assert!(r.is_selected("nested/mail_2.json"));
        assert!(!r.is_selected("10.json"));
        assert!(!r.is_selected("11_x.json.gz"));
        assert!(!r.is_selected("notes.txt"));
    }

    #[test]
    fn test_no_patterns_selects_everything() {
        let r = reader(&[]);
        assert!(r.is_selected("anything.bin"));
    }

    #[test]
    fn test_only_excludes() {
        let r = reader(&["[-]*.tmp"]);
        assert!(r.is_selected("mail_1.json"));
        assert!(!r.is_selected("mail_1.tmp"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(DocumentReader::new(&["[+][".to_string()]).is_err());
    }

    #[test]
    fn test_load_skips_manifest_and_broken_files() {
        let dir = TempDir::new().unwrap();
        let config = Config::default_config();
        let writer = DocumentWriter::new(dir.path(), "mail_", &config.writer).unwrap();

        for id in ["1", "2"] {
            let doc = Document::new(id.into(), "text".into(), "de".into(), format!("Mail_{id}"));
            writer.write(&doc).unwrap();
        }
        writer.write_manifest("p", &[], 0).unwrap();
        fs::write(dir.path().join("mail_3.json"), "{not json").unwrap();

        let report = reader(&["[+]*.json*"]).load(dir.path()).unwrap();
        let ids: Vec<&str> = report.documents.iter().map(|d| d.id()).collect();

        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(report.failed.len(), 1);
    }

    #[test]
    fn test_load_drops_earlier_results() {
        let dir = TempDir::new().unwrap();
        let config = Config::default_config();
        let writer = DocumentWriter::new(dir.path(), "mail_", &config.writer).unwrap();

        let mut doc = Document::new("4".into(), "text".into(), "de".into(), "Mail_4".into());
        doc.annotate(Annotation::new("segmenter", "sentence", serde_json::Value::Null));
        doc.mark_failed("topics", "refused".into(), 3);
        writer.write(&doc).unwrap();

        let report = reader(&["[+]*.json*"]).load(dir.path()).unwrap();
        let loaded = &report.documents[0];

        assert_eq!(loaded.id(), "4");
        assert_eq!(loaded.text(), "text");
        assert!(loaded.annotations().is_empty());
        assert!(!loaded.is_failed());
        assert_eq!(loaded.metadata(), doc.metadata());
    }
}
