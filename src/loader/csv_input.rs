// file: src/loader/csv_input.rs
// description: converts csv rows (id, text) into documents and raw document files
// reference: https://docs.rs/csv

use crate::config::InputConfig;
use crate::error::{PipelineError, Result};
use crate::models::Document;
use crate::utils::Validator;
use crate::writer::DocumentWriter;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// 1-based line in the csv file.
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Default)]
pub struct ConversionReport {
    pub written: Vec<PathBuf>,
    pub errors: Vec<RowError>,
}

pub struct CsvLoader {
    language: String,
    title_prefix: String,
}

impl CsvLoader {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            language: config.language.clone(),
            title_prefix: config.title_prefix.clone(),
        }
    }

    /// Parses every data row; the header row is skipped. Bad rows are
    /// reported in [`LoadReport::errors`] and never abort the batch.
    pub fn load(&self, csv_path: &Path) -> Result<LoadReport> {
        Validator::validate_file(csv_path)?;
        info!("Reading documents from {}", csv_path.display());

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(csv_path)?;

        let mut report = LoadReport::default();
        let mut seen_ids = HashSet::new();

        for (index, result) in reader.records().enumerate() {
            // header is line 1
            let fallback_line = index as u64 + 2;

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    let line = e
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(fallback_line);
                    warn!("Skipping unreadable row at line {}: {}", line, e);
                    report.errors.push(RowError {
                        line,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(fallback_line);

            match self.row_to_document(&record, &mut seen_ids) {
                Ok(document) => {
                    debug!("Converted row {} into document {}", line, document.id());
                    report.documents.push(document);
                }
                Err(e) => {
                    warn!("Skipping row at line {}: {}", line, e);
                    report.errors.push(RowError {
                        line,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Loaded {} documents ({} rows skipped)",
            report.documents.len(),
            report.errors.len()
        );
        Ok(report)
    }

    fn row_to_document(
        &self,
        record: &StringRecord,
        seen_ids: &mut HashSet<String>,
    ) -> Result<Document> {
        if record.len() < 2 {
            return Err(PipelineError::Validation(format!(
                "expected at least 2 columns, found {}",
                record.len()
            )));
        }

        let id = record.get(0).unwrap_or_default().trim();
        let text = record.get(1).unwrap_or_default();

        Validator::validate_document_id(id)?;

        if !seen_ids.insert(id.to_string()) {
            return Err(PipelineError::Validation(format!(
                "duplicate document id: {}",
                id
            )));
        }

        Ok(Document::new(
            id.to_string(),
            text.to_string(),
            self.language.clone(),
            format!("{}{}", self.title_prefix, id),
        ))
    }

    /// Loads the csv and writes one raw document file per valid row.
    pub fn convert(&self, csv_path: &Path, writer: &DocumentWriter) -> Result<ConversionReport> {
        let LoadReport { documents, errors } = self.load(csv_path)?;
        let mut report = ConversionReport {
            written: Vec::with_capacity(documents.len()),
            errors,
        };

        let base_uri = file_uri(writer.output_dir());

        for mut document in documents {
            let path = writer.path_for(document.id());
            document.set_location(file_uri(&path), base_uri.clone());

            match writer.write(&document) {
                Ok(path) => report.written.push(path),
                Err(e) => {
                    warn!("Failed to write document {}: {}", document.id(), e);
                    report.errors.push(RowError {
                        line: 0,
                        reason: format!("document {}: {}", document.id(), e),
                    });
                }
            }
        }

        info!(
            "Converted {} rows into documents under {}",
            report.written.len(),
            writer.output_dir().display()
        );
        Ok(report)
    }
}

fn file_uri(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}
