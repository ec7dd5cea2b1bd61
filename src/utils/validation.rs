// file: src/utils/validation.rs
// description: input validation for paths, ids, urls and document text
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use std::path::Path;

const MAX_ID_LENGTH: usize = 128;

pub struct Validator;

impl Validator {
    pub fn validate_file(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::Validation(format!(
                "File does not exist: {}",
                path.display()
            )));
        }

        if !path.is_file() {
            return Err(PipelineError::Validation(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        Ok(())
    }

    pub fn validate_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::Validation(format!(
                "Directory does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(PipelineError::Validation(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Ids end up in file names, so anything that could escape the output
    /// directory or confuse the reader's glob patterns is refused.
    pub fn validate_document_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(PipelineError::Validation("Document id is empty".to_string()));
        }

        if id.len() > MAX_ID_LENGTH {
            return Err(PipelineError::Validation(format!(
                "Document id longer than {} bytes",
                MAX_ID_LENGTH
            )));
        }

        if id == "." || id == ".." {
            return Err(PipelineError::Validation(format!(
                "Document id is not a valid file name: {}",
                id
            )));
        }

        if let Some(bad) = id
            .chars()
            .find(|c| c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '[' | ']'))
        {
            return Err(PipelineError::Validation(format!(
                "Document id {:?} contains illegal character {:?}",
                id, bad
            )));
        }

        Ok(())
    }

    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PipelineError::Validation(format!(
                "Invalid URL format: {}",
                url
            )));
        }
        Ok(())
    }

    pub fn truncate_text(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text.to_string(),
        }
    }
}
