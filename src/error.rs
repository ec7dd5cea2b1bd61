// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File operation failed for {path}: {source}")]
    FileOperation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Stage {stage} failed after {attempts} attempt(s): {message}")]
    Driver {
        stage: String,
        message: String,
        attempts: u32,
    },

    #[error("Stage {stage} timed out after {timeout_ms}ms")]
    Timeout {
        stage: String,
        timeout_ms: u64,
        attempts: u32,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn driver(stage: &str, message: impl Into<String>) -> Self {
        Self::Driver {
            stage: stage.to_string(),
            message: message.into(),
            attempts: 1,
        }
    }

    /// How many times the failing stage was tried before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Driver { attempts, .. } | Self::Timeout { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}
