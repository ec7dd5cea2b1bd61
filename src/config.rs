// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use crate::models::DriverKind;
use crate::utils::Validator;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub input: InputConfig,
    pub pipeline: PipelineConfig,
    pub remote: RemoteConfig,
    pub writer: WriterConfig,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    pub csv_file: String,
    pub raw_dir: String,
    pub language: String,
    pub file_prefix: String,
    pub title_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub name: String,
    pub parallel_workers: usize,
    pub skip_verification: bool,
    /// Reader selection, `[+]glob` includes and `[-]glob` excludes.
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    pub default_timeout_secs: u64,
    pub startup_timeout_secs: u64,
    pub health_poll_interval_ms: u64,
    pub default_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WriterFormat {
    Json,
    JsonGz,
}

impl WriterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            WriterFormat::Json => "json",
            WriterFormat::JsonGz => "json.gz",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WriterConfig {
    pub output_dir: String,
    pub format: WriterFormat,
    pub pretty: bool,
    pub overwrite: bool,
    pub write_failed: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageConfig {
    pub name: String,
    pub driver: DriverKind,
    pub target: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    #[serde(default)]
    pub gpu: bool,
}

impl StageConfig {
    pub fn local(name: &str, engine: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: DriverKind::Local,
            target: engine.to_string(),
            parameters: BTreeMap::new(),
            timeout_secs: None,
            retries: None,
            gpu: false,
        }
    }

    pub fn remote(name: &str, url: &str) -> Self {
        Self {
            driver: DriverKind::Remote,
            ..Self::local(name, url)
        }
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(config::File::from(Path::new("config/default.toml")));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DOC_COMPOSER")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            input: InputConfig {
                csv_file: "emails.csv".to_string(),
                raw_dir: "documents-raw".to_string(),
                language: "de".to_string(),
                file_prefix: "mail_".to_string(),
                title_prefix: "Mail_".to_string(),
            },
            pipeline: PipelineConfig {
                name: "doc-pipeline".to_string(),
                parallel_workers: 4,
                skip_verification: false,
                patterns: vec!["[+]*.json*".to_string()],
            },
            remote: RemoteConfig {
                default_timeout_secs: 900,
                startup_timeout_secs: 60,
                health_poll_interval_ms: 500,
                default_retries: 2,
                retry_backoff_ms: 250,
            },
            writer: WriterConfig {
                output_dir: "documents-annotated".to_string(),
                format: WriterFormat::Json,
                pretty: true,
                overwrite: true,
                write_failed: true,
            },
            stages: vec![
                StageConfig::local("segmenter", "sentence_splitter"),
                StageConfig::local("token-stats", "token_counter"),
            ],
        }
    }

    pub fn raw_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.input.raw_dir)
    }

    pub fn annotated_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.writer.output_dir)
    }

    pub fn csv_path(&self, root: &Path) -> PathBuf {
        root.join(&self.input.csv_file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.parallel_workers == 0 {
            return Err(PipelineError::Config(
                "parallel_workers must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.name.trim().is_empty() {
            return Err(PipelineError::Config(
                "pipeline name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate stage name: {}",
                    stage.name
                )));
            }

            let legacy_timeout = stage
                .parameters
                .get("timeout")
                .and_then(|v| v.trim().parse::<u64>().ok());
            if stage.timeout_secs == Some(0) || legacy_timeout == Some(0) {
                return Err(PipelineError::Config(format!(
                    "stage {}: timeout must be greater than 0",
                    stage.name
                )));
            }

            if stage.driver == DriverKind::Remote {
                Validator::validate_url(&stage.target).map_err(|e| {
                    PipelineError::Config(format!("stage {}: {}", stage.name, e))
                })?;
            }
        }

        Ok(())
    }
}
