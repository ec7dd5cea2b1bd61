// file: src/models/stage.rs
// description: pipeline stage definitions and the fixed-order pipeline
// reference: internal data structures

use crate::config::{Config, RemoteConfig, StageConfig};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Local,
    Remote,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Local => write!(f, "local"),
            DriverKind::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub driver: DriverKind,
    /// Engine name for local stages, base URL for remote ones.
    pub target: String,
    pub parameters: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub gpu: bool,
}

impl Stage {
    pub fn from_config(stage: &StageConfig, remote: &RemoteConfig) -> Self {
        // Older service configs carry the timeout as a string parameter.
        let legacy_timeout = stage
            .parameters
            .get("timeout")
            .and_then(|v| v.trim().parse::<u64>().ok());

        let timeout = stage.timeout_secs.or(legacy_timeout).map(Duration::from_secs);

        let retries = match stage.driver {
            DriverKind::Remote => stage.retries.unwrap_or(remote.default_retries),
            DriverKind::Local => 0,
        };

        Self {
            name: stage.name.clone(),
            driver: stage.driver,
            target: stage.target.trim_end_matches('/').to_string(),
            parameters: stage.parameters.clone(),
            timeout,
            retries,
            gpu: stage.gpu,
        }
    }
}

/// Ordered stage list. Order is fixed once built.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::Config(
                "pipeline name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate stage name: {}",
                    stage.name
                )));
            }
        }

        Ok(Self { name, stages })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let stages = config
            .stages
            .iter()
            .map(|s| Stage::from_config(s, &config.remote))
            .collect();
        Self::new(config.pipeline.name.clone(), stages)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
