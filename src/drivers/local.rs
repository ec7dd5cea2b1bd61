// file: src/drivers/local.rs
// description: driver running a stage through an in-process analysis engine
// reference: blocking analysis offloaded with tokio::task::spawn_blocking

use crate::drivers::StageDriver;
use crate::drivers::engines::{LocalEngine, available_engines, engine_for};
use crate::error::{PipelineError, Result};
use crate::models::{Annotation, Document, Stage};
use crate::utils::HealthCheck;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct LocalDriver {
    stage: Arc<Stage>,
    engine: Arc<dyn LocalEngine>,
}

impl LocalDriver {
    pub fn new(stage: Stage) -> Result<Self> {
        let engine = engine_for(&stage.target).ok_or_else(|| {
            PipelineError::Config(format!(
                "stage {}: unknown local engine {} (available: {})",
                stage.name,
                stage.target,
                available_engines().join(", ")
            ))
        })?;
        engine.validate(&stage)?;

        Ok(Self {
            stage: Arc::new(stage),
            engine,
        })
    }

    pub fn with_engine(stage: Stage, engine: Arc<dyn LocalEngine>) -> Self {
        Self {
            stage: Arc::new(stage),
            engine,
        }
    }
}

#[async_trait]
impl StageDriver for LocalDriver {
    fn stage(&self) -> &Stage {
        &self.stage
    }

    async fn health_check(&self) -> HealthCheck {
        let started = Instant::now();
        match self.engine.validate(&self.stage) {
            Ok(()) => HealthCheck::healthy(&self.stage.name, started.elapsed()),
            Err(e) => HealthCheck::unhealthy(&self.stage.name, e.to_string(), started.elapsed()),
        }
    }

    async fn process(&self, document: &Document) -> Result<Vec<Annotation>> {
        let engine = Arc::clone(&self.engine);
        let stage = Arc::clone(&self.stage);
        let document = document.clone();

        let annotations = tokio::task::spawn_blocking(move || engine.analyze(&document, &stage))
            .await
            .map_err(|e| {
                PipelineError::driver(&self.stage.name, format!("engine task failed: {}", e))
            })??;

        debug!(
            "Stage {} produced {} annotations",
            self.stage.name,
            annotations.len()
        );
        Ok(annotations)
    }
}
