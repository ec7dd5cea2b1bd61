// file: src/drivers/mod.rs
// description: stage driver abstraction over local engines and remote services
// reference: async_trait based backend abstraction

pub mod engines;
mod local;
mod remote;

pub use engines::{LocalEngine, engine_for};
pub use local::LocalDriver;
pub use remote::RemoteDriver;

use crate::config::RemoteConfig;
use crate::error::Result;
use crate::models::{Annotation, Document, DriverKind, Stage};
use crate::utils::HealthCheck;
use async_trait::async_trait;
use std::sync::Arc;

/// Executes one pipeline stage.
///
/// Drivers never mutate the document. `process` returns the annotations the
/// stage produced and the composer appends them, so a failing stage leaves
/// the document exactly as it was.
#[async_trait]
pub trait StageDriver: Send + Sync {
    fn stage(&self) -> &Stage;

    fn name(&self) -> &str {
        &self.stage().name
    }

    fn kind(&self) -> DriverKind {
        self.stage().driver
    }

    /// Brings the stage up. Remote drivers wait for the service to respond.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> HealthCheck;

    async fn process(&self, document: &Document) -> Result<Vec<Annotation>>;

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub fn build_driver(stage: &Stage, remote: &RemoteConfig) -> Result<Arc<dyn StageDriver>> {
    let driver: Arc<dyn StageDriver> = match stage.driver {
        DriverKind::Local => Arc::new(LocalDriver::new(stage.clone())?),
        DriverKind::Remote => Arc::new(RemoteDriver::new(stage.clone(), remote)?),
    };
    Ok(driver)
}
