// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod config;
pub mod drivers;
pub mod error;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod utils;
pub mod writer;

pub use config::{Config, InputConfig, PipelineConfig, RemoteConfig, StageConfig, WriterConfig};
pub use drivers::{LocalDriver, LocalEngine, RemoteDriver, StageDriver, build_driver};
pub use error::{PipelineError, Result};
pub use loader::{ConversionReport, CsvLoader, DocumentReader, LoadReport, ReadReport, RowError};
pub use models::{Annotation, Document, DocumentMetadata, DriverKind, Pipeline, Stage, StageFailure};
pub use pipeline::{DocumentResult, PipelineComposer, PipelineStats, ProgressTracker, RunResult};
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, Validator};
pub use writer::{DocumentWriter, ExportManifest, read_document};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let config = Config::default_config();
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.len(), config.stages.len());
    }
}
