// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

mod composer;
mod progress;

pub use composer::{DocumentResult, PipelineComposer, RunResult};
pub use progress::{PipelineStats, ProgressTracker};
