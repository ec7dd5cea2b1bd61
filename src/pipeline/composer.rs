// file: src/pipeline/composer.rs
// description: drives documents through the ordered stage list with bounded parallelism
// reference: orchestrates asynchronous annotation workflow

use crate::config::Config;
use crate::drivers::{StageDriver, build_driver};
use crate::error::{PipelineError, Result};
use crate::models::{Document, DriverKind, Pipeline, StageFailure};
use crate::pipeline::progress::{PipelineStats, ProgressTracker};
use crate::utils::{HealthCheck, HealthReport};
use crate::writer::DocumentWriter;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const WRITER_STAGE: &str = "writer";

#[derive(Debug)]
pub struct DocumentResult {
    pub document: Document,
    pub output: Option<PathBuf>,
}

impl DocumentResult {
    pub fn failure(&self) -> Option<&StageFailure> {
        self.document.failure()
    }

    pub fn is_failed(&self) -> bool {
        self.document.is_failed()
    }
}

#[derive(Debug)]
pub struct RunResult {
    /// One entry per input document, in input order.
    pub results: Vec<DocumentResult>,
    pub stats: PipelineStats,
}

#[derive(Debug, Clone, Copy)]
enum ProgressMode {
    Hidden,
    Visible { colored: bool },
}

pub struct PipelineComposer {
    pipeline: Pipeline,
    drivers: Vec<Arc<dyn StageDriver>>,
    writer: Option<DocumentWriter>,
    write_failed: bool,
    parallel_workers: usize,
    skip_verification: bool,
    progress: ProgressMode,
}

impl PipelineComposer {
    /// Binds every stage to its driver. Unknown engines or bad stage
    /// settings fail here, before any document is touched.
    pub fn from_config(pipeline: Pipeline, config: &Config) -> Result<Self> {
        let drivers = pipeline
            .stages()
            .iter()
            .map(|stage| build_driver(stage, &config.remote))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::with_drivers(pipeline, drivers)?
            .with_parallel_workers(config.pipeline.parallel_workers)
            .skip_verification(config.pipeline.skip_verification))
    }

    pub fn with_drivers(pipeline: Pipeline, drivers: Vec<Arc<dyn StageDriver>>) -> Result<Self> {
        if drivers.len() != pipeline.len() {
            return Err(PipelineError::Config(format!(
                "pipeline {} has {} stages but {} drivers",
                pipeline.name(),
                pipeline.len(),
                drivers.len()
            )));
        }

        for (stage, driver) in pipeline.stages().iter().zip(&drivers) {
            if stage.name != driver.name() {
                return Err(PipelineError::Config(format!(
                    "driver {} bound to stage {}",
                    driver.name(),
                    stage.name
                )));
            }
        }

        Ok(Self {
            pipeline,
            drivers,
            writer: None,
            write_failed: true,
            parallel_workers: 1,
            skip_verification: false,
            progress: ProgressMode::Hidden,
        })
    }

    pub fn with_writer(mut self, writer: DocumentWriter, write_failed: bool) -> Self {
        self.writer = Some(writer);
        self.write_failed = write_failed;
        self
    }

    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    pub fn skip_verification(mut self, skip: bool) -> Self {
        self.skip_verification = skip;
        self
    }

    pub fn with_progress(mut self, colored: bool) -> Self {
        self.progress = ProgressMode::Visible { colored };
        self
    }

    /// Starts each driver, collects its health and tears it down again.
    pub async fn verify(&self) -> HealthReport {
        let mut checks = Vec::with_capacity(self.drivers.len());

        for driver in &self.drivers {
            let check = match driver.start().await {
                Ok(()) => driver.health_check().await,
                Err(e) => HealthCheck::unhealthy(driver.name(), e.to_string(), Duration::ZERO),
            };
            checks.push(check);
        }

        self.shutdown_all(self.drivers.len()).await;
        HealthReport::new(checks, self.pipeline.name().to_string())
    }

    pub async fn run(&self, documents: Vec<Document>) -> Result<RunResult> {
        info!(
            "Running pipeline {} ({} stages) over {} documents",
            self.pipeline.name(),
            self.pipeline.len(),
            documents.len()
        );

        self.start_all().await?;

        let progress = match self.progress {
            ProgressMode::Hidden => ProgressTracker::hidden(documents.len()),
            ProgressMode::Visible { colored } => {
                ProgressTracker::with_color(documents.len(), colored)
            }
        };

        info!(
            "Processing documents with {} concurrent workers",
            self.parallel_workers
        );

        let mut indexed: Vec<(usize, DocumentResult)> =
            stream::iter(documents.into_iter().enumerate())
                .map(|(index, document)| {
                    let progress = &progress;
                    async move { (index, self.process_document(document, progress).await) }
                })
                .buffer_unordered(self.parallel_workers)
                .collect()
                .await;

        self.shutdown_all(self.drivers.len()).await;

        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<DocumentResult> = indexed.into_iter().map(|(_, r)| r).collect();

        if let Some(writer) = &self.writer {
            let written: Vec<PathBuf> = results.iter().filter_map(|r| r.output.clone()).collect();
            let failed = results.iter().filter(|r| r.is_failed()).count();
            if let Err(e) = writer.write_manifest(self.pipeline.name(), &written, failed) {
                error!("Failed to write manifest: {}", e);
            }
        }

        let stats = progress.get_stats();
        progress.finish();
        self.log_final_stats(&stats);

        Ok(RunResult { results, stats })
    }

    async fn start_all(&self) -> Result<()> {
        for (started, driver) in self.drivers.iter().enumerate() {
            if let Err(e) = driver.start().await {
                error!("Stage {} failed to start: {}", driver.name(), e);
                self.shutdown_all(started + 1).await;
                return Err(e);
            }
        }

        if self.skip_verification {
            debug!("Skipping stage verification");
            return Ok(());
        }

        for driver in &self.drivers {
            let check = driver.health_check().await;
            if !check.is_healthy() {
                self.shutdown_all(self.drivers.len()).await;
                return Err(PipelineError::driver(
                    driver.name(),
                    format!(
                        "health check failed: {}",
                        check.message.unwrap_or_else(|| "unknown".to_string())
                    ),
                ));
            }
        }

        Ok(())
    }

    async fn shutdown_all(&self, count: usize) {
        for driver in self.drivers.iter().take(count) {
            if let Err(e) = driver.shutdown().await {
                warn!("Stage {} did not shut down cleanly: {}", driver.name(), e);
            }
        }
    }

    async fn process_document(
        &self,
        mut document: Document,
        progress: &ProgressTracker,
    ) -> DocumentResult {
        for (stage, driver) in self.pipeline.stages().iter().zip(&self.drivers) {
            if document.is_failed() {
                break;
            }

            // Remote drivers apply the stage timeout per call.
            let outcome = match (driver.kind(), stage.timeout) {
                (DriverKind::Local, Some(limit)) => {
                    match tokio::time::timeout(limit, driver.process(&document)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(PipelineError::Timeout {
                            stage: stage.name.clone(),
                            timeout_ms: limit.as_millis() as u64,
                            attempts: 1,
                        }),
                    }
                }
                _ => driver.process(&document).await,
            };

            match outcome {
                Ok(annotations) => {
                    progress.add_annotations(annotations.len());
                    document.extend_annotations(annotations);
                }
                Err(e) => {
                    warn!(
                        "Document {} failed at stage {}: {}",
                        document.id(),
                        stage.name,
                        e
                    );
                    document.mark_failed(&stage.name, e.to_string(), e.attempts());
                }
            }
        }

        let output = self.persist(&mut document);

        if document.is_failed() {
            progress.inc_failed();
        } else {
            progress.inc_completed();
        }

        DocumentResult { document, output }
    }

    fn persist(&self, document: &mut Document) -> Option<PathBuf> {
        let writer = self.writer.as_ref()?;

        if document.is_failed() && !self.write_failed {
            return None;
        }

        match writer.write(document) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Failed to write document {}: {}", document.id(), e);
                document.mark_failed(WRITER_STAGE, e.to_string(), 1);
                None
            }
        }
    }

    fn log_final_stats(&self, stats: &PipelineStats) {
        info!("=== Pipeline Execution Summary ===");
        info!("Pipeline: {}", self.pipeline.name());
        info!("Duration: {:.2} seconds", stats.duration_secs);
        info!("Documents completed: {}", stats.documents_completed);
        info!("Documents failed: {}", stats.documents_failed);
        info!("Success rate: {:.2}%", stats.success_rate());
        info!("Annotations created: {}", stats.annotations_created);
        info!(
            "Processing speed: {:.2} documents/sec",
            stats.documents_per_second()
        );
        info!("=================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::drivers::{LocalDriver, LocalEngine};
    use crate::models::{Annotation, Stage};
    use crate::writer::read_document;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    struct RejectingEngine;

    impl LocalEngine for RejectingEngine {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn analyze(&self, document: &Document, stage: &Stage) -> Result<Vec<Annotation>> {
            if document.id().starts_with("bad") {
                return Err(PipelineError::driver(&stage.name, "cannot analyze"));
            }
            Ok(vec![Annotation::new(&stage.name, "checked", json!(true))])
        }
    }

    struct SlowEngine;

    impl LocalEngine for SlowEngine {
        fn name(&self) -> &str {
            "slow"
        }

        fn analyze(&self, _document: &Document, _stage: &Stage) -> Result<Vec<Annotation>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![])
        }
    }

    fn stage(config: StageConfig) -> Stage {
        Stage::from_config(&config, &Config::default_config().remote)
    }

    fn doc(id: &str, text: &str) -> Document {
        Document::new(id.into(), text.into(), "de".into(), format!("Mail_{id}"))
    }

    fn three_stage_composer() -> PipelineComposer {
        let seg = stage(StageConfig::local("seg", "sentence_splitter"));
        let check = stage(StageConfig::local("check", "rejecting"));
        let count = stage(StageConfig::local("count", "token_counter"));

        let drivers: Vec<Arc<dyn StageDriver>> = vec![
            Arc::new(LocalDriver::new(seg.clone()).unwrap()),
            Arc::new(LocalDriver::with_engine(check.clone(), Arc::new(RejectingEngine))),
            Arc::new(LocalDriver::new(count.clone()).unwrap()),
        ];
        let pipeline = Pipeline::new("test", vec![seg, check, count]).unwrap();
        PipelineComposer::with_drivers(pipeline, drivers)
            .unwrap()
            .with_parallel_workers(4)
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let composer = three_stage_composer();
        let run = composer.run(vec![doc("1", "Eins. Zwei.")]).await.unwrap();

        let stages: Vec<&str> = run.results[0]
            .document
            .annotations()
            .iter()
            .map(|a| a.stage.as_str())
            .collect();
        assert_eq!(stages, vec!["seg", "seg", "check", "count"]);
        assert_eq!(run.stats.documents_completed, 1);
        assert_eq!(run.stats.annotations_created, 4);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_document() {
        let composer = three_stage_composer();
        let docs = vec![doc("1", "Gut."), doc("bad-2", "Schlecht."), doc("3", "Auch gut.")];

        let run = composer.run(docs).await.unwrap();
        let ids: Vec<&str> = run.results.iter().map(|r| r.document.id()).collect();
        assert_eq!(ids, vec!["1", "bad-2", "3"]);

        let failed = &run.results[1];
        let failure = failed.failure().unwrap();
        assert_eq!(failure.stage, "check");
        assert_eq!(failed.document.annotations_of("token_count").count(), 0);
        assert_eq!(failed.document.annotations_of("sentence").count(), 1);

        assert!(!run.results[0].is_failed());
        assert!(!run.results[2].is_failed());
        assert_eq!(run.results[2].document.annotations_of("token_count").count(), 1);
        assert_eq!(run.stats.documents_failed, 1);
        assert_eq!(run.stats.documents_completed, 2);
    }

    #[tokio::test]
    async fn test_local_stage_timeout() {
        let mut slow = stage(StageConfig::local("slow", "slow"));
        slow.timeout = Some(Duration::from_millis(20));
        let drivers: Vec<Arc<dyn StageDriver>> =
            vec![Arc::new(LocalDriver::with_engine(slow.clone(), Arc::new(SlowEngine)))];
        let composer =
            PipelineComposer::with_drivers(Pipeline::new("t", vec![slow]).unwrap(), drivers)
                .unwrap();

        let run = composer.run(vec![doc("1", "x")]).await.unwrap();
        let failure = run.results[0].failure().unwrap();
        assert_eq!(failure.stage, "slow");
        assert!(failure.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_writer_persists_failed_when_enabled() {
        let dir = TempDir::new().unwrap();
        let config = Config::default_config();
        let writer = DocumentWriter::new(dir.path(), "mail_", &config.writer).unwrap();

        let run = three_stage_composer()
            .with_writer(writer, true)
            .run(vec![doc("1", "Gut."), doc("bad-2", "Schlecht.")])
            .await
            .unwrap();

        assert!(run.results.iter().all(|r| r.output.is_some()));
        let stored = read_document(&dir.path().join("mail_bad-2.json")).unwrap();
        assert_eq!(stored.failure().unwrap().stage, "check");
        assert!(dir.path().join(crate::writer::MANIFEST_FILE).exists());
    }

    #[tokio::test]
    async fn test_writer_skips_failed_when_disabled() {
        let dir = TempDir::new().unwrap();
        let config = Config::default_config();
        let writer = DocumentWriter::new(dir.path(), "mail_", &config.writer).unwrap();

        let run = three_stage_composer()
            .with_writer(writer, false)
            .run(vec![doc("1", "Gut."), doc("bad-2", "Schlecht.")])
            .await
            .unwrap();

        assert!(run.results[0].output.is_some());
        assert!(run.results[1].output.is_none());
        assert!(!dir.path().join("mail_bad-2.json").exists());
    }

    #[tokio::test]
    async fn test_unreachable_remote_aborts_run() {
        let mut config = Config::default_config();
        config.remote.startup_timeout_secs = 0;
        config.stages = vec![StageConfig::remote("topics", "http://127.0.0.1:1")];
        let pipeline = Pipeline::from_config(&config).unwrap();
        let composer = PipelineComposer::from_config(pipeline, &config).unwrap();

        assert!(composer.run(vec![doc("1", "x")]).await.is_err());

        let report = composer.verify().await;
        assert_eq!(report.checks.len(), 1);
        assert!(!report.checks[0].is_healthy());
    }

    #[tokio::test]
    async fn test_unknown_engine_fails_composition() {
        let mut config = Config::default_config();
        config.stages = vec![StageConfig::local("nlp", "spacy")];
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert!(PipelineComposer::from_config(pipeline, &config).is_err());
    }

    #[test]
    fn test_driver_count_must_match() {
        let seg = stage(StageConfig::local("seg", "sentence_splitter"));
        let pipeline = Pipeline::new("p", vec![seg]).unwrap();
        assert!(PipelineComposer::with_drivers(pipeline, vec![]).is_err());
    }
}
