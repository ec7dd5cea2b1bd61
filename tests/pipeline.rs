// file: tests/pipeline.rs
// description: end to end run from csv rows to annotated document files
// reference: integration tests over the public api

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use doc_composer::config::WriterFormat;
use doc_composer::writer::MANIFEST_FILE;
use doc_composer::{
    Config, CsvLoader, DocumentReader, DocumentWriter, ExportManifest, Pipeline,
    PipelineComposer, StageConfig, read_document,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tokio::net::TcpListener;

const EMAILS: &str = "\
id,text
1,\"Guten Tag. Die Rechnung ist bezahlt!\"
2,Termin am Montag? Bitte bestätigen.
broken-row-without-text
3,\"Mehrzeilige
Nachricht mit Fehler im Konto.\"
2,duplicate id
4,Kurz
";

fn setup(config: &Config) -> TempDir {
    let root = TempDir::new().unwrap();
    fs::write(config.csv_path(root.path()), EMAILS).unwrap();
    root
}

fn convert(config: &Config, root: &Path) -> usize {
    let writer =
        DocumentWriter::new(config.raw_dir(root), &config.input.file_prefix, &config.writer)
            .unwrap();
    let report = CsvLoader::new(&config.input)
        .convert(&config.csv_path(root), &writer)
        .unwrap();
    assert_eq!(report.errors.len(), 2);
    report.written.len()
}

fn composer(config: &Config, root: &Path) -> PipelineComposer {
    let writer = DocumentWriter::new(
        config.annotated_dir(root),
        &config.input.file_prefix,
        &config.writer,
    )
    .unwrap();
    let pipeline = Pipeline::from_config(config).unwrap();
    PipelineComposer::from_config(pipeline, config)
        .unwrap()
        .with_writer(writer, config.writer.write_failed)
}

#[test]
fn test_convert_writes_one_file_per_valid_row() {
    let config = Config::default_config();
    let root = setup(&config);

    assert_eq!(convert(&config, root.path()), 4);

    let raw_dir = config.raw_dir(root.path());
    for id in ["1", "2", "3", "4"] {
        let document = read_document(&raw_dir.join(format!("mail_{}.json", id))).unwrap();
        assert_eq!(document.id(), id);
        assert_eq!(document.language(), "de");
        assert_eq!(document.metadata().title, format!("Mail_{}", id));
    }

    let multiline = read_document(&raw_dir.join("mail_3.json")).unwrap();
    assert_eq!(multiline.text(), "Mehrzeilige\nNachricht mit Fehler im Konto.");

    let second = read_document(&raw_dir.join("mail_2.json")).unwrap();
    assert_eq!(second.text(), "Termin am Montag? Bitte bestätigen.");
}

#[tokio::test]
async fn test_local_pipeline_end_to_end() {
    let mut config = Config::default_config();
    config.stages.push(
        StageConfig::local("keywords", "keyword_topics")
            .with_parameter("topic.finance", "rechnung, konto")
            .with_parameter("topic.meeting", "termin"),
    );
    let root = setup(&config);
    convert(&config, root.path());

    let reader = DocumentReader::new(&config.pipeline.patterns).unwrap();
    let read = reader.load(&config.raw_dir(root.path())).unwrap();
    assert_eq!(read.documents.len(), 4);

    let run = composer(&config, root.path())
        .run(read.documents)
        .await
        .unwrap();

    assert_eq!(run.stats.documents_completed, 4);
    assert_eq!(run.stats.documents_failed, 0);

    let annotated = config.annotated_dir(root.path());
    let first = read_document(&annotated.join("mail_1.json")).unwrap();
    assert_eq!(first.text(), "Guten Tag. Die Rechnung ist bezahlt!");

    let stages: Vec<&str> = first.annotations().iter().map(|a| a.stage.as_str()).collect();
    let first_counter = stages.iter().position(|s| *s == "token-stats").unwrap();
    let first_topic = stages.iter().position(|s| *s == "keywords").unwrap();
    assert!(stages[..first_counter].iter().all(|s| *s == "segmenter"));
    assert!(first_counter < first_topic);
    assert_eq!(first.annotations_of("sentence").count(), 2);

    let topics: Vec<&Value> = first.annotations_of("topic").map(|a| &a.data["topic"]).collect();
    assert_eq!(topics, vec![&json!("finance")]);

    let manifest: ExportManifest =
        serde_json::from_str(&fs::read_to_string(annotated.join(MANIFEST_FILE)).unwrap())
            .unwrap();
    assert_eq!(manifest.total_documents, 4);
    assert_eq!(manifest.failed_documents, 0);
}

#[tokio::test]
async fn test_reader_patterns_limit_selection() {
    let mut config = Config::default_config();
    config.pipeline.patterns = vec!["[+]*.json*".to_string(), "[-]mail_1*".to_string()];
    let root = setup(&config);
    convert(&config, root.path());

    let reader = DocumentReader::new(&config.pipeline.patterns).unwrap();
    let mut ids: Vec<String> = reader
        .load(&config.raw_dir(root.path()))
        .unwrap()
        .documents
        .iter()
        .map(|d| d.id().to_string())
        .collect();
    ids.sort();

    assert_eq!(ids, vec!["2", "3", "4"]);
}

async fn reject_short_texts(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let text = body["document"]["text"].as_str().unwrap_or_default();
    if text.chars().count() < 10 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "text too short" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "annotations": [{ "kind": "sentiment", "data": { "label": "neutral" } }]
        })),
    )
}

#[tokio::test]
async fn test_remote_failure_is_isolated_per_document() {
    let app = Router::new()
        .route("/v1/health", get(|| async { "ok" }))
        .route("/v1/process", post(reject_short_texts));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = Config::default_config();
    config.writer.format = WriterFormat::JsonGz;
    config.remote.retry_backoff_ms = 1;
    config.stages = vec![
        StageConfig::remote("sentiment", &url),
        StageConfig::local("token-stats", "token_counter"),
    ];
    let root = setup(&config);
    convert(&config, root.path());

    let read = DocumentReader::new(&config.pipeline.patterns)
        .unwrap()
        .load(&config.raw_dir(root.path()))
        .unwrap();
    let run = composer(&config, root.path())
        .run(read.documents)
        .await
        .unwrap();

    assert_eq!(run.stats.documents_completed, 3);
    assert_eq!(run.stats.documents_failed, 1);

    let annotated = config.annotated_dir(root.path());
    let short = read_document(&annotated.join("mail_4.json.gz")).unwrap();
    let failure = short.failure().unwrap();
    assert_eq!(failure.stage, "sentiment");
    assert_eq!(failure.attempts, 1);
    assert!(short.annotations().is_empty());

    let long = read_document(&annotated.join("mail_1.json.gz")).unwrap();
    assert!(long.failure().is_none());
    assert_eq!(long.annotations_of("sentiment").count(), 1);
    assert_eq!(long.annotations_of("token_count").count(), 1);
}

#[tokio::test]
async fn test_in_place_rerun_starts_from_source() {
    let mut config = Config::default_config();
    config.writer.output_dir = config.input.raw_dir.clone();
    let root = setup(&config);
    convert(&config, root.path());

    let raw_dir = config.raw_dir(root.path());
    let mut counts = Vec::new();

    for _ in 0..2 {
        let read = DocumentReader::new(&config.pipeline.patterns)
            .unwrap()
            .load(&raw_dir)
            .unwrap();
        assert_eq!(read.documents.len(), 4);

        let run = composer(&config, root.path())
            .run(read.documents)
            .await
            .unwrap();
        assert_eq!(run.stats.documents_failed, 0);

        counts.push(read_document(&raw_dir.join("mail_1.json")).unwrap().annotations().len());
    }

    assert_eq!(counts[0], counts[1]);
    assert_eq!(counts[0], 3);
}
