// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use doc_composer::utils::logging::{format_error, format_step, format_success, format_warning};
use doc_composer::{
    Config, CsvLoader, DocumentReader, DocumentWriter, OperationTimer, Pipeline,
    PipelineComposer, Validator,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "doc_composer")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Converts csv rows into documents and runs them through an annotation pipeline", long_about = None)]
struct Cli {
    /// Directory holding the input csv; output directories are created here
    #[arg(value_name = "ROOT")]
    root: PathBuf,

    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the csv, then run the pipeline (default)
    Run,

    /// Convert csv rows into raw document files only
    Convert,

    /// Run the pipeline over previously converted documents
    Process,

    /// Start every stage and report its health
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    doc_composer::utils::logging::init_logger(cli.color, cli.verbose);

    info!("Document Composer Pipeline");
    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::default_config()
    };

    Validator::validate_directory(&cli.root)
        .with_context(|| format!("Invalid root directory {}", cli.root.display()))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            println!("{}", format_step(1, 2, "Converting csv rows"));
            cmd_convert(&config, &cli.root)?;
            println!("{}", format_step(2, 2, "Running pipeline"));
            cmd_process(&config, &cli.root, cli.color).await?;
        }
        Commands::Convert => {
            cmd_convert(&config, &cli.root)?;
        }
        Commands::Process => {
            cmd_process(&config, &cli.root, cli.color).await?;
        }
        Commands::Verify => {
            cmd_verify(&config).await?;
        }
    }

    Ok(())
}

fn cmd_convert(config: &Config, root: &Path) -> Result<()> {
    let timer = OperationTimer::new("convert");
    let csv_path = config.csv_path(root);
    let raw_dir = config.raw_dir(root);

    let writer = DocumentWriter::new(&raw_dir, &config.input.file_prefix, &config.writer)
        .context("Failed to prepare raw document directory")?;
    let report = CsvLoader::new(&config.input)
        .convert(&csv_path, &writer)
        .with_context(|| format!("Failed to convert {}", csv_path.display()))?;

    timer.finish_with_count(report.written.len());

    for row in &report.errors {
        warn!("Skipped row at line {}: {}", row.line, row.reason);
    }

    let summary = format!(
        "Converted {} rows into {}",
        report.written.len(),
        raw_dir.display()
    );
    if report.errors.is_empty() {
        println!("{}", format_success(&summary));
    } else {
        println!(
            "{}",
            format_warning(&format!("{} ({} rows skipped)", summary, report.errors.len()))
        );
    }

    Ok(())
}

async fn cmd_process(config: &Config, root: &Path, color: bool) -> Result<()> {
    let timer = OperationTimer::new("process");
    let raw_dir = config.raw_dir(root);
    let annotated_dir = config.annotated_dir(root);

    let reader = DocumentReader::new(&config.pipeline.patterns)
        .context("Invalid reader patterns")?;
    let read = reader
        .load(&raw_dir)
        .with_context(|| format!("Failed to read documents from {}", raw_dir.display()))?;

    for (path, reason) in &read.failed {
        warn!("Could not read {}: {}", path.display(), reason);
    }

    if read.documents.is_empty() {
        println!(
            "{}",
            format_warning(&format!("No documents selected under {}", raw_dir.display()))
        );
        return Ok(());
    }

    let pipeline = Pipeline::from_config(config).context("Invalid pipeline definition")?;
    let writer = DocumentWriter::new(&annotated_dir, &config.input.file_prefix, &config.writer)
        .context("Failed to prepare output directory")?;

    let composer = PipelineComposer::from_config(pipeline, config)
        .context("Failed to bind pipeline stages")?
        .with_writer(writer, config.writer.write_failed)
        .with_progress(color);

    let run = composer.run(read.documents).await.context("Pipeline run failed")?;

    timer.finish_with_count(run.results.len());

    for result in run.results.iter().filter(|r| r.is_failed()) {
        if let Some(failure) = result.failure() {
            error!(
                "Document {} failed at stage {}: {}",
                result.document.id(),
                failure.stage,
                failure.message
            );
        }
    }

    let summary = format!(
        "{} documents processed, {} failed, {} annotations ({:.1}% success)",
        run.stats.total_documents(),
        run.stats.documents_failed,
        run.stats.annotations_created,
        run.stats.success_rate()
    );
    if run.stats.documents_failed == 0 {
        println!("{}", format_success(&summary));
    } else {
        println!("{}", format_warning(&summary));
    }

    Ok(())
}

async fn cmd_verify(config: &Config) -> Result<()> {
    info!("Verifying pipeline stages");

    let pipeline = Pipeline::from_config(config).context("Invalid pipeline definition")?;
    let composer = PipelineComposer::from_config(pipeline, config)
        .context("Failed to bind pipeline stages")?;

    let report = composer.verify().await;
    println!("{}", report.format());

    if report.is_healthy() {
        println!("{}", format_success("All stages are ready"));
        Ok(())
    } else {
        println!("{}", format_error("One or more stages are unavailable"));
        Err(anyhow::anyhow!("Stage verification failed"))
    }
}
