// file: src/writer/json.rs
// description: per-document json / gzip json persistence and run manifest
// reference: https://docs.rs/flate2

use crate::config::{WriterConfig, WriterFormat};
use crate::error::{PipelineError, Result};
use crate::models::Document;
use chrono::Utc;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone)]
pub struct DocumentWriter {
    output_dir: PathBuf,
    file_prefix: String,
    format: WriterFormat,
    pretty: bool,
    overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub run_id: Uuid,
    pub exported_at: String,
    pub pipeline: String,
    pub total_documents: usize,
    pub failed_documents: usize,
    pub files: Vec<String>,
}

impl DocumentWriter {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        file_prefix: &str,
        config: &WriterConfig,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|source| PipelineError::FileOperation {
            path: output_dir.clone(),
            source,
        })?;

        Ok(Self {
            output_dir,
            file_prefix: file_prefix.to_string(),
            format: config.format,
            pretty: config.pretty,
            overwrite: config.overwrite,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}{}.{}",
            self.file_prefix,
            id,
            self.format.extension()
        ))
    }

    pub fn write(&self, document: &Document) -> Result<PathBuf> {
        let path = self.path_for(document.id());

        if !self.overwrite && path.exists() {
            return Err(PipelineError::Validation(format!(
                "Refusing to overwrite existing file: {}",
                path.display()
            )));
        }

        let file = File::create(&path).map_err(|source| PipelineError::FileOperation {
            path: path.clone(),
            source,
        })?;

        match self.format {
            WriterFormat::Json => {
                let mut writer = BufWriter::new(file);
                self.encode(&mut writer, document)?;
                writer.flush()?;
            }
            WriterFormat::JsonGz => {
                let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
                self.encode(&mut encoder, document)?;
                encoder.finish()?.flush()?;
            }
        }

        debug!("Wrote document {} to {}", document.id(), path.display());
        Ok(path)
    }

    fn encode<W: Write>(&self, writer: &mut W, document: &Document) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(writer, document)?;
        } else {
            serde_json::to_writer(writer, document)?;
        }
        Ok(())
    }

    pub fn write_manifest(
        &self,
        pipeline: &str,
        files: &[PathBuf],
        failed_documents: usize,
    ) -> Result<ExportManifest> {
        let mut names: Vec<String> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();
        names.sort();

        let manifest = ExportManifest {
            run_id: Uuid::new_v4(),
            exported_at: Utc::now().to_rfc3339(),
            pipeline: pipeline.to_string(),
            total_documents: names.len(),
            failed_documents,
            files: names,
        };

        let path = self.output_dir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, content).map_err(|source| PipelineError::FileOperation { path, source })?;

        info!(
            "Export {} complete: {} documents written to {}",
            manifest.run_id,
            manifest.total_documents,
            self.output_dir.display()
        );
        Ok(manifest)
    }
}

/// Reads a document written by [`DocumentWriter`], picking the codec from the extension.
pub fn read_document(path: &Path) -> Result<Document> {
    let file = File::open(path).map_err(|source| PipelineError::FileOperation {
        path: path.to_path_buf(),
        source,
    })?;

    let is_gzip = path
        .file_name()
        .map(|n| n.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false);

    let document = if is_gzip {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };

    Ok(document)
}
