// file: src/models/document.rs
// description: core document model with append-only annotations and failure marker
// reference: internal data structures

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub uri: String,
    pub base_uri: String,
    pub begin: usize,
    pub end: usize,
    pub content_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub stage: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
    #[serde(default)]
    pub data: serde_json::Value,
    pub created_at: String,
}

impl Annotation {
    pub fn new(stage: &str, kind: &str, data: serde_json::Value) -> Self {
        Self {
            stage: stage.to_string(),
            kind: kind.to_string(),
            begin: None,
            end: None,
            data,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn spanning(mut self, begin: usize, end: usize) -> Self {
        self.begin = Some(begin);
        self.end = Some(end);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    pub message: String,
    pub attempts: u32,
}

/// A unit of text moving through the pipeline.
///
/// The id is fixed at construction and annotations can only be appended,
/// so fields are private and exposed through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    text: String,
    language: String,
    metadata: DocumentMetadata,
    #[serde(default)]
    annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<StageFailure>,
}

impl Document {
    pub fn new(id: String, text: String, language: String, title: String) -> Self {
        let content_hash = Self::compute_hash(&text);
        let end = text.chars().count();

        Self {
            id,
            text,
            language,
            metadata: DocumentMetadata {
                title,
                uri: String::new(),
                base_uri: String::new(),
                begin: 0,
                end,
                content_hash,
                created_at: Utc::now().to_rfc3339(),
            },
            annotations: Vec::new(),
            failure: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn set_location(&mut self, uri: String, base_uri: String) {
        self.metadata.uri = uri;
        self.metadata.base_uri = base_uri;
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    pub fn extend_annotations(&mut self, annotations: impl IntoIterator<Item = Annotation>) {
        self.annotations.extend(annotations);
    }

    /// First failure wins; later calls are ignored.
    pub fn mark_failed(&mut self, stage: &str, message: String, attempts: u32) {
        if self.failure.is_none() {
            self.failure = Some(StageFailure {
                stage: stage.to_string(),
                message,
                attempts,
            });
        }
    }

    /// Drops annotations and the failure marker left by an earlier run,
    /// keeping id, text, language and metadata.
    pub fn into_source(mut self) -> Self {
        self.annotations.clear();
        self.failure = None;
        self
    }

    pub fn annotations_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Annotation> {
        self.annotations.iter().filter(move |a| a.kind == kind)
    }

    fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
