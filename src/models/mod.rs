// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod document;
pub mod stage;

pub use document::{Annotation, Document, DocumentMetadata, StageFailure};
pub use stage::{DriverKind, Pipeline, Stage};
