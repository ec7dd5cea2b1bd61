// file: src/writer/mod.rs
// description: result writer module exports
// reference: internal module structure

pub mod json;

pub use json::{DocumentWriter, ExportManifest, MANIFEST_FILE, read_document};
