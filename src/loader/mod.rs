// file: src/loader/mod.rs
// description: document loading from csv input and from converted document files
// reference: internal module structure

mod csv_input;
mod reader;

pub use csv_input::{ConversionReport, CsvLoader, LoadReport, RowError};
pub use reader::{DocumentReader, ReadReport};
