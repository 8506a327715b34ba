// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Error type returned by the ingestion engine.
///
/// Only whole-file failures live here. Per-table and per-row problems
/// (no identity column, invalid serial values, rejected customer fields)
/// are handled internally: logged, counted in the run summary, and never
/// surfaced to the caller.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Workbook could not be opened or read.
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// Slide deck container could not be opened or read.
    #[error("deck error: {0}")]
    Deck(#[from] zip::result::ZipError),

    /// The file extension is not one of the supported source formats.
    #[error("unsupported source format: {path}")]
    UnsupportedSource { path: PathBuf },

    /// The whole file yielded no canonical assets: either no table had a
    /// detectable identity column, or every row failed identity validation.
    #[error("no assets could be extracted from '{file}': no usable identity column or values found")]
    NoAssets { file: String },
}
