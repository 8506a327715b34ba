// src/source/mod.rs
pub mod deck;
pub mod header;
pub mod workbook;

use std::path::Path;

use serde::Serialize;

use crate::error::{IngestError, IngestResult};
pub use deck::OcrEngine;
pub use header::normalize_name;

/// Which reader produced a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Worksheet,
    SlideTable,
    SlideText,
    OcrText,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Worksheet => "worksheet",
            SourceKind::SlideTable => "slide_table",
            SourceKind::SlideText => "slide_text",
            SourceKind::OcrText => "ocr_text",
        }
    }
}

/// Provenance of one table within its source file.
#[derive(Debug, Clone)]
pub struct TableOrigin {
    pub kind: SourceKind,
    /// Sheet name, or a slide label like `"Slide 3"`.
    pub sheet: String,
    /// 1-based row number (within the sheet) of the first data row.
    pub first_data_row: usize,
}

/// One table of string cells as it came off disk: ordered column names
/// (possibly blank or duplicated) and data rows, plus provenance.
#[derive(Debug)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub origin: TableOrigin,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.iter().all(|c| c.trim().is_empty())
    }

    /// Index of the column whose normalized name equals `name`'s.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = normalize_name(name);
        self.columns
            .iter()
            .position(|c| normalize_name(c) == wanted)
    }

    /// 1-based sheet row for the data row at `data_idx`.
    pub fn sheet_row(&self, data_idx: usize) -> usize {
        self.origin.first_data_row + data_idx
    }

    /// Non-empty trimmed values of one column.
    pub fn column_values(&self, col_idx: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(col_idx))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Extensions the engine accepts.
static WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub fn is_supported_path(path: &Path) -> bool {
    match extension_of(path) {
        Some(ext) => WORKBOOK_EXTENSIONS.contains(&ext.as_str()) || ext == "pptx",
        None => false,
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Read every table a file contains, dispatching on its extension.
///
/// `ocr` is consulted by the deck reader for picture-only slides; pass
/// `None` to skip OCR entirely.
pub fn load_tables(path: &Path, ocr: Option<&dyn OcrEngine>) -> IngestResult<Vec<RawTable>> {
    let ext = extension_of(path).ok_or_else(|| IngestError::UnsupportedSource {
        path: path.to_path_buf(),
    })?;

    if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        workbook::load_workbook(path)
    } else if ext == "pptx" {
        deck::load_deck(path, ocr)
    } else {
        Err(IngestError::UnsupportedSource {
            path: path.to_path_buf(),
        })
    }
}
