// src/source/workbook.rs
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, warn};

use crate::error::IngestResult;
use crate::source::header;
use crate::source::{RawTable, SourceKind, TableOrigin};

/// Load every sheet of a workbook into a [`RawTable`].
///
/// Sheets are returned in workbook order; nothing is skipped here (name
/// patterns and row ceilings are run policy, applied by the caller).
/// A sheet that fails to read is logged and dropped rather than failing
/// the whole file.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_workbook<P: AsRef<Path>>(path: P) -> IngestResult<Vec<RawTable>> {
    let mut workbook = open_workbook_auto(path.as_ref())?;
    let sheet_names = workbook.sheet_names().to_vec();

    let mut tables = Vec::with_capacity(sheet_names.len());
    for sheet_name in sheet_names {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(range) => range,
            Err(e) => {
                warn!(sheet = %sheet_name, error = %e, "Failed to read sheet, skipping");
                continue;
            }
        };

        // row offset of the used range, so provenance reports true sheet rows
        let range_start_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        let grid: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        if grid.iter().all(|row| row.iter().all(|c| c.is_empty())) {
            debug!(sheet = %sheet_name, "Sheet has no content, skipping");
            continue;
        }

        let split = header::split_header_and_rows(grid);
        let first_data_row = range_start_row + split.first_data_row + 1;
        debug!(
            sheet = %sheet_name,
            columns = split.columns.len(),
            rows = split.rows.len(),
            first_data_row,
            "Loaded sheet"
        );

        tables.push(RawTable {
            columns: split.columns,
            rows: split.rows,
            origin: TableOrigin {
                kind: SourceKind::Worksheet,
                sheet: sheet_name,
                first_data_row,
            },
        });
    }

    Ok(tables)
}

/// Render one cell to the engine's string form. Integral floats print
/// without the trailing `.0` so numeric serials keep their exact digits;
/// date cells print as ISO datetimes; error cells render empty so formula
/// junk never lands in a merged field map.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{:.0}", f)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => naive.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.to_string(),
        },
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}
