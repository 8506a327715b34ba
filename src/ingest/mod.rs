// src/ingest/mod.rs
//
// Run orchestration. One IngestRun owns one IdentityIndex and feeds it
// file by file: load tables, apply sheet policy, classify the file's
// column union once, then fold every row into the index. Files within a
// run are sequential so later sheets observe accumulated state.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{classify_columns, Classification, HttpOracle, RoleOracle};
use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::identity::{contains_identity_shape, detect_identity_column};
use crate::merge::{CanonicalAsset, IdentityIndex};
use crate::record::{build_draft, customer_from_filename, RowContext};
use crate::source::{load_tables, OcrEngine, RawTable};

/// Column names that inherit values downward when merged cells leave
/// blanks under the first row of a block.
static CUSTOMER_FILL_MARKERS: &[&str] = &[
    "customer",
    "client",
    "end_customer",
    "end customer",
    "customer_name",
    "customer name",
    "客户",
    "cust",
];

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Files that produced at least one draft.
    pub files: usize,
    pub tables_seen: usize,
    /// Skipped by name pattern, row ceiling, emptiness, or a missing
    /// identity column.
    pub tables_skipped: usize,
    pub rows_accepted: usize,
    /// Rows whose identity cell failed extraction or validation.
    pub rows_rejected: usize,
    pub customers_rejected: usize,
    pub assets: usize,
    pub components_folded: usize,
    /// Files classified by the oracle rather than the local rules.
    pub oracle_files: usize,
}

/// One ingestion run. Owns the accumulating index; borrows its
/// collaborators (classification oracle, OCR engine) from the caller.
pub struct IngestRun<'a, O: RoleOracle> {
    config: IngestConfig,
    oracle: Option<&'a O>,
    ocr: Option<&'a dyn OcrEngine>,
    index: IdentityIndex,
    summary: RunSummary,
}

impl IngestRun<'static, HttpOracle> {
    /// A run with local-only classification and no OCR.
    pub fn without_oracle(config: IngestConfig) -> Self {
        IngestRun::new(config, None, None)
    }
}

impl<'a, O: RoleOracle> IngestRun<'a, O> {
    pub fn new(
        config: IngestConfig,
        oracle: Option<&'a O>,
        ocr: Option<&'a dyn OcrEngine>,
    ) -> Self {
        IngestRun {
            config,
            oracle,
            ocr,
            index: IdentityIndex::new(),
            summary: RunSummary::default(),
        }
    }

    /// Ingest one source file into the run. Returns how many rows were
    /// folded in; a file that yields none is an error, a file where only
    /// some tables or rows fail is not.
    #[tracing::instrument(level = "info", skip(self, path), fields(file = %path.display()))]
    pub async fn ingest_file(&mut self, path: &Path) -> IngestResult<usize> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let tables = load_tables(path, self.ocr)?;
        let multi_sheet = tables.len() > 1;

        // One pass over the sheets: build the file-wide column union and
        // sample rows for classification, then keep the tables that clear
        // the sheet policy. An oversized sheet still contributes columns;
        // a name-skipped one contributes nothing.
        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut sample_rows: Vec<BTreeMap<String, String>> = Vec::new();
        let mut keep: Vec<RawTable> = Vec::new();

        for mut table in tables {
            self.summary.tables_seen += 1;
            let sheet = table.origin.sheet.clone();

            if multi_sheet && self.config.is_skippable_sheet_name(&sheet) {
                info!(sheet = %sheet, "Skipping lookup sheet by name");
                self.summary.tables_skipped += 1;
                continue;
            }

            for column in &table.columns {
                if column.trim().is_empty() {
                    continue;
                }
                if seen.insert(column.clone()) {
                    columns.push(column.clone());
                }
            }
            self.collect_sample_rows(&table, &mut sample_rows);

            if table.is_empty() {
                debug!(sheet = %sheet, "Skipping empty table");
                self.summary.tables_skipped += 1;
                continue;
            }
            if multi_sheet && table.rows.len() > self.config.max_sheet_rows {
                info!(sheet = %sheet, rows = table.rows.len(), "Skipping oversized sheet");
                self.summary.tables_skipped += 1;
                continue;
            }

            forward_fill_customer_columns(&mut table);
            keep.push(table);
        }

        let classification = classify_columns(self.oracle, &columns, sample_rows).await;
        if classification.oracle_used {
            self.summary.oracle_files += 1;
        }
        self.index.record_classification(&classification);

        let customer_hint = customer_from_filename(&filename);
        let mut file_rows = 0usize;

        for table in &keep {
            let identity_col = self.resolve_identity_column(table, &classification);
            let Some(identity_col) = identity_col else {
                warn!(sheet = %table.origin.sheet, "No identity column detected, skipping table");
                self.summary.tables_skipped += 1;
                continue;
            };
            debug!(
                sheet = %table.origin.sheet,
                column = %table.columns[identity_col],
                rows = table.rows.len(),
                "Resolved identity column"
            );

            let ctx = RowContext {
                filename: &filename,
                customer_hint: customer_hint.as_deref(),
                classification: &classification,
                max_error_len: self.config.max_error_len,
            };
            for row_idx in 0..table.rows.len() {
                match build_draft(table, row_idx, identity_col, &ctx) {
                    Some(draft) => {
                        self.index.upsert(draft);
                        self.summary.rows_accepted += 1;
                        file_rows += 1;
                    }
                    None => self.summary.rows_rejected += 1,
                }
            }
        }

        if file_rows == 0 {
            return Err(IngestError::NoAssets { file: filename });
        }
        self.summary.files += 1;
        info!(rows = file_rows, "Ingested file");
        Ok(file_rows)
    }

    /// Close the run: finalize the index and report the counters.
    pub fn finish(self) -> (Vec<CanonicalAsset>, RunSummary) {
        let mut summary = self.summary;
        summary.customers_rejected = self.index.rejected_customers;
        let before = self.index.len();
        let assets = self.index.finalize();
        summary.components_folded = before - assets.len();
        summary.assets = assets.len();
        info!(
            assets = summary.assets,
            folded = summary.components_folded,
            rows = summary.rows_accepted,
            rejected_rows = summary.rows_rejected,
            "Run complete"
        );
        (assets, summary)
    }

    /// The oracle's identity column wins when the table actually has it;
    /// otherwise fall back to local detection.
    fn resolve_identity_column(
        &self,
        table: &RawTable,
        classification: &Classification,
    ) -> Option<usize> {
        classification
            .identity_column
            .as_deref()
            .and_then(|name| table.column_index(name))
            .or_else(|| detect_identity_column(table, self.config.sample_value_limit))
    }

    /// Collect up to the configured number of sample rows for the oracle,
    /// scanning each table's leading rows and keeping only rows where some
    /// cell carries a serial-shaped value.
    fn collect_sample_rows(&self, table: &RawTable, samples: &mut Vec<BTreeMap<String, String>>) {
        for row in table.rows.iter().take(self.config.peek_row_limit) {
            if samples.len() >= self.config.sample_row_limit {
                return;
            }
            let mut sample = BTreeMap::new();
            let mut has_identity = false;
            for (idx, column) in table.columns.iter().enumerate() {
                if column.trim().is_empty() {
                    continue;
                }
                let value = row.get(idx).map(|v| v.trim()).unwrap_or("");
                if value.is_empty() {
                    continue;
                }
                if contains_identity_shape(value) {
                    has_identity = true;
                }
                sample.insert(
                    column.clone(),
                    truncate_chars(value, self.config.sample_cell_chars),
                );
            }
            if has_identity {
                samples.push(sample);
            }
        }
    }
}

/// Merged customer cells surface as blanks below the first row of the
/// block; carry the last seen value down.
fn forward_fill_customer_columns(table: &mut RawTable) {
    for (idx, column) in table.columns.iter().enumerate() {
        let lower = column.trim().to_lowercase();
        if !CUSTOMER_FILL_MARKERS.iter().any(|m| lower.contains(m)) {
            continue;
        }
        let mut last: Option<String> = None;
        for row in &mut table.rows {
            let Some(cell) = row.get_mut(idx) else {
                continue;
            };
            if cell.trim().is_empty() {
                if let Some(fill) = &last {
                    *cell = fill.clone();
                }
            } else {
                last = Some(cell.clone());
            }
        }
    }
}

fn truncate_chars(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifyRequest, ClassifyResponse, OracleError};
    use anyhow::Result;
    use rust_xlsxwriter::Workbook;
    use std::io::{Cursor, Write};
    use tempfile::{tempdir, NamedTempFile};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    use zip::write::SimpleFileOptions;

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,failtrace=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const SN1: &str = "9AB123456789_100-000000000001";
    const SN2: &str = "9CD123456789_100-000000000002";

    fn write_sheet(
        workbook: &mut Workbook,
        name: &str,
        columns: &[&str],
        rows: &[&[&str]],
    ) -> Result<()> {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        for (col, header) in columns.iter().enumerate() {
            sheet.write_string(0, col as u16, *header)?;
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                sheet.write_string(r as u32 + 1, c as u16, *value)?;
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn workbook_flows_end_to_end() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("report.xlsx");

        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "Failures",
            &["CPU_SN", "Failtype", "Status"],
            &[&[SN1, "Cache ECC", "Fail"], &[SN2, "DDR hang", "Open"]],
        )?;
        workbook.save(&path)?;

        let mut run = IngestRun::without_oracle(IngestConfig::default());
        assert_eq!(run.ingest_file(&path).await?, 2);

        let (assets, summary) = run.finish();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].identity, SN1);
        assert_eq!(assets[0].error_type.as_deref(), Some("Cache ECC"));
        assert_eq!(assets[0].status.as_deref(), Some("Fail"));
        assert_eq!(assets[0].fields["_source_filename"], "report.xlsx");
        assert_eq!(assets[1].identity, SN2);

        assert_eq!(summary.files, 1);
        assert_eq!(summary.tables_seen, 1);
        assert_eq!(summary.tables_skipped, 0);
        assert_eq!(summary.rows_accepted, 2);
        assert_eq!(summary.rows_rejected, 0);
        assert_eq!(summary.assets, 2);
        assert_eq!(summary.oracle_files, 0);
        Ok(())
    }

    #[tokio::test]
    async fn column_roles_span_every_sheet_of_the_file() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("split.xlsx");

        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "Failures",
            &["CPU_SN", "Failtype"],
            &[&[SN1, "Cache ECC"]],
        )?;
        write_sheet(
            &mut workbook,
            "Tracking",
            &["CPU_SN", "Status"],
            &[&[SN2, "Closed"]],
        )?;
        workbook.save(&path)?;

        let mut run = IngestRun::without_oracle(IngestConfig::default());
        run.ingest_file(&path).await?;

        let (assets, _) = run.finish();
        assert_eq!(assets.len(), 2);
        // the audit map is file-wide, not the subset of columns an asset
        // happened to populate
        let roles = &assets[0].fields["_column_roles"];
        assert_eq!(roles["CPU_SN"], "IDENTITY");
        assert_eq!(roles["Failtype"], "ERROR_TYPE");
        assert_eq!(roles["Status"], "STATUS");
        assert_eq!(assets[1].fields["_column_roles"]["Failtype"], "ERROR_TYPE");
        Ok(())
    }

    #[tokio::test]
    async fn lookup_sheets_are_skipped_when_multiple() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("mixed.xlsx");

        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "March Failures",
            &["CPU_SN", "Failtype"],
            &[&[SN1, "Cache ECC"]],
        )?;
        write_sheet(
            &mut workbook,
            "DateCode",
            &["CPU_SN", "Failtype"],
            &[&[SN2, "should never appear"]],
        )?;
        workbook.save(&path)?;

        let mut run = IngestRun::without_oracle(IngestConfig::default());
        run.ingest_file(&path).await?;

        let (assets, summary) = run.finish();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].identity, SN1);
        assert_eq!(summary.tables_seen, 2);
        assert_eq!(summary.tables_skipped, 1);
        Ok(())
    }

    #[tokio::test]
    async fn single_sheet_is_processed_whatever_its_name() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("reference.xlsx");

        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "Reference",
            &["CPU_SN", "Failtype"],
            &[&[SN1, "Cache ECC"]],
        )?;
        workbook.save(&path)?;

        let mut run = IngestRun::without_oracle(IngestConfig::default());
        run.ingest_file(&path).await?;

        let (assets, _) = run.finish();
        assert_eq!(assets.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_sheets_are_skipped() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("big.xlsx");

        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "Big",
            &["CPU_SN", "Failtype"],
            &[
                &["9BB000000001", "x"],
                &["9BB000000002", "x"],
                &["9BB000000003", "x"],
                &["9BB000000004", "x"],
                &["9BB000000005", "x"],
            ],
        )?;
        write_sheet(
            &mut workbook,
            "Small",
            &["CPU_SN", "Failtype"],
            &[&[SN1, "Cache ECC"]],
        )?;
        workbook.save(&path)?;

        let config = IngestConfig {
            max_sheet_rows: 3,
            ..IngestConfig::default()
        };
        let mut run = IngestRun::without_oracle(config);
        run.ingest_file(&path).await?;

        let (assets, summary) = run.finish();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].identity, SN1);
        assert_eq!(summary.tables_skipped, 1);
        Ok(())
    }

    #[tokio::test]
    async fn file_without_identities_is_rejected() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("lookup.xlsx");

        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "Codes",
            &["Code", "Meaning"],
            &[&["X1", "Cache"], &["X2", "DDR"]],
        )?;
        workbook.save(&path)?;

        let mut run = IngestRun::without_oracle(IngestConfig::default());
        let err = run.ingest_file(&path).await.unwrap_err();
        assert!(matches!(err, IngestError::NoAssets { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn merged_customer_cells_fill_down() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("merged.xlsx");

        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "Failures",
            &["CPU_SN", "Customer", "Failtype"],
            &[&[SN1, "Tencent", "Cache ECC"], &[SN2, "", "DDR hang"]],
        )?;
        workbook.save(&path)?;

        let mut run = IngestRun::without_oracle(IngestConfig::default());
        run.ingest_file(&path).await?;

        let (assets, _) = run.finish();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].fields["Customer"], "Tencent");
        // the blank merged cell inherited the block's value
        assert_eq!(assets[1].fields["Customer"], "Tencent");
        Ok(())
    }

    #[tokio::test]
    async fn filename_customer_reaches_assets() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("Tencent_FA_Status.xlsx");

        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "Failures",
            &["CPU_SN", "Failtype"],
            &[&[SN1, "Cache ECC"]],
        )?;
        workbook.save(&path)?;

        let mut run = IngestRun::without_oracle(IngestConfig::default());
        run.ingest_file(&path).await?;

        let (assets, _) = run.finish();
        assert_eq!(assets[0].fields["Customer"], "Tencent");
        Ok(())
    }

    struct ScriptedOracle(ClassifyResponse);

    impl RoleOracle for ScriptedOracle {
        async fn classify(
            &self,
            _request: &ClassifyRequest,
        ) -> std::result::Result<ClassifyResponse, OracleError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn oracle_verdict_shapes_the_whole_file() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let path = dir.path().join("report.xlsx");

        // "Obs" means nothing to the local rules; only the oracle knows it
        // holds error text
        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            "Failures",
            &["CPU_SN", "Obs"],
            &[&[SN1, "Thermal trip"]],
        )?;
        workbook.save(&path)?;

        let oracle = ScriptedOracle(ClassifyResponse {
            classifications: [
                ("CPU_SN".to_string(), "IDENTITY".to_string()),
                ("Obs".to_string(), "ERROR_TYPE".to_string()),
            ]
            .into_iter()
            .collect(),
            identity_column: Some("CPU_SN".to_string()),
            error_extraction_column: None,
        });

        let mut run = IngestRun::new(IngestConfig::default(), Some(&oracle), None);
        run.ingest_file(&path).await?;

        let (assets, summary) = run.finish();
        assert_eq!(assets[0].error_type.as_deref(), Some("Thermal trip"));
        assert_eq!(summary.oracle_files, 1);
        Ok(())
    }

    #[tokio::test]
    async fn slide_deck_records_flow_end_to_end() -> Result<()> {
        init_test_logging();
        let slide = "<p:sld><p:cSld>\
            <a:p><a:r><a:t>9MP1796P50010 (EX HWA)</a:t></a:r></a:p>\
            <a:p><a:r><a:t>9MP7222Q50001 (SYSTEM_HANG)</a:t></a:r></a:p>\
            </p:cSld></p:sld>";

        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file("ppt/slides/slide1.xml", SimpleFileOptions::default())?;
            zip.write_all(slide.as_bytes())?;
            zip.finish()?;
        }
        let mut tmp = NamedTempFile::with_suffix(".pptx")?;
        tmp.write_all(&buf)?;

        let mut run = IngestRun::without_oracle(IngestConfig::default());
        run.ingest_file(tmp.path()).await?;

        let (assets, _) = run.finish();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].identity, "9MP1796P50010");
        assert_eq!(assets[0].error_type.as_deref(), Some("EX HWA"));
        assert_eq!(assets[0].fields["_source_sheet"], "Slide 1");
        Ok(())
    }
}
