// src/source/deck.rs
//
// Slide-deck reader. A .pptx file is a zip of XML parts; failure summaries
// arrive either as native slide tables, as loose text ("9MP1796P50010
// (SYSTEM_HANG)" bullets, "Status: Closed" key/value lines), or as
// screenshots. All three are normalized into RawTables so decks flow
// through the same pipeline as workbook sheets.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::IngestResult;
use crate::source::{RawTable, SourceKind, TableOrigin};

/// Text recognizer for picture-only slides. The engine is optional and
/// injected by the caller; no implementation is bundled.
pub trait OcrEngine: Send + Sync {
    /// Recognize text in one image part (raw bytes as stored in the deck).
    fn recognize(&self, image: &[u8]) -> anyhow::Result<String>;
}

static SLIDE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());
static TABLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a:tbl(?:\s[^>]*)?>.*?</a:tbl>").unwrap());
static TABLE_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a:tr(?:\s[^>]*)?>.*?</a:tr>").unwrap());
static TABLE_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a:tc(?:\s[^>]*)?>.*?</a:tc>").unwrap());
static PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<a:p(?:\s[^>]*)?>.*?</a:p>").unwrap());
static TEXT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<a:t(?:\s[^>]*)?>([^<]*)</a:t>").unwrap());
static IMAGE_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Target="\.\./media/([^"]+\.(?:png|jpe?g|gif|bmp|tiff?))""#).unwrap());

/// Serial followed by a parenthesized failure, e.g. "9MP1796P50010 (EX HWA)".
static SERIAL_WITH_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([A-Z0-9_\-]{8,})\s*\(([^)]+)\)").unwrap());
/// Bare serial-like token in slide text.
static SERIAL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z0-9]{8,}(?:[_\-][A-Z0-9]+)*\b").unwrap());
/// A serial must carry a digit, underscore or dash; plain words don't count.
static SERIAL_SUBSTANCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d_\-]").unwrap());

/// Read every table a deck contains. Native slide tables win; a slide
/// without one falls back to a table synthesized from its loose text,
/// then to OCR when it references picture parts (only when an engine is
/// injected).
#[tracing::instrument(level = "info", skip(path, ocr), fields(path = %path.as_ref().display()))]
pub fn load_deck<P: AsRef<Path>>(
    path: P,
    ocr: Option<&dyn OcrEngine>,
) -> IngestResult<Vec<RawTable>> {
    let file = File::open(path.as_ref())?;
    let mut archive = ZipArchive::new(file)?;

    // slide parts in numeric order
    let mut slide_entries: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            SLIDE_ENTRY
                .captures(name)
                .and_then(|c| c.get(1)?.as_str().parse::<usize>().ok())
                .map(|n| (n, name.to_string()))
        })
        .collect();
    slide_entries.sort();

    let mut tables = Vec::new();
    for (slide_no, entry) in slide_entries {
        let mut xml = String::new();
        archive.by_name(&entry)?.read_to_string(&mut xml)?;
        let label = format!("Slide {}", slide_no);

        let mut slide_tables = native_tables(&xml, &label);
        let had_native = !slide_tables.is_empty();
        tables.append(&mut slide_tables);

        // loose text is a fallback for slides without a native table
        let mut had_text = false;
        if !had_native {
            let prose = slide_text(&xml);
            let text_table = text_records(&prose, &label);
            had_text = text_table.is_some();
            tables.extend(text_table);
        }

        if !had_native && !had_text {
            if let Some(engine) = ocr {
                tables.extend(ocr_records(&mut archive, slide_no, &label, engine));
            }
        }
    }

    debug!(tables = tables.len(), "Loaded deck");
    Ok(tables)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Paragraph texts of an XML fragment, one string per `<a:p>` (runs within
/// a paragraph concatenate, matching how slides render).
fn paragraph_lines(fragment: &str) -> Vec<String> {
    PARAGRAPH
        .find_iter(fragment)
        .map(|p| {
            TEXT_RUN
                .captures_iter(p.as_str())
                .map(|c| unescape_xml(&c[1]))
                .collect::<String>()
        })
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Native `<a:tbl>` tables. The first row is the header, as authored.
fn native_tables(xml: &str, label: &str) -> Vec<RawTable> {
    let mut tables = Vec::new();
    for block in TABLE_BLOCK.find_iter(xml) {
        let grid: Vec<Vec<String>> = TABLE_ROW
            .find_iter(block.as_str())
            .map(|row| {
                TABLE_CELL
                    .find_iter(row.as_str())
                    .map(|cell| paragraph_lines(cell.as_str()).join("\n"))
                    .collect()
            })
            .collect();

        if grid.len() < 2 {
            continue;
        }
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        let mut rows_iter = grid.into_iter();
        let columns: Vec<String> = rows_iter.next().unwrap_or_default();
        let rows: Vec<Vec<String>> = rows_iter
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        tables.push(RawTable {
            columns,
            rows,
            origin: TableOrigin {
                kind: SourceKind::SlideTable,
                sheet: label.to_string(),
                first_data_row: 2,
            },
        });
    }
    tables
}

/// All paragraph text outside tables, one line per paragraph.
fn slide_text(xml: &str) -> String {
    let without_tables = TABLE_BLOCK.replace_all(xml, "");
    paragraph_lines(&without_tables).join("\n")
}

/// Synthesize a table from loose slide text.
///
/// Preferred shape: `SERIAL (failure)` pairs, one row each. Fallback: the
/// slide's `key: value` lines become columns of a single-row record, with
/// any serial-bearing line kept under "Notes".
fn text_records(prose: &str, label: &str) -> Option<RawTable> {
    if prose.is_empty() {
        return None;
    }

    let pairs: Vec<(String, String)> = SERIAL_WITH_ERROR
        .captures_iter(prose)
        .filter(|c| SERIAL_SUBSTANCE.is_match(&c[1]))
        .map(|c| (c[1].trim().to_string(), c[2].trim().to_string()))
        .collect();

    if !pairs.is_empty() {
        let rows = pairs
            .into_iter()
            .map(|(serial, error)| {
                let note = format!("{} ({})", serial, error);
                vec![serial, error, note]
            })
            .collect();
        return Some(RawTable {
            columns: vec![
                "Serial Number".to_string(),
                "Reported Failure".to_string(),
                "Notes".to_string(),
            ],
            rows,
            origin: TableOrigin {
                kind: SourceKind::SlideText,
                sheet: label.to_string(),
                first_data_row: 1,
            },
        });
    }

    let serials: Vec<&str> = SERIAL_TOKEN
        .find_iter(prose)
        .map(|m| m.as_str())
        .filter(|s| SERIAL_SUBSTANCE.is_match(s))
        .collect();
    if serials.is_empty() {
        return None;
    }

    // key/value lines become columns; serial-bearing prose lands in Notes
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut notes: Option<String> = None;
    for line in prose.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() && !value.is_empty() {
                fields.push((key.to_string(), value.to_string()));
                continue;
            }
        }
        if serials.iter().any(|s| line.contains(s)) {
            notes = Some(line.to_string());
        }
    }
    if let Some(note) = notes {
        fields.push(("Notes".to_string(), note));
    }
    if fields.is_empty() {
        return None;
    }

    let (columns, row): (Vec<String>, Vec<String>) = fields.into_iter().unzip();
    Some(RawTable {
        columns,
        rows: vec![row],
        origin: TableOrigin {
            kind: SourceKind::SlideText,
            sheet: label.to_string(),
            first_data_row: 1,
        },
    })
}

/// OCR path for a slide with no tables and no text: feed each image part
/// referenced by the slide to the injected engine and mine the result for
/// serial tokens.
fn ocr_records(
    archive: &mut ZipArchive<File>,
    slide_no: usize,
    label: &str,
    engine: &dyn OcrEngine,
) -> Option<RawTable> {
    let rels_entry = format!("ppt/slides/_rels/slide{}.xml.rels", slide_no);
    let mut rels = String::new();
    match archive.by_name(&rels_entry) {
        Ok(mut part) => {
            if part.read_to_string(&mut rels).is_err() {
                return None;
            }
        }
        Err(_) => return None,
    }

    let media_names: Vec<String> = IMAGE_TARGET
        .captures_iter(&rels)
        .map(|c| format!("ppt/media/{}", &c[1]))
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for media in media_names {
        let mut bytes = Vec::new();
        match archive.by_name(&media) {
            Ok(mut part) => {
                if part.read_to_end(&mut bytes).is_err() {
                    continue;
                }
            }
            Err(_) => continue,
        }
        let text = match engine.recognize(&bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(slide = slide_no, media = %media, error = %e, "OCR failed for image part");
                continue;
            }
        };
        for serial in SERIAL_TOKEN
            .find_iter(&text)
            .map(|m| m.as_str())
            .filter(|s| SERIAL_SUBSTANCE.is_match(s))
        {
            rows.push(vec![serial.to_string(), text.trim().to_string()]);
        }
    }

    if rows.is_empty() {
        return None;
    }
    Some(RawTable {
        columns: vec!["Serial Number".to_string(), "Notes".to_string()],
        rows,
        origin: TableOrigin {
            kind: SourceKind::OcrText,
            sheet: label.to_string(),
            first_data_row: 1,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;
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

    fn cell(text: &str) -> String {
        format!(
            "<a:tc><a:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></a:txBody></a:tc>",
            text
        )
    }

    fn write_deck(parts: &[(&str, &[u8])]) -> Result<NamedTempFile> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default();
            for (name, bytes) in parts {
                zip.start_file(name.to_string(), options)?;
                zip.write_all(bytes)?;
            }
            zip.finish()?;
        }
        let mut tmp = NamedTempFile::with_suffix(".pptx")?;
        tmp.write_all(&buf)?;
        Ok(tmp)
    }

    #[test]
    fn native_table_becomes_raw_table() -> Result<()> {
        init_test_logging();
        let slide = format!(
            "<p:sld><p:cSld><a:tbl><a:tr>{}{}</a:tr><a:tr>{}{}</a:tr></a:tbl></p:cSld></p:sld>",
            cell("Serial Number"),
            cell("Failure"),
            cell("9MP1796P50010"),
            cell("EX HWA")
        );
        let tmp = write_deck(&[("ppt/slides/slide1.xml", slide.as_bytes())])?;

        let tables = load_deck(tmp.path(), None)?;
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.origin.kind, SourceKind::SlideTable);
        assert_eq!(table.origin.sheet, "Slide 1");
        assert_eq!(table.columns, vec!["Serial Number", "Failure"]);
        assert_eq!(table.rows, vec![vec!["9MP1796P50010", "EX HWA"]]);
        Ok(())
    }

    #[test]
    fn loose_text_is_fallback_for_tableless_slides_only() -> Result<()> {
        init_test_logging();
        // slide 1 carries a native table plus a prose serial mention;
        // slide 2 is prose only
        let slide1 = format!(
            "<p:sld><p:cSld><a:tbl><a:tr>{}{}</a:tr><a:tr>{}{}</a:tr></a:tbl>\
             <a:p><a:r><a:t>9MP7222Q50001 (SYSTEM_HANG)</a:t></a:r></a:p></p:cSld></p:sld>",
            cell("Serial Number"),
            cell("Failure"),
            cell("9MP1796P50010"),
            cell("EX HWA")
        );
        let slide2 = "<p:sld><p:cSld>\
            <a:p><a:r><a:t>9MP7222Q50001 (SYSTEM_HANG)</a:t></a:r></a:p>\
            </p:cSld></p:sld>";
        let tmp = write_deck(&[
            ("ppt/slides/slide1.xml", slide1.as_bytes()),
            ("ppt/slides/slide2.xml", slide2.as_bytes()),
        ])?;

        let tables = load_deck(tmp.path(), None)?;
        assert_eq!(tables.len(), 2);
        // slide 1's prose never becomes a record
        assert_eq!(tables[0].origin.kind, SourceKind::SlideTable);
        assert_eq!(tables[0].rows, vec![vec!["9MP1796P50010", "EX HWA"]]);
        assert_eq!(tables[1].origin.kind, SourceKind::SlideText);
        assert_eq!(tables[1].origin.sheet, "Slide 2");
        assert_eq!(tables[1].rows[0][0], "9MP7222Q50001");
        Ok(())
    }

    #[test]
    fn loose_text_pairs_become_rows() -> Result<()> {
        init_test_logging();
        let slide = "<p:sld><p:cSld>\
            <a:p><a:r><a:t>9MP1796P50010 (EX HWA)</a:t></a:r></a:p>\
            <a:p><a:r><a:t>9MP7222Q50001 (SYSTEM_HANG)</a:t></a:r></a:p>\
            <a:p><a:r><a:t>Collection (text)</a:t></a:r></a:p>\
            </p:cSld></p:sld>";
        let tmp = write_deck(&[("ppt/slides/slide1.xml", slide.as_bytes())])?;

        let tables = load_deck(tmp.path(), None)?;
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.origin.kind, SourceKind::SlideText);
        // "Collection" has no digit/underscore/dash, so only two rows
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], "9MP1796P50010");
        assert_eq!(table.rows[0][1], "EX HWA");
        Ok(())
    }

    #[test]
    fn key_value_lines_become_columns() -> Result<()> {
        init_test_logging();
        let slide = "<p:sld><p:cSld>\
            <a:p><a:r><a:t>Serial: 9MP1796P50010</a:t></a:r></a:p>\
            <a:p><a:r><a:t>Status: Closed</a:t></a:r></a:p>\
            <a:p><a:r><a:t>Unit 9MP1796P50010 returned from field</a:t></a:r></a:p>\
            </p:cSld></p:sld>";
        let tmp = write_deck(&[("ppt/slides/slide1.xml", slide.as_bytes())])?;

        let tables = load_deck(tmp.path(), None)?;
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.columns, vec!["Serial", "Status", "Notes"]);
        assert_eq!(
            table.rows[0],
            vec![
                "9MP1796P50010",
                "Closed",
                "Unit 9MP1796P50010 returned from field"
            ]
        );
        Ok(())
    }

    struct FixedOcr(&'static str);
    impl OcrEngine for FixedOcr {
        fn recognize(&self, _image: &[u8]) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn picture_only_slide_uses_injected_ocr() -> Result<()> {
        init_test_logging();
        let slide = "<p:sld><p:cSld><p:pic/></p:cSld></p:sld>";
        let rels = r#"<Relationships><Relationship Id="rId2" Target="../media/image1.png"/></Relationships>"#;
        let tmp = write_deck(&[
            ("ppt/slides/slide1.xml", slide.as_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels", rels.as_bytes()),
            ("ppt/media/image1.png", b"not-a-real-png"),
        ])?;

        let engine = FixedOcr("Failure 9MP1796P50010 observed after SLT");
        let tables = load_deck(tmp.path(), Some(&engine))?;
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].origin.kind, SourceKind::OcrText);
        assert_eq!(tables[0].rows[0][0], "9MP1796P50010");
        Ok(())
    }

    #[test]
    fn no_ocr_engine_means_picture_slides_yield_nothing() -> Result<()> {
        init_test_logging();
        let slide = "<p:sld><p:cSld><p:pic/></p:cSld></p:sld>";
        let rels = r#"<Relationships><Relationship Id="rId2" Target="../media/image1.png"/></Relationships>"#;
        let tmp = write_deck(&[
            ("ppt/slides/slide1.xml", slide.as_bytes()),
            ("ppt/slides/_rels/slide1.xml.rels", rels.as_bytes()),
            ("ppt/media/image1.png", b"not-a-real-png"),
        ])?;

        let tables = load_deck(tmp.path(), None)?;
        assert!(tables.is_empty());
        Ok(())
    }
}
