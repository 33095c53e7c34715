use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;
use zip::write::FileOptions;

use crate::app::error::AppError;
use crate::app::models::{LedgerEntry, ReadinessOutcome, Verdict};

pub const LEDGER_FILE_NAME: &str = "app_results.xlsx";
pub const SHEET_NAME: &str = "Results";
pub const HEADER: [&str; 3] = ["App Name", "Result", "失敗原因"];

/// Reason text for a failed outcome; UI timeouts name the last failing check.
pub fn failure_text(outcome: &ReadinessOutcome) -> String {
    let reason = outcome
        .reason()
        .map(ToString::to_string)
        .unwrap_or_default();
    match outcome.last_check_failure() {
        Some(last) if outcome.reason() != Some(last) => format!("{reason}; last check: {last}"),
        _ => reason,
    }
}

/// Per-application results in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunLedger {
    entries: Vec<LedgerEntry>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn record(&mut self, app: &str, outcome: &ReadinessOutcome) {
        let (verdict, reason) = if outcome.is_ready() {
            (Verdict::Pass, None)
        } else {
            (Verdict::Fail, Some(failure_text(outcome)))
        };
        self.push(LedgerEntry {
            app: app.to_string(),
            verdict,
            reason,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_passed(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.verdict == Verdict::Pass)
    }

    fn rows(&self) -> Vec<[&str; 3]> {
        let mut rows = vec![HEADER];
        rows.extend(self.entries.iter().map(|entry| {
            [
                entry.app.as_str(),
                entry.verdict.as_str(),
                entry.reason.as_deref().unwrap_or(""),
            ]
        }));
        rows
    }

    /// Writes `app_results.xlsx` into `output_dir`.
    pub fn write_to_dir(&self, output_dir: &Path, trace_id: &str) -> Result<PathBuf, AppError> {
        fs::create_dir_all(output_dir).map_err(|err| {
            AppError::system(format!("Failed to create output dir: {err}"), trace_id)
        })?;
        let path = output_dir.join(LEDGER_FILE_NAME);
        self.write_xlsx(&path, trace_id)?;
        Ok(path)
    }

    pub fn write_xlsx(&self, path: &Path, trace_id: &str) -> Result<(), AppError> {
        let write_err =
            |err: &dyn std::fmt::Display| AppError::system(format!("Failed to write ledger: {err}"), trace_id);

        let file = fs::File::create(path)
            .map_err(|err| AppError::system(format!("Failed to create ledger: {err}"), trace_id))?;
        let mut zip = zip::ZipWriter::new(file);
        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", ROOT_RELS.to_string()),
            ("xl/workbook.xml", workbook_xml()),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
            ("xl/worksheets/sheet1.xml", sheet_xml(&self.rows())),
        ];
        for (name, body) in parts {
            zip.start_file(name, FileOptions::<()>::default())
                .map_err(|err| write_err(&err))?;
            zip.write_all(body.as_bytes()).map_err(|err| write_err(&err))?;
        }
        zip.finish()
            .map_err(|err| AppError::system(format!("Failed to finalize ledger: {err}"), trace_id))?;

        info!(trace_id = %trace_id, path = %path.display(), rows = self.entries.len(), "ledger written");
        Ok(())
    }
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    )
}

pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

fn sheet_xml(rows: &[[&str; 3]]) -> String {
    let mut body = String::new();
    for (row_index, row) in rows.iter().enumerate() {
        let number = row_index + 1;
        body.push_str(&format!("<row r=\"{number}\">"));
        for (column, value) in row.iter().enumerate() {
            let cell = format!("{}{number}", column_letter(column));
            if value.is_empty() {
                body.push_str(&format!("<c r=\"{cell}\"/>"));
            } else {
                body.push_str(&format!(
                    "<c r=\"{cell}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                    escape_xml(value)
                ));
            }
        }
        body.push_str("</row>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{body}</sheetData></worksheet>"#
    )
}
