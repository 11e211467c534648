//! Section propagation ("fill sections").
//!
//! A row whose marker cell holds the sentinel opens a section named by its
//! label cell. The section name is written into the target column of that row
//! and of every following row until the next marker.
use crate::error::IndexerError;
use crate::indexer::progress::report_rows;
use crate::indexer::progress::Progress;
use crate::indexer::ColumnRef;
use crate::indexer::PassReport;
use crate::indexer::PROGRESS_INTERVAL;
use crate::spreadsheet::Row;
use crate::spreadsheet::Sheet;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    /// Column scanned for the sentinel
    pub marker_column: ColumnRef,
    /// Column holding the section name, read on marker rows only
    pub label_column: ColumnRef,
    /// Column written on every data row
    pub target_column: ColumnRef,
    /// Marker value, compared against the trimmed cell text
    pub sentinel: String,
    /// Written into the target column of the header row
    pub header_label: String,
    /// Row holding the headers, 0 when the data starts at row 1
    pub header_row: u32,
    /// Column whose cell style is given to each written target cell
    pub style_from_column: Option<ColumnRef>,
}

impl Default for SectionConfig {
    fn default() -> Self {
        SectionConfig {
            marker_column: ColumnRef::Position(7),
            label_column: ColumnRef::Position(8),
            target_column: ColumnRef::Position(2),
            sentinel: "D".to_owned(),
            header_label: "Oddíly".to_owned(),
            header_row: 1,
            style_from_column: Some(ColumnRef::Position(1)),
        }
    }
}

/// Resolved column positions of one run
struct SectionColumns {
    marker: u32,
    label: u32,
    target: u32,
    style_from: Option<u32>,
}

/// Runs the section pass over one sheet.
///
/// Rows before the first marker get an empty label: an existing target cell
/// is cleared and no new cell is created. A marker row with an empty label
/// resets the section. The target column is never read, so running the pass
/// on its own output changes nothing.
///
/// # Errors
/// `MissingColumn` when a configured column cannot be resolved.
pub fn fill_sections(sheet: &mut Sheet, config: &SectionConfig, progress: &dyn Progress) -> Result<PassReport, IndexerError> {
    let header_row = config.header_row;
    let columns = SectionColumns {
        marker: config.marker_column.resolve(sheet, header_row)?,
        label: config.label_column.resolve(sheet, header_row)?,
        target: config.target_column.resolve_target(sheet, header_row)?,
        style_from: config
            .style_from_column
            .as_ref()
            .map(|column| column.resolve(sheet, header_row))
            .transpose()?,
    };
    progress.message(&format!("Filling sections of '{}'", sheet.name));

    if header_row > 0 {
        let row = sheet.row_mut(header_row);
        let style = columns.style_from.and_then(|column| row.style(column));
        row.write_text(columns.target, &config.header_label, style);
    }

    let first = header_row + 1;
    let last = sheet.last_row();
    let total = last.saturating_sub(header_row);
    let mut report = PassReport {
        sheet: sheet.name.clone(),
        ..Default::default()
    };
    sheet.materialize_rows(first, last);

    let mut section = String::new();
    for row in sheet.rows_between_mut(first, last) {
        section = next_section(section, row, &columns, &config.sentinel, &mut report);
        let style = columns.style_from.and_then(|column| row.style(column));
        row.write_text(columns.target, &section, style);
        if !section.is_empty() {
            report.rows_filled += 1;
        }
        report.rows_scanned += 1;
        if report.rows_scanned % PROGRESS_INTERVAL == 0 {
            report_rows(progress, report.rows_scanned, total);
        }
    }
    sheet.prune_materialized_rows();
    report_rows(progress, total, total);

    info!(
        sheet = %report.sheet,
        rows = report.rows_scanned,
        sections = report.sections_found,
        filled = report.rows_filled,
        "sections filled"
    );
    Ok(report)
}

/// Advances the section state by one row
fn next_section(section: String, row: &Row, columns: &SectionColumns, sentinel: &str, report: &mut PassReport) -> String {
    if row.text(columns.marker) != sentinel.trim() {
        return section;
    }
    let label = row.text(columns.label).into_owned();
    debug!(row = row.number, section = %label, "section marker");
    report.sections_found += 1;
    label
}
