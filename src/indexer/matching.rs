//! Code matching and description propagation.
//!
//! Each row's code is resolved through the codebook by its 3-digit prefix,
//! falling back to the 2-digit prefix. The last resolved description is carried
//! down to following rows that hold no code.
use crate::error::IndexerError;
use crate::indexer::progress::report_rows;
use crate::indexer::progress::Progress;
use crate::indexer::Codebook;
use crate::indexer::ColumnRef;
use crate::indexer::Diagnostic;
use crate::indexer::DiagnosticKind;
use crate::indexer::PassReport;
use crate::indexer::PROGRESS_INTERVAL;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::Sheet;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// What happens on a row whose code is in neither prefix form in the codebook
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Nothing is written on the row; later rows without a code keep the
    /// previous description
    #[default]
    LeaveBlank,
    /// The given text is written on the row; later rows without a code keep
    /// the previous description
    Marker(String),
    /// Nothing is written and the carried description is dropped, so later
    /// rows without a code get nothing until the next resolved code
    ResetPropagation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Column holding the numeric codes
    pub code_column: ColumnRef,
    /// Column receiving the descriptions
    pub target_column: ColumnRef,
    /// Written into the target column of the header row, when set
    pub header_label: Option<String>,
    /// Row holding the headers, 0 when the data starts at row 1
    pub header_row: u32,
    pub unresolved: UnresolvedPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            code_column: ColumnRef::Position(6),
            target_column: ColumnRef::Position(2),
            header_label: None,
            header_row: 0,
            unresolved: UnresolvedPolicy::default(),
        }
    }
}

/// Content of a code cell
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Code {
    /// Nothing in the cell
    Absent,
    /// Decimal digits, leading zeros kept for text cells
    Digits(String),
    /// Something that is not a code
    Malformed(String),
}

/// Reads a code cell. Integral non-negative numbers and text made of ASCII
/// digits are codes; any other content is malformed.
pub(crate) fn normalize_code(value: Option<&CellValue>) -> Code {
    let Some(value) = value else {
        return Code::Absent;
    };
    match value {
        CellValue::Empty => Code::Absent,
        CellValue::Number(number) if number.fract() == 0.0 && *number >= 0.0 && *number < 1e18 => {
            Code::Digits(format!("{}", *number as u64))
        }
        CellValue::Text { value: text, .. } | CellValue::FormulaText(text) => {
            let text = text.trim();
            if text.is_empty() {
                Code::Absent
            } else if text.bytes().all(|byte| byte.is_ascii_digit()) {
                Code::Digits(text.to_owned())
            } else {
                Code::Malformed(text.to_owned())
            }
        }
        other => Code::Malformed(other.display_text().into_owned()),
    }
}

/// Resolves a code by its 3-digit prefix, then by its 2-digit prefix.
/// Returns the matched prefix and its description.
pub fn resolve_prefix<'c, 's>(codebook: &'c Codebook, code: &'s str) -> Option<(&'s str, &'c str)> {
    [3, 2]
        .into_iter()
        .filter(|length| code.len() >= *length)
        .map(|length| &code[..length])
        .find_map(|prefix| codebook.resolve(prefix).map(|description| (prefix, description)))
}

/// Runs the matching pass over one sheet.
///
/// The pass only writes descriptions; a target cell is never cleared. See
/// [`UnresolvedPolicy`] for rows whose code does not resolve.
///
/// # Errors
/// `MissingColumn` when the code or target column cannot be resolved.
pub fn match_codes(
    sheet: &mut Sheet,
    codebook: &Codebook,
    config: &MatchConfig,
    progress: &dyn Progress,
) -> Result<PassReport, IndexerError> {
    let header_row = config.header_row;
    let code_column = config.code_column.resolve(sheet, header_row)?;
    let target_column = config.target_column.resolve_target(sheet, header_row)?;
    progress.message(&format!("Matching codes of '{}'", sheet.name));

    if let Some(label) = config.header_label.as_deref().filter(|_| header_row > 0) {
        sheet.row_mut(header_row).write_text(target_column, label, None);
    }

    let first = header_row + 1;
    let last = sheet.last_row();
    let total = last.saturating_sub(header_row);
    let mut report = PassReport {
        sheet: sheet.name.clone(),
        ..Default::default()
    };
    sheet.materialize_rows(first, last);

    let mut description = String::new();
    for row in sheet.rows_between_mut(first, last) {
        let mut written = None::<String>;
        match normalize_code(row.value(code_column)) {
            Code::Digits(code) => {
                report.codes_found += 1;
                match resolve_prefix(codebook, &code) {
                    Some((prefix, resolved)) => {
                        debug!(row = row.number, code = %code, prefix = %prefix, "code matched");
                        report.codes_matched += 1;
                        description = resolved.to_owned();
                    }
                    None => {
                        debug!(row = row.number, code = %code, "code not in codebook");
                        report.diagnostics.push(Diagnostic {
                            sheet: report.sheet.clone(),
                            row: row.number,
                            kind: DiagnosticKind::NotFound { code },
                        });
                        match &config.unresolved {
                            UnresolvedPolicy::LeaveBlank => written = Some(String::new()),
                            UnresolvedPolicy::Marker(marker) => written = Some(marker.clone()),
                            UnresolvedPolicy::ResetPropagation => description.clear(),
                        }
                    }
                }
            }
            Code::Malformed(raw) => {
                warn!(sheet = %report.sheet, row = row.number, value = %raw, "malformed code");
                report.diagnostics.push(Diagnostic {
                    sheet: report.sheet.clone(),
                    row: row.number,
                    kind: DiagnosticKind::MalformedCode { raw },
                });
            }
            Code::Absent => (),
        }

        match written {
            Some(marker) if !marker.is_empty() => row.write_text(target_column, &marker, None),
            Some(_) => (),
            None if !description.is_empty() => {
                row.write_text(target_column, &description, None);
                report.rows_filled += 1;
            }
            None => (),
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
        codes = report.codes_found,
        matches = report.codes_matched,
        written = report.rows_filled,
        unresolved = report.diagnostics.len(),
        "codes matched"
    );
    Ok(report)
}
