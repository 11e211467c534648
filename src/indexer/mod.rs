//! # Indexer
//!
//! The two annotation passes run over worksheets: section propagation and
//! code matching against a codebook. Both fold a single label state over the
//! rows of one sheet, top to bottom.
use crate::error::IndexerError;
use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::Sheet;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub mod batch;
pub mod codebook;
pub mod matching;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod sections;

pub use codebook::Codebook;
pub use codebook::CodebookConfig;
pub use codebook::CodebookLayout;
pub use matching::MatchConfig;
pub use matching::UnresolvedPolicy;
pub use progress::Progress;
pub use sections::SectionConfig;

/// Rows between two progress fractions
pub(crate) const PROGRESS_INTERVAL: u32 = 100;

/// A column given by position, letters or header text.
///
/// Parsed from `"6"`, `"F"` or `"header:Popis"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnRef {
    /// 1-based column position
    Position(u32),
    /// Text of a cell in the header row
    Header(String),
}

impl ColumnRef {
    /// Resolves the column against a sheet.
    ///
    /// # Errors
    /// `MissingColumn` when no header cell matches, or when the column lies
    /// outside the used range of the sheet.
    pub fn resolve(&self, sheet: &Sheet, header_row: u32) -> Result<u32, IndexerError> {
        let missing = || IndexerError::MissingColumn {
            sheet: sheet.name.clone(),
            column: self.to_string(),
        };
        let column = match self {
            ColumnRef::Position(column) => *column,
            ColumnRef::Header(header) => sheet.find_header(header_row, header).ok_or_else(missing)?,
        };
        if column == 0 || column > sheet.last_column() {
            return Err(missing());
        }
        Ok(column)
    }

    /// Resolves a column that may lie one past the used range, such as a
    /// freshly inserted column at the right edge
    pub(crate) fn resolve_target(&self, sheet: &Sheet, header_row: u32) -> Result<u32, IndexerError> {
        match self {
            ColumnRef::Position(column) if *column == sheet.last_column() + 1 && *column > 1 => Ok(*column),
            _ => self.resolve(sheet, header_row),
        }
    }
}

impl FromStr for ColumnRef {
    type Err = IndexerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let pattern = Regex::new(r"^(?:header:(.+)|([A-Za-z]{1,3})|(\d+))$").expect("Hardcode regex pattern");
        let value = value.trim();
        let captures = pattern
            .captures(value)
            .ok_or_else(|| IndexerError::InvalidColumnRef(value.to_owned()))?;
        if let Some(header) = captures.get(1) {
            return Ok(ColumnRef::Header(header.as_str().trim().to_owned()));
        }
        captures
            .get(2)
            .and_then(|letters| col_to_index(letters.as_str()))
            .or_else(|| captures.get(3).and_then(|digits| digits.as_str().parse::<u32>().ok()))
            .filter(|column| *column > 0)
            .map(ColumnRef::Position)
            .ok_or_else(|| IndexerError::InvalidColumnRef(value.to_owned()))
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = IndexerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Position(column) => write!(f, "{}", index_to_col(*column)),
            ColumnRef::Header(header) => write!(f, "header:{}", header),
        }
    }
}

/// Per-row anomaly. Never fatal, collected into the pass report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    pub sheet: String,
    pub row: u32,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Neither the 3-digit nor the 2-digit prefix is in the codebook
    NotFound { code: String },
    /// The code cell holds something other than digits
    MalformedCode { raw: String },
}

/// Outcome of one pass over one sheet
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub sheet: String,
    /// Data rows visited
    pub rows_scanned: u32,
    /// Rows whose target cell received a non-empty label
    pub rows_filled: u32,
    /// Section markers seen (section pass)
    pub sections_found: u32,
    /// Rows holding a well-formed code (matching pass)
    pub codes_found: u32,
    /// Codes resolved through the codebook (matching pass)
    pub codes_matched: u32,
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::Cell;
    use crate::spreadsheet::CellValue;

    #[test]
    fn parse_column_refs() {
        assert_eq!("F".parse::<ColumnRef>().unwrap(), ColumnRef::Position(6));
        assert_eq!("ab".parse::<ColumnRef>().unwrap(), ColumnRef::Position(28));
        assert_eq!(" 7 ".parse::<ColumnRef>().unwrap(), ColumnRef::Position(7));
        assert_eq!("header: Typ ".parse::<ColumnRef>().unwrap(), ColumnRef::Header("Typ".to_owned()));
        assert!(matches!("0".parse::<ColumnRef>(), Err(IndexerError::InvalidColumnRef(_))));
        assert!(matches!("A1".parse::<ColumnRef>(), Err(IndexerError::InvalidColumnRef(_))));
        assert!(matches!("ZZZZ".parse::<ColumnRef>(), Err(IndexerError::InvalidColumnRef(_))));
    }

    #[test]
    fn column_refs_in_toml() {
        #[derive(Deserialize)]
        struct Columns {
            marker: ColumnRef,
            label: ColumnRef,
        }
        let columns: Columns = toml::from_str("marker = \"G\"\nlabel = \"header:Popis\"").unwrap();
        assert_eq!(columns.marker, ColumnRef::Position(7));
        assert_eq!(columns.label, ColumnRef::Header("Popis".to_owned()));
    }

    #[test]
    fn resolve_against_sheet() {
        let mut sheet = Sheet::new("Data");
        sheet.set_cell(1, 1, Cell::new(CellValue::text("Kód")));
        sheet.set_cell(1, 3, Cell::new(CellValue::text("Popis")));

        assert_eq!(ColumnRef::Header("popis".to_owned()).resolve(&sheet, 1).unwrap(), 3);
        assert_eq!(ColumnRef::Position(2).resolve(&sheet, 1).unwrap(), 2);
        assert!(matches!(
            ColumnRef::Position(4).resolve(&sheet, 1),
            Err(IndexerError::MissingColumn { column, .. }) if column == "D"
        ));
        assert_eq!(ColumnRef::Position(4).resolve_target(&sheet, 1).unwrap(), 4);
        assert!(ColumnRef::Header("Typ".to_owned()).resolve(&sheet, 1).is_err());
    }

    #[test]
    fn diagnostics_serialize_flat() {
        let diagnostic = Diagnostic {
            sheet: "Data".to_owned(),
            row: 4,
            kind: DiagnosticKind::NotFound { code: "999".to_owned() },
        };
        assert_eq!(
            serde_json::to_string(&diagnostic).unwrap(),
            r#"{"sheet":"Data","row":4,"kind":"not_found","code":"999"}"#
        );
    }
}
