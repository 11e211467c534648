//! Codebook index: code prefix to description, read from a reference workbook.
use crate::error::IndexerError;
use crate::indexer::ColumnRef;
use crate::spreadsheet::Row;
use crate::spreadsheet::Workbook;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;
use tracing::info;

/// Where the codebook keeps its codes and descriptions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodebookLayout {
    /// The first two non-empty cells of each row are the code and its
    /// description, wherever they are
    #[default]
    FirstTwoNonEmpty,
    /// Fixed code and description columns
    Fixed { code: ColumnRef, description: ColumnRef },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodebookConfig {
    /// Sheet holding the codebook, the first sheet when not set
    pub sheet: Option<String>,
    pub layout: CodebookLayout,
    /// Header row of the codebook sheet, skipped when reading entries.
    /// 0 reads from the first row.
    pub header_row: u32,
}

/// Counters collected while the codebook is built
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CodebookStats {
    /// Distinct prefixes
    pub entries: usize,
    /// Entries replaced by a later row with the same prefix
    pub duplicates: usize,
    /// Rows with content but without both a code and a description
    pub skipped: usize,
}

/// Exact-prefix lookup table. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct Codebook {
    entries: HashMap<String, String>,
    stats: CodebookStats,
}

impl Codebook {
    /// Builds the codebook from a reference workbook.
    ///
    /// Keys and descriptions are the trimmed display text of their cells, so a
    /// numeric key `123.0` is stored as `"123"`. When a key repeats, the later
    /// row wins.
    ///
    /// # Errors
    /// `MissingSheet` when the configured sheet does not exist, `MissingColumn`
    /// when a fixed column cannot be resolved.
    pub fn build(workbook: &mut Workbook, config: &CodebookConfig) -> Result<Codebook, IndexerError> {
        let name = match &config.sheet {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .map(|name| name.to_string())
                .ok_or_else(|| IndexerError::MissingSheet("<first sheet>".to_owned()))?,
        };
        let sheet = workbook.sheet_mut(&name)?;
        let columns = match &config.layout {
            CodebookLayout::FirstTwoNonEmpty => None,
            CodebookLayout::Fixed { code, description } => Some((
                code.resolve(sheet, config.header_row)?,
                description.resolve(sheet, config.header_row)?,
            )),
        };

        let mut codebook = Codebook::default();
        for row in sheet.rows().iter().filter(|row| row.number > config.header_row) {
            let entry = match columns {
                None => first_two_non_empty(row),
                Some((code, description)) => Some((row.text(code).into_owned(), row.text(description).into_owned())),
            };
            match entry {
                Some((code, description)) if !code.is_empty() && !description.is_empty() => {
                    codebook.insert(code, description);
                }
                _ if row.has_content() => codebook.stats.skipped += 1,
                _ => (),
            }
        }
        info!(
            sheet = %name,
            entries = codebook.stats.entries,
            duplicates = codebook.stats.duplicates,
            skipped = codebook.stats.skipped,
            "codebook loaded"
        );
        Ok(codebook)
    }

    /// Builds a codebook from pairs, later pairs overwriting earlier ones
    pub fn from_entries<I, K, V>(entries: I) -> Codebook
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut codebook = Codebook::default();
        for (code, description) in entries {
            codebook.insert(code.into(), description.into());
        }
        codebook
    }

    fn insert(&mut self, code: String, description: String) {
        if let Some(previous) = self.entries.insert(code.clone(), description) {
            debug!(code = %code, previous = %previous, "codebook entry overwritten");
            self.stats.duplicates += 1;
        }
        self.stats.entries = self.entries.len();
    }

    /// Exact lookup of a prefix
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CodebookStats {
        self.stats
    }
}

fn first_two_non_empty(row: &Row) -> Option<(String, String)> {
    let mut texts = row
        .cells
        .keys()
        .map(|column| row.text(*column))
        .filter(|text| !text.is_empty());
    let code = texts.next()?.into_owned();
    let description = texts.next()?.into_owned();
    Some((code, description))
}
