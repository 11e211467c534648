//! Configuration file (TOML).
//!
//! Every key is optional; missing keys take the built-in defaults of each
//! tool. Command line flags override the file.
//!
//! ```toml
//! sheets = ["SO *"]
//!
//! [sections]
//! marker_column = "G"
//! label_column = "header:Popis"
//!
//! [matching]
//! code_column = "F"
//! unresolved = { marker = "nenalezeno" }
//!
//! [matching.codebook]
//! sheet = "Index"
//! ```
use crate::error::IndexerError;
use crate::indexer::pipeline::CodebookSource;
use crate::indexer::pipeline::ProcessOptions;
use crate::indexer::CodebookConfig;
use crate::indexer::ColumnRef;
use crate::indexer::MatchConfig;
use crate::indexer::SectionConfig;
use crate::spreadsheet::ExportOptions;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider name, overridden by `SHEET_INDEXER_PROVIDER`
    pub provider: Option<String>,
    /// Sheets to process: exact names or glob patterns
    pub sheets: Vec<String>,
    pub sections: SectionSettings,
    pub matching: MatchSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionSettings {
    #[serde(flatten)]
    pub pass: SectionConfig,
    pub insert_column: Option<u32>,
    pub column_width: Option<f64>,
    pub header_mapping: BTreeMap<String, ColumnRef>,
    pub export: ExportOptions,
}

impl Default for SectionSettings {
    fn default() -> Self {
        SectionSettings {
            pass: SectionConfig::default(),
            insert_column: Some(2),
            column_width: Some(25.0),
            header_mapping: BTreeMap::new(),
            export: ExportOptions {
                apply_filter: Some(true),
                freeze_header: Some(true),
                show_gridlines: Some(false),
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    #[serde(flatten)]
    pub pass: MatchConfig,
    pub codebook: CodebookConfig,
    pub insert_column: Option<u32>,
    pub column_width: Option<f64>,
    pub header_mapping: BTreeMap<String, ColumnRef>,
    pub export: ExportOptions,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config, IndexerError> {
        Ok(toml::from_str(text)?)
    }

    /// Pipeline options of the section tool
    pub fn section_options(&self) -> ProcessOptions {
        let settings = &self.sections;
        let mut options = ProcessOptions::sections(settings.pass.clone());
        options.insert_column = settings.insert_column;
        options.insert_column_width = settings.column_width;
        options.sheets_to_include = self.sheets.clone();
        options.header_mapping = settings.header_mapping.clone();
        options.export = settings.export;
        options
    }

    /// Pipeline options of the matching tool, reading the codebook from
    /// `codebook` container bytes
    pub fn matching_options(&self, codebook: Vec<u8>) -> ProcessOptions {
        let settings = &self.matching;
        let source = CodebookSource::Workbook {
            bytes: Arc::new(codebook),
            config: settings.codebook.clone(),
        };
        let mut options = ProcessOptions::matching(settings.pass.clone(), source);
        options.insert_column = settings.insert_column;
        options.insert_column_width = settings.column_width;
        options.sheets_to_include = self.sheets.clone();
        options.header_mapping = settings.header_mapping.clone();
        options.export = settings.export;
        options
    }
}
