//! # Sheet Indexer
//!
//! Annotates construction budget workbooks (`.xlsx`) in place.
//!
//! ## Tools
//!
//! - **Sections**: inserts a column and fills every row with the name of the
//!   section it belongs to. A section starts at a row whose marker column holds
//!   the sentinel (`D` by default) and is named by its label column.
//! - **Matching**: looks up the numeric code of each row in a codebook workbook
//!   by its 3-digit prefix, then its 2-digit prefix, and writes the description
//!   into a target column. Descriptions carry over to the following rows until
//!   the next code.
//!
//! Both tools keep everything else in the workbook untouched: parts that are
//! not edited are copied byte for byte, and edited worksheets keep their
//! formulas, merges, styles and conditional formats shifted with the column
//! insertion.
//!
//! ## Example
//!
//! ```no_run
//! use sheet_indexer::indexer::pipeline::ProcessOptions;
//! use sheet_indexer::indexer::provider::ExcelToolsProvider;
//! use sheet_indexer::indexer::provider::LocalProvider;
//! use sheet_indexer::indexer::SectionConfig;
//!
//! let bytes = std::fs::read("budget.xlsx")?;
//! let output = LocalProvider.process(&bytes, &ProcessOptions::sections(SectionConfig::default()))?;
//! std::fs::write("budget-sections.xlsx", &output.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod config;
pub mod error;
pub(crate) mod helpers;
pub mod indexer;
pub mod spreadsheet;

pub use crate::error::IndexerError;
pub use crate::spreadsheet::Workbook;
