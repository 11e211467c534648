//! One pipeline run: load, insert the column, run a pass on every selected
//! sheet, apply the export flags and serialize.
use crate::error::IndexerError;
use crate::indexer::codebook::CodebookStats;
use crate::indexer::matching::match_codes;
use crate::indexer::progress::NoProgress;
use crate::indexer::progress::Progress;
use crate::indexer::sections::fill_sections;
use crate::indexer::Codebook;
use crate::indexer::CodebookConfig;
use crate::indexer::ColumnRef;
use crate::indexer::Diagnostic;
use crate::indexer::MatchConfig;
use crate::indexer::PassReport;
use crate::indexer::SectionConfig;
use crate::spreadsheet::ExportOptions;
use crate::spreadsheet::SheetSelection;
use crate::spreadsheet::Workbook;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Where the codebook of a matching run comes from
#[derive(Clone, Debug)]
pub enum CodebookSource {
    /// Container bytes of the codebook workbook, read on every run
    Workbook { bytes: Arc<Vec<u8>>, config: CodebookConfig },
    /// A codebook built beforehand and shared between runs
    Loaded(Arc<Codebook>),
}

impl CodebookSource {
    pub fn load(&self) -> Result<Arc<Codebook>, IndexerError> {
        match self {
            CodebookSource::Workbook { bytes, config } => {
                let mut workbook = Workbook::from_bytes(bytes)?;
                Ok(Arc::new(Codebook::build(&mut workbook, config)?))
            }
            CodebookSource::Loaded(codebook) => Ok(codebook.clone()),
        }
    }
}

/// The pass a run performs
#[derive(Clone, Debug)]
pub enum Tool {
    Sections(SectionConfig),
    Matching { config: MatchConfig, codebook: CodebookSource },
}

/// Options of one pipeline run
#[derive(Clone)]
pub struct ProcessOptions {
    pub tool: Tool,
    /// Column inserted into every selected sheet before the pass
    pub insert_column: Option<u32>,
    /// Width given to the inserted column
    pub insert_column_width: Option<f64>,
    /// Exact sheet names or glob patterns; empty selects the first sheet
    pub sheets_to_include: Vec<String>,
    /// Column overrides by role: `marker`, `label`, `target` and `style_from`
    /// for sections, `code` and `target` for matching
    pub header_mapping: BTreeMap<String, ColumnRef>,
    pub export: ExportOptions,
    pub progress: Arc<dyn Progress>,
}

impl ProcessOptions {
    pub fn new(tool: Tool) -> ProcessOptions {
        ProcessOptions {
            tool,
            insert_column: None,
            insert_column_width: None,
            sheets_to_include: Vec::new(),
            header_mapping: BTreeMap::new(),
            export: ExportOptions::default(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Options of the section tool with its usual setup: a new column B
    /// receiving the sections, an autofilter, a frozen header and no gridlines
    pub fn sections(config: SectionConfig) -> ProcessOptions {
        ProcessOptions {
            insert_column: Some(2),
            insert_column_width: Some(25.0),
            export: ExportOptions {
                apply_filter: Some(true),
                freeze_header: Some(true),
                show_gridlines: Some(false),
            },
            ..ProcessOptions::new(Tool::Sections(config))
        }
    }

    /// Options of the matching tool, which works on the sheet as it is
    pub fn matching(config: MatchConfig, codebook: CodebookSource) -> ProcessOptions {
        ProcessOptions::new(Tool::Matching { config, codebook })
    }

    /// Loads the codebook once, so clones of these options share it
    pub fn with_loaded_codebook(mut self) -> Result<ProcessOptions, IndexerError> {
        if let Tool::Matching { codebook, .. } = &mut self.tool {
            *codebook = CodebookSource::Loaded(codebook.load()?);
        }
        Ok(self)
    }

    fn section_config(&self, config: &SectionConfig) -> Result<SectionConfig, IndexerError> {
        let mut config = config.clone();
        for (role, column) in &self.header_mapping {
            match role.as_str() {
                "marker" => config.marker_column = column.clone(),
                "label" => config.label_column = column.clone(),
                "target" => config.target_column = column.clone(),
                "style_from" => config.style_from_column = Some(column.clone()),
                _ => return Err(IndexerError::UnknownRole(role.clone())),
            }
        }
        Ok(config)
    }

    fn match_config(&self, config: &MatchConfig) -> Result<MatchConfig, IndexerError> {
        let mut config = config.clone();
        for (role, column) in &self.header_mapping {
            match role.as_str() {
                "code" => config.code_column = column.clone(),
                "target" => config.target_column = column.clone(),
                _ => return Err(IndexerError::UnknownRole(role.clone())),
            }
        }
        Ok(config)
    }
}

impl fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("tool", &self.tool)
            .field("insert_column", &self.insert_column)
            .field("insert_column_width", &self.insert_column_width)
            .field("sheets_to_include", &self.sheets_to_include)
            .field("header_mapping", &self.header_mapping)
            .field("export", &self.export)
            .finish_non_exhaustive()
    }
}

/// Statistics and diagnostics of one run
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProcessReport {
    /// One report per processed sheet, in workbook order
    pub sheets: Vec<PassReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codebook: Option<CodebookStats>,
}

impl ProcessReport {
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.sheets.iter().flat_map(|sheet| sheet.diagnostics.iter())
    }
}

/// Result of a successful run
#[derive(Clone, Debug)]
pub struct ProcessOutput {
    /// Container bytes of the processed workbook
    pub bytes: Vec<u8>,
    pub report: ProcessReport,
}

/// Sheet names of a workbook, in workbook order
pub fn analyze(bytes: &[u8]) -> Result<Vec<String>, IndexerError> {
    let workbook = Workbook::from_bytes(bytes)?;
    Ok(workbook.sheet_names().into_iter().map(str::to_owned).collect())
}

/// Runs the pipeline on one workbook.
///
/// Any structural failure aborts the whole run and no output is produced;
/// per-row anomalies end up in the report.
pub fn process(bytes: &[u8], options: &ProcessOptions) -> Result<ProcessOutput, IndexerError> {
    let progress = options.progress.as_ref();
    progress.message("Loading workbook");
    let mut workbook = Workbook::from_bytes(bytes)?;
    let mut report = ProcessReport::default();

    let codebook = match &options.tool {
        Tool::Matching { codebook, .. } => {
            progress.message("Loading codebook");
            let codebook = codebook.load()?;
            report.codebook = Some(codebook.stats());
            Some(codebook)
        }
        Tool::Sections(_) => None,
    };

    let selection = SheetSelection::new(&options.sheets_to_include)?;
    let names = selection
        .select(&workbook.sheet_names())?
        .into_iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();

    for name in &names {
        if let Some(at) = options.insert_column {
            workbook.insert_column(name, at)?;
            if let Some(width) = options.insert_column_width {
                workbook.sheet_mut(name)?.set_column_width(at, width)?;
            }
        }
        let sheet = workbook.sheet_mut(name)?;
        let (pass, header_row) = match (&options.tool, &codebook) {
            (Tool::Sections(config), _) => {
                let config = options.section_config(config)?;
                (fill_sections(sheet, &config, progress)?, config.header_row)
            }
            (Tool::Matching { config, .. }, Some(codebook)) => {
                let config = options.match_config(config)?;
                (match_codes(sheet, codebook, &config, progress)?, config.header_row)
            }
            (Tool::Matching { .. }, None) => continue,
        };
        sheet.apply_export(&options.export, header_row)?;
        report.sheets.push(pass);
    }

    progress.message("Writing workbook");
    let bytes = workbook.to_bytes()?;
    info!(
        sheets = report.sheets.len(),
        diagnostics = report.diagnostics().count(),
        size = bytes.len(),
        "workbook processed"
    );
    Ok(ProcessOutput { bytes, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::progress::RecordedProgress;
    use crate::indexer::UnresolvedPolicy;
    use crate::spreadsheet::tests::build_xlsx;
    use crate::spreadsheet::tests::read_part;
    use pretty_assertions::assert_eq;

    const BUDGET: &str = concat!(
        r#"<worksheet><dimension ref="A1:C4"/><sheetData>"#,
        r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c></row>"#,
        r#"<row r="2"><c r="A2"><v>1</v></c><c r="B2" t="s"><v>3</v></c><c r="C2" t="s"><v>4</v></c></row>"#,
        r#"<row r="3"><c r="A3"><v>2</v></c><c r="C3"><v>12345</v></c></row>"#,
        r#"<row r="4"><c r="A4"><v>3</v></c><c r="C4"><f>C3*2</f><v>24690</v></c></row>"#,
        r#"</sheetData><pageMargins left="0.7"/></worksheet>"#,
    );
    const STRINGS: [&str; 5] = ["Pč", "Typ", "Kód", "D", "Zemní práce"];

    fn budget() -> Vec<u8> {
        build_xlsx(&[("Rozpočet", BUDGET), ("Rekapitulace", BUDGET)], &STRINGS)
    }

    fn sections() -> ProcessOptions {
        let config = SectionConfig {
            marker_column: ColumnRef::Header("Typ".to_owned()),
            label_column: ColumnRef::Header("Kód".to_owned()),
            style_from_column: None,
            ..Default::default()
        };
        ProcessOptions::sections(config)
    }

    #[test]
    fn analyze_lists_sheets() {
        assert_eq!(analyze(&budget()).unwrap(), vec!["Rozpočet", "Rekapitulace"]);
    }

    #[test]
    fn sections_on_the_first_sheet() {
        let output = process(&budget(), &sections()).unwrap();
        let sheet = read_part(&output.bytes, "xl/worksheets/sheet1.xml").unwrap();

        assert!(sheet.contains(r#"<c r="B1" t="inlineStr"><is><t>Oddíly</t></is></c>"#));
        assert!(sheet.contains(r#"<c r="B2" t="inlineStr"><is><t>Zemní práce</t></is></c>"#));
        assert!(sheet.contains(r#"<c r="D4"><f>D3*2</f><v>24690</v></c>"#));
        assert!(sheet.contains(r#"<cols><col min="2" max="2" width="25" customWidth="1"/></cols>"#));
        assert!(sheet.contains(r#"<autoFilter ref="A1:D4"/>"#));
        assert!(sheet.contains(r#"showGridLines="0""#));
        // the second sheet was not selected
        assert_eq!(read_part(&output.bytes, "xl/worksheets/sheet2.xml").unwrap(), BUDGET);
        assert_eq!(read_part(&output.bytes, "xl/calcChain.xml"), None);
        assert_eq!(output.report.sheets.len(), 1);
        assert_eq!(output.report.sheets[0].rows_filled, 3);
    }

    #[test]
    fn header_mapping_overrides_columns() {
        let mut options = sections();
        options.header_mapping.insert("label".to_owned(), ColumnRef::Header("Pč".to_owned()));
        options.sheets_to_include = vec!["Rek*".to_owned()];
        let output = process(&budget(), &options).unwrap();
        let sheet = read_part(&output.bytes, "xl/worksheets/sheet2.xml").unwrap();

        assert!(sheet.contains(r#"<c r="B2" t="inlineStr"><is><t>1</t></is></c>"#));
        assert_eq!(output.report.sheets[0].sheet, "Rekapitulace");

        options.header_mapping.insert("code".to_owned(), ColumnRef::Position(1));
        assert!(matches!(process(&budget(), &options), Err(IndexerError::UnknownRole(role)) if role == "code"));
    }

    #[test]
    fn matching_with_codebook_workbook() {
        let index = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>123</v></c><c r="B1" t="inlineStr"><is><t>Zemní práce</t></is></c></row></sheetData></worksheet>"#;
        let codebook = CodebookSource::Workbook {
            bytes: Arc::new(build_xlsx(&[("Index", index)], &[])),
            config: CodebookConfig::default(),
        };
        let config = MatchConfig {
            code_column: ColumnRef::Position(3),
            target_column: ColumnRef::Position(2),
            header_row: 1,
            unresolved: UnresolvedPolicy::Marker("?".to_owned()),
            ..Default::default()
        };
        let progress = Arc::new(RecordedProgress::default());
        let mut options = ProcessOptions::matching(config, codebook).with_loaded_codebook().unwrap();
        options.progress = progress.clone() as Arc<dyn Progress>;
        let output = process(&budget(), &options).unwrap();
        let sheet = read_part(&output.bytes, "xl/worksheets/sheet1.xml").unwrap();

        assert!(sheet.contains(r#"<c r="B3" t="inlineStr"><is><t>Zemní práce</t></is></c>"#));
        assert!(sheet.contains(r#"<c r="B4" t="inlineStr"><is><t>?</t></is></c>"#));
        // the column was not inserted, the calculation chain stays
        assert!(read_part(&output.bytes, "xl/calcChain.xml").is_some());
        assert_eq!(output.report.codebook.map(|stats| stats.entries), Some(1));
        assert_eq!(output.report.diagnostics().count(), 2);
        assert_eq!(progress.messages.lock().unwrap().first().map(String::as_str), Some("Loading workbook"));
    }

    #[test]
    fn structural_failures_produce_no_output() {
        let mut options = sections();
        options.insert_column = Some(9);
        assert!(matches!(process(&budget(), &options), Err(IndexerError::InvalidPosition { position: 9, upper: 4 })));

        options.insert_column = Some(2);
        options.sheets_to_include = vec!["Chybí".to_owned()];
        assert!(matches!(process(&budget(), &options), Err(IndexerError::MissingSheet(_))));
    }
}
