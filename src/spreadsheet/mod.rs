//! # Spreadsheet Module
//!
//! In-memory model of an Office Open XML workbook. The package is held as its
//! raw parts; worksheets are parsed on first use and only parsed worksheets are
//! serialized again, every other part is written back byte-for-byte.
use crate::error::ContainerError;
use crate::error::ContainerResult;
use crate::error::IndexerError;
use crate::helpers::zip::find_part;
use crate::helpers::zip::write_parts;
use crate::helpers::zip::Part;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::excel::check_signature;
use crate::spreadsheet::excel::edit_element_text;
use crate::spreadsheet::excel::remove_calc_chain;
use crate::spreadsheet::formula::shift_sheet_references;
use crate::spreadsheet::styles::StyleArena;
use crate::spreadsheet::worksheet::parse_sheet;
use crate::spreadsheet::worksheet::write_sheet;
use crate::spreadsheet::xlsx::load_shared_strings;
use crate::spreadsheet::xlsx::load_workbook;
use crate::spreadsheet::xlsx::STYLES_PATH;
use crate::spreadsheet::xlsx::WORKBOOK_PATH;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

pub mod cell;
pub(crate) mod criteria;
pub(crate) mod excel;
pub mod export;
pub(crate) mod formula;
pub(crate) mod fragment;
pub mod insertion;
pub mod reference;
pub mod sheet;
pub mod styles;
pub(crate) mod worksheet;
pub(crate) mod xlsx;

pub use cell::Cell;
pub use cell::CellValue;
pub use cell::StyleId;
pub use criteria::SheetSelection;
pub use export::ExportOptions;
pub use sheet::Row;
pub use sheet::Sheet;
pub use styles::StyleArena as Styles;

/// A worksheet listed in the workbook, parsed lazily
#[derive(Debug)]
struct SheetEntry {
    name: String,
    path: String,
    parsed: Option<Sheet>,
}

/// An opened xlsx workbook
#[derive(Debug)]
pub struct Workbook {
    parts: Vec<Part>,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
    /// Set once a column was inserted; the calculation chain is dropped on write
    calc_chain_stale: bool,
}

impl Workbook {
    /// Opens a workbook file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Workbook, IndexerError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(ContainerError::from).on_read()?;
        debug!(path = %path.display(), size = bytes.len(), "workbook read");
        Workbook::from_bytes(&bytes)
    }

    /// Opens a workbook from its container bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Workbook, IndexerError> {
        Workbook::load(bytes).on_read()
    }

    fn load(bytes: &[u8]) -> Result<Workbook, ContainerError> {
        check_signature(bytes)?;
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let parts = archive.read_parts()?;

        let sheets = load_workbook(&parts)?
            .into_iter()
            .map(|(name, path)| SheetEntry { name, path, parsed: None })
            .collect();
        let shared_strings = load_shared_strings(&parts)?;
        Ok(Workbook {
            parts,
            sheets,
            shared_strings,
            calc_chain_stale: false,
        })
    }

    /// Worksheet names in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Reads the cell formats of the workbook. The passes only copy style ids
    /// between cells, so `styles.xml` is parsed on request and never on open.
    ///
    /// # Errors
    /// A read error when `styles.xml` is malformed
    pub fn styles(&self) -> Result<StyleArena, IndexerError> {
        match find_part(&self.parts, STYLES_PATH) {
            Some(index) => StyleArena::load(self.parts[index].xml_reader()).on_read(),
            None => Ok(StyleArena::default()),
        }
    }

    /// Returns a worksheet, parsing it on first access
    ///
    /// # Errors
    /// `MissingSheet` when no worksheet has this name, a read error when its
    /// part is missing or malformed.
    pub fn sheet_mut(&mut self, name: &str) -> Result<&mut Sheet, IndexerError> {
        let index = self
            .sheets
            .iter()
            .position(|entry| entry.name == name)
            .ok_or_else(|| IndexerError::MissingSheet(name.to_owned()))?;
        let entry = &mut self.sheets[index];
        if entry.parsed.is_none() {
            let part = find_part(&self.parts, &entry.path)
                .map(|index| &self.parts[index])
                .ok_or_else(|| ContainerError::MissingPart(entry.path.clone()))
                .on_read()?;
            let sheet = parse_sheet(&entry.name, &entry.path, &part.data, &self.shared_strings).on_read()?;
            debug!(sheet = %entry.name, rows = sheet.rows().len(), "worksheet parsed");
            entry.parsed = Some(sheet);
        }
        match entry.parsed.as_mut() {
            Some(sheet) => Ok(sheet),
            None => Err(IndexerError::MissingSheet(name.to_owned())),
        }
    }

    /// Inserts a column into a worksheet, see [`Sheet::insert_column`].
    ///
    /// `Sheet!A1` references on the other worksheets and in defined names
    /// (print areas, print titles, filter ranges, user names) move along.
    /// Other worksheets are only rewritten when one of their formulas changed.
    pub fn insert_column(&mut self, sheet: &str, at: u32) -> Result<(), IndexerError> {
        self.sheet_mut(sheet)?.insert_column(at)?;
        self.calc_chain_stale = true;

        if let Some(index) = find_part(&self.parts, WORKBOOK_PATH) {
            let shift = |text: &str| shift_sheet_references(text, sheet, at);
            if let Some(data) = edit_element_text(&self.parts[index].data, "definedName", shift).on_read()? {
                debug!(sheet, column = at, "defined names shifted");
                self.parts[index].data = data;
            }
        }
        for index in 0..self.sheets.len() {
            if self.sheets[index].name == sheet {
                continue;
            }
            let was_parsed = self.sheets[index].parsed.is_some();
            let name = self.sheets[index].name.clone();
            let changed = self.sheet_mut(&name)?.shift_references_into(sheet, at)?;
            if !changed && !was_parsed {
                self.sheets[index].parsed = None;
            }
        }
        Ok(())
    }

    /// Serializes the workbook into container bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexerError> {
        self.write().on_write()
    }

    /// Writes the workbook to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), IndexerError> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(ContainerError::from).on_write()
    }

    fn write(&self) -> Result<Vec<u8>, ContainerError> {
        let mut parts = self.parts.clone();
        for sheet in self.sheets.iter().filter_map(|entry| entry.parsed.as_ref()) {
            let index = find_part(&parts, &sheet.path).ok_or_else(|| ContainerError::MissingPart(sheet.path.clone()))?;
            parts[index].data = write_sheet(sheet)?;
        }
        if self.calc_chain_stale && remove_calc_chain(&mut parts)? {
            debug!("calculation chain removed");
        }
        let cursor = write_parts(Cursor::new(Vec::new()), &parts)?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::IndexerError;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub(crate) const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#;

    /// Builds an xlsx package with the given worksheets, shared strings and a
    /// calculation chain
    pub(crate) fn build_xlsx(sheets: &[(&str, &str)], shared_strings: &[&str]) -> Vec<u8> {
        let mut workbook = String::from(r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#);
        let mut rels = String::from(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
        for (index, (name, _)) in sheets.iter().enumerate() {
            let id = index + 1;
            workbook.push_str(&format!(r#"<sheet name="{name}" sheetId="{id}" r:id="rId{id}"/>"#));
            rels.push_str(&format!(r#"<Relationship Id="rId{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{id}.xml"/>"#));
        }
        workbook.push_str("</sheets></workbook>");
        rels.push_str(r#"<Relationship Id="rId90" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId91" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#);
        let mut table = String::from("<sst>");
        for string in shared_strings {
            table.push_str(&format!("<si><t>{string}</t></si>"));
        }
        table.push_str("</sst>");

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let mut add = |name: &str, data: &str| {
            zip.start_file(name, options).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        };
        add("[Content_Types].xml", CONTENT_TYPES);
        add("xl/workbook.xml", &workbook);
        add("xl/_rels/workbook.xml.rels", &rels);
        add("xl/sharedStrings.xml", &table);
        add("xl/calcChain.xml", r#"<calcChain><c r="A1" i="1"/></calcChain>"#);
        for (index, (_, xml)) in sheets.iter().enumerate() {
            add(&format!("xl/worksheets/sheet{}.xml", index + 1), xml);
        }
        zip.finish().unwrap().into_inner()
    }

    /// Replaces a part of a package, adding it when missing
    pub(crate) fn with_part(bytes: &[u8], name: &str, data: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut parts = archive.read_parts().unwrap();
        match find_part(&parts, name) {
            Some(index) => parts[index].data = data.as_bytes().to_vec(),
            None => parts.push(Part::new(name, data.as_bytes().to_vec())),
        }
        write_parts(Cursor::new(Vec::new()), &parts).unwrap().into_inner()
    }

    pub(crate) fn read_part(bytes: &[u8], name: &str) -> Option<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let parts = archive.read_parts().unwrap();
        find_part(&parts, name).map(|index| String::from_utf8(parts[index].data.clone()).unwrap())
    }

    const SHEET: &str = r#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1"><f>A1</f><v>1</v></c></row></sheetData></worksheet>"#;

    #[test]
    fn lists_sheets_and_parses_lazily() {
        let bytes = build_xlsx(&[("Rozpočet", SHEET), ("Druhý", SHEET)], &["Kód"]);
        let mut workbook = Workbook::from_bytes(&bytes).unwrap();

        assert_eq!(workbook.sheet_names(), vec!["Rozpočet", "Druhý"]);
        let sheet = workbook.sheet_mut("Druhý").unwrap();
        assert_eq!(sheet.row(1).map(|row| row.text(1).into_owned()), Some("Kód".to_owned()));
        assert!(matches!(workbook.sheet_mut("Chybí"), Err(IndexerError::MissingSheet(_))));
    }

    #[test]
    fn untouched_parts_are_written_back_verbatim() {
        let bytes = build_xlsx(&[("Data", SHEET)], &["Kód"]);
        let mut workbook = Workbook::from_bytes(&bytes).unwrap();
        workbook.sheet_mut("Data").unwrap().row_mut(1).write_text(3, "nový", None);
        let written = workbook.to_bytes().unwrap();

        for name in ["[Content_Types].xml", "xl/workbook.xml", "xl/sharedStrings.xml", "xl/calcChain.xml"] {
            assert_eq!(read_part(&written, name), read_part(&bytes, name), "{name}");
        }
        let sheet = read_part(&written, "xl/worksheets/sheet1.xml").unwrap();
        assert!(sheet.contains(r#"<c r="C1" t="inlineStr"><is><t>nový</t></is></c>"#));
    }

    #[test]
    fn insertion_drops_the_calc_chain() {
        let bytes = build_xlsx(&[("Data", SHEET)], &["Kód"]);
        let mut workbook = Workbook::from_bytes(&bytes).unwrap();
        workbook.insert_column("Data", 1).unwrap();
        let written = workbook.to_bytes().unwrap();

        assert_eq!(read_part(&written, "xl/calcChain.xml"), None);
        assert!(!read_part(&written, "[Content_Types].xml").unwrap().contains("calcChain"));
        let sheet = read_part(&written, "xl/worksheets/sheet1.xml").unwrap();
        assert!(sheet.contains(r#"<c r="C1"><f>B1</f><v>1</v></c>"#));
    }

    #[test]
    fn insertion_shifts_defined_names() {
        let workbook = concat!(
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<sheets><sheet name="Data" sheetId="1" r:id="rId1"/><sheet name="Recap" sheetId="2" r:id="rId2"/></sheets>"#,
            r#"<definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">Data!$A$1:$C$3</definedName>"#,
            r#"<definedName name="Totals">Recap!$B$1</definedName></definedNames></workbook>"#,
        );
        let bytes = with_part(&build_xlsx(&[("Data", SHEET), ("Recap", SHEET)], &["Kód"]), "xl/workbook.xml", workbook);
        let mut workbook = Workbook::from_bytes(&bytes).unwrap();
        workbook.insert_column("Data", 2).unwrap();
        let written = read_part(&workbook.to_bytes().unwrap(), "xl/workbook.xml").unwrap();

        assert!(written.contains(r#"<definedName name="_xlnm.Print_Area" localSheetId="0">Data!$A$1:$D$3</definedName>"#));
        assert!(written.contains(r#"<definedName name="Totals">Recap!$B$1</definedName>"#));
    }

    #[test]
    fn insertion_shifts_references_from_other_sheets() {
        let recap = r#"<worksheet><sheetData><row r="1"><c r="A1"><f>SUM(Data!B1:C1)+B1</f><v>0</v></c></row></sheetData></worksheet>"#;
        let bytes = build_xlsx(&[("Data", SHEET), ("Recap", recap), ("Plain", SHEET)], &["Kód"]);
        let mut workbook = Workbook::from_bytes(&bytes).unwrap();
        workbook.insert_column("Data", 2).unwrap();
        let written = workbook.to_bytes().unwrap();

        let recap = read_part(&written, "xl/worksheets/sheet2.xml").unwrap();
        assert!(recap.contains("<f>SUM(Data!C1:D1)+B1</f>"));
        // sheets without references into Data are written back verbatim
        assert_eq!(read_part(&written, "xl/worksheets/sheet3.xml"), read_part(&bytes, "xl/worksheets/sheet3.xml"));
    }

    #[test]
    fn styles_are_read_on_request() {
        let styles = r#"<styleSheet><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" fontId="x"/></cellXfs></styleSheet>"#;
        let bytes = with_part(&build_xlsx(&[("Data", SHEET)], &["Kód"]), "xl/styles.xml", styles);
        let mut workbook = Workbook::from_bytes(&bytes).unwrap();
        workbook.sheet_mut("Data").unwrap().row_mut(1).write_text(3, "nový", None);

        assert!(workbook.to_bytes().is_ok());
        assert!(matches!(workbook.styles(), Err(IndexerError::ContainerReadError(_))));
        let plain = Workbook::from_bytes(&build_xlsx(&[("Data", SHEET)], &[])).unwrap();
        assert!(plain.styles().unwrap().is_empty());
    }

    #[test]
    fn save_and_reopen() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("out.xlsx");
        let mut workbook = Workbook::from_bytes(&build_xlsx(&[("Data", SHEET)], &["Kód"])).unwrap();
        workbook.sheet_mut("Data").unwrap().row_mut(2).write_text(1, "x", None);
        workbook.save(&path).unwrap();

        let mut reopened = Workbook::open(&path).unwrap();
        assert_eq!(reopened.sheet_mut("Data").unwrap().row(2).map(|row| row.text(1).into_owned()), Some("x".to_owned()));
    }

    #[test]
    fn rejects_other_containers() {
        assert!(matches!(Workbook::from_bytes(b"not a workbook"), Err(IndexerError::ContainerReadError(_))));
    }
}
