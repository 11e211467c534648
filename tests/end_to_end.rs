use pretty_assertions::assert_eq;
use sheet_indexer::config::Config;
use sheet_indexer::indexer::batch::run_batch;
use sheet_indexer::indexer::batch::BatchJob;
use sheet_indexer::indexer::batch::CancellationToken;
use sheet_indexer::indexer::pipeline::CodebookSource;
use sheet_indexer::indexer::pipeline::ProcessOptions;
use sheet_indexer::indexer::provider::ExcelToolsProvider;
use sheet_indexer::indexer::provider::LocalProvider;
use sheet_indexer::indexer::ColumnRef;
use sheet_indexer::indexer::CodebookConfig;
use sheet_indexer::indexer::DiagnosticKind;
use sheet_indexer::indexer::MatchConfig;
use sheet_indexer::indexer::SectionConfig;
use sheet_indexer::indexer::UnresolvedPolicy;
use sheet_indexer::spreadsheet::StyleId;
use sheet_indexer::Workbook;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::ZipArchive;
use zip::ZipWriter;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="0"/><cellXfs count="4"><xf numFmtId="0"/><xf numFmtId="0"/><xf numFmtId="0"/><xf numFmtId="0" applyFont="1"/></cellXfs></styleSheet>"#;

/// A budget with two sections before any column is inserted: codes in B,
/// section markers in F and item names in G.
const BUDGET: &str = concat!(
    r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:H7"/><sheetData>"#,
    r#"<row r="1"><c r="A1" s="3" t="inlineStr"><is><t>Pč</t></is></c><c r="B1" t="inlineStr"><is><t>Kód</t></is></c><c r="F1" t="inlineStr"><is><t>Typ</t></is></c><c r="G1" t="inlineStr"><is><t>Popis</t></is></c><c r="H1" t="inlineStr"><is><t>Cena</t></is></c></row>"#,
    r#"<row r="2"><c r="A2" s="3"><v>1</v></c><c r="F2" t="inlineStr"><is><t>D</t></is></c><c r="G2" t="inlineStr"><is><t>Zemní práce</t></is></c></row>"#,
    r#"<row r="3"><c r="A3" s="3"><v>2</v></c><c r="B3"><v>12345</v></c><c r="G3" t="inlineStr"><is><t>Výkop</t></is></c><c r="H3"><v>100</v></c></row>"#,
    r#"<row r="4"><c r="A4" s="3"><v>3</v></c><c r="B4" t="inlineStr"><is><t>124001</t></is></c><c r="G4" t="inlineStr"><is><t>Odvoz</t></is></c><c r="H4"><v>50</v></c></row>"#,
    r#"<row r="5"><c r="A5" s="3"><v>4</v></c><c r="F5" t="inlineStr"><is><t>D</t></is></c><c r="G5" t="inlineStr"><is><t>Základy</t></is></c></row>"#,
    r#"<row r="6"><c r="A6" s="3"><v>5</v></c><c r="B6"><v>99999</v></c><c r="G6" t="inlineStr"><is><t>Beton</t></is></c><c r="H6"><f>SUM(H3:H4)</f><v>150</v></c></row>"#,
    r#"<row r="7"><c r="A7" s="3"><v>6</v></c><c r="G7" t="inlineStr"><is><t>Výztuž</t></is></c></row>"#,
    r#"</sheetData><mergeCells count="1"><mergeCell ref="G7:H7"/></mergeCells><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#,
);

const CODEBOOK: &str = concat!(
    r#"<worksheet><sheetData>"#,
    r#"<row r="1"><c r="A1" t="inlineStr"><is><t>123</t></is></c><c r="B1" t="inlineStr"><is><t>Zemní práce obecně</t></is></c></row>"#,
    r#"<row r="2"><c r="A2"><v>12</v></c><c r="B2" t="inlineStr"><is><t>Dvojmístný</t></is></c></row>"#,
    r#"</sheetData></worksheet>"#,
);

fn build_xlsx(sheets: &[(&str, &str)]) -> Vec<u8> {
    let mut workbook = String::from(r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#);
    let mut rels = String::from(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for (index, (name, _)) in sheets.iter().enumerate() {
        let id = index + 1;
        workbook.push_str(&format!(r#"<sheet name="{name}" sheetId="{id}" r:id="rId{id}"/>"#));
        rels.push_str(&format!(r#"<Relationship Id="rId{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{id}.xml"/>"#));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str(r#"<Relationship Id="rId90" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut add = |name: &str, data: &str| {
        zip.start_file(name, options).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    };
    add("[Content_Types].xml", CONTENT_TYPES);
    add("xl/workbook.xml", &workbook);
    add("xl/_rels/workbook.xml.rels", &rels);
    add("xl/styles.xml", STYLES);
    for (index, (_, xml)) in sheets.iter().enumerate() {
        add(&format!("xl/worksheets/sheet{}.xml", index + 1), xml);
    }
    zip.finish().unwrap().into_inner()
}

fn read_part(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut text = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut text).unwrap();
    text
}

fn column_texts(bytes: &[u8], sheet: &str, column: u32) -> Vec<String> {
    let mut workbook = Workbook::from_bytes(bytes).unwrap();
    let sheet = workbook.sheet_mut(sheet).unwrap();
    (1..=sheet.last_row())
        .map(|number| sheet.row(number).map(|row| row.text(column).into_owned()).unwrap_or_default())
        .collect()
}

fn sections() -> ProcessOptions {
    ProcessOptions::sections(SectionConfig {
        header_row: 1,
        ..Default::default()
    })
}

fn matching() -> ProcessOptions {
    let config = MatchConfig {
        code_column: ColumnRef::Header("Kód".to_owned()),
        target_column: ColumnRef::Position(3),
        header_label: Some("Popis položky".to_owned()),
        header_row: 1,
        unresolved: UnresolvedPolicy::Marker("nenalezeno".to_owned()),
    };
    let codebook = CodebookSource::Workbook {
        bytes: Arc::new(build_xlsx(&[("Číselník", CODEBOOK)])),
        config: CodebookConfig::default(),
    };
    let mut options = ProcessOptions::matching(config, codebook);
    options.insert_column = Some(3);
    options
}

#[test]
fn sections_then_matching() {
    let provider = LocalProvider;
    let input = build_xlsx(&[("Rozpočet", BUDGET)]);
    assert_eq!(provider.analyze(&input).unwrap(), vec!["Rozpočet"]);

    let first = provider.process(&input, &sections()).unwrap();
    assert_eq!(column_texts(&first.bytes, "Rozpočet", 2), vec![
        "Oddíly",
        "Zemní práce",
        "Zemní práce",
        "Zemní práce",
        "Základy",
        "Základy",
        "Základy",
    ]);
    let report = &first.report.sheets[0];
    assert_eq!((report.sections_found, report.rows_filled, report.rows_scanned), (2, 6, 6));

    let mut workbook = Workbook::from_bytes(&first.bytes).unwrap();
    let styles = workbook.styles().unwrap();
    assert_eq!(styles.len(), 4);
    assert!(styles.contains(StyleId(3)));
    let sheet = workbook.sheet_mut("Rozpočet").unwrap();
    assert_eq!(sheet.cell(1, 2).map(|cell| cell.style), Some(StyleId(3)));
    assert_eq!(sheet.cell(5, 2).map(|cell| cell.style), Some(StyleId(3)));
    assert_eq!(sheet.cell(6, 9).and_then(|cell| cell.formula.as_ref()).map(|formula| formula.text.as_str()), Some("SUM(I3:I4)"));

    let xml = read_part(&first.bytes, "xl/worksheets/sheet1.xml");
    assert!(xml.contains(r#"<dimension ref="A1:I7"/>"#));
    assert!(xml.contains(r#"<mergeCell ref="H7:I7"/>"#));
    assert!(xml.contains(r#"<autoFilter ref="A1:I7"/>"#));
    assert!(xml.contains(r#"state="frozen""#));
    assert!(xml.contains(r#"showGridLines="0""#));
    assert_eq!(read_part(&first.bytes, "xl/styles.xml"), STYLES);

    let second = provider.process(&first.bytes, &matching()).unwrap();
    assert_eq!(column_texts(&second.bytes, "Rozpočet", 3), vec![
        "Popis položky",
        "",
        "Zemní práce obecně",
        "Dvojmístný",
        "Dvojmístný",
        "nenalezeno",
        "Dvojmístný",
    ]);
    // the section column stays where the first run put it
    assert_eq!(column_texts(&second.bytes, "Rozpočet", 2)[4], "Základy");

    let report = &second.report.sheets[0];
    assert_eq!((report.codes_found, report.codes_matched, report.rows_filled), (3, 2, 4));
    let diagnostics = second.report.diagnostics().collect::<Vec<_>>();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].row, 6);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::NotFound { code: "99999".to_owned() });
    assert_eq!(second.report.codebook.map(|stats| stats.entries), Some(2));

    let xml = read_part(&second.bytes, "xl/worksheets/sheet1.xml");
    assert!(xml.contains(r#"<autoFilter ref="A1:J7"/>"#));
}

#[test]
fn json_report() {
    let output = LocalProvider.process(&build_xlsx(&[("Rozpočet", BUDGET)]), &sections()).unwrap();
    let json = serde_json::to_value(&output.report).unwrap();

    assert_eq!(json["sheets"][0]["sheet"], "Rozpočet");
    assert_eq!(json["sheets"][0]["sections_found"], 2);
    assert!(json.get("codebook").is_none());
}

#[test]
fn config_file_drives_the_pipeline() {
    let config = Config::from_toml(
        r#"
sheets = ["Rozp*"]

[sections]
header_row = 1
header_label = "Section"

[sections.export]
show_gridlines = true
"#,
    )
    .unwrap();
    let input = build_xlsx(&[("Rekapitulace", BUDGET), ("Rozpočet", BUDGET)]);
    let output = LocalProvider.process(&input, &config.section_options()).unwrap();

    assert_eq!(read_part(&output.bytes, "xl/worksheets/sheet1.xml"), BUDGET);
    assert_eq!(column_texts(&output.bytes, "Rozpočet", 2)[0], "Section");
    let xml = read_part(&output.bytes, "xl/worksheets/sheet2.xml");
    assert!(xml.contains(r#"showGridLines="1""#));
    assert!(!xml.contains("<autoFilter"));
}

#[test]
fn batch_over_files() {
    let directory = tempfile::tempdir().unwrap();
    let jobs = ["a", "b"]
        .into_iter()
        .map(|name| {
            let input = directory.path().join(format!("{name}.xlsx"));
            std::fs::write(&input, build_xlsx(&[("Rozpočet", BUDGET)])).unwrap();
            BatchJob {
                input,
                output: directory.path().join(format!("{name}-out.xlsx")),
            }
        })
        .collect::<Vec<_>>();

    let outcomes = run_batch(&jobs, &LocalProvider, &matching(), &CancellationToken::new()).unwrap();
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        let report = outcome.result.as_ref().unwrap();
        assert_eq!(report.sheets[0].codes_matched, 2);
        let output = std::fs::read(&outcome.job.output).unwrap();
        assert_eq!(column_texts(&output, "Rozpočet", 3)[2], "Zemní práce obecně");
    }
}
