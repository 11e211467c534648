//! Worksheet part parsing and serialization.
//!
//! Rows and cells are modelled; all other elements are kept as owned events
//! and written back in their original order and form.

use crate::error::ContainerError;
use crate::error::ResultMessage;
use crate::helpers::xml::find_attribute;
use crate::helpers::xml::Attributes;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::spreadsheet::cell::format_number;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::Formula;
use crate::spreadsheet::cell::StyleId;
use crate::spreadsheet::fragment::Fragment;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::range_last_column;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Row;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xlsx::read_string_value;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Writer;
use std::io::BufRead;
use std::io::Write;

const TAG_SHEET_DATA: QName = QName(b"sheetData"); // Cell table of the worksheet
const TAG_DIMENSION: QName = QName(b"dimension"); // Used range hint
const TAG_ROW: QName = QName(b"row");             // Row in worksheet
const TAG_CELL: QName = QName(b"c");              // Cell in worksheet
const TAG_FORMULA: QName = QName(b"f");           // Cell formula
const TAG_INLINE_STRING: QName = QName(b"is");    // Inline string value
const TAG_VALUE: QName = QName(b"v");             // Cell value content

/// Where the parser is inside the worksheet
enum Section {
    Head,
    Rows,
    Tail,
}

/// Parses a worksheet part
///
/// # Arguments
/// * `name` - Sheet name from the workbook
/// * `path` - Zip path of the part
/// * `data` - Part content
/// * `shared_strings` - Shared string table used to resolve `t="s"` cells
///
/// # Returns
/// The parsed sheet
pub(crate) fn parse_sheet(name: &str, path: &str, data: &[u8], shared_strings: &[String]) -> Result<Sheet, ContainerError> {
    let mut sheet = Sheet::new(name);
    sheet.path = path.to_owned();
    sheet.head = Fragment::new(0);
    sheet.tail = Fragment::new(1);

    let mut reader = XmlReader::preserving(data);
    let mut section = Section::Head;
    let mut dimension_column = 0u32;
    let mut last_column = 0u32;
    while let Some(event) = reader.next()? {
        match section {
            Section::Head => match event {
                Event::Start(element) if element.name() == TAG_SHEET_DATA => {
                    sheet.sheet_data = element.into_owned();
                    section = Section::Rows;
                }
                Event::Empty(element) if element.name() == TAG_SHEET_DATA => {
                    sheet.sheet_data = element.into_owned();
                    section = Section::Tail;
                }
                Event::Empty(element) if element.name() == TAG_DIMENSION => {
                    dimension_column = element
                        .get_attribute_value("ref")?
                        .and_then(|range| range_last_column(&range))
                        .unwrap_or(0);
                    sheet.head.push(Event::Empty(element.into_owned()));
                }
                event => sheet.head.push(event.into_owned()),
            },
            Section::Rows => match event {
                Event::Start(element) if element.name() == TAG_ROW => {
                    let attributes = element.owned_attributes()?;
                    let row = read_row(&mut reader, attributes, next_row_number(&sheet.rows), shared_strings, true)?;
                    last_column = last_column.max(row.cells.keys().next_back().copied().unwrap_or(0));
                    sheet.rows.push(row);
                }
                Event::Empty(element) if element.name() == TAG_ROW => {
                    let attributes = element.owned_attributes()?;
                    let row = read_row(&mut reader, attributes, next_row_number(&sheet.rows), shared_strings, false)?;
                    sheet.rows.push(row);
                }
                Event::End(element) if element.name() == TAG_SHEET_DATA => section = Section::Tail,
                _ => (),
            },
            Section::Tail => sheet.tail.push(event.into_owned()),
        }
    }

    sheet.rows.sort_by_key(|row| row.number);
    sheet.last_column = last_column.max(dimension_column);
    Ok(sheet)
}

fn next_row_number(rows: &[Row]) -> u32 {
    rows.last().map(|row| row.number + 1).unwrap_or(1)
}

/// Reads a `<row>` element whose start tag has been consumed
fn read_row<R: BufRead>(
    reader: &mut XmlReader<R>,
    mut attributes: Attributes,
    fallback_number: u32,
    shared_strings: &[String],
    has_children: bool,
) -> Result<Row, ContainerError> {
    let number = find_attribute(&attributes, "r")
        .and_then(|number| number.parse::<u32>().ok())
        .unwrap_or(fallback_number);
    attributes.retain(|(key, _)| key != "r");
    let mut row = Row {
        number,
        attributes,
        ..Default::default()
    };
    if !has_children {
        return Ok(row);
    }

    let mut next_column = 1u32;
    while let Some(event) = reader.next()? {
        match event {
            Event::End(element) if element.name() == TAG_ROW => break,
            Event::Start(element) if element.name() == TAG_CELL => {
                let attributes = element.owned_attributes()?;
                let (column, cell) = read_cell(reader, attributes, number, next_column, shared_strings, true)?;
                next_column = column + 1;
                row.cells.insert(column, cell);
            }
            Event::Empty(element) if element.name() == TAG_CELL => {
                let attributes = element.owned_attributes()?;
                let (column, cell) = read_cell(reader, attributes, number, next_column, shared_strings, false)?;
                next_column = column + 1;
                row.cells.insert(column, cell);
            }
            _ => (),
        }
    }
    Ok(row)
}

/// Reads a `<c>` element whose start tag has been consumed
fn read_cell<R: BufRead>(
    reader: &mut XmlReader<R>,
    mut attributes: Attributes,
    row: u32,
    fallback_column: u32,
    shared_strings: &[String],
    has_children: bool,
) -> Result<(u32, Cell), ContainerError> {
    let reference = find_attribute(&attributes, "r").map(str::to_owned);
    let column = reference
        .as_deref()
        .and_then(reference_to_index)
        .map(|(_, column)| column)
        .unwrap_or(fallback_column);
    let style = find_attribute(&attributes, "s")
        .filter(|style| !style.is_empty())
        .map(|style| style.parse::<u32>())
        .transpose()?
        .unwrap_or(0);
    let kind = find_attribute(&attributes, "t").unwrap_or("n").to_owned();
    attributes.retain(|(key, _)| key != "r" && key != "s" && key != "t");

    let mut cell = Cell {
        style: StyleId(style),
        attributes,
        ..Default::default()
    };
    if !has_children {
        return Ok((column, cell));
    }

    let mut raw_value: Option<String> = None;
    while let Some(event) = reader.next()? {
        match event {
            Event::End(element) if element.name() == TAG_CELL => break,
            Event::Start(element) if element.name() == TAG_VALUE => {
                raw_value = Some(read_string_value(reader, TAG_VALUE, true)?);
            }
            Event::Start(element) if element.name() == TAG_INLINE_STRING => {
                let markup = reader.read_children(TAG_INLINE_STRING)?;
                raw_value = Some(inline_text(&markup)?);
                cell.inline_markup = Some(markup);
            }
            Event::Empty(element) if element.name() == TAG_INLINE_STRING => (),
            Event::Start(element) if element.name() == TAG_FORMULA => {
                let attributes = element.owned_attributes()?;
                let text = read_string_value(reader, TAG_FORMULA, true)?;
                cell.formula = Some(Formula { text, attributes });
            }
            Event::Empty(element) if element.name() == TAG_FORMULA => {
                let attributes = element.owned_attributes()?;
                cell.formula = Some(Formula { text: String::new(), attributes });
            }
            // extension lists and other children are kept as they are
            Event::Start(element) => {
                let start = element.into_owned();
                let end = start.to_end().into_owned();
                let children = reader.read_children(end.name())?;
                cell.extra_children.push(Event::Start(start));
                cell.extra_children.extend(children);
                cell.extra_children.push(Event::End(end));
            }
            Event::Empty(element) => cell.extra_children.push(Event::Empty(element.into_owned())),
            _ => (),
        }
    }

    cell.value = decode_value(&kind, raw_value, shared_strings)
        .with_prefix(&index_to_reference(row, column))?;
    Ok((column, cell))
}

/// Plain text of the content of an `<is>` element, phonetic runs excluded
fn inline_text(markup: &[Event<'static>]) -> Result<String, ContainerError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(BytesStart::new("is")))?;
    for event in markup {
        writer.write_event(event.borrow())?;
    }
    writer.write_event(Event::End(BytesEnd::new("is")))?;
    let data = writer.into_inner();
    read_string_value(&mut XmlReader::new(data.as_slice()), TAG_INLINE_STRING, false)
}

fn decode_value(kind: &str, raw_value: Option<String>, shared_strings: &[String]) -> Result<CellValue, ContainerError> {
    let Some(raw) = raw_value else {
        return Ok(CellValue::Empty);
    };
    let value = match kind {
        "s" => {
            let index = raw.trim().parse::<usize>()?;
            CellValue::Text {
                value: shared_strings.get(index).cloned().unwrap_or_default(),
                shared: Some(index),
            }
        }
        "inlineStr" => CellValue::text(raw),
        "str" => CellValue::FormulaText(raw),
        "b" => CellValue::Boolean(raw.trim() == "1" || raw.trim().eq_ignore_ascii_case("true")),
        "e" => CellValue::Error(raw),
        "d" => CellValue::Date(raw),
        _ if raw.trim().is_empty() => CellValue::Empty,
        _ => CellValue::Number(raw.trim().parse::<f64>()?),
    };
    Ok(value)
}

/// Serializes a sheet back into worksheet XML
pub(crate) fn write_sheet(sheet: &Sheet) -> Result<Vec<u8>, ContainerError> {
    let mut writer = Writer::new(Vec::new());
    for event in sheet.head.events() {
        writer.write_event(event.borrow())?;
    }
    writer.write_event(Event::Start(sheet.sheet_data.borrow()))?;
    for row in &sheet.rows {
        write_row(&mut writer, row)?;
    }
    writer.write_event(Event::End(sheet.sheet_data.to_end()))?;
    for event in sheet.tail.events() {
        writer.write_event(event.borrow())?;
    }
    Ok(writer.into_inner())
}

fn write_row<W: Write>(writer: &mut Writer<W>, row: &Row) -> Result<(), ContainerError> {
    let mut element = BytesStart::new("row");
    element.push_attribute(("r", row.number.to_string().as_str()));
    for (key, value) in &row.attributes {
        if key == "spans" {
            // spans are recomputed from the cells actually present
            if let (Some(first), Some(last)) = (row.cells.keys().next(), row.cells.keys().next_back()) {
                element.push_attribute(("spans", format!("{}:{}", first, last).as_str()));
            }
        } else {
            element.push_attribute((key.as_str(), value.as_str()));
        }
    }
    if row.cells.is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }
    writer.write_event(Event::Start(element))?;
    for (column, cell) in &row.cells {
        write_cell(writer, row.number, *column, cell)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write_cell<W: Write>(writer: &mut Writer<W>, row: u32, column: u32, cell: &Cell) -> Result<(), ContainerError> {
    let mut element = BytesStart::new("c");
    element.push_attribute(("r", index_to_reference(row, column).as_str()));
    if cell.style.0 != 0 {
        element.push_attribute(("s", cell.style.0.to_string().as_str()));
    }
    let (kind, value) = match &cell.value {
        CellValue::Empty => (None, None),
        CellValue::Number(number) => (None, Some(format_number(*number))),
        CellValue::Text { shared: Some(index), .. } => (Some("s"), Some(index.to_string())),
        CellValue::Text { value, shared: None } => (Some("inlineStr"), Some(value.to_owned())),
        CellValue::FormulaText(value) => (Some("str"), Some(value.to_owned())),
        CellValue::Boolean(value) => (Some("b"), Some(if *value { "1" } else { "0" }.to_owned())),
        CellValue::Error(value) => (Some("e"), Some(value.to_owned())),
        CellValue::Date(value) => (Some("d"), Some(value.to_owned())),
    };
    if let Some(kind) = kind {
        element.push_attribute(("t", kind));
    }
    for (key, value) in &cell.attributes {
        element.push_attribute((key.as_str(), value.as_str()));
    }
    if cell.formula.is_none() && value.is_none() && cell.extra_children.is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }

    writer.write_event(Event::Start(element))?;
    if let Some(formula) = &cell.formula {
        let mut element = BytesStart::new("f");
        for (key, value) in &formula.attributes {
            element.push_attribute((key.as_str(), value.as_str()));
        }
        if formula.text.is_empty() {
            writer.write_event(Event::Empty(element))?;
        } else {
            writer.write_event(Event::Start(element))?;
            writer.write_event(Event::Text(BytesText::new(&formula.text)))?;
            writer.write_event(Event::End(BytesEnd::new("f")))?;
        }
    }
    match (kind, value) {
        (Some("inlineStr"), Some(_)) if cell.inline_markup.is_some() => {
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            for event in cell.inline_markup.iter().flatten() {
                writer.write_event(event.borrow())?;
            }
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
        (Some("inlineStr"), Some(value)) => {
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            let mut text = BytesStart::new("t");
            if value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace) {
                text.push_attribute(("xml:space", "preserve"));
            }
            writer.write_event(Event::Start(text))?;
            writer.write_event(Event::Text(BytesText::new(&value)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
        }
        (_, Some(value)) => {
            writer.write_event(Event::Start(BytesStart::new("v")))?;
            writer.write_event(Event::Text(BytesText::new(&value)))?;
            writer.write_event(Event::End(BytesEnd::new("v")))?;
        }
        _ => (),
    }
    for event in &cell.extra_children {
        writer.write_event(event.borrow())?;
    }
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}
