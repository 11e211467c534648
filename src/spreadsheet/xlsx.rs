use crate::error::ContainerError;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::find_part;
use crate::helpers::zip::Part;
use crate::match_xml_events;
use crate::spreadsheet::excel::load_relationships;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::io::BufRead;

// XML tag names for parsing Excel XLSX format
const TAG_SHARED_STRING_ITEM: QName = QName(b"si"); // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");     // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                // Text content within strings
const TAG_SHEET: QName = QName(b"sheet");           // Worksheet definition

pub(crate) const WORKBOOK_PATH: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";
pub(crate) const STYLES_PATH: &str = "xl/styles.xml";

/// Loads the worksheet list from `workbook.xml`
///
/// Parses the workbook part to extract worksheet names and resolves their
/// part paths through the workbook relationships. Chart sheets and dialog
/// sheets are skipped.
///
/// # Arguments
/// * `parts` - Package parts
///
/// # Returns
/// Worksheets as (name, zip_path) pairs in workbook order
pub(crate) fn load_workbook(parts: &[Part]) -> Result<Vec<(String, String)>, ContainerError> {
    if find_part(parts, "xl/workbook.bin").is_some() {
        return Err(ContainerError::UnsupportedFormat("binary workbook (xlsb)".to_owned()));
    }
    let relationships = load_relationships(parts, WORKBOOK_RELS_PATH)?;
    let workbook = find_part(parts, WORKBOOK_PATH)
        .map(|index| &parts[index])
        .ok_or_else(|| ContainerError::MissingPart(WORKBOOK_PATH.to_owned()))?;
    let mut reader = workbook.xml_reader();
    let mut sheets: Vec<(String, String)> = Vec::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(relationship) = relationships.get(id.as_ref()) {
                    if relationship.kind.ends_with("/worksheet") {
                        sheets.push((name.to_string(), relationship.target.to_owned()));
                    }
                }
            }
        }
    });
    Ok(sheets)
}

/// Loads the plain text of every shared string.
///
/// Rich text runs are concatenated; the table itself is never rewritten, so
/// their formatting survives for cells the passes do not touch.
pub(crate) fn load_shared_strings(parts: &[Part]) -> Result<Vec<String>, ContainerError> {
    let mut shared_strings = Vec::<String>::new();
    let Some(index) = find_part(parts, SHARED_STRINGS_PATH) else {
        return Ok(shared_strings);
    };
    let mut reader = parts[index].xml_reader();
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Reads string value from XML content, handling text and CDATA sections
///
/// Extracts string content from XML elements, skipping phonetic text annotations
/// and properly handling both text nodes and CDATA sections.
///
/// # Arguments
/// * `reader` - XML reader positioned at the start of the string content
/// * `end_tag` - XML tag that marks the end of the string content
/// * `is_text_content` - Whether to treat the content as text by default
///
/// # Returns
/// Extracted string value
pub(crate) fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, ContainerError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}
