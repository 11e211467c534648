//! Office Open XML package helpers
use crate::error::ContainerError;
use crate::helpers::xml::find_attribute;
use crate::helpers::xml::Attributes;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::find_part;
use crate::helpers::zip::Part;
use crate::match_xml_events;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Writer;
use std::borrow::Cow;
use std::collections::HashMap;

/// XML tag name for relationship elements in Excel files
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Compound File Binary signature used by legacy `.xls` and encrypted packages
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Zip local file header signature
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Relationship of the workbook part
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Relationship {
    /// Relationship type URI
    pub(crate) kind: String,
    /// Zip path of the target part
    pub(crate) target: String,
}

/// Checks the container signature before the zip reader sees it
///
/// # Arguments
/// * `bytes` - Raw file content
///
/// # Returns
/// An error naming the format for anything that is not a zip package
pub(crate) fn check_signature(bytes: &[u8]) -> Result<(), ContainerError> {
    if bytes.starts_with(&CFB_SIGNATURE) {
        Err(ContainerError::UnsupportedFormat(
            "legacy binary workbook or password protected package".to_owned(),
        ))
    } else if !bytes.starts_with(&ZIP_SIGNATURE) {
        Err(ContainerError::UnsupportedFormat("not a zip package".to_owned()))
    } else {
        Ok(())
    }
}

/// Loads the relationships of a part
///
/// # Arguments
/// * `parts` - Package parts
/// * `path` - Path to the relationships XML file within the archive
///
/// # Returns
/// Mapping of relationship IDs to their type and target path
pub(crate) fn load_relationships(parts: &[Part], path: &str) -> Result<HashMap<String, Relationship>, ContainerError> {
    let part = find_part(parts, path)
        .map(|index| &parts[index])
        .ok_or_else(|| ContainerError::MissingPart(path.to_owned()))?;
    let mut reader = part.xml_reader();
    let mut relationships = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if let Some((id, target)) = id.zip(target) {
                relationships.insert(id.to_string(), Relationship {
                    kind: kind.map(|kind| kind.into_owned()).unwrap_or_default(),
                    target: to_zip_path(target),
                });
            }
        }
    });
    Ok(relationships)
}

/// Normalizes a path to ensure it points to the correct location within the Excel zip archive
///
/// # Arguments
/// * `path` - Original path from relationship or reference
///
/// # Returns
/// Normalized path suitable for accessing files within the zip archive
pub(crate) fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Rewrites an XML part without the elements named `tag` for which `matches`
/// returns true. Everything else is copied event by event.
pub(crate) fn remove_elements<F>(data: &[u8], tag: &str, matches: F) -> Result<Vec<u8>, ContainerError>
where
    F: Fn(&Attributes) -> bool,
{
    let mut reader = XmlReader::preserving(data);
    let mut writer = Writer::new(Vec::with_capacity(data.len()));
    let mut skipping = 0usize;
    while let Some(event) = reader.next()? {
        if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                _ => (),
            }
            continue;
        }
        let dropped = match &event {
            Event::Start(element) | Event::Empty(element) if element.local_name().as_ref() == tag.as_bytes() => {
                matches(&element.owned_attributes()?)
            }
            _ => false,
        };
        if !dropped {
            writer.write_event(event)?;
        } else if matches!(event, Event::Start(_)) {
            skipping = 1;
        }
    }
    Ok(writer.into_inner())
}

/// Rewrites the text of every element named `tag` through `edit`.
/// Elements whose text comes back unchanged are copied as they are.
///
/// # Returns
/// The new part content, or None when no text changed
pub(crate) fn edit_element_text<F>(data: &[u8], tag: &str, edit: F) -> Result<Option<Vec<u8>>, ContainerError>
where
    F: Fn(&str) -> String,
{
    let mut reader = XmlReader::preserving(data);
    let mut writer = Writer::new(Vec::with_capacity(data.len()));
    let mut changed = false;
    while let Some(event) = reader.next()? {
        let start = match event {
            Event::Start(element) if element.local_name().as_ref() == tag.as_bytes() => element.into_owned(),
            event => {
                writer.write_event(event)?;
                continue;
            }
        };
        let end = start.to_end().into_owned();
        let children = reader.read_children(end.name())?;
        let mut text = String::new();
        for child in &children {
            match child {
                Event::Text(event) => text.push_bytes_text(event)?,
                Event::GeneralRef(event) => text.push_bytes_ref(event)?,
                Event::CData(event) => text.push_str(&event.xml_content()?),
                _ => (),
            }
        }
        let edited = edit(&text);
        writer.write_event(Event::Start(start.borrow()))?;
        if edited == text {
            for child in &children {
                writer.write_event(child.borrow())?;
            }
        } else {
            changed = true;
            writer.write_event(Event::Text(BytesText::new(&edited)))?;
        }
        writer.write_event(Event::End(end))?;
    }
    Ok(changed.then(|| writer.into_inner()))
}

/// Removes the calculation chain from the package.
///
/// The chain caches formula cells by address and goes stale once columns
/// move; Excel rebuilds it when it is missing.
pub(crate) fn remove_calc_chain(parts: &mut Vec<Part>) -> Result<bool, ContainerError> {
    let Some(index) = find_part(parts, "xl/calcChain.xml") else {
        return Ok(false);
    };
    parts.remove(index);

    if let Some(index) = find_part(parts, "xl/_rels/workbook.xml.rels") {
        parts[index].data = remove_elements(&parts[index].data, "Relationship", |attributes| {
            find_attribute(attributes, "Type").is_some_and(|kind| kind.ends_with("/calcChain"))
        })?;
    }
    if let Some(index) = find_part(parts, "[Content_Types].xml") {
        parts[index].data = remove_elements(&parts[index].data, "Override", |attributes| {
            find_attribute(attributes, "PartName").is_some_and(|name| name.eq_ignore_ascii_case("/xl/calcChain.xml"))
        })?;
    }
    Ok(true)
}
