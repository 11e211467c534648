//! XML utilities for the SpreadsheetML parts of an xlsx package.
//! Provides a reader wrapper, helper traits for attribute and text processing,
//! and the attribute list type used when elements are rebuilt for writing.

use crate::error::ContainerError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),
}

/// Ordered list of unescaped `(key, value)` attribute pairs of an element.
pub(crate) type Attributes = Vec<(String, String)>;

/// XML reader wrapper with the configuration used for package parts
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Creates a reader that expands empty elements into start/end pairs.
    /// Suited for extracting values where the element form does not matter.
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        Self::with_expansion(buf_reader, true)
    }

    /// Creates a reader that reports `<x/>` as [`Event::Empty`].
    /// Used for parts that are written back, so their element forms survive.
    pub(crate) fn preserving(buf_reader: R) -> XmlReader<R> {
        Self::with_expansion(buf_reader, false)
    }

    fn with_expansion(buf_reader: R, expand_empty_elements: bool) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = expand_empty_elements;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event from the reader
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, ContainerError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(ContainerError::XmlError(error)),
        }
    }

    /// Reads everything up to the end tag `end` of the current element and
    /// returns the events in between, nested elements included
    pub(crate) fn read_children(&mut self, end: QName) -> Result<Vec<Event<'static>>, ContainerError> {
        let mut children = Vec::new();
        let mut depth = 0usize;
        while let Some(event) = self.next()? {
            match &event {
                Event::End(element) if depth == 0 && element.name() == end => break,
                Event::Start(_) => depth += 1,
                Event::End(_) => depth = depth.saturating_sub(1),
                _ => (),
            }
            children.push(event.into_owned());
        }
        Ok(children)
    }
}

/// Helper trait for XML attributes providing convenient value extraction and parsing
pub(crate) trait XmlAttributeHelper<'a> {
    /// Gets the unescaped attribute value as a string
    fn get_value(&self) -> Result<Cow<'a, str>, ContainerError>;

    /// Parses the attribute value to the specified type
    fn parse_value<T: FromStr>(&self) -> Result<T, ContainerError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, ContainerError> {
        Ok(self.unescape_value()?)
    }

    fn parse_value<T: FromStr>(&self) -> Result<T, ContainerError> {
        self.get_value()?
            .parse()
            .map_err(|_| match std::str::from_utf8(&self.value) {
                Ok(value) => ContainerError::XmlHelperError(XmlError::ParseAttributeValueError(value.to_string())),
                Err(error) => ContainerError::StringEncodingError(error),
            })
    }
}

/// Helper trait for XML nodes providing attribute access methods
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets an attribute value by name
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, ContainerError>;

    /// Parses an attribute value to the specified type
    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, ContainerError>;

    /// Collects every attribute as owned, unescaped pairs in document order
    fn owned_attributes(&self) -> Result<Attributes, ContainerError>;

    /// Element name as an owned string
    fn owned_name(&self) -> Result<String, ContainerError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, ContainerError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, ContainerError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse_value())
            .transpose()
    }

    fn owned_attributes(&self) -> Result<Attributes, ContainerError> {
        let mut attributes = Attributes::new();
        for result in self.attributes() {
            let attribute = result?;
            let key = std::str::from_utf8(attribute.key.as_ref())?.to_owned();
            attributes.push((key, attribute.get_value()?.into_owned()));
        }
        Ok(attributes)
    }

    fn owned_name(&self) -> Result<String, ContainerError> {
        Ok(std::str::from_utf8(self.name().as_ref())?.to_owned())
    }
}

/// Builds an element start tag from a name and an attribute list.
/// Values are escaped on the way out.
pub(crate) fn build_element(name: &str, attributes: &[(String, String)]) -> BytesStart<'static> {
    let mut element = BytesStart::new(name.to_owned());
    for (key, value) in attributes {
        element.push_attribute((key.as_str(), value.as_str()));
    }
    element
}

/// Sets `key` to `value` in an attribute list, appending it when absent
pub(crate) fn set_attribute(attributes: &mut Attributes, key: &str, value: String) {
    match attributes.iter_mut().find(|(name, _)| name == key) {
        Some((_, current)) => *current = value,
        None => attributes.push((key.to_owned(), value)),
    }
}

/// Looks an attribute up by key in an attribute list
pub(crate) fn find_attribute<'a>(attributes: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends text content from BytesText event
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), ContainerError>;

    /// Appends text content from BytesRef event (handles entities and character references)
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), ContainerError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), ContainerError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), ContainerError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = std::char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }

        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}
