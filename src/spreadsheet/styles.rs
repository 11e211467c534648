use crate::error::ContainerError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::match_xml_events;
use crate::spreadsheet::cell::StyleId;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::io::BufRead;

const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs"); // Cell format records container
const TAG_FORMAT_INDEX: QName = QName(b"xf");        // Individual cell format record

/// One `cellXfs` record. Only the ids it points at are kept; the record is
/// never written back, `styles.xml` round-trips untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellFormat {
    pub number_format_id: u32,
    /// Custom format code, when the number format is not built in
    pub number_format: Option<String>,
    pub font_id: u32,
    pub fill_id: u32,
    pub border_id: u32,
}

/// Arena of cell formats addressed by [`StyleId`]
#[derive(Clone, Debug, Default)]
pub struct StyleArena {
    formats: Vec<CellFormat>,
}

impl StyleArena {
    /// Loads the `cellXfs` records from a `styles.xml` part
    pub(crate) fn load<R: BufRead>(mut reader: XmlReader<R>) -> Result<StyleArena, ContainerError> {
        let mut custom_formats = Vec::<(u32, String)>::new();
        let mut formats = Vec::<CellFormat>::new();
        let mut format_indexes_context = false;

        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_CUSTOM_FORMAT => {
                let id = event.parse_attribute_value::<u32>("numFmtId")?;
                let code = event.get_attribute_value("formatCode")?;
                if let Some((id, code)) = id.zip(code) {
                    custom_formats.push((id, code.into_owned()));
                }
            }
            Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
            Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
            Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
                let number_format_id = event.parse_attribute_value("numFmtId")?.unwrap_or(0);
                formats.push(CellFormat {
                    number_format_id,
                    number_format: None,
                    font_id: event.parse_attribute_value("fontId")?.unwrap_or(0),
                    fill_id: event.parse_attribute_value("fillId")?.unwrap_or(0),
                    border_id: event.parse_attribute_value("borderId")?.unwrap_or(0),
                });
            }
        });

        for format in formats.iter_mut() {
            format.number_format = custom_formats
                .iter()
                .find(|(id, _)| *id == format.number_format_id)
                .map(|(_, code)| code.to_owned());
        }
        Ok(StyleArena { formats })
    }

    /// Returns the format behind a style id
    pub fn get(&self, style: StyleId) -> Option<&CellFormat> {
        self.formats.get(style.0 as usize)
    }

    /// Whether `style` points inside the arena. The default style 0 is
    /// accepted even for workbooks without a `styles.xml`.
    pub fn contains(&self, style: StyleId) -> bool {
        style.0 == 0 || (style.0 as usize) < self.formats.len()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
