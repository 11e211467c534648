//! Export-time view settings: autofilter, frozen header and gridlines.
//!
//! Each flag is optional. `None` leaves whatever the input workbook had.

use crate::error::ContainerError;
use crate::error::ContainerResult;
use crate::error::IndexerError;
use crate::helpers::xml::set_attribute;
use crate::helpers::xml::Attributes;
use crate::helpers::xml::XmlNodeHelper;
use crate::spreadsheet::fragment::empty_element;
use crate::spreadsheet::fragment::wrap_element;
use crate::spreadsheet::fragment::Fragment;
use crate::spreadsheet::fragment::Span;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::sheet::Sheet;
use quick_xml::events::Event;
use serde::Deserialize;
use serde::Serialize;

/// Top-level worksheet elements that must follow `<sheetViews>`
const AFTER_SHEET_VIEWS: [&str; 3] = ["sheetFormatPr", "cols", "sheetData"];

/// Top-level worksheet elements that must follow `<autoFilter>`
const AFTER_AUTO_FILTER: [&str; 22] = [
    "sortState", "dataConsolidate", "customSheetViews", "mergeCells", "phoneticPr",
    "conditionalFormatting", "dataValidations", "hyperlinks", "printOptions", "pageMargins",
    "pageSetup", "headerFooter", "rowBreaks", "colBreaks", "customProperties", "cellWatches",
    "ignoredErrors", "smartTags", "drawing", "legacyDrawing", "tableParts", "extLst",
];

/// View flags applied when the workbook is written
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Some(true) puts an autofilter over the header row and the data below it
    pub apply_filter: Option<bool>,
    /// Some(true) freezes every row up to and including the header row
    pub freeze_header: Option<bool>,
    /// Some(false) hides gridlines
    pub show_gridlines: Option<bool>,
}

impl Sheet {
    /// Applies export flags to this sheet
    ///
    /// # Arguments
    /// * `options` - Flags to apply, `None` fields are skipped
    /// * `header_row` - Row holding the column headers (0 when there is none)
    pub fn apply_export(&mut self, options: &ExportOptions, header_row: u32) -> Result<(), IndexerError> {
        if let Some(show) = options.show_gridlines {
            self.edit_sheet_view(|attributes, _| {
                set_attribute(attributes, "showGridLines", if show { "1" } else { "0" }.to_owned());
            })
            .on_write()?;
        }
        if let Some(freeze) = options.freeze_header {
            let frozen_rows = header_row.max(1);
            self.edit_sheet_view(|_, children| freeze_rows(children, freeze.then_some(frozen_rows)))
                .on_write()?;
        }
        if let Some(filter) = options.apply_filter {
            let span = self.tail.find("autoFilter");
            match (filter, span) {
                (true, span) => {
                    let range = format!(
                        "A{}:{}{}",
                        header_row.max(1),
                        index_to_col(self.last_column.max(1)),
                        self.last_row().max(header_row.max(1))
                    );
                    self.set_auto_filter(span, range).on_write()?;
                }
                (false, Some(span)) => self.tail.remove(span),
                (false, None) => (),
            }
        }
        Ok(())
    }

    fn set_auto_filter(&mut self, span: Option<Span>, range: String) -> Result<(), ContainerError> {
        match span {
            Some(span) => {
                let mut filter = Fragment::new(0);
                for event in self.tail.slice(span) {
                    filter.push(event.clone());
                }
                filter.edit_attributes(|name, attributes| {
                    if name == "autoFilter" {
                        set_attribute(attributes, "ref", range.clone());
                        true
                    } else {
                        false
                    }
                })?;
                self.tail.replace(span, filter.events().to_vec());
            }
            None => {
                let element = empty_element("autoFilter", &[("ref".to_owned(), range)]);
                self.tail.insert_before(&AFTER_AUTO_FILTER, vec![element]);
            }
        }
        Ok(())
    }

    /// Edits the first `<sheetView>`, creating `<sheetViews>` when missing.
    /// The closure gets the view attributes and its child events.
    fn edit_sheet_view<F>(&mut self, edit: F) -> Result<(), ContainerError>
    where
        F: FnOnce(&mut Attributes, &mut Vec<Event<'static>>),
    {
        let Some(views) = self.head.find("sheetViews") else {
            let mut attributes = vec![("workbookViewId".to_owned(), "0".to_owned())];
            let mut children = Vec::new();
            edit(&mut attributes, &mut children);
            let view = build_view(&attributes, children);
            self.head.insert_before(&AFTER_SHEET_VIEWS, wrap_element("sheetViews", &[], view));
            return Ok(());
        };

        let events = self.head.slice(views).to_vec();
        let Some(start) = events.iter().position(|event| {
            matches!(event, Event::Start(element) | Event::Empty(element) if element.name().as_ref() == b"sheetView")
        }) else {
            return Ok(());
        };
        let (mut attributes, is_empty) = match &events[start] {
            Event::Start(element) => (element.owned_attributes()?, false),
            Event::Empty(element) => (element.owned_attributes()?, true),
            _ => return Ok(()),
        };
        let end = if is_empty { start } else { matching_end(&events, start) };
        let mut children = events[start + 1..end.max(start + 1)].to_vec();
        if is_empty {
            children.clear();
        }
        edit(&mut attributes, &mut children);

        let mut rebuilt = events[..start].to_vec();
        rebuilt.extend(build_view(&attributes, children));
        rebuilt.extend(events[end + 1..].iter().cloned());
        self.head.replace(views, rebuilt);
        Ok(())
    }
}

fn build_view(attributes: &Attributes, children: Vec<Event<'static>>) -> Vec<Event<'static>> {
    if children.is_empty() {
        vec![empty_element("sheetView", attributes)]
    } else {
        wrap_element("sheetView", attributes, children)
    }
}

fn matching_end(events: &[Event<'static>], start: usize) -> usize {
    let mut depth = 0usize;
    for (index, event) in events.iter().enumerate().skip(start) {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return index;
                }
            }
            _ => (),
        }
    }
    events.len() - 1
}

/// Replaces the pane and selections of a sheet view. `rows` frozen rows, or
/// no pane at all for None.
fn freeze_rows(children: &mut Vec<Event<'static>>, rows: Option<u32>) {
    children.retain(|event| {
        !matches!(event, Event::Start(element) | Event::Empty(element)
            if element.name().as_ref() == b"pane" || element.name().as_ref() == b"selection")
    });
    // drop orphaned end tags of removed elements
    children.retain(|event| {
        !matches!(event, Event::End(element) if element.name().as_ref() == b"pane" || element.name().as_ref() == b"selection")
    });
    if let Some(rows) = rows {
        let top_left = format!("A{}", rows + 1);
        let pane = vec![
            ("ySplit".to_owned(), rows.to_string()),
            ("topLeftCell".to_owned(), top_left.clone()),
            ("activePane".to_owned(), "bottomLeft".to_owned()),
            ("state".to_owned(), "frozen".to_owned()),
        ];
        let selection = vec![
            ("pane".to_owned(), "bottomLeft".to_owned()),
            ("activeCell".to_owned(), top_left.clone()),
            ("sqref".to_owned(), top_left),
        ];
        children.insert(0, empty_element("selection", &selection));
        children.insert(0, empty_element("pane", &pane));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::worksheet::parse_sheet;
    use crate::spreadsheet::worksheet::write_sheet;
    use pretty_assertions::assert_eq;

    const DATA: &str = r#"<row r="1"><c r="A1"><v>1</v></c><c r="C1"><v>1</v></c></row><row r="4"><c r="B4"><v>2</v></c></row>"#;

    fn sheet(head: &str, tail: &str) -> Sheet {
        let xml = format!("<worksheet>{head}<sheetData>{DATA}</sheetData>{tail}</worksheet>");
        parse_sheet("Data", "p", xml.as_bytes(), &[]).unwrap()
    }

    fn xml(sheet: &Sheet) -> String {
        String::from_utf8(write_sheet(sheet).unwrap()).unwrap()
    }

    #[test]
    fn none_keeps_the_input() {
        let head = r#"<sheetViews><sheetView showGridLines="0" workbookViewId="0"><pane ySplit="2" topLeftCell="A3" state="frozen"/></sheetView></sheetViews>"#;
        let tail = r#"<autoFilter ref="A1:B2"/><pageMargins/>"#;
        let mut sheet = sheet(head, tail);
        let before = xml(&sheet);
        sheet.apply_export(&ExportOptions::default(), 1).unwrap();

        assert_eq!(xml(&sheet), before);
    }

    #[test]
    fn creates_views_filter_and_pane() {
        let mut sheet = sheet(r#"<dimension ref="A1:C4"/><sheetFormatPr defaultRowHeight="15"/>"#, r#"<mergeCells count="0"/><pageMargins/>"#);
        let options = ExportOptions {
            apply_filter: Some(true),
            freeze_header: Some(true),
            show_gridlines: Some(false),
        };
        sheet.apply_export(&options, 1).unwrap();

        assert_eq!(xml(&sheet), format!(
            "<worksheet>{}{}{}<sheetData>{}</sheetData>{}</worksheet>",
            r#"<dimension ref="A1:C4"/>"#,
            r#"<sheetViews><sheetView workbookViewId="0" showGridLines="0"><pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/><selection pane="bottomLeft" activeCell="A2" sqref="A2"/></sheetView></sheetViews>"#,
            r#"<sheetFormatPr defaultRowHeight="15"/>"#,
            DATA,
            r#"<autoFilter ref="A1:C4"/><mergeCells count="0"/><pageMargins/>"#,
        ));
    }

    #[test]
    fn replaces_existing_settings() {
        let head = r#"<sheetViews><sheetView tabSelected="1" workbookViewId="0"><selection activeCell="B2" sqref="B2"/></sheetView></sheetViews>"#;
        let tail = r#"<autoFilter ref="A1:B2"><filterColumn colId="1"/></autoFilter>"#;
        let mut sheet = sheet(head, tail);
        let options = ExportOptions {
            apply_filter: Some(true),
            freeze_header: Some(false),
            show_gridlines: Some(true),
        };
        sheet.apply_export(&options, 1).unwrap();
        let written = xml(&sheet);

        assert!(written.contains(r#"<sheetViews><sheetView tabSelected="1" workbookViewId="0" showGridLines="1"/></sheetViews>"#));
        assert!(written.contains(r#"<autoFilter ref="A1:C4"><filterColumn colId="1"/></autoFilter>"#));
    }

    #[test]
    fn removes_filter() {
        let mut sheet = sheet("", r#"<autoFilter ref="A1:B2"/><pageMargins/>"#);
        let options = ExportOptions {
            apply_filter: Some(false),
            ..Default::default()
        };
        sheet.apply_export(&options, 1).unwrap();

        assert!(xml(&sheet).ends_with("</sheetData><pageMargins/></worksheet>"));
    }
}
