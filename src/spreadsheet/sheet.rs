use crate::helpers::xml::Attributes;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::StyleId;
use crate::spreadsheet::fragment::Fragment;
use quick_xml::events::BytesDecl;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::BTreeMap;

const SPREADSHEET_NAMESPACE: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// One `<row>` of a worksheet
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    /// 1-based row number
    pub number: u32,
    /// Cells keyed by 1-based column
    pub cells: BTreeMap<u32, Cell>,
    /// Row attributes other than `r` (height, hidden, style, ...)
    pub(crate) attributes: Attributes,
    /// Created by a pass for a row missing from the file
    pub(crate) materialized: bool,
}

impl Row {
    pub fn new(number: u32) -> Row {
        Row {
            number,
            ..Default::default()
        }
    }

    /// Returns the value at `column`, Empty when there is no cell
    pub fn value(&self, column: u32) -> Option<&CellValue> {
        self.cells.get(&column).map(|cell| &cell.value)
    }

    /// Trimmed display text at `column`
    pub fn text(&self, column: u32) -> Cow<'_, str> {
        match self.cells.get(&column) {
            Some(cell) => match cell.value.display_text() {
                Cow::Borrowed(text) => Cow::Borrowed(text.trim()),
                Cow::Owned(text) => Cow::Owned(text.trim().to_owned()),
            },
            None => Cow::Borrowed(""),
        }
    }

    /// Writes text into `column`.
    ///
    /// Empty text clears an existing cell and never creates one, so a row
    /// without a target cell and a row with an empty target look the same.
    /// `style` is applied only when given; otherwise an existing cell keeps its
    /// style and a new cell gets the default one.
    pub fn write_text(&mut self, column: u32, text: &str, style: Option<StyleId>) {
        if text.is_empty() {
            if let Some(cell) = self.cells.get_mut(&column) {
                cell.set_value(CellValue::Empty);
                if let Some(style) = style {
                    cell.style = style;
                }
            }
            return;
        }
        let cell = self.cells.entry(column).or_default();
        cell.set_text(text);
        if let Some(style) = style {
            cell.style = style;
        }
    }

    /// Style of the cell at `column`, if there is a cell
    pub fn style(&self, column: u32) -> Option<StyleId> {
        self.cells.get(&column).map(|cell| cell.style)
    }

    /// Whether any cell holds a value or a formula
    pub fn has_content(&self) -> bool {
        self.cells.values().any(|cell| !cell.is_blank())
    }
}

/// A parsed worksheet.
///
/// Everything before `<sheetData>` and after `</sheetData>` is kept as owned XML
/// events; only the rows are modelled.
#[derive(Clone, Debug)]
pub struct Sheet {
    /// Sheet name as listed in the workbook
    pub name: String,
    /// Zip path of the worksheet part
    pub(crate) path: String,
    /// Events before `<sheetData>`
    pub(crate) head: Fragment,
    /// The `<sheetData>` element itself
    pub(crate) sheet_data: BytesStart<'static>,
    /// Rows sorted by number
    pub(crate) rows: Vec<Row>,
    /// Events after `</sheetData>`
    pub(crate) tail: Fragment,
    /// Right-most column of the used range
    pub(crate) last_column: u32,
}

impl Sheet {
    /// Creates an empty worksheet with a minimal XML skeleton
    pub fn new(name: &str) -> Sheet {
        let mut head = Fragment::new(0);
        head.push(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))));
        let mut root = BytesStart::new("worksheet");
        root.push_attribute(("xmlns", SPREADSHEET_NAMESPACE));
        head.push(Event::Start(root));

        let mut tail = Fragment::new(1);
        tail.push(Event::End(BytesEnd::new("worksheet")));

        Sheet {
            name: name.to_owned(),
            path: String::new(),
            head,
            sheet_data: BytesStart::new("sheetData"),
            rows: Vec::new(),
            tail,
            last_column: 0,
        }
    }

    /// Right-most column of the used range (0 for an empty sheet)
    pub fn last_column(&self) -> u32 {
        self.last_column
    }

    /// Last row holding a value or a formula (0 for an empty sheet)
    pub fn last_row(&self) -> u32 {
        self.rows
            .iter()
            .rev()
            .find(|row| row.has_content())
            .map(|row| row.number)
            .unwrap_or(0)
    }

    /// Rows present in the sheet, in order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns a row by number
    pub fn row(&self, number: u32) -> Option<&Row> {
        self.rows
            .binary_search_by_key(&number, |row| row.number)
            .ok()
            .map(|index| &self.rows[index])
    }

    /// Returns a row by number, creating it when missing
    pub fn row_mut(&mut self, number: u32) -> &mut Row {
        let index = match self.rows.binary_search_by_key(&number, |row| row.number) {
            Ok(index) => index,
            Err(index) => {
                let mut row = Row::new(number);
                row.materialized = true;
                self.rows.insert(index, row);
                index
            }
        };
        &mut self.rows[index]
    }

    /// Returns the cell at (row, column)
    pub fn cell(&self, row: u32, column: u32) -> Option<&Cell> {
        self.row(row).and_then(|row| row.cells.get(&column))
    }

    /// Sets a cell, creating its row when needed
    pub fn set_cell(&mut self, row: u32, column: u32, cell: Cell) {
        self.row_mut(row).cells.insert(column, cell);
        self.last_column = self.last_column.max(column);
    }

    /// Ensures every row in `from..=to` exists, in a single merge pass
    pub(crate) fn materialize_rows(&mut self, from: u32, to: u32) {
        if from > to {
            return;
        }
        let present = self
            .rows
            .iter()
            .filter(|row| row.number >= from && row.number <= to)
            .count();
        if present == (to - from + 1) as usize {
            return;
        }
        let mut rows = Vec::with_capacity(self.rows.len() + (to - from + 1) as usize - present);
        let mut existing = std::mem::take(&mut self.rows).into_iter().peekable();
        while let Some(row) = existing.next_if(|row| row.number < from) {
            rows.push(row);
        }
        for number in from..=to {
            match existing.next_if(|row| row.number == number) {
                Some(row) => rows.push(row),
                None => {
                    let mut row = Row::new(number);
                    row.materialized = true;
                    rows.push(row);
                }
            }
        }
        rows.extend(existing);
        self.rows = rows;
    }

    /// Mutable rows whose number lies in `from..=to`
    pub(crate) fn rows_between_mut(&mut self, from: u32, to: u32) -> impl Iterator<Item = &mut Row> {
        let start = self.rows.partition_point(|row| row.number < from);
        let end = self.rows.partition_point(|row| row.number <= to);
        self.rows[start..end].iter_mut()
    }

    /// Drops rows created by a pass that ended up without cells
    pub(crate) fn prune_materialized_rows(&mut self) {
        self.rows.retain(|row| !(row.materialized && row.cells.is_empty()));
    }

    /// Finds the first column whose trimmed header text equals `header`,
    /// ignoring case
    pub fn find_header(&self, header_row: u32, header: &str) -> Option<u32> {
        let header = header.trim();
        self.row(header_row).and_then(|row| {
            row.cells
                .keys()
                .copied()
                .find(|column| row.text(*column).eq_ignore_ascii_case(header))
        })
    }
}
