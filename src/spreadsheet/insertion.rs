//! Column insertion.
//!
//! Inserting a column moves cells right, rewrites every reference that pointed
//! at a moved column and keeps each cell's style index.

use crate::error::ContainerError;
use crate::error::ContainerResult;
use crate::error::IndexerError;
use crate::helpers::xml::find_attribute;
use crate::helpers::xml::set_attribute;
use crate::helpers::xml::Attributes;
use crate::helpers::xml::XmlNodeHelper;
use crate::spreadsheet::formula::shift_formula;
use crate::spreadsheet::formula::shift_sheet_references;
use crate::spreadsheet::fragment::empty_element;
use crate::spreadsheet::fragment::wrap_element;
use crate::spreadsheet::fragment::Fragment;
use crate::spreadsheet::fragment::Span;
use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::shift_range;
use crate::spreadsheet::reference::shift_sqref;
use crate::spreadsheet::reference::MAX_COLUMN;
use crate::spreadsheet::sheet::Sheet;
use quick_xml::events::Event;
use tracing::debug;

/// Attributes holding a single range or cell reference
const RANGE_ATTRIBUTES: [&str; 3] = ["ref", "topLeftCell", "activeCell"];

/// Elements whose text is a formula
const FORMULA_ELEMENTS: [&str; 4] = ["formula", "formula1", "formula2", "xm:f"];

/// One `<col>` entry of the `<cols>` element
#[derive(Clone, Debug, PartialEq)]
struct ColumnSpec {
    min: u32,
    max: u32,
    attributes: Attributes,
}

impl ColumnSpec {
    fn with_bounds(&self, min: u32, max: u32) -> ColumnSpec {
        ColumnSpec {
            min,
            max,
            attributes: self.attributes.clone(),
        }
    }

    fn to_event(&self) -> Event<'static> {
        let mut attributes = self.attributes.clone();
        set_attribute(&mut attributes, "min", self.min.to_string());
        set_attribute(&mut attributes, "max", self.max.to_string());
        empty_element("col", &attributes)
    }
}

impl Sheet {
    /// Inserts an empty column at `at` (1-based).
    ///
    /// Every cell at column `at` or beyond moves one column right and keeps its
    /// style. References to moved columns are rewritten in cell formulas, shared
    /// and array formula ranges, the dimension, column widths, panes and
    /// selections, merged cells, the autofilter, conditional formats, data
    /// validations and hyperlinks. A width range spanning `at` is split, so the
    /// new column keeps the sheet default width. A column inserted inside the
    /// frozen pane widens it.
    ///
    /// # Errors
    /// `InvalidPosition` when `at` lies outside `1..=last_column + 1`.
    pub fn insert_column(&mut self, at: u32) -> Result<(), IndexerError> {
        let upper = (self.last_column + 1).min(MAX_COLUMN);
        if at == 0 || at > upper || self.last_column >= MAX_COLUMN {
            return Err(IndexerError::InvalidPosition { position: at, upper });
        }
        debug!(sheet = %self.name, column = at, "inserting column");

        let name = self.name.clone();
        for row in self.rows.iter_mut() {
            let moved = row.cells.split_off(&at);
            row.cells.extend(moved.into_iter().map(|(column, cell)| (column + 1, cell)));
            for cell in row.cells.values_mut() {
                if let Some(formula) = cell.formula.as_mut() {
                    if !formula.text.is_empty() {
                        formula.text = shift_formula(&formula.text, &name, at);
                    }
                    if let Some(range) = find_attribute(&formula.attributes, "ref").map(|range| shift_range(range, at)) {
                        set_attribute(&mut formula.attributes, "ref", range);
                    }
                }
            }
        }
        self.last_column += 1;

        shift_columns(&mut self.head, at).on_read()?;
        shift_fragment(&mut self.head, &name, at).on_read()?;
        shift_frozen_columns(&mut self.head, at).on_read()?;
        shift_filter_columns(&mut self.tail, at).on_read()?;
        shift_fragment(&mut self.tail, &name, at).on_read()?;
        Ok(())
    }

    /// Rewrites references into `sheet_name`, another worksheet of the same
    /// workbook, after a column was inserted there at `at`. Cell formulas,
    /// conditional formats and data validations are covered.
    ///
    /// # Returns
    /// Whether any formula changed
    pub fn shift_references_into(&mut self, sheet_name: &str, at: u32) -> Result<bool, IndexerError> {
        let mut changed = false;
        for cell in self.rows.iter_mut().flat_map(|row| row.cells.values_mut()) {
            let Some(formula) = cell.formula.as_mut() else {
                continue;
            };
            let shifted = shift_sheet_references(&formula.text, sheet_name, at);
            if shifted != formula.text {
                formula.text = shifted;
                changed = true;
            }
        }
        let touched = std::cell::Cell::new(false);
        let shift = |text: &str| {
            let shifted = shift_sheet_references(text, sheet_name, at);
            if shifted != text {
                touched.set(true);
            }
            shifted
        };
        self.head.edit_text(&FORMULA_ELEMENTS, shift).on_read()?;
        self.tail.edit_text(&FORMULA_ELEMENTS, shift).on_read()?;
        if changed || touched.get() {
            debug!(sheet = %self.name, target = sheet_name, "references shifted");
        }
        Ok(changed || touched.get())
    }

    /// Gives `column` its own width entry, splitting any range that covers it
    pub fn set_column_width(&mut self, column: u32, width: f64) -> Result<(), IndexerError> {
        let (span, mut specs) = load_columns(&self.head).on_read()?;
        let mut split = Vec::with_capacity(specs.len() + 2);
        for spec in specs.drain(..) {
            if spec.max < column || spec.min > column {
                split.push(spec);
                continue;
            }
            if spec.min < column {
                split.push(spec.with_bounds(spec.min, column - 1));
            }
            if spec.max > column {
                split.push(spec.with_bounds(column + 1, spec.max));
            }
        }
        split.push(ColumnSpec {
            min: column,
            max: column,
            attributes: vec![
                ("min".to_owned(), column.to_string()),
                ("max".to_owned(), column.to_string()),
                ("width".to_owned(), width.to_string()),
                ("customWidth".to_owned(), "1".to_owned()),
            ],
        });
        split.sort_by_key(|spec| spec.min);
        store_columns(&mut self.head, span, &split);
        Ok(())
    }
}

/// Rewrites range attributes and formula texts of a fragment
fn shift_fragment(fragment: &mut Fragment, sheet_name: &str, at: u32) -> Result<(), ContainerError> {
    fragment.edit_attributes(|_, attributes| {
        let mut changed = false;
        for (key, value) in attributes.iter_mut() {
            let shifted = if RANGE_ATTRIBUTES.contains(&key.as_str()) {
                shift_range(value, at)
            } else if key == "sqref" {
                shift_sqref(value, at)
            } else {
                continue;
            };
            if shifted != *value {
                *value = shifted;
                changed = true;
            }
        }
        changed
    })?;
    fragment.edit_text(&FORMULA_ELEMENTS, |text| shift_formula(text, sheet_name, at))?;
    fragment.edit_text(&["xm:sqref"], |text| shift_sqref(text, at))?;
    Ok(())
}

/// Widens a frozen pane whose columns include `at`. `xSplit` of a frozen pane
/// counts columns; in a plain split pane it is a position and stays as is.
fn shift_frozen_columns(head: &mut Fragment, at: u32) -> Result<(), ContainerError> {
    head.edit_attributes(|name, attributes| {
        if name != "pane" || !find_attribute(attributes, "state").is_some_and(|state| state.starts_with("frozen")) {
            return false;
        }
        match find_attribute(attributes, "xSplit").and_then(|split| split.parse::<u32>().ok()) {
            Some(split) if at <= split => {
                set_attribute(attributes, "xSplit", (split + 1).to_string());
                true
            }
            _ => false,
        }
    })
}

/// Moves `colId` offsets of filter columns that sit right of `at` inside an
/// autofilter that starts left of it. Runs before the filter range moves.
fn shift_filter_columns(tail: &mut Fragment, at: u32) -> Result<(), ContainerError> {
    let Some(span) = tail.find("autoFilter") else {
        return Ok(());
    };
    let first_column = match &tail.slice(span)[0] {
        Event::Start(element) | Event::Empty(element) => element
            .get_attribute_value("ref")?
            .and_then(|range| {
                let first = range.split(':').next().unwrap_or_default().replace('$', "");
                let letters = first.trim_end_matches(|c: char| c.is_ascii_digit()).to_owned();
                col_to_index(&letters)
            }),
        _ => None,
    };
    let Some(first_column) = first_column else {
        return Ok(());
    };
    if first_column >= at {
        return Ok(());
    }

    let mut filter = Fragment::new(0);
    for event in tail.slice(span) {
        filter.push(event.clone());
    }
    filter.edit_attributes(|name, attributes| {
        if name != "filterColumn" {
            return false;
        }
        match find_attribute(attributes, "colId").and_then(|id| id.parse::<u32>().ok()) {
            Some(id) if first_column + id >= at => {
                set_attribute(attributes, "colId", (id + 1).to_string());
                true
            }
            _ => false,
        }
    })?;
    tail.replace(span, filter.events().to_vec());
    Ok(())
}

fn shift_columns(head: &mut Fragment, at: u32) -> Result<(), ContainerError> {
    let (span, specs) = load_columns(head)?;
    if span.is_none() {
        return Ok(());
    }
    let mut shifted = Vec::with_capacity(specs.len() + 1);
    for spec in specs {
        if spec.max < at {
            shifted.push(spec);
        } else if spec.min >= at {
            shifted.push(spec.with_bounds(spec.min + 1, spec.max + 1));
        } else {
            shifted.push(spec.with_bounds(spec.min, at - 1));
            shifted.push(spec.with_bounds(at + 1, spec.max + 1));
        }
    }
    store_columns(head, span, &shifted);
    Ok(())
}

fn load_columns(head: &Fragment) -> Result<(Option<Span>, Vec<ColumnSpec>), ContainerError> {
    let Some(span) = head.find("cols") else {
        return Ok((None, Vec::new()));
    };
    let mut specs = Vec::new();
    for event in head.slice(span) {
        if let Event::Empty(element) | Event::Start(element) = event {
            if element.name().as_ref() != b"col" {
                continue;
            }
            let attributes = element.owned_attributes()?;
            let min = find_attribute(&attributes, "min").and_then(|min| min.parse().ok()).unwrap_or(1);
            let max = find_attribute(&attributes, "max").and_then(|max| max.parse().ok()).unwrap_or(min);
            specs.push(ColumnSpec { min, max, attributes });
        }
    }
    Ok((Some(span), specs))
}

fn store_columns(head: &mut Fragment, span: Option<Span>, specs: &[ColumnSpec]) {
    let events = wrap_element("cols", &[], specs.iter().map(ColumnSpec::to_event).collect());
    match span {
        Some(span) => head.replace(span, events),
        // cols is the last element before sheetData
        None => head.insert_before(&[], events),
    }
}
