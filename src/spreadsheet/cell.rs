use crate::helpers::xml::Attributes;
use quick_xml::events::Event;
use std::borrow::Cow;

/// Index into the workbook's `cellXfs` style arena.
///
/// Cells share styles by index; moving or rewriting a cell copies the index,
/// never the style record behind it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleId(pub u32);

/// Typed value of a cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    /// Numeric values (`t="n"` or no type)
    Number(f64),
    /// Plain text. `shared` keeps the shared string table index of text that
    /// was loaded from the table, so unchanged cells are written back by index.
    Text { value: String, shared: Option<usize> },
    /// Cached string result of a formula (`t="str"`)
    FormulaText(String),
    /// Boolean values (`t="b"`)
    Boolean(bool),
    /// Error values such as `#N/A` (`t="e"`)
    Error(String),
    /// ISO 8601 date/time strings (`t="d"`)
    Date(String),
}

impl CellValue {
    /// Creates a text value that is not backed by the shared string table
    pub fn text(value: impl Into<String>) -> CellValue {
        CellValue::Text { value: value.into(), shared: None }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Returns the text shown for this value. Integral numbers drop their
    /// fractional part.
    pub fn display_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Empty => Cow::Borrowed(""),
            CellValue::Number(number) => Cow::Owned(format_number(*number)),
            CellValue::Text { value, .. } => Cow::Borrowed(value),
            CellValue::FormulaText(value) | CellValue::Error(value) | CellValue::Date(value) => Cow::Borrowed(value),
            CellValue::Boolean(true) => Cow::Borrowed("TRUE"),
            CellValue::Boolean(false) => Cow::Borrowed("FALSE"),
        }
    }
}

/// Formats a number the way it is written to `<v>` elements
pub(crate) fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

/// Formula attached to a cell
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Formula {
    /// Formula text without the leading `=`. Empty for cells that only
    /// reference a shared formula through `si`.
    pub text: String,
    /// Attributes of the `<f>` element (`t`, `ref`, `si`, ...)
    pub(crate) attributes: Attributes,
}

/// A single cell of a row. The column is the key of the row's cell map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: StyleId,
    pub formula: Option<Formula>,
    /// Unrecognised attributes of the `<c>` element, written back untouched
    pub(crate) attributes: Attributes,
    /// Content of the `<is>` element the value was read from. Runs, run
    /// properties and phonetic text survive as long as the value is unchanged.
    pub(crate) inline_markup: Option<Vec<Event<'static>>>,
    /// Children of `<c>` other than `f`, `v` and `is` (such as `extLst`)
    pub(crate) extra_children: Vec<Event<'static>>,
}

impl Cell {
    /// Creates an unstyled cell holding `value`
    pub fn new(value: CellValue) -> Cell {
        Cell {
            value,
            ..Default::default()
        }
    }

    /// Replaces the value. Writing a value drops any formula, the style stays.
    pub fn set_value(&mut self, value: CellValue) {
        self.formula = None;
        self.inline_markup = None;
        self.value = value;
    }

    /// Writes text, keeping the current value when it already holds the same
    /// text so shared string references survive repeated runs.
    pub fn set_text(&mut self, text: &str) {
        let unchanged = self.formula.is_none()
            && matches!(&self.value, CellValue::Text { value, .. } if value == text);
        if !unchanged {
            self.set_value(CellValue::text(text));
        }
    }

    /// Whether the cell holds neither a value nor a formula
    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && self.formula.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_text_of_values() {
        assert_eq!(CellValue::Number(123.0).display_text(), "123");
        assert_eq!(CellValue::Number(12.5).display_text(), "12.5");
        assert_eq!(CellValue::Number(-4.0).display_text(), "-4");
        assert_eq!(CellValue::text(" D ").display_text(), " D ");
        assert_eq!(CellValue::Boolean(true).display_text(), "TRUE");
        assert_eq!(CellValue::Empty.display_text(), "");
    }

    #[test]
    fn writing_keeps_style_and_drops_formula() {
        let mut cell = Cell {
            value: CellValue::FormulaText("x".to_owned()),
            style: StyleId(7),
            formula: Some(Formula { text: "A1".to_owned(), attributes: Vec::new() }),
            ..Default::default()
        };
        cell.set_text("label");
        assert_eq!(cell.style, StyleId(7));
        assert_eq!(cell.formula, None);
        assert_eq!(cell.value, CellValue::text("label"));
    }

    #[test]
    fn writing_same_text_keeps_shared_index() {
        let mut cell = Cell::new(CellValue::Text { value: "Roof".to_owned(), shared: Some(4) });
        cell.set_text("Roof");
        assert_eq!(cell.value, CellValue::Text { value: "Roof".to_owned(), shared: Some(4) });
        cell.set_text("Walls");
        assert_eq!(cell.value, CellValue::text("Walls"));
    }

    #[test]
    fn new_value_drops_inline_markup() {
        let mut cell = Cell {
            value: CellValue::text("Bold"),
            inline_markup: Some(vec![Event::Empty(quick_xml::events::BytesStart::new("b"))]),
            ..Default::default()
        };
        cell.set_text("Bold");
        assert!(cell.inline_markup.is_some());
        cell.set_text("Plain");
        assert_eq!(cell.inline_markup, None);
    }
}
