use crate::error::IndexerError;
use glob::Pattern;

/// Characters that turn a sheet selector into a glob pattern
const GLOB_CHARACTERS: [char; 3] = ['*', '?', '['];

/// Selector of the worksheets a pipeline run processes.
///
/// Each entry is either an exact sheet name or a glob pattern. Without any
/// entry only the first worksheet is selected.
#[derive(Clone, Debug, Default)]
pub struct SheetSelection {
    names: Vec<String>,
    patterns: Vec<Pattern>,
}

impl SheetSelection {
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Result<SheetSelection, IndexerError> {
        let mut selection = SheetSelection::default();
        for entry in entries {
            let entry = entry.as_ref();
            if entry.contains(GLOB_CHARACTERS) {
                selection.patterns.push(Pattern::new(entry)?);
            } else {
                selection.names.push(entry.to_owned());
            }
        }
        Ok(selection)
    }

    /// Whether a sheet name is selected by any entry
    pub fn accept(&self, sheet_name: &str) -> bool {
        self.names.iter().any(|name| name == sheet_name)
            || self.patterns.iter().any(|pattern| pattern.matches(sheet_name))
    }

    /// Picks the selected sheets, in workbook order
    ///
    /// # Errors
    /// `MissingSheet` for an exact name that is not in the workbook, or when
    /// the workbook has no worksheet at all.
    pub fn select<'a>(&self, sheet_names: &[&'a str]) -> Result<Vec<&'a str>, IndexerError> {
        if self.names.is_empty() && self.patterns.is_empty() {
            return match sheet_names.first() {
                Some(name) => Ok(vec![*name]),
                None => Err(IndexerError::MissingSheet("<first sheet>".to_owned())),
            };
        }
        if let Some(missing) = self.names.iter().find(|name| !sheet_names.contains(&name.as_str())) {
            return Err(IndexerError::MissingSheet(missing.clone()));
        }
        Ok(sheet_names.iter().copied().filter(|name| self.accept(name)).collect())
    }
}
