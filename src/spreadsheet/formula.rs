//! Rewrites A1 references inside formula text after a column insertion.
//!
//! The scanner understands just enough of the formula grammar to find
//! references: string literals and quoted sheet names are skipped, tokens
//! followed by `(` are function names, and a `Sheet!` qualifier limits the
//! shift to references into the sheet being edited.

use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::reference::shift_index;

/// Shifts every reference into `sheet_name` for a column inserted at `at`.
///
/// Unqualified references belong to the sheet that owns the formula.
/// References qualified with another sheet name are left alone, so are
/// names, functions and literals.
pub(crate) fn shift_formula(formula: &str, sheet_name: &str, at: u32) -> String {
    shift_references(formula, sheet_name, at, true)
}

/// Shifts only the references qualified with `sheet_name`. Used for formulas
/// owned by other sheets and for defined names.
pub(crate) fn shift_sheet_references(formula: &str, sheet_name: &str, at: u32) -> String {
    shift_references(formula, sheet_name, at, false)
}

fn shift_references(formula: &str, sheet_name: &str, at: u32, shift_unqualified: bool) -> String {
    let chars = formula.chars().collect::<Vec<_>>();
    let mut output = String::with_capacity(formula.len() + 4);
    let mut qualifier: Option<String> = None;
    let mut column_range_open = false;
    let mut index = 0usize;

    while index < chars.len() {
        let current = chars[index];
        if current == '"' {
            index = copy_quoted(&chars, index, '"', &mut output);
            qualifier = None;
        } else if current == '\'' {
            let start = output.len();
            index = copy_quoted(&chars, index, '\'', &mut output);
            let quoted = output[start..].trim_matches('\'').replace("''", "'");
            if chars.get(index) == Some(&'!') {
                qualifier = Some(quoted);
            }
        } else if is_token_start(current) && !continues_token(&chars, index) {
            let end = token_end(&chars, index);
            let token = chars[index..end].iter().collect::<String>();
            let next = chars.get(end).copied();
            if next == Some('!') {
                qualifier = Some(token.clone());
                output.push_str(&token);
            } else if next == Some('(') {
                output.push_str(&token);
                qualifier = None;
            } else {
                let shift = qualifier
                    .as_deref()
                    .map(|name| same_sheet(name, sheet_name))
                    .unwrap_or(shift_unqualified);
                // Bare letters are columns only inside a column range like A:C
                let bare = is_bare_column(&token);
                let allow_bare = bare
                    && (column_range_open
                        || (next == Some(':') && is_bare_column(&next_token(&chars, end + 1))));
                output.push_str(&shift_token(&token, shift, allow_bare, at));
                column_range_open = allow_bare && next == Some(':');
                // A range keeps its qualifier for the part after ':'
                if next != Some(':') {
                    qualifier = None;
                }
            }
            index = end;
        } else {
            if current != '!' && current != ':' {
                qualifier = None;
                column_range_open = false;
            }
            output.push(current);
            index += 1;
        }
    }
    output
}

/// Copies a quoted run (doubled quotes escape) and returns the index after it
fn copy_quoted(chars: &[char], start: usize, quote: char, output: &mut String) -> usize {
    output.push(quote);
    let mut index = start + 1;
    while index < chars.len() {
        output.push(chars[index]);
        if chars[index] == quote {
            if chars.get(index + 1) == Some(&quote) {
                output.push(quote);
                index += 2;
                continue;
            }
            return index + 1;
        }
        index += 1;
    }
    index
}

fn is_token_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '$' || c == '_' || c == '\\'
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || c == '$' || c == '_' || c == '.' || c == '\\'
}

/// Whether the character before `index` glues it to a previous token
fn continues_token(chars: &[char], index: usize) -> bool {
    index > 0 && (is_token_char(chars[index - 1]) || chars[index - 1] == '#')
}

fn token_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && is_token_char(chars[end]) {
        end += 1;
    }
    end
}

fn next_token(chars: &[char], start: usize) -> String {
    chars[start.min(chars.len())..token_end(chars, start.min(chars.len()))]
        .iter()
        .collect()
}

fn is_bare_column(token: &str) -> bool {
    let letters = token.strip_prefix('$').unwrap_or(token);
    !letters.is_empty() && letters.bytes().all(|byte| byte.is_ascii_alphabetic())
}

fn same_sheet(qualifier: &str, sheet_name: &str) -> bool {
    // workbook qualifiers such as [1]Sheet1 never point at this sheet
    !qualifier.starts_with('[') && qualifier.eq_ignore_ascii_case(sheet_name)
}

/// Shifts a token shaped like `$A$1` or `A1`, or a bare column `A` when
/// `allow_bare` says it is one end of a column range.
fn shift_token(token: &str, shift: bool, allow_bare: bool, at: u32) -> String {
    if !shift {
        return token.to_owned();
    }
    let (column_absolute, rest) = match token.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let split = rest.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(rest.len());
    let (letters, tail) = rest.split_at(split);
    let digits = tail.strip_prefix('$').unwrap_or(tail);
    let is_reference = if tail.is_empty() {
        allow_bare
    } else {
        !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
    };
    match col_to_index(letters) {
        Some(column) if is_reference => format!(
            "{}{}{}",
            if column_absolute { "$" } else { "" },
            index_to_col(shift_index(column, at)),
            tail
        ),
        _ => token.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_relative_and_absolute_references() {
        assert_eq!(shift_formula("SUM(B2:C2)+$D$5", "Sheet1", 3), "SUM(B2:D2)+$E$5");
        assert_eq!(shift_formula("A1*2", "Sheet1", 1), "B1*2");
        assert_eq!(shift_formula("$A1+A$1", "Sheet1", 1), "$B1+B$1");
    }

    #[test]
    fn leaves_literals_and_functions_alone() {
        assert_eq!(shift_formula("IF(C1=\"B2\",LOG10(C1),0)", "Sheet1", 2), "IF(D1=\"B2\",LOG10(D1),0)");
        assert_eq!(shift_formula("\"say \"\"A1\"\"\"&B1", "Sheet1", 1), "\"say \"\"A1\"\"\"&C1");
        assert_eq!(shift_formula("TRUE", "Sheet1", 1), "TRUE");
    }

    #[test]
    fn respects_sheet_qualifiers() {
        assert_eq!(shift_formula("Other!B2+B2", "Data", 2), "Other!B2+C2");
        assert_eq!(shift_formula("Data!B2:C3", "Data", 2), "Data!C2:D3");
        assert_eq!(shift_formula("'My Data'!B2+'Other one'!B2", "My Data", 1), "'My Data'!C2+'Other one'!B2");
    }

    #[test]
    fn references_from_other_sheets() {
        assert_eq!(shift_sheet_references("SUM(Data!B1:C1)+B1", "Data", 2), "SUM(Data!C1:D1)+B1");
        assert_eq!(shift_sheet_references("'Data'!$A$1:$C$3", "Data", 2), "'Data'!$A$1:$D$3");
        assert_eq!(shift_sheet_references("Other!B1", "Data", 1), "Other!B1");
    }

    #[test]
    fn last_column_is_not_exceeded() {
        assert_eq!(shift_formula("SUM(A1:XFD1)", "Sheet1", 3), "SUM(A1:XFD1)");
        assert_eq!(shift_formula("SUM(C:XFD)", "Sheet1", 3), "SUM(D:XFD)");
    }

    #[test]
    fn shifts_column_ranges() {
        assert_eq!(shift_formula("SUM(A:C)", "Sheet1", 2), "SUM(A:D)");
        assert_eq!(shift_formula("SUM(1:3)", "Sheet1", 1), "SUM(1:3)");
    }

    #[test]
    fn ignores_names_that_are_not_references() {
        assert_eq!(shift_formula("Rate*A1", "Sheet1", 1), "Rate*B1");
        assert_eq!(shift_formula("Tax*A1", "Sheet1", 1), "Tax*B1");
        assert_eq!(shift_formula("_xlfn.XLOOKUP(A1,B:B,C:C)", "Sheet1", 2), "_xlfn.XLOOKUP(A1,C:C,D:D)");
        assert_eq!(shift_formula("#REF!+A1", "Sheet1", 1), "#REF!+B1");
    }
}
