//! A1-style cell reference helpers.

/// Largest column index Excel accepts (`XFD`)
pub const MAX_COLUMN: u32 = 16_384;

/// Converts column letters (e.g. "A", "AB") into a 1-based index.
/// Returns None for empty input, non-letters or columns beyond `XFD`.
pub fn col_to_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut index = 0u32;
    for byte in letters.bytes() {
        if !byte.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + (byte.to_ascii_uppercase() - b'A') as u32 + 1;
    }
    (index <= MAX_COLUMN).then_some(index)
}

/// Converts a 1-based column index into letters
pub fn index_to_col(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let remainder = (index - 1) % 26;
        letters.push(b'A' + remainder as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Splits a cell reference such as "B12" into (row, column), both 1-based.
/// `$` markers are accepted and ignored.
pub fn reference_to_index(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let column = col_to_index(letters)?;
    let row = digits.parse::<u32>().ok().filter(|row| *row > 0)?;
    Some((row, column))
}

/// Formats a 1-based (row, column) pair as "B12"
pub fn index_to_reference(row: u32, column: u32) -> String {
    format!("{}{}", index_to_col(column), row)
}

/// Shifts one column index for an insertion at `at`. `XFD` stays put, so a
/// range reaching the last column keeps ending there.
#[inline]
pub(crate) fn shift_index(column: u32, at: u32) -> u32 {
    if column >= at {
        (column + 1).min(MAX_COLUMN)
    } else {
        column
    }
}

/// Shifts a single cell reference, a range (`A1:C3`) or a column range (`A:C`)
/// for a column inserted at `at`. Row-only ranges and anything unparsable are
/// returned unchanged.
pub(crate) fn shift_range(range: &str, at: u32) -> String {
    range
        .split(':')
        .map(|part| shift_part(part, at))
        .collect::<Vec<_>>()
        .join(":")
}

/// Shifts a space separated list of ranges, as found in `sqref` attributes
pub(crate) fn shift_sqref(sqref: &str, at: u32) -> String {
    sqref
        .split(' ')
        .map(|range| shift_range(range, at))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shift_part(part: &str, at: u32) -> String {
    let (absolute, rest) = match part.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, part),
    };
    let split = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let (letters, tail) = rest.split_at(split);
    let valid_tail = tail.is_empty()
        || tail
            .strip_prefix('$')
            .unwrap_or(tail)
            .bytes()
            .all(|byte| byte.is_ascii_digit());
    match col_to_index(letters) {
        Some(column) if valid_tail => format!(
            "{}{}{}",
            if absolute { "$" } else { "" },
            index_to_col(shift_index(column, at)),
            tail
        ),
        _ => part.to_owned(),
    }
}

/// Returns the right-most column mentioned in a range such as `A1:F20`
pub(crate) fn range_last_column(range: &str) -> Option<u32> {
    range
        .split(':')
        .filter_map(|part| {
            let part = part.replace('$', "");
            let split = part.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(part.len());
            col_to_index(&part[..split])
        })
        .max()
}
