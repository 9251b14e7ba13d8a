use std::fmt;

use crate::record::FIELD_NAMES;

/// Columns prioritized when a full write is not possible.
pub const ESSENTIAL_FIELDS: [&str; 11] = [
    "property_id",
    "name",
    "address",
    "access",
    "rent",
    "layout",
    "area",
    "update_time",
    "management_fee",
    "deposit",
    "key_money",
];

/// Last-resort fields written one cell at a time when every batched
/// strategy has failed.
pub const IDENTITY_FIELDS: [&str; 4] = ["url", "property_id", "rent", "layout"];

/// Fixed mapping from canonical field name to 1-based store column.
///
/// The physical layout is the declaration order of [`FIELD_NAMES`]:
/// `number` is column 1, `update_time` is column 23.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    entries: Vec<(&'static str, usize)>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        let entries = FIELD_NAMES
            .iter()
            .enumerate()
            .map(|(i, field)| (*field, i + 1))
            .collect();
        Self { entries }
    }
}

impl ColumnMap {
    /// 1-based column index for a field, if mapped.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, col)| *col)
    }

    /// Highest mapped column index.
    pub fn max_index(&self) -> usize {
        self.entries.iter().map(|(_, col)| *col).max().unwrap_or(0)
    }

    /// Mapped fields in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.entries.iter().copied()
    }
}

/// 1-based column index to spreadsheet letters: 1 → A, 26 → Z, 27 → AA.
/// Supports arbitrary width.
pub fn column_label(mut index: usize) -> String {
    debug_assert!(index >= 1, "column indices are 1-based");
    let mut letters = Vec::new();
    while index > 0 {
        index -= 1;
        letters.push(b'A' + (index % 26) as u8);
        index /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// One cell in the store, 1-based row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellAddress {
    pub row: usize,
    pub col: usize,
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_label(self.col), self.row)
    }
}

/// A contiguous horizontal span of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub row: usize,
    pub first_col: usize,
    pub last_col: usize,
}

impl RowRange {
    pub fn width(&self) -> usize {
        self.last_col.saturating_sub(self.first_col) + 1
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            column_label(self.first_col),
            self.row,
            column_label(self.last_col),
            self.row
        )
    }
}
