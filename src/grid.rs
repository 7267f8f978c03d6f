//! Cell coordinates and the sparse cell grid built by the container extractor.
//!
//! A [`CellCoordinate`] is decoded from a spreadsheet reference such as `AB10`:
//! the column letters are a base-26 number with `A = 1` (so `Z = 26`,
//! `AA = 27`) and the trailing digits are the 1-based row. Both components are
//! always at least 1 and never beyond the format's sheet limits.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::data::Scalar;

/// Largest column addressable by the container format (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;
/// Largest row addressable by the container format.
pub const MAX_ROW: u32 = 1_048_576;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoordinate {
    pub row: u32,
    pub column: u32,
}

impl CellCoordinate {
    pub fn new(row: u32, column: u32) -> Option<Self> {
        ((1..=MAX_ROW).contains(&row) && (1..=MAX_COLUMN).contains(&column))
            .then_some(Self { row, column })
    }

    /// Decodes an A1-style reference. Absolute markers (`$A$1`) and lowercase
    /// letters are accepted; anything else yields `None`.
    pub fn parse(reference: &str) -> Option<Self> {
        let cleaned = reference.trim().replace('$', "");
        let split = cleaned.find(|c: char| !c.is_ascii_alphabetic())?;
        let (letters, digits) = cleaned.split_at(split);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let column = column_from_letters(letters)?;
        let row = digits.parse::<u32>().ok()?;
        Self::new(row, column)
    }

    pub fn to_reference(&self) -> String {
        format!("{}{}", column_letters(self.column), self.row)
    }
}

/// Converts column letters to a 1-based index (`A` → 1, `AA` → 27).
pub fn column_from_letters(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut column: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        column = column * 26 + digit;
    }
    (column <= MAX_COLUMN).then_some(column)
}

/// Converts a 1-based column index to its letters (`28` → `AB`).
pub fn column_letters(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Sparse coordinate → scalar mapping with tracked bounds, kept in row-major
/// order. Missing cells are implicitly empty.
#[derive(Debug, Clone, Default)]
pub struct CellGrid {
    cells: BTreeMap<CellCoordinate, Scalar>,
    max_row: u32,
    max_column: u32,
}

impl CellGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coordinate: CellCoordinate, value: Scalar) {
        self.max_row = self.max_row.max(coordinate.row);
        self.max_column = self.max_column.max(coordinate.column);
        self.cells.insert(coordinate, value);
    }

    pub fn get(&self, coordinate: CellCoordinate) -> &Scalar {
        static EMPTY: Scalar = Scalar::Empty;
        self.cells.get(&coordinate).unwrap_or(&EMPTY)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.max_row, self.max_column)
    }

    /// Rows that hold at least one cell, top to bottom, each padded to
    /// `max_column` with `Empty`. Rows without cells are left out, so the
    /// result is proportional to the cells present rather than the bounds.
    pub fn to_rows(&self) -> Vec<Vec<Scalar>> {
        let width = self.max_column as usize;
        self.cells
            .iter()
            .chunk_by(|(coordinate, _)| coordinate.row)
            .into_iter()
            .map(|(_, cells)| {
                let mut row = vec![Scalar::Empty; width];
                for (coordinate, value) in cells {
                    row[coordinate.column as usize - 1] = value.clone();
                }
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decodes_reference_examples() {
        assert_eq!(CellCoordinate::parse("A1"), CellCoordinate::new(1, 1));
        assert_eq!(CellCoordinate::parse("Z1"), CellCoordinate::new(1, 26));
        assert_eq!(CellCoordinate::parse("AA1"), CellCoordinate::new(1, 27));
        assert_eq!(CellCoordinate::parse("AB10"), CellCoordinate::new(10, 28));
        assert_eq!(CellCoordinate::parse("$c$3"), CellCoordinate::new(3, 3));
    }

    #[test]
    fn parse_rejects_malformed_references() {
        assert_eq!(CellCoordinate::parse("A0"), None);
        assert_eq!(CellCoordinate::parse("10"), None);
        assert_eq!(CellCoordinate::parse("A"), None);
        assert_eq!(CellCoordinate::parse("A1B"), None);
        assert_eq!(CellCoordinate::parse("XFE1"), None);
        assert_eq!(CellCoordinate::parse("A1048577"), None);
        assert_eq!(CellCoordinate::parse("XFD4000000000"), None);
        assert_eq!(CellCoordinate::parse(""), None);
        assert_eq!(CellCoordinate::parse("XFD1048576"), CellCoordinate::new(MAX_ROW, MAX_COLUMN));
    }

    #[test]
    fn column_letters_round_trip_boundaries() {
        for (column, letters) in [(1, "A"), (26, "Z"), (27, "AA"), (52, "AZ"), (703, "AAA")] {
            assert_eq!(column_letters(column), letters);
            assert_eq!(column_from_letters(letters), Some(column));
        }
    }

    #[test]
    fn grid_tracks_bounds_and_fills_gaps() {
        let mut grid = CellGrid::new();
        grid.insert(CellCoordinate::new(3, 2).unwrap(), Scalar::Text("x".into()));
        grid.insert(CellCoordinate::new(1, 1).unwrap(), Scalar::Integer(1));
        assert_eq!(grid.bounds(), (3, 2));
        let rows = grid.to_rows();
        assert_eq!(
            rows,
            vec![
                vec![Scalar::Integer(1), Scalar::Empty],
                vec![Scalar::Empty, Scalar::Text("x".into())],
            ]
        );
    }

    #[test]
    fn distant_cells_do_not_inflate_the_rows() {
        let mut grid = CellGrid::new();
        grid.insert(CellCoordinate::new(1, 1).unwrap(), Scalar::Integer(1));
        grid.insert(CellCoordinate::new(MAX_ROW, 3).unwrap(), Scalar::Integer(2));
        assert_eq!(grid.bounds(), (MAX_ROW, 3));
        assert_eq!(grid.to_rows().len(), 2);
    }
}
