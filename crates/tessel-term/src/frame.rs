// SPDX-License-Identifier: MIT
//
// FrameBuffer: the physical screen as a grid of resolved cells.
//
// Compositing writes the flattened plane hierarchy here; the diff renderer
// compares it against the previous frame. Storage is a flat row-major
// `Vec<Cell>`, so a row is a contiguous slice and unchanged rows can be
// skipped with one slice comparison.
//
// Wide clusters are kept consistent on every write: overwriting either half
// of a wide cluster breaks the other half into a blank, and a wide cluster
// that would hang past the right edge is replaced by a space.

use crate::cell::Cell;
use crate::egc::Egc;

/// A `rows × cols` grid of cells. Coordinates are `(row, col)`.
///
/// ```
/// use tessel_term::cell::Cell;
/// use tessel_term::egc::Egc;
/// use tessel_term::frame::FrameBuffer;
///
/// let mut frame = FrameBuffer::new(24, 80);
/// frame.paint(3, 5, Cell::new(Egc::new("X")));
/// assert_eq!(frame.get(3, 5).unwrap().egc.as_str(), "X");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    rows: u16,
    cols: u16,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    /// A grid of blanks.
    #[must_use]
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::EMPTY; usize::from(rows) * usize::from(cols)],
        }
    }

    #[inline]
    #[must_use]
    pub const fn rows(&self) -> u16 {
        self.rows
    }

    #[inline]
    #[must_use]
    pub const fn cols(&self) -> u16 {
        self.cols
    }

    #[inline]
    #[must_use]
    pub const fn in_bounds(&self, row: u16, col: u16) -> bool {
        row < self.rows && col < self.cols
    }

    #[inline]
    const fn index(&self, row: u16, col: u16) -> usize {
        row as usize * self.cols as usize + col as usize
    }

    #[inline]
    #[must_use]
    pub fn get(&self, row: u16, col: u16) -> Option<&Cell> {
        if self.in_bounds(row, col) {
            Some(&self.cells[self.index(row, col)])
        } else {
            None
        }
    }

    /// One row as a slice.
    #[inline]
    #[must_use]
    pub fn row(&self, row: u16) -> Option<&[Cell]> {
        if row < self.rows {
            let start = self.index(row, 0);
            Some(&self.cells[start..start + usize::from(self.cols)])
        } else {
            None
        }
    }

    /// Visible text of one row, continuation cells omitted.
    #[must_use]
    pub fn row_text(&self, row: u16) -> String {
        self.row(row)
            .unwrap_or_default()
            .iter()
            .filter(|c| !c.is_continuation())
            .map(|c| c.egc.as_str())
            .collect()
    }

    // ─── Clear, resize, copy ─────────────────────────────────────────────

    pub fn clear(&mut self) {
        self.cells.fill(Cell::EMPTY);
    }

    /// Resize and clear.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.rows = rows;
        self.cols = cols;
        self.cells.clear();
        self.cells
            .resize(usize::from(rows) * usize::from(cols), Cell::EMPTY);
    }

    /// Copy another frame's contents, reusing this allocation when the
    /// sizes match.
    pub fn copy_from(&mut self, other: &Self) {
        self.rows = other.rows;
        self.cols = other.cols;
        self.cells.clone_from(&other.cells);
    }

    // ─── Writes ──────────────────────────────────────────────────────────

    /// Raw bounds-checked store. No wide-cluster bookkeeping.
    #[inline]
    pub fn set(&mut self, row: u16, col: u16, cell: Cell) -> bool {
        if !self.in_bounds(row, col) {
            return false;
        }
        let idx = self.index(row, col);
        self.cells[idx] = cell;
        true
    }

    /// Break any wide cluster touching `(row, col)`.
    fn break_wide_at(&mut self, row: u16, col: u16) {
        let idx = self.index(row, col);
        if self.cells[idx].is_continuation() && col > 0 {
            let lead = self.index(row, col - 1);
            self.cells[lead].egc = Egc::SPACE;
        }
        if col + 1 < self.cols {
            let next = self.index(row, col + 1);
            if self.cells[next].is_continuation() {
                let style = self.cells[next];
                self.cells[next] = Cell::styled(Egc::SPACE, style.fg, style.bg, style.attrs);
            }
        }
    }

    /// Write a cell, keeping wide clusters intact.
    ///
    /// A two-column cluster also claims `(row, col + 1)` as its continuation.
    /// If that column is off the frame a space is written instead. Returns
    /// the number of columns covered (0 when out of bounds).
    pub fn paint(&mut self, row: u16, col: u16, cell: Cell) -> u16 {
        if !self.in_bounds(row, col) {
            return 0;
        }
        self.break_wide_at(row, col);

        let wide = cell.egc.width() == 2;
        if wide && col + 1 >= self.cols {
            let idx = self.index(row, col);
            self.cells[idx] = Cell::styled(Egc::SPACE, cell.fg, cell.bg, cell.attrs);
            return 1;
        }

        let idx = self.index(row, col);
        self.cells[idx] = cell;
        if !wide {
            return 1;
        }

        self.break_wide_at(row, col + 1);
        let cont = self.index(row, col + 1);
        self.cells[cont] = Cell::continuation(cell.fg, cell.bg, cell.attrs);
        2
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameBuffer({}x{})", self.rows, self.cols)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::CellColor;
    use pretty_assertions::assert_eq;

    fn glyph(s: &str) -> Cell {
        Cell::new(Egc::new(s))
    }

    #[test]
    fn new_is_blank() {
        let f = FrameBuffer::new(3, 4);
        assert_eq!((f.rows(), f.cols()), (3, 4));
        assert!(f.row(2).unwrap().iter().all(Cell::is_blank));
        assert_eq!(f.get(3, 0), None);
        assert_eq!(f.get(0, 4), None);
    }

    #[test]
    fn zero_size() {
        let f = FrameBuffer::new(0, 0);
        assert_eq!(f.row(0), None);
        assert_eq!(f.row_text(0), "");
    }

    #[test]
    fn paint_narrow() {
        let mut f = FrameBuffer::new(1, 3);
        assert_eq!(f.paint(0, 1, glyph("x")), 1);
        assert_eq!(f.row_text(0), " x ");
    }

    #[test]
    fn paint_out_of_bounds() {
        let mut f = FrameBuffer::new(1, 3);
        assert_eq!(f.paint(1, 0, glyph("x")), 0);
        assert_eq!(f.paint(0, 3, glyph("x")), 0);
    }

    #[test]
    fn paint_wide_sets_continuation() {
        let mut f = FrameBuffer::new(1, 4);
        let c = glyph("中").with_bg(CellColor::Ansi256(3));
        assert_eq!(f.paint(0, 1, c), 2);
        let cont = f.get(0, 2).unwrap();
        assert!(cont.is_continuation());
        assert_eq!(cont.bg, CellColor::Ansi256(3));
        assert_eq!(f.row_text(0), " 中 ");
    }

    #[test]
    fn wide_at_right_edge_becomes_space() {
        let mut f = FrameBuffer::new(1, 3);
        assert_eq!(f.paint(0, 2, glyph("中")), 1);
        assert_eq!(f.row_text(0), "   ");
    }

    #[test]
    fn overwriting_continuation_breaks_lead() {
        let mut f = FrameBuffer::new(1, 4);
        f.paint(0, 0, glyph("中"));
        f.paint(0, 1, glyph("x"));
        assert_eq!(f.row_text(0), " x  ");
        assert!(!f.get(0, 1).unwrap().is_continuation());
    }

    #[test]
    fn overwriting_lead_clears_continuation() {
        let mut f = FrameBuffer::new(1, 4);
        f.paint(0, 0, glyph("中"));
        f.paint(0, 0, glyph("a"));
        assert_eq!(f.row_text(0), "a   ");
        assert!(!f.get(0, 1).unwrap().is_continuation());
    }

    #[test]
    fn resize_clears() {
        let mut f = FrameBuffer::new(2, 2);
        f.paint(0, 0, glyph("x"));
        f.resize(3, 5);
        assert_eq!((f.rows(), f.cols()), (3, 5));
        assert!(f.get(0, 0).unwrap().is_blank());
    }

    #[test]
    fn copy_from_matches() {
        let mut a = FrameBuffer::new(2, 2);
        a.paint(1, 1, glyph("q"));
        let mut b = FrameBuffer::new(5, 5);
        b.copy_from(&a);
        assert_eq!(a, b);
    }

    #[test]
    fn set_is_raw() {
        let mut f = FrameBuffer::new(1, 2);
        assert!(f.set(0, 1, glyph("z")));
        assert!(!f.set(0, 2, glyph("z")));
        assert_eq!(f.row_text(0), " z");
    }
}
