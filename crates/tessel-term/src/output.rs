// SPDX-License-Identifier: MIT
//
// Output buffering and stateful cell emission.
//
//   OutputBuffer → collects a whole frame's bytes so it reaches the terminal
//   in one write. Every byte of a render passes through here.
//
//   CellWriter → remembers what the terminal was last told (cursor position,
//   colours, styles) and only emits sequences that change something. Runs of
//   same-styled text come out as bare characters.
//
// The writer also folds colours to the terminal's depth, so frames can keep
// full RGB regardless of where they are shown.

use std::io::{self, Write};

use crate::ansi;
use crate::cell::{Attr, Cell};
use crate::color::{CellColor, ColorDepth};
use crate::egc::Egc;

// ─── OutputBuffer ────────────────────────────────────────────────────────────

/// A byte buffer flushed with a single `write_all`.
pub struct OutputBuffer {
    buf: Vec<u8>,
}

const DEFAULT_CAPACITY: usize = 16_384;

impl OutputBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append a cluster's UTF-8. Sentinels and zero-width clusters become a
    /// space so the terminal cursor still advances one column.
    pub fn write_egc(&mut self, egc: &Egc) {
        let s = egc.as_str();
        if s.is_empty() || egc.width() == 0 {
            self.buf.push(b' ');
        } else {
            self.buf.extend_from_slice(s.as_bytes());
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Write everything to `w`, flush it, and clear.
    ///
    /// The buffer is cleared even when the write fails: a partial frame is
    /// never retried.
    ///
    /// # Errors
    ///
    /// Returns the writer's error.
    pub fn flush_to(&mut self, w: &mut (impl Write + ?Sized)) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = w.write_all(&self.buf).and_then(|()| w.flush());
        self.buf.clear();
        result
    }
}

impl Write for OutputBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── CellWriter ──────────────────────────────────────────────────────────────

/// Emits cells with the minimum of escape sequences.
///
/// - Cursor moves are skipped when the next cell is directly after the last.
/// - A style change resets (SGR 0) and re-emits, which also forgets colours.
/// - Colours are skipped when unchanged.
/// - A continuation cell right after its wide cluster emits nothing.
#[allow(clippy::struct_field_names)]
pub struct CellWriter {
    depth: ColorDepth,
    last_row: i32,
    last_col: i32,
    last_fg: Option<CellColor>,
    last_bg: Option<CellColor>,
    last_attrs: Attr,
}

impl CellWriter {
    #[must_use]
    pub const fn new(depth: ColorDepth) -> Self {
        Self {
            depth,
            last_row: -1,
            last_col: -1,
            last_fg: None,
            last_bg: None,
            last_attrs: Attr::empty(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn depth(&self) -> ColorDepth {
        self.depth
    }

    /// Forget everything the terminal was told. Call after SGR 0 or a clear.
    pub const fn reset_state(&mut self) {
        *self = Self::new(self.depth);
    }

    /// Emit one cell at `(row, col)`.
    pub fn render_cell(&mut self, out: &mut OutputBuffer, row: u16, col: u16, cell: &Cell) {
        let r = i32::from(row);
        let c = i32::from(col);

        if cell.is_continuation() {
            if r == self.last_row && c == self.last_col + 1 && self.last_col >= 0 {
                // Already covered by the wide cluster just written.
                self.last_col = c;
                return;
            }
            self.move_to(out, row, col);
            self.apply_style(out, cell);
            out.buf.push(b' ');
            self.advance(r, c, 1);
            return;
        }

        self.move_to(out, row, col);
        self.apply_style(out, cell);
        out.write_egc(&cell.egc);
        // The terminal has advanced past the cluster's first column; a wide
        // cluster's continuation is accounted for when it is visited.
        self.advance(r, c, 1);
    }

    fn move_to(&mut self, out: &mut OutputBuffer, row: u16, col: u16) {
        if i32::from(row) != self.last_row || i32::from(col) != self.last_col + 1 {
            ansi::cursor_to(out, row, col).ok();
        }
    }

    const fn advance(&mut self, row: i32, col: i32, width: i32) {
        self.last_row = row;
        self.last_col = col + width - 1;
    }

    fn apply_style(&mut self, out: &mut OutputBuffer, cell: &Cell) {
        if cell.attrs != self.last_attrs {
            if !self.last_attrs.is_empty() {
                ansi::reset(out).ok();
                self.last_fg = None;
                self.last_bg = None;
            }
            self.last_attrs = cell.attrs;
            ansi::attrs(out, cell.attrs).ok();
        }

        let fg = cell.fg.quantize(self.depth);
        if self.last_fg != Some(fg) {
            ansi::fg(out, fg).ok();
            self.last_fg = Some(fg);
        }

        let bg = cell.bg.quantize(self.depth);
        if self.last_bg != Some(bg) {
            ansi::bg(out, bg).ok();
            self.last_bg = Some(bg);
        }
    }
}

impl Default for CellWriter {
    fn default() -> Self {
        Self::new(ColorDepth::TrueColor)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
