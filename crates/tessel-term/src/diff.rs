// SPDX-License-Identifier: MIT
//
// Differential renderer.
//
// Each render compares the freshly composited frame against the last one
// sent and emits escape sequences only for cells that changed:
//
//   1. begin synchronized output
//   2. first frame or size change: clear the screen, draw everything
//   3. otherwise skip identical rows with one slice comparison, then walk
//      the remaining rows cell by cell
//   4. SGR reset, end synchronized output
//
// A frame with no changes still produces the sync markers and the reset, but
// no cell output. The previous frame is kept by copying into the existing
// allocation, so steady-state renders do not allocate.

use std::io::{self, Write};

use crate::ansi;
use crate::color::ColorDepth;
use crate::frame::FrameBuffer;
use crate::output::{CellWriter, OutputBuffer};

// ─── RenderStats ─────────────────────────────────────────────────────────────

/// What one diff pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    /// Cells that differed from the previous frame and were emitted.
    pub cells_rendered: usize,
    /// Cells identical to the previous frame.
    pub cells_skipped: usize,
    /// Bytes of output generated.
    pub bytes_written: usize,
    /// Whether the pass redrew the whole screen.
    pub full_redraw: bool,
}

impl RenderStats {
    #[inline]
    #[must_use]
    pub const fn total_cells(&self) -> usize {
        self.cells_rendered + self.cells_skipped
    }
}

// ─── DiffRenderer ────────────────────────────────────────────────────────────

/// Emits only what changed since the previous frame.
pub struct DiffRenderer {
    output: OutputBuffer,
    writer: CellWriter,
    previous: Option<FrameBuffer>,
}

impl DiffRenderer {
    /// A renderer whose first frame draws everything.
    #[must_use]
    pub fn new(depth: ColorDepth) -> Self {
        Self {
            output: OutputBuffer::new(),
            writer: CellWriter::new(depth),
            previous: None,
        }
    }

    /// Diff `current` against the previous frame into the output buffer.
    ///
    /// Nothing reaches the terminal until [`flush_to`](Self::flush_to).
    pub fn render(&mut self, current: &FrameBuffer) -> RenderStats {
        self.output.clear();
        self.writer.reset_state();

        let rows = current.rows();
        let cols = current.cols();
        let mut stats = RenderStats::default();

        if rows == 0 || cols == 0 {
            self.store_frame(current);
            return stats;
        }

        ansi::begin_sync(&mut self.output).ok();

        let previous = self
            .previous
            .as_ref()
            .filter(|prev| prev.rows() == rows && prev.cols() == cols);
        stats.full_redraw = previous.is_none();

        if stats.full_redraw {
            ansi::reset(&mut self.output).ok();
            ansi::clear_screen(&mut self.output).ok();
        }

        for row in 0..rows {
            let (Some(curr_row), prev_row) = (current.row(row), previous.and_then(|p| p.row(row)))
            else {
                continue;
            };

            if prev_row == Some(curr_row) {
                stats.cells_skipped += usize::from(cols);
                continue;
            }

            for (col, cell) in (0..cols).zip(curr_row) {
                let changed = prev_row.is_none_or(|p| p[usize::from(col)] != *cell);
                if changed {
                    self.writer.render_cell(&mut self.output, row, col, cell);
                    stats.cells_rendered += 1;
                } else {
                    stats.cells_skipped += 1;
                }
            }
        }

        ansi::reset(&mut self.output).ok();
        ansi::end_sync(&mut self.output).ok();

        stats.bytes_written = self.output.len();
        self.store_frame(current);
        stats
    }

    /// Bytes produced by the last render and not yet flushed.
    #[must_use]
    pub fn output_bytes(&self) -> &[u8] {
        self.output.as_bytes()
    }

    /// Write pending output to `w`.
    ///
    /// # Errors
    ///
    /// Returns the writer's error. The pending output is dropped either way.
    pub fn flush_to(&mut self, w: &mut (impl Write + ?Sized)) -> io::Result<()> {
        self.output.flush_to(w)
    }

    /// Forget the previous frame so the next render redraws everything.
    pub fn force_redraw(&mut self) {
        self.previous = None;
    }

    fn store_frame(&mut self, current: &FrameBuffer) {
        match &mut self.previous {
            Some(prev) => prev.copy_from(current),
            None => self.previous = Some(current.clone()),
        }
    }
}

impl Default for DiffRenderer {
    fn default() -> Self {
        Self::new(ColorDepth::TrueColor)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Attr, Cell};
    use crate::color::CellColor;
    use crate::egc::Egc;
    use pretty_assertions::assert_eq;

    const FRAME_TAIL: &str = "\x1b[0m\x1b[?2026l";

    fn render_frame(renderer: &mut DiffRenderer, frame: &FrameBuffer) -> (RenderStats, String) {
        let stats = renderer.render(frame);
        let output = String::from_utf8(renderer.output_bytes().to_vec()).unwrap();
        (stats, output)
    }

    fn glyph(s: &str) -> Cell {
        Cell::new(Egc::new(s))
    }

    #[test]
    fn first_render_draws_all_cells() {
        let mut r = DiffRenderer::default();
        let frame = FrameBuffer::new(5, 10);
        let (stats, out) = render_frame(&mut r, &frame);
        assert_eq!(stats.cells_rendered, 50);
        assert_eq!(stats.cells_skipped, 0);
        assert!(stats.full_redraw);
        assert!(out.starts_with("\x1b[?2026h\x1b[0m\x1b[2J"));
        assert!(out.ends_with(FRAME_TAIL));
    }

    #[test]
    fn unchanged_frame_emits_no_cells() {
        let mut r = DiffRenderer::default();
        let mut frame = FrameBuffer::new(3, 4);
        frame.paint(1, 1, glyph("x"));
        render_frame(&mut r, &frame);
        let (stats, out) = render_frame(&mut r, &frame);
        assert_eq!(stats.cells_rendered, 0);
        assert_eq!(stats.cells_skipped, 12);
        assert!(!stats.full_redraw);
        assert_eq!(out, format!("\x1b[?2026h{FRAME_TAIL}"));
    }

    #[test]
    fn single_change_emits_single_cell() {
        let mut r = DiffRenderer::default();
        let mut frame = FrameBuffer::new(3, 4);
        render_frame(&mut r, &frame);
        frame.paint(2, 3, glyph("z"));
        let (stats, out) = render_frame(&mut r, &frame);
        assert_eq!(stats.cells_rendered, 1);
        assert_eq!(stats.total_cells(), 12);
        assert!(out.contains("\x1b[3;4H"));
        assert!(out.contains('z'));
    }

    #[test]
    fn style_change_is_a_change() {
        let mut r = DiffRenderer::default();
        let mut frame = FrameBuffer::new(1, 2);
        frame.paint(0, 0, glyph("a"));
        render_frame(&mut r, &frame);
        frame.paint(0, 0, glyph("a").with_attrs(Attr::BOLD));
        let (stats, out) = render_frame(&mut r, &frame);
        assert_eq!(stats.cells_rendered, 1);
        assert!(out.contains("\x1b[1m"));
    }

    #[test]
    fn resize_forces_full_redraw() {
        let mut r = DiffRenderer::default();
        render_frame(&mut r, &FrameBuffer::new(2, 2));
        let (stats, out) = render_frame(&mut r, &FrameBuffer::new(3, 3));
        assert!(stats.full_redraw);
        assert_eq!(stats.cells_rendered, 9);
        assert!(out.contains("\x1b[2J"));
    }

    #[test]
    fn force_redraw() {
        let mut r = DiffRenderer::default();
        let frame = FrameBuffer::new(2, 2);
        render_frame(&mut r, &frame);
        r.force_redraw();
        let (stats, _) = render_frame(&mut r, &frame);
        assert_eq!(stats.cells_rendered, 4);
    }

    #[test]
    fn zero_size_frame_emits_nothing() {
        let mut r = DiffRenderer::default();
        let (stats, out) = render_frame(&mut r, &FrameBuffer::new(0, 0));
        assert_eq!(stats, RenderStats::default());
        assert_eq!(out, "");
    }

    #[test]
    fn depth_applies_to_output() {
        let mut r = DiffRenderer::new(ColorDepth::None);
        let mut frame = FrameBuffer::new(1, 1);
        frame.paint(0, 0, glyph("a").with_fg(CellColor::Rgb(255, 0, 0)));
        let (_, out) = render_frame(&mut r, &frame);
        assert!(!out.contains("38;2"));
        assert!(out.contains("\x1b[39m"));
    }

    #[test]
    fn flush_to_writer() {
        let mut r = DiffRenderer::default();
        let mut frame = FrameBuffer::new(1, 1);
        frame.paint(0, 0, glyph("k"));
        let stats = r.render(&frame);
        let mut sink = Vec::new();
        r.flush_to(&mut sink).unwrap();
        assert_eq!(sink.len(), stats.bytes_written);
        assert!(r.output_bytes().is_empty());
    }
}
