// SPDX-License-Identifier: MIT
//
// Compositor: flattens the plane tree into one FrameBuffer.
//
// Planes are laid down in painting order (parents first, then children in
// attach order, depth first), each cell resolved against what is already
// in the frame:
//
//   glyph       an empty cell falls back to the plane's base cell; if that
//               is empty too, the glyph below keeps showing
//   background  Opaque replaces, Blend averages, Transparent keeps
//   foreground  the same, for cells that supply a glyph; HighContrast is
//               settled after every plane is down, against the final
//               background
//
// Cells outside the screen are clipped. A wide cluster whose lead column is
// off the left edge shows as a space in its second column.

use tessel_term::cell::Cell;
use tessel_term::channel::Alpha;
use tessel_term::color::CellColor;
use tessel_term::egc::Egc;
use tessel_term::frame::FrameBuffer;
use tessel_term::terminal::Size;

use crate::plane::{PlaneArena, PlaneCell};

pub(crate) struct Compositor {
    frame: FrameBuffer,
    /// Cells whose foreground is decided by the final background.
    high_contrast: Vec<bool>,
}

impl Compositor {
    pub(crate) fn new(size: Size) -> Self {
        Self {
            frame: FrameBuffer::new(size.rows, size.cols),
            high_contrast: Vec::new(),
        }
    }

    pub(crate) fn resize(&mut self, size: Size) {
        self.frame.resize(size.rows, size.cols);
    }

    /// Paint every plane and return the finished frame.
    pub(crate) fn compose(&mut self, arena: &PlaneArena) -> &FrameBuffer {
        let rows = self.frame.rows();
        let cols = self.frame.cols();
        self.frame.clear();
        self.high_contrast.clear();
        self.high_contrast
            .resize(usize::from(rows) * usize::from(cols), false);

        for (id, origin_row, origin_col) in arena.paint_order() {
            let Some(plane) = arena.get(id) else {
                continue;
            };
            for pr in 0..plane.rows {
                let Ok(row) = u16::try_from(origin_row.saturating_add(i32::from(pr))) else {
                    continue;
                };
                if row >= rows {
                    break;
                }
                let mut lead_covers_next = false;
                for pc in 0..plane.cols {
                    let Ok(col) = u16::try_from(origin_col.saturating_add(i32::from(pc))) else {
                        lead_covers_next = false;
                        continue;
                    };
                    if col >= cols {
                        break;
                    }
                    let Some(&cell) = plane.cell(pr, pc) else {
                        continue;
                    };
                    if cell.is_continuation() {
                        if lead_covers_next {
                            lead_covers_next = false;
                            continue;
                        }
                        let orphan = PlaneCell::new(Egc::SPACE, cell.channels, cell.styles);
                        self.layer(row, col, orphan);
                        continue;
                    }
                    let source = if cell.is_empty() { plane.base } else { cell };
                    lead_covers_next = self.layer(row, col, source) == 2;
                }
            }
        }

        self.settle_contrast();
        &self.frame
    }

    /// Lay one plane cell over the frame. Returns the columns the glyph
    /// covered; 0 when the cell only tinted the background.
    fn layer(&mut self, row: u16, col: u16, source: PlaneCell) -> u16 {
        let Some(&below) = self.frame.get(row, col) else {
            return 0;
        };
        let fg_ch = source.channels.fg();
        let bg_ch = source.channels.bg();

        let bg = match bg_ch.alpha() {
            Alpha::Opaque | Alpha::HighContrast => CellColor::from(bg_ch),
            Alpha::Blend => CellColor::from(bg_ch).blend_over(below.bg),
            Alpha::Transparent => below.bg,
        };

        if source.is_empty() {
            self.tint(row, col, below, bg);
            return 0;
        }

        let idx = usize::from(row) * usize::from(self.frame.cols()) + usize::from(col);
        let (fg, contrast) = match fg_ch.alpha() {
            Alpha::Opaque => (CellColor::from(fg_ch), false),
            Alpha::Blend => (CellColor::from(fg_ch).blend_over(below.fg), false),
            Alpha::Transparent => (below.fg, self.high_contrast[idx]),
            Alpha::HighContrast => (CellColor::from(fg_ch), true),
        };

        let covered = self
            .frame
            .paint(row, col, Cell::styled(source.egc, fg, bg, source.styles));
        for flag in self.high_contrast.iter_mut().skip(idx).take(usize::from(covered)) {
            *flag = contrast;
        }
        covered
    }

    /// Change only the background, keeping both halves of a wide cluster
    /// the same colour.
    fn tint(&mut self, row: u16, col: u16, below: Cell, bg: CellColor) {
        if below.is_continuation() {
            return;
        }
        self.frame.set(row, col, Cell { bg, ..below });
        if below.egc.width() == 2 {
            if let Some(&next) = self.frame.get(row, col + 1) {
                if next.is_continuation() {
                    self.frame.set(row, col + 1, Cell { bg, ..next });
                }
            }
        }
    }

    fn settle_contrast(&mut self) {
        let cols = self.frame.cols();
        if cols == 0 {
            return;
        }
        let flagged: Vec<usize> = self
            .high_contrast
            .iter()
            .enumerate()
            .filter_map(|(i, &hc)| hc.then_some(i))
            .collect();
        for idx in flagged {
            // idx < rows * cols, so both parts fit in u16
            #[allow(clippy::cast_possible_truncation)]
            let (row, col) = ((idx / usize::from(cols)) as u16, (idx % usize::from(cols)) as u16);
            if let Some(&cell) = self.frame.get(row, col) {
                self.frame.set(
                    row,
                    col,
                    Cell {
                        fg: cell.bg.contrasting(),
                        ..cell
                    },
                );
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::tests::arena;
    use crate::plane::PlaneHandle;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tessel_term::cell::Attr;
    use tessel_term::channel::Channels;

    fn composed(arena: &Rc<RefCell<PlaneArena>>, rows: u16, cols: u16) -> FrameBuffer {
        let mut comp = Compositor::new(Size::new(rows, cols));
        comp.compose(&arena.borrow()).clone()
    }

    #[test]
    fn root_text_reaches_frame() {
        let (arena, root) = arena(2, 5);
        root.put_text_at(1, 1, "hi").unwrap();
        let frame = composed(&arena, 2, 5);
        assert_eq!(frame.row_text(0), "     ");
        assert_eq!(frame.row_text(1), " hi  ");
    }

    #[test]
    fn later_sibling_occludes_earlier() {
        let (arena, root) = arena(1, 6);
        let a = root.create_child(0, 0, 1, 4).unwrap();
        let b = root.create_child(0, 2, 1, 4).unwrap();
        a.put_str("AAAA").unwrap();
        b.put_str("BBBB").unwrap();
        let frame = composed(&arena, 1, 6);
        assert_eq!(frame.row_text(0), "AABBBB");
    }

    #[test]
    fn children_paint_over_parents() {
        let (arena, root) = arena(1, 4);
        root.put_str("....").unwrap();
        let child = root.create_child(0, 1, 1, 2).unwrap();
        child.put_str("cc").unwrap();
        let grandchild = child.create_child(0, 1, 1, 1).unwrap();
        grandchild.put_str("g").unwrap();
        assert_eq!(composed(&arena, 1, 4).row_text(0), ".cg.");
    }

    #[test]
    fn planes_are_clipped_to_screen() {
        let (arena, root) = arena(2, 3);
        let child = root.create_child(-1, -1, 3, 5).unwrap();
        child.put_text_at(0, 0, "xxxxx").unwrap();
        child.put_text_at(1, 0, "abcde").unwrap();
        let frame = composed(&arena, 2, 3);
        assert_eq!(frame.row_text(0), "bcd");
    }

    #[test]
    fn empty_cells_show_glyph_below() {
        let (arena, root) = arena(1, 3);
        root.put_str("abc").unwrap();
        root.create_child(0, 0, 1, 3).unwrap().put_text_at(0, 1, "X").unwrap();
        assert_eq!(composed(&arena, 1, 3).row_text(0), "aXc");
    }

    #[test]
    fn base_cell_fills_unwritten_cells() {
        let (arena, root) = arena(1, 3);
        root.put_str("abc").unwrap();
        let child = root.create_child(0, 0, 1, 3).unwrap();
        child.set_base("-", Channels::new(), Attr::empty()).unwrap();
        child.put_text_at(0, 1, "X").unwrap();
        assert_eq!(composed(&arena, 1, 3).row_text(0), "-X-");
    }

    #[test]
    fn opaque_background_replaces() {
        let (arena, root) = arena(1, 1);
        root.set_bg_rgb8(10, 20, 30).unwrap();
        root.put_str("a").unwrap();
        let child = root.create_child(0, 0, 1, 1).unwrap();
        child.set_bg_rgb8(200, 0, 0).unwrap();
        child.put_str("b").unwrap();
        let cell = *composed(&arena, 1, 1).get(0, 0).unwrap();
        assert_eq!(cell.bg, CellColor::Rgb(200, 0, 0));
        assert_eq!(cell.egc.as_str(), "b");
    }

    #[test]
    fn transparent_background_keeps_below() {
        let (arena, root) = arena(1, 1);
        root.set_bg_rgb8(10, 20, 30).unwrap();
        root.put_str("a").unwrap();
        let child = root.create_child(0, 0, 1, 1).unwrap();
        child.set_bg_alpha(Alpha::Transparent).unwrap();
        child.put_str("b").unwrap();
        let cell = *composed(&arena, 1, 1).get(0, 0).unwrap();
        assert_eq!(cell.bg, CellColor::Rgb(10, 20, 30));
        assert_eq!(cell.egc.as_str(), "b");
    }

    #[test]
    fn blend_averages() {
        let (arena, root) = arena(1, 1);
        root.set_bg_rgb8(0, 100, 200).unwrap();
        root.put_str(" ").unwrap();
        let child = root.create_child(0, 0, 1, 1).unwrap();
        child.set_bg_rgb8(100, 100, 0).unwrap();
        child.set_bg_alpha(Alpha::Blend).unwrap();
        child.put_str(" ").unwrap();
        let cell = *composed(&arena, 1, 1).get(0, 0).unwrap();
        assert_eq!(cell.bg, CellColor::Rgb(50, 100, 100));
    }

    #[test]
    fn high_contrast_uses_final_background() {
        let (arena, root) = arena(1, 2);
        root.set_fg_alpha(Alpha::HighContrast).unwrap();
        root.put_str("ab").unwrap();
        let mut light = Channels::new();
        light.set_bg_rgb8(250, 250, 250).unwrap();
        let shade = root.create_child(0, 0, 1, 1).unwrap();
        shade.set_base("", light, Attr::empty()).unwrap();
        let frame = composed(&arena, 1, 2);
        let a = frame.get(0, 0).unwrap();
        assert_eq!(a.egc.as_str(), "a");
        assert_eq!(a.bg, CellColor::Rgb(250, 250, 250));
        assert_eq!(a.fg, CellColor::Rgb(0, 0, 0));
        assert_eq!(frame.get(0, 1).unwrap().fg, CellColor::Default);
    }

    #[test]
    fn narrow_glyph_over_wide_breaks_it() {
        let (arena, root) = arena(1, 4);
        root.put_str("中中").unwrap();
        root.create_child(0, 1, 1, 1).unwrap().put_str("x").unwrap();
        assert_eq!(composed(&arena, 1, 4).row_text(0), " x中");
    }

    #[test]
    fn wide_glyph_cut_by_left_edge() {
        let (arena, root) = arena(1, 3);
        root.create_child(0, -1, 1, 4).unwrap().put_str("中ab").unwrap();
        assert_eq!(composed(&arena, 1, 3).row_text(0), " ab");
    }

    #[test]
    fn root_origin_offsets_everything() {
        let arena = Rc::new(RefCell::new(PlaneArena::new(1, 2, Size::new(1, 2)).unwrap()));
        let root = PlaneHandle::attached(Rc::downgrade(&arena), arena.borrow().root());
        root.put_str("ok").unwrap();
        let frame = composed(&arena, 3, 5);
        assert_eq!(frame.row_text(0), "     ");
        assert_eq!(frame.row_text(1), "  ok ");
    }
}
