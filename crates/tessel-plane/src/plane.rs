// SPDX-License-Identifier: MIT
//
// Planes: rectangular cell surfaces arranged in a tree.
//
// All planes of a context live in one arena owned by the context. Callers
// hold `PlaneHandle`s, which pair a weak reference to that arena with a
// generational id:
//
//   default handle          → never attached        → Error::Unattached
//   live arena, live id     → the plane
//   dead arena or stale id  → destroyed             → Error::UseAfterFree
//
// A handle never keeps the arena alive, so dropping or stopping the context
// invalidates every handle at once. Slots are reused after a destroy; the
// generation counter keeps old handles from reaching the new occupant.
//
// Each cell stores a grapheme cluster, a channel pair and styles. A
// two-column cluster is stored as a lead cell followed by a continuation
// cell. Writing over either half of a wide cluster turns the other half
// into a space, so a row never holds half a cluster.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tessel_term::cell::Attr;
use tessel_term::channel::{Alpha, ChannelError, Channels};
use tessel_term::egc::{self, Egc};
use tessel_term::terminal::Size;

use crate::error::{ArgumentError, Error, Result};

// ─── PlaneCell ──────────────────────────────────────────────────────────────

/// One cell of a plane.
///
/// An empty cluster means nothing was written there; the plane's base cell
/// shows instead.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaneCell {
    pub egc: Egc,
    pub channels: Channels,
    pub styles: Attr,
}

impl PlaneCell {
    /// Nothing written.
    pub const EMPTY: Self = Self {
        egc: Egc::EMPTY,
        channels: Channels::new(),
        styles: Attr::empty(),
    };

    #[must_use]
    pub const fn new(egc: Egc, channels: Channels, styles: Attr) -> Self {
        Self {
            egc,
            channels,
            styles,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.egc.is_empty()
    }

    #[inline]
    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        self.egc.is_continuation()
    }
}

impl fmt::Debug for PlaneCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlaneCell({:?} {:?}", self.egc, self.channels)?;
        if !self.styles.is_empty() {
            write!(f, " {:?}", self.styles)?;
        }
        f.write_str(")")
    }
}

/// Horizontal placement for [`PlaneHandle::put_text_aligned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

// ─── PlaneId ────────────────────────────────────────────────────────────────

/// Slot index plus the generation the slot had when the plane was made.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneId {
    index: u32,
    generation: u32,
}

impl fmt::Debug for PlaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

// ─── PlaneData ──────────────────────────────────────────────────────────────

pub(crate) struct PlaneData {
    pub(crate) parent: Option<PlaneId>,
    pub(crate) children: Vec<PlaneId>,
    /// Origin relative to the parent, or to the screen for the root.
    pub(crate) row: i32,
    pub(crate) col: i32,
    pub(crate) rows: u16,
    pub(crate) cols: u16,
    pub(crate) cells: Vec<PlaneCell>,
    /// Column may equal `cols` after a write that ended on the last column.
    cursor: (u16, u16),
    channels: Channels,
    styles: Attr,
    pub(crate) base: PlaneCell,
}

impl PlaneData {
    fn new(parent: Option<PlaneId>, row: i32, col: i32, rows: u16, cols: u16) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(ArgumentError::Geometry { rows, cols }.into());
        }
        Ok(Self {
            parent,
            children: Vec::new(),
            row,
            col,
            rows,
            cols,
            cells: vec![PlaneCell::EMPTY; usize::from(rows) * usize::from(cols)],
            cursor: (0, 0),
            channels: Channels::new(),
            styles: Attr::empty(),
            base: PlaneCell::EMPTY,
        })
    }

    #[inline]
    const fn index(&self, row: u16, col: u16) -> usize {
        row as usize * self.cols as usize + col as usize
    }

    pub(crate) fn cell(&self, row: u16, col: u16) -> Option<&PlaneCell> {
        (row < self.rows && col < self.cols).then(|| &self.cells[self.index(row, col)])
    }

    /// Turn the far half of any wide cluster at `(row, col)` into a space.
    fn break_wide_at(&mut self, row: u16, col: u16) {
        let idx = self.index(row, col);
        let here = self.cells[idx];
        if here.is_continuation() && col > 0 {
            self.cells[idx - 1].egc = Egc::SPACE;
        }
        if here.egc.width() == 2 && col + 1 < self.cols && self.cells[idx + 1].is_continuation() {
            self.cells[idx + 1].egc = Egc::SPACE;
        }
    }

    /// Store one cluster at `(row, col)`. The caller has checked that it fits.
    fn write_cluster(&mut self, row: u16, col: u16, egc: Egc) {
        let wide = egc.width() == 2;
        self.break_wide_at(row, col);
        if wide {
            self.break_wide_at(row, col + 1);
        }
        let idx = self.index(row, col);
        self.cells[idx] = PlaneCell::new(egc, self.channels, self.styles);
        if wide {
            self.cells[idx + 1] = PlaneCell::new(Egc::CONTINUATION, self.channels, self.styles);
        }
    }

    /// Replace the 4-connected run of cells sharing the glyph at
    /// `(row, col)` with `egc`, which is one column wide. Returns how many
    /// cells changed.
    fn polyfill(&mut self, row: u16, col: u16, egc: Egc) -> usize {
        let col = if self.cells[self.index(row, col)].is_continuation() {
            col.saturating_sub(1)
        } else {
            col
        };
        let target = self.cells[self.index(row, col)].egc;
        if target == egc {
            return 0;
        }

        let mut filled = 0;
        let mut stack = vec![(row, col)];
        while let Some((r, c)) = stack.pop() {
            if self.cells[self.index(r, c)].egc != target {
                continue;
            }
            self.write_cluster(r, c, egc);
            filled += 1;
            if r > 0 {
                stack.push((r - 1, c));
            }
            if r + 1 < self.rows {
                stack.push((r + 1, c));
            }
            if c > 0 {
                stack.push((r, c - 1));
            }
            if c + 1 < self.cols {
                stack.push((r, c + 1));
            }
        }
        filled
    }

    fn put_text(&mut self, row: Option<u16>, col: Option<u16>, text: &str) -> Result<usize> {
        if text.is_empty() {
            return Ok(0);
        }
        let mut r = row.unwrap_or(self.cursor.0);
        let mut c = col.unwrap_or(self.cursor.1);
        let mut written = 0usize;

        for cluster in egc::clusters(text) {
            if cluster == "\n" || cluster == "\r\n" {
                if u32::from(r) + 1 >= u32::from(self.rows) {
                    return Err(self.stop_at(r, c, written));
                }
                r += 1;
                c = 0;
                continue;
            }

            let glyph = Egc::new(cluster);
            let width = u16::from(glyph.width());
            if width == 0 {
                continue;
            }
            if r >= self.rows || u32::from(c) + u32::from(width) > u32::from(self.cols) {
                return Err(self.stop_at(r, c, written));
            }

            self.write_cluster(r, c, glyph);
            c += width;
            written += usize::from(width);
        }

        self.cursor = (r, c);
        Ok(written)
    }

    /// Park the cursor where a write stopped and build the error.
    fn stop_at(&mut self, row: u16, col: u16, written: usize) -> Error {
        self.cursor = (row.min(self.rows - 1), col.min(self.cols));
        Error::WriteOutOfBounds { written }
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(ArgumentError::Geometry { rows, cols }.into());
        }
        if (rows, cols) == (self.rows, self.cols) {
            return Ok(());
        }

        let mut cells = vec![PlaneCell::EMPTY; usize::from(rows) * usize::from(cols)];
        let keep_rows = usize::from(rows.min(self.rows));
        let keep_cols = usize::from(cols.min(self.cols));
        for r in 0..keep_rows {
            let src = r * usize::from(self.cols);
            let dst = r * usize::from(cols);
            cells[dst..dst + keep_cols].copy_from_slice(&self.cells[src..src + keep_cols]);
            // A wide cluster cut in half by the new right edge.
            if cols < self.cols && cells[dst + keep_cols - 1].egc.width() == 2 {
                cells[dst + keep_cols - 1].egc = Egc::SPACE;
            }
        }

        self.cells = cells;
        self.rows = rows;
        self.cols = cols;
        self.cursor = (self.cursor.0.min(rows - 1), self.cursor.1.min(cols));
        Ok(())
    }

    fn erase(&mut self) {
        self.cells.fill(PlaneCell::EMPTY);
        self.cursor = (0, 0);
    }

    fn move_cursor(&mut self, row: u16, col: u16) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(ArgumentError::Position {
                row: u32::from(row),
                col: u32::from(col),
            }
            .into());
        }
        self.cursor = (row, col);
        Ok(())
    }
}

// ─── PlaneArena ─────────────────────────────────────────────────────────────

struct Slot {
    generation: u32,
    plane: Option<PlaneData>,
}

/// Every plane of one context.
pub(crate) struct PlaneArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: PlaneId,
}

impl PlaneArena {
    /// An arena holding only a root plane of `size` at `(row, col)`.
    pub(crate) fn new(row: i32, col: i32, size: Size) -> Result<Self> {
        let root = PlaneData::new(None, row, col, size.rows, size.cols)?;
        Ok(Self {
            slots: vec![Slot {
                generation: 0,
                plane: Some(root),
            }],
            free: Vec::new(),
            root: PlaneId {
                index: 0,
                generation: 0,
            },
        })
    }

    #[inline]
    pub(crate) const fn root(&self) -> PlaneId {
        self.root
    }

    pub(crate) fn get(&self, id: PlaneId) -> Option<&PlaneData> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.plane.as_ref())
    }

    fn get_mut(&mut self, id: PlaneId) -> Option<&mut PlaneData> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.plane.as_mut())
    }

    fn plane_mut(&mut self, id: PlaneId) -> Result<&mut PlaneData> {
        self.get_mut(id).ok_or(Error::UseAfterFree)
    }

    /// Number of live planes, root included.
    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.plane.is_some()).count()
    }

    fn insert(&mut self, plane: PlaneData) -> PlaneId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.plane = Some(plane);
            return PlaneId {
                index,
                generation: slot.generation,
            };
        }
        #[allow(clippy::cast_possible_truncation)]
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            plane: Some(plane),
        });
        PlaneId {
            index,
            generation: 0,
        }
    }

    fn create_child(
        &mut self,
        parent: PlaneId,
        row: i32,
        col: i32,
        rows: u16,
        cols: u16,
    ) -> Result<PlaneId> {
        if self.get(parent).is_none() {
            return Err(Error::UseAfterFree);
        }
        let child = self.insert(PlaneData::new(Some(parent), row, col, rows, cols)?);
        self.plane_mut(parent)?.children.push(child);
        Ok(child)
    }

    /// Remove `id` and everything below it.
    fn destroy(&mut self, id: PlaneId) -> Result<usize> {
        if id == self.root {
            return Err(ArgumentError::DestroyRoot.into());
        }
        let parent = self.get(id).ok_or(Error::UseAfterFree)?.parent;
        if let Some(parent) = parent.and_then(|p| self.get_mut(p)) {
            parent.children.retain(|&c| c != id);
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let slot = &mut self.slots[next.index as usize];
            if let Some(plane) = slot.plane.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(next.index);
                stack.extend(plane.children);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Resize the root plane to the new usable screen area.
    pub(crate) fn resize_root(&mut self, size: Size) -> Result<()> {
        let root = self.root;
        self.plane_mut(root)?.resize(size.rows, size.cols)
    }

    /// Planes in painting order with their absolute origins: parents before
    /// children, earlier siblings before later ones.
    pub(crate) fn paint_order(&self) -> Vec<(PlaneId, i32, i32)> {
        let mut order = Vec::with_capacity(self.len());
        let mut stack = vec![(self.root, 0i32, 0i32)];
        while let Some((id, parent_row, parent_col)) = stack.pop() {
            let Some(plane) = self.get(id) else {
                continue;
            };
            let row = parent_row.saturating_add(plane.row);
            let col = parent_col.saturating_add(plane.col);
            order.push((id, row, col));
            stack.extend(plane.children.iter().rev().map(|&c| (c, row, col)));
        }
        order
    }
}

// ─── PlaneHandle ────────────────────────────────────────────────────────────

/// A reference to one plane of a context.
///
/// Handles are cheap to clone and never extend the context's lifetime.
/// Every operation validates the handle first.
///
/// ```
/// use tessel_plane::{Error, PlaneHandle};
///
/// let loose = PlaneHandle::default();
/// assert!(matches!(loose.put_str(""), Err(Error::Unattached)));
/// ```
#[derive(Clone, Default)]
pub struct PlaneHandle {
    link: Option<(Weak<RefCell<PlaneArena>>, PlaneId)>,
}

impl PlaneHandle {
    pub(crate) fn attached(arena: Weak<RefCell<PlaneArena>>, id: PlaneId) -> Self {
        Self {
            link: Some((arena, id)),
        }
    }

    /// Id of the plane, if the handle was ever attached.
    #[must_use]
    pub fn id(&self) -> Option<PlaneId> {
        self.link.as_ref().map(|(_, id)| *id)
    }

    /// Whether the plane is still alive.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.with(|_, _| Ok(())).is_ok()
    }

    fn with<R>(&self, f: impl FnOnce(&mut PlaneArena, PlaneId) -> Result<R>) -> Result<R> {
        let Some((arena, id)) = &self.link else {
            return Err(Error::Unattached);
        };
        let arena = arena.upgrade().ok_or(Error::UseAfterFree)?;
        let mut arena = arena.borrow_mut();
        if arena.get(*id).is_none() {
            return Err(Error::UseAfterFree);
        }
        f(&mut arena, *id)
    }

    fn with_plane<R>(&self, f: impl FnOnce(&mut PlaneData) -> Result<R>) -> Result<R> {
        self.with(|arena, id| f(arena.plane_mut(id)?))
    }

    fn sibling(&self, id: PlaneId) -> Self {
        let arena = self
            .link
            .as_ref()
            .map_or_else(Weak::new, |(arena, _)| arena.clone());
        Self::attached(arena, id)
    }

    // ── Tree ────────────────────────────────────────────────────────

    /// Make a `rows × cols` child at `(row, col)` relative to this plane.
    /// It paints above this plane and above earlier children.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero dimension, or a handle error.
    pub fn create_child(&self, row: i32, col: i32, rows: u16, cols: u16) -> Result<Self> {
        let child = self.with(|arena, id| arena.create_child(id, row, col, rows, cols))?;
        Ok(self.sibling(child))
    }

    /// Destroy this plane and all its descendants.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for the root plane, or a handle error.
    pub fn destroy(&self) -> Result<()> {
        self.with(|arena, id| arena.destroy(id))?;
        Ok(())
    }

    /// The parent plane; `None` for the root.
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn parent(&self) -> Result<Option<Self>> {
        let parent = self.with_plane(|p| Ok(p.parent))?;
        Ok(parent.map(|id| self.sibling(id)))
    }

    /// Whether this is the context's root plane.
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn is_root(&self) -> Result<bool> {
        self.with(|arena, id| Ok(arena.root() == id))
    }

    // ── Geometry ────────────────────────────────────────────────────

    /// `(rows, cols)`.
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn dimensions(&self) -> Result<(u16, u16)> {
        self.with_plane(|p| Ok((p.rows, p.cols)))
    }

    /// Origin relative to the parent (the screen, for the root).
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn position(&self) -> Result<(i32, i32)> {
        self.with_plane(|p| Ok((p.row, p.col)))
    }

    /// Move the origin. Planes may hang off any edge of their parent.
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn move_to(&self, row: i32, col: i32) -> Result<()> {
        self.with_plane(|p| {
            p.row = row;
            p.col = col;
            Ok(())
        })
    }

    /// Change the size, keeping the overlapping top-left region.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero dimension, or a handle error.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.with_plane(|p| p.resize(rows, cols))
    }

    // ── Cursor ──────────────────────────────────────────────────────

    /// Where the next write without coordinates starts.
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn cursor(&self) -> Result<(u16, u16)> {
        self.with_plane(|p| Ok(p.cursor))
    }

    /// # Errors
    ///
    /// `InvalidArgument` outside the plane, or a handle error.
    pub fn move_cursor(&self, row: u16, col: u16) -> Result<()> {
        self.with_plane(|p| p.move_cursor(row, col))
    }

    // ── Content ─────────────────────────────────────────────────────

    /// Write `text` starting at `(row, col)`. A missing coordinate comes
    /// from the cursor. The cursor ends up after the text.
    ///
    /// Text is split into grapheme clusters; wide clusters take two
    /// columns and `\n` starts the next row. Returns the number of columns
    /// written.
    ///
    /// # Errors
    ///
    /// `WriteOutOfBounds` when the text runs past the plane. Everything
    /// before that point has been written and the cursor is left there.
    /// A handle error otherwise, even for empty text.
    pub fn put_text(&self, row: Option<u16>, col: Option<u16>, text: &str) -> Result<usize> {
        self.with_plane(|p| p.put_text(row, col, text))
    }

    /// Write at the cursor.
    ///
    /// # Errors
    ///
    /// As [`put_text`](Self::put_text).
    pub fn put_str(&self, text: &str) -> Result<usize> {
        self.put_text(None, None, text)
    }

    /// Write at `(row, col)`.
    ///
    /// # Errors
    ///
    /// As [`put_text`](Self::put_text).
    pub fn put_text_at(&self, row: u16, col: u16, text: &str) -> Result<usize> {
        self.put_text(Some(row), Some(col), text)
    }

    /// Write one line of `text` on `row`, placed by `align`.
    ///
    /// # Errors
    ///
    /// As [`put_text`](Self::put_text); text wider than the plane starts at
    /// column 0 and runs out of bounds.
    pub fn put_text_aligned(&self, row: u16, align: Align, text: &str) -> Result<usize> {
        self.with_plane(|p| {
            let width = egc::text_width(text);
            let spare = usize::from(p.cols).saturating_sub(width);
            let col = match align {
                Align::Left => 0,
                Align::Center => spare / 2,
                Align::Right => spare,
            };
            let col = u16::try_from(col).unwrap_or(0);
            p.put_text(Some(row), Some(col), text)
        })
    }

    /// Forget every written cell and home the cursor. Channels, styles and
    /// the base cell are kept.
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn erase(&self) -> Result<()> {
        self.with_plane(|p| {
            p.erase();
            Ok(())
        })
    }

    /// Flood `egc` over the region of matching glyphs that contains
    /// `(row, col)`, using the current channels and styles. Neighbours are
    /// the four cells sharing an edge. Starting on the right half of a wide
    /// cluster starts from its left half.
    ///
    /// Returns the number of cells filled: 0 when the region already holds
    /// `egc`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` outside the plane or for a glyph that is not one
    /// column wide, or a handle error.
    pub fn polyfill(&self, row: u16, col: u16, egc: &str) -> Result<usize> {
        let glyph = egc::clusters(egc).next().map_or(Egc::EMPTY, Egc::new);
        if glyph.width() != 1 {
            return Err(ArgumentError::FillWidth(glyph.width()).into());
        }
        self.with_plane(|p| {
            if p.cell(row, col).is_none() {
                return Err(ArgumentError::Position {
                    row: u32::from(row),
                    col: u32::from(col),
                }
                .into());
            }
            Ok(p.polyfill(row, col, glyph))
        })
    }

    /// What was written at `(row, col)`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` outside the plane, or a handle error.
    pub fn cell_at(&self, row: u16, col: u16) -> Result<PlaneCell> {
        self.with_plane(|p| {
            p.cell(row, col).copied().ok_or_else(|| {
                ArgumentError::Position {
                    row: u32::from(row),
                    col: u32::from(col),
                }
                .into()
            })
        })
    }

    /// The cell shown wherever nothing has been written.
    ///
    /// Only the first cluster of `egc` is used; an empty string leaves
    /// the glyph below showing.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a cluster wider than one column, or a handle
    /// error.
    pub fn set_base(&self, egc: &str, channels: Channels, styles: Attr) -> Result<()> {
        let glyph = egc::clusters(egc).next().map_or(Egc::EMPTY, Egc::new);
        if glyph.width() > 1 {
            return Err(ArgumentError::BaseWidth(glyph.width()).into());
        }
        self.with_plane(|p| {
            p.base = PlaneCell::new(glyph, channels, styles);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// A handle error.
    pub fn base(&self) -> Result<PlaneCell> {
        self.with_plane(|p| Ok(p.base))
    }

    // ── Channel state for subsequent writes ─────────────────────────

    /// # Errors
    ///
    /// A handle error.
    pub fn channels(&self) -> Result<Channels> {
        self.with_plane(|p| Ok(p.channels))
    }

    /// # Errors
    ///
    /// A handle error.
    pub fn set_channels(&self, channels: Channels) -> Result<()> {
        self.with_plane(|p| {
            p.channels = channels;
            Ok(())
        })
    }

    /// # Errors
    ///
    /// A handle error.
    pub fn styles(&self) -> Result<Attr> {
        self.with_plane(|p| Ok(p.styles))
    }

    /// # Errors
    ///
    /// A handle error.
    pub fn set_styles(&self, styles: Attr) -> Result<()> {
        self.with_plane(|p| {
            p.styles = styles;
            Ok(())
        })
    }

    fn update_channels(
        &self,
        f: impl FnOnce(&mut Channels) -> std::result::Result<(), ChannelError>,
    ) -> Result<()> {
        self.with_plane(|p| {
            let mut channels = p.channels;
            f(&mut channels)?;
            p.channels = channels;
            Ok(())
        })
    }

    /// Foreground RGB, each component clamped to 0..=255.
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn set_fg_rgb8_clipped(&self, r: i32, g: i32, b: i32) -> Result<()> {
        self.update_channels(|ch| {
            ch.set_fg_rgb8_clipped(r, g, b);
            Ok(())
        })
    }

    /// Background RGB, each component clamped to 0..=255.
    ///
    /// # Errors
    ///
    /// A handle error.
    pub fn set_bg_rgb8_clipped(&self, r: i32, g: i32, b: i32) -> Result<()> {
        self.update_channels(|ch| {
            ch.set_bg_rgb8_clipped(r, g, b);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// `InvalidArgument` for a component outside 0..=255, or a handle error.
    pub fn set_fg_rgb8(&self, r: i32, g: i32, b: i32) -> Result<()> {
        self.update_channels(|ch| ch.set_fg_rgb8(r, g, b))
    }

    /// # Errors
    ///
    /// `InvalidArgument` for a component outside 0..=255, or a handle error.
    pub fn set_bg_rgb8(&self, r: i32, g: i32, b: i32) -> Result<()> {
        self.update_channels(|ch| ch.set_bg_rgb8(r, g, b))
    }

    /// Packed `0xRRGGBB` foreground.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when bits above 24 are set, or a handle error.
    pub fn set_fg_rgb(&self, rgb: u32) -> Result<()> {
        self.update_channels(|ch| ch.set_fg_rgb(rgb))
    }

    /// Packed `0xRRGGBB` background.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when bits above 24 are set, or a handle error.
    pub fn set_bg_rgb(&self, rgb: u32) -> Result<()> {
        self.update_channels(|ch| ch.set_bg_rgb(rgb))
    }

    /// # Errors
    ///
    /// `InvalidArgument` outside 0..=255, or a handle error.
    pub fn set_fg_palindex(&self, idx: i32) -> Result<()> {
        self.update_channels(|ch| ch.set_fg_palindex(idx))
    }

    /// # Errors
    ///
    /// `InvalidArgument` outside 0..=255, or a handle error.
    pub fn set_bg_palindex(&self, idx: i32) -> Result<()> {
        self.update_channels(|ch| ch.set_bg_palindex(idx))
    }

    /// # Errors
    ///
    /// A handle error.
    pub fn set_fg_default(&self) -> Result<()> {
        self.update_channels(|ch| {
            ch.set_fg_default();
            Ok(())
        })
    }

    /// # Errors
    ///
    /// A handle error.
    pub fn set_bg_default(&self) -> Result<()> {
        self.update_channels(|ch| {
            ch.set_bg_default();
            Ok(())
        })
    }

    /// # Errors
    ///
    /// A handle error.
    pub fn set_fg_alpha(&self, alpha: Alpha) -> Result<()> {
        self.update_channels(|ch| {
            ch.set_fg_alpha(alpha);
            Ok(())
        })
    }

    /// # Errors
    ///
    /// `InvalidArgument` for [`Alpha::HighContrast`], or a handle error.
    pub fn set_bg_alpha(&self, alpha: Alpha) -> Result<()> {
        self.update_channels(|ch| ch.set_bg_alpha(alpha))
    }
}

impl PartialEq for PlaneHandle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.link, &other.link) {
            (None, None) => true,
            (Some((a, x)), Some((b, y))) => x == y && Weak::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for PlaneHandle {}

impl fmt::Debug for PlaneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.link {
            None => f.write_str("PlaneHandle(unattached)"),
            Some((_, id)) => write!(f, "PlaneHandle({id:?})"),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessel_term::channel::Channel;

    /// A root handle over a fresh arena. Keep the `Rc` alive for the test.
    pub(crate) fn arena(rows: u16, cols: u16) -> (Rc<RefCell<PlaneArena>>, PlaneHandle) {
        let arena = Rc::new(RefCell::new(
            PlaneArena::new(0, 0, Size::new(rows, cols)).unwrap(),
        ));
        let root = arena.borrow().root();
        let handle = PlaneHandle::attached(Rc::downgrade(&arena), root);
        (arena, handle)
    }

    fn row_text(plane: &PlaneHandle, row: u16) -> String {
        let (_, cols) = plane.dimensions().unwrap();
        (0..cols)
            .map(|c| plane.cell_at(row, c).unwrap())
            .filter(|cell| !cell.is_continuation())
            .map(|cell| {
                if cell.is_empty() {
                    ".".to_owned()
                } else {
                    cell.egc.as_str().to_owned()
                }
            })
            .collect()
    }

    // ── Handle states ───────────────────────────────────────────────

    #[test]
    fn default_handle_is_unattached() {
        let h = PlaneHandle::default();
        assert!(matches!(h.dimensions(), Err(Error::Unattached)));
        assert!(matches!(h.put_str(""), Err(Error::Unattached)));
        assert!(matches!(h.set_fg_rgb8_clipped(1, 2, 3), Err(Error::Unattached)));
        assert!(!h.is_live());
        assert_eq!(h.id(), None);
    }

    #[test]
    fn dropped_arena_is_use_after_free() {
        let (arena, root) = arena(2, 2);
        drop(arena);
        assert!(matches!(root.dimensions(), Err(Error::UseAfterFree)));
        assert!(matches!(root.put_str(""), Err(Error::UseAfterFree)));
    }

    #[test]
    fn destroyed_plane_is_use_after_free() {
        let (_arena, root) = arena(4, 4);
        let child = root.create_child(0, 0, 1, 1).unwrap();
        child.destroy().unwrap();
        assert!(matches!(child.dimensions(), Err(Error::UseAfterFree)));
        assert!(matches!(child.destroy(), Err(Error::UseAfterFree)));
    }

    #[test]
    fn reused_slot_does_not_revive_stale_handle() {
        let (_arena, root) = arena(4, 4);
        let old = root.create_child(0, 0, 1, 1).unwrap();
        old.destroy().unwrap();
        let new = root.create_child(1, 1, 2, 2).unwrap();
        assert_eq!(new.id().map(|id| id.index), old.id().map(|id| id.index));
        assert!(matches!(old.dimensions(), Err(Error::UseAfterFree)));
        assert_eq!(new.dimensions().unwrap(), (2, 2));
        assert_ne!(old, new);
    }

    // ── Tree ────────────────────────────────────────────────────────

    #[test]
    fn root_cannot_be_destroyed() {
        let (_arena, root) = arena(2, 2);
        assert!(matches!(
            root.destroy(),
            Err(Error::InvalidArgument(ArgumentError::DestroyRoot))
        ));
        assert!(root.is_root().unwrap());
        assert_eq!(root.parent().unwrap(), None);
    }

    #[test]
    fn destroy_is_transitive() {
        let (arena, root) = arena(8, 8);
        let a = root.create_child(0, 0, 4, 4).unwrap();
        let b = a.create_child(1, 1, 2, 2).unwrap();
        let c = b.create_child(0, 0, 1, 1).unwrap();
        assert_eq!(arena.borrow().len(), 4);
        a.destroy().unwrap();
        assert_eq!(arena.borrow().len(), 1);
        assert!(matches!(c.cursor(), Err(Error::UseAfterFree)));
        assert!(root.is_live());
    }

    #[test]
    fn parent_links() {
        let (_arena, root) = arena(4, 4);
        let child = root.create_child(1, 1, 2, 2).unwrap();
        assert_eq!(child.parent().unwrap(), Some(root.clone()));
        assert!(!child.is_root().unwrap());
    }

    #[test]
    fn zero_size_child_is_rejected() {
        let (_arena, root) = arena(4, 4);
        assert!(matches!(
            root.create_child(0, 0, 0, 3),
            Err(Error::InvalidArgument(ArgumentError::Geometry { rows: 0, cols: 3 }))
        ));
    }

    #[test]
    fn paint_order_is_depth_first() {
        let (arena, root) = arena(10, 10);
        let a = root.create_child(1, 1, 5, 5).unwrap();
        let a1 = a.create_child(1, 2, 1, 1).unwrap();
        let b = root.create_child(-2, 3, 2, 2).unwrap();
        let order = arena.borrow().paint_order();
        let ids: Vec<_> = order.iter().map(|(id, _, _)| Some(*id)).collect();
        assert_eq!(ids, vec![root.id(), a.id(), a1.id(), b.id()]);
        assert_eq!((order[2].1, order[2].2), (2, 3));
        assert_eq!((order[3].1, order[3].2), (-2, 3));
    }

    // ── Writing ─────────────────────────────────────────────────────

    #[test]
    fn put_text_returns_columns_and_advances() {
        let (_arena, root) = arena(2, 8);
        assert_eq!(root.put_text_at(0, 0, "Hello").unwrap(), 5);
        assert_eq!(root.cursor().unwrap(), (0, 5));
        assert_eq!(root.put_str("!").unwrap(), 1);
        assert_eq!(row_text(&root, 0), "Hello!..");
        assert_eq!(root.dimensions().unwrap(), (2, 8));
    }

    #[test]
    fn single_missing_coordinate_uses_cursor() {
        let (_arena, root) = arena(3, 4);
        root.move_cursor(2, 1).unwrap();
        root.put_text(Some(0), None, "a").unwrap();
        assert_eq!(row_text(&root, 0), ".a..");
        root.put_text(None, Some(3), "b").unwrap();
        assert_eq!(row_text(&root, 0), ".a.b");
    }

    #[test]
    fn overflow_writes_what_fits() {
        let (_arena, root) = arena(1, 4);
        let err = root.put_text_at(0, 1, "abcdef").unwrap_err();
        assert!(matches!(err, Error::WriteOutOfBounds { written: 3 }));
        assert_eq!(row_text(&root, 0), ".abc");
        assert_eq!(root.cursor().unwrap(), (0, 4));
    }

    #[test]
    fn start_outside_plane_is_out_of_bounds() {
        let (_arena, root) = arena(2, 2);
        assert!(matches!(
            root.put_text_at(5, 0, "x"),
            Err(Error::WriteOutOfBounds { written: 0 })
        ));
    }

    #[test]
    fn empty_text_is_a_noop() {
        let (_arena, root) = arena(2, 2);
        assert_eq!(root.put_text_at(9, 9, "").unwrap(), 0);
        assert_eq!(root.cursor().unwrap(), (0, 0));
    }

    #[test]
    fn newline_moves_to_next_row() {
        let (_arena, root) = arena(2, 3);
        assert_eq!(root.put_str("ab\ncd").unwrap(), 4);
        assert_eq!(row_text(&root, 0), "ab.");
        assert_eq!(row_text(&root, 1), "cd.");
        assert!(matches!(
            root.put_str("\n"),
            Err(Error::WriteOutOfBounds { written: 0 })
        ));
    }

    #[test]
    fn wide_clusters_take_two_columns() {
        let (_arena, root) = arena(1, 5);
        assert_eq!(root.put_str("中a").unwrap(), 3);
        assert!(root.cell_at(0, 1).unwrap().is_continuation());
        assert_eq!(row_text(&root, 0), "中a..");
    }

    #[test]
    fn wide_cluster_on_last_column_does_not_fit() {
        let (_arena, root) = arena(1, 3);
        let err = root.put_str("ab中").unwrap_err();
        assert!(matches!(err, Error::WriteOutOfBounds { written: 2 }));
        assert_eq!(row_text(&root, 0), "ab.");
    }

    #[test]
    fn overwriting_half_a_wide_cluster_blanks_the_rest() {
        let (_arena, root) = arena(1, 4);
        root.put_str("中中").unwrap();
        root.put_text_at(0, 1, "x").unwrap();
        assert_eq!(row_text(&root, 0), " x中");
        root.put_text_at(0, 2, "y").unwrap();
        assert_eq!(row_text(&root, 0), " xy ");
    }

    #[test]
    fn combining_marks_stay_in_one_cell() {
        let (_arena, root) = arena(1, 3);
        assert_eq!(root.put_str("e\u{301}x").unwrap(), 2);
        assert_eq!(root.cell_at(0, 0).unwrap().egc.as_str(), "e\u{301}");
    }

    #[test]
    fn aligned_text() {
        let (_arena, root) = arena(3, 7);
        root.put_text_aligned(0, Align::Left, "ab").unwrap();
        root.put_text_aligned(1, Align::Center, "ab").unwrap();
        root.put_text_aligned(2, Align::Right, "ab").unwrap();
        assert_eq!(row_text(&root, 0), "ab.....");
        assert_eq!(row_text(&root, 1), "..ab...");
        assert_eq!(row_text(&root, 2), ".....ab");
    }

    #[test]
    fn writes_carry_current_channels_and_styles() {
        let (_arena, root) = arena(1, 3);
        root.set_fg_rgb8_clipped(300, -10, 7).unwrap();
        root.set_styles(Attr::BOLD).unwrap();
        root.put_str("a").unwrap();
        let cell = root.cell_at(0, 0).unwrap();
        assert_eq!(cell.channels.fg(), Channel::rgb8(255, 0, 7));
        assert!(cell.channels.bg().is_default());
        assert_eq!(cell.styles, Attr::BOLD);
    }

    #[test]
    fn strict_setter_rejects_and_keeps_state() {
        let (_arena, root) = arena(1, 1);
        root.set_bg_rgb8(1, 2, 3).unwrap();
        let before = root.channels().unwrap();
        assert!(matches!(
            root.set_bg_rgb8(256, 0, 0),
            Err(Error::InvalidArgument(ArgumentError::Channel(
                ChannelError::ColorComponent { .. }
            )))
        ));
        assert_eq!(root.channels().unwrap(), before);
    }

    #[test]
    fn high_contrast_background_is_rejected() {
        let (_arena, root) = arena(1, 1);
        assert!(root.set_fg_alpha(Alpha::HighContrast).is_ok());
        assert!(root.set_bg_alpha(Alpha::HighContrast).is_err());
    }

    // ── Geometry and state ──────────────────────────────────────────

    #[test]
    fn resize_keeps_overlap() {
        let (_arena, root) = arena(2, 4);
        root.put_text_at(0, 0, "abcd").unwrap();
        root.put_text_at(1, 0, "efgh").unwrap();
        root.resize(3, 2).unwrap();
        assert_eq!(root.dimensions().unwrap(), (3, 2));
        assert_eq!(row_text(&root, 0), "ab");
        assert_eq!(row_text(&root, 1), "ef");
        assert_eq!(row_text(&root, 2), "..");
        assert_eq!(root.cursor().unwrap(), (1, 2));
    }

    #[test]
    fn resize_splitting_wide_cluster() {
        let (_arena, root) = arena(1, 4);
        root.put_text_at(0, 1, "中").unwrap();
        root.resize(1, 2).unwrap();
        assert_eq!(row_text(&root, 0), ". ");
    }

    #[test]
    fn erase_keeps_channels() {
        let (_arena, root) = arena(2, 2);
        root.set_fg_palindex(3).unwrap();
        root.put_str("xy").unwrap();
        root.erase().unwrap();
        assert_eq!(row_text(&root, 0), "..");
        assert_eq!(root.cursor().unwrap(), (0, 0));
        assert_eq!(root.channels().unwrap().fg().palindex(), Some(3));
    }

    #[test]
    fn move_and_position() {
        let (_arena, root) = arena(4, 4);
        let child = root.create_child(1, 2, 1, 1).unwrap();
        child.move_to(-3, 9).unwrap();
        assert_eq!(child.position().unwrap(), (-3, 9));
    }

    #[test]
    fn move_cursor_checks_bounds() {
        let (_arena, root) = arena(2, 3);
        root.move_cursor(1, 2).unwrap();
        assert!(matches!(
            root.move_cursor(2, 0),
            Err(Error::InvalidArgument(ArgumentError::Position { row: 2, col: 0 }))
        ));
        assert_eq!(root.cursor().unwrap(), (1, 2));
    }

    // ── Polyfill ────────────────────────────────────────────────────

    #[test]
    fn polyfill_flows_around_walls() {
        let (_arena, root) = arena(3, 4);
        root.put_text_at(1, 0, "###").unwrap();
        assert_eq!(root.polyfill(0, 0, "~").unwrap(), 9);
        assert_eq!(row_text(&root, 0), "~~~~");
        assert_eq!(row_text(&root, 1), "###~");
        assert_eq!(row_text(&root, 2), "~~~~");
    }

    #[test]
    fn polyfill_stays_in_its_region() {
        let (_arena, root) = arena(3, 4);
        root.put_text_at(1, 0, "####").unwrap();
        assert_eq!(root.polyfill(2, 1, "~").unwrap(), 4);
        assert_eq!(row_text(&root, 0), "....");
        assert_eq!(row_text(&root, 2), "~~~~");
    }

    #[test]
    fn polyfill_ignores_diagonals() {
        let (_arena, root) = arena(2, 2);
        root.put_text_at(0, 0, "ab").unwrap();
        root.put_text_at(1, 0, "ba").unwrap();
        assert_eq!(root.polyfill(0, 0, "z").unwrap(), 1);
        assert_eq!(row_text(&root, 0), "zb");
        assert_eq!(row_text(&root, 1), "ba");
    }

    #[test]
    fn polyfill_with_same_glyph_changes_nothing() {
        let (_arena, root) = arena(1, 3);
        root.put_str("###").unwrap();
        root.set_fg_palindex(9).unwrap();
        assert_eq!(root.polyfill(0, 1, "#").unwrap(), 0);
        assert!(root.cell_at(0, 1).unwrap().channels.fg().is_default());
    }

    #[test]
    fn polyfill_uses_current_channels_and_styles() {
        let (_arena, root) = arena(1, 2);
        root.set_fg_palindex(5).unwrap();
        root.set_styles(Attr::ITALIC).unwrap();
        assert_eq!(root.polyfill(0, 0, "*").unwrap(), 2);
        let cell = root.cell_at(0, 1).unwrap();
        assert_eq!(cell.egc.as_str(), "*");
        assert_eq!(cell.channels.fg().palindex(), Some(5));
        assert_eq!(cell.styles, Attr::ITALIC);
    }

    #[test]
    fn polyfill_from_right_half_of_wide_cluster() {
        let (_arena, root) = arena(1, 4);
        root.put_str("中x").unwrap();
        assert_eq!(root.polyfill(0, 1, "-").unwrap(), 1);
        assert_eq!(row_text(&root, 0), "- x.");
    }

    #[test]
    fn polyfill_rejects_bad_arguments() {
        let (_arena, root) = arena(2, 2);
        assert!(matches!(
            root.polyfill(2, 0, "x"),
            Err(Error::InvalidArgument(ArgumentError::Position { row: 2, col: 0 }))
        ));
        assert!(matches!(
            root.polyfill(0, 0, "中"),
            Err(Error::InvalidArgument(ArgumentError::FillWidth(2)))
        ));
        assert!(matches!(
            root.polyfill(0, 0, ""),
            Err(Error::InvalidArgument(ArgumentError::FillWidth(0)))
        ));
        assert!(matches!(
            PlaneHandle::default().polyfill(0, 0, "x"),
            Err(Error::Unattached)
        ));
        assert_eq!(row_text(&root, 0), "..");
    }

    #[test]
    fn cell_at_outside_plane() {
        let (_arena, root) = arena(1, 1);
        assert!(matches!(root.cell_at(0, 1), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn base_cell() {
        let (_arena, root) = arena(1, 1);
        root.set_base("·x", Channels::new(), Attr::DIM).unwrap();
        let base = root.base().unwrap();
        assert_eq!(base.egc.as_str(), "·");
        assert_eq!(base.styles, Attr::DIM);
        assert!(matches!(
            root.set_base("中", Channels::new(), Attr::empty()),
            Err(Error::InvalidArgument(ArgumentError::BaseWidth(2)))
        ));
    }
}
