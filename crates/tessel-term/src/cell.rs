// SPDX-License-Identifier: MIT
//
// Cell: one resolved position of the physical screen.
//
// Compositing flattens the plane hierarchy into a grid of these. A cell holds
// no alpha and no "default-ness" beyond `CellColor::Default`: everything has
// been decided, so diffing two frames is plain equality.
//
// Wide clusters occupy two columns. The first cell holds the cluster, the
// second holds `Egc::CONTINUATION` and repeats the colours so the background
// fills both columns.

use crate::color::CellColor;
use crate::egc::Egc;

// ─── Styles ──────────────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Text styles, each mapping to one SGR parameter.
    ///
    /// ```
    /// use tessel_term::cell::Attr;
    ///
    /// let style = Attr::BOLD | Attr::UNDERLINE;
    /// assert!(style.contains(Attr::BOLD));
    /// assert!(!style.contains(Attr::ITALIC));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Attr: u16 {
        /// SGR 1.
        const BOLD          = 1 << 0;
        /// SGR 2.
        const DIM           = 1 << 1;
        /// SGR 3.
        const ITALIC        = 1 << 2;
        /// SGR 4.
        const UNDERLINE     = 1 << 3;
        /// SGR 4:3, curly underline. Wins over `UNDERLINE` when both are set.
        const UNDERCURL     = 1 << 4;
        /// SGR 5.
        const BLINK         = 1 << 5;
        /// SGR 7.
        const INVERSE       = 1 << 6;
        /// SGR 9.
        const STRIKETHROUGH = 1 << 7;
    }
}

// ─── Cell ────────────────────────────────────────────────────────────────────

/// A single screen position after compositing.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub egc: Egc,
    pub fg: CellColor,
    pub bg: CellColor,
    pub attrs: Attr,
}

impl Cell {
    /// A blank: space, default colours, no styles.
    pub const EMPTY: Self = Self {
        egc: Egc::SPACE,
        fg: CellColor::Default,
        bg: CellColor::Default,
        attrs: Attr::empty(),
    };

    #[inline]
    #[must_use]
    pub const fn new(egc: Egc) -> Self {
        Self {
            egc,
            fg: CellColor::Default,
            bg: CellColor::Default,
            attrs: Attr::empty(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn styled(egc: Egc, fg: CellColor, bg: CellColor, attrs: Attr) -> Self {
        Self { egc, fg, bg, attrs }
    }

    /// Right half of a wide cluster, sharing its style.
    #[inline]
    #[must_use]
    pub const fn continuation(fg: CellColor, bg: CellColor, attrs: Attr) -> Self {
        Self {
            egc: Egc::CONTINUATION,
            fg,
            bg,
            attrs,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        self.egc.is_continuation()
    }

    /// Whether this cell is a plain blank.
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Whether two cells would emit identical SGR state.
    #[inline]
    #[must_use]
    pub fn same_style(&self, other: &Self) -> bool {
        self.fg == other.fg && self.bg == other.bg && self.attrs == other.attrs
    }

    #[inline]
    #[must_use]
    pub const fn with_fg(mut self, fg: CellColor) -> Self {
        self.fg = fg;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_bg(mut self, bg: CellColor) -> Self {
        self.bg = bg;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_attrs(mut self, attrs: Attr) -> Self {
        self.attrs = attrs;
        self
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_continuation() {
            write!(f, "Cell(cont")?;
        } else {
            write!(f, "Cell({:?}", self.egc.as_str())?;
        }
        if !self.fg.is_default() {
            write!(f, " fg={:?}", self.fg)?;
        }
        if !self.bg.is_default() {
            write!(f, " bg={:?}", self.bg)?;
        }
        if !self.attrs.is_empty() {
            write!(f, " {:?}", self.attrs)?;
        }
        write!(f, ")")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_is_space() {
        assert_eq!(Cell::EMPTY.egc.as_str(), " ");
        assert!(Cell::EMPTY.is_blank());
        assert_eq!(Cell::default(), Cell::EMPTY);
    }

    #[test]
    fn continuation_keeps_colors() {
        let c = Cell::continuation(CellColor::Rgb(1, 2, 3), CellColor::Ansi256(4), Attr::BOLD);
        assert!(c.is_continuation());
        assert_eq!(c.bg, CellColor::Ansi256(4));
        assert_eq!(c.attrs, Attr::BOLD);
    }

    #[test]
    fn builders() {
        let c = Cell::new(Egc::new("x"))
            .with_fg(CellColor::Rgb(9, 9, 9))
            .with_bg(CellColor::Ansi256(1))
            .with_attrs(Attr::ITALIC);
        assert_eq!(
            c,
            Cell::styled(Egc::new("x"), CellColor::Rgb(9, 9, 9), CellColor::Ansi256(1), Attr::ITALIC)
        );
        assert!(!c.is_blank());
    }

    #[test]
    fn same_style_ignores_glyph() {
        let a = Cell::new(Egc::new("a")).with_attrs(Attr::BOLD);
        let b = Cell::new(Egc::new("b")).with_attrs(Attr::BOLD);
        assert!(a.same_style(&b));
        assert!(!a.same_style(&Cell::new(Egc::new("a"))));
    }

    #[test]
    fn debug_format() {
        let c = Cell::new(Egc::new("x")).with_fg(CellColor::Rgb(255, 0, 0));
        assert_eq!(format!("{c:?}"), "Cell(\"x\" fg=#ff0000)");
        let cont = Cell::continuation(CellColor::Default, CellColor::Default, Attr::empty());
        assert_eq!(format!("{cont:?}"), "Cell(cont)");
    }
}
