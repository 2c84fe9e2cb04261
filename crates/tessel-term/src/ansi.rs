// SPDX-License-Identifier: MIT
//
// ANSI escape sequence encoding.
//
// Pure functions writing to any `impl Write`. They hold no state and make no
// decisions about *when* to emit; `CellWriter` and the terminal guard do
// that. Positions are 0-based (row, column) here and converted to the 1-based
// coordinates the terminal expects.
use std::io::{self, Write};

use crate::cell::Attr;
use crate::color::CellColor;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Move the cursor with CUP.
#[inline]
pub fn cursor_to(w: &mut impl Write, row: u16, col: u16) -> io::Result<()> {
    write!(w, "\x1b[{};{}H", u32::from(row) + 1, u32::from(col) + 1)
}

/// DECTCEM reset.
#[inline]
pub fn cursor_hide(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25l")
}

/// DECTCEM set.
#[inline]
pub fn cursor_show(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25h")
}

// ─── Screen ──────────────────────────────────────────────────────────────────

/// ED 2.
#[inline]
pub fn clear_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[2J")
}

/// SGR 0. Invalidates any tracked colour or style state.
#[inline]
pub fn reset(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[0m")
}

// ─── Colour ──────────────────────────────────────────────────────────────────

/// Set the foreground colour.
///
/// Palette entries below 16 use the compact 30–37/90–97 forms.
pub fn fg(w: &mut impl Write, color: CellColor) -> io::Result<()> {
    match color {
        CellColor::Default => w.write_all(b"\x1b[39m"),
        CellColor::Ansi256(idx @ 0..=7) => write!(w, "\x1b[{}m", 30 + u16::from(idx)),
        CellColor::Ansi256(idx @ 8..=15) => write!(w, "\x1b[{}m", 82 + u16::from(idx)),
        CellColor::Ansi256(idx) => write!(w, "\x1b[38;5;{idx}m"),
        CellColor::Rgb(r, g, b) => write!(w, "\x1b[38;2;{r};{g};{b}m"),
    }
}

/// Set the background colour (40–47, 100–107, 48;5;N, 48;2;R;G;B).
pub fn bg(w: &mut impl Write, color: CellColor) -> io::Result<()> {
    match color {
        CellColor::Default => w.write_all(b"\x1b[49m"),
        CellColor::Ansi256(idx @ 0..=7) => write!(w, "\x1b[{}m", 40 + u16::from(idx)),
        CellColor::Ansi256(idx @ 8..=15) => write!(w, "\x1b[{}m", 92 + u16::from(idx)),
        CellColor::Ansi256(idx) => write!(w, "\x1b[48;5;{idx}m"),
        CellColor::Rgb(r, g, b) => write!(w, "\x1b[48;2;{r};{g};{b}m"),
    }
}

// ─── Styles ──────────────────────────────────────────────────────────────────

/// Emit every set style as one CSI sequence, e.g. `\x1b[1;3m`.
///
/// Nothing is written for an empty set.
pub fn attrs(w: &mut impl Write, attr: Attr) -> io::Result<()> {
    if attr.is_empty() {
        return Ok(());
    }

    let underline: Option<&[u8]> = if attr.contains(Attr::UNDERCURL) {
        Some(b"4:3")
    } else if attr.contains(Attr::UNDERLINE) {
        Some(b"4")
    } else {
        None
    };

    let codes: [(bool, &[u8]); 7] = [
        (attr.contains(Attr::BOLD), b"1"),
        (attr.contains(Attr::DIM), b"2"),
        (attr.contains(Attr::ITALIC), b"3"),
        (underline.is_some(), underline.unwrap_or_default()),
        (attr.contains(Attr::BLINK), b"5"),
        (attr.contains(Attr::INVERSE), b"7"),
        (attr.contains(Attr::STRIKETHROUGH), b"9"),
    ];

    w.write_all(b"\x1b[")?;
    let mut first = true;
    for (_, code) in codes.iter().filter(|(on, _)| *on) {
        if !first {
            w.write_all(b";")?;
        }
        w.write_all(code)?;
        first = false;
    }
    w.write_all(b"m")
}

// ─── Modes ───────────────────────────────────────────────────────────────────

/// Begin synchronized output (DEC 2026); the terminal holds the frame.
#[inline]
pub fn begin_sync(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2026h")
}

/// End synchronized output; the terminal paints the held frame.
#[inline]
pub fn end_sync(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?2026l")
}

/// DEC 1049: switch to the alternate screen, saving the primary.
#[inline]
pub fn enter_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049h")
}

/// Leave the alternate screen, restoring the primary's content.
#[inline]
pub fn exit_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049l")
}

/// Mouse reporting granularity (SGR encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseMode {
    /// Button press and release (DEC 1000).
    #[default]
    Click,
    /// Plus drag motion (DEC 1002).
    Drag,
    /// All motion (DEC 1003).
    Motion,
}

/// Enable SGR mouse reporting (DEC 1006) at the given granularity.
pub fn enable_mouse(w: &mut impl Write, mode: MouseMode) -> io::Result<()> {
    w.write_all(b"\x1b[?1000h")?;
    if matches!(mode, MouseMode::Drag | MouseMode::Motion) {
        w.write_all(b"\x1b[?1002h")?;
    }
    if mode == MouseMode::Motion {
        w.write_all(b"\x1b[?1003h")?;
    }
    w.write_all(b"\x1b[?1006h")
}

/// Disable every mouse mode.
pub fn disable_mouse(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1006l\x1b[?1003l\x1b[?1002l\x1b[?1000l")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
