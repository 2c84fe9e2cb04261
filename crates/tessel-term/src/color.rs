// SPDX-License-Identifier: MIT
//
// Resolved cell colours and colour-depth quantization.
//
// Planes store colours as packed `Channel`s with alpha and a default flag.
// Compositing resolves those into `CellColor`: a concrete colour with no
// alpha, the only thing the frame buffer and the ANSI encoder understand.
//
// Terminals that cannot do 24-bit colour get RGB folded onto the 256- or
// 16-colour palette at output time. Nearest-match uses Oklab distance, which
// tracks perceived difference far better than RGB Euclidean distance.

use std::fmt;

use crate::channel::Channel;

// ─── CellColor ───────────────────────────────────────────────────────────────

/// A fully resolved colour for one side of one cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellColor {
    /// 24-bit colour.
    Rgb(u8, u8, u8),

    /// Palette index.
    Ansi256(u8),

    /// The terminal's own default.
    #[default]
    Default,
}

impl CellColor {
    /// RGB value, looking palette entries up in the xterm table.
    /// `None` for [`CellColor::Default`].
    #[must_use]
    pub fn to_rgb(self) -> Option<(u8, u8, u8)> {
        match self {
            Self::Rgb(r, g, b) => Some((r, g, b)),
            Self::Ansi256(idx) => Some(palette::ansi256_to_rgb(idx)),
            Self::Default => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_default(self) -> bool {
        matches!(self, Self::Default)
    }

    /// Fold this colour onto what a terminal of `depth` can show.
    #[must_use]
    pub fn quantize(self, depth: ColorDepth) -> Self {
        match (depth, self) {
            (ColorDepth::None, _) | (_, Self::Default) => Self::Default,
            (ColorDepth::TrueColor, c) => c,
            (ColorDepth::Ansi256, Self::Rgb(r, g, b)) => {
                Self::Ansi256(palette::nearest_ansi256(r, g, b))
            }
            (ColorDepth::Ansi256, c @ Self::Ansi256(_)) => c,
            (ColorDepth::Ansi16, Self::Ansi256(idx)) if idx < 16 => self,
            (ColorDepth::Ansi16, c) => match c.to_rgb() {
                Some((r, g, b)) => Self::Ansi256(palette::nearest_ansi16(r, g, b)),
                None => Self::Default,
            },
        }
    }

    /// Average `self` (on top) with `below`, component-wise.
    ///
    /// A default colour has no components to average: a default `self`
    /// leaves `below` showing, and a default `below` lets `self` through.
    #[must_use]
    pub fn blend_over(self, below: Self) -> Self {
        match (self.to_rgb(), below.to_rgb()) {
            (Some((r1, g1, b1)), Some((r2, g2, b2))) => {
                Self::Rgb(avg(r1, r2), avg(g1, g2), avg(b1, b2))
            }
            (None, _) => below,
            (Some(_), None) => self,
        }
    }

    /// Black or white, whichever reads better on `self` as a background.
    ///
    /// A default background has unknown brightness, so the foreground
    /// falls back to the terminal default too.
    #[must_use]
    pub fn contrasting(self) -> Self {
        match self.to_rgb() {
            Some((r, g, b)) => {
                let luma = 0.0722f32.mul_add(
                    f32::from(b),
                    0.2126f32.mul_add(f32::from(r), 0.7152 * f32::from(g)),
                );
                if luma > 127.5 {
                    Self::Rgb(0, 0, 0)
                } else {
                    Self::Rgb(255, 255, 255)
                }
            }
            None => Self::Default,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn avg(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16) / 2) as u8
}

impl From<Channel> for CellColor {
    fn from(ch: Channel) -> Self {
        if ch.is_default() {
            Self::Default
        } else if let Some(idx) = ch.palindex() {
            Self::Ansi256(idx)
        } else {
            let (r, g, b) = ch.components();
            Self::Rgb(r, g, b)
        }
    }
}

impl fmt::Debug for CellColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb(r, g, b) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
            Self::Ansi256(idx) => write!(f, "ansi({idx})"),
            Self::Default => write!(f, "default"),
        }
    }
}

// ─── ColorDepth ──────────────────────────────────────────────────────────────

/// How many colours the output terminal can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ColorDepth {
    /// Monochrome; every colour becomes the default.
    None,
    Ansi16,
    Ansi256,
    #[default]
    TrueColor,
}

// ─── Palette ─────────────────────────────────────────────────────────────────

pub mod palette {
    //! The xterm 256-colour palette and perceptual nearest-match.
    //!
    //! - 0–15: standard and bright colours
    //! - 16–231: 6×6×6 RGB cube
    //! - 232–255: 24-step grayscale ramp

    /// xterm defaults for the first sixteen entries.
    pub const ANSI16_RGB: [(u8, u8, u8); 16] = [
        (0, 0, 0),
        (128, 0, 0),
        (0, 128, 0),
        (128, 128, 0),
        (0, 0, 128),
        (128, 0, 128),
        (0, 128, 128),
        (192, 192, 192),
        (128, 128, 128),
        (255, 0, 0),
        (0, 255, 0),
        (255, 255, 0),
        (0, 0, 255),
        (255, 0, 255),
        (0, 255, 255),
        (255, 255, 255),
    ];

    /// RGB value of a palette entry.
    #[must_use]
    pub const fn ansi256_to_rgb(idx: u8) -> (u8, u8, u8) {
        match idx {
            0..=15 => ANSI16_RGB[idx as usize],
            16..=231 => {
                let i = idx - 16;
                (cube(i / 36), cube((i % 36) / 6), cube(i % 6))
            }
            232..=255 => {
                let v = 8 + 10 * (idx - 232);
                (v, v, v)
            }
        }
    }

    // Cube steps: 0, 95, 135, 175, 215, 255.
    const fn cube(i: u8) -> u8 {
        if i == 0 { 0 } else { 55 + 40 * i }
    }

    /// Nearest palette entry over all 256.
    #[must_use]
    pub fn nearest_ansi256(r: u8, g: u8, b: u8) -> u8 {
        nearest(r, g, b, 255)
    }

    /// Nearest of the first sixteen entries.
    #[must_use]
    pub fn nearest_ansi16(r: u8, g: u8, b: u8) -> u8 {
        nearest(r, g, b, 15)
    }

    fn nearest(r: u8, g: u8, b: u8, last: u8) -> u8 {
        let target = oklab(r, g, b);
        let mut best_idx = 0;
        let mut best_dist = f32::MAX;
        for idx in 0..=last {
            let (pr, pg, pb) = ansi256_to_rgb(idx);
            let (l, a, bb) = oklab(pr, pg, pb);
            let dl = target.0 - l;
            let da = target.1 - a;
            let db = target.2 - bb;
            let dist = db.mul_add(db, dl.mul_add(dl, da * da));
            if dist < best_dist {
                best_dist = dist;
                best_idx = idx;
            }
        }
        best_idx
    }

    /// 8-bit sRGB to Oklab (Björn Ottosson's matrices).
    fn oklab(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
        let r = linear(r);
        let g = linear(g);
        let b = linear(b);

        let l = 0.051_445_995f32.mul_add(b, 0.412_221_47f32.mul_add(r, 0.536_332_55 * g));
        let m = 0.107_396_96f32.mul_add(b, 0.211_903_5f32.mul_add(r, 0.680_699_5 * g));
        let s = 0.629_978_7f32.mul_add(b, 0.088_302_46f32.mul_add(r, 0.281_718_84 * g));

        let l_ = l.cbrt();
        let m_ = m.cbrt();
        let s_ = s.cbrt();

        (
            0.004_072_047f32.mul_add(-s_, 0.210_454_26f32.mul_add(l_, 0.793_617_8 * m_)),
            0.450_593_7f32.mul_add(s_, 1.977_998_5f32.mul_add(l_, -(2.428_592_2 * m_))),
            0.808_675_77f32.mul_add(-s_, 0.025_904_037f32.mul_add(l_, 0.782_771_77 * m_)),
        )
    }

    fn linear(c: u8) -> f32 {
        let c = f32::from(c) / 255.0;
        if c <= 0.040_45 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
