// SPDX-License-Identifier: MIT
//
// Egc: an extended grapheme cluster stored inline.
//
// A terminal cell displays one user-perceived character, which may be
// several scalar values: "e" + combining acute, a flag made of two regional
// indicators, a ZWJ emoji family. Cells are copied around constantly (every
// render composites into a fresh frame), so the cluster lives inline in a
// fixed 16-byte struct instead of behind a heap pointer.
//
// Clusters longer than the inline capacity are cut back to their first
// scalar value. That loses combining marks on pathological input, never the
// base character, and keeps `Egc: Copy`.
//
// Two sentinel states share the type:
//
//   EMPTY         → nothing written (len 0); transparent when compositing
//   CONTINUATION  → right half of a wide cluster drawn in the cell before

use std::fmt;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Inline capacity in UTF-8 bytes.
pub const CAPACITY: usize = 14;

const CONTINUATION_LEN: u8 = u8::MAX;

/// One grapheme cluster with its cached display width.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Egc {
    len: u8,
    width: u8,
    bytes: [u8; CAPACITY],
}

impl Egc {
    /// Nothing written.
    pub const EMPTY: Self = Self {
        len: 0,
        width: 0,
        bytes: [0; CAPACITY],
    };

    /// Second column of a wide cluster.
    pub const CONTINUATION: Self = Self {
        len: CONTINUATION_LEN,
        width: 0,
        bytes: [0; CAPACITY],
    };

    /// A single space.
    pub const SPACE: Self = Self::from_ascii(b' ');

    const fn from_ascii(b: u8) -> Self {
        let mut bytes = [0; CAPACITY];
        bytes[0] = b;
        Self { len: 1, width: 1, bytes }
    }

    /// Build from one grapheme cluster.
    ///
    /// Width is clamped to 2; zero-width input (controls, a lone combining
    /// mark) yields a cluster with width 0, which writers skip.
    #[must_use]
    pub fn new(cluster: &str) -> Self {
        if cluster.is_empty() {
            return Self::EMPTY;
        }
        if cluster.len() <= CAPACITY {
            return Self::store(cluster, cluster_width(cluster));
        }
        // Too long: keep the base scalar only.
        let mut chars = cluster.chars();
        chars.next().map_or(Self::EMPTY, Self::from_char)
    }

    #[must_use]
    pub fn from_char(ch: char) -> Self {
        let mut enc = [0u8; 4];
        let s = ch.encode_utf8(&mut enc);
        Self::store(s, ch.width().unwrap_or(0).min(2))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn store(s: &str, width: usize) -> Self {
        let mut bytes = [0; CAPACITY];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Self {
            len: s.len() as u8,
            width: width as u8,
            bytes,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        self.len == CONTINUATION_LEN
    }

    /// Display width in columns: 0, 1 or 2.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u8 {
        self.width
    }

    /// The cluster text. Empty for both sentinels.
    #[must_use]
    pub fn as_str(&self) -> &str {
        if self.is_continuation() {
            return "";
        }
        std::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or("")
    }
}

impl Default for Egc {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Egc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_continuation() {
            f.write_str("Egc(cont)")
        } else {
            write!(f, "Egc({:?})", self.as_str())
        }
    }
}

// ─── Segmentation ────────────────────────────────────────────────────────────

/// Split text into extended grapheme clusters.
pub fn clusters(text: &str) -> impl Iterator<Item = &str> {
    text.graphemes(true)
}

/// Display width of one cluster in terminal columns, clamped to 2.
///
/// Emoji presentation selectors widen the base character; the
/// `unicode-width` string width already accounts for them.
#[must_use]
pub fn cluster_width(cluster: &str) -> usize {
    if cluster.chars().any(char::is_control) {
        return 0;
    }
    cluster.width().min(2)
}

/// Display width of a string in columns, cluster by cluster.
///
/// ```
/// use tessel_term::egc::text_width;
///
/// assert_eq!(text_width("hello"), 5);
/// assert_eq!(text_width("中文"), 4);
/// assert_eq!(text_width("e\u{301}"), 1);
/// ```
#[must_use]
pub fn text_width(text: &str) -> usize {
    clusters(text).map(cluster_width).sum()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
