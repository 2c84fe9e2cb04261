// SPDX-License-Identifier: MIT
//
// Channels: packed foreground/background colour state.
//
// A `Channel` is one 32-bit colour slot; `Channels` packs two of them into a
// single `u64` with the foreground in the upper half and the background in
// the lower half. Both are plain `Copy` values: there is nothing to free and
// nothing shared, so a plane's "current colours" is just one of these.
//
// Channel layout (32 bits):
//
//   ┌────┬─────────┬───────┬─────────┬─────────┬──────────────────────────┐
//   │ 31 │   30    │ 29 28 │   27    │  26-24  │          23-0            │
//   │ -- │ not-dft │ alpha │ palette │   --    │  RGB  (or palette index) │
//   └────┴─────────┴───────┴─────────┴─────────┴──────────────────────────┘
//
// The "not default" bit is inverted so that an all-zero value means "use the
// terminal's default colour". `Channels(0)` is therefore default-on-default
// and opaque, which is what a freshly created plane writes with.
//
// Two setter families exist for RGB. The strict family (`set_fg_rgb8`) takes
// `i32` components and rejects anything outside 0..=255. The clipped family
// (`set_fg_rgb8_clipped`) clamps each component independently and never
// fails. Computed gradients go through the clipped family.

use std::fmt;

use thiserror::Error;

const RGB_MASK: u32 = 0x00ff_ffff;
const PALETTE_BIT: u32 = 0x0800_0000;
const ALPHA_MASK: u32 = 0x3000_0000;
const ALPHA_SHIFT: u32 = 28;
const NOT_DEFAULT_BIT: u32 = 0x4000_0000;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Which RGB component a value was meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Red,
    Green,
    Blue,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        })
    }
}

/// A rejected argument to one of the strict channel setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("{component} component {value} is outside 0..=255")]
    ColorComponent { component: Component, value: i32 },

    #[error("palette index {0} is outside 0..=255")]
    PaletteIndex(i32),

    #[error("packed rgb {0:#010x} has bits set above the low 24")]
    PackedRgb(u32),

    #[error("high-contrast alpha is only valid for the foreground channel")]
    HighContrastBackground,
}

// ─── Alpha ───────────────────────────────────────────────────────────────────

/// How a channel composites over whatever lies beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Alpha {
    /// Replace the colour below.
    #[default]
    Opaque,
    /// Average with the colour below.
    Blend,
    /// Keep the colour below.
    Transparent,
    /// Foreground only: black or white, whichever contrasts the final
    /// background.
    HighContrast,
}

impl Alpha {
    const fn bits(self) -> u32 {
        let n = match self {
            Self::Opaque => 0,
            Self::Blend => 1,
            Self::Transparent => 2,
            Self::HighContrast => 3,
        };
        n << ALPHA_SHIFT
    }

    const fn from_bits(bits: u32) -> Self {
        match (bits & ALPHA_MASK) >> ALPHA_SHIFT {
            0 => Self::Opaque,
            1 => Self::Blend,
            2 => Self::Transparent,
            _ => Self::HighContrast,
        }
    }
}

// ─── Channel ─────────────────────────────────────────────────────────────────

/// A single 32-bit colour slot.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Channel(u32);

impl Channel {
    /// Terminal default colour, opaque.
    pub const DEFAULT: Self = Self(0);

    /// An opaque RGB channel.
    #[inline]
    #[must_use]
    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self(NOT_DEFAULT_BIT | pack(r, g, b))
    }

    /// An opaque palette-index channel.
    #[inline]
    #[must_use]
    pub const fn palette(idx: u8) -> Self {
        Self(NOT_DEFAULT_BIT | PALETTE_BIT | idx as u32)
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether this channel uses the terminal's default colour.
    #[inline]
    #[must_use]
    pub const fn is_default(self) -> bool {
        self.0 & NOT_DEFAULT_BIT == 0
    }

    /// Whether this channel holds a palette index rather than RGB.
    #[inline]
    #[must_use]
    pub const fn is_palette(self) -> bool {
        !self.is_default() && self.0 & PALETTE_BIT != 0
    }

    /// The packed 24-bit RGB value (meaningless for default/palette).
    #[inline]
    #[must_use]
    pub const fn rgb(self) -> u32 {
        self.0 & RGB_MASK
    }

    /// The RGB components.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn components(self) -> (u8, u8, u8) {
        let rgb = self.rgb();
        ((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
    }

    /// The palette index, if this is a palette channel.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn palindex(self) -> Option<u8> {
        if self.is_palette() {
            Some(self.0 as u8)
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn alpha(self) -> Alpha {
        Alpha::from_bits(self.0)
    }

    /// Set RGB, leaving the default and palette states.
    #[inline]
    pub const fn set_rgb8(&mut self, r: u8, g: u8, b: u8) {
        self.0 = (self.0 & ALPHA_MASK) | NOT_DEFAULT_BIT | pack(r, g, b);
    }

    #[inline]
    pub const fn set_palindex(&mut self, idx: u8) {
        self.0 = (self.0 & ALPHA_MASK) | NOT_DEFAULT_BIT | PALETTE_BIT | idx as u32;
    }

    /// Return to the terminal default colour. Alpha is kept.
    #[inline]
    pub const fn set_default(&mut self) {
        self.0 &= ALPHA_MASK;
    }

    #[inline]
    pub const fn set_alpha(&mut self, alpha: Alpha) {
        self.0 = (self.0 & !ALPHA_MASK) | alpha.bits();
    }

    /// Builder form of [`set_alpha`](Self::set_alpha).
    #[inline]
    #[must_use]
    pub const fn with_alpha(mut self, alpha: Alpha) -> Self {
        self.set_alpha(alpha);
        self
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "Default")?;
        } else if let Some(idx) = self.palindex() {
            write!(f, "Palette({idx})")?;
        } else {
            write!(f, "#{:06x}", self.rgb())?;
        }
        match self.alpha() {
            Alpha::Opaque => Ok(()),
            alpha => write!(f, "/{alpha:?}"),
        }
    }
}

#[inline]
const fn pack(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

fn strict(component: Component, value: i32) -> Result<u8, ChannelError> {
    u8::try_from(value).map_err(|_| ChannelError::ColorComponent { component, value })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn clip(value: i32) -> u8 {
    if value < 0 {
        0
    } else if value > 255 {
        255
    } else {
        value as u8
    }
}

// ─── Channels ────────────────────────────────────────────────────────────────

/// Foreground and background channels packed into one 64-bit value.
///
/// ```
/// use tessel_term::channel::Channels;
///
/// let mut ch = Channels::new();
/// ch.set_fg_rgb8_clipped(300, -10, 128);
/// assert_eq!(ch.fg().components(), (255, 0, 128));
/// assert!(ch.set_fg_rgb8(300, 0, 0).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Channels(u64);

impl Channels {
    /// Default foreground on default background, both opaque.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn combine(fg: Channel, bg: Channel) -> Self {
        Self((fg.0 as u64) << 32 | bg.0 as u64)
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn fg(self) -> Channel {
        Channel((self.0 >> 32) as u32)
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn bg(self) -> Channel {
        Channel(self.0 as u32)
    }

    #[inline]
    pub const fn set_fg(&mut self, fg: Channel) {
        *self = Self::combine(fg, self.bg());
    }

    #[inline]
    pub const fn set_bg(&mut self, bg: Channel) {
        *self = Self::combine(self.fg(), bg);
    }

    // ── RGB, strict ─────────────────────────────────────────────────

    /// Set the foreground RGB, rejecting components outside 0..=255.
    ///
    /// On error the channels are left untouched.
    ///
    /// # Errors
    ///
    /// [`ChannelError::ColorComponent`] naming the first bad component.
    pub fn set_fg_rgb8(&mut self, r: i32, g: i32, b: i32) -> Result<(), ChannelError> {
        let (r, g, b) = strict_rgb(r, g, b)?;
        self.update_fg(|c| c.set_rgb8(r, g, b));
        Ok(())
    }

    /// Set the background RGB, rejecting components outside 0..=255.
    ///
    /// # Errors
    ///
    /// [`ChannelError::ColorComponent`] naming the first bad component.
    pub fn set_bg_rgb8(&mut self, r: i32, g: i32, b: i32) -> Result<(), ChannelError> {
        let (r, g, b) = strict_rgb(r, g, b)?;
        self.update_bg(|c| c.set_rgb8(r, g, b));
        Ok(())
    }

    /// Set the foreground from a packed `0xRRGGBB` value.
    ///
    /// # Errors
    ///
    /// [`ChannelError::PackedRgb`] if any bit above the low 24 is set.
    pub fn set_fg_rgb(&mut self, rgb: u32) -> Result<(), ChannelError> {
        let (r, g, b) = unpack_strict(rgb)?;
        self.update_fg(|c| c.set_rgb8(r, g, b));
        Ok(())
    }

    /// Set the background from a packed `0xRRGGBB` value.
    ///
    /// # Errors
    ///
    /// [`ChannelError::PackedRgb`] if any bit above the low 24 is set.
    pub fn set_bg_rgb(&mut self, rgb: u32) -> Result<(), ChannelError> {
        let (r, g, b) = unpack_strict(rgb)?;
        self.update_bg(|c| c.set_rgb8(r, g, b));
        Ok(())
    }

    // ── RGB, clipped ────────────────────────────────────────────────

    /// Set the foreground RGB, clamping each component into 0..=255.
    pub fn set_fg_rgb8_clipped(&mut self, r: i32, g: i32, b: i32) {
        self.update_fg(|c| c.set_rgb8(clip(r), clip(g), clip(b)));
    }

    /// Set the background RGB, clamping each component into 0..=255.
    pub fn set_bg_rgb8_clipped(&mut self, r: i32, g: i32, b: i32) {
        self.update_bg(|c| c.set_rgb8(clip(r), clip(g), clip(b)));
    }

    // ── Palette, default, alpha ─────────────────────────────────────

    /// # Errors
    ///
    /// [`ChannelError::PaletteIndex`] if `idx` is outside 0..=255.
    pub fn set_fg_palindex(&mut self, idx: i32) -> Result<(), ChannelError> {
        let idx = u8::try_from(idx).map_err(|_| ChannelError::PaletteIndex(idx))?;
        self.update_fg(|c| c.set_palindex(idx));
        Ok(())
    }

    /// # Errors
    ///
    /// [`ChannelError::PaletteIndex`] if `idx` is outside 0..=255.
    pub fn set_bg_palindex(&mut self, idx: i32) -> Result<(), ChannelError> {
        let idx = u8::try_from(idx).map_err(|_| ChannelError::PaletteIndex(idx))?;
        self.update_bg(|c| c.set_palindex(idx));
        Ok(())
    }

    pub fn set_fg_default(&mut self) {
        self.update_fg(Channel::set_default);
    }

    pub fn set_bg_default(&mut self) {
        self.update_bg(Channel::set_default);
    }

    pub fn set_fg_alpha(&mut self, alpha: Alpha) {
        self.update_fg(|c| c.set_alpha(alpha));
    }

    /// # Errors
    ///
    /// [`ChannelError::HighContrastBackground`] for [`Alpha::HighContrast`].
    pub fn set_bg_alpha(&mut self, alpha: Alpha) -> Result<(), ChannelError> {
        if alpha == Alpha::HighContrast {
            return Err(ChannelError::HighContrastBackground);
        }
        self.update_bg(|c| c.set_alpha(alpha));
        Ok(())
    }

    fn update_fg(&mut self, f: impl FnOnce(&mut Channel)) {
        let mut fg = self.fg();
        f(&mut fg);
        self.set_fg(fg);
    }

    fn update_bg(&mut self, f: impl FnOnce(&mut Channel)) {
        let mut bg = self.bg();
        f(&mut bg);
        self.set_bg(bg);
    }
}

impl fmt::Debug for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channels({:?} on {:?})", self.fg(), self.bg())
    }
}

fn strict_rgb(r: i32, g: i32, b: i32) -> Result<(u8, u8, u8), ChannelError> {
    Ok((
        strict(Component::Red, r)?,
        strict(Component::Green, g)?,
        strict(Component::Blue, b)?,
    ))
}

#[allow(clippy::cast_possible_truncation)]
const fn unpack_strict(rgb: u32) -> Result<(u8, u8, u8), ChannelError> {
    if rgb & !RGB_MASK != 0 {
        return Err(ChannelError::PackedRgb(rgb));
    }
    Ok(((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_is_default_on_default() {
        let ch = Channels::new();
        assert!(ch.fg().is_default());
        assert!(ch.bg().is_default());
        assert_eq!(ch.fg().alpha(), Alpha::Opaque);
        assert_eq!(ch.bits(), 0);
    }

    #[test]
    fn fg_lives_in_upper_half() {
        let mut ch = Channels::new();
        ch.set_fg_rgb8(0x12, 0x34, 0x56).unwrap();
        assert_eq!(ch.bits() >> 32, u64::from(NOT_DEFAULT_BIT | 0x12_3456));
        assert_eq!(ch.bits() & 0xffff_ffff, 0);
    }

    #[test]
    fn bg_lives_in_lower_half() {
        let mut ch = Channels::new();
        ch.set_bg_rgb8(1, 2, 3).unwrap();
        assert_eq!(ch.bits() >> 32, 0);
        assert_eq!(ch.bg().components(), (1, 2, 3));
    }

    #[test]
    fn setting_rgb_clears_default() {
        let mut ch = Channels::new();
        ch.set_fg_rgb8_clipped(0, 0, 0);
        assert!(!ch.fg().is_default());
        assert!(ch.bg().is_default());
    }

    #[test]
    fn strict_rejects_each_component() {
        let mut ch = Channels::new();
        assert_eq!(
            ch.set_fg_rgb8(256, 0, 0),
            Err(ChannelError::ColorComponent { component: Component::Red, value: 256 })
        );
        assert_eq!(
            ch.set_bg_rgb8(0, -1, 0),
            Err(ChannelError::ColorComponent { component: Component::Green, value: -1 })
        );
        assert_eq!(
            ch.set_bg_rgb8(0, 0, 1000),
            Err(ChannelError::ColorComponent { component: Component::Blue, value: 1000 })
        );
    }

    #[test]
    fn strict_failure_leaves_value_untouched() {
        let mut ch = Channels::new();
        ch.set_fg_rgb8(10, 20, 30).unwrap();
        let before = ch;
        assert!(ch.set_fg_rgb8(10, 20, 300).is_err());
        assert_eq!(ch, before);
    }

    #[test]
    fn clipped_clamps_independently() {
        let mut ch = Channels::new();
        ch.set_fg_rgb8_clipped(300, -10, 128);
        assert_eq!(ch.fg().components(), (255, 0, 128));
        ch.set_bg_rgb8_clipped(i32::MIN, i32::MAX, 7);
        assert_eq!(ch.bg().components(), (0, 255, 7));
    }

    #[test]
    fn strict_and_clipped_agree_in_range() {
        let mut a = Channels::new();
        let mut b = Channels::new();
        a.set_fg_rgb8(0, 128, 255).unwrap();
        b.set_fg_rgb8_clipped(0, 128, 255);
        assert_eq!(a, b);
    }

    #[test]
    fn packed_rgb_rejects_high_bits() {
        let mut ch = Channels::new();
        ch.set_fg_rgb(0x00ab_cdef).unwrap();
        assert_eq!(ch.fg().components(), (0xab, 0xcd, 0xef));
        assert_eq!(ch.set_bg_rgb(0x0100_0000), Err(ChannelError::PackedRgb(0x0100_0000)));
    }

    #[test]
    fn palette_index() {
        let mut ch = Channels::new();
        ch.set_fg_palindex(196).unwrap();
        assert_eq!(ch.fg().palindex(), Some(196));
        assert!(ch.fg().is_palette());
        assert_eq!(ch.set_bg_palindex(256), Err(ChannelError::PaletteIndex(256)));
        assert_eq!(ch.set_bg_palindex(-1), Err(ChannelError::PaletteIndex(-1)));
    }

    #[test]
    fn rgb_after_palette_clears_palette_flag() {
        let mut ch = Channels::new();
        ch.set_fg_palindex(3).unwrap();
        ch.set_fg_rgb8(1, 1, 1).unwrap();
        assert!(!ch.fg().is_palette());
        assert_eq!(ch.fg().palindex(), None);
    }

    #[test]
    fn set_default_keeps_alpha() {
        let mut ch = Channels::new();
        ch.set_fg_rgb8(9, 9, 9).unwrap();
        ch.set_fg_alpha(Alpha::Blend);
        ch.set_fg_default();
        assert!(ch.fg().is_default());
        assert_eq!(ch.fg().alpha(), Alpha::Blend);
    }

    #[test]
    fn alpha_round_trips() {
        for alpha in [Alpha::Opaque, Alpha::Blend, Alpha::Transparent, Alpha::HighContrast] {
            let c = Channel::rgb8(1, 2, 3).with_alpha(alpha);
            assert_eq!(c.alpha(), alpha);
            assert_eq!(c.components(), (1, 2, 3));
        }
    }

    #[test]
    fn high_contrast_background_is_rejected() {
        let mut ch = Channels::new();
        assert_eq!(
            ch.set_bg_alpha(Alpha::HighContrast),
            Err(ChannelError::HighContrastBackground)
        );
        ch.set_fg_alpha(Alpha::HighContrast);
        assert_eq!(ch.fg().alpha(), Alpha::HighContrast);
    }

    #[test]
    fn combine_and_split() {
        let ch = Channels::combine(Channel::rgb8(1, 2, 3), Channel::palette(9));
        assert_eq!(ch.fg(), Channel::rgb8(1, 2, 3));
        assert_eq!(ch.bg(), Channel::palette(9));
    }

    #[test]
    fn debug_format() {
        let ch = Channels::combine(Channel::rgb8(255, 0, 0), Channel::DEFAULT);
        assert_eq!(format!("{ch:?}"), "Channels(#ff0000 on Default)");
        let blended = Channel::palette(4).with_alpha(Alpha::Blend);
        assert_eq!(format!("{blended:?}"), "Palette(4)/Blend");
    }

    #[test]
    fn error_messages() {
        let err = ChannelError::ColorComponent { component: Component::Green, value: -3 };
        assert_eq!(err.to_string(), "green component -3 is outside 0..=255");
    }
}
