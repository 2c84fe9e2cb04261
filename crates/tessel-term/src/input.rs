// SPDX-License-Identifier: MIT
//
// Input decoding: raw terminal bytes to numbered input events.
//
// Understands what a raw-mode terminal sends once SGR mouse reporting is on:
//
// - Legacy CSI sequences (arrows, editing keys, function keys, with the
//   xterm `1 + bitmask` modifier parameter)
// - SS3 sequences (F1-F4 and arrows from application keypad mode)
// - SGR mouse reports (press, release, drag, wheel)
// - Alt+key as ESC followed by the key
// - Control bytes and UTF-8 characters
//
// Sequences may be split across reads, so the decoder keeps the unconsumed
// tail. A lone ESC is ambiguous until more bytes arrive or the caller gives
// up waiting and calls `flush`.
//
// Every event the decoder hands out carries a sequence number, starting at
// 1 and never reused for the life of the decoder.

use std::fmt;

use bitflags::bitflags;

// ─── Events ─────────────────────────────────────────────────────────────────

/// Mouse button identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// What was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// A Unicode character. Control bytes arrive as their letter plus CTRL.
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Insert,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    /// Keypad centre (`CSI E` / `SS3 E`).
    Center,
    /// F1 through F20.
    F(u8),
    /// A mouse button went down, or moved while held.
    Mouse(MouseButton),
    ScrollUp,
    ScrollDown,
    ScrollLeft,
    ScrollRight,
    /// Any mouse button came up.
    Release,
}

impl Key {
    /// Whether this key came from the mouse.
    #[must_use]
    pub const fn is_mouse(self) -> bool {
        matches!(
            self,
            Self::Mouse(_)
                | Self::ScrollUp
                | Self::ScrollDown
                | Self::ScrollLeft
                | Self::ScrollRight
                | Self::Release
        )
    }
}

/// Characters print as themselves; everything else by name.
impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Char(ch) => return write!(f, "{ch}"),
            Self::F(n) => return write!(f, "f{n}"),
            Self::Tab => "\t",
            Self::Escape => "\x1b",
            Self::Enter => "enter",
            Self::Backspace => "backspace",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::Home => "home",
            Self::End => "end",
            Self::PageUp => "page_up",
            Self::PageDown => "page_down",
            Self::Center => "center",
            Self::Mouse(MouseButton::Left) => "mouse_left_button",
            Self::Mouse(MouseButton::Middle) => "mouse_middle_button",
            Self::Mouse(MouseButton::Right) => "mouse_right_button",
            Self::ScrollUp => "mouse_scroll_up",
            Self::ScrollDown => "mouse_scroll_down",
            Self::ScrollLeft => "mouse_6",
            Self::ScrollRight => "mouse_7",
            Self::Release => "mouse_release",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Modifier keys held during an event.
    ///
    /// Same bit layout as the xterm CSI modifier parameter minus one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
        const SUPER = 0b1000;
    }
}

/// One decoded input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Input {
    pub key: Key,
    /// 0-based `(row, col)` of a mouse event. `None` for keys.
    pub position: Option<(u16, u16)>,
    pub modifiers: Modifiers,
    /// Position in the stream of events from one decoder, from 1.
    pub seqnum: u64,
}

impl Input {
    /// The key name, or the character itself.
    #[must_use]
    pub fn code(&self) -> String {
        self.key.to_string()
    }

    #[inline]
    #[must_use]
    pub const fn is_alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    #[inline]
    #[must_use]
    pub const fn is_shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn is_ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }
}

// ─── Decoder ────────────────────────────────────────────────────────────────

/// Incremental byte-to-event decoder.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: Vec<u8>,
    seqnum: u64,
}

impl Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every event they complete.
    ///
    /// An incomplete trailing sequence stays buffered for the next call.
    pub fn advance(&mut self, data: &[u8]) -> Vec<Input> {
        self.buf.extend_from_slice(data);
        let mut events = Vec::new();
        let mut pos = 0;

        while pos < self.buf.len() {
            match try_parse(&self.buf[pos..]) {
                Parsed::Event(event, consumed) => {
                    events.push(event);
                    pos += consumed;
                }
                Parsed::Incomplete => break,
                Parsed::Skip(n) => pos += n,
            }
        }
        self.buf.drain(..pos);

        events.into_iter().map(|e| self.stamp(e)).collect()
    }

    /// Whether bytes are waiting for the rest of a sequence.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Give up on the buffered tail and emit it as plain keys.
    ///
    /// A lone ESC becomes [`Key::Escape`]. Bytes that cannot stand alone
    /// are dropped.
    pub fn flush(&mut self) -> Vec<Input> {
        let pending = std::mem::take(&mut self.buf);
        pending
            .into_iter()
            .filter_map(|byte| match byte {
                0x1B => Some(press(Key::Escape)),
                0x7F => Some(press(Key::Backspace)),
                b @ 0x20..=0x7E => Some(press(Key::Char(b as char))),
                0x00..=0x1A => Some(control(byte)),
                _ => None,
            })
            .map(|e| self.stamp(e))
            .collect()
    }

    /// Sequence number of the most recent event, 0 before the first.
    #[must_use]
    pub const fn last_seqnum(&self) -> u64 {
        self.seqnum
    }

    const fn stamp(&mut self, mut event: Input) -> Input {
        self.seqnum += 1;
        event.seqnum = self.seqnum;
        event
    }
}

// ─── Parsing ────────────────────────────────────────────────────────────────
//
// Pure functions over the front of the buffer. Each reports what it found
// and how many bytes that took.

enum Parsed {
    Event(Input, usize),
    Incomplete,
    Skip(usize),
}

fn try_parse(buf: &[u8]) -> Parsed {
    match buf[0] {
        0x1B => parse_escape(buf),
        0x08 | 0x7F => Parsed::Event(press(Key::Backspace), 1),
        0x09 => Parsed::Event(press(Key::Tab), 1),
        0x0A | 0x0D => Parsed::Event(press(Key::Enter), 1),
        b @ (0x00..=0x07 | 0x0B..=0x0C | 0x0E..=0x1A) => Parsed::Event(control(b), 1),
        b @ 0x20..=0x7E => Parsed::Event(press(Key::Char(b as char)), 1),
        0xC0..=0xFF => parse_utf8(buf),
        _ => Parsed::Skip(1),
    }
}

fn parse_escape(buf: &[u8]) -> Parsed {
    if buf.len() < 2 {
        return Parsed::Incomplete;
    }
    match buf[1] {
        b'[' => parse_csi(buf),
        b'O' => parse_ss3(buf),
        0x1B => Parsed::Event(with(Key::Escape, Modifiers::ALT), 2),
        b @ 0x20..=0x7E => Parsed::Event(with(Key::Char(b as char), Modifiers::ALT), 2),
        b @ 0x01..=0x1A => {
            let mut event = control(b);
            event.modifiers |= Modifiers::ALT;
            Parsed::Event(event, 2)
        }
        _ => Parsed::Event(press(Key::Escape), 1),
    }
}

fn parse_csi(buf: &[u8]) -> Parsed {
    if buf.len() < 3 {
        return Parsed::Incomplete;
    }
    if buf[2] == b'<' {
        return parse_sgr_mouse(buf);
    }

    // Parameters and intermediates run up to a final byte in 0x40..=0x7E.
    let mut end = 2;
    while end < buf.len() {
        let b = buf[end];
        if (0x40..=0x7E).contains(&b) {
            break;
        }
        if !(0x20..=0x3F).contains(&b) {
            return Parsed::Skip(end + 1);
        }
        end += 1;
    }
    if end >= buf.len() {
        return Parsed::Incomplete;
    }

    let consumed = end + 1;
    let params = parse_params(&buf[2..end]);
    let modifiers = params.get(1).map_or(Modifiers::empty(), |&p| decode_modifiers(p));

    let key = if buf[end] == b'~' {
        match params.first().copied().unwrap_or(0) {
            1 | 7 => Key::Home,
            2 => Key::Insert,
            3 => Key::Delete,
            4 | 8 => Key::End,
            5 => Key::PageUp,
            6 => Key::PageDown,
            n => match tilde_function_key(n) {
                Some(f) => Key::F(f),
                None => return Parsed::Skip(consumed),
            },
        }
    } else {
        match buf[end] {
            b'A' => Key::Up,
            b'B' => Key::Down,
            b'C' => Key::Right,
            b'D' => Key::Left,
            b'E' => Key::Center,
            b'H' => Key::Home,
            b'F' => Key::End,
            b'P' => Key::F(1),
            b'Q' => Key::F(2),
            b'R' => Key::F(3),
            b'S' => Key::F(4),
            b'Z' => return Parsed::Event(with(Key::Tab, Modifiers::SHIFT), consumed),
            _ => return Parsed::Skip(consumed),
        }
    };
    Parsed::Event(with(key, modifiers), consumed)
}

/// `CSI n ~` numbers for F5-F20. The gaps are historical.
const fn tilde_function_key(n: u16) -> Option<u8> {
    Some(match n {
        15 => 5,
        17 => 6,
        18 => 7,
        19 => 8,
        20 => 9,
        21 => 10,
        23 => 11,
        24 => 12,
        25 => 13,
        26 => 14,
        28 => 15,
        29 => 16,
        31 => 17,
        32 => 18,
        33 => 19,
        34 => 20,
        _ => return None,
    })
}

fn parse_ss3(buf: &[u8]) -> Parsed {
    if buf.len() < 3 {
        return Parsed::Incomplete;
    }
    let key = match buf[2] {
        b'A' => Key::Up,
        b'B' => Key::Down,
        b'C' => Key::Right,
        b'D' => Key::Left,
        b'E' => Key::Center,
        b'H' => Key::Home,
        b'F' => Key::End,
        b'M' => Key::Enter,
        b'P' => Key::F(1),
        b'Q' => Key::F(2),
        b'R' => Key::F(3),
        b'S' => Key::F(4),
        _ => return Parsed::Skip(3),
    };
    Parsed::Event(press(key), 3)
}

// ESC [ < Cb ; Cx ; Cy M   press or motion
// ESC [ < Cb ; Cx ; Cy m   release
fn parse_sgr_mouse(buf: &[u8]) -> Parsed {
    let start = 3;
    let mut end = start;
    while end < buf.len() {
        match buf[end] {
            b'M' | b'm' => break,
            b if b.is_ascii_digit() || b == b';' => end += 1,
            _ => return Parsed::Skip(end + 1),
        }
    }
    if end >= buf.len() {
        return Parsed::Incomplete;
    }

    let consumed = end + 1;
    let params = parse_params(&buf[start..end]);
    let &[cb, x, y] = &params[..] else {
        return Parsed::Skip(consumed);
    };

    let mut modifiers = Modifiers::empty();
    if cb & 4 != 0 {
        modifiers |= Modifiers::SHIFT;
    }
    if cb & 8 != 0 {
        modifiers |= Modifiers::ALT;
    }
    if cb & 16 != 0 {
        modifiers |= Modifiers::CTRL;
    }

    let base = cb & 3;
    let key = if cb & 64 != 0 {
        match base {
            0 => Key::ScrollUp,
            1 => Key::ScrollDown,
            2 => Key::ScrollLeft,
            _ => Key::ScrollRight,
        }
    } else if buf[end] == b'm' {
        Key::Release
    } else {
        match base {
            0 => Key::Mouse(MouseButton::Left),
            1 => Key::Mouse(MouseButton::Middle),
            2 => Key::Mouse(MouseButton::Right),
            // Motion with nothing held.
            _ => return Parsed::Skip(consumed),
        }
    };

    // Reports are 1-based.
    let position = Some((y.saturating_sub(1), x.saturating_sub(1)));
    Parsed::Event(
        Input {
            key,
            position,
            modifiers,
            seqnum: 0,
        },
        consumed,
    )
}

fn parse_utf8(buf: &[u8]) -> Parsed {
    let expected = match buf[0] {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return Parsed::Skip(1),
    };
    if buf.len() < expected {
        return Parsed::Incomplete;
    }
    std::str::from_utf8(&buf[..expected])
        .ok()
        .and_then(|s| s.chars().next())
        .map_or(Parsed::Skip(1), |ch| {
            Parsed::Event(press(Key::Char(ch)), expected)
        })
}

// ─── Helpers ────────────────────────────────────────────────────────────────

const fn with(key: Key, modifiers: Modifiers) -> Input {
    Input {
        key,
        position: None,
        modifiers,
        seqnum: 0,
    }
}

const fn press(key: Key) -> Input {
    with(key, Modifiers::empty())
}

/// Ctrl+letter from its C0 byte. NUL is Ctrl+@.
const fn control(byte: u8) -> Input {
    let ch = if byte == 0 { '@' } else { (byte + b'a' - 1) as char };
    with(Key::Char(ch), Modifiers::CTRL)
}

/// Semicolon-separated decimal parameters. Empty fields read as 0.
fn parse_params(raw: &[u8]) -> Vec<u16> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(|&b| b == b';')
        .map(|field| {
            field
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .fold(0u16, |acc, &b| {
                    acc.saturating_mul(10).saturating_add(u16::from(b - b'0'))
                })
        })
        .collect()
}

/// xterm modifier parameter: `1 + bitmask`. 0 and 1 mean none.
#[allow(clippy::cast_possible_truncation)]
const fn decode_modifiers(param: u16) -> Modifiers {
    Modifiers::from_bits_truncate(param.saturating_sub(1) as u8)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
