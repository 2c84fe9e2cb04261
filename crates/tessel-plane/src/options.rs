// SPDX-License-Identifier: MIT
//
// Construction options for contexts and direct sessions.
//
// Everything a context needs is passed in explicitly: where output goes,
// where input comes from, which terminal type to assume, how chatty the engine is, how much of the
// screen to leave alone, and which terminal modes to skip. There is no
// process-wide default stream.

use std::io::{self, Read, Write};

use tessel_term::reader::InputStream;
use tessel_term::terminal::{Fd, Size, Stream};
use tracing::Level;

// ─── Output ─────────────────────────────────────────────────────────────────

/// Where rendered bytes are written.
#[derive(Default)]
pub enum Output {
    /// Process standard output.
    #[default]
    Stdout,
    /// A descriptor owned by the caller. It is never closed.
    Fd(Fd),
    /// Any writer. Writers never report a terminal size, so pair this with
    /// a fallback size.
    Writer(Box<dyn Write>),
}

impl Output {
    /// Open the stream.
    ///
    /// # Errors
    ///
    /// `EBADF` when a descriptor is not open.
    pub(crate) fn into_stream(self) -> io::Result<Stream> {
        match self {
            Self::Stdout => Ok(Stream::Stdout),
            Self::Fd(fd) => Stream::from_fd(fd),
            Self::Writer(w) => Ok(Stream::Writer(w)),
        }
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::Fd(fd) => write!(f, "Fd({fd})"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

// ─── InputSource ────────────────────────────────────────────────────────────

/// Where key and mouse bytes are read from.
#[derive(Default)]
pub enum InputSource {
    /// Process standard input, opened on the first read.
    #[default]
    Stdin,
    /// A descriptor owned by the caller. It is never closed.
    Fd(Fd),
    /// Any reader, e.g. recorded input.
    Reader(Box<dyn Read>),
}

impl InputSource {
    /// Open the stream. `None` for standard input, which waits until it is
    /// first needed.
    ///
    /// # Errors
    ///
    /// `EBADF` when a descriptor is not open.
    pub(crate) fn into_stream(self) -> io::Result<Option<InputStream>> {
        match self {
            Self::Stdin => Ok(None),
            Self::Fd(fd) => InputStream::from_fd(fd).map(Some),
            Self::Reader(r) => Ok(Some(InputStream::Reader(r))),
        }
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => f.write_str("Stdin"),
            Self::Fd(fd) => write!(f, "Fd({fd})"),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

// ─── LogLevel ───────────────────────────────────────────────────────────────

/// Cap on the engine's own diagnostics.
///
/// Events above the cap are never emitted, whatever subscriber is
/// installed. `Silent` suppresses everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Silent,
    Panic,
    Fatal,
    Error,
    #[default]
    Warning,
    Info,
    Verbose,
    Debug,
    Trace,
}

impl LogLevel {
    /// The most verbose `tracing` level this cap lets through.
    #[must_use]
    pub const fn as_tracing(self) -> Option<Level> {
        match self {
            Self::Silent => None,
            Self::Panic | Self::Fatal | Self::Error => Some(Level::ERROR),
            Self::Warning => Some(Level::WARN),
            Self::Info => Some(Level::INFO),
            Self::Verbose | Self::Debug => Some(Level::DEBUG),
            Self::Trace => Some(Level::TRACE),
        }
    }

    /// Whether an event at `level` passes this cap.
    #[inline]
    #[must_use]
    pub fn allows(self, level: Level) -> bool {
        self.as_tracing().is_some_and(|cap| level <= cap)
    }
}

// ─── Margins ────────────────────────────────────────────────────────────────

/// Rows and columns around the edge of the screen the root plane avoids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Margins {
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
    pub left: u16,
}

impl Margins {
    /// The same margin on every side.
    #[must_use]
    pub const fn uniform(n: u16) -> Self {
        Self {
            top: n,
            right: n,
            bottom: n,
            left: n,
        }
    }

    /// What is left of `screen` inside the margins, if anything.
    #[must_use]
    pub const fn inner(self, screen: Size) -> Option<Size> {
        let vertical = self.top as u32 + self.bottom as u32;
        let horizontal = self.left as u32 + self.right as u32;
        if vertical >= screen.rows as u32 || horizontal >= screen.cols as u32 {
            return None;
        }
        // Both sums are below a u16 screen dimension here.
        #[allow(clippy::cast_possible_truncation)]
        let inner = Size::new(
            screen.rows - vertical as u16,
            screen.cols - horizontal as u16,
        );
        Some(inner)
    }
}

// ─── InitFlags ──────────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Terminal modes a context should leave untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InitFlags: u8 {
        /// Draw on the normal screen instead of the alternate one.
        const NO_ALTERNATE_SCREEN = 1 << 0;
        /// Keep the tty's line discipline.
        const NO_RAW_MODE         = 1 << 1;
        /// Do not arm the panic-time restore.
        const NO_PANIC_HOOK       = 1 << 2;
    }
}

// ─── Option records ─────────────────────────────────────────────────────────

/// Everything [`Context::new`](crate::Context::new) needs.
#[derive(Debug, Default)]
pub struct ContextOptions {
    pub output: Output,
    pub input: InputSource,
    /// Overrides `$TERM`.
    pub term_type: Option<String>,
    pub log_level: LogLevel,
    pub margins: Margins,
    /// Screen size to assume when the output cannot report one.
    pub fallback_size: Option<Size>,
    pub flags: InitFlags,
}

/// Everything [`DirectSession::new`](crate::DirectSession::new) needs.
#[derive(Debug, Default)]
pub struct DirectOptions {
    pub output: Output,
    /// Overrides `$TERM`.
    pub term_type: Option<String>,
    pub log_level: LogLevel,
    /// Size reported when the output cannot report one.
    pub fallback_size: Option<Size>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn silent_allows_nothing() {
        assert!(!LogLevel::Silent.allows(Level::ERROR));
    }

    #[test]
    fn caps_are_inclusive() {
        assert!(LogLevel::Warning.allows(Level::ERROR));
        assert!(LogLevel::Warning.allows(Level::WARN));
        assert!(!LogLevel::Warning.allows(Level::INFO));
        assert!(LogLevel::Trace.allows(Level::TRACE));
        assert!(!LogLevel::Verbose.allows(Level::TRACE));
    }

    #[test]
    fn margins_shrink_screen() {
        let m = Margins {
            top: 1,
            right: 2,
            bottom: 3,
            left: 4,
        };
        assert_eq!(m.inner(Size::new(24, 80)), Some(Size::new(20, 74)));
        assert_eq!(Margins::default().inner(Size::new(5, 5)), Some(Size::new(5, 5)));
    }

    #[test]
    fn margins_that_swallow_the_screen() {
        assert_eq!(Margins::uniform(2).inner(Size::new(4, 80)), None);
        assert_eq!(Margins::uniform(1).inner(Size::new(3, 3)), Some(Size::new(1, 1)));
    }

    #[test]
    fn output_debug_hides_writer() {
        let out = Output::Writer(Box::new(Vec::new()));
        assert_eq!(format!("{out:?}"), "Writer(..)");
        assert_eq!(format!("{:?}", Output::Fd(7)), "Fd(7)");
    }

    #[test]
    fn closed_descriptor_does_not_open() {
        assert!(Output::Fd(-1).into_stream().is_err());
        assert!(InputSource::Fd(-1).into_stream().is_err());
    }

    #[test]
    fn stdin_opens_lazily() {
        assert!(InputSource::Stdin.into_stream().unwrap().is_none());
        let recorded = InputSource::Reader(Box::new(io::empty()));
        assert_eq!(format!("{recorded:?}"), "Reader(..)");
        assert!(recorded.into_stream().unwrap().is_some());
    }
}
