// SPDX-License-Identifier: MIT
//
// DirectSession: immediate writes with no planes and no frame diffing.
//
// A session is built inactive: the output is opened and capabilities are
// detected, but nothing is written. `activate` takes control of the
// terminal; only then do writes, cursor control and `deactivate` touch it.
// Tearing down a session that never activated does no I/O at all.
//
// Colours go through the same quantization as rendered frames, so a
// session on a 16-colour or colourless terminal degrades rather than
// printing sequences the terminal cannot show.

use std::io::Write;

use tessel_term::ansi;
use tessel_term::channel::Channels;
use tessel_term::color::{CellColor, ColorDepth};
use tessel_term::output::OutputBuffer;
use tessel_term::terminal::{Capabilities, Size, Terminal};

use crate::error::{Error, Result};
use crate::options::{DirectOptions, LogLevel};

/// Size reported when neither the output nor the options know better.
const DEFAULT_SIZE: Size = Size::new(24, 80);

/// Unbuffered terminal output.
///
/// ```no_run
/// use tessel_plane::{DirectOptions, DirectSession};
/// use tessel_term::channel::Channels;
///
/// let mut direct = DirectSession::start(DirectOptions::default())?;
/// let mut red = Channels::new();
/// red.set_fg_rgb8(255, 0, 0)?;
/// direct.write_text("warning\n", Some(red))?;
/// direct.deactivate()?;
/// # Ok::<(), tessel_plane::Error>(())
/// ```
pub struct DirectSession {
    terminal: Terminal,
    fallback_size: Option<Size>,
    active: bool,
    cursor_enabled: bool,
    scratch: OutputBuffer,
    log_level: LogLevel,
}

impl DirectSession {
    /// Open the output without taking control of it.
    ///
    /// # Errors
    ///
    /// `InitializationFailed` when the output is not open.
    pub fn new(options: DirectOptions) -> Result<Self> {
        let DirectOptions {
            output,
            term_type,
            log_level,
            fallback_size,
        } = options;
        let stream = output
            .into_stream()
            .map_err(|e| Error::init("output is not open", Some(e)))?;
        let caps = Capabilities::detect(term_type.as_deref());
        Ok(Self {
            terminal: Terminal::new(stream, caps),
            fallback_size,
            active: false,
            cursor_enabled: true,
            scratch: OutputBuffer::new(),
            log_level,
        })
    }

    /// [`new`](Self::new) followed by [`activate`](Self::activate).
    ///
    /// # Errors
    ///
    /// As both.
    pub fn start(options: DirectOptions) -> Result<Self> {
        let mut session = Self::new(options)?;
        session.activate()?;
        Ok(session)
    }

    /// Take control of the terminal. A no-op when already active.
    ///
    /// # Errors
    ///
    /// `InitializationFailed` when the terminal cannot be reset.
    pub fn activate(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }
        if self.depth() != ColorDepth::None {
            self.terminal
                .write_all(b"\x1b[0m")
                .map_err(|e| Error::init("cannot reset the terminal", Some(e)))?;
        }
        self.terminal.arm_panic_restore();
        self.active = true;
        log_at!(
            self.log_level,
            DEBUG,
            term = %self.terminal.capabilities().term,
            "direct session active"
        );
        Ok(())
    }

    /// Give the terminal back: styles reset, cursor shown. Does nothing,
    /// and writes nothing, unless [`activate`](Self::activate) succeeded.
    ///
    /// # Errors
    ///
    /// `WriteFailed` when a restore sequence could not be written. The
    /// session is inactive afterwards either way.
    pub fn deactivate(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.cursor_enabled = true;
        // Restoring engaged modes resets styles on its own.
        let reset = if self.terminal.modes().is_empty() && self.depth() != ColorDepth::None {
            self.terminal.write_all(b"\x1b[0m")
        } else {
            Ok(())
        };
        let restored = self.terminal.restore();
        log_at!(self.log_level, DEBUG, "direct session inactive");
        reset.and(restored)?;
        Ok(())
    }

    // ── State ───────────────────────────────────────────────────────

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn is_cursor_enabled(&self) -> bool {
        self.cursor_enabled
    }

    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        self.terminal.capabilities()
    }

    const fn depth(&self) -> ColorDepth {
        self.terminal.capabilities().color_depth
    }

    /// `(rows, cols)` of the terminal, else the fallback size, else 24×80.
    #[must_use]
    pub fn dimensions(&self) -> (u16, u16) {
        let size = self
            .terminal
            .size()
            .or(self.fallback_size)
            .unwrap_or(DEFAULT_SIZE);
        (size.rows, size.cols)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(Error::Unattached)
        }
    }

    fn ensure_addressing(&self, what: &str) -> Result<()> {
        if self.terminal.capabilities().cursor_addressing {
            Ok(())
        } else {
            Err(Error::cursor(format!("terminal cannot {what}"), None))
        }
    }

    // ── Output ──────────────────────────────────────────────────────

    /// Write `text` now, coloured by `channels` when given. Returns the
    /// bytes sent, escape sequences included.
    ///
    /// With channels, colours are quantized to the terminal and reset
    /// afterwards. Without, the text goes out untouched.
    ///
    /// # Errors
    ///
    /// `Unattached` before activation; `WriteFailed` when the output
    /// rejects the bytes.
    pub fn write_text(&mut self, text: &str, channels: Option<Channels>) -> Result<usize> {
        self.ensure_active()?;
        self.scratch.clear();
        let depth = self.depth();
        let styled = channels.filter(|_| depth != ColorDepth::None);
        if let Some(ch) = styled {
            ansi::fg(&mut self.scratch, CellColor::from(ch.fg()).quantize(depth))?;
            ansi::bg(&mut self.scratch, CellColor::from(ch.bg()).quantize(depth))?;
        }
        self.scratch.write_all(text.as_bytes())?;
        if styled.is_some() {
            ansi::reset(&mut self.scratch)?;
        }
        let sent = self.scratch.len();
        self.scratch.flush_to(self.terminal.stream())?;
        Ok(sent)
    }

    /// Hide the cursor. Idempotent.
    ///
    /// # Errors
    ///
    /// `Unattached` before activation; `CursorControlFailed` when the
    /// terminal has no cursor control or the write fails.
    pub fn disable_cursor(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.ensure_addressing("hide the cursor")?;
        if !self.cursor_enabled {
            return Ok(());
        }
        self.terminal
            .hide_cursor()
            .map_err(|e| Error::cursor("cannot hide the cursor", Some(e)))?;
        self.cursor_enabled = false;
        Ok(())
    }

    /// Show the cursor. Idempotent.
    ///
    /// # Errors
    ///
    /// As [`disable_cursor`](Self::disable_cursor).
    pub fn enable_cursor(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.ensure_addressing("show the cursor")?;
        if self.cursor_enabled {
            return Ok(());
        }
        self.terminal
            .show_cursor()
            .map_err(|e| Error::cursor("cannot show the cursor", Some(e)))?;
        self.cursor_enabled = true;
        Ok(())
    }

    /// Move the cursor to `(row, col)`, zero-based.
    ///
    /// # Errors
    ///
    /// As [`disable_cursor`](Self::disable_cursor).
    pub fn cursor_move(&mut self, row: u16, col: u16) -> Result<()> {
        self.ensure_active()?;
        self.ensure_addressing("move the cursor")?;
        let stream = self.terminal.stream();
        ansi::cursor_to(stream, row, col)
            .and_then(|()| stream.flush())
            .map_err(|e| Error::cursor("cannot move the cursor", Some(e)))
    }

    /// Clear the screen and home the cursor.
    ///
    /// # Errors
    ///
    /// As [`disable_cursor`](Self::disable_cursor).
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.ensure_addressing("clear the screen")?;
        let stream = self.terminal.stream();
        ansi::clear_screen(stream)
            .and_then(|()| ansi::cursor_to(stream, 0, 0))
            .and_then(|()| stream.flush())
            .map_err(|e| Error::cursor("cannot clear the screen", Some(e)))
    }

    /// # Errors
    ///
    /// `Unattached` before activation; `WriteFailed` from the output.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.terminal.stream().flush()?;
        Ok(())
    }
}

impl Drop for DirectSession {
    fn drop(&mut self) {
        if let Err(e) = self.deactivate() {
            log_at!(self.log_level, WARN, error = %e, "terminal restore failed");
        }
    }
}

impl std::fmt::Debug for DirectSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectSession")
            .field("terminal", &self.terminal)
            .field("active", &self.active)
            .field("cursor_enabled", &self.cursor_enabled)
            .finish_non_exhaustive()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
