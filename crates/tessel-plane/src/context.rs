// SPDX-License-Identifier: MIT
//
// Context: one terminal, one plane tree, one renderer.
//
// Start-up order:
//
//   open output → detect capabilities → size the screen → build the root
//   plane → raw mode → alternate screen → hide cursor → arm panic restore
//
// Every terminal change is recorded on the `Terminal` as it happens, so a
// failure part-way through drops the terminal and undoes exactly what was
// done. Once `new` returns, the context owns the terminal until `stop` (or
// drop) puts it back.
//
// A render composites the planes into a frame, diffs it against the last
// frame sent and writes the difference in one go. The screen size is
// re-read from the terminal on each render and the root plane follows it.
//
// Input is read on demand. Decoded events queue up in order; a lone ESC
// waits `ESCAPE_WAIT_MS` for the rest of a sequence before it counts as
// the Escape key.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::{Rc, Weak};

use tessel_term::ansi::{self, MouseMode};
use tessel_term::diff::DiffRenderer;
use tessel_term::input::{Decoder, Input};
use tessel_term::reader::InputStream;
use tessel_term::terminal::{Capabilities, Size, Terminal};

use crate::compose::Compositor;
use crate::error::{ArgumentError, Error, Result};
use crate::options::{ContextOptions, InitFlags, LogLevel, Margins};
use crate::plane::{PlaneArena, PlaneHandle, PlaneId};
use crate::stats::Stats;

/// How long a partial escape sequence waits for its remaining bytes.
const ESCAPE_WAIT_MS: i32 = 10;

const READ_CHUNK: usize = 1024;

/// A rendering context bound to one output.
///
/// ```no_run
/// use tessel_plane::{Context, ContextOptions};
///
/// let mut ctx = Context::new(ContextOptions::default())?;
/// ctx.root_plane().put_text_at(0, 0, "Hello")?;
/// ctx.render()?;
/// ctx.stop()?;
/// # Ok::<(), tessel_plane::Error>(())
/// ```
pub struct Context {
    terminal: Terminal,
    /// `None` once stopped.
    arena: Option<Rc<RefCell<PlaneArena>>>,
    root: PlaneId,
    compositor: Compositor,
    renderer: DiffRenderer,
    screen: Size,
    margins: Margins,
    cursor: Option<(u16, u16)>,
    stats: Stats,
    log_level: LogLevel,
    /// `None` until standard input is first read.
    input: Option<InputStream>,
    decoder: Decoder,
    queued: VecDeque<Input>,
}

impl Context {
    /// Take over the output described by `options`.
    ///
    /// # Errors
    ///
    /// `InitializationFailed` when the output or input is not open, the
    /// terminal type cannot position the cursor, the screen size is unknown, the
    /// margins leave no room, or a terminal mode cannot be engaged. The
    /// terminal is left as it was found.
    pub fn new(options: ContextOptions) -> Result<Self> {
        let ContextOptions {
            output,
            input,
            term_type,
            log_level,
            margins,
            fallback_size,
            flags,
        } = options;

        let stream = output
            .into_stream()
            .map_err(|e| Error::init("output is not open", Some(e)))?;
        let input = input
            .into_stream()
            .map_err(|e| Error::init("input is not open", Some(e)))?;
        let caps = Capabilities::detect(term_type.as_deref());
        if !caps.cursor_addressing {
            return Err(Error::init(
                format!("terminal type {:?} cannot position the cursor", caps.term),
                None,
            ));
        }

        let mut terminal = Terminal::new(stream, caps);
        let screen = terminal
            .size()
            .or(fallback_size)
            .ok_or_else(|| Error::init("screen size is unknown", None))?;
        let usable = margins.inner(screen).ok_or_else(|| {
            Error::init(
                format!("margins leave no room on a {}x{} screen", screen.rows, screen.cols),
                None,
            )
        })?;
        let arena = PlaneArena::new(i32::from(margins.top), i32::from(margins.left), usable)?;
        let root = arena.root();

        if !flags.contains(InitFlags::NO_RAW_MODE) {
            terminal
                .enable_raw_mode()
                .map_err(|e| Error::init("cannot enter raw mode", Some(e)))?;
        }
        if !flags.contains(InitFlags::NO_ALTERNATE_SCREEN) {
            terminal
                .enter_alt_screen()
                .map_err(|e| Error::init("cannot enter the alternate screen", Some(e)))?;
        }
        terminal
            .hide_cursor()
            .map_err(|e| Error::init("cannot hide the cursor", Some(e)))?;
        if !flags.contains(InitFlags::NO_PANIC_HOOK) {
            terminal.arm_panic_restore();
        }

        let depth = terminal.capabilities().color_depth;
        log_at!(
            log_level,
            INFO,
            term = %terminal.capabilities().term,
            ?depth,
            rows = screen.rows,
            cols = screen.cols,
            "context started"
        );

        Ok(Self {
            terminal,
            arena: Some(Rc::new(RefCell::new(arena))),
            root,
            compositor: Compositor::new(screen),
            renderer: DiffRenderer::new(depth),
            screen,
            margins,
            cursor: None,
            stats: Stats::default(),
            log_level,
            input,
            decoder: Decoder::new(),
            queued: VecDeque::new(),
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The root plane. The handle does not keep the context alive; after
    /// `stop` or drop it reports `UseAfterFree`.
    #[must_use]
    pub fn root_plane(&self) -> PlaneHandle {
        let arena = self.arena.as_ref().map_or_else(Weak::new, Rc::downgrade);
        PlaneHandle::attached(arena, self.root)
    }

    /// Screen size as of the last render.
    #[must_use]
    pub const fn dimensions(&self) -> (u16, u16) {
        (self.screen.rows, self.screen.cols)
    }

    #[must_use]
    pub const fn margins(&self) -> Margins {
        self.margins
    }

    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        self.terminal.capabilities()
    }

    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.arena.is_none()
    }

    #[must_use]
    pub const fn stats(&self) -> Stats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
    }

    fn live_arena(&self) -> Result<Rc<RefCell<PlaneArena>>> {
        self.arena.clone().ok_or(Error::UseAfterFree)
    }

    // ── Rendering ───────────────────────────────────────────────────

    /// Draw the plane tree, emitting only cells that changed since the
    /// last render.
    ///
    /// # Errors
    ///
    /// `UseAfterFree` after `stop`; `WriteFailed` when the output rejects
    /// the frame, in which case the next render redraws everything.
    pub fn render(&mut self) -> Result<()> {
        let arena = self.live_arena()?;
        self.follow_terminal_size(&arena)?;

        let frame = self.compositor.compose(&arena.borrow());
        let pass = self.renderer.render(frame);

        match self.write_frame() {
            Ok(()) => {
                self.stats.record(&pass);
                log_at!(
                    self.log_level,
                    TRACE,
                    bytes = pass.bytes_written,
                    cells = pass.cells_rendered,
                    full = pass.full_redraw,
                    "rendered"
                );
                Ok(())
            }
            Err(e) => {
                self.stats.record_failure();
                self.renderer.force_redraw();
                log_at!(self.log_level, ERROR, error = %e, "render failed");
                Err(e.into())
            }
        }
    }

    /// Redraw the whole screen on the next render.
    ///
    /// # Errors
    ///
    /// `UseAfterFree` after `stop`.
    pub fn refresh(&mut self) -> Result<()> {
        self.live_arena()?;
        self.renderer.force_redraw();
        Ok(())
    }

    fn write_frame(&mut self) -> io::Result<()> {
        let stream = self.terminal.stream();
        self.renderer.flush_to(stream)?;
        if let Some((row, col)) = self.cursor {
            ansi::cursor_to(stream, row, col)?;
            stream.flush()?;
        }
        Ok(())
    }

    fn follow_terminal_size(&mut self, arena: &RefCell<PlaneArena>) -> Result<()> {
        let Some(size) = self.terminal.size() else {
            return Ok(());
        };
        if size == self.screen {
            return Ok(());
        }
        log_at!(
            self.log_level,
            DEBUG,
            rows = size.rows,
            cols = size.cols,
            "screen resized"
        );
        self.screen = size;
        self.compositor.resize(size);
        // Margins wider than the screen leave a single cell.
        let usable = self.margins.inner(size).unwrap_or(Size::new(1, 1));
        arena.borrow_mut().resize_root(usable)?;
        self.cursor = self
            .cursor
            .filter(|&(row, col)| row < size.rows && col < size.cols);
        Ok(())
    }

    // ── Cursor and mouse ────────────────────────────────────────────

    /// Show the cursor at `(row, col)` on the screen. It is put back there
    /// after every render.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` off the screen, `CursorControlFailed` when the
    /// terminal cannot be told, `UseAfterFree` after `stop`.
    pub fn enable_cursor(&mut self, row: u16, col: u16) -> Result<()> {
        self.live_arena()?;
        if row >= self.screen.rows || col >= self.screen.cols {
            return Err(ArgumentError::Position {
                row: u32::from(row),
                col: u32::from(col),
            }
            .into());
        }
        let stream = self.terminal.stream();
        ansi::cursor_to(stream, row, col)
            .and_then(|()| stream.flush())
            .map_err(|e| Error::cursor("cannot move the cursor", Some(e)))?;
        self.terminal
            .show_cursor()
            .map_err(|e| Error::cursor("cannot show the cursor", Some(e)))?;
        self.cursor = Some((row, col));
        Ok(())
    }

    /// Hide the cursor. Idempotent.
    ///
    /// # Errors
    ///
    /// `CursorControlFailed` when the terminal cannot be told,
    /// `UseAfterFree` after `stop`.
    pub fn disable_cursor(&mut self) -> Result<()> {
        self.live_arena()?;
        self.cursor = None;
        self.terminal
            .hide_cursor()
            .map_err(|e| Error::cursor("cannot hide the cursor", Some(e)))
    }

    /// Where the cursor is shown, if it is.
    #[must_use]
    pub const fn cursor(&self) -> Option<(u16, u16)> {
        self.cursor
    }

    /// Turn on mouse click reporting. Undone by `stop`.
    ///
    /// # Errors
    ///
    /// `WriteFailed`, or `UseAfterFree` after `stop`.
    pub fn enable_mouse(&mut self) -> Result<()> {
        self.live_arena()?;
        self.terminal.enable_mouse(MouseMode::Click)?;
        Ok(())
    }

    /// # Errors
    ///
    /// `WriteFailed`, or `UseAfterFree` after `stop`.
    pub fn disable_mouse(&mut self) -> Result<()> {
        self.live_arena()?;
        self.terminal.disable_mouse()?;
        Ok(())
    }

    // ── Input ───────────────────────────────────────────────────────

    /// Wait for the next key or mouse event.
    ///
    /// Events are numbered from 1 in arrival order. Mouse events carry
    /// their screen position; mouse reporting has to be on
    /// ([`enable_mouse`](Self::enable_mouse)) for the terminal to send any.
    ///
    /// # Errors
    ///
    /// `InputClosed` when the source hits end of file with nothing left,
    /// `ReadFailed` when reading fails, `UseAfterFree` after `stop`.
    pub fn get_input_blocking(&mut self) -> Result<Input> {
        self.live_arena()?;
        loop {
            if let Some(event) = self.queued.pop_front() {
                log_at!(
                    self.log_level,
                    TRACE,
                    code = %event.key,
                    seqnum = event.seqnum,
                    "input"
                );
                return Ok(event);
            }

            if self.input.is_none() {
                self.input = Some(InputStream::stdin().map_err(Error::ReadFailed)?);
            }
            let Some(source) = self.input.as_mut() else {
                return Err(Error::InputClosed);
            };
            if self.decoder.has_pending()
                && !source
                    .wait_readable(ESCAPE_WAIT_MS)
                    .map_err(Error::ReadFailed)?
            {
                let flushed = self.decoder.flush();
                self.queued.extend(flushed);
                continue;
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = match source.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log_at!(self.log_level, ERROR, error = %e, "input read failed");
                    return Err(Error::ReadFailed(e));
                }
            };
            if n == 0 {
                let flushed = self.decoder.flush();
                if flushed.is_empty() {
                    return Err(Error::InputClosed);
                }
                self.queued.extend(flushed);
                continue;
            }
            let decoded = self.decoder.advance(&chunk[..n]);
            self.queued.extend(decoded);
        }
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Destroy every plane and give the terminal back: mouse off, cursor
    /// shown, alternate screen left, tty modes restored.
    ///
    /// Every restore step is attempted even if one fails.
    ///
    /// # Errors
    ///
    /// `DoubleTeardown` on a second call; `WriteFailed` when the output
    /// rejected a restore sequence.
    pub fn stop(&mut self) -> Result<()> {
        let Some(arena) = self.arena.take() else {
            return Err(Error::DoubleTeardown);
        };
        let planes = arena.borrow().len();
        drop(arena);
        self.cursor = None;

        let restored = self.terminal.restore();
        log_at!(
            self.log_level,
            INFO,
            planes,
            stats = %self.stats,
            "context stopped"
        );
        restored.map_err(Error::from)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.arena.is_some() {
            if let Err(e) = self.stop() {
                log_at!(self.log_level, WARN, error = %e, "terminal restore failed");
            }
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("terminal", &self.terminal)
            .field("screen", &self.screen)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
