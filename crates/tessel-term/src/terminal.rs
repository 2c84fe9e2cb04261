// SPDX-License-Identifier: MIT
//
// Terminal control: output streams, termios, screen modes, RAII restore.
//
// Safety: this module uses `unsafe` for the POSIX terminal interfaces
// (fcntl, isatty, ioctl TIOCGWINSZ, tcgetattr/tcsetattr, write) and to wrap a
// caller-supplied descriptor in a `File` that is never closed. Each block is
// minimal.
#![allow(unsafe_code)]
//
// A `Terminal` owns one output `Stream` and remembers every mode it has
// engaged (raw termios, alternate screen, hidden cursor, mouse reporting).
// `restore` undoes exactly those, in reverse, attempting every step even
// when an earlier one fails. Dropping an engaged terminal restores it, so a
// constructor that bails out halfway leaves nothing behind.
//
// The panic hook writes the restore sequence for the published modes
// straight to the armed descriptor with `libc::write`, bypassing any
// Rust-level locks the panicking thread may hold, then puts the saved
// termios back.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Write};
use std::mem::ManuallyDrop;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::{Mutex, Once};

use crate::ansi;
use crate::color::ColorDepth;

/// A raw file descriptor number.
pub type Fd = i32;

const STDOUT_FD: Fd = 1;

// ─── Size ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub rows: u16,
    pub cols: u16,
}

impl Size {
    #[inline]
    #[must_use]
    pub const fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    #[inline]
    #[must_use]
    pub const fn area(self) -> u32 {
        self.rows as u32 * self.cols as u32
    }
}

// ─── Descriptor queries ─────────────────────────────────────────────────────

/// Whether `fd` refers to an open descriptor.
#[cfg(unix)]
#[must_use]
pub fn fd_is_open(fd: Fd) -> bool {
    fd >= 0 && unsafe { libc::fcntl(fd, libc::F_GETFD) } != -1
}

#[cfg(not(unix))]
#[must_use]
pub fn fd_is_open(fd: Fd) -> bool {
    fd >= 0
}

/// Whether `fd` is a terminal.
#[cfg(unix)]
#[must_use]
pub fn is_tty(fd: Fd) -> bool {
    unsafe { libc::isatty(fd) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty(_fd: Fd) -> bool {
    false
}

/// Window size of the terminal behind `fd`, via `ioctl(TIOCGWINSZ)`.
#[cfg(unix)]
#[must_use]
pub fn query_size(fd: Fd) -> Option<Size> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &raw mut ws) };
    if result == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(Size::new(ws.ws_row, ws.ws_col))
    } else {
        None
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn query_size(_fd: Fd) -> Option<Size> {
    None
}

// ─── Capabilities ───────────────────────────────────────────────────────────

/// What the output terminal is assumed to support, from `TERM`/`COLORTERM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Terminal type name; empty when unknown.
    pub term: String,
    pub color_depth: ColorDepth,
    /// Cursor positioning and screen modes are available.
    pub cursor_addressing: bool,
}

impl Capabilities {
    /// Detect from the environment, with `term` overriding `$TERM`.
    #[must_use]
    pub fn detect(term: Option<&str>) -> Self {
        let env_term = std::env::var("TERM").ok();
        let colorterm = std::env::var("COLORTERM").ok();
        Self::from_values(term.or(env_term.as_deref()), colorterm.as_deref())
    }

    /// Decide capabilities from explicit `TERM` and `COLORTERM` values.
    #[must_use]
    pub fn from_values(term: Option<&str>, colorterm: Option<&str>) -> Self {
        let term = term.unwrap_or("").trim();
        if term.is_empty() || term == "dumb" {
            return Self {
                term: term.to_owned(),
                color_depth: ColorDepth::None,
                cursor_addressing: false,
            };
        }

        let truecolor_env = colorterm.is_some_and(|c| matches!(c, "truecolor" | "24bit"));
        let color_depth = if truecolor_env || term.contains("direct") || term.contains("truecolor")
        {
            ColorDepth::TrueColor
        } else if term.contains("256color") {
            ColorDepth::Ansi256
        } else if term.starts_with("vt1") || term.starts_with("vt2") {
            ColorDepth::None
        } else {
            ColorDepth::Ansi16
        };

        Self {
            term: term.to_owned(),
            color_depth,
            cursor_addressing: true,
        }
    }
}

// ─── Streams ────────────────────────────────────────────────────────────────

/// Where terminal output goes.
pub enum Stream {
    /// Process standard output.
    Stdout,
    /// A caller-owned descriptor. Never closed by us.
    Fd(Fd, ManuallyDrop<File>),
    /// Any writer, e.g. a [`SharedBuffer`].
    Writer(Box<dyn Write>),
}

impl Stream {
    /// Wrap a caller-owned descriptor.
    ///
    /// The descriptor must stay open for as long as the stream is used.
    ///
    /// # Errors
    ///
    /// `EBADF` if the descriptor is not open.
    #[cfg(unix)]
    pub fn from_fd(fd: Fd) -> io::Result<Self> {
        use std::os::fd::FromRawFd;

        if !fd_is_open(fd) {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        // The descriptor is open and the File is never dropped, so ownership
        // stays with the caller.
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self::Fd(fd, ManuallyDrop::new(file)))
    }

    #[cfg(not(unix))]
    pub fn from_fd(_fd: Fd) -> io::Result<Self> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    /// Descriptor behind the stream, if any.
    #[must_use]
    pub const fn fd(&self) -> Option<Fd> {
        match self {
            Self::Stdout => Some(STDOUT_FD),
            Self::Fd(fd, _) => Some(*fd),
            Self::Writer(_) => None,
        }
    }

    #[must_use]
    pub fn is_tty(&self) -> bool {
        self.fd().is_some_and(is_tty)
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout => io::stdout().lock().write(buf),
            Self::Fd(_, file) => file.write(buf),
            Self::Writer(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout => io::stdout().lock().flush(),
            Self::Fd(_, file) => file.flush(),
            Self::Writer(w) => w.flush(),
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stream::Stdout"),
            Self::Fd(fd, _) => write!(f, "Stream::Fd({fd})"),
            Self::Writer(_) => f.write_str("Stream::Writer"),
        }
    }
}

/// An in-memory output sink whose clones share one byte buffer.
///
/// Hand one clone to a stream and keep another to inspect what was written.
/// [`set_broken`](Self::set_broken) makes every later write fail with
/// `BrokenPipe`.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Rc<RefCell<SharedInner>>,
}

#[derive(Debug, Default)]
struct SharedInner {
    bytes: Vec<u8>,
    broken: bool,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.inner.borrow().bytes.clone()
    }

    /// Contents as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow().bytes).into_owned()
    }

    /// Drain and return the contents.
    #[must_use]
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.borrow_mut().bytes)
    }

    pub fn set_broken(&self, broken: bool) {
        self.inner.borrow_mut().broken = broken;
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        if inner.broken {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        inner.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.inner.borrow().broken {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        Ok(())
    }
}

// ─── Panic-safe restore ─────────────────────────────────────────────────────

/// Descriptor the panic hook restores; -1 when none is armed.
static ARMED_FD: AtomicI32 = AtomicI32::new(-1);

/// Saved termios for the panic hook, keyed by descriptor.
#[cfg(unix)]
static TERMIOS_BACKUP: Mutex<Option<(Fd, libc::termios)>> = Mutex::new(None);

/// Modes engaged on the armed descriptor, as `Modes` bits.
static ARMED_MODES: AtomicU8 = AtomicU8::new(0);

const fn when(on: bool, bytes: &'static [u8]) -> &'static [u8] {
    if on { bytes } else { b"" }
}

/// End sync, reset SGR, then undo only what `modes` engaged: mouse off,
/// cursor shown, alternate screen left. Alternate screen exit is last so
/// the shell reappears clean.
fn emergency_sequence(modes: Modes) -> [&'static [u8]; 5] {
    [
        b"\x1b[?2026l",
        when(
            modes.contains(Modes::MOUSE),
            b"\x1b[?1006l\x1b[?1003l\x1b[?1002l\x1b[?1000l",
        ),
        b"\x1b[0m",
        when(modes.contains(Modes::CURSOR_HIDDEN), b"\x1b[?25h"),
        when(modes.contains(Modes::ALT_SCREEN), b"\x1b[?1049l"),
    ]
}

static PANIC_HOOK_INSTALLED: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            emergency_restore();
            original(info);
        }));
    });
}

fn emergency_restore() {
    let fd = ARMED_FD.swap(-1, Ordering::SeqCst);
    if fd < 0 {
        return;
    }
    let modes = Modes::from_bits_truncate(ARMED_MODES.swap(0, Ordering::SeqCst));
    #[cfg(unix)]
    for bytes in emergency_sequence(modes).iter().filter(|b| !b.is_empty()) {
        unsafe {
            let _ = libc::write(fd, bytes.as_ptr().cast::<libc::c_void>(), bytes.len());
        }
    }
    #[cfg(unix)]
    if let Ok(guard) = TERMIOS_BACKUP.lock() {
        if let Some((tty, ref original)) = *guard {
            unsafe {
                let _ = libc::tcsetattr(tty, libc::TCSANOW, original);
            }
        }
    }
}

// ─── Terminal ───────────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Terminal state changes that must be undone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modes: u8 {
        const RAW           = 1 << 0;
        const ALT_SCREEN    = 1 << 1;
        const CURSOR_HIDDEN = 1 << 2;
        const MOUSE         = 1 << 3;
    }
}

/// An output stream plus the record of what was changed on it.
pub struct Terminal {
    stream: Stream,
    caps: Capabilities,
    modes: Modes,
    #[cfg(unix)]
    original_termios: Option<libc::termios>,
}

impl Terminal {
    /// Wrap a stream. Engages nothing.
    #[must_use]
    pub const fn new(stream: Stream, caps: Capabilities) -> Self {
        Self {
            stream,
            caps,
            modes: Modes::empty(),
            #[cfg(unix)]
            original_termios: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    #[inline]
    #[must_use]
    pub const fn modes(&self) -> Modes {
        self.modes
    }

    #[must_use]
    pub fn is_tty(&self) -> bool {
        self.stream.is_tty()
    }

    /// Current size, if the stream is a terminal that reports one.
    #[must_use]
    pub fn size(&self) -> Option<Size> {
        self.stream.fd().filter(|&fd| is_tty(fd)).and_then(query_size)
    }

    /// Write and flush `bytes`.
    ///
    /// # Errors
    ///
    /// Returns the stream's error.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    /// The raw stream, for callers that batch their own output.
    pub fn stream(&mut self) -> &mut Stream {
        &mut self.stream
    }

    /// Let the panic hook restore this terminal.
    ///
    /// Only descriptor-backed terminal streams can be armed.
    pub fn arm_panic_restore(&self) {
        if let Some(fd) = self.stream.fd().filter(|&fd| is_tty(fd)) {
            install_panic_hook();
            ARMED_MODES.store(self.modes.bits(), Ordering::SeqCst);
            ARMED_FD.store(fd, Ordering::SeqCst);
        }
    }

    // ── Modes ───────────────────────────────────────────────────────

    /// Switch the tty into raw mode. No-op for non-terminals.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `tcgetattr`/`tcsetattr`.
    #[cfg(unix)]
    pub fn enable_raw_mode(&mut self) -> io::Result<()> {
        let Some(fd) = self.stream.fd().filter(|&fd| is_tty(fd)) else {
            return Ok(());
        };
        if self.modes.contains(Modes::RAW) {
            return Ok(());
        }

        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &raw mut termios) != 0 {
                return Err(io::Error::last_os_error());
            }
            self.original_termios = Some(termios);
            if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
                *guard = Some((fd, termios));
            }

            termios.c_iflag &= !(libc::IGNBRK
                | libc::BRKINT
                | libc::PARMRK
                | libc::ISTRIP
                | libc::INLCR
                | libc::IGNCR
                | libc::ICRNL
                | libc::IXON);
            termios.c_oflag &= !libc::OPOST;
            termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::IEXTEN);
            termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
            termios.c_cflag |= libc::CS8;
            termios.c_cc[libc::VMIN] = 1;
            termios.c_cc[libc::VTIME] = 0;

            if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const termios) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        self.engage(Modes::RAW);
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn enable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the stream's error; the mode is then not recorded.
    pub fn enter_alt_screen(&mut self) -> io::Result<()> {
        if self.modes.contains(Modes::ALT_SCREEN) {
            return Ok(());
        }
        // Recorded first: a partial write may already have switched screens.
        self.engage(Modes::ALT_SCREEN);
        ansi::enter_alt_screen(&mut self.stream)?;
        ansi::clear_screen(&mut self.stream)?;
        self.stream.flush()
    }

    /// Hide the cursor. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the stream's error.
    pub fn hide_cursor(&mut self) -> io::Result<()> {
        if self.modes.contains(Modes::CURSOR_HIDDEN) {
            return Ok(());
        }
        self.engage(Modes::CURSOR_HIDDEN);
        ansi::cursor_hide(&mut self.stream)?;
        self.stream.flush()
    }

    /// Show the cursor. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the stream's error; the cursor stays recorded as hidden.
    pub fn show_cursor(&mut self) -> io::Result<()> {
        if !self.modes.contains(Modes::CURSOR_HIDDEN) {
            return Ok(());
        }
        ansi::cursor_show(&mut self.stream)?;
        self.stream.flush()?;
        self.release(Modes::CURSOR_HIDDEN);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the stream's error.
    pub fn enable_mouse(&mut self, mode: ansi::MouseMode) -> io::Result<()> {
        self.engage(Modes::MOUSE);
        ansi::enable_mouse(&mut self.stream, mode)?;
        self.stream.flush()
    }

    /// # Errors
    ///
    /// Returns the stream's error.
    pub fn disable_mouse(&mut self) -> io::Result<()> {
        if !self.modes.contains(Modes::MOUSE) {
            return Ok(());
        }
        ansi::disable_mouse(&mut self.stream)?;
        self.stream.flush()?;
        self.release(Modes::MOUSE);
        Ok(())
    }

    fn engage(&mut self, modes: Modes) {
        self.modes.insert(modes);
        self.publish_modes();
    }

    fn release(&mut self, modes: Modes) {
        self.modes.remove(modes);
        self.publish_modes();
    }

    /// Keep the panic hook's view of the modes current while armed.
    fn publish_modes(&self) {
        if let Some(fd) = self.stream.fd() {
            if ARMED_FD.load(Ordering::SeqCst) == fd {
                ARMED_MODES.store(self.modes.bits(), Ordering::SeqCst);
            }
        }
    }

    /// Undo every engaged mode.
    ///
    /// Every step is attempted; the first error is returned. Afterwards no
    /// mode is recorded as engaged, whatever the outcome.
    ///
    /// # Errors
    ///
    /// The first stream or termios error encountered.
    pub fn restore(&mut self) -> io::Result<()> {
        let modes = self.modes;
        self.release(modes);
        let mut first_err: Option<io::Error> = None;
        let mut note = |r: io::Result<()>| {
            if let Err(e) = r {
                first_err.get_or_insert(e);
            }
        };

        if modes.intersects(Modes::ALT_SCREEN | Modes::CURSOR_HIDDEN | Modes::MOUSE) {
            if modes.contains(Modes::MOUSE) {
                note(ansi::disable_mouse(&mut self.stream));
            }
            note(ansi::reset(&mut self.stream));
            if modes.contains(Modes::CURSOR_HIDDEN) {
                note(ansi::cursor_show(&mut self.stream));
            }
            if modes.contains(Modes::ALT_SCREEN) {
                note(ansi::exit_alt_screen(&mut self.stream));
            }
            note(self.stream.flush());
        }

        if modes.contains(Modes::RAW) {
            note(self.restore_termios());
        }

        if let Some(fd) = self.stream.fd() {
            let _ = ARMED_FD.compare_exchange(fd, -1, Ordering::SeqCst, Ordering::SeqCst);
        }

        first_err.map_or(Ok(()), Err)
    }

    #[cfg(unix)]
    fn restore_termios(&mut self) -> io::Result<()> {
        let (Some(original), Some(fd)) = (self.original_termios.take(), self.stream.fd()) else {
            return Ok(());
        };
        if let Ok(mut guard) = TERMIOS_BACKUP.lock() {
            *guard = None;
        }
        if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &raw const original) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn restore_termios(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if !self.modes.is_empty() {
            let _ = self.restore();
        }
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("stream", &self.stream)
            .field("caps", &self.caps)
            .field("modes", &self.modes)
            .finish_non_exhaustive()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
