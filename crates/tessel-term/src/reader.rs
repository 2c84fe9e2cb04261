// SPDX-License-Identifier: MIT
//
// Input byte sources with a readiness wait.
//
// Safety: `poll` on the source descriptor, and wrapping a caller-supplied
// descriptor in a `File` that is never closed.
#![allow(unsafe_code)]
//
// Descriptor sources are read unbuffered, so a readiness poll on the
// descriptor tells the whole truth. The wait is what resolves a lone ESC:
// if nothing follows within a few milliseconds it was the Escape key.

use std::fs::File;
use std::io::{self, Read};
use std::mem::ManuallyDrop;

use crate::terminal::Fd;
#[cfg(unix)]
use crate::terminal::fd_is_open;

#[cfg(unix)]
const STDIN_FD: Fd = 0;

/// Where input bytes come from.
pub enum InputStream {
    /// A descriptor we read but never close.
    Fd(Fd, ManuallyDrop<File>),
    /// Any reader. Always reported ready.
    Reader(Box<dyn Read>),
}

impl InputStream {
    /// Process standard input, read unbuffered.
    ///
    /// # Errors
    ///
    /// `EBADF` if standard input is closed.
    #[cfg(unix)]
    pub fn stdin() -> io::Result<Self> {
        Self::from_fd(STDIN_FD)
    }

    #[cfg(not(unix))]
    pub fn stdin() -> io::Result<Self> {
        Ok(Self::Reader(Box::new(io::stdin())))
    }

    /// Read from a caller-owned descriptor.
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
        // Open, and the File is never dropped.
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
            Self::Fd(fd, _) => Some(*fd),
            Self::Reader(_) => None,
        }
    }

    /// Wait up to `timeout_ms` for bytes. `Ok(false)` on timeout.
    ///
    /// Readers have no readiness to wait on and report `true`; their
    /// `read` blocks or returns EOF on its own.
    ///
    /// # Errors
    ///
    /// Whatever `poll` reports, except `EINTR`, which counts as a timeout.
    #[cfg(unix)]
    pub fn wait_readable(&self, timeout_ms: i32) -> io::Result<bool> {
        let Some(fd) = self.fd() else {
            return Ok(true);
        };
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&raw mut pfd, 1, timeout_ms) };
        match ready {
            0 => Ok(false),
            n if n > 0 => Ok(true),
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    #[cfg(not(unix))]
    pub fn wait_readable(&self, _timeout_ms: i32) -> io::Result<bool> {
        Ok(true)
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Fd(_, file) => file.read(buf),
            Self::Reader(r) => r.read(buf),
        }
    }
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fd(fd, _) => write!(f, "Fd({fd})"),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reader_is_always_ready() {
        let stream = InputStream::Reader(Box::new(io::empty()));
        assert_eq!(stream.fd(), None);
        assert!(stream.wait_readable(0).unwrap());
    }

    #[test]
    fn reader_passes_bytes_through() {
        let mut stream = InputStream::Reader(Box::new(io::Cursor::new(b"abc".to_vec())));
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn closed_descriptor_is_rejected() {
        let err = InputStream::from_fd(-1).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[cfg(unix)]
    #[test]
    fn pipe_readiness_follows_writes() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let mut stream = InputStream::from_fd(fds[0]).unwrap();
        assert!(!stream.wait_readable(0).unwrap());

        let written = unsafe { libc::write(fds[1], b"\x1b".as_ptr().cast(), 1) };
        assert_eq!(written, 1);
        assert!(stream.wait_readable(100).unwrap());
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x1B);

        drop(stream);
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
