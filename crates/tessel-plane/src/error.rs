// SPDX-License-Identifier: MIT
//
// Error types for tessel-plane.

use std::io;

use tessel_term::channel::ChannelError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a context, plane or direct session can fail with.
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter was out of range or the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ArgumentError),

    /// The context or session could not be created or activated.
    #[error("initialization failed: {reason}")]
    InitializationFailed {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The handle was never bound to a live object.
    #[error("handle is not attached to a live object")]
    Unattached,

    /// The handle's object has been destroyed.
    #[error("handle refers to a destroyed object")]
    UseAfterFree,

    /// Writing to the output stream failed.
    #[error("write failed: {0}")]
    WriteFailed(#[from] io::Error),

    /// Text ran past the edge of the plane. `written` cells were stored
    /// before the edge was reached.
    #[error("write ran out of bounds after {written} cells")]
    WriteOutOfBounds { written: usize },

    /// The terminal could not show or hide the cursor.
    #[error("cursor control failed: {reason}")]
    CursorControlFailed {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Reading input failed.
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// The input source reached end of file with nothing left to decode.
    #[error("input closed")]
    InputClosed,

    /// Teardown was requested a second time.
    #[error("already torn down")]
    DoubleTeardown,
}

impl Error {
    pub(crate) fn init(reason: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::InitializationFailed {
            reason: reason.into(),
            source,
        }
    }

    pub(crate) fn cursor(reason: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::CursorControlFailed {
            reason: reason.into(),
            source,
        }
    }
}

impl From<ChannelError> for Error {
    fn from(err: ChannelError) -> Self {
        Self::InvalidArgument(ArgumentError::Channel(err))
    }
}

/// The detail behind [`Error::InvalidArgument`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("plane size {rows}x{cols} must be positive")]
    Geometry { rows: u16, cols: u16 },

    #[error("position ({row}, {col}) is outside the plane")]
    Position { row: u32, col: u32 },

    #[error("the root plane cannot be destroyed")]
    DestroyRoot,

    #[error("a base cell must be one column wide, not {0}")]
    BaseWidth(u8),

    #[error("a fill glyph must be one column wide, not {0}")]
    FillWidth(u8),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn io_converts_to_write_failed() {
        let err: Error = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, Error::WriteFailed(_)));
        assert!(err.to_string().starts_with("write failed"));
    }

    #[test]
    fn channel_error_converts_to_invalid_argument() {
        let err: Error = ChannelError::PaletteIndex(300).into();
        assert!(matches!(
            err,
            Error::InvalidArgument(ArgumentError::Channel(ChannelError::PaletteIndex(300)))
        ));
        assert_eq!(
            err.to_string(),
            "invalid argument: palette index 300 is outside 0..=255"
        );
    }

    #[test]
    fn messages() {
        assert_eq!(
            Error::WriteOutOfBounds { written: 3 }.to_string(),
            "write ran out of bounds after 3 cells"
        );
        assert_eq!(
            Error::init("not a terminal", None).to_string(),
            "initialization failed: not a terminal"
        );
        assert_eq!(
            Error::from(ArgumentError::Geometry { rows: 0, cols: 4 }).to_string(),
            "invalid argument: plane size 0x4 must be positive"
        );
    }

    #[test]
    fn sources_are_chained() {
        use std::error::Error as _;
        let err = Error::cursor("write", Some(io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(err.source().is_some());
        assert!(Error::DoubleTeardown.source().is_none());
        let read = Error::ReadFailed(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(read.source().is_some());
        assert!(Error::InputClosed.source().is_none());
    }
}
