// SPDX-License-Identifier: MIT
//
// tessel-plane: plane compositing and direct-mode output for terminals.
//
// Built on tessel-term's plumbing:
//
//   error    → Error, ArgumentError, Result
//   options  → ContextOptions, DirectOptions, Output, InputSource, Margins,
//              LogLevel
//   plane    → plane arena, PlaneHandle, PlaneCell
//   compose  → flattens the plane tree into a frame
//   stats    → render counters
//   context  → Context: owns the terminal, the planes, the renderer and
//              the input decoder
//   direct   → DirectSession: immediate writes without planes
//
// A Context and a DirectSession must not share a terminal at the same
// time. Nothing here is Send: handles point into a single-threaded arena.

/// Emit a `tracing` event when the given `LogLevel` lets it through.
macro_rules! log_at {
    ($cap:expr, $level:ident, $($arg:tt)+) => {
        if $cap.allows(::tracing::Level::$level) {
            ::tracing::event!(::tracing::Level::$level, $($arg)+);
        }
    };
}

mod compose;
pub mod context;
pub mod direct;
pub mod error;
pub mod options;
pub mod plane;
pub mod stats;

pub use context::Context;
pub use direct::DirectSession;
pub use error::{ArgumentError, Error, Result};
pub use options::{
    ContextOptions, DirectOptions, InitFlags, InputSource, LogLevel, Margins, Output,
};
pub use plane::{Align, PlaneCell, PlaneHandle, PlaneId};
pub use stats::Stats;
pub use tessel_term::input::{Input, Key, Modifiers, MouseButton};

/// Version of this crate.
#[must_use]
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
