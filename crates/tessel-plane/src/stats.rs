// SPDX-License-Identifier: MIT
//
// Running totals over a context's renders.

use std::fmt;

use tessel_term::diff::RenderStats;

/// Counters accumulated since the context started or
/// [`reset_stats`](crate::Context::reset_stats) was last called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Renders that reached the terminal.
    pub renders: u64,
    /// Renders whose output could not be written.
    pub failed_renders: u64,
    /// Renders that redrew the whole screen.
    pub full_redraws: u64,
    pub bytes_total: u64,
    /// Largest single render, in bytes.
    pub bytes_max: usize,
    /// Smallest single render, in bytes; `None` before the first render.
    pub bytes_min: Option<usize>,
    /// Cells that differed from the previous frame.
    pub cells_emitted: u64,
    /// Cells left alone because they had not changed.
    pub cells_elided: u64,
}

impl Stats {
    pub(crate) fn record(&mut self, pass: &RenderStats) {
        self.renders += 1;
        if pass.full_redraw {
            self.full_redraws += 1;
        }
        self.bytes_total += pass.bytes_written as u64;
        self.bytes_max = self.bytes_max.max(pass.bytes_written);
        self.bytes_min = Some(
            self.bytes_min
                .map_or(pass.bytes_written, |min| min.min(pass.bytes_written)),
        );
        self.cells_emitted += pass.cells_rendered as u64;
        self.cells_elided += pass.cells_skipped as u64;
    }

    pub(crate) const fn record_failure(&mut self) {
        self.failed_renders += 1;
    }

    /// Mean bytes per successful render.
    #[must_use]
    pub fn bytes_mean(&self) -> Option<u64> {
        self.bytes_total.checked_div(self.renders)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} renders ({} failed, {} full), {} bytes (max {}, min {}), {} cells emitted, {} elided",
            self.renders,
            self.failed_renders,
            self.full_redraws,
            self.bytes_total,
            self.bytes_max,
            self.bytes_min.unwrap_or(0),
            self.cells_emitted,
            self.cells_elided,
        )
    }
}
