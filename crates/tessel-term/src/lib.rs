// SPDX-License-Identifier: MIT
//
// tessel-term: terminal plumbing for the tessel compositor.
//
// Leaf-first:
//
//   channel  → packed foreground/background colour state (pure data)
//   egc      → inline grapheme clusters and display width
//   color    → resolved cell colours, palette, depth quantization
//   cell     → one composited screen position
//   frame    → the screen as a grid of cells, wide-cluster aware
//   ansi     → escape sequence encoders
//   output   → frame-sized output buffer and the minimal-escape cell writer
//   diff     → previous-frame differential renderer
//   terminal → output streams, capability detection, termios and mode restore
//   reader   → input byte sources with a readiness wait
//   input    → raw input bytes to numbered key and mouse events

pub mod ansi;
pub mod cell;
pub mod channel;
pub mod color;
pub mod diff;
pub mod egc;
pub mod frame;
pub mod input;
pub mod output;
pub mod reader;
pub mod terminal;
