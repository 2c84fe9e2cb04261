// SPDX-License-Identifier: MIT
//
// tessel: demo driver for the plane compositor and the direct-mode writer.
//
//   tessel-term  → channels, graphemes, frame diffing, terminal guard
//   tessel-plane → planes, render context, direct session
//
// Each demo draws once, then tears the terminal back down. The plane demos
// wait for a key first, or hold for a moment when stdin has nothing to give:
//
//   gradient → clipped RGB ramp across the root plane
//   planes   → overlapping children with blended and high-contrast channels
//   direct   → styled lines written straight to the terminal
//
// Set TESSEL_LOG (an env-filter directive such as `debug`) to get engine
// events on stderr.

use std::env;
use std::process;
use std::thread;
use std::time::Duration;

use tessel_plane::{
    Align, Context, ContextOptions, DirectOptions, DirectSession, Error, LogLevel, PlaneHandle,
    Result,
};
use tessel_term::cell::Attr;
use tessel_term::channel::{Alpha, Channels};

const HOLD: Duration = Duration::from_millis(1500);

const USAGE: &str = "\
usage: tessel [gradient|planes|direct]

  gradient   draw a clipped RGB gradient on the root plane (default)
  planes     stack overlapping child planes
  direct     print styled lines without planes

The plane demos stay up until a key is pressed.

options:
  -h, --help      show this help
  -V, --version   show the version

environment:
  TESSEL_LOG      tracing filter for engine events, written to stderr";

// ─── Arguments ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demo {
    Gradient,
    Planes,
    Direct,
}

#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Run(Demo),
    Help,
    Version,
}

fn parse_args(args: &[String]) -> std::result::Result<Invocation, String> {
    match args {
        [] => Ok(Invocation::Run(Demo::Gradient)),
        [arg] => match arg.as_str() {
            "gradient" => Ok(Invocation::Run(Demo::Gradient)),
            "planes" => Ok(Invocation::Run(Demo::Planes)),
            "direct" => Ok(Invocation::Run(Demo::Direct)),
            "-h" | "--help" => Ok(Invocation::Help),
            "-V" | "--version" => Ok(Invocation::Version),
            other => Err(format!("unknown argument '{other}'")),
        },
        _ => Err("expected at most one argument".into()),
    }
}

// ─── Logging ────────────────────────────────────────────────────────────────

fn init_logging() -> LogLevel {
    let Ok(filter) = env::var("TESSEL_LOG") else {
        return LogLevel::Silent;
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    LogLevel::Trace
}

// ─── Drawing ────────────────────────────────────────────────────────────────

/// Fill `plane` with a ramp whose components overshoot 255 and get clipped.
fn draw_gradient(plane: &PlaneHandle) -> Result<()> {
    let (rows, cols) = plane.dimensions()?;
    let span = |i: u16, n: u16| i32::from(i) * 320 / i32::from(n.max(2) - 1);
    for row in 0..rows {
        for col in 0..cols {
            let r = span(col, cols);
            let g = span(row, rows);
            let b = 320 - r;
            plane.set_bg_rgb8_clipped(r, g, b)?;
            plane.set_fg_rgb8_clipped(255 - r, 255 - g, 255 - b)?;
            plane.put_text_at(row, col, " ")?;
        }
    }
    plane.set_channels(Channels::new())?;
    plane.put_text_aligned(rows / 2, Align::Center, " tessel ")?;
    Ok(())
}

/// Three overlapping panels: opaque, blended and a high-contrast label.
fn draw_planes(root: &PlaneHandle) -> Result<()> {
    let (rows, cols) = root.dimensions()?;
    let h = (rows / 2).max(3);
    let w = (cols / 3).max(12);
    let step = |n: u16| i32::from(n / 4);

    let mut opaque = Channels::new();
    opaque.set_bg_rgb8(40, 60, 160)?;
    let back = root.create_child(1, 2, h, w)?;
    back.set_base(" ", opaque, Attr::empty())?;
    back.set_channels(opaque)?;
    back.set_fg_rgb8(255, 255, 255)?;
    back.put_text_at(0, 1, "opaque")?;
    back.polyfill(h - 1, w - 1, "░")?;

    let mut tint = Channels::new();
    tint.set_bg_rgb8(200, 40, 40)?;
    tint.set_bg_alpha(Alpha::Blend)?;
    let middle = root.create_child(1 + step(h), 2 + step(w) * 2, h, w)?;
    middle.set_base("", tint, Attr::empty())?;
    middle.set_fg_default()?;
    middle.put_text_at(0, 1, "blend")?;

    let front = root.create_child(1 + step(h) * 2, 2 + step(w) * 4, 3, w)?;
    front.set_bg_rgb8(230, 200, 60)?;
    front.set_fg_alpha(Alpha::HighContrast)?;
    front.set_styles(Attr::BOLD)?;
    front.put_text_aligned(1, Align::Center, "high contrast")?;
    Ok(())
}

fn run_context(demo: Demo, log_level: LogLevel) -> Result<()> {
    let mut ctx = Context::new(ContextOptions {
        log_level,
        ..ContextOptions::default()
    })?;
    let root = ctx.root_plane();
    match demo {
        Demo::Planes => draw_planes(&root)?,
        _ => draw_gradient(&root)?,
    }
    ctx.render()?;
    wait_for_key(&mut ctx)?;
    ctx.stop()
}

fn wait_for_key(ctx: &mut Context) -> Result<()> {
    match ctx.get_input_blocking() {
        Ok(input) => {
            tracing::debug!(code = %input.key, seqnum = input.seqnum, "key pressed");
            Ok(())
        }
        Err(Error::InputClosed) => {
            thread::sleep(HOLD);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Lines of styled text, one per colour path.
fn write_lines(session: &mut DirectSession) -> Result<usize> {
    let mut sent = session.write_text("tessel direct mode\n", None)?;

    let mut rgb = Channels::new();
    rgb.set_fg_rgb8(120, 200, 255)?;
    sent += session.write_text("  24-bit foreground\n", Some(rgb))?;

    let mut palette = Channels::new();
    palette.set_fg_palindex(0)?;
    palette.set_bg_palindex(214)?;
    sent += session.write_text("  palette pair\n", Some(palette))?;

    let mut clipped = Channels::new();
    clipped.set_fg_rgb8_clipped(300, -20, 180);
    sent += session.write_text("  clipped components\n", Some(clipped))?;
    Ok(sent)
}

fn run_direct(log_level: LogLevel) -> Result<()> {
    let mut session = DirectSession::start(DirectOptions {
        log_level,
        ..DirectOptions::default()
    })?;
    write_lines(&mut session)?;
    session.flush()?;
    session.deactivate()
}

// ─── Entry ──────────────────────────────────────────────────────────────────

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let demo = match parse_args(&args) {
        Ok(Invocation::Run(demo)) => demo,
        Ok(Invocation::Help) => {
            println!("{USAGE}");
            return;
        }
        Ok(Invocation::Version) => {
            println!("tessel {}", tessel_plane::version());
            return;
        }
        Err(msg) => {
            eprintln!("tessel: {msg}\n\n{USAGE}");
            process::exit(2);
        }
    };

    let log_level = init_logging();
    let outcome = match demo {
        Demo::Direct => run_direct(log_level),
        _ => run_context(demo, log_level),
    };

    if let Err(e) = outcome {
        tracing::error!(error = %e, "demo failed");
        eprintln!("tessel: {e}");
        process::exit(1);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessel_plane::{InitFlags, InputSource, Output};
    use tessel_term::terminal::{SharedBuffer, Size};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn context(rows: u16, cols: u16) -> (Context, SharedBuffer) {
        let buf = SharedBuffer::new();
        let ctx = Context::new(ContextOptions {
            output: Output::Writer(Box::new(buf.clone())),
            input: InputSource::Reader(Box::new(std::io::Cursor::new(b"q".to_vec()))),
            term_type: Some("xterm-direct".into()),
            fallback_size: Some(Size::new(rows, cols)),
            flags: InitFlags::NO_PANIC_HOOK,
            log_level: LogLevel::Silent,
            ..ContextOptions::default()
        })
        .unwrap();
        (ctx, buf)
    }

    #[test]
    fn no_argument_runs_gradient() {
        assert_eq!(parse_args(&[]), Ok(Invocation::Run(Demo::Gradient)));
    }

    #[test]
    fn demo_names() {
        assert_eq!(parse_args(&args(&["planes"])), Ok(Invocation::Run(Demo::Planes)));
        assert_eq!(parse_args(&args(&["direct"])), Ok(Invocation::Run(Demo::Direct)));
        assert_eq!(parse_args(&args(&["--help"])), Ok(Invocation::Help));
        assert_eq!(parse_args(&args(&["-V"])), Ok(Invocation::Version));
    }

    #[test]
    fn bad_arguments() {
        assert!(parse_args(&args(&["spiral"])).is_err());
        assert!(parse_args(&args(&["planes", "direct"])).is_err());
    }

    #[test]
    fn gradient_fills_and_labels_root() {
        let (mut ctx, buf) = context(5, 20);
        let root = ctx.root_plane();
        draw_gradient(&root).unwrap();
        let corner = root.cell_at(0, 19).unwrap();
        assert_eq!(corner.channels.bg().components(), (255, 0, 0));
        assert_eq!(root.cell_at(2, 7).unwrap().egc.as_str(), "t");
        ctx.render().unwrap();
        assert!(buf.text().contains("tessel"));
    }

    #[test]
    fn planes_stack_three_children() {
        let (mut ctx, buf) = context(12, 40);
        let root = ctx.root_plane();
        draw_planes(&root).unwrap();
        ctx.render().unwrap();
        let out = buf.text();
        assert!(out.contains("opaque"));
        assert!(out.contains("high contrast"));
        assert!(out.contains('░'));
    }

    #[test]
    fn key_ends_the_wait() {
        let (mut ctx, _buf) = context(2, 2);
        wait_for_key(&mut ctx).unwrap();
        assert!(matches!(ctx.get_input_blocking(), Err(Error::InputClosed)));
    }

    #[test]
    fn direct_lines_are_styled() {
        let buf = SharedBuffer::new();
        let mut session = DirectSession::start(DirectOptions {
            output: Output::Writer(Box::new(buf.clone())),
            term_type: Some("xterm-direct".into()),
            log_level: LogLevel::Silent,
            ..DirectOptions::default()
        })
        .unwrap();
        let sent = write_lines(&mut session).unwrap();
        let out = buf.text();
        assert!(out.contains("\x1b[38;2;120;200;255m"));
        assert!(out.contains("\x1b[38;2;255;0;180m"));
        assert!(sent > "tessel direct mode\n".len());
    }
}
