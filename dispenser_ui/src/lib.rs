#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! `Display` backends for the dispenser.
//!
//! - [`TerminalDisplay`]: framed two-line blocks on any `io::Write`
//! - [`LcdDisplay`]: 16x2 character panel emulation around another display
//! - [`LogDisplay`]: screens as `tracing` events

use std::io::{self, Write};

use dispenser_traits::Display;

/// Width of the character panel the screens are written for.
pub const LCD_COLS: usize = 16;

const FRAME_WIDTH: usize = 40;

/// Screens shown once at start-up.
pub const SPLASH: [(&str, &str); 2] = [
    ("=== DAILY DOSE ===", "   Pill System"),
    ("Welcome!", "Daily Dose :)"),
];

/// First `cols` characters of `s`, padded with spaces to exactly `cols`.
pub fn fit_line(s: &str, cols: usize) -> String {
    let mut out: String = s.chars().take(cols).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat_n(' ', cols - len));
    out
}

/// Prints every screen between two rules of `=`.
pub struct TerminalDisplay<W: Write> {
    out: W,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_frame(&mut self, line1: &str, line2: &str) -> io::Result<()> {
        let rule = "=".repeat(FRAME_WIDTH);
        writeln!(self.out)?;
        writeln!(self.out, "{rule}")?;
        writeln!(self.out, "{line1}")?;
        if !line2.is_empty() {
            writeln!(self.out, "{line2}")?;
        }
        writeln!(self.out, "{rule}")?;
        self.out.flush()
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn render(&mut self, line1: &str, line2: &str) {
        if let Err(e) = self.write_frame(line1, line2) {
            tracing::debug!(error = %e, "terminal display write failed");
        }
    }
}

/// Clips both lines to the panel width before handing them on.
///
/// Remembers the visible contents so tests and status output can read the
/// panel back.
pub struct LcdDisplay<D: Display> {
    inner: D,
    cols: usize,
    shown: [String; 2],
}

impl<D: Display> LcdDisplay<D> {
    pub fn new(inner: D) -> Self {
        Self::with_cols(inner, LCD_COLS)
    }

    pub fn with_cols(inner: D, cols: usize) -> Self {
        Self {
            inner,
            cols: cols.max(1),
            shown: [" ".repeat(cols.max(1)), " ".repeat(cols.max(1))],
        }
    }

    /// Both rows as they currently appear, padded to the panel width.
    pub fn shown(&self) -> (&str, &str) {
        (&self.shown[0], &self.shown[1])
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Display> Display for LcdDisplay<D> {
    fn render(&mut self, line1: &str, line2: &str) {
        self.shown = [fit_line(line1, self.cols), fit_line(line2, self.cols)];
        self.inner
            .render(self.shown[0].trim_end(), self.shown[1].trim_end());
    }
}

/// Emits one `info` event per screen.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

impl Display for LogDisplay {
    fn render(&mut self, line1: &str, line2: &str) {
        tracing::info!(target: "dispenser::display", line1, line2, "screen");
    }
}
