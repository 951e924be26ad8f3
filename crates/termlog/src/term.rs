//! Terminal capability shim.
//!
//! The renderer never touches the OS directly; it sees a [`Sink`], which is
//! a byte sink that may know whether it is an interactive terminal and how
//! wide it currently is. Probing is backed by `crossterm` for the standard
//! streams.

use std::io::{self, Write};

use crossterm::tty::IsTty;

/// A byte sink with optional terminal capabilities.
pub trait Sink: Write + Send {
    /// Whether the sink is an interactive terminal.
    fn is_terminal(&self) -> bool {
        false
    }

    /// Current column width. `None` when unknown or not a terminal.
    fn width(&self) -> Option<u16> {
        None
    }
}

/// Best-effort: ensure the terminal interprets ANSI escape sequences.
/// Returns whether colored output is worth emitting.
pub(crate) fn enable_ansi() -> bool {
    #[cfg(windows)]
    {
        crossterm::ansi_support::supports_ansi()
    }
    #[cfg(not(windows))]
    {
        true
    }
}

/// Standard error as a sink.
pub struct Stderr(io::Stderr);

/// Standard error, probed for terminal capabilities.
pub fn stderr() -> Stderr {
    Stderr(io::stderr())
}

impl Write for Stderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Sink for Stderr {
    fn is_terminal(&self) -> bool {
        self.0.is_tty()
    }

    fn width(&self) -> Option<u16> {
        crossterm::terminal::size().ok().map(|(width, _)| width)
    }
}

/// Standard output as a sink.
pub struct Stdout(io::Stdout);

/// Standard output, probed for terminal capabilities.
pub fn stdout() -> Stdout {
    Stdout(io::stdout())
}

impl Write for Stdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Sink for Stdout {
    fn is_terminal(&self) -> bool {
        self.0.is_tty()
    }

    fn width(&self) -> Option<u16> {
        crossterm::terminal::size().ok().map(|(width, _)| width)
    }
}

/// Any plain writer as a sink; never a terminal.
pub struct Plain<W: Write + Send>(pub W);

impl<W: Write + Send> Write for Plain<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write + Send> Sink for Plain<W> {}

/// A writer treated as a terminal with a fixed width. Useful when the
/// caller knows the layout better than the probe (pagers, test captures).
pub struct FixedWidth<W: Write + Send> {
    inner: W,
    width: u16,
}

impl<W: Write + Send> FixedWidth<W> {
    pub fn new(inner: W, width: u16) -> Self {
        FixedWidth { inner, width }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> Write for FixedWidth<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Sink for FixedWidth<W> {
    fn is_terminal(&self) -> bool {
        true
    }

    fn width(&self) -> Option<u16> {
        Some(self.width)
    }
}
