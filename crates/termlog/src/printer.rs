//! Line rendering.
//!
//! Two printers share one entry shape: the plain printer emits a single
//! logfmt-encoded line for non-terminal sinks, and the terminal printer
//! word-wraps to the sink's width with a hanging indent and optional ANSI
//! color. Either way a line is composed into one pooled buffer and written
//! with a single call, so concurrent producers can never interleave output.

use std::io;

use bstr::decode_utf8;
use unicode_width::UnicodeWidthChar;

use keyval::logfmt;
use keyval::pool;
use keyval::Message;

use crate::level::Effect;
use crate::term::{enable_ansi, Sink};

/// Fallback when the sink cannot report a width.
pub(crate) const DEFAULT_TERMINAL_WIDTH: usize = 120;

/// SGR parameters for the `file:line` segment.
const FILE_COLOR: &str = "90";
/// SGR parameters for the value half of each pair.
const VALUE_COLOR: &str = "96";

/// One line, assembled by the writer, consumed by a printer.
pub(crate) struct Entry<'a> {
    pub prefix: &'a str,
    pub date: &'a [u8],
    pub time: &'a [u8],
    pub file: &'a [u8],
    pub level: &'a str,
    pub effect: &'a Effect,
    pub message: &'a Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plain,
    Terminal,
}

pub(crate) struct Printer {
    mode: Mode,
    color: bool,
}

impl Printer {
    /// Pick the printer for a sink: wrapping and coloring for interactive
    /// terminals, one plain line otherwise.
    pub(crate) fn for_sink(sink: &dyn Sink) -> Printer {
        if sink.is_terminal() {
            Printer {
                mode: Mode::Terminal,
                color: enable_ansi(),
            }
        } else {
            Printer {
                mode: Mode::Plain,
                color: false,
            }
        }
    }

    pub(crate) fn set_color(&mut self, on: bool) {
        self.color = on;
    }

    pub(crate) fn print(&self, sink: &mut dyn Sink, entry: &Entry<'_>) -> io::Result<()> {
        match self.mode {
            Mode::Plain => self.print_plain(sink, entry),
            Mode::Terminal => self.print_terminal(sink, entry),
        }
    }

    fn print_plain(&self, sink: &mut dyn Sink, entry: &Entry<'_>) -> io::Result<()> {
        let mut buf = pool::acquire();
        let out = buf.bytes_mut();
        // no space after the prefix, matching how logger prefixes work
        out.extend_from_slice(entry.prefix.as_bytes());
        if !entry.date.is_empty() {
            out.extend_from_slice(entry.date);
            out.push(b' ');
        }
        if !entry.time.is_empty() {
            out.extend_from_slice(entry.time);
            out.push(b' ');
        }
        if !entry.file.is_empty() {
            out.extend_from_slice(entry.file);
            out.extend_from_slice(b": ");
        }
        if !entry.level.is_empty() {
            out.extend_from_slice(entry.level.as_bytes());
            out.extend_from_slice(b": ");
        }
        out.extend_from_slice(entry.message.text());
        for (key, value) in entry.message.pairs() {
            out.push(b' ');
            logfmt::write_bytes_pair(out, key, value);
        }
        out.push(b'\n');
        let result = sink.write_all(buf.bytes());
        pool::release(buf);
        result
    }

    fn print_terminal(&self, sink: &mut dyn Sink, entry: &Entry<'_>) -> io::Result<()> {
        // one less than the reported width; some terminals misrender when
        // written right up to the last column
        let queried = sink.width().map_or(DEFAULT_TERMINAL_WIDTH, usize::from);
        let width = if queried > 1 {
            queried - 1
        } else {
            DEFAULT_TERMINAL_WIDTH
        };

        let mut buf = pool::acquire();
        let mut line = Composer {
            out: buf.bytes_mut(),
            col: 0,
            indent: 0,
            color: self.color,
            infmt: false,
        };

        line.write(entry.prefix.as_bytes());
        if !entry.date.is_empty() {
            line.write(entry.date);
            line.write(b" ");
        }
        if !entry.time.is_empty() {
            line.write(entry.time);
            line.write(b" ");
        }

        // hanging indent for wrapped continuation lines
        line.indent = if line.col == 0 { 4 } else { line.col };

        if !entry.file.is_empty() {
            line.start_format(FILE_COLOR);
            line.write(entry.file);
            line.write(b": ");
            line.reset_format();
        }
        if !entry.level.is_empty() {
            if let Effect::Color(params) = entry.effect {
                line.start_format(params);
            }
            line.write(entry.level.as_bytes());
            line.write(b": ");
            line.reset_format();
        }

        // message text, word wrapped
        let mut input = entry.message.text();
        while !input.is_empty() {
            let ws = leading_whitespace(input);
            let had_ws = ws > 0;
            input = &input[ws..];

            let bs_len = leading_blackspace(input);
            let bs = &input[..bs_len];
            input = &input[bs_len..];

            // a single punctuation char after the run stays glued to it, so
            // comma-separated monsters wrap after their commas
            let mut punct: &[u8] = &[];
            if !input.is_empty() {
                let (ch, size) = decode_utf8(input);
                if !matches!(ch, Some(c) if c.is_whitespace()) {
                    punct = &input[..size];
                    input = &input[size..];
                }
            }

            if bs.is_empty() && punct.is_empty() {
                // trailing whitespace
                continue;
            }

            let needed = display_width(bs) + usize::from(had_ws) + display_width(punct);
            if needed + line.col > width {
                line.newline();
                line.write(bs);
            } else {
                if had_ws {
                    line.write(b" ");
                }
                line.write(bs);
            }
            line.write(punct);
        }

        // pairs wrap as atomic units, value portion colorized
        for (key, value) in entry.message.pairs() {
            let pair_width = display_width(key) + display_width(value) + 1;
            let ws_cost = usize::from(line.col > line.indent);
            if pair_width + ws_cost + line.col > width {
                line.newline();
            } else if ws_cost > 0 {
                line.write(b" ");
            }
            line.write(key);
            line.write(b"=");
            line.start_format(VALUE_COLOR);
            line.write(value);
            line.reset_format();
        }

        line.out.push(b'\n');
        let result = sink.write_all(buf.bytes());
        pool::release(buf);
        result
    }
}

/// Column-tracking assembly of one output line.
struct Composer<'a> {
    out: &'a mut Vec<u8>,
    col: usize,
    indent: usize,
    color: bool,
    infmt: bool,
}

impl Composer<'_> {
    fn write(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
        self.col += display_width(bytes);
    }

    fn newline(&mut self) {
        self.out.push(b'\n');
        self.out.extend(std::iter::repeat(b' ').take(self.indent));
        self.col = self.indent;
    }

    /// Escape codes are zero width; the column does not move.
    fn start_format(&mut self, params: &str) {
        if self.color {
            self.out.extend_from_slice(b"\x1b[0;");
            self.out.extend_from_slice(params.as_bytes());
            self.out.push(b'm');
            self.infmt = true;
        }
    }

    fn reset_format(&mut self) {
        if self.infmt {
            self.out.extend_from_slice(b"\x1b[0m");
            self.infmt = false;
        }
    }
}

/// Display columns of a byte run; invalid bytes count one column each.
fn display_width(bytes: &[u8]) -> usize {
    let mut width = 0;
    let mut rest = bytes;
    while !rest.is_empty() {
        let (ch, size) = decode_utf8(rest);
        width += ch.and_then(UnicodeWidthChar::width).unwrap_or(1);
        rest = &rest[size..];
    }
    width
}

/// Byte length of the leading whitespace run.
fn leading_whitespace(bytes: &[u8]) -> usize {
    let mut len = 0;
    while len < bytes.len() {
        let (ch, size) = decode_utf8(&bytes[len..]);
        match ch {
            Some(c) if c.is_whitespace() => len += size,
            _ => break,
        }
    }
    len
}

/// Byte length of the leading run of non-space, non-comma characters.
fn leading_blackspace(bytes: &[u8]) -> usize {
    let mut len = 0;
    while len < bytes.len() {
        let (ch, size) = decode_utf8(&bytes[len..]);
        match ch {
            Some(c) if c.is_whitespace() || c == ',' => break,
            _ => len += size,
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::FixedWidth;

    fn entry<'a>(message: &'a Message) -> Entry<'a> {
        Entry {
            prefix: "",
            date: &[],
            time: &[],
            file: &[],
            level: "",
            effect: &Effect::None,
            message,
        }
    }

    #[test]
    fn plain_printer_reencodes_pairs() {
        let message = Message::parse(br#"msg text key="a b""#);
        let printer = Printer {
            mode: Mode::Plain,
            color: false,
        };
        let mut sink = crate::term::Plain(Vec::new());
        printer.print(&mut sink, &entry(&message)).unwrap();
        assert_eq!(sink.0, b"msg text key=\"a b\"\n");
    }

    #[test]
    fn terminal_printer_wraps_with_hanging_indent() {
        let message =
            Message::parse(b"this is the message key1=value1 key2=value2 key3=value3");
        let printer = Printer {
            mode: Mode::Terminal,
            color: false,
        };
        let mut sink = FixedWidth::new(Vec::new(), 40);
        printer.print(&mut sink, &entry(&message)).unwrap();
        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "this is the message key1=value1\n    key2=value2 key3=value3\n"
        );
    }

    #[test]
    fn pairs_never_split_mid_pair() {
        let message = Message::parse(b"message alpha=0123456789 beta=0123456789");
        let printer = Printer {
            mode: Mode::Terminal,
            color: false,
        };
        let mut sink = FixedWidth::new(Vec::new(), 20);
        printer.print(&mut sink, &entry(&message)).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        for line in text.lines() {
            assert!(!line.ends_with('='), "split pair in {text:?}");
        }
        assert!(text.contains("alpha=0123456789"));
        assert!(text.contains("beta=0123456789"));
    }

    #[test]
    fn long_runs_wrap_after_commas() {
        let message = Message::parse(b"one,two,three four");
        let printer = Printer {
            mode: Mode::Terminal,
            color: false,
        };
        let mut sink = FixedWidth::new(Vec::new(), 10);
        printer.print(&mut sink, &entry(&message)).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        // the comma stays glued to the run before it
        assert_eq!(text, "one,two,\n    three\n    four\n");
    }

    #[test]
    fn zero_width_query_falls_back_to_default() {
        let message = Message::parse(b"hello");
        let printer = Printer {
            mode: Mode::Terminal,
            color: false,
        };
        let mut sink = FixedWidth::new(Vec::new(), 0);
        printer.print(&mut sink, &entry(&message)).unwrap();
        assert_eq!(sink.into_inner(), b"hello\n");
    }
}
