//! The writer: one lock around the whole per-line pipeline.
//!
//! Producers hand over raw logger lines. Per line the writer strips the
//! logger-managed header (prefix, date, time, `file:line`), short-circuits
//! suppressed levels, classifies the remainder, parses it into a message,
//! dispatches handlers, renders, and releases the message buffer — all
//! while holding the writer's mutex so concurrent producers serialize at
//! the sink.

use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::bytes::Regex;
use tracing::warn;

use keyval::Message;

use crate::handler::{Handler, Record};
use crate::level::{Effect, LevelTable, COLON_RE};
use crate::printer::{Entry, Printer};
use crate::term::{self, Sink};

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}/\d\d/\d\d").expect("date pattern"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d\d:\d\d:\d\d(\.\d+)?").expect("time pattern"));
static FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z]:)?[^:]+:\d+").expect("file pattern"));

/// The header layout a producer writes before the message, derived once
/// from that producer's logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFormat {
    /// Literal prefix before everything else.
    pub prefix: Option<String>,
    /// `YYYY/MM/DD` date field.
    pub date: bool,
    /// `HH:MM:SS[.ffffff]` time field.
    pub time: bool,
    /// `file:line` field.
    pub file: bool,
}

impl LineFormat {
    /// No header at all: lines are bare message text.
    pub fn new() -> Self {
        LineFormat::default()
    }

    /// Date and time, the usual logger default.
    pub fn standard() -> Self {
        LineFormat {
            date: true,
            time: true,
            ..LineFormat::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_date(mut self, on: bool) -> Self {
        self.date = on;
        self
    }

    pub fn with_time(mut self, on: bool) -> Self {
        self.time = on;
        self
    }

    pub fn with_file(mut self, on: bool) -> Self {
        self.file = on;
        self
    }

    /// Derive a layout by probing an observed line (prefixes cannot be
    /// inferred). Used on configuration drift.
    pub fn infer(line: &[u8]) -> LineFormat {
        let mut format = LineFormat::default();
        let mut rest = trim_left(line);
        if let Some(found) = DATE_RE.find(rest) {
            format.date = true;
            rest = trim_left(&rest[found.end()..]);
        }
        if let Some(found) = TIME_RE.find(rest) {
            format.time = true;
            rest = trim_left(&rest[found.end()..]);
        }
        if FILE_RE.find(rest).is_some() {
            format.file = true;
        }
        format
    }
}

struct Inner {
    sink: Box<dyn Sink>,
    printer: Printer,
    /// `None` until first use or configuration; defaults apply as late as
    /// possible so startup code can replace them first.
    levels: Option<LevelTable>,
    handlers: Vec<Box<dyn Handler>>,
}

/// Shared, internally-locked log writer. Clones refer to the same writer.
#[derive(Clone)]
pub struct Writer {
    inner: Arc<Mutex<Inner>>,
}

impl Writer {
    pub fn new(sink: impl Sink + 'static) -> Writer {
        let printer = Printer::for_sink(&sink);
        Writer {
            inner: Arc::new(Mutex::new(Inner {
                sink: Box::new(sink),
                printer,
                levels: None,
                handlers: Vec::new(),
            })),
        }
    }

    /// A writer on standard error.
    pub fn stderr() -> Writer {
        Writer::new(term::stderr())
    }

    /// Replace the sink; the printer is re-derived from its capabilities.
    pub fn set_output(&self, sink: impl Sink + 'static) {
        let mut inner = self.inner.lock();
        inner.printer = Printer::for_sink(&sink);
        inner.sink = Box::new(sink);
    }

    /// Force color output on or off.
    pub fn set_color(&self, on: bool) {
        self.inner.lock().printer.set_color(on);
    }

    /// The current level table as `(name, effect)` pairs.
    pub fn levels(&self) -> Vec<(String, String)> {
        let mut inner = self.inner.lock();
        inner
            .levels
            .get_or_insert_with(LevelTable::default_table)
            .config()
    }

    /// Replace the whole level table. Unknown effects are logged and act
    /// as no styling.
    pub fn set_levels(&self, levels: &[(String, String)]) {
        self.inner.lock().levels = Some(LevelTable::from_config(levels));
    }

    /// Set one level's effect, keeping the rest of the table.
    pub fn set_level(&self, name: &str, effect: &str) {
        let mut config = self.levels();
        match config
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = effect.to_string(),
            None => config.push((name.to_string(), effect.to_string())),
        }
        self.set_levels(&config);
    }

    /// Shorthand: suppress every line carrying one of these levels.
    pub fn suppress(&self, names: &[&str]) {
        for name in names {
            self.set_level(name, "hide");
        }
    }

    /// Whether a level name is currently suppressed.
    pub fn is_suppressed(&self, name: &str) -> bool {
        self.levels()
            .iter()
            .any(|(level, effect)| {
                level.eq_ignore_ascii_case(name)
                    && matches!(effect.parse::<Effect>(), Ok(Effect::Suppress))
            })
    }

    /// Register a best-effort observer for rendered entries.
    pub fn add_handler(&self, handler: impl Handler + 'static) {
        self.inner.lock().handlers.push(Box::new(handler));
    }

    /// A producer-side adapter that strips the given header layout from
    /// each line before it enters the pipeline.
    pub fn line_writer(&self, format: LineFormat) -> LineWriter {
        LineWriter {
            writer: self.clone(),
            format,
            pending: Vec::new(),
            drift_warned: false,
        }
    }

    /// Process one headerless line.
    pub fn write_line(&self, line: &[u8]) -> io::Result<()> {
        self.process("", &[], &[], &[], trim(line))
    }

    /// The serialized per-line pipeline: suppression check, level
    /// classification, parse, handler dispatch, render, release.
    fn process(
        &self,
        prefix: &str,
        date: &[u8],
        time: &[u8],
        file: &[u8],
        body: &[u8],
    ) -> io::Result<()> {
        let timestamp = Utc::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let levels: &LevelTable = inner.levels.get_or_insert_with(LevelTable::default_table);

        if levels.suppressed(body) {
            // fully consumed: no parse, no handlers, no output
            return Ok(());
        }

        let (level, effect, skip) = match levels.classify(body) {
            Some((level, effect, skip)) => (level, effect, skip),
            None => ("", &Effect::None, 0),
        };
        let body = &body[skip..];
        let mut message = Message::parse(body);

        if !inner.handlers.is_empty() {
            let mut record: Option<Record> = None;
            for handler in &inner.handlers {
                if !handler.handles(prefix, level) {
                    continue;
                }
                let record = record.get_or_insert_with(|| {
                    build_record(timestamp, prefix, file, level, &message)
                });
                if panic::catch_unwind(AssertUnwindSafe(|| handler.handle(record))).is_err() {
                    warn!("log handler panicked; continuing");
                }
            }
        }

        let entry = Entry {
            prefix,
            date,
            time,
            file,
            level,
            effect,
            message: &message,
        };
        let result = inner.printer.print(&mut *inner.sink, &entry);
        message.release();
        result
    }
}

fn build_record(
    timestamp: chrono::DateTime<Utc>,
    prefix: &str,
    file: &[u8],
    level: &str,
    message: &Message,
) -> Record {
    let mut list = Vec::with_capacity(message.pair_count() * 2);
    for (key, value) in message.pairs() {
        list.push(String::from_utf8_lossy(key).into_owned());
        list.push(String::from_utf8_lossy(value).into_owned());
    }
    Record {
        timestamp,
        prefix: prefix.to_string(),
        file: String::from_utf8_lossy(file).into_owned(),
        level: level.to_string(),
        text: String::from_utf8_lossy(message.text()).into_owned(),
        list,
    }
}

/// Producer-side adapter: splits a byte stream into lines, strips the
/// derived header layout, and feeds the writer. Implements
/// [`std::io::Write`] so it can serve as a logger output.
pub struct LineWriter {
    writer: Writer,
    format: LineFormat,
    pending: Vec<u8>,
    drift_warned: bool,
}

impl LineWriter {
    pub fn format(&self) -> &LineFormat {
        &self.format
    }

    fn process_line(&mut self, line: &[u8]) -> io::Result<()> {
        let mut rest = line;
        let mut prefix = "";
        let mut drift = false;

        if let Some(expected) = self.format.prefix.as_deref() {
            if rest.starts_with(expected.as_bytes()) {
                prefix = expected;
                rest = &rest[expected.len()..];
            } else {
                drift = true;
            }
        }
        rest = trim_left(rest);
        let probe = rest;

        let mut date: &[u8] = &[];
        if self.format.date {
            match DATE_RE.find(rest) {
                Some(found) => {
                    date = &rest[..found.end()];
                    rest = trim_left(&rest[found.end()..]);
                }
                None => drift = true,
            }
        }

        let mut time: &[u8] = &[];
        if self.format.time {
            match TIME_RE.find(rest) {
                Some(found) => {
                    time = &rest[..found.end()];
                    rest = trim_left(&rest[found.end()..]);
                }
                None => drift = true,
            }
        }

        let mut file: &[u8] = &[];
        if self.format.file {
            match FILE_RE.find(rest) {
                Some(found) => {
                    file = &rest[..found.end()];
                    rest = trim_left(&rest[found.end()..]);
                    if let Some(colon) = COLON_RE.find(rest) {
                        rest = &rest[colon.end()..];
                    }
                }
                None => drift = true,
            }
        }

        let result = self.writer.process(prefix, date, time, file, rest);

        if drift && !self.drift_warned {
            // configuration drift: adapt to what the producer actually
            // writes, say so once, and keep going
            self.drift_warned = true;
            let inferred = LineFormat {
                prefix: if prefix.is_empty() {
                    None
                } else {
                    self.format.prefix.clone()
                },
                ..LineFormat::infer(probe)
            };
            warn!(?inferred, "log line did not match the configured layout; adapting");
            self.format = inferred;
            let _ = self
                .writer
                .write_line(b"warning: log line layout changed; adapting to the observed layout");
        }

        result
    }
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(at) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=at).collect();
            self.process_line(trim(&line))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.process_line(trim(&line))?;
        }
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}


fn trim_left(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if matches!(first, b' ' | b'\t') {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

fn trim(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    trim_left(bytes)
}
