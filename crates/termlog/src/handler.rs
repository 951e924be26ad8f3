//! Structured observers of the log stream.
//!
//! Handlers see every line the writer renders (never suppressed ones).
//! They are best-effort: a panicking handler is isolated and cannot fail
//! the render, and the [`Record`] owns all its data so a handler that
//! retains one keeps a copy by construction.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Owned snapshot of one log entry, built at most once per line and shared
/// by every accepting handler.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    /// When the writer received the line.
    pub timestamp: DateTime<Utc>,
    /// Producer prefix stripped from the line, if any.
    pub prefix: String,
    /// `file:line` stripped from the line, if any.
    pub file: String,
    /// Matched level name; empty when no level matched.
    pub level: String,
    /// Message text.
    pub text: String,
    /// Alternating key/value strings from the parsed message.
    pub list: Vec<String>,
}

/// Interface for handling structured messages emitted through a writer.
pub trait Handler: Send {
    /// Whether this handler wants entries with the given prefix and level.
    /// When no registered handler does, the record is never built.
    fn handles(&self, prefix: &str, level: &str) -> bool;

    /// Observe one entry.
    fn handle(&self, record: &Record);
}
