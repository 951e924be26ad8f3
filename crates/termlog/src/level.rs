//! Severity classification.
//!
//! A level table maps level names to display effects. At configuration time
//! the table splits into a suppress set and an ordered display list; per
//! line, the writer asks the table whether the leading `level:` prefix
//! suppresses the line or selects an effect.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use thiserror::Error;
use tracing::warn;

/// `: ` with optional surrounding whitespace, required after a level name.
pub(crate) static COLON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*:\s*").expect("colon pattern"));

/// Default level table, applied lazily when the caller configured nothing.
pub(crate) const DEFAULT_LEVELS: &[(&str, &str)] = &[
    ("trace", "none"),
    ("debug", "none"),
    ("info", "cyan"),
    ("warning", "yellow"),
    ("error", "red"),
    ("alert", "red"),
    ("fatal", "red"),
];

/// Display effect attached to a level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Display without styling.
    None,
    /// Drop the line entirely.
    Suppress,
    /// ANSI SGR parameters, e.g. `31` or `32;1`.
    Color(String),
}

/// The configured effect name was not recognized.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown effect {0:?}")]
pub struct ParseEffectError(pub String);

const COLOR_NAMES: &[(&str, &str)] = &[
    ("black", "30"),
    ("red", "31"),
    ("green", "32"),
    ("yellow", "33"),
    ("blue", "34"),
    ("magenta", "35"),
    ("cyan", "36"),
    ("white", "37"),
    ("gray", "1;30"),
    ("grey", "1;30"),
    ("bright black", "90"),
    ("bright red", "91"),
    ("bright green", "92"),
    ("bright yellow", "93"),
    ("bright blue", "94"),
    ("bright magenta", "95"),
    ("bright cyan", "96"),
    ("bright white", "37;1"),
];

impl FromStr for Effect {
    type Err = ParseEffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(Effect::None);
        }
        if ["hide", "suppress", "ignore"]
            .iter()
            .any(|alias| s.eq_ignore_ascii_case(alias))
        {
            return Ok(Effect::Suppress);
        }
        if let Some((_, params)) = COLOR_NAMES
            .iter()
            .find(|(name, _)| s.eq_ignore_ascii_case(name))
        {
            return Ok(Effect::Color((*params).to_string()));
        }
        if is_ansi_params(s) {
            return Ok(Effect::Color(s.to_string()));
        }
        Err(ParseEffectError(s.to_string()))
    }
}

/// Raw SGR parameter string: digit groups separated by `;`.
fn is_ansi_params(s: &str) -> bool {
    !s.is_empty()
        && s.split(';')
            .all(|group| !group.is_empty() && group.bytes().all(|b| b.is_ascii_digit()))
}

struct LevelInfo {
    name: String,
    effect: Effect,
}

/// Level table split for per-line matching.
pub(crate) struct LevelTable {
    /// Levels whose lines are dropped before any further work.
    suppress: Vec<String>,
    /// Ordered display list; first match wins.
    display: Vec<LevelInfo>,
    /// The configuration as given, for read-back.
    config: Vec<(String, String)>,
}

impl LevelTable {
    pub(crate) fn from_config(levels: &[(String, String)]) -> LevelTable {
        let mut table = LevelTable {
            suppress: Vec::new(),
            display: Vec::new(),
            config: Vec::with_capacity(levels.len()),
        };
        for (name, effect_str) in levels {
            let name = name.trim().trim_end_matches([':', ' ']).to_string();
            let effect = match effect_str.parse::<Effect>() {
                Ok(effect) => effect,
                Err(err) => {
                    warn!(level = name.as_str(), %err, "ignoring unknown level effect");
                    Effect::None
                }
            };
            table.config.push((name.clone(), effect_str.clone()));
            match effect {
                Effect::Suppress => table.suppress.push(name),
                effect => table.display.push(LevelInfo { name, effect }),
            }
        }
        table
    }

    pub(crate) fn default_table() -> LevelTable {
        let config: Vec<(String, String)> = DEFAULT_LEVELS
            .iter()
            .map(|(name, effect)| ((*name).to_string(), (*effect).to_string()))
            .collect();
        LevelTable::from_config(&config)
    }

    pub(crate) fn config(&self) -> Vec<(String, String)> {
        self.config.clone()
    }

    /// Whether the line starts with a suppressed level and its colon.
    pub(crate) fn suppressed(&self, line: &[u8]) -> bool {
        self.suppress
            .iter()
            .any(|name| match_level(line, name).is_some())
    }

    /// First display level matching the line's prefix. Returns the level
    /// name, its effect, and the byte count to strip (name plus colon).
    pub(crate) fn classify(&self, line: &[u8]) -> Option<(&str, &Effect, usize)> {
        for info in &self.display {
            if let Some(skip) = match_level(line, &info.name) {
                return Some((&info.name, &info.effect, skip));
            }
        }
        None
    }
}

/// Case-insensitive `name` prefix followed by `: `; returns bytes to strip.
fn match_level(line: &[u8], name: &str) -> Option<usize> {
    let n = name.len();
    if line.len() <= n || !line[..n].eq_ignore_ascii_case(name.as_bytes()) {
        return None;
    }
    COLON_RE.find(&line[n..]).map(|m| n + m.end())
}
