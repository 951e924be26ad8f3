//! Argument-list normalization.
//!
//! Logging call sites pass loosely structured argument lists: a bare message
//! string, a trailing un-keyed value, maps, explicit pairs, nested lists.
//! [`flatten`] turns any of those into a strictly alternating key/value
//! sequence, inferring a name for every orphaned value.
//!
//! Output invariant: even length, with a `Value::Str` key at every even
//! index.

use crate::value::{Class, Value};

/// Key names common enough to be trusted as keys when repairing a run.
const KNOWN_KEYS: &[&str] = &[
    "msg", "message", "level", "error", "err", "id", "time", "ts", "code", "status", "addr",
    "transport", "method", "path", "request", "user",
];

/// Normalize an argument list into alternating key/value form.
///
/// Already-valid input (even length, string key at every even index, no
/// composite elements) is returned unchanged. Otherwise composites are
/// expanded in place and invalid runs of scalars are repaired by inserting
/// synthetic keys, renamed afterwards to `msg`, `error`, or `_p1`, `_p2`, …
pub fn flatten(args: Vec<Value>) -> Vec<Value> {
    let has_composite = args.iter().any(|v| v.class() == Class::Composite);
    if !has_composite && is_valid(&args) {
        return args;
    }

    let mut out = Vec::with_capacity(estimate(&args));
    let mut placeholders = Vec::new();
    let msg_present = contains_msg(&args);
    flatten_into(args, &mut out, &mut placeholders);
    rename_placeholders(&mut out, &placeholders, msg_present);
    out
}

/// A run is valid when it has even length and a string at every even index.
fn is_valid(run: &[Value]) -> bool {
    run.len() % 2 == 0 && run.iter().step_by(2).all(|v| v.as_str().is_some())
}

fn estimate(args: &[Value]) -> usize {
    args.iter()
        .map(|v| match v {
            Value::Pair(..) => 2,
            Value::Map(m) => m.len() * 2,
            Value::Seq(s) => estimate(s),
            _ => 1,
        })
        .sum::<usize>()
        + 2
}

/// Whether a `msg` key is already somewhere in the input. Checked before
/// repair so an inferred message does not shadow a real one.
fn contains_msg(args: &[Value]) -> bool {
    args.iter().any(|v| match v {
        Value::Str(s) => s.eq_ignore_ascii_case("msg"),
        Value::Pair(k, _) => k.eq_ignore_ascii_case("msg"),
        Value::Map(m) => m.keys().any(|k| k.eq_ignore_ascii_case("msg")),
        Value::Seq(s) => contains_msg(s),
        _ => false,
    })
}

/// Slot in a run under repair. Placeholders are renamed at the end.
enum Slot {
    Placeholder,
    Value(Value),
}

impl Slot {
    fn is_likely_key(&self) -> bool {
        match self {
            Slot::Placeholder => true,
            Slot::Value(v) => match v.as_str() {
                Some(s) => likely_key(s),
                None => false,
            },
        }
    }

    fn is_str(&self) -> bool {
        matches!(self, Slot::Placeholder) || matches!(self, Slot::Value(Value::Str(_)))
    }
}

/// Whether a string looks like a key: a well-known name, or a lower-case
/// identifier (`count`, `key1`, `not_found`, `request.id`). Upper-case words
/// and anything with whitespace or punctuation reads as a value.
fn likely_key(s: &str) -> bool {
    if KNOWN_KEYS.iter().any(|k| s.eq_ignore_ascii_case(k)) {
        return true;
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

fn flatten_into(args: Vec<Value>, out: &mut Vec<Value>, placeholders: &mut Vec<usize>) {
    let mut run: Vec<Slot> = Vec::new();
    for v in args {
        match v {
            Value::Pair(key, value) => {
                flush_run(&mut run, out, placeholders);
                out.push(Value::Str(key));
                out.push(*value);
            }
            Value::Map(map) => {
                flush_run(&mut run, out, placeholders);
                for (key, value) in map {
                    out.push(Value::Str(key));
                    out.push(value);
                }
            }
            Value::Seq(seq) => {
                flush_run(&mut run, out, placeholders);
                flatten_into(seq, out, placeholders);
            }
            scalar => run.push(Slot::Value(scalar)),
        }
    }
    flush_run(&mut run, out, placeholders);
}

/// Repair a run of scalars and append it to the output.
fn flush_run(run: &mut Vec<Slot>, out: &mut Vec<Value>, placeholders: &mut Vec<usize>) {
    if run.is_empty() {
        return;
    }
    while !run_valid(run) {
        let at = orphan_position(run);
        run.insert(at, Slot::Placeholder);
    }
    for slot in run.drain(..) {
        match slot {
            Slot::Placeholder => {
                placeholders.push(out.len());
                // stand-in; renamed once the whole list is assembled
                out.push(Value::Null);
            }
            Slot::Value(v) => out.push(v),
        }
    }
}

fn run_valid(run: &[Slot]) -> bool {
    run.len() % 2 == 0 && run.iter().step_by(2).all(Slot::is_str)
}

/// Find where the next synthetic key belongs.
///
/// Scanning from the end, each value binds to an immediately preceding
/// likely-key string; the rightmost value with no such key is the orphan and
/// gets the key inserted before it. When every value binds, the front
/// element is the orphan.
fn orphan_position(run: &[Slot]) -> usize {
    let mut i = run.len() - 1;
    while i > 0 {
        if run[i - 1].is_likely_key() {
            if i < 2 {
                break;
            }
            i -= 2;
        } else {
            return i;
        }
    }
    0
}

/// Name the inserted keys, left to right: the first placeholder paired with
/// a string or error becomes `msg` (unless a real `msg` key exists), later
/// error placeholders become `error`, everything else `_p1`, `_p2`, …
fn rename_placeholders(out: &mut [Value], placeholders: &[usize], mut msg_present: bool) {
    let mut n = 0usize;
    for &at in placeholders {
        let name = match out[at + 1].class() {
            Class::Text | Class::Error if !msg_present => {
                msg_present = true;
                "msg".to_string()
            }
            Class::Error => "error".to_string(),
            _ => {
                n += 1;
                format!("_p{n}")
            }
        };
        out[at] = Value::Str(name);
    }
}
