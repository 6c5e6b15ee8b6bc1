//! `{{pattern}}` expansion for filename, timestamp and front-matter templates.
//!
//! Patterns use the familiar date-format letters (`yyyy.MM.dd HH:mm:ss`,
//! `'T'` for quoted literals) and are translated to chrono strftime
//! specifiers before formatting.

use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, Local};

use crate::errors::Result;

/// Source of "now". Every save reads it exactly once.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Local wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock frozen at one instant, settable from tests.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<FixedOffset>>);

impl FixedClock {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        FixedClock(Mutex::new(at))
    }

    /// A clock frozen at an RFC 3339 timestamp.
    pub fn at(rfc3339: &str) -> Result<Self> {
        Ok(FixedClock::new(DateTime::parse_from_rfc3339(rfc3339)?))
    }

    pub fn set(&self, at: DateTime<FixedOffset>) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = at;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.0.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Replace every `{{pattern}}` token in `template` with `at` formatted by
/// `pattern`. Text outside tokens is copied verbatim; an unterminated `{{`
/// is copied verbatim from that point on.
pub fn expand(template: &str, at: &DateTime<FixedOffset>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                out.push_str(&rest[..open]);
                out.push_str(&format_date(&after_open[..close], at));
                rest = &after_open[close + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Expansion for filenames: like [`expand`], with every `:` turned into `_`.
pub fn expand_filename(template: &str, at: &DateTime<FixedOffset>) -> String {
    expand(template, at).replace(':', "_")
}

/// Format `at` with a date-format pattern such as `yyyy.MM.dd HH:mm:ss`.
pub fn format_date(pattern: &str, at: &DateTime<FixedOffset>) -> String {
    at.format(&to_strftime(pattern)).to_string()
}

/// Translate a date-format pattern into a chrono strftime string.
///
/// Runs of the same letter select a field and its width; text in single
/// quotes is literal, `''` is a quote. Unknown letters and all other
/// characters are emitted as-is (with `%` escaped).
pub fn to_strftime(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            // '' outside a quoted run is a literal quote
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        out.push('\'');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }
        if c.is_ascii_alphabetic() {
            let mut run = 1;
            while i + run < chars.len() && chars[i + run] == c {
                run += 1;
            }
            match field_spec(c, run) {
                Some(spec) => out.push_str(spec),
                None => {
                    for _ in 0..run {
                        out.push(c);
                    }
                }
            }
            i += run;
            continue;
        }
        push_literal(&mut out, c);
        i += 1;
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

fn field_spec(letter: char, run: usize) -> Option<&'static str> {
    let padded = run >= 2;
    let spec = match letter {
        'y' if run == 2 => "%y",
        'y' => "%Y",
        'M' if run >= 4 => "%B",
        'M' if run == 3 => "%b",
        'M' if padded => "%m",
        'M' => "%-m",
        'd' if padded => "%d",
        'd' => "%-d",
        'H' if padded => "%H",
        'H' => "%-H",
        'k' => "%H",
        'h' if padded => "%I",
        'h' => "%-I",
        'K' => "%I",
        'm' if padded => "%M",
        'm' => "%-M",
        's' if padded => "%S",
        's' => "%-S",
        'S' => "%3f",
        'a' => "%p",
        'E' if run >= 4 => "%A",
        'E' => "%a",
        'u' => "%u",
        'D' if run >= 3 => "%j",
        'D' => "%-j",
        'Z' => "%z",
        'X' if run >= 3 => "%:z",
        'X' => "%z",
        'z' => "%Z",
        _ => return None,
    };
    Some(spec)
}
