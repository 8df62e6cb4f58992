//! Extraction rules turning scheduler prose into typed fields.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

use super::field::{FieldValue, Fields, PendingReason};
use crate::exception::{SchedulerException, SchedulerResult};

/// `bjobs -l` wraps long lines and indents the rest with 21 spaces.
const CONTINUATION: &str = "\n                     ";

const TIME_FORMATS: &[&str] = &["%Y %b %d %H:%M:%S", "%Y %b %d %H:%M"];

/// `bjobs -o` prints the year last.
const FULL_TIME_FORMATS: &[&str] = &["%b %d %H:%M:%S %Y", "%b %d %H:%M %Y"];

/// `bjobs -o` marks estimated, actual and other times with a trailing letter.
static TIME_FLAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+[ELXA]$").expect("time flag pattern"));

static REASON_WITH_HOSTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?):\s*(\d+) hosts?;?$").expect("reason pattern"));

static MEMORY_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?[BKMGT]$").expect("memory pattern"));

/// How a captured string becomes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extract {
    /// Free text or a path.
    Text,
    /// Categorical value.
    Tag,
    /// Integer, else float.
    Number,
    /// Float that is averaged when merged, a trailing `%` is dropped.
    Ratio,
    /// True iff the pattern matches anywhere.
    Flag,
    /// Timestamp, the year may be left out.
    Time,
    /// `H:MM` remaining, or the date of the deadline.
    TimeLeft,
    /// Size with a B/K/M/G/T unit.
    Memory,
    Seconds,
    Minutes,
    /// `<count>*<name>` tokens.
    Slots,
    /// Text items split on the separator.
    TextList(&'static str),
    /// Whitespace separated integers.
    IntList,
    /// One pending reason per line.
    Reasons,
}

/// A named field and where to find it.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pattern: Regex,
    extract: Extract,
}

impl FieldRule {
    /// The first capture group of `pattern` holds the raw value, except for
    /// [`Extract::Flag`] where only the match matters.
    pub fn new(name: &'static str, pattern: &str, extract: Extract) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("invalid field pattern"),
            extract,
        }
    }

    pub fn apply(&self, text: &str, now: NaiveDateTime) -> SchedulerResult<Option<FieldValue>> {
        if self.extract == Extract::Flag {
            return Ok(Some(FieldValue::Bool(self.pattern.is_match(text))));
        }
        let Some(raw) = self.pattern.captures(text).and_then(|c| c.get(1)) else {
            return Ok(None);
        };
        self.extract.parse(self.name, raw.as_str(), now).map(Some)
    }
}

impl Extract {
    pub fn parse(self, field: &str, raw: &str, now: NaiveDateTime) -> SchedulerResult<FieldValue> {
        Ok(match self {
            Extract::Text => FieldValue::Text(raw.trim().to_owned()),
            Extract::Tag => FieldValue::Tag(raw.trim().to_owned()),
            Extract::Number => parse_number(field, raw)?,
            Extract::Ratio => {
                let number = raw.split('%').next().unwrap_or_default();
                FieldValue::Ratio(parse_float(field, number)?)
            }
            Extract::Flag => FieldValue::Bool(true),
            Extract::Time => FieldValue::Time(parse_time(field, raw, now)?),
            Extract::TimeLeft => FieldValue::Duration(parse_time_left(field, raw, now)?),
            Extract::Memory => FieldValue::Memory(parse_memory(field, raw)?),
            Extract::Seconds => FieldValue::Duration(parse_seconds(field, raw, 1.0)?),
            Extract::Minutes => FieldValue::Duration(parse_seconds(field, raw, 60.0)?),
            Extract::Slots => FieldValue::Map(parse_slots(field, raw)?),
            Extract::TextList(separator) => FieldValue::List(
                raw.split(separator)
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(FieldValue::text)
                    .collect(),
            ),
            Extract::IntList => FieldValue::List(
                raw.split_whitespace()
                    .map(|item| {
                        item.parse::<i64>()
                            .map(FieldValue::Int)
                            .map_err(|e| SchedulerException::malformed_value(field, item, e.to_string()))
                    })
                    .collect::<SchedulerResult<_>>()?,
            ),
            Extract::Reasons => FieldValue::Reasons(parse_reasons(raw)),
        })
    }
}

/// Apply every rule to `text`. Fields whose pattern does not match are left out.
pub fn parse_fields(text: &str, rules: &[FieldRule], now: NaiveDateTime) -> SchedulerResult<Fields> {
    let mut fields = Fields::new();
    for rule in rules {
        if let Some(value) = rule.apply(text, now)? {
            fields.insert(rule.name.to_owned(), value);
        }
    }
    Ok(fields)
}

/// Join wrapped `bjobs -l` lines back together.
pub fn join_continuations(text: &str) -> String {
    text.replace(CONTINUATION, "")
}

pub fn parse_number(field: &str, raw: &str) -> SchedulerResult<FieldValue> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(FieldValue::Int(i));
    }
    parse_float(field, raw).map(FieldValue::Float)
}

fn parse_float(field: &str, raw: &str) -> SchedulerResult<f64> {
    let raw = raw.trim();
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(f),
        Ok(_) => Err(SchedulerException::malformed_value(field, raw, "not a finite number")),
        Err(e) => Err(SchedulerException::malformed_value(field, raw, e.to_string())),
    }
}

/// The number may be followed by its unit, as in `3600 second(s)`.
fn parse_seconds(field: &str, raw: &str, scale: f64) -> SchedulerResult<Duration> {
    let value = parse_float(field, raw.split_whitespace().next().unwrap_or_default())?;
    if value < 0.0 {
        return Err(SchedulerException::malformed_value(field, raw, "negative duration"));
    }
    Ok(Duration::from_secs((value * scale).round() as u64))
}

/// Size in bytes. The unit is the first letter after the number, so `2 G`,
/// `512 Mbytes` and `16kb` all parse.
pub fn parse_memory(field: &str, raw: &str) -> SchedulerResult<u64> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let number = parse_float(field, number)?;
    let exponent = match unit.trim_start().chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('B') => 0,
        Some('K') => 1,
        Some('M') => 2,
        Some('G') => 3,
        Some('T') => 4,
        Some(c) => {
            return Err(SchedulerException::malformed_value(
                field,
                raw,
                format!("unknown memory unit `{c}`"),
            ))
        }
        None => return Err(SchedulerException::malformed_value(field, raw, "missing memory unit")),
    };
    Ok((number * 1024f64.powi(exponent)) as u64)
}

/// `<2*host1> <2*host2>` or `4*host1:host2` into host name to count. A bare
/// name counts once and repeated names accumulate.
pub fn parse_slots(field: &str, raw: &str) -> SchedulerResult<BTreeMap<String, i64>> {
    let mut slots = BTreeMap::new();
    let tokens = raw
        .split(|c: char| c == '<' || c == '>' || c == ':' || c.is_whitespace())
        .filter(|t| !t.is_empty());
    for token in tokens {
        let (count, name) = match token.split_once('*') {
            Some((count, name)) => {
                let count = count
                    .parse::<i64>()
                    .map_err(|e| SchedulerException::malformed_value(field, token, e.to_string()))?;
                (count, name)
            }
            None => (1, token),
        };
        *slots.entry(name.to_owned()).or_insert(0) += count;
    }
    Ok(slots)
}

pub fn parse_reasons(raw: &str) -> Vec<PendingReason> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match REASON_WITH_HOSTS.captures(line) {
            Some(c) => PendingReason::new(&c[1], c[2].parse().ok()),
            None => PendingReason::new(line.trim_end_matches(';'), None),
        })
        .collect()
}

/// Timestamp with a trailing year, or printed without one. Without a year
/// the current one is assumed unless that puts the instant in the future,
/// then it is the previous year.
pub fn parse_timestamp(raw: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let raw = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let raw = TIME_FLAG.replace(&raw, "");
    if let Some(t) = FULL_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&raw, format).ok())
    {
        return Some(t);
    }
    let at = |year: i32| {
        TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&format!("{year} {raw}"), format).ok())
    };
    match at(now.year()) {
        Some(t) if t <= now => Some(t),
        _ => at(now.year() - 1),
    }
}

pub fn parse_time(field: &str, raw: &str, now: NaiveDateTime) -> SchedulerResult<DateTime<Local>> {
    let naive = parse_timestamp(raw, now)
        .ok_or_else(|| SchedulerException::malformed_value(field, raw, "unrecognized timestamp"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| SchedulerException::malformed_value(field, raw, "no such local time"))
}

/// Time left until a run limit: `H:MM`, or the date it is reached at when
/// that is more than a day away.
pub fn parse_time_left(field: &str, raw: &str, now: NaiveDateTime) -> SchedulerResult<Duration> {
    let raw = raw.trim();
    let clean = TIME_FLAG.replace(raw, "");
    if let Some((hours, minutes)) = clean.split_once(':').filter(|_| !clean.contains(' ')) {
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|e| SchedulerException::malformed_value(field, raw, e.to_string()))
        };
        return Ok(Duration::from_secs(60 * (60 * parse(hours)? + parse(minutes)?)));
    }
    let at = |year: i32| {
        TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&format!("{year} {clean}"), format).ok())
    };
    let deadline = match at(now.year()) {
        Some(t) if t >= now => t,
        _ => at(now.year() + 1)
            .ok_or_else(|| SchedulerException::malformed_value(field, raw, "unrecognized time left"))?,
    };
    Ok((deadline - now).to_std().unwrap_or_default())
}

/// Best guess for an untyped table cell: `-` is absent, then integer, float,
/// percentage, memory size, and text otherwise.
pub fn guess_value(field: &str, raw: &str) -> SchedulerResult<Option<FieldValue>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return Ok(None);
    }
    let numeric = raw.starts_with(|c: char| c.is_ascii_digit());
    Ok(Some(if let Ok(i) = raw.parse::<i64>() {
        FieldValue::Int(i)
    } else if numeric && raw.parse::<f64>().is_ok() {
        FieldValue::Float(parse_float(field, raw)?)
    } else if let Some(percent) = raw.strip_suffix('%').filter(|_| numeric) {
        FieldValue::Ratio(parse_float(field, percent)?)
    } else if MEMORY_SHAPE.is_match(raw) {
        FieldValue::Memory(parse_memory(field, raw)?)
    } else {
        FieldValue::text(raw)
    }))
}
