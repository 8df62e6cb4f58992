use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

/// Named field values of one record.
pub type Fields = BTreeMap<String, FieldValue>;

/// A typed field value.
///
/// The variant carries the semantic type of the field, so merging many values
/// of one field is a plain match: `Text` is free text or a path, `Tag` a
/// categorical value, `Int`/`Float`/`Duration`/`Memory` additive quantities
/// and `Ratio` a quantity that is averaged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Tag(String),
    Int(i64),
    Float(f64),
    Ratio(f64),
    #[serde(serialize_with = "serialize_seconds")]
    Duration(Duration),
    /// Bytes.
    Memory(u64),
    Bool(bool),
    Time(DateTime<Local>),
    /// Host name to slot count.
    Map(BTreeMap<String, i64>),
    List(Vec<FieldValue>),
    Reasons(Vec<PendingReason>),
    Histogram(BTreeMap<String, u64>),
}

/// Why a job is still pending, with the number of hosts it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PendingReason {
    pub reason: String,
    pub hosts: Option<u32>,
}

impl PendingReason {
    pub fn new(reason: impl Into<String>, hosts: Option<u32>) -> Self {
        Self {
            reason: reason.into(),
            hosts,
        }
    }
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn tag(s: impl Into<String>) -> Self {
        FieldValue::Tag(s.into())
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Tag(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Memory(m) => i64::try_from(*m).ok(),
            FieldValue::Duration(d) => i64::try_from(d.as_secs()).ok(),
            _ => None,
        }
    }

    /// Numeric view of every quantity variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) | FieldValue::Ratio(f) => Some(*f),
            FieldValue::Duration(d) => Some(d.as_secs_f64()),
            FieldValue::Memory(m) => Some(*m as f64),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            FieldValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Local>> {
        match self {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, i64>> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Total order used for sorting records. `Null` sorts lowest, quantities
    /// compare numerically across variants, anything else by its rendering.
    pub fn cmp_loose(&self, other: &Self) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Text(a) | Tag(a), Text(b) | Tag(b)) => a.cmp(b),
            (Time(a), Time(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<Duration> for FieldValue {
    fn from(d: Duration) -> Self {
        FieldValue::Duration(d)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("-"),
            FieldValue::Text(s) | FieldValue::Tag(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(v) | FieldValue::Ratio(v) => write!(f, "{v:.2}"),
            FieldValue::Duration(d) => f.write_str(&format_duration(*d)),
            FieldValue::Memory(m) => f.write_str(&format_memory(*m)),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Time(t) => write!(f, "{}", t.format("%b %d %H:%M")),
            FieldValue::Map(m) => {
                let parts: Vec<String> = m.iter().map(|(k, v)| format!("{v}*{k}")).collect();
                f.write_str(&parts.join(" "))
            }
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(" "))
            }
            FieldValue::Reasons(reasons) => {
                let parts: Vec<String> = reasons.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join("; "))
            }
            FieldValue::Histogram(h) => match h.len() {
                1 => f.write_str(h.keys().next().map(String::as_str).unwrap_or_default()),
                _ => {
                    let parts: Vec<String> = h.iter().map(|(k, v)| format!("{k}:{v}")).collect();
                    f.write_str(&parts.join(" "))
                }
            },
        }
    }
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hosts {
            Some(1) => write!(f, "{}: 1 host", self.reason),
            Some(n) => write!(f, "{}: {n} hosts", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// `[Nd ]H:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let (hours, minutes, seconds) = (rest / 3600, rest % 3600 / 60, rest % 60);
    if days > 0 {
        format!("{days}d {hours:>2}:{minutes:0>2}:{seconds:0>2}")
    } else {
        format!("{hours}:{minutes:0>2}:{seconds:0>2}")
    }
}

pub fn format_memory(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn serialize_seconds<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Duration(Duration::from_secs(3723)).to_string(), "1:02:03");
        assert_eq!(
            FieldValue::Duration(Duration::from_secs(2 * 86_400 + 59)).to_string(),
            "2d  0:00:59"
        );
        assert_eq!(FieldValue::Memory(3 * 1024 * 1024 / 2).to_string(), "1.5 MiB");
        let hist = BTreeMap::from([("RUN".to_string(), 3)]);
        assert_eq!(FieldValue::Histogram(hist).to_string(), "RUN");
        let hosts = BTreeMap::from([("h1".to_string(), 2), ("h2".to_string(), 3)]);
        assert_eq!(FieldValue::Map(hosts).to_string(), "2*h1 3*h2");
    }

    #[test]
    fn test_cmp_loose() {
        assert_eq!(FieldValue::Null.cmp_loose(&FieldValue::Int(0)), Ordering::Less);
        assert_eq!(
            FieldValue::Int(2).cmp_loose(&FieldValue::Float(1.5)),
            Ordering::Greater
        );
        assert_eq!(
            FieldValue::tag("a").cmp_loose(&FieldValue::text("b")),
            Ordering::Less
        );
    }

    #[test]
    fn test_serialize() {
        let value = FieldValue::Duration(Duration::from_secs(90));
        assert_eq!(serde_json::to_string(&value).unwrap(), "90");
        assert_eq!(serde_json::to_string(&FieldValue::Null).unwrap(), "null");
    }
}
