//! `bhosts` output.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::exception::{SchedulerException, SchedulerResult};
use crate::model::vo::rule::guess_value;
use crate::model::vo::{EntityKind, FieldValue, Fields};

pub(crate) const EMPTY_MARKERS: &[&str] = &["No matching host found"];

static HOST_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\D+)\d+").expect("host prefix pattern"));

static ADMIN_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"ADMIN ACTION COMMENT: "(.*)""#).expect("comment pattern"));

/// `node017` belongs to `node`.
pub(crate) fn host_group(name: &str) -> Option<&str> {
    HOST_PREFIX.captures(name).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// `JL/U` becomes `jl_u`.
fn column_name(header: &str) -> String {
    header.to_lowercase().replace('/', "_")
}

/// Zip a header row with a value row, `-` cells are left out.
fn zip_row(prefix: &str, header: &[&str], values: &[&str], fields: &mut Fields) -> SchedulerResult<()> {
    for (name, raw) in header.iter().zip(values) {
        let name = format!("{prefix}{}", column_name(name));
        if let Some(value) = guess_value(&name, raw)? {
            fields.insert(name, value);
        }
    }
    Ok(())
}

fn derive(name: &str, fields: &mut Fields) {
    let group = host_group(name).map_or(FieldValue::Null, FieldValue::tag);
    fields.insert("hostgroup".to_owned(), group);
    if let Some(FieldValue::Text(status)) = fields.get("status").cloned() {
        fields.insert("status".to_owned(), FieldValue::Tag(status));
    }
    let count = |field: &str| fields.get(field).and_then(FieldValue::as_i64).unwrap_or(0);
    let free = match fields.get("status").and_then(FieldValue::as_str) {
        Some("closed_Excl") => 0,
        _ => (count("max") - count("run") - count("rsv")).max(0),
    };
    fields.insert("free".to_owned(), FieldValue::Int(free));
}

/// Parse `bhosts -X -w`.
pub(crate) fn parse_listing(text: &str) -> SchedulerResult<Vec<(String, Fields)>> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = header.split_whitespace().collect();
    let mut hosts = Vec::new();
    for line in lines {
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() != header.len() {
            tracing::warn!("Skipping unexpected bhosts line: {line}");
            continue;
        }
        let name = values[0].to_owned();
        let mut fields = Fields::new();
        zip_row("", &header[1..], &values[1..], &mut fields)?;
        fields.insert("host_name".to_owned(), FieldValue::text(&name));
        derive(&name, &mut fields);
        hosts.push((name, fields));
    }
    Ok(hosts)
}

/// Parse `bhosts -l <name>`.
///
/// ```text
/// HOST  node01
/// STATUS           CPUF  JL/U    MAX  NJOBS    RUN  SSUSP  USUSP    RSV DISPATCH_WINDOW
/// ok              60.00     -     16      4      4      0      0      0      -
///
///  CURRENT LOAD USED FOR SCHEDULING:
///               r15s   r1m  r15m    ut    pg    io   ls    it   tmp   swp   mem  slots
///  Total         0.0   0.0   0.0    2%   0.0    10    0  1440  100G    8G   60G     12
///  Reserved      0.0   0.0   0.0    0%   0.0     0    0     0    0M    0M    4G      -
/// ```
pub(crate) fn parse_detail(key: &str, text: &str) -> SchedulerResult<Fields> {
    let malformed = |reason: &str| SchedulerException::MalformedOutput {
        kind: EntityKind::Host,
        key: key.to_owned(),
        reason: reason.to_owned(),
    };
    let lines: Vec<&str> = text.lines().collect();

    let name = lines
        .iter()
        .find_map(|line| line.strip_prefix("HOST "))
        .map(str::trim)
        .ok_or_else(|| malformed("no HOST line"))?;
    let status_at = lines
        .iter()
        .position(|line| line.starts_with("STATUS"))
        .ok_or_else(|| malformed("no STATUS table"))?;
    let header: Vec<&str> = lines[status_at].split_whitespace().collect();
    let values: Vec<&str> = lines
        .get(status_at + 1)
        .map(|line| line.split_whitespace().collect())
        .unwrap_or_default();
    if values.is_empty() {
        return Err(malformed("empty STATUS table"));
    }

    let mut fields = Fields::new();
    zip_row("", &header, &values, &mut fields)?;
    fields.insert("host_name".to_owned(), FieldValue::text(name));

    let row_at = |row: &str| {
        lines
            .iter()
            .position(|line| line.split_whitespace().next() == Some(row))
    };
    if let Some(total_at) = row_at("Total") {
        let load_header: Vec<&str> = lines[..total_at]
            .iter()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.split_whitespace().collect())
            .unwrap_or_default();
        for (at, prefix) in [(Some(total_at), "total_"), (row_at("Reserved"), "reserved_")] {
            if let Some(at) = at {
                let load: Vec<&str> = lines[at].split_whitespace().skip(1).collect();
                zip_row(prefix, &load_header, &load, &mut fields)?;
            }
        }
    }

    if let Some(comment) = ADMIN_COMMENT.captures(text) {
        fields.insert("comment".to_owned(), FieldValue::tag(&comment[1]));
    }
    derive(name, &mut fields);
    Ok(fields)
}
