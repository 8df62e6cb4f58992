//! `bjobs` output.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;

use super::host::host_group;
use crate::exception::{SchedulerException, SchedulerResult};
use crate::model::vo::rule::{join_continuations, parse_fields};
use crate::model::vo::{EntityKind, Extract, FieldRule, FieldValue, Fields};

/// `bjobs -l` separates the elements of a job array with this line.
const ARRAY_SEPARATOR_WIDTH: usize = 78;

/// Messages meaning the query matched nothing.
pub(crate) const EMPTY_MARKERS: &[&str] = &[
    "No unfinished job found",
    "No pending job found",
    "No job found",
    "is not found",
];

const TIME: &str = r"([A-Z][a-z]{2} +\d+ \d+:\d+:\d+)";

/// Parts of a resource request that only hold for the job itself.
static JOB_ONLY_RESREQ: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" && \((?:hostok|mem>\d+)\)").expect("resreq pattern"));

static ARRAY_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\[\d+\])$").expect("array index pattern"));

static DETAIL_RULES: Lazy<Vec<FieldRule>> = Lazy::new(|| {
    use Extract::*;
    vec![
        FieldRule::new("job_name", r"Job Name <(.*?)>, ?User", Text),
        FieldRule::new("user", r"User <(.*?)>[,;]", Tag),
        FieldRule::new("proj_name", r"Project <(.*?)>[,;]", Tag),
        FieldRule::new("user_group", r"User Group <(.*?)>[,;]", Tag),
        FieldRule::new("mail", r"Mail <(.*?)>[,;]", Text),
        FieldRule::new("stat", r"Status <(.*?)>[,;]", Tag),
        FieldRule::new("queue", r"Queue <(.*?)>[,;]", Tag),
        FieldRule::new(
            "command",
            r"(?s)Command <(.*?)>(?:, ?(?:Job Description|Share group charged|Esub)|\s*\n|\s*$)",
            Text,
        ),
        FieldRule::new("from_host", r"Submitted from host <(.*?)>[,;]", Tag),
        FieldRule::new("sub_cwd", r"(?:^|, )CWD <(.*?)>[,;]", Text),
        FieldRule::new("output_file", r"Output File <(.*?)>[,;]", Text),
        FieldRule::new("error_file", r"Error File <(.*?)>[,;]", Text),
        FieldRule::new("resreq", r"Requested Resources <(.*?) ?>[,;]", Text),
        FieldRule::new("dependency", r"Dependency Condition <(.*?)>[,;]", Text),
        FieldRule::new("job_description", r"Job Description <(.*?)>", Text),
        FieldRule::new("host_req", r"Specified Hosts <(.*?)>(?:;|, [^<])", TextList(">, <")),
        FieldRule::new("exec_home", r"Execution Home <(.*?)>[,;]", Text),
        FieldRule::new("exec_cwd", r"Execution CWD <(.*?)>[,;]", Text),
        FieldRule::new(
            "exec_host",
            r"[sS]tarted (?:\d+ Task\(s\) )?on (?:\d+ Hosts/Processors |Host\(s\) )?<(.*?)>[,;]",
            Slots,
        ),
        FieldRule::new("pend_reason", r"(?s)PENDING REASONS:\n(.*?)(?:\n\s*\n|\z)", Reasons),
        FieldRule::new("job_priority", r"Job Priority <(\d+)>", Ratio),
        FieldRule::new("min_req_proc", r", (\d+) (?:Processors|Task\(s\)) Requested", Number),
        FieldRule::new("cpu_used", r"The CPU time used is ([\d.]+) seconds", Seconds),
        FieldRule::new("runlimit", r"RUNLIMIT\s*\n\s*([\d.]+) min", Minutes),
        FieldRule::new("memlimit", r"MEMLIMIT\s*\n\s*([\d.]+ *[A-Za-z]+)", Memory),
        FieldRule::new("mem", r"MEM: ([\d.]+ *[A-Za-z]+)", Memory),
        FieldRule::new("swap", r"SWAP: ([\d.]+ *[A-Za-z]+)", Memory),
        FieldRule::new("pids", r"PIDs: ([\d ]+)", IntList),
        FieldRule::new("exclusive", r"Exclusive Execution", Flag),
        FieldRule::new("notify_begin", r"Notify when job begins", Flag),
        FieldRule::new("notify_end", r"Notify when job (?:begins/)?ends", Flag),
        FieldRule::new("interactive", r"Interactive pseudo-terminal shell", Flag),
        FieldRule::new("submit_time", &format!("{TIME}: Submitted"), Time),
        FieldRule::new("start_time", &format!(r"{TIME}: (?:\[\d+\] )?[sS]tarted"), Time),
        FieldRule::new("finish_time", &format!("{TIME}: (?:Done successfully|Exited)"), Time),
    ]
});

/// Parse `bjobs -l <id>`.
pub(crate) fn parse_detail(key: &str, text: &str, now: DateTime<Local>) -> SchedulerResult<Fields> {
    if text.contains(&"-".repeat(ARRAY_SEPARATOR_WIDTH)) {
        return Err(SchedulerException::MalformedOutput {
            kind: EntityKind::Job,
            key: key.to_owned(),
            reason: "array jobs are not supported".to_owned(),
        });
    }
    if !text.contains("Job <") {
        return Err(SchedulerException::MalformedOutput {
            kind: EntityKind::Job,
            key: key.to_owned(),
            reason: "no `Job <...>` header".to_owned(),
        });
    }
    let text = join_continuations(text);
    let mut fields = parse_fields(&text, &DETAIL_RULES, now.naive_local())?;
    derive(&mut fields, now);
    Ok(fields)
}

/// Fields computed from other fields.
fn derive(fields: &mut Fields, now: DateTime<Local>) {
    let min_req_proc = fields.entry("min_req_proc".to_owned()).or_insert(FieldValue::Int(1)).clone();

    if let Some(FieldValue::Text(command)) = fields.get_mut("command") {
        *command = command.split("; ").collect::<Vec<_>>().join("\n");
    }

    let userstr = fields.get("user").and_then(FieldValue::as_str).map(|user| {
        match fields.get("mail").and_then(FieldValue::as_str) {
            Some(mail) => format!("{user} <{mail}>"),
            None => user.to_owned(),
        }
    });
    if let Some(userstr) = userstr {
        fields.insert("userstr".to_owned(), FieldValue::Text(userstr));
    }

    match fields.get("exec_host").and_then(FieldValue::as_map).cloned() {
        Some(hosts) => {
            fields.insert("hostgroups".to_owned(), FieldValue::Map(hostgroups(&hosts)));
            fields.insert("nexec_host".to_owned(), FieldValue::Int(hosts.len() as i64));
            fields.insert("slots".to_owned(), FieldValue::Int(hosts.values().sum()));
        }
        None => {
            fields.insert("slots".to_owned(), min_req_proc);
        }
    }

    if let Some(start) = fields.get("start_time").and_then(FieldValue::as_time) {
        let end = fields.get("finish_time").and_then(FieldValue::as_time).unwrap_or(now);
        let run_time = (end - start).to_std().unwrap_or_default();
        fields.insert("run_time".to_owned(), FieldValue::Duration(run_time));
    }
}

/// The resource request of a pending job, loosened to select every host that
/// could run it: `bhosts -R <request>`.
pub fn candidate_resreq(resreq: &str) -> String {
    JOB_ONLY_RESREQ.replace_all(resreq, "").into_owned()
}

/// Columns requested from `bjobs -o`, in output order.
const LISTING_COLUMNS: &[(&str, Extract)] = &[
    ("jobid", Extract::Text),
    ("stat", Extract::Tag),
    ("user", Extract::Tag),
    ("user_group", Extract::Tag),
    ("queue", Extract::Tag),
    ("job_name", Extract::Text),
    ("proj_name", Extract::Tag),
    ("job_priority", Extract::Ratio),
    ("from_host", Extract::Tag),
    ("exec_host", Extract::Slots),
    ("nexec_host", Extract::Number),
    ("alloc_slot", Extract::Slots),
    ("slots", Extract::Number),
    ("min_req_proc", Extract::Number),
    ("submit_time", Extract::Time),
    ("start_time", Extract::Time),
    ("finish_time", Extract::Time),
    ("time_left", Extract::TimeLeft),
    ("%complete", Extract::Ratio),
    ("pend_time", Extract::Seconds),
    ("cpu_used", Extract::Seconds),
    ("run_time", Extract::Seconds),
    ("idle_factor", Extract::Ratio),
    ("mem", Extract::Memory),
    ("max_mem", Extract::Memory),
    ("avg_mem", Extract::Memory),
    ("memlimit", Extract::Memory),
    ("exit_code", Extract::Number),
    ("effective_resreq", Extract::Text),
];

/// Separates the `bjobs -o` columns. Job names can not contain it.
pub const LISTING_DELIMITER: char = '\u{7}';

/// Names of the bulk job listing columns.
pub fn listing_columns() -> Vec<&'static str> {
    LISTING_COLUMNS.iter().map(|(name, _)| *name).collect()
}

/// The `-o` argument of the bulk job listing.
pub fn listing_format() -> String {
    format!("{} delimiter='{LISTING_DELIMITER}'", listing_columns().join(" "))
}

/// Parse `bjobs -X -o "<columns> delimiter='^G'"`, one job per line after
/// the header.
///
/// A `-` cell is stored as `Null`: the scheduler has no value for it, so
/// reading it does not query the detail. A cell that does not parse is left
/// out, reading it queries the detail.
pub(crate) fn parse_listing(text: &str, now: DateTime<Local>) -> Vec<(String, Fields)> {
    let mut jobs = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() || line.starts_with("JOBID") {
            continue;
        }
        let cells: Vec<&str> = line.split(LISTING_DELIMITER).collect();
        if cells.len() != LISTING_COLUMNS.len() {
            tracing::warn!("Skipping unexpected bjobs line: {line}");
            continue;
        }
        let mut fields = Fields::new();
        for ((name, extract), raw) in LISTING_COLUMNS.iter().zip(cells) {
            let raw = raw.trim();
            if raw.is_empty() || raw == "-" {
                fields.insert((*name).to_owned(), FieldValue::Null);
                continue;
            }
            match extract.parse(name, raw, now.naive_local()) {
                Ok(value) => {
                    fields.insert((*name).to_owned(), value);
                }
                Err(e) => tracing::warn!("{e}"),
            }
        }
        let Some(mut jobid) = fields.get("jobid").and_then(FieldValue::as_str).map(str::to_owned) else {
            tracing::warn!("Skipping bjobs line without a job id: {line}");
            continue;
        };
        if let Some(index) = fields
            .get("job_name")
            .and_then(FieldValue::as_str)
            .and_then(|name| ARRAY_INDEX.captures(name))
        {
            jobid.push_str(&index[1]);
        }
        fields.insert("jobid".to_owned(), FieldValue::text(&jobid));
        derive_listing(&mut fields);
        jobs.push((jobid, fields));
    }
    jobs
}

/// `exclusive` from the effective resource request, `hostgroups` from the
/// execution hosts, and a `runlimit` estimated from the progress.
fn derive_listing(fields: &mut Fields) {
    if let Some(resreq) = fields.get("effective_resreq").and_then(FieldValue::as_str) {
        let exclusive = resreq.contains("exclusive=1");
        fields.insert("exclusive".to_owned(), FieldValue::Bool(exclusive));
    }
    if let Some(hosts) = fields.get("exec_host").and_then(FieldValue::as_map) {
        let groups = hostgroups(hosts);
        fields.insert("hostgroups".to_owned(), FieldValue::Map(groups));
    }
    let run_time = fields.get("run_time").and_then(FieldValue::as_duration);
    let complete = match fields.get("%complete") {
        Some(FieldValue::Ratio(c)) if *c > 0.0 => Some(*c),
        _ => None,
    };
    if let (Some(run_time), Some(complete)) = (run_time, complete) {
        let estimate = run_time.as_secs_f64() / complete * 100.0;
        let unit = if estimate > 10.0 * 3600.0 { 3600.0 } else { 60.0 };
        let runlimit = (estimate / unit).round() * unit;
        fields.insert("runlimit".to_owned(), FieldValue::Duration(Duration::from_secs(runlimit as u64)));
    }
}

/// Slots per host group, `node01` and `node02` counting for `node*`.
fn hostgroups(hosts: &BTreeMap<String, i64>) -> BTreeMap<String, i64> {
    let mut groups = BTreeMap::new();
    for (host, count) in hosts {
        let group = host_group(host).map_or_else(|| host.clone(), |g| format!("{g}*"));
        *groups.entry(group).or_insert(0) += count;
    }
    groups
}
