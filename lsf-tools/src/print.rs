//! Plain text rendering of records.

use colored::{Color, ColoredString, Colorize};
use domain_scheduler::model::vo::{EntityKind, FieldValue, PendingReason};
use once_cell::sync::Lazy;
use regex::Regex;

/// Pending reasons worth a second look: yellow ones clear up by themselves,
/// red ones may never.
static REASON_COLORS: Lazy<Vec<(Regex, Color)>> = Lazy::new(|| {
    [
        ("Running an exclusive job", Color::Yellow),
        ("Job's requirement for exclusive execution not satisfied", Color::Yellow),
        ("An exclusive job has reserved the host", Color::Yellow),
        ("Job slot limit reached", Color::Yellow),
        ("Not enough processors to meet the job's spanning requirement", Color::Yellow),
        ("Not enough slots or resources for whole duration of the job", Color::Red),
        ("Not enough hosts to meet the job's spanning requirement", Color::Red),
        (r"Job('s)? requirements for reserving resource \(.*\) not satisfied", Color::Red),
    ]
    .into_iter()
    .map(|(pattern, color)| (Regex::new(&format!("^{pattern}")).expect("reason pattern"), color))
    .collect()
});

pub struct Column {
    pub field: &'static str,
    pub width: usize,
}

const fn column(field: &'static str, width: usize) -> Column {
    Column { field, width }
}

pub const JOB_COLUMNS: &[Column] = &[
    column("jobid", 10),
    column("user", 10),
    column("stat", 6),
    column("queue", 10),
    column("slots", 6),
    column("run_time", 12),
    column("job_name", 0),
];

pub const HOST_COLUMNS: &[Column] = &[
    column("host_name", 16),
    column("status", 12),
    column("max", 5),
    column("run", 5),
    column("free", 5),
    column("hostgroup", 0),
];

pub fn columns(kind: EntityKind) -> &'static [Column] {
    match kind {
        EntityKind::Job => JOB_COLUMNS,
        EntityKind::Host => HOST_COLUMNS,
    }
}

/// Status tags by how well things are going.
pub fn paint_status(status: &str, text: String) -> ColoredString {
    match status {
        "RUN" | "PROV" | "ok" => text.green(),
        "PEND" | "WAIT" | "PSUSP" | "USUSP" | "SSUSP" => text.yellow(),
        "DONE" => text.blue(),
        "EXIT" | "ZOMBI" | "unavail" | "unreach" => text.red(),
        s if s.starts_with("closed") => text.magenta(),
        _ => text.normal(),
    }
}

pub fn header(kind: EntityKind) -> String {
    let cells: Vec<String> = columns(kind)
        .iter()
        .map(|c| format!("{:<width$}", c.field.to_uppercase(), width = c.width))
        .collect();
    cells.join(" ").trim_end().bold().to_string()
}

/// One line of `values`, given in column order.
pub fn line(kind: EntityKind, values: &[FieldValue]) -> String {
    let status_field = kind.status_field();
    let cells: Vec<String> = columns(kind)
        .iter()
        .zip(values)
        .map(|(column, value)| {
            let text = format!("{:<width$}", value.to_string(), width = column.width);
            match value {
                FieldValue::Tag(status) if column.field == status_field => {
                    paint_status(status, text).to_string()
                }
                _ => text,
            }
        })
        .collect();
    cells.join(" ").trim_end().to_string()
}

/// `  <hosts>  <reason>`, the count left blank when the reason holds for every
/// host.
pub fn reason_line(reason: &PendingReason) -> String {
    let text = match REASON_COLORS.iter().find(|(pattern, _)| pattern.is_match(&reason.reason)) {
        Some((_, color)) => reason.reason.color(*color).to_string(),
        None => reason.reason.clone(),
    };
    match reason.hosts {
        Some(hosts) => format!("  {hosts:>4}  {text}"),
        None => format!("        {text}"),
    }
}

pub fn title(title: &str) -> String {
    format!("{} {}", "#".bold(), title.bold())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_line() {
        colored::control::set_override(false);
        let values = [
            FieldValue::text("4711"),
            FieldValue::tag("alice"),
            FieldValue::tag("RUN"),
            FieldValue::tag("normal"),
            FieldValue::Int(4),
            FieldValue::Duration(Duration::from_secs(3723)),
            FieldValue::text("sim"),
        ];
        assert_eq!(
            line(EntityKind::Job, &values),
            "4711       alice      RUN    normal     4      1:02:03      sim"
        );
        assert_eq!(
            line(EntityKind::Host, &[FieldValue::text("node01"), FieldValue::Null]),
            "node01           -"
        );
    }

    #[test]
    fn test_reason_line() {
        colored::control::set_override(false);
        assert_eq!(
            reason_line(&PendingReason::new("Job slot limit reached", Some(12))),
            "    12  Job slot limit reached"
        );
        assert_eq!(
            reason_line(&PendingReason::new("New job is waiting for scheduling", None)),
            "        New job is waiting for scheduling"
        );
        assert!(REASON_COLORS[7].0.is_match("Job's requirements for reserving resource (mem) not satisfied"));
    }
}
