use domain_scheduler::{
    exception::{SchedulerException, SchedulerResult},
    model::{
        entity::{candidate_resreq, Entity, EntityList, SortOrder},
        vo::{EntityKind, FieldValue},
    },
};
use service_scheduler::{Prefetch, SchedulerSession};

use crate::aliases::UserAliases;
use crate::config::{is_config_file, OutputFormat, ToolsConfig, ViewConfig};
use crate::print;

/// Command line arguments for the LSF command, without the config files.
pub fn cli_args() -> Vec<String> {
    std::env::args().skip(1).filter(|arg| !is_config_file(arg)).collect()
}

/// Start the prefetch, then put `list` in order. Sort passes over detail
/// fields wait on the prefetch queries instead of issuing their own.
pub async fn prepare(
    session: &SchedulerSession,
    list: &mut EntityList,
    view: &ViewConfig,
    prefetch: bool,
) -> SchedulerResult<Prefetch> {
    let pending = view.pending && list.kind() == EntityKind::Job;
    let prefetch = if (prefetch || pending) && !view.jid {
        session.prefetch(list)
    } else {
        Prefetch::default()
    };
    list.sort_default().await?;
    if let Some(field) = &view.sort_by {
        list.sort_by(field, SortOrder::Ascending).await?;
    }
    Ok(prefetch)
}

/// Sort, group, summarize and print `list`.
pub async fn show(
    session: &SchedulerSession,
    mut list: EntityList,
    config: &ToolsConfig,
    aliases: &UserAliases,
) -> anyhow::Result<()> {
    let view = &config.view;
    let mut prefetch = prepare(session, &mut list, view, config.scheduler.prefetch).await?;
    if view.jid {
        for record in &list {
            println!("{}", record.key());
        }
        return Ok(());
    }

    let kind = list.kind();
    let mut printer = Printer::new(view.format, aliases);
    printer.header(kind);
    if view.pending && kind == EntityKind::Job {
        show_pending(session, &list, view, &mut printer, &mut prefetch).await?;
        return printer.finish();
    }
    match (&view.group_by, view.sum) {
        (None, false) => {
            for record in &list {
                prefetch.join(record.key()).await?;
                printer.record(record).await?;
            }
        }
        (None, true) => {
            prefetch.join_all().await?;
            printer.record(&list.summarize().await?).await?;
        }
        (Some(field), false) => {
            for (key, group) in list.group_by(field).await? {
                printer.title(&key.to_string());
                for record in &group {
                    prefetch.join(record.key()).await?;
                    printer.record(record).await?;
                }
            }
        }
        (Some(field), true) => {
            prefetch.join_all().await?;
            for summary in list.summarize_groups(field).await?.values() {
                printer.record(summary).await?;
            }
        }
    }
    printer.finish()
}

/// Jobs grouped by their pending reasons. A group with one reason is titled
/// by it; otherwise the reasons follow the jobs, then the hosts that could
/// run them.
async fn show_pending(
    session: &SchedulerSession,
    list: &EntityList,
    view: &ViewConfig,
    printer: &mut Printer<'_>,
    prefetch: &mut Prefetch,
) -> anyhow::Result<()> {
    prefetch.join_all().await?;
    let groups = list.group_by("pend_reason").await?;
    let several = groups.len() > 1;
    for group in groups.into_values() {
        let Some(first) = group.iter().next() else {
            continue;
        };
        let reasons = match value_or_null(first, "pend_reason").await? {
            FieldValue::Reasons(reasons) => reasons,
            _ => Vec::new(),
        };
        if let [reason] = reasons.as_slice() {
            printer.title(&reason.to_string());
        }
        if view.sum {
            printer.record(&group.summarize().await?).await?;
        } else {
            for record in &group {
                printer.record(record).await?;
            }
        }
        if reasons.len() < 2 || printer.format != OutputFormat::Table {
            continue;
        }
        for reason in &reasons {
            println!("{}", print::reason_line(reason));
        }
        let FieldValue::Text(resreq) = value_or_null(first, "resreq").await? else {
            continue;
        };
        let mut args = vec!["-R".to_owned(), candidate_resreq(&resreq)];
        if let FieldValue::List(hosts) = value_or_null(first, "host_req").await? {
            args.extend(hosts.iter().map(ToString::to_string));
        }
        let mut hosts = session.hosts(&args).await?;
        hosts.sort_default().await?;
        printer.header(EntityKind::Host);
        for host in &hosts {
            printer.record(host).await?;
        }
        if several {
            println!();
        }
    }
    Ok(())
}

/// Writes lines as they come, or collects JSON until [`Printer::finish`].
struct Printer<'a> {
    format: OutputFormat,
    aliases: &'a UserAliases,
    json: Vec<serde_json::Value>,
}

impl<'a> Printer<'a> {
    fn new(format: OutputFormat, aliases: &'a UserAliases) -> Self {
        Self {
            format,
            aliases,
            json: Vec::new(),
        }
    }

    fn header(&self, kind: EntityKind) {
        if self.format == OutputFormat::Table {
            println!("{}", print::header(kind));
        }
    }

    fn title(&mut self, title: &str) {
        if self.format == OutputFormat::Table {
            println!("{}", print::title(title));
        }
    }

    async fn record(&mut self, record: &Entity) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Table => {
                let mut values = Vec::new();
                for column in print::columns(record.kind()) {
                    let value = match value_or_null(record, column.field).await? {
                        FieldValue::Tag(user) if column.field == "user" => {
                            FieldValue::tag(self.aliases.alias_of(&user))
                        }
                        value => value,
                    };
                    values.push(value);
                }
                println!("{}", print::line(record.kind(), &values));
            }
            OutputFormat::Json => {
                let fields = record.fields().await?;
                self.json.push(serde_json::to_value(fields)?);
            }
        }
        Ok(())
    }

    fn finish(self) -> anyhow::Result<()> {
        if self.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&self.json)?);
        }
        Ok(())
    }
}

async fn value_or_null(record: &Entity, field: &str) -> SchedulerResult<FieldValue> {
    match record.get(field).await {
        Err(SchedulerException::NotFound { .. }) => Ok(FieldValue::Null),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use domain_scheduler::{
        mock::{job_listing, MockSchedulerClient},
        model::{entity::FetchState, vo::SchedulerOutput},
    };

    use super::*;

    fn session() -> SchedulerSession {
        let mut client = MockSchedulerClient::new();
        client.expect_bulk_list().times(1).returning(|_, _| {
            Ok(SchedulerOutput::ok(job_listing(&[
                &[("jobid", "3"), ("stat", "RUN"), ("submit_time", "Oct 19 10:00:00 2026")],
                &[("jobid", "1"), ("stat", "RUN"), ("submit_time", "Oct 19 08:00:00 2026")],
                &[("jobid", "2"), ("stat", "PEND"), ("submit_time", "Oct 19 09:00:00 2026")],
            ])))
        });
        client.expect_detail().times(3).returning(|_, key| {
            Ok(SchedulerOutput::ok(format!(
                "Job <{key}>, User <alice>, Queue <normal>, Command <./step{key}>\n"
            )))
        });
        SchedulerSession::builder().client(Arc::new(client)).build()
    }

    #[tokio::test]
    async fn test_prepare_prefetches_before_sorting() {
        let session = session();
        let mut jobs = session.jobs(&[]).await.unwrap();
        let view = ViewConfig::default();

        let mut prefetch = prepare(&session, &mut jobs, &view, true).await.unwrap();
        assert_eq!(prefetch.pending(), 3);
        assert_eq!(jobs.keys(), vec!["1", "3", "2"]);
        prefetch.join_all().await.unwrap();
        assert!(jobs.iter().all(|job| job.state() == FetchState::Fetched));
    }

    #[tokio::test]
    async fn test_prepare_sort_by_detail_field() {
        let session = session();
        let mut jobs = session.jobs(&[]).await.unwrap();
        let view = ViewConfig {
            sort_by: Some("command".to_owned()),
            ..Default::default()
        };

        // Each detail is queried once, by the prefetch or by the sort.
        let mut prefetch = prepare(&session, &mut jobs, &view, true).await.unwrap();
        prefetch.join_all().await.unwrap();
        assert_eq!(jobs.keys(), vec!["1", "2", "3"]);
    }
}
