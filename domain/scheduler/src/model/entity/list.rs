use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};

use super::{host, job, Entity, EntityCache};
use crate::exception::{SchedulerException, SchedulerResult};
use crate::model::vo::{EntityKind, FieldValue, JobStatus, PendingReason};
use crate::service::SchedulerClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Bucket of [`EntityList::group_by`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    /// The field is absent or an empty collection.
    Null,
    Bool(bool),
    Int(i64),
    Duration(Duration),
    Time(DateTime<Local>),
    Text(String),
    /// A whole, sorted set of pending reasons.
    Reasons(Vec<PendingReason>),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Null => f.write_str("-"),
            GroupKey::Bool(b) => write!(f, "{b}"),
            GroupKey::Int(i) => write!(f, "{i}"),
            GroupKey::Duration(d) => write!(f, "{}", FieldValue::Duration(*d)),
            GroupKey::Time(t) => write!(f, "{}", FieldValue::Time(*t)),
            GroupKey::Text(s) => f.write_str(s),
            GroupKey::Reasons(reasons) => write!(f, "{}", FieldValue::Reasons(reasons.clone())),
        }
    }
}

impl GroupKey {
    /// Collections put a record into one bucket per element.
    fn of(value: &FieldValue) -> Vec<GroupKey> {
        let keys: Vec<GroupKey> = match value {
            FieldValue::Null => vec![],
            FieldValue::Text(s) | FieldValue::Tag(s) => vec![GroupKey::Text(s.clone())],
            FieldValue::Int(i) => vec![GroupKey::Int(*i)],
            FieldValue::Memory(m) => vec![GroupKey::Int(i64::try_from(*m).unwrap_or(i64::MAX))],
            FieldValue::Float(_) | FieldValue::Ratio(_) => vec![GroupKey::Text(value.to_string())],
            FieldValue::Duration(d) => vec![GroupKey::Duration(*d)],
            FieldValue::Time(t) => vec![GroupKey::Time(*t)],
            FieldValue::Bool(b) => vec![GroupKey::Bool(*b)],
            FieldValue::Map(m) => m.keys().cloned().map(GroupKey::Text).collect(),
            FieldValue::Histogram(h) => h.keys().cloned().map(GroupKey::Text).collect(),
            FieldValue::List(items) => items.iter().flat_map(GroupKey::of).collect(),
            FieldValue::Reasons(reasons) if reasons.is_empty() => vec![],
            FieldValue::Reasons(reasons) => {
                let mut reasons = reasons.clone();
                reasons.sort();
                vec![GroupKey::Reasons(reasons)]
            }
        };
        if keys.is_empty() {
            vec![GroupKey::Null]
        } else {
            keys
        }
    }
}

/// Ordered records of one kind.
#[derive(Debug, Clone)]
pub struct EntityList {
    kind: EntityKind,
    records: Vec<Arc<Entity>>,
}

impl EntityList {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            records: Vec::new(),
        }
    }

    pub fn from_records(kind: EntityKind, records: impl IntoIterator<Item = Arc<Entity>>) -> SchedulerResult<Self> {
        let mut list = Self::new(kind);
        list.extend(records)?;
        Ok(list)
    }

    /// Run the bulk listing and turn each line into a record through `cache`.
    ///
    /// A failing listing is an error unless the scheduler said that nothing
    /// matched, which gives an empty list.
    pub async fn read(
        kind: EntityKind,
        args: &[String],
        cache: &EntityCache,
        client: &Arc<dyn SchedulerClient>,
    ) -> SchedulerResult<Self> {
        let (program, empty_markers) = match kind {
            EntityKind::Job => ("bjobs -X -o", job::EMPTY_MARKERS),
            EntityKind::Host => ("bhosts -X -w", host::EMPTY_MARKERS),
        };
        let command = format!("{program} {}", args.join(" "));
        let output = client
            .bulk_list(kind, args)
            .await
            .map_err(|e| SchedulerException::ToolFailure {
                command: command.trim().to_owned(),
                reason: format!("{e:#}"),
            })?;
        let nothing_matched = empty_markers.iter().any(|marker| output.mentions(marker));
        if !output.success && !nothing_matched {
            return Err(SchedulerException::ToolFailure {
                command: command.trim().to_owned(),
                reason: output.stderr.trim().to_owned(),
            });
        }

        let parsed = match kind {
            EntityKind::Job => job::parse_listing(&output.stdout, Local::now()),
            EntityKind::Host => host::parse_listing(&output.stdout)?,
        };
        let records = parsed
            .into_iter()
            .map(|(key, fields)| cache.insert(Entity::shallow(kind, key, fields, client.clone())))
            .collect();
        Ok(Self { kind, records })
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn append(&mut self, record: Arc<Entity>) -> SchedulerResult<()> {
        if record.kind() != self.kind {
            return Err(SchedulerException::KindMismatch {
                expected: self.kind,
                found: record.kind(),
                key: record.key().to_owned(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = Arc<Entity>>) -> SchedulerResult<()> {
        for record in records {
            self.append(record)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Entity>> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.key()).collect()
    }

    /// Partition by the value of `field`. A record whose value is a map, list
    /// or histogram lands in the bucket of every element.
    pub async fn group_by(&self, field: &str) -> SchedulerResult<BTreeMap<GroupKey, EntityList>> {
        let mut groups: BTreeMap<GroupKey, EntityList> = BTreeMap::new();
        for record in &self.records {
            let value = value_of(record, field).await?;
            for key in GroupKey::of(&value) {
                groups
                    .entry(key)
                    .or_insert_with(|| EntityList::new(self.kind))
                    .records
                    .push(record.clone());
            }
        }
        Ok(groups)
    }

    /// One stable pass. Sort by the least significant key first.
    pub async fn sort_by(&mut self, field: &str, order: SortOrder) -> SchedulerResult<()> {
        let mut values = Vec::with_capacity(self.records.len());
        for record in &self.records {
            values.push(value_of(record, field).await?);
        }
        let mut keyed: Vec<_> = values.into_iter().zip(self.records.drain(..)).collect();
        keyed.sort_by(|(a, _), (b, _)| match order {
            SortOrder::Ascending => a.cmp_loose(b),
            SortOrder::Descending => b.cmp_loose(a),
        });
        self.records = keyed.into_iter().map(|(_, record)| record).collect();
        Ok(())
    }

    /// Running jobs first, finished jobs last.
    pub fn sort_by_status(&mut self) {
        let status_field = self.kind.status_field();
        self.records.sort_by_cached_key(|record| {
            let rank = record
                .peek(status_field)
                .and_then(|status| status.as_str().map(|s| JobStatus::from_str(s).unwrap_or(JobStatus::Unknown).rank()))
                .unwrap_or(JobStatus::Unknown.rank());
            std::cmp::Reverse(rank)
        });
    }

    /// Jobs by status, then longest running, then priority, then the oldest
    /// submission. Hosts by name.
    pub async fn sort_default(&mut self) -> SchedulerResult<()> {
        match self.kind {
            EntityKind::Job => {
                self.sort_by("submit_time", SortOrder::Ascending).await?;
                self.sort_by("job_priority", SortOrder::Descending).await?;
                self.sort_by("run_time", SortOrder::Descending).await?;
                self.sort_by_status();
            }
            EntityKind::Host => self.sort_by("host_name", SortOrder::Ascending).await?,
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a EntityList {
    type Item = &'a Arc<Entity>;
    type IntoIter = std::slice::Iter<'a, Arc<Entity>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A missing field reads as `Null`.
async fn value_of(record: &Entity, field: &str) -> SchedulerResult<FieldValue> {
    match record.get(field).await {
        Ok(value) => Ok(value),
        Err(SchedulerException::NotFound { .. }) => Ok(FieldValue::Null),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{job_listing, MockSchedulerClient};
    use crate::model::entity::FetchState;
    use crate::model::vo::{Fields, SchedulerOutput};

    fn record(key: &str, fields: Vec<(&str, FieldValue)>) -> Arc<Entity> {
        let fields: Fields = fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect();
        Arc::new(Entity::synthetic(EntityKind::Job, key, fields))
    }

    fn client(mock: MockSchedulerClient) -> Arc<dyn SchedulerClient> {
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_read_shares_records() {
        let mut mock = MockSchedulerClient::new();
        mock.expect_bulk_list().times(2).returning(|_, args| {
            let alice: &[(&str, &str)] = &[("jobid", "123"), ("user", "alice"), ("stat", "PEND")];
            let bob: &[(&str, &str)] = &[("jobid", "124"), ("user", "bob"), ("stat", "PEND")];
            Ok(SchedulerOutput::ok(match args.first().map(String::as_str) {
                Some("-u") => job_listing(&[alice]),
                _ => job_listing(&[alice, bob]),
            }))
        });
        let client = client(mock);
        let cache = EntityCache::new();

        let all = EntityList::read(EntityKind::Job, &[], &cache, &client).await.unwrap();
        let mine = EntityList::read(EntityKind::Job, &["-u".to_owned(), "alice".to_owned()], &cache, &client)
            .await
            .unwrap();
        assert_eq!(all.keys(), vec!["123", "124"]);
        assert_eq!(mine.keys(), vec!["123"]);
        assert_eq!(cache.len(), 2);

        let shared = mine.iter().next().unwrap();
        assert!(Arc::ptr_eq(shared, all.iter().next().unwrap()));
        shared.set("note", FieldValue::text("seen"));
        assert_eq!(all.iter().next().unwrap().peek("note"), Some(FieldValue::text("seen")));
    }

    #[tokio::test]
    async fn test_read_failures() {
        let mut mock = MockSchedulerClient::new();
        mock.expect_bulk_list()
            .returning(|_, _| Ok(SchedulerOutput::failed("No unfinished job found")));
        let list = EntityList::read(EntityKind::Job, &[], &EntityCache::new(), &client(mock))
            .await
            .unwrap();
        assert!(list.is_empty());

        let mut mock = MockSchedulerClient::new();
        mock.expect_bulk_list()
            .returning(|_, _| Ok(SchedulerOutput::failed("LSF is down. Please wait")));
        let err = EntityList::read(EntityKind::Host, &[], &EntityCache::new(), &client(mock))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerException::ToolFailure { ref command, .. } if command == "bhosts -X -w"));

        let mut mock = MockSchedulerClient::new();
        mock.expect_bulk_list()
            .returning(|_, _| Err(anyhow::anyhow!("No such file or directory (os error 2)")));
        let err = EntityList::read(EntityKind::Job, &[], &EntityCache::new(), &client(mock))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerException::ToolFailure { .. }));
    }

    #[test]
    fn test_kind_mismatch() {
        let mut list = EntityList::new(EntityKind::Host);
        let err = list.append(record("123", vec![])).unwrap_err();
        assert!(matches!(
            err,
            SchedulerException::KindMismatch {
                expected: EntityKind::Host,
                found: EntityKind::Job,
                ..
            }
        ));
        assert!(EntityList::from_records(EntityKind::Job, [record("1", vec![])]).is_ok());
    }

    #[tokio::test]
    async fn test_group_by_collections() {
        let hosts = |pairs: &[(&str, i64)]| {
            FieldValue::Map(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
        };
        let list = EntityList::from_records(
            EntityKind::Job,
            [
                record("1", vec![("exec_host", hosts(&[("h1", 2), ("h2", 3)]))]),
                record("2", vec![("exec_host", hosts(&[("h2", 1)]))]),
                record("3", vec![("exec_host", hosts(&[]))]),
                record("4", vec![]),
            ],
        )
        .unwrap();

        let groups = list.group_by("exec_host").await.unwrap();
        let keys = |k: GroupKey| groups[&k].keys().into_iter().map(str::to_owned).collect::<Vec<_>>();
        assert_eq!(groups.len(), 3);
        assert_eq!(keys(GroupKey::Text("h1".into())), vec!["1"]);
        assert_eq!(keys(GroupKey::Text("h2".into())), vec!["1", "2"]);
        assert_eq!(keys(GroupKey::Null), vec!["3", "4"]);
    }

    #[tokio::test]
    async fn test_group_by_reasons() {
        let a = PendingReason::new("Not enough job slot(s)", Some(3));
        let b = PendingReason::new("New job is waiting for scheduling", None);
        let list = EntityList::from_records(
            EntityKind::Job,
            [
                record("1", vec![("pend_reason", FieldValue::Reasons(vec![a.clone(), b.clone()]))]),
                record("2", vec![("pend_reason", FieldValue::Reasons(vec![b.clone(), a.clone()]))]),
                record("3", vec![("pend_reason", FieldValue::Reasons(vec![b.clone()]))]),
                record("4", vec![("stat", FieldValue::tag("RUN"))]),
            ],
        )
        .unwrap();

        let groups = list.group_by("pend_reason").await.unwrap();
        assert_eq!(groups.len(), 3);
        let mut both = vec![a, b.clone()];
        both.sort();
        assert_eq!(groups[&GroupKey::Reasons(both)].keys(), vec!["1", "2"]);
        assert_eq!(groups[&GroupKey::Reasons(vec![b])].keys(), vec!["3"]);
        assert_eq!(groups[&GroupKey::Null].keys(), vec!["4"]);
    }

    #[tokio::test]
    async fn test_sort_default() {
        let list = ["PEND", "RUN", "UNKWN", "DONE"]
            .into_iter()
            .enumerate()
            .map(|(i, stat)| record(&i.to_string(), vec![("stat", FieldValue::tag(stat))]));
        let mut list = EntityList::from_records(EntityKind::Job, list).unwrap();
        list.sort_default().await.unwrap();
        let stats: Vec<String> = list.iter().map(|r| r.peek("stat").unwrap().to_string()).collect();
        assert_eq!(stats, vec!["RUN", "PEND", "UNKWN", "DONE"]);
    }

    #[tokio::test]
    async fn test_sort_default_reads_listing_only() {
        let mut mock = MockSchedulerClient::new();
        mock.expect_bulk_list().times(1).returning(|_, _| {
            Ok(SchedulerOutput::ok(job_listing(&[
                &[("jobid", "1"), ("stat", "PEND"), ("submit_time", "Oct 19 09:00:00 2026")],
                &[
                    ("jobid", "2"),
                    ("stat", "RUN"),
                    ("job_priority", "10"),
                    ("run_time", "60 second(s)"),
                    ("submit_time", "Oct 19 08:00:00 2026"),
                ],
                &[
                    ("jobid", "3"),
                    ("stat", "RUN"),
                    ("job_priority", "10"),
                    ("run_time", "600 second(s)"),
                    ("submit_time", "Oct 19 10:00:00 2026"),
                ],
            ])))
        });
        mock.expect_detail().never();
        let mut jobs = EntityList::read(EntityKind::Job, &[], &EntityCache::new(), &client(mock))
            .await
            .unwrap();

        jobs.sort_default().await.unwrap();
        assert_eq!(jobs.keys(), vec!["3", "2", "1"]);
        assert!(jobs.iter().all(|job| job.state() == FetchState::Unfetched));
    }

    #[tokio::test]
    async fn test_sort_cascade() {
        let list = [("1", 10, 5), ("2", 30, 5), ("3", 20, 9)]
            .into_iter()
            .map(|(key, priority, slots)| {
                record(
                    key,
                    vec![
                        ("job_priority", FieldValue::Ratio(priority as f64)),
                        ("slots", FieldValue::Int(slots)),
                    ],
                )
            });
        let mut list = EntityList::from_records(EntityKind::Job, list).unwrap();
        list.sort_by("job_priority", SortOrder::Descending).await.unwrap();
        list.sort_by("slots", SortOrder::Ascending).await.unwrap();
        assert_eq!(list.keys(), vec!["2", "1", "3"]);
        list.sort_by("missing", SortOrder::Ascending).await.unwrap();
        assert_eq!(list.keys(), vec!["2", "1", "3"]);
    }
}
