use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Local;
use tokio::sync::Mutex;

use super::{host, job};
use crate::exception::{SchedulerException, SchedulerResult};
use crate::model::vo::{EntityKind, FieldValue, Fields};
use crate::service::SchedulerClient;

/// `bkill` refuses with this.
const PERMISSION_DENIED: &str = "User permission denied";
const NO_SUCH_JOB: &str = "No matching job found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// Only the fields of a bulk listing are known.
    Unfetched,
    Fetching,
    Fetched,
    /// The detail query failed. Not retried.
    Failed,
}

/// A job or a host.
///
/// Starts with the fields of a bulk listing and queries its full detail the
/// first time a field it does not know is read. Concurrent readers share one
/// query through the fetch gate.
pub struct Entity {
    kind: EntityKind,
    key: String,
    fields: RwLock<Fields>,
    state: RwLock<FetchState>,
    gate: Mutex<()>,
    source: Option<Arc<dyn SchedulerClient>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Entity {
    /// A record known only by its key.
    pub fn new(kind: EntityKind, key: impl Into<String>, source: Arc<dyn SchedulerClient>) -> Self {
        Self::shallow(kind, key, Fields::new(), source)
    }

    /// A record seeded with the fields of a bulk listing.
    pub fn shallow(
        kind: EntityKind,
        key: impl Into<String>,
        fields: Fields,
        source: Arc<dyn SchedulerClient>,
    ) -> Self {
        Self::build(kind, key.into(), fields, FetchState::Unfetched, Some(source))
    }

    /// A record with no scheduler behind it, such as a summary.
    pub fn synthetic(kind: EntityKind, key: impl Into<String>, fields: Fields) -> Self {
        Self::build(kind, key.into(), fields, FetchState::Fetched, None)
    }

    fn build(
        kind: EntityKind,
        key: String,
        mut fields: Fields,
        state: FetchState,
        source: Option<Arc<dyn SchedulerClient>>,
    ) -> Self {
        fields.insert(kind.key_field().to_owned(), FieldValue::text(&key));
        Self {
            kind,
            key,
            fields: RwLock::new(fields),
            state: RwLock::new(state),
            gate: Mutex::new(()),
            source,
        }
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> FetchState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: FetchState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// The value if already known, without querying.
    pub fn peek(&self, field: &str) -> Option<FieldValue> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner).get(field).cloned()
    }

    /// Every field known so far, without querying.
    pub fn snapshot(&self) -> Fields {
        self.fields.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, field: impl Into<String>, value: FieldValue) {
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(field.into(), value);
    }

    pub async fn get(&self, field: &str) -> SchedulerResult<FieldValue> {
        if let Some(value) = self.peek(field) {
            return Ok(value);
        }
        self.ensure_fetched().await?;
        self.peek(field).ok_or_else(|| SchedulerException::NotFound {
            kind: self.kind,
            key: self.key.clone(),
            field: field.to_owned(),
        })
    }

    /// A field known to be `Null` is not contained and is not queried.
    pub async fn contains(&self, field: &str) -> SchedulerResult<bool> {
        if let Some(value) = self.peek(field) {
            return Ok(!value.is_null());
        }
        self.ensure_fetched().await?;
        Ok(self.peek(field).is_some())
    }

    /// Every field after the detail query.
    pub async fn fields(&self) -> SchedulerResult<Fields> {
        self.ensure_fetched().await?;
        Ok(self.snapshot())
    }

    fn settled(&self) -> Option<bool> {
        match self.state() {
            FetchState::Fetched => Some(true),
            FetchState::Failed => Some(false),
            FetchState::Unfetched | FetchState::Fetching => None,
        }
    }

    /// Query the full detail once. Returns whether the record is fetched.
    ///
    /// An unknown entity or an unexpected output shape leaves the record
    /// `Failed` with its listing fields and returns `false`.
    pub async fn ensure_fetched(&self) -> SchedulerResult<bool> {
        if let Some(fetched) = self.settled() {
            return Ok(fetched);
        }
        let _gate = self.gate.lock().await;
        if let Some(fetched) = self.settled() {
            return Ok(fetched);
        }

        self.set_state(FetchState::Fetching);
        match self.fetch().await {
            Ok(detail) => {
                self.fields
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(detail);
                self.set_state(FetchState::Fetched);
                Ok(true)
            }
            Err(e) if e.is_soft_fetch_failure() => {
                tracing::warn!("{e}");
                self.set_state(FetchState::Failed);
                Ok(false)
            }
            Err(e) => {
                self.set_state(FetchState::Failed);
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> SchedulerResult<Fields> {
        let Some(source) = &self.source else {
            return Ok(Fields::new());
        };
        let output = source.detail(self.kind, &self.key).await?;
        if output.is_refusal() {
            return Err(SchedulerException::EntityNotFound {
                kind: self.kind,
                key: self.key.clone(),
            });
        }
        let mut detail = match self.kind {
            EntityKind::Job => job::parse_detail(&self.key, &output.stdout, Local::now())?,
            EntityKind::Host => host::parse_detail(&self.key, &output.stdout)?,
        };
        detail.insert(self.kind.key_field().to_owned(), FieldValue::text(&self.key));
        Ok(detail)
    }

    /// Kill the job. Returns `false` if the scheduler refused, in which case
    /// the record forgets everything but its key and is queried again on the
    /// next read. Any other unsuccessful `bkill` is an error.
    pub async fn cancel(&self) -> SchedulerResult<bool> {
        if self.kind != EntityKind::Job {
            return Err(SchedulerException::Unsupported {
                kind: self.kind,
                operation: "cancel",
            });
        }
        let Some(source) = &self.source else {
            return Err(SchedulerException::Unsupported {
                kind: self.kind,
                operation: "cancel",
            });
        };
        let output = source.cancel_job(&self.key).await?;
        if output.mentions(PERMISSION_DENIED) {
            let _gate = self.gate.lock().await;
            let mut fields = self.fields.write().unwrap_or_else(PoisonError::into_inner);
            fields.clear();
            fields.insert(self.kind.key_field().to_owned(), FieldValue::text(&self.key));
            drop(fields);
            self.set_state(FetchState::Unfetched);
            return Ok(false);
        }
        if output.mentions(NO_SUCH_JOB) {
            return Err(SchedulerException::EntityNotFound {
                kind: self.kind,
                key: self.key.clone(),
            });
        }
        if !output.success {
            return Err(SchedulerException::ToolFailure {
                command: format!("bkill {}", self.key),
                reason: output.stderr.trim().to_owned(),
            });
        }
        tracing::info!("Job <{}> cancelled.", self.key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use indoc::indoc;

    use super::*;
    use crate::mock::MockSchedulerClient;
    use crate::model::vo::SchedulerOutput;

    const DETAIL: &str = indoc! {"
        Job <123>, Job Name <sim>, User <alice>, Project <default>, Status <RUN>, Queue <n
                             ormal>, Command <./sim>
        Mon Oct 19 10:00:01: Submitted from host <login1>, CWD <$HOME>, Exclusive Execution;
        Mon Oct 19 10:00:05: Started on <2*node01>, Execution Home </home/alice>, Execution
                              CWD </home/alice>;

         MEMLIMIT
              2 G
    "};

    fn shallow(client: impl SchedulerClient + 'static) -> Entity {
        let fields = Fields::from([("stat".to_string(), FieldValue::tag("PEND"))]);
        Entity::shallow(EntityKind::Job, "123", fields, Arc::new(client))
    }

    /// Counts detail queries and sleeps in them so callers overlap.
    #[derive(Default)]
    struct CountingClient {
        details: AtomicUsize,
    }

    #[async_trait]
    impl SchedulerClient for CountingClient {
        async fn bulk_list(&self, _: EntityKind, _: &[String]) -> anyhow::Result<SchedulerOutput> {
            Ok(SchedulerOutput::ok(""))
        }

        async fn detail(&self, _: EntityKind, _: &str) -> anyhow::Result<SchedulerOutput> {
            self.details.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(SchedulerOutput::ok(DETAIL))
        }

        async fn cancel_job(&self, _: &str) -> anyhow::Result<SchedulerOutput> {
            Ok(SchedulerOutput::ok(""))
        }
    }

    #[tokio::test]
    async fn test_get_fetches_once() {
        let mut client = MockSchedulerClient::new();
        client
            .expect_detail()
            .withf(|kind, key| *kind == EntityKind::Job && key == "123")
            .times(1)
            .returning(|_, _| Ok(SchedulerOutput::ok(DETAIL)));
        let job = shallow(client);

        // Known from the listing, no query.
        assert_eq!(job.get("stat").await.unwrap(), FieldValue::tag("PEND"));
        assert_eq!(job.state(), FetchState::Unfetched);

        let first = job.get("memlimit").await.unwrap();
        let second = job.get("memlimit").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, FieldValue::Memory(2 * 1024 * 1024 * 1024));
        assert_eq!(job.state(), FetchState::Fetched);
        // Detail wins over the listing.
        assert_eq!(job.peek("stat"), Some(FieldValue::tag("RUN")));
        assert_eq!(job.get("exclusive").await.unwrap(), FieldValue::Bool(true));
        assert_eq!(job.get("slots").await.unwrap(), FieldValue::Int(2));
        assert_eq!(job.get("jobid").await.unwrap(), FieldValue::text("123"));

        let err = job.get("no_such_field").await.unwrap_err();
        assert!(matches!(err, SchedulerException::NotFound { ref field, .. } if field == "no_such_field"));
        assert!(!job.contains("no_such_field").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetch() {
        let client = Arc::new(CountingClient::default());
        let job = Arc::new(Entity::new(EntityKind::Job, "123", client.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let job = job.clone();
                tokio::spawn(async move { job.ensure_fetched().await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }
        assert_eq!(client.details.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_entity_is_not_retried() {
        let mut client = MockSchedulerClient::new();
        client
            .expect_detail()
            .times(1)
            .returning(|_, _| Ok(SchedulerOutput::failed("Job <123> is not found")));
        let job = shallow(client);

        assert!(!job.ensure_fetched().await.unwrap());
        assert_eq!(job.state(), FetchState::Failed);
        assert!(!job.ensure_fetched().await.unwrap());
        // The listing fields are still served.
        assert_eq!(job.get("stat").await.unwrap(), FieldValue::tag("PEND"));
        assert!(matches!(
            job.get("queue").await.unwrap_err(),
            SchedulerException::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_value_propagates() {
        let mut client = MockSchedulerClient::new();
        client.expect_detail().times(1).returning(|_, _| {
            Ok(SchedulerOutput::ok("Job <123>, User <bob>;\n\n MEMLIMIT\n      2 Q\n"))
        });
        let job = shallow(client);

        let err = job.get("queue").await.unwrap_err();
        assert!(matches!(err, SchedulerException::MalformedValue { .. }));
        assert_eq!(job.state(), FetchState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_denied_resets() {
        let mut client = MockSchedulerClient::new();
        client
            .expect_cancel_job()
            .times(1)
            .returning(|_| Ok(SchedulerOutput::failed("Job <123>: User permission denied")));
        client
            .expect_detail()
            .times(1)
            .returning(|_, _| Ok(SchedulerOutput::ok(DETAIL)));
        let job = shallow(client);
        job.set("note", FieldValue::text("mine"));

        assert!(!job.cancel().await.unwrap());
        assert_eq!(job.state(), FetchState::Unfetched);
        assert_eq!(job.snapshot().len(), 1);
        assert_eq!(job.peek("jobid"), Some(FieldValue::text("123")));
        // Re-synced on the next read.
        assert_eq!(job.get("stat").await.unwrap(), FieldValue::tag("RUN"));
    }

    #[tokio::test]
    async fn test_cancel() {
        let mut client = MockSchedulerClient::new();
        client
            .expect_cancel_job()
            .withf(|id| id == "123")
            .times(1)
            .returning(|_| Ok(SchedulerOutput::ok("Job <123> is being terminated")));
        assert!(shallow(client).cancel().await.unwrap());

        let mut client = MockSchedulerClient::new();
        client
            .expect_cancel_job()
            .returning(|_| Err(anyhow::anyhow!("ssh: connect to host login1 port 22: Connection refused")));
        let err = shallow(client).cancel().await.unwrap_err();
        assert!(matches!(err, SchedulerException::InternalError { .. }));
    }

    #[tokio::test]
    async fn test_cancel_failed_bkill() {
        let mut client = MockSchedulerClient::new();
        client
            .expect_cancel_job()
            .times(1)
            .returning(|_| Ok(SchedulerOutput::failed("Job <123>: Job has already finished")));
        let job = shallow(client);

        let err = job.cancel().await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerException::ToolFailure { ref command, ref reason }
                if command == "bkill 123" && reason == "Job <123>: Job has already finished"
        ));
        // Nothing was forgotten.
        assert_eq!(job.peek("stat"), Some(FieldValue::tag("PEND")));
        assert_eq!(job.state(), FetchState::Unfetched);
    }

    #[tokio::test]
    async fn test_null_field_is_known() {
        let fields = Fields::from([("exec_host".to_string(), FieldValue::Null)]);
        let job = Entity::shallow(EntityKind::Job, "123", fields, Arc::new(MockSchedulerClient::new()));

        assert_eq!(job.get("exec_host").await.unwrap(), FieldValue::Null);
        assert!(!job.contains("exec_host").await.unwrap());
        assert_eq!(job.state(), FetchState::Unfetched);
    }

    #[tokio::test]
    async fn test_cancel_host() {
        let host = Entity::new(EntityKind::Host, "node01", Arc::new(MockSchedulerClient::new()));
        let err = host.cancel().await.unwrap_err();
        assert!(matches!(err, SchedulerException::Unsupported { kind: EntityKind::Host, .. }));
    }

    #[tokio::test]
    async fn test_synthetic() {
        let summary = Entity::synthetic(
            EntityKind::Job,
            "12*",
            Fields::from([("slots".to_string(), FieldValue::Int(5))]),
        );
        assert_eq!(summary.state(), FetchState::Fetched);
        assert!(summary.ensure_fetched().await.unwrap());
        assert_eq!(summary.get("slots").await.unwrap(), FieldValue::Int(5));
        assert_eq!(summary.get("jobid").await.unwrap(), FieldValue::text("12*"));
    }
}
