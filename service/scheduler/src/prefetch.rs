use std::collections::HashMap;
use std::sync::Arc;

use domain_scheduler::{
    exception::SchedulerResult,
    model::entity::{EntityList, FetchState},
};
use tokio::{sync::Semaphore, task::JoinHandle};

/// Background detail queries for the records of a list, at most `limit` at
/// a time. Join the record you are about to read; the others keep running.
#[derive(Debug, Default)]
pub struct Prefetch {
    handles: HashMap<String, JoinHandle<SchedulerResult<bool>>>,
}

impl Prefetch {
    pub fn start(list: &EntityList, limit: usize) -> Self {
        let semaphore = Arc::new(Semaphore::new(limit.max(1)));
        let mut handles = HashMap::new();
        for record in list.iter().filter(|r| r.state() == FetchState::Unfetched) {
            if handles.contains_key(record.key()) {
                continue;
            }
            let semaphore = semaphore.clone();
            let task_record = record.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(anyhow::Error::from)?;
                task_record.ensure_fetched().await
            });
            handles.insert(record.key().to_owned(), handle);
        }
        tracing::debug!("Prefetching {} of {} records.", handles.len(), list.len());
        Self { handles }
    }

    /// Wait for the query of `key`. Returns at once for records that are
    /// not being prefetched or were joined before.
    pub async fn join(&mut self, key: &str) -> SchedulerResult<()> {
        let Some(handle) = self.handles.remove(key) else {
            return Ok(());
        };
        handle.await.map_err(anyhow::Error::from)??;
        Ok(())
    }

    pub async fn join_all(&mut self) -> SchedulerResult<()> {
        for (_, handle) in self.handles.drain() {
            handle.await.map_err(anyhow::Error::from)??;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.handles.len()
    }
}
