use std::sync::Arc;

use domain_scheduler::{
    exception::SchedulerResult,
    model::{
        entity::{Entity, EntityCache, EntityList},
        vo::EntityKind,
    },
    service::SchedulerClient,
};
use typed_builder::TypedBuilder;

use crate::Prefetch;

/// Every list and lookup of one invocation, sharing one record per job or
/// host.
#[derive(TypedBuilder)]
pub struct SchedulerSession {
    client: Arc<dyn SchedulerClient>,
    #[builder(default)]
    cache: Arc<EntityCache>,
    /// Concurrent detail queries of a prefetch.
    #[builder(default = 16)]
    prefetch_limit: usize,
}

impl SchedulerSession {
    /// `bjobs -w <args>`
    pub async fn jobs(&self, args: &[String]) -> SchedulerResult<EntityList> {
        EntityList::read(EntityKind::Job, args, &self.cache, &self.client).await
    }

    /// `bhosts -X -w <args>`
    pub async fn hosts(&self, args: &[String]) -> SchedulerResult<EntityList> {
        EntityList::read(EntityKind::Host, args, &self.cache, &self.client).await
    }

    pub fn job(&self, id: &str) -> Arc<Entity> {
        self.cache.resolve(EntityKind::Job, id, &self.client)
    }

    pub fn host(&self, name: &str) -> Arc<Entity> {
        self.cache.resolve(EntityKind::Host, name, &self.client)
    }

    /// A list of the given keys, nothing is queried yet.
    pub fn records<I, S>(&self, kind: EntityKind, keys: I) -> SchedulerResult<EntityList>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        EntityList::from_records(
            kind,
            keys.into_iter()
                .map(|key| self.cache.resolve(kind, key.as_ref(), &self.client)),
        )
    }

    /// Start querying the detail of every unfetched record of `list`.
    pub fn prefetch(&self, list: &EntityList) -> Prefetch {
        Prefetch::start(list, self.prefetch_limit)
    }

    /// Kill a job. `false` if the scheduler refused.
    pub async fn cancel(&self, id: &str) -> SchedulerResult<bool> {
        self.job(id).cancel().await
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }
}
