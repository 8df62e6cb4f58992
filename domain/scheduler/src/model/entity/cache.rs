use std::sync::Arc;

use dashmap::DashMap;

use super::Entity;
use crate::model::vo::EntityKind;
use crate::service::SchedulerClient;

/// One record per (kind, key) for a whole session.
///
/// Every list and lookup goes through [`EntityCache::insert`], so a job seen
/// by two listings is the same record in both.
#[derive(Debug, Default)]
pub struct EntityCache {
    records: DashMap<(EntityKind, String), Arc<Entity>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached record if there is one, else caches `candidate`.
    pub fn insert(&self, candidate: Entity) -> Arc<Entity> {
        self.records
            .entry((candidate.kind(), candidate.key().to_owned()))
            .or_insert_with(|| Arc::new(candidate))
            .clone()
    }

    pub fn get(&self, kind: EntityKind, key: &str) -> Option<Arc<Entity>> {
        self.records.get(&(kind, key.to_owned())).map(|r| r.clone())
    }

    /// The record for `key`, created unfetched if it is not cached yet.
    pub fn resolve(&self, kind: EntityKind, key: &str, source: &Arc<dyn SchedulerClient>) -> Arc<Entity> {
        if let Some(record) = self.get(kind, key) {
            return record;
        }
        self.insert(Entity::new(kind, key, source.clone()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSchedulerClient;
    use crate::model::vo::{FieldValue, Fields};

    #[test]
    fn test_insert_keeps_first() {
        let source: Arc<dyn SchedulerClient> = Arc::new(MockSchedulerClient::new());
        let cache = EntityCache::new();

        let first = cache.insert(Entity::shallow(
            EntityKind::Job,
            "123",
            Fields::from([("stat".to_string(), FieldValue::tag("RUN"))]),
            source.clone(),
        ));
        let second = cache.insert(Entity::shallow(
            EntityKind::Job,
            "123",
            Fields::from([("stat".to_string(), FieldValue::tag("DONE"))]),
            source.clone(),
        ));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.peek("stat"), Some(FieldValue::tag("RUN")));

        // Same key, other kind.
        let host = cache.resolve(EntityKind::Host, "123", &source);
        assert!(!Arc::ptr_eq(&first, &host));
        assert!(Arc::ptr_eq(&cache.resolve(EntityKind::Job, "123", &source), &first));
        assert_eq!(cache.len(), 2);
    }
}
