use crate::model::vo::{EntityKind, SchedulerOutput};

/// The scheduler's native query and control commands.
///
/// Implementations only run the command and capture what it printed;
/// interpreting the text is up to the records.
#[async_trait::async_trait]
pub trait SchedulerClient: Send + Sync {
    /// One summary line per entity matching `args`.
    async fn bulk_list(&self, kind: EntityKind, args: &[String]) -> anyhow::Result<SchedulerOutput>;
    /// Every attribute of one entity as bracketed prose.
    async fn detail(&self, kind: EntityKind, key: &str) -> anyhow::Result<SchedulerOutput>;
    async fn cancel_job(&self, id: &str) -> anyhow::Result<SchedulerOutput>;
}
