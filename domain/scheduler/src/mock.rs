use async_trait::async_trait;
use mockall::mock;

use crate::{
    model::vo::{EntityKind, SchedulerOutput},
    service::SchedulerClient,
};

mock! {
    pub SchedulerClient {}
    #[async_trait]
    impl SchedulerClient for SchedulerClient {
        async fn bulk_list(&self, kind: EntityKind, args: &[String]) -> anyhow::Result<SchedulerOutput>;
        async fn detail(&self, kind: EntityKind, key: &str) -> anyhow::Result<SchedulerOutput>;
        async fn cancel_job(&self, id: &str) -> anyhow::Result<SchedulerOutput>;
    }
}

/// `bjobs -o` output with a header, one line per row. Columns a row does not
/// name are printed as `-`.
pub fn job_listing(rows: &[&[(&str, &str)]]) -> String {
    use crate::model::entity::job_listing_columns;

    let delimiter = crate::model::entity::JOB_LISTING_DELIMITER.to_string();
    let columns = job_listing_columns();
    let mut lines = vec![columns.iter().map(|c| c.to_uppercase()).collect::<Vec<_>>().join(&delimiter)];
    for row in rows {
        let cells: Vec<&str> = columns
            .iter()
            .map(|column| {
                row.iter()
                    .find(|(name, _)| name == column)
                    .map_or("-", |(_, value)| *value)
            })
            .collect();
        lines.push(cells.join(&delimiter));
    }
    lines.join("\n") + "\n"
}
