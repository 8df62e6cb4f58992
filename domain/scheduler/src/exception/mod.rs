use thiserror::Error;

use crate::model::vo::EntityKind;

pub type SchedulerResult<T> = Result<T, SchedulerException>;

#[derive(Error, Debug)]
pub enum SchedulerException {
    #[error("{kind} <{key}> has no field `{field}`.")]
    NotFound {
        kind: EntityKind,
        key: String,
        field: String,
    },

    #[error("{kind} <{key}> is unknown to the scheduler.")]
    EntityNotFound { kind: EntityKind, key: String },

    #[error("Unexpected output for {kind} <{key}>: {reason}.")]
    MalformedOutput {
        kind: EntityKind,
        key: String,
        reason: String,
    },

    #[error("Malformed value `{value}` for field `{field}`: {reason}.")]
    MalformedValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("`{command}` failed: {reason}")]
    ToolFailure { command: String, reason: String },

    #[error("{expected} list can not hold a {found} record <{key}>.")]
    KindMismatch {
        expected: EntityKind,
        found: EntityKind,
        key: String,
    },

    #[error("Can not summarize an empty {kind} list.")]
    EmptyAggregate { kind: EntityKind },

    #[error("`{operation}` is not supported for {kind} records.")]
    Unsupported {
        kind: EntityKind,
        operation: &'static str,
    },

    #[error("Scheduler internal error: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl SchedulerException {
    pub(crate) fn malformed_value(
        field: &str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedValue {
            field: field.to_owned(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Failures that end a fetch quietly: the record keeps whatever it has.
    pub fn is_soft_fetch_failure(&self) -> bool {
        matches!(self, Self::EntityNotFound { .. } | Self::MalformedOutput { .. })
    }
}

impl From<anyhow::Error> for SchedulerException {
    fn from(e: anyhow::Error) -> Self {
        SchedulerException::InternalError { source: e }
    }
}
