//! Value objects

pub mod field;
mod kind;
mod output;
pub mod rule;
mod status;

#[rustfmt::skip]
pub use self::{
    field::{FieldValue, Fields, PendingReason},
    kind::EntityKind,
    output::SchedulerOutput,
    rule::{Extract, FieldRule},
    status::JobStatus,
};
