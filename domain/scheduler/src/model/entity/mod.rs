mod cache;
mod host;
mod job;
mod list;
mod record;
mod summary;

#[rustfmt::skip]
pub use self::{
    cache::EntityCache,
    job::{candidate_resreq, listing_columns as job_listing_columns, listing_format as job_listing_format, LISTING_DELIMITER as JOB_LISTING_DELIMITER},
    list::{EntityList, GroupKey, SortOrder},
    record::{Entity, FetchState},
    summary::common_pattern,
};
