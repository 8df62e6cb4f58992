//! Typed records for LSF jobs and hosts: parsing, identity caching,
//! grouping and aggregation.

pub mod exception;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;
pub mod service;
