//! Session over one scheduler: shared record cache, list building and
//! background prefetch.

mod prefetch;
mod session;

#[rustfmt::skip]
pub use {
    prefetch::Prefetch,
    session::SchedulerSession,
};
