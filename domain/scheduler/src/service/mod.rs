mod scheduler_client;

#[rustfmt::skip]
pub use {
    scheduler_client::SchedulerClient,
};
