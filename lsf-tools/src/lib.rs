//! Shared parts of the `ejobs`, `ehosts` and `ekill` tools.

pub mod aliases;
pub mod config;
pub mod print;
pub mod telemetry;
mod view;

pub use view::{cli_args, prepare, show};
