//! Kill jobs by id, reporting each one.

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use infrastructure_command::LsfClient;
use lsf_tools::{cli_args, config::build_config, config::ToolsConfig, telemetry::initialize_telemetry};
use service_scheduler::SchedulerSession;

#[tokio::main]
async fn main() -> ExitCode {
    let config: ToolsConfig = match build_config().and_then(|c| Ok(c.try_deserialize()?)) {
        Ok(x) => x,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to build config".red());
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = initialize_telemetry(&config.telemetry) {
        eprintln!("{}: {e}", "Failed to initialize logger".red());
        return ExitCode::FAILURE;
    }

    let ids = cli_args();
    if ids.is_empty() {
        eprintln!("usage: ekill <job id>...");
        return ExitCode::FAILURE;
    }
    let session = SchedulerSession::builder()
        .client(Arc::new(LsfClient::new(&config.scheduler.ssh_proxy)))
        .build();

    let mut failed = false;
    for id in &ids {
        match session.cancel(id).await {
            Ok(true) => println!("Job <{id}> is being terminated"),
            Ok(false) => println!("Job <{id}>: {}", "permission denied".yellow()),
            Err(e) => {
                eprintln!("{}: {e}", format!("Job <{id}>").red());
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
