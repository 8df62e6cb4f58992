//! `bhosts` with grouping, summaries and colored output.

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use infrastructure_command::LsfClient;
use lsf_tools::{
    aliases::UserAliases, cli_args, config::build_config, config::ToolsConfig, show,
    telemetry::initialize_telemetry,
};
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

    let session = SchedulerSession::builder()
        .client(Arc::new(LsfClient::new(&config.scheduler.ssh_proxy)))
        .prefetch_limit(config.scheduler.prefetch_limit)
        .build();
    let result = match session.hosts(&cli_args()).await {
        Ok(hosts) => show(&session, hosts, &config, &UserAliases::default()).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        eprintln!("{}: {e:#}", "ehosts".red());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
