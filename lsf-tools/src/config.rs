use infrastructure_command::SshProxyConfig;
use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetryConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "Default::default")]
    pub scheduler: SchedulerConfig,
    #[serde(default = "Default::default")]
    pub view: ViewConfig,
    #[serde(default = "Default::default")]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the LSF commands on another host.
    #[serde(default = "Default::default")]
    pub ssh_proxy: Option<SshProxyConfig>,
    /// Query job details in the background while printing.
    #[serde(default = "Default::default")]
    pub prefetch: bool,
    #[serde(default = "SchedulerConfig::default_prefetch_limit")]
    pub prefetch_limit: usize,
}

impl SchedulerConfig {
    fn default_prefetch_limit() -> usize {
        16
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ssh_proxy: None,
            prefetch: false,
            prefetch_limit: Self::default_prefetch_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "Default::default")]
    pub group_by: Option<String>,
    /// Applied after the default order.
    #[serde(default = "Default::default")]
    pub sort_by: Option<String>,
    /// Print one summary per group instead of the records.
    #[serde(default = "Default::default")]
    pub sum: bool,
    /// Only pending jobs, grouped by their reasons, with the hosts that could
    /// run them.
    #[serde(default = "Default::default")]
    pub pending: bool,
    /// Only the ids, one per line.
    #[serde(default = "Default::default")]
    pub jid: bool,
    #[serde(default = "Default::default")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// `config.yaml` in the working directory, then any yaml file named on the
/// command line, then `ELSF__*` environment variables.
pub fn build_config() -> anyhow::Result<config::Config> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = config::Config::builder().add_source(
        config::File::with_name("config")
            .required(false)
            .format(config::FileFormat::Yaml),
    );
    for arg in args.iter().filter(|arg| is_config_file(arg)) {
        config = config.add_source(
            config::File::from(std::path::Path::new(arg.as_str()))
                .format(config::FileFormat::Yaml)
                .required(false),
        );
    }
    config = config.add_source(
        config::Environment::with_prefix("ELSF")
            .separator("__")
            .try_parsing(true),
    );
    Ok(config.build()?)
}

pub fn is_config_file(arg: &str) -> bool {
    arg.ends_with(".yaml") || arg.ends_with(".yml")
}
