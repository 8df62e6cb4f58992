use anyhow::Context;
use domain_scheduler::{
    model::{
        entity::job_listing_format,
        vo::{EntityKind, SchedulerOutput},
    },
    service::SchedulerClient,
};

use crate::{SshProxy, SshProxyConfig};

/// Runs `bjobs`, `bhosts` and `bkill`.
#[derive(Debug, Default)]
pub struct LsfClient {
    ssh_proxy: SshProxy,
}

impl LsfClient {
    pub fn new(ssh_proxy: &Option<SshProxyConfig>) -> Self {
        Self {
            ssh_proxy: SshProxy::new(ssh_proxy),
        }
    }

    /// Non-zero exit statuses are not errors here, the caller decides what
    /// an unsuccessful run means.
    async fn run<I, S>(&self, program: &str, args: I) -> anyhow::Result<SchedulerOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        tracing::debug!("Running `{program} {}`.", args.join(" "));
        if self.ssh_proxy.is_proxy() {
            // The remote shell splits the joined command line again.
            args = args.iter().map(|arg| shell_quote(arg)).collect();
        }
        let out = self
            .ssh_proxy
            .command(program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Unable to run `{program}`."))?;
        let output = SchedulerOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            success: out.status.success(),
        };
        if !output.success {
            tracing::debug!("`{program}` exited with {}: {}", out.status, output.stderr.trim());
        }
        Ok(output)
    }
}

/// `it's` becomes `'it'\''s'`.
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[async_trait::async_trait]
impl SchedulerClient for LsfClient {
    async fn bulk_list(&self, kind: EntityKind, args: &[String]) -> anyhow::Result<SchedulerOutput> {
        let (program, mut command_args) = match kind {
            EntityKind::Job => ("bjobs", vec!["-X".to_owned(), "-o".to_owned(), job_listing_format()]),
            EntityKind::Host => ("bhosts", vec!["-X".to_owned(), "-w".to_owned()]),
        };
        command_args.extend_from_slice(args);
        self.run(program, command_args).await
    }

    async fn detail(&self, kind: EntityKind, key: &str) -> anyhow::Result<SchedulerOutput> {
        match kind {
            EntityKind::Job => self.run("bjobs", ["-l", key]).await,
            EntityKind::Host => self.run("bhosts", ["-l", key]).await,
        }
    }

    async fn cancel_job(&self, id: &str) -> anyhow::Result<SchedulerOutput> {
        self.run("bkill", [id]).await
    }
}
