use serde::{Deserialize, Serialize};
use tokio::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshProxyConfig {
    pub host: String,
    pub username: String,
    #[serde(default = "SshProxyConfig::default_port")]
    pub port: u16,
}

impl SshProxyConfig {
    fn default_port() -> u16 {
        22
    }
}

/// An ssh proxy for command. It's transparent if not using ssh.
#[derive(Debug, Default)]
pub struct SshProxy {
    ssh: Option<SshConfig>,
}

#[derive(Debug)]
struct SshConfig {
    port: String,
    username_host: String,
}

impl SshProxy {
    pub fn new(ssh_config: &Option<SshProxyConfig>) -> Self {
        let Some(SshProxyConfig {
            host,
            username,
            port,
        }) = ssh_config
        else {
            return Self { ssh: None };
        };

        Self {
            ssh: Some(SshConfig {
                port: port.to_string(),
                username_host: format!("{username}@{host}"),
            }),
        }
    }

    /// Return the command over ssh if using ssh,
    /// or return `Command::new(program)` directly.
    pub fn command(&self, program: &str) -> Command {
        let Some(ssh) = &self.ssh else {
            return Command::new(program);
        };

        let mut command = Command::new("ssh");
        command.args(["-p", &ssh.port, &ssh.username_host, program]);
        command
    }

    #[inline]
    pub fn is_proxy(&self) -> bool {
        self.ssh.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command() {
        let local = SshProxy::new(&None);
        assert!(!local.is_proxy());
        assert_eq!(local.command("bjobs").as_std().get_program(), "bjobs");

        let config: SshProxyConfig =
            serde_json::from_str(r#"{"host": "login1", "username": "alice"}"#).unwrap();
        assert_eq!(config.port, 22);
        let proxy = SshProxy::new(&Some(config));
        let command = proxy.command("bjobs");
        let command = command.as_std();
        assert_eq!(command.get_program(), "ssh");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, ["-p", "22", "alice@login1", "bjobs"]);
    }
}
