//! Runs the LSF command line tools, locally or through ssh.

mod lsf_client;
mod ssh_proxy;

#[rustfmt::skip]
pub use {
    lsf_client::LsfClient,
    ssh_proxy::{SshProxy, SshProxyConfig},
};
