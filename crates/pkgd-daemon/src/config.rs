use std::os::unix::net::UnixListener;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pkgd_ops::ExternalTools;

use crate::policy::{NullPolicyMonitor, PolicyMonitor, StatusFileMonitor};
use crate::socket;

#[derive(Debug, Parser)]
#[command(name = "pkgd", about = "privileged package-install control daemon")]
pub struct DaemonArgs {
    /// name of the supervisor-provided control socket
    #[arg(long, default_value = "pkgd")]
    pub socket_name: String,

    /// bind the control socket at this path instead of taking the
    /// supervisor descriptor
    #[arg(long)]
    pub socket_path: Option<PathBuf>,

    /// security-module status file carrying a policy generation counter
    #[arg(long)]
    pub policy_status: Option<PathBuf>,

    /// external bytecode optimizer invoked for dexopt/patchoat
    #[arg(long)]
    pub dexopt_tool: Option<PathBuf>,

    /// external overlay idmap generator
    #[arg(long)]
    pub idmap_tool: Option<PathBuf>,

    /// external security-context relabeling engine
    #[arg(long)]
    pub relabel_tool: Option<PathBuf>,
}

impl DaemonArgs {
    pub fn external_tools(&self) -> ExternalTools {
        ExternalTools {
            dexopt: self.dexopt_tool.clone(),
            idmap: self.idmap_tool.clone(),
            relabel: self.relabel_tool.clone(),
        }
    }

    pub fn policy_monitor(&self) -> Result<Box<dyn PolicyMonitor>> {
        match &self.policy_status {
            Some(path) => {
                let monitor = StatusFileMonitor::open(path).with_context(|| {
                    format!("failed to open security policy status {}", path.display())
                })?;
                Ok(Box::new(monitor))
            }
            None => Ok(Box::new(NullPolicyMonitor)),
        }
    }

    pub fn control_listener(&self) -> Result<UnixListener> {
        match &self.socket_path {
            Some(path) => socket::bind_listener(path),
            None => socket::listener_from_env(&self.socket_name),
        }
    }
}
