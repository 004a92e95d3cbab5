mod config;
mod dispatch;
mod policy;
mod privileges;
mod server;
mod socket;


use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pkgd_core::DataLayout;
use pkgd_ops::HostOps;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run() {
        error!(error = %format!("{err:#}"), "pkgd failed to start");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = config::DaemonArgs::parse();
    info!("pkgd starting");

    let layout = DataLayout::from_env().context("failed to resolve filesystem roots")?;

    // refuse to serve against a tree we could not bring to a known layout
    let version = match pkgd_migrate::migrate(&layout) {
        Ok(version) => version,
        Err(err) => {
            error!(code = err.code(), error = %err, "layout migration failed");
            return Err(err).context("failed to migrate the data layout");
        }
    };
    info!(version, "data layout ready");

    let mut policy = args.policy_monitor()?;
    let listener = args
        .control_listener()
        .context("failed to acquire the control socket")?;

    privileges::drop_privileges().context("failed to drop privileges")?;

    let ops = HostOps::new(layout, args.external_tools());
    server::run(listener, &ops, policy.as_mut())
}
