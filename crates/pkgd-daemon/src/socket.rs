use std::env;
use std::fs;
use std::io;
use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

pub const SOCKET_ENV_PREFIX: &str = "PKGD_SOCKET_";

const BACKLOG: libc::c_int = 5;

/// Obtain the control socket pre-bound by the service supervisor, published
/// as a descriptor number in `PKGD_SOCKET_<name>`.
pub fn listener_from_env(name: &str) -> Result<UnixListener> {
    let var = format!("{SOCKET_ENV_PREFIX}{name}");
    let raw = env::var(&var).with_context(|| format!("control socket variable {var} is not set"))?;
    let fd: RawFd = raw
        .trim()
        .parse()
        .with_context(|| format!("control socket variable {var} does not hold a descriptor"))?;
    if unsafe { libc::listen(fd, BACKLOG) } < 0 {
        return Err(io::Error::last_os_error())
            .with_context(|| format!("failed to listen on supervisor descriptor {fd}"));
    }
    info!(fd, "using supervisor control socket");
    Ok(unsafe { UnixListener::from_raw_fd(fd) })
}

/// Bind the control socket directly, replacing a stale socket file but
/// refusing to displace a live daemon.
pub fn bind_listener(path: &Path) -> Result<UnixListener> {
    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
            if UnixStream::connect(path).is_ok() {
                bail!("another daemon is already serving {}", path.display());
            }
            fs::remove_file(path)
                .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
            UnixListener::bind(path)
                .with_context(|| format!("failed to bind {}", path.display()))
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind {}", path.display()))
        }
    }
}
