use std::io::{Read, Write};
use std::os::unix::net::UnixListener;

use tracing::{debug, info, warn};

use pkgd_core::PackageOps;
use pkgd_proto::{encode_reply, read_request, tokenize, write_reply};

use crate::dispatch::dispatch;
use crate::policy::PolicyMonitor;

/// Accept loop. Client failures tear down the offending connection only;
/// the loop itself never exits.
pub fn run(listener: UnixListener, ops: &dyn PackageOps, policy: &mut dyn PolicyMonitor) -> ! {
    info!("serving control commands");
    loop {
        let (mut stream, _addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        debug!("new connection");
        serve_connection(&mut stream, ops, policy);
        debug!("closing connection");
    }
}

pub fn serve_connection<S: Read + Write>(
    stream: &mut S,
    ops: &dyn PackageOps,
    policy: &mut dyn PolicyMonitor,
) {
    loop {
        let payload = match read_request(stream) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(error = %err, "request framing ended");
                return;
            }
        };

        // cheap per-request poll; the server is single-threaded so there is
        // no separate notification thread to race with
        if policy.updated() {
            info!("security policy changed, refreshing context");
            policy.refresh();
        }

        let payload_len = payload.len();
        let tokens = match tokenize(&payload) {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(error = %err, bytes = payload_len, "rejecting request");
                return;
            }
        };

        let (code, extra) = dispatch(ops, &tokens);
        let reply = encode_reply(code, &extra);
        if let Err(err) = write_reply(stream, &reply) {
            warn!(error = %err, "failed to write reply");
            return;
        }
    }
}
