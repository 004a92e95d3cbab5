mod host;

pub use host::{ExternalTools, HostOps};
