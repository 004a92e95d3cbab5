pub mod fs_utils;
pub mod ids;
pub mod version;

mod layout;
mod ops;

pub use layout::{ConfigError, DataLayout, ASEC_MOUNT_ENV, DATA_ROOT_ENV, SYSTEM_ROOT_ENV};
pub use ops::{PackageOps, SizeStats};

#[cfg(test)]
mod tests;
