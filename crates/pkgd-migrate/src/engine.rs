use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use pkgd_core::{version, DataLayout};

use crate::steps;

pub const CURRENT_LAYOUT_VERSION: u32 = 3;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to prepare per-user root {path}: {source}")]
    UserRoot { path: PathBuf, source: io::Error },
    #[error("failed to prepare legacy data directory {path}: {source}")]
    LegacyData { path: PathBuf, source: io::Error },
    #[error("failed to link {link} to {target}: {source}")]
    PrimaryUserLink {
        link: PathBuf,
        target: PathBuf,
        source: io::Error,
    },
    #[error("failed to prepare media root {path}: {source}")]
    MediaRoot { path: PathBuf, source: io::Error },
    #[error("failed to stage media root into {path}: {source}")]
    MediaStage { path: PathBuf, source: io::Error },
    #[error("failed to recreate media root {path}: {source}")]
    MediaRecreate { path: PathBuf, source: io::Error },
    #[error("failed to move staged media into {path}: {source}")]
    OwnerMedia { path: PathBuf, source: io::Error },
    #[error("failed to prepare media directory for user {user_id}: {source}")]
    UserMedia { user_id: u32, source: io::Error },
    #[error("failed to move shared obb directory into {path}: {source}")]
    SharedObb { path: PathBuf, source: io::Error },
    #[error("failed to prepare shared obb directory {path}: {source}")]
    ObbDir { path: PathBuf, source: io::Error },
    #[error("failed to prepare media directory for the primary user: {0}")]
    PrimaryMedia(io::Error),
    #[error("failed to prepare config directory for the primary user: {0}")]
    PrimaryConfig(io::Error),
    #[error("failed to prepare config directory for user {user_id}: {source}")]
    UserConfig { user_id: u32, source: io::Error },
    #[error("failed to persist layout version to {path}: {source}")]
    PersistVersion { path: PathBuf, source: io::Error },
}

impl MigrationError {
    /// Stable diagnostic code, one per failure site.
    pub fn code(&self) -> i32 {
        match self {
            Self::UserRoot { .. } => -2,
            Self::LegacyData { .. } => -3,
            Self::MediaRoot { .. } => -5,
            Self::MediaRecreate { .. } => -6,
            Self::UserMedia { .. } => -8,
            Self::ObbDir { .. } => -9,
            Self::UserConfig { .. } => -10,
            Self::MediaStage { .. } => -12,
            Self::OwnerMedia { .. } => -13,
            Self::SharedObb { .. } => -14,
            Self::PrimaryMedia(_) => -15,
            Self::PrimaryConfig(_) => -16,
            Self::PersistVersion { .. } => -17,
            Self::PrimaryUserLink { .. } => -18,
        }
    }
}

enum Gate {
    From(u32),
    Always,
}

struct Step {
    gate: Gate,
    name: &'static str,
    run: fn(&DataLayout) -> Result<(), MigrationError>,
}

const STEPS: &[Step] = &[
    Step {
        gate: Gate::From(0),
        name: "split-user-media",
        run: steps::split_user_media,
    },
    Step {
        gate: Gate::From(1),
        name: "shared-obb",
        run: steps::shared_obb,
    },
    Step {
        gate: Gate::Always,
        name: "primary-user-dirs",
        run: steps::primary_user_dirs,
    },
    Step {
        gate: Gate::From(2),
        name: "per-user-config",
        run: steps::per_user_config,
    },
];

/// Bring the on-disk tree under the data root up to the current layout.
/// Gated steps run at most once per persisted version and are skipped on
/// re-entry; the marker is only advanced after every step has succeeded.
pub fn migrate(layout: &DataLayout) -> Result<u32, MigrationError> {
    let marker = layout.layout_version_path();
    let entry_version = version::read_layout_version(&marker);
    let mut current = entry_version;

    for step in STEPS {
        match step.gate {
            Gate::From(from) if current != from => continue,
            _ => {}
        }
        debug!(step = step.name, version = current, "applying layout step");
        (step.run)(layout)?;
        if let Gate::From(_) = step.gate {
            current += 1;
        }
    }

    if current != entry_version {
        version::write_layout_version(&marker, current).map_err(|source| {
            MigrationError::PersistVersion {
                path: marker.clone(),
                source,
            }
        })?;
        info!(from = entry_version, to = current, "data layout upgraded");
    }
    Ok(current)
}
