use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Security-module status channel: detects that the active policy was
/// reloaded so the cached security context can be refreshed.
pub trait PolicyMonitor {
    fn updated(&mut self) -> bool;
    fn refresh(&mut self);
}

pub struct NullPolicyMonitor;

impl PolicyMonitor for NullPolicyMonitor {
    fn updated(&mut self) -> bool {
        false
    }

    fn refresh(&mut self) {}
}

/// Watches a generation counter published by the security module as a
/// decimal integer in a status file.
pub struct StatusFileMonitor {
    path: PathBuf,
    generation: u64,
}

impl StatusFileMonitor {
    pub fn open(path: &Path) -> io::Result<Self> {
        let generation = read_generation(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            generation,
        })
    }
}

impl PolicyMonitor for StatusFileMonitor {
    fn updated(&mut self) -> bool {
        let Ok(generation) = read_generation(&self.path) else {
            return false;
        };
        if generation == self.generation {
            return false;
        }
        self.generation = generation;
        true
    }

    fn refresh(&mut self) {
        debug!(
            path = %self.path.display(),
            generation = self.generation,
            "reloaded security policy context"
        );
    }
}

fn read_generation(path: &Path) -> io::Result<u64> {
    let raw = fs::read_to_string(path)?;
    raw.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} does not hold a generation counter", path.display()),
        )
    })
}
