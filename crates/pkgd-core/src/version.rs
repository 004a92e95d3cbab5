use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub fn read_layout_version(path: &Path) -> u32 {
    match fs::read_to_string(path) {
        Ok(raw) => raw.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

pub fn write_layout_version(path: &Path, version: u32) -> io::Result<()> {
    let mut staged = path.as_os_str().to_os_string();
    staged.push(".tmp");
    let staged = PathBuf::from(staged);
    fs::write(&staged, format!("{version}\n"))?;
    fs::rename(&staged, path)
}
