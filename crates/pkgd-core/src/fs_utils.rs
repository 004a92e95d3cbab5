use std::fs;
use std::io;
use std::os::unix::fs::{chown, PermissionsExt};
use std::path::Path;

use tracing::warn;

use crate::ids::{user_uid, EVERYBODY_APP_ID, MEDIA_RW_GID, MEDIA_RW_UID, SYSTEM_APP_ID};
use crate::DataLayout;

pub fn prepare_dir(path: &Path, mode: u32, uid: u32, gid: u32) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", path.display()),
            ));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => fs::create_dir_all(path)?,
        Err(err) => return Err(err),
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    chown(path, Some(uid), Some(gid))
}

pub fn ensure_media_user_dir(layout: &DataLayout, user_id: u32) -> io::Result<()> {
    prepare_dir(
        &layout.user_media_dir(user_id),
        0o770,
        MEDIA_RW_UID,
        MEDIA_RW_GID,
    )
}

pub fn ensure_config_user_dir(layout: &DataLayout, user_id: u32) -> io::Result<()> {
    prepare_dir(
        &layout.user_config_dir(user_id),
        0o750,
        user_uid(user_id, SYSTEM_APP_ID),
        user_uid(user_id, EVERYBODY_APP_ID),
    )
}

pub fn copy_dir_files(src: &Path, dst: &Path, uid: u32, gid: u32) -> io::Result<usize> {
    fs::create_dir_all(dst)?;
    chown(dst, Some(uid), Some(gid))?;

    let mut failures = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let Ok(file_type) = entry.file_type() else {
            failures += 1;
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let target = dst.join(entry.file_name());
        if let Err(err) = copy_owned_file(&entry.path(), &target, uid, gid) {
            warn!(
                src = %entry.path().display(),
                dst = %target.display(),
                error = %err,
                "failed to copy file"
            );
            failures += 1;
        }
    }
    Ok(failures)
}

fn copy_owned_file(src: &Path, dst: &Path, uid: u32, gid: u32) -> io::Result<()> {
    fs::copy(src, dst)?;
    chown(dst, Some(uid), Some(gid))
}

pub fn delete_dir_contents(path: &Path) -> io::Result<()> {
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

pub fn remove_tree_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

pub fn dir_is_empty(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

pub fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            total += dir_size(&entry.path());
        } else {
            total += meta.len();
        }
    }
    total
}

pub fn file_size(path: &Path) -> u64 {
    fs::symlink_metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

pub fn existing_user_ids(user_root: &Path) -> Vec<u32> {
    let Ok(entries) = fs::read_dir(user_root) else {
        return Vec::new();
    };
    let mut ids = Vec::new();
    for entry in entries.flatten() {
        // follow the user/0 symlink so the primary user is included
        let Ok(meta) = fs::metadata(entry.path()) else {
            continue;
        };
        if !meta.is_dir() {
            continue;
        }
        let Some(id) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        ids.push(id);
    }
    ids.sort_unstable();
    ids
}
