use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use tracing::{debug, warn};

use pkgd_core::fs_utils::{
    copy_dir_files, delete_dir_contents, dir_is_empty, ensure_config_user_dir,
    ensure_media_user_dir, existing_user_ids, prepare_dir,
};
use pkgd_core::ids::{user_uid, MEDIA_RW_GID, MEDIA_RW_UID, SYSTEM_APP_ID, SYSTEM_GID, SYSTEM_UID};
use pkgd_core::DataLayout;

use crate::engine::MigrationError;

pub(crate) fn split_user_media(layout: &DataLayout) -> Result<(), MigrationError> {
    let user_root = layout.user_root();
    prepare_dir(&user_root, 0o711, SYSTEM_UID, SYSTEM_GID).map_err(|source| {
        MigrationError::UserRoot {
            path: user_root.clone(),
            source,
        }
    })?;

    let legacy = layout.legacy_data_dir();
    prepare_dir(&legacy, 0o771, SYSTEM_UID, SYSTEM_GID).map_err(|source| {
        MigrationError::LegacyData {
            path: legacy.clone(),
            source,
        }
    })?;

    let link = layout.primary_user_link();
    if fs::symlink_metadata(&link).is_err() {
        symlink(&legacy, &link).map_err(|source| MigrationError::PrimaryUserLink {
            link: link.clone(),
            target: legacy.clone(),
            source,
        })?;
    }

    let media = layout.media_dir();
    prepare_dir(&media, 0o770, MEDIA_RW_UID, MEDIA_RW_GID).map_err(|source| {
        MigrationError::MediaRoot {
            path: media.clone(),
            source,
        }
    })?;

    // Split shared media into per-user subtrees: park the legacy contents
    // aside, recreate the root, then land them under the owner. The staging
    // directory doubles as the in-progress marker across a crash.
    let staged = layout.media_staging_dir();
    let owner_media = layout.user_media_dir(0);
    if !staged.exists() && !owner_media.exists() {
        let has_content = !dir_is_empty(&media).map_err(|source| MigrationError::MediaStage {
            path: staged.clone(),
            source,
        })?;
        if has_content {
            debug!(from = %media.display(), to = %staged.display(), "staging legacy media");
            fs::rename(&media, &staged).map_err(|source| MigrationError::MediaStage {
                path: staged.clone(),
                source,
            })?;
        }
    }

    prepare_dir(&media, 0o770, MEDIA_RW_UID, MEDIA_RW_GID).map_err(|source| {
        MigrationError::MediaRecreate {
            path: media.clone(),
            source,
        }
    })?;

    if staged.exists() {
        fs::rename(&staged, &owner_media).map_err(|source| MigrationError::OwnerMedia {
            path: owner_media.clone(),
            source,
        })?;
    }

    for user_id in existing_user_ids(&user_root) {
        ensure_media_user_dir(layout, user_id)
            .map_err(|source| MigrationError::UserMedia { user_id, source })?;
    }
    Ok(())
}

pub(crate) fn shared_obb(layout: &DataLayout) -> Result<(), MigrationError> {
    let shared = layout.media_obb_dir();
    let owner = layout.owner_obb_dir();
    if !shared.exists() && owner.exists() {
        debug!(from = %owner.display(), to = %shared.display(), "sharing owner obb");
        fs::rename(&owner, &shared).map_err(|source| MigrationError::SharedObb {
            path: shared.clone(),
            source,
        })?;
    }
    prepare_dir(&shared, 0o770, MEDIA_RW_UID, MEDIA_RW_GID).map_err(|source| {
        MigrationError::ObbDir {
            path: shared.clone(),
            source,
        }
    })
}

pub(crate) fn primary_user_dirs(layout: &DataLayout) -> Result<(), MigrationError> {
    ensure_media_user_dir(layout, 0).map_err(MigrationError::PrimaryMedia)?;
    ensure_config_user_dir(layout, 0).map_err(MigrationError::PrimaryConfig)?;
    Ok(())
}

pub(crate) fn per_user_config(layout: &DataLayout) -> Result<(), MigrationError> {
    let added = layout.keychain_added_dir();
    let removed = layout.keychain_removed_dir();

    for user_id in existing_user_ids(&layout.user_root()) {
        ensure_config_user_dir(layout, user_id)
            .map_err(|source| MigrationError::UserConfig { user_id, source })?;

        let owner = user_uid(user_id, SYSTEM_APP_ID);
        let config = layout.user_config_dir(user_id);
        fan_out_overrides(&added, &config.join("cacerts-added"), owner);
        fan_out_overrides(&removed, &config.join("cacerts-removed"), owner);
    }

    clear_overrides(&added);
    clear_overrides(&removed);
    Ok(())
}

fn fan_out_overrides(src: &Path, dst: &Path, owner: u32) {
    if !src.exists() {
        return;
    }
    match copy_dir_files(src, dst, owner, owner) {
        Ok(0) => {}
        Ok(failures) => warn!(src = %src.display(), failures, "some override files failed to copy"),
        Err(err) => warn!(src = %src.display(), error = %err, "failed to copy override files"),
    }
}

fn clear_overrides(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = delete_dir_contents(path) {
        warn!(path = %path.display(), error = %err, "failed to clear legacy override directory");
    }
}
