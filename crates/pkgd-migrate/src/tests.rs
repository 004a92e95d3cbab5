use super::*;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pkgd_core::ids::{user_uid, MEDIA_RW_UID, SYSTEM_APP_ID};
use pkgd_core::version::{read_layout_version, write_layout_version};
use pkgd_core::DataLayout;

fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn test_root(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("pkgd-migrate-{label}-{}-{nanos}", std::process::id()))
}

fn test_layout(label: &str) -> (PathBuf, DataLayout) {
    let root = test_root(label);
    let data = root.join("data");
    fs::create_dir_all(&data).expect("must create data root");
    let layout = DataLayout::new(&data, root.join("asec"), root.join("system"));
    (root, layout)
}

fn tree_listing(root: &Path) -> BTreeSet<String> {
    fn walk(dir: &Path, base: &Path, out: &mut BTreeSet<String>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let rel = path
                .strip_prefix(base)
                .expect("path under base")
                .to_string_lossy()
                .into_owned();
            out.insert(rel);
            if path.is_dir() && !path.is_symlink() {
                walk(&path, base, out);
            }
        }
    }
    let mut out = BTreeSet::new();
    walk(root, root, &mut out);
    out
}

#[test]
fn fresh_root_migrates_to_current_version() {
    if !running_as_root() {
        return;
    }
    let (root, layout) = test_layout("fresh");

    let version = migrate(&layout).expect("fresh migration must succeed");
    assert_eq!(version, CURRENT_LAYOUT_VERSION);
    assert_eq!(
        read_layout_version(&layout.layout_version_path()),
        CURRENT_LAYOUT_VERSION
    );

    // primary-user media and config directories with the documented mode
    let media0 = fs::metadata(layout.user_media_dir(0)).expect("media/0 must exist");
    assert_eq!(media0.permissions().mode() & 0o7777, 0o770);
    assert_eq!(media0.uid(), MEDIA_RW_UID);

    let config0 = fs::metadata(layout.user_config_dir(0)).expect("misc/user/0 must exist");
    assert_eq!(config0.permissions().mode() & 0o7777, 0o750);
    assert_eq!(config0.uid(), user_uid(0, SYSTEM_APP_ID));

    // user/0 links to the legacy data directory
    let link = fs::read_link(layout.primary_user_link()).expect("user/0 must be a symlink");
    assert_eq!(link, layout.legacy_data_dir());

    assert!(layout.media_obb_dir().is_dir());
    assert!(!layout.media_staging_dir().exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn migrate_is_idempotent_under_reentry() {
    if !running_as_root() {
        return;
    }
    let (root, layout) = test_layout("idempotent");

    migrate(&layout).expect("first run must succeed");
    let before = tree_listing(layout.data_dir());

    let version = migrate(&layout).expect("second run must succeed");
    assert_eq!(version, CURRENT_LAYOUT_VERSION);
    assert_eq!(tree_listing(layout.data_dir()), before);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn legacy_media_lands_under_the_owner() {
    if !running_as_root() {
        return;
    }
    let (root, layout) = test_layout("media");
    fs::create_dir_all(layout.media_dir().join("Music")).expect("must seed media");
    fs::write(layout.media_dir().join("Music").join("song.mp3"), "tune")
        .expect("must seed media file");

    migrate(&layout).expect("migration must succeed");

    assert_eq!(
        fs::read_to_string(layout.user_media_dir(0).join("Music").join("song.mp3"))
            .expect("owner media must exist"),
        "tune"
    );
    assert!(!layout.media_staging_dir().exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn reentry_after_lost_marker_converges() {
    if !running_as_root() {
        return;
    }
    let (root, layout) = test_layout("lost-marker");
    fs::create_dir_all(layout.media_dir()).expect("must seed media");
    fs::write(layout.media_dir().join("photo.jpg"), "img").expect("must seed media file");

    migrate(&layout).expect("first run must succeed");
    let before = tree_listing(layout.data_dir());

    // simulate a crash after the filesystem work but before the marker write
    fs::remove_file(layout.layout_version_path()).expect("must drop marker");

    let version = migrate(&layout).expect("re-entry must succeed");
    assert_eq!(version, CURRENT_LAYOUT_VERSION);
    assert!(layout.user_media_dir(0).join("photo.jpg").exists());
    // the owner subtree must not be re-nested
    assert!(!layout.user_media_dir(0).join("0").exists());

    assert_eq!(tree_listing(layout.data_dir()), before);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn owner_obb_moves_into_the_shared_dir_once() {
    if !running_as_root() {
        return;
    }
    let (root, layout) = test_layout("obb");
    fs::create_dir_all(layout.user_root()).expect("must seed user root");
    fs::create_dir_all(layout.owner_obb_dir()).expect("must seed owner obb");
    fs::write(layout.owner_obb_dir().join("main.1.obb"), "blob").expect("must seed obb file");
    write_layout_version(&layout.layout_version_path(), 1).expect("must pin version");

    let version = migrate(&layout).expect("migration must succeed");
    assert_eq!(version, CURRENT_LAYOUT_VERSION);
    assert_eq!(
        fs::read_to_string(layout.media_obb_dir().join("main.1.obb")).expect("shared obb"),
        "blob"
    );
    assert!(!layout.owner_obb_dir().exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn trust_overrides_fan_out_per_user() {
    if !running_as_root() {
        return;
    }
    let (root, layout) = test_layout("certs");
    fs::create_dir_all(layout.user_root().join("10")).expect("must seed user 10");
    fs::create_dir_all(layout.legacy_data_dir()).expect("must seed legacy data");
    std::os::unix::fs::symlink(layout.legacy_data_dir(), layout.primary_user_link())
        .expect("must seed user/0 link");
    fs::create_dir_all(layout.keychain_added_dir()).expect("must seed keychain");
    fs::write(layout.keychain_added_dir().join("cert.pem"), "added").expect("must seed cert");
    write_layout_version(&layout.layout_version_path(), 2).expect("must pin version");

    let version = migrate(&layout).expect("migration must succeed");
    assert_eq!(version, CURRENT_LAYOUT_VERSION);

    for user_id in [0u32, 10] {
        let copied = layout
            .user_config_dir(user_id)
            .join("cacerts-added")
            .join("cert.pem");
        assert_eq!(
            fs::read_to_string(&copied).expect("cert must be copied"),
            "added"
        );
        assert_eq!(
            fs::metadata(&copied).expect("must stat").uid(),
            user_uid(user_id, SYSTEM_APP_ID)
        );
    }

    // emptied but not removed
    assert!(layout.keychain_added_dir().is_dir());
    assert_eq!(
        fs::read_dir(layout.keychain_added_dir())
            .expect("must read")
            .count(),
        0
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn migration_error_codes_are_distinct() {
    let source = || io::Error::new(io::ErrorKind::Other, "boom");
    let path = PathBuf::from("/data");
    let errors = vec![
        MigrationError::UserRoot {
            path: path.clone(),
            source: source(),
        },
        MigrationError::LegacyData {
            path: path.clone(),
            source: source(),
        },
        MigrationError::PrimaryUserLink {
            link: path.clone(),
            target: path.clone(),
            source: source(),
        },
        MigrationError::MediaRoot {
            path: path.clone(),
            source: source(),
        },
        MigrationError::MediaStage {
            path: path.clone(),
            source: source(),
        },
        MigrationError::MediaRecreate {
            path: path.clone(),
            source: source(),
        },
        MigrationError::OwnerMedia {
            path: path.clone(),
            source: source(),
        },
        MigrationError::UserMedia {
            user_id: 0,
            source: source(),
        },
        MigrationError::SharedObb {
            path: path.clone(),
            source: source(),
        },
        MigrationError::ObbDir {
            path: path.clone(),
            source: source(),
        },
        MigrationError::PrimaryMedia(source()),
        MigrationError::PrimaryConfig(source()),
        MigrationError::UserConfig {
            user_id: 0,
            source: source(),
        },
        MigrationError::PersistVersion {
            path,
            source: source(),
        },
    ];

    let codes: BTreeSet<i32> = errors.iter().map(MigrationError::code).collect();
    assert_eq!(codes.len(), errors.len());
    assert!(codes.iter().all(|code| *code < 0));
}
