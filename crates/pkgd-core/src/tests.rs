use super::*;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::fs_utils::{
    copy_dir_files, delete_dir_contents, dir_is_empty, dir_size, existing_user_ids, file_size,
    prepare_dir, remove_file_if_exists, remove_tree_if_exists,
};
use crate::ids::{user_uid, EVERYBODY_APP_ID, PER_USER_RANGE, SYSTEM_APP_ID};
use crate::version::{read_layout_version, write_layout_version};

fn test_root(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("pkgd-core-{label}-{}-{nanos}", std::process::id()))
}

fn current_ids() -> (u32, u32) {
    unsafe { (libc::geteuid(), libc::getegid()) }
}

fn test_layout() -> DataLayout {
    DataLayout::new("/data", "/mnt/asec", "/system")
}

#[test]
fn layout_derives_roots_from_data_dir() {
    let layout = test_layout();
    assert_eq!(layout.app_dir(), PathBuf::from("/data/app"));
    assert_eq!(layout.app_private_dir(), PathBuf::from("/data/app-private"));
    assert_eq!(layout.app_lib_dir(), PathBuf::from("/data/app-lib"));
    assert_eq!(layout.media_dir(), PathBuf::from("/data/media"));
    assert_eq!(layout.media_staging_dir(), PathBuf::from("/data/media.tmp"));
    assert_eq!(layout.media_obb_dir(), PathBuf::from("/data/media/obb"));
    assert_eq!(
        layout.owner_obb_dir(),
        PathBuf::from("/data/media/0/Android/obb")
    );
    assert_eq!(layout.user_root(), PathBuf::from("/data/user"));
    assert_eq!(layout.legacy_data_dir(), PathBuf::from("/data/data"));
    assert_eq!(layout.primary_user_link(), PathBuf::from("/data/user/0"));
    assert_eq!(
        layout.layout_version_path(),
        PathBuf::from("/data/.layout_version")
    );
}

#[test]
fn layout_maps_primary_user_to_legacy_dir() {
    let layout = test_layout();
    assert_eq!(
        layout.package_data_dir("com.example.app", 0),
        PathBuf::from("/data/data/com.example.app")
    );
    assert_eq!(
        layout.package_data_dir("com.example.app", 10),
        PathBuf::from("/data/user/10/com.example.app")
    );
}

#[test]
fn layout_user_scoped_dirs() {
    let layout = test_layout();
    assert_eq!(layout.user_media_dir(10), PathBuf::from("/data/media/10"));
    assert_eq!(
        layout.user_config_dir(10),
        PathBuf::from("/data/misc/user/10")
    );
    assert_eq!(
        layout.keychain_added_dir(),
        PathBuf::from("/data/misc/keychain/cacerts-added")
    );
    assert_eq!(
        layout.dalvik_cache_dir("arm64"),
        PathBuf::from("/data/dalvik-cache/arm64")
    );
}

#[test]
fn layout_recognizes_system_app_dirs() {
    let layout = test_layout();
    assert!(layout.is_system_app_dir(std::path::Path::new("/system/app/Settings.apk")));
    assert!(layout.is_system_app_dir(std::path::Path::new("/system/priv-app/Phone.apk")));
    assert!(layout.is_system_app_dir(std::path::Path::new("/vendor/app/Widget.apk")));
    assert!(layout.is_system_app_dir(std::path::Path::new("/oem/app/Branding.apk")));
    assert!(!layout.is_system_app_dir(std::path::Path::new("/data/app/user.apk")));
    // prefix matching is component-wise, not textual
    assert!(!layout.is_system_app_dir(std::path::Path::new("/system/appx/evil.apk")));
}

#[test]
fn from_lookup_requires_every_root() {
    let mut env: HashMap<&str, OsString> = HashMap::new();
    env.insert(DATA_ROOT_ENV, OsString::from("/data"));
    env.insert(ASEC_MOUNT_ENV, OsString::from("/mnt/asec"));

    let err = DataLayout::from_lookup(|name| env.get(name).cloned())
        .expect_err("missing system root must fail");
    assert!(matches!(err, ConfigError::MissingEnv(SYSTEM_ROOT_ENV)));

    env.insert(SYSTEM_ROOT_ENV, OsString::from(""));
    let err = DataLayout::from_lookup(|name| env.get(name).cloned())
        .expect_err("empty system root must fail");
    assert!(matches!(err, ConfigError::MissingEnv(SYSTEM_ROOT_ENV)));

    env.insert(SYSTEM_ROOT_ENV, OsString::from("/system"));
    let layout =
        DataLayout::from_lookup(|name| env.get(name).cloned()).expect("all roots present");
    assert_eq!(layout.data_dir(), std::path::Path::new("/data"));
    assert_eq!(layout.asec_dir(), std::path::Path::new("/mnt/asec"));
    assert_eq!(layout.system_app_dirs().len(), 4);
}

#[test]
fn synthetic_uid_math() {
    assert_eq!(user_uid(0, SYSTEM_APP_ID), 1000);
    assert_eq!(user_uid(10, SYSTEM_APP_ID), 10 * PER_USER_RANGE + 1000);
    assert_eq!(user_uid(10, EVERYBODY_APP_ID), 10 * PER_USER_RANGE + 9997);
}

#[test]
fn prepare_dir_creates_with_mode() {
    let root = test_root("prepare");
    let target = root.join("nested").join("dir");
    let (uid, gid) = current_ids();

    prepare_dir(&target, 0o750, uid, gid).expect("must create");
    let meta = fs::metadata(&target).expect("must stat");
    assert!(meta.is_dir());
    assert_eq!(meta.permissions().mode() & 0o7777, 0o750);

    // re-asserting an existing directory fixes its mode
    fs::set_permissions(&target, fs::Permissions::from_mode(0o700)).expect("must chmod");
    prepare_dir(&target, 0o750, uid, gid).expect("must re-assert");
    let meta = fs::metadata(&target).expect("must stat");
    assert_eq!(meta.permissions().mode() & 0o7777, 0o750);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn prepare_dir_rejects_non_directory() {
    let root = test_root("prepare-file");
    fs::create_dir_all(&root).expect("must create root");
    let target = root.join("occupied");
    fs::write(&target, "data").expect("must write");
    let (uid, gid) = current_ids();

    prepare_dir(&target, 0o750, uid, gid).expect_err("file in the way must fail");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn copy_dir_files_copies_regular_files_only() {
    let root = test_root("copy");
    let src = root.join("src");
    let dst = root.join("dst");
    fs::create_dir_all(src.join("subdir")).expect("must create src");
    fs::write(src.join("a.pem"), "cert-a").expect("must write");
    fs::write(src.join("b.pem"), "cert-b").expect("must write");
    let (uid, gid) = current_ids();

    let failures = copy_dir_files(&src, &dst, uid, gid).expect("must copy");
    assert_eq!(failures, 0);
    assert_eq!(fs::read_to_string(dst.join("a.pem")).expect("a.pem"), "cert-a");
    assert_eq!(fs::read_to_string(dst.join("b.pem")).expect("b.pem"), "cert-b");
    assert!(!dst.join("subdir").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn delete_dir_contents_keeps_the_directory() {
    let root = test_root("empty");
    fs::create_dir_all(root.join("keep").join("nested")).expect("must create");
    fs::write(root.join("keep").join("file"), "x").expect("must write");
    fs::write(root.join("keep").join("nested").join("deep"), "y").expect("must write");

    delete_dir_contents(&root.join("keep")).expect("must clear");
    assert!(root.join("keep").exists());
    assert!(dir_is_empty(&root.join("keep")).expect("must read"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn remove_helpers_tolerate_absence() {
    let root = test_root("remove");
    fs::create_dir_all(&root).expect("must create root");

    remove_file_if_exists(&root.join("nothing")).expect("absent file is fine");
    remove_tree_if_exists(&root.join("nothing")).expect("absent tree is fine");

    fs::write(root.join("present"), "x").expect("must write");
    remove_file_if_exists(&root.join("present")).expect("must remove");
    assert!(!root.join("present").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn dir_size_sums_recursively() {
    let root = test_root("size");
    fs::create_dir_all(root.join("inner")).expect("must create");
    fs::write(root.join("one"), vec![0u8; 100]).expect("must write");
    fs::write(root.join("inner").join("two"), vec![0u8; 50]).expect("must write");

    assert_eq!(dir_size(&root), 150);
    assert_eq!(file_size(&root.join("one")), 100);
    assert_eq!(file_size(&root.join("missing")), 0);
    assert_eq!(dir_size(&root.join("missing")), 0);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn existing_user_ids_skips_non_numeric_entries() {
    let root = test_root("users");
    fs::create_dir_all(root.join("0")).expect("must create");
    fs::create_dir_all(root.join("10")).expect("must create");
    fs::create_dir_all(root.join("lost+found")).expect("must create");
    fs::write(root.join("11"), "not a dir").expect("must write");

    assert_eq!(existing_user_ids(&root), vec![0, 10]);
    assert!(existing_user_ids(&root.join("missing")).is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn existing_user_ids_follows_the_primary_symlink() {
    let root = test_root("users-link");
    let legacy = root.join("legacy");
    let user_root = root.join("user");
    fs::create_dir_all(&legacy).expect("must create");
    fs::create_dir_all(&user_root).expect("must create");
    std::os::unix::fs::symlink(&legacy, user_root.join("0")).expect("must link");

    assert_eq!(existing_user_ids(&user_root), vec![0]);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn layout_version_round_trip() {
    let root = test_root("version");
    fs::create_dir_all(&root).expect("must create root");
    let marker = root.join(".layout_version");

    assert_eq!(read_layout_version(&marker), 0);

    write_layout_version(&marker, 3).expect("must persist");
    assert_eq!(read_layout_version(&marker), 3);
    // the staging file must not survive the rename
    assert!(!root.join(".layout_version.tmp").exists());

    fs::write(&marker, "garbage").expect("must write");
    assert_eq!(read_layout_version(&marker), 0);

    let _ = fs::remove_dir_all(&root);
}
