use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const DATA_ROOT_ENV: &str = "PKGD_DATA_ROOT";
pub const ASEC_MOUNT_ENV: &str = "PKGD_ASEC_MOUNT";
pub const SYSTEM_ROOT_ENV: &str = "PKGD_SYSTEM_ROOT";

const APP_SUBDIR: &str = "app";
const PRIVATE_APP_SUBDIR: &str = "app-private";
const APP_LIB_SUBDIR: &str = "app-lib";
const MEDIA_SUBDIR: &str = "media";
const MEDIA_STAGING_SUBDIR: &str = "media.tmp";
const USER_SUBDIR: &str = "user";
const LEGACY_DATA_SUBDIR: &str = "data";
const MISC_SUBDIR: &str = "misc";
const DALVIK_CACHE_SUBDIR: &str = "dalvik-cache";
const LAYOUT_VERSION_FILE: &str = ".layout_version";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    data_dir: PathBuf,
    asec_dir: PathBuf,
    system_app_dirs: Vec<PathBuf>,
}

impl DataLayout {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        asec_dir: impl Into<PathBuf>,
        system_root: impl Into<PathBuf>,
    ) -> Self {
        let system_root = system_root.into();
        Self {
            data_dir: data_dir.into(),
            asec_dir: asec_dir.into(),
            system_app_dirs: vec![
                system_root.join("app"),
                system_root.join("priv-app"),
                PathBuf::from("/vendor/app"),
                PathBuf::from("/oem/app"),
            ],
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var_os(name))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self, ConfigError> {
        let data_dir = required_root(&lookup, DATA_ROOT_ENV)?;
        let asec_dir = required_root(&lookup, ASEC_MOUNT_ENV)?;
        let system_root = required_root(&lookup, SYSTEM_ROOT_ENV)?;
        Ok(Self::new(data_dir, asec_dir, system_root))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn asec_dir(&self) -> &Path {
        &self.asec_dir
    }

    pub fn app_dir(&self) -> PathBuf {
        self.data_dir.join(APP_SUBDIR)
    }

    pub fn app_private_dir(&self) -> PathBuf {
        self.data_dir.join(PRIVATE_APP_SUBDIR)
    }

    pub fn app_lib_dir(&self) -> PathBuf {
        self.data_dir.join(APP_LIB_SUBDIR)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join(MEDIA_SUBDIR)
    }

    pub fn media_staging_dir(&self) -> PathBuf {
        self.data_dir.join(MEDIA_STAGING_SUBDIR)
    }

    pub fn media_obb_dir(&self) -> PathBuf {
        self.media_dir().join("obb")
    }

    pub fn owner_obb_dir(&self) -> PathBuf {
        self.media_dir().join("0").join("Android").join("obb")
    }

    pub fn user_root(&self) -> PathBuf {
        self.data_dir.join(USER_SUBDIR)
    }

    pub fn legacy_data_dir(&self) -> PathBuf {
        self.data_dir.join(LEGACY_DATA_SUBDIR)
    }

    pub fn primary_user_link(&self) -> PathBuf {
        self.user_root().join("0")
    }

    pub fn misc_dir(&self) -> PathBuf {
        self.data_dir.join(MISC_SUBDIR)
    }

    pub fn keychain_added_dir(&self) -> PathBuf {
        self.misc_dir().join("keychain").join("cacerts-added")
    }

    pub fn keychain_removed_dir(&self) -> PathBuf {
        self.misc_dir().join("keychain").join("cacerts-removed")
    }

    pub fn user_data_dir(&self, user_id: u32) -> PathBuf {
        if user_id == 0 {
            self.legacy_data_dir()
        } else {
            self.user_root().join(user_id.to_string())
        }
    }

    pub fn package_data_dir(&self, pkg: &str, user_id: u32) -> PathBuf {
        self.user_data_dir(user_id).join(pkg)
    }

    pub fn user_media_dir(&self, user_id: u32) -> PathBuf {
        self.media_dir().join(user_id.to_string())
    }

    pub fn user_config_dir(&self, user_id: u32) -> PathBuf {
        self.misc_dir().join(USER_SUBDIR).join(user_id.to_string())
    }

    pub fn dalvik_cache_dir(&self, instruction_set: &str) -> PathBuf {
        self.data_dir.join(DALVIK_CACHE_SUBDIR).join(instruction_set)
    }

    pub fn layout_version_path(&self) -> PathBuf {
        self.data_dir.join(LAYOUT_VERSION_FILE)
    }

    pub fn system_app_dirs(&self) -> &[PathBuf] {
        &self.system_app_dirs
    }

    pub fn is_system_app_dir(&self, path: &Path) -> bool {
        self.system_app_dirs.iter().any(|root| path.starts_with(root))
    }
}

fn required_root(
    lookup: &impl Fn(&str) -> Option<OsString>,
    name: &'static str,
) -> Result<PathBuf, ConfigError> {
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}
