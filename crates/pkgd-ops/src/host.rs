use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{chown, symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, warn};

use pkgd_core::fs_utils::{
    delete_dir_contents, dir_size, ensure_config_user_dir, existing_user_ids, file_size,
    prepare_dir, remove_file_if_exists, remove_tree_if_exists,
};
use pkgd_core::{DataLayout, PackageOps, SizeStats};

const PACKAGE_DIR_MODE: u32 = 0o751;
const CACHE_SUBDIR: &str = "cache";
const CODE_CACHE_SUBDIR: &str = "code_cache";
const LIB_LINK: &str = "lib";
const BOOT_MARKER: &str = ".booted";

#[derive(Debug, Clone, Default)]
pub struct ExternalTools {
    pub dexopt: Option<PathBuf>,
    pub idmap: Option<PathBuf>,
    pub relabel: Option<PathBuf>,
}

pub struct HostOps {
    layout: DataLayout,
    tools: ExternalTools,
}

impl HostOps {
    pub fn new(layout: DataLayout, tools: ExternalTools) -> Self {
        Self { layout, tools }
    }

    fn package_dir(&self, pkg: &str, user_id: u32) -> Result<PathBuf> {
        ensure_valid_package(pkg)?;
        Ok(self.layout.package_data_dir(pkg, user_id))
    }

    pub(crate) fn dex_cache_path(&self, apk_path: &str, instruction_set: &str) -> PathBuf {
        let flat = apk_path.trim_start_matches('/').replace('/', "@");
        self.layout
            .dalvik_cache_dir(instruction_set)
            .join(format!("{flat}@classes.dex"))
    }

    fn ensure_valid_apk_path(&self, apk_path: &str) -> Result<()> {
        let path = Path::new(apk_path);
        let mutable = path.starts_with(self.layout.app_dir())
            || path.starts_with(self.layout.app_private_dir())
            || path.starts_with(self.layout.asec_dir());
        if mutable || self.layout.is_system_app_dir(path) {
            Ok(())
        } else {
            Err(anyhow!("{apk_path} is not an app install location"))
        }
    }

    fn ensure_valid_instruction_set(instruction_set: &str) -> Result<()> {
        if instruction_set.is_empty() || instruction_set.contains('/') {
            bail!("invalid instruction set: {instruction_set}");
        }
        Ok(())
    }

    fn run_tool(&self, tool: Option<&PathBuf>, op: &str, args: &[String]) -> Result<()> {
        let Some(tool) = tool else {
            bail!("no {op} helper configured");
        };
        let status = Command::new(tool)
            .args(args)
            .status()
            .with_context(|| format!("failed to launch {}", tool.display()))?;
        if !status.success() {
            bail!("{op} helper exited with {status}");
        }
        Ok(())
    }

    fn do_install(&self, pkg: &str, uid: u32, gid: u32) -> Result<()> {
        let dir = self.package_dir(pkg, 0)?;
        prepare_dir(&dir, PACKAGE_DIR_MODE, uid, gid)
            .with_context(|| format!("failed to prepare {}", dir.display()))
    }

    fn do_uninstall(&self, pkg: &str, user_id: u32) -> Result<()> {
        let dir = self.package_dir(pkg, user_id)?;
        remove_tree_if_exists(&dir).with_context(|| format!("failed to remove {}", dir.display()))
    }

    fn do_rename(&self, old_pkg: &str, new_pkg: &str) -> Result<()> {
        let from = self.package_dir(old_pkg, 0)?;
        let to = self.package_dir(new_pkg, 0)?;
        if to.exists() {
            bail!("target package directory already exists: {}", to.display());
        }
        fs::rename(&from, &to)
            .with_context(|| format!("failed to rename {} to {}", from.display(), to.display()))
    }

    fn do_fix_uid(&self, pkg: &str, uid: u32, gid: u32) -> Result<()> {
        let dir = self.package_dir(pkg, 0)?;
        if !dir.is_dir() {
            bail!("{} is not a package directory", dir.display());
        }
        fs::set_permissions(&dir, fs::Permissions::from_mode(PACKAGE_DIR_MODE))
            .with_context(|| format!("failed to chmod {}", dir.display()))?;
        chown(&dir, Some(uid), Some(gid))
            .with_context(|| format!("failed to chown {}", dir.display()))
    }

    fn do_free_cache(&self, free_bytes: i64) -> Result<()> {
        if free_bytes <= 0 {
            return Ok(());
        }
        let needed = free_bytes as u64;
        if available_bytes(self.layout.data_dir())? >= needed {
            return Ok(());
        }
        for user_id in all_user_ids(&self.layout) {
            let base = self.layout.user_data_dir(user_id);
            let Ok(entries) = fs::read_dir(&base) else {
                continue;
            };
            for entry in entries.flatten() {
                let cache = entry.path().join(CACHE_SUBDIR);
                if !cache.is_dir() {
                    continue;
                }
                if let Err(err) = delete_dir_contents(&cache) {
                    warn!(path = %cache.display(), error = %err, "failed to clear cache");
                    continue;
                }
                if available_bytes(self.layout.data_dir())? >= needed {
                    return Ok(());
                }
            }
        }
        bail!("unable to free {free_bytes} bytes on the data volume");
    }

    fn do_clear_subdir(&self, pkg: &str, user_id: u32, subdir: &str) -> Result<()> {
        let dir = self.package_dir(pkg, user_id)?.join(subdir);
        if !dir.is_dir() {
            return Ok(());
        }
        delete_dir_contents(&dir).with_context(|| format!("failed to clear {}", dir.display()))
    }

    fn do_get_size(
        &self,
        pkg: &str,
        user_id: u32,
        apk_path: &str,
        lib_dir_path: &str,
        fwdlocked_apk_path: &str,
        asec_path: &str,
        instruction_set: &str,
    ) -> SizeStats {
        let mut code_size = file_size(Path::new(apk_path));
        if is_present(fwdlocked_apk_path) {
            code_size += file_size(Path::new(fwdlocked_apk_path));
        }
        code_size += file_size(&self.dex_cache_path(apk_path, instruction_set));
        if is_present(lib_dir_path) {
            code_size += dir_size(Path::new(lib_dir_path));
        }

        let pkg_dir = self.layout.package_data_dir(pkg, user_id);
        let cache_size =
            dir_size(&pkg_dir.join(CACHE_SUBDIR)) + dir_size(&pkg_dir.join(CODE_CACHE_SUBDIR));
        let data_size = dir_size(&pkg_dir).saturating_sub(cache_size);

        let asec_size = if is_present(asec_path) {
            let path = Path::new(asec_path);
            if path.is_dir() {
                dir_size(path)
            } else {
                file_size(path)
            }
        } else {
            0
        };

        SizeStats {
            code_size: code_size as i64,
            data_size: data_size as i64,
            cache_size: cache_size as i64,
            asec_size: asec_size as i64,
        }
    }

    fn do_link_lib(&self, pkg: &str, asec_lib_dir: &str, user_id: u32) -> Result<()> {
        let pkg_dir = self.package_dir(pkg, user_id)?;
        if !pkg_dir.is_dir() {
            bail!("{} is not a package directory", pkg_dir.display());
        }
        let link = pkg_dir.join(LIB_LINK);
        match fs::symlink_metadata(&link) {
            Ok(meta) if meta.is_symlink() => {
                fs::remove_file(&link)
                    .with_context(|| format!("failed to unlink {}", link.display()))?;
            }
            Ok(_) => bail!("refusing to replace non-symlink {}", link.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("failed to stat {}", link.display()));
            }
        }
        symlink(asec_lib_dir, &link)
            .with_context(|| format!("failed to link {}", link.display()))
    }

    fn do_make_user_data(&self, pkg: &str, uid: u32, user_id: u32) -> Result<()> {
        let dir = self.package_dir(pkg, user_id)?;
        prepare_dir(&dir, PACKAGE_DIR_MODE, uid, uid)
            .with_context(|| format!("failed to prepare {}", dir.display()))
    }

    fn do_delete_user(&self, user_id: u32) -> Result<()> {
        if user_id == 0 {
            bail!("refusing to remove the primary user");
        }
        for dir in [
            self.layout.user_root().join(user_id.to_string()),
            self.layout.user_media_dir(user_id),
            self.layout.user_config_dir(user_id),
        ] {
            remove_tree_if_exists(&dir)
                .with_context(|| format!("failed to remove {}", dir.display()))?;
        }
        Ok(())
    }

    fn do_mark_boot_complete(&self, instruction_set: &str) -> Result<()> {
        Self::ensure_valid_instruction_set(instruction_set)?;
        let dir = self.layout.dalvik_cache_dir(instruction_set);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        fs::write(dir.join(BOOT_MARKER), b"")
            .with_context(|| format!("failed to mark {}", dir.display()))
    }

    fn do_move_dex(&self, src: &str, dst: &str, instruction_set: &str) -> Result<()> {
        Self::ensure_valid_instruction_set(instruction_set)?;
        self.ensure_valid_apk_path(src)?;
        self.ensure_valid_apk_path(dst)?;
        let from = self.dex_cache_path(src, instruction_set);
        let to = self.dex_cache_path(dst, instruction_set);
        fs::rename(&from, &to)
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display()))
    }

    fn do_rm_dex(&self, apk_path: &str, instruction_set: &str) -> Result<()> {
        Self::ensure_valid_instruction_set(instruction_set)?;
        let cached = self.dex_cache_path(apk_path, instruction_set);
        remove_file_if_exists(&cached)
            .with_context(|| format!("failed to remove {}", cached.display()))
    }

    #[allow(clippy::too_many_arguments)]
    fn do_dexopt(
        &self,
        apk_path: &str,
        uid: u32,
        is_public: bool,
        pkg: &str,
        instruction_set: &str,
        vm_safe_mode: bool,
        should_relocate: bool,
    ) -> Result<()> {
        ensure_valid_package(pkg)?;
        Self::ensure_valid_instruction_set(instruction_set)?;
        self.ensure_valid_apk_path(apk_path)?;
        self.run_tool(
            self.tools.dexopt.as_ref(),
            "dexopt",
            &[
                apk_path.to_string(),
                uid.to_string(),
                flag(is_public),
                pkg.to_string(),
                instruction_set.to_string(),
                flag(vm_safe_mode),
                flag(should_relocate),
            ],
        )
    }
}

impl PackageOps for HostOps {
    fn install(&self, pkg: &str, uid: u32, gid: u32, seinfo: &str) -> i32 {
        debug!(pkg, uid, gid, seinfo, "install");
        op_code("install", self.do_install(pkg, uid, gid))
    }

    fn dexopt(
        &self,
        apk_path: &str,
        uid: u32,
        is_public: bool,
        pkg: &str,
        instruction_set: &str,
        vm_safe_mode: bool,
        should_relocate: bool,
    ) -> i32 {
        op_code(
            "dexopt",
            self.do_dexopt(
                apk_path,
                uid,
                is_public,
                pkg,
                instruction_set,
                vm_safe_mode,
                should_relocate,
            ),
        )
    }

    fn mark_boot_complete(&self, instruction_set: &str) -> i32 {
        op_code("markbootcomplete", self.do_mark_boot_complete(instruction_set))
    }

    fn move_dex(&self, src: &str, dst: &str, instruction_set: &str) -> i32 {
        op_code("movedex", self.do_move_dex(src, dst, instruction_set))
    }

    fn rm_dex(&self, pkg: &str, instruction_set: &str) -> i32 {
        op_code("rmdex", self.do_rm_dex(pkg, instruction_set))
    }

    fn uninstall(&self, pkg: &str, user_id: u32) -> i32 {
        op_code("remove", self.do_uninstall(pkg, user_id))
    }

    fn rename_package(&self, old_pkg: &str, new_pkg: &str) -> i32 {
        op_code("rename", self.do_rename(old_pkg, new_pkg))
    }

    fn fix_uid(&self, pkg: &str, uid: u32, gid: u32) -> i32 {
        op_code("fixuid", self.do_fix_uid(pkg, uid, gid))
    }

    fn free_cache(&self, free_bytes: i64) -> i32 {
        op_code("freecache", self.do_free_cache(free_bytes))
    }

    fn delete_cache(&self, pkg: &str, user_id: u32) -> i32 {
        op_code("rmcache", self.do_clear_subdir(pkg, user_id, CACHE_SUBDIR))
    }

    fn delete_code_cache(&self, pkg: &str, user_id: u32) -> i32 {
        op_code(
            "rmcodecache",
            self.do_clear_subdir(pkg, user_id, CODE_CACHE_SUBDIR),
        )
    }

    fn get_size(
        &self,
        pkg: &str,
        user_id: u32,
        apk_path: &str,
        lib_dir_path: &str,
        fwdlocked_apk_path: &str,
        asec_path: &str,
        instruction_set: &str,
    ) -> (i32, SizeStats) {
        if ensure_valid_package(pkg).is_err() {
            warn!(pkg, "getsize on invalid package name");
            return (-1, SizeStats::default());
        }
        let stats = self.do_get_size(
            pkg,
            user_id,
            apk_path,
            lib_dir_path,
            fwdlocked_apk_path,
            asec_path,
            instruction_set,
        );
        (0, stats)
    }

    fn delete_user_data(&self, pkg: &str, user_id: u32) -> i32 {
        op_code("rmuserdata", self.do_uninstall(pkg, user_id))
    }

    fn move_files(&self) -> i32 {
        // update-script replay is not carried on this platform
        debug!("movefiles: no pending update scripts");
        0
    }

    fn link_lib(&self, pkg: &str, asec_lib_dir: &str, user_id: u32) -> i32 {
        op_code("linklib", self.do_link_lib(pkg, asec_lib_dir, user_id))
    }

    fn make_user_data(&self, pkg: &str, uid: u32, user_id: u32, seinfo: &str) -> i32 {
        debug!(pkg, uid, user_id, seinfo, "mkuserdata");
        op_code("mkuserdata", self.do_make_user_data(pkg, uid, user_id))
    }

    fn make_user_config(&self, user_id: u32) -> i32 {
        op_code(
            "mkuserconfig",
            ensure_config_user_dir(&self.layout, user_id).map_err(anyhow::Error::from),
        )
    }

    fn delete_user(&self, user_id: u32) -> i32 {
        op_code("rmuser", self.do_delete_user(user_id))
    }

    fn idmap(&self, target_apk: &str, overlay_apk: &str, uid: u32) -> i32 {
        let checked = self
            .ensure_valid_apk_path(target_apk)
            .and_then(|()| self.ensure_valid_apk_path(overlay_apk))
            .and_then(|()| {
                self.run_tool(
                    self.tools.idmap.as_ref(),
                    "idmap",
                    &[
                        target_apk.to_string(),
                        overlay_apk.to_string(),
                        uid.to_string(),
                    ],
                )
            });
        op_code("idmap", checked)
    }

    fn restorecon_data(&self, pkg: &str, seinfo: &str, uid: u32) -> i32 {
        let checked = ensure_valid_package(pkg).and_then(|()| {
            self.run_tool(
                self.tools.relabel.as_ref(),
                "restorecon",
                &[pkg.to_string(), seinfo.to_string(), uid.to_string()],
            )
        });
        op_code("restorecondata", checked)
    }
}

fn op_code(op: &str, result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            warn!(op, error = %format!("{err:#}"), "command failed");
            -1
        }
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn is_present(arg: &str) -> bool {
    !arg.is_empty() && arg != "!"
}

pub(crate) fn valid_package_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn ensure_valid_package(pkg: &str) -> Result<()> {
    if valid_package_name(pkg) {
        Ok(())
    } else {
        Err(anyhow!("invalid package name: {pkg}"))
    }
}

fn all_user_ids(layout: &DataLayout) -> Vec<u32> {
    let mut ids = existing_user_ids(&layout.user_root());
    if !ids.contains(&0) {
        ids.insert(0, 0);
    }
    ids
}

fn available_bytes(path: &Path) -> Result<u64> {
    let raw = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| anyhow!("data root path contains a nul byte"))?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(raw.as_ptr(), &mut stats) } != 0 {
        return Err(io::Error::last_os_error())
            .with_context(|| format!("failed to statvfs {}", path.display()));
    }
    Ok(stats.f_bavail as u64 * stats.f_frsize as u64)
}
