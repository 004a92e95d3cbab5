#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeStats {
    pub code_size: i64,
    pub data_size: i64,
    pub cache_size: i64,
    pub asec_size: i64,
}

/// Call boundary for the package operations the daemon delegates. Every
/// method returns an opaque result code: zero on success, a handler-defined
/// negative value on failure. The dispatch layer forwards these codes to the
/// wire verbatim and never interprets them.
pub trait PackageOps {
    /// Prepare the primary-user data directory for a freshly installed
    /// package, owned by the given uid/gid.
    fn install(&self, pkg: &str, uid: u32, gid: u32, seinfo: &str) -> i32;

    /// Produce an optimized code artifact for the apk. `should_relocate`
    /// distinguishes the patchoat entry point from plain dexopt.
    #[allow(clippy::too_many_arguments)]
    fn dexopt(
        &self,
        apk_path: &str,
        uid: u32,
        is_public: bool,
        pkg: &str,
        instruction_set: &str,
        vm_safe_mode: bool,
        should_relocate: bool,
    ) -> i32;

    fn mark_boot_complete(&self, instruction_set: &str) -> i32;

    fn move_dex(&self, src: &str, dst: &str, instruction_set: &str) -> i32;

    fn rm_dex(&self, pkg: &str, instruction_set: &str) -> i32;

    /// Remove a package's per-user data subtree. Removing an absent package
    /// succeeds.
    fn uninstall(&self, pkg: &str, user_id: u32) -> i32;

    fn rename_package(&self, old_pkg: &str, new_pkg: &str) -> i32;

    fn fix_uid(&self, pkg: &str, uid: u32, gid: u32) -> i32;

    /// Make at least `free_bytes` available on the data volume by clearing
    /// package caches.
    fn free_cache(&self, free_bytes: i64) -> i32;

    fn delete_cache(&self, pkg: &str, user_id: u32) -> i32;

    fn delete_code_cache(&self, pkg: &str, user_id: u32) -> i32;

    /// Measure a package's footprint. The stats are reported even when the
    /// result code is a failure.
    #[allow(clippy::too_many_arguments)]
    fn get_size(
        &self,
        pkg: &str,
        user_id: u32,
        apk_path: &str,
        lib_dir_path: &str,
        fwdlocked_apk_path: &str,
        asec_path: &str,
        instruction_set: &str,
    ) -> (i32, SizeStats);

    fn delete_user_data(&self, pkg: &str, user_id: u32) -> i32;

    fn move_files(&self) -> i32;

    fn link_lib(&self, pkg: &str, asec_lib_dir: &str, user_id: u32) -> i32;

    fn make_user_data(&self, pkg: &str, uid: u32, user_id: u32, seinfo: &str) -> i32;

    fn make_user_config(&self, user_id: u32) -> i32;

    fn delete_user(&self, user_id: u32) -> i32;

    fn idmap(&self, target_apk: &str, overlay_apk: &str, uid: u32) -> i32;

    fn restorecon_data(&self, pkg: &str, seinfo: &str, uid: u32) -> i32;
}
