use std::io;

use thiserror::Error;
use tracing::info;

use pkgd_core::ids::{INSTALL_GID, INSTALL_UID};

const CAP_CHOWN: u32 = 0;
const CAP_DAC_OVERRIDE: u32 = 1;
const CAP_FOWNER: u32 = 3;
const CAP_SETGID: u32 = 6;
const CAP_SETUID: u32 = 7;

const RETAINED_CAPS: [u32; 5] = [
    CAP_CHOWN,
    CAP_DAC_OVERRIDE,
    CAP_FOWNER,
    CAP_SETGID,
    CAP_SETUID,
];

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: libc::c_int,
}

#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub(crate) struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("failed to retain capabilities across identity change: {0}")]
    KeepCaps(io::Error),
    #[error("failed to switch group to {gid}: {source}")]
    SetGid { gid: u32, source: io::Error },
    #[error("failed to switch user to {uid}: {source}")]
    SetUid { uid: u32, source: io::Error },
    #[error("failed to restrict the capability set: {0}")]
    CapSet(io::Error),
}

/// Drop from the initial elevated identity to the fixed service account,
/// keeping exactly the capabilities the filesystem operations need. Any
/// failure must be treated as fatal by the caller: a partial drop leaves the
/// process both crippled and dangerous.
pub fn drop_privileges() -> Result<(), PrivilegeError> {
    if unsafe { libc::prctl(libc::PR_SET_KEEPCAPS, 1 as libc::c_ulong) } < 0 {
        return Err(PrivilegeError::KeepCaps(io::Error::last_os_error()));
    }

    if unsafe { libc::setgid(INSTALL_GID) } < 0 {
        return Err(PrivilegeError::SetGid {
            gid: INSTALL_GID,
            source: io::Error::last_os_error(),
        });
    }

    if unsafe { libc::setuid(INSTALL_UID) } < 0 {
        return Err(PrivilegeError::SetUid {
            uid: INSTALL_UID,
            source: io::Error::last_os_error(),
        });
    }

    let header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };
    let data = retained_capability_data();
    if unsafe { libc::syscall(libc::SYS_capset, &header as *const CapUserHeader, data.as_ptr()) }
        < 0
    {
        return Err(PrivilegeError::CapSet(io::Error::last_os_error()));
    }

    info!(uid = INSTALL_UID, gid = INSTALL_GID, "privileges dropped");
    Ok(())
}

// permitted == effective, inheritable empty: nothing is handed to children
pub(crate) fn retained_capability_data() -> [CapUserData; 2] {
    let mut data = [CapUserData::default(); 2];
    for cap in RETAINED_CAPS {
        data[(cap >> 5) as usize].permitted |= 1 << (cap & 31);
    }
    for word in &mut data {
        word.effective = word.permitted;
    }
    data
}
