pub const SYSTEM_UID: u32 = 1000;
pub const SYSTEM_GID: u32 = 1000;

pub const INSTALL_UID: u32 = 1012;
pub const INSTALL_GID: u32 = 1012;

pub const MEDIA_RW_UID: u32 = 1023;
pub const MEDIA_RW_GID: u32 = 1023;

pub const SYSTEM_APP_ID: u32 = 1000;
pub const EVERYBODY_APP_ID: u32 = 9997;

pub const PER_USER_RANGE: u32 = 100_000;

pub fn user_uid(user_id: u32, app_id: u32) -> u32 {
    user_id * PER_USER_RANGE + app_id
}
