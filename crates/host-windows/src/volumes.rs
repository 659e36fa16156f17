use diskweave_core::error::{code, DeviceError, Result};
use diskweave_core::wide::{string_from_wide_array, wide};
use tracing::debug;

use windows::core::PCWSTR;
use windows::Win32::Storage::FileSystem::{GetDriveTypeW, GetLogicalDrives};
use windows_sys::Win32::Foundation::{GetLastError, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{FindFirstVolumeW, FindNextVolumeW, FindVolumeClose};

const DRIVE_REMOVABLE: u32 = 2;
const DRIVE_FIXED: u32 = 3;
const DRIVE_CDROM: u32 = 5;
const DRIVE_RAMDISK: u32 = 6;

const ERROR_NO_MORE_FILES: u32 = 18;

/// Letters of mounted local drives backed by a storage device, as `C:\`.
///
/// Network, substituted and unknown drive types are left out.
pub fn logical_drives() -> Vec<String> {
    let mask = unsafe { GetLogicalDrives() };
    let mut drives = Vec::new();
    for (idx, letter) in ('A'..='Z').enumerate() {
        if mask & (1u32 << idx) == 0 {
            continue;
        }
        let root = format!(r"{}:\", letter);
        let w = wide(&root);
        let drive_type = unsafe { GetDriveTypeW(PCWSTR(w.as_ptr())) };
        if matches!(
            drive_type,
            DRIVE_REMOVABLE | DRIVE_FIXED | DRIVE_CDROM | DRIVE_RAMDISK
        ) {
            drives.push(root);
        } else {
            debug!(drive = %root, drive_type, "skipping drive type");
        }
    }
    drives
}

/// Every volume GUID path known to the mount manager.
pub fn volume_paths() -> Result<Vec<String>> {
    let mut name = [0u16; 64];
    let find = unsafe { FindFirstVolumeW(name.as_mut_ptr(), name.len() as u32) };
    if find == INVALID_HANDLE_VALUE {
        return Err(DeviceError::os(
            unsafe { GetLastError() },
            "FindFirstVolumeW",
            "mount manager",
        ));
    }
    let _close = FindGuard(find);

    let mut volumes = Vec::new();
    loop {
        volumes.push(string_from_wide_array(&name));
        name.fill(0);
        let ok = unsafe { FindNextVolumeW(find, name.as_mut_ptr(), name.len() as u32) };
        if ok == 0 {
            let os_code = unsafe { GetLastError() };
            if os_code == ERROR_NO_MORE_FILES || os_code == code::ERROR_NO_MORE_ITEMS {
                break;
            }
            return Err(DeviceError::os(os_code, "FindNextVolumeW", "mount manager"));
        }
    }
    debug!(count = volumes.len(), "listed volumes");
    Ok(volumes)
}

struct FindGuard(isize);

impl Drop for FindGuard {
    fn drop(&mut self) {
        unsafe {
            FindVolumeClose(self.0);
        }
    }
}
