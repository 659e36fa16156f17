use std::ffi::c_void;

use diskweave_core::buffer::{ControlChannel, InvokeFailure};
use diskweave_core::error::{DeviceError, Result};
use diskweave_core::ioctl::ControlCode;
use diskweave_core::paths;
use diskweave_core::wide::wide;
use tracing::debug;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_FLAGS_AND_ATTRIBUTES, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_OPEN_REPARSE_POINT, FILE_GENERIC_READ, FILE_GENERIC_WRITE, FILE_SHARE_DELETE,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::IO::DeviceIoControl;

/// Access requested when opening a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No data access; enough for storage queries and works without elevation.
    Query,
    Read,
    ReadWrite,
}

impl Access {
    fn mask(self) -> u32 {
        match self {
            Access::Query => 0,
            Access::Read => FILE_GENERIC_READ.0,
            Access::ReadWrite => FILE_GENERIC_READ.0 | FILE_GENERIC_WRITE.0,
        }
    }
}

/// Owned Win32 file or device handle, closed on drop.
pub struct DeviceHandle {
    handle: HANDLE,
    path: String,
}

impl DeviceHandle {
    /// Opens a device path such as `\\.\PhysicalDrive0`, `\\.\C:` or a
    /// volume / interface path.
    pub fn open(path: &str, access: Access) -> Result<Self> {
        paths::validate_device_path(path)?;
        Self::open_with(path, access, FILE_ATTRIBUTE_NORMAL)
    }

    /// Opens a file or directory; directories need backup semantics.
    pub fn open_file(path: &str, access: Access) -> Result<Self> {
        validate_file_path(path)?;
        Self::open_with(path, access, FILE_FLAG_BACKUP_SEMANTICS)
    }

    /// Opens a file or directory itself rather than whatever its reparse point
    /// redirects to.
    pub fn open_reparse(path: &str, access: Access) -> Result<Self> {
        validate_file_path(path)?;
        Self::open_with(
            path,
            access,
            FILE_FLAG_OPEN_REPARSE_POINT | FILE_FLAG_BACKUP_SEMANTICS,
        )
    }

    fn open_with(path: &str, access: Access, flags: FILE_FLAGS_AND_ATTRIBUTES) -> Result<Self> {
        let w = wide(path);
        let handle = unsafe {
            CreateFileW(
                PCWSTR(w.as_ptr()),
                access.mask(),
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                None,
                OPEN_EXISTING,
                flags,
                HANDLE::default(),
            )
        }
        .map_err(|err| DeviceError::os(win32_code(&err), "CreateFileW", path))?;
        debug!(path, ?access, "opened handle");
        Ok(Self {
            handle,
            path: path.to_string(),
        })
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if !self.handle.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

impl ControlChannel for DeviceHandle {
    fn target(&self) -> &str {
        &self.path
    }

    fn is_live(&self) -> bool {
        !self.handle.is_invalid()
    }

    fn invoke(
        &self,
        code: ControlCode,
        input: Option<&[u8]>,
        output: &mut [u8],
    ) -> std::result::Result<usize, InvokeFailure> {
        let mut returned = 0u32;
        let out_ptr = if output.is_empty() {
            None
        } else {
            Some(output.as_mut_ptr() as *mut c_void)
        };
        let result = unsafe {
            DeviceIoControl(
                self.handle,
                code.0,
                input.map(|data| data.as_ptr() as *const c_void),
                input.map_or(0, |data| data.len() as u32),
                out_ptr,
                output.len() as u32,
                Some(&mut returned),
                None,
            )
        };
        match result {
            Ok(()) => Ok(returned as usize),
            Err(err) => Err(InvokeFailure::new(win32_code(&err))),
        }
    }
}

fn validate_file_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(DeviceError::InvalidInput("path is empty".to_string()));
    }
    if path.contains('\0') {
        return Err(DeviceError::InvalidInput(format!(
            "path contains NUL: {:?}",
            path
        )));
    }
    Ok(())
}

/// Win32 error code carried by a `windows` error.
fn win32_code(err: &windows::core::Error) -> u32 {
    win32_from_hresult(err.code().0)
}

/// Unwraps `HRESULT_FROM_WIN32`; other HRESULTs pass through unchanged.
fn win32_from_hresult(hr: i32) -> u32 {
    let hr = hr as u32;
    if hr & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    }
}
