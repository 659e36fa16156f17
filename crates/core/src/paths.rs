//! Device and volume path forms.
//!
//! Win32 paths (`C:\dir`), long paths (`\\?\C:\dir`), non-interpreted NT
//! paths (`\??\C:\dir`) and device paths (`\\.\C:`) all describe the same
//! object; these helpers convert between them without touching the OS.

use uuid::Uuid;

use crate::error::{DeviceError, Result};

pub const NON_INTERPRETED_PREFIX: &str = r"\??\";
pub const NON_INTERPRETED_UNC_PREFIX: &str = r"\??\UNC\";
pub const LONG_PATH_PREFIX: &str = r"\\?\";
pub const LONG_PATH_UNC_PREFIX: &str = r"\\?\UNC\";
pub const DEVICE_PREFIX: &str = r"\\.\";
pub const VOLUME_PREFIX: &str = r"\\?\Volume{";

pub fn normalize_separators(path: &str) -> String {
    path.replace('/', "\\")
}

pub fn with_trailing_separator(path: &str) -> String {
    if path.ends_with('\\') {
        path.to_string()
    } else {
        format!("{}\\", path)
    }
}

/// `C:` or `C:\...`
pub fn is_drive_qualified(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'\\')
}

pub fn is_unc(path: &str) -> bool {
    path.starts_with(r"\\")
        && !path.starts_with(LONG_PATH_PREFIX)
        && !path.starts_with(DEVICE_PREFIX)
}

/// True for any form that does not depend on the current directory or drive.
pub fn is_absolute(path: &str) -> bool {
    let path = normalize_separators(path);
    is_drive_qualified(&path)
        || path.starts_with(r"\\")
        || path.starts_with(NON_INTERPRETED_PREFIX)
}

/// Converts a Win32 path to the non-interpreted form the filesystem stores in
/// reparse points (`C:\x` → `\??\C:\x`, `\\srv\share` → `\??\UNC\srv\share`).
pub fn to_non_interpreted(path: &str) -> Result<String> {
    let path = normalize_separators(path);
    if path.starts_with(NON_INTERPRETED_PREFIX) {
        return Ok(path);
    }
    if let Some(rest) = path.strip_prefix(LONG_PATH_UNC_PREFIX) {
        return Ok(format!("{}{}", NON_INTERPRETED_UNC_PREFIX, rest));
    }
    if let Some(rest) = path.strip_prefix(LONG_PATH_PREFIX) {
        return Ok(format!("{}{}", NON_INTERPRETED_PREFIX, rest));
    }
    if is_drive_qualified(&path) {
        return Ok(format!("{}{}", NON_INTERPRETED_PREFIX, path));
    }
    if is_unc(&path) {
        return Ok(format!("{}{}", NON_INTERPRETED_UNC_PREFIX, &path[2..]));
    }
    Err(DeviceError::InvalidInput(format!(
        "path is not absolute: {}",
        path
    )))
}

/// Inverse of [`to_non_interpreted`]; other forms are returned unchanged.
pub fn from_non_interpreted(path: &str) -> String {
    if let Some(rest) = path.strip_prefix(NON_INTERPRETED_UNC_PREFIX) {
        return format!(r"\\{}", rest);
    }
    if let Some(rest) = path.strip_prefix(NON_INTERPRETED_PREFIX) {
        return rest.to_string();
    }
    path.to_string()
}

/// `C`, `C:` or `C:\` → `\\.\C:`
pub fn logical_drive_device_path(drive: &str) -> Result<String> {
    let letter = drive_letter(drive)?;
    Ok(format!(r"{}{}:", DEVICE_PREFIX, letter))
}

/// `C`, `c:` or `C:\...` → `C:\`
pub fn logical_drive_root(drive: &str) -> Result<String> {
    let letter = drive_letter(drive)?;
    Ok(format!(r"{}:\", letter))
}

fn drive_letter(drive: &str) -> Result<char> {
    let trimmed = drive.trim();
    let mut chars = trimmed.chars();
    let letter = chars
        .next()
        .filter(char::is_ascii_alphabetic)
        .ok_or_else(|| DeviceError::InvalidInput(format!("not a drive letter: {:?}", drive)))?;
    let rest = chars.as_str();
    if rest.is_empty() || rest == ":" || rest.starts_with(":\\") {
        Ok(letter.to_ascii_uppercase())
    } else {
        Err(DeviceError::InvalidInput(format!(
            "not a drive letter: {:?}",
            drive
        )))
    }
}

pub fn physical_drive_path(device_number: u32) -> String {
    format!(r"{}PhysicalDrive{}", DEVICE_PREFIX, device_number)
}

/// Parses `\\?\Volume{GUID}\` (trailing separator optional).
pub fn parse_volume_guid(volume: &str) -> Result<Uuid> {
    let invalid = || DeviceError::InvalidInput(format!("not a volume GUID path: {:?}", volume));
    let rest = volume.strip_prefix(VOLUME_PREFIX).ok_or_else(invalid)?;
    let rest = rest.strip_suffix('\\').unwrap_or(rest);
    let guid = rest.strip_suffix('}').ok_or_else(invalid)?;
    Uuid::parse_str(guid).map_err(|_| invalid())
}

/// Device form of a volume GUID path: the same path without its trailing separator.
pub fn volume_device_path(volume: &str) -> Result<String> {
    parse_volume_guid(volume)?;
    Ok(volume.strip_suffix('\\').unwrap_or(volume).to_string())
}

/// Rejects strings that cannot name a device before any handle is opened.
pub fn validate_device_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(DeviceError::InvalidInput("device path is empty".to_string()));
    }
    if path.contains('\0') {
        return Err(DeviceError::InvalidInput(format!(
            "device path contains NUL: {:?}",
            path
        )));
    }
    if !(path.starts_with(DEVICE_PREFIX) || path.starts_with(LONG_PATH_PREFIX)) {
        return Err(DeviceError::InvalidInput(format!(
            "not a device path: {}",
            path
        )));
    }
    if path.len() <= DEVICE_PREFIX.len() {
        return Err(DeviceError::InvalidInput(format!(
            "device path has no name: {}",
            path
        )));
    }
    Ok(())
}
