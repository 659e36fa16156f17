use diskweave_core::config::DiskweaveConfig;
use diskweave_core::error::{DeviceError, Result};
use diskweave_core::reparse::{ReparseKind, ReparseTarget};

pub fn read_reparse_point(_config: &DiskweaveConfig, _path: &str) -> Result<Option<ReparseTarget>> {
    Err(DeviceError::Unsupported("reading reparse points"))
}

pub fn create_junction(_path: &str, _target: &str) -> Result<()> {
    Err(DeviceError::Unsupported("creating junctions"))
}

pub fn create_symbolic_link(_path: &str, _target: &str, _directory: bool) -> Result<()> {
    Err(DeviceError::Unsupported("creating symbolic links"))
}

pub fn delete_reparse_point(_config: &DiskweaveConfig, _path: &str) -> Result<ReparseKind> {
    Err(DeviceError::Unsupported("deleting reparse points"))
}

pub fn set_compression(_path: &str, _enabled: bool) -> Result<()> {
    Err(DeviceError::Unsupported("NTFS compression"))
}
