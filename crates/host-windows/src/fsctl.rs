use std::fs::{self, OpenOptions};
use std::path::Path;

use diskweave_core::config::DiskweaveConfig;
use diskweave_core::error::{code, DeviceError, Result};
use diskweave_core::reparse::{self, ReparseKind, ReparseTarget};
use diskweave_core::storage;
use tracing::{debug, info, warn};

use crate::handle::{Access, DeviceHandle};

/// Reparse data stored on `path`; `None` when its filesystem has none.
pub fn read_reparse_point(config: &DiskweaveConfig, path: &str) -> Result<Option<ReparseTarget>> {
    let handle = DeviceHandle::open_reparse(path, Access::Read)?;
    reparse::get_reparse_point(&config.exchange(), &handle)
}

/// Makes the directory `path` a junction to the absolute `target`, creating
/// the directory when it does not exist yet.
pub fn create_junction(path: &str, target: &str) -> Result<()> {
    store_reparse_point(path, target, true, true)?;
    info!(path, target, "created junction");
    Ok(())
}

/// Makes `path` a symbolic link to `target`; a relative target is kept relative.
pub fn create_symbolic_link(path: &str, target: &str, directory: bool) -> Result<()> {
    store_reparse_point(path, target, false, directory)?;
    info!(path, target, directory, "created symbolic link");
    Ok(())
}

/// Removes the reparse point from `path`, leaving an ordinary file or
/// directory, and reports which kind it was.
pub fn delete_reparse_point(config: &DiskweaveConfig, path: &str) -> Result<ReparseKind> {
    let handle = DeviceHandle::open_reparse(path, Access::ReadWrite)?;
    let existing = reparse::get_reparse_point(&config.exchange(), &handle)?.ok_or_else(|| {
        DeviceError::os(code::ERROR_NOT_A_REPARSE_POINT, "FSCTL_GET_REPARSE_POINT", path)
    })?;
    reparse::delete_reparse_point(&handle, existing.kind)?;
    info!(path, kind = ?existing.kind, "deleted reparse point");
    Ok(existing.kind)
}

pub fn set_compression(path: &str, enabled: bool) -> Result<()> {
    let handle = DeviceHandle::open_file(path, Access::ReadWrite)?;
    storage::set_compression(&handle, enabled)?;
    info!(path, enabled, "updated compression");
    Ok(())
}

fn store_reparse_point(path: &str, target: &str, is_junction: bool, directory: bool) -> Result<()> {
    let created = ensure_exists(path, directory)?;
    let result = DeviceHandle::open_reparse(path, Access::ReadWrite)
        .and_then(|handle| reparse::set_reparse_point(&handle, target, is_junction));
    if result.is_err() && created {
        debug!(path, "removing placeholder after failed reparse write");
        let removed = if directory {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        if let Err(err) = removed {
            warn!(path, error = %err, "placeholder left behind");
        }
    }
    result
}

/// Creates the placeholder a reparse point is stored on; true when it was created here.
fn ensure_exists(path: &str, directory: bool) -> Result<bool> {
    if path.trim().is_empty() {
        return Err(DeviceError::InvalidInput("path is empty".to_string()));
    }
    let p = Path::new(path);
    match fs::symlink_metadata(p) {
        Ok(meta) if meta.is_dir() != directory => Err(DeviceError::InvalidInput(format!(
            "{} is not a {}",
            path,
            if directory { "directory" } else { "file" }
        ))),
        Ok(_) => Ok(false),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if directory {
                fs::create_dir(p)?;
            } else {
                OpenOptions::new().write(true).create_new(true).open(p)?;
            }
            Ok(true)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("diskweave-fsctl-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn placeholder_kind_must_match() {
        let dir = scratch("kind");
        let file = dir.join("plain.txt");
        fs::write(&file, b"x").unwrap();
        let file = file.to_str().unwrap();

        assert!(matches!(
            ensure_exists(file, true),
            Err(DeviceError::InvalidInput(_))
        ));
        assert!(!ensure_exists(file, false).unwrap());
        assert!(matches!(
            ensure_exists(dir.to_str().unwrap(), false),
            Err(DeviceError::InvalidInput(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_junction_removes_the_directory_it_created() {
        let dir = scratch("junction");
        let link = dir.join("link");
        let link_str = link.to_str().unwrap();

        let err = create_junction(link_str, r"relative\target").unwrap_err();
        assert!(matches!(err, DeviceError::InvalidInput(_)));
        assert!(!link.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_symlink_removes_the_file_it_created() {
        let dir = scratch("symlink");
        let link = dir.join("link.txt");

        let err = create_symbolic_link(link.to_str().unwrap(), "", false).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidInput(_)));
        assert!(!link.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_junction_keeps_an_existing_directory() {
        let dir = scratch("existing");
        let link = dir.join("kept");
        fs::create_dir(&link).unwrap();

        assert!(create_junction(link.to_str().unwrap(), "relative").is_err());
        assert!(link.is_dir());
        fs::remove_dir_all(&dir).unwrap();
    }
}
