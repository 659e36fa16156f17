//! Win32 bindings for the storage model in `diskweave-core`.
//!
//! Builds for other targets keep the same API; every call reports
//! [`DeviceError::Unsupported`](diskweave_core::DeviceError::Unsupported).

#[cfg(windows)]
mod handle;
#[cfg(windows)]
mod probe;
#[cfg(windows)]
mod setupapi;
#[cfg(windows)]
mod system;
#[cfg(windows)]
mod volumes;

#[cfg(windows)]
mod fsctl;
#[cfg(not(windows))]
#[path = "fsctl_stub.rs"]
mod fsctl;

#[cfg(windows)]
mod inventory;
#[cfg(not(windows))]
#[path = "inventory_stub.rs"]
mod inventory;

#[cfg(windows)]
pub use handle::{Access, DeviceHandle};
#[cfg(windows)]
pub use probe::WindowsProbe;
#[cfg(windows)]
pub use setupapi::SetupApi;

pub use fsctl::{
    create_junction, create_symbolic_link, delete_reparse_point, read_reparse_point,
    set_compression,
};
pub use inventory::{
    build_topology, drive_layout, host_info, list_devices, logical_drives, volume_paths,
};

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;
    use diskweave_core::{DeviceError, DiskweaveConfig};

    #[test]
    fn calls_report_unsupported_off_windows() {
        let config = DiskweaveConfig::default();
        assert!(matches!(
            build_topology(&config),
            Err(DeviceError::Unsupported(_))
        ));
        assert!(matches!(
            drive_layout(&config, 0),
            Err(DeviceError::Unsupported(_))
        ));
        assert!(matches!(
            create_junction("link", r"D:\data"),
            Err(DeviceError::Unsupported(_))
        ));
        assert!(logical_drives().is_empty());
        assert_eq!(host_info().os, std::env::consts::OS);
        let err = set_compression("file", true).unwrap_err();
        assert_eq!(err.to_string(), "NTFS compression requires Windows");
    }
}
