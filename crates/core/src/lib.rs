use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod ioctl;
pub mod partition;
pub mod paths;
mod reader;
pub mod reparse;
pub mod storage;
pub mod topology;
pub mod wide;

pub use buffer::{Attempt, CancelToken, ControlChannel, Exchange, InvokeFailure};
pub use config::DiskweaveConfig;
pub use device::{enumerate_devices, DeviceDescriptor, DeviceNamespace, EnumerationOptions};
pub use error::{DeviceError, Result};
pub use ioctl::ControlCode;
pub use partition::{DriveLayout, PartitionBody, PartitionRecord, PartitionStyle};
pub use reparse::{ReparseKind, ReparseTarget};
pub use topology::{correlate, DriveAlias, PhysicalDriveRecord, StorageProbe, TopologyBuilder};

pub const TOPOLOGY_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HostInfo {
    pub os: String,
    pub os_version: String,
    pub machine: String,
}

/// One correlation pass, as printed by the CLI.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopologySnapshot {
    pub snapshot_id: Uuid,
    pub schema_version: String,
    pub host: HostInfo,
    pub drives: Vec<PhysicalDriveRecord>,
    pub generated_at_utc: String,
}

impl TopologySnapshot {
    pub fn new(host: HostInfo, drives: Vec<PhysicalDriveRecord>) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            schema_version: TOPOLOGY_SCHEMA_VERSION.to_string(),
            host,
            drives,
            generated_at_utc: now_utc_rfc3339(),
        }
    }
}

pub fn now_utc_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DeviceType;

    #[test]
    fn snapshot_serializes_drives_and_aliases() {
        let mut drive = PhysicalDriveRecord::new(DeviceType::Disk, 0, 0);
        drive.aliases.insert(DriveAlias::LogicalDrive(r"C:\".to_string()));
        let snapshot = TopologySnapshot::new(
            HostInfo {
                os: "windows".to_string(),
                os_version: "10.0.22631".to_string(),
                machine: "WS-01".to_string(),
            },
            vec![drive],
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["schema_version"], TOPOLOGY_SCHEMA_VERSION);
        assert_eq!(json["drives"][0]["device_type"], "disk");
        assert_eq!(json["drives"][0]["serial_number"], -1);
        assert_eq!(json["drives"][0]["aliases"][0]["kind"], "logical_drive");
        assert_eq!(json["drives"][0]["aliases"][0]["path"], r"C:\");
        assert!(json["drives"][0].get("authoritative").is_none());
        assert!(snapshot.generated_at_utc.ends_with('Z'));
    }
}
