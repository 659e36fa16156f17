use serde::{Deserialize, Serialize};

/// Device-control code as passed to `DeviceIoControl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlCode(pub u32);

impl ControlCode {
    pub const STORAGE_GET_DEVICE_NUMBER: Self = Self(0x002D_1080);
    pub const STORAGE_QUERY_PROPERTY: Self = Self(0x002D_1400);
    pub const DISK_GET_DRIVE_GEOMETRY_EX: Self = Self(0x0007_00A0);
    pub const DISK_GET_DRIVE_LAYOUT_EX: Self = Self(0x0007_0050);
    pub const VOLUME_GET_VOLUME_DISK_EXTENTS: Self = Self(0x0056_0000);
    pub const FSCTL_SET_REPARSE_POINT: Self = Self(0x0009_00A4);
    pub const FSCTL_GET_REPARSE_POINT: Self = Self(0x0009_00A8);
    pub const FSCTL_DELETE_REPARSE_POINT: Self = Self(0x0009_00AC);
    pub const FSCTL_SET_COMPRESSION: Self = Self(0x0009_C040);

    pub fn name(self) -> &'static str {
        match self {
            Self::STORAGE_GET_DEVICE_NUMBER => "IOCTL_STORAGE_GET_DEVICE_NUMBER",
            Self::STORAGE_QUERY_PROPERTY => "IOCTL_STORAGE_QUERY_PROPERTY",
            Self::DISK_GET_DRIVE_GEOMETRY_EX => "IOCTL_DISK_GET_DRIVE_GEOMETRY_EX",
            Self::DISK_GET_DRIVE_LAYOUT_EX => "IOCTL_DISK_GET_DRIVE_LAYOUT_EX",
            Self::VOLUME_GET_VOLUME_DISK_EXTENTS => "IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS",
            Self::FSCTL_SET_REPARSE_POINT => "FSCTL_SET_REPARSE_POINT",
            Self::FSCTL_GET_REPARSE_POINT => "FSCTL_GET_REPARSE_POINT",
            Self::FSCTL_DELETE_REPARSE_POINT => "FSCTL_DELETE_REPARSE_POINT",
            Self::FSCTL_SET_COMPRESSION => "FSCTL_SET_COMPRESSION",
            _ => "DeviceIoControl",
        }
    }

    /// Builds a code the way `CTL_CODE` does.
    pub const fn new(device_type: u32, function: u32, method: u32, access: u32) -> Self {
        Self((device_type << 16) | (access << 14) | (function << 2) | method)
    }
}

impl std::fmt::Display for ControlCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_match_ctl_code() {
        assert_eq!(
            ControlCode::new(0x2d, 0x420, 0, 0),
            ControlCode::STORAGE_GET_DEVICE_NUMBER
        );
        assert_eq!(
            ControlCode::new(0x07, 0x14, 0, 0),
            ControlCode::DISK_GET_DRIVE_LAYOUT_EX
        );
        assert_eq!(ControlCode::new(0x09, 42, 0, 0), ControlCode::FSCTL_GET_REPARSE_POINT);
        assert_eq!(ControlCode::new(0x09, 16, 0, 3), ControlCode::FSCTL_SET_COMPRESSION);
    }

    #[test]
    fn unknown_code_has_generic_name() {
        assert_eq!(ControlCode(0x1234).name(), "DeviceIoControl");
    }
}
