//! Reparse-point records for junctions (mount points) and symbolic links.
//!
//! Wire layout, little-endian:
//!
//! ```text
//! header   tag: u32, data_length: u16, reserved: u16
//! body     substitute_offset: u16, substitute_length: u16,
//!          print_offset: u16, print_length: u16,
//!          [flags: u32]               (symbolic links only)
//! names    UTF-16, offsets relative to the start of this area
//! ```

use serde::{Deserialize, Serialize};

use crate::buffer::{self, ControlChannel, Exchange};
use crate::error::{DeviceError, Result};
use crate::ioctl::ControlCode;
use crate::paths;
use crate::reader::RecordReader;
use crate::wide;

pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;
pub const MAXIMUM_REPARSE_DATA_BUFFER_SIZE: usize = 16 * 1024;
pub const REPARSE_DATA_BUFFER_HEADER_SIZE: usize = 8;
pub const SYMLINK_FLAG_RELATIVE: u32 = 0x0000_0001;

const NAME_TABLE_SIZE: usize = 8;
const SYMLINK_FLAGS_SIZE: usize = 4;
const WIDE_NUL: [u8; 2] = [0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReparseKind {
    MountPoint,
    SymbolicLink,
}

impl ReparseKind {
    pub fn tag(self) -> u32 {
        match self {
            ReparseKind::MountPoint => IO_REPARSE_TAG_MOUNT_POINT,
            ReparseKind::SymbolicLink => IO_REPARSE_TAG_SYMLINK,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            IO_REPARSE_TAG_MOUNT_POINT => Some(ReparseKind::MountPoint),
            IO_REPARSE_TAG_SYMLINK => Some(ReparseKind::SymbolicLink),
            _ => None,
        }
    }

    /// Offset of the name area from the start of the record.
    fn names_offset(self) -> usize {
        match self {
            ReparseKind::MountPoint => REPARSE_DATA_BUFFER_HEADER_SIZE + NAME_TABLE_SIZE,
            ReparseKind::SymbolicLink => {
                REPARSE_DATA_BUFFER_HEADER_SIZE + NAME_TABLE_SIZE + SYMLINK_FLAGS_SIZE
            }
        }
    }
}

/// A decoded reparse point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReparseTarget {
    pub kind: ReparseKind,
    /// The path the filesystem follows, usually in `\??\` form.
    pub substitute_name: String,
    /// Display form of the target.
    pub print_name: String,
    /// Symbolic-link flags; `None` for mount points.
    pub flags: Option<u32>,
}

impl ReparseTarget {
    pub fn is_relative(&self) -> bool {
        self.flags
            .is_some_and(|flags| flags & SYMLINK_FLAG_RELATIVE != 0)
    }

    /// Best display path: the print name, or the substitute name in Win32 form
    /// when a tool left the print name empty.
    pub fn target_path(&self) -> String {
        if self.print_name.is_empty() {
            paths::from_non_interpreted(&self.substitute_name)
        } else {
            self.print_name.clone()
        }
    }
}

/// Builds a mount-point record when `is_junction`, otherwise a symbolic-link record.
pub fn encode(target: &str, is_junction: bool) -> Result<Vec<u8>> {
    if is_junction {
        encode_mount_point(target)
    } else {
        encode_symbolic_link(target)
    }
}

/// Junction record. The target must be absolute; both names get a trailing separator.
pub fn encode_mount_point(target: &str) -> Result<Vec<u8>> {
    validate_target(target)?;
    let target = paths::normalize_separators(target);
    if !paths::is_absolute(&target) {
        return Err(DeviceError::InvalidInput(format!(
            "junction target must be absolute: {}",
            target
        )));
    }
    let substitute = paths::with_trailing_separator(&paths::to_non_interpreted(&target)?);
    let print = paths::with_trailing_separator(&paths::from_non_interpreted(&substitute));
    build(ReparseKind::MountPoint, &substitute, &print, None)
}

/// Symbolic-link record. Relative targets are stored verbatim with
/// [`SYMLINK_FLAG_RELATIVE`]; absolute targets get a non-interpreted substitute name.
pub fn encode_symbolic_link(target: &str) -> Result<Vec<u8>> {
    validate_target(target)?;
    let target = paths::normalize_separators(target);
    if paths::is_absolute(&target) {
        let substitute = paths::to_non_interpreted(&target)?;
        let print = paths::from_non_interpreted(&substitute);
        build(ReparseKind::SymbolicLink, &substitute, &print, Some(0))
    } else {
        build(
            ReparseKind::SymbolicLink,
            &target,
            &target,
            Some(SYMLINK_FLAG_RELATIVE),
        )
    }
}

/// Header-only record passed to `FSCTL_DELETE_REPARSE_POINT`.
pub fn encode_delete(kind: ReparseKind) -> Vec<u8> {
    let mut record = Vec::with_capacity(REPARSE_DATA_BUFFER_HEADER_SIZE);
    record.extend_from_slice(&kind.tag().to_le_bytes());
    record.extend_from_slice(&0u16.to_le_bytes());
    record.extend_from_slice(&0u16.to_le_bytes());
    record
}

/// Reads only the tag, for callers that must branch before decoding.
pub fn peek_tag(raw: &[u8]) -> Result<u32> {
    RecordReader::new("reparse record", raw).u32(0)
}

pub fn decode(raw: &[u8]) -> Result<ReparseTarget> {
    let reader = RecordReader::new("reparse record", raw);
    reader.require(REPARSE_DATA_BUFFER_HEADER_SIZE)?;

    let tag = reader.u32(0)?;
    let kind = ReparseKind::from_tag(tag).ok_or(DeviceError::UnrecognizedReparseTag { tag })?;

    let declared = REPARSE_DATA_BUFFER_HEADER_SIZE + reader.u16(4)? as usize;
    if declared > raw.len() {
        return Err(DeviceError::malformed(
            "reparse record",
            format!(
                "declared length {} exceeds the {} bytes returned",
                declared,
                raw.len()
            ),
        ));
    }
    // Nothing past the declared length belongs to the record.
    let record = RecordReader::new("reparse record", &raw[..declared]);

    let names_offset = kind.names_offset();
    record.require(names_offset)?;
    let substitute_offset = record.u16(8)? as usize;
    let substitute_length = record.u16(10)? as usize;
    let print_offset = record.u16(12)? as usize;
    let print_length = record.u16(14)? as usize;
    let flags = match kind {
        ReparseKind::MountPoint => None,
        ReparseKind::SymbolicLink => Some(record.u32(16)?),
    };

    let names = RecordReader::new(
        "reparse name area",
        record.bytes(names_offset, declared - names_offset)?,
    );
    let substitute_name =
        wide::string_from_utf16_bytes(names.bytes(substitute_offset, substitute_length)?);
    let print_name = wide::string_from_utf16_bytes(names.bytes(print_offset, print_length)?);

    Ok(ReparseTarget {
        kind,
        substitute_name,
        print_name,
        flags,
    })
}

/// Reads the reparse point of the file or directory behind `channel`.
///
/// `Ok(None)` when the filesystem does not support reparse points.
pub fn get_reparse_point<C>(exchange: &Exchange, channel: &C) -> Result<Option<ReparseTarget>>
where
    C: ControlChannel + ?Sized,
{
    exchange
        .sized(MAXIMUM_REPARSE_DATA_BUFFER_SIZE)
        .control(channel, ControlCode::FSCTL_GET_REPARSE_POINT, None)?
        .map(|raw| decode(&raw))
        .transpose()
}

/// Encodes `target` and stores it on the directory or file behind `channel`.
pub fn set_reparse_point<C>(channel: &C, target: &str, is_junction: bool) -> Result<()>
where
    C: ControlChannel + ?Sized,
{
    let record = encode(target, is_junction)?;
    buffer::execute(channel, ControlCode::FSCTL_SET_REPARSE_POINT, Some(&record))
}

pub fn delete_reparse_point<C>(channel: &C, kind: ReparseKind) -> Result<()>
where
    C: ControlChannel + ?Sized,
{
    let record = encode_delete(kind);
    buffer::execute(channel, ControlCode::FSCTL_DELETE_REPARSE_POINT, Some(&record))
}

fn validate_target(target: &str) -> Result<()> {
    if target.trim().is_empty() {
        return Err(DeviceError::InvalidInput("reparse target is empty".to_string()));
    }
    if target.contains('\0') {
        return Err(DeviceError::InvalidInput(format!(
            "reparse target contains NUL: {:?}",
            target
        )));
    }
    Ok(())
}

fn build(kind: ReparseKind, substitute: &str, print: &str, flags: Option<u32>) -> Result<Vec<u8>> {
    let substitute = wide::utf16_bytes(substitute);
    let print = wide::utf16_bytes(print);

    let names_len = substitute.len() + WIDE_NUL.len() + print.len() + WIDE_NUL.len();
    let total = kind.names_offset() + names_len;
    if total > MAXIMUM_REPARSE_DATA_BUFFER_SIZE {
        return Err(DeviceError::InvalidInput(format!(
            "reparse record of {} bytes exceeds the {} byte maximum",
            total, MAXIMUM_REPARSE_DATA_BUFFER_SIZE
        )));
    }
    let data_length = (total - REPARSE_DATA_BUFFER_HEADER_SIZE) as u16;
    let print_offset = (substitute.len() + WIDE_NUL.len()) as u16;

    let mut record = Vec::with_capacity(total);
    record.extend_from_slice(&kind.tag().to_le_bytes());
    record.extend_from_slice(&data_length.to_le_bytes());
    record.extend_from_slice(&0u16.to_le_bytes());
    record.extend_from_slice(&0u16.to_le_bytes());
    record.extend_from_slice(&(substitute.len() as u16).to_le_bytes());
    record.extend_from_slice(&print_offset.to_le_bytes());
    record.extend_from_slice(&(print.len() as u16).to_le_bytes());
    if let Some(flags) = flags {
        record.extend_from_slice(&flags.to_le_bytes());
    }
    record.extend_from_slice(&substitute);
    record.extend_from_slice(&WIDE_NUL);
    record.extend_from_slice(&print);
    record.extend_from_slice(&WIDE_NUL);
    debug_assert_eq!(record.len(), total);
    Ok(record)
}
