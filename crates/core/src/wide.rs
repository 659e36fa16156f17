//! UTF-16 helpers for strings crossing the native boundary.

/// NUL-terminated UTF-16 for passing paths to the OS.
pub fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// UTF-16LE bytes without a terminator.
pub fn utf16_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

/// Decodes UTF-16LE bytes verbatim; a trailing odd byte is ignored.
pub fn string_from_utf16_bytes(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&units(bytes))
}

/// First string of a NUL-separated UTF-16LE buffer, `None` when empty.
pub fn first_wide_string(bytes: &[u8]) -> Option<String> {
    wide_strings(bytes).into_iter().next()
}

/// All non-empty strings of a REG_MULTI_SZ style buffer.
pub fn wide_strings(bytes: &[u8]) -> Vec<String> {
    units(bytes)
        .split(|&unit| unit == 0)
        .map(String::from_utf16_lossy)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decodes a fixed-width UTF-16 array field that is padded with NULs.
pub fn string_from_wide_array(units: &[u16]) -> String {
    let end = units.iter().position(|&unit| unit == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

fn units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_is_nul_terminated() {
        assert_eq!(wide("C:"), vec![b'C' as u16, b':' as u16, 0]);
    }

    #[test]
    fn multi_sz_splits_and_skips_empty_entries() {
        let mut raw = utf16_bytes("SCSI\\DiskVendor");
        raw.extend_from_slice(&[0, 0]);
        raw.extend_from_slice(&utf16_bytes("GenDisk"));
        raw.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(wide_strings(&raw), vec!["SCSI\\DiskVendor", "GenDisk"]);
        assert_eq!(first_wide_string(&raw).as_deref(), Some("SCSI\\DiskVendor"));
        assert_eq!(first_wide_string(&[0, 0]), None);
    }

    #[test]
    fn fixed_array_stops_at_first_nul() {
        let mut name = [0u16; 8];
        for (slot, unit) in name.iter_mut().zip("EFI".encode_utf16()) {
            *slot = unit;
        }
        assert_eq!(string_from_wide_array(&name), "EFI");
    }
}
